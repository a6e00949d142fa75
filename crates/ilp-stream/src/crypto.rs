//! Key derivation and authenticated encryption for STREAM connections.
//!
//! All keys hang off a single 32-byte seed through domain-separated
//! HMAC-SHA256 derivations. Ciphertexts are AES-256-GCM with the wire
//! layout `nonce(12) ‖ tag(16) ‖ ciphertext`.

use bytes::BytesMut;
use ring::rand::{SecureRandom, SystemRandom};
use ring::{aead, digest, hmac};

use crate::error::StreamError;

pub const NONCE_LEN: usize = 12;
pub const AUTH_TAG_LEN: usize = 16;
/// Random connection tokens embedded in generated addresses.
pub const TOKEN_LEN: usize = 18;

static SECRET_GENERATOR_STRING: &[u8] = b"ilp_stream_secret_generator";
static ENCRYPTION_KEY_STRING: &[u8] = b"ilp_stream_encryption";
static FULFILLMENT_GENERATION_STRING: &[u8] = b"ilp_stream_fulfillment";
static TAG_ENCRYPTION_KEY_STRING: &[u8] = b"ilp_stream_tag_encryption_aes";

pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let output = hmac::sign(&key, message);
    let mut result = [0u8; 32];
    result.copy_from_slice(output.as_ref());
    result
}

pub fn hash_sha256(preimage: &[u8]) -> [u8; 32] {
    let output = digest::digest(&digest::SHA256, preimage);
    let mut result = [0u8; 32];
    result.copy_from_slice(output.as_ref());
    result
}

/// The generation key standing between the seed and every per-connection
/// shared secret.
pub fn generate_secret_generator(seed: &[u8]) -> [u8; 32] {
    hmac_sha256(seed, SECRET_GENERATOR_STRING)
}

pub fn derive_shared_secret(secret_generator: &[u8], token: &[u8]) -> [u8; 32] {
    hmac_sha256(secret_generator, token)
}

pub fn generate_fulfillment(shared_secret: &[u8], data: &[u8]) -> [u8; 32] {
    let key = hmac_sha256(shared_secret, FULFILLMENT_GENERATION_STRING);
    hmac_sha256(&key, data)
}

pub fn generate_condition(shared_secret: &[u8], data: &[u8]) -> [u8; 32] {
    hash_sha256(&generate_fulfillment(shared_secret, data))
}

pub fn generate_token() -> [u8; TOKEN_LEN] {
    let mut token = [0u8; TOKEN_LEN];
    SystemRandom::new()
        .fill(&mut token)
        .expect("system randomness is unavailable");
    token
}

fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .expect("system randomness is unavailable");
    nonce
}

/// Encrypts packet data under the connection's data key.
pub fn encrypt(shared_secret: &[u8], plaintext: BytesMut) -> BytesMut {
    let key = hmac_sha256(shared_secret, ENCRYPTION_KEY_STRING);
    encrypt_with_key(&key, plaintext, random_nonce())
}

/// Decrypts packet data, failing closed on any tampering.
pub fn decrypt(shared_secret: &[u8], ciphertext: BytesMut) -> Result<BytesMut, StreamError> {
    let key = hmac_sha256(shared_secret, ENCRYPTION_KEY_STRING);
    decrypt_with_key(&key, ciphertext)
}

/// Encrypts an address token under the seed-derived tag key. Only the
/// seed holder can recover the token from a public address.
pub fn encrypt_tag(seed: &[u8], plaintext: &[u8]) -> BytesMut {
    let key = hmac_sha256(seed, TAG_ENCRYPTION_KEY_STRING);
    encrypt_with_key(&key, BytesMut::from(plaintext), random_nonce())
}

pub fn decrypt_tag(seed: &[u8], ciphertext: BytesMut) -> Result<BytesMut, StreamError> {
    let key = hmac_sha256(seed, TAG_ENCRYPTION_KEY_STRING);
    decrypt_with_key(&key, ciphertext)
}

fn encrypt_with_key(key: &[u8; 32], mut plaintext: BytesMut, nonce: [u8; NONCE_LEN]) -> BytesMut {
    // Key length is correct by construction, so neither call can fail.
    let key = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .expect("AES-256-GCM accepts 32-byte keys");
    let key = aead::LessSafeKey::new(key);
    key.seal_in_place_append_tag(
        aead::Nonce::assume_unique_for_key(nonce),
        aead::Aad::empty(),
        &mut plaintext,
    )
    .expect("in-place sealing cannot fail");

    // Move the tag in front of the ciphertext to match the wire layout.
    let tag_position = plaintext.len() - AUTH_TAG_LEN;
    let mut tag_then_data = plaintext.split_off(tag_position);
    tag_then_data.unsplit(plaintext);

    let mut out = BytesMut::from(&nonce[..]);
    out.unsplit(tag_then_data);
    out
}

fn decrypt_with_key(key: &[u8; 32], mut ciphertext: BytesMut) -> Result<BytesMut, StreamError> {
    if ciphertext.len() < NONCE_LEN + AUTH_TAG_LEN {
        return Err(StreamError::DecryptionFailure);
    }

    let key = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .expect("AES-256-GCM accepts 32-byte keys");
    let key = aead::LessSafeKey::new(key);

    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&ciphertext.split_to(NONCE_LEN));
    let auth_tag = ciphertext.split_to(AUTH_TAG_LEN);

    // ring wants the tag after the data.
    ciphertext.unsplit(auth_tag);

    let length = key
        .open_in_place(
            aead::Nonce::assume_unique_for_key(nonce),
            aead::Aad::empty(),
            &mut ciphertext,
        )
        .map_err(|_| StreamError::DecryptionFailure)?
        .len();
    ciphertext.truncate(length);
    Ok(ciphertext)
}


#[cfg(test)]
mod encrypt_decrypt {
    use super::*;

    static SHARED_SECRET: &[u8] = &[
        126, 219, 117, 93, 118, 248, 249, 211, 20, 211, 65, 110, 237, 80, 253, 179, 81, 146, 229,
        67, 231, 49, 92, 127, 254, 230, 144, 102, 103, 166, 150, 36,
    ];
    static PLAINTEXT: &[u8] = &[99, 0, 12, 255, 77, 31];
    static CIPHERTEXT: &[u8] = &[
        119, 248, 213, 234, 63, 200, 224, 140, 212, 222, 105, 159, 246, 203, 66, 155, 151, 172,
        68, 24, 76, 232, 90, 10, 237, 146, 189, 73, 248, 196, 177, 108, 115, 223,
    ];
    static NONCE: [u8; NONCE_LEN] = [119, 248, 213, 234, 63, 200, 224, 140, 212, 222, 105, 159];

    #[test]
    fn encrypts_to_the_same_bytes_as_javascript() {
        let key = hmac_sha256(SHARED_SECRET, ENCRYPTION_KEY_STRING);
        let encrypted = encrypt_with_key(&key, BytesMut::from(PLAINTEXT), NONCE);
        assert_eq!(&encrypted[..], CIPHERTEXT);
    }

    #[test]
    fn decrypts_javascript_ciphertext() {
        let decrypted = decrypt(SHARED_SECRET, BytesMut::from(CIPHERTEXT)).unwrap();
        assert_eq!(&decrypted[..], PLAINTEXT);
    }

    #[test]
    fn round_trips_arbitrary_plaintext() {
        let ciphertext = encrypt(SHARED_SECRET, BytesMut::from(PLAINTEXT));
        let decrypted = decrypt(SHARED_SECRET, ciphertext).unwrap();
        assert_eq!(&decrypted[..], PLAINTEXT);
    }

    #[test]
    fn any_flipped_bit_fails_closed() {
        let ciphertext = encrypt(SHARED_SECRET, BytesMut::from(PLAINTEXT));
        for byte in 0..ciphertext.len() {
            let mut tampered = ciphertext.clone();
            tampered[byte] ^= 0x01;
            assert!(
                decrypt(SHARED_SECRET, tampered).is_err(),
                "flip in byte {} went unnoticed",
                byte
            );
        }
    }

    #[test]
    fn truncated_and_wrong_key_inputs_fail() {
        assert!(decrypt(SHARED_SECRET, BytesMut::new()).is_err());
        assert!(decrypt(SHARED_SECRET, BytesMut::from(&CIPHERTEXT[..20])).is_err());
        let other_key = [7u8; 32];
        assert!(decrypt(&other_key, BytesMut::from(CIPHERTEXT)).is_err());
    }

    #[test]
    fn tag_encryption_round_trips_and_is_seed_bound() {
        let seed = [3u8; 32];
        let token = generate_token();
        let ciphertext = encrypt_tag(&seed, &token);
        // The data key and the tag key must differ.
        assert!(decrypt(&seed, ciphertext.clone()).is_err());
        let decrypted = decrypt_tag(&seed, ciphertext).unwrap();
        assert_eq!(&decrypted[..], &token[..]);
    }
}
