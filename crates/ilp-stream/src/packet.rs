//! STREAM frame codec.
//!
//! A packet's plaintext is a back-to-back sequence of frames, each a
//! one-byte tag followed by its fields, parsed until the buffer is
//! exhausted. There is no per-frame length wrapper, so an unknown tag
//! poisons the rest of the buffer and fails the whole packet.

use bytes::{Bytes, BytesMut};
use ilp_oer::{OerError, Reader, Writer};
use ilp_packet::Address;

use crate::crypto::{decrypt, encrypt};
use crate::error::StreamError;

const SOURCE_ACCOUNT_TAG: u8 = 0x01;
const STREAM_MONEY_TAG: u8 = 0x02;
const STREAM_MONEY_MAX_TAG: u8 = 0x03;
const STREAM_DATA_TAG: u8 = 0x04;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Tells the peer the sender's ILP address.
    SourceAccount { source_account: Address },
    /// Moves `amount` units onto the given stream.
    StreamMoney {
        stream_id: u64,
        amount: u64,
        is_end: bool,
    },
    /// Advertises how much the sender of the frame is willing to
    /// receive on the stream, and how much it has received so far.
    StreamMoneyMax {
        stream_id: u64,
        receive_max: u64,
        total_received: u64,
    },
    /// Carries stream bytes at the given offset.
    StreamData {
        stream_id: u64,
        offset: u64,
        is_end: bool,
        data: Bytes,
    },
}

impl Frame {
    fn write(&self, writer: &mut Writer) {
        match self {
            Frame::SourceAccount { source_account } => {
                writer.write_u8(SOURCE_ACCOUNT_TAG);
                writer.write_var_octet_string(source_account.as_ref());
            }
            Frame::StreamMoney {
                stream_id,
                amount,
                is_end,
            } => {
                writer.write_u8(STREAM_MONEY_TAG);
                writer.write_var_uint(*stream_id);
                writer.write_var_uint(*amount);
                writer.write_u8(u8::from(*is_end));
            }
            Frame::StreamMoneyMax {
                stream_id,
                receive_max,
                total_received,
            } => {
                writer.write_u8(STREAM_MONEY_MAX_TAG);
                writer.write_var_uint(*stream_id);
                writer.write_var_uint(*receive_max);
                writer.write_var_uint(*total_received);
            }
            Frame::StreamData {
                stream_id,
                offset,
                is_end,
                data,
            } => {
                writer.write_u8(STREAM_DATA_TAG);
                writer.write_var_uint(*stream_id);
                writer.write_var_uint(*offset);
                writer.write_u8(u8::from(*is_end));
                writer.write_var_octet_string(data);
            }
        }
    }

    fn read(reader: &mut Reader) -> Result<Frame, StreamError> {
        match reader.read_u8()? {
            SOURCE_ACCOUNT_TAG => {
                let source_account = Address::try_from(reader.read_var_octet_string()?)?;
                Ok(Frame::SourceAccount { source_account })
            }
            STREAM_MONEY_TAG => Ok(Frame::StreamMoney {
                stream_id: reader.read_var_uint()?,
                amount: reader.read_var_uint()?,
                is_end: read_bool(reader)?,
            }),
            STREAM_MONEY_MAX_TAG => Ok(Frame::StreamMoneyMax {
                stream_id: reader.read_var_uint()?,
                receive_max: saturating_read_var_uint(reader)?,
                total_received: saturating_read_var_uint(reader)?,
            }),
            STREAM_DATA_TAG => Ok(Frame::StreamData {
                stream_id: reader.read_var_uint()?,
                offset: reader.read_var_uint()?,
                is_end: read_bool(reader)?,
                data: Bytes::copy_from_slice(reader.read_var_octet_string()?),
            }),
            unknown => Err(StreamError::UnknownFrameType(unknown)),
        }
    }
}

/// A peer advertising a maximum beyond 64 bits means "no limit we can
/// represent"; clamp instead of failing.
fn saturating_read_var_uint(reader: &mut Reader) -> Result<u64, StreamError> {
    match reader.read_var_uint() {
        Ok(value) => Ok(value),
        Err(OerError::VarUintTooLarge(_)) => Ok(u64::MAX),
        Err(err) => Err(err.into()),
    }
}

fn read_bool(reader: &mut Reader) -> Result<bool, StreamError> {
    match reader.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StreamError::InvalidBool(other)),
    }
}

pub fn serialize_frames(frames: &[Frame]) -> Bytes {
    let mut writer = Writer::new();
    for frame in frames {
        frame.write(&mut writer);
    }
    writer.into_bytes()
}

pub fn deserialize_frames(bytes: &[u8]) -> Result<Vec<Frame>, StreamError> {
    let mut reader = Reader::new(bytes);
    let mut frames = Vec::new();
    while !reader.is_empty() {
        frames.push(Frame::read(&mut reader)?);
    }
    Ok(frames)
}

/// Serializes and encrypts a frame sequence for a packet's data field.
pub fn encrypt_frames(shared_secret: &[u8], frames: &[Frame]) -> Bytes {
    encrypt(shared_secret, BytesMut::from(&serialize_frames(frames)[..])).freeze()
}

/// Decrypts a packet's data field and parses it to exhaustion.
pub fn decrypt_frames(shared_secret: &[u8], ciphertext: &[u8]) -> Result<Vec<Frame>, StreamError> {
    let plaintext = decrypt(shared_secret, BytesMut::from(ciphertext))?;
    deserialize_frames(&plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_frames() -> Vec<Frame> {
        vec![
            Frame::SourceAccount {
                source_account: Address::from_str("example.sender").unwrap(),
            },
            Frame::StreamMoney {
                stream_id: 1,
                amount: 107,
                is_end: false,
            },
            Frame::StreamMoneyMax {
                stream_id: 1,
                receive_max: 1_000,
                total_received: 250,
            },
            Frame::StreamData {
                stream_id: 2,
                offset: 16,
                is_end: true,
                data: Bytes::from_static(b"chunk"),
            },
        ]
    }

    #[test]
    fn frames_round_trip() {
        let frames = sample_frames();
        let bytes = serialize_frames(&frames);
        assert_eq!(deserialize_frames(&bytes).unwrap(), frames);
    }

    #[test]
    fn stream_money_encodes_as_documented() {
        let bytes = serialize_frames(&[Frame::StreamMoney {
            stream_id: 1,
            amount: 107,
            is_end: true,
        }]);
        assert_eq!(&bytes[..], &[0x02, 0x01, 0x01, 0x01, 0x6b, 0x01]);
    }

    #[test]
    fn unknown_tag_fails_the_whole_packet() {
        let mut bytes = serialize_frames(&sample_frames()).to_vec();
        bytes.push(0x7f);
        assert!(matches!(
            deserialize_frames(&bytes),
            Err(StreamError::UnknownFrameType(0x7f))
        ));
    }

    #[test]
    fn bool_bytes_other_than_zero_or_one_are_rejected() {
        // StreamMoney with is_end byte 2.
        let bytes = [0x02, 0x01, 0x01, 0x01, 0x6b, 0x02];
        assert!(matches!(
            deserialize_frames(&bytes),
            Err(StreamError::InvalidBool(2))
        ));
    }

    #[test]
    fn truncated_frames_underflow() {
        let bytes = serialize_frames(&sample_frames());
        assert!(deserialize_frames(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn receive_max_saturates_beyond_native_width() {
        // StreamMoneyMax with a 9-byte receive_max (2^64).
        let mut bytes = vec![0x03, 0x01, 0x01];
        bytes.extend_from_slice(&[0x09, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]);
        bytes.extend_from_slice(&[0x01, 0x00]);
        let frames = deserialize_frames(&bytes).unwrap();
        assert_eq!(
            frames,
            vec![Frame::StreamMoneyMax {
                stream_id: 1,
                receive_max: u64::MAX,
                total_received: 0,
            }]
        );
    }

    #[test]
    fn encrypted_frames_round_trip() {
        let secret = [9u8; 32];
        let frames = sample_frames();
        let ciphertext = encrypt_frames(&secret, &frames);
        assert_eq!(decrypt_frames(&secret, &ciphertext).unwrap(), frames);
        assert!(decrypt_frames(&[0u8; 32], &ciphertext).is_err());
    }
}
