//! The receiving side: stateless address generation plus a listener
//! that fulfills incoming packets.
//!
//! The listener holds no per-sender setup. Every secret it needs is
//! rederived from the packet's destination address, so a receiver can
//! hand out any number of addresses and forget them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use ilp_packet::{
    Address, ErrorCode, Fulfill, FulfillBuilder, Prepare, Reject, RejectBuilder,
};
use ilp_plugin::Plugin;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use ring::constant_time::verify_slices_are_equal;

use crate::aging::AgingSet;
use crate::connection::Connection;
use crate::crypto;
use crate::error::StreamError;
use crate::packet::{decrypt_frames, encrypt_frames};

/// Derives per-connection secrets from a single server seed, and gets
/// them back out of addresses it previously generated.
#[derive(Clone)]
pub struct ConnectionGenerator {
    source_account: Address,
    server_secret: [u8; 32],
}

impl ConnectionGenerator {
    pub fn new(source_account: Address, server_secret: [u8; 32]) -> Self {
        ConnectionGenerator {
            source_account,
            server_secret,
        }
    }

    pub fn source_account(&self) -> &Address {
        &self.source_account
    }

    /// Mints a fresh destination address and its shared secret.
    ///
    /// The address carries the connection token encrypted under a
    /// seed-derived key, so only this generator can recover it. The
    /// address itself reveals nothing about the shared secret.
    pub fn generate_address_and_secret(&self) -> Result<(Address, [u8; 32]), StreamError> {
        let token = crypto::generate_token();
        let shared_secret = self.derive_secret(&token);
        let tag = base64::encode_config(
            &crypto::encrypt_tag(&self.server_secret, &token),
            base64::URL_SAFE_NO_PAD,
        );
        let destination = self.source_account.with_segment(&tag)?;
        Ok((destination, shared_secret))
    }

    /// Recovers the shared secret for an address this generator minted.
    /// Fails for addresses minted under a different seed or mangled in
    /// transit.
    pub fn rederive_secret(&self, destination: &Address) -> Result<[u8; 32], StreamError> {
        let tag = destination
            .last_segment()
            .ok_or(StreamError::InvalidAddressToken)?;
        let ciphertext = base64::decode_config(tag, base64::URL_SAFE_NO_PAD)
            .map_err(|_| StreamError::InvalidAddressToken)?;
        let token = crypto::decrypt_tag(&self.server_secret, BytesMut::from(&ciphertext[..]))
            .map_err(|_| StreamError::InvalidAddressToken)?;
        if token.len() != crypto::TOKEN_LEN {
            return Err(StreamError::InvalidAddressToken);
        }
        Ok(self.derive_secret(&token))
    }

    fn derive_secret(&self, token: &[u8]) -> [u8; 32] {
        let generator = crypto::generate_secret_generator(&self.server_secret);
        crypto::derive_shared_secret(&generator, token)
    }
}

pub struct ListenerConfig {
    /// Receive maximum for streams the sender never raised explicitly.
    pub default_receive_max: u64,
    /// How long fulfilled conditions are remembered for replay
    /// detection. Must cover the longest packet expiry in use.
    pub replay_window: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            default_receive_max: u64::MAX,
            replay_window: Duration::from_secs(60),
        }
    }
}

struct ListenerState {
    generator: ConnectionGenerator,
    default_receive_max: u64,
    connections: Mutex<HashMap<String, Connection>>,
    seen_conditions: Mutex<AgingSet<[u8; 32]>>,
}

/// Fulfills STREAM packets arriving over a plugin.
///
/// Binding registers the listener as the plugin's data handler; every
/// incoming Prepare is answered with a Fulfill or a Reject.
pub struct StreamListener {
    state: Arc<ListenerState>,
}

impl StreamListener {
    pub fn bind<P: Plugin + ?Sized>(
        plugin: &P,
        source_account: Address,
        server_secret: [u8; 32],
        config: ListenerConfig,
    ) -> Result<StreamListener, StreamError> {
        let state = Arc::new(ListenerState {
            generator: ConnectionGenerator::new(source_account, server_secret),
            default_receive_max: config.default_receive_max,
            connections: Mutex::new(HashMap::new()),
            seen_conditions: Mutex::new(AgingSet::new(config.replay_window)),
        });

        let handler_state = state.clone();
        plugin.register_data_handler(Arc::new(move |data: Bytes| {
            let state = handler_state.clone();
            async move { Ok(state.handle_prepare(&data)) }.boxed()
        }))?;

        Ok(StreamListener { state })
    }

    pub fn generate_address_and_secret(&self) -> Result<(Address, [u8; 32]), StreamError> {
        self.state.generator.generate_address_and_secret()
    }

    pub fn source_account(&self) -> &Address {
        self.state.generator.source_account()
    }

    /// Total money accepted across all connections.
    pub fn total_received(&self) -> u64 {
        self.state
            .connections
            .lock()
            .values()
            .fold(0u64, |acc, connection| {
                acc.saturating_add(connection.total_received())
            })
    }
}

impl ListenerState {
    fn handle_prepare(&self, bytes: &[u8]) -> Bytes {
        match self.receive_money(bytes) {
            Ok(fulfill) => fulfill.serialize(),
            Err(reject) => reject.serialize(),
        }
    }

    fn receive_money(&self, bytes: &[u8]) -> Result<Fulfill, Reject> {
        let prepare = Prepare::deserialize(bytes).map_err(|err| {
            debug!("got an unparseable prepare: {}", err);
            self.reject(ErrorCode::F01_INVALID_PACKET, "could not parse packet", &[])
        })?;

        let shared_secret = self
            .generator
            .rederive_secret(prepare.destination())
            .map_err(|_| {
                debug!(
                    "got a prepare for an address that is not ours: {}",
                    prepare.destination()
                );
                self.reject(ErrorCode::F02_UNREACHABLE, "no connection for this address", &[])
            })?;

        // A fulfilled condition must never be fulfilled twice, or an
        // upstream party could collect the same payment repeatedly.
        // Rejected packets do not consume their condition; the sender
        // may retry them verbatim.
        if self
            .seen_conditions
            .lock()
            .contains(prepare.execution_condition())
        {
            warn!(
                "dropping replayed packet for {}",
                prepare.destination()
            );
            return Err(self.reject(ErrorCode::F99_APPLICATION_ERROR, "replayed packet", &[]));
        }

        let frames = decrypt_frames(&shared_secret, prepare.data()).map_err(|_| {
            debug!("unable to decrypt data from {}", prepare.destination());
            self.reject(ErrorCode::F06_UNEXPECTED_PAYMENT, "unable to decrypt data", &[])
        })?;

        let fulfillment = crypto::generate_fulfillment(&shared_secret, prepare.data());
        let condition = crypto::hash_sha256(&fulfillment);
        if verify_slices_are_equal(&condition, prepare.execution_condition()).is_err() {
            debug!("condition does not match for {}", prepare.destination());
            return Err(self.reject(
                ErrorCode::F05_WRONG_CONDITION,
                "condition does not match data",
                &[],
            ));
        }

        let tag = prepare
            .destination()
            .last_segment()
            .unwrap_or_default()
            .to_string();
        let mut connections = self.connections.lock();
        let connection = connections
            .entry(tag)
            .or_insert_with(|| Connection::new(self.default_receive_max));

        match connection.apply_frames(&frames) {
            Ok(outcome) => {
                trace!(
                    "accepted {} on {} ({} total)",
                    outcome.money_received,
                    prepare.destination(),
                    connection.total_received()
                );
                self.seen_conditions
                    .lock()
                    .insert(*prepare.execution_condition());
                let data = encrypt_frames(&shared_secret, &connection.advertisement());
                Ok(FulfillBuilder {
                    fulfillment: &fulfillment,
                    data: &data,
                }
                .build()
                .expect("fulfillment is 32 bytes by construction"))
            }
            Err(err) => {
                debug!("rejecting {}: {}", prepare.destination(), err);
                // Tell the sender how much room is actually left so it
                // can retry with a smaller amount.
                let data = encrypt_frames(&shared_secret, &connection.advertisement());
                Err(self.reject(
                    ErrorCode::F99_APPLICATION_ERROR,
                    "exceeded the receive maximum",
                    &data,
                ))
            }
        }
    }

    fn reject(&self, code: ErrorCode, message: &str, data: &[u8]) -> Reject {
        RejectBuilder {
            code,
            triggered_by: Some(self.generator.source_account()),
            message,
            data,
        }
        .build()
    }
}
