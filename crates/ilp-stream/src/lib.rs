//! Multiplexed, encrypted payment streams on top of ILP packets.
//!
//! A sender and receiver who share a 32-byte secret exchange money and
//! data inside Prepare/Fulfill packets. Everything in the packet data is
//! encrypted end to end; the connectors in between see only amounts,
//! addresses, and conditions. The receiver is stateless across
//! connections: its per-connection secrets are rederived from the
//! destination address of each incoming packet.

#![forbid(unsafe_code)]

mod aging;
mod client;
mod connection;
pub mod crypto;
mod error;
mod flow;
pub mod packet;
mod server;

pub use client::send_money;
pub use connection::{ApplyOutcome, Connection, ConnectionState, Stream, StreamState};
pub use error::StreamError;
pub use flow::RangeSet;
pub use packet::Frame;
pub use server::{ConnectionGenerator, ListenerConfig, StreamListener};

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::time::Duration;

    use ilp_packet::{Address, ErrorCode, Packet};
    use ilp_plugin::{channel_pair, Plugin};

    const SERVER_SECRET: [u8; 32] = [5u8; 32];

    fn receiver_address() -> Address {
        Address::from_str("example.receiver").unwrap()
    }

    fn bind_listener(
        plugin: &impl Plugin,
        default_receive_max: u64,
    ) -> (StreamListener, Address, [u8; 32]) {
        let listener = StreamListener::bind(
            plugin,
            receiver_address(),
            SERVER_SECRET,
            ListenerConfig {
                default_receive_max,
                replay_window: Duration::from_secs(3600),
            },
        )
        .unwrap();
        let (destination, shared_secret) = listener.generate_address_and_secret().unwrap();
        (listener, destination, shared_secret)
    }

    #[tokio::test]
    async fn delivers_the_full_amount() {
        let (sender, receiver) = channel_pair();
        let (listener, destination, shared_secret) = bind_listener(&receiver, u64::MAX);

        let delivered = send_money(&sender, &destination, &shared_secret, 300)
            .await
            .unwrap();
        assert_eq!(delivered, 300);
        assert_eq!(listener.total_received(), 300);
    }

    #[tokio::test]
    async fn stops_at_the_receive_maximum() {
        let (sender, receiver) = channel_pair();
        let (listener, destination, shared_secret) = bind_listener(&receiver, 100);

        let delivered = send_money(&sender, &destination, &shared_secret, 300)
            .await
            .unwrap();
        assert_eq!(delivered, 100);
        assert_eq!(listener.total_received(), 100);

        // A second payment finds the receiver still full.
        let delivered = send_money(&sender, &destination, &shared_secret, 50)
            .await
            .unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(listener.total_received(), 100);
    }

    #[tokio::test]
    async fn consecutive_payments_accumulate() {
        let (sender, receiver) = channel_pair();
        let (listener, destination, shared_secret) = bind_listener(&receiver, u64::MAX);

        for _ in 0..3 {
            send_money(&sender, &destination, &shared_secret, 40)
                .await
                .unwrap();
        }
        assert_eq!(listener.total_received(), 120);
    }

    #[tokio::test]
    async fn zero_amount_is_a_no_op() {
        let (sender, receiver) = channel_pair();
        let (listener, destination, shared_secret) = bind_listener(&receiver, u64::MAX);

        let delivered = send_money(&sender, &destination, &shared_secret, 0)
            .await
            .unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(listener.total_received(), 0);
    }

    #[tokio::test]
    async fn sending_without_the_secret_fails() {
        let (sender, receiver) = channel_pair();
        let (listener, destination, _) = bind_listener(&receiver, u64::MAX);

        let wrong_secret = [0u8; 32];
        let err = send_money(&sender, &destination, &wrong_secret, 100)
            .await
            .unwrap_err();
        match err {
            StreamError::Rejected(reject) => {
                assert_eq!(reject.code, ErrorCode::F06_UNEXPECTED_PAYMENT);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(listener.total_received(), 0);
    }

    #[tokio::test]
    async fn a_replayed_packet_is_paid_once() {
        let (sender, receiver) = channel_pair();
        let (listener, destination, shared_secret) = bind_listener(&receiver, u64::MAX);

        // Build one valid packet by hand and send the identical bytes
        // twice.
        let frames = [Frame::StreamMoney {
            stream_id: 1,
            amount: 75,
            is_end: false,
        }];
        let data = packet::encrypt_frames(&shared_secret, &frames);
        let condition = crypto::generate_condition(&shared_secret, &data);
        let prepare = ilp_packet::PrepareBuilder {
            amount: ilp_packet::Amount::from(75),
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(30),
            execution_condition: &condition,
            destination,
            data: &data,
        }
        .build()
        .unwrap()
        .serialize();

        let first = sender.send_data(prepare.clone()).await.unwrap();
        assert!(matches!(
            Packet::deserialize(&first).unwrap(),
            Packet::Fulfill(_)
        ));

        let second = sender.send_data(prepare).await.unwrap();
        match Packet::deserialize(&second).unwrap() {
            Packet::Reject(reject) => {
                assert_eq!(reject.code(), ErrorCode::F99_APPLICATION_ERROR)
            }
            other => panic!("replay was not rejected: {:?}", other),
        }
        assert_eq!(listener.total_received(), 75);
    }
}
