//! Bilateral transfer protocol between two directly connected peers.
//!
//! Wire packets ([`packet`]) carry named sub-protocol payloads and a
//! 32-bit request id; the service layer ([`service`]) correlates
//! requests with replies over an abstract duplex byte channel, runs the
//! token auth handshake, and exposes the whole connection through the
//! plugin interface.

#![forbid(unsafe_code)]

mod errors;
pub mod packet;
mod service;
mod subprotocols;

pub use self::errors::{BtpPacketError, BtpTransportError};
pub use self::packet::{
    code_for_name, BtpError, BtpMessage, BtpPacket, BtpResponse, BtpTransfer, ContentType,
    ProtocolData,
};
pub use self::service::{BtpConfig, BtpPlugin, BtpService};
pub use self::subprotocols::{auth_protocol_data, SubProtocols, AUTH, AUTH_TOKEN, CUSTOM, ILP};
