use ilp_oer::OerError;

use crate::packet::BtpError;

/// Failures while decoding a BTP packet. Packets are framed strictly:
/// a parse that leaves bytes unconsumed is an error, not a success.
#[derive(Debug, thiserror::Error)]
pub enum BtpPacketError {
    #[error("OER error: {0}")]
    Oer(#[from] OerError),
    #[error("unknown BTP packet type {0}")]
    UnknownType(u8),
    #[error("unexpected BTP packet type {found}, expected {expected}")]
    UnexpectedType { expected: u8, found: u8 },
    #[error("trailing bytes after packet contents")]
    TrailingBytes,
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of a request/response exchange over an established
/// connection.
#[derive(Debug, thiserror::Error)]
pub enum BtpTransportError {
    #[error("request {0} timed out waiting for a response")]
    Timeout(u32),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("peer returned error {code} {name}: {data}", code = .0.code, name = .0.name, data = .0.data)]
    Peer(BtpError),
    #[error("authentication failed: {0}")]
    Unauthorized(String),
    #[error("malformed packet: {0}")]
    Packet(#[from] BtpPacketError),
}
