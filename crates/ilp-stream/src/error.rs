use ilp_oer::OerError;
use ilp_packet::{AddressError, IlpError, ParseError, ValidationError};
use ilp_plugin::PluginError;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Tag mismatch, truncation, or wrong key. No partial plaintext is
    /// ever returned.
    #[error("failed to decrypt data")]
    DecryptionFailure,
    #[error("frame parse error: {0}")]
    Frame(#[from] OerError),
    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),
    #[error("invalid boolean byte {0}")]
    InvalidBool(u8),
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),
    #[error("address token is not one of ours")]
    InvalidAddressToken,
    #[error("stream {0} would exceed its receive maximum")]
    ExceedsReceiveMax(u64),
    #[error("receive maximum may not decrease")]
    ReceiveMaxDecreased,
    #[error("connection is closed")]
    ConnectionClosed,
    #[error("fulfillment does not match the sent condition")]
    InvalidFulfillment,
    #[error("unexpected response packet")]
    UnexpectedPacket,
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),
    #[error("packet error: {0}")]
    Packet(#[from] ParseError),
    #[error("packet field error: {0}")]
    Validation(#[from] ValidationError),
    #[error("packet rejected: {0}")]
    Rejected(IlpError),
}
