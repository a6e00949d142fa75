use ilp_oer::OerError;

use crate::AddressError;

/// Failures while decoding a packet. All of these are fatal to the parse
/// that raised them; nothing is recovered silently.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("OER error: {0}")]
    Oer(#[from] OerError),
    #[error("unexpected packet type {found}, expected {expected}")]
    WrongType { expected: u8, found: u8 },
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("invalid field: {0}")]
    Validation(#[from] crate::ValidationError),
}

/// A caller-supplied field violated a constraint at serialize time.
/// Raised before any byte is emitted.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("execution condition must be exactly 32 bytes, got {0}")]
    ConditionLength(usize),
    #[error("fulfillment must be exactly 32 bytes, got {0}")]
    FulfillmentLength(usize),
    #[error("error code must be exactly 3 ASCII bytes")]
    InvalidErrorCode,
}
