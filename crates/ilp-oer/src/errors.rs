#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum OerError {
    #[error("unexpected end of buffer")]
    Underflow,
    #[error("integer does not fit in {0} byte(s)")]
    OutOfRange(usize),
    #[error("field length of {0} bytes is invalid")]
    InvalidLength(usize),
    #[error("length prefix of {0} bytes is too large")]
    LengthPrefixTooLarge(usize),
    #[error("expected exactly {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("zero-length variable-length integer")]
    EmptyVarUint,
    #[error("variable-length integer of {0} bytes does not fit a native word")]
    VarUintTooLarge(usize),
    #[error("restore without a matching bookmark")]
    NoBookmark,
}
