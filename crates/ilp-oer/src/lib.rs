//! OER (Octet Encoding Rules) primitives shared by every layer of the ILP
//! protocol stack: fixed-width big-endian integers, minimal-width variable
//! integers and length-prefixed octet strings.
//!
//! Serialization is a two-pass protocol: a [`Predictor`] mirrors the
//! [`Writer`] surface but only counts bytes, so callers can size a buffer
//! exactly before writing for real. A [`Reader`] borrows an immutable view
//! and supports speculative lookahead through a LIFO bookmark stack.

#![forbid(unsafe_code)]

mod errors;
mod predictor;
mod reader;
mod writer;

pub use self::errors::OerError;
pub use self::predictor::Predictor;
pub use self::reader::Reader;
pub use self::writer::Writer;

pub type Result<T, E = OerError> = core::result::Result<T, E>;

pub(crate) const HIGH_BIT: u8 = 0x80;
pub(crate) const LOWER_SEVEN_BITS: u8 = 0x7f;

/// Largest value that fits in `len` bytes, for `1 <= len <= 8`.
pub(crate) fn max_uint(len: usize) -> u64 {
    debug_assert!((1..=8).contains(&len));
    u64::MAX >> (64 - 8 * len)
}

/// Minimum number of bytes needed to encode `value` as an unsigned integer.
pub fn predict_var_uint_size(value: u64) -> usize {
    for len in 1..=8 {
        if value <= max_uint(len) {
            return len;
        }
    }
    unreachable!()
}

/// Minimum number of bytes needed to encode `value` in two's complement.
pub fn predict_var_int_size(value: i64) -> usize {
    for len in 1..8 {
        let max = (1i64 << (8 * len - 1)) - 1;
        let min = -(1i64 << (8 * len - 1));
        if value >= min && value <= max {
            return len;
        }
    }
    8
}

/// Size of the buffer that encodes a var-octet-string of `length` bytes,
/// including the length prefix.
pub fn predict_var_octet_string(length: usize) -> usize {
    if length < 128 {
        1 + length
    } else {
        1 + predict_var_uint_size(length as u64) + length
    }
}
