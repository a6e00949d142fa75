use bytes::{BufMut, Bytes, BytesMut};
use num_bigint::BigUint;

use crate::{
    max_uint, predict_var_int_size, predict_var_uint_size, OerError, Result, HIGH_BIT,
};

/// Append-only, growable OER writer.
///
/// The writer owns its backing buffer until [`Writer::into_bytes`] extracts
/// an immutable copy. Every fallible method validates its arguments before
/// emitting a single byte.
#[derive(Debug, Default)]
pub struct Writer {
    buffer: BytesMut,
}

impl Writer {
    pub fn new() -> Self {
        Writer {
            buffer: BytesMut::new(),
        }
    }

    /// Preallocates `capacity` bytes, typically computed by a
    /// [`Predictor`](crate::Predictor) over the same write sequence.
    pub fn with_capacity(capacity: usize) -> Self {
        Writer {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Appends raw bytes with no length prefix.
    pub fn write(&mut self, bytes: &[u8]) {
        self.buffer.put_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    /// Writes `value` big-endian in exactly `len` bytes.
    pub fn write_uint(&mut self, value: u64, len: usize) -> Result<()> {
        match len {
            0 => Err(OerError::InvalidLength(0)),
            1..=7 if value > max_uint(len) => Err(OerError::OutOfRange(len)),
            1..=8 => {
                self.buffer.put_uint(value, len);
                Ok(())
            }
            _ => {
                self.buffer.put_bytes(0, len - 8);
                self.buffer.put_u64(value);
                Ok(())
            }
        }
    }

    /// Writes `value` big-endian two's complement in exactly `len` bytes.
    pub fn write_int(&mut self, value: i64, len: usize) -> Result<()> {
        match len {
            0 => Err(OerError::InvalidLength(0)),
            1..=7 if predict_var_int_size(value) > len => Err(OerError::OutOfRange(len)),
            1..=8 => {
                self.buffer.put_int(value, len);
                Ok(())
            }
            _ => {
                let fill = if value < 0 { 0xff } else { 0x00 };
                self.buffer.put_bytes(fill, len - 8);
                self.buffer.put_i64(value);
                Ok(())
            }
        }
    }

    /// Writes an arbitrary-precision unsigned integer in exactly `len` bytes.
    pub fn write_uint_big(&mut self, value: &BigUint, len: usize) -> Result<()> {
        if len == 0 {
            return Err(OerError::InvalidLength(0));
        }
        let bytes = value.to_bytes_be();
        // BigUint encodes zero as a single 0x00 byte.
        let significant = if bytes == [0] { 0 } else { bytes.len() };
        if significant > len {
            return Err(OerError::OutOfRange(len));
        }
        self.buffer.put_bytes(0, len - significant);
        self.buffer.put_slice(&bytes[bytes.len() - significant..]);
        Ok(())
    }

    /// Writes a minimal-width variable-length unsigned integer.
    pub fn write_var_uint(&mut self, value: u64) {
        let len = predict_var_uint_size(value);
        self.write_var_octet_string_length(len);
        self.buffer.put_uint(value, len);
    }

    /// Writes a minimal-width variable-length two's-complement integer.
    pub fn write_var_int(&mut self, value: i64) {
        let len = predict_var_int_size(value);
        self.write_var_octet_string_length(len);
        self.buffer.put_int(value, len);
    }

    /// Writes a variable-length unsigned integer of arbitrary magnitude.
    pub fn write_var_uint_big(&mut self, value: &BigUint) {
        self.write_var_octet_string(&value.to_bytes_be());
    }

    /// Writes `bytes` with no prefix, failing unless it is exactly `len` long.
    pub fn write_octet_string(&mut self, bytes: &[u8], len: usize) -> Result<()> {
        if bytes.len() != len {
            return Err(OerError::LengthMismatch {
                expected: len,
                actual: bytes.len(),
            });
        }
        self.buffer.put_slice(bytes);
        Ok(())
    }

    /// Writes a length-prefixed octet string.
    pub fn write_var_octet_string(&mut self, bytes: &[u8]) {
        self.write_var_octet_string_length(bytes.len());
        self.buffer.put_slice(bytes);
    }

    /// Writes only the length prefix: one byte for lengths up to 127,
    /// otherwise `0x80 | k` followed by the length in `k` big-endian bytes.
    pub fn write_var_octet_string_length(&mut self, length: usize) {
        if length < 128 {
            self.buffer.put_u8(length as u8);
        } else {
            let length_of_length = predict_var_uint_size(length as u64);
            self.buffer.put_u8(HIGH_BIT | length_of_length as u8);
            self.buffer.put_uint(length as u64, length_of_length);
        }
    }

    /// Extracts the accumulated buffer as an immutable byte string.
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }
}

impl AsRef<[u8]> for Writer {
    fn as_ref(&self) -> &[u8] {
        &self.buffer
    }
}
