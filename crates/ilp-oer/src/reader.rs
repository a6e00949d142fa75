use num_bigint::BigUint;

use crate::{OerError, Result, HIGH_BIT, LOWER_SEVEN_BITS};

/// Cursor-based OER reader over a borrowed byte slice.
///
/// `peek_*` methods never advance the cursor and `skip_*` methods advance
/// without materializing bytes. [`Reader::bookmark`] / [`Reader::restore`]
/// push and pop cursor positions for speculative lookahead.
#[derive(Debug)]
pub struct Reader<'a> {
    buffer: &'a [u8],
    cursor: usize,
    bookmarks: Vec<usize>,
}

impl<'a> Reader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Reader {
            buffer,
            cursor: 0,
            bookmarks: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Fails with [`OerError::Underflow`] if fewer than `n` bytes remain.
    pub fn ensure_available(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            Err(OerError::Underflow)
        } else {
            Ok(())
        }
    }

    /// Saves the current cursor position on the bookmark stack.
    pub fn bookmark(&mut self) {
        self.bookmarks.push(self.cursor);
    }

    /// Rewinds to the most recent bookmark.
    pub fn restore(&mut self) -> Result<()> {
        self.cursor = self.bookmarks.pop().ok_or(OerError::NoBookmark)?;
        Ok(())
    }

    /// Reads `n` raw bytes, advancing the cursor.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure_available(n)?;
        let bytes = &self.buffer[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(bytes)
    }

    /// Returns the next `n` bytes without advancing.
    pub fn peek(&self, n: usize) -> Result<&'a [u8]> {
        self.ensure_available(n)?;
        Ok(&self.buffer[self.cursor..self.cursor + n])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn peek_u8(&self) -> Result<u8> {
        Ok(self.peek(1)?[0])
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure_available(n)?;
        self.cursor += n;
        Ok(())
    }

    /// Reads a big-endian unsigned integer of exactly `len` bytes.
    pub fn read_uint(&mut self, len: usize) -> Result<u64> {
        if len == 0 {
            return Err(OerError::InvalidLength(0));
        }
        if len > 8 {
            return Err(OerError::VarUintTooLarge(len));
        }
        let bytes = self.read(len)?;
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    /// Reads a big-endian two's-complement integer of exactly `len` bytes.
    pub fn read_int(&mut self, len: usize) -> Result<i64> {
        if len == 0 {
            return Err(OerError::InvalidLength(0));
        }
        if len > 8 {
            return Err(OerError::VarUintTooLarge(len));
        }
        let bytes = self.read(len)?;
        let mut acc = if bytes[0] & HIGH_BIT != 0 { u64::MAX } else { 0 };
        for b in bytes {
            acc = (acc << 8) | u64::from(*b);
        }
        Ok(acc as i64)
    }

    /// Reads a big-endian unsigned integer of any width.
    pub fn read_uint_big(&mut self, len: usize) -> Result<BigUint> {
        Ok(BigUint::from_bytes_be(self.read(len)?))
    }

    /// Reads a length prefix, mirroring the writer's rule exactly.
    pub fn read_length_prefix(&mut self) -> Result<usize> {
        let first = self.read_u8()?;
        if first & HIGH_BIT == 0 {
            return Ok(first as usize);
        }
        let length_of_length = (first & LOWER_SEVEN_BITS) as usize;
        if length_of_length == 0 || length_of_length > 8 {
            return Err(OerError::LengthPrefixTooLarge(length_of_length));
        }
        Ok(self.read_uint(length_of_length)? as usize)
    }

    pub fn read_var_octet_string(&mut self) -> Result<&'a [u8]> {
        let length = self.read_length_prefix()?;
        self.read(length)
    }

    /// Decodes the next var-octet-string without moving the cursor.
    pub fn peek_var_octet_string(&mut self) -> Result<&'a [u8]> {
        let saved = self.cursor;
        let result = self.read_var_octet_string();
        self.cursor = saved;
        result
    }

    pub fn skip_var_octet_string(&mut self) -> Result<()> {
        let length = self.read_length_prefix()?;
        self.skip(length)
    }

    /// Reads a variable-length unsigned integer into a native word.
    pub fn read_var_uint(&mut self) -> Result<u64> {
        let bytes = self.read_var_octet_string()?;
        match bytes.len() {
            0 => Err(OerError::EmptyVarUint),
            len if len > 8 => Err(OerError::VarUintTooLarge(len)),
            _ => Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))),
        }
    }

    /// Reads a variable-length two's-complement integer into a native word.
    pub fn read_var_int(&mut self) -> Result<i64> {
        let bytes = self.read_var_octet_string()?;
        match bytes.len() {
            0 => Err(OerError::EmptyVarUint),
            len if len > 8 => Err(OerError::VarUintTooLarge(len)),
            _ => {
                let mut acc = if bytes[0] & HIGH_BIT != 0 { u64::MAX } else { 0 };
                for b in bytes {
                    acc = (acc << 8) | u64::from(*b);
                }
                Ok(acc as i64)
            }
        }
    }

    /// Reads a variable-length unsigned integer of arbitrary magnitude.
    pub fn read_var_uint_big(&mut self) -> Result<BigUint> {
        let bytes = self.read_var_octet_string()?;
        if bytes.is_empty() {
            return Err(OerError::EmptyVarUint);
        }
        Ok(BigUint::from_bytes_be(bytes))
    }
}
