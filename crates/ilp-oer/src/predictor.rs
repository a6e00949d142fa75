use num_bigint::BigUint;

use crate::{
    max_uint, predict_var_int_size, predict_var_octet_string, predict_var_uint_size, OerError,
    Result,
};

/// Mirrors the [`Writer`](crate::Writer) method surface while accumulating
/// only a byte count.
///
/// Used in the two-pass sizing protocol: run the intended write sequence
/// through a predictor, allocate a writer of exactly
/// [`Predictor::predicted_size`], then write for real without reallocation.
/// Validation matches the writer so a sequence that predicts cleanly also
/// writes cleanly.
#[derive(Debug, Default, Clone, Copy)]
pub struct Predictor {
    size: usize,
}

impl Predictor {
    pub fn new() -> Self {
        Predictor { size: 0 }
    }

    pub fn predicted_size(&self) -> usize {
        self.size
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.size += bytes.len();
    }

    pub fn write_u8(&mut self, _value: u8) {
        self.size += 1;
    }

    pub fn write_uint(&mut self, value: u64, len: usize) -> Result<()> {
        match len {
            0 => Err(OerError::InvalidLength(0)),
            1..=7 if value > max_uint(len) => Err(OerError::OutOfRange(len)),
            _ => {
                self.size += len;
                Ok(())
            }
        }
    }

    pub fn write_int(&mut self, value: i64, len: usize) -> Result<()> {
        match len {
            0 => Err(OerError::InvalidLength(0)),
            1..=7 if predict_var_int_size(value) > len => Err(OerError::OutOfRange(len)),
            _ => {
                self.size += len;
                Ok(())
            }
        }
    }

    pub fn write_uint_big(&mut self, value: &BigUint, len: usize) -> Result<()> {
        if len == 0 {
            return Err(OerError::InvalidLength(0));
        }
        if value.bits().div_ceil(8) as usize > len {
            return Err(OerError::OutOfRange(len));
        }
        self.size += len;
        Ok(())
    }

    pub fn write_var_uint(&mut self, value: u64) {
        self.size += predict_var_octet_string(predict_var_uint_size(value));
    }

    pub fn write_var_int(&mut self, value: i64) {
        self.size += predict_var_octet_string(predict_var_int_size(value));
    }

    pub fn write_var_uint_big(&mut self, value: &BigUint) {
        let len = (value.bits().div_ceil(8) as usize).max(1);
        self.size += predict_var_octet_string(len);
    }

    pub fn write_octet_string(&mut self, bytes: &[u8], len: usize) -> Result<()> {
        if bytes.len() != len {
            return Err(OerError::LengthMismatch {
                expected: len,
                actual: bytes.len(),
            });
        }
        self.size += len;
        Ok(())
    }

    pub fn write_var_octet_string(&mut self, bytes: &[u8]) {
        self.size += predict_var_octet_string(bytes.len());
    }

    pub fn write_var_octet_string_length(&mut self, length: usize) {
        if length < 128 {
            self.size += 1;
        } else {
            self.size += 1 + predict_var_uint_size(length as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Writer;

    #[test]
    fn predicts_exactly_what_the_writer_emits() {
        let mut predictor = Predictor::new();
        let mut writer = Writer::new();
        let long = vec![0xab; 300];

        predictor.write_u8(0x0c);
        writer.write_u8(0x0c);
        predictor.write_uint(u64::MAX, 8).unwrap();
        writer.write_uint(u64::MAX, 8).unwrap();
        predictor.write_int(-40_000, 3).unwrap();
        writer.write_int(-40_000, 3).unwrap();
        predictor.write_var_uint(70_000);
        writer.write_var_uint(70_000);
        predictor.write_var_int(-70_000);
        writer.write_var_int(-70_000);
        predictor.write_octet_string(b"12345", 5).unwrap();
        writer.write_octet_string(b"12345", 5).unwrap();
        predictor.write_var_octet_string(&long);
        writer.write_var_octet_string(&long);
        predictor.write(b"raw");
        writer.write(b"raw");

        assert_eq!(predictor.predicted_size(), writer.len());
    }

    #[test]
    fn predicts_big_uints() {
        let value = BigUint::parse_bytes(b"340282366920938463463374607431768211455", 10).unwrap();

        let mut predictor = Predictor::new();
        let mut writer = Writer::new();
        predictor.write_var_uint_big(&value);
        writer.write_var_uint_big(&value);
        predictor.write_uint_big(&value, 20).unwrap();
        writer.write_uint_big(&value, 20).unwrap();
        assert_eq!(predictor.predicted_size(), writer.len());

        let mut predictor = Predictor::new();
        predictor.write_var_uint_big(&BigUint::from(0u8));
        assert_eq!(predictor.predicted_size(), 2);
    }

    #[test]
    fn rejects_like_the_writer() {
        let mut predictor = Predictor::new();
        assert_eq!(predictor.write_uint(256, 1), Err(OerError::OutOfRange(1)));
        assert_eq!(
            predictor.write_octet_string(b"ab", 3),
            Err(OerError::LengthMismatch {
                expected: 3,
                actual: 2,
            })
        );
        assert_eq!(predictor.predicted_size(), 0);
    }
}
