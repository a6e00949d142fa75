use std::fmt;
use std::str::FromStr;

/// A transfer amount, exchanged as a decimal string at API boundaries.
///
/// The wire field is 8 bytes, so the internal representation is a `u64`,
/// which is exact over the full unsigned-64-bit range the protocol
/// requires. Conversion to and from decimal strings happens only here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount string is empty")]
    Empty,
    #[error("amount must be a non-negative integer string")]
    InvalidDigit,
    #[error("amount exceeds the unsigned 64-bit range")]
    Overflow,
}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn new(value: u64) -> Self {
        Amount(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        let mut value: u64 = 0;
        for byte in s.bytes() {
            if !byte.is_ascii_digit() {
                return Err(AmountError::InvalidDigit);
            }
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(byte - b'0')))
                .ok_or(AmountError::Overflow)?;
        }
        Ok(Amount(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(value)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}
