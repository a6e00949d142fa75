use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

/// An ILP address: a dot-separated ASCII string naming an endpoint.
///
/// The codec treats addresses as opaque; the only rule enforced here is
/// that every byte is ASCII. Scheme and segment syntax are validated by
/// other layers, not by the wire codec.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Address(Bytes);

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address contains non-ASCII bytes")]
    NonAscii,
}

impl Address {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        // Checked at construction: ASCII is always valid UTF-8.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Appends a `.`-separated segment, e.g. a connection token.
    pub fn with_segment(&self, segment: &str) -> Result<Address, AddressError> {
        let mut joined = Vec::with_capacity(self.0.len() + 1 + segment.len());
        joined.extend_from_slice(&self.0);
        joined.push(b'.');
        joined.extend_from_slice(segment.as_bytes());
        Address::try_from(&joined[..])
    }

    /// The final dot-separated segment, if any.
    pub fn last_segment(&self) -> Option<&str> {
        self.as_str().rsplit('.').next()
    }

    pub fn starts_with(&self, prefix: &Address) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl Default for Address {
    /// The empty address, used where a field is present but unset.
    fn default() -> Self {
        Address(Bytes::new())
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = AddressError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.is_ascii() {
            Ok(Address(Bytes::copy_from_slice(bytes)))
        } else {
            Err(AddressError::NonAscii)
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::try_from(s.as_bytes())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Address({})", self.as_str())
    }
}
