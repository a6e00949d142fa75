//! ILP packet serialization/deserialization.
//!
//! A packet is a tagged variant of {Prepare, Fulfill, Reject} framed as a
//! one-byte type code followed by a length-prefixed contents field. Builders
//! validate every field before a single byte is emitted; parsing dispatches
//! on the leading byte into a closed sum type.

#![forbid(unsafe_code)]

mod address;
mod amount;
mod error;
mod errors;
mod packet;

#[cfg(test)]
pub mod fixtures;

pub use self::address::{Address, AddressError};
pub use self::amount::{Amount, AmountError};
pub use self::error::{ErrorClass, ErrorCode, IlpError};
pub use self::errors::{ParseError, ValidationError};
pub use self::packet::{Fulfill, Packet, PacketType, Prepare, Reject};
pub use self::packet::{FulfillBuilder, PrepareBuilder, RejectBuilder};
