//! Shared test vectors: one packet of each kind together with its exact
//! wire encoding, so codec tests check real bytes rather than just
//! round-trip symmetry.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;

use crate::{
    Address, Amount, ErrorCode, Fulfill, FulfillBuilder, Prepare, PrepareBuilder, Reject,
    RejectBuilder,
};

pub static EXPIRES_AT: Lazy<DateTime<Utc>> = Lazy::new(|| {
    NaiveDate::from_ymd_opt(2018, 6, 7)
        .unwrap()
        .and_hms_milli_opt(20, 48, 42, 101)
        .unwrap()
        .and_utc()
});

pub fn condition() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = i as u8;
    }
    bytes
}

pub fn fulfillment() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = 0x40 + i as u8;
    }
    bytes
}

pub fn data() -> Vec<u8> {
    (0xe0..=0xff).collect()
}

// Envelope: type 12, contents 104 bytes. Amount 107, expiry
// 20180607204842101, condition 0x00..0x1f, destination "example.alice",
// data 0xe0..0xff.
const PREPARE_HEX: &str = "0c68\
    000000000000006b\
    3230313830363037323034383432313031\
    000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f\
    0d6578616d706c652e616c696365\
    20e0e1e2e3e4e5e6e7e8e9eaebecedeeeff0f1f2f3f4f5f6f7f8f9fafbfcfdfeff";

// Type 13, contents 65 bytes. Fulfillment 0x40..0x5f, data 0xe0..0xff.
const FULFILL_HEX: &str = "0d41\
    404142434445464748494a4b4c4d4e4f505152535455565758595a5b5c5d5e5f\
    20e0e1e2e3e4e5e6e7e8e9eaebecedeeeff0f1f2f3f4f5f6f7f8f9fafbfcfdfeff";

// Type 14, contents 35 bytes. Code F99, triggered by
// "example.connector", message "rejected", data deadbeef.
const REJECT_HEX: &str = "0e23\
    463939\
    116578616d706c652e636f6e6e6563746f72\
    0872656a6563746564\
    04deadbeef";

fn decode(hex_str: &str) -> Vec<u8> {
    hex::decode(hex_str.replace(char::is_whitespace, "")).unwrap()
}

pub fn prepare_bytes() -> Vec<u8> {
    decode(PREPARE_HEX)
}

pub fn fulfill_bytes() -> Vec<u8> {
    decode(FULFILL_HEX)
}

pub fn reject_bytes() -> Vec<u8> {
    decode(REJECT_HEX)
}

pub static PREPARE: Lazy<Prepare> = Lazy::new(|| {
    PrepareBuilder {
        amount: Amount::new(107),
        expires_at: *EXPIRES_AT,
        execution_condition: &condition(),
        destination: Address::from_str("example.alice").unwrap(),
        data: &data(),
    }
    .build()
    .unwrap()
});

pub static FULFILL: Lazy<Fulfill> = Lazy::new(|| {
    FulfillBuilder {
        fulfillment: &fulfillment(),
        data: &data(),
    }
    .build()
    .unwrap()
});

pub static REJECT: Lazy<Reject> = Lazy::new(|| {
    RejectBuilder {
        code: ErrorCode::F99_APPLICATION_ERROR,
        triggered_by: Some(&Address::from_str("example.connector").unwrap()),
        message: "rejected",
        data: &[0xde, 0xad, 0xbe, 0xef],
    }
    .build()
});
