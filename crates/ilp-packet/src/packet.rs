use std::convert::TryFrom;

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use ilp_oer::{predict_var_octet_string, Predictor, Reader, Writer};

use crate::{Address, Amount, ErrorCode, IlpError, ParseError, ValidationError};

/// Timestamps are exchanged as fixed 17-character strings,
/// e.g. `20180607204842101` for 2018-06-07T20:48:42.101Z.
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";
const TIMESTAMP_LEN: usize = 17;

const CONDITION_LEN: usize = 32;
const FULFILLMENT_LEN: usize = 32;
const ERROR_CODE_LEN: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Prepare = 12,
    Fulfill = 13,
    Reject = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = ParseError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            12 => Ok(PacketType::Prepare),
            13 => Ok(PacketType::Fulfill),
            14 => Ok(PacketType::Reject),
            other => Err(ParseError::UnknownPacketType(other)),
        }
    }
}

/// Any of the three packet variants, parsed by dispatching on the type byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    Prepare(Prepare),
    Fulfill(Fulfill),
    Reject(Reject),
}

impl Packet {
    pub fn deserialize(bytes: &[u8]) -> Result<Packet, ParseError> {
        let reader = Reader::new(bytes);
        match PacketType::try_from(reader.peek_u8()?)? {
            PacketType::Prepare => Prepare::deserialize(bytes).map(Packet::Prepare),
            PacketType::Fulfill => Fulfill::deserialize(bytes).map(Packet::Fulfill),
            PacketType::Reject => Reject::deserialize(bytes).map(Packet::Reject),
        }
    }

    pub fn serialize(&self) -> Bytes {
        match self {
            Packet::Prepare(prepare) => prepare.serialize(),
            Packet::Fulfill(fulfill) => fulfill.serialize(),
            Packet::Reject(reject) => reject.serialize(),
        }
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Prepare(_) => PacketType::Prepare,
            Packet::Fulfill(_) => PacketType::Fulfill,
            Packet::Reject(_) => PacketType::Reject,
        }
    }
}

impl From<Prepare> for Packet {
    fn from(prepare: Prepare) -> Self {
        Packet::Prepare(prepare)
    }
}

impl From<Fulfill> for Packet {
    fn from(fulfill: Fulfill) -> Self {
        Packet::Fulfill(fulfill)
    }
}

impl From<Reject> for Packet {
    fn from(reject: Reject) -> Self {
        Packet::Reject(reject)
    }
}

/// Reads the envelope: checks the type byte and unwraps the
/// length-prefixed contents field. Trailing bytes after the contents are
/// ignored, matching how intermediaries treat padded packets.
fn read_contents(bytes: &[u8], expected: PacketType) -> Result<&[u8], ParseError> {
    let mut reader = Reader::new(bytes);
    let found = reader.read_u8()?;
    if found != expected as u8 {
        return Err(ParseError::WrongType {
            expected: expected as u8,
            found,
        });
    }
    Ok(reader.read_var_octet_string()?)
}

fn write_envelope(packet_type: PacketType, content_len: usize) -> Writer {
    let mut writer = Writer::with_capacity(1 + predict_var_octet_string(content_len));
    writer.write_u8(packet_type as u8);
    writer.write_var_octet_string_length(content_len);
    writer
}

/// A conditional transfer request, fulfilled by the preimage of its
/// execution condition before `expires_at` or not at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prepare {
    amount: Amount,
    expires_at: DateTime<Utc>,
    execution_condition: [u8; CONDITION_LEN],
    destination: Address,
    data: Bytes,
}

#[derive(Clone, Debug)]
pub struct PrepareBuilder<'a> {
    pub amount: Amount,
    pub expires_at: DateTime<Utc>,
    pub execution_condition: &'a [u8],
    pub destination: Address,
    pub data: &'a [u8],
}

impl PrepareBuilder<'_> {
    pub fn build(&self) -> Result<Prepare, ValidationError> {
        let execution_condition = <[u8; CONDITION_LEN]>::try_from(self.execution_condition)
            .map_err(|_| ValidationError::ConditionLength(self.execution_condition.len()))?;
        Ok(Prepare {
            amount: self.amount,
            expires_at: self.expires_at,
            execution_condition,
            destination: self.destination.clone(),
            data: Bytes::copy_from_slice(self.data),
        })
    }
}

impl Prepare {
    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn execution_condition(&self) -> &[u8; CONDITION_LEN] {
        &self.execution_condition
    }

    pub fn destination(&self) -> &Address {
        &self.destination
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn serialize(&self) -> Bytes {
        let timestamp = self.expires_at.format(TIMESTAMP_FORMAT).to_string();
        let mut predictor = Predictor::new();
        predictor.write(&u64::from(self.amount).to_be_bytes());
        predictor.write(timestamp.as_bytes());
        predictor.write(&self.execution_condition);
        predictor.write_var_octet_string(self.destination.as_ref());
        predictor.write_var_octet_string(&self.data);

        let mut writer = write_envelope(PacketType::Prepare, predictor.predicted_size());
        writer.write(&u64::from(self.amount).to_be_bytes());
        writer.write(timestamp.as_bytes());
        writer.write(&self.execution_condition);
        writer.write_var_octet_string(self.destination.as_ref());
        writer.write_var_octet_string(&self.data);
        writer.into_bytes()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Prepare, ParseError> {
        let contents = read_contents(bytes, PacketType::Prepare)?;
        let mut reader = Reader::new(contents);

        let amount = Amount::new(reader.read_uint(8)?);
        let timestamp = std::str::from_utf8(reader.read(TIMESTAMP_LEN)?)?;
        let expires_at = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)?.and_utc();
        let mut execution_condition = [0u8; CONDITION_LEN];
        execution_condition.copy_from_slice(reader.read(CONDITION_LEN)?);
        let destination = Address::try_from(reader.read_var_octet_string()?)?;
        let data = Bytes::copy_from_slice(reader.read_var_octet_string()?);

        Ok(Prepare {
            amount,
            expires_at,
            execution_condition,
            destination,
            data,
        })
    }
}

/// Proof of delivery: the 32-byte preimage whose SHA-256 hash equals the
/// execution condition of the Prepare it answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fulfill {
    fulfillment: [u8; FULFILLMENT_LEN],
    data: Bytes,
}

#[derive(Clone, Debug)]
pub struct FulfillBuilder<'a> {
    pub fulfillment: &'a [u8],
    pub data: &'a [u8],
}

impl FulfillBuilder<'_> {
    pub fn build(&self) -> Result<Fulfill, ValidationError> {
        let fulfillment = <[u8; FULFILLMENT_LEN]>::try_from(self.fulfillment)
            .map_err(|_| ValidationError::FulfillmentLength(self.fulfillment.len()))?;
        Ok(Fulfill {
            fulfillment,
            data: Bytes::copy_from_slice(self.data),
        })
    }
}

impl Fulfill {
    pub fn fulfillment(&self) -> &[u8; FULFILLMENT_LEN] {
        &self.fulfillment
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn serialize(&self) -> Bytes {
        let mut predictor = Predictor::new();
        predictor.write(&self.fulfillment);
        predictor.write_var_octet_string(&self.data);

        let mut writer = write_envelope(PacketType::Fulfill, predictor.predicted_size());
        writer.write(&self.fulfillment);
        writer.write_var_octet_string(&self.data);
        writer.into_bytes()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Fulfill, ParseError> {
        let contents = read_contents(bytes, PacketType::Fulfill)?;
        let mut reader = Reader::new(contents);

        let mut fulfillment = [0u8; FULFILLMENT_LEN];
        fulfillment.copy_from_slice(reader.read(FULFILLMENT_LEN)?);
        let data = Bytes::copy_from_slice(reader.read_var_octet_string()?);

        Ok(Fulfill { fulfillment, data })
    }
}

/// A rejection: the transfer did not happen and will not happen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reject {
    code: ErrorCode,
    triggered_by: Address,
    message: String,
    data: Bytes,
}

#[derive(Clone, Debug)]
pub struct RejectBuilder<'a> {
    pub code: ErrorCode,
    pub triggered_by: Option<&'a Address>,
    pub message: &'a str,
    pub data: &'a [u8],
}

impl RejectBuilder<'_> {
    pub fn build(&self) -> Reject {
        Reject {
            code: self.code,
            triggered_by: self.triggered_by.cloned().unwrap_or_default(),
            message: self.message.to_owned(),
            data: Bytes::copy_from_slice(self.data),
        }
    }
}

impl Reject {
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The address of the node that raised the error; empty when unknown.
    pub fn triggered_by(&self) -> &Address {
        &self.triggered_by
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn serialize(&self) -> Bytes {
        let mut predictor = Predictor::new();
        predictor.write(&self.code.as_bytes());
        predictor.write_var_octet_string(self.triggered_by.as_ref());
        predictor.write_var_octet_string(self.message.as_bytes());
        predictor.write_var_octet_string(&self.data);

        let mut writer = write_envelope(PacketType::Reject, predictor.predicted_size());
        writer.write(&self.code.as_bytes());
        writer.write_var_octet_string(self.triggered_by.as_ref());
        writer.write_var_octet_string(self.message.as_bytes());
        writer.write_var_octet_string(&self.data);
        writer.into_bytes()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Reject, ParseError> {
        let contents = read_contents(bytes, PacketType::Reject)?;
        let mut reader = Reader::new(contents);

        let code = ErrorCode::try_from(reader.read(ERROR_CODE_LEN)?)?;
        let triggered_by = Address::try_from(reader.read_var_octet_string()?)?;
        let message = std::str::from_utf8(reader.read_var_octet_string()?)?.to_owned();
        let data = Bytes::copy_from_slice(reader.read_var_octet_string()?);

        Ok(Reject {
            code,
            triggered_by,
            message,
            data,
        })
    }
}

impl From<Reject> for IlpError {
    fn from(reject: Reject) -> Self {
        let triggered_by = if reject.triggered_by.is_empty() {
            None
        } else {
            Some(reject.triggered_by)
        };
        IlpError {
            code: reject.code,
            message: reject.message,
            triggered_by,
            data: reject.data,
        }
    }
}

impl From<IlpError> for Reject {
    fn from(error: IlpError) -> Self {
        Reject {
            code: error.code,
            triggered_by: error.triggered_by.unwrap_or_default(),
            message: error.message,
            data: error.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, PREPARE, FULFILL, REJECT};

    #[test]
    fn prepare_round_trips() {
        let bytes = fixtures::prepare_bytes();
        let parsed = Prepare::deserialize(&bytes).unwrap();
        assert_eq!(parsed, *PREPARE);
        assert_eq!(parsed.serialize(), bytes);
    }

    #[test]
    fn fulfill_round_trips() {
        let bytes = fixtures::fulfill_bytes();
        let parsed = Fulfill::deserialize(&bytes).unwrap();
        assert_eq!(parsed, *FULFILL);
        assert_eq!(parsed.serialize(), bytes);
    }

    #[test]
    fn reject_round_trips() {
        let bytes = fixtures::reject_bytes();
        let parsed = Reject::deserialize(&bytes).unwrap();
        assert_eq!(parsed, *REJECT);
        assert_eq!(parsed.serialize(), bytes);
    }

    #[test]
    fn prepare_fields() {
        assert_eq!(PREPARE.amount(), Amount::new(107));
        assert_eq!(
            PREPARE.expires_at().format("%Y%m%d%H%M%S%3f").to_string(),
            "20180607204842101"
        );
        assert_eq!(PREPARE.destination().as_str(), "example.alice");
        assert_eq!(PREPARE.execution_condition(), &fixtures::condition());
        assert_eq!(PREPARE.data(), &fixtures::data()[..]);
    }

    #[test]
    fn dispatches_on_type_byte() {
        assert_eq!(
            Packet::deserialize(&fixtures::prepare_bytes())
                .unwrap()
                .packet_type(),
            PacketType::Prepare
        );
        assert_eq!(
            Packet::deserialize(&fixtures::fulfill_bytes())
                .unwrap()
                .packet_type(),
            PacketType::Fulfill
        );
        assert_eq!(
            Packet::deserialize(&fixtures::reject_bytes())
                .unwrap()
                .packet_type(),
            PacketType::Reject
        );
    }

    #[test]
    fn rejects_wrong_and_unknown_types() {
        let bytes = fixtures::fulfill_bytes();
        assert!(matches!(
            Prepare::deserialize(&bytes),
            Err(ParseError::WrongType {
                expected: 12,
                found: 13,
            })
        ));
        let mut unknown = fixtures::prepare_bytes();
        unknown[0] = 99;
        assert!(matches!(
            Packet::deserialize(&unknown),
            Err(ParseError::UnknownPacketType(99))
        ));
    }

    #[test]
    fn builder_rejects_bad_condition_lengths() {
        for len in [0, 31, 33] {
            let condition = vec![0u8; len];
            let result = PrepareBuilder {
                amount: Amount::new(1),
                expires_at: *fixtures::EXPIRES_AT,
                execution_condition: &condition,
                destination: PREPARE.destination().clone(),
                data: b"",
            }
            .build();
            assert_eq!(result, Err(ValidationError::ConditionLength(len)));
        }

        let fulfillment = vec![0u8; 31];
        assert_eq!(
            FulfillBuilder {
                fulfillment: &fulfillment,
                data: b"",
            }
            .build(),
            Err(ValidationError::FulfillmentLength(31))
        );
    }

    #[test]
    fn truncated_packets_fail_to_parse() {
        let bytes = fixtures::prepare_bytes();
        for len in 0..bytes.len() {
            assert!(Prepare::deserialize(&bytes[..len]).is_err(), "len={}", len);
        }
    }

    #[test]
    fn trailing_bytes_after_contents_are_ignored() {
        let mut bytes = fixtures::fulfill_bytes();
        bytes.extend_from_slice(b"junk");
        assert_eq!(Fulfill::deserialize(&bytes).unwrap(), *FULFILL);
    }

    #[test]
    fn reject_converts_to_and_from_error() {
        let error = IlpError::from(REJECT.clone());
        assert_eq!(error.code, ErrorCode::F99_APPLICATION_ERROR);
        assert_eq!(error.message, "rejected");
        assert_eq!(
            error.triggered_by.as_ref().map(Address::as_str),
            Some("example.connector")
        );
        assert_eq!(Reject::from(error), *REJECT);

        // An empty triggered-by address maps to no address at all.
        let anonymous = RejectBuilder {
            code: ErrorCode::T00_INTERNAL_ERROR,
            triggered_by: None,
            message: "",
            data: b"",
        }
        .build();
        assert_eq!(IlpError::from(anonymous).triggered_by, None);
    }

    #[test]
    fn zero_amount_and_empty_fields_serialize() {
        let prepare = PrepareBuilder {
            amount: Amount::ZERO,
            expires_at: *fixtures::EXPIRES_AT,
            execution_condition: &fixtures::condition(),
            destination: Address::default(),
            data: b"",
        }
        .build()
        .unwrap();
        let bytes = prepare.serialize();
        assert_eq!(Prepare::deserialize(&bytes).unwrap(), prepare);
    }
}
