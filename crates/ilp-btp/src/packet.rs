use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use ilp_oer::{predict_var_octet_string, Reader, Writer};

use crate::errors::BtpPacketError;

const REQUEST_ID_LEN: usize = 4;
const ERROR_CODE_LEN: usize = 3;

/// Timestamps in Error packets carry millisecond precision and a
/// trailing `Z`, e.g. `20180831025324.899Z`. Peers may omit the
/// fraction; we always emit it.
const TIMESTAMP_WRITE_FORMAT: &str = "%Y%m%d%H%M%S%.3fZ";
const TIMESTAMP_READ_FORMAT: &str = "%Y%m%d%H%M%S%.fZ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Response = 1,
    Error = 2,
    Message = 6,
    Transfer = 7,
}

impl PacketType {
    fn try_from(byte: u8) -> Result<Self, BtpPacketError> {
        match byte {
            1 => Ok(PacketType::Response),
            2 => Ok(PacketType::Error),
            6 => Ok(PacketType::Message),
            7 => Ok(PacketType::Transfer),
            other => Err(BtpPacketError::UnknownType(other)),
        }
    }
}

/// MIME shorthand for a sub-protocol payload. Unassigned values are
/// carried through untouched so reserialization is exact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    ApplicationOctetStream,
    TextPlainUtf8,
    ApplicationJson,
    Unknown(u8),
}

impl From<u8> for ContentType {
    fn from(byte: u8) -> Self {
        match byte {
            0 => ContentType::ApplicationOctetStream,
            1 => ContentType::TextPlainUtf8,
            2 => ContentType::ApplicationJson,
            other => ContentType::Unknown(other),
        }
    }
}

impl From<ContentType> for u8 {
    fn from(content_type: ContentType) -> Self {
        match content_type {
            ContentType::ApplicationOctetStream => 0,
            ContentType::TextPlainUtf8 => 1,
            ContentType::ApplicationJson => 2,
            ContentType::Unknown(other) => other,
        }
    }
}

/// One named payload within a packet's sub-protocol list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolData {
    pub protocol_name: String,
    pub content_type: ContentType,
    pub data: Bytes,
}

impl ProtocolData {
    pub fn binary(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        ProtocolData {
            protocol_name: name.into(),
            content_type: ContentType::ApplicationOctetStream,
            data: data.into(),
        }
    }

    pub fn text(name: impl Into<String>, text: &str) -> Self {
        ProtocolData {
            protocol_name: name.into(),
            content_type: ContentType::TextPlainUtf8,
            data: Bytes::copy_from_slice(text.as_bytes()),
        }
    }
}

pub(crate) fn read_protocol_data(reader: &mut Reader) -> Result<Vec<ProtocolData>, BtpPacketError> {
    let count = reader.read_var_uint()?;
    let mut entries = Vec::with_capacity(count.min(64) as usize);
    for _ in 0..count {
        let protocol_name = std::str::from_utf8(reader.read_var_octet_string()?)?.to_owned();
        let content_type = ContentType::from(reader.read_u8()?);
        let data = Bytes::copy_from_slice(reader.read_var_octet_string()?);
        entries.push(ProtocolData {
            protocol_name,
            content_type,
            data,
        });
    }
    check_no_trailing_bytes(reader)?;
    Ok(entries)
}

pub(crate) fn write_protocol_data(writer: &mut Writer, entries: &[ProtocolData]) {
    writer.write_var_uint(entries.len() as u64);
    for entry in entries {
        writer.write_var_octet_string(entry.protocol_name.as_bytes());
        writer.write_u8(entry.content_type.into());
        writer.write_var_octet_string(&entry.data);
    }
}

fn check_no_trailing_bytes(reader: &Reader) -> Result<(), BtpPacketError> {
    if reader.is_empty() {
        Ok(())
    } else {
        Err(BtpPacketError::TrailingBytes)
    }
}

fn read_envelope(bytes: &[u8], expected: PacketType) -> Result<(u32, Reader), BtpPacketError> {
    let mut reader = Reader::new(bytes);
    let found = reader.read_u8()?;
    if found != expected as u8 {
        return Err(BtpPacketError::UnexpectedType {
            expected: expected as u8,
            found,
        });
    }
    let request_id = reader.read_uint(REQUEST_ID_LEN)? as u32;
    let contents = reader.read_var_octet_string()?;
    check_no_trailing_bytes(&reader)?;
    Ok((request_id, Reader::new(contents)))
}

fn write_envelope(packet_type: PacketType, request_id: u32, contents: Writer) -> Bytes {
    let contents = contents.into_bytes();
    let mut writer = Writer::with_capacity(
        1 + REQUEST_ID_LEN + predict_var_octet_string(contents.len()),
    );
    writer.write_u8(packet_type as u8);
    writer.write(&request_id.to_be_bytes());
    writer.write_var_octet_string(&contents);
    writer.into_bytes()
}

#[derive(Clone, Debug, PartialEq)]
pub enum BtpPacket {
    Message(BtpMessage),
    Transfer(BtpTransfer),
    Response(BtpResponse),
    Error(BtpError),
}

impl BtpPacket {
    pub fn from_bytes(bytes: &[u8]) -> Result<BtpPacket, BtpPacketError> {
        let first = *bytes.first().ok_or(ilp_oer::OerError::Underflow)?;
        match PacketType::try_from(first)? {
            PacketType::Message => BtpMessage::from_bytes(bytes).map(BtpPacket::Message),
            PacketType::Transfer => BtpTransfer::from_bytes(bytes).map(BtpPacket::Transfer),
            PacketType::Response => BtpResponse::from_bytes(bytes).map(BtpPacket::Response),
            PacketType::Error => BtpError::from_bytes(bytes).map(BtpPacket::Error),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            BtpPacket::Message(packet) => packet.to_bytes(),
            BtpPacket::Transfer(packet) => packet.to_bytes(),
            BtpPacket::Response(packet) => packet.to_bytes(),
            BtpPacket::Error(packet) => packet.to_bytes(),
        }
    }

    pub fn request_id(&self) -> u32 {
        match self {
            BtpPacket::Message(packet) => packet.request_id,
            BtpPacket::Transfer(packet) => packet.request_id,
            BtpPacket::Response(packet) => packet.request_id,
            BtpPacket::Error(packet) => packet.request_id,
        }
    }
}

/// A request carrying sub-protocol payloads, answered by a Response or
/// an Error with the same request id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BtpMessage {
    pub request_id: u32,
    pub protocol_data: Vec<ProtocolData>,
}

impl BtpMessage {
    pub fn from_bytes(bytes: &[u8]) -> Result<BtpMessage, BtpPacketError> {
        let (request_id, mut contents) = read_envelope(bytes, PacketType::Message)?;
        let protocol_data = read_protocol_data(&mut contents)?;
        Ok(BtpMessage {
            request_id,
            protocol_data,
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut contents = Writer::new();
        write_protocol_data(&mut contents, &self.protocol_data);
        write_envelope(PacketType::Message, self.request_id, contents)
    }
}

/// A money notification: `amount` units have moved on the underlying
/// ledger, with optional sub-protocol payloads attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BtpTransfer {
    pub request_id: u32,
    pub amount: u64,
    pub protocol_data: Vec<ProtocolData>,
}

impl BtpTransfer {
    pub fn from_bytes(bytes: &[u8]) -> Result<BtpTransfer, BtpPacketError> {
        let (request_id, mut contents) = read_envelope(bytes, PacketType::Transfer)?;
        let amount = contents.read_uint(8)?;
        let protocol_data = read_protocol_data(&mut contents)?;
        Ok(BtpTransfer {
            request_id,
            amount,
            protocol_data,
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut contents = Writer::new();
        contents.write(&self.amount.to_be_bytes());
        write_protocol_data(&mut contents, &self.protocol_data);
        write_envelope(PacketType::Transfer, self.request_id, contents)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BtpResponse {
    pub request_id: u32,
    pub protocol_data: Vec<ProtocolData>,
}

impl BtpResponse {
    pub fn from_bytes(bytes: &[u8]) -> Result<BtpResponse, BtpPacketError> {
        let (request_id, mut contents) = read_envelope(bytes, PacketType::Response)?;
        let protocol_data = read_protocol_data(&mut contents)?;
        Ok(BtpResponse {
            request_id,
            protocol_data,
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut contents = Writer::new();
        write_protocol_data(&mut contents, &self.protocol_data);
        write_envelope(PacketType::Response, self.request_id, contents)
    }
}

/// A failed request: three-letter code, symbolic name, when it was
/// raised, and a human-readable detail string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BtpError {
    pub request_id: u32,
    pub code: String,
    pub name: String,
    pub triggered_at: DateTime<Utc>,
    pub data: String,
    pub protocol_data: Vec<ProtocolData>,
}

impl BtpError {
    /// Builds an error reply, deriving the code from the symbolic name.
    pub fn from_name(request_id: u32, name: &str, data: impl Into<String>) -> Self {
        BtpError {
            request_id,
            code: code_for_name(name).to_owned(),
            name: name.to_owned(),
            triggered_at: Utc::now(),
            data: data.into(),
            protocol_data: Vec::new(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<BtpError, BtpPacketError> {
        let (request_id, mut contents) = read_envelope(bytes, PacketType::Error)?;
        let code = std::str::from_utf8(contents.read(ERROR_CODE_LEN)?)?.to_owned();
        let name = std::str::from_utf8(contents.read_var_octet_string()?)?.to_owned();
        let timestamp = std::str::from_utf8(contents.read_var_octet_string()?)?;
        let triggered_at =
            NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_READ_FORMAT)?.and_utc();
        let data = std::str::from_utf8(contents.read_var_octet_string()?)?.to_owned();
        let protocol_data = read_protocol_data(&mut contents)?;
        Ok(BtpError {
            request_id,
            code,
            name,
            triggered_at,
            data,
            protocol_data,
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut contents = Writer::new();
        contents.write(self.code.as_bytes());
        contents.write_var_octet_string(self.name.as_bytes());
        let timestamp = self.triggered_at.format(TIMESTAMP_WRITE_FORMAT).to_string();
        contents.write_var_octet_string(timestamp.as_bytes());
        contents.write_var_octet_string(self.data.as_bytes());
        write_protocol_data(&mut contents, &self.protocol_data);
        write_envelope(PacketType::Error, self.request_id, contents)
    }
}

/// Maps symbolic error names to their three-letter codes. Names outside
/// the table fall back to `F00`.
pub fn code_for_name(name: &str) -> &'static str {
    match name {
        "UnreachableError" => "T00",
        "NotAcceptedError" => "F00",
        "InvalidFieldsError" => "F01",
        "TransferNotFoundError" => "F03",
        "InvalidFulfillmentError" => "F04",
        "DuplicateIdError" => "F05",
        "AlreadyRolledBackError" => "F06",
        "AlreadyFulfilledError" => "F07",
        "InsufficientBalanceError" => "F08",
        _ => "F00",
    }
}
