use bytes::Bytes;
use serde_json::Value;

use crate::errors::BtpPacketError;
use crate::packet::{ContentType, ProtocolData};

pub const ILP: &str = "ilp";
pub const CUSTOM: &str = "custom";
pub const AUTH: &str = "auth";
pub const AUTH_TOKEN: &str = "auth_token";

/// The application view of a packet's sub-protocol list: the well-known
/// `ilp` and `custom` entries pulled out, everything else kept in order.
///
/// Converting to and from the ordered wire list loses nothing: names,
/// content types, and ordering of unrecognized entries all survive.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubProtocols {
    pub ilp: Option<Bytes>,
    pub custom: Option<Value>,
    pub protocol_map: Vec<ProtocolData>,
}

impl SubProtocols {
    pub fn ilp(packet: impl Into<Bytes>) -> Self {
        SubProtocols {
            ilp: Some(packet.into()),
            ..Default::default()
        }
    }

    pub fn from_protocol_data(entries: Vec<ProtocolData>) -> Result<Self, BtpPacketError> {
        let mut parsed = SubProtocols::default();
        for entry in entries {
            match entry.protocol_name.as_str() {
                ILP if parsed.ilp.is_none() => parsed.ilp = Some(entry.data),
                CUSTOM if parsed.custom.is_none() => {
                    parsed.custom = Some(serde_json::from_slice(&entry.data)?);
                }
                _ => parsed.protocol_map.push(entry),
            }
        }
        Ok(parsed)
    }

    /// Rebuilds the ordered wire list: `ilp` first, `custom` second,
    /// then the remaining entries in their original order.
    pub fn into_protocol_data(self) -> Vec<ProtocolData> {
        let mut entries = Vec::with_capacity(2 + self.protocol_map.len());
        if let Some(ilp) = self.ilp {
            entries.push(ProtocolData::binary(ILP, ilp));
        }
        if let Some(custom) = self.custom {
            entries.push(ProtocolData {
                protocol_name: CUSTOM.to_owned(),
                content_type: ContentType::ApplicationJson,
                data: Bytes::from(custom.to_string().into_bytes()),
            });
        }
        entries.extend(self.protocol_map);
        entries
    }
}

/// The handshake payload: an empty `auth` entry marking intent, then the
/// shared token under `auth_token`.
pub fn auth_protocol_data(token: &str) -> Vec<ProtocolData> {
    vec![
        ProtocolData::binary(AUTH, Bytes::new()),
        ProtocolData::text(AUTH_TOKEN, token),
    ]
}
