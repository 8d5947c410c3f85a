//! MQTT 3.1 wire protocol: control-packet framing, codec primitives,
//! and packet builders.

pub mod codec;
pub mod packets;

/// Protocol name advertised in CONNECT. This client speaks the MQTT 3.1
/// wire format (`MQIsdp`, level 3); 3.1.1 would use `MQTT` / level 4.
pub const PROTOCOL_NAME: &[u8] = b"MQIsdp";
pub const PROTOCOL_LEVEL: u8 = 0x03;

/// Quality of Service for a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    /// Recognized on the wire, never offered on publish: there is no
    /// PUBREC/PUBREL/PUBCOMP handling in this client.
    ExactlyOnce,
}

impl Qos {
    pub fn bits(self) -> u8 {
        match self {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Qos> {
        match bits {
            0 => Some(Qos::AtMostOnce),
            1 => Some(Qos::AtLeastOnce),
            2 => Some(Qos::ExactlyOnce),
            _ => None,
        }
    }
}

/// Control packet types the event loop dispatches on, selected by the
/// high nibble of the fixed-header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    ConnAck,
    Publish,
    PubAck,
    SubAck,
    UnsubAck,
    PingReq,
    PingResp,
}

impl PacketType {
    pub fn from_nibble(nibble: u8) -> Option<PacketType> {
        match nibble {
            2 => Some(PacketType::ConnAck),
            3 => Some(PacketType::Publish),
            4 => Some(PacketType::PubAck),
            9 => Some(PacketType::SubAck),
            11 => Some(PacketType::UnsubAck),
            12 => Some(PacketType::PingReq),
            13 => Some(PacketType::PingResp),
            _ => None,
        }
    }
}
