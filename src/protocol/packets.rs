//! Full-frame builders for the outbound control packets and body parsers
//! for the inbound ones. Builders assemble the variable header and
//! payload into one buffer, then prepend the fixed header and the
//! Remaining Length computed from the buffer.

use super::codec::{
    encode_remaining_length, push_bytes, push_string, read_string, read_u16,
};
use super::{Qos, PROTOCOL_LEVEL, PROTOCOL_NAME};
use crate::core::config::ConnectionSettings;
use crate::error::{Error, Result};

// Connection-flags bit positions.
const FLAG_CLEAN_SESSION: u8 = 1 << 1;
const FLAG_WILL: u8 = 1 << 2;
const FLAG_WILL_RETAIN: u8 = 1 << 5;
const FLAG_PASSWORD: u8 = 1 << 6;
const FLAG_USERNAME: u8 = 1 << 7;

fn frame(first_byte: u8, body: Vec<u8>) -> Result<Vec<u8>> {
    let mut packet = vec![first_byte];
    packet.extend(encode_remaining_length(body.len())?);
    packet.extend(body);
    Ok(packet)
}

/// Build a CONNECT frame from the connection settings.
pub fn connect(
    settings: &ConnectionSettings,
    client_id: &str,
    clean_session: bool,
) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    push_bytes(&mut body, PROTOCOL_NAME)?;
    body.push(PROTOCOL_LEVEL);

    let mut flags = 0u8;
    if clean_session {
        flags |= FLAG_CLEAN_SESSION;
    }
    if let Some(will) = &settings.last_will {
        flags |= FLAG_WILL;
        flags |= will.qos.bits() << 3;
        if will.retain {
            flags |= FLAG_WILL_RETAIN;
        }
    }
    if settings.username.is_some() {
        flags |= FLAG_USERNAME;
    }
    if settings.password.is_some() {
        flags |= FLAG_PASSWORD;
    }
    body.push(flags);
    body.extend_from_slice(&settings.keep_alive_seconds.to_be_bytes());

    push_string(&mut body, client_id)?;
    if let Some(will) = &settings.last_will {
        push_string(&mut body, &will.topic)?;
        push_bytes(&mut body, &will.message)?;
    }
    if let Some(username) = &settings.username {
        push_string(&mut body, username)?;
    }
    if let Some(password) = &settings.password {
        push_bytes(&mut body, password)?;
    }

    frame(0x10, body)
}

/// Build a PUBLISH frame. A message id is required exactly when qos > 0.
pub fn publish(
    topic: &str,
    payload: &[u8],
    qos: Qos,
    retain: bool,
    dup: bool,
    message_id: Option<u16>,
) -> Result<Vec<u8>> {
    let mut first_byte = 0x30 | (qos.bits() << 1);
    if retain {
        first_byte |= 0x01;
    }
    if dup {
        first_byte |= 1 << 3;
    }

    let mut body = Vec::with_capacity(2 + topic.len() + 2 + payload.len());
    push_string(&mut body, topic)?;
    if qos != Qos::AtMostOnce {
        let id = message_id
            .ok_or_else(|| Error::TxData("publish above qos 0 requires a message id".into()))?;
        body.extend_from_slice(&id.to_be_bytes());
    }
    body.extend_from_slice(payload);

    frame(first_byte, body)
}

/// Build a SUBSCRIBE frame for a single filter. The low nibble always
/// carries the reserved `0x02` bits the protocol requires.
pub fn subscribe(message_id: u16, topic_filter: &str, qos: Qos) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(2 + 2 + topic_filter.len() + 1);
    body.extend_from_slice(&message_id.to_be_bytes());
    push_string(&mut body, topic_filter)?;
    body.push(qos.bits());
    frame(0x82, body)
}

/// Build an UNSUBSCRIBE frame for a single filter; `dup` marks a
/// retransmission.
pub fn unsubscribe(message_id: u16, topic_filter: &str, dup: bool) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(2 + 2 + topic_filter.len());
    body.extend_from_slice(&message_id.to_be_bytes());
    push_string(&mut body, topic_filter)?;
    let first_byte = if dup { 0xA2 | 1 << 3 } else { 0xA2 };
    frame(first_byte, body)
}

/// Build a PUBACK frame acknowledging an inbound qos 1 publish.
pub fn puback(message_id: u16) -> Vec<u8> {
    let mut packet = vec![0x40, 0x02];
    packet.extend_from_slice(&message_id.to_be_bytes());
    packet
}

pub fn pingreq() -> Vec<u8> {
    vec![0xC0, 0x00]
}

pub fn pingresp() -> Vec<u8> {
    vec![0xD0, 0x00]
}

pub fn disconnect() -> Vec<u8> {
    vec![0xE0, 0x00]
}

/// An inbound PUBLISH, decoded from fixed-header flags plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPublish {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub message_id: Option<u16>,
    pub dup: bool,
    pub retain: bool,
}

/// Parse an inbound PUBLISH body given the low nibble of its fixed
/// header.
pub fn parse_publish(flags: u8, body: &[u8]) -> Result<InboundPublish> {
    let qos = Qos::from_bits((flags >> 1) & 0x03)
        .ok_or_else(|| Error::RxData("publish carries reserved qos bits".into()))?;
    let dup = flags & (1 << 3) != 0;
    let retain = flags & 0x01 != 0;

    let mut cursor = 0usize;
    let topic = read_string(body, &mut cursor)?;
    let message_id = if qos == Qos::AtMostOnce {
        None
    } else {
        Some(read_u16(body, &mut cursor)?)
    };
    let payload = body[cursor..].to_vec();

    Ok(InboundPublish {
        topic,
        payload,
        qos,
        message_id,
        dup,
        retain,
    })
}

/// Parse an acknowledgement body that must be exactly a message id.
pub fn parse_message_id(body: &[u8]) -> Result<u16> {
    if body.len() != 2 {
        return Err(Error::RxData(format!(
            "acknowledgement body of {} bytes, expected 2",
            body.len()
        )));
    }
    Ok(u16::from_be_bytes([body[0], body[1]]))
}

/// Parse a SUBACK body into the message id and per-filter grant bytes.
pub fn parse_suback(body: &[u8]) -> Result<(u16, &[u8])> {
    if body.len() < 3 {
        return Err(Error::RxData(format!(
            "suback body of {} bytes, expected at least 3",
            body.len()
        )));
    }
    let message_id = u16::from_be_bytes([body[0], body[1]]);
    Ok((message_id, &body[2..]))
}
