//! Codec primitives shared by every packet builder and parser: the
//! Remaining Length varint, length-prefixed UTF-8 strings, and
//! big-endian integer helpers over a byte-slice cursor.

use crate::error::{Error, Result};

/// MQTT caps the Remaining Length field at four 7-bit bytes.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Encode a Remaining Length value, LSB first, continuation bit on all
/// but the last byte.
pub fn encode_remaining_length(mut len: usize) -> Result<Vec<u8>> {
    if len > MAX_REMAINING_LENGTH {
        return Err(Error::TxData(format!(
            "remaining length {len} exceeds the protocol maximum"
        )));
    }
    let mut out = Vec::with_capacity(2);
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
    Ok(out)
}

/// Decode a Remaining Length from the front of `bytes`, returning the
/// value and the number of bytes consumed.
pub fn decode_remaining_length(bytes: &[u8]) -> Result<(usize, usize)> {
    let mut multiplier = 1usize;
    let mut value = 0usize;
    let mut consumed = 0usize;
    loop {
        let byte = *bytes
            .get(consumed)
            .ok_or_else(|| Error::RxData("truncated remaining length".into()))?;
        consumed += 1;
        value += (byte as usize & 0x7F) * multiplier;
        if value > MAX_REMAINING_LENGTH {
            return Err(Error::RxData("remaining length out of range".into()));
        }
        if byte & 0x80 == 0 {
            break;
        }
        multiplier *= 128;
        if multiplier > 128 * 128 * 128 {
            return Err(Error::RxData("remaining length longer than four bytes".into()));
        }
    }
    Ok((value, consumed))
}

/// Append a two-byte big-endian length prefix followed by the raw bytes.
pub fn push_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    if bytes.len() > u16::MAX as usize {
        return Err(Error::TxData(format!(
            "field of {} bytes exceeds the 16-bit length prefix",
            bytes.len()
        )));
    }
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Append a length-prefixed UTF-8 string.
pub fn push_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    push_bytes(buf, s.as_bytes())
}

pub fn read_u8(buf: &[u8], cursor: &mut usize) -> Result<u8> {
    let byte = *buf
        .get(*cursor)
        .ok_or_else(|| Error::RxData("unexpected end of packet".into()))?;
    *cursor += 1;
    Ok(byte)
}

pub fn read_u16(buf: &[u8], cursor: &mut usize) -> Result<u16> {
    if *cursor + 2 > buf.len() {
        return Err(Error::RxData("unexpected end of packet".into()));
    }
    let value = u16::from_be_bytes([buf[*cursor], buf[*cursor + 1]]);
    *cursor += 2;
    Ok(value)
}

/// Read a length-prefixed UTF-8 string, advancing the cursor past it.
pub fn read_string(buf: &[u8], cursor: &mut usize) -> Result<String> {
    let len = read_u16(buf, cursor)? as usize;
    if *cursor + len > buf.len() {
        return Err(Error::RxData("unexpected end of packet".into()));
    }
    let s = std::str::from_utf8(&buf[*cursor..*cursor + len])
        .map_err(|_| Error::RxData("invalid utf-8 in string field".into()))?
        .to_string();
    *cursor += len;
    Ok(s)
}
