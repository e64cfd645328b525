//! EBML primitives: variable-length integers and element encoding.

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};

use crate::error::{Result, WebmError};

/// Largest value an 8-byte VINT can carry (all-ones is reserved for
/// "unknown size").
pub const MAX_VINT_VALUE: u64 = (1 << 56) - 2;

/// Number of bytes needed to encode `value` as a VINT.
pub fn vint_len(value: u64) -> Result<usize> {
    (1..=8)
        .find(|&len| value < (1u64 << (7 * len)) - 1)
        .ok_or(WebmError::VintOverflow(value))
}

/// Write `value` as a VINT of exactly `len` bytes.
pub fn write_vint_fixed(buf: &mut BytesMut, value: u64, len: usize) -> Result<()> {
    if !(1..=8).contains(&len) || value >= (1u64 << (7 * len)) - 1 {
        return Err(WebmError::VintOverflow(value));
    }
    let marked = value | (1u64 << (7 * len));
    buf.put_slice(&marked.to_be_bytes()[8 - len..]);
    Ok(())
}

/// Write `value` as a minimal-length VINT.
pub fn write_vint(buf: &mut BytesMut, value: u64) -> Result<()> {
    write_vint_fixed(buf, value, vint_len(value)?)
}

/// Write an element ID (marker bits already included).
pub fn write_id(buf: &mut BytesMut, id: u32) {
    let len = match id {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    };
    buf.put_slice(&id.to_be_bytes()[4 - len..]);
}

/// Write a master or binary element with the given body.
pub fn write_element(buf: &mut BytesMut, id: u32, body: &[u8]) -> Result<()> {
    write_id(buf, id);
    write_vint(buf, body.len() as u64)?;
    buf.put_slice(body);
    Ok(())
}

/// Write an unsigned integer element using the fewest bytes (at least one).
pub fn write_uint(buf: &mut BytesMut, id: u32, value: u64) -> Result<()> {
    let bytes = value.to_be_bytes();
    let skip = (value.leading_zeros() / 8).min(7) as usize;
    write_element(buf, id, &bytes[skip..])
}

/// Write an 8-byte float element.
pub fn write_float(buf: &mut BytesMut, id: u32, value: f64) -> Result<()> {
    write_element(buf, id, &value.to_be_bytes())
}

pub fn write_string(buf: &mut BytesMut, id: u32, value: &str) -> Result<()> {
    write_element(buf, id, value.as_bytes())
}

/// Read a VINT, returning `(value, length)`. Unknown sizes read as `None`
/// value with their length.
pub fn read_vint(data: &[u8]) -> Option<(Option<u64>, usize)> {
    let first = *data.first()?;
    if first == 0 {
        return None;
    }
    let len = first.leading_zeros() as usize + 1;
    if data.len() < len {
        return None;
    }
    let mut value = (first as u64) & ((1u64 << (8 - len)) - 1);
    for &byte in &data[1..len] {
        value = (value << 8) | byte as u64;
    }
    let all_ones = (1u64 << (7 * len)) - 1;
    Some(((value != all_ones).then_some(value), len))
}

/// Read an element ID (marker bits kept), returning `(id, length)`.
pub fn read_id(data: &[u8]) -> Option<(u32, usize)> {
    let first = *data.first()?;
    let len = first.leading_zeros() as usize + 1;
    if len > 4 || data.len() < len {
        return None;
    }
    let id = data[..len]
        .iter()
        .fold(0u32, |acc, &byte| (acc << 8) | byte as u32);
    Some((id, len))
}

/// Interpret an element body as a big-endian unsigned integer.
pub fn read_uint(body: &[u8]) -> u64 {
    body.iter()
        .take(8)
        .fold(0u64, |acc, &byte| (acc << 8) | byte as u64)
}

/// Interpret an element body as a 4- or 8-byte float.
pub fn read_float(body: &[u8]) -> Option<f64> {
    match body.len() {
        4 => Some(BigEndian::read_f32(body) as f64),
        8 => Some(BigEndian::read_f64(body)),
        0 => Some(0.0),
        _ => None,
    }
}
