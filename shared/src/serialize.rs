//! Fixed-layout big-endian codec
//!
//! Writers take a destination slice and an offset and return the offset just
//! past the written value. Readers take a cursor (`&mut &[u8]`) and advance it
//! past the consumed bytes. Neither side writes or consumes anything when the
//! buffer is too small.

use crate::error::WireError;

fn write_bytes<const N: usize>(
    bytes: [u8; N],
    buf: &mut [u8],
    offset: usize,
) -> Result<usize, WireError> {
    let end = offset
        .checked_add(N)
        .filter(|end| *end <= buf.len())
        .ok_or(WireError::BufferTooSmall {
            needed: N,
            available: buf.len().saturating_sub(offset),
        })?;

    buf[offset..end].copy_from_slice(&bytes);
    Ok(end)
}

fn take<const N: usize>(buf: &mut &[u8]) -> Result<[u8; N], WireError> {
    if buf.len() < N {
        return Err(WireError::BufferTooSmall {
            needed: N,
            available: buf.len(),
        });
    }

    let (head, rest) = buf.split_at(N);
    let mut out = [0u8; N];
    out.copy_from_slice(head);
    *buf = rest;
    Ok(out)
}

pub fn serialize_u8(value: u8, buf: &mut [u8], offset: usize) -> Result<usize, WireError> {
    write_bytes(value.to_be_bytes(), buf, offset)
}

pub fn serialize_u16(value: u16, buf: &mut [u8], offset: usize) -> Result<usize, WireError> {
    write_bytes(value.to_be_bytes(), buf, offset)
}

pub fn serialize_u32(value: u32, buf: &mut [u8], offset: usize) -> Result<usize, WireError> {
    write_bytes(value.to_be_bytes(), buf, offset)
}

pub fn serialize_u64(value: u64, buf: &mut [u8], offset: usize) -> Result<usize, WireError> {
    write_bytes(value.to_be_bytes(), buf, offset)
}

/// Floats travel as their IEEE-754 bit pattern in a big-endian u32
pub fn serialize_float(value: f32, buf: &mut [u8], offset: usize) -> Result<usize, WireError> {
    serialize_u32(value.to_bits(), buf, offset)
}

pub fn deserialize_u8(buf: &mut &[u8]) -> Result<u8, WireError> {
    take::<1>(buf).map(u8::from_be_bytes)
}

pub fn deserialize_u16(buf: &mut &[u8]) -> Result<u16, WireError> {
    take::<2>(buf).map(u16::from_be_bytes)
}

pub fn deserialize_u32(buf: &mut &[u8]) -> Result<u32, WireError> {
    take::<4>(buf).map(u32::from_be_bytes)
}

pub fn deserialize_u64(buf: &mut &[u8]) -> Result<u64, WireError> {
    take::<8>(buf).map(u64::from_be_bytes)
}

pub fn deserialize_float(buf: &mut &[u8]) -> Result<f32, WireError> {
    deserialize_u32(buf).map(f32::from_bits)
}
