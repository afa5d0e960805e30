//! Little-endian byte codec used by every packet, command and event in the
//! crate. Nothing downstream reads or writes a field by ad-hoc indexing;
//! everything goes through [`ReadFrom`]/[`WriteTo`].

use std::io::{self, Read, Write};
use std::mem::size_of;

use crate::error::{HciError, Result};

/// A type that can be decoded from the front of a byte stream.
///
/// `R` is almost always `&mut &[u8]`, which advances the slice as bytes are
/// consumed — the same "cursor" idiom as reading from a real socket.
pub trait ReadFrom: Sized {
    fn read_from<R: Read>(r: R) -> io::Result<(Self, usize)>;
}

pub trait ReadAs {
    fn read_as<V: ReadFrom>(&mut self) -> io::Result<(V, usize)>;
}

impl<R: Read> ReadAs for R {
    fn read_as<V: ReadFrom>(&mut self) -> io::Result<(V, usize)> {
        V::read_from(self)
    }
}

macro_rules! impl_read_from_int {
    ($t:ty) => {
        impl ReadFrom for $t {
            fn read_from<R: Read>(mut r: R) -> io::Result<(Self, usize)> {
                let mut bytes = [0u8; size_of::<$t>()];
                r.read_exact(&mut bytes)?;
                Ok((<$t>::from_le_bytes(bytes), bytes.len()))
            }
        }
    };
}

impl_read_from_int!(u8);
impl_read_from_int!(i8);
impl_read_from_int!(u16);
impl_read_from_int!(u32);
impl_read_from_int!(u64);
impl_read_from_int!(i16);

/// A 3-byte little-endian unsigned integer, widened into a `u32`. BlueZ uses
/// this for the inquiry LAP and a handful of other fields; there is no
/// native Rust integer of this width.
pub fn read_u24<R: Read>(mut r: R) -> io::Result<(u32, usize)> {
    let mut bytes = [0u8; 3];
    r.read_exact(&mut bytes)?;
    Ok((
        bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16,
        3,
    ))
}

pub fn write_u24<W: Write>(value: u32, w: &mut W) -> io::Result<usize> {
    let bytes = [value as u8, (value >> 8) as u8, (value >> 16) as u8];
    w.write(&bytes)
}

/// Read a fixed-size byte array (e.g. a 6-byte Bluetooth device address).
pub fn read_array<R: Read, const N: usize>(mut r: R) -> io::Result<([u8; N], usize)> {
    let mut bytes = [0u8; N];
    r.read_exact(&mut bytes)?;
    Ok((bytes, N))
}

/// Read the rest of a slice as an owned `Vec<u8>`.
pub fn read_remainder<R: Read>(mut r: R) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    r.read_to_end(&mut out)?;
    Ok(out)
}

pub trait WriteTo: Sized {
    fn write_to<W: Write>(self, w: &mut W) -> io::Result<usize>;

    fn bytes(self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}

pub trait WriteAs {
    fn write_as<T: WriteTo>(&mut self, value: T) -> io::Result<usize>;
}

impl<W: Write> WriteAs for W {
    fn write_as<T: WriteTo>(&mut self, value: T) -> io::Result<usize> {
        value.write_to(self)
    }
}

macro_rules! impl_write_to_int {
    ($t:ty) => {
        impl WriteTo for $t {
            fn write_to<W: Write>(self, w: &mut W) -> io::Result<usize> {
                w.write(&self.to_le_bytes())
            }
        }
    };
}

impl_write_to_int!(u8);
impl_write_to_int!(i8);
impl_write_to_int!(u16);
impl_write_to_int!(u32);
impl_write_to_int!(u64);
impl_write_to_int!(i16);

impl<const N: usize> WriteTo for [u8; N] {
    fn write_to<W: Write>(self, w: &mut W) -> io::Result<usize> {
        w.write(&self)
    }
}

/// Convenience wrapper that turns a short read into the crate's own error
/// type, naming the field that underflowed.
pub fn require(what: &'static str, needed: usize, buf: &[u8]) -> Result<()> {
    if buf.len() < needed {
        Err(HciError::Underflow {
            what,
            needed,
            had: buf.len(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_u16() {
        let bytes = 0x1234u16.bytes().unwrap();
        assert_eq!(bytes, vec![0x34, 0x12]);
        let mut slice = &bytes[..];
        let (v, n): (u16, usize) = slice.read_as().unwrap();
        assert_eq!(v, 0x1234);
        assert_eq!(n, 2);
    }

    #[test]
    fn round_trips_u24() {
        let mut buf = Vec::new();
        write_u24(0x00ABCDEF & 0x00FFFFFF, &mut buf).unwrap();
        assert_eq!(buf, vec![0xEF, 0xCD, 0xAB]);
        let (v, n) = read_u24(&buf[..]).unwrap();
        assert_eq!(v, 0x00ABCDEF);
        assert_eq!(n, 3);
    }

    #[test]
    fn underflow_is_reported_with_field_name() {
        let err = require("bd_addr", 6, &[0u8; 3]).unwrap_err();
        match err {
            HciError::Underflow { what, needed, had } => {
                assert_eq!(what, "bd_addr");
                assert_eq!(needed, 6);
                assert_eq!(had, 3);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn read_array_advances_cursor() {
        let data = [1u8, 2, 3, 4, 5, 6, 7];
        let mut cursor = &data[..];
        let (addr, n): ([u8; 6], usize) = read_array(&mut cursor).unwrap();
        assert_eq!(addr, [1, 2, 3, 4, 5, 6]);
        assert_eq!(n, 6);
        assert_eq!(cursor, &[7]);
    }
}
