//! The two variable-length integer encodings used by snapshot files.
//!
//! `CompactSize` is the length-tag framing familiar from the p2p protocol:
//! a tag byte below 253 is the value itself, otherwise the tag selects a
//! 2-, 4- or 8-byte little-endian extension. Snapshots use it for output
//! counts and vout indices, always with the canonical-minimal-form rule.
//!
//! `VarInt` is Bitcoin Core's MSB-first base-128 encoding with a +1 bias
//! on every continuation step, which makes each integer's encoding unique.
//! Snapshots use it for the combined height/coinbase code, the compressed
//! amount, and the script-compression tag.
//!
//! See:
//! - https://github.com/bitcoin/bitcoin/blob/master/src/serialize.h
//! - https://github.com/in3rsha/bitcoin-chainstate-parser/blob/master/README.md#varints

use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::error::{Error, FormatErrorKind, Result};

/// Largest value accepted for length-like CompactSize fields (32 MiB).
pub const MAX_COMPACT_SIZE: u64 = 0x0200_0000;

/// Reads a canonical CompactSize.
///
/// Non-minimal encodings (a wide form holding a value that fits a narrower
/// one) are rejected. With `range_check`, values above [`MAX_COMPACT_SIZE`]
/// are rejected as well; every length-like use in the snapshot format wants
/// that check.
pub fn read_compact_size<R: Read>(reader: &mut R, range_check: bool) -> Result<u64> {
    let value = match reader.read_u8().map_err(Error::from_read_io)? {
        0xff => {
            let x = reader.read_u64::<LE>().map_err(Error::from_read_io)?;
            if x < 0x1_0000_0000 {
                return Err(FormatErrorKind::NonCanonicalCompactSize.into());
            }
            x
        }
        0xfe => {
            let x = reader.read_u32::<LE>().map_err(Error::from_read_io)?;
            if x < 0x1_0000 {
                return Err(FormatErrorKind::NonCanonicalCompactSize.into());
            }
            u64::from(x)
        }
        0xfd => {
            let x = reader.read_u16::<LE>().map_err(Error::from_read_io)?;
            if x < 0xfd {
                return Err(FormatErrorKind::NonCanonicalCompactSize.into());
            }
            u64::from(x)
        }
        tag => u64::from(tag),
    };
    if range_check && value > MAX_COMPACT_SIZE {
        return Err(FormatErrorKind::CompactSizeRange(value).into());
    }
    Ok(value)
}

/// Writes `n` in the smallest CompactSize form, returning the bytes written.
pub fn write_compact_size<W: Write>(writer: &mut W, n: u64) -> io::Result<usize> {
    if n < 0xfd {
        writer.write_u8(n as u8)?;
        Ok(1)
    } else if n <= 0xffff {
        writer.write_u8(0xfd)?;
        writer.write_u16::<LE>(n as u16)?;
        Ok(3)
    } else if n <= 0xffff_ffff {
        writer.write_u8(0xfe)?;
        writer.write_u32::<LE>(n as u32)?;
        Ok(5)
    } else {
        writer.write_u8(0xff)?;
        writer.write_u64::<LE>(n)?;
        Ok(9)
    }
}

pub fn compact_size_len(n: u64) -> usize {
    if n < 0xfd {
        1
    } else if n <= 0xffff {
        3
    } else if n <= 0xffff_ffff {
        5
    } else {
        9
    }
}

/// Reads a VarInt.
///
/// Accumulates 7 bits per byte, MSB-first, adding one after every byte
/// whose continuation bit is set. Overflow past 64 bits is rejected before
/// it can wrap.
pub fn read_var_int<R: Read>(reader: &mut R) -> Result<u64> {
    let mut n: u64 = 0;
    loop {
        let byte = reader.read_u8().map_err(Error::from_read_io)?;
        if n > u64::MAX >> 7 {
            return Err(FormatErrorKind::VarIntOverflow.into());
        }
        n = (n << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 != 0 {
            if n == u64::MAX {
                return Err(FormatErrorKind::VarIntOverflow.into());
            }
            n += 1;
        } else {
            return Ok(n);
        }
    }
}

/// Writes `n` as a VarInt, returning the bytes written.
pub fn write_var_int<W: Write>(writer: &mut W, n: u64) -> io::Result<usize> {
    // Groups come out least-significant first; the wire wants them reversed.
    let mut tmp = [0u8; 10];
    let mut len = 0;
    let mut n = n;
    loop {
        tmp[len] = (n & 0x7f) as u8 | if len > 0 { 0x80 } else { 0 };
        if n <= 0x7f {
            break;
        }
        n = (n >> 7) - 1;
        len += 1;
    }
    let mut out = [0u8; 10];
    for (i, j) in (0..=len).rev().enumerate() {
        out[i] = tmp[j];
    }
    writer.write_all(&out[..=len])?;
    Ok(len + 1)
}

/// Number of bytes [`write_var_int`] produces for `n`.
pub fn var_int_len(n: u64) -> usize {
    let mut len = 1;
    let mut n = n;
    while n > 0x7f {
        n = (n >> 7) - 1;
        len += 1;
    }
    len
}
