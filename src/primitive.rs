//! Fixed-width and variable-length ("packed") integer codec.
//!
//! Mirrors the split the original tool's `readFormat`/`writeFormat` pair
//! draws between plain little-endian fixed-width fields (used everywhere
//! inside `DATA` and the item/patch tables) and the packed integer scheme
//! used throughout the `TYPE` section.

use std::io::{Read, Write};

use anyhow::{anyhow, Result};

/// Extension trait for reading the primitives this format uses, mirroring
/// `idb-rs`'s `IdaGenericUnpack` split between fixed-width reads and the
/// variable-length scheme.
pub trait TagRead: Read {
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    fn read_f32(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    /// Big-endian length field used for section headers.
    fn read_u32_be(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Variable-length integer. One leading byte; if its high bit is set,
    /// the top bits of that byte pick a width class and 1-8 further
    /// big-endian bytes are concatenated in. See `4.A` of the format notes:
    /// classes for 14/21/27/59/63(*)/40/64 bits, selected by `byte >> 3`.
    ///
    /// (*) the 0x1E (7 extra byte) case shares its mask with 0x1D in the
    /// reference implementation, so it only ever yields 59 significant
    /// bits in practice, not the full 63 its byte count would allow.
    fn read_packed(&mut self) -> Result<u64> {
        let b0 = self.read_u8()? as u64;
        if b0 & 0x80 == 0 {
            return Ok(b0);
        }
        let case = b0 >> 3;
        match case {
            0x10..=0x17 => {
                let b1 = self.read_u8()? as u64;
                Ok(((b0 << 8) | b1) & 0x3fff)
            }
            0x18..=0x1B => {
                let b1 = self.read_u8()? as u64;
                let b2 = self.read_u8()? as u64;
                Ok(((b0 << 16) | (b1 << 8) | b2) & 0x1fffff)
            }
            0x1C => {
                let b1 = self.read_u8()? as u64;
                let b2 = self.read_u8()? as u64;
                let b3 = self.read_u8()? as u64;
                Ok(((b0 << 24) | (b1 << 16) | (b2 << 8) | b3) & 0x7ffffff)
            }
            0x1D => {
                let b1 = self.read_u8()? as u64;
                let b2 = self.read_u8()? as u64;
                let b3 = self.read_u8()? as u64;
                let b4 = self.read_u8()? as u64;
                Ok(((b0 << 32) | (b1 << 24) | (b2 << 16) | (b3 << 8) | b4)
                    & 0x07ff_ffff_ffff_ffff)
            }
            0x1E => {
                let b1 = self.read_u8()? as u64;
                let b2 = self.read_u8()? as u64;
                let b3 = self.read_u8()? as u64;
                let b4 = self.read_u8()? as u64;
                let b5 = self.read_u8()? as u64;
                let b6 = self.read_u8()? as u64;
                let b7 = self.read_u8()? as u64;
                Ok(((b0 << 56)
                    | (b1 << 48)
                    | (b2 << 40)
                    | (b3 << 32)
                    | (b4 << 24)
                    | (b5 << 16)
                    | (b6 << 8)
                    | b7)
                    & 0x07ff_ffff_ffff_ffff)
            }
            // 0x1F: the leading byte's low 3 bits select between a 5-byte
            // (40-bit) and an 8-byte (64-bit) tail; the reference
            // implementation dispatches on `case & 7`, but `case` is
            // always 0x1F here so that check can never be true for either
            // arm. Dispatching on the leading byte's own low bits instead
            // is the only way to reach this code at all, and matches the
            // documented "5 or 8 extra bytes" shape.
            0x1F => match b0 & 0x07 {
                0 => {
                    let mut rest = [0u8; 5];
                    self.read_exact(&mut rest)?;
                    let v = (rest[0] as u64) << 32
                        | (rest[1] as u64) << 24
                        | (rest[2] as u64) << 16
                        | (rest[3] as u64) << 8
                        | rest[4] as u64;
                    Ok(v & 0xFF_FFFF_FFFF)
                }
                1 => {
                    let mut rest = [0u8; 8];
                    self.read_exact(&mut rest)?;
                    Ok(u64::from_be_bytes(rest))
                }
                _ => Ok(0),
            },
            _ => Ok(0),
        }
    }

    fn read_packed_u32(&mut self) -> Result<u32> {
        u32::try_from(self.read_packed()?).map_err(|e| anyhow!(e))
    }

    fn read_nul_terminated_pool(&mut self, len: usize) -> Result<Vec<Vec<u8>>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf
            .split(|&b| b == 0)
            .map(|s| s.to_vec())
            .collect::<Vec<_>>())
    }
}

impl<R: Read + ?Sized> TagRead for R {}

/// Extension trait mirroring `TagRead` for the write direction.
pub trait TagWrite: Write {
    fn write_u8(&mut self, v: u8) -> Result<()> {
        Ok(self.write_all(&[v])?)
    }

    fn write_u16(&mut self, v: u16) -> Result<()> {
        Ok(self.write_all(&v.to_le_bytes())?)
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        Ok(self.write_all(&v.to_le_bytes())?)
    }

    fn write_u64(&mut self, v: u64) -> Result<()> {
        Ok(self.write_all(&v.to_le_bytes())?)
    }

    fn write_i64(&mut self, v: i64) -> Result<()> {
        self.write_u64(v as u64)
    }

    fn write_f32(&mut self, v: f32) -> Result<()> {
        Ok(self.write_all(&v.to_le_bytes())?)
    }

    fn write_u32_be(&mut self, v: u32) -> Result<()> {
        Ok(self.write_all(&v.to_be_bytes())?)
    }

    /// Writes the narrowest of the four classes the encoder ever produces
    /// (7/14/21/27 bits). Wider classes are decode-only.
    fn write_packed(&mut self, value: u64) -> Result<()> {
        if value < 0x80 {
            self.write_u8(value as u8)
        } else if value < 0x4000 {
            let v = (value as u16) | 0x8000;
            Ok(self.write_all(&v.to_be_bytes())?)
        } else if value < 0x20_0000 {
            self.write_u8(((value >> 16) as u8) | 0xC0)?;
            let low = (value & 0xFFFF) as u16;
            Ok(self.write_all(&low.to_be_bytes())?)
        } else if value < 0x0800_0000 {
            let v = (value as u32) | 0xE000_0000;
            Ok(self.write_all(&v.to_be_bytes())?)
        } else {
            Err(anyhow!("packed integer {value} too large for the writer's classes"))
        }
    }

    fn write_nul_terminated_pool(&mut self, strings: &[Vec<u8>]) -> Result<()> {
        for s in strings {
            self.write_all(s)?;
            self.write_u8(0)?;
        }
        Ok(())
    }
}

impl<W: Write + ?Sized> TagWrite for W {}

/// Rounds `n` up to the next power of two, treating 1 specially (the
/// reference implementation special-cases it to 2 rather than leaving it
/// at 1, so a byte-aligned field still gets a one-byte pad slot).
pub fn next_power_of_two(n: u32) -> u32 {
    if n == 1 {
        return 2;
    }
    if n == 0 {
        return 0;
    }
    n.next_power_of_two()
}
