//! FourCC-tagged, length-prefixed section framing.
//!
//! Every section in the container is `[u32 BE length|flag][4-byte tag][body]`.
//! The top bit of the length field (`0x8000_0000`) marks a "container"
//! section (one that nests further sections rather than holding raw data);
//! `TAG0`/`TYPE`/`INDX` are written without it, everything nested inside
//! `DATA` is written with it. On read the bit is simply masked off before
//! computing how many bytes of body remain.

use std::io::{Read, Seek, SeekFrom, Write};

use anyhow::Result;

use crate::error::Error;
use crate::primitive::{next_power_of_two, TagRead, TagWrite};

const CONTAINER_BIT: u32 = 0x4000_0000;
const LENGTH_MASK: u32 = !CONTAINER_BIT;

/// A single section header as read off the wire, with the body bounds
/// already resolved to absolute stream offsets.
pub struct SectionHeader {
    pub signature: [u8; 4],
    pub is_container: bool,
    /// Offset of the first byte of the body (just past the 8-byte header).
    pub body_start: u64,
    /// Offset one past the last byte of the body.
    pub body_end: u64,
}

impl SectionHeader {
    pub fn len(&self) -> u64 {
        self.body_end - self.body_start
    }
}

/// Reads one section header, checking its signature against the accepted
/// set. `expected` should list every signature this call site is willing to
/// see (most sites accept exactly one; a few, like the top-level container,
/// accept `TAG0` or `TCM0`).
pub fn read_section_header<R: Read + Seek>(
    r: &mut R,
    expected: &'static [&'static str],
) -> Result<SectionHeader> {
    let raw_len = r.read_u32_be()?;
    let mut sig = [0u8; 4];
    r.read_exact(&mut sig)?;

    let matches = expected.iter().any(|s| s.as_bytes() == sig);
    if !matches {
        return Err(Error::BadSignature {
            expected,
            found: sig,
        }
        .into());
    }

    let is_container = raw_len & CONTAINER_BIT != 0;
    let len = (raw_len & LENGTH_MASK) as u64;
    let body_start = r.stream_position()?;
    anyhow::ensure!(len >= 8, "section {:?} shorter than its own header", sig);
    let body_end = body_start + (len - 8);

    Ok(SectionHeader {
        signature: sig,
        is_container,
        body_start,
        body_end,
    })
}

/// Seeks past whatever remains of a section's body, regardless of how much
/// of it the caller actually consumed. Every nested-section read ends with
/// this, mirroring the reference reader's scoped exit.
pub fn skip_to_section_end<R: Seek>(r: &mut R, header: &SectionHeader) -> Result<()> {
    r.seek(SeekFrom::Start(header.body_end))?;
    Ok(())
}

/// Scoped section writer. `enter` reserves the 8-byte header (length filled
/// in later) and writes the signature; `exit` pads the body to 4-byte
/// alignment, then backpatches the header with the real length.
pub struct SectionWriter {
    header_offset: u64,
    is_container: bool,
}

pub fn begin_section<W: Write + Seek>(
    w: &mut W,
    signature: &[u8; 4],
    is_container: bool,
) -> Result<SectionWriter> {
    let header_offset = w.stream_position()?;
    w.write_u32_be(0)?;
    w.write_all(signature)?;
    Ok(SectionWriter {
        header_offset,
        is_container,
    })
}

impl SectionWriter {
    pub fn end<W: Write + Seek>(self, w: &mut W) -> Result<()> {
        pad_to(w, 4)?;
        let end_offset = w.stream_position()?;
        let body_len = end_offset - self.header_offset;
        let mut raw_len = u32::try_from(body_len)?;
        if self.is_container {
            raw_len |= CONTAINER_BIT;
        }
        w.seek(SeekFrom::Start(self.header_offset))?;
        w.write_u32_be(raw_len)?;
        w.seek(SeekFrom::Start(end_offset))?;
        Ok(())
    }
}

/// Pads the stream with NUL bytes up to the next multiple of `align`
/// (which must itself be a power of two), relative to the start of the
/// stream.
pub fn pad_to<W: Write + Seek>(w: &mut W, align: u64) -> Result<()> {
    let pos = w.stream_position()?;
    let aligned = next_power_of_two(align as u32) as u64;
    let rem = pos % aligned;
    if rem != 0 {
        let fill = aligned - rem;
        w.write_all(&vec![0u8; fill as usize])?;
    }
    Ok(())
}
