//! Table file footer and size caps.
//!
//! The footer is fixed-size and sits at the very end of the file:
//!
//! ```text
//! [bloom_offset: u64 LE][index_offset: u64 LE][magic: u32 LE]
//! ```
//!
//! `bloom_offset` is also the exclusive end of the data section, which is
//! what sequential iteration bounds itself by.

use std::io::{Read, Seek, SeekFrom, Write};

use anyhow::{bail, ensure, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Magic number identifying a table file (ASCII "KVT1").
pub const TABLE_MAGIC: u32 = 0x3154_564B;

/// Footer size: 8 (`bloom_offset`) + 8 (`index_offset`) + 4 (`magic`).
pub const FOOTER_BYTES: u64 = 8 + 8 + 4;

/// Largest user key the reader will allocate for (64 KiB).
pub(crate) const MAX_KEY_BYTES: usize = 64 * 1024;

/// Largest record body the reader will allocate for (16 MiB); a corrupt
/// length prefix must not drive allocation.
pub(crate) const MAX_RECORD_BYTES: usize = 16 * 1024 * 1024;

/// Parsed table footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footer {
    pub bloom_offset: u64,
    pub index_offset: u64,
}

/// Appends the footer to `w`.
pub(crate) fn write_footer<W: Write>(w: &mut W, footer: Footer) -> Result<()> {
    w.write_u64::<LittleEndian>(footer.bloom_offset)?;
    w.write_u64::<LittleEndian>(footer.index_offset)?;
    w.write_u32::<LittleEndian>(TABLE_MAGIC)?;
    Ok(())
}

/// Seeks to the end of `r`, reads the footer, and validates the magic and
/// the section offsets against the file size.
pub(crate) fn read_footer<R: Read + Seek>(r: &mut R) -> Result<(Footer, u64)> {
    let file_size = r.seek(SeekFrom::End(0))?;
    ensure!(file_size >= FOOTER_BYTES, "file too small for a table footer");

    r.seek(SeekFrom::End(-(FOOTER_BYTES as i64)))?;
    let bloom_offset = r.read_u64::<LittleEndian>()?;
    let index_offset = r.read_u64::<LittleEndian>()?;
    let magic = r.read_u32::<LittleEndian>()?;

    if magic != TABLE_MAGIC {
        bail!("bad table magic {:#010x}", magic);
    }
    ensure!(
        bloom_offset <= index_offset && index_offset <= file_size - FOOTER_BYTES,
        "table section offsets out of bounds (bloom {}, index {}, file {})",
        bloom_offset,
        index_offset,
        file_size
    );

    Ok((
        Footer {
            bloom_offset,
            index_offset,
        },
        file_size,
    ))
}
