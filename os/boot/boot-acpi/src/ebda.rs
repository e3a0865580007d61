//! # EBDA (Extended BIOS Data Area)
//!
//! The EBDA is a legacy low-memory region where firmware stashes small
//! structures, among them (sometimes) the RSDP. Its location is published as
//! a real-mode segment at physical `0x40E`; its size in KiB is stored in the
//! first byte of the region itself.

use crate::PhysicalAddress;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Physical location of the 16-bit EBDA segment pointer.
pub const EBDA_POINTER_OFFSET: u64 = 0x40E;

/// If the length byte is zero, the EBDA is assumed to run to the end of
/// its 64 KiB segment.
pub const EBDA_SEGMENT_SIZE: u64 = 0x1_0000;

/// The EBDA length is stored in units of 1 KiB.
pub const EBDA_LENGTH_UNIT: u64 = 1024;

/// Largest length that still fits the one-byte KiB count.
pub const EBDA_MAX_LENGTH: u64 = 255 * EBDA_LENGTH_UNIT;

#[derive(Debug, thiserror::Error)]
pub enum EbdaError {
    #[error("failed to {op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("EBDA pointer at 0x40E is zero, no EBDA present")]
    PointerZero,
    #[error("EBDA length 0x{0:x} is not a multiple of 1 KiB")]
    LengthUnaligned(u64),
    #[error("EBDA length 0x{length:x} does not match the data length 0x{data:x}")]
    LengthMismatch { length: u64, data: u64 },
    #[error("EBDA length 0x{0:x} exceeds 255 KiB and cannot be encoded")]
    LengthTooLarge(u64),
    #[error("EBDA has no room for 0x{0:x} more bytes")]
    NoRoom(u64),
    #[error("EBDA content read back differs from what was written")]
    VerifyMismatch,
}

impl EbdaError {
    pub(crate) fn io(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { op, source }
    }
}

/// A snapshot of the EBDA as found in physical memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ebda {
    /// Physical address of the first byte of the region.
    pub base_offset: PhysicalAddress,
    /// Length in bytes; a multiple of 1 KiB when written back.
    pub length: u64,
    /// Raw content; `data[0]` is the KiB count.
    pub data: Vec<u8>,
}

impl Ebda {
    /// One past the last byte of the region.
    #[must_use]
    pub fn end(&self) -> PhysicalAddress {
        self.base_offset + self.length
    }

    /// Whether `addr` falls inside the region.
    #[must_use]
    pub fn contains(&self, addr: PhysicalAddress) -> bool {
        addr >= self.base_offset && addr < self.end()
    }
}

/// Read the EBDA base from the segment pointer at `0x40E`.
///
/// # Errors
/// [`EbdaError::PointerZero`] if no EBDA is published, [`EbdaError::Io`] if
/// the medium cannot be seeked or read.
pub fn find_ebda_offset<R: Read + Seek>(mem: &mut R) -> Result<PhysicalAddress, EbdaError> {
    mem.seek(SeekFrom::Start(EBDA_POINTER_OFFSET))
        .map_err(EbdaError::io("seek to the EBDA pointer"))?;

    let mut ptr = [0u8; 2];
    mem.read_exact(&mut ptr)
        .map_err(EbdaError::io("read the EBDA pointer"))?;

    let segment = u16::from_le_bytes(ptr);
    if segment == 0 {
        return Err(EbdaError::PointerZero);
    }
    Ok(PhysicalAddress::from_segment(segment))
}

/// Read the whole EBDA region.
///
/// # Errors
/// Any failure of [`find_ebda_offset`] or of the subsequent seeks and reads.
/// There is no partial result.
pub fn read_ebda<R: Read + Seek>(mem: &mut R) -> Result<Ebda, EbdaError> {
    let base = find_ebda_offset(mem)?;

    mem.seek(SeekFrom::Start(base.as_u64()))
        .map_err(EbdaError::io("seek to the EBDA"))?;
    let mut kib = [0u8; 1];
    mem.read_exact(&mut kib)
        .map_err(EbdaError::io("read the EBDA length"))?;

    let length = if kib[0] == 0 {
        // No size recorded; assume it runs to the end of the segment.
        base.to_next_boundary(EBDA_SEGMENT_SIZE)
    } else {
        u64::from(kib[0]) * EBDA_LENGTH_UNIT
    };
    log::debug!("EBDA at {base}, length 0x{length:x}");

    let len = usize::try_from(length).map_err(|_| EbdaError::LengthTooLarge(length))?;
    let mut data = vec![0u8; len];
    mem.seek(SeekFrom::Start(base.as_u64()))
        .map_err(EbdaError::io("seek to the EBDA"))?;
    mem.read_exact(&mut data)
        .map_err(EbdaError::io("read the EBDA"))?;

    Ok(Ebda {
        base_offset: base,
        length,
        data,
    })
}

/// Write `ebda` back to physical memory.
///
/// Re-derives the base if it is unset, re-encodes the KiB count into
/// `ebda.data[0]` and writes the whole buffer. The write is not verified.
///
/// # Errors
/// One distinct error per violated length invariant (nothing is written in
/// that case), or [`EbdaError::Io`] if the medium fails.
pub fn write_ebda<F: Read + Write + Seek>(ebda: &mut Ebda, mem: &mut F) -> Result<(), EbdaError> {
    if ebda.base_offset.is_zero() {
        ebda.base_offset = find_ebda_offset(mem)?;
    }

    if ebda.length % EBDA_LENGTH_UNIT != 0 {
        return Err(EbdaError::LengthUnaligned(ebda.length));
    }
    let data_len = ebda.data.len() as u64;
    if ebda.length != data_len {
        return Err(EbdaError::LengthMismatch {
            length: ebda.length,
            data: data_len,
        });
    }
    let kib = u8::try_from(ebda.length / EBDA_LENGTH_UNIT)
        .map_err(|_| EbdaError::LengthTooLarge(ebda.length))?;

    // A zero-length region has no length byte to update.
    if let Some(first) = ebda.data.first_mut() {
        *first = kib;
    }

    mem.seek(SeekFrom::Start(ebda.base_offset.as_u64()))
        .map_err(EbdaError::io("seek to the EBDA"))?;
    mem.write_all(&ebda.data)
        .map_err(EbdaError::io("write the EBDA"))?;
    log::debug!(
        "wrote 0x{:x} bytes of EBDA at {}",
        ebda.length,
        ebda.base_offset
    );
    Ok(())
}
