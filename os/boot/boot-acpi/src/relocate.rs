//! # RSDP Relocation
//!
//! Kernels booted without EFI only look for the RSDP in the first KiB of the
//! EBDA and in the legacy BIOS area. [`relocate_rsdp`] copies an RSDP found
//! elsewhere (e.g. via the EFI system table) into that first KiB.
//!
//! If the window has no free slot, the EBDA is extended downwards by 1 KiB:
//! the segment pointer at `0x40E` and the base memory size at `0x413` are
//! lowered and the RSDP goes into the new, empty first KiB.

use crate::HEADER_LENGTH;
use crate::PhysicalAddress;
use crate::ebda::{
    EBDA_LENGTH_UNIT, EBDA_MAX_LENGTH, EBDA_POINTER_OFFSET, Ebda, EbdaError, read_ebda, write_ebda,
};
use crate::locator::LEGACY_SCAN_RANGE;
use crate::rsdp::Rsdp;
use std::io::{Read, Seek, SeekFrom, Write};

/// Only this many leading EBDA bytes are searched for the RSDP.
pub const EBDA_SCAN_WINDOW: usize = 1024;

/// BIOS data area word holding the base memory size in KiB.
pub const BASE_MEMORY_SIZE_OFFSET: u64 = 0x413;

/// The EBDA is never moved below this address.
pub const EBDA_LOWEST_BASE: u64 = 0x8_0000;

/// The first slot is never used; the KiB count lives there.
const FIRST_SLOT: usize = 16;

fn scan_window(ebda: &Ebda) -> u64 {
    ebda.length.min(EBDA_SCAN_WINDOW as u64)
}

/// Offset of the last 16-byte aligned, all-zero, RSDP-sized slot within the
/// first KiB of `data`.
fn free_slot(data: &[u8]) -> Option<usize> {
    let window = &data[..data.len().min(EBDA_SCAN_WINDOW)];
    let last = window.len().checked_sub(HEADER_LENGTH)?;
    (FIRST_SLOT..=last)
        .rev()
        .filter(|off| off % FIRST_SLOT == 0)
        .find(|&off| window[off..off + HEADER_LENGTH].iter().all(|&b| b == 0))
}

/// Prepend 1 KiB of zeros and lower the base accordingly.
fn extend_down(ebda: &mut Ebda) -> Result<(), EbdaError> {
    let new_length = ebda.length + EBDA_LENGTH_UNIT;
    let new_base = ebda.base_offset.as_u64().saturating_sub(EBDA_LENGTH_UNIT);
    if new_base < EBDA_LOWEST_BASE || new_length > EBDA_MAX_LENGTH {
        return Err(EbdaError::NoRoom(EBDA_LENGTH_UNIT));
    }

    let mut data = vec![0u8; EBDA_SCAN_WINDOW];
    data.append(&mut ebda.data);
    ebda.data = data;
    ebda.length = new_length;
    ebda.base_offset = PhysicalAddress::new(new_base);
    log::debug!(
        "extended EBDA down to {}, 0x{new_length:x} bytes",
        ebda.base_offset
    );
    Ok(())
}

fn write_u16_at<F: Write + Seek>(mem: &mut F, at: u64, value: u16) -> Result<(), EbdaError> {
    mem.seek(SeekFrom::Start(at))
        .map_err(EbdaError::io("seek to the BIOS data area"))?;
    mem.write_all(&value.to_le_bytes())
        .map_err(EbdaError::io("write the BIOS data area"))
}

fn read_u16_at<F: Read + Seek>(mem: &mut F, at: u64) -> Result<u16, EbdaError> {
    let mut b = [0u8; 2];
    mem.seek(SeekFrom::Start(at))
        .map_err(EbdaError::io("seek to the BIOS data area"))?;
    mem.read_exact(&mut b)
        .map_err(EbdaError::io("read the BIOS data area"))?;
    Ok(u16::from_le_bytes(b))
}

/// Point the BIOS data area at a moved EBDA.
fn publish_base<F: Read + Write + Seek>(mem: &mut F, base: PhysicalAddress) -> Result<(), EbdaError> {
    let segment = u16::try_from(base.as_u64() >> 4).map_err(|_| EbdaError::NoRoom(EBDA_LENGTH_UNIT))?;
    let kib = u16::try_from(base.as_u64() / EBDA_LENGTH_UNIT)
        .map_err(|_| EbdaError::NoRoom(EBDA_LENGTH_UNIT))?;

    write_u16_at(mem, EBDA_POINTER_OFFSET, segment)?;
    if read_u16_at(mem, BASE_MEMORY_SIZE_OFFSET)? > kib {
        write_u16_at(mem, BASE_MEMORY_SIZE_OFFSET, kib)?;
    }
    Ok(())
}

/// Make `rsdp` reachable by a legacy scan.
///
/// Returns `rsdp` unchanged if it already lies in the legacy BIOS area or
/// in the first KiB of the EBDA; otherwise returns the copy placed there.
///
/// # Errors
/// [`EbdaError::NoRoom`] if the first KiB is full and the EBDA cannot be
/// extended downwards, [`EbdaError::VerifyMismatch`] if the EBDA reads back
/// differently, or any error of [`read_ebda`] and [`write_ebda`].
pub fn relocate_rsdp<F: Read + Write + Seek>(mem: &mut F, rsdp: &Rsdp) -> Result<Rsdp, EbdaError> {
    let base = rsdp.base();
    if LEGACY_SCAN_RANGE.contains(&base.as_u64()) {
        log::debug!("RSDP at {base} is in the legacy BIOS area");
        return Ok(rsdp.clone());
    }

    let mut ebda = read_ebda(mem)?;
    let window = ebda.base_offset.as_u64()..ebda.base_offset.as_u64() + scan_window(&ebda);
    if window.contains(&base.as_u64()) {
        log::debug!("RSDP at {base} is already in the EBDA scan window");
        return Ok(rsdp.clone());
    }

    let slot = if let Some(slot) = free_slot(&ebda.data) {
        slot
    } else {
        extend_down(&mut ebda)?;
        free_slot(&ebda.data).ok_or(EbdaError::NoRoom(EBDA_LENGTH_UNIT))?
    };
    ebda.data[slot..slot + HEADER_LENGTH].copy_from_slice(rsdp.all_data());

    write_ebda(&mut ebda, mem)?;
    if ebda.base_offset.as_u64() != window.start {
        publish_base(mem, ebda.base_offset)?;
    }

    if read_ebda(mem)? != ebda {
        return Err(EbdaError::VerifyMismatch);
    }

    let mut moved = rsdp.clone();
    moved.set_base(ebda.base_offset + slot as u64);
    log::info!("relocated RSDP from {base} to {}", moved.base());
    Ok(moved)
}
