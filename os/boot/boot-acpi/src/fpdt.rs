//! # Firmware Performance Data Table
//!
//! The FPDT is a regular ACPI table whose body is a list of performance
//! records. Record type 0 points at the Firmware Basic Boot Performance
//! Table (FBPT), which is not an ACPI table itself: it has a bare
//! `"FBPT"` + `u32` length header and holds the boot timestamps plus the
//! string event records firmware emitted while loading modules.
//!
//! ```text
//! FPDT ─→ [type 0: FBPT pointer] ─→ FBPT ┬─ [type 2: basic boot record]
//!                                        ├─ [type 0x1011: string event]
//!                                        └─ ...
//! ```

use crate::table::{Table, sig_str};
use crate::{HEADER_LENGTH, PhysMemRo};
use core::fmt;
use std::io::{self, Read, Seek, SeekFrom};

pub const FPDT_SIGNATURE: [u8; 4] = *b"FPDT";
pub const FBPT_SIGNATURE: [u8; 4] = *b"FBPT";

/// Type of the FPDT record pointing at the FBPT.
pub const BASIC_BOOT_POINTER_RECORD: u16 = 0x0;
/// Type of the firmware basic boot record inside the FBPT.
pub const BASIC_BOOT_RECORD: u16 = 0x2;
/// Type of the dynamic string event record inside the FBPT.
pub const DYNAMIC_STRING_EVENT_RECORD: u16 = 0x1011;

/// Reading stops after this many string event records.
pub const MAX_MEASUREMENTS: usize = 2000;

const FBPT_HEADER_LENGTH: u64 = 8;
const RECORD_HEADER_LENGTH: u8 = 4;
/// Record header, hook type, processor, timestamp and GUID.
const STRING_EVENT_FIXED_LENGTH: u8 = 34;
/// Record header, 4 reserved bytes and five timestamps.
const BASIC_BOOT_RECORD_LENGTH: u8 = 48;
const POINTER_RECORD_LENGTH: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum FpdtError {
    #[error("failed to {op} at 0x{addr:x}: {source}")]
    Io {
        op: &'static str,
        addr: u64,
        #[source]
        source: io::Error,
    },
    #[error("expected signature {expected:?}, found {found:?}")]
    BadSignature { expected: String, found: String },
    #[error("record of type 0x{kind:x} at 0x{addr:x} has a length of {length} bytes, too short")]
    RecordTooShort { kind: u16, length: u8, addr: u64 },
    #[error("FPDT has no basic boot performance table pointer")]
    NoFbptPointer,
}

impl FpdtError {
    fn io(op: &'static str, addr: u64) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { op, addr, source }
    }
}

/// The four bytes every performance record starts with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: u16,
    pub length: u8,
    pub revision: u8,
}

impl RecordHeader {
    #[must_use]
    pub const fn from_bytes(b: [u8; 4]) -> Self {
        Self {
            kind: u16::from_le_bytes([b[0], b[1]]),
            length: b[2],
            revision: b[3],
        }
    }
}

/// Boot timestamps in nanoseconds.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct BasicBootRecord {
    pub reset_end: u64,
    pub os_loader_load_image_start: u64,
    pub os_loader_start_image_start: u64,
    pub exit_boot_services_entry: u64,
    pub exit_boot_services_exit: u64,
}

/// An EFI GUID as stored in memory.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct Guid(pub [u8; 16]);

impl fmt::Display for Guid {
    /// The usual `8-4-4-4-12` form; the first three groups are little-endian.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-",
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            u16::from_le_bytes([b[4], b[5]]),
            u16::from_le_bytes([b[6], b[7]]),
        )?;
        for (i, byte) in b[8..].iter().enumerate() {
            if i == 2 {
                f.write_str("-")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// One dynamic string event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementRecord {
    pub hook_type: u16,
    pub processor_identifier: u32,
    /// Nanoseconds.
    pub timestamp: u64,
    /// Module or protocol the event belongs to.
    pub guid: Guid,
    pub description: String,
}

impl MeasurementRecord {
    /// Name of the performance hook, if it is a known one.
    #[must_use]
    pub const fn hook_name(&self) -> Option<&'static str> {
        Some(match self.hook_type {
            0x01 => "MODULE_START_ID",
            0x02 => "MODULE_END_ID",
            0x03 => "MODULE_LOADIMAGE_START_ID",
            0x04 => "MODULE_LOADIMAGE_END_ID",
            0x05 => "MODULE_DB_START_ID",
            0x06 => "MODULE_DB_END_ID",
            0x07 => "MODULE_DB_SUPPORT_START_ID",
            0x08 => "MODULE_DB_SUPPORT_END_ID",
            0x09 => "MODULE_DB_STOP_START_ID",
            0x0A => "MODULE_DB_STOP_END_ID",
            0x10 => "PERF_EVENTSIGNAL_START_ID",
            0x11 => "PERF_EVENTSIGNAL_END_ID",
            0x20 => "PERF_CALLBACK_START_ID",
            0x21 => "PERF_CALLBACK_END_ID",
            0x30 => "PERF_FUNCTION_START_ID",
            0x31 => "PERF_FUNCTION_END_ID",
            0x40 => "PERF_INMODULE_START_ID",
            0x41 => "PERF_INMODULE_END_ID",
            0x50 => "PERF_CROSSMODULE_START_ID",
            0x51 => "PERF_CROSSMODULE_END_ID",
            _ => return None,
        })
    }
}

/// The decoded Firmware Basic Boot Performance Table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fbpt {
    pub address: u64,
    /// Length from the FBPT header, header included.
    pub length: u32,
    pub basic_boot: Option<BasicBootRecord>,
    pub measurements: Vec<MeasurementRecord>,
}

/// The FBPT address carried by an FPDT.
///
/// # Errors
/// [`FpdtError::BadSignature`] if `fpdt` is not an FPDT,
/// [`FpdtError::NoFbptPointer`] if none of its records points at an FBPT.
pub fn fbpt_address(fpdt: &impl Table) -> Result<u64, FpdtError> {
    if fpdt.sig() != FPDT_SIGNATURE {
        return Err(FpdtError::BadSignature {
            expected: sig_str(&FPDT_SIGNATURE),
            found: sig_str(&fpdt.sig()),
        });
    }

    let mut records = &fpdt.data()[HEADER_LENGTH.min(fpdt.data().len())..];
    while records.len() >= usize::from(RECORD_HEADER_LENGTH) {
        let header = RecordHeader::from_bytes([records[0], records[1], records[2], records[3]]);
        let length = usize::from(header.length);
        if length < usize::from(RECORD_HEADER_LENGTH) || length > records.len() {
            break;
        }
        if header.kind == BASIC_BOOT_POINTER_RECORD && length >= POINTER_RECORD_LENGTH {
            let mut addr = [0u8; 8];
            addr.copy_from_slice(&records[8..16]);
            return Ok(u64::from_le_bytes(addr));
        }
        records = &records[length..];
    }
    Err(FpdtError::NoFbptPointer)
}

fn read_array<R: Read, const N: usize>(mem: &mut R, addr: u64) -> Result<[u8; N], FpdtError> {
    let mut b = [0u8; N];
    mem.read_exact(&mut b)
        .map_err(FpdtError::io("read an FBPT record", addr))?;
    Ok(b)
}

fn read_u64<R: Read>(mem: &mut R, addr: u64) -> Result<u64, FpdtError> {
    read_array(mem, addr).map(u64::from_le_bytes)
}

fn read_basic_boot<R: Read>(mem: &mut R, addr: u64) -> Result<BasicBootRecord, FpdtError> {
    let _reserved: [u8; 4] = read_array(mem, addr)?;
    Ok(BasicBootRecord {
        reset_end: read_u64(mem, addr)?,
        os_loader_load_image_start: read_u64(mem, addr)?,
        os_loader_start_image_start: read_u64(mem, addr)?,
        exit_boot_services_entry: read_u64(mem, addr)?,
        exit_boot_services_exit: read_u64(mem, addr)?,
    })
}

fn read_string_event<R: Read>(
    mem: &mut R,
    addr: u64,
    length: u8,
) -> Result<MeasurementRecord, FpdtError> {
    let hook_type = u16::from_le_bytes(read_array(mem, addr)?);
    let processor_identifier = u32::from_le_bytes(read_array(mem, addr)?);
    let timestamp = read_u64(mem, addr)?;
    let guid = Guid(read_array(mem, addr)?);

    let mut text = vec![0u8; usize::from(length - STRING_EVENT_FIXED_LENGTH)];
    mem.read_exact(&mut text)
        .map_err(FpdtError::io("read an FBPT string", addr))?;
    let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());

    Ok(MeasurementRecord {
        hook_type,
        processor_identifier,
        timestamp,
        guid,
        description: String::from_utf8_lossy(&text[..end]).into_owned(),
    })
}

/// Decode the FBPT at `addr`.
///
/// Records of unknown type are skipped. At most [`MAX_MEASUREMENTS`] string
/// event records are kept.
///
/// # Errors
/// [`FpdtError::BadSignature`] if there is no FBPT at `addr`,
/// [`FpdtError::RecordTooShort`] for a record too short for its type, or
/// [`FpdtError::Io`] if the medium ends early.
pub fn read_fbpt<R: Read + Seek>(mem: &mut R, addr: u64) -> Result<Fbpt, FpdtError> {
    mem.seek(SeekFrom::Start(addr))
        .map_err(FpdtError::io("seek to the FBPT", addr))?;
    let sig: [u8; 4] = read_array(mem, addr)?;
    if sig != FBPT_SIGNATURE {
        return Err(FpdtError::BadSignature {
            expected: sig_str(&FBPT_SIGNATURE),
            found: sig_str(&sig),
        });
    }
    let length = u32::from_le_bytes(read_array(mem, addr)?);

    let mut fbpt = Fbpt {
        address: addr,
        length,
        ..Fbpt::default()
    };
    let body = u64::from(length).saturating_sub(FBPT_HEADER_LENGTH);
    let mut offset = 0;
    while offset < body && fbpt.measurements.len() < MAX_MEASUREMENTS {
        let at = addr + FBPT_HEADER_LENGTH + offset;
        let header = RecordHeader::from_bytes(read_array(mem, at)?);
        let too_short = |min: u8| {
            (header.length < min).then_some(FpdtError::RecordTooShort {
                kind: header.kind,
                length: header.length,
                addr: at,
            })
        };

        match header.kind {
            DYNAMIC_STRING_EVENT_RECORD => {
                if let Some(e) = too_short(STRING_EVENT_FIXED_LENGTH) {
                    return Err(e);
                }
                fbpt.measurements
                    .push(read_string_event(mem, at, header.length)?);
            }
            BASIC_BOOT_RECORD => {
                if let Some(e) = too_short(BASIC_BOOT_RECORD_LENGTH) {
                    return Err(e);
                }
                fbpt.basic_boot = Some(read_basic_boot(mem, at)?);
            }
            _ => {
                if let Some(e) = too_short(RECORD_HEADER_LENGTH) {
                    return Err(e);
                }
                log::trace!("skipping FBPT record type 0x{:x} at 0x{at:x}", header.kind);
            }
        }

        offset += u64::from(header.length);
        mem.seek(SeekFrom::Start(addr + FBPT_HEADER_LENGTH + offset))
            .map_err(FpdtError::io("seek to the next FBPT record", at))?;
    }

    log::debug!(
        "FBPT at 0x{addr:x}: {} string events, basic boot record {}",
        fbpt.measurements.len(),
        if fbpt.basic_boot.is_some() { "present" } else { "absent" }
    );
    Ok(fbpt)
}

/// Open `mem` and decode the FBPT at `addr`.
///
/// # Errors
/// As [`read_fbpt`], or [`FpdtError::Io`] if `mem` cannot be opened.
pub fn find_all_fbpt_records<M: PhysMemRo>(mem: &M, addr: u64) -> Result<Fbpt, FpdtError> {
    let mut reader = mem
        .open_ro()
        .map_err(FpdtError::io("open physical memory", addr))?;
    read_fbpt(&mut reader, addr)
}
