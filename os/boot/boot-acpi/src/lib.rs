//! # ACPI and EBDA Support for Boot Loaders
//!
//! This crate locates, parses and re-serializes the ACPI (Advanced
//! Configuration and Power Interface) firmware tables and the legacy Extended
//! BIOS Data Area (EBDA) on x86 platforms. It is used from userspace on a
//! LinuxBoot-style loader that must hand a cleanly relocated RSDP and table
//! set over to the kernel it boots.
//!
//! ## Architecture
//!
//! ```text
//! /sys/firmware/efi/systab ─┐
//! EBDA (0x40E pointer) ─────┼─→ RSDP (Root System Description Pointer)
//! 0xE0000..0xFFFF0 ─────────┘       ↓
//!                              RSDT/XSDT (Root/Extended System Description Table)
//!                                   ↓
//!                              Individual ACPI Tables (FADT, MADT, DSDT, iBFT, ...)
//! ```
//!
//! ## Key Components
//!
//! ### Physical Memory Access ([`PhysMemRo`])
//! Physical memory is consumed as a seekable byte medium (`/dev/mem` in
//! production, an in-memory [`std::io::Cursor`] in tests). Every read goes
//! through [`std::io::Read`] + [`std::io::Seek`]; writes additionally require
//! [`std::io::Write`].
//!
//! ### EBDA ([`ebda`])
//! * **Discovery**: 16-bit segment pointer at physical `0x40E`
//! * **Length**: KiB count in the first byte, or the distance to the next
//!   64 KiB boundary if that byte is zero
//! * **Write-back**: validated length, re-encoded KiB count
//!
//! ### RSDP Discovery ([`rsdp`], [`locator`])
//! * **EFI systab**: `ACPI20=`/`ACPI=` entries
//! * **EBDA scan**: 16-byte aligned signature scan over the EBDA
//! * **Legacy scan**: 16-byte aligned signature scan over `0xE0000..0xFFFF0`
//!
//! ### Table Codecs ([`header`], [`raw`], [`generic`], [`sdt`], [`heap`])
//! * **Header codec**: ordered, typed header fields
//! * **Generic tables**: header + opaque body, length and checksum recomputed
//! * **Heap tables**: inline head fields referencing a trailing heap
//! * **Boot performance** ([`fpdt`]): FPDT pointer and FBPT records
//!
//! ## Usage Patterns
//!
//! ```rust,no_run
//! use boot_acpi::{Firmware, locator::RsdpLocator};
//!
//! let firmware = Firmware::default();
//! let rsdp = RsdpLocator::platform(&firmware).locate().expect("no RSDP");
//! println!("RSDP at {}, SDT at 0x{:x}", rsdp.base(), rsdp.sdt_addr());
//! ```
//!
//! ## Safety Considerations
//!
//! Nothing here dereferences raw pointers; all firmware data is copied out of
//! the medium first. Concurrent writers to `/dev/mem` can still race, so
//! callers that write should serialize their access (e.g. `flock`).

pub mod address;
pub mod ebda;
#[cfg(feature = "fpdt")]
pub mod fpdt;
pub mod generic;
pub mod header;
pub mod heap;
#[cfg(feature = "ibft")]
pub mod ibft;
pub mod locator;
pub mod raw;
pub mod relocate;
pub mod rsdp;
pub mod sdt;
pub mod table;

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::PathBuf;

pub use address::PhysicalAddress;

/// Length of the common ACPI table header, which is also the size of an RSDP.
pub const HEADER_LENGTH: usize = 36;

/// Default location of the raw physical memory device.
pub const DEV_MEM: &str = "/dev/mem";

/// Default location of the EFI system table dump.
pub const EFI_SYSTAB: &str = "/sys/firmware/efi/systab";

/// Default location of the kernel's ACPI table export.
pub const SYSFS_TABLES: &str = "/sys/firmware/acpi/tables";

/// Open a *read-only* view onto physical memory.
/// You provide the implementation (`/dev/mem`, a test buffer, etc.).
pub trait PhysMemRo {
    type Reader: Read + Seek;

    /// Open a fresh handle. Every discovery strategy opens (and drops) its own.
    ///
    /// # Errors
    /// Any error of the underlying medium, e.g. missing permissions.
    fn open_ro(&self) -> io::Result<Self::Reader>;
}

impl<'a> PhysMemRo for &'a [u8] {
    type Reader = io::Cursor<&'a [u8]>;

    fn open_ro(&self) -> io::Result<Self::Reader> {
        Ok(io::Cursor::new(*self))
    }
}

/// Where the platform exposes its firmware interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firmware {
    /// Raw physical memory device.
    pub dev_mem: PathBuf,
    /// EFI system table text file.
    pub efi_systab: PathBuf,
    /// Directory holding one file per ACPI table.
    pub sysfs_tables: PathBuf,
}

impl Default for Firmware {
    fn default() -> Self {
        Self {
            dev_mem: PathBuf::from(DEV_MEM),
            efi_systab: PathBuf::from(EFI_SYSTAB),
            sysfs_tables: PathBuf::from(SYSFS_TABLES),
        }
    }
}

impl PhysMemRo for Firmware {
    type Reader = File;

    fn open_ro(&self) -> io::Result<File> {
        File::open(&self.dev_mem)
    }
}

/// Wrapping byte sum; a valid ACPI structure sums to zero.
#[must_use]
pub fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |a, &b| a.wrapping_add(b))
}

/// The byte that, added to `bytes`, makes the total sum zero (mod 256).
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    sum(bytes).wrapping_neg()
}

/// Parse `0x`-prefixed hex or plain decimal.
pub(crate) fn parse_u64(s: &str) -> Result<u64, core::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
}
