//! # RSDP/XSDP (Root/Extended System Description Pointer)

use crate::{HEADER_LENGTH, PhysicalAddress, checksum, sum};
use std::io::{self, Read, Seek, SeekFrom};

/// The 8-byte RSDP signature.
pub const RSDP_SIGNATURE: &[u8; 8] = b"RSD PTR ";

/// [`RSDP_SIGNATURE`] read as one little-endian word, for memory scans.
pub const RSDP_SIGNATURE_WORD: u64 = 0x2052_5450_2044_5352;

/// The RSDP is always 16-byte aligned.
pub const RSDP_ALIGNMENT: u64 = 16;

const CHECKSUM_OFFSET: usize = 8;
const OEM_ID_OFFSET: usize = 9;
const REVISION_OFFSET: usize = 15;
const RSDT_ADDR_OFFSET: usize = 16;
const LENGTH_OFFSET: usize = 20;
const XSDT_ADDR_OFFSET: usize = 24;
const EXT_CHECKSUM_OFFSET: usize = 32;

/// The ACPI 1.0 checksum covers this many leading bytes.
const V1_LENGTH: usize = 20;

/// Revision value for ACPI 2.0 and later.
const REVISION_2: u8 = 2;

/// A copy of the 36-byte RSDP together with the physical address it was
/// found at.
///
/// Layout:
///
/// ```text
/// 0   signature "RSD PTR "   8
/// 8   checksum (0..20)       1
/// 9   OEM ID                 6
/// 15  revision               1
/// 16  RSDT address           4
/// 20  length                 4
/// 24  XSDT address           8
/// 32  extended checksum      1
/// 33  reserved               3
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Rsdp {
    base: PhysicalAddress,
    data: [u8; HEADER_LENGTH],
}

impl Rsdp {
    /// Synthesize an ACPI 2.0 RSDP pointing at an XSDT.
    ///
    /// All fields other than signature, revision, length and XSDT address are
    /// zero; both checksums are generated.
    #[must_use]
    pub fn new(xsdt_addr: u64, len: u32) -> Self {
        let mut data = [0u8; HEADER_LENGTH];
        data[..8].copy_from_slice(RSDP_SIGNATURE);
        data[REVISION_OFFSET] = REVISION_2;
        data[LENGTH_OFFSET..LENGTH_OFFSET + 4].copy_from_slice(&len.to_le_bytes());
        data[XSDT_ADDR_OFFSET..XSDT_ADDR_OFFSET + 8].copy_from_slice(&xsdt_addr.to_le_bytes());

        data[CHECKSUM_OFFSET] = checksum(&data[..V1_LENGTH]);
        data[EXT_CHECKSUM_OFFSET] = checksum(&data);

        Self {
            base: PhysicalAddress::zero(),
            data,
        }
    }

    /// Wrap raw RSDP bytes found at `base`. No validation takes place.
    #[must_use]
    pub const fn from_bytes(base: PhysicalAddress, data: [u8; HEADER_LENGTH]) -> Self {
        Self { base, data }
    }

    /// Read the RSDP at `base` verbatim.
    ///
    /// Neither signature nor checksums are checked; see [`Rsdp::is_valid`].
    ///
    /// # Errors
    /// Seek or read failures of the medium.
    pub fn read_from<R: Read + Seek>(mem: &mut R, base: PhysicalAddress) -> io::Result<Self> {
        mem.seek(SeekFrom::Start(base.as_u64()))?;
        let mut data = [0u8; HEADER_LENGTH];
        mem.read_exact(&mut data)?;
        Ok(Self { base, data })
    }

    /// Physical address the RSDP was read from (zero if synthesized).
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    /// Record a new home, e.g. after relocation.
    pub const fn set_base(&mut self, base: PhysicalAddress) {
        self.base = base;
    }

    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.data[..8]
    }

    #[must_use]
    pub const fn checksum(&self) -> u8 {
        self.data[CHECKSUM_OFFSET]
    }

    #[must_use]
    pub fn oem_id(&self) -> &[u8] {
        &self.data[OEM_ID_OFFSET..REVISION_OFFSET]
    }

    #[must_use]
    pub const fn revision(&self) -> u8 {
        self.data[REVISION_OFFSET]
    }

    #[must_use]
    pub fn rsdt_addr(&self) -> u32 {
        self.read_u32(RSDT_ADDR_OFFSET)
    }

    /// The length field at offset 20.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.read_u32(LENGTH_OFFSET)
    }

    #[must_use]
    pub fn xsdt_addr(&self) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.data[XSDT_ADDR_OFFSET..XSDT_ADDR_OFFSET + 8]);
        u64::from_le_bytes(b)
    }

    #[must_use]
    pub const fn extended_checksum(&self) -> u8 {
        self.data[EXT_CHECKSUM_OFFSET]
    }

    /// Address of the system description table.
    ///
    /// A non-zero 32-bit RSDT address wins; otherwise the 64-bit XSDT
    /// address is used.
    #[must_use]
    pub fn sdt_addr(&self) -> u64 {
        match self.rsdt_addr() {
            0 => self.xsdt_addr(),
            rsdt => u64::from(rsdt),
        }
    }

    /// Size of the structure in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub const fn all_data(&self) -> &[u8; HEADER_LENGTH] {
        &self.data
    }

    /// Bytes past the fixed structure; always empty for a 36-byte RSDP.
    #[must_use]
    pub fn table_data(&self) -> &[u8] {
        &self.data[HEADER_LENGTH..]
    }

    /// Signature and both checksums are intact.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.signature() == RSDP_SIGNATURE
            && sum(&self.data[..V1_LENGTH]) == 0
            && sum(&self.data) == 0
    }

    fn read_u32(&self, off: usize) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.data[off..off + 4]);
        u32::from_le_bytes(b)
    }
}

impl core::fmt::Debug for Rsdp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Rsdp")
            .field("base", &self.base)
            .field("oem_id", &String::from_utf8_lossy(self.oem_id()))
            .field("revision", &self.revision())
            .field("rsdt_addr", &format_args!("0x{:x}", self.rsdt_addr()))
            .field("xsdt_addr", &format_args!("0x{:x}", self.xsdt_addr()))
            .finish_non_exhaustive()
    }
}
