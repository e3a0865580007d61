//! # RSDP Discovery
//!
//! The RSDP can live in three places, and firmware is not obliged to tell us
//! which. [`RsdpLocator`] tries an ordered list of [`RsdpSource`]s and returns
//! the first RSDP any of them produces:
//!
//! 1. [`EfiSystab`]: the `ACPI20=`/`ACPI=` lines the kernel exports from the
//!    EFI configuration table,
//! 2. [`EbdaScan`]: a signature scan over the EBDA,
//! 3. [`LegacyScan`]: a signature scan over `0xE0000..0xFFFF0`.
//!
//! A failing source is logged and skipped. Only when every source fails does
//! the locator report [`LocateError::NotFound`]; the individual failures are
//! available through [`RsdpLocator::locate_with_diagnostics`].

use crate::ebda::{EbdaError, read_ebda};
use crate::rsdp::{RSDP_ALIGNMENT, RSDP_SIGNATURE_WORD, Rsdp};
use crate::{Firmware, PhysMemRo, PhysicalAddress, parse_u64};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Legacy BIOS area searched for the RSDP.
pub const LEGACY_SCAN_RANGE: Range<u64> = 0xE_0000..0xF_FFF0;

const ACPI20_KEY: &str = "ACPI20=";
const ACPI_KEY: &str = "ACPI=";

#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("failed to {op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Ebda(#[from] EbdaError),
    #[error("no readable ACPI entry in {}", .0.display())]
    NoSystabEntry(PathBuf),
    #[error("RSDP signature not found in 0x{:x}..0x{:x}", .0.start, .0.end)]
    SignatureNotFound(Range<u64>),
    #[error("cannot find an RSDP")]
    NotFound,
}

/// One way of finding the RSDP.
pub trait RsdpSource {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Try to produce the RSDP.
    ///
    /// # Errors
    /// Whatever kept this source from finding an RSDP.
    fn locate(&self) -> Result<Rsdp, LocateError>;
}

/// A source that failed, as reported by [`RsdpLocator::locate_with_diagnostics`].
#[derive(Debug)]
pub struct SourceFailure {
    pub source: &'static str,
    pub error: LocateError,
}

/// Tries its sources in order; the first success wins.
pub struct RsdpLocator<'a> {
    sources: Vec<Box<dyn RsdpSource + 'a>>,
}

impl<'a> RsdpLocator<'a> {
    #[must_use]
    pub fn new(sources: Vec<Box<dyn RsdpSource + 'a>>) -> Self {
        Self { sources }
    }

    /// The standard order: EFI systab, EBDA scan, legacy scan.
    #[must_use]
    pub fn platform(firmware: &'a Firmware) -> Self {
        Self::with_memory(&firmware.efi_systab, firmware)
    }

    /// The standard order over an arbitrary memory medium.
    #[must_use]
    pub fn with_memory<M: PhysMemRo>(systab: &Path, mem: &'a M) -> Self {
        Self::new(vec![
            Box::new(EfiSystab::new(systab, mem)),
            Box::new(EbdaScan::new(mem)),
            Box::new(LegacyScan::new(mem)),
        ])
    }

    /// First RSDP any source yields.
    ///
    /// # Errors
    /// [`LocateError::NotFound`] if every source failed. Per-source errors are
    /// logged and dropped.
    pub fn locate(&self) -> Result<Rsdp, LocateError> {
        self.locate_with_diagnostics().0
    }

    /// Like [`RsdpLocator::locate`], but also hands back the failures of the
    /// sources tried before the winner (or of all sources).
    pub fn locate_with_diagnostics(&self) -> (Result<Rsdp, LocateError>, Vec<SourceFailure>) {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.locate() {
                Ok(rsdp) => {
                    log::debug!("RSDP found via {} at {}", source.name(), rsdp.base());
                    return (Ok(rsdp), failures);
                }
                Err(error) => {
                    log::warn!("RSDP lookup via {} failed: {error}", source.name());
                    failures.push(SourceFailure {
                        source: source.name(),
                        error,
                    });
                }
            }
        }
        (Err(LocateError::NotFound), failures)
    }
}

/// Locate the RSDP on this machine using the default paths.
///
/// # Errors
/// [`LocateError::NotFound`] if no strategy succeeds.
pub fn get_rsdp() -> Result<Rsdp, LocateError> {
    let firmware = Firmware::default();
    RsdpLocator::platform(&firmware).locate()
}

/// Reads the RSDP address from the EFI system table text file.
pub struct EfiSystab<'a, M> {
    path: PathBuf,
    mem: &'a M,
}

impl<'a, M: PhysMemRo> EfiSystab<'a, M> {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, mem: &'a M) -> Self {
        Self {
            path: path.into(),
            mem,
        }
    }
}

/// The address carried by an `ACPI20=` or `ACPI=` line, if any.
fn systab_address(line: &str) -> Option<&str> {
    line.strip_prefix(ACPI20_KEY)
        .or_else(|| line.strip_prefix(ACPI_KEY))
        .map(str::trim)
}

impl<M: PhysMemRo> RsdpSource for EfiSystab<'_, M> {
    fn name(&self) -> &'static str {
        "EFI systab"
    }

    fn locate(&self) -> Result<Rsdp, LocateError> {
        let file = File::open(&self.path).map_err(|source| LocateError::Open {
            path: self.path.clone(),
            source,
        })?;

        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| LocateError::Io {
                    op: "read the EFI systab",
                    source,
                })?;
            if n == 0 {
                break;
            }
            // entries are ASCII; anything else is just not an entry
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end();
            let Some(value) = systab_address(line) else {
                continue;
            };
            let base = match parse_u64(value) {
                Ok(base) => PhysicalAddress::new(base),
                Err(e) => {
                    log::debug!("skipping systab entry {line:?}: {e}");
                    continue;
                }
            };
            let rsdp = self
                .mem
                .open_ro()
                .and_then(|mut mem| Rsdp::read_from(&mut mem, base));
            match rsdp {
                Ok(rsdp) => return Ok(rsdp),
                Err(e) => log::debug!("cannot read RSDP at {base}: {e}"),
            }
        }

        Err(LocateError::NoSystabEntry(self.path.clone()))
    }
}

/// Scans the EBDA for the RSDP signature.
pub struct EbdaScan<'a, M> {
    mem: &'a M,
}

impl<'a, M: PhysMemRo> EbdaScan<'a, M> {
    #[must_use]
    pub const fn new(mem: &'a M) -> Self {
        Self { mem }
    }
}

impl<M: PhysMemRo> RsdpSource for EbdaScan<'_, M> {
    fn name(&self) -> &'static str {
        "EBDA scan"
    }

    fn locate(&self) -> Result<Rsdp, LocateError> {
        let mut mem = self.mem.open_ro().map_err(|source| LocateError::Io {
            op: "open physical memory",
            source,
        })?;
        let ebda = read_ebda(&mut mem)?;
        let range = ebda.base_offset.as_u64()..ebda.end().as_u64();
        let base = scan_for_signature(ebda.base_offset, &ebda.data)
            .ok_or(LocateError::SignatureNotFound(range))?;
        read_rsdp(&mut mem, base)
    }
}

/// Scans the legacy BIOS area for the RSDP signature.
pub struct LegacyScan<'a, M> {
    mem: &'a M,
}

impl<'a, M: PhysMemRo> LegacyScan<'a, M> {
    #[must_use]
    pub const fn new(mem: &'a M) -> Self {
        Self { mem }
    }
}

impl<M: PhysMemRo> RsdpSource for LegacyScan<'_, M> {
    fn name(&self) -> &'static str {
        "legacy scan"
    }

    fn locate(&self) -> Result<Rsdp, LocateError> {
        let mut mem = self.mem.open_ro().map_err(|source| LocateError::Io {
            op: "open physical memory",
            source,
        })?;
        let base = scan_memory(&mut mem, LEGACY_SCAN_RANGE)?;
        read_rsdp(&mut mem, base)
    }
}

/// Scan `range` of physical memory for the RSDP signature.
///
/// # Errors
/// [`LocateError::Io`] if the range cannot be read,
/// [`LocateError::SignatureNotFound`] if there is no aligned match.
pub fn scan_memory<R: Read + Seek>(
    mem: &mut R,
    range: Range<u64>,
) -> Result<PhysicalAddress, LocateError> {
    let len = usize::try_from(range.end.saturating_sub(range.start))
        .map_err(|_| LocateError::SignatureNotFound(range.clone()))?;
    let mut window = vec![0u8; len];
    mem.seek(SeekFrom::Start(range.start))
        .and_then(|_| mem.read_exact(&mut window))
        .map_err(|source| LocateError::Io {
            op: "read the scanned memory range",
            source,
        })?;
    scan_for_signature(PhysicalAddress::new(range.start), &window)
        .ok_or(LocateError::SignatureNotFound(range))
}

/// First 16-byte aligned physical address in `window` (which starts at
/// `base`) that holds the RSDP signature.
#[must_use]
pub fn scan_for_signature(base: PhysicalAddress, window: &[u8]) -> Option<PhysicalAddress> {
    // Start on the first aligned address at or after `base`.
    let skip = (RSDP_ALIGNMENT - base.as_u64() % RSDP_ALIGNMENT) % RSDP_ALIGNMENT;
    let skip = usize::try_from(skip).ok()?;
    let step = usize::try_from(RSDP_ALIGNMENT).ok()?;

    window
        .get(skip..)?
        .chunks_exact(step)
        .position(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(&chunk[..8]);
            u64::from_le_bytes(word) == RSDP_SIGNATURE_WORD
        })
        .map(|i| base + (skip + i * step) as u64)
}

fn read_rsdp<R: Read + Seek>(mem: &mut R, base: PhysicalAddress) -> Result<Rsdp, LocateError> {
    Rsdp::read_from(mem, base).map_err(|source| LocateError::Io {
        op: "read the RSDP",
        source,
    })
}
