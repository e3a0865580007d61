use boot_acpi::PhysicalAddress;
use boot_acpi::locator::{
    EbdaScan, EfiSystab, LegacyScan, LocateError, RsdpLocator, RsdpSource, scan_memory,
};
use boot_acpi::rsdp::Rsdp;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

const MIB: usize = 0x10_0000;

fn place_rsdp(mem: &mut [u8], at: usize, xsdt: u64) -> Rsdp {
    let rsdp = Rsdp::new(xsdt, 36);
    mem[at..at + 36].copy_from_slice(rsdp.all_data());
    rsdp
}

fn with_ebda(mem: &mut [u8], segment: u16, kib: u8) {
    mem[0x40E..0x410].copy_from_slice(&segment.to_le_bytes());
    mem[usize::from(segment) << 4] = kib;
}

/// A systab file unique to this test; removed on drop.
struct Systab(PathBuf);

impl Systab {
    fn new(name: &str, content: impl AsRef<[u8]>) -> Self {
        let path = std::env::temp_dir().join(format!(
            "boot-acpi-systab-{}-{name}",
            std::process::id()
        ));
        fs::write(&path, content).unwrap();
        Self(path)
    }
}

impl Drop for Systab {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

fn missing_systab() -> PathBuf {
    std::env::temp_dir().join("boot-acpi-systab-does-not-exist")
}

#[test]
fn systab_acpi20_entry_wins() {
    let mut buf = vec![0u8; MIB];
    let rsdp = place_rsdp(&mut buf, 0x5_0000, 0x1234);
    let systab = Systab::new("acpi20", "SMBIOS=0xf0000\nACPI20=0x50000\nACPI=0xe0000\n");

    let mem = buf.as_slice();
    let found = EfiSystab::new(&systab.0, &mem).locate().unwrap();
    assert_eq!(found.base(), PhysicalAddress::new(0x5_0000));
    assert_eq!(found.all_data(), rsdp.all_data());
    assert_eq!(found.xsdt_addr(), 0x1234);
}

#[test]
fn systab_skips_unusable_entries() {
    let mut buf = vec![0u8; MIB];
    place_rsdp(&mut buf, 0x6_0000, 0);
    let systab = Systab::new(
        "skips",
        "ACPI20=not-a-number\nACPI20=0x7ffe0000\nACPI=0x60000\n",
    );

    let mem = buf.as_slice();
    let found = EfiSystab::new(&systab.0, &mem).locate().unwrap();
    assert_eq!(found.base(), PhysicalAddress::new(0x6_0000));
}

#[test]
fn systab_survives_non_utf8_lines() {
    let mut buf = vec![0u8; MIB];
    place_rsdp(&mut buf, 0x5_0000, 0);
    let systab = Systab::new("binary", b"\xff\xfe\x80garbage\r\nACPI20=0x50000\r\n");

    let mem = buf.as_slice();
    let found = EfiSystab::new(&systab.0, &mem).locate().unwrap();
    assert_eq!(found.base(), PhysicalAddress::new(0x5_0000));
}

#[test]
fn systab_without_entries_fails() {
    let buf = vec![0u8; MIB];
    let systab = Systab::new("empty", "SMBIOS=0xf0000\n");
    let mem = buf.as_slice();
    assert!(matches!(
        EfiSystab::new(&systab.0, &mem).locate(),
        Err(LocateError::NoSystabEntry(_))
    ));
    assert!(matches!(
        EfiSystab::new(missing_systab(), &mem).locate(),
        Err(LocateError::Open { .. })
    ));
}

#[test]
fn ebda_scan_finds_aligned_signature() {
    let mut buf = vec![0u8; MIB];
    with_ebda(&mut buf, 0x9FC0, 1);
    place_rsdp(&mut buf, 0x9_FC00 + 0x40, 0xABCD);

    let mem = buf.as_slice();
    let found = EbdaScan::new(&mem).locate().unwrap();
    assert_eq!(found.base(), PhysicalAddress::new(0x9_FC40));
    assert!(found.is_valid());
}

#[test]
fn ebda_scan_without_ebda() {
    let buf = vec![0u8; MIB];
    let mem = buf.as_slice();
    assert!(matches!(
        EbdaScan::new(&mem).locate(),
        Err(LocateError::Ebda(_))
    ));
}

#[test]
fn legacy_scan_ignores_unaligned_signatures() {
    let mut buf = vec![0u8; MIB];
    place_rsdp(&mut buf, 0xE_0008, 0);
    let mem = buf.as_slice();
    assert!(matches!(
        LegacyScan::new(&mem).locate(),
        Err(LocateError::SignatureNotFound(_))
    ));

    place_rsdp(&mut buf, 0xF_5A30, 0x5555);
    let mem = buf.as_slice();
    let found = LegacyScan::new(&mem).locate().unwrap();
    assert_eq!(found.base(), PhysicalAddress::new(0xF_5A30));
    assert_eq!(found.sdt_addr(), 0x5555);
}

#[test]
fn scan_memory_reports_short_media() {
    let mut mem = Cursor::new(vec![0u8; 0xE_8000]);
    assert!(matches!(
        scan_memory(&mut mem, 0xE_0000..0xF_FFF0),
        Err(LocateError::Io { .. })
    ));
}

#[test]
fn locator_falls_through_in_order() {
    let mut buf = vec![0u8; MIB];
    with_ebda(&mut buf, 0x9FC0, 1);
    place_rsdp(&mut buf, 0xE_1000, 1);

    let mem = buf.as_slice();
    let locator = RsdpLocator::with_memory(&missing_systab(), &mem);
    let (found, failures) = locator.locate_with_diagnostics();

    assert_eq!(found.unwrap().base(), PhysicalAddress::new(0xE_1000));
    let names: Vec<_> = failures.iter().map(|f| f.source).collect();
    assert_eq!(names, ["EFI systab", "EBDA scan"]);
}

#[test]
fn locator_prefers_systab_over_scans() {
    let mut buf = vec![0u8; MIB];
    with_ebda(&mut buf, 0x9FC0, 1);
    place_rsdp(&mut buf, 0x9_FC10, 2);
    place_rsdp(&mut buf, 0xE_0000, 3);
    place_rsdp(&mut buf, 0x7_0000, 1);
    let systab = Systab::new("prefers", "ACPI20=0x70000\n");

    let mem = buf.as_slice();
    let found = RsdpLocator::with_memory(&systab.0, &mem).locate().unwrap();
    assert_eq!(found.base(), PhysicalAddress::new(0x7_0000));
}

#[test]
fn locator_reports_not_found_after_every_failure() {
    let buf = vec![0u8; MIB];
    let mem = buf.as_slice();
    let locator = RsdpLocator::with_memory(&missing_systab(), &mem);

    let (found, failures) = locator.locate_with_diagnostics();
    let err = found.unwrap_err();
    assert!(matches!(err, LocateError::NotFound));
    assert_eq!(err.to_string(), "cannot find an RSDP");
    assert_eq!(failures.len(), 3);
    assert!(matches!(failures[2].error, LocateError::SignatureNotFound(_)));

    assert!(matches!(locator.locate(), Err(LocateError::NotFound)));
}

#[test]
fn custom_sources() {
    struct Fixed;

    impl RsdpSource for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn locate(&self) -> Result<Rsdp, LocateError> {
            let mut rsdp = Rsdp::new(0x42, 36);
            rsdp.set_base(PhysicalAddress::new(0x1000));
            Ok(rsdp)
        }
    }

    let found = RsdpLocator::new(vec![Box::new(Fixed)]).locate().unwrap();
    assert_eq!(found.xsdt_addr(), 0x42);
    assert!(RsdpLocator::new(Vec::new()).locate().is_err());
}
