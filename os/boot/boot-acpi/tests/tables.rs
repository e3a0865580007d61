use boot_acpi::generic::Generic;
use boot_acpi::header::Header;
use boot_acpi::raw::{Raw, raw_tables_from_dir};
use boot_acpi::rsdp::Rsdp;
use boot_acpi::sdt::Sdt;
use boot_acpi::table::{Table, TableError, fix_header};
use boot_acpi::sum;
use std::fs;
use std::io::Cursor;

fn table(sig: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut t = Header {
        signature: *sig,
        revision: 2,
        oem_id: *b"BOCHS ",
        oem_table_id: *b"BXPC    ",
        oem_revision: 1,
        creator_id: u32::from_le_bytes(*b"BXPC"),
        creator_revision: 1,
        ..Header::default()
    }
    .marshal();
    t.extend_from_slice(body);
    fix_header(&mut t).unwrap();
    t
}

#[test]
fn generic_round_trip_is_byte_exact() {
    let bytes = table(b"APIC", &(0..120).collect::<Vec<u8>>());
    let g = Generic::new(bytes.clone()).unwrap();
    assert_eq!(g.marshal().unwrap(), bytes);
    assert_eq!(g.len() as usize, bytes.len());
    assert_eq!(&g.oem_id(), b"BOCHS ");
    assert_eq!(g.creator_id(), u32::from_le_bytes(*b"BXPC"));
}

#[test]
fn mutated_length_is_rewritten_consistently() {
    let bytes = table(b"HPET", &[9; 20]);
    let mut g = Generic::new(bytes).unwrap();
    g.header.length = 0xFFFF;
    g.header.oem_revision = 7;

    let out = g.marshal().unwrap();
    let reparsed = Raw::new(out.clone()).unwrap();
    assert_eq!(reparsed.len() as usize, out.len());
    assert_eq!(reparsed.oem_revision(), 7);
    assert_eq!(sum(&out), 0);
    assert_eq!(reparsed.table_data(), g.table_data());
}

#[test]
fn tables_from_a_sysfs_style_directory() {
    let dir = std::env::temp_dir().join(format!("boot-acpi-tables-{}", std::process::id()));
    fs::create_dir_all(dir.join("dynamic")).unwrap();
    fs::write(dir.join("FACP"), table(b"FACP", &[1; 80])).unwrap();
    fs::write(dir.join("APIC"), table(b"APIC", &[2; 40])).unwrap();

    let tables = raw_tables_from_dir(&dir);
    let bad = dir.join("SSDT");
    fs::write(&bad, [0u8; 12]).unwrap();
    let broken = raw_tables_from_dir(&dir);
    fs::remove_dir_all(&dir).unwrap();

    let tables = tables.unwrap();
    let sigs: Vec<_> = tables.iter().map(|t| t.sig()).collect();
    assert_eq!(sigs, [*b"APIC", *b"FACP"]);
    assert!(matches!(broken, Err(TableError::TooShort(12))));
}

#[test]
fn missing_table_file() {
    let path = std::env::temp_dir().join("boot-acpi-no-such-table");
    let err = Raw::from_file(&path).unwrap_err();
    assert!(matches!(err, TableError::File { .. }));
    assert!(err.to_string().contains("boot-acpi-no-such-table"));
}

#[test]
fn rsdp_to_tables_and_back() {
    let mut mem = vec![0u8; 0x10_0000];
    let facp = table(b"FACP", &[3; 100]);
    let apic = table(b"APIC", &[4; 60]);
    mem[0x8_1000..0x8_1000 + facp.len()].copy_from_slice(&facp);
    mem[0x8_2000..0x8_2000 + apic.len()].copy_from_slice(&apic);

    let mut entries = Vec::new();
    entries.extend_from_slice(&0x8_1000u64.to_le_bytes());
    entries.extend_from_slice(&0x8_2000u64.to_le_bytes());
    let xsdt = table(b"XSDT", &entries);
    mem[0x8_0000..0x8_0000 + xsdt.len()].copy_from_slice(&xsdt);

    let rsdp = Rsdp::new(0x8_0000, 36);
    assert!(rsdp.is_valid());
    let mut mem = Cursor::new(mem);

    let sdt = Sdt::read_from(&mut mem, &rsdp).unwrap();
    let tables = sdt.read_tables(&mut mem).unwrap();
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].address(), 0x8_1000);
    assert_eq!(tables[1].data(), &apic[..]);
    assert_eq!(sdt.marshal().unwrap(), xsdt);
}
