//! Copy the RSDP into the EBDA so that legacy scans find it:
//! `fixrsdp [mem-path]`.

use boot_acpi::Firmware;
use boot_acpi::locator::RsdpLocator;
use boot_acpi::relocate::relocate_rsdp;
use boot_logger::StderrLogger;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::{env, error::Error};

fn main() -> Result<(), Box<dyn Error>> {
    StderrLogger::from_env().init()?;

    // args: [mem-path]
    let mut firmware = Firmware::default();
    if let Some(path) = env::args().nth(1) {
        firmware.dev_mem = PathBuf::from(path);
    }

    let rsdp = RsdpLocator::platform(&firmware).locate()?;
    log::info!("found RSDP at {}", rsdp.base());
    if !rsdp.is_valid() {
        log::warn!("RSDP at {} fails its checksums, copying it anyway", rsdp.base());
    }

    let mut mem = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&firmware.dev_mem)
        .map_err(|e| format!("cannot open {}: {e}", firmware.dev_mem.display()))?;
    let moved = relocate_rsdp(&mut mem, &rsdp)?;

    println!("RSDP at {}", moved.base());
    Ok(())
}
