//! Print the EBDA: `dumpebda [mem-path]`.

use boot_acpi::DEV_MEM;
use boot_acpi::ebda::read_ebda;
use boot_logger::StderrLogger;
use std::fs::File;
use std::io::{self, Write};
use std::{env, error::Error};

const BYTES_PER_LINE: usize = 16;

/// `address: hex bytes |ascii|`, one line per 16 bytes.
fn hexdump<W: Write>(out: &mut W, base: u64, data: &[u8]) -> io::Result<()> {
    for (addr, line) in (base..).step_by(BYTES_PER_LINE).zip(data.chunks(BYTES_PER_LINE)) {
        write!(out, "{addr:08x}:")?;
        for b in line {
            write!(out, " {b:02x}")?;
        }
        for _ in line.len()..BYTES_PER_LINE {
            write!(out, "   ")?;
        }
        let ascii: String = line
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { char::from(b) } else { '.' })
            .collect();
        writeln!(out, "  |{ascii}|")?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    StderrLogger::from_env().init()?;

    // args: [mem-path]
    let path = env::args().nth(1).unwrap_or_else(|| DEV_MEM.to_owned());
    log::debug!("reading the EBDA from {path}");
    let mut mem = File::open(&path).map_err(|e| format!("cannot open {path}: {e}"))?;
    let ebda = read_ebda(&mut mem)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "EBDA base:   {}", ebda.base_offset)?;
    writeln!(out, "EBDA length: 0x{:x} ({} KiB)", ebda.length, ebda.length / 1024)?;
    hexdump(&mut out, ebda.base_offset.as_u64(), &ebda.data)?;
    Ok(())
}
