//! # Raw Tables
//!
//! A [`Raw`] table is the literal bytes of a system description table: the
//! header is only read positionally, the body is never interpreted.

use crate::HEADER_LENGTH;
use crate::header::LENGTH_OFFSET;
use crate::table::{Table, TableError};
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raw {
    addr: u64,
    data: Vec<u8>,
}

/// The length declared in the header at the start of `bytes`.
fn declared_length(bytes: &[u8]) -> Result<u32, TableError> {
    let field = bytes
        .get(LENGTH_OFFSET..LENGTH_OFFSET + 4)
        .filter(|_| bytes.len() >= HEADER_LENGTH)
        .ok_or(TableError::TooShort(bytes.len()))?;
    let mut b = [0u8; 4];
    b.copy_from_slice(field);
    Ok(u32::from_le_bytes(b))
}

impl Raw {
    /// Wrap the table at the start of `bytes`.
    ///
    /// Bytes past the declared length are dropped.
    ///
    /// # Errors
    /// [`TableError::TooShort`] if there is no complete header or the declared
    /// length is smaller than a header, [`TableError::LengthOverflow`] if the
    /// declared length runs past the end of `bytes`.
    pub fn new(mut bytes: Vec<u8>) -> Result<Self, TableError> {
        let declared = declared_length(&bytes)?;
        let len = declared as usize;
        if len < HEADER_LENGTH {
            return Err(TableError::TooShort(len));
        }
        if len > bytes.len() {
            return Err(TableError::LengthOverflow {
                declared,
                available: bytes.len(),
            });
        }
        bytes.truncate(len);
        Ok(Self {
            addr: 0,
            data: bytes,
        })
    }

    /// Split a buffer of back-to-back tables.
    ///
    /// # Errors
    /// The first [`Raw::new`] failure.
    pub fn split_all(mut bytes: &[u8]) -> Result<Vec<Self>, TableError> {
        let mut tables = Vec::new();
        while !bytes.is_empty() {
            let table = Self::new(bytes.to_vec())?;
            bytes = &bytes[table.data.len()..];
            tables.push(table);
        }
        Ok(tables)
    }

    /// Read the table at physical address `addr`.
    ///
    /// # Errors
    /// [`TableError::Io`] if the medium fails, otherwise as [`Raw::new`].
    pub fn read_from<R: Read + Seek>(mem: &mut R, addr: u64) -> Result<Self, TableError> {
        let io_err =
            |op: &'static str| move |source: io::Error| TableError::Io { op, addr, source };

        let mut header = [0u8; HEADER_LENGTH];
        mem.seek(SeekFrom::Start(addr))
            .map_err(io_err("seek to the table"))?;
        mem.read_exact(&mut header)
            .map_err(io_err("read the table header"))?;

        let len = declared_length(&header)? as usize;
        if len < HEADER_LENGTH {
            return Err(TableError::TooShort(len));
        }

        let mut data = vec![0u8; len];
        data[..HEADER_LENGTH].copy_from_slice(&header);
        mem.read_exact(&mut data[HEADER_LENGTH..])
            .map_err(io_err("read the table body"))?;
        log::debug!(
            "read {} table at 0x{addr:x}, 0x{len:x} bytes",
            crate::table::sig_str(&data[..4])
        );

        Ok(Self { addr, data })
    }

    /// Read one table from a file.
    ///
    /// # Errors
    /// [`TableError::File`] if the file cannot be read, otherwise as [`Raw::new`].
    pub fn from_file(path: &Path) -> Result<Self, TableError> {
        let bytes = fs::read(path).map_err(|source| TableError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(bytes)
    }
}

impl Table for Raw {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn address(&self) -> u64 {
        self.addr
    }
}

/// Read every table file in `dir` (e.g. `/sys/firmware/acpi/tables`),
/// skipping subdirectories, in file-name order.
///
/// # Errors
/// [`TableError::File`] if the directory or a table cannot be read, or the
/// first malformed table.
pub fn raw_tables_from_dir(dir: &Path) -> Result<Vec<Raw>, TableError> {
    let dir_err = |source: io::Error| TableError::File {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for ent in fs::read_dir(dir).map_err(dir_err)? {
        let ent = ent.map_err(dir_err)?;
        if ent.file_type().map_err(dir_err)?.is_file() {
            paths.push(ent.path());
        }
    }
    paths.sort();

    paths.iter().map(|p| Raw::from_file(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;
    use crate::table::fix_header;
    use std::io::Cursor;

    fn table(sig: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut t = Header {
            signature: *sig,
            revision: 1,
            ..Header::default()
        }
        .marshal();
        t.extend_from_slice(body);
        fix_header(&mut t).unwrap();
        t
    }

    #[test]
    fn new_drops_trailing_bytes() {
        let mut b = table(b"SSDT", &[1, 2, 3]);
        b.extend_from_slice(&[0xEE; 5]);
        let raw = Raw::new(b).unwrap();
        assert_eq!(raw.len(), 39);
        assert_eq!(raw.data().len(), 39);
        assert_eq!(raw.table_data(), &[1, 2, 3]);
        assert_eq!(&raw.sig(), b"SSDT");
    }

    #[test]
    fn new_rejects_bad_lengths() {
        assert!(matches!(Raw::new(vec![0; 10]), Err(TableError::TooShort(10))));

        let mut b = table(b"SSDT", &[]);
        b[4..8].copy_from_slice(&100u32.to_le_bytes());
        assert!(matches!(
            Raw::new(b.clone()),
            Err(TableError::LengthOverflow { declared: 100, available: 36 })
        ));

        b[4..8].copy_from_slice(&8u32.to_le_bytes());
        assert!(matches!(Raw::new(b), Err(TableError::TooShort(8))));
    }

    #[test]
    fn split_all_walks_back_to_back_tables() {
        let mut b = table(b"APIC", &[0; 8]);
        b.extend(table(b"HPET", &[0; 20]));
        let tables = Raw::split_all(&b).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(&tables[0].sig(), b"APIC");
        assert_eq!(&tables[1].sig(), b"HPET");
        assert_eq!(tables[1].len(), 56);
    }

    #[test]
    fn read_from_memory() {
        let t = table(b"FACP", &[7; 100]);
        let mut mem = vec![0u8; 0x2000];
        mem[0x1000..0x1000 + t.len()].copy_from_slice(&t);
        let raw = Raw::read_from(&mut Cursor::new(mem), 0x1000).unwrap();
        assert_eq!(raw.address(), 0x1000);
        assert_eq!(raw.data(), &t[..]);
        assert_eq!(crate::sum(raw.data()), 0);
    }

    #[test]
    fn read_from_truncated_memory() {
        let t = table(b"FACP", &[7; 100]);
        let mut mem = vec![0u8; 0x1040];
        mem[0x1000..0x1040].copy_from_slice(&t[..0x40]);
        assert!(matches!(
            Raw::read_from(&mut Cursor::new(mem), 0x1000),
            Err(TableError::Io { addr: 0x1000, .. })
        ));
    }
}
