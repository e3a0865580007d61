//! # System Description Tables

use crate::HEADER_LENGTH;
use crate::header::{CHECKSUM_OFFSET, LENGTH_OFFSET};
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("table is {0} bytes, shorter than its header")]
    TooShort(usize),
    #[error("table of {0} bytes does not fit a 32-bit length")]
    TooLong(usize),
    #[error("table declares length {declared} but only {available} bytes are available")]
    LengthOverflow { declared: u32, available: usize },
    #[error("expected signature {expected:?}, found {found:?}")]
    BadSignature { expected: String, found: String },
    #[error("failed to {op} at 0x{addr:x}: {source}")]
    Io {
        op: &'static str,
        addr: u64,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Read-only access to a system description table.
///
/// Header accessors have default implementations that decode the bytes
/// returned by [`Table::data`]; tables that keep a decoded header override
/// them.
pub trait Table {
    /// The whole table, header included.
    fn data(&self) -> &[u8];

    /// Physical address the table was read from, or zero.
    fn address(&self) -> u64 {
        0
    }

    /// Bytes following the common header.
    fn table_data(&self) -> &[u8] {
        &self.data()[HEADER_LENGTH..]
    }

    fn sig(&self) -> [u8; 4] {
        read_array(self.data(), 0)
    }

    fn len(&self) -> u32 {
        u32::from_le_bytes(read_array(self.data(), LENGTH_OFFSET))
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn revision(&self) -> u8 {
        self.data()[8]
    }

    fn checksum(&self) -> u8 {
        self.data()[CHECKSUM_OFFSET]
    }

    fn oem_id(&self) -> [u8; 6] {
        read_array(self.data(), 10)
    }

    fn oem_table_id(&self) -> [u8; 8] {
        read_array(self.data(), 16)
    }

    fn oem_revision(&self) -> u32 {
        u32::from_le_bytes(read_array(self.data(), 24))
    }

    fn creator_id(&self) -> u32 {
        u32::from_le_bytes(read_array(self.data(), 28))
    }

    fn creator_revision(&self) -> u32 {
        u32::from_le_bytes(read_array(self.data(), 32))
    }

    /// The serialized table.
    ///
    /// # Errors
    /// Implementation specific; a raw table cannot fail.
    fn marshal(&self) -> Result<Vec<u8>, TableError> {
        Ok(self.data().to_vec())
    }
}

fn read_array<const N: usize>(data: &[u8], off: usize) -> [u8; N] {
    let mut a = [0u8; N];
    a.copy_from_slice(&data[off..off + N]);
    a
}

/// Patch the length field and recompute the checksum of a serialized table.
///
/// # Errors
/// [`TableError::TooShort`] if there is no complete header,
/// [`TableError::TooLong`] if the length does not fit the `u32` field.
pub fn fix_header(table: &mut [u8]) -> Result<(), TableError> {
    if table.len() < HEADER_LENGTH {
        return Err(TableError::TooShort(table.len()));
    }
    let len = u32::try_from(table.len()).map_err(|_| TableError::TooLong(table.len()))?;
    table[LENGTH_OFFSET..LENGTH_OFFSET + 4].copy_from_slice(&len.to_le_bytes());
    table[CHECKSUM_OFFSET] = 0;
    table[CHECKSUM_OFFSET] = crate::checksum(table);
    Ok(())
}

/// Printable form of a 4-byte signature.
#[must_use]
pub fn sig_str(sig: &[u8]) -> String {
    String::from_utf8_lossy(sig).into_owned()
}
