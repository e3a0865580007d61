//! # Root and Extended System Description Tables
//!
//! The RSDT (32-bit entries) and XSDT (64-bit entries) list the physical
//! addresses of every other table. An [`Sdt`] is read from either form and
//! always written back as an XSDT.

use crate::HEADER_LENGTH;
use crate::generic::Generic;
use crate::raw::Raw;
use crate::rsdp::Rsdp;
use crate::table::{Table, TableError, fix_header, sig_str};
use std::io::{Read, Seek};

pub const RSDT_SIGNATURE: [u8; 4] = *b"RSDT";
pub const XSDT_SIGNATURE: [u8; 4] = *b"XSDT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sdt {
    generic: Generic,
    /// Physical addresses of the referenced tables.
    pub tables: Vec<u64>,
}

impl Sdt {
    /// Read the table the RSDP points at.
    ///
    /// The RSDT is used when the RSDP carries a 32-bit address, the XSDT
    /// otherwise.
    ///
    /// # Errors
    /// [`TableError::BadSignature`] if the table found there is not of the
    /// expected kind, otherwise as [`Raw::read_from`].
    pub fn read_from<R: Read + Seek>(mem: &mut R, rsdp: &Rsdp) -> Result<Self, TableError> {
        let (expected, entry) = if rsdp.rsdt_addr() == 0 {
            (XSDT_SIGNATURE, 8)
        } else {
            (RSDT_SIGNATURE, 4)
        };

        let raw = Raw::read_from(mem, rsdp.sdt_addr())?;
        if raw.sig() != expected {
            return Err(TableError::BadSignature {
                expected: sig_str(&expected),
                found: sig_str(&raw.sig()),
            });
        }

        let tables = raw
            .table_data()
            .chunks_exact(entry)
            .map(|c| {
                let mut b = [0u8; 8];
                b[..entry].copy_from_slice(c);
                u64::from_le_bytes(b)
            })
            .collect::<Vec<_>>();
        log::debug!(
            "{} at 0x{:x} lists {} tables",
            sig_str(&expected),
            raw.address(),
            tables.len()
        );

        Ok(Self {
            generic: Generic::from_raw(raw)?,
            tables,
        })
    }

    /// Mutable view of the header written by [`Sdt::marshal`].
    pub fn header_mut(&mut self) -> &mut crate::header::Header {
        &mut self.generic.header
    }

    /// Serialize as an XSDT with 64-bit entries.
    ///
    /// # Errors
    /// [`TableError::TooLong`] if the entry list does not fit a table.
    pub fn marshal(&self) -> Result<Vec<u8>, TableError> {
        let mut header = self.generic.header;
        header.signature = XSDT_SIGNATURE;

        let mut out = Vec::with_capacity(HEADER_LENGTH + 8 * self.tables.len());
        out.extend(header.marshal());
        for addr in &self.tables {
            out.extend_from_slice(&addr.to_le_bytes());
        }
        fix_header(&mut out)?;
        Ok(out)
    }

    /// Read every referenced table.
    ///
    /// # Errors
    /// The first table that cannot be read.
    pub fn read_tables<R: Read + Seek>(&self, mem: &mut R) -> Result<Vec<Raw>, TableError> {
        self.tables
            .iter()
            .map(|&addr| Raw::read_from(mem, addr))
            .collect()
    }
}

impl Table for Sdt {
    fn data(&self) -> &[u8] {
        self.generic.data()
    }

    fn address(&self) -> u64 {
        self.generic.address()
    }

    fn marshal(&self) -> Result<Vec<u8>, TableError> {
        Self::marshal(self)
    }
}
