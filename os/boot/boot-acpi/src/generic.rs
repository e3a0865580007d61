//! # Generic Tables
//!
//! A [`Generic`] table exposes its header for mutation but treats the body
//! as opaque. Marshaling re-emits the header, appends the untouched body and
//! recomputes length and checksum.

use crate::HEADER_LENGTH;
use crate::header::Header;
use crate::raw::Raw;
use crate::table::{Table, TableError, fix_header};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generic {
    /// Decoded, mutable copy of the common header.
    pub header: Header,
    addr: u64,
    data: Vec<u8>,
}

impl Generic {
    /// Parse `bytes` as a table with an opaque body.
    ///
    /// # Errors
    /// As [`Raw::new`].
    pub fn new(bytes: Vec<u8>) -> Result<Self, TableError> {
        Self::from_raw(Raw::new(bytes)?)
    }

    /// Take over an already parsed raw table.
    ///
    /// # Errors
    /// [`TableError::TooShort`] if `raw` has no complete header.
    pub fn from_raw(raw: Raw) -> Result<Self, TableError> {
        let header = Header::from_bytes(raw.data())?;
        let addr = raw.address();
        Ok(Self {
            header,
            addr,
            data: raw.data().to_vec(),
        })
    }

    /// Serialize the current header followed by the unmodified body.
    ///
    /// `length` and `checksum` in the output are recomputed; the values in
    /// [`Generic::header`] are ignored for those two fields.
    ///
    /// # Errors
    /// [`TableError::TooLong`] if the table no longer fits a 32-bit length.
    pub fn marshal(&self) -> Result<Vec<u8>, TableError> {
        let body = self.table_data();
        let mut out = Vec::with_capacity(HEADER_LENGTH + body.len());
        out.extend(self.header.marshal());
        out.extend_from_slice(body);
        fix_header(&mut out)?;
        Ok(out)
    }
}

impl Table for Generic {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn address(&self) -> u64 {
        self.addr
    }

    fn sig(&self) -> [u8; 4] {
        self.header.signature
    }

    fn len(&self) -> u32 {
        self.header.length
    }

    fn revision(&self) -> u8 {
        self.header.revision
    }

    fn checksum(&self) -> u8 {
        self.header.checksum
    }

    fn oem_id(&self) -> [u8; 6] {
        self.header.oem_id
    }

    fn oem_table_id(&self) -> [u8; 8] {
        self.header.oem_table_id
    }

    fn oem_revision(&self) -> u32 {
        self.header.oem_revision
    }

    fn creator_id(&self) -> u32 {
        self.header.creator_id
    }

    fn creator_revision(&self) -> u32 {
        self.header.creator_revision
    }

    fn marshal(&self) -> Result<Vec<u8>, TableError> {
        Self::marshal(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sum;

    fn facp() -> Vec<u8> {
        let mut t = Header {
            signature: *b"FACP",
            revision: 6,
            oem_id: *b"ALASKA",
            oem_table_id: *b"A M I   ",
            oem_revision: 0x0107_2009,
            creator_id: u32::from_le_bytes(*b"AMI "),
            creator_revision: 0x0001_0013,
            ..Header::default()
        }
        .marshal();
        t.extend((0u8..=243).map(|i| i.wrapping_mul(7)));
        fix_header(&mut t).unwrap();
        t
    }

    #[test]
    fn unmodified_round_trip_is_exact() {
        let b = facp();
        let g = Generic::new(b.clone()).unwrap();
        assert_eq!(g.marshal().unwrap(), b);
    }

    #[test]
    fn header_mutation_keeps_body_and_fixes_sums() {
        let b = facp();
        let mut g = Generic::new(b.clone()).unwrap();
        g.header.oem_id = *b"LNXBT ";
        g.header.oem_revision += 1;
        // Stale values are overwritten on marshal.
        g.header.length = 1;
        g.header.checksum = 0x55;

        let out = g.marshal().unwrap();
        assert_eq!(out.len(), b.len());
        assert_eq!(&out[4..8], &(b.len() as u32).to_le_bytes());
        assert_eq!(&out[10..16], b"LNXBT ");
        assert_eq!(sum(&out), 0);
        assert_eq!(&out[HEADER_LENGTH..], g.table_data());
        assert_eq!(g.table_data(), &b[HEADER_LENGTH..]);
    }

    #[test]
    fn accessors_follow_the_header() {
        let mut g = Generic::new(facp()).unwrap();
        assert_eq!(&g.sig(), b"FACP");
        assert_eq!(g.revision(), 6);
        g.header.signature = *b"FADT";
        assert_eq!(&g.sig(), b"FADT");
        assert_eq!(&g.data()[..4], b"FACP");
    }
}
