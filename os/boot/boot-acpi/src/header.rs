//! # Common ACPI Table Header
//!
//! Every system description table starts with the same 36-byte header. The
//! header is described as an ordered list of typed fields; encoding walks
//! that list in declaration order, decoding walks the matching
//! [`HEADER_LAYOUT`].

use crate::HEADER_LENGTH;
use crate::table::TableError;

/// Offset of the `u32` length field in the header.
pub const LENGTH_OFFSET: usize = 4;

/// Offset of the checksum byte in the header.
pub const CHECKSUM_OFFSET: usize = 9;

/// A header field tagged with its on-disk width and kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Field {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    /// 4-byte ASCII table signature.
    Signature([u8; 4]),
    /// 6-byte ASCII OEM ID.
    OemId([u8; 6]),
    /// 8-byte ASCII OEM table ID.
    TableId([u8; 8]),
}

/// The kind of a [`Field`] without its value, used to describe layouts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16,
    U32,
    U64,
    Signature,
    OemId,
    TableId,
}

impl FieldKind {
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 | Self::Signature => 4,
            Self::OemId => 6,
            Self::U64 | Self::TableId => 8,
        }
    }

    /// Decode a field of this kind from exactly `self.width()` bytes.
    ///
    /// # Panics
    /// If `bytes` is not exactly `self.width()` long; the caller slices by
    /// width, so a mismatch is a bug in the layout, not in the data.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> Field {
        assert_eq!(bytes.len(), self.width(), "field {self:?} sliced wrong");
        match self {
            Self::U8 => Field::U8(bytes[0]),
            Self::U16 => Field::U16(u16::from_le_bytes([bytes[0], bytes[1]])),
            Self::U32 => Field::U32(u32::from_le_bytes(array(bytes))),
            Self::U64 => Field::U64(u64::from_le_bytes(array(bytes))),
            Self::Signature => Field::Signature(array(bytes)),
            Self::OemId => Field::OemId(array(bytes)),
            Self::TableId => Field::TableId(array(bytes)),
        }
    }
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut a = [0u8; N];
    a.copy_from_slice(bytes);
    a
}

impl Field {
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::U8(_) => FieldKind::U8,
            Self::U16(_) => FieldKind::U16,
            Self::U32(_) => FieldKind::U32,
            Self::U64(_) => FieldKind::U64,
            Self::Signature(_) => FieldKind::Signature,
            Self::OemId(_) => FieldKind::OemId,
            Self::TableId(_) => FieldKind::TableId,
        }
    }

    /// Append the little-endian / raw encoding of the field.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::U8(v) => out.push(*v),
            Self::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Signature(s) => out.extend_from_slice(s),
            Self::OemId(s) => out.extend_from_slice(s),
            Self::TableId(s) => out.extend_from_slice(s),
        }
    }
}

/// Field kinds of [`Header`], in declaration order.
pub const HEADER_LAYOUT: [FieldKind; 9] = [
    FieldKind::Signature,
    FieldKind::U32,
    FieldKind::U8,
    FieldKind::U8,
    FieldKind::OemId,
    FieldKind::TableId,
    FieldKind::U32,
    FieldKind::U32,
    FieldKind::U32,
];

/// The decoded common header of a system description table.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub signature: [u8; 4],
    /// Length of the whole table, header included.
    pub length: u32,
    pub revision: u8,
    /// Makes the whole table sum to zero.
    pub checksum: u8,
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub creator_id: u32,
    pub creator_revision: u32,
}

impl Header {
    /// The header's fields in declaration order.
    #[must_use]
    pub const fn fields(&self) -> [Field; 9] {
        [
            Field::Signature(self.signature),
            Field::U32(self.length),
            Field::U8(self.revision),
            Field::U8(self.checksum),
            Field::OemId(self.oem_id),
            Field::TableId(self.oem_table_id),
            Field::U32(self.oem_revision),
            Field::U32(self.creator_id),
            Field::U32(self.creator_revision),
        ]
    }

    /// Serialize the header field by field.
    #[must_use]
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LENGTH);
        for field in self.fields() {
            field.write_to(&mut out);
        }
        out
    }

    /// Decode the first [`HEADER_LENGTH`] bytes of `bytes`.
    ///
    /// # Errors
    /// [`TableError::TooShort`] if fewer than [`HEADER_LENGTH`] bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TableError> {
        if bytes.len() < HEADER_LENGTH {
            return Err(TableError::TooShort(bytes.len()));
        }

        let mut fields = [Field::U8(0); 9];
        let mut off = 0;
        for (slot, kind) in fields.iter_mut().zip(HEADER_LAYOUT) {
            *slot = kind.decode(&bytes[off..off + kind.width()]);
            off += kind.width();
        }
        Ok(Self::from_fields(fields))
    }

    /// # Panics
    /// If `fields` do not follow [`HEADER_LAYOUT`].
    fn from_fields(fields: [Field; 9]) -> Self {
        let [
            Field::Signature(signature),
            Field::U32(length),
            Field::U8(revision),
            Field::U8(checksum),
            Field::OemId(oem_id),
            Field::TableId(oem_table_id),
            Field::U32(oem_revision),
            Field::U32(creator_id),
            Field::U32(creator_revision),
        ] = fields
        else {
            panic!("header fields do not follow HEADER_LAYOUT: {fields:?}");
        };

        Self {
            signature,
            length,
            revision,
            checksum,
            oem_id,
            oem_table_id,
            oem_revision,
            creator_id,
            creator_revision,
        }
    }
}
