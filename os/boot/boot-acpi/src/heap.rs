//! # Heap Tables
//!
//! Some tables (the iSCSI Boot Firmware Table being the prime example) keep
//! fixed-size fields inline in a *head* and store variable-length data in a
//! trailing *heap*. The head refers into the heap with a `(length, offset)`
//! pair of little-endian `u16`s.
//!
//! ```text
//! ┌───────────── head ─────────────┐┌──────── heap ────────┐
//! │ u8 │ ip[16] │ len │ off │ u64  ││ "iqn.2019-..."  ...  │
//! └────────────────┬──────┬────────┘└──────────────────────┘
//!                  └──────┴──────────────→ offset from heap start
//! ```
//!
//! [`HeapTable::marshal`] accepts textual field values tagged with their
//! kind ([`HeapValue`]); the typed `write_*` methods are used by encoders that
//! already hold binary values.

use bitfield_struct::bitfield;
use core::num::ParseIntError;
use std::io;
use std::net::{AddrParseError, IpAddr, SocketAddr, ToSocketAddrs};

#[derive(Debug, thiserror::Error)]
pub enum HeapError {
    #[error("cannot resolve socket address {value:?}: {source}")]
    SockAddr {
        value: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid IP address {value:?}: {source}")]
    IpAddr {
        value: String,
        #[source]
        source: AddrParseError,
    },
    #[error("invalid MAC address {0:?}, expected 6 octets")]
    Mac(String),
    #[error("invalid {width}-bit number {value:?}")]
    Number {
        width: u32,
        value: String,
        #[source]
        source: Option<ParseIntError>,
    },
    #[error("invalid PCI bus/device/function {0:?}")]
    Bdf(String),
    #[error("heap item of {len} bytes at heap offset {offset} does not fit 16-bit fields")]
    Overflow { len: usize, offset: u64 },
}

/// PCI Bus/Device/Function identifier, packed as `bus << 8 | device << 3 | function`.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct Bdf {
    #[bits(3)]
    pub function: u8,
    #[bits(5)]
    pub device: u8,
    pub bus: u8,
}

impl core::str::FromStr for Bdf {
    type Err = HeapError;

    /// Parses `bus:device.function` (hex, as `lspci` prints it) or a plain
    /// packed number.
    fn from_str(s: &str) -> Result<Self, HeapError> {
        let bad = || HeapError::Bdf(s.to_owned());

        let Some((bus, rest)) = s.split_once(':') else {
            let packed = parse_width(s, 16)?;
            return u16::try_from(packed).map(Self::from_bits).map_err(|_| bad());
        };
        let (device, function) = rest.split_once('.').ok_or_else(bad)?;

        let bus = u8::from_str_radix(bus, 16).map_err(|_| bad())?;
        let device = u8::from_str_radix(device, 16).map_err(|_| bad())?;
        let function = u8::from_str_radix(function, 16).map_err(|_| bad())?;
        if device >= 32 || function >= 8 {
            return Err(bad());
        }

        Ok(Self::new()
            .with_bus(bus)
            .with_device(device)
            .with_function(function))
    }
}

/// A textual field value, tagged with how it is encoded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HeapValue<'a> {
    /// `host:port`; 16-byte IP followed by a `u16` port.
    SockAddr(&'a str),
    /// 16-byte IP, IPv4 mapped into IPv6.
    IpAddr(&'a str),
    /// `aa:bb:cc:dd:ee:ff`.
    Mac(&'a str),
    /// See [`Bdf`].
    Bdf(&'a str),
    U8(&'a str),
    U16(&'a str),
    U64(&'a str),
    /// Reserved for bit flags; encodes nothing.
    Flag(&'a str),
    /// Stored in the heap, referenced from the head.
    Heap(&'a str),
}

/// Where heap offsets count from and how heap items are terminated.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct HeapLayout {
    /// Added to every heap offset, e.g. the position of the heap in the
    /// final table when offsets are table-relative.
    pub base: u64,
    /// Append a NUL after each item (not counted in its length).
    pub nul_terminated: bool,
}

/// A table under construction: inline head plus trailing heap.
#[derive(Debug, Clone, Default)]
pub struct HeapTable {
    layout: HeapLayout,
    head: Vec<u8>,
    heap: Vec<u8>,
}

impl HeapTable {
    /// Offsets relative to the heap start, no terminators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_layout(layout: HeapLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    #[must_use]
    pub fn heap(&self) -> &[u8] {
        &self.heap
    }

    /// Encode one field.
    ///
    /// # Errors
    /// A [`HeapError`] naming the value if it cannot be parsed or resolved,
    /// or [`HeapError::Overflow`] if a heap reference does not fit.
    pub fn marshal(&mut self, value: HeapValue<'_>) -> Result<(), HeapError> {
        match value {
            HeapValue::SockAddr(v) => {
                let addr = resolve(v)?;
                self.write_socket_addr(addr);
            }
            HeapValue::IpAddr(v) => {
                let ip = v.trim().parse::<IpAddr>().map_err(|source| HeapError::IpAddr {
                    value: v.to_owned(),
                    source,
                })?;
                self.write_ip(Some(ip));
            }
            HeapValue::Mac(v) => self.write_mac(parse_mac(v)?),
            HeapValue::Bdf(v) => self.write_bdf(v.parse()?),
            HeapValue::U8(v) => self.head.push(narrow(v, 8)?[0]),
            HeapValue::U16(v) => self.head.extend_from_slice(&narrow(v, 16)?[..2]),
            HeapValue::U64(v) => self.write_u64(parse_width(v, 64)?),
            HeapValue::Flag(_) => {}
            HeapValue::Heap(v) => self.write_heap(v.as_bytes())?,
        }
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) {
        self.head.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.head.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.head.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, b: &[u8]) {
        self.head.extend_from_slice(b);
    }

    /// 16 bytes; `None` writes the unspecified address.
    pub fn write_ip(&mut self, ip: Option<IpAddr>) {
        let octets = match ip {
            None => [0u8; 16],
            Some(IpAddr::V4(v4)) => v4.to_ipv6_mapped().octets(),
            Some(IpAddr::V6(v6)) => v6.octets(),
        };
        self.head.extend_from_slice(&octets);
    }

    pub fn write_socket_addr(&mut self, addr: SocketAddr) {
        self.write_ip(Some(addr.ip()));
        self.write_u16(addr.port());
    }

    pub fn write_mac(&mut self, mac: [u8; 6]) {
        self.head.extend_from_slice(&mac);
    }

    pub fn write_bdf(&mut self, bdf: Bdf) {
        self.write_u16(bdf.into_bits());
    }

    /// Zero-pad the head to a multiple of `align`.
    pub fn align(&mut self, align: usize) {
        let padded = self.head.len().next_multiple_of(align);
        self.head.resize(padded, 0);
    }

    /// Append `item` to the heap and its `(length, offset)` to the head.
    /// An empty item is recorded as `(0, 0)` and takes no heap space.
    ///
    /// # Errors
    /// [`HeapError::Overflow`] if length or offset exceed `u16`.
    pub fn write_heap(&mut self, item: &[u8]) -> Result<(), HeapError> {
        if item.is_empty() {
            self.write_u16(0);
            self.write_u16(0);
            return Ok(());
        }

        let offset = self.layout.base + self.heap.len() as u64;
        let overflow = || HeapError::Overflow {
            len: item.len(),
            offset,
        };
        let len = u16::try_from(item.len()).map_err(|_| overflow())?;
        let off = u16::try_from(offset).map_err(|_| overflow())?;

        self.write_u16(len);
        self.write_u16(off);
        self.heap.extend_from_slice(item);
        if self.layout.nul_terminated {
            self.heap.push(0);
        }
        Ok(())
    }

    /// The serialized table: head followed by heap.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        let mut out = self.head;
        out.extend(self.heap);
        out
    }
}

fn parse_width(value: &str, width: u32) -> Result<u64, HeapError> {
    let err = |source| HeapError::Number {
        width,
        value: value.to_owned(),
        source,
    };
    let v = crate::parse_u64(value.trim()).map_err(|e| err(Some(e)))?;
    if width < 64 && v >> width != 0 {
        return Err(err(None));
    }
    Ok(v)
}

/// Parse at `width` bits and return the little-endian bytes.
fn narrow(value: &str, width: u32) -> Result<[u8; 8], HeapError> {
    parse_width(value, width).map(u64::to_le_bytes)
}

fn resolve(value: &str) -> Result<SocketAddr, HeapError> {
    let err = |source| HeapError::SockAddr {
        value: value.to_owned(),
        source,
    };
    value
        .to_socket_addrs()
        .map_err(err)?
        .next()
        .ok_or_else(|| err(io::Error::new(io::ErrorKind::NotFound, "no addresses")))
}

fn parse_mac(value: &str) -> Result<[u8; 6], HeapError> {
    let bad = || HeapError::Mac(value.to_owned());
    let mut mac = [0u8; 6];
    let mut octets = value.trim().split([':', '-']);
    for slot in &mut mac {
        let octet = octets.next().filter(|o| o.len() == 2).ok_or_else(bad)?;
        *slot = u8::from_str_radix(octet, 16).map_err(|_| bad())?;
    }
    if octets.next().is_some() {
        return Err(bad());
    }
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_offsets_follow_previous_items() {
        let mut h = HeapTable::new();
        h.marshal(HeapValue::U8("1")).unwrap();
        h.marshal(HeapValue::Heap("iqn.2019-01.org.example:target")).unwrap();
        h.marshal(HeapValue::Heap("chap-user")).unwrap();

        let l1 = "iqn.2019-01.org.example:target".len();
        let l2 = "chap-user".len();
        let head = h.head().to_vec();
        assert_eq!(head.len(), 1 + 4 + 4);
        assert_eq!(u16::from_le_bytes([head[1], head[2]]) as usize, l1);
        assert_eq!(u16::from_le_bytes([head[3], head[4]]), 0);
        assert_eq!(u16::from_le_bytes([head[5], head[6]]) as usize, l2);
        assert_eq!(u16::from_le_bytes([head[7], head[8]]) as usize, l1);

        let out = h.finish();
        assert_eq!(out.len(), head.len() + l1 + l2);
        assert_eq!(&out[head.len()..head.len() + l1], b"iqn.2019-01.org.example:target");
    }

    #[test]
    fn layout_base_and_terminators() {
        let mut h = HeapTable::with_layout(HeapLayout {
            base: 0x138,
            nul_terminated: true,
        });
        h.write_heap(b"abc").unwrap();
        h.write_heap(b"").unwrap();
        h.write_heap(b"de").unwrap();
        assert_eq!(
            h.head(),
            &[3, 0, 0x38, 0x01, 0, 0, 0, 0, 2, 0, 0x3C, 0x01]
        );
        assert_eq!(h.heap(), b"abc\0de\0");
    }

    #[test]
    fn heap_overflow_is_reported() {
        let mut h = HeapTable::with_layout(HeapLayout {
            base: 0xFFFF,
            nul_terminated: false,
        });
        h.write_heap(b"x").unwrap();
        assert!(matches!(
            h.write_heap(b"y"),
            Err(HeapError::Overflow { len: 1, offset: 0x1_0000 })
        ));
    }

    #[test]
    fn addresses_are_16_bytes() {
        let mut h = HeapTable::new();
        h.marshal(HeapValue::IpAddr("192.168.1.10")).unwrap();
        h.marshal(HeapValue::SockAddr("10.0.0.1:3260")).unwrap();
        h.marshal(HeapValue::IpAddr("fe80::1")).unwrap();
        let b = h.finish();
        assert_eq!(b.len(), 16 + 18 + 16);
        assert_eq!(&b[..16], &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, 192, 168, 1, 10]);
        assert_eq!(&b[28..32], &[10, 0, 0, 1]);
        assert_eq!(&b[32..34], &3260u16.to_le_bytes());
        assert_eq!(b[34], 0xFE);
        assert_eq!(b[49], 1);
    }

    #[test]
    fn numbers_are_parsed_at_width() {
        let mut h = HeapTable::new();
        h.marshal(HeapValue::U8("0xFE")).unwrap();
        h.marshal(HeapValue::U16("513")).unwrap();
        h.marshal(HeapValue::U64("0x0102030405060708")).unwrap();
        h.marshal(HeapValue::Flag("true")).unwrap();
        assert_eq!(h.finish(), [0xFE, 1, 2, 8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn numbers_out_of_range_fail() {
        let mut h = HeapTable::new();
        assert!(matches!(
            h.marshal(HeapValue::U8("256")),
            Err(HeapError::Number { width: 8, source: None, .. })
        ));
        let err = h.marshal(HeapValue::U16("lots")).unwrap_err();
        assert!(matches!(err, HeapError::Number { width: 16, source: Some(_), .. }));
        assert!(err.to_string().contains("lots"));
        assert!(h.head().is_empty());
    }

    #[test]
    fn mac_must_have_six_octets() {
        let mut h = HeapTable::new();
        h.marshal(HeapValue::Mac("52:54:00:12:34:56")).unwrap();
        assert_eq!(h.head(), &[0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);
        for bad in ["52:54:00:12:34", "52:54:00:12:34:56:78", "zz:54:00:12:34:56", ""] {
            assert!(matches!(h.marshal(HeapValue::Mac(bad)), Err(HeapError::Mac(_))), "{bad}");
        }
    }

    #[test]
    fn bdf_packing() {
        let bdf: Bdf = "03:1f.7".parse().unwrap();
        assert_eq!(bdf.into_bits(), 0x03 << 8 | 0x1F << 3 | 7);
        assert_eq!(bdf.bus(), 3);
        assert_eq!(bdf.device(), 0x1F);
        assert_eq!(bdf.function(), 7);

        let packed: Bdf = "0x0308".parse().unwrap();
        assert_eq!(packed.device(), 1);
        assert!("00:20.0".parse::<Bdf>().is_err());
        assert!("00:1f".parse::<Bdf>().is_err());

        let mut h = HeapTable::new();
        h.marshal(HeapValue::Bdf("00:19.0")).unwrap();
        assert_eq!(h.finish(), (0x19u16 << 3).to_le_bytes());
    }

    #[test]
    fn bad_addresses_name_the_value() {
        let mut h = HeapTable::new();
        let err = h.marshal(HeapValue::IpAddr("300.1.1.1")).unwrap_err();
        assert!(err.to_string().contains("300.1.1.1"));
        assert!(matches!(
            h.marshal(HeapValue::SockAddr("no-port-here")),
            Err(HeapError::SockAddr { .. })
        ));
    }

    #[test]
    fn align_pads_head() {
        let mut h = HeapTable::new();
        h.write_bytes(&[1; 5]);
        h.align(8);
        assert_eq!(h.head().len(), 8);
        h.align(8);
        assert_eq!(h.head().len(), 8);
    }
}
