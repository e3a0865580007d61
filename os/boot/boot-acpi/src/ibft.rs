//! # iSCSI Boot Firmware Table
//!
//! The iBFT tells a booted OS which iSCSI target it came from. It is an ACPI
//! table named `iBFT` whose structures are laid out at fixed, 8-byte aligned
//! offsets, with strings kept in a trailing heap:
//!
//! | offset  | structure         | length |
//! |--------:|-------------------|-------:|
//! | `0x00`  | ACPI header + pad | 48     |
//! | `0x30`  | control           | 18     |
//! | `0x48`  | initiator         | 74     |
//! | `0x98`  | NIC 0             | 102    |
//! | `0x100` | target 0          | 54     |
//! | `0x138` | heap              | -      |
//!
//! Heap offsets are relative to the start of the table and every heap item
//! is followed by a NUL that is not counted in its length. All offsets are
//! relative, so the result can be placed anywhere.

use crate::header::Header;
use crate::heap::{Bdf, HeapError, HeapLayout, HeapTable};
use crate::table::{TableError, fix_header};
use core::fmt;
use std::net::{IpAddr, SocketAddr};

pub const IBFT_SIGNATURE: [u8; 4] = *b"iBFT";
pub const IBFT_OEM_ID: [u8; 6] = *b"LNXBT ";
pub const IBFT_OEM_TABLE_ID: [u8; 8] = *b"LNXBIBFT";

/// Header plus the 12 bytes of the iBFT's wider revision/creator fields.
const IBFT_HEADER_LENGTH: usize = 48;
const STRUCTURE_ALIGNMENT: usize = 8;

pub const CONTROL_OFFSET: u16 = 0x30;
pub const INITIATOR_OFFSET: u16 = 0x48;
pub const NIC0_OFFSET: u16 = 0x98;
pub const TARGET0_OFFSET: u16 = 0x100;
pub const HEAP_OFFSET: u16 = 0x138;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
enum StructureId {
    Control = 1,
    Initiator = 2,
    Nic = 3,
    Target = 4,
}

impl StructureId {
    const fn length(self) -> u16 {
        match self {
            Self::Control => 18,
            Self::Initiator => 74,
            Self::Nic => 102,
            Self::Target => 54,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IbftError {
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Bit `i` is set iff `bits[i]`.
fn flags(bits: &[bool]) -> u8 {
    bits.iter()
        .enumerate()
        .fold(0, |acc, (i, &set)| acc | (u8::from(set) << i))
}

/// Common 6-byte structure header: id, version, length, index, flags.
fn write_structure_header(h: &mut HeapTable, id: StructureId, flags: u8) {
    h.write_u8(id as u8);
    h.write_u8(1);
    h.write_u16(id.length());
    h.write_u8(0);
    h.write_u8(flags);
}

/// An iSCSI initiator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Initiator {
    /// Initiator name; some targets use it for access control.
    pub name: String,
    pub valid: bool,
    /// This initiator was used to boot.
    pub boot: bool,
    pub sns_server: Option<IpAddr>,
    pub slp_server: Option<IpAddr>,
    pub primary_radius_server: Option<IpAddr>,
    pub secondary_radius_server: Option<IpAddr>,
}

impl Initiator {
    fn marshal(&self, h: &mut HeapTable) -> Result<(), HeapError> {
        write_structure_header(h, StructureId::Initiator, flags(&[self.valid, self.boot]));
        h.write_ip(self.sns_server);
        h.write_ip(self.slp_server);
        h.write_ip(self.primary_radius_server);
        h.write_ip(self.secondary_radius_server);
        h.write_heap(self.name.as_bytes())
    }
}

/// Where a NIC's address prefix came from (`NL_PREFIX_ORIGIN`).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Origin {
    #[default]
    Other = 0,
    Manual = 1,
    WellKnown = 2,
    Dhcp = 3,
    RouterAdvertisement = 4,
    Unchanged = 0xF,
}

/// NIC network configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nic {
    pub valid: bool,
    /// This NIC was used to boot.
    pub boot: bool,
    /// The address is globally reachable rather than link-local.
    pub global: bool,
    /// Address and prefix length.
    pub ip_net: Option<(IpAddr, u8)>,
    pub origin: Origin,
    pub gateway: Option<IpAddr>,
    pub primary_dns: Option<IpAddr>,
    pub secondary_dns: Option<IpAddr>,
    pub dhcp_server: Option<IpAddr>,
    pub vlan: u16,
    pub mac: [u8; 6],
    pub pci_bdf: Bdf,
    pub host_name: String,
}

impl Nic {
    fn marshal(&self, h: &mut HeapTable) -> Result<(), HeapError> {
        write_structure_header(
            h,
            StructureId::Nic,
            flags(&[self.valid, self.boot, self.global]),
        );
        let (ip, prefix) = self.ip_net.map_or((None, 0), |(ip, p)| (Some(ip), p));
        h.write_ip(ip);
        h.write_u8(prefix);
        h.write_u8(self.origin as u8);
        h.write_ip(self.gateway);
        h.write_ip(self.primary_dns);
        h.write_ip(self.secondary_dns);
        h.write_ip(self.dhcp_server);
        h.write_u16(self.vlan);
        h.write_mac(self.mac);
        h.write_bdf(self.pci_bdf);
        h.write_heap(self.host_name.as_bytes())
    }
}

/// An iSCSI target server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub valid: bool,
    pub boot: bool,
    pub chap: bool,
    pub rchap: bool,
    pub target: Option<SocketAddr>,
    pub boot_lun: u64,
    pub chap_type: u8,
    /// Index of the NIC used to reach the target.
    pub nic_association: u8,
    /// iSCSI qualified name or EUI of the target.
    pub target_name: String,
    pub chap_name: String,
    pub chap_secret: String,
    pub reverse_chap_name: String,
    pub reverse_chap_secret: String,
}

impl Target {
    fn marshal(&self, h: &mut HeapTable) -> Result<(), HeapError> {
        write_structure_header(
            h,
            StructureId::Target,
            flags(&[self.valid, self.boot, self.chap, self.rchap]),
        );
        match self.target {
            Some(addr) => h.write_socket_addr(addr),
            None => {
                h.write_ip(None);
                h.write_u16(0);
            }
        }
        h.write_u64(self.boot_lun);
        h.write_u8(self.chap_type);
        h.write_u8(self.nic_association);
        for item in [
            &self.target_name,
            &self.chap_name,
            &self.chap_secret,
            &self.reverse_chap_name,
            &self.reverse_chap_secret,
        ] {
            h.write_heap(item.as_bytes())?;
        }
        Ok(())
    }
}

/// The whole table: one initiator, one NIC, one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ibft {
    pub single_login_mode: bool,
    pub initiator: Initiator,
    pub nic0: Nic,
    pub target0: Target,
}

impl Ibft {
    fn marshal_control(&self, h: &mut HeapTable) {
        write_structure_header(h, StructureId::Control, flags(&[self.single_login_mode]));
        // extensions
        h.write_u16(0);
        h.write_u16(INITIATOR_OFFSET);
        h.write_u16(NIC0_OFFSET);
        h.write_u16(TARGET0_OFFSET);
        // nic1, target1
        h.write_u16(0);
        h.write_u16(0);
    }

    /// Serialize to a complete `iBFT` ACPI table.
    ///
    /// # Errors
    /// [`IbftError::Heap`] if the strings overflow the 16-bit heap offsets.
    pub fn marshal(&self) -> Result<Vec<u8>, IbftError> {
        let mut h = HeapTable::with_layout(HeapLayout {
            base: u64::from(HEAP_OFFSET),
            nul_terminated: true,
        });

        let header = Header {
            signature: IBFT_SIGNATURE,
            revision: 1,
            oem_id: IBFT_OEM_ID,
            oem_table_id: IBFT_OEM_TABLE_ID,
            ..Header::default()
        };
        h.write_bytes(&header.marshal());
        h.write_bytes(&[0; IBFT_HEADER_LENGTH - crate::HEADER_LENGTH]);

        h.align(STRUCTURE_ALIGNMENT);
        self.marshal_control(&mut h);
        h.align(STRUCTURE_ALIGNMENT);
        self.initiator.marshal(&mut h)?;
        h.align(STRUCTURE_ALIGNMENT);
        self.nic0.marshal(&mut h)?;
        h.align(STRUCTURE_ALIGNMENT);
        self.target0.marshal(&mut h)?;
        h.align(STRUCTURE_ALIGNMENT);
        debug_assert_eq!(h.head().len(), usize::from(HEAP_OFFSET));

        let mut table = h.finish();
        fix_header(&mut table)?;
        log::debug!("marshaled {self}, {} bytes", table.len());
        Ok(table)
    }
}

impl fmt::Display for Ibft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iBFT(iSCSI target=")?;
        match self.target0.target {
            Some(addr) => write!(f, "{addr}")?,
            None => write!(f, "<nil>")?,
        }
        write!(f, ", IP=")?;
        match self.nic0.ip_net {
            Some((ip, prefix)) => write!(f, "{ip}/{prefix})"),
            None => write!(f, "<nil>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn u16_at(b: &[u8], off: usize) -> u16 {
        u16::from_le_bytes([b[off], b[off + 1]])
    }

    fn sample() -> Ibft {
        Ibft {
            single_login_mode: true,
            initiator: Initiator {
                name: "iqn.2019-10.org.example:initiator".into(),
                valid: true,
                boot: true,
                ..Initiator::default()
            },
            nic0: Nic {
                valid: true,
                boot: true,
                global: true,
                ip_net: Some((IpAddr::V4(Ipv4Addr::new(192, 168, 1, 15)), 24)),
                origin: Origin::Dhcp,
                gateway: Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))),
                mac: [0x52, 0x54, 0, 0x12, 0x34, 0x56],
                pci_bdf: Bdf::new().with_bus(0).with_device(3).with_function(0),
                host_name: "node0".into(),
                ..Nic::default()
            },
            target0: Target {
                valid: true,
                boot: true,
                target: Some("192.168.1.2:3260".parse().unwrap()),
                boot_lun: 1,
                target_name: "iqn.2019-10.org.example:disk".into(),
                ..Target::default()
            },
        }
    }

    #[test]
    fn structures_sit_at_fixed_offsets() {
        let t = sample().marshal().unwrap();
        assert_eq!(&t[..4], b"iBFT");
        assert_eq!(t[8], 1);
        assert_eq!(crate::sum(&t), 0);
        assert_eq!(u32::from_le_bytes([t[4], t[5], t[6], t[7]]) as usize, t.len());

        for (off, id, len) in [(0x30, 1, 18), (0x48, 2, 74), (0x98, 3, 102), (0x100, 4, 54)] {
            assert_eq!(t[off], id, "structure id at 0x{off:x}");
            assert_eq!(t[off + 1], 1);
            assert_eq!(u16_at(&t, off + 2), len);
        }

        // control points at the other structures
        assert_eq!(t[0x30 + 5], 1);
        assert_eq!(u16_at(&t, 0x38), 0x48);
        assert_eq!(u16_at(&t, 0x3A), 0x98);
        assert_eq!(u16_at(&t, 0x3C), 0x100);
    }

    #[test]
    fn heap_items_are_table_relative_and_terminated() {
        let ibft = sample();
        let t = ibft.marshal().unwrap();

        let name_len = usize::from(u16_at(&t, 0x48 + 70));
        let name_off = usize::from(u16_at(&t, 0x48 + 72));
        assert_eq!(name_off, 0x138);
        assert_eq!(&t[name_off..name_off + name_len], ibft.initiator.name.as_bytes());
        assert_eq!(t[name_off + name_len], 0);

        let host_off = usize::from(u16_at(&t, 0x98 + 100));
        assert_eq!(host_off, name_off + name_len + 1);
        assert_eq!(&t[host_off..host_off + 5], b"node0");

        // empty CHAP name is (0, 0)
        assert_eq!(u16_at(&t, 0x100 + 38), 0);
        assert_eq!(u16_at(&t, 0x100 + 40), 0);
    }

    #[test]
    fn nic_fields() {
        let t = sample().marshal().unwrap();
        let nic = 0x98;
        assert_eq!(t[nic + 5], 0b111);
        assert_eq!(&t[nic + 6 + 10..nic + 6 + 16], &[0xFF, 0xFF, 192, 168, 1, 15]);
        assert_eq!(t[nic + 22], 24);
        assert_eq!(t[nic + 23], Origin::Dhcp as u8);
        assert_eq!(&t[nic + 90..nic + 96], &[0x52, 0x54, 0, 0x12, 0x34, 0x56]);
        assert_eq!(u16_at(&t, nic + 96), 3 << 3);
    }

    #[test]
    fn empty_table_has_no_heap() {
        let t = Ibft::default().marshal().unwrap();
        assert_eq!(t.len(), usize::from(HEAP_OFFSET));
        assert_eq!(crate::sum(&t), 0);
    }

    #[test]
    fn flags_set_bits_in_order() {
        assert_eq!(flags(&[]), 0);
        assert_eq!(flags(&[true, false, true]), 0b101);
        assert_eq!(flags(&[false, true, true, true]), 0b1110);
    }

    #[test]
    fn display_summary() {
        assert_eq!(
            sample().to_string(),
            "iBFT(iSCSI target=192.168.1.2:3260, IP=192.168.1.15/24)"
        );
    }
}
