//! # Physical Addresses

use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// Physical memory address.
///
/// A thin wrapper around a `u64` that denotes **physical** addresses as seen
/// through `/dev/mem`. It carries intent and keeps raw file offsets, buffer
/// indices and physical addresses from being mixed up.
///
/// ### Examples
/// ```rust
/// # use boot_acpi::PhysicalAddress;
/// let ebda = PhysicalAddress::from_segment(0x9FC0);
/// assert_eq!(ebda.as_u64(), 0x9_FC00);
/// assert_eq!(ebda.to_next_boundary(0x1_0000), 0x400);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    /// Real-mode segment value to linear address (`segment << 4`).
    #[inline]
    #[must_use]
    pub const fn from_segment(segment: u16) -> Self {
        Self((segment as u64) << 4)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `align` must be a power of two.
    #[inline]
    #[must_use]
    pub const fn is_aligned(self, align: u64) -> bool {
        self.0 & (align - 1) == 0
    }

    /// Bytes from here to the next multiple of `boundary` (a power of two).
    /// An address sitting on a boundary is a full `boundary` away from the next.
    #[inline]
    #[must_use]
    pub const fn to_next_boundary(self, boundary: u64) -> u64 {
        boundary - (self.0 & (boundary - 1))
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl fmt::LowerHex for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for u64 {
    #[inline]
    fn from(v: PhysicalAddress) -> Self {
        v.0
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl Sub for PhysicalAddress {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: Self) -> u64 {
        self.0 - rhs.0
    }
}
