//! The guest address window.
//!
//! An [`AddressWindow`] describes where the guest's virtual address space lives
//! in host memory: guest address `a` is reachable at host address
//! `a + base_offset` as long as `a` lies inside the window and below the
//! reserved ceiling, if one is configured. The window is fixed once the guest
//! process starts.

use crate::{
    memory::{AccessMode, AccessValidator},
    thunk::PointerTranslator,
    Error, Result,
};

/// Default width of a guest address in bits.
pub const DEFAULT_ADDRESS_BITS: u32 = 32;

/// An address in guest virtual memory.
///
/// The address is stored zero-extended; its meaningful width is given by the
/// [`AddressWindow`] it is used with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GuestAddr(u64);

impl GuestAddr {
    /// The null guest address.
    pub const NULL: GuestAddr = GuestAddr(0);

    /// Creates a guest address.
    #[must_use]
    pub const fn new(address: u64) -> Self {
        GuestAddr(address)
    }

    /// Returns the raw address.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns `true` for the null address.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns the address `offset` bytes further, or `None` on overflow.
    #[must_use]
    pub fn checked_add(self, offset: u64) -> Option<GuestAddr> {
        self.0.checked_add(offset).map(GuestAddr)
    }
}

impl From<u32> for GuestAddr {
    fn from(address: u32) -> Self {
        GuestAddr(u64::from(address))
    }
}

impl std::fmt::Display for GuestAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// An address in host memory, produced by [`AddressWindow::translate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostAddr(u64);

impl HostAddr {
    /// Creates a host address.
    #[must_use]
    pub const fn new(address: u64) -> Self {
        HostAddr(address)
    }

    /// Returns the raw address.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Placement of the guest address space inside host memory.
///
/// # Examples
///
/// ```rust
/// use guestabi::memory::{AccessMode, AccessValidator, AddressWindow, GuestAddr};
///
/// let window = AddressWindow::new(0x7f00_0000_0000, 0x10000)?;
/// assert_eq!(window.translate(GuestAddr::new(0x1234))?.value(), 0x7f00_0000_1234);
/// assert!(window.translate(GuestAddr::NULL).is_err());
///
/// assert!(window.validate(GuestAddr::new(0xFFF0), 0x10, AccessMode::READ));
/// assert!(!window.validate(GuestAddr::new(0xFFF0), 0x20, AccessMode::READ));
/// # Ok::<(), guestabi::Error>(())
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressWindow {
    base_offset: u64,
    size: u64,
    reserved_ceiling: Option<u64>,
    address_bits: u32,
}

impl AddressWindow {
    /// Creates a window of `size` bytes at `base_offset` for 32-bit guest addresses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLength`] if `size` is zero or larger than the
    /// 32-bit address space.
    pub fn new(base_offset: u64, size: u64) -> Result<Self> {
        Self::with_address_bits(base_offset, size, DEFAULT_ADDRESS_BITS)
    }

    /// Creates a window for guest addresses of `address_bits` bits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLength`] if `size` is zero or does not fit the
    /// address width, and [`Error::Malformed`] if `address_bits` is not in
    /// `1..=64`.
    pub fn with_address_bits(base_offset: u64, size: u64, address_bits: u32) -> Result<Self> {
        if !(1..=64).contains(&address_bits) {
            return Err(malformed_error!(
                "Guest address width of {} bits is not supported",
                address_bits
            ));
        }

        let window = AddressWindow {
            base_offset,
            size,
            reserved_ceiling: None,
            address_bits,
        };
        if size == 0 || u128::from(size) > window.address_space() {
            return Err(Error::InvalidLength {
                address: 0,
                length: size,
            });
        }
        if base_offset.checked_add(size).is_none() {
            return Err(Error::InvalidLength {
                address: base_offset,
                length: size,
            });
        }
        Ok(window)
    }

    /// Reserves every guest address at or above `ceiling`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLength`] if `ceiling` is zero or beyond the
    /// address width.
    pub fn with_reserved_ceiling(mut self, ceiling: u64) -> Result<Self> {
        if ceiling == 0 || u128::from(ceiling) > self.address_space() {
            return Err(Error::InvalidLength {
                address: 0,
                length: ceiling,
            });
        }
        self.reserved_ceiling = Some(ceiling);
        Ok(self)
    }

    /// Host address of guest address zero
    #[must_use]
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Size of the window in bytes
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// First reserved guest address, if any
    #[must_use]
    pub fn reserved_ceiling(&self) -> Option<u64> {
        self.reserved_ceiling
    }

    /// Width of a guest address in bits
    #[must_use]
    pub fn address_bits(&self) -> u32 {
        self.address_bits
    }

    /// One past the highest usable guest address: the size, or the ceiling if lower.
    #[must_use]
    pub fn limit(&self) -> u64 {
        match self.reserved_ceiling {
            Some(ceiling) => ceiling.min(self.size),
            None => self.size,
        }
    }

    /// Returns `true` if `addr` is a non-null address below [`limit`](Self::limit).
    #[must_use]
    pub fn contains(&self, addr: GuestAddr) -> bool {
        !addr.is_null() && addr.value() < self.limit()
    }

    /// Translates a guest address to the host address backing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] for the null address and for addresses
    /// at or beyond [`limit`](Self::limit).
    pub fn translate(&self, addr: GuestAddr) -> Result<HostAddr> {
        if !self.contains(addr) {
            return Err(Error::InvalidAddress {
                address: addr.value(),
            });
        }
        Ok(HostAddr(self.base_offset + addr.value()))
    }

    /// Maps a host address back into the guest address space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if `host` does not correspond to a
    /// translatable guest address.
    pub fn host_to_guest(&self, host: HostAddr) -> Result<GuestAddr> {
        let guest = host
            .value()
            .checked_sub(self.base_offset)
            .map(GuestAddr)
            .filter(|guest| self.contains(*guest));
        guest.ok_or(Error::InvalidAddress {
            address: host.value(),
        })
    }

    /// Returns `true` if `[addr, addr + length)` lies inside the window.
    ///
    /// Overflow of the address width is reported as `false`, never wrapped.
    /// An empty range is valid anywhere up to and including the limit.
    #[must_use]
    pub fn validate_range(&self, addr: GuestAddr, length: u64) -> bool {
        match addr.value().checked_add(length) {
            Some(end) => u128::from(end) <= self.address_space() && end <= self.limit(),
            None => false,
        }
    }

    /// Like [`validate_range`](Self::validate_range) but reports why a range is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if `addr` itself is beyond the limit and
    /// [`Error::InvalidLength`] if the range overflows or runs past it.
    pub fn check_range(&self, addr: GuestAddr, length: u64) -> Result<()> {
        if addr.value() > self.limit() {
            return Err(Error::InvalidAddress {
                address: addr.value(),
            });
        }
        if !self.validate_range(addr, length) {
            return Err(Error::InvalidLength {
                address: addr.value(),
                length,
            });
        }
        Ok(())
    }

    fn address_space(&self) -> u128 {
        1u128 << self.address_bits
    }
}

impl AccessValidator for AddressWindow {
    fn validate(&self, addr: GuestAddr, length: u64, _mode: AccessMode) -> bool {
        self.validate_range(addr, length)
    }
}

impl PointerTranslator for AddressWindow {
    fn to_host(&self, guest: u64) -> Result<u64> {
        self.translate(GuestAddr(guest)).map(HostAddr::value)
    }

    fn to_guest(&self, host: u64) -> Result<u64> {
        self.host_to_guest(HostAddr(host)).map(GuestAddr::value)
    }
}
