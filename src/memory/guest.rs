//! Host-backed guest memory.
//!
//! [`GuestMemory`] owns the anonymous host mapping that backs the guest address
//! window, together with the validator guarding it. Guest address `a` is byte
//! `a` of the mapping, so the window's base offset is the mapping's host
//! address. Everything that touches guest bytes (leases, string probes, typed
//! accessors, struct marshaling) goes through this type.

use log::debug;
use memmap2::MmapMut;

use crate::{
    abi::{read_at, write_at, AbiIO, Endian},
    config::MemoryConfig,
    memory::{
        AccessMode, AccessPolicy, AccessValidator, AddressWindow, GuestAddr, GuestValidator,
        HostAddr, LeaseStrategy, PageFlags,
    },
    thunk::PointerTranslator,
    Error, Result,
};

/// The guest's address space, backed by an anonymous host mapping.
///
/// # Examples
///
/// ```rust
/// use guestabi::abi::Endian;
/// use guestabi::config::MemoryConfig;
/// use guestabi::memory::{GuestAddr, GuestMemory};
///
/// let mut memory = GuestMemory::new(&MemoryConfig::new(0x10000), Endian::Big)?;
/// let addr = GuestAddr::new(0x100);
///
/// memory.put_user(addr, 0x1234_5678_u32)?;
/// assert_eq!(memory.copy_from_guest(addr, 4)?, [0x12, 0x34, 0x56, 0x78]);
/// assert_eq!(memory.get_user::<u16>(addr)?, 0x1234);
/// # Ok::<(), guestabi::Error>(())
/// ```
#[derive(Debug)]
pub struct GuestMemory {
    map: MmapMut,
    validator: GuestValidator,
    strategy: LeaseStrategy,
    endian: Endian,
}

impl GuestMemory {
    /// Maps guest memory as described by `config`.
    ///
    /// Only the usable part of the window, up to the reserved ceiling, is
    /// backed by host memory. All bytes start zeroed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLength`] or [`Error::Malformed`] for an invalid
    /// window configuration and [`Error::Io`] if the host mapping fails.
    pub fn new(config: &MemoryConfig, endian: Endian) -> Result<Self> {
        let mut window = AddressWindow::with_address_bits(0, config.size, config.address_bits)?;
        if let Some(ceiling) = config.reserved_ceiling {
            window = window.with_reserved_ceiling(ceiling)?;
        }

        let Ok(length) = usize::try_from(window.limit()) else {
            return Err(Error::InvalidLength {
                address: 0,
                length: window.limit(),
            });
        };
        let map = MmapMut::map_anon(length)?;

        let mut window =
            AddressWindow::with_address_bits(map.as_ptr() as u64, config.size, config.address_bits)?;
        if let Some(ceiling) = config.reserved_ceiling {
            window = window.with_reserved_ceiling(ceiling)?;
        }

        debug!(
            "Mapped {:#x} bytes of guest memory at {:#x} ({:?}, {:?})",
            length,
            window.base_offset(),
            config.strategy,
            config.policy
        );

        Ok(GuestMemory {
            map,
            validator: GuestValidator::new(window, config.policy),
            strategy: config.strategy,
            endian,
        })
    }

    /// The address window
    #[must_use]
    pub fn window(&self) -> &AddressWindow {
        self.validator.window()
    }

    /// The access validator
    #[must_use]
    pub fn validator(&self) -> &GuestValidator {
        &self.validator
    }

    /// The lease strategy chosen at creation
    #[must_use]
    pub fn strategy(&self) -> LeaseStrategy {
        self.strategy
    }

    /// The access policy chosen at creation
    #[must_use]
    pub fn policy(&self) -> AccessPolicy {
        self.validator.policy()
    }

    /// Byte order of scalars in guest memory
    #[must_use]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Translates a guest address to its host address. See [`AddressWindow::translate`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] for null or out-of-window addresses.
    pub fn translate(&self, addr: GuestAddr) -> Result<HostAddr> {
        self.window().translate(addr)
    }

    /// Returns the flags of the page containing `addr` under the page-tracked policy.
    #[must_use]
    pub fn page_flags(&self, addr: GuestAddr) -> Option<PageFlags> {
        self.validator.page_flags(addr)
    }

    /// Sets page permissions. See [`GuestValidator::set_page_flags`].
    ///
    /// # Errors
    ///
    /// Same as [`GuestValidator::set_page_flags`].
    pub fn set_page_flags(&mut self, addr: GuestAddr, length: u64, flags: PageFlags) -> Result<()> {
        self.validator.set_page_flags(addr, length, flags)
    }

    /// Copies `length` guest bytes at `addr` into a new buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fault`] if the range may not be read.
    pub fn copy_from_guest(&self, addr: GuestAddr, length: usize) -> Result<Vec<u8>> {
        self.check_access(addr, length, AccessMode::READ)?;
        Ok(self.slice(addr, length)?.to_vec())
    }

    /// Copies `data` into guest memory at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fault`] if the range may not be written.
    pub fn copy_to_guest(&mut self, addr: GuestAddr, data: &[u8]) -> Result<()> {
        self.check_access(addr, data.len(), AccessMode::WRITE)?;
        self.slice_mut(addr, data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Reads one scalar in the guest's byte order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fault`] if the scalar may not be read.
    pub fn get_user<T: AbiIO>(&self, addr: GuestAddr) -> Result<T> {
        let length = std::mem::size_of::<T>();
        self.check_access(addr, length, AccessMode::READ)?;
        read_at(self.slice(addr, length)?, 0, self.endian)
    }

    /// Writes one scalar in the guest's byte order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fault`] if the scalar may not be written.
    pub fn put_user<T: AbiIO>(&mut self, addr: GuestAddr, value: T) -> Result<()> {
        let length = std::mem::size_of::<T>();
        self.check_access(addr, length, AccessMode::WRITE)?;
        let endian = self.endian;
        write_at(self.slice_mut(addr, length)?, 0, value, endian)
    }

    /// Fails with [`Error::Fault`] unless `[addr, addr + length)` may be accessed
    /// with `mode`. A non-empty range at the null address always faults.
    pub(crate) fn check_access(&self, addr: GuestAddr, length: usize, mode: AccessMode) -> Result<()> {
        let length = length as u64;
        if (length > 0 && addr.is_null()) || !self.validator.validate(addr, length, mode) {
            return Err(Error::Fault {
                address: addr.value(),
                length,
            });
        }
        Ok(())
    }

    /// Guest bytes without a permission check. Callers validate first.
    pub(crate) fn slice(&self, addr: GuestAddr, length: usize) -> Result<&[u8]> {
        let (start, end) = map_range(addr, length)?;
        self.map.get(start..end).ok_or(Error::Fault {
            address: addr.value(),
            length: length as u64,
        })
    }

    /// Mutable guest bytes without a permission check. Callers validate first.
    pub(crate) fn slice_mut(&mut self, addr: GuestAddr, length: usize) -> Result<&mut [u8]> {
        let (start, end) = map_range(addr, length)?;
        self.map.get_mut(start..end).ok_or(Error::Fault {
            address: addr.value(),
            length: length as u64,
        })
    }
}

impl AccessValidator for GuestMemory {
    fn validate(&self, addr: GuestAddr, length: u64, mode: AccessMode) -> bool {
        self.validator.validate(addr, length, mode)
    }
}

impl PointerTranslator for GuestMemory {
    fn to_host(&self, guest: u64) -> Result<u64> {
        self.window().to_host(guest)
    }

    fn to_guest(&self, host: u64) -> Result<u64> {
        self.window().to_guest(host)
    }
}

fn map_range(addr: GuestAddr, length: usize) -> Result<(usize, usize)> {
    let fault = Error::Fault {
        address: addr.value(),
        length: length as u64,
    };
    let Ok(start) = usize::try_from(addr.value()) else {
        return Err(fault);
    };
    match start.checked_add(length) {
        Some(end) => Ok((start, end)),
        None => Err(fault),
    }
}
