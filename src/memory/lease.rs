//! Scoped access to guest memory ranges.
//!
//! A [`MemoryLease`] is taken for one system call argument and released when
//! the call is done. Under [`LeaseStrategy::DirectAlias`] the lease views guest
//! memory in place. Under [`LeaseStrategy::ShadowCopy`] it owns a private buffer
//! that is copied back on release if the lease was taken for writing.
//!
//! Leases do not borrow [`GuestMemory`]; the memory is passed back in to read
//! the view and to release. Releasing is idempotent.

use log::trace;

use crate::{
    memory::{AccessMode, GuestAddr, GuestMemory},
    Error, Result,
};

/// How leases expose guest memory. Chosen once, when guest memory is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum LeaseStrategy {
    /// The view is guest memory itself; release only marks the lease released.
    #[default]
    DirectAlias,
    /// The view is a private buffer, written back on release for write leases.
    ShadowCopy,
}

#[derive(Debug)]
enum LeaseView {
    Empty,
    Alias,
    Shadow(Vec<u8>),
}

/// A view onto `[address, address + length)` of guest memory.
///
/// # Examples
///
/// ```rust
/// use guestabi::abi::Endian;
/// use guestabi::config::MemoryConfig;
/// use guestabi::memory::{AccessMode, GuestAddr, GuestMemory, LeaseStrategy};
///
/// let config = MemoryConfig::new(0x10000).with_strategy(LeaseStrategy::ShadowCopy);
/// let mut memory = GuestMemory::new(&config, Endian::Little)?;
/// let addr = GuestAddr::new(0x800);
///
/// let mut lease = memory.acquire(addr, 4, AccessMode::WRITE, false)?;
/// lease.bytes_mut(&mut memory)?.copy_from_slice(b"abcd");
/// assert_eq!(memory.copy_from_guest(addr, 4)?, [0; 4]);
///
/// memory.release(&mut lease)?;
/// assert_eq!(memory.copy_from_guest(addr, 4)?, b"abcd");
/// # Ok::<(), guestabi::Error>(())
/// ```
#[derive(Debug)]
#[must_use = "shadow leases only reach guest memory when released"]
pub struct MemoryLease {
    address: GuestAddr,
    length: usize,
    mode: AccessMode,
    view: LeaseView,
    released: bool,
}

impl MemoryLease {
    /// Start of the leased range
    #[must_use]
    pub fn address(&self) -> GuestAddr {
        self.address
    }

    /// Length of the leased range in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` for a zero-length lease
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The access mode the lease was taken for
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Returns `true` if the view is a private buffer
    #[must_use]
    pub fn is_shadow(&self) -> bool {
        matches!(self.view, LeaseView::Shadow(_))
    }

    /// Returns `true` once the lease has been released
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Returns the leased bytes.
    ///
    /// `memory` must be the guest memory the lease was acquired from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fault`] if the lease was already released.
    pub fn bytes<'a>(&'a self, memory: &'a GuestMemory) -> Result<&'a [u8]> {
        if self.released {
            return Err(self.fault());
        }
        match &self.view {
            LeaseView::Empty => Ok(&[]),
            LeaseView::Alias => memory.slice(self.address, self.length),
            LeaseView::Shadow(buffer) => Ok(buffer.as_slice()),
        }
    }

    /// Returns the leased bytes for writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fault`] if the lease was released or was not taken
    /// with [`AccessMode::WRITE`].
    pub fn bytes_mut<'a>(&'a mut self, memory: &'a mut GuestMemory) -> Result<&'a mut [u8]> {
        if self.released || !self.mode.contains(AccessMode::WRITE) {
            return Err(self.fault());
        }
        match &mut self.view {
            LeaseView::Empty => Ok(&mut []),
            LeaseView::Alias => memory.slice_mut(self.address, self.length),
            LeaseView::Shadow(buffer) => Ok(buffer.as_mut_slice()),
        }
    }

    fn fault(&self) -> Error {
        Error::Fault {
            address: self.address.value(),
            length: self.length as u64,
        }
    }
}

impl GuestMemory {
    /// Leases `[addr, addr + length)` for `mode`.
    ///
    /// With [`LeaseStrategy::ShadowCopy`] the buffer is filled from guest memory
    /// when `want_copy` is set and zeroed otherwise. `want_copy` has no effect
    /// on direct aliases. A zero-length lease has an empty view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fault`] if the range fails validation or is a non-empty
    /// range at the null address.
    pub fn acquire(
        &self,
        addr: GuestAddr,
        length: usize,
        mode: AccessMode,
        want_copy: bool,
    ) -> Result<MemoryLease> {
        self.check_access(addr, length, mode)?;

        let view = if length == 0 {
            LeaseView::Empty
        } else {
            match self.strategy() {
                LeaseStrategy::DirectAlias => LeaseView::Alias,
                LeaseStrategy::ShadowCopy if want_copy => {
                    LeaseView::Shadow(self.slice(addr, length)?.to_vec())
                }
                LeaseStrategy::ShadowCopy => LeaseView::Shadow(vec![0; length]),
            }
        };

        trace!("Leased {:#x} bytes at {} ({:?})", length, addr, mode);

        Ok(MemoryLease {
            address: addr,
            length,
            mode,
            view,
            released: false,
        })
    }

    /// Releases a lease, writing a shadow buffer back if the lease allows writing.
    ///
    /// Releasing an already released lease does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fault`] if the lease does not belong to this memory.
    /// The lease counts as released either way.
    pub fn release(&mut self, lease: &mut MemoryLease) -> Result<()> {
        if lease.released {
            return Ok(());
        }
        lease.released = true;

        let view = std::mem::replace(&mut lease.view, LeaseView::Empty);
        if let LeaseView::Shadow(buffer) = view {
            if lease.mode.contains(AccessMode::WRITE) {
                trace!("Writing back {:#x} bytes at {}", buffer.len(), lease.address);
                self.slice_mut(lease.address, lease.length)?
                    .copy_from_slice(&buffer);
            }
        }
        Ok(())
    }

    /// Releases `lease` if present; `None` is a no-op.
    ///
    /// # Errors
    ///
    /// Same as [`release`](Self::release).
    pub fn release_opt(&mut self, lease: Option<&mut MemoryLease>) -> Result<()> {
        match lease {
            Some(lease) => self.release(lease),
            None => Ok(()),
        }
    }

    /// Leases a range, runs `f` over its bytes, and releases.
    ///
    /// If `mode` does not include [`AccessMode::WRITE`], `f` works on a private
    /// copy and its changes are discarded, whatever the lease strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fault`] if the range cannot be leased.
    pub fn with_lease<R>(
        &mut self,
        addr: GuestAddr,
        length: usize,
        mode: AccessMode,
        want_copy: bool,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R> {
        let mut lease = self.acquire(addr, length, mode, want_copy)?;

        let result = if mode.contains(AccessMode::WRITE) {
            lease.bytes_mut(self).map(f)
        } else {
            lease.bytes(self).map(|bytes| f(&mut bytes.to_vec()))
        };

        self.release(&mut lease)?;
        result
    }

    /// Runs `f` over `length` readable guest bytes at `addr` without copying.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fault`] if the range may not be read.
    pub fn with_read<R>(
        &self,
        addr: GuestAddr,
        length: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R> {
        self.check_access(addr, length, AccessMode::READ)?;
        if length == 0 {
            return Ok(f(&[]));
        }
        Ok(f(self.slice(addr, length)?))
    }
}
