//! Guest memory: address translation, access validation, leases and string probing.
//!
//! # Architecture
//!
//! - [`AddressWindow`] - Immutable placement of guest addresses in host memory
//! - [`AccessValidator`] / [`GuestValidator`] - Range and optional per-page permission checks
//! - [`GuestMemory`] - The host mapping backing the window, with typed accessors
//! - [`MemoryLease`] - Scoped views of guest ranges, direct or shadowed
//! - [`GuestMemory::probe_length`] - Bounded C string length probing
//!
//! All failures caused by guest-supplied addresses are returned as
//! [`crate::Error::Fault`], [`crate::Error::InvalidAddress`] or
//! [`crate::Error::InvalidLength`] values. Nothing here panics or reads outside
//! the mapping because of a bad guest pointer.
//!
//! # Examples
//!
//! ```rust
//! use guestabi::abi::Endian;
//! use guestabi::config::MemoryConfig;
//! use guestabi::memory::{AccessMode, GuestAddr, GuestMemory};
//!
//! let mut memory = GuestMemory::new(&MemoryConfig::new(0x10000), Endian::Big)?;
//! let buf = GuestAddr::new(0x1000);
//!
//! memory.with_lease(buf, 8, AccessMode::WRITE, false, |bytes| {
//!     bytes.copy_from_slice(b"guest\0\0\0");
//! })?;
//! assert_eq!(memory.read_cstring(buf)?, b"guest");
//! # Ok::<(), guestabi::Error>(())
//! ```

mod guest;
mod lease;
mod string;
mod validator;
mod window;

pub use guest::GuestMemory;
pub use lease::{LeaseStrategy, MemoryLease};
pub use validator::{
    AccessMode, AccessPolicy, AccessValidator, GuestValidator, PageFlags, PageTable, PAGE_SIZE,
};
pub use window::{AddressWindow, GuestAddr, HostAddr, DEFAULT_ADDRESS_BITS};
