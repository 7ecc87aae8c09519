// Copyright 2025 The guestabi Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # guestabi
//!
//! Guest memory translation and ABI struct thunking for user-mode system call
//! emulators.
//!
//! A user-mode emulator runs a guest program compiled for one ABI (for example
//! big-endian MIPS O32) on a host with a different ABI. Every system call that
//! takes a pointer needs two things before the host kernel can be called:
//! the guest pointer must be turned into a safe host view of guest memory, and
//! any struct or flag word behind it must be rewritten from the guest layout to
//! the host layout (and back again for results).
//!
//! ## Features
//!
//! - **Address translation** - A fixed guest window inside one host mapping, with a reserved ceiling
//! - **Access validation** - Range checks, plus optional per-page permissions
//! - **Memory leases** - Scoped direct or shadow-copied views of guest ranges
//! - **String probing** - Bounded C string length discovery that never reads past valid memory
//! - **Struct thunking** - Table-driven conversion between two data models
//! - **Flag translation** - Bidirectional bitmask tables, with Linux MIPS tables included
//!
//! ## Quick Start
//!
//! ```rust
//! use guestabi::prelude::*;
//!
//! let config = AbiConfig::mips_o32().with_memory(MemoryConfig::new(0x10_0000));
//! let mut memory = config.build_memory()?;
//! let mut registry = config.build_registry();
//! let linux = guestabi::abi::linux::register(&mut registry)?;
//!
//! // A guest `struct timespec { long tv_sec; long tv_nsec; }` at 0x2000
//! let addr = GuestAddr::new(0x2000);
//! memory.put_user(addr, 5_i32)?;
//! memory.put_user(GuestAddr::new(0x2004), 250_i32)?;
//!
//! let thunk = StructThunk::new(&registry);
//! let host = thunk.read_struct(&memory, linux.timespec, addr)?;
//! assert_eq!(host.len(), registry.size_of(&TypeDescriptor::Struct(linux.timespec), Side::Host)?);
//! # Ok::<(), guestabi::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`]. Errors caused by guest-supplied input
//! map to a Linux errno through [`Error::errno`], so a syscall layer can hand
//! them straight back to the guest:
//!
//! ```rust
//! use guestabi::{errno, Error};
//!
//! let err = Error::Fault { address: 0, length: 4 };
//! assert_eq!(err.errno(), errno::EFAULT);
//! ```
#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use guestabi::prelude::*;
///
/// let memory = GuestMemory::new(&MemoryConfig::new(0x1000), Endian::Little)?;
/// assert!(memory.window().contains(GuestAddr::new(0x10)));
/// # Ok::<(), guestabi::Error>(())
/// ```
pub mod prelude;

/// Byte order, data models and the Linux guest tables.
///
/// This module holds everything that describes an ABI rather than a piece of
/// memory: [`abi::DataModel`] gives the size and alignment of each C scalar,
/// [`abi::Endian`] with the [`abi::AbiIO`] trait read and write scalars in a
/// given byte order, and [`abi::linux`] carries the flag tables and struct
/// descriptors for a MIPS O32 Linux guest.
pub mod abi;

/// Configuration presets for memory and struct thunking.
pub mod config;

/// Guest memory.
///
/// Address translation, access validation, leases and C string probing over a
/// single host mapping. See [`memory::GuestMemory`] for the entry point.
pub mod memory;

/// Struct and flag conversion between the guest and host ABI.
///
/// See [`thunk::StructThunk`] for struct conversion and [`thunk::BitmaskTable`]
/// for flag words.
pub mod thunk;

/// `guestabi` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `guestabi` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use guestabi::abi::Endian;
/// use guestabi::config::MemoryConfig;
/// use guestabi::memory::{GuestAddr, GuestMemory};
/// use guestabi::Error;
///
/// let memory = GuestMemory::new(&MemoryConfig::new(0x1000), Endian::Big)?;
/// match memory.get_user::<u32>(GuestAddr::new(0x2000)) {
///     Ok(value) => println!("read {value}"),
///     Err(Error::Fault { address, .. }) => println!("bad guest pointer {address:#x}"),
///     Err(e) => println!("Error: {e}"),
/// }
/// # Ok::<(), guestabi::Error>(())
/// ```
pub use error::Error;

/// Linux errno values returned by [`Error::errno`].
pub use error::errno;
