//! Struct and flag thunking between the guest ABI and the host ABI.
//!
//! System call arguments that are structs or flag words have a guest
//! representation, laid out by the emulated kernel's ABI, and a host
//! representation, laid out by the ABI of the platform running the emulator.
//! This module converts between the two.
//!
//! # Architecture
//!
//! - [`TypeDescriptor`] - The C type of one field
//! - [`StructDescriptor`] / [`StructLayout`] - A struct's fields plus its target and host layout
//! - [`StructRegistry`] - Fixed-capacity table of descriptors, populated once at startup
//! - [`StructThunk`] - The conversion engine, borrowing a registry and a [`PointerTranslator`]
//! - [`BitmaskTable`] - Flag word transcoding
//!
//! # Examples
//!
//! ```rust
//! use guestabi::abi::DataModel;
//! use guestabi::thunk::{Direction, StructDescriptor, StructRegistry, StructThunk, TypeDescriptor};
//!
//! let mut registry = StructRegistry::new(DataModel::mips_o32(), DataModel::x86_64(), 8);
//! let winsize = StructDescriptor::builder("winsize")
//!     .fields(vec![TypeDescriptor::Short; 4])
//!     .build(&registry)?;
//! let id = registry.register(winsize)?;
//!
//! let thunk = StructThunk::new(&registry);
//! let guest = [0, 24, 0, 80, 0, 0, 0, 0];
//! let host = thunk.convert(id, Direction::ToHost, &guest)?;
//! assert_eq!(host, [24, 0, 80, 0, 0, 0, 0, 0]);
//! assert_eq!(thunk.convert(id, Direction::ToTarget, &host)?, guest);
//! # Ok::<(), guestabi::Error>(())
//! ```

mod bitmask;
mod convert;
mod layout;
mod marshal;
mod registry;
mod types;

pub use bitmask::{translate_bitmask, BitmaskDirection, BitmaskEntry, BitmaskTable};
pub use convert::{IdentityPointers, PointerTranslator, StructConverter, StructThunk};
pub use layout::{StructBuilder, StructDescriptor, StructLayout};
pub use registry::{StructRegistry, DEFAULT_REGISTRY_CAPACITY};
pub use types::{TypeDescriptor, TypeTag};

/// Identifier of a registered struct, dense in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StructId(pub u32);

impl std::fmt::Display for StructId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One of the two representations of a struct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// The guest ABI
    Target,
    /// The host ABI
    Host,
}

/// Direction of a struct conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Guest representation to host representation
    ToHost,
    /// Host representation to guest representation
    ToTarget,
}

impl Direction {
    /// The side read from
    #[must_use]
    pub const fn source(self) -> Side {
        match self {
            Direction::ToHost => Side::Target,
            Direction::ToTarget => Side::Host,
        }
    }

    /// The side written to
    #[must_use]
    pub const fn destination(self) -> Side {
        match self {
            Direction::ToHost => Side::Host,
            Direction::ToTarget => Side::Target,
        }
    }

    /// The opposite direction
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Direction::ToHost => Direction::ToTarget,
            Direction::ToTarget => Direction::ToHost,
        }
    }
}
