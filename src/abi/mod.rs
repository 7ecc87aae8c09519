//! ABI primitives shared by guest memory and the struct thunk engine.
//!
//! - [`io`] - Byte-order aware scalar access over byte buffers
//! - [`model`] - Per-ABI data models ([`DataModel`])
//! - [`linux`] - Concrete Linux struct descriptors and flag tables for a MIPS O32
//!   guest on an x86_64 host

mod io;
pub mod linux;
mod model;

pub use io::{read_at, read_int, read_uint, write_at, write_uint, AbiIO, Endian};
pub use model::DataModel;
