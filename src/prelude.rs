//! # guestabi Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the guestabi library. Import this module to get quick access to the essential
//! types for translating guest memory and thunking structs.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all guestabi operations
pub use crate::Error;

/// The result type used throughout guestabi
pub use crate::Result;

// ================================================================================================
// Configuration
// ================================================================================================

/// Top-level and memory configuration
pub use crate::config::{AbiConfig, MemoryConfig};

// ================================================================================================
// ABI Description
// ================================================================================================

/// Data models and byte order
pub use crate::abi::{AbiIO, DataModel, Endian};

// ================================================================================================
// Guest Memory
// ================================================================================================

/// Guest memory and its addresses
pub use crate::memory::{AddressWindow, GuestAddr, GuestMemory, HostAddr};

/// Access validation
pub use crate::memory::{AccessMode, AccessPolicy, AccessValidator, PageFlags};

/// Scoped access to guest ranges
pub use crate::memory::{LeaseStrategy, MemoryLease};

// ================================================================================================
// Struct and Flag Thunking
// ================================================================================================

/// Struct descriptions
pub use crate::thunk::{StructDescriptor, StructId, StructLayout, StructRegistry, TypeDescriptor};

/// Conversion engine
pub use crate::thunk::{Direction, PointerTranslator, Side, StructThunk};

/// Flag word translation
pub use crate::thunk::{BitmaskDirection, BitmaskEntry, BitmaskTable};
