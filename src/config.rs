//! Configuration for guest memory and struct thunking.
//!
//! - [`AbiConfig`] - Top-level configuration: memory, the two data models, registry size
//! - [`MemoryConfig`] - Window size, reserved ceiling, address width, lease strategy and
//!   access policy
//!
//! # Presets
//!
//! - [`AbiConfig::mips_o32()`] - Big-endian MIPS O32 guest on this host (the default)
//! - [`AbiConfig::native()`] - Guest and host share the host's data model
//!
//! # Example
//!
//! ```rust
//! use guestabi::config::{AbiConfig, MemoryConfig};
//! use guestabi::memory::{AccessPolicy, LeaseStrategy};
//!
//! let config = AbiConfig {
//!     memory: MemoryConfig::new(0x100_0000)
//!         .with_reserved_ceiling(0x80_0000)
//!         .with_strategy(LeaseStrategy::ShadowCopy)
//!         .with_policy(AccessPolicy::PageTracked),
//!     ..AbiConfig::mips_o32()
//! };
//!
//! let memory = config.build_memory()?;
//! let registry = config.build_registry();
//! assert_eq!(memory.window().limit(), 0x80_0000);
//! assert_eq!(registry.capacity(), 128);
//! # Ok::<(), guestabi::Error>(())
//! ```

use crate::{
    abi::DataModel,
    memory::{AccessPolicy, GuestMemory, LeaseStrategy, DEFAULT_ADDRESS_BITS},
    thunk::{StructRegistry, DEFAULT_REGISTRY_CAPACITY},
    Result,
};

/// Default guest window size: 256 MiB.
pub const DEFAULT_WINDOW_SIZE: u64 = 0x1000_0000;

/// Top-level configuration.
///
/// # Default Values
///
/// | Setting | Default Value |
/// |---------|---------------|
/// | `memory` | [`MemoryConfig::default()`] |
/// | `target` | [`DataModel::mips_o32()`] |
/// | `host` | [`DataModel::native()`] |
/// | `registry_capacity` | 128 |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbiConfig {
    /// Guest memory settings.
    pub memory: MemoryConfig,

    /// Data model of the guest ABI.
    ///
    /// Its byte order is also the byte order of guest memory.
    pub target: DataModel,

    /// Data model of the host ABI.
    pub host: DataModel,

    /// Maximum number of struct descriptors.
    pub registry_capacity: usize,
}

impl AbiConfig {
    /// Big-endian MIPS O32 guest on this host.
    #[must_use]
    pub fn mips_o32() -> Self {
        AbiConfig {
            memory: MemoryConfig::default(),
            target: DataModel::mips_o32(),
            host: DataModel::native(),
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
        }
    }

    /// Guest and host both use this host's data model.
    #[must_use]
    pub fn native() -> Self {
        AbiConfig {
            target: DataModel::native(),
            ..Self::mips_o32()
        }
    }

    /// Sets the memory configuration.
    #[must_use]
    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    /// Sets the guest data model.
    #[must_use]
    pub fn with_target(mut self, target: DataModel) -> Self {
        self.target = target;
        self
    }

    /// Sets the host data model.
    #[must_use]
    pub fn with_host(mut self, host: DataModel) -> Self {
        self.host = host;
        self
    }

    /// Sets the registry capacity.
    #[must_use]
    pub fn with_registry_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity;
        self
    }

    /// Maps guest memory in the guest's byte order.
    ///
    /// # Errors
    ///
    /// Same as [`GuestMemory::new`].
    pub fn build_memory(&self) -> Result<GuestMemory> {
        GuestMemory::new(&self.memory, self.target.endian)
    }

    /// Creates an empty struct registry for the configured data models.
    #[must_use]
    pub fn build_registry(&self) -> StructRegistry {
        StructRegistry::new(self.target, self.host, self.registry_capacity)
    }
}

impl Default for AbiConfig {
    fn default() -> Self {
        Self::mips_o32()
    }
}

/// Guest memory configuration.
///
/// # Default Values
///
/// | Setting | Default Value |
/// |---------|---------------|
/// | `size` | 256 MiB |
/// | `reserved_ceiling` | none |
/// | `address_bits` | 32 |
/// | `strategy` | [`LeaseStrategy::DirectAlias`] |
/// | `policy` | [`AccessPolicy::Permissive`] |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Size of the guest window in bytes.
    pub size: u64,

    /// First guest address reserved for the emulator itself.
    ///
    /// Addresses at or above it are never valid for the guest.
    pub reserved_ceiling: Option<u64>,

    /// Width of a guest address in bits.
    pub address_bits: u32,

    /// How leases expose guest memory.
    pub strategy: LeaseStrategy,

    /// How strictly guest ranges are validated.
    pub policy: AccessPolicy,
}

impl MemoryConfig {
    /// Creates a configuration for a window of `size` bytes with default settings.
    #[must_use]
    pub fn new(size: u64) -> Self {
        MemoryConfig {
            size,
            ..Self::default()
        }
    }

    /// Sets the reserved ceiling.
    #[must_use]
    pub fn with_reserved_ceiling(mut self, ceiling: u64) -> Self {
        self.reserved_ceiling = Some(ceiling);
        self
    }

    /// Sets the guest address width.
    #[must_use]
    pub fn with_address_bits(mut self, bits: u32) -> Self {
        self.address_bits = bits;
        self
    }

    /// Sets the lease strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: LeaseStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the access policy.
    #[must_use]
    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            size: DEFAULT_WINDOW_SIZE,
            reserved_ceiling: None,
            address_bits: DEFAULT_ADDRESS_BITS,
            strategy: LeaseStrategy::DirectAlias,
            policy: AccessPolicy::Permissive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{abi::Endian, Error};

    #[test]
    fn defaults() {
        let config = AbiConfig::default();
        assert_eq!(config.target, DataModel::mips_o32());
        assert_eq!(config.host, DataModel::native());
        assert_eq!(config.registry_capacity, 128);
        assert_eq!(config.memory.size, DEFAULT_WINDOW_SIZE);
        assert_eq!(config.memory.address_bits, 32);
    }

    #[test]
    fn native_preset() {
        let config = AbiConfig::native();
        assert_eq!(config.target, config.host);
    }

    #[test]
    fn builders() {
        let config = AbiConfig::mips_o32()
            .with_memory(MemoryConfig::new(0x2000).with_strategy(LeaseStrategy::ShadowCopy))
            .with_target(DataModel::mipsel_o32())
            .with_host(DataModel::x86_64())
            .with_registry_capacity(4);

        let memory = config.build_memory().unwrap();
        assert_eq!(memory.endian(), Endian::Little);
        assert_eq!(memory.strategy(), LeaseStrategy::ShadowCopy);
        assert_eq!(config.build_registry().capacity(), 4);
    }

    #[test]
    fn invalid_windows_rejected() {
        assert!(matches!(
            GuestMemory::new(&MemoryConfig::new(0), Endian::Big),
            Err(Error::InvalidLength { .. })
        ));
        assert!(matches!(
            GuestMemory::new(
                &MemoryConfig::new(0x1000).with_address_bits(8),
                Endian::Big
            ),
            Err(Error::InvalidLength { .. })
        ));
        assert!(matches!(
            GuestMemory::new(
                &MemoryConfig::new(0x1000).with_reserved_ceiling(0),
                Endian::Big
            ),
            Err(Error::InvalidLength { .. })
        ));
    }
}
