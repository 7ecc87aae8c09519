use crate::{
    abi::Endian,
    config::MemoryConfig,
    memory::{GuestMemory, LeaseStrategy},
};

/// Size of the window created by [`small_memory`]
pub const SMALL_WINDOW: u64 = 0x10000;

/// A 64 KiB big-endian guest window with the permissive policy.
pub fn small_memory(strategy: LeaseStrategy) -> GuestMemory {
    GuestMemory::new(
        &MemoryConfig::new(SMALL_WINDOW).with_strategy(strategy),
        Endian::Big,
    )
    .unwrap()
}
