//! Integration tests for guest memory: validation, leases and string probing.
//!
//! Lease tests run once per strategy; guest-visible behaviour has to be the
//! same whether a lease aliases guest memory or shadows it.

use guestabi::{prelude::*, Result};

fn memory(strategy: LeaseStrategy) -> Result<GuestMemory> {
    GuestMemory::new(
        &MemoryConfig::new(0x10000).with_strategy(strategy),
        Endian::Big,
    )
}

fn tracked_memory() -> Result<GuestMemory> {
    GuestMemory::new(
        &MemoryConfig::new(0x10000).with_policy(AccessPolicy::PageTracked),
        Endian::Little,
    )
}

const STRATEGIES: [LeaseStrategy; 2] = [LeaseStrategy::DirectAlias, LeaseStrategy::ShadowCopy];

/// A range that ends past the window is rejected even though it starts inside.
#[test]
fn test_range_past_window_rejected() -> Result<()> {
    let window = AddressWindow::new(0x7f00_0000_0000, 0x10000)?;
    assert!(!window.validate(GuestAddr::new(0xFFF0), 0x20, AccessMode::READ));
    assert!(window.validate(GuestAddr::new(0xFFF0), 0x10, AccessMode::READ));

    let memory = memory(LeaseStrategy::DirectAlias)?;
    assert!(!memory.validate(GuestAddr::new(0xFFF0), 0x20, AccessMode::READ));
    assert!(matches!(
        memory.acquire(GuestAddr::new(0xFFF0), 0x20, AccessMode::READ, true),
        Err(Error::Fault { .. })
    ));
    Ok(())
}

#[test]
fn test_validator_never_wraps() -> Result<()> {
    let window = AddressWindow::with_address_bits(0, 0x1_0000_0000, 32)?;
    let top = GuestAddr::new(0xFFFF_FFF0);

    assert!(window.validate(top, 0x10, AccessMode::READ));
    assert!(!window.validate(top, 0x11, AccessMode::READ));
    assert!(!window.validate(top, u64::MAX, AccessMode::READ));
    assert!(!window.validate(GuestAddr::new(u64::MAX), 1, AccessMode::READ));
    Ok(())
}

#[test]
fn test_reserved_ceiling() -> Result<()> {
    let memory = GuestMemory::new(
        &MemoryConfig::new(0x10000).with_reserved_ceiling(0x8000),
        Endian::Big,
    )?;

    assert_eq!(memory.window().limit(), 0x8000);
    assert!(memory.translate(GuestAddr::new(0x7FFF)).is_ok());
    assert!(matches!(
        memory.translate(GuestAddr::new(0x8000)),
        Err(Error::InvalidAddress { address: 0x8000 })
    ));
    assert!(memory.get_user::<u8>(GuestAddr::new(0x8000)).is_err());
    Ok(())
}

#[test]
fn test_translate_round_trip() -> Result<()> {
    let memory = memory(LeaseStrategy::DirectAlias)?;
    let window = memory.window();

    let host = window.translate(GuestAddr::new(0x1234))?;
    assert_eq!(host.value(), window.base_offset() + 0x1234);
    assert_eq!(window.host_to_guest(host)?, GuestAddr::new(0x1234));
    assert!(window.translate(GuestAddr::NULL).is_err());
    Ok(())
}

#[test]
fn test_write_lease_reaches_guest() -> Result<()> {
    for strategy in STRATEGIES {
        let mut memory = memory(strategy)?;
        let addr = GuestAddr::new(0x2000);

        let mut lease = memory.acquire(addr, 4, AccessMode::WRITE, false)?;
        assert_eq!(lease.is_shadow(), strategy == LeaseStrategy::ShadowCopy);
        lease.bytes_mut(&mut memory)?.copy_from_slice(&[1, 2, 3, 4]);
        memory.release(&mut lease)?;

        assert!(lease.is_released());
        assert_eq!(memory.get_user::<u32>(addr)?, 0x0102_0304, "{strategy:?}");

        // Releasing twice is harmless and nothing is written again.
        memory.put_user(addr, 0_u32)?;
        memory.release(&mut lease)?;
        assert_eq!(memory.get_user::<u32>(addr)?, 0, "{strategy:?}");
        assert!(lease.bytes(&memory).is_err());
    }
    Ok(())
}

#[test]
fn test_read_lease_sees_guest_data() -> Result<()> {
    for strategy in STRATEGIES {
        let mut memory = memory(strategy)?;
        let addr = GuestAddr::new(0x3000);
        memory.copy_to_guest(addr, b"abcd")?;

        let mut lease = memory.acquire(addr, 4, AccessMode::READ, true)?;
        assert_eq!(lease.bytes(&memory)?, b"abcd");
        assert!(lease.bytes_mut(&mut memory).is_err());
        memory.release(&mut lease)?;

        // A read-only scoped lease cannot change guest memory.
        memory.with_lease(addr, 4, AccessMode::READ, true, |bytes| bytes.fill(0))?;
        assert_eq!(memory.copy_from_guest(addr, 4)?, b"abcd", "{strategy:?}");
    }
    Ok(())
}

#[test]
fn test_shadow_without_copy_is_zeroed() -> Result<()> {
    let mut memory = memory(LeaseStrategy::ShadowCopy)?;
    let addr = GuestAddr::new(0x4000);
    memory.copy_to_guest(addr, &[0xAA; 8])?;

    let mut lease = memory.acquire(addr, 8, AccessMode::READ_WRITE, false)?;
    assert_eq!(lease.bytes(&memory)?, &[0; 8]);
    lease.bytes_mut(&mut memory)?[0] = 1;
    memory.release(&mut lease)?;

    assert_eq!(memory.copy_from_guest(addr, 8)?, [1, 0, 0, 0, 0, 0, 0, 0]);
    Ok(())
}

#[test]
fn test_empty_and_null_leases() -> Result<()> {
    for strategy in STRATEGIES {
        let mut memory = memory(strategy)?;

        let mut empty = memory.acquire(GuestAddr::new(0x100), 0, AccessMode::WRITE, false)?;
        assert!(empty.is_empty());
        assert_eq!(empty.bytes_mut(&mut memory)?.len(), 0);
        memory.release(&mut empty)?;

        assert!(matches!(
            memory.acquire(GuestAddr::NULL, 1, AccessMode::READ, true),
            Err(Error::Fault { address: 0, .. })
        ));
        memory.release_opt(None)?;
    }
    Ok(())
}

#[test]
fn test_concurrent_leases() -> Result<()> {
    for strategy in STRATEGIES {
        let mut memory = memory(strategy)?;
        let src = GuestAddr::new(0x1000);
        let dst = GuestAddr::new(0x5000);
        memory.copy_to_guest(src, b"payload")?;

        let mut from = memory.acquire(src, 7, AccessMode::READ, true)?;
        let mut to = memory.acquire(dst, 7, AccessMode::WRITE, false)?;
        let data = from.bytes(&memory)?.to_vec();
        to.bytes_mut(&mut memory)?.copy_from_slice(&data);
        memory.release(&mut to)?;
        memory.release_opt(Some(&mut from))?;

        assert_eq!(memory.read_cstring(dst)?, b"payload", "{strategy:?}");
    }
    Ok(())
}

#[test]
fn test_page_tracked_policy() -> Result<()> {
    let mut memory = tracked_memory()?;
    let addr = GuestAddr::new(0x2000);

    // Every page starts unmapped.
    assert_eq!(memory.page_flags(addr), Some(PageFlags::empty()));
    assert!(matches!(
        memory.get_user::<u32>(addr),
        Err(Error::Fault { .. })
    ));

    memory.set_page_flags(addr, 0x1000, PageFlags::VALID | PageFlags::READ)?;
    assert_eq!(memory.get_user::<u32>(addr)?, 0);
    assert!(memory.put_user(addr, 1_u32).is_err());

    memory.set_page_flags(
        addr,
        0x2000,
        PageFlags::VALID | PageFlags::READ | PageFlags::WRITE,
    )?;
    memory.put_user(GuestAddr::new(0x2FFE), 0xBEEF_u32)?;
    assert_eq!(memory.get_user::<u32>(GuestAddr::new(0x2FFE))?, 0xBEEF);

    // A range that touches the unmapped page after the mapping is rejected.
    assert!(!memory.validate(GuestAddr::new(0x3FFC), 8, AccessMode::READ));
    assert!(memory.validate(GuestAddr::new(0x3FFC), 4, AccessMode::READ));

    assert!(matches!(
        memory.set_page_flags(GuestAddr::new(0x20000), 1, PageFlags::VALID),
        Err(Error::InvalidAddress { .. })
    ));
    Ok(())
}

#[test]
fn test_permissive_policy_has_no_pages() -> Result<()> {
    let mut memory = memory(LeaseStrategy::DirectAlias)?;
    assert_eq!(memory.policy(), AccessPolicy::Permissive);
    assert_eq!(memory.page_flags(GuestAddr::new(0x1000)), None);
    assert!(matches!(
        memory.set_page_flags(GuestAddr::new(0x1000), 1, PageFlags::VALID),
        Err(Error::Malformed { .. })
    ));
    Ok(())
}

#[test]
fn test_string_probe() -> Result<()> {
    let mut memory = memory(LeaseStrategy::ShadowCopy)?;

    memory.copy_to_guest(GuestAddr::new(0x100), b"/bin/sh\0")?;
    assert_eq!(memory.probe_length(GuestAddr::new(0x100))?, 7);
    assert_eq!(memory.probe_length(GuestAddr::new(0x107))?, 0);

    // A string crossing a page boundary.
    let long = vec![b'x'; 0x1800];
    memory.copy_to_guest(GuestAddr::new(0xF00), &long)?;
    assert_eq!(memory.probe_length(GuestAddr::new(0xF00))?, 0x1800);

    let mut lease = memory.lock_string(GuestAddr::new(0x100))?;
    assert_eq!(lease.len(), 8);
    assert_eq!(lease.bytes(&memory)?, b"/bin/sh\0");
    memory.release(&mut lease)?;

    // No terminator before the end of the window.
    memory.copy_to_guest(GuestAddr::new(0xFFF0), &[b'y'; 0x10])?;
    assert!(matches!(
        memory.probe_length(GuestAddr::new(0xFFF0)),
        Err(Error::Fault { address: 0xFFF0, .. })
    ));

    assert!(memory.probe_length(GuestAddr::NULL).is_err());
    assert!(memory.probe_length(GuestAddr::new(0x10000)).is_err());
    Ok(())
}

#[test]
fn test_string_probe_stops_at_unmapped_page() -> Result<()> {
    let mut memory = tracked_memory()?;
    let rw = PageFlags::VALID | PageFlags::READ | PageFlags::WRITE;
    memory.set_page_flags(GuestAddr::new(0x1000), 0x1000, rw)?;
    memory.copy_to_guest(GuestAddr::new(0x1FFC), b"abcd")?;

    // The terminator would be at 0x2000, which is not readable.
    assert!(matches!(
        memory.probe_length(GuestAddr::new(0x1FFC)),
        Err(Error::Fault {
            address: 0x1FFC,
            length: 4
        })
    ));

    memory.set_page_flags(GuestAddr::new(0x2000), 0x1000, rw)?;
    assert_eq!(memory.probe_length(GuestAddr::new(0x1FFC))?, 4);
    Ok(())
}

#[test]
fn test_errno_mapping() -> Result<()> {
    let memory = memory(LeaseStrategy::DirectAlias)?;
    let err = memory.get_user::<u64>(GuestAddr::new(0xFFFC)).unwrap_err();
    assert_eq!(err.errno(), guestabi::errno::EFAULT);
    assert!(err.is_fault());
    Ok(())
}
