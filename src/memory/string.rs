//! NUL-terminated guest strings.
//!
//! Path and name arguments arrive as guest pointers to C strings of unknown
//! length. [`GuestMemory::probe_length`] finds the terminator one page at a
//! time, never reading past the window limit or into a page the validator
//! rejects.

use log::trace;

use crate::{
    memory::{AccessMode, AccessValidator, GuestAddr, GuestMemory, MemoryLease, PAGE_SIZE},
    Error, Result,
};

impl GuestMemory {
    /// Returns the length of the C string at `addr`, excluding the terminator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fault`] if `addr` is null or outside the window, if an
    /// unreadable page is reached first, or if no terminator exists before the
    /// window limit.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use guestabi::abi::Endian;
    /// use guestabi::config::MemoryConfig;
    /// use guestabi::memory::{GuestAddr, GuestMemory};
    ///
    /// let mut memory = GuestMemory::new(&MemoryConfig::new(0x10000), Endian::Big)?;
    /// memory.copy_to_guest(GuestAddr::new(0x100), b"/etc/passwd\0")?;
    /// assert_eq!(memory.probe_length(GuestAddr::new(0x100))?, 11);
    ///
    /// memory.copy_to_guest(GuestAddr::new(0xFFFC), b"tail")?;
    /// assert!(memory.probe_length(GuestAddr::new(0xFFFC)).is_err());
    /// # Ok::<(), guestabi::Error>(())
    /// ```
    pub fn probe_length(&self, addr: GuestAddr) -> Result<usize> {
        if !self.window().contains(addr) {
            return Err(Error::Fault {
                address: addr.value(),
                length: 0,
            });
        }

        let limit = self.window().limit();
        let mut cursor = addr.value();
        while cursor < limit {
            let chunk_end = (cursor / PAGE_SIZE + 1)
                .saturating_mul(PAGE_SIZE)
                .min(limit);
            let chunk = GuestAddr::new(cursor);
            let chunk_len = chunk_end - cursor;

            if !self.validate(chunk, chunk_len, AccessMode::READ) {
                trace!("String probe at {} stopped at unreadable {}", addr, chunk);
                return Err(Error::Fault {
                    address: addr.value(),
                    length: cursor - addr.value(),
                });
            }

            let bytes = self.slice(chunk, to_usize(chunk_len)?)?;
            if let Some(position) = bytes.iter().position(|&byte| byte == 0) {
                let length = to_usize(cursor - addr.value())? + position;
                trace!("String probe at {} found {} bytes", addr, length);
                return Ok(length);
            }
            cursor = chunk_end;
        }

        trace!("String probe at {} ran off the window", addr);
        Err(Error::Fault {
            address: addr.value(),
            length: limit - addr.value(),
        })
    }

    /// Leases the C string at `addr` for reading, terminator included.
    ///
    /// # Errors
    ///
    /// Same as [`probe_length`](Self::probe_length).
    pub fn lock_string(&self, addr: GuestAddr) -> Result<MemoryLease> {
        let length = self.probe_length(addr)?;
        self.acquire(addr, length + 1, AccessMode::READ, true)
    }

    /// Copies the C string at `addr`, without its terminator.
    ///
    /// # Errors
    ///
    /// Same as [`probe_length`](Self::probe_length).
    pub fn read_cstring(&self, addr: GuestAddr) -> Result<Vec<u8>> {
        let length = self.probe_length(addr)?;
        self.copy_from_guest(addr, length)
    }
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::OutOfBounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::MemoryConfig,
        memory::{AccessPolicy, LeaseStrategy, PageFlags},
        test::small_memory,
    };

    #[test]
    fn finds_terminator() {
        let mut memory = small_memory(LeaseStrategy::DirectAlias);
        memory
            .copy_to_guest(GuestAddr::new(0x20), b"hello\0world\0")
            .unwrap();
        assert_eq!(memory.probe_length(GuestAddr::new(0x20)).unwrap(), 5);
        assert_eq!(memory.probe_length(GuestAddr::new(0x26)).unwrap(), 5);
        assert_eq!(memory.probe_length(GuestAddr::new(0x25)).unwrap(), 0);
    }

    #[test]
    fn crosses_page_boundaries() {
        let mut memory = small_memory(LeaseStrategy::DirectAlias);
        let start = GuestAddr::new(0x0FF0);
        memory.copy_to_guest(start, &[b'a'; 0x1020]).unwrap();
        assert_eq!(memory.probe_length(start).unwrap(), 0x1020);
    }

    #[test]
    fn unterminated_at_window_end() {
        let mut memory = small_memory(LeaseStrategy::DirectAlias);
        memory
            .copy_to_guest(GuestAddr::new(0xFF00), &[b'x'; 0x100])
            .unwrap();
        match memory.probe_length(GuestAddr::new(0xFF00)) {
            Err(Error::Fault { address, length }) => {
                assert_eq!(address, 0xFF00);
                assert_eq!(length, 0x100);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_start() {
        let memory = small_memory(LeaseStrategy::DirectAlias);
        assert!(matches!(
            memory.probe_length(GuestAddr::NULL),
            Err(Error::Fault { .. })
        ));
        assert!(matches!(
            memory.probe_length(GuestAddr::new(0x10000)),
            Err(Error::Fault { .. })
        ));
    }

    #[test]
    fn stops_at_unreadable_page() {
        let config = MemoryConfig::new(0x10000).with_policy(AccessPolicy::PageTracked);
        let mut memory = GuestMemory::new(&config, crate::abi::Endian::Big).unwrap();
        let rw = PageFlags::VALID | PageFlags::READ | PageFlags::WRITE;
        memory.set_page_flags(GuestAddr::new(0x1000), 0x1000, rw).unwrap();
        memory
            .copy_to_guest(GuestAddr::new(0x1FF0), &[b'y'; 0x10])
            .unwrap();

        assert!(matches!(
            memory.probe_length(GuestAddr::new(0x1FF0)),
            Err(Error::Fault { length: 0x10, .. })
        ));

        memory.set_page_flags(GuestAddr::new(0x2000), 1, rw).unwrap();
        assert_eq!(memory.probe_length(GuestAddr::new(0x1FF0)).unwrap(), 0x10);
    }

    #[test]
    fn lock_and_read() {
        let mut memory = small_memory(LeaseStrategy::ShadowCopy);
        let addr = GuestAddr::new(0x300);
        memory.copy_to_guest(addr, b"abc\0").unwrap();

        let mut lease = memory.lock_string(addr).unwrap();
        assert_eq!(lease.len(), 4);
        assert_eq!(lease.bytes(&memory).unwrap(), b"abc\0");
        memory.release(&mut lease).unwrap();

        assert_eq!(memory.read_cstring(addr).unwrap(), b"abc");
    }
}
