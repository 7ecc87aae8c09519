//! Access validation for guest memory ranges.
//!
//! Validation is a coarse trust boundary: it decides whether the guest may
//! touch a range at all, before any byte of it is read or written. Two policies
//! are available. [`AccessPolicy::Permissive`] only checks that the range lies
//! inside the [`AddressWindow`]. [`AccessPolicy::PageTracked`] additionally keeps
//! one [`PageFlags`] value per 4 KiB page and requires every touched page to be
//! mapped with the permission the access needs.

use bitflags::bitflags;

use crate::{
    memory::{AddressWindow, GuestAddr},
    Result,
};

/// Size of a tracked guest page in bytes.
pub const PAGE_SIZE: u64 = 0x1000;

bitflags! {
    /// The kind of access a guest range is requested for.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AccessMode: u8 {
        /// Read access
        const READ = 0x1;
        /// Write access
        const WRITE = 0x2;
        /// Execute access
        const EXECUTE = 0x4;
        /// Read and write access
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

bitflags! {
    /// Permissions of one guest page.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct PageFlags: u8 {
        /// Page is readable
        const READ = 0x1;
        /// Page is writable
        const WRITE = 0x2;
        /// Page is executable
        const EXEC = 0x4;
        /// Page is mapped
        const VALID = 0x8;
    }
}

impl PageFlags {
    /// Flags a page must carry to satisfy an access of `mode`.
    ///
    /// Write access needs read permission as well.
    #[must_use]
    pub fn required_for(mode: AccessMode) -> Self {
        let mut flags = PageFlags::VALID;
        if mode.intersects(AccessMode::READ_WRITE) {
            flags |= PageFlags::READ;
        }
        if mode.contains(AccessMode::WRITE) {
            flags |= PageFlags::WRITE;
        }
        if mode.contains(AccessMode::EXECUTE) {
            flags |= PageFlags::EXEC;
        }
        flags
    }
}

/// Decides whether a guest range may be accessed.
pub trait AccessValidator {
    /// Returns `true` if `[addr, addr + length)` may be accessed with `mode`.
    ///
    /// Out-of-range or overflowing requests return `false`.
    fn validate(&self, addr: GuestAddr, length: u64, mode: AccessMode) -> bool;
}

/// Selects how strictly guest ranges are validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum AccessPolicy {
    /// Range checks against the window only.
    #[default]
    Permissive,
    /// Range checks plus per-page permissions.
    PageTracked,
}

/// Per-page permissions of a guest window. All pages start unmapped.
#[derive(Clone, Debug)]
pub struct PageTable {
    pages: Vec<PageFlags>,
}

impl PageTable {
    /// Creates a table covering `size` bytes of guest memory.
    #[must_use]
    pub fn new(size: u64) -> Self {
        let count = usize::try_from(size.div_ceil(PAGE_SIZE)).unwrap_or(usize::MAX);
        PageTable {
            pages: vec![PageFlags::empty(); count],
        }
    }

    /// Number of tracked pages
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Returns `true` if no page is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Returns the flags of the page containing `addr`; empty if untracked.
    #[must_use]
    pub fn flags(&self, addr: GuestAddr) -> PageFlags {
        page_index(addr.value())
            .and_then(|index| self.pages.get(index))
            .copied()
            .unwrap_or_default()
    }

    /// Sets the flags of every page touched by `[addr, addr + length)`.
    ///
    /// Pages beyond the table are ignored; callers range-check first.
    pub fn set_flags(&mut self, addr: GuestAddr, length: u64, flags: PageFlags) {
        let Some((first, last)) = page_span(addr.value(), length) else {
            return;
        };
        let end = last.saturating_add(1).min(self.pages.len());
        if let Some(pages) = self.pages.get_mut(first..end) {
            pages.fill(flags);
        }
    }

    /// Returns `true` if every page touched by the range allows `mode`.
    ///
    /// An empty range is always permitted.
    #[must_use]
    pub fn permits(&self, addr: GuestAddr, length: u64, mode: AccessMode) -> bool {
        if length == 0 {
            return true;
        }
        let Some((first, last)) = page_span(addr.value(), length) else {
            return false;
        };
        let required = PageFlags::required_for(mode);
        match self.pages.get(first..=last) {
            Some(pages) => pages.iter().all(|flags| flags.contains(required)),
            None => false,
        }
    }
}

/// The validator guest memory uses: window range checks plus an optional page table.
///
/// # Examples
///
/// ```rust
/// use guestabi::memory::{
///     AccessMode, AccessPolicy, AccessValidator, AddressWindow, GuestAddr, GuestValidator,
///     PageFlags,
/// };
///
/// let window = AddressWindow::new(0, 0x10000)?;
/// let mut validator = GuestValidator::new(window, AccessPolicy::PageTracked);
/// let addr = GuestAddr::new(0x2000);
///
/// assert!(!validator.validate(addr, 4, AccessMode::READ));
/// validator.set_page_flags(addr, 0x1000, PageFlags::VALID | PageFlags::READ)?;
/// assert!(validator.validate(addr, 4, AccessMode::READ));
/// assert!(!validator.validate(addr, 4, AccessMode::WRITE));
/// # Ok::<(), guestabi::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct GuestValidator {
    window: AddressWindow,
    pages: Option<PageTable>,
}

impl GuestValidator {
    /// Creates a validator for `window` under `policy`.
    #[must_use]
    pub fn new(window: AddressWindow, policy: AccessPolicy) -> Self {
        let pages = match policy {
            AccessPolicy::Permissive => None,
            AccessPolicy::PageTracked => Some(PageTable::new(window.limit())),
        };
        GuestValidator { window, pages }
    }

    /// The validated window
    #[must_use]
    pub fn window(&self) -> &AddressWindow {
        &self.window
    }

    /// The active policy
    #[must_use]
    pub fn policy(&self) -> AccessPolicy {
        if self.pages.is_some() {
            AccessPolicy::PageTracked
        } else {
            AccessPolicy::Permissive
        }
    }

    /// The page table, under [`AccessPolicy::PageTracked`]
    #[must_use]
    pub fn pages(&self) -> Option<&PageTable> {
        self.pages.as_ref()
    }

    /// Returns the flags of the page containing `addr`, under
    /// [`AccessPolicy::PageTracked`].
    #[must_use]
    pub fn page_flags(&self, addr: GuestAddr) -> Option<PageFlags> {
        self.pages.as_ref().map(|pages| pages.flags(addr))
    }

    /// Sets the flags of every page touched by `[addr, addr + length)`.
    ///
    /// Pass [`PageFlags::VALID`] together with the permissions to map pages,
    /// and an empty set to unmap them.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidAddress`] or [`crate::Error::InvalidLength`]
    /// if the range is outside the window, and [`crate::Error::Malformed`] under
    /// [`AccessPolicy::Permissive`], which has no page table.
    pub fn set_page_flags(&mut self, addr: GuestAddr, length: u64, flags: PageFlags) -> Result<()> {
        self.window.check_range(addr, length)?;
        let Some(pages) = self.pages.as_mut() else {
            return Err(malformed_error!(
                "Page flags require the page-tracked access policy"
            ));
        };
        pages.set_flags(addr, length, flags);
        Ok(())
    }
}

impl AccessValidator for GuestValidator {
    fn validate(&self, addr: GuestAddr, length: u64, mode: AccessMode) -> bool {
        self.window.validate_range(addr, length)
            && self
                .pages
                .as_ref()
                .map_or(true, |pages| pages.permits(addr, length, mode))
    }
}

fn page_index(addr: u64) -> Option<usize> {
    usize::try_from(addr / PAGE_SIZE).ok()
}

fn page_span(addr: u64, length: u64) -> Option<(usize, usize)> {
    if length == 0 {
        return None;
    }
    let last = addr.checked_add(length - 1)?;
    Some((page_index(addr)?, page_index(last)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn tracked() -> GuestValidator {
        GuestValidator::new(
            AddressWindow::new(0, 0x10000).unwrap(),
            AccessPolicy::PageTracked,
        )
    }

    #[test]
    fn required_flags() {
        assert_eq!(
            PageFlags::required_for(AccessMode::READ),
            PageFlags::VALID | PageFlags::READ
        );
        assert_eq!(
            PageFlags::required_for(AccessMode::WRITE),
            PageFlags::VALID | PageFlags::READ | PageFlags::WRITE
        );
        assert_eq!(
            PageFlags::required_for(AccessMode::EXECUTE),
            PageFlags::VALID | PageFlags::EXEC
        );
    }

    #[test]
    fn permissive_is_range_only() {
        let validator = GuestValidator::new(
            AddressWindow::new(0, 0x10000).unwrap(),
            AccessPolicy::Permissive,
        );
        assert_eq!(validator.policy(), AccessPolicy::Permissive);
        assert!(validator.validate(GuestAddr::new(0x10), 0x10, AccessMode::READ_WRITE));
        assert!(!validator.validate(GuestAddr::new(0xFFF0), 0x20, AccessMode::READ));
        assert_eq!(validator.page_flags(GuestAddr::new(0x10)), None);
    }

    #[test]
    fn pages_start_unmapped() {
        let validator = tracked();
        assert_eq!(validator.pages().unwrap().len(), 16);
        assert!(!validator.validate(GuestAddr::new(0x10), 1, AccessMode::READ));
        assert_eq!(
            validator.page_flags(GuestAddr::new(0x10)),
            Some(PageFlags::empty())
        );
    }

    #[test]
    fn every_touched_page_is_checked() {
        let mut validator = tracked();
        let rw = PageFlags::VALID | PageFlags::READ | PageFlags::WRITE;
        validator
            .set_page_flags(GuestAddr::new(0x1000), 0x1000, rw)
            .unwrap();

        assert!(validator.validate(GuestAddr::new(0x1FF0), 0x10, AccessMode::WRITE));
        assert!(!validator.validate(GuestAddr::new(0x1FF0), 0x11, AccessMode::READ));

        validator
            .set_page_flags(GuestAddr::new(0x2000), 1, PageFlags::VALID | PageFlags::READ)
            .unwrap();
        assert!(validator.validate(GuestAddr::new(0x1FF0), 0x20, AccessMode::READ));
        assert!(!validator.validate(GuestAddr::new(0x1FF0), 0x20, AccessMode::WRITE));
    }

    #[test]
    fn write_implies_read() {
        let mut validator = tracked();
        validator
            .set_page_flags(
                GuestAddr::new(0x3000),
                0x1000,
                PageFlags::VALID | PageFlags::WRITE,
            )
            .unwrap();
        assert!(!validator.validate(GuestAddr::new(0x3000), 4, AccessMode::WRITE));
    }

    #[test]
    fn set_flags_range_checked() {
        let mut validator = tracked();
        assert!(matches!(
            validator.set_page_flags(GuestAddr::new(0xF000), 0x2000, PageFlags::VALID),
            Err(Error::InvalidLength { .. })
        ));

        let mut permissive = GuestValidator::new(
            AddressWindow::new(0, 0x10000).unwrap(),
            AccessPolicy::Permissive,
        );
        assert!(matches!(
            permissive.set_page_flags(GuestAddr::new(0x1000), 1, PageFlags::VALID),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn empty_range_needs_no_page() {
        let validator = tracked();
        assert!(validator.validate(GuestAddr::new(0x4000), 0, AccessMode::READ));
    }
}
