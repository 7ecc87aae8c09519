//! Flag word transcoding.
//!
//! Flag arguments such as the `open(2)` flags use different bit positions on
//! different ABIs. A [`BitmaskTable`] lists, entry by entry, which bits of the
//! source encoding correspond to which bits of the target encoding. Each entry
//! carries a mask and a value per side, so multi-bit fields like `O_ACCMODE`
//! are matched as a whole rather than bit by bit.
//!
//! Bits that no entry accounts for are dropped, never passed through.

use crate::Result;

/// One correspondence between a field of the source encoding and a field of the
/// target encoding.
///
/// Translating forward, the entry applies when `mask & source_mask ==
/// source_bits` and then contributes `target_bits`; backward, the roles swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitmaskEntry {
    /// Bits of the source encoding this entry inspects
    pub source_mask: u32,
    /// Value those bits must have for the entry to apply
    pub source_bits: u32,
    /// Bits of the target encoding this entry writes
    pub target_mask: u32,
    /// Value written to those bits when the entry applies
    pub target_bits: u32,
}

impl BitmaskEntry {
    /// Maps bit `source_bit` of the source encoding to bit `target_bit` of the target.
    ///
    /// A bit index of 32 or more yields an empty mask, which
    /// [`BitmaskTable::new`] rejects.
    #[must_use]
    pub const fn bit(source_bit: u32, target_bit: u32) -> Self {
        Self::flag(bit_mask(source_bit), bit_mask(target_bit))
    }

    /// Maps the flag value `source` to the flag value `target`.
    ///
    /// The entry applies only when every bit of `source` is set.
    #[must_use]
    pub const fn flag(source: u32, target: u32) -> Self {
        Self::field(source, source, target, target)
    }

    /// Maps the field value `source_bits` under `source_mask` to `target_bits`
    /// under `target_mask`.
    #[must_use]
    pub const fn field(
        source_mask: u32,
        source_bits: u32,
        target_mask: u32,
        target_bits: u32,
    ) -> Self {
        BitmaskEntry {
            source_mask,
            source_bits,
            target_mask,
            target_bits,
        }
    }

    fn validate(&self, index: usize) -> Result<()> {
        if self.source_mask == 0 || self.target_mask == 0 {
            return Err(malformed_error!("Bitmask entry {} has an empty mask", index));
        }
        if self.source_bits & !self.source_mask != 0 || self.target_bits & !self.target_mask != 0 {
            return Err(malformed_error!(
                "Bitmask entry {} sets bits outside its mask",
                index
            ));
        }
        if (self.source_bits == 0) != (self.target_bits == 0) {
            return Err(malformed_error!(
                "Bitmask entry {} maps a zero field to a non-zero one",
                index
            ));
        }
        Ok(())
    }
}

const fn bit_mask(bit: u32) -> u32 {
    match 1u32.checked_shl(bit) {
        Some(mask) => mask,
        None => 0,
    }
}

/// Direction of a bitmask translation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BitmaskDirection {
    /// Source encoding to target encoding
    Forward,
    /// Target encoding to source encoding
    Backward,
}

/// Translates `mask` through `entries` without validating them.
///
/// Suitable for `const` tables whose correctness is covered by tests. Prefer
/// [`BitmaskTable`] for tables built at runtime.
///
/// # Panics
///
/// Debug builds panic if an entry would fail [`BitmaskTable::new`].
#[must_use]
pub fn translate_bitmask(entries: &[BitmaskEntry], mask: u32, direction: BitmaskDirection) -> u32 {
    debug_assert!(
        entries
            .iter()
            .enumerate()
            .all(|(index, entry)| entry.validate(index).is_ok()),
        "malformed bitmask table"
    );
    entries.iter().fold(0, |result, entry| {
        let (from_mask, from_bits, to_bits) = match direction {
            BitmaskDirection::Forward => (entry.source_mask, entry.source_bits, entry.target_bits),
            BitmaskDirection::Backward => (entry.target_mask, entry.target_bits, entry.source_bits),
        };
        if mask & from_mask == from_bits {
            result | to_bits
        } else {
            result
        }
    })
}

/// A validated bitmask translation table.
///
/// # Examples
///
/// ```rust
/// use guestabi::thunk::{BitmaskDirection, BitmaskEntry, BitmaskTable};
///
/// let table = BitmaskTable::new(vec![
///     BitmaskEntry::bit(0, 4),
///     BitmaskEntry::bit(1, 0),
///     BitmaskEntry::field(0b1100, 0b0100, 0x300, 0x100),
/// ])?;
///
/// assert_eq!(table.translate(0b0001, BitmaskDirection::Forward), 0b1_0000);
/// assert_eq!(table.translate(0b0111, BitmaskDirection::Forward), 0x111);
/// assert_eq!(table.translate(0x111, BitmaskDirection::Backward), 0b0111);
/// // bit 7 is not in the table
/// assert_eq!(table.translate(0b1000_0000, BitmaskDirection::Forward), 0);
/// # Ok::<(), guestabi::Error>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitmaskTable {
    entries: Vec<BitmaskEntry>,
}

impl BitmaskTable {
    /// Creates a table after validating every entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if an entry has an empty mask, sets
    /// bits outside its mask, or has exactly one side equal to zero. The last
    /// rule is what guarantees that translating `0` yields `0`.
    pub fn new(entries: impl Into<Vec<BitmaskEntry>>) -> Result<Self> {
        let entries = entries.into();
        for (index, entry) in entries.iter().enumerate() {
            entry.validate(index)?;
        }
        Ok(BitmaskTable { entries })
    }

    /// The entries in table order
    #[must_use]
    pub fn entries(&self) -> &[BitmaskEntry] {
        &self.entries
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Translates `mask` in `direction`; unmapped bits are dropped.
    #[must_use]
    pub fn translate(&self, mask: u32, direction: BitmaskDirection) -> u32 {
        translate_bitmask(&self.entries, mask, direction)
    }
}
