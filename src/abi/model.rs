//! Per-ABI data models.
//!
//! A [`DataModel`] captures everything about one ABI that affects how a C struct
//! is laid out in memory: byte order, the width of `long` and of pointers, and
//! the alignment of 64-bit integers. The struct thunk engine computes natural
//! layouts from it and uses it to decode and encode scalar fields.
//!
//! # Presets
//!
//! | Preset | Endian | `long` | pointer | `long long` align |
//! |--------|--------|--------|---------|-------------------|
//! | [`DataModel::mips_o32`] | big | 4 | 4 | 8 |
//! | [`DataModel::mipsel_o32`] | little | 4 | 4 | 8 |
//! | [`DataModel::i386`] | little | 4 | 4 | 4 |
//! | [`DataModel::x86_64`] | little | 8 | 8 | 8 |
//! | [`DataModel::native`] | host | host | host | host |

use crate::{abi::Endian, thunk::TypeTag};

/// Byte order, scalar widths and alignments of one ABI.
///
/// `char`, `short`, `int` and `long long` have the same width (1, 2, 4 and 8
/// bytes) on every supported ABI; only their alignment and the `long` and
/// pointer widths vary.
///
/// # Examples
///
/// ```rust
/// use guestabi::abi::{DataModel, Endian};
/// use guestabi::thunk::TypeTag;
///
/// let mips = DataModel::mips_o32();
/// assert_eq!(mips.endian, Endian::Big);
/// assert_eq!(mips.scalar(TypeTag::Long), Some((4, 4)));
/// assert_eq!(mips.scalar(TypeTag::LongLong), Some((8, 8)));
/// assert_eq!(DataModel::i386().scalar(TypeTag::LongLong), Some((8, 4)));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DataModel {
    /// Short human readable name, used in log output.
    pub name: &'static str,
    /// Byte order of every multi-byte scalar.
    pub endian: Endian,
    /// Width and alignment of `long` and `unsigned long`.
    pub long_size: usize,
    /// Width and alignment of pointers, including `PtrVoid`.
    pub pointer_size: usize,
    /// Alignment of `long long` and `unsigned long long`.
    pub long_long_align: usize,
}

impl DataModel {
    /// Big-endian MIPS using the O32 calling convention.
    #[must_use]
    pub const fn mips_o32() -> Self {
        DataModel {
            name: "mips-o32",
            endian: Endian::Big,
            long_size: 4,
            pointer_size: 4,
            long_long_align: 8,
        }
    }

    /// Little-endian MIPS using the O32 calling convention.
    #[must_use]
    pub const fn mipsel_o32() -> Self {
        DataModel {
            name: "mipsel-o32",
            endian: Endian::Little,
            ..Self::mips_o32()
        }
    }

    /// 32-bit x86, where 64-bit integers are only 4-byte aligned inside structs.
    #[must_use]
    pub const fn i386() -> Self {
        DataModel {
            name: "i386",
            endian: Endian::Little,
            long_size: 4,
            pointer_size: 4,
            long_long_align: 4,
        }
    }

    /// x86_64 System V (LP64).
    #[must_use]
    pub const fn x86_64() -> Self {
        DataModel {
            name: "x86_64",
            endian: Endian::Little,
            long_size: 8,
            pointer_size: 8,
            long_long_align: 8,
        }
    }

    /// The data model of the machine running this crate.
    #[must_use]
    pub const fn native() -> Self {
        DataModel {
            name: "native",
            endian: Endian::native(),
            long_size: std::mem::size_of::<std::ffi::c_long>(),
            pointer_size: std::mem::size_of::<usize>(),
            long_long_align: std::mem::align_of::<std::ffi::c_longlong>(),
        }
    }

    /// Returns `(size, alignment)` of a scalar or pointer tag.
    ///
    /// `Ptr` is sized like `PtrVoid`. Returns `None` for tags whose size depends
    /// on more than the data model (`Array`, `Struct`) or that have no size at
    /// all (`Null`, `Other`).
    #[must_use]
    pub const fn scalar(&self, tag: TypeTag) -> Option<(usize, usize)> {
        match tag {
            TypeTag::Char => Some((1, 1)),
            TypeTag::Short => Some((2, 2)),
            TypeTag::Int => Some((4, 4)),
            TypeTag::Long | TypeTag::ULong => Some((self.long_size, self.long_size)),
            TypeTag::PtrVoid | TypeTag::Ptr => Some((self.pointer_size, self.pointer_size)),
            TypeTag::LongLong | TypeTag::ULongLong => Some((8, self.long_long_align)),
            TypeTag::Null | TypeTag::Array | TypeTag::Struct | TypeTag::Other => None,
        }
    }
}

impl Default for DataModel {
    fn default() -> Self {
        Self::native()
    }
}

impl std::fmt::Display for DataModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}
