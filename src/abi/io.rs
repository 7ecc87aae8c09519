//! Byte-order aware scalar reading and writing for guest and host buffers.
//!
//! Guest memory and marshaled structures are plain byte buffers whose scalars are
//! stored in the byte order of the ABI that owns them. This module provides the
//! bounds-checked primitives every other part of the crate uses to move scalars
//! in and out of such buffers.
//!
//! # Key Components
//!
//! - [`AbiIO`] - Trait implemented by every primitive that can live in guest memory
//! - [`Endian`] - Byte order of one representation
//! - [`read_at`] / [`write_at`] - Typed access at an offset in a given byte order
//! - [`read_uint`] / [`read_int`] / [`write_uint`] - Width-dynamic access used by
//!   the struct thunk engine, where field widths are only known at runtime
//!
//! # Examples
//!
//! ```rust
//! use guestabi::abi::{read_at, write_at, Endian};
//!
//! let mut data = [0u8; 4];
//! write_at(&mut data, 0, 0x0102_0304_u32, Endian::Big)?;
//! assert_eq!(data, [0x01, 0x02, 0x03, 0x04]);
//!
//! let value: u32 = read_at(&data, 0, Endian::Little)?;
//! assert_eq!(value, 0x0403_0201);
//! # Ok::<(), guestabi::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All functions return [`crate::Error::OutOfBounds`] if the buffer is too short,
//! including when `offset + width` overflows.

use crate::{Error::OutOfBounds, Result};

/// Byte order of a representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl Endian {
    /// The byte order of the machine running this crate.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }
}

impl Default for Endian {
    fn default() -> Self {
        Self::native()
    }
}

/// Trait for primitives that can be stored in guest or host memory.
///
/// Each implementation names the fixed-size byte array for the type and converts
/// to and from it in either byte order.
pub trait AbiIO: Sized + Copy {
    /// Byte array holding one value of this type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode from little-endian bytes
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
    /// Decode from big-endian bytes
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Encode as little-endian bytes
    fn to_le_bytes(self) -> Self::Bytes;
    /// Encode as big-endian bytes
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_abi_io {
    ($($ty:ty),* $(,)?) => {
        $(
            impl AbiIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_abi_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Reads a value of type `T` at `offset` in the given byte order.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `offset + size_of::<T>()` exceeds the buffer.
pub fn read_at<T: AbiIO>(data: &[u8], offset: usize, endian: Endian) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(bytes) = T::Bytes::try_from(&data[offset..end]) else {
        return Err(OutOfBounds);
    };

    Ok(match endian {
        Endian::Little => T::from_le_bytes(bytes),
        Endian::Big => T::from_be_bytes(bytes),
    })
}

/// Writes `value` at `offset` in the given byte order.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `offset + size_of::<T>()` exceeds the buffer.
pub fn write_at<T: AbiIO>(data: &mut [u8], offset: usize, value: T, endian: Endian) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let bytes = match endian {
        Endian::Little => value.to_le_bytes(),
        Endian::Big => value.to_be_bytes(),
    };
    data[offset..end].copy_from_slice(bytes.as_ref());
    Ok(())
}

/// Reads an unsigned integer of `width` bytes (1, 2, 4 or 8), zero-extended to `u64`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short, and
/// [`crate::Error::Malformed`] for an unsupported width.
pub fn read_uint(data: &[u8], offset: usize, width: usize, endian: Endian) -> Result<u64> {
    Ok(match width {
        1 => u64::from(read_at::<u8>(data, offset, endian)?),
        2 => u64::from(read_at::<u16>(data, offset, endian)?),
        4 => u64::from(read_at::<u32>(data, offset, endian)?),
        8 => read_at::<u64>(data, offset, endian)?,
        _ => return Err(malformed_error!("Unsupported scalar width {}", width)),
    })
}

/// Reads a signed integer of `width` bytes (1, 2, 4 or 8), sign-extended to `i64`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short, and
/// [`crate::Error::Malformed`] for an unsupported width.
pub fn read_int(data: &[u8], offset: usize, width: usize, endian: Endian) -> Result<i64> {
    Ok(match width {
        1 => i64::from(read_at::<i8>(data, offset, endian)?),
        2 => i64::from(read_at::<i16>(data, offset, endian)?),
        4 => i64::from(read_at::<i32>(data, offset, endian)?),
        8 => read_at::<i64>(data, offset, endian)?,
        _ => return Err(malformed_error!("Unsupported scalar width {}", width)),
    })
}

/// Writes the low `width` bytes (1, 2, 4 or 8) of `value`; wider bits are truncated.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short, and
/// [`crate::Error::Malformed`] for an unsupported width.
#[allow(clippy::cast_possible_truncation)]
pub fn write_uint(
    data: &mut [u8],
    offset: usize,
    width: usize,
    value: u64,
    endian: Endian,
) -> Result<()> {
    match width {
        1 => write_at(data, offset, value as u8, endian),
        2 => write_at(data, offset, value as u16, endian),
        4 => write_at(data, offset, value as u32, endian),
        8 => write_at(data, offset, value, endian),
        _ => Err(malformed_error!("Unsupported scalar width {}", width)),
    }
}
