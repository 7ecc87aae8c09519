//! The struct conversion engine.
//!
//! [`StructThunk`] converts a struct instance between its target and host
//! representation by walking the shared field list of its descriptor. Scalars
//! are resized and byte-swapped, pointers go through a [`PointerTranslator`],
//! arrays are converted element by element and nested structs recursively.
//! A layout with a custom [`StructConverter`] replaces the walk entirely when
//! that layout is the one being produced.
//!
//! Conversions are staged in a scratch buffer. The caller's destination is only
//! written once the whole struct converted successfully.

use log::trace;

use crate::{
    abi::{read_int, read_uint, write_uint, DataModel},
    thunk::{Direction, Side, StructId, StructRegistry, TypeDescriptor},
    Error, Result,
};

/// A conversion routine that replaces the generic field walk.
///
/// It receives the engine (for the registry, the data models and nested field
/// conversion), the destination bytes sized to the destination layout, and the
/// source bytes sized to the source layout. The destination starts zeroed.
pub type StructConverter = fn(&StructThunk<'_>, &mut [u8], &[u8]) -> Result<()>;

/// Maps pointer field values between the guest and host address spaces.
///
/// The engine never passes null to either method; null pointers stay null.
pub trait PointerTranslator {
    /// Maps a guest address read from a target-side field to its host value.
    ///
    /// # Errors
    ///
    /// Returns an error if `guest` has no host counterpart.
    fn to_host(&self, guest: u64) -> Result<u64>;

    /// Maps a host value read from a host-side field back to a guest address.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` does not point into guest memory.
    fn to_guest(&self, host: u64) -> Result<u64>;
}

/// Carries guest addresses unchanged into host-side pointer fields.
///
/// Useful when the host side of a struct is only an intermediate form and
/// pointees are leased separately by the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityPointers;

impl PointerTranslator for IdentityPointers {
    fn to_host(&self, guest: u64) -> Result<u64> {
        Ok(guest)
    }

    fn to_guest(&self, host: u64) -> Result<u64> {
        Ok(host)
    }
}

/// Converts registered structs between their target and host representation.
///
/// # Examples
///
/// ```rust
/// use guestabi::abi::DataModel;
/// use guestabi::thunk::{Direction, StructDescriptor, StructRegistry, StructThunk, TypeDescriptor};
///
/// let mut registry = StructRegistry::new(DataModel::mips_o32(), DataModel::x86_64(), 8);
/// let timeval = StructDescriptor::builder("timeval")
///     .fields([TypeDescriptor::Long, TypeDescriptor::Long])
///     .build(&registry)?;
/// let id = registry.register(timeval)?;
///
/// let guest = [0xFF, 0xFF, 0xFF, 0xFE, 0x00, 0x00, 0x00, 0x07];
/// let host = StructThunk::new(&registry).convert(id, Direction::ToHost, &guest)?;
///
/// assert_eq!(host.len(), 16);
/// assert_eq!(&host[..8], &(-2_i64).to_le_bytes());
/// assert_eq!(&host[8..], &7_i64.to_le_bytes());
/// # Ok::<(), guestabi::Error>(())
/// ```
#[derive(Clone, Copy)]
pub struct StructThunk<'a> {
    registry: &'a StructRegistry,
    pointers: &'a dyn PointerTranslator,
}

impl<'a> StructThunk<'a> {
    /// Creates an engine that carries pointer values through [`IdentityPointers`].
    #[must_use]
    pub fn new(registry: &'a StructRegistry) -> Self {
        StructThunk {
            registry,
            pointers: &IdentityPointers,
        }
    }

    /// Replaces the pointer translator, usually with the guest's address window.
    #[must_use]
    pub fn with_pointers(mut self, pointers: &'a dyn PointerTranslator) -> Self {
        self.pointers = pointers;
        self
    }

    /// The registry this engine reads descriptors from
    #[must_use]
    pub fn registry(&self) -> &'a StructRegistry {
        self.registry
    }

    /// The pointer translator in use
    #[must_use]
    pub fn pointers(&self) -> &'a dyn PointerTranslator {
        self.pointers
    }

    /// The data model of `side`
    #[must_use]
    pub fn model(&self, side: Side) -> &'a DataModel {
        self.registry.model(side)
    }

    /// Converts `src` into a freshly allocated buffer of the destination size.
    ///
    /// Padding bytes in the result are zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStruct`] if `id` is not registered,
    /// [`Error::UnsupportedType`] if a field has no handler,
    /// [`Error::OutOfBounds`] if `src` is shorter than the source layout, and
    /// any error raised by the pointer translator or a custom converter.
    pub fn convert(&self, id: StructId, direction: Direction, src: &[u8]) -> Result<Vec<u8>> {
        let descriptor = self.registry.get(id)?;
        let mut dst = vec![0u8; descriptor.layout(direction.destination()).size];
        self.convert_struct(id, direction, src, &mut dst)?;
        Ok(dst)
    }

    /// Converts `src` into the start of `dst`.
    ///
    /// Only the first `destination size` bytes of `dst` are written, and only
    /// if the whole conversion succeeds. Padding inside that range is zeroed.
    ///
    /// # Errors
    ///
    /// Same as [`convert`](Self::convert), plus [`Error::OutOfBounds`] if `dst`
    /// is shorter than the destination layout.
    pub fn convert_into(
        &self,
        id: StructId,
        direction: Direction,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<()> {
        let descriptor = self.registry.get(id)?;
        let size = descriptor.layout(direction.destination()).size;
        let Some(dst) = dst.get_mut(..size) else {
            return Err(Error::OutOfBounds);
        };

        let mut scratch = vec![0u8; size];
        self.convert_struct(id, direction, src, &mut scratch)?;
        dst.copy_from_slice(&scratch);
        Ok(())
    }

    /// Converts one value of type `ty` at `src_offset` into `dst` at `dst_offset`.
    ///
    /// This is the per-field step of the generic walk, exposed so custom
    /// converters can delegate the fields they do not treat specially.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedType`] for `Null` and `Other`,
    /// [`Error::OutOfBounds`] if either buffer is too short, and any error
    /// raised by the pointer translator.
    pub fn convert_value(
        &self,
        ty: &TypeDescriptor,
        direction: Direction,
        src: &[u8],
        src_offset: usize,
        dst: &mut [u8],
        dst_offset: usize,
    ) -> Result<()> {
        let from = self.model(direction.source());
        let to = self.model(direction.destination());

        match ty {
            TypeDescriptor::Null | TypeDescriptor::Other => Err(Error::UnsupportedType(ty.tag())),
            TypeDescriptor::Ptr(_) => {
                let value = read_uint(src, src_offset, from.pointer_size, from.endian)?;
                let mapped = match (value, direction) {
                    (0, _) => 0,
                    (guest, Direction::ToHost) => self.pointers.to_host(guest)?,
                    (host, Direction::ToTarget) => self.pointers.to_guest(host)?,
                };
                write_uint(dst, dst_offset, to.pointer_size, mapped, to.endian)
            }
            TypeDescriptor::Array(inner, count) => {
                let src_stride = self.registry.size_of(inner, direction.source())?;
                let dst_stride = self.registry.size_of(inner, direction.destination())?;
                if src_stride == 0 && dst_stride == 0 {
                    return Ok(());
                }
                for index in 0..*count {
                    self.convert_value(
                        inner,
                        direction,
                        src,
                        element_offset(src_offset, index, src_stride)?,
                        dst,
                        element_offset(dst_offset, index, dst_stride)?,
                    )?;
                }
                Ok(())
            }
            TypeDescriptor::Struct(id) => {
                let descriptor = self.registry.get(*id)?;
                let src_size = descriptor.layout(direction.source()).size;
                let dst_size = descriptor.layout(direction.destination()).size;
                let src = sub_slice(src, src_offset, src_size)?;
                let dst = sub_slice_mut(dst, dst_offset, dst_size)?;
                self.convert_struct(*id, direction, src, dst)
            }
            scalar => {
                let tag = scalar.tag();
                let (Some((src_size, _)), Some((dst_size, _))) = (from.scalar(tag), to.scalar(tag))
                else {
                    return Err(Error::UnsupportedType(tag));
                };

                let value = if tag.is_signed() {
                    read_int(src, src_offset, src_size, from.endian)? as u64
                } else {
                    read_uint(src, src_offset, src_size, from.endian)?
                };
                write_uint(dst, dst_offset, dst_size, value, to.endian)
            }
        }
    }

    fn convert_struct(
        &self,
        id: StructId,
        direction: Direction,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<()> {
        let descriptor = self.registry.get(id)?;
        let from = descriptor.layout(direction.source());
        let to = descriptor.layout(direction.destination());

        let src = src.get(..from.size).ok_or(Error::OutOfBounds)?;
        let dst = dst.get_mut(..to.size).ok_or(Error::OutOfBounds)?;

        if let Some(converter) = to.converter {
            trace!("Converting '{}' {:?} with custom converter", descriptor.name(), direction);
            return converter(self, dst, src);
        }

        for ((field, &src_offset), &dst_offset) in descriptor
            .fields()
            .iter()
            .zip(&from.field_offsets)
            .zip(&to.field_offsets)
        {
            self.convert_value(field, direction, src, src_offset, dst, dst_offset)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for StructThunk<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructThunk")
            .field("structs", &self.registry.len())
            .field("target", self.registry.target())
            .field("host", self.registry.host())
            .finish_non_exhaustive()
    }
}

fn element_offset(base: usize, index: usize, stride: usize) -> Result<usize> {
    index
        .checked_mul(stride)
        .and_then(|offset| offset.checked_add(base))
        .ok_or(Error::OutOfBounds)
}

fn sub_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset.checked_add(len).ok_or(Error::OutOfBounds)?;
    data.get(offset..end).ok_or(Error::OutOfBounds)
}

fn sub_slice_mut(data: &mut [u8], offset: usize, len: usize) -> Result<&mut [u8]> {
    let end = offset.checked_add(len).ok_or(Error::OutOfBounds)?;
    data.get_mut(offset..end).ok_or(Error::OutOfBounds)
}
