//! The struct registry.
//!
//! The registry owns every [`StructDescriptor`] the marshaling layer knows about,
//! together with the target and host [`DataModel`]s the descriptors were laid out
//! against. It is populated once at startup, has a fixed capacity, and is only
//! read afterwards. Ids are dense indices handed out in registration order.

use std::collections::HashMap;

use log::debug;

use crate::{
    abi::DataModel,
    thunk::{Side, StructDescriptor, StructId, StructLayout, TypeDescriptor},
    Error, Result,
};

/// Default registry capacity.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 128;

/// Fixed-capacity table of registered struct descriptors.
///
/// Registration validates each descriptor against the registry's data models:
///
/// - both layouts carry exactly one offset per field
/// - every sized field fits inside its layout
/// - alignments are powers of two
/// - nested `Struct(id)` fields refer to descriptors registered earlier, so
///   nesting can never form a cycle
/// - names are unique
///
/// # Examples
///
/// ```rust
/// use guestabi::abi::DataModel;
/// use guestabi::thunk::{StructDescriptor, StructRegistry, TypeDescriptor};
///
/// let mut registry = StructRegistry::new(DataModel::mips_o32(), DataModel::x86_64(), 2);
/// let timespec = StructDescriptor::builder("timespec")
///     .fields([TypeDescriptor::Long, TypeDescriptor::Long])
///     .build(&registry)?;
/// let id = registry.register(timespec)?;
///
/// assert_eq!(registry.lookup("timespec"), Some(id));
/// assert_eq!(registry.get(id)?.host().size, 16);
/// # Ok::<(), guestabi::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct StructRegistry {
    target: DataModel,
    host: DataModel,
    capacity: usize,
    entries: Vec<StructDescriptor>,
    by_name: HashMap<String, StructId>,
}

impl StructRegistry {
    /// Creates an empty registry for the given data models.
    #[must_use]
    pub fn new(target: DataModel, host: DataModel, capacity: usize) -> Self {
        StructRegistry {
            target,
            host,
            capacity,
            entries: Vec::with_capacity(capacity),
            by_name: HashMap::new(),
        }
    }

    /// The target (guest) data model
    #[must_use]
    pub fn target(&self) -> &DataModel {
        &self.target
    }

    /// The host data model
    #[must_use]
    pub fn host(&self) -> &DataModel {
        &self.host
    }

    /// Returns the data model for `side`.
    #[must_use]
    pub fn model(&self, side: Side) -> &DataModel {
        match side {
            Side::Target => &self.target,
            Side::Host => &self.host,
        }
    }

    /// Maximum number of descriptors
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of registered descriptors
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validates and registers a descriptor, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if the registry is full. Existing
    /// entries are never dropped or overwritten. Returns [`Error::Malformed`] if
    /// the descriptor fails validation.
    pub fn register(&mut self, descriptor: StructDescriptor) -> Result<StructId> {
        if self.entries.len() >= self.capacity {
            return Err(Error::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        if self.by_name.contains_key(descriptor.name()) {
            return Err(malformed_error!(
                "Struct '{}' is already registered",
                descriptor.name()
            ));
        }

        self.validate_layout(&descriptor, Side::Target)?;
        self.validate_layout(&descriptor, Side::Host)?;

        let Ok(index) = u32::try_from(self.entries.len()) else {
            return Err(Error::CapacityExceeded {
                capacity: self.capacity,
            });
        };
        let id = StructId(index);

        debug!(
            "Registered struct '{}' as {} (target {} bytes, host {} bytes)",
            descriptor.name(),
            id,
            descriptor.target().size,
            descriptor.host().size
        );

        self.by_name.insert(descriptor.name().to_string(), id);
        self.entries.push(descriptor);
        Ok(id)
    }

    /// Returns the descriptor registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStruct`] if `id` was never registered.
    pub fn get(&self, id: StructId) -> Result<&StructDescriptor> {
        self.entries
            .get(id.0 as usize)
            .ok_or(Error::UnknownStruct(id))
    }

    /// Looks up a descriptor id by struct name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<StructId> {
        self.by_name.get(name).copied()
    }

    /// Iterates over all registered descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (StructId, &StructDescriptor)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, descriptor)| (StructId(index as u32), descriptor))
    }

    /// Returns the size of `ty` in bytes on `side`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedType`] for `Null` and `Other`,
    /// [`Error::UnknownStruct`] for an unregistered nested struct, and
    /// [`Error::Malformed`] if an array size overflows.
    pub fn size_of(&self, ty: &TypeDescriptor, side: Side) -> Result<usize> {
        match ty {
            TypeDescriptor::Array(inner, count) => self
                .size_of(inner, side)?
                .checked_mul(*count)
                .ok_or_else(|| malformed_error!("Array of {} elements overflows", count)),
            TypeDescriptor::Struct(id) => Ok(self.get(*id)?.layout(side).size),
            _ => self
                .model(side)
                .scalar(ty.tag())
                .map(|(size, _)| size)
                .ok_or(Error::UnsupportedType(ty.tag())),
        }
    }

    /// Returns the alignment of `ty` in bytes on `side`.
    ///
    /// # Errors
    ///
    /// Same as [`size_of`](Self::size_of).
    pub fn align_of(&self, ty: &TypeDescriptor, side: Side) -> Result<usize> {
        match ty {
            TypeDescriptor::Array(inner, _) => self.align_of(inner, side),
            TypeDescriptor::Struct(id) => Ok(self.get(*id)?.layout(side).align),
            _ => self
                .model(side)
                .scalar(ty.tag())
                .map(|(_, align)| align)
                .ok_or(Error::UnsupportedType(ty.tag())),
        }
    }

    /// Computes the natural C layout of `fields` on `side`.
    ///
    /// Each field is placed at the next offset that is a multiple of its
    /// alignment; the struct is aligned to its most aligned field and padded
    /// to a multiple of that alignment.
    ///
    /// # Errors
    ///
    /// Same as [`size_of`](Self::size_of).
    pub fn natural_layout(&self, fields: &[TypeDescriptor], side: Side) -> Result<StructLayout> {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0usize;
        let mut align = 1usize;

        for field in fields {
            let field_size = self.size_of(field, side)?;
            let field_align = self.align_of(field, side)?;

            offset = offset
                .checked_next_multiple_of(field_align)
                .ok_or_else(|| malformed_error!("Struct layout overflows"))?;
            offsets.push(offset);
            offset = offset
                .checked_add(field_size)
                .ok_or_else(|| malformed_error!("Struct layout overflows"))?;
            align = align.max(field_align);
        }

        let size = offset
            .checked_next_multiple_of(align)
            .ok_or_else(|| malformed_error!("Struct layout overflows"))?;
        Ok(StructLayout::new(offsets, size, align))
    }

    fn validate_layout(&self, descriptor: &StructDescriptor, side: Side) -> Result<()> {
        let layout = descriptor.layout(side);
        let fields = descriptor.fields();

        if layout.field_offsets.len() != fields.len() {
            return Err(malformed_error!(
                "Struct '{}' has {} fields but {} {:?} offsets",
                descriptor.name(),
                fields.len(),
                layout.field_offsets.len(),
                side
            ));
        }
        if !layout.align.is_power_of_two() {
            return Err(malformed_error!(
                "Struct '{}' has {:?} alignment {}, which is not a power of two",
                descriptor.name(),
                side,
                layout.align
            ));
        }

        for (index, (field, &offset)) in fields.iter().zip(&layout.field_offsets).enumerate() {
            let field_size = match self.size_of(field, side) {
                Ok(size) => size,
                // Left to the custom converter, or reported at conversion time.
                Err(Error::UnsupportedType(_)) => continue,
                Err(Error::UnknownStruct(id)) => {
                    return Err(malformed_error!(
                        "Field {} of struct '{}' refers to unregistered struct {}",
                        index,
                        descriptor.name(),
                        id
                    ))
                }
                Err(error) => return Err(error),
            };

            if self.has_zero_sized_elements(field, side)? {
                return Err(malformed_error!(
                    "Field {} of struct '{}' is an array of zero-sized elements",
                    index,
                    descriptor.name()
                ));
            }

            let fits = offset
                .checked_add(field_size)
                .is_some_and(|end| end <= layout.size);
            if !fits {
                return Err(malformed_error!(
                    "Field {} of struct '{}' ({} bytes at {:?} offset {}) overflows size {}",
                    index,
                    descriptor.name(),
                    field_size,
                    side,
                    offset,
                    layout.size
                ));
            }
        }

        Ok(())
    }

    fn has_zero_sized_elements(&self, ty: &TypeDescriptor, side: Side) -> Result<bool> {
        match ty {
            TypeDescriptor::Array(inner, count) => Ok((*count > 0
                && self.size_of(inner, side)? == 0)
                || self.has_zero_sized_elements(inner, side)?),
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(capacity: usize) -> StructRegistry {
        StructRegistry::new(DataModel::mips_o32(), DataModel::x86_64(), capacity)
    }

    fn ints(name: &str) -> StructDescriptor {
        StructDescriptor::new(
            name,
            vec![TypeDescriptor::Int; 3],
            StructLayout::new(vec![0, 4, 8], 12, 4),
            StructLayout::new(vec![0, 4, 8], 12, 4),
        )
    }

    #[test]
    fn ids_are_dense() {
        let mut registry = registry(4);
        assert!(registry.is_empty());
        let a = registry.register(ints("a")).unwrap();
        let b = registry.register(ints("b")).unwrap();
        assert_eq!(a, StructId(0));
        assert_eq!(b, StructId(1));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup("b"), Some(b));
        assert_eq!(registry.lookup("c"), None);
        assert_eq!(registry.iter().count(), 2);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut registry = registry(2);
        registry.register(ints("a")).unwrap();
        registry.register(ints("b")).unwrap();
        match registry.register(ints("c")) {
            Err(Error::CapacityExceeded { capacity }) => assert_eq!(capacity, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(StructId(1)).unwrap().name(), "b");
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut registry = registry(4);
        registry.register(ints("a")).unwrap();
        assert!(matches!(
            registry.register(ints("a")),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn unknown_id() {
        let registry = registry(4);
        assert!(matches!(
            registry.get(StructId(3)),
            Err(Error::UnknownStruct(StructId(3)))
        ));
    }

    #[test]
    fn offset_count_mismatch() {
        let mut registry = registry(4);
        let desc = StructDescriptor::new(
            "short",
            vec![TypeDescriptor::Int; 3],
            StructLayout::new(vec![0, 4], 12, 4),
            StructLayout::new(vec![0, 4, 8], 12, 4),
        );
        assert!(matches!(
            registry.register(desc),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn field_past_end() {
        let mut registry = registry(4);
        let desc = StructDescriptor::new(
            "overflow",
            vec![TypeDescriptor::Int; 3],
            StructLayout::new(vec![0, 4, 8], 12, 4),
            StructLayout::new(vec![0, 4, 10], 12, 4),
        );
        assert!(matches!(
            registry.register(desc),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn bad_alignment() {
        let mut registry = registry(4);
        let desc = StructDescriptor::new(
            "odd",
            vec![TypeDescriptor::Int; 3],
            StructLayout::new(vec![0, 4, 8], 12, 3),
            StructLayout::new(vec![0, 4, 8], 12, 4),
        );
        assert!(matches!(
            registry.register(desc),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn nested_struct_must_exist() {
        let mut registry = registry(4);
        let desc = StructDescriptor::new(
            "outer",
            vec![TypeDescriptor::structure(StructId(0))],
            StructLayout::new(vec![0], 12, 4),
            StructLayout::new(vec![0], 12, 4),
        );
        assert!(matches!(
            registry.register(desc),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn zero_sized_array_elements_rejected() {
        let mut registry = registry(4);
        let empty = StructDescriptor::builder("empty").build(&registry).unwrap();
        let empty = registry.register(empty).unwrap();

        for field in [
            TypeDescriptor::array(TypeDescriptor::structure(empty), usize::MAX),
            TypeDescriptor::array(
                TypeDescriptor::array(TypeDescriptor::structure(empty), 2),
                0,
            ),
        ] {
            let desc = StructDescriptor::new(
                "holder",
                vec![field],
                StructLayout::new(vec![0], 0, 1),
                StructLayout::new(vec![0], 0, 1),
            );
            assert!(matches!(
                registry.register(desc),
                Err(Error::Malformed { .. })
            ));
        }

        // An empty array of them is harmless.
        let desc = StructDescriptor::new(
            "holder",
            vec![TypeDescriptor::array(TypeDescriptor::structure(empty), 0)],
            StructLayout::new(vec![0], 0, 1),
            StructLayout::new(vec![0], 0, 1),
        );
        assert!(registry.register(desc).is_ok());
    }

    #[test]
    fn sizes_and_alignments() {
        let mut registry = registry(4);
        let inner = StructDescriptor::builder("pair")
            .fields([TypeDescriptor::Short, TypeDescriptor::Long])
            .build(&registry)
            .unwrap();
        let id = registry.register(inner).unwrap();

        let nested = TypeDescriptor::array(TypeDescriptor::structure(id), 3);
        assert_eq!(registry.size_of(&nested, Side::Target).unwrap(), 24);
        assert_eq!(registry.size_of(&nested, Side::Host).unwrap(), 48);
        assert_eq!(registry.align_of(&nested, Side::Target).unwrap(), 4);
        assert_eq!(registry.align_of(&nested, Side::Host).unwrap(), 8);

        let ptr = TypeDescriptor::ptr(TypeDescriptor::Other);
        assert_eq!(registry.size_of(&ptr, Side::Host).unwrap(), 8);
        assert!(matches!(
            registry.size_of(&TypeDescriptor::Null, Side::Target),
            Err(Error::UnsupportedType(_))
        ));
    }

    #[test]
    fn natural_layout_padding() {
        let registry = registry(1);
        let layout = registry
            .natural_layout(
                &[TypeDescriptor::Char, TypeDescriptor::Int, TypeDescriptor::Char],
                Side::Target,
            )
            .unwrap();
        assert_eq!(layout.field_offsets, vec![0, 4, 8]);
        assert_eq!(layout.size, 12);
        assert_eq!(layout.align, 4);

        let empty = registry.natural_layout(&[], Side::Host).unwrap();
        assert_eq!(empty.size, 0);
        assert_eq!(empty.align, 1);
    }
}
