//! Field type descriptors for struct thunking.
//!
//! A [`TypeDescriptor`] names the C type of one struct field independently of
//! any ABI. Sizes, alignments and byte order only come into play when a
//! descriptor is laid out against a [`DataModel`](crate::abi::DataModel).

use strum::{EnumDiscriminants, EnumIter, IntoStaticStr};

use crate::thunk::StructId;

/// The C type of a struct field.
///
/// Composite descriptors are built with [`TypeDescriptor::ptr`],
/// [`TypeDescriptor::array`] and [`TypeDescriptor::structure`].
///
/// # Examples
///
/// ```rust
/// use guestabi::thunk::{TypeDescriptor, TypeTag};
///
/// let iov_base = TypeDescriptor::ptr(TypeDescriptor::Char);
/// let padding = TypeDescriptor::array(TypeDescriptor::Long, 4);
///
/// assert_eq!(iov_base.tag(), TypeTag::Ptr);
/// assert_eq!(padding.tag(), TypeTag::Array);
/// assert!(TypeDescriptor::Int.is_scalar());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, EnumDiscriminants)]
#[strum_discriminants(name(TypeTag))]
#[strum_discriminants(doc = "Payload-free tag of a [`TypeDescriptor`], used to key scalar sizes.")]
#[strum_discriminants(derive(EnumIter, IntoStaticStr, Hash))]
pub enum TypeDescriptor {
    /// No type. Never valid as a field.
    Null,
    /// `char`, one byte.
    Char,
    /// `short`
    Short,
    /// `int`
    Int,
    /// `long`, width depends on the data model.
    Long,
    /// `unsigned long`, width depends on the data model.
    ULong,
    /// Pointer to unknown data, carried as an opaque pointer-width integer.
    PtrVoid,
    /// `long long`
    LongLong,
    /// `unsigned long long`
    ULongLong,
    /// Pointer to a value of the inner type.
    ///
    /// Holds a guest address on the target side and a host address on the host side.
    Ptr(Box<TypeDescriptor>),
    /// `count` consecutive elements of the inner type.
    Array(Box<TypeDescriptor>, usize),
    /// A nested, previously registered struct.
    Struct(StructId),
    /// A type only a custom converter knows how to handle.
    Other,
}

impl TypeDescriptor {
    /// Creates a pointer to `inner`.
    #[must_use]
    pub fn ptr(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Ptr(Box::new(inner))
    }

    /// Creates an array of `count` elements of `inner`.
    #[must_use]
    pub fn array(inner: TypeDescriptor, count: usize) -> Self {
        TypeDescriptor::Array(Box::new(inner), count)
    }

    /// Creates a reference to the registered struct `id`.
    #[must_use]
    pub fn structure(id: StructId) -> Self {
        TypeDescriptor::Struct(id)
    }

    /// Returns the tag of this descriptor.
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        TypeTag::from(self)
    }

    /// Returns `true` for the fixed-width integer tags `Char` through `ULongLong`.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.tag().is_scalar()
    }
}

impl TypeTag {
    /// Returns `true` for the fixed-width integer tags `Char` through `ULongLong`.
    #[must_use]
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            TypeTag::Char
                | TypeTag::Short
                | TypeTag::Int
                | TypeTag::Long
                | TypeTag::ULong
                | TypeTag::PtrVoid
                | TypeTag::LongLong
                | TypeTag::ULongLong
        )
    }

    /// Returns `true` if widening a value of this tag sign-extends it.
    #[must_use]
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            TypeTag::Char | TypeTag::Short | TypeTag::Int | TypeTag::Long | TypeTag::LongLong
        )
    }

    /// Returns the tag name, e.g. `"ULongLong"`.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
