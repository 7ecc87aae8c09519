//! Struct layouts and descriptors.
//!
//! A [`StructDescriptor`] pairs a target and a host [`StructLayout`] with one
//! shared field list. Layouts are either given explicitly, for kernel structs
//! that do not follow natural alignment, or computed with natural C alignment
//! from the registry's data models through [`StructBuilder`].

use crate::{
    thunk::{convert::StructConverter, Side, StructRegistry, TypeDescriptor},
    Result,
};

/// The in-memory layout of a struct on one side.
///
/// `field_offsets[i]` is the byte offset of field `i` of the owning
/// [`StructDescriptor`]. Bytes not covered by any field are padding.
#[derive(Clone, Debug)]
pub struct StructLayout {
    /// Byte offset of each field, in field order.
    pub field_offsets: Vec<usize>,
    /// Total size in bytes, including trailing padding.
    pub size: usize,
    /// Alignment in bytes; always a power of two.
    pub align: usize,
    /// Replaces the generic field walk when producing this layout.
    pub converter: Option<StructConverter>,
}

impl StructLayout {
    /// Creates a layout from explicit offsets, size and alignment.
    #[must_use]
    pub fn new(field_offsets: Vec<usize>, size: usize, align: usize) -> Self {
        StructLayout {
            field_offsets,
            size,
            align,
            converter: None,
        }
    }

    /// Sets the custom converter used when this layout is the destination.
    #[must_use]
    pub fn with_converter(mut self, converter: StructConverter) -> Self {
        self.converter = Some(converter);
        self
    }
}

/// A named struct with a target layout, a host layout and a shared field list.
///
/// # Examples
///
/// ```rust
/// use guestabi::abi::DataModel;
/// use guestabi::thunk::{StructDescriptor, StructLayout, StructRegistry, TypeDescriptor};
///
/// let mut registry = StructRegistry::new(DataModel::mips_o32(), DataModel::x86_64(), 16);
///
/// // Three ints laid out identically on both sides
/// let triple = StructDescriptor::new(
///     "triple",
///     vec![TypeDescriptor::Int; 3],
///     StructLayout::new(vec![0, 4, 8], 12, 4),
///     StructLayout::new(vec![0, 4, 8], 12, 4),
/// );
/// registry.register(triple)?;
///
/// // Natural layout computed from each side's data model
/// let timeval = StructDescriptor::builder("timeval")
///     .field(TypeDescriptor::Long)
///     .field(TypeDescriptor::Long)
///     .build(&registry)?;
/// assert_eq!(timeval.target().size, 8);
/// assert_eq!(timeval.host().size, 16);
/// # Ok::<(), guestabi::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct StructDescriptor {
    name: String,
    fields: Vec<TypeDescriptor>,
    target: StructLayout,
    host: StructLayout,
}

impl StructDescriptor {
    /// Creates a descriptor from explicit layouts.
    ///
    /// Consistency with `fields` is checked when the descriptor is registered.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        fields: Vec<TypeDescriptor>,
        target: StructLayout,
        host: StructLayout,
    ) -> Self {
        StructDescriptor {
            name: name.into(),
            fields,
            target,
            host,
        }
    }

    /// Starts building a descriptor whose layouts default to natural alignment.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> StructBuilder {
        StructBuilder {
            name: name.into(),
            fields: Vec::new(),
            target: None,
            host: None,
            target_converter: None,
            host_converter: None,
        }
    }

    /// The struct name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared, ordered field list
    #[must_use]
    pub fn fields(&self) -> &[TypeDescriptor] {
        &self.fields
    }

    /// The target (guest) layout
    #[must_use]
    pub fn target(&self) -> &StructLayout {
        &self.target
    }

    /// The host layout
    #[must_use]
    pub fn host(&self) -> &StructLayout {
        &self.host
    }

    /// Returns the layout for `side`.
    #[must_use]
    pub fn layout(&self, side: Side) -> &StructLayout {
        match side {
            Side::Target => &self.target,
            Side::Host => &self.host,
        }
    }
}

/// Builder for [`StructDescriptor`].
///
/// Any layout not supplied explicitly is computed with natural C alignment
/// from the data model of its side when [`build`](Self::build) runs.
#[derive(Clone, Debug)]
pub struct StructBuilder {
    name: String,
    fields: Vec<TypeDescriptor>,
    target: Option<StructLayout>,
    host: Option<StructLayout>,
    target_converter: Option<StructConverter>,
    host_converter: Option<StructConverter>,
}

impl StructBuilder {
    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: TypeDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Appends several fields.
    #[must_use]
    pub fn fields(mut self, fields: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Uses an explicit target layout.
    #[must_use]
    pub fn target_layout(mut self, layout: StructLayout) -> Self {
        self.target = Some(layout);
        self
    }

    /// Uses an explicit host layout.
    #[must_use]
    pub fn host_layout(mut self, layout: StructLayout) -> Self {
        self.host = Some(layout);
        self
    }

    /// Installs a converter that produces the target layout from the host one.
    #[must_use]
    pub fn target_converter(mut self, converter: StructConverter) -> Self {
        self.target_converter = Some(converter);
        self
    }

    /// Installs a converter that produces the host layout from the target one.
    #[must_use]
    pub fn host_converter(mut self, converter: StructConverter) -> Self {
        self.host_converter = Some(converter);
        self
    }

    /// Finishes the descriptor, computing missing layouts against `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsupportedType`] if a layout must be computed but
    /// a field has no size (`Null`, `Other`), [`crate::Error::UnknownStruct`] for
    /// a nested struct that is not registered, and [`crate::Error::Malformed`] if
    /// the computed size overflows.
    pub fn build(self, registry: &StructRegistry) -> Result<StructDescriptor> {
        let mut target = match self.target {
            Some(layout) => layout,
            None => registry.natural_layout(&self.fields, Side::Target)?,
        };
        let mut host = match self.host {
            Some(layout) => layout,
            None => registry.natural_layout(&self.fields, Side::Host)?,
        };

        if let Some(converter) = self.target_converter {
            target.converter = Some(converter);
        }
        if let Some(converter) = self.host_converter {
            host.converter = Some(converter);
        }

        Ok(StructDescriptor {
            name: self.name,
            fields: self.fields,
            target,
            host,
        })
    }
}
