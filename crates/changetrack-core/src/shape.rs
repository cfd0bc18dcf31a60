//! Shapes: the property-name-keyed dispatch table of a wrapped type.
//!
//! A [`Shape`] is built once per object type and shared by every
//! [`Object`](crate::Object) of that type. It fixes the set of properties,
//! their declared [`PropertyKind`], and the slot each name resolves to, so
//! reads and writes are total: an unknown name fails with `NotFound`, an
//! incompatible value fails with `TypeMismatch`, and nothing else can go
//! wrong.
//!
//! Complex properties refer to their target shape by name rather than by
//! pointer, which keeps self-referential shapes (an `InventoryUpdate` that
//! links to another `InventoryUpdate`) free of reference cycles.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{TrackError, TrackResult};
use crate::value::Value;

// ---------------------------------------------------------------------------
// PropertyKind
// ---------------------------------------------------------------------------

/// Declared type of a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    Bool,
    Int,
    Float,
    /// Nullable string.
    Text,
    /// Nullable reference to an object of the named shape.
    Complex(String),
    /// Nullable sequence whose elements all have the given kind.
    Collection(Box<PropertyKind>),
}

impl PropertyKind {
    /// Complex property holding objects of shape `shape`.
    pub fn complex(shape: impl Into<String>) -> Self {
        Self::Complex(shape.into())
    }

    /// Collection property holding elements of `element` kind.
    #[must_use]
    pub fn collection_of(element: Self) -> Self {
        Self::Collection(Box::new(element))
    }

    #[must_use]
    pub const fn is_complex(&self) -> bool {
        matches!(self, Self::Complex(_))
    }

    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }

    /// Whether values of this kind are wired into the tracked graph.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        self.is_complex() || self.is_collection()
    }

    /// Value a freshly constructed object holds for this kind.
    #[must_use]
    pub const fn default_value(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Text | Self::Complex(_) | Self::Collection(_) => Value::Null,
        }
    }

    /// Check whether `value` may be stored in a property of this kind.
    ///
    /// Collections are checked element by element; object values must carry
    /// the declared shape name.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::Text | Self::Complex(_) | Self::Collection(_), Value::Null)
            | (Self::Text, Value::Text(_)) => true,
            (Self::Complex(shape), Value::Object(object)) => object.shape_name() == *shape,
            (Self::Collection(element), Value::List(list)) => {
                list.to_vec().iter().all(|item| element.accepts(item))
            }
            _ => false,
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Text => write!(f, "text"),
            Self::Complex(shape) => write!(f, "{shape}"),
            Self::Collection(element) => write!(f, "collection<{element}>"),
        }
    }
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

/// A single declared property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
}

/// Immutable description of an object type.
#[derive(Debug, PartialEq, Eq)]
pub struct Shape {
    name: String,
    properties: Vec<PropertyDef>,
    index: HashMap<String, usize>,
}

impl Shape {
    /// Start describing a shape called `name`.
    pub fn builder(name: impl Into<String>) -> ShapeBuilder {
        ShapeBuilder {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Properties in declaration order.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    /// Slot index of `name`, if declared.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Slot index of `name`.
    ///
    /// # Errors
    ///
    /// [`TrackError::NotFound`] when the shape does not declare `name`.
    pub fn resolve(&self, name: &str) -> TrackResult<usize> {
        self.slot(name)
            .ok_or_else(|| TrackError::not_found(&self.name, name))
    }

    /// Definition stored at `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` was not produced by this shape.
    #[must_use]
    pub fn property(&self, slot: usize) -> &PropertyDef {
        &self.properties[slot]
    }

    /// Validate that `value` may be written to `slot`.
    ///
    /// # Errors
    ///
    /// [`TrackError::TypeMismatch`] naming the declared and actual types.
    pub fn check(&self, slot: usize, value: &Value) -> TrackResult<()> {
        let def = self.property(slot);
        if def.kind.accepts(value) {
            return Ok(());
        }
        Err(TrackError::TypeMismatch {
            shape: self.name.clone(),
            property: def.name.clone(),
            expected: def.kind.to_string(),
            actual: value.type_name(),
        })
    }
}

/// Builder for [`Shape`].
#[derive(Debug, Clone)]
pub struct ShapeBuilder {
    name: String,
    properties: Vec<PropertyDef>,
}

impl ShapeBuilder {
    /// Declare a property of any kind.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            kind,
        });
        self
    }

    #[must_use]
    pub fn bool(self, name: impl Into<String>) -> Self {
        self.property(name, PropertyKind::Bool)
    }

    #[must_use]
    pub fn int(self, name: impl Into<String>) -> Self {
        self.property(name, PropertyKind::Int)
    }

    #[must_use]
    pub fn float(self, name: impl Into<String>) -> Self {
        self.property(name, PropertyKind::Float)
    }

    #[must_use]
    pub fn text(self, name: impl Into<String>) -> Self {
        self.property(name, PropertyKind::Text)
    }

    /// Declare a reference to an object of shape `shape`.
    #[must_use]
    pub fn complex(self, name: impl Into<String>, shape: impl Into<String>) -> Self {
        self.property(name, PropertyKind::complex(shape))
    }

    /// Declare a collection of objects of shape `shape`.
    #[must_use]
    pub fn collection(self, name: impl Into<String>, shape: impl Into<String>) -> Self {
        self.property(
            name,
            PropertyKind::collection_of(PropertyKind::complex(shape)),
        )
    }

    /// Freeze the shape and build its dispatch table.
    ///
    /// # Errors
    ///
    /// - [`TrackError::EmptyShapeName`] if the name is blank.
    /// - [`TrackError::DuplicateProperty`] if a name is declared twice.
    pub fn build(self) -> TrackResult<Rc<Shape>> {
        if self.name.trim().is_empty() {
            return Err(TrackError::EmptyShapeName);
        }

        let mut index = HashMap::with_capacity(self.properties.len());
        for (slot, def) in self.properties.iter().enumerate() {
            if index.insert(def.name.clone(), slot).is_some() {
                return Err(TrackError::DuplicateProperty {
                    shape: self.name,
                    property: def.name.clone(),
                });
            }
        }

        Ok(Rc::new(Shape {
            name: self.name,
            properties: self.properties,
            index,
        }))
    }
}
