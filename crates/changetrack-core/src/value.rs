//! Plain values and the underlying (untracked) object graph.
//!
//! [`Object`] and [`List`] are shared handles: cloning one clones the
//! reference, not the data, and [`Object::id`] / [`List::id`] expose the
//! allocation identity the tracking engine keys its registry on. Writes made
//! through these handles bypass interception entirely.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::error::TrackResult;
use crate::shape::Shape;

// ---------------------------------------------------------------------------
// NodeId
// ---------------------------------------------------------------------------

/// Identity of an underlying object or list allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    fn of<T>(rc: &Rc<T>) -> Self {
        Self(Rc::as_ptr(rc).addr())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A property value.
///
/// Equality is the declared equality of each type: scalars compare by value,
/// objects and lists compare by identity. Floats compare bitwise, so a `NaN`
/// equals the same `NaN` and re-writing it is a no-op.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Object(Object),
    List(List),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Human-readable type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(_) => "bool".to_string(),
            Self::Int(_) => "int".to_string(),
            Self::Float(_) => "float".to_string(),
            Self::Text(_) => "text".to_string(),
            Self::Object(object) => object.shape_name(),
            Self::List(_) => "collection".to_string(),
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_list(&self) -> Option<&List> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::List(a), Self::List(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Object(object) => write!(f, "{}{}", object.shape_name(), object.id()),
            Self::List(list) => write!(f, "[{} items]", list.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Self::Object(object)
    }
}

impl From<&Object> for Value {
    fn from(object: &Object) -> Self {
        Self::Object(object.clone())
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Self::List(list)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

struct ObjectData {
    shape: Rc<Shape>,
    values: Vec<Value>,
}

impl Drop for ObjectData {
    // Uniquely owned descendants are unlinked onto a worklist; a long chain
    // would otherwise drop one nested call per link.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.values);
        while let Some(value) = pending.pop() {
            match value {
                Value::Object(Object(data)) => {
                    if let Ok(cell) = Rc::try_unwrap(data) {
                        pending.append(&mut cell.into_inner().values);
                    }
                }
                Value::List(List(items)) => {
                    if let Ok(cell) = Rc::try_unwrap(items) {
                        pending.extend(cell.into_inner());
                    }
                }
                _ => {}
            }
        }
    }
}

/// Shared handle to a plain object of some [`Shape`].
#[derive(Clone)]
pub struct Object(Rc<RefCell<ObjectData>>);

impl Object {
    /// New object with every property at its kind's default.
    #[must_use]
    pub fn new(shape: &Rc<Shape>) -> Self {
        let values = shape
            .properties()
            .iter()
            .map(|def| def.kind.default_value())
            .collect();
        Self(Rc::new(RefCell::new(ObjectData {
            shape: Rc::clone(shape),
            values,
        })))
    }

    /// Builder-style [`set`](Self::set).
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn with(self, name: &str, value: impl Into<Value>) -> TrackResult<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        NodeId::of(&self.0)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn shape(&self) -> Rc<Shape> {
        Rc::clone(&self.0.borrow().shape)
    }

    #[must_use]
    pub fn shape_name(&self) -> String {
        self.0.borrow().shape.name().to_string()
    }

    /// Read a property.
    ///
    /// # Errors
    ///
    /// [`TrackError::NotFound`](crate::TrackError::NotFound) for undeclared names.
    pub fn get(&self, name: &str) -> TrackResult<Value> {
        let slot = self.0.borrow().shape.resolve(name)?;
        Ok(self.slot(slot))
    }

    /// Write a property without any tracking.
    ///
    /// # Errors
    ///
    /// `NotFound` for undeclared names, `TypeMismatch` for values the
    /// property cannot hold.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> TrackResult<()> {
        let value = value.into();
        let shape = self.shape();
        let slot = shape.resolve(name)?;
        shape.check(slot, &value)?;
        self.set_slot(slot, value);
        Ok(())
    }

    /// Shallow copy: scalars are duplicated, references are shared.
    #[must_use]
    pub fn shallow_copy(&self) -> Self {
        let data = self.0.borrow();
        Self(Rc::new(RefCell::new(ObjectData {
            shape: Rc::clone(&data.shape),
            values: data.values.clone(),
        })))
    }

    pub(crate) fn slot(&self, slot: usize) -> Value {
        self.0.borrow().values[slot].clone()
    }

    pub(crate) fn set_slot(&self, slot: usize, value: Value) {
        self.0.borrow_mut().values[slot] = value;
    }
}

impl fmt::Debug for Object {
    // Never descends into property values: object graphs may be cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Object");
        if let Ok(data) = self.0.try_borrow() {
            s.field("shape", &data.shape.name());
        }
        s.field("id", &self.id()).finish()
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// Shared handle to a plain sequence of values.
#[derive(Clone, Default)]
pub struct List(Rc<RefCell<Vec<Value>>>);

impl List {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_values(values: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(values)))
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        NodeId::of(&self.0)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    /// Snapshot of the current elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    /// Append without tracking.
    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    /// Remove without tracking.
    pub fn remove(&self, index: usize) -> Option<Value> {
        let mut items = self.0.borrow_mut();
        (index < items.len()).then(|| items.remove(index))
    }

    pub(crate) fn insert(&self, index: usize, value: Value) {
        self.0.borrow_mut().insert(index, value);
    }

    pub(crate) fn replace(&self, values: Vec<Value>) -> Vec<Value> {
        std::mem::replace(&mut *self.0.borrow_mut(), values)
    }

    /// Object elements, in order, without duplicates.
    pub(crate) fn distinct_objects(&self) -> Vec<Object> {
        let mut seen = HashSet::new();
        self.0
            .borrow()
            .iter()
            .filter_map(Value::as_object)
            .filter(|object| seen.insert(object.id()))
            .cloned()
            .collect()
    }

    pub(crate) fn contains_object(&self, object: &Object) -> bool {
        self.0
            .borrow()
            .iter()
            .any(|v| v.as_object().is_some_and(|o| o.ptr_eq(object)))
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("id", &self.id())
            .field("len", &self.len())
            .finish()
    }
}
