#![forbid(unsafe_code)]

//! Array, map and set storage.
//!
//! This module only holds the raw data and the read side. The mutators
//! (`push`, `splice`, `set`, `add`, ...) live next to the matching observer in
//! [`crate::observation`], because every mutation has to consult the attached
//! observer before it touches the storage.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxBuildHasher;

use super::Key;
use super::Value;
use super::object::next_object_id;
use crate::observation::{ArrayObserver, MapObserver, SetObserver};

// ---------------------------------------------------------------------------
// Array
// ---------------------------------------------------------------------------

pub(crate) struct ArrayData {
    id: u64,
    pub(crate) items: RefCell<Vec<Value>>,
    pub(crate) observer: RefCell<Option<Rc<ArrayObserver>>>,
}

/// Shared handle to an array.
#[derive(Clone)]
pub struct ArrayRef(pub(crate) Rc<ArrayData>);

/// Non-owning array handle, held by the array's own observer.
#[derive(Clone)]
pub struct WeakArrayRef(Weak<ArrayData>);

impl WeakArrayRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<ArrayRef> {
        self.0.upgrade().map(ArrayRef)
    }
}

impl Default for ArrayRef {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrayRef {
    #[must_use]
    pub fn new() -> Self {
        Self::from_values(Vec::new())
    }

    #[must_use]
    pub fn from_values(items: Vec<Value>) -> Self {
        Self(Rc::new(ArrayData {
            id: next_object_id(),
            items: RefCell::new(items),
            observer: RefCell::new(None),
        }))
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakArrayRef {
        WeakArrayRef(Rc::downgrade(&self.0))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item at `index`, or `Undefined` past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        self.0.items.borrow().get(index).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    /// The observer attached by the observer locator, if any.
    #[must_use]
    pub fn observer(&self) -> Option<Rc<ArrayObserver>> {
        self.0.observer.borrow().clone()
    }

    pub(crate) fn attach_observer(&self, observer: Rc<ArrayObserver>) {
        *self.0.observer.borrow_mut() = Some(observer);
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.items.borrow().iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

pub(crate) struct MapData {
    id: u64,
    pub(crate) entries: RefCell<IndexMap<Key, Value, FxBuildHasher>>,
    pub(crate) observer: RefCell<Option<Rc<MapObserver>>>,
}

/// Shared handle to an insertion-ordered map keyed by SameValueZero.
#[derive(Clone)]
pub struct MapRef(pub(crate) Rc<MapData>);

#[derive(Clone)]
pub struct WeakMapRef(Weak<MapData>);

impl WeakMapRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<MapRef> {
        self.0.upgrade().map(MapRef)
    }
}

impl Default for MapRef {
    fn default() -> Self {
        Self::new()
    }
}

impl MapRef {
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(MapData {
            id: next_object_id(),
            entries: RefCell::new(IndexMap::default()),
            observer: RefCell::new(None),
        }))
    }

    /// Build a map from `(key, value)` pairs without notifying anyone.
    pub fn from_entries(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let map = Self::new();
        map.0
            .entries
            .borrow_mut()
            .extend(entries.into_iter().map(|(k, v)| (Key::new(k), v)));
        map
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &MapRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakMapRef {
        WeakMapRef(Rc::downgrade(&self.0))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, key: &Value) -> Value {
        self.0
            .entries
            .borrow()
            .get(&Key::new(key.clone()))
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has(&self, key: &Value) -> bool {
        self.0.entries.borrow().contains_key(&Key::new(key.clone()))
    }

    #[must_use]
    pub fn keys(&self) -> Vec<Value> {
        self.0.entries.borrow().keys().map(|k| k.value().clone()).collect()
    }

    /// Entries as two-element `[key, value]` arrays, in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<Value> {
        self.0
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| Value::Array(ArrayRef::from_values(vec![k.value().clone(), v.clone()])))
            .collect()
    }

    #[must_use]
    pub fn observer(&self) -> Option<Rc<MapObserver>> {
        self.0.observer.borrow().clone()
    }

    pub(crate) fn attach_observer(&self, observer: Rc<MapObserver>) {
        *self.0.observer.borrow_mut() = Some(observer);
    }
}

impl fmt::Debug for MapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.entries.borrow().iter().map(|(k, v)| (k.value(), v)))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Set
// ---------------------------------------------------------------------------

pub(crate) struct SetData {
    id: u64,
    pub(crate) items: RefCell<IndexSet<Key, FxBuildHasher>>,
    pub(crate) observer: RefCell<Option<Rc<SetObserver>>>,
}

/// Shared handle to an insertion-ordered set keyed by SameValueZero.
#[derive(Clone)]
pub struct SetRef(pub(crate) Rc<SetData>);

#[derive(Clone)]
pub struct WeakSetRef(Weak<SetData>);

impl WeakSetRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<SetRef> {
        self.0.upgrade().map(SetRef)
    }
}

impl Default for SetRef {
    fn default() -> Self {
        Self::new()
    }
}

impl SetRef {
    #[must_use]
    pub fn new() -> Self {
        Self(Rc::new(SetData {
            id: next_object_id(),
            items: RefCell::new(IndexSet::default()),
            observer: RefCell::new(None),
        }))
    }

    pub fn from_values(items: impl IntoIterator<Item = Value>) -> Self {
        let set = Self::new();
        set.0.items.borrow_mut().extend(items.into_iter().map(Key::new));
        set
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &SetRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakSetRef {
        WeakSetRef(Rc::downgrade(&self.0))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn has(&self, item: &Value) -> bool {
        self.0.items.borrow().contains(&Key::new(item.clone()))
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().iter().map(|k| k.value().clone()).collect()
    }

    #[must_use]
    pub fn observer(&self) -> Option<Rc<SetObserver>> {
        self.0.observer.borrow().clone()
    }

    pub(crate) fn attach_observer(&self, observer: Rc<SetObserver>) {
        *self.0.observer.borrow_mut() = Some(observer);
    }
}

impl fmt::Debug for SetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.0.items.borrow().iter().map(Key::value))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_reads() {
        let arr = ArrayRef::from_values(vec![1.into(), "x".into()]);
        assert_eq!(arr.len(), 2);
        assert_eq!(arr.get(1), Value::from("x"));
        assert!(arr.get(5).is_undefined());
        assert!(arr.observer().is_none());
        assert_eq!(format!("{arr:?}"), r#"[1, "x"]"#);
    }

    #[test]
    fn map_keys_use_same_value_zero() {
        let map = MapRef::from_entries([
            (Value::Number(0.0), "zero".into()),
            (Value::Number(f64::NAN), "nan".into()),
        ]);
        assert_eq!(map.get(&Value::Number(-0.0)), Value::from("zero"));
        assert_eq!(map.get(&Value::Number(f64::NAN)), Value::from("nan"));
        assert!(!map.has(&Value::from("0")));
        let entries = map.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].get_keyed(&Value::Number(1.0)), Value::from("zero"));
    }

    #[test]
    fn set_deduplicates_by_identity_for_references() {
        let a = ArrayRef::new();
        let set = SetRef::from_values([
            Value::Array(a.clone()),
            Value::Array(a.clone()),
            Value::Array(ArrayRef::new()),
        ]);
        assert_eq!(set.len(), 2);
        assert!(set.has(&Value::Array(a)));
    }
}
