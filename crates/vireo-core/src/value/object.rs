#![forbid(unsafe_code)]

//! Plain objects: ordered property bags with data and accessor properties.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};

use super::Value;
use crate::error::Result;
use crate::flags::LifecycleFlags;
use crate::observation::Observer;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_object_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Capability handed to getters so that every read they perform can be
/// recorded as a dependency.
///
/// Getters must read through the reader instead of calling
/// [`Value::get_property`] directly, otherwise the read is invisible to the
/// computed observer.
pub trait PropertyReader {
    /// Read `target.key`.
    fn read(&self, target: &Value, key: &str) -> Value;

    /// Read `target[key]`.
    fn read_keyed(&self, target: &Value, key: &Value) -> Value {
        match (target, key) {
            (Value::Array(_), Value::Number(_)) => {
                let items = self.items(target);
                super::number_to_index(key.to_number())
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default()
            }
            _ => self.read(target, &key.to_display_string()),
        }
    }

    /// Snapshot the items of a collection (values for arrays and sets,
    /// `[key, value]` pairs for maps).
    fn items(&self, target: &Value) -> Vec<Value>;
}

/// A reader that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Untracked;

impl PropertyReader for Untracked {
    fn read(&self, target: &Value, key: &str) -> Value {
        target.get_property(key)
    }

    fn items(&self, target: &Value) -> Vec<Value> {
        match target {
            Value::Array(a) => a.to_vec(),
            Value::Set(s) => s.to_vec(),
            Value::Map(m) => m.entries(),
            _ => Vec::new(),
        }
    }
}

pub type Getter = Rc<dyn Fn(&ObjectRef, &dyn PropertyReader) -> Value>;
pub type Setter = Rc<dyn Fn(&ObjectRef, Value) -> Result<()>>;

/// A computed property.
#[derive(Clone)]
pub struct Accessor {
    pub get: Getter,
    pub set: Option<Setter>,
    /// Observe through dependency collection even when a setter exists.
    pub volatile: bool,
    /// Dependencies never change; collect them only once per subscription.
    pub is_static: bool,
    pub configurable: bool,
}

impl Accessor {
    /// A getter-only accessor.
    pub fn getter(get: impl Fn(&ObjectRef, &dyn PropertyReader) -> Value + 'static) -> Self {
        Self {
            get: Rc::new(get),
            set: None,
            volatile: false,
            is_static: false,
            configurable: true,
        }
    }

    #[must_use]
    pub fn with_setter(mut self, set: impl Fn(&ObjectRef, Value) -> Result<()> + 'static) -> Self {
        self.set = Some(Rc::new(set));
        self
    }

    #[must_use]
    pub fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    #[must_use]
    pub fn with_static_dependencies(mut self) -> Self {
        self.is_static = true;
        self
    }

    #[must_use]
    pub fn non_configurable(mut self) -> Self {
        self.configurable = false;
        self
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("has_setter", &self.set.is_some())
            .field("volatile", &self.volatile)
            .field("is_static", &self.is_static)
            .finish()
    }
}

/// One property slot.
#[derive(Clone, Debug)]
pub enum Property {
    Data { value: Value, configurable: bool },
    Accessor(Accessor),
}

impl Property {
    #[must_use]
    pub fn is_configurable(&self) -> bool {
        match self {
            Self::Data { configurable, .. } => *configurable,
            Self::Accessor(a) => a.configurable,
        }
    }
}

struct ObjectData {
    id: u64,
    class_name: Option<Rc<str>>,
    props: RefCell<IndexMap<Rc<str>, Property, FxBuildHasher>>,
    /// Observers created for this object's properties, reused across bindings.
    observers: RefCell<FxHashMap<Rc<str>, Rc<dyn Observer>>>,
}

/// Shared handle to a plain object.
#[derive(Clone)]
pub struct ObjectRef(Rc<ObjectData>);

/// Non-owning handle, held by observers to avoid reference cycles.
#[derive(Clone)]
pub struct WeakObjectRef(Weak<ObjectData>);

impl WeakObjectRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(o) => write!(f, "Weak({o:?})"),
            None => write!(f, "Weak(<dropped>)"),
        }
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectRef {
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// An object tagged with a class name (consulted by `instanceof`).
    #[must_use]
    pub fn with_class(name: &str) -> Self {
        Self::build(Some(Rc::from(name)))
    }

    fn build(class_name: Option<Rc<str>>) -> Self {
        Self(Rc::new(ObjectData {
            id: next_object_id(),
            class_name,
            props: RefCell::new(IndexMap::default()),
            observers: RefCell::new(FxHashMap::default()),
        }))
    }

    /// Build an object from `(key, value)` pairs.
    pub fn from_pairs<K: AsRef<str>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let obj = Self::new();
        for (k, v) in pairs {
            obj.insert(k.as_ref(), v);
        }
        obj
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Rc::downgrade(&self.0))
    }

    #[must_use]
    pub fn class_name(&self) -> Option<&Rc<str>> {
        self.0.class_name.as_ref()
    }

    /// Define or overwrite a data property without notifying anyone.
    ///
    /// Intended for building initial state; use [`ObjectRef::set`] for
    /// observable writes.
    pub fn insert(&self, key: &str, value: Value) {
        let mut props = self.0.props.borrow_mut();
        match props.get_mut(key) {
            Some(Property::Data { value: slot, .. }) => *slot = value,
            _ => {
                props.insert(
                    Rc::from(key),
                    Property::Data {
                        value,
                        configurable: true,
                    },
                );
            }
        }
    }

    /// Define a non-configurable data property. Such properties cannot be
    /// intercepted and fall back to dirty checking when observed.
    pub fn insert_frozen(&self, key: &str, value: Value) {
        self.0.props.borrow_mut().insert(
            Rc::from(key),
            Property::Data {
                value,
                configurable: false,
            },
        );
    }

    /// Define an accessor property.
    pub fn define_accessor(&self, key: &str, accessor: Accessor) {
        self.0
            .props
            .borrow_mut()
            .insert(Rc::from(key), Property::Accessor(accessor));
    }

    /// Delete a property without notifying. Returns the removed slot.
    pub fn remove(&self, key: &str) -> Option<Property> {
        self.0.props.borrow_mut().shift_remove(key)
    }

    /// Snapshot of a property slot.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<Property> {
        self.0.props.borrow().get(key).cloned()
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.0.props.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.props.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a property, running getters untracked.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        self.get_with(key, &Untracked)
    }

    /// Read a property, running getters against `reader`.
    #[must_use]
    pub fn get_with(&self, key: &str, reader: &dyn PropertyReader) -> Value {
        let slot = self.0.props.borrow().get(key).cloned();
        match slot {
            Some(Property::Data { value, .. }) => value,
            Some(Property::Accessor(accessor)) => (accessor.get)(self, reader),
            None => Value::Undefined,
        }
    }

    /// Observable write: routes through an intercepting observer when one is
    /// attached to `key`, otherwise performs a plain assignment.
    pub fn set(&self, key: &str, value: Value, flags: LifecycleFlags) -> Result<()> {
        let observer = self.0.observers.borrow().get(key).cloned();
        match observer {
            Some(observer) if observer.intercepts_writes() => observer.set_value(value, flags),
            _ => self.assign(key, value),
        }
    }

    /// Plain assignment: data slots are overwritten, accessor setters are
    /// invoked, accessors without setter ignore the write.
    pub fn assign(&self, key: &str, value: Value) -> Result<()> {
        let setter = {
            let mut props = self.0.props.borrow_mut();
            match props.get_mut(key) {
                Some(Property::Data { value: slot, .. }) => {
                    *slot = value;
                    return Ok(());
                }
                Some(Property::Accessor(accessor)) => accessor.set.clone(),
                None => {
                    props.insert(
                        Rc::from(key),
                        Property::Data {
                            value,
                            configurable: true,
                        },
                    );
                    return Ok(());
                }
            }
        };
        match setter {
            Some(set) => set(self, value),
            None => Ok(()),
        }
    }

    /// Observer cached for `key`, if any.
    #[must_use]
    pub fn cached_observer(&self, key: &str) -> Option<Rc<dyn Observer>> {
        self.0.observers.borrow().get(key).cloned()
    }

    /// Cache `observer` for `key`; later lookups return the same instance.
    pub fn cache_observer(&self, key: &str, observer: Rc<dyn Observer>) {
        self.0.observers.borrow_mut().insert(Rc::from(key), observer);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let props = self.0.props.borrow();
        let name = self.0.class_name.as_deref().unwrap_or("Object");
        write!(f, "{name}#{} {{", self.0.id)?;
        for (i, key) in props.keys().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " {key}")?;
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn insert_get_and_keys_keep_order() {
        let obj = ObjectRef::from_pairs([("b", Value::from(1)), ("a", Value::from(2))]);
        assert_eq!(obj.get("a"), Value::from(2));
        assert!(obj.get("missing").is_undefined());
        let keys: Vec<String> = obj.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["b", "a"]);
    }

    #[test]
    fn assign_calls_setter() {
        let obj = ObjectRef::new();
        obj.insert("_x", 1.into());
        obj.define_accessor(
            "x",
            Accessor::getter(|o, r| r.read(&Value::Object(o.clone()), "_x"))
                .with_setter(|o, v| o.assign("_x", v)),
        );
        assert_eq!(obj.get("x"), Value::from(1));
        obj.set("x", 5.into(), LifecycleFlags::empty()).unwrap();
        assert_eq!(obj.get("_x"), Value::from(5));
    }

    #[test]
    fn getter_sees_reader() {
        struct Counting(Cell<u32>);
        impl PropertyReader for Counting {
            fn read(&self, target: &Value, key: &str) -> Value {
                self.0.set(self.0.get() + 1);
                target.get_property(key)
            }
            fn items(&self, _target: &Value) -> Vec<Value> {
                Vec::new()
            }
        }
        let obj = ObjectRef::from_pairs([("a", Value::from(2))]);
        obj.define_accessor(
            "double",
            Accessor::getter(|o, r| r.read(&Value::Object(o.clone()), "a").multiply(&2.into())),
        );
        let reader = Counting(Cell::new(0));
        assert_eq!(obj.get_with("double", &reader), Value::from(4));
        assert_eq!(reader.0.get(), 1);
    }

    #[test]
    fn ids_are_unique_and_identity_is_pointer() {
        let a = ObjectRef::new();
        let b = ObjectRef::new();
        assert_ne!(a.id(), b.id());
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
        let weak = a.downgrade();
        drop(a);
        assert!(weak.upgrade().is_none());
    }
}
