#![forbid(unsafe_code)]

//! Observer factory and cache.

use std::rc::Rc;

use super::{
    ArrayObserver, DirtyChecker, GetterObserver, MapObserver, Observer, PrimitiveObserver,
    PropertyAccessor, PropertyObserver, SetObserver, SetterObserver,
};
use crate::error::Result;
use crate::flags::LifecycleFlags;
use crate::queue::FlushQueue;
use crate::value::{ArrayRef, MapRef, ObjectRef, Property, SetRef, Value};

struct LocatorInner {
    flush_queue: Rc<dyn FlushQueue>,
    dirty_checker: DirtyChecker,
}

/// Creates observers on first request and caches them on the observed
/// object, so later requests for the same property return the same instance.
///
/// Cloning yields another handle to the same locator.
#[derive(Clone)]
pub struct ObserverLocator {
    inner: Rc<LocatorInner>,
}

impl ObserverLocator {
    /// A locator whose collection observers enqueue on `flush_queue`.
    #[must_use]
    pub fn new(flush_queue: Rc<dyn FlushQueue>) -> Self {
        Self::with_dirty_checker(flush_queue, DirtyChecker::default())
    }

    #[must_use]
    pub fn with_dirty_checker(
        flush_queue: Rc<dyn FlushQueue>,
        dirty_checker: DirtyChecker,
    ) -> Self {
        Self {
            inner: Rc::new(LocatorInner {
                flush_queue,
                dirty_checker,
            }),
        }
    }

    #[must_use]
    pub fn dirty_checker(&self) -> &DirtyChecker {
        &self.inner.dirty_checker
    }

    #[must_use]
    pub fn flush_queue(&self) -> Rc<dyn FlushQueue> {
        Rc::clone(&self.inner.flush_queue)
    }

    /// The observer for `target.key`.
    ///
    /// Objects get a cached property, setter, getter or dirty-check observer
    /// depending on how the property is defined. Arrays map `length` to the
    /// length observer and every other key to the collection observer; maps
    /// and sets map `size` likewise. Primitives get an uncached
    /// [`PrimitiveObserver`].
    pub fn get_observer(
        &self,
        flags: LifecycleFlags,
        target: &Value,
        key: &str,
    ) -> Result<Rc<dyn Observer>> {
        match target {
            Value::Object(object) => self.get_object_observer(flags, object, key),
            Value::Array(array) => {
                let observer = self.array_observer(array);
                if key == "length" {
                    Ok(observer.length_observer() as Rc<dyn Observer>)
                } else {
                    Ok(observer as Rc<dyn Observer>)
                }
            }
            Value::Map(map) => {
                let observer = self.map_observer(map);
                if key == "size" {
                    Ok(observer.size_observer() as Rc<dyn Observer>)
                } else {
                    Ok(observer as Rc<dyn Observer>)
                }
            }
            Value::Set(set) => {
                let observer = self.set_observer(set);
                if key == "size" {
                    Ok(observer.size_observer() as Rc<dyn Observer>)
                } else {
                    Ok(observer as Rc<dyn Observer>)
                }
            }
            other => Ok(Rc::new(PrimitiveObserver::new(other, key))),
        }
    }

    fn get_object_observer(
        &self,
        flags: LifecycleFlags,
        object: &ObjectRef,
        key: &str,
    ) -> Result<Rc<dyn Observer>> {
        if let Some(cached) = object.cached_observer(key) {
            return Ok(cached);
        }
        let observer: Rc<dyn Observer> = match object.property(key) {
            None | Some(Property::Data { configurable: true, .. }) => {
                Rc::new(PropertyObserver::new(object, key))
            }
            Some(Property::Data { configurable: false, .. }) => {
                self.inner.dirty_checker.create_property(object, key)?
            }
            Some(Property::Accessor(accessor)) if accessor.set.is_some() && !accessor.volatile => {
                Rc::new(SetterObserver::new(object, key))
            }
            Some(Property::Accessor(accessor)) => {
                GetterObserver::new(object, key, &accessor, self.clone())
            }
        };
        tracing::trace!(object = object.id(), key, ?flags, "observer created");
        object.cache_observer(key, Rc::clone(&observer));
        Ok(observer)
    }

    /// Read/write access to `object.key`: the cached observer if one exists,
    /// otherwise a plain accessor that is not cached.
    #[must_use]
    pub fn get_accessor(&self, object: &ObjectRef, key: &str) -> Rc<dyn Observer> {
        object
            .cached_observer(key)
            .unwrap_or_else(|| Rc::new(PropertyAccessor::new(object, key)))
    }

    pub fn array_observer(&self, array: &ArrayRef) -> Rc<ArrayObserver> {
        ArrayObserver::attach(array, self.flush_queue())
    }

    pub fn map_observer(&self, map: &MapRef) -> Rc<MapObserver> {
        MapObserver::attach(map, self.flush_queue())
    }

    pub fn set_observer(&self, set: &SetRef) -> Rc<SetObserver> {
        SetObserver::attach(set, self.flush_queue())
    }

    /// The collection observer for arrays, maps and sets; `None` otherwise.
    #[must_use]
    pub fn collection_observer(&self, target: &Value) -> Option<Rc<dyn Observer>> {
        match target {
            Value::Array(array) => Some(self.array_observer(array) as Rc<dyn Observer>),
            Value::Map(map) => Some(self.map_observer(map) as Rc<dyn Observer>),
            Value::Set(set) => Some(self.set_observer(set) as Rc<dyn Observer>),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ObserverLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverLocator")
            .field("dirty_checked", &self.inner.dirty_checker.tracked_count())
            .finish()
    }
}
