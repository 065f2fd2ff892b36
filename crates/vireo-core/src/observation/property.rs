#![forbid(unsafe_code)]

//! Observers for data properties and accessors with setters.

use std::rc::Rc;

use super::{Observer, Subscriber, SubscriberList};
use crate::error::Result;
use crate::flags::LifecycleFlags;
use crate::value::{ObjectRef, Value, WeakObjectRef};

/// Observer for a plain data property.
///
/// Writes reach it through [`ObjectRef::set`], which consults the object's
/// observer table before assigning.
pub struct PropertyObserver {
    object: WeakObjectRef,
    key: Rc<str>,
    subscribers: SubscriberList,
}

impl PropertyObserver {
    #[must_use]
    pub fn new(object: &ObjectRef, key: &str) -> Self {
        Self {
            object: object.downgrade(),
            key: Rc::from(key),
            subscribers: SubscriberList::new(),
        }
    }
}

impl Observer for PropertyObserver {
    fn get_value(&self) -> Value {
        self.object
            .upgrade()
            .map_or(Value::Undefined, |o| o.get(&self.key))
    }

    /// Stores the value and notifies, unless `FROM_BIND` is set or the value
    /// is SameValue-equal to the current one.
    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<()> {
        let Some(object) = self.object.upgrade() else {
            return Ok(());
        };
        let old = object.get(&self.key);
        if old.same_value(&value) {
            return Ok(());
        }
        object.assign(&self.key, value.clone())?;
        if flags.contains(LifecycleFlags::FROM_BIND) {
            return Ok(());
        }
        tracing::trace!(key = %self.key, "property changed");
        self.subscribers.notify(&value, &old, flags)
    }

    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) {
        self.subscribers.add(subscriber);
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
        self.subscribers.remove(subscriber);
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn intercepts_writes(&self) -> bool {
        true
    }
}

/// Observer for an accessor with a setter: wraps each write with a read
/// before and after, and notifies when the two differ.
pub struct SetterObserver {
    object: WeakObjectRef,
    key: Rc<str>,
    subscribers: SubscriberList,
}

impl SetterObserver {
    #[must_use]
    pub fn new(object: &ObjectRef, key: &str) -> Self {
        Self {
            object: object.downgrade(),
            key: Rc::from(key),
            subscribers: SubscriberList::new(),
        }
    }
}

impl Observer for SetterObserver {
    fn get_value(&self) -> Value {
        self.object
            .upgrade()
            .map_or(Value::Undefined, |o| o.get(&self.key))
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<()> {
        let Some(object) = self.object.upgrade() else {
            return Ok(());
        };
        let old = object.get(&self.key);
        object.assign(&self.key, value)?;
        let new = object.get(&self.key);
        if new.same_value(&old) {
            return Ok(());
        }
        self.subscribers.notify(&new, &old, flags)
    }

    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) {
        self.subscribers.add(subscriber);
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
        self.subscribers.remove(subscriber);
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn intercepts_writes(&self) -> bool {
        true
    }
}

/// Read/write access to a property without subscription support.
///
/// Returned by [`ObserverLocator::get_accessor`](super::ObserverLocator::get_accessor)
/// when nothing observes the property yet.
pub struct PropertyAccessor {
    object: ObjectRef,
    key: Rc<str>,
}

impl PropertyAccessor {
    #[must_use]
    pub fn new(object: &ObjectRef, key: &str) -> Self {
        Self {
            object: object.clone(),
            key: Rc::from(key),
        }
    }
}

impl Observer for PropertyAccessor {
    fn get_value(&self) -> Value {
        self.object.get(&self.key)
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<()> {
        self.object.set(&self.key, value, flags)
    }

    fn subscribe(&self, _subscriber: Rc<dyn Subscriber>) {}

    fn unsubscribe(&self, _subscriber: &Rc<dyn Subscriber>) {}

    fn subscriber_count(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Accessor;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Log(RefCell<Vec<(Value, Value)>>);

    impl Subscriber for Log {
        fn handle_change(&self, new: &Value, old: &Value, _: LifecycleFlags) -> Result<()> {
            self.0.borrow_mut().push((new.clone(), old.clone()));
            Ok(())
        }
    }

    #[test]
    fn property_observer_notifies_on_change_only() {
        let obj = ObjectRef::from_pairs([("a", Value::from(1))]);
        let observer: Rc<dyn Observer> = Rc::new(PropertyObserver::new(&obj, "a"));
        obj.cache_observer("a", observer.clone());
        let log = Rc::new(Log::default());
        observer.subscribe(log.clone());

        obj.set("a", 2.into(), LifecycleFlags::empty()).unwrap();
        obj.set("a", 2.into(), LifecycleFlags::empty()).unwrap();
        obj.set("a", 3.into(), LifecycleFlags::FROM_BIND).unwrap();

        assert_eq!(*log.0.borrow(), [(Value::from(2), Value::from(1))]);
        assert_eq!(obj.get("a"), Value::from(3));
    }

    #[test]
    fn setter_observer_compares_around_the_setter() {
        let obj = ObjectRef::new();
        obj.insert("_v", Value::from("X"));
        obj.define_accessor(
            "v",
            Accessor::getter(|o, r| r.read(&Value::Object(o.clone()), "_v"))
                .with_setter(|o, v| {
                    o.assign("_v", Value::from(v.to_display_string().to_uppercase()))
                }),
        );
        let observer: Rc<dyn Observer> = Rc::new(SetterObserver::new(&obj, "v"));
        obj.cache_observer("v", observer.clone());
        let log = Rc::new(Log::default());
        observer.subscribe(log.clone());

        obj.set("v", "X".into(), LifecycleFlags::empty()).unwrap();
        assert!(log.0.borrow().is_empty());
        obj.set("v", "y".into(), LifecycleFlags::empty()).unwrap();
        assert_eq!(*log.0.borrow(), [(Value::from("Y"), Value::from("X"))]);
    }
}
