#![forbid(unsafe_code)]

//! Computed properties observed through dependency collection.
//!
//! # Design
//!
//! A getter receives a [`PropertyReader`]. While a [`GetterObserver`] has
//! subscribers it evaluates the getter against a [`DependencyCollector`],
//! which resolves an observer for every read and records it. The getter
//! observer subscribes itself to those observers; when one of them fires it
//! re-evaluates, diffs the dependency set against the previous one, and
//! notifies its own subscribers if the computed value changed.
//!
//! # Invariants
//!
//! 1. Dependencies are held only while at least one subscriber is present.
//! 2. Each dependency is subscribed at most once, even if read many times.
//! 3. With `is_static`, the dependency set collected on the first subscription
//!    is kept for the lifetime of that subscription.
//!
//! # Failure Modes
//!
//! - **Getter reads a property that needs dirty checking while it is
//!   disabled**: collection finishes, the error is returned and the previous
//!   dependency set is kept.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{Observer, ObserverLocator, Subscriber, SubscriberList, same_observer};
use crate::error::{Error, Result};
use crate::flags::LifecycleFlags;
use crate::value::{Accessor, Getter, ObjectRef, PropertyReader, Untracked, Value, WeakObjectRef};

/// A [`PropertyReader`] that records an observer for every read.
pub struct DependencyCollector<'a> {
    locator: &'a ObserverLocator,
    observed: RefCell<Vec<Rc<dyn Observer>>>,
    error: RefCell<Option<Error>>,
}

impl<'a> DependencyCollector<'a> {
    #[must_use]
    pub fn new(locator: &'a ObserverLocator) -> Self {
        Self {
            locator,
            observed: RefCell::new(Vec::new()),
            error: RefCell::new(None),
        }
    }

    fn record(&self, observer: Rc<dyn Observer>) {
        let mut observed = self.observed.borrow_mut();
        if !observed.iter().any(|o| same_observer(o, &observer)) {
            observed.push(observer);
        }
    }

    fn record_error(&self, error: Error) {
        self.error.borrow_mut().get_or_insert(error);
    }

    /// The recorded observers, or the first error raised while resolving one.
    pub fn finish(self) -> Result<Vec<Rc<dyn Observer>>> {
        match self.error.into_inner() {
            Some(error) => Err(error),
            None => Ok(self.observed.into_inner()),
        }
    }
}

impl PropertyReader for DependencyCollector<'_> {
    fn read(&self, target: &Value, key: &str) -> Value {
        if target.is_reference() {
            match self
                .locator
                .get_observer(LifecycleFlags::empty(), target, key)
            {
                Ok(observer) => self.record(observer),
                Err(error) => self.record_error(error),
            }
        }
        target.get_property(key)
    }

    fn items(&self, target: &Value) -> Vec<Value> {
        if let Some(observer) = self.locator.collection_observer(target) {
            self.record(observer);
        }
        Untracked.items(target)
    }
}

pub struct GetterObserver {
    object: WeakObjectRef,
    key: Rc<str>,
    getter: Getter,
    is_static: bool,
    locator: ObserverLocator,
    current: RefCell<Value>,
    dependencies: RefCell<Vec<Rc<dyn Observer>>>,
    subscribers: SubscriberList,
    self_ref: Weak<GetterObserver>,
}

impl GetterObserver {
    pub(crate) fn new(
        object: &ObjectRef,
        key: &str,
        accessor: &Accessor,
        locator: ObserverLocator,
    ) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            object: object.downgrade(),
            key: Rc::from(key),
            getter: Rc::clone(&accessor.get),
            is_static: accessor.is_static,
            locator,
            current: RefCell::new(Value::Undefined),
            dependencies: RefCell::new(Vec::new()),
            subscribers: SubscriberList::new(),
            self_ref: me.clone(),
        })
    }

    /// Number of observers this getter currently depends on.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.dependencies.borrow().len()
    }

    fn as_subscriber(&self) -> Option<Rc<dyn Subscriber>> {
        self.self_ref
            .upgrade()
            .map(|me| me as Rc<dyn Subscriber>)
    }

    fn evaluate_untracked(&self) -> Value {
        self.object
            .upgrade()
            .map_or(Value::Undefined, |o| (self.getter)(&o, &Untracked))
    }

    /// Evaluate the getter, collecting dependencies, and reconcile
    /// subscriptions against the previous dependency set.
    fn collect(&self) -> Result<Value> {
        let Some(object) = self.object.upgrade() else {
            return Ok(Value::Undefined);
        };
        let collector = DependencyCollector::new(&self.locator);
        let value = (self.getter)(&object, &collector);
        let next = collector.finish()?;
        let Some(me) = self.as_subscriber() else {
            return Ok(value);
        };
        let previous = std::mem::replace(&mut *self.dependencies.borrow_mut(), next.clone());
        for stale in previous
            .iter()
            .filter(|old| !next.iter().any(|new| same_observer(old, new)))
        {
            stale.unsubscribe(&me);
        }
        for fresh in next
            .iter()
            .filter(|new| !previous.iter().any(|old| same_observer(old, new)))
        {
            fresh.subscribe(Rc::clone(&me));
        }
        tracing::trace!(
            key = %self.key,
            dependencies = next.len(),
            "getter dependencies collected"
        );
        Ok(value)
    }

    fn release(&self) {
        let dependencies = std::mem::take(&mut *self.dependencies.borrow_mut());
        if let Some(me) = self.as_subscriber() {
            for dependency in &dependencies {
                dependency.unsubscribe(&me);
            }
        }
    }
}

impl Observer for GetterObserver {
    fn get_value(&self) -> Value {
        if self.subscribers.is_empty() {
            self.evaluate_untracked()
        } else {
            self.current.borrow().clone()
        }
    }

    /// Runs the accessor's setter, if any; the change is observed through
    /// the dependencies the setter touches.
    fn set_value(&self, value: Value, _flags: LifecycleFlags) -> Result<()> {
        match self.object.upgrade() {
            Some(object) => object.assign(&self.key, value),
            None => Ok(()),
        }
    }

    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) {
        if !self.subscribers.add(subscriber) || self.subscribers.len() != 1 {
            return;
        }
        match self.collect() {
            Ok(value) => *self.current.borrow_mut() = value,
            Err(error) => {
                tracing::warn!(key = %self.key, %error, "getter dependency collection failed");
                *self.current.borrow_mut() = self.evaluate_untracked();
            }
        }
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
        if self.subscribers.remove(subscriber) && self.subscribers.is_empty() {
            self.release();
        }
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Subscriber for GetterObserver {
    fn handle_change(&self, _new: &Value, _old: &Value, flags: LifecycleFlags) -> Result<()> {
        if self.subscribers.is_empty() {
            return Ok(());
        }
        let new = if self.is_static {
            self.evaluate_untracked()
        } else {
            self.collect()?
        };
        let old = self.current.replace(new.clone());
        if new.same_value(&old) {
            return Ok(());
        }
        self.subscribers.notify(&new, &old, flags)
    }
}
