#![forbid(unsafe_code)]

//! Polling fallback for properties that cannot be intercepted.
//!
//! # Design
//!
//! A [`DirtyCheckProperty`] remembers the last value it reported. While it has
//! subscribers it sits in its [`DirtyChecker`]'s poll set. The checker has no
//! timer of its own: the host drives it with [`DirtyChecker::advance`] (or
//! [`DirtyChecker::poll`], which measures wall time), and once the accumulated
//! time passes the interval every tracked property is compared with its
//! remembered value.
//!
//! # Invariants
//!
//! 1. A property is in the poll set exactly while it has subscribers.
//! 2. A check notifies a property's subscribers at most once.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use web_time::Instant;

use super::{Observer, Subscriber, SubscriberList};
use crate::error::{Error, Result};
use crate::flags::LifecycleFlags;
use crate::value::{ObjectRef, Value, WeakObjectRef};

/// Default polling interval.
pub const DEFAULT_DIRTY_CHECK_INTERVAL: Duration = Duration::from_millis(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyCheckerConfig {
    pub interval: Duration,
    /// Refuse to create dirty-checked observers.
    pub disabled: bool,
    /// Log a warning every time a property falls back to dirty checking.
    pub warn: bool,
}

impl Default for DirtyCheckerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_DIRTY_CHECK_INTERVAL,
            disabled: false,
            warn: false,
        }
    }
}

struct CheckerInner {
    config: DirtyCheckerConfig,
    tracked: RefCell<Vec<Rc<DirtyCheckProperty>>>,
    elapsed: Cell<Duration>,
    last_poll: Cell<Option<Instant>>,
}

/// Shared poll set. Cloning yields another handle to the same checker.
#[derive(Clone)]
pub struct DirtyChecker {
    inner: Rc<CheckerInner>,
}

impl Default for DirtyChecker {
    fn default() -> Self {
        Self::new(DirtyCheckerConfig::default())
    }
}

impl DirtyChecker {
    #[must_use]
    pub fn new(config: DirtyCheckerConfig) -> Self {
        Self {
            inner: Rc::new(CheckerInner {
                config,
                tracked: RefCell::new(Vec::new()),
                elapsed: Cell::new(Duration::ZERO),
                last_poll: Cell::new(None),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> DirtyCheckerConfig {
        self.inner.config
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &DirtyChecker) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of properties currently polled.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.inner.tracked.borrow().len()
    }

    pub(crate) fn create_property(
        &self,
        object: &ObjectRef,
        key: &str,
    ) -> Result<Rc<DirtyCheckProperty>> {
        let config = self.inner.config;
        if config.disabled {
            return Err(Error::DirtyCheckDisabled {
                property: key.to_string(),
            });
        }
        if config.warn {
            tracing::warn!(property = key, "property cannot be intercepted; using dirty checking");
        }
        let checker = Rc::downgrade(&self.inner);
        Ok(Rc::new_cyclic(|me| DirtyCheckProperty {
            object: object.downgrade(),
            key: Rc::from(key),
            last_value: RefCell::new(object.get(key)),
            subscribers: SubscriberList::new(),
            checker,
            self_ref: me.clone(),
        }))
    }

    /// Account for `elapsed` time; checks all properties once the interval
    /// has passed. Returns how many properties changed.
    pub fn advance(&self, elapsed: Duration) -> Result<usize> {
        let total = self.inner.elapsed.get() + elapsed;
        if total < self.inner.config.interval {
            self.inner.elapsed.set(total);
            return Ok(0);
        }
        self.inner.elapsed.set(Duration::ZERO);
        self.check()
    }

    /// [`advance`](Self::advance) by the wall time since the previous poll.
    pub fn poll(&self) -> Result<usize> {
        let now = Instant::now();
        let elapsed = self
            .inner
            .last_poll
            .replace(Some(now))
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.advance(elapsed)
    }

    /// Compare every tracked property now.
    pub fn check(&self) -> Result<usize> {
        let snapshot = self.inner.tracked.borrow().clone();
        let mut changed = 0;
        for property in snapshot {
            if property.check(LifecycleFlags::empty())? {
                changed += 1;
            }
        }
        if changed > 0 {
            tracing::trace!(changed, "dirty check");
        }
        Ok(changed)
    }
}

impl CheckerInner {
    fn add(&self, property: Rc<DirtyCheckProperty>) {
        let mut tracked = self.tracked.borrow_mut();
        if !tracked.iter().any(|p| Rc::ptr_eq(p, &property)) {
            tracked.push(property);
        }
    }

    fn remove(&self, property: &DirtyCheckProperty) {
        self.tracked
            .borrow_mut()
            .retain(|p| !std::ptr::eq(Rc::as_ptr(p), property));
    }
}

/// A property observed by polling.
pub struct DirtyCheckProperty {
    object: WeakObjectRef,
    key: Rc<str>,
    last_value: RefCell<Value>,
    subscribers: SubscriberList,
    checker: Weak<CheckerInner>,
    self_ref: Weak<DirtyCheckProperty>,
}

impl DirtyCheckProperty {
    fn current(&self) -> Value {
        self.object
            .upgrade()
            .map_or(Value::Undefined, |o| o.get(&self.key))
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.current().same_value(&self.last_value.borrow())
    }

    /// Notify subscribers if the value moved since the last check.
    pub fn check(&self, flags: LifecycleFlags) -> Result<bool> {
        let new = self.current();
        if new.same_value(&self.last_value.borrow()) {
            return Ok(false);
        }
        let old = self.last_value.replace(new.clone());
        self.subscribers.notify(&new, &old, flags)?;
        Ok(true)
    }
}

impl Observer for DirtyCheckProperty {
    fn get_value(&self) -> Value {
        self.current()
    }

    fn set_value(&self, value: Value, _flags: LifecycleFlags) -> Result<()> {
        match self.object.upgrade() {
            Some(object) => object.assign(&self.key, value),
            None => Ok(()),
        }
    }

    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) {
        if self.subscribers.add(subscriber) && self.subscribers.len() == 1 {
            *self.last_value.borrow_mut() = self.current();
            if let (Some(checker), Some(me)) = (self.checker.upgrade(), self.self_ref.upgrade()) {
                checker.add(me);
            }
        }
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
        if self.subscribers.remove(subscriber) && self.subscribers.is_empty() {
            if let Some(checker) = self.checker.upgrade() {
                checker.remove(self);
            }
        }
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Count(Cell<u32>);

    impl Subscriber for Count {
        fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) -> Result<()> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn polls_after_interval_and_leaves_with_last_subscriber() {
        let checker = DirtyChecker::default();
        let obj = ObjectRef::new();
        obj.insert_frozen("v", Value::from(1));
        let property = checker.create_property(&obj, "v").unwrap();
        let count = Rc::new(Count(Cell::new(0)));
        let subscriber: Rc<dyn Subscriber> = count.clone();
        property.subscribe(subscriber.clone());
        assert_eq!(checker.tracked_count(), 1);

        obj.assign("v", Value::from(2)).unwrap();
        assert_eq!(checker.advance(Duration::from_millis(100)).unwrap(), 0);
        assert_eq!(count.0.get(), 0);
        assert_eq!(checker.advance(Duration::from_millis(20)).unwrap(), 1);
        assert_eq!(count.0.get(), 1);
        assert_eq!(checker.check().unwrap(), 0);

        property.unsubscribe(&subscriber);
        assert_eq!(checker.tracked_count(), 0);
    }

    #[test]
    fn disabled_checker_refuses() {
        let checker = DirtyChecker::new(DirtyCheckerConfig {
            disabled: true,
            ..DirtyCheckerConfig::default()
        });
        let obj = ObjectRef::new();
        let err = checker.create_property(&obj, "frozen").err().unwrap();
        assert!(matches!(err, Error::DirtyCheckDisabled { .. }));
    }
}
