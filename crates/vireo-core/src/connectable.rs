#![forbid(unsafe_code)]

//! Version-stamped observer slots for incremental dependency tracking.
//!
//! # Design
//!
//! A connectable (usually a binding) owns one [`ObserverSlots`]. Each connect
//! pass starts with [`ObserverSlots::begin_pass`], which bumps the version.
//! Every observer the pass touches is (re)stamped with the new version;
//! observers already present are not subscribed again. After the pass,
//! `unobserve(false)` drops the slots still carrying an older version, so a
//! binding whose expression switched from reading `{x, y}` to `{y, z}` ends up
//! subscribed to exactly `y` and `z`, with `y` never unsubscribed in between.
//!
//! # Invariants
//!
//! 1. After a pass and `unobserve(false)`, every occupied slot carries the
//!    current version and is a live subscription.
//! 2. An observer occupies at most one slot.
//! 3. Repeating a pass over unchanged state subscribes and unsubscribes
//!    nothing.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::Result;
use crate::flags::LifecycleFlags;
use crate::observation::{Observer, ObserverLocator, Subscriber, same_observer};
use crate::value::Value;

struct Slot {
    observer: Rc<dyn Observer>,
    version: u32,
}

#[derive(Default)]
pub struct ObserverSlots {
    version: Cell<u32>,
    slots: RefCell<SmallVec<[Option<Slot>; 4]>>,
}

impl ObserverSlots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version.get()
    }

    /// Start a connect pass.
    pub fn begin_pass(&self) {
        self.version.set(self.version.get().wrapping_add(1));
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.slots.borrow().iter().flatten().count()
    }

    /// Whether `observer` occupies a slot.
    #[must_use]
    pub fn contains(&self, observer: &Rc<dyn Observer>) -> bool {
        self.slots
            .borrow()
            .iter()
            .flatten()
            .any(|slot| same_observer(&slot.observer, observer))
    }

    /// Stamp `observer` with the current version, subscribing `subscriber`
    /// only if the observer is not already held.
    pub fn add_observer(&self, observer: Rc<dyn Observer>, subscriber: &Rc<dyn Subscriber>) {
        let version = self.version.get();
        let mut slots = self.slots.borrow_mut();
        if let Some(slot) = slots
            .iter_mut()
            .flatten()
            .find(|slot| same_observer(&slot.observer, &observer))
        {
            slot.version = version;
            return;
        }
        observer.subscribe(Rc::clone(subscriber));
        let slot = Slot { observer, version };
        match slots.iter_mut().find(|s| s.is_none()) {
            Some(free) => *free = Some(slot),
            None => slots.push(Some(slot)),
        }
    }

    /// Unsubscribe from every observer (`all`), or only from the observers
    /// not touched by the current pass.
    pub fn unobserve(&self, all: bool, subscriber: &Rc<dyn Subscriber>) {
        let version = self.version.get();
        let mut released: SmallVec<[Rc<dyn Observer>; 4]> = SmallVec::new();
        for entry in self.slots.borrow_mut().iter_mut() {
            let stale = matches!(&*entry, Some(slot) if all || slot.version != version);
            if stale {
                if let Some(slot) = entry.take() {
                    released.push(slot.observer);
                }
            }
        }
        for observer in released {
            observer.unsubscribe(subscriber);
        }
    }
}

impl std::fmt::Debug for ObserverSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSlots")
            .field("version", &self.version.get())
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Something that registers the observers its expression reads.
///
/// Implementors provide the locator, their slots and a handle to themselves
/// as a subscriber; the registration helpers are provided.
pub trait Connectable {
    fn observer_locator(&self) -> &ObserverLocator;

    fn observer_slots(&self) -> &ObserverSlots;

    /// The subscriber registered with every observed observer.
    fn as_subscriber(&self) -> Rc<dyn Subscriber>;

    /// Observe `target.key`. Reads on primitives are not observed.
    fn observe_property(&self, flags: LifecycleFlags, target: &Value, key: &str) -> Result<()> {
        if !target.is_reference() {
            return Ok(());
        }
        let observer = self.observer_locator().get_observer(flags, target, key)?;
        self.add_observer(observer);
        Ok(())
    }

    /// Observe the contents of an array, map or set.
    fn observe_collection(&self, _flags: LifecycleFlags, target: &Value) -> Result<()> {
        if let Some(observer) = self.observer_locator().collection_observer(target) {
            self.add_observer(observer);
        }
        Ok(())
    }

    fn add_observer(&self, observer: Rc<dyn Observer>) {
        self.observer_slots()
            .add_observer(observer, &self.as_subscriber());
    }

    fn unobserve(&self, all: bool) {
        self.observer_slots().unobserve(all, &self.as_subscriber());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ManualFlushQueue;
    use crate::value::ObjectRef;

    struct Watcher {
        locator: ObserverLocator,
        slots: ObserverSlots,
        me: std::rc::Weak<Watcher>,
    }

    impl Subscriber for Watcher {
        fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) -> Result<()> {
            Ok(())
        }
    }

    impl Connectable for Watcher {
        fn observer_locator(&self) -> &ObserverLocator {
            &self.locator
        }

        fn observer_slots(&self) -> &ObserverSlots {
            &self.slots
        }

        fn as_subscriber(&self) -> Rc<dyn Subscriber> {
            self.me.upgrade().expect("watcher alive")
        }
    }

    fn watcher() -> Rc<Watcher> {
        Rc::new_cyclic(|me| Watcher {
            locator: ObserverLocator::new(Rc::new(ManualFlushQueue::new())),
            slots: ObserverSlots::new(),
            me: me.clone(),
        })
    }

    fn count(obj: &ObjectRef, key: &str) -> usize {
        obj.cached_observer(key).map_or(0, |o| o.subscriber_count())
    }

    #[test]
    fn incremental_pass_prunes_stale_observers() {
        let watcher = watcher();
        let obj = ObjectRef::from_pairs([
            ("x", Value::from(1)),
            ("y", Value::from(2)),
            ("z", Value::from(3)),
        ]);
        let target = Value::Object(obj.clone());
        let flags = LifecycleFlags::empty();

        watcher.slots.begin_pass();
        watcher.observe_property(flags, &target, "x").unwrap();
        watcher.observe_property(flags, &target, "y").unwrap();
        watcher.unobserve(false);

        watcher.slots.begin_pass();
        watcher.observe_property(flags, &target, "y").unwrap();
        watcher.observe_property(flags, &target, "z").unwrap();
        watcher.unobserve(false);

        assert_eq!((count(&obj, "x"), count(&obj, "y"), count(&obj, "z")), (0, 1, 1));
        assert_eq!(watcher.slots.observer_count(), 2);

        watcher.unobserve(true);
        assert_eq!(watcher.slots.observer_count(), 0);
        assert_eq!(count(&obj, "y"), 0);
    }

    #[test]
    fn slots_grow_past_inline_capacity_and_reuse_holes() {
        let watcher = watcher();
        let keys = ["a", "b", "c", "d", "e", "f"];
        let obj = ObjectRef::from_pairs(keys.iter().map(|k| (*k, Value::Null)));
        let target = Value::Object(obj.clone());
        watcher.slots.begin_pass();
        for key in keys {
            watcher.observe_property(LifecycleFlags::empty(), &target, key).unwrap();
        }
        assert_eq!(watcher.slots.observer_count(), 6);

        watcher.slots.begin_pass();
        watcher.observe_property(LifecycleFlags::empty(), &target, "f").unwrap();
        watcher.unobserve(false);
        watcher.observe_property(LifecycleFlags::empty(), &target, "a").unwrap();
        assert_eq!(watcher.slots.observer_count(), 2);
        assert!(keys.iter().all(|k| count(&obj, k) <= 1));
    }

    #[test]
    fn primitives_are_not_observed() {
        let watcher = watcher();
        watcher.slots.begin_pass();
        watcher
            .observe_property(LifecycleFlags::empty(), &Value::from("abc"), "length")
            .unwrap();
        assert_eq!(watcher.slots.observer_count(), 0);
    }
}
