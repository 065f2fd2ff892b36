#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use super::{IndexMap, Subscriber, same_subscriber};
use crate::error::Result;
use crate::flags::LifecycleFlags;
use crate::value::Value;

type Slots = SmallVec<[Rc<dyn Subscriber>; 3]>;

/// Ordered subscriber set with three inline slots.
#[derive(Default)]
pub struct SubscriberList {
    subscribers: RefCell<Slots>,
}

impl SubscriberList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `subscriber`; returns `false` if it was already present.
    pub fn add(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        let mut subs = self.subscribers.borrow_mut();
        if subs.iter().any(|s| same_subscriber(s, &subscriber)) {
            return false;
        }
        subs.push(subscriber);
        true
    }

    /// Remove `subscriber`; returns `false` if it was not present.
    pub fn remove(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let mut subs = self.subscribers.borrow_mut();
        match subs.iter().position(|s| same_subscriber(s, subscriber)) {
            Some(index) => {
                subs.remove(index);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    #[must_use]
    pub fn contains(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.subscribers
            .borrow()
            .iter()
            .any(|s| same_subscriber(s, subscriber))
    }

    fn snapshot(&self) -> Slots {
        self.subscribers.borrow().clone()
    }

    /// Deliver a change to every subscriber present when the call started.
    /// The first error stops delivery and is returned.
    pub fn notify(
        &self,
        new_value: &Value,
        old_value: &Value,
        flags: LifecycleFlags,
    ) -> Result<()> {
        for subscriber in self.snapshot() {
            subscriber.handle_change(new_value, old_value, flags)?;
        }
        Ok(())
    }

    pub fn notify_batched(&self, index_map: &IndexMap, flags: LifecycleFlags) -> Result<()> {
        for subscriber in self.snapshot() {
            subscriber.handle_batched_change(index_map, flags)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SubscriberList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberList")
            .field("len", &self.len())
            .finish()
    }
}
