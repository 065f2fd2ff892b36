#![forbid(unsafe_code)]

//! Named signals that force bindings to re-evaluate.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;
use vireo_core::observation::same_subscriber;
use vireo_core::{LifecycleFlags, Result, Subscriber, Value};
use vireo_expr::Signaler;

/// Signal name to listeners.
#[derive(Default)]
pub struct SignalDispatcher {
    listeners: RefCell<FxHashMap<Rc<str>, Vec<Rc<dyn Subscriber>>>>,
}

impl SignalDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notify every listener of `name` with `UPDATE_TARGET_INSTANCE`.
    /// Returns how many listeners were notified.
    pub fn dispatch_signal(&self, name: &str, flags: LifecycleFlags) -> Result<usize> {
        let listeners: SmallVec<[Rc<dyn Subscriber>; 4]> = {
            let map = self.listeners.borrow();
            match map.get(name) {
                Some(list) => list.iter().cloned().collect(),
                None => return Ok(0),
            }
        };
        trace!(signal = name, listeners = listeners.len(), "dispatch signal");
        let flags = flags | LifecycleFlags::UPDATE_TARGET_INSTANCE;
        for listener in &listeners {
            listener.handle_change(&Value::Undefined, &Value::Undefined, flags)?;
        }
        Ok(listeners.len())
    }

    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.borrow().get(name).map_or(0, Vec::len)
    }
}

impl Signaler for SignalDispatcher {
    fn add_signal_listener(&self, name: &str, listener: Rc<dyn Subscriber>) {
        let mut listeners = self.listeners.borrow_mut();
        let list = listeners.entry(Rc::from(name)).or_default();
        if !list.iter().any(|l| same_subscriber(l, &listener)) {
            list.push(listener);
        }
    }

    fn remove_signal_listener(&self, name: &str, listener: &Rc<dyn Subscriber>) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(list) = listeners.get_mut(name) {
            list.retain(|l| !same_subscriber(l, listener));
            if list.is_empty() {
                listeners.remove(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter(Cell<u32>);

    impl Subscriber for Counter {
        fn handle_change(&self, _: &Value, _: &Value, flags: LifecycleFlags) -> Result<()> {
            assert!(flags.contains(LifecycleFlags::UPDATE_TARGET_INSTANCE));
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn listeners_are_deduplicated_and_removable() {
        let signaler = SignalDispatcher::new();
        let counter = Rc::new(Counter(Cell::new(0)));
        let listener: Rc<dyn Subscriber> = counter.clone();
        signaler.add_signal_listener("locale", Rc::clone(&listener));
        signaler.add_signal_listener("locale", Rc::clone(&listener));
        assert_eq!(signaler.listener_count("locale"), 1);
        assert_eq!(signaler.dispatch_signal("locale", LifecycleFlags::empty()).unwrap(), 1);
        assert_eq!(counter.0.get(), 1);

        signaler.remove_signal_listener("locale", &listener);
        assert_eq!(signaler.listener_count("locale"), 0);
        assert_eq!(signaler.dispatch_signal("locale", LifecycleFlags::empty()).unwrap(), 0);
        assert_eq!(signaler.dispatch_signal("unknown", LifecycleFlags::empty()).unwrap(), 0);
    }
}
