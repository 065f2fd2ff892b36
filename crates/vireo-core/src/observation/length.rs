#![forbid(unsafe_code)]

use std::cell::Cell;
use std::rc::Rc;

use super::{Observer, Subscriber, SubscriberList};
use crate::error::Result;
use crate::flags::LifecycleFlags;
use crate::value::{Value, WeakArrayRef, WeakMapRef, WeakSetRef, number_to_index};

/// Observer for an array's `length`, updated when the array observer flushes.
pub struct CollectionLengthObserver {
    array: WeakArrayRef,
    current: Cell<usize>,
    subscribers: SubscriberList,
}

impl CollectionLengthObserver {
    pub(crate) fn new(array: WeakArrayRef, len: usize) -> Self {
        Self {
            array,
            current: Cell::new(len),
            subscribers: SubscriberList::new(),
        }
    }

    pub(crate) fn update(&self, len: usize, flags: LifecycleFlags) -> Result<()> {
        let old = self.current.replace(len);
        if old == len {
            return Ok(());
        }
        self.subscribers
            .notify(&Value::from(len), &Value::from(old), flags)
    }
}

impl Observer for CollectionLengthObserver {
    fn get_value(&self) -> Value {
        Value::from(self.current.get())
    }

    /// Truncates or pads the array; subscribers hear about it on flush.
    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<()> {
        let (Some(array), Some(len)) = (self.array.upgrade(), number_to_index(value.to_number()))
        else {
            return Ok(());
        };
        array.set_length(len, flags)
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
}

#[derive(Clone)]
pub(crate) enum SizedCollection {
    Map(WeakMapRef),
    Set(WeakSetRef),
}

/// Observer for a map's or set's `size`.
pub struct CollectionSizeObserver {
    collection: SizedCollection,
    current: Cell<usize>,
    subscribers: SubscriberList,
}

impl CollectionSizeObserver {
    pub(crate) fn new(collection: SizedCollection, size: usize) -> Self {
        Self {
            collection,
            current: Cell::new(size),
            subscribers: SubscriberList::new(),
        }
    }

    pub(crate) fn update(&self, size: usize, flags: LifecycleFlags) -> Result<()> {
        let old = self.current.replace(size);
        if old == size {
            return Ok(());
        }
        self.subscribers
            .notify(&Value::from(size), &Value::from(old), flags)
    }

    fn live_size(&self) -> Option<usize> {
        match &self.collection {
            SizedCollection::Map(m) => m.upgrade().map(|m| m.len()),
            SizedCollection::Set(s) => s.upgrade().map(|s| s.len()),
        }
    }
}

impl Observer for CollectionSizeObserver {
    fn get_value(&self) -> Value {
        Value::from(self.current.get())
    }

    /// `size` is read-only.
    fn set_value(&self, _value: Value, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) {
        if self.subscribers.is_empty() {
            if let Some(size) = self.live_size() {
                self.current.set(size);
            }
        }
        self.subscribers.add(subscriber);
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
        self.subscribers.remove(subscriber);
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
