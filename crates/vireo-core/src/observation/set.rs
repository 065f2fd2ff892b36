#![forbid(unsafe_code)]

//! Set observation and the observable set mutators.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::length::SizedCollection;
use super::{CollectionSizeObserver, IndexMap, Observer, Subscriber, SubscriberList};
use crate::error::Result;
use crate::flags::LifecycleFlags;
use crate::queue::{FlushQueue, Flushable, QueueLinks};
use crate::value::{Key, SetRef, Value, WeakSetRef};

pub struct SetObserver {
    set: WeakSetRef,
    index_map: RefCell<IndexMap>,
    subscribers: SubscriberList,
    batched: SubscriberList,
    links: QueueLinks,
    flush_queue: Rc<dyn FlushQueue>,
    size: RefCell<Option<Rc<CollectionSizeObserver>>>,
    self_ref: Weak<SetObserver>,
}

impl SetObserver {
    pub(crate) fn attach(set: &SetRef, flush_queue: Rc<dyn FlushQueue>) -> Rc<Self> {
        if let Some(existing) = set.observer() {
            return existing;
        }
        let observer = Rc::new_cyclic(|me| Self {
            set: set.downgrade(),
            index_map: RefCell::new(IndexMap::identity(set.len())),
            subscribers: SubscriberList::new(),
            batched: SubscriberList::new(),
            links: QueueLinks::new(),
            flush_queue,
            size: RefCell::new(None),
            self_ref: me.clone(),
        });
        set.attach_observer(Rc::clone(&observer));
        observer
    }

    pub fn subscribe_batched(&self, subscriber: Rc<dyn Subscriber>) {
        self.batched.add(subscriber);
    }

    pub fn unsubscribe_batched(&self, subscriber: &Rc<dyn Subscriber>) {
        self.batched.remove(subscriber);
    }

    #[must_use]
    pub fn index_map(&self) -> IndexMap {
        self.index_map.borrow().clone()
    }

    pub fn size_observer(&self) -> Rc<CollectionSizeObserver> {
        let mut slot = self.size.borrow_mut();
        match &*slot {
            Some(existing) => Rc::clone(existing),
            None => {
                let size = self.set.upgrade().map_or(0, |s| s.len());
                let observer = Rc::new(CollectionSizeObserver::new(
                    SizedCollection::Set(self.set.clone()),
                    size,
                ));
                *slot = Some(Rc::clone(&observer));
                observer
            }
        }
    }

    fn changed(&self, flags: LifecycleFlags, change: impl FnOnce(&mut IndexMap)) -> Result<()> {
        change(&mut self.index_map.borrow_mut());
        if let Some(me) = self.self_ref.upgrade() {
            self.flush_queue.enqueue_flush(me);
        }
        let value = self.get_value();
        self.subscribers
            .notify(&value, &value, flags | LifecycleFlags::IS_COLLECTION_MUTATION)
    }
}

impl Flushable for SetObserver {
    fn queue_links(&self) -> &QueueLinks {
        &self.links
    }

    fn flush(&self, flags: LifecycleFlags) -> Result<()> {
        let size = self.set.upgrade().map_or(0, |s| s.len());
        let finalized =
            std::mem::replace(&mut *self.index_map.borrow_mut(), IndexMap::identity(size));
        self.batched.notify_batched(&finalized, flags)?;
        let observer = self.size.borrow().clone();
        if let Some(observer) = observer {
            observer.update(size, flags)?;
        }
        Ok(())
    }
}

impl Observer for SetObserver {
    fn get_value(&self) -> Value {
        self.set.upgrade().map_or(Value::Undefined, Value::Set)
    }

    fn set_value(&self, _value: Value, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) {
        self.subscribers.add(subscriber);
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) {
        self.subscribers.remove(subscriber);
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len() + self.batched.len()
    }
}

impl SetRef {
    fn after_mutation(
        &self,
        flags: LifecycleFlags,
        change: impl FnOnce(&mut IndexMap),
    ) -> Result<()> {
        match self.observer() {
            Some(observer) => observer.changed(flags, change),
            None => Ok(()),
        }
    }

    /// Add `item`; returns whether it was newly inserted.
    pub fn add(&self, item: Value, flags: LifecycleFlags) -> Result<bool> {
        let (at, inserted) = self.0.items.borrow_mut().insert_full(Key::new(item));
        if inserted {
            self.after_mutation(flags, |map| map.insert_new(at, 1))?;
        }
        Ok(inserted)
    }

    /// Remove `item`; returns whether it was present.
    pub fn delete(&self, item: &Value, flags: LifecycleFlags) -> Result<bool> {
        let removed = self
            .0
            .items
            .borrow_mut()
            .shift_remove_full(&Key::new(item.clone()));
        match removed {
            Some((position, key)) => {
                self.after_mutation(flags, |map| map.remove(position, key.into_value()))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn clear(&self, flags: LifecycleFlags) -> Result<()> {
        let values: Vec<Value> = {
            let mut items = self.0.items.borrow_mut();
            if items.is_empty() {
                return Ok(());
            }
            items.drain(..).map(Key::into_value).collect()
        };
        self.after_mutation(flags, |map| map.clear(values))
    }
}
