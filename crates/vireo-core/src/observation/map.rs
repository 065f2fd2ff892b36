#![forbid(unsafe_code)]

//! Map observation and the observable map mutators.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::length::SizedCollection;
use super::{CollectionSizeObserver, IndexMap, Observer, Subscriber, SubscriberList};
use crate::error::Result;
use crate::flags::LifecycleFlags;
use crate::queue::{FlushQueue, Flushable, QueueLinks};
use crate::value::{Key, MapRef, Value, WeakMapRef};

/// Observer attached to one map. Index-map positions are entry positions in
/// insertion order.
pub struct MapObserver {
    map: WeakMapRef,
    index_map: RefCell<IndexMap>,
    subscribers: SubscriberList,
    batched: SubscriberList,
    links: QueueLinks,
    flush_queue: Rc<dyn FlushQueue>,
    size: RefCell<Option<Rc<CollectionSizeObserver>>>,
    self_ref: Weak<MapObserver>,
}

impl MapObserver {
    pub(crate) fn attach(map: &MapRef, flush_queue: Rc<dyn FlushQueue>) -> Rc<Self> {
        if let Some(existing) = map.observer() {
            return existing;
        }
        let observer = Rc::new_cyclic(|me| Self {
            map: map.downgrade(),
            index_map: RefCell::new(IndexMap::identity(map.len())),
            subscribers: SubscriberList::new(),
            batched: SubscriberList::new(),
            links: QueueLinks::new(),
            flush_queue,
            size: RefCell::new(None),
            self_ref: me.clone(),
        });
        map.attach_observer(Rc::clone(&observer));
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
                let size = self.map.upgrade().map_or(0, |m| m.len());
                let observer = Rc::new(CollectionSizeObserver::new(
                    SizedCollection::Map(self.map.clone()),
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

impl Flushable for MapObserver {
    fn queue_links(&self) -> &QueueLinks {
        &self.links
    }

    fn flush(&self, flags: LifecycleFlags) -> Result<()> {
        let size = self.map.upgrade().map_or(0, |m| m.len());
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

impl Observer for MapObserver {
    fn get_value(&self) -> Value {
        self.map.upgrade().map_or(Value::Undefined, Value::Map)
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

impl MapRef {
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

    /// Insert or replace `key`. Replacing with a SameValue-equal value is a
    /// no-op.
    pub fn set(&self, key: Value, value: Value, flags: LifecycleFlags) -> Result<()> {
        let replaced = {
            let mut entries = self.0.entries.borrow_mut();
            let key = Key::new(key);
            match entries.get_full_mut(&key) {
                Some((_, _, slot)) if slot.same_value(&value) => return Ok(()),
                Some((position, _, slot)) => Some((position, std::mem::replace(slot, value))),
                None => {
                    entries.insert(key, value);
                    None
                }
            }
        };
        match replaced {
            Some((position, old)) => self.after_mutation(flags, |map| map.replace(position, old)),
            None => {
                let at = self.len() - 1;
                self.after_mutation(flags, |map| map.insert_new(at, 1))
            }
        }
    }

    /// Remove `key`; returns whether it was present.
    pub fn delete(&self, key: &Value, flags: LifecycleFlags) -> Result<bool> {
        let removed = self
            .0
            .entries
            .borrow_mut()
            .shift_remove_full(&Key::new(key.clone()));
        match removed {
            Some((position, _, value)) => {
                self.after_mutation(flags, |map| map.remove(position, value))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn clear(&self, flags: LifecycleFlags) -> Result<()> {
        let values: Vec<Value> = {
            let mut entries = self.0.entries.borrow_mut();
            if entries.is_empty() {
                return Ok(());
            }
            entries.drain(..).map(|(_, v)| v).collect()
        };
        self.after_mutation(flags, |map| map.clear(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::NEW_ITEM;
    use crate::queue::ManualFlushQueue;

    #[test]
    fn set_delete_clear_track_positions() {
        let queue = Rc::new(ManualFlushQueue::new());
        let map = MapRef::from_entries([("a".into(), 1.into()), ("b".into(), 2.into())]);
        let observer = MapObserver::attach(&map, queue.clone());
        let size = observer.size_observer();

        map.set("c".into(), 3.into(), LifecycleFlags::empty()).unwrap();
        map.set("a".into(), 10.into(), LifecycleFlags::empty()).unwrap();
        assert_eq!(observer.index_map().indices, [NEW_ITEM, 1, NEW_ITEM]);
        assert!(map.delete(&"b".into(), LifecycleFlags::empty()).unwrap());
        assert!(!map.delete(&"zz".into(), LifecycleFlags::empty()).unwrap());
        let pending = observer.index_map();
        assert_eq!(pending.indices, [NEW_ITEM, NEW_ITEM]);
        assert_eq!(pending.deleted.len(), 2);

        queue.flush_all(LifecycleFlags::empty()).unwrap();
        assert_eq!(size.get_value(), Value::from(2));
        map.clear(LifecycleFlags::empty()).unwrap();
        assert_eq!(observer.index_map().deleted.len(), 2);
    }

    #[test]
    fn same_value_write_is_ignored() {
        let queue = Rc::new(ManualFlushQueue::new());
        let map = MapRef::from_entries([("a".into(), 1.into())]);
        let _observer = MapObserver::attach(&map, queue.clone());
        map.set("a".into(), 1.into(), LifecycleFlags::empty()).unwrap();
        assert!(queue.is_empty());
    }
}
