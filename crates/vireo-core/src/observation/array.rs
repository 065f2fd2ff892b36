#![forbid(unsafe_code)]

//! Array observation and the observable array mutators.
//!
//! Every mutator on [`ArrayRef`] applies the change to the storage, then, if
//! an [`ArrayObserver`] is attached, updates the observer's index map in
//! lockstep and notifies. Arrays without an observer pay for a single
//! `Option` check.
//!
//! # Invariants
//!
//! 1. `index_map.len()` equals the array length between mutations.
//! 2. The observer enqueues itself on the flush queue at most once per batch.
//! 3. A flush delivers the finalized map to batched subscribers, then resets
//!    the map to the identity of the current length.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::{Rc, Weak};

use super::{CollectionLengthObserver, IndexMap, Observer, Subscriber, SubscriberList};
use crate::error::Result;
use crate::flags::LifecycleFlags;
use crate::queue::{FlushQueue, Flushable, QueueLinks};
use crate::value::{ArrayRef, Value, WeakArrayRef};

/// Below this length sort falls back to insertion sort.
const INSERTION_SORT_THRESHOLD: usize = 10;

pub struct ArrayObserver {
    array: WeakArrayRef,
    index_map: RefCell<IndexMap>,
    subscribers: SubscriberList,
    batched: SubscriberList,
    links: QueueLinks,
    flush_queue: Rc<dyn FlushQueue>,
    length: RefCell<Option<Rc<CollectionLengthObserver>>>,
    self_ref: Weak<ArrayObserver>,
}

impl ArrayObserver {
    /// Attach an observer to `array`, or return the one already attached.
    pub(crate) fn attach(array: &ArrayRef, flush_queue: Rc<dyn FlushQueue>) -> Rc<Self> {
        if let Some(existing) = array.observer() {
            return existing;
        }
        let observer = Rc::new_cyclic(|me| Self {
            array: array.downgrade(),
            index_map: RefCell::new(IndexMap::identity(array.len())),
            subscribers: SubscriberList::new(),
            batched: SubscriberList::new(),
            links: QueueLinks::new(),
            flush_queue,
            length: RefCell::new(None),
            self_ref: me.clone(),
        });
        array.attach_observer(Rc::clone(&observer));
        tracing::trace!(array = array.id(), "array observer attached");
        observer
    }

    /// Subscribe to finalized index maps, delivered on flush.
    pub fn subscribe_batched(&self, subscriber: Rc<dyn Subscriber>) {
        self.batched.add(subscriber);
    }

    pub fn unsubscribe_batched(&self, subscriber: &Rc<dyn Subscriber>) {
        self.batched.remove(subscriber);
    }

    /// Snapshot of the pending (not yet flushed) index map.
    #[must_use]
    pub fn index_map(&self) -> IndexMap {
        self.index_map.borrow().clone()
    }

    /// The observer for this array's `length`, created on first request.
    pub fn length_observer(&self) -> Rc<CollectionLengthObserver> {
        let mut slot = self.length.borrow_mut();
        match &*slot {
            Some(existing) => Rc::clone(existing),
            None => {
                let len = self.array.upgrade().map_or(0, |a| a.len());
                let observer = Rc::new(CollectionLengthObserver::new(self.array.clone(), len));
                *slot = Some(Rc::clone(&observer));
                observer
            }
        }
    }

    fn record(&self, change: impl FnOnce(&mut IndexMap)) {
        change(&mut self.index_map.borrow_mut());
    }

    fn notify(&self, flags: LifecycleFlags) -> Result<()> {
        if let Some(me) = self.self_ref.upgrade() {
            self.flush_queue.enqueue_flush(me);
        }
        let value = self.get_value();
        self.subscribers
            .notify(&value, &value, flags | LifecycleFlags::IS_COLLECTION_MUTATION)
    }
}

impl Flushable for ArrayObserver {
    fn queue_links(&self) -> &QueueLinks {
        &self.links
    }

    fn flush(&self, flags: LifecycleFlags) -> Result<()> {
        let len = self.array.upgrade().map_or(0, |a| a.len());
        let finalized =
            std::mem::replace(&mut *self.index_map.borrow_mut(), IndexMap::identity(len));
        tracing::trace!(
            len,
            deleted = finalized.deleted.len(),
            "array observer flush"
        );
        self.batched.notify_batched(&finalized, flags)?;
        let length = self.length.borrow().clone();
        if let Some(length) = length {
            length.update(len, flags)?;
        }
        Ok(())
    }
}

impl Observer for ArrayObserver {
    fn get_value(&self) -> Value {
        self.array.upgrade().map_or(Value::Undefined, Value::Array)
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

impl std::fmt::Debug for ArrayObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayObserver")
            .field("index_map", &*self.index_map.borrow())
            .field("subscribers", &self.subscribers.len())
            .field("batched", &self.batched.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Mutators
// ---------------------------------------------------------------------------

/// Resolve a possibly negative start position against `len`.
fn relative_index(start: isize, len: usize) -> usize {
    if start < 0 {
        len.saturating_sub(start.unsigned_abs())
    } else {
        start.unsigned_abs().min(len)
    }
}

impl ArrayRef {
    fn after_mutation(
        &self,
        flags: LifecycleFlags,
        change: impl FnOnce(&mut IndexMap),
    ) -> Result<()> {
        match self.observer() {
            Some(observer) => {
                observer.record(change);
                observer.notify(flags)
            }
            None => Ok(()),
        }
    }

    /// Append items; returns the new length.
    pub fn push(
        &self,
        items: impl IntoIterator<Item = Value>,
        flags: LifecycleFlags,
    ) -> Result<usize> {
        let (at, len) = {
            let mut storage = self.0.items.borrow_mut();
            let at = storage.len();
            storage.extend(items);
            (at, storage.len())
        };
        if len > at {
            self.after_mutation(flags, |map| map.insert_new(at, len - at))?;
        }
        Ok(len)
    }

    /// Remove and return the last item.
    pub fn pop(&self, flags: LifecycleFlags) -> Result<Value> {
        let popped = self.0.items.borrow_mut().pop();
        match popped {
            Some(value) => {
                let at = self.len();
                let removed = value.clone();
                self.after_mutation(flags, move |map| map.remove(at, removed))?;
                Ok(value)
            }
            None => Ok(Value::Undefined),
        }
    }

    /// Remove and return the first item.
    pub fn shift(&self, flags: LifecycleFlags) -> Result<Value> {
        let shifted = {
            let mut storage = self.0.items.borrow_mut();
            (!storage.is_empty()).then(|| storage.remove(0))
        };
        match shifted {
            Some(value) => {
                let removed = value.clone();
                self.after_mutation(flags, move |map| map.remove(0, removed))?;
                Ok(value)
            }
            None => Ok(Value::Undefined),
        }
    }

    /// Prepend items; returns the new length.
    pub fn unshift(&self, items: Vec<Value>, flags: LifecycleFlags) -> Result<usize> {
        let count = items.len();
        let len = {
            let mut storage = self.0.items.borrow_mut();
            storage.splice(0..0, items);
            storage.len()
        };
        if count > 0 {
            self.after_mutation(flags, |map| map.insert_new(0, count))?;
        }
        Ok(len)
    }

    /// Remove `delete_count` items at `start` (all remaining when `None`) and
    /// insert `items` in their place. Returns the removed items.
    pub fn splice(
        &self,
        start: isize,
        delete_count: Option<usize>,
        items: Vec<Value>,
        flags: LifecycleFlags,
    ) -> Result<Vec<Value>> {
        let inserted = items.len();
        let (at, removed) = {
            let mut storage = self.0.items.borrow_mut();
            let len = storage.len();
            let at = relative_index(start, len);
            let count = delete_count.unwrap_or(len - at).min(len - at);
            let removed: Vec<Value> = storage.splice(at..at + count, items).collect();
            (at, removed)
        };
        if !removed.is_empty() || inserted > 0 {
            let deleted = removed.clone();
            self.after_mutation(flags, move |map| {
                for value in deleted {
                    map.remove(at, value);
                }
                map.insert_new(at, inserted);
            })?;
        }
        Ok(removed)
    }

    pub fn reverse(&self, flags: LifecycleFlags) -> Result<()> {
        self.0.items.borrow_mut().reverse();
        self.after_mutation(flags, |map| map.indices.reverse())
    }

    /// `items[index] = value`. Writing past the end pads with `undefined`.
    pub fn set_index(&self, index: usize, value: Value, flags: LifecycleFlags) -> Result<()> {
        enum Write {
            Unchanged,
            Replaced(Value),
            Appended { at: usize, count: usize },
        }
        let write = {
            let mut storage = self.0.items.borrow_mut();
            let len = storage.len();
            if index < len {
                if storage[index].same_value(&value) {
                    Write::Unchanged
                } else {
                    Write::Replaced(std::mem::replace(&mut storage[index], value))
                }
            } else {
                storage.resize(index, Value::Undefined);
                storage.push(value);
                Write::Appended {
                    at: len,
                    count: index + 1 - len,
                }
            }
        };
        match write {
            Write::Unchanged => Ok(()),
            Write::Replaced(old) => self.after_mutation(flags, |map| map.replace(index, old)),
            Write::Appended { at, count } => {
                self.after_mutation(flags, |map| map.insert_new(at, count))
            }
        }
    }

    /// `items.length = len`.
    pub fn set_length(&self, len: usize, flags: LifecycleFlags) -> Result<()> {
        let current = self.len();
        match len.cmp(&current) {
            Ordering::Less => self
                .splice(isize::try_from(len).unwrap_or(isize::MAX), None, Vec::new(), flags)
                .map(drop),
            Ordering::Greater => self
                .push(std::iter::repeat_n(Value::Undefined, len - current), flags)
                .map(drop),
            Ordering::Equal => Ok(()),
        }
    }

    /// Sort by string form, `undefined` last.
    pub fn sort(&self, flags: LifecycleFlags) -> Result<()> {
        self.sort_by(
            |a, b| Ok(a.to_display_string().cmp(&b.to_display_string())),
            flags,
        )
    }

    /// Sort with a fallible comparator, `undefined` last. The index map is
    /// permuted together with the items.
    pub fn sort_by(
        &self,
        mut compare: impl FnMut(&Value, &Value) -> Result<Ordering>,
        flags: LifecycleFlags,
    ) -> Result<()> {
        let observer = self.observer();
        let items = self.to_vec();
        let origins = match &observer {
            Some(observer) => observer.index_map.borrow().indices.clone(),
            None => vec![0; items.len()],
        };
        let (mut pairs, undefined): (Vec<(Value, i64)>, Vec<(Value, i64)>) = items
            .into_iter()
            .zip(origins)
            .partition(|(value, _)| !value.is_undefined());
        sort_pairs(&mut pairs, &mut compare)?;
        pairs.extend(undefined);
        let (items, origins): (Vec<Value>, Vec<i64>) = pairs.into_iter().unzip();
        *self.0.items.borrow_mut() = items;
        match observer {
            Some(observer) => {
                observer.index_map.borrow_mut().indices = origins;
                observer.notify(flags)
            }
            None => Ok(()),
        }
    }
}

type Comparator<'a> = dyn FnMut(&Value, &Value) -> Result<Ordering> + 'a;

fn sort_pairs(pairs: &mut [(Value, i64)], compare: &mut Comparator<'_>) -> Result<()> {
    if pairs.len() <= INSERTION_SORT_THRESHOLD {
        insertion_sort(pairs, compare)
    } else {
        quicksort(pairs, compare)
    }
}

fn insertion_sort(pairs: &mut [(Value, i64)], compare: &mut Comparator<'_>) -> Result<()> {
    for i in 1..pairs.len() {
        let mut j = i;
        while j > 0 && compare(&pairs[j - 1].0, &pairs[j].0)? == Ordering::Greater {
            pairs.swap(j - 1, j);
            j -= 1;
        }
    }
    Ok(())
}

fn quicksort(pairs: &mut [(Value, i64)], compare: &mut Comparator<'_>) -> Result<()> {
    let len = pairs.len();
    if len <= INSERTION_SORT_THRESHOLD {
        return insertion_sort(pairs, compare);
    }
    let mid = len / 2;
    let last = len - 1;
    // Median of three: afterwards pairs[0] <= pairs[mid] <= pairs[last].
    if compare(&pairs[0].0, &pairs[mid].0)? == Ordering::Greater {
        pairs.swap(0, mid);
    }
    if compare(&pairs[mid].0, &pairs[last].0)? == Ordering::Greater {
        pairs.swap(mid, last);
        if compare(&pairs[0].0, &pairs[mid].0)? == Ordering::Greater {
            pairs.swap(0, mid);
        }
    }
    let pivot_at = last - 1;
    pairs.swap(mid, pivot_at);
    let pivot = pairs[pivot_at].0.clone();
    let mut i = 0;
    let mut j = pivot_at;
    loop {
        i += 1;
        while i < pivot_at && compare(&pairs[i].0, &pivot)? == Ordering::Less {
            i += 1;
        }
        j -= 1;
        while j > 0 && compare(&pivot, &pairs[j].0)? == Ordering::Less {
            j -= 1;
        }
        if i >= j {
            break;
        }
        pairs.swap(i, j);
    }
    pairs.swap(i, pivot_at);
    let (left, right) = pairs.split_at_mut(i);
    quicksort(left, compare)?;
    quicksort(&mut right[1..], compare)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::NEW_ITEM;
    use crate::queue::ManualFlushQueue;
    use std::cell::Cell;

    fn observed(items: Vec<Value>) -> (ArrayRef, Rc<ArrayObserver>, Rc<ManualFlushQueue>) {
        let queue = Rc::new(ManualFlushQueue::new());
        let array = ArrayRef::from_values(items);
        let observer = ArrayObserver::attach(&array, queue.clone());
        (array, observer, queue)
    }

    fn letters(s: &str) -> Vec<Value> {
        s.chars().map(|c| Value::from(c.to_string())).collect()
    }

    struct Batches {
        maps: RefCell<Vec<IndexMap>>,
        immediate: Cell<u32>,
    }

    impl Subscriber for Batches {
        fn handle_change(&self, _: &Value, _: &Value, flags: LifecycleFlags) -> Result<()> {
            assert!(flags.contains(LifecycleFlags::IS_COLLECTION_MUTATION));
            self.immediate.set(self.immediate.get() + 1);
            Ok(())
        }

        fn handle_batched_change(&self, map: &IndexMap, _: LifecycleFlags) -> Result<()> {
            self.maps.borrow_mut().push(map.clone());
            Ok(())
        }
    }

    #[test]
    fn splice_records_new_items_and_deleted_original() {
        let (array, observer, _queue) = observed(letters("abc"));
        let removed = array
            .splice(1, Some(1), letters("xy"), LifecycleFlags::empty())
            .unwrap();
        assert_eq!(removed, letters("b"));
        let map = observer.index_map();
        assert_eq!(map.indices, [0, NEW_ITEM, NEW_ITEM, 2]);
        assert_eq!(map.deleted.len(), 1);
        assert_eq!(map.deleted[0].index, 1);
        assert_eq!(map.deleted[0].value, Value::from("b"));
    }

    #[test]
    fn batch_is_delivered_once_then_reset() {
        let (array, observer, queue) = observed(letters("ab"));
        let batches = Rc::new(Batches {
            maps: RefCell::new(Vec::new()),
            immediate: Cell::new(0),
        });
        observer.subscribe(batches.clone());
        observer.subscribe_batched(batches.clone());
        array.push(letters("c"), LifecycleFlags::empty()).unwrap();
        array.shift(LifecycleFlags::empty()).unwrap();
        assert_eq!(batches.immediate.get(), 2);
        assert_eq!(queue.len(), 1);
        queue.flush_all(LifecycleFlags::empty()).unwrap();
        let maps = batches.maps.borrow();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].indices, [1, NEW_ITEM]);
        assert!(observer.index_map().is_identity());
        assert_eq!(observer.index_map().len(), 2);
    }

    #[test]
    fn sort_permutes_index_map() {
        let (array, observer, _queue) = observed(letters("cab"));
        array.sort(LifecycleFlags::empty()).unwrap();
        assert_eq!(array.to_vec(), letters("abc"));
        assert_eq!(observer.index_map().indices, [1, 2, 0]);
    }

    #[test]
    fn quicksort_path_sorts_and_keeps_origins() {
        let values: Vec<Value> = [5, 3, 9, 1, 7, 2, 8, 6, 4, 0, 11, 10, 15, 13, 12, 14]
            .into_iter()
            .map(Value::from)
            .collect();
        let (array, observer, _queue) = observed(values.clone());
        array
            .sort_by(
                |a, b| Ok(a.to_number().total_cmp(&b.to_number())),
                LifecycleFlags::empty(),
            )
            .unwrap();
        let sorted: Vec<f64> = array.to_vec().iter().map(Value::to_number).collect();
        assert_eq!(sorted, (0..16).map(f64::from).collect::<Vec<_>>());
        for (new, origin) in observer.index_map().indices.iter().enumerate() {
            let origin = usize::try_from(*origin).unwrap();
            assert_eq!(values[origin].to_number(), new as f64);
        }
    }

    #[test]
    fn undefined_sorts_last() {
        let array = ArrayRef::from_values(vec![Value::Undefined, 2.into(), 1.into()]);
        array.sort(LifecycleFlags::empty()).unwrap();
        assert_eq!(array.get(0), Value::from(1));
        assert!(array.get(2).is_undefined());
    }

    #[test]
    fn index_assignment_records_replacement() {
        let (array, observer, _queue) = observed(letters("ab"));
        array.set_index(1, "z".into(), LifecycleFlags::empty()).unwrap();
        let map = observer.index_map();
        assert_eq!(map.indices, [0, NEW_ITEM]);
        assert_eq!(map.deleted[0].value, Value::from("b"));
        array.set_index(3, "q".into(), LifecycleFlags::empty()).unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(observer.index_map().len(), 4);
    }

    #[test]
    fn unobserved_arrays_mutate_plainly() {
        let array = ArrayRef::from_values(letters("ab"));
        assert_eq!(array.pop(LifecycleFlags::empty()).unwrap(), Value::from("b"));
        array.reverse(LifecycleFlags::empty()).unwrap();
        array.set_length(3, LifecycleFlags::empty()).unwrap();
        assert_eq!(array.len(), 3);
        assert!(array.observer().is_none());
    }

    #[test]
    fn length_observer_updates_on_flush() {
        let (array, observer, queue) = observed(letters("a"));
        let length = observer.length_observer();
        array.push(letters("b"), LifecycleFlags::empty()).unwrap();
        assert_eq!(length.get_value(), Value::from(1));
        queue.flush_all(LifecycleFlags::empty()).unwrap();
        assert_eq!(length.get_value(), Value::from(2));
    }
}
