#![forbid(unsafe_code)]

//! Index maps: the per-batch diff of a collection.
//!
//! `indices[new_position]` is the position the item had when the batch
//! started, or [`NEW_ITEM`] for items inserted during the batch. Items that
//! existed at the start of the batch and were removed are listed in
//! `deleted` with their original position.

use crate::value::Value;

/// Marker for an item inserted during the current batch.
pub const NEW_ITEM: i64 = -2;

/// An item removed during the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedItem {
    /// Position at the start of the batch.
    pub index: usize,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexMap {
    pub indices: Vec<i64>,
    pub deleted: Vec<DeletedItem>,
}

fn to_index(position: usize) -> i64 {
    i64::try_from(position).unwrap_or(i64::MAX)
}

impl IndexMap {
    /// The identity map for a collection of `len` items.
    #[must_use]
    pub fn identity(len: usize) -> Self {
        Self {
            indices: (0..len).map(to_index).collect(),
            deleted: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether the map still describes an untouched collection.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.deleted.is_empty()
            && self
                .indices
                .iter()
                .enumerate()
                .all(|(i, &origin)| origin == to_index(i))
    }

    /// Reset to the identity of a collection with `len` items.
    pub fn reset(&mut self, len: usize) {
        self.indices.clear();
        self.indices.extend((0..len).map(to_index));
        self.deleted.clear();
    }

    /// Record `count` items inserted at `at`.
    pub fn insert_new(&mut self, at: usize, count: usize) {
        let at = at.min(self.indices.len());
        self.indices
            .splice(at..at, std::iter::repeat_n(NEW_ITEM, count));
    }

    /// Record the removal of the item at `at`, whose value was `value`.
    pub fn remove(&mut self, at: usize, value: Value) {
        if at >= self.indices.len() {
            return;
        }
        let origin = self.indices.remove(at);
        self.record_deleted(origin, value);
    }

    /// Record an in-place replacement at `at`.
    pub fn replace(&mut self, at: usize, old_value: Value) {
        if let Some(slot) = self.indices.get_mut(at) {
            let origin = std::mem::replace(slot, NEW_ITEM);
            self.record_deleted(origin, old_value);
        }
    }

    /// Record removal of everything.
    pub fn clear(&mut self, values: Vec<Value>) {
        let indices = std::mem::take(&mut self.indices);
        for (origin, value) in indices.into_iter().zip(values) {
            self.record_deleted(origin, value);
        }
    }

    fn record_deleted(&mut self, origin: i64, value: Value) {
        if let Ok(index) = usize::try_from(origin) {
            self.deleted.push(DeletedItem { index, value });
        }
    }

    /// Original positions that survived the batch, in their new order.
    pub fn surviving(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.indices
            .iter()
            .enumerate()
            .filter_map(|(new, &origin)| usize::try_from(origin).ok().map(|o| (new, o)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_and_reset() {
        let mut map = IndexMap::identity(3);
        assert_eq!(map.indices, [0, 1, 2]);
        assert!(map.is_identity());
        map.insert_new(1, 1);
        assert!(!map.is_identity());
        map.reset(2);
        assert_eq!(map.indices, [0, 1]);
        assert!(map.deleted.is_empty());
    }

    #[test]
    fn removing_new_items_leaves_no_trace() {
        let mut map = IndexMap::identity(1);
        map.insert_new(1, 1);
        map.remove(1, Value::from("temp"));
        assert_eq!(map.indices, [0]);
        assert!(map.deleted.is_empty());
    }

    #[test]
    fn replace_records_old_value() {
        let mut map = IndexMap::identity(2);
        map.replace(1, Value::from("b"));
        assert_eq!(map.indices, [0, NEW_ITEM]);
        assert_eq!(
            map.deleted,
            [DeletedItem {
                index: 1,
                value: Value::from("b")
            }]
        );
        let surviving: Vec<_> = map.surviving().collect();
        assert_eq!(surviving, [(0, 0)]);
    }
}
