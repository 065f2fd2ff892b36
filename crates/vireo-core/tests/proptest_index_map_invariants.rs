//! Property-based invariant tests for array index maps.
//!
//! An observed array starts from a snapshot of distinct numbers and receives
//! an arbitrary mutation sequence. Before the flush, the index map must
//! describe the batch exactly:
//!
//! 1. The map has one entry per current item.
//! 2. Every surviving origin points at the value now at that position.
//! 3. Every original position is either surviving or deleted, exactly once.
//! 4. Deleted entries carry the value the position held at batch start.
//! 5. The flush delivers the map once and resets it to identity.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use vireo_core::observation::{IndexMap, NEW_ITEM};
use vireo_core::{
    ArrayRef, LifecycleFlags, ManualFlushQueue, ObserverLocator, Result, Subscriber, Value,
};

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Push(u8),
    Pop,
    Shift,
    Unshift(u8),
    Splice { start: i8, delete: Option<u8>, insert: u8 },
    Reverse,
    SetIndex(u8),
    SetLength(u8),
    Sort,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u8..4).prop_map(Op::Push),
        Just(Op::Pop),
        Just(Op::Shift),
        (1u8..4).prop_map(Op::Unshift),
        (-6i8..12, proptest::option::of(0u8..5), 0u8..4)
            .prop_map(|(start, delete, insert)| Op::Splice { start, delete, insert }),
        Just(Op::Reverse),
        (0u8..14).prop_map(Op::SetIndex),
        (0u8..14).prop_map(Op::SetLength),
        Just(Op::Sort),
    ]
}

struct Fresh(f64);

impl Fresh {
    fn next(&mut self) -> Value {
        self.0 += 1.0;
        Value::Number(self.0)
    }

    fn take(&mut self, n: u8) -> Vec<Value> {
        (0..n).map(|_| self.next()).collect()
    }
}

fn apply(array: &ArrayRef, op: &Op, fresh: &mut Fresh) -> Result<()> {
    let flags = LifecycleFlags::empty();
    match op {
        Op::Push(n) => array.push(fresh.take(*n), flags).map(drop),
        Op::Pop => array.pop(flags).map(drop),
        Op::Shift => array.shift(flags).map(drop),
        Op::Unshift(n) => array.unshift(fresh.take(*n), flags).map(drop),
        Op::Splice { start, delete, insert } => array
            .splice(
                isize::from(*start),
                delete.map(usize::from),
                fresh.take(*insert),
                flags,
            )
            .map(drop),
        Op::Reverse => array.reverse(flags),
        Op::SetIndex(i) => array.set_index(usize::from(*i), fresh.next(), flags),
        Op::SetLength(n) => array.set_length(usize::from(*n), flags),
        Op::Sort => array.sort(flags),
    }
}

#[derive(Default)]
struct Batches(RefCell<Vec<IndexMap>>);

impl Subscriber for Batches {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn handle_batched_change(&self, index_map: &IndexMap, _: LifecycleFlags) -> Result<()> {
        self.0.borrow_mut().push(index_map.clone());
        Ok(())
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1-5. The index map describes the batch exactly
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn index_map_describes_batch(
        initial in 0usize..8,
        ops in proptest::collection::vec(op_strategy(), 1..12),
    ) {
        let snapshot: Vec<Value> = (0..initial).map(Value::from).collect();
        let array = ArrayRef::from_values(snapshot.clone());
        let queue = Rc::new(ManualFlushQueue::new());
        let locator = ObserverLocator::new(queue.clone());
        let observer = locator.array_observer(&array);
        let batches = Rc::new(Batches::default());
        observer.subscribe_batched(batches.clone());

        let mut fresh = Fresh(100.0);
        for op in &ops {
            apply(&array, op, &mut fresh).unwrap();
        }

        let map = observer.index_map();
        let current = array.to_vec();
        prop_assert_eq!(map.len(), current.len());

        let mut seen = vec![0u32; snapshot.len()];
        for (new, origin) in map.surviving() {
            prop_assert!(origin < snapshot.len());
            prop_assert!(current[new].same_value(&snapshot[origin]));
            seen[origin] += 1;
        }
        for deleted in &map.deleted {
            prop_assert!(deleted.index < snapshot.len());
            prop_assert!(deleted.value.same_value(&snapshot[deleted.index]));
            seen[deleted.index] += 1;
        }
        prop_assert!(seen.iter().all(|&count| count == 1), "coverage {:?}", seen);
        prop_assert!(map.indices.iter().all(|&i| i >= 0 || i == NEW_ITEM));

        let flushed = queue.flush_all(LifecycleFlags::empty()).unwrap();
        let delivered = batches.0.borrow();
        if map.is_identity() {
            prop_assert!(delivered.len() <= 1);
        } else {
            prop_assert_eq!(flushed, 1);
            prop_assert_eq!(delivered.len(), 1);
            prop_assert_eq!(&delivered[0], &map);
        }
        prop_assert!(observer.index_map().is_identity());
        prop_assert_eq!(observer.index_map().len(), array.len());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Unobserved arrays behave like plain vectors
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn unobserved_mutations_match_observed(
        initial in 0usize..8,
        ops in proptest::collection::vec(op_strategy(), 1..12),
    ) {
        let plain = ArrayRef::from_values((0..initial).map(Value::from).collect());
        let observed = ArrayRef::from_values((0..initial).map(Value::from).collect());
        let locator = ObserverLocator::new(Rc::new(ManualFlushQueue::new()));
        let _observer = locator.array_observer(&observed);

        let (mut a, mut b) = (Fresh(100.0), Fresh(100.0));
        for op in &ops {
            apply(&plain, op, &mut a).unwrap();
            apply(&observed, op, &mut b).unwrap();
        }
        prop_assert!(plain.observer().is_none());
        let (left, right) = (plain.to_vec(), observed.to_vec());
        prop_assert_eq!(left.len(), right.len());
        for (l, r) in left.iter().zip(&right) {
            prop_assert!(l.same_value(r));
        }
    }
}
