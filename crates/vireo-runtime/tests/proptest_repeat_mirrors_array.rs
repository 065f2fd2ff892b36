//! Property-based tests: a repeat keeps its views in step with its array.
//!
//! An observed array of distinct numbers receives batches of arbitrary
//! mutations. After each microtask checkpoint:
//!
//! 1. There is exactly one view per item.
//! 2. View `i` is bound to item `i` of the array.
//! 3. Contextual locals agree with the view's position and the length.
//! 4. Every rendered view is bound and attached, and no view is rendered twice.
//! 5. No batching depth is left open.

use std::rc::Rc;

use proptest::prelude::*;
use vireo_core::{ArrayRef, LifecycleFlags, ObjectRef, Result, Scope, Value};
use vireo_expr::{BindingType, parse};
use vireo_runtime::templating::{Component, ViewParts};
use vireo_runtime::{BindingEnv, Lifecycle, Repeat, ResourceRegistry, Scheduler, ViewFactory};

// ── Helpers ─────────────────────────────────────────────────────────────

const F: LifecycleFlags = LifecycleFlags::empty();

#[derive(Debug, Clone)]
enum Op {
    Push(u8),
    Pop,
    Shift,
    Unshift(u8),
    Splice { start: i8, delete: Option<u8>, insert: u8 },
    Reverse,
    SetIndex(u8),
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
        (0u8..12).prop_map(Op::SetIndex),
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

fn mutate(array: &ArrayRef, op: &Op, fresh: &mut Fresh) -> Result<()> {
    match op {
        Op::Push(n) => array.push(fresh.take(*n), F).map(drop),
        Op::Pop => array.pop(F).map(drop),
        Op::Shift => array.shift(F).map(drop),
        Op::Unshift(n) => array.unshift(fresh.take(*n), F).map(drop),
        Op::Splice { start, delete, insert } => array
            .splice(
                isize::from(*start),
                delete.map(usize::from),
                fresh.take(*insert),
                F,
            )
            .map(drop),
        Op::Reverse => array.reverse(F),
        Op::SetIndex(at) => {
            let at = usize::from(*at);
            if at < array.len() {
                array.set_index(at, fresh.next(), F)
            } else {
                Ok(())
            }
        }
        Op::Sort => array.sort(F),
    }
}

struct Fixture {
    lifecycle: Lifecycle,
    array: ArrayRef,
    repeat: Rc<Repeat>,
}

fn fixture(len: u8, fresh: &mut Fresh) -> Fixture {
    let lifecycle = Lifecycle::new(Scheduler::new());
    let env = BindingEnv::new(&lifecycle, Rc::new(ResourceRegistry::with_builtins()));
    let factory = ViewFactory::new("row", lifecycle.clone(), |_| Ok(ViewParts::default()));
    let statement = Rc::new(parse("item of items", BindingType::IS_ITERATOR).unwrap());
    let repeat = Repeat::new(env, statement, factory).unwrap();
    let array = ArrayRef::from_values(fresh.take(len));
    let model = ObjectRef::from_pairs([("items", Value::Array(array.clone()))]);
    repeat.bind(F, &Scope::new(Value::Object(model))).unwrap();
    repeat.attach(F).unwrap();
    Fixture {
        lifecycle,
        array,
        repeat,
    }
}

fn check(fx: &Fixture) -> std::result::Result<(), TestCaseError> {
    let views = fx.repeat.views();
    let len = fx.array.len();
    prop_assert_eq!(views.len(), len);
    for (index, view) in views.iter().enumerate() {
        prop_assert!(view.is_bound() && view.is_attached(), "view {} idle", index);
        let scope = view.scope().unwrap();
        let item = scope.binding_context().get_property("item");
        prop_assert!(item.same_value(&fx.array.get(index)), "item {} differs", index);
        let locals = scope.locals();
        prop_assert_eq!(locals.get("$index"), Value::from(index));
        prop_assert_eq!(locals.get("$length"), Value::from(len));
        prop_assert_eq!(locals.get("$first"), Value::Bool(index == 0));
        prop_assert_eq!(locals.get("$last"), Value::Bool(index + 1 == len));
        let others = views.iter().filter(|other| Rc::ptr_eq(other, view)).count();
        prop_assert_eq!(others, 1);
    }
    prop_assert_eq!(fx.lifecycle.depths(), (0, 0, 0, 0));
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Properties
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn views_follow_batched_mutations(
        len in 0u8..8,
        batches in proptest::collection::vec(
            proptest::collection::vec(op_strategy(), 1..5),
            1..6,
        ),
    ) {
        let mut fresh = Fresh(0.0);
        let fx = fixture(len, &mut fresh);
        check(&fx)?;
        for batch in &batches {
            for op in batch {
                mutate(&fx.array, op, &mut fresh).unwrap();
            }
            fx.lifecycle.scheduler().run_until_stalled().unwrap();
            check(&fx)?;
        }
    }

    #[test]
    fn unbinding_releases_every_view(
        len in 0u8..8,
        ops in proptest::collection::vec(op_strategy(), 0..6),
    ) {
        let mut fresh = Fresh(0.0);
        let fx = fixture(len, &mut fresh);
        for op in &ops {
            mutate(&fx.array, op, &mut fresh).unwrap();
        }
        fx.lifecycle.scheduler().run_until_stalled().unwrap();
        let rendered = fx.repeat.views();

        fx.repeat.detach(F).unwrap();
        fx.repeat.unbind(F).unwrap();
        prop_assert!(fx.repeat.views().is_empty());
        prop_assert!(rendered.iter().all(|view| !view.is_bound() && !view.is_attached()));
    }
}
