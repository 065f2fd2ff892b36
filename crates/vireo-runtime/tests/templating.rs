//! Views, repeat and composition driven end to end through the renderer.
//!
//! 1. A repeat renders one mounted row per item, in item order.
//! 2. Array mutations are batched and applied on the next microtask
//!    checkpoint, reusing the views of surviving items.
//! 3. Removing the parent view unmounts every row and caches its views.
//! 4. Composition swaps views in place and caches the outgoing ones.
//! 5. Bindings to non-configurable properties pick up silent writes once the
//!    dirty-check interval has passed.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use vireo_core::observation::NEW_ITEM;
use vireo_core::{ArrayRef, IndexMap, LifecycleFlags, ObjectRef, Result, Scope, Subscriber, Value};
use vireo_expr::{BindingType, ExpressionParser};
use vireo_runtime::templating::{Component, NodeSequence, ViewParts};
use vireo_runtime::{
    BindingEnv, CompositionCoordinator, Instruction, InstructionKind, Lifecycle, Renderer,
    Repeat, ResourceRegistry, Scheduler, View, ViewFactory,
};

// ── Helpers ─────────────────────────────────────────────────────────────

const F: LifecycleFlags = LifecycleFlags::empty();

/// A rendered line: the object bindings write into, plus where it sits.
struct Slot {
    row: ObjectRef,
    position: Cell<usize>,
}

type Screen = Rc<RefCell<Vec<Rc<Slot>>>>;

struct Row {
    slot: Rc<Slot>,
    screen: Screen,
}

impl NodeSequence for Row {
    fn mount(&self, _: LifecycleFlags) -> Result<()> {
        self.screen.borrow_mut().push(Rc::clone(&self.slot));
        Ok(())
    }

    fn unmount(&self, _: LifecycleFlags) -> Result<()> {
        self.screen
            .borrow_mut()
            .retain(|slot| !Rc::ptr_eq(slot, &self.slot));
        Ok(())
    }

    fn set_position(&self, index: usize) {
        self.slot.position.set(index);
    }
}

struct App {
    lifecycle: Lifecycle,
    renderer: Renderer,
    screen: Screen,
    model: ObjectRef,
}

impl App {
    fn new() -> Self {
        let lifecycle = Lifecycle::new(Scheduler::new());
        let env = BindingEnv::new(&lifecycle, Rc::new(ResourceRegistry::with_builtins()));
        let model = ObjectRef::from_pairs([
            ("title", Value::from("Home")),
            ("name", Value::from("Ada")),
            ("items", array(&["a", "b", "c"])),
        ]);
        Self {
            lifecycle,
            renderer: Renderer::new(env, Rc::new(ExpressionParser::new())),
            screen: Screen::default(),
            model,
        }
    }

    fn scope(&self) -> Scope {
        Scope::new(Value::Object(self.model.clone()))
    }

    /// Views with a single line whose text is the interpolation `source`.
    fn line_factory(&self, name: &str, source: &str) -> ViewFactory {
        let renderer = self.renderer.clone();
        let screen = Rc::clone(&self.screen);
        let instructions = [Instruction::new(
            0,
            InstructionKind::Interpolation("text".into()),
            source,
        )];
        ViewFactory::new(name, self.lifecycle.clone(), move |_| {
            let slot = Rc::new(Slot {
                row: ObjectRef::new(),
                position: Cell::new(0),
            });
            let rendered = renderer.render(&instructions, &[Value::Object(slot.row.clone())])?;
            Ok(ViewParts {
                bindings: rendered.bindings,
                nodes: Rc::new(Row {
                    slot,
                    screen: Rc::clone(&screen),
                }),
                ..ViewParts::default()
            })
        })
    }

    /// A parent view holding `item of items` over `${$index}:${item}` rows.
    fn list(&self) -> (Rc<View>, Rc<Repeat>) {
        let statement = self
            .renderer
            .parser()
            .parse("item of items", BindingType::IS_ITERATOR)
            .unwrap();
        let rows = self.line_factory("row", "${$index}:${item}");
        let repeat = Repeat::new(self.renderer.env().clone(), statement, rows).unwrap();
        let parts = ViewParts {
            children: vec![Rc::clone(&repeat) as Rc<dyn Component>],
            ..ViewParts::default()
        };
        (View::new("list", self.lifecycle.clone(), parts), repeat)
    }

    fn lines(&self) -> Vec<String> {
        let mut slots = self.screen.borrow().clone();
        slots.sort_by_key(|slot| slot.position.get());
        slots
            .iter()
            .map(|slot| slot.row.get("text").to_display_string())
            .collect()
    }

    fn items(&self) -> ArrayRef {
        match self.model.get("items") {
            Value::Array(array) => array,
            other => panic!("items is not an array: {other:?}"),
        }
    }
}

fn array(items: &[&str]) -> Value {
    Value::Array(ArrayRef::from_values(
        items.iter().map(|s| Value::from(*s)).collect(),
    ))
}

#[derive(Default)]
struct Capture {
    maps: RefCell<Vec<IndexMap>>,
}

impl Subscriber for Capture {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn handle_batched_change(&self, map: &IndexMap, _: LifecycleFlags) -> Result<()> {
        self.maps.borrow_mut().push(map.clone());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Repeat
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn repeat_renders_rows_in_item_order() {
    let app = App::new();
    let (list, repeat) = app.list();
    list.bind(F, &app.scope()).unwrap();
    list.attach(F).unwrap();

    assert_eq!(app.lines(), ["0:a", "1:b", "2:c"]);
    assert_eq!(repeat.views().len(), 3);
    assert!(repeat.views().iter().all(|view| view.is_attached()));
}

#[test]
fn splice_is_applied_on_the_next_checkpoint() {
    let app = App::new();
    let (list, repeat) = app.list();
    list.bind(F, &app.scope()).unwrap();
    list.attach(F).unwrap();
    let before = repeat.views();

    let capture = Rc::new(Capture::default());
    let items = app.items();
    app.renderer
        .env()
        .observer_locator()
        .array_observer(&items)
        .subscribe_batched(capture.clone());

    items
        .splice(1, Some(1), vec![Value::from("x"), Value::from("y")], F)
        .unwrap();
    assert_eq!(app.lines(), ["0:a", "1:b", "2:c"]);

    app.lifecycle.scheduler().run_until_stalled().unwrap();
    assert_eq!(app.lines(), ["0:a", "1:x", "2:y", "3:c"]);

    let maps = capture.maps.borrow();
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0].indices, [0, NEW_ITEM, NEW_ITEM, 2]);
    assert_eq!(maps[0].deleted.len(), 1);
    assert_eq!(maps[0].deleted[0].index, 1);
    assert_eq!(maps[0].deleted[0].value, Value::from("b"));

    let after = repeat.views();
    assert!(Rc::ptr_eq(&after[0], &before[0]));
    assert!(Rc::ptr_eq(&after[3], &before[2]));
    // The view released for "b" came back out of the cache for "x".
    assert!(Rc::ptr_eq(&after[1], &before[1]));
    assert_eq!(repeat.factory().created_count(), 4);
}

#[test]
fn pushes_and_pops_settle_together() {
    let app = App::new();
    let (list, _repeat) = app.list();
    list.bind(F, &app.scope()).unwrap();
    list.attach(F).unwrap();

    let items = app.items();
    items.push([Value::from("d")], F).unwrap();
    items.shift(F).unwrap();
    app.lifecycle.scheduler().run_until_stalled().unwrap();
    assert_eq!(app.lines(), ["0:b", "1:c", "2:d"]);
}

#[test]
fn replacing_the_collection_rerenders() {
    let app = App::new();
    let (list, repeat) = app.list();
    list.bind(F, &app.scope()).unwrap();
    list.attach(F).unwrap();
    let old = app.items();

    app.model.set("items", array(&["z"]), F).unwrap();
    app.lifecycle.scheduler().run_until_stalled().unwrap();
    assert_eq!(app.lines(), ["0:z"]);

    // The old array no longer drives the list.
    old.push([Value::from("w")], F).unwrap();
    app.lifecycle.scheduler().run_until_stalled().unwrap();
    assert_eq!(app.lines(), ["0:z"]);
    assert_eq!(repeat.views().len(), 1);
}

#[test]
fn removing_the_parent_unmounts_every_row() {
    let app = App::new();
    let (list, repeat) = app.list();
    list.bind(F, &app.scope()).unwrap();
    list.attach(F).unwrap();

    list.remove(F).unwrap();
    assert!(app.lines().is_empty());
    assert!(!list.is_bound());
    assert!(repeat.views().is_empty());
    assert_eq!(repeat.factory().cached_count(), 3);
    assert_eq!(app.lifecycle.depths(), (0, 0, 0, 0));
}

// ═══════════════════════════════════════════════════════════════════════
// Composition
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn composition_swaps_views_and_caches_the_old_ones() {
    let app = App::new();
    let home = app.line_factory("home", "${title}");
    let detail = app.line_factory("detail", "Detail: ${name}");
    let coordinator = CompositionCoordinator::new(app.lifecycle.clone());
    coordinator.bind(F, &app.scope()).unwrap();
    coordinator.attach(F).unwrap();

    let task = coordinator.compose(Some(home.create().unwrap()), F).unwrap();
    assert!(task.is_done());
    assert_eq!(app.lines(), ["Home"]);

    coordinator
        .compose(Some(detail.create().unwrap()), F)
        .unwrap();
    assert_eq!(app.lines(), ["Detail: Ada"]);
    assert_eq!(home.cached_count(), 1);

    app.model.set("name", Value::from("Bo"), F).unwrap();
    app.lifecycle.scheduler().run_until_stalled().unwrap();
    assert_eq!(app.lines(), ["Detail: Bo"]);

    coordinator.compose(None, F).unwrap();
    assert!(app.lines().is_empty());
    assert!(coordinator.current().is_none());
    assert_eq!(detail.cached_count(), 1);
}

// ═══════════════════════════════════════════════════════════════════════
// Dirty checking
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn frozen_property_updates_after_the_check_interval() {
    let app = App::new();
    app.model.insert_frozen("code", Value::from("A1"));
    let badge = app.line_factory("badge", "Code ${code}").create().unwrap();
    badge.bind(F, &app.scope()).unwrap();
    badge.attach(F).unwrap();
    assert_eq!(app.lines(), ["Code A1"]);
    let checker = app.renderer.env().observer_locator().dirty_checker().clone();
    assert_eq!(checker.tracked_count(), 1);

    app.model.set("code", Value::from("B2"), F).unwrap();
    app.lifecycle.scheduler().run_until_stalled().unwrap();
    assert_eq!(app.lines(), ["Code A1"]);

    let scheduler = app.lifecycle.scheduler();
    scheduler.advance(Duration::from_millis(100)).unwrap();
    assert_eq!(app.lines(), ["Code A1"]);
    scheduler.advance(Duration::from_millis(30)).unwrap();
    assert_eq!(app.lines(), ["Code B2"]);

    badge.remove(F).unwrap();
    assert_eq!(checker.tracked_count(), 0);
}
