//! Evaluation, assignment and dependency collection against live scopes.
//!
//! The `Watcher` below is a minimal binding: it owns observer slots, counts
//! change notifications and exposes a small resource table.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use vireo_core::{
    ArrayRef, BindingMode, Connectable, Error, FunctionRef, LifecycleFlags, ManualFlushQueue,
    ObjectRef, Observer, ObserverLocator, ObserverSlots, Result, Scope, Subscriber, Value,
};
use vireo_expr::{
    AppliedBehaviors, BindingBehavior, BindingHost, BindingType, Expr, ServiceLocator, Signaler,
    ValueConverter, parse,
};

// ── Helpers ─────────────────────────────────────────────────────────────

struct Double;

impl ValueConverter for Double {
    fn to_view(&self, value: Value, _args: &[Value]) -> Result<Value> {
        Ok(Value::Number(value.to_number() * 2.0))
    }

    fn from_view(&self, value: Value, _args: &[Value]) -> Result<Value> {
        Ok(Value::Number(value.to_number() / 2.0))
    }
}

struct Ticking {
    signals: Vec<Rc<str>>,
}

impl ValueConverter for Ticking {
    fn to_view(&self, value: Value, _args: &[Value]) -> Result<Value> {
        Ok(value)
    }

    fn signals(&self) -> &[Rc<str>] {
        &self.signals
    }
}

struct ForceOneTime;

impl BindingBehavior for ForceOneTime {
    fn bind(
        &self,
        _flags: LifecycleFlags,
        _scope: &Scope,
        binding: &dyn BindingHost,
        _args: &[Value],
    ) -> Result<()> {
        binding.applied_behaviors().save_mode(binding.mode());
        binding.set_mode(BindingMode::OneTime);
        Ok(())
    }

    fn unbind(
        &self,
        _flags: LifecycleFlags,
        _scope: &Scope,
        binding: &dyn BindingHost,
    ) -> Result<()> {
        if let Some(mode) = binding.applied_behaviors().take_saved_mode() {
            binding.set_mode(mode);
        }
        Ok(())
    }
}

#[derive(Default)]
struct Listeners {
    names: RefCell<Vec<String>>,
}

impl Signaler for Listeners {
    fn add_signal_listener(&self, name: &str, _listener: Rc<dyn Subscriber>) {
        self.names.borrow_mut().push(name.to_owned());
    }

    fn remove_signal_listener(&self, name: &str, _listener: &Rc<dyn Subscriber>) {
        self.names.borrow_mut().retain(|n| n != name);
    }
}

struct Resources {
    signaler: Rc<Listeners>,
}

impl ServiceLocator for Resources {
    fn value_converter(&self, name: &str) -> Option<Rc<dyn ValueConverter>> {
        match name {
            "double" => Some(Rc::new(Double)),
            "ticking" => Some(Rc::new(Ticking {
                signals: vec![Rc::from("tick")],
            })),
            _ => None,
        }
    }

    fn binding_behavior(&self, name: &str) -> Option<Rc<dyn BindingBehavior>> {
        (name == "oneTime").then(|| Rc::new(ForceOneTime) as Rc<dyn BindingBehavior>)
    }

    fn signaler(&self) -> Option<Rc<dyn Signaler>> {
        Some(Rc::clone(&self.signaler) as Rc<dyn Signaler>)
    }
}

struct Watcher {
    this: Weak<Watcher>,
    locator: ObserverLocator,
    slots: ObserverSlots,
    resources: Resources,
    mode: Cell<BindingMode>,
    applied: AppliedBehaviors,
    changes: Cell<usize>,
}

impl Watcher {
    fn new() -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            locator: ObserverLocator::new(Rc::new(ManualFlushQueue::new())),
            slots: ObserverSlots::new(),
            resources: Resources {
                signaler: Rc::new(Listeners::default()),
            },
            mode: Cell::new(BindingMode::ToView),
            applied: AppliedBehaviors::new(),
            changes: Cell::new(0),
        })
    }

    /// One full connect pass followed by pruning of stale slots.
    fn pass(&self, expr: &Expr, scope: &Scope) {
        self.slots.begin_pass();
        expr.connect(LifecycleFlags::empty(), scope, self).unwrap();
        self.unobserve(false);
    }

    fn observer(&self, object: &ObjectRef, key: &str) -> Rc<dyn Observer> {
        self.locator
            .get_observer(LifecycleFlags::empty(), &Value::Object(object.clone()), key)
            .unwrap()
    }
}

impl Subscriber for Watcher {
    fn handle_change(&self, _new: &Value, _old: &Value, _flags: LifecycleFlags) -> Result<()> {
        self.changes.set(self.changes.get() + 1);
        Ok(())
    }
}

impl Connectable for Watcher {
    fn observer_locator(&self) -> &ObserverLocator {
        &self.locator
    }

    fn observer_slots(&self) -> &ObserverSlots {
        &self.slots
    }

    fn as_subscriber(&self) -> Rc<dyn Subscriber> {
        self.this.upgrade().expect("watcher alive")
    }
}

impl BindingHost for Watcher {
    fn service_locator(&self) -> &dyn ServiceLocator {
        &self.resources
    }

    fn mode(&self) -> BindingMode {
        self.mode.get()
    }

    fn set_mode(&self, mode: BindingMode) {
        self.mode.set(mode);
    }

    fn applied_behaviors(&self) -> &AppliedBehaviors {
        &self.applied
    }
}

fn expr(source: &str) -> Expr {
    parse(source, BindingType::IS_PROPERTY).unwrap()
}

fn eval(watcher: &Watcher, source: &str, scope: &Scope) -> Value {
    expr(source)
        .evaluate(LifecycleFlags::empty(), scope, &watcher.resources)
        .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════
// Evaluation
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn evaluates_operators_members_and_calls() {
    let watcher = Watcher::new();
    let greet = vireo_core::FunctionRef::new("greet", |this, args| {
        let name = this.get_property("name").to_display_string();
        Ok(Value::string(format!("{}, {name}", args[0].to_display_string())))
    });
    let model = ObjectRef::from_pairs([
        ("name", Value::from("Ada")),
        ("greet", Value::Function(greet)),
        ("items", Value::Array(ArrayRef::from_values(vec![1.into(), 2.into()]))),
    ]);
    let scope = Scope::new(Value::Object(model));
    assert_eq!(eval(&watcher, "greet('Hi')", &scope).to_display_string(), "Hi, Ada");
    assert_eq!(eval(&watcher, "items.length * 10 + items[1]", &scope).to_number(), 22.0);
    assert_eq!(eval(&watcher, "`${name}!`", &scope).to_display_string(), "Ada!");
    assert_eq!(eval(&watcher, "missing || 'fallback'", &scope).to_display_string(), "fallback");
    assert!(eval(&watcher, "missing.deep.chain", &scope).is_undefined());
    assert_eq!(eval(&watcher, "items.join('+')", &scope).to_display_string(), "1+2");
    assert_eq!(eval(&watcher, "name | double", &scope).to_display_string(), "NaN");
}

#[test]
fn calls_on_non_functions_fail_only_when_strict() {
    let watcher = Watcher::new();
    let scope = Scope::new(Value::Object(ObjectRef::new()));
    let call = expr("nothing(1)");
    assert!(
        call.evaluate(LifecycleFlags::empty(), &scope, &watcher.resources)
            .unwrap()
            .is_undefined()
    );
    let err = call
        .evaluate(LifecycleFlags::MUST_EVALUATE, &scope, &watcher.resources)
        .unwrap_err();
    assert!(matches!(err, Error::NotAFunction { name } if name == "nothing"));
}

#[test]
fn member_and_keyed_access_on_nullish_agree() {
    let watcher = Watcher::new();
    let model = ObjectRef::from_pairs([("user", Value::Null), ("key", Value::from("name"))]);
    let scope = Scope::new(Value::Object(model));
    for source in ["user.name", "user[key]", "missing.name", "missing[0]"] {
        let access = expr(source);
        let lenient = access
            .evaluate(LifecycleFlags::empty(), &scope, &watcher.resources)
            .unwrap();
        assert!(lenient.is_undefined(), "{source} gave {lenient:?}");
        let strict = access
            .evaluate(LifecycleFlags::MUST_EVALUATE, &scope, &watcher.resources)
            .unwrap();
        assert!(strict.is_nullish(), "{source} gave {strict:?}");
    }
    let null = expr("user[key]")
        .evaluate(LifecycleFlags::MUST_EVALUATE, &scope, &watcher.resources)
        .unwrap();
    assert_eq!(null, Value::Null);
}

#[test]
fn ancestor_access_walks_override_contexts() {
    let watcher = Watcher::new();
    let root = Scope::new(Value::Object(ObjectRef::from_pairs([("name", "root".into())])));
    let middle = Scope::from_parent(
        &root,
        Value::Object(ObjectRef::from_pairs([("name", "middle".into())])),
    );
    let leaf = Scope::from_parent(
        &middle,
        Value::Object(ObjectRef::from_pairs([("name", "leaf".into())])),
    );
    assert_eq!(eval(&watcher, "name", &leaf).to_display_string(), "leaf");
    assert_eq!(eval(&watcher, "$parent.name", &leaf).to_display_string(), "middle");
    assert_eq!(eval(&watcher, "$parent.$parent.name", &leaf).to_display_string(), "root");
    assert!(eval(&watcher, "$parent.$parent.$parent.name", &leaf).is_undefined());
    assert_eq!(eval(&watcher, "$this.name", &leaf).to_display_string(), "leaf");
}

// ═══════════════════════════════════════════════════════════════════════
// Assignment
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn assignment_creates_missing_intermediate_objects() {
    let watcher = Watcher::new();
    let model = ObjectRef::new();
    let scope = Scope::new(Value::Object(model.clone()));
    eval(&watcher, "a.b.c = 5", &scope);
    assert_eq!(eval(&watcher, "a.b.c", &scope).to_number(), 5.0);
    assert!(model.get("a").as_object().is_some());
}

#[test]
fn assignment_through_converter_uses_from_view() {
    let watcher = Watcher::new();
    let model = ObjectRef::new();
    let scope = Scope::new(Value::Object(model.clone()));
    expr("value | double")
        .assign(LifecycleFlags::empty(), &scope, &watcher.resources, Value::Number(10.0))
        .unwrap();
    assert_eq!(model.get("value").to_number(), 5.0);
}

#[test]
fn non_lvalues_are_not_assignable() {
    let watcher = Watcher::new();
    let scope = Scope::new(Value::Object(ObjectRef::new()));
    let err = expr("a + b")
        .assign(LifecycleFlags::empty(), &scope, &watcher.resources, Value::Null)
        .unwrap_err();
    assert!(matches!(err, Error::NotAssignable { kind: "Binary" }));
}

// ═══════════════════════════════════════════════════════════════════════
// Dependency collection
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn short_circuit_connects_only_the_taken_branch() {
    let watcher = Watcher::new();
    let model = ObjectRef::from_pairs([("a", Value::Bool(false)), ("b", Value::Bool(true))]);
    let scope = Scope::new(Value::Object(model.clone()));
    let and = expr("a && b");
    watcher.pass(&and, &scope);
    assert_eq!(watcher.slots.observer_count(), 1);
    assert_eq!(watcher.observer(&model, "b").subscriber_count(), 0);

    model.set("a", Value::Bool(true), LifecycleFlags::empty()).unwrap();
    assert_eq!(watcher.changes.get(), 1);
    watcher.pass(&and, &scope);
    assert_eq!(watcher.slots.observer_count(), 2);
}

#[test]
fn reconnecting_unchanged_state_is_idempotent() {
    let watcher = Watcher::new();
    let model = ObjectRef::from_pairs([("x", Value::from(1)), ("y", Value::from(2))]);
    let scope = Scope::new(Value::Object(model.clone()));
    let sum = expr("x + y");
    watcher.pass(&sum, &scope);
    let x = watcher.observer(&model, "x");
    let version = watcher.slots.version();
    watcher.pass(&sum, &scope);
    watcher.pass(&sum, &scope);
    assert_eq!(watcher.slots.version(), version + 2);
    assert_eq!(x.subscriber_count(), 1);
    assert_eq!(watcher.slots.observer_count(), 2);
}

#[test]
fn switching_branches_prunes_stale_dependencies() {
    let watcher = Watcher::new();
    let model = ObjectRef::from_pairs([
        ("flag", Value::Bool(true)),
        ("x", Value::from(1)),
        ("y", Value::from(2)),
        ("z", Value::from(3)),
    ]);
    let scope = Scope::new(Value::Object(model.clone()));
    let pick = expr("flag ? x + y : y + z");
    watcher.pass(&pick, &scope);
    let (x, y, z) = (
        watcher.observer(&model, "x"),
        watcher.observer(&model, "y"),
        watcher.observer(&model, "z"),
    );
    assert_eq!((x.subscriber_count(), y.subscriber_count()), (1, 1));

    model.set("flag", Value::Bool(false), LifecycleFlags::empty()).unwrap();
    watcher.pass(&pick, &scope);
    assert_eq!(x.subscriber_count(), 0);
    assert_eq!(y.subscriber_count(), 1);
    assert_eq!(z.subscriber_count(), 1);
    assert_eq!(watcher.slots.observer_count(), 3);
}

#[test]
fn callee_reads_are_connected_even_when_not_callable() {
    let watcher = Watcher::new();
    let model = ObjectRef::from_pairs([
        ("flag", Value::Bool(false)),
        ("f", Value::Undefined),
        ("g", Value::Undefined),
        ("x", Value::from(1)),
    ]);
    let scope = Scope::new(Value::Object(model.clone()));
    let call = expr("(flag ? f : g)(x)");
    watcher.pass(&call, &scope);
    // `flag` and `g` were read; the arguments were not.
    assert_eq!(watcher.slots.observer_count(), 2);
    assert_eq!(watcher.observer(&model, "x").subscriber_count(), 0);

    let double = FunctionRef::new("double", |_, args| {
        Ok(Value::Number(args.first().map_or(0.0, Value::to_number) * 2.0))
    });
    model.set("g", Value::Function(double), LifecycleFlags::empty()).unwrap();
    assert_eq!(watcher.changes.get(), 1);
    watcher.pass(&call, &scope);
    assert_eq!(watcher.observer(&model, "x").subscriber_count(), 1);
    assert_eq!(eval(&watcher, "(flag ? f : g)(x)", &scope), Value::Number(2.0));
}

#[test]
fn numeric_index_observes_the_collection() {
    let watcher = Watcher::new();
    let items = ArrayRef::from_values(vec!["a".into()]);
    let model = ObjectRef::from_pairs([("items", Value::Array(items.clone()))]);
    let scope = Scope::new(Value::Object(model));
    watcher.pass(&expr("items[0]"), &scope);
    assert_eq!(watcher.slots.observer_count(), 2);
    items.push([Value::from("b")], LifecycleFlags::empty()).unwrap();
    assert_eq!(watcher.changes.get(), 1);
}

#[test]
fn member_on_null_registers_only_the_object() {
    let watcher = Watcher::new();
    let model = ObjectRef::from_pairs([("user", Value::Null)]);
    let scope = Scope::new(Value::Object(model));
    watcher.pass(&expr("user.name"), &scope);
    assert_eq!(watcher.slots.observer_count(), 1);
}

#[test]
fn converter_signals_follow_connect_and_unbind() {
    let watcher = Watcher::new();
    let scope = Scope::new(Value::Object(ObjectRef::new()));
    let ticking = expr("now | ticking");
    watcher.pass(&ticking, &scope);
    assert_eq!(*watcher.resources.signaler.names.borrow(), ["tick"]);
    ticking.unbind(LifecycleFlags::empty(), &scope, &*watcher).unwrap();
    assert!(watcher.resources.signaler.names.borrow().is_empty());

    let missing = expr("now | nope");
    let err = missing
        .connect(LifecycleFlags::empty(), &scope, &*watcher)
        .unwrap_err();
    assert!(matches!(err, Error::MissingValueConverter { .. }));
}

// ═══════════════════════════════════════════════════════════════════════
// Behaviors
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn behaviors_apply_once_and_restore_on_unbind() {
    let watcher = Watcher::new();
    let scope = Scope::new(Value::Object(ObjectRef::new()));
    let once = expr("value & oneTime");
    once.bind(LifecycleFlags::empty(), &scope, &*watcher).unwrap();
    assert_eq!(watcher.mode(), BindingMode::OneTime);
    once.unbind(LifecycleFlags::empty(), &scope, &*watcher).unwrap();
    assert_eq!(watcher.mode(), BindingMode::ToView);
    assert!(watcher.applied.is_empty());

    let twice = expr("value & oneTime & oneTime");
    let err = twice.bind(LifecycleFlags::empty(), &scope, &*watcher).unwrap_err();
    assert!(matches!(err, Error::BehaviorAlreadyApplied { name } if name == "oneTime"));

    let unknown = expr("value & nope");
    watcher.applied.unmark("oneTime");
    let err = unknown.bind(LifecycleFlags::empty(), &scope, &*watcher).unwrap_err();
    assert!(matches!(err, Error::MissingBindingBehavior { .. }));
}
