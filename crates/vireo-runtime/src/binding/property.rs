#![forbid(unsafe_code)]

//! Property bindings: `target.property` kept in sync with an expression.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;
use vireo_core::{
    BindingMode, Connectable, Flushable, LifecycleFlags, Observer, ObserverLocator, ObserverSlots,
    QueueLinks, Result, Scope, Subscriber, Value,
};
use vireo_expr::{AppliedBehaviors, BindingHost, Expr, ServiceLocator};

use super::{Bindable, BindingEnv, bound_scope, same_scope};
use crate::lifecycle::Participant;

/// Binds `target[property]` to `source`.
///
/// - to-view and one-time evaluate the source into the target on bind;
///   to-view also connects the source and re-evaluates on every change.
/// - from-view subscribes to the target and assigns changes back through the
///   source expression.
/// - two-way does both.
///
/// Changes caused by collection mutations (or arriving while the view is
/// about to be detached) are not applied immediately. The binding queues
/// itself on the flush queue and re-evaluates once when it drains.
pub struct PropertyBinding {
    me: Weak<PropertyBinding>,
    env: BindingEnv,
    source: Rc<Expr>,
    target: Value,
    property: Rc<str>,
    mode: Cell<BindingMode>,
    behaviors: AppliedBehaviors,
    slots: ObserverSlots,
    links: QueueLinks,
    scope: RefCell<Option<Scope>>,
    target_observer: RefCell<Option<Rc<dyn Observer>>>,
    target_listener: RefCell<Option<Rc<dyn Subscriber>>>,
}

impl PropertyBinding {
    #[must_use]
    pub fn new(
        env: BindingEnv,
        source: Rc<Expr>,
        target: Value,
        property: &str,
        mode: BindingMode,
    ) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            env,
            source,
            target,
            property: Rc::from(property),
            mode: Cell::new(mode),
            behaviors: AppliedBehaviors::new(),
            slots: ObserverSlots::new(),
            links: QueueLinks::new(),
            scope: RefCell::new(None),
            target_observer: RefCell::new(None),
            target_listener: RefCell::new(None),
        })
    }

    #[must_use]
    pub fn source(&self) -> &Rc<Expr> {
        &self.source
    }

    #[must_use]
    pub fn target(&self) -> &Value {
        &self.target
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Number of source observers currently held.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.slots.observer_count()
    }

    fn target_observer(&self, flags: LifecycleFlags) -> Result<Rc<dyn Observer>> {
        if let Some(observer) = self.target_observer.borrow().as_ref() {
            return Ok(Rc::clone(observer));
        }
        let observer = self
            .env
            .observer_locator()
            .get_observer(flags, &self.target, &self.property)?;
        *self.target_observer.borrow_mut() = Some(Rc::clone(&observer));
        Ok(observer)
    }

    /// Write `value` to the target unless it already holds it.
    pub fn update_target(&self, value: Value, flags: LifecycleFlags) -> Result<()> {
        let observer = self.target_observer(flags)?;
        if observer.get_value().same_value(&value) {
            return Ok(());
        }
        trace!(property = %self.property, "update target");
        observer.set_value(value, flags)
    }

    /// Assign `value` back through the source expression.
    pub fn update_source(&self, value: Value, flags: LifecycleFlags) -> Result<()> {
        let scope = bound_scope(&self.scope, "updating the source")?;
        let flags = flags | self.env.flags();
        self.source
            .assign(flags, &scope, self.env.resources(), value)
            .map(drop)
    }

    fn connect_pass(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        self.slots.begin_pass();
        let connected = self.source.connect(flags, scope, self);
        self.unobserve(false);
        connected
    }

    /// Re-evaluate into the target and, when observing, reconnect.
    fn refresh(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.scope.borrow().clone() else {
            return Ok(());
        };
        let flags = flags | self.env.flags();
        let mode = self.mode.get();
        if mode.updates_target() {
            let value = self.source.evaluate(flags, &scope, self.env.resources())?;
            self.update_target(value, flags)?;
        }
        if mode.observes_source() {
            self.connect_pass(flags, &scope)?;
        }
        Ok(())
    }

    fn listen_to_target(&self, flags: LifecycleFlags) -> Result<()> {
        let observer = self.target_observer(flags)?;
        let listener: Rc<dyn Subscriber> = Rc::new(TargetListener {
            binding: self.me.clone(),
        });
        observer.subscribe(Rc::clone(&listener));
        *self.target_listener.borrow_mut() = Some(listener);
        Ok(())
    }

    fn self_rc(&self) -> Option<Rc<Self>> {
        self.me.upgrade()
    }
}

impl Bindable for PropertyBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            if same_scope(&self.scope, scope) {
                return Ok(());
            }
            Bindable::unbind(self, flags)?;
        }
        let flags = flags | self.env.flags();
        *self.scope.borrow_mut() = Some(scope.clone());
        self.source.bind(flags, scope, self)?;

        let mode = self.mode.get();
        if mode.updates_target() {
            let value = self.source.evaluate(flags, scope, self.env.resources())?;
            self.update_target(value, flags)?;
        }
        if mode.observes_source() {
            match (self.env.lifecycle(), self.self_rc()) {
                (Some(lifecycle), Some(me)) if flags.contains(LifecycleFlags::FROM_BIND) => {
                    lifecycle.enqueue_connect(me);
                }
                _ => self.connect_pass(flags, scope)?,
            }
        }
        if mode.updates_source() {
            self.listen_to_target(flags)?;
        }
        Ok(())
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.scope.borrow_mut().take() else {
            return Ok(());
        };
        let flags = flags | self.env.flags();
        let unbound = self.source.unbind(flags, &scope, self);
        self.unobserve(true);
        let listener = self.target_listener.borrow_mut().take();
        let observer = self.target_observer.borrow_mut().take();
        if let (Some(listener), Some(observer)) = (listener, observer) {
            observer.unsubscribe(&listener);
        }
        unbound
    }

    fn is_bound(&self) -> bool {
        self.scope.borrow().is_some()
    }
}

impl Subscriber for PropertyBinding {
    fn handle_change(&self, _new: &Value, _old: &Value, flags: LifecycleFlags) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        let deferred = LifecycleFlags::IS_COLLECTION_MUTATION | LifecycleFlags::DO_NOT_UPDATE_DOM;
        if flags.intersects(deferred) {
            if let Some(me) = self.self_rc() {
                self.env.observer_locator().flush_queue().enqueue_flush(me);
            }
            return Ok(());
        }
        self.refresh(flags - LifecycleFlags::FROM_BIND)
    }
}

impl Flushable for PropertyBinding {
    fn queue_links(&self) -> &QueueLinks {
        &self.links
    }

    fn flush(&self, flags: LifecycleFlags) -> Result<()> {
        self.refresh(flags - LifecycleFlags::DO_NOT_UPDATE_DOM)
    }
}

impl Participant for PropertyBinding {
    fn queue_links(&self) -> &QueueLinks {
        &self.links
    }

    fn connect(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.scope.borrow().clone() else {
            return Ok(());
        };
        if !self.mode.get().observes_source() {
            return Ok(());
        }
        self.connect_pass(flags | self.env.flags(), &scope)
    }
}

impl Connectable for PropertyBinding {
    fn observer_locator(&self) -> &ObserverLocator {
        self.env.observer_locator()
    }

    fn observer_slots(&self) -> &ObserverSlots {
        &self.slots
    }

    fn as_subscriber(&self) -> Rc<dyn Subscriber> {
        super::subscriber_handle(&self.me)
    }
}

impl BindingHost for PropertyBinding {
    fn service_locator(&self) -> &dyn ServiceLocator {
        self.env.resources()
    }

    fn mode(&self) -> BindingMode {
        self.mode.get()
    }

    fn set_mode(&self, mode: BindingMode) {
        self.mode.set(mode);
    }

    fn applied_behaviors(&self) -> &AppliedBehaviors {
        &self.behaviors
    }
}

impl fmt::Debug for PropertyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBinding")
            .field("source", &self.source.to_string())
            .field("property", &self.property)
            .field("mode", &self.mode.get())
            .field("bound", &self.is_bound())
            .field("observers", &self.slots.observer_count())
            .finish()
    }
}

/// Forwards target changes to the binding without keeping it alive.
struct TargetListener {
    binding: Weak<PropertyBinding>,
}

impl Subscriber for TargetListener {
    fn handle_change(&self, new: &Value, _old: &Value, flags: LifecycleFlags) -> Result<()> {
        match self.binding.upgrade() {
            Some(binding) if binding.mode.get().updates_source() => {
                binding.update_source(new.clone(), flags)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Lifecycle;
    use crate::resources::ResourceRegistry;
    use crate::scheduler::Scheduler;
    use vireo_core::{ArrayRef, ManualFlushQueue, ObjectRef};
    use vireo_expr::{BindingType, parse};

    fn manual_env() -> (BindingEnv, Rc<ManualFlushQueue>) {
        let queue = Rc::new(ManualFlushQueue::new());
        let locator = ObserverLocator::new(queue.clone());
        let env = BindingEnv::detached(locator, Rc::new(ResourceRegistry::with_builtins()));
        (env, queue)
    }

    fn binding(
        env: BindingEnv,
        source: &str,
        target: &ObjectRef,
        mode: BindingMode,
    ) -> Rc<PropertyBinding> {
        let expr = Rc::new(parse(source, BindingType::IS_PROPERTY).unwrap());
        PropertyBinding::new(env, expr, Value::Object(target.clone()), "value", mode)
    }

    fn text(obj: &ObjectRef) -> String {
        obj.get("value").to_display_string()
    }

    #[test]
    fn to_view_follows_the_source() {
        let (env, _) = manual_env();
        let model = ObjectRef::from_pairs([("first", Value::from("Ada"))]);
        let target = ObjectRef::new();
        let b = binding(env, "first + '!'", &target, BindingMode::ToView);
        b.bind(LifecycleFlags::empty(), &Scope::new(Value::Object(model.clone())))
            .unwrap();
        assert_eq!(text(&target), "Ada!");

        model.set("first", Value::from("Grace"), LifecycleFlags::empty()).unwrap();
        assert_eq!(text(&target), "Grace!");

        Bindable::unbind(&*b, LifecycleFlags::empty()).unwrap();
        model.set("first", Value::from("Linus"), LifecycleFlags::empty()).unwrap();
        assert_eq!(text(&target), "Grace!");
        assert_eq!(b.observer_count(), 0);
    }

    #[test]
    fn one_time_never_observes() {
        let (env, _) = manual_env();
        let model = ObjectRef::from_pairs([("n", Value::from(1))]);
        let target = ObjectRef::new();
        let b = binding(env, "n", &target, BindingMode::OneTime);
        b.bind(LifecycleFlags::empty(), &Scope::new(Value::Object(model.clone())))
            .unwrap();
        model.set("n", Value::from(2), LifecycleFlags::empty()).unwrap();
        assert_eq!(text(&target), "1");
        assert_eq!(b.observer_count(), 0);
    }

    #[test]
    fn two_way_writes_target_changes_back() {
        let (env, _) = manual_env();
        let model = ObjectRef::from_pairs([("name", Value::from("a"))]);
        let target = ObjectRef::new();
        let b = binding(env, "name", &target, BindingMode::TwoWay);
        b.bind(LifecycleFlags::empty(), &Scope::new(Value::Object(model.clone())))
            .unwrap();
        assert_eq!(text(&target), "a");

        target.set("value", Value::from("typed"), LifecycleFlags::empty()).unwrap();
        assert_eq!(model.get("name").to_display_string(), "typed");

        model.set("name", Value::from("reset"), LifecycleFlags::empty()).unwrap();
        assert_eq!(text(&target), "reset");
    }

    #[test]
    fn from_view_does_not_write_the_target() {
        let (env, _) = manual_env();
        let model = ObjectRef::from_pairs([("name", Value::from("a"))]);
        let target = ObjectRef::from_pairs([("value", Value::from("initial"))]);
        let b = binding(env, "name", &target, BindingMode::FromView);
        b.bind(LifecycleFlags::empty(), &Scope::new(Value::Object(model.clone())))
            .unwrap();
        assert_eq!(text(&target), "initial");
        target.set("value", Value::from("typed"), LifecycleFlags::empty()).unwrap();
        assert_eq!(model.get("name").to_display_string(), "typed");
    }

    #[test]
    fn mode_behavior_applies_and_restores() {
        let (env, _) = manual_env();
        let model = ObjectRef::from_pairs([("n", Value::from(1))]);
        let target = ObjectRef::new();
        let b = binding(env, "n & oneTime", &target, BindingMode::ToView);
        b.bind(LifecycleFlags::empty(), &Scope::new(Value::Object(model.clone())))
            .unwrap();
        assert_eq!(b.mode(), BindingMode::OneTime);
        model.set("n", Value::from(2), LifecycleFlags::empty()).unwrap();
        assert_eq!(text(&target), "1");
        Bindable::unbind(&*b, LifecycleFlags::empty()).unwrap();
        assert_eq!(b.mode(), BindingMode::ToView);
    }

    #[test]
    fn collection_mutations_are_applied_on_flush() {
        let (env, queue) = manual_env();
        let items = ArrayRef::from_values(vec![Value::from("a")]);
        let model = ObjectRef::from_pairs([("items", Value::Array(items.clone()))]);
        let target = ObjectRef::new();
        let b = binding(env, "items.join(',')", &target, BindingMode::ToView);
        b.bind(LifecycleFlags::empty(), &Scope::new(Value::Object(model)))
            .unwrap();
        assert_eq!(text(&target), "a");

        items.push([Value::from("b")], LifecycleFlags::empty()).unwrap();
        items.push([Value::from("c")], LifecycleFlags::empty()).unwrap();
        assert_eq!(text(&target), "a");
        queue.flush_all(LifecycleFlags::empty()).unwrap();
        assert_eq!(text(&target), "a,b,c");
    }

    #[test]
    fn connect_is_deferred_to_attach_when_bound_from_a_lifecycle() {
        let lifecycle = Lifecycle::new(Scheduler::new());
        let env = BindingEnv::new(&lifecycle, Rc::new(ResourceRegistry::new()));
        let model = ObjectRef::from_pairs([("n", Value::from(1))]);
        let target = ObjectRef::new();
        let b = binding(env, "n", &target, BindingMode::ToView);

        lifecycle.begin_bind();
        b.bind(LifecycleFlags::FROM_BIND, &Scope::new(Value::Object(model.clone())))
            .unwrap();
        lifecycle.end_bind(LifecycleFlags::empty()).unwrap();
        assert_eq!(text(&target), "1");
        assert_eq!(b.observer_count(), 0);

        lifecycle.begin_attach();
        lifecycle.end_attach(LifecycleFlags::empty()).unwrap();
        assert_eq!(b.observer_count(), 1);
        model.set("n", Value::from(5), LifecycleFlags::empty()).unwrap();
        assert_eq!(text(&target), "5");
    }

    #[test]
    fn rebinding_to_the_same_scope_is_a_no_op() {
        let (env, _) = manual_env();
        let model = ObjectRef::from_pairs([("n", Value::from(1))]);
        let target = ObjectRef::new();
        let b = binding(env, "n & oneTime", &target, BindingMode::ToView);
        let scope = Scope::new(Value::Object(model));
        b.bind(LifecycleFlags::empty(), &scope).unwrap();
        b.bind(LifecycleFlags::empty(), &scope).unwrap();
        assert!(b.is_bound());
        b.bind(LifecycleFlags::empty(), &Scope::new(Value::Null)).unwrap();
        assert!(b.is_bound());
    }
}
