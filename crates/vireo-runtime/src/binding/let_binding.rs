#![forbid(unsafe_code)]

//! `<let total.bind="price * qty">`: a computed value published into the
//! scope.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use vireo_core::{
    BindingMode, Connectable, LifecycleFlags, ObjectRef, ObserverLocator, ObserverSlots, Result,
    Scope, Subscriber, Value,
};
use vireo_expr::{AppliedBehaviors, BindingHost, Expr, ServiceLocator};

use super::{Bindable, BindingEnv, same_scope, subscriber_handle};

/// Where a [`LetBinding`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LetTarget {
    /// The binding context of the scope, falling back to the locals when
    /// the binding context is not an object.
    #[default]
    ViewModel,
    /// The locals of the scope's innermost override context.
    Locals,
}

/// Evaluates `source` into `target.property` of the bound scope and keeps
/// it current. Writes are observable, so other bindings reading the
/// property follow along.
pub struct LetBinding {
    me: Weak<LetBinding>,
    env: BindingEnv,
    source: Rc<Expr>,
    property: Rc<str>,
    to: LetTarget,
    mode: Cell<BindingMode>,
    behaviors: AppliedBehaviors,
    slots: ObserverSlots,
    scope: RefCell<Option<Scope>>,
    target: RefCell<Option<ObjectRef>>,
}

impl LetBinding {
    #[must_use]
    pub fn new(env: BindingEnv, source: Rc<Expr>, property: &str, to: LetTarget) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            env,
            source,
            property: Rc::from(property),
            to,
            mode: Cell::new(BindingMode::ToView),
            behaviors: AppliedBehaviors::new(),
            slots: ObserverSlots::new(),
            scope: RefCell::new(None),
            target: RefCell::new(None),
        })
    }

    fn resolve_target(&self, scope: &Scope) -> ObjectRef {
        match (self.to, scope.binding_context()) {
            (LetTarget::ViewModel, Value::Object(object)) => object.clone(),
            _ => scope.locals().clone(),
        }
    }

    fn update(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.scope.borrow().clone() else {
            return Ok(());
        };
        let Some(target) = self.target.borrow().clone() else {
            return Ok(());
        };
        let flags = flags | self.env.flags();
        let value = self.source.evaluate(flags, &scope, self.env.resources())?;
        if !target.get(&self.property).same_value(&value) {
            target.set(&self.property, value, flags)?;
        }
        if self.mode.get().observes_source() {
            self.slots.begin_pass();
            let connected = self.source.connect(flags, &scope, self);
            self.unobserve(false);
            connected?;
        }
        Ok(())
    }
}

impl Bindable for LetBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            if same_scope(&self.scope, scope) {
                return Ok(());
            }
            self.unbind(flags)?;
        }
        *self.scope.borrow_mut() = Some(scope.clone());
        *self.target.borrow_mut() = Some(self.resolve_target(scope));
        self.source.bind(flags | self.env.flags(), scope, self)?;
        self.update(flags)
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.scope.borrow_mut().take() else {
            return Ok(());
        };
        self.target.borrow_mut().take();
        let unbound = self.source.unbind(flags | self.env.flags(), &scope, self);
        self.unobserve(true);
        unbound
    }

    fn is_bound(&self) -> bool {
        self.scope.borrow().is_some()
    }
}

impl Subscriber for LetBinding {
    fn handle_change(&self, _: &Value, _: &Value, flags: LifecycleFlags) -> Result<()> {
        self.update(flags - LifecycleFlags::FROM_BIND)
    }
}

impl Connectable for LetBinding {
    fn observer_locator(&self) -> &ObserverLocator {
        self.env.observer_locator()
    }

    fn observer_slots(&self) -> &ObserverSlots {
        &self.slots
    }

    fn as_subscriber(&self) -> Rc<dyn Subscriber> {
        subscriber_handle(&self.me)
    }
}

impl BindingHost for LetBinding {
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

impl fmt::Debug for LetBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LetBinding")
            .field("property", &self.property)
            .field("to", &self.to)
            .field("source", &self.source.to_string())
            .field("bound", &self.is_bound())
            .finish()
    }
}
