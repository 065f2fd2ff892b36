#![forbid(unsafe_code)]

//! `ref="input"`: publishes a target reference into the scope.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use vireo_core::{
    BindingMode, Connectable, LifecycleFlags, ObserverLocator, ObserverSlots, Result, Scope,
    Subscriber, Value,
};
use vireo_expr::{AppliedBehaviors, BindingHost, Expr, ServiceLocator};

use super::{Bindable, BindingEnv, same_scope, subscriber_handle};

/// Assigns `target` through `source` on bind. On unbind the reference is
/// cleared, but only if it still points at `target`.
pub struct RefBinding {
    me: Weak<RefBinding>,
    env: BindingEnv,
    source: Rc<Expr>,
    target: Value,
    mode: Cell<BindingMode>,
    behaviors: AppliedBehaviors,
    slots: ObserverSlots,
    scope: RefCell<Option<Scope>>,
}

impl RefBinding {
    #[must_use]
    pub fn new(env: BindingEnv, source: Rc<Expr>, target: Value) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            env,
            source,
            target,
            mode: Cell::new(BindingMode::OneTime),
            behaviors: AppliedBehaviors::new(),
            slots: ObserverSlots::new(),
            scope: RefCell::new(None),
        })
    }
}

impl Bindable for RefBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            if same_scope(&self.scope, scope) {
                return Ok(());
            }
            self.unbind(flags)?;
        }
        let flags = flags | self.env.flags();
        *self.scope.borrow_mut() = Some(scope.clone());
        self.source.bind(flags, scope, self)?;
        self.source
            .assign(flags, scope, self.env.resources(), self.target.clone())
            .map(drop)
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.scope.borrow_mut().take() else {
            return Ok(());
        };
        let flags = flags | self.env.flags();
        let resources = self.env.resources();
        if self
            .source
            .evaluate(flags, &scope, resources)?
            .same_value(&self.target)
        {
            self.source
                .assign(flags, &scope, resources, Value::Undefined)?;
        }
        self.source.unbind(flags, &scope, self)
    }

    fn is_bound(&self) -> bool {
        self.scope.borrow().is_some()
    }
}

impl Subscriber for RefBinding {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) -> Result<()> {
        Ok(())
    }
}

impl Connectable for RefBinding {
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

impl BindingHost for RefBinding {
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

impl fmt::Debug for RefBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefBinding")
            .field("source", &self.source.to_string())
            .field("bound", &self.is_bound())
            .finish()
    }
}
