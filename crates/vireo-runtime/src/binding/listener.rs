#![forbid(unsafe_code)]

//! Event listeners.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;
use vireo_core::{
    BindingMode, Connectable, LifecycleFlags, ObserverLocator, ObserverSlots, Result, Scope,
    Subscriber, Value,
};
use vireo_expr::{AppliedBehaviors, BindingHost, Expr, ServiceLocator};

use super::call::{restore_locals, shadow_locals};
use super::{Bindable, BindingEnv, bound_scope, same_scope, subscriber_handle};

const EVENT_LOCAL: &str = "$event";

/// Evaluates an expression for each event delivered by the host, with the
/// event available as `$event`.
pub struct Listener {
    me: Weak<Listener>,
    env: BindingEnv,
    event: Rc<str>,
    source: Rc<Expr>,
    mode: Cell<BindingMode>,
    behaviors: AppliedBehaviors,
    slots: ObserverSlots,
    scope: RefCell<Option<Scope>>,
}

impl Listener {
    #[must_use]
    pub fn new(env: BindingEnv, event: &str, source: Rc<Expr>) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            env,
            event: Rc::from(event),
            source,
            mode: Cell::new(BindingMode::ToView),
            behaviors: AppliedBehaviors::new(),
            slots: ObserverSlots::new(),
            scope: RefCell::new(None),
        })
    }

    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Run the handler for `event`. Returns `true` when the default action
    /// should be prevented, which is the case when the handler evaluated to
    /// exactly `false`.
    pub fn handle_event(&self, event: Value) -> Result<bool> {
        let scope = bound_scope(&self.scope, "handling an event")?;
        trace!(event = %self.event, "handle event");
        let locals = scope.locals();
        let saved = shadow_locals(locals, &[(Rc::from(EVENT_LOCAL), event)]);
        let flags = LifecycleFlags::MUST_EVALUATE | self.env.flags();
        let result = self.source.evaluate(flags, &scope, self.env.resources());
        restore_locals(locals, saved);
        Ok(matches!(result?, Value::Bool(false)))
    }
}

impl Bindable for Listener {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            if same_scope(&self.scope, scope) {
                return Ok(());
            }
            self.unbind(flags)?;
        }
        *self.scope.borrow_mut() = Some(scope.clone());
        self.source.bind(flags | self.env.flags(), scope, self)
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        match self.scope.borrow_mut().take() {
            Some(scope) => self.source.unbind(flags | self.env.flags(), &scope, self),
            None => Ok(()),
        }
    }

    fn is_bound(&self) -> bool {
        self.scope.borrow().is_some()
    }
}

impl Subscriber for Listener {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) -> Result<()> {
        Ok(())
    }
}

impl Connectable for Listener {
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

impl BindingHost for Listener {
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

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("event", &self.event)
            .field("source", &self.source.to_string())
            .field("bound", &self.is_bound())
            .finish()
    }
}
