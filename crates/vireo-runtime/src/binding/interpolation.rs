#![forbid(unsafe_code)]

//! Interpolation bindings: `Hello ${first} ${last | upper}!` into a target.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use vireo_core::{
    BindingMode, Connectable, Flushable, LifecycleFlags, Observer, ObserverLocator, ObserverSlots,
    QueueLinks, Result, Scope, Subscriber, Value,
};
use vireo_expr::{AppliedBehaviors, BindingHost, Expr, ServiceLocator};

use super::{Bindable, BindingEnv, same_scope, subscriber_handle};
use crate::lifecycle::Participant;

/// Writes the whole interpolation to `target[property]` whenever any of its
/// parts changes. Each `${...}` part is observed by its own
/// [`ContentBinding`].
pub struct InterpolationBinding {
    env: BindingEnv,
    interpolation: Rc<Expr>,
    target: Value,
    property: Rc<str>,
    parts: Vec<Rc<ContentBinding>>,
    scope: RefCell<Option<Scope>>,
    target_observer: RefCell<Option<Rc<dyn Observer>>>,
}

impl InterpolationBinding {
    /// `interpolation` is normally an [`Expr::Interpolation`]; any other
    /// expression is treated as a single part.
    #[must_use]
    pub fn new(
        env: BindingEnv,
        interpolation: Rc<Expr>,
        target: Value,
        property: &str,
        mode: BindingMode,
    ) -> Rc<Self> {
        Rc::new_cyclic(|me: &Weak<Self>| {
            let sources: Vec<Expr> = match &*interpolation {
                Expr::Interpolation { expressions, .. } => expressions.clone(),
                other => vec![other.clone()],
            };
            let parts = sources
                .into_iter()
                .map(|source| ContentBinding::new(me.clone(), env.clone(), Rc::new(source), mode))
                .collect();
            Self {
                env,
                interpolation,
                target,
                property: Rc::from(property),
                parts,
                scope: RefCell::new(None),
                target_observer: RefCell::new(None),
            }
        })
    }

    #[must_use]
    pub fn parts(&self) -> &[Rc<ContentBinding>] {
        &self.parts
    }

    /// Evaluate the whole interpolation and write it if it changed.
    pub fn update_target(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.scope.borrow().clone() else {
            return Ok(());
        };
        let flags = flags | self.env.flags();
        let value = self
            .interpolation
            .evaluate(flags, &scope, self.env.resources())?;
        let observer = match self.target_observer.borrow().clone() {
            Some(observer) => observer,
            None => {
                let observer = self
                    .env
                    .observer_locator()
                    .get_observer(flags, &self.target, &self.property)?;
                *self.target_observer.borrow_mut() = Some(Rc::clone(&observer));
                observer
            }
        };
        if observer.get_value().same_value(&value) {
            return Ok(());
        }
        observer.set_value(value, flags)
    }
}

impl Bindable for InterpolationBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            if same_scope(&self.scope, scope) {
                return Ok(());
            }
            self.unbind(flags)?;
        }
        *self.scope.borrow_mut() = Some(scope.clone());
        for part in &self.parts {
            part.bind(flags, scope)?;
        }
        self.update_target(flags)
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        if self.scope.borrow_mut().take().is_none() {
            return Ok(());
        }
        self.target_observer.borrow_mut().take();
        let mut first_error = None;
        for part in &self.parts {
            if let Err(err) = Bindable::unbind(&**part, flags) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn is_bound(&self) -> bool {
        self.scope.borrow().is_some()
    }
}

impl fmt::Debug for InterpolationBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpolationBinding")
            .field("interpolation", &self.interpolation.to_string())
            .field("property", &self.property)
            .field("parts", &self.parts.len())
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// One `${...}` part of an interpolation. It observes its expression and
/// asks the owning [`InterpolationBinding`] to re-render on change.
pub struct ContentBinding {
    me: Weak<ContentBinding>,
    owner: Weak<InterpolationBinding>,
    env: BindingEnv,
    source: Rc<Expr>,
    mode: Cell<BindingMode>,
    behaviors: AppliedBehaviors,
    slots: ObserverSlots,
    links: QueueLinks,
    scope: RefCell<Option<Scope>>,
}

impl ContentBinding {
    fn new(
        owner: Weak<InterpolationBinding>,
        env: BindingEnv,
        source: Rc<Expr>,
        mode: BindingMode,
    ) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            owner,
            env,
            source,
            mode: Cell::new(mode),
            behaviors: AppliedBehaviors::new(),
            slots: ObserverSlots::new(),
            links: QueueLinks::new(),
            scope: RefCell::new(None),
        })
    }

    #[must_use]
    pub fn source(&self) -> &Rc<Expr> {
        &self.source
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.slots.observer_count()
    }

    fn connect_pass(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.scope.borrow().clone() else {
            return Ok(());
        };
        if !self.mode.get().observes_source() {
            return Ok(());
        }
        self.slots.begin_pass();
        let connected = self.source.connect(flags | self.env.flags(), &scope, self);
        self.unobserve(false);
        connected
    }

    fn rerender(&self, flags: LifecycleFlags) -> Result<()> {
        if let Some(owner) = self.owner.upgrade() {
            owner.update_target(flags)?;
        }
        self.connect_pass(flags)
    }
}

impl Bindable for ContentBinding {
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
        match (self.env.lifecycle(), self.me.upgrade()) {
            (Some(lifecycle), Some(me)) if flags.contains(LifecycleFlags::FROM_BIND) => {
                lifecycle.enqueue_connect(me);
                Ok(())
            }
            _ => self.connect_pass(flags),
        }
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.scope.borrow_mut().take() else {
            return Ok(());
        };
        let unbound = self.source.unbind(flags | self.env.flags(), &scope, self);
        self.unobserve(true);
        unbound
    }

    fn is_bound(&self) -> bool {
        self.scope.borrow().is_some()
    }
}

impl Subscriber for ContentBinding {
    fn handle_change(&self, _new: &Value, _old: &Value, flags: LifecycleFlags) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        let deferred = LifecycleFlags::IS_COLLECTION_MUTATION | LifecycleFlags::DO_NOT_UPDATE_DOM;
        if flags.intersects(deferred) {
            if let Some(me) = self.me.upgrade() {
                self.env.observer_locator().flush_queue().enqueue_flush(me);
            }
            return Ok(());
        }
        self.rerender(flags - LifecycleFlags::FROM_BIND)
    }
}

impl Flushable for ContentBinding {
    fn queue_links(&self) -> &QueueLinks {
        &self.links
    }

    fn flush(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        self.rerender(flags - LifecycleFlags::DO_NOT_UPDATE_DOM)
    }
}

impl Participant for ContentBinding {
    fn queue_links(&self) -> &QueueLinks {
        &self.links
    }

    fn connect(&self, flags: LifecycleFlags) -> Result<()> {
        self.connect_pass(flags)
    }
}

impl Connectable for ContentBinding {
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

impl BindingHost for ContentBinding {
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

impl fmt::Debug for ContentBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentBinding")
            .field("source", &self.source.to_string())
            .field("mode", &self.mode.get())
            .field("observers", &self.slots.observer_count())
            .finish()
    }
}
