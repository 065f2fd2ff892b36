#![forbid(unsafe_code)]

//! Bindings: an expression tied to a target.
//!
//! Every binding is bound to a [`Scope`], evaluates its expression through a
//! [`ServiceLocator`] and, depending on its mode, subscribes to the observers
//! the expression reads (see [`vireo_core::Connectable`]). Targets are plain
//! `(object, property)` pairs written through the observer the
//! [`ObserverLocator`] hands out, so a target that is itself observed
//! notifies its own subscribers.
//!
//! | Binding                  | Writes              | Observes              |
//! |--------------------------|---------------------|-----------------------|
//! | [`PropertyBinding`]      | per [`BindingMode`] | source and/or target  |
//! | [`InterpolationBinding`] | target              | every part            |
//! | [`CallBinding`]          | target (a function) | nothing               |
//! | [`Listener`]             | nothing             | nothing               |
//! | [`LetBinding`]           | scope               | source                |
//! | [`RefBinding`]           | scope               | nothing               |
//!
//! [`BindingMode`]: vireo_core::BindingMode

mod call;
mod interpolation;
mod let_binding;
mod listener;
mod property;
mod ref_binding;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use vireo_core::observation::DirtyChecker;
use vireo_core::{Error, LifecycleFlags, ObserverLocator, Result, Scope, Subscriber, Value};
use vireo_expr::ServiceLocator;

use crate::config::RuntimeConfig;
use crate::lifecycle::Lifecycle;

pub use call::CallBinding;
pub use interpolation::{ContentBinding, InterpolationBinding};
pub use let_binding::{LetBinding, LetTarget};
pub use listener::Listener;
pub use property::PropertyBinding;
pub use ref_binding::RefBinding;

/// Something that can be bound to a scope and later released.
pub trait Bindable {
    /// Bind to `scope`. Binding again to the same scope is a no-op; binding
    /// to another scope unbinds first.
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()>;

    /// Release every subscription. A no-op when not bound.
    fn unbind(&self, flags: LifecycleFlags) -> Result<()>;

    fn is_bound(&self) -> bool;
}

/// What every binding created in one view shares: the observer locator,
/// the resources and (optionally) the lifecycle that defers connects.
#[derive(Clone)]
pub struct BindingEnv {
    observer_locator: ObserverLocator,
    resources: Rc<dyn ServiceLocator>,
    lifecycle: Option<Lifecycle>,
    flags: LifecycleFlags,
}

impl BindingEnv {
    /// Bindings whose collection observers flush through `lifecycle`.
    #[must_use]
    pub fn new(lifecycle: &Lifecycle, resources: Rc<dyn ServiceLocator>) -> Self {
        let observer_locator = ObserverLocator::new(lifecycle.flush_queue());
        lifecycle
            .scheduler()
            .watch_dirty_checker(observer_locator.dirty_checker().clone());
        Self {
            observer_locator,
            resources,
            lifecycle: Some(lifecycle.clone()),
            flags: LifecycleFlags::empty(),
        }
    }

    /// As [`BindingEnv::new`], with dirty checking and strictness taken from
    /// `config`.
    #[must_use]
    pub fn from_config(
        lifecycle: &Lifecycle,
        resources: Rc<dyn ServiceLocator>,
        config: &RuntimeConfig,
    ) -> Self {
        let dirty_checker = DirtyChecker::new(config.dirty_checker());
        lifecycle.scheduler().watch_dirty_checker(dirty_checker.clone());
        Self {
            observer_locator: ObserverLocator::with_dirty_checker(
                lifecycle.flush_queue(),
                dirty_checker,
            ),
            resources,
            lifecycle: Some(lifecycle.clone()),
            flags: config.binding_flags(),
        }
    }

    /// Bindings without a lifecycle: connects happen immediately.
    #[must_use]
    pub fn detached(observer_locator: ObserverLocator, resources: Rc<dyn ServiceLocator>) -> Self {
        Self {
            observer_locator,
            resources,
            lifecycle: None,
            flags: LifecycleFlags::empty(),
        }
    }

    #[must_use]
    pub fn observer_locator(&self) -> &ObserverLocator {
        &self.observer_locator
    }

    #[must_use]
    pub fn resources(&self) -> &dyn ServiceLocator {
        &*self.resources
    }

    #[must_use]
    pub fn lifecycle(&self) -> Option<&Lifecycle> {
        self.lifecycle.as_ref()
    }

    /// Flags added to every evaluation (strictness).
    #[must_use]
    pub fn flags(&self) -> LifecycleFlags {
        self.flags
    }
}

impl std::fmt::Debug for BindingEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingEnv")
            .field("lifecycle", &self.lifecycle.as_ref().map(Lifecycle::id))
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// The scope a binding is bound to, or `UnboundScope` naming `operation`.
fn bound_scope(scope: &RefCell<Option<Scope>>, operation: &'static str) -> Result<Scope> {
    scope
        .borrow()
        .clone()
        .ok_or(Error::UnboundScope { operation })
}

/// Whether `scope` is the one already held.
fn same_scope(held: &RefCell<Option<Scope>>, scope: &Scope) -> bool {
    held.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope))
}

/// Answers notifications that arrive while a binding is being dropped.
struct Released;

impl Subscriber for Released {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) -> Result<()> {
        Ok(())
    }
}

/// The subscriber handle of a binding that holds a weak reference to itself.
pub(crate) fn subscriber_handle<T: Subscriber + 'static>(me: &Weak<T>) -> Rc<dyn Subscriber> {
    match me.upgrade() {
        Some(me) => me,
        None => Rc::new(Released),
    }
}
