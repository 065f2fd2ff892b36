#![forbid(unsafe_code)]

//! Contracts for pluggable value converters, binding behaviors and signals.
//!
//! The evaluator only invokes these traits. Registries and builtin
//! implementations live in `vireo-runtime`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use smallvec::SmallVec;
use vireo_core::{
    BindingMode, Connectable, Error, LifecycleFlags, Result, Scope, Subscriber, Value,
};

/// Transforms values flowing between source and target.
pub trait ValueConverter {
    /// Source → target.
    fn to_view(&self, value: Value, args: &[Value]) -> Result<Value>;

    /// Target → source. Converters without a reverse direction pass the
    /// value through.
    fn from_view(&self, value: Value, _args: &[Value]) -> Result<Value> {
        Ok(value)
    }

    /// Signal names that force re-evaluation of bindings using this
    /// converter.
    fn signals(&self) -> &[Rc<str>] {
        &[]
    }
}

/// Adjusts a binding while it is bound.
pub trait BindingBehavior {
    fn bind(
        &self,
        flags: LifecycleFlags,
        scope: &Scope,
        binding: &dyn BindingHost,
        args: &[Value],
    ) -> Result<()>;

    fn unbind(&self, flags: LifecycleFlags, scope: &Scope, binding: &dyn BindingHost)
    -> Result<()>;
}

/// Named-signal fan-out.
pub trait Signaler {
    fn add_signal_listener(&self, name: &str, listener: Rc<dyn Subscriber>);

    fn remove_signal_listener(&self, name: &str, listener: &Rc<dyn Subscriber>);
}

/// Resource lookup by name.
pub trait ServiceLocator {
    fn value_converter(&self, name: &str) -> Option<Rc<dyn ValueConverter>>;

    fn binding_behavior(&self, name: &str) -> Option<Rc<dyn BindingBehavior>>;

    fn signaler(&self) -> Option<Rc<dyn Signaler>> {
        None
    }
}

/// A locator with no resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResources;

impl ServiceLocator for NoResources {
    fn value_converter(&self, _name: &str) -> Option<Rc<dyn ValueConverter>> {
        None
    }

    fn binding_behavior(&self, _name: &str) -> Option<Rc<dyn BindingBehavior>> {
        None
    }
}

/// Book-keeping of the behaviors applied to one binding.
#[derive(Debug, Default)]
pub struct AppliedBehaviors {
    names: RefCell<SmallVec<[Rc<str>; 2]>>,
    saved_mode: Cell<Option<BindingMode>>,
}

impl AppliedBehaviors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name`; fails if it is already applied.
    pub fn mark(&self, name: &Rc<str>) -> Result<()> {
        let mut names = self.names.borrow_mut();
        if names.iter().any(|n| n == name) {
            return Err(Error::BehaviorAlreadyApplied {
                name: name.to_string(),
            });
        }
        names.push(Rc::clone(name));
        Ok(())
    }

    pub fn unmark(&self, name: &str) {
        self.names.borrow_mut().retain(|n| &**n != name);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.borrow().iter().any(|n| &**n == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remember the mode a mode-overriding behavior replaced. Only the first
    /// save sticks until [`Self::take_saved_mode`].
    pub fn save_mode(&self, mode: BindingMode) {
        if self.saved_mode.get().is_none() {
            self.saved_mode.set(Some(mode));
        }
    }

    pub fn take_saved_mode(&self) -> Option<BindingMode> {
        self.saved_mode.take()
    }
}

/// The binding side of converter and behavior wrappers: a connectable that
/// can reach resources and whose mode behaviors may change.
pub trait BindingHost: Connectable {
    fn service_locator(&self) -> &dyn ServiceLocator;

    fn mode(&self) -> BindingMode;

    fn set_mode(&self, mode: BindingMode);

    fn applied_behaviors(&self) -> &AppliedBehaviors;
}
