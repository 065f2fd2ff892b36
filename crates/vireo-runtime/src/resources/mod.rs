#![forbid(unsafe_code)]

//! Named value converters and binding behaviors.
//!
//! A [`ResourceRegistry`] is the [`ServiceLocator`] handed to every binding.
//! Lookups happen at bind time, so registering a resource after a binding
//! was bound has no effect on that binding until it rebinds.

mod behaviors;
mod signaler;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;
use vireo_core::BindingMode;
use vireo_expr::{BindingBehavior, ServiceLocator, Signaler, ValueConverter};

pub use behaviors::{ModeBehavior, SignalBehavior};
pub use signaler::SignalDispatcher;

#[derive(Default)]
pub struct ResourceRegistry {
    converters: RefCell<FxHashMap<Rc<str>, Rc<dyn ValueConverter>>>,
    behaviors: RefCell<FxHashMap<Rc<str>, Rc<dyn BindingBehavior>>>,
    signals: Rc<SignalDispatcher>,
}

impl ResourceRegistry {
    /// An empty registry with its own signal dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the mode behaviors (`oneTime`, `toView`, `fromView`,
    /// `twoWay`) and `signal` registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for (name, mode) in [
            ("oneTime", BindingMode::OneTime),
            ("toView", BindingMode::ToView),
            ("fromView", BindingMode::FromView),
            ("twoWay", BindingMode::TwoWay),
        ] {
            registry.register_behavior(name, Rc::new(ModeBehavior::new(mode)));
        }
        registry.register_behavior("signal", Rc::new(SignalBehavior::new()));
        registry
    }

    /// Register (or replace) a value converter.
    pub fn register_converter(&self, name: &str, converter: Rc<dyn ValueConverter>) {
        debug!(name, "register value converter");
        self.converters.borrow_mut().insert(Rc::from(name), converter);
    }

    /// Register (or replace) a binding behavior.
    pub fn register_behavior(&self, name: &str, behavior: Rc<dyn BindingBehavior>) {
        debug!(name, "register binding behavior");
        self.behaviors.borrow_mut().insert(Rc::from(name), behavior);
    }

    #[must_use]
    pub fn signal_dispatcher(&self) -> &Rc<SignalDispatcher> {
        &self.signals
    }

    #[must_use]
    pub fn converter_count(&self) -> usize {
        self.converters.borrow().len()
    }

    #[must_use]
    pub fn behavior_count(&self) -> usize {
        self.behaviors.borrow().len()
    }
}

impl ServiceLocator for ResourceRegistry {
    fn value_converter(&self, name: &str) -> Option<Rc<dyn ValueConverter>> {
        self.converters.borrow().get(name).cloned()
    }

    fn binding_behavior(&self, name: &str) -> Option<Rc<dyn BindingBehavior>> {
        self.behaviors.borrow().get(name).cloned()
    }

    fn signaler(&self) -> Option<Rc<dyn Signaler>> {
        Some(Rc::clone(&self.signals) as Rc<dyn Signaler>)
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut converters: Vec<Rc<str>> = self.converters.borrow().keys().cloned().collect();
        let mut behaviors: Vec<Rc<str>> = self.behaviors.borrow().keys().cloned().collect();
        converters.sort();
        behaviors.sort();
        f.debug_struct("ResourceRegistry")
            .field("converters", &converters)
            .field("behaviors", &behaviors)
            .finish_non_exhaustive()
    }
}
