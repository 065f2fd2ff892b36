#![forbid(unsafe_code)]

//! Builtin binding behaviors: `oneTime`, `toView`, `fromView`, `twoWay` and
//! `signal`.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;
use vireo_core::{BindingMode, Error, LifecycleFlags, Result, Scope, Subscriber, Value};
use vireo_expr::{BindingBehavior, BindingHost};

/// Forces a binding mode while applied; the previous mode is restored on
/// unbind.
#[derive(Debug, Clone, Copy)]
pub struct ModeBehavior {
    mode: BindingMode,
}

impl ModeBehavior {
    #[must_use]
    pub const fn new(mode: BindingMode) -> Self {
        Self { mode }
    }
}

impl BindingBehavior for ModeBehavior {
    fn bind(
        &self,
        _flags: LifecycleFlags,
        _scope: &Scope,
        binding: &dyn BindingHost,
        _args: &[Value],
    ) -> Result<()> {
        binding.applied_behaviors().save_mode(binding.mode());
        binding.set_mode(self.mode);
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

fn binding_key(subscriber: &Rc<dyn Subscriber>) -> usize {
    Rc::as_ptr(subscriber).cast::<()>() as usize
}

/// `expr & signal:'a':'b'` re-evaluates the binding whenever one of the
/// named signals is dispatched.
#[derive(Default)]
pub struct SignalBehavior {
    /// Signal names per bound binding.
    applied: RefCell<FxHashMap<usize, Vec<Rc<str>>>>,
}

impl SignalBehavior {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BindingBehavior for SignalBehavior {
    fn bind(
        &self,
        _flags: LifecycleFlags,
        _scope: &Scope,
        binding: &dyn BindingHost,
        args: &[Value],
    ) -> Result<()> {
        if args.is_empty() {
            return Err(Error::hook("signal behavior requires at least one signal name"));
        }
        let Some(signaler) = binding.service_locator().signaler() else {
            return Err(Error::hook("signal behavior requires a signaler"));
        };
        let subscriber = binding.as_subscriber();
        let names: Vec<Rc<str>> = args
            .iter()
            .map(|arg| Rc::from(arg.to_display_string()))
            .collect();
        for name in &names {
            signaler.add_signal_listener(name, Rc::clone(&subscriber));
        }
        debug!(signals = names.len(), "signal behavior bound");
        self.applied.borrow_mut().insert(binding_key(&subscriber), names);
        Ok(())
    }

    fn unbind(
        &self,
        _flags: LifecycleFlags,
        _scope: &Scope,
        binding: &dyn BindingHost,
    ) -> Result<()> {
        let subscriber = binding.as_subscriber();
        let names = self.applied.borrow_mut().remove(&binding_key(&subscriber));
        if let (Some(names), Some(signaler)) = (names, binding.service_locator().signaler()) {
            for name in &names {
                signaler.remove_signal_listener(name, &subscriber);
            }
        }
        Ok(())
    }
}
