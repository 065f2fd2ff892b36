#![forbid(unsafe_code)]

//! Call bindings: `target[property]` becomes a function evaluating the
//! expression.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use vireo_core::{
    BindingMode, Connectable, FunctionRef, LifecycleFlags, ObjectRef, ObserverLocator,
    ObserverSlots, Result, Scope, Subscriber, Value,
};
use vireo_expr::{AppliedBehaviors, BindingHost, Expr, ServiceLocator};

use super::{Bindable, BindingEnv, bound_scope, same_scope, subscriber_handle};

/// Installs a function on the target. Calling it with an object argument
/// exposes that object's keys as locals while the expression runs, so
/// `on-save.call="save(item, $reason)"` can be invoked as
/// `fn({ $reason: 'blur' })`.
pub struct CallBinding {
    me: Weak<CallBinding>,
    env: BindingEnv,
    source: Rc<Expr>,
    target: Value,
    property: Rc<str>,
    mode: Cell<BindingMode>,
    behaviors: AppliedBehaviors,
    slots: ObserverSlots,
    scope: RefCell<Option<Scope>>,
}

impl CallBinding {
    #[must_use]
    pub fn new(env: BindingEnv, source: Rc<Expr>, target: Value, property: &str) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            env,
            source,
            target,
            property: Rc::from(property),
            mode: Cell::new(BindingMode::ToView),
            behaviors: AppliedBehaviors::new(),
            slots: ObserverSlots::new(),
            scope: RefCell::new(None),
        })
    }

    /// Evaluate the expression with the keys of `args` (when it is an
    /// object) as locals. Existing locals of the same name are restored
    /// afterwards.
    pub fn call_source(&self, args: &Value) -> Result<Value> {
        let scope = bound_scope(&self.scope, "calling")?;
        let locals = scope.locals();
        let overrides: Vec<(Rc<str>, Value)> = match args.as_object() {
            Some(object) => object
                .keys()
                .into_iter()
                .map(|key| {
                    let value = object.get(&key);
                    (key, value)
                })
                .collect(),
            None => Vec::new(),
        };
        let saved = shadow_locals(locals, &overrides);
        let flags = LifecycleFlags::MUST_EVALUATE | self.env.flags();
        let result = self.source.evaluate(flags, &scope, self.env.resources());
        restore_locals(locals, saved);
        result
    }
}

/// Set each override on `locals`, returning what was there before.
pub(super) fn shadow_locals(
    locals: &ObjectRef,
    overrides: &[(Rc<str>, Value)],
) -> Vec<(Rc<str>, Option<Value>)> {
    overrides
        .iter()
        .map(|(key, value)| {
            let previous = locals.has(key).then(|| locals.get(key));
            locals.insert(key, value.clone());
            (Rc::clone(key), previous)
        })
        .collect()
}

pub(super) fn restore_locals(locals: &ObjectRef, saved: Vec<(Rc<str>, Option<Value>)>) {
    for (key, previous) in saved.into_iter().rev() {
        match previous {
            Some(value) => locals.insert(&key, value),
            None => {
                locals.remove(&key);
            }
        }
    }
}

impl Bindable for CallBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if self.is_bound() {
            if same_scope(&self.scope, scope) {
                return Ok(());
            }
            self.unbind(flags)?;
        }
        *self.scope.borrow_mut() = Some(scope.clone());
        self.source.bind(flags | self.env.flags(), scope, self)?;
        let me = self.me.clone();
        let function = FunctionRef::new(&self.property, move |_this, args| match me.upgrade() {
            Some(binding) => binding.call_source(args.first().unwrap_or(&Value::Undefined)),
            None => Ok(Value::Undefined),
        });
        self.target
            .set_property(&self.property, Value::Function(function), flags)
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.scope.borrow_mut().take() else {
            return Ok(());
        };
        self.target
            .set_property(&self.property, Value::Null, flags)?;
        self.source.unbind(flags | self.env.flags(), &scope, self)
    }

    fn is_bound(&self) -> bool {
        self.scope.borrow().is_some()
    }
}

impl Subscriber for CallBinding {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) -> Result<()> {
        Ok(())
    }
}

impl Connectable for CallBinding {
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

impl BindingHost for CallBinding {
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

impl fmt::Debug for CallBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallBinding")
            .field("source", &self.source.to_string())
            .field("property", &self.property)
            .field("bound", &self.is_bound())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceRegistry;
    use vireo_core::{Error, ManualFlushQueue};
    use vireo_expr::{BindingType, parse};

    fn env() -> BindingEnv {
        let locator = ObserverLocator::new(Rc::new(ManualFlushQueue::new()));
        BindingEnv::detached(locator, Rc::new(ResourceRegistry::new()))
    }

    fn model() -> ObjectRef {
        let model = ObjectRef::from_pairs([("count", Value::from(0))]);
        let handle = model.clone();
        let add = FunctionRef::new("add", move |_, args| {
            let next = handle.get("count").to_number() + args[0].to_number();
            handle.insert("count", Value::Number(next));
            Ok(Value::Number(next))
        });
        model.insert("add", Value::Function(add));
        model
    }

    #[test]
    fn installed_function_exposes_argument_keys_as_locals() {
        let model = model();
        let target = ObjectRef::new();
        let expr = Rc::new(parse("add($step)", BindingType::IS_FUNCTION).unwrap());
        let binding = CallBinding::new(env(), expr, Value::Object(target.clone()), "onStep");
        let scope = Scope::new(Value::Object(model.clone()));
        binding.bind(LifecycleFlags::empty(), &scope).unwrap();

        let Value::Function(function) = target.get("onStep") else {
            panic!("target holds no function");
        };
        let args = Value::Object(ObjectRef::from_pairs([("$step", Value::from(3))]));
        let out = function.call(&Value::Undefined, &[args]).unwrap();
        assert_eq!(out, Value::Number(3.0));
        assert_eq!(model.get("count"), Value::Number(3.0));
        assert!(!scope.locals().has("$step"));

        binding.unbind(LifecycleFlags::empty()).unwrap();
        assert_eq!(target.get("onStep"), Value::Null);
        assert!(matches!(
            binding.call_source(&Value::Undefined),
            Err(Error::UnboundScope { .. })
        ));
    }

    #[test]
    fn calling_a_missing_function_fails() {
        let target = ObjectRef::new();
        let expr = Rc::new(parse("missing()", BindingType::IS_FUNCTION).unwrap());
        let binding = CallBinding::new(env(), expr, Value::Object(target), "run");
        binding
            .bind(LifecycleFlags::empty(), &Scope::new(Value::Object(ObjectRef::new())))
            .unwrap();
        assert!(matches!(
            binding.call_source(&Value::Undefined),
            Err(Error::NotAFunction { .. })
        ));
    }

    #[test]
    fn shadowed_locals_are_restored() {
        let locals = ObjectRef::from_pairs([("$x", Value::from(1))]);
        let saved = shadow_locals(
            &locals,
            &[(Rc::from("$x"), Value::from(2)), (Rc::from("$y"), Value::from(3))],
        );
        assert_eq!(locals.get("$x"), Value::Number(2.0));
        restore_locals(&locals, saved);
        assert_eq!(locals.get("$x"), Value::Number(1.0));
        assert!(!locals.has("$y"));
    }
}
