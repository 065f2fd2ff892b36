#![forbid(unsafe_code)]

//! Evaluation, assignment and dependency collection over [`Expr`].
//!
//! # Design
//!
//! The four walks share one shape: each is a `match` over the node kind
//! that recurses into children. They stay separate because they differ in
//! what a read means:
//!
//! - `evaluate` reads values.
//! - `assign` writes through lvalue kinds.
//! - `connect` evaluates just enough of the tree to know which
//!   object properties and collections the value depends on, and registers
//!   each one with the connectable. `&&`, `||` and `?:` connect only the
//!   branch that was taken.
//! - `bind` / `unbind` apply and remove binding behaviors and converter
//!   signals.
//!
//! # Failure Modes
//!
//! Calling something that is not a function yields `Undefined`, unless the
//! flags request strict evaluation (`MUST_EVALUATE` or
//! `IS_STRICT_BINDING_STRATEGY`), in which case it fails with
//! [`Error::NotAFunction`]. Assigning to a non-lvalue always fails with
//! [`Error::NotAssignable`].
//!
//! Member and keyed access on `null` or `undefined` never fail. Under
//! strict flags they yield the nullish object itself, otherwise
//! `Undefined`.

use std::rc::Rc;

use tracing::trace;
use vireo_core::{ArrayRef, Error, LifecycleFlags, ObjectRef, Result, Scope, Value};

use crate::ast::{BinaryOp, Expr};
use crate::builtins::{call_builtin, is_builtin};
use crate::resources::{BindingHost, ServiceLocator, ValueConverter};

fn strict(flags: LifecycleFlags) -> bool {
    flags.intersects(LifecycleFlags::MUST_EVALUATE | LifecycleFlags::IS_STRICT_BINDING_STRATEGY)
}

fn not_callable(flags: LifecycleFlags, name: &str) -> Result<Value> {
    if strict(flags) {
        Err(Error::not_a_function(name))
    } else {
        Ok(Value::Undefined)
    }
}

fn converter(locator: &dyn ServiceLocator, name: &str) -> Result<Rc<dyn ValueConverter>> {
    locator
        .value_converter(name)
        .ok_or_else(|| Error::MissingValueConverter {
            name: name.to_owned(),
        })
}

fn evaluate_all(
    exprs: &[Expr],
    flags: LifecycleFlags,
    scope: &Scope,
    locator: &dyn ServiceLocator,
) -> Result<Vec<Value>> {
    exprs
        .iter()
        .map(|expr| expr.evaluate(flags, scope, locator))
        .collect()
}

fn concat_template(cooked: &[Rc<str>], values: &[Value], interpolate: bool) -> Value {
    let mut out = String::new();
    for (i, text) in cooked.iter().enumerate() {
        out.push_str(text);
        if let Some(value) = values.get(i) {
            if interpolate {
                out.push_str(&value.to_interpolation_string());
            } else {
                out.push_str(&value.to_display_string());
            }
        }
    }
    Value::string(out)
}

impl Expr {
    /// Evaluate against `scope`, resolving resources through `locator`.
    pub fn evaluate(
        &self,
        flags: LifecycleFlags,
        scope: &Scope,
        locator: &dyn ServiceLocator,
    ) -> Result<Value> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::AccessThis { ancestor } => Ok(scope.access_this(*ancestor)),
            Self::AccessScope { name, ancestor } => {
                Ok(scope.resolve(name, *ancestor, flags).get_property(name))
            }
            Self::AccessMember { object, name } => {
                let object = object.evaluate(flags, scope, locator)?;
                if object.is_nullish() {
                    return Ok(if strict(flags) { object } else { Value::Undefined });
                }
                Ok(object.get_property(name))
            }
            Self::AccessKeyed { object, key } => {
                let object = object.evaluate(flags, scope, locator)?;
                if object.is_nullish() {
                    return Ok(if strict(flags) { object } else { Value::Undefined });
                }
                let key = key.evaluate(flags, scope, locator)?;
                Ok(object.get_keyed(&key))
            }
            Self::CallScope {
                name,
                args,
                ancestor,
            } => {
                let context = scope.resolve(name, *ancestor, flags);
                match context.get_property(name) {
                    Value::Function(func) => {
                        let args = evaluate_all(args, flags, scope, locator)?;
                        func.call(&context, &args)
                    }
                    _ => not_callable(flags, name),
                }
            }
            Self::CallMember { object, name, args } => {
                let object = object.evaluate(flags, scope, locator)?;
                if let Value::Function(func) = object.get_property(name) {
                    let args = evaluate_all(args, flags, scope, locator)?;
                    return func.call(&object, &args);
                }
                if is_builtin(&object, name) {
                    let args = evaluate_all(args, flags, scope, locator)?;
                    return call_builtin(flags, &object, name, &args)
                        .unwrap_or(Ok(Value::Undefined));
                }
                not_callable(flags, name)
            }
            Self::CallFunction { func, args } => match func.evaluate(flags, scope, locator)? {
                Value::Function(f) => {
                    let args = evaluate_all(args, flags, scope, locator)?;
                    f.call(&Value::Undefined, &args)
                }
                _ => not_callable(flags, &func.to_string()),
            },
            Self::Binary { op, left, right } => {
                let left = left.evaluate(flags, scope, locator)?;
                match op {
                    BinaryOp::And if !left.is_truthy() => Ok(left),
                    BinaryOp::Or if left.is_truthy() => Ok(left),
                    BinaryOp::And | BinaryOp::Or => right.evaluate(flags, scope, locator),
                    _ => {
                        let right = right.evaluate(flags, scope, locator)?;
                        Ok(op.kernel()(&left, &right))
                    }
                }
            }
            Self::Unary { op, operand } => Ok(op.apply(&operand.evaluate(flags, scope, locator)?)),
            Self::Conditional { condition, yes, no } => {
                if condition.evaluate(flags, scope, locator)?.is_truthy() {
                    yes.evaluate(flags, scope, locator)
                } else {
                    no.evaluate(flags, scope, locator)
                }
            }
            Self::Assign { target, value } => {
                let value = value.evaluate(flags, scope, locator)?;
                target.assign(flags, scope, locator, value)
            }
            Self::ArrayLiteral { elements } => {
                let items = evaluate_all(elements, flags, scope, locator)?;
                Ok(Value::Array(ArrayRef::from_values(items)))
            }
            Self::ObjectLiteral { keys, values } => {
                let object = ObjectRef::new();
                for (key, value) in keys.iter().zip(values) {
                    object.insert(key, value.evaluate(flags, scope, locator)?);
                }
                Ok(Value::Object(object))
            }
            Self::Template {
                cooked,
                expressions,
            } => {
                let values = evaluate_all(expressions, flags, scope, locator)?;
                Ok(concat_template(cooked, &values, false))
            }
            Self::TaggedTemplate {
                func,
                cooked,
                expressions,
            } => match func.evaluate(flags, scope, locator)? {
                Value::Function(f) => {
                    let strings: Vec<Value> = cooked.iter().cloned().map(Value::String).collect();
                    let mut args = vec![Value::Array(ArrayRef::from_values(strings))];
                    args.extend(evaluate_all(expressions, flags, scope, locator)?);
                    f.call(&Value::Undefined, &args)
                }
                _ => not_callable(flags, &func.to_string()),
            },
            Self::ForOfStatement { iterable, .. } => iterable.evaluate(flags, scope, locator),
            Self::Interpolation { parts, expressions } => {
                let values = evaluate_all(expressions, flags, scope, locator)?;
                Ok(concat_template(parts, &values, true))
            }
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                let converter = converter(locator, name)?;
                let value = expression.evaluate(flags, scope, locator)?;
                let args = evaluate_all(args, flags, scope, locator)?;
                converter.to_view(value, &args)
            }
            Self::BindingBehavior { expression, .. } => expression.evaluate(flags, scope, locator),
            Self::BindingIdentifier { name } => Ok(Value::String(Rc::clone(name))),
            Self::ArrayBindingPattern { .. } | Self::ObjectBindingPattern { .. } => {
                Ok(Value::Undefined)
            }
        }
    }

    /// Write `value` through this expression. Returns the assigned value.
    pub fn assign(
        &self,
        flags: LifecycleFlags,
        scope: &Scope,
        locator: &dyn ServiceLocator,
        value: Value,
    ) -> Result<Value> {
        match self {
            Self::AccessScope { name, ancestor } => {
                let context = scope.resolve(name, *ancestor, flags);
                context.set_property(name, value.clone(), flags)?;
                Ok(value)
            }
            Self::AccessMember { object, name } => {
                let mut target = object.evaluate(flags, scope, locator)?;
                if target.is_nullish() && object.is_assignable() {
                    target = Value::Object(ObjectRef::new());
                    object.assign(flags, scope, locator, target.clone())?;
                }
                target.set_property(name, value.clone(), flags)?;
                Ok(value)
            }
            Self::AccessKeyed { object, key } => {
                let target = object.evaluate(flags, scope, locator)?;
                let key = key.evaluate(flags, scope, locator)?;
                target.set_keyed(&key, value.clone(), flags)?;
                Ok(value)
            }
            Self::Assign {
                target,
                value: inner,
            } => {
                inner.assign(flags, scope, locator, value.clone())?;
                target.assign(flags, scope, locator, value)
            }
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                let converter = converter(locator, name)?;
                let args = evaluate_all(args, flags, scope, locator)?;
                let value = converter.from_view(value, &args)?;
                expression.assign(flags, scope, locator, value)
            }
            Self::BindingBehavior { expression, .. } => {
                expression.assign(flags, scope, locator, value)
            }
            other => Err(Error::NotAssignable {
                kind: other.kind().name(),
            }),
        }
    }

    /// Register every observable read with `binding`.
    pub fn connect(
        &self,
        flags: LifecycleFlags,
        scope: &Scope,
        binding: &dyn BindingHost,
    ) -> Result<()> {
        let locator = binding.service_locator();
        match self {
            Self::Literal(_)
            | Self::AccessThis { .. }
            | Self::BindingIdentifier { .. }
            | Self::ArrayBindingPattern { .. }
            | Self::ObjectBindingPattern { .. } => Ok(()),
            Self::AccessScope { name, ancestor } => {
                let context = scope.resolve(name, *ancestor, flags);
                binding.observe_property(flags, &context, name)
            }
            Self::AccessMember { object, name } => {
                object.connect(flags, scope, binding)?;
                let object = object.evaluate(flags, scope, locator)?;
                if object.is_nullish() {
                    return Ok(());
                }
                binding.observe_property(flags, &object, name)
            }
            Self::AccessKeyed { object, key } => {
                object.connect(flags, scope, binding)?;
                let object = object.evaluate(flags, scope, locator)?;
                if object.is_nullish() {
                    return Ok(());
                }
                key.connect(flags, scope, binding)?;
                match (&object, key.evaluate(flags, scope, locator)?) {
                    (Value::Array(_), Value::Number(_)) => {
                        binding.observe_collection(flags, &object)
                    }
                    (_, key) => binding.observe_property(flags, &object, &key.to_display_string()),
                }
            }
            Self::CallScope {
                name,
                args,
                ancestor,
            } => {
                let context = scope.resolve(name, *ancestor, flags);
                if context.get_property(name).is_function() {
                    connect_all(args, flags, scope, binding)?;
                }
                Ok(())
            }
            Self::CallMember { object, name, args } => {
                object.connect(flags, scope, binding)?;
                let object = object.evaluate(flags, scope, locator)?;
                if object.get_property(name).is_function() {
                    return connect_all(args, flags, scope, binding);
                }
                if is_builtin(&object, name) {
                    if matches!(object, Value::Array(_) | Value::Map(_) | Value::Set(_)) {
                        binding.observe_collection(flags, &object)?;
                    }
                    connect_all(args, flags, scope, binding)?;
                }
                Ok(())
            }
            Self::CallFunction { func, args } => {
                func.connect(flags, scope, binding)?;
                if func.evaluate(flags, scope, locator)?.is_function() {
                    connect_all(args, flags, scope, binding)?;
                }
                Ok(())
            }
            Self::Binary { op, left, right } => {
                left.connect(flags, scope, binding)?;
                let taken = match op {
                    BinaryOp::And => left.evaluate(flags, scope, locator)?.is_truthy(),
                    BinaryOp::Or => !left.evaluate(flags, scope, locator)?.is_truthy(),
                    _ => true,
                };
                if taken {
                    right.connect(flags, scope, binding)?;
                }
                Ok(())
            }
            Self::Unary { operand, .. } => operand.connect(flags, scope, binding),
            Self::Conditional { condition, yes, no } => {
                condition.connect(flags, scope, binding)?;
                if condition.evaluate(flags, scope, locator)?.is_truthy() {
                    yes.connect(flags, scope, binding)
                } else {
                    no.connect(flags, scope, binding)
                }
            }
            Self::Assign { value, .. } => value.connect(flags, scope, binding),
            Self::ArrayLiteral { elements } => connect_all(elements, flags, scope, binding),
            Self::ObjectLiteral { values, .. } => connect_all(values, flags, scope, binding),
            Self::Template { expressions, .. } | Self::Interpolation { expressions, .. } => {
                connect_all(expressions, flags, scope, binding)
            }
            Self::TaggedTemplate {
                func, expressions, ..
            } => {
                func.connect(flags, scope, binding)?;
                connect_all(expressions, flags, scope, binding)
            }
            Self::ForOfStatement { iterable, .. } => iterable.connect(flags, scope, binding),
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                let converter = converter(locator, name)?;
                expression.connect(flags, scope, binding)?;
                connect_all(args, flags, scope, binding)?;
                let signals = converter.signals();
                if !signals.is_empty() {
                    if let Some(signaler) = locator.signaler() {
                        let subscriber = binding.as_subscriber();
                        for signal in signals {
                            trace!(converter = %name, signal = %signal, "listening to signal");
                            signaler.add_signal_listener(signal, Rc::clone(&subscriber));
                        }
                    }
                }
                Ok(())
            }
            Self::BindingBehavior {
                expression, args, ..
            } => {
                expression.connect(flags, scope, binding)?;
                connect_all(args, flags, scope, binding)
            }
        }
    }

    /// Apply binding behaviors, innermost first.
    pub fn bind(
        &self,
        flags: LifecycleFlags,
        scope: &Scope,
        binding: &dyn BindingHost,
    ) -> Result<()> {
        match self {
            Self::BindingBehavior {
                expression,
                name,
                args,
            } => {
                expression.bind(flags, scope, binding)?;
                let locator = binding.service_locator();
                let Some(behavior) = locator.binding_behavior(name) else {
                    return Err(Error::MissingBindingBehavior {
                        name: name.to_string(),
                    });
                };
                binding.applied_behaviors().mark(name)?;
                let applied = evaluate_all(args, flags, scope, locator)
                    .and_then(|args| behavior.bind(flags, scope, binding, &args));
                if applied.is_err() {
                    binding.applied_behaviors().unmark(name);
                }
                applied
            }
            Self::ValueConverter { expression, .. } => expression.bind(flags, scope, binding),
            _ => Ok(()),
        }
    }

    /// Remove behaviors and converter signal listeners, outermost first.
    pub fn unbind(
        &self,
        flags: LifecycleFlags,
        scope: &Scope,
        binding: &dyn BindingHost,
    ) -> Result<()> {
        let locator = binding.service_locator();
        match self {
            Self::BindingBehavior {
                expression, name, ..
            } => {
                if binding.applied_behaviors().contains(name) {
                    if let Some(behavior) = locator.binding_behavior(name) {
                        behavior.unbind(flags, scope, binding)?;
                    }
                    binding.applied_behaviors().unmark(name);
                }
                expression.unbind(flags, scope, binding)
            }
            Self::ValueConverter {
                expression, name, ..
            } => {
                if let (Some(converter), Some(signaler)) =
                    (locator.value_converter(name), locator.signaler())
                {
                    let subscriber = binding.as_subscriber();
                    for signal in converter.signals() {
                        signaler.remove_signal_listener(signal, &subscriber);
                    }
                }
                expression.unbind(flags, scope, binding)
            }
            _ => Ok(()),
        }
    }
}

fn connect_all(
    exprs: &[Expr],
    flags: LifecycleFlags,
    scope: &Scope,
    binding: &dyn BindingHost,
) -> Result<()> {
    exprs
        .iter()
        .try_for_each(|expr| expr.connect(flags, scope, binding))
}
