#![forbid(unsafe_code)]

//! Iteration and destructuring for `declaration of iterable`.

use std::rc::Rc;

use vireo_core::value::number_to_index;
use vireo_core::{Error, LifecycleFlags, ObjectRef, Result, Value};

use crate::ast::Expr;

/// Number of items [`iterate`] would visit.
#[must_use]
pub fn count(value: &Value) -> usize {
    match value {
        Value::Array(array) => array.len(),
        Value::Map(map) => map.len(),
        Value::Set(set) => set.len(),
        Value::Number(n) => number_to_index(n.trunc()).unwrap_or(0),
        _ => 0,
    }
}

/// Visit the items of `value`: array items, map `[key, value]` pairs, set
/// items, `0..n` for a number. Anything else is empty.
///
/// Items are snapshotted first, so `f` may mutate the collection.
pub fn iterate(value: &Value, mut f: impl FnMut(usize, Value) -> Result<()>) -> Result<()> {
    let items = match value {
        Value::Array(array) => array.to_vec(),
        Value::Map(map) => map.entries(),
        Value::Set(set) => set.to_vec(),
        Value::Number(_) => (0..count(value)).map(Value::from).collect(),
        _ => return Ok(()),
    };
    items
        .into_iter()
        .enumerate()
        .try_for_each(|(index, item)| f(index, item))
}

impl Expr {
    /// Bind `item` into `target` following this declaration. Identifiers
    /// take the whole item, array patterns destructure by position, object
    /// patterns by key.
    pub fn bind_declaration(
        &self,
        flags: LifecycleFlags,
        target: &ObjectRef,
        item: Value,
    ) -> Result<()> {
        match self {
            Self::BindingIdentifier { name } => target.set(name, item, flags),
            Self::ArrayBindingPattern { elements } => {
                for (index, element) in elements.iter().enumerate() {
                    let part = item.get_keyed(&Value::from(index));
                    element.bind_declaration(flags, target, part)?;
                }
                Ok(())
            }
            Self::ObjectBindingPattern { keys, values } => {
                for (key, value) in keys.iter().zip(values) {
                    value.bind_declaration(flags, target, item.get_property(key))?;
                }
                Ok(())
            }
            Self::ForOfStatement { declaration, .. } => {
                declaration.bind_declaration(flags, target, item)
            }
            other => Err(Error::NotAssignable {
                kind: other.kind().name(),
            }),
        }
    }

    /// Names a declaration introduces, in source order.
    #[must_use]
    pub fn declared_names(&self) -> Vec<Rc<str>> {
        let mut names = Vec::new();
        self.collect_declared(&mut names);
        names
    }

    fn collect_declared(&self, names: &mut Vec<Rc<str>>) {
        match self {
            Self::BindingIdentifier { name } => names.push(Rc::clone(name)),
            Self::ArrayBindingPattern { elements } => {
                elements.iter().for_each(|e| e.collect_declared(names));
            }
            Self::ObjectBindingPattern { values, .. } => {
                values.iter().for_each(|e| e.collect_declared(names));
            }
            Self::ForOfStatement { declaration, .. } => declaration.collect_declared(names),
            _ => {}
        }
    }
}
