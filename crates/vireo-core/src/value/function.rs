#![forbid(unsafe_code)]

//! Native functions callable from expressions.

use std::fmt;
use std::rc::Rc;

use super::Value;
use super::object::next_object_id;
use crate::error::Result;

/// Signature of a native function: `(this, args) -> result`.
pub type NativeFn = dyn Fn(&Value, &[Value]) -> Result<Value>;

struct FunctionData {
    id: u64,
    name: Rc<str>,
    call: Box<NativeFn>,
}

/// Shared handle to a named native closure.
#[derive(Clone)]
pub struct FunctionRef(Rc<FunctionData>);

impl FunctionRef {
    pub fn new(
        name: &str,
        call: impl Fn(&Value, &[Value]) -> Result<Value> + 'static,
    ) -> Self {
        Self(Rc::new(FunctionData {
            id: next_object_id(),
            name: Rc::from(name),
            call: Box::new(call),
        }))
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[must_use]
    pub fn name(&self) -> Rc<str> {
        Rc::clone(&self.0.name)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &FunctionRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Invoke with an explicit receiver.
    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
        (self.0.call)(this, args)
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function {}]", self.0.name)
    }
}
