#![forbid(unsafe_code)]

use std::rc::Rc;

use super::{Observer, Subscriber};
use crate::error::Result;
use crate::flags::LifecycleFlags;
use crate::value::Value;

/// Observer for a read on a primitive. Primitives are immutable, so this
/// observer never notifies, ignores writes and is never cached.
#[derive(Debug, Clone)]
pub struct PrimitiveObserver {
    value: Value,
}

impl PrimitiveObserver {
    #[must_use]
    pub fn new(target: &Value, key: &str) -> Self {
        Self {
            value: target.get_property(key),
        }
    }
}

impl Observer for PrimitiveObserver {
    fn get_value(&self) -> Value {
        self.value.clone()
    }

    fn set_value(&self, _value: Value, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn subscribe(&self, _subscriber: Rc<dyn Subscriber>) {}

    fn unsubscribe(&self, _subscriber: &Rc<dyn Subscriber>) {}

    fn subscriber_count(&self) -> usize {
        0
    }
}
