#![forbid(unsafe_code)]

//! Core: values, scopes, observers and dependency tracking for Vireo.
//!
//! Everything in this crate is single-threaded (`Rc`/`RefCell`). The
//! expression evaluator lives in `vireo-expr`; the lifecycle coordinator and
//! bindings live in `vireo-runtime`.

pub mod connectable;
pub mod error;
pub mod flags;
pub mod observation;
pub mod queue;
pub mod scope;
pub mod value;

pub use connectable::{Connectable, ObserverSlots};
pub use error::{Error, ParseError, ParseErrorKind, Result};
pub use flags::{BindingMode, LifecycleFlags};
pub use observation::{IndexMap, Observer, ObserverLocator, Subscriber};
pub use queue::{FlushQueue, Flushable, ManualFlushQueue, QueueKind, QueueLinks, QueueSet};
pub use scope::{OverrideContext, Scope};
pub use value::{
    Accessor, ArrayRef, FunctionRef, Key, MapRef, ObjectRef, PropertyReader, SetRef, Value,
};
