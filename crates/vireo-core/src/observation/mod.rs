#![forbid(unsafe_code)]

//! Change detection for properties, computed properties and collections.
//!
//! - [`PropertyObserver`]: plain data properties, intercepted through
//!   [`ObjectRef::set`](crate::value::ObjectRef::set).
//! - [`SetterObserver`]: accessors with a setter.
//! - [`GetterObserver`]: getters, observed through dependency collection.
//! - [`ArrayObserver`], [`MapObserver`], [`SetObserver`]: collections, with
//!   an [`IndexMap`] describing each batch of mutations.
//! - [`CollectionLengthObserver`], [`CollectionSizeObserver`]: `length`/`size`.
//! - [`DirtyCheckProperty`]: polling fallback for properties that cannot be
//!   intercepted.
//! - [`PrimitiveObserver`]: reads on primitives, which never change.
//!
//! Observers are created lazily by the [`ObserverLocator`] and cached on the
//! observed object, so every binding reading `obj.key` shares one observer.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in subscription order, from a snapshot taken
//!    before the first callback (subscribing during notification affects only
//!    the next notification).
//! 2. Writing a value SameValue-equal to the current one notifies nobody.
//! 3. A subscriber is held at most once per observer.

mod array;
mod dirty_check;
mod getter;
mod index_map;
mod length;
mod locator;
mod map;
mod primitive;
mod property;
mod set;
mod subscribers;

use std::rc::Rc;

use crate::error::Result;
use crate::flags::LifecycleFlags;
use crate::value::Value;

pub use array::ArrayObserver;
pub use dirty_check::{
    DEFAULT_DIRTY_CHECK_INTERVAL, DirtyCheckProperty, DirtyChecker, DirtyCheckerConfig,
};
pub use getter::{DependencyCollector, GetterObserver};
pub use index_map::{DeletedItem, IndexMap, NEW_ITEM};
pub use length::{CollectionLengthObserver, CollectionSizeObserver};
pub use locator::ObserverLocator;
pub use map::MapObserver;
pub use primitive::PrimitiveObserver;
pub use property::{PropertyAccessor, PropertyObserver, SetterObserver};
pub use set::SetObserver;
pub use subscribers::SubscriberList;

/// Receives change notifications.
pub trait Subscriber {
    /// Called synchronously after an observed value changed.
    fn handle_change(&self, new_value: &Value, old_value: &Value, flags: LifecycleFlags)
    -> Result<()>;

    /// Called when a collection flush delivers the finalized index map of a
    /// batch. Only batched subscribers receive this.
    fn handle_batched_change(&self, _index_map: &IndexMap, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }
}

/// A source of change notifications for one value slot.
pub trait Observer {
    fn get_value(&self) -> Value;

    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<()>;

    fn subscribe(&self, subscriber: Rc<dyn Subscriber>);

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>);

    fn subscriber_count(&self) -> usize;

    /// Whether writes through [`ObjectRef::set`](crate::value::ObjectRef::set)
    /// must be routed to [`Observer::set_value`].
    fn intercepts_writes(&self) -> bool {
        false
    }
}

/// Identity comparison for trait-object subscribers.
#[must_use]
pub fn same_subscriber(a: &Rc<dyn Subscriber>, b: &Rc<dyn Subscriber>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// Identity comparison for trait-object observers.
#[must_use]
pub fn same_observer(a: &Rc<dyn Observer>, b: &Rc<dyn Observer>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}
