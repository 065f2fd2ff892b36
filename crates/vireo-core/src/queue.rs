#![forbid(unsafe_code)]

//! Queue membership shared between participants and the lifecycle.
//!
//! A participant (observer, binding, view) embeds one [`QueueLinks`]. The
//! links record which lifecycle queues currently hold the participant and which
//! lifecycle put it there, so enqueueing is idempotent and a participant is
//! never split across two coordinators.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use bitflags::bitflags;

use crate::error::Result;
use crate::flags::LifecycleFlags;

bitflags! {
    /// Set of queues a participant is currently in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueSet: u16 {
        const FLUSH               = 1 << 0;
        const CONNECT             = 1 << 1;
        const PATCH               = 1 << 2;
        const BOUND               = 1 << 3;
        const MOUNT               = 1 << 4;
        const ATTACHED            = 1 << 5;
        const UNMOUNT             = 1 << 6;
        const DETACHED            = 1 << 7;
        const UNBIND_AFTER_DETACH = 1 << 8;
        const UNBOUND             = 1 << 9;
    }
}

/// One lifecycle queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Flush,
    Connect,
    Patch,
    Bound,
    Mount,
    Attached,
    Unmount,
    Detached,
    UnbindAfterDetach,
    Unbound,
}

impl QueueKind {
    pub const ALL: [QueueKind; 10] = [
        Self::Flush,
        Self::Connect,
        Self::Patch,
        Self::Bound,
        Self::Mount,
        Self::Attached,
        Self::Unmount,
        Self::Detached,
        Self::UnbindAfterDetach,
        Self::Unbound,
    ];

    #[must_use]
    pub const fn bit(self) -> QueueSet {
        match self {
            Self::Flush => QueueSet::FLUSH,
            Self::Connect => QueueSet::CONNECT,
            Self::Patch => QueueSet::PATCH,
            Self::Bound => QueueSet::BOUND,
            Self::Mount => QueueSet::MOUNT,
            Self::Attached => QueueSet::ATTACHED,
            Self::Unmount => QueueSet::UNMOUNT,
            Self::Detached => QueueSet::DETACHED,
            Self::UnbindAfterDetach => QueueSet::UNBIND_AFTER_DETACH,
            Self::Unbound => QueueSet::UNBOUND,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Flush => "flush",
            Self::Connect => "connect",
            Self::Patch => "patch",
            Self::Bound => "bound",
            Self::Mount => "mount",
            Self::Attached => "attached",
            Self::Unmount => "unmount",
            Self::Detached => "detached",
            Self::UnbindAfterDetach => "unbind_after_detach",
            Self::Unbound => "unbound",
        }
    }
}

/// Why [`QueueLinks::try_enqueue`] refused an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueRefusal {
    /// Already in this queue.
    AlreadyQueued,
    /// Queued by another lifecycle; holds that lifecycle's id.
    ForeignLifecycle(u64),
}

/// Queue membership of one participant.
///
/// # Invariants
///
/// 1. A bit is set exactly while the participant sits in that queue.
/// 2. `owner` is non-zero exactly while at least one bit is set.
#[derive(Debug, Default)]
pub struct QueueLinks {
    queued: Cell<QueueSet>,
    owner: Cell<u64>,
}

impl QueueLinks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_queued(&self, kind: QueueKind) -> bool {
        self.queued.get().contains(kind.bit())
    }

    #[must_use]
    pub fn queued(&self) -> QueueSet {
        self.queued.get()
    }

    /// Id of the lifecycle holding this participant, if any.
    #[must_use]
    pub fn owner(&self) -> Option<u64> {
        match self.owner.get() {
            0 => None,
            id => Some(id),
        }
    }

    /// Mark the participant as queued on `kind` by lifecycle `lifecycle_id`.
    pub fn try_enqueue(
        &self,
        kind: QueueKind,
        lifecycle_id: u64,
    ) -> std::result::Result<(), EnqueueRefusal> {
        let queued = self.queued.get();
        if queued.contains(kind.bit()) {
            return Err(EnqueueRefusal::AlreadyQueued);
        }
        match self.owner.get() {
            0 => self.owner.set(lifecycle_id),
            id if id != lifecycle_id => return Err(EnqueueRefusal::ForeignLifecycle(id)),
            _ => {}
        }
        self.queued.set(queued | kind.bit());
        Ok(())
    }

    /// Clear the membership bit for `kind` after the entry left the queue.
    pub fn dequeue(&self, kind: QueueKind) {
        let remaining = self.queued.get() - kind.bit();
        self.queued.set(remaining);
        if remaining.is_empty() {
            self.owner.set(0);
        }
    }
}

/// Something that delivers deferred work when the flush queue drains.
pub trait Flushable {
    fn queue_links(&self) -> &QueueLinks;

    fn flush(&self, flags: LifecycleFlags) -> Result<()>;
}

/// The receiving end of flush requests (implemented by the lifecycle).
pub trait FlushQueue {
    fn enqueue_flush(&self, item: Rc<dyn Flushable>);
}

/// A flush queue drained by hand.
///
/// Useful when the observer layer runs without a lifecycle coordinator,
/// for example in tests or headless evaluation.
#[derive(Default)]
pub struct ManualFlushQueue {
    pending: RefCell<VecDeque<Rc<dyn Flushable>>>,
}

const MANUAL_QUEUE_ID: u64 = u64::MAX;

impl ManualFlushQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Flush everything queued, including entries queued while flushing.
    /// Returns how many entries were flushed.
    pub fn flush_all(&self, flags: LifecycleFlags) -> Result<usize> {
        let mut count = 0;
        loop {
            let Some(item) = self.pending.borrow_mut().pop_front() else {
                return Ok(count);
            };
            item.queue_links().dequeue(QueueKind::Flush);
            item.flush(flags | LifecycleFlags::FROM_FLUSH)?;
            count += 1;
        }
    }
}

impl FlushQueue for ManualFlushQueue {
    fn enqueue_flush(&self, item: Rc<dyn Flushable>) {
        if item
            .queue_links()
            .try_enqueue(QueueKind::Flush, MANUAL_QUEUE_ID)
            .is_ok()
        {
            tracing::trace!(queue = "flush", "manual enqueue");
            self.pending.borrow_mut().push_back(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        links: QueueLinks,
        flushed: Cell<u32>,
    }

    impl Flushable for Counter {
        fn queue_links(&self) -> &QueueLinks {
            &self.links
        }

        fn flush(&self, flags: LifecycleFlags) -> Result<()> {
            assert!(flags.contains(LifecycleFlags::FROM_FLUSH));
            self.flushed.set(self.flushed.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn links_are_idempotent_and_owned() {
        let links = QueueLinks::new();
        assert_eq!(links.try_enqueue(QueueKind::Bound, 1), Ok(()));
        assert_eq!(
            links.try_enqueue(QueueKind::Bound, 1),
            Err(EnqueueRefusal::AlreadyQueued)
        );
        assert_eq!(
            links.try_enqueue(QueueKind::Mount, 2),
            Err(EnqueueRefusal::ForeignLifecycle(1))
        );
        assert_eq!(links.try_enqueue(QueueKind::Mount, 1), Ok(()));
        links.dequeue(QueueKind::Bound);
        assert_eq!(links.owner(), Some(1));
        links.dequeue(QueueKind::Mount);
        assert_eq!(links.owner(), None);
        assert!(links.queued().is_empty());
    }

    #[test]
    fn manual_queue_flushes_each_entry_once() {
        let queue = ManualFlushQueue::new();
        let item = Rc::new(Counter {
            links: QueueLinks::new(),
            flushed: Cell::new(0),
        });
        queue.enqueue_flush(item.clone());
        queue.enqueue_flush(item.clone());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.flush_all(LifecycleFlags::empty()).unwrap(), 1);
        assert_eq!(item.flushed.get(), 1);
        assert!(!item.links.is_queued(QueueKind::Flush));
    }
}
