#![forbid(unsafe_code)]

//! The lifecycle coordinator.
//!
//! Views and bindings do not run their phase hooks directly. They enqueue
//! themselves on a [`Lifecycle`], which drains each queue in a fixed order
//! once the outermost batch of a phase ends:
//!
//! - bind: `bound`.
//! - attach: flush (`FROM_SYNC_FLUSH`), `mount`, `connect`
//!   (`MUST_EVALUATE`), `attached`.
//! - detach: flush (`DO_NOT_UPDATE_DOM`), `unmount`, `detached`, then a
//!   nested unbind batch over `unbind_after_detach`.
//! - unbind: `unbound`.
//!
//! The flush queue is also drained by a microtask queued on the
//! [`Scheduler`] the first time something is enqueued after a drain, and
//! ends by draining `patch`.
//!
//! # Invariants
//!
//! 1. Only the `end_*` call that returns a phase's depth to zero drains.
//! 2. Drains are FIFO and re-read the queue head, so entries enqueued while
//!    draining run in the same drain.
//! 3. A participant sits in a queue at most once, and only in queues of one
//!    lifecycle at a time.
//! 4. While a registered task is pending, the outermost `end_*` drains
//!    nothing and returns the pending task instead. When it settles, the
//!    detach, unbind, bind and attach queues are processed in that order.
//!
//! # Failure Modes
//!
//! A failing hook stops the drain and its error is returned; entries behind
//! it stay queued for the next drain. Errors raised while flushing from a
//! microtask surface from [`Scheduler::run_until_stalled`].

pub mod task;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, debug_span, trace, warn};
use vireo_core::queue::EnqueueRefusal;
use vireo_core::{FlushQueue, Flushable, LifecycleFlags, QueueKind, QueueLinks, Result};

use crate::scheduler::Scheduler;

pub use task::{
    AggregateLifecycleTask, Continuation, LifecycleTask, PromiseTask, SettledCallback, Settlement,
    TaskState, done,
};

static NEXT_LIFECYCLE_ID: AtomicU64 = AtomicU64::new(1);

/// Something queued on a lifecycle. Each queue calls one method; the
/// defaults do nothing.
pub trait Participant {
    fn queue_links(&self) -> &QueueLinks;

    /// Deferred dependency collection (`connect` queue).
    fn connect(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn patch(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn bound(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn mount(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn attached(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn unmount(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn detached(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    /// Run for entries of `unbind_after_detach`.
    fn unbind(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }

    fn unbound(&self, _flags: LifecycleFlags) -> Result<()> {
        Ok(())
    }
}

fn run(kind: QueueKind, item: &dyn Participant, flags: LifecycleFlags) -> Result<()> {
    match kind {
        QueueKind::Connect => item.connect(flags),
        QueueKind::Patch => item.patch(flags),
        QueueKind::Bound => item.bound(flags),
        QueueKind::Mount => item.mount(flags),
        QueueKind::Attached => item.attached(flags),
        QueueKind::Unmount => item.unmount(flags),
        QueueKind::Detached => item.detached(flags),
        QueueKind::UnbindAfterDetach => item.unbind(flags),
        QueueKind::Unbound => item.unbound(flags),
        QueueKind::Flush => Ok(()),
    }
}

type ParticipantQueue = RefCell<VecDeque<Rc<dyn Participant>>>;

#[derive(Default)]
struct Depths {
    bind: Cell<u32>,
    attach: Cell<u32>,
    detach: Cell<u32>,
    unbind: Cell<u32>,
}

struct LifecycleInner {
    id: u64,
    scheduler: Scheduler,
    flush: RefCell<VecDeque<Rc<dyn Flushable>>>,
    flush_scheduled: Cell<bool>,
    /// Indexed by [`slot`]; `QueueKind::Flush` lives in `flush`.
    queues: [ParticipantQueue; 9],
    depths: Depths,
    task: RefCell<Option<Rc<AggregateLifecycleTask>>>,
    suspended: Cell<bool>,
    replay_flags: Cell<LifecycleFlags>,
}

fn slot(kind: QueueKind) -> usize {
    match kind {
        QueueKind::Connect | QueueKind::Flush => 0,
        QueueKind::Patch => 1,
        QueueKind::Bound => 2,
        QueueKind::Mount => 3,
        QueueKind::Attached => 4,
        QueueKind::Unmount => 5,
        QueueKind::Detached => 6,
        QueueKind::UnbindAfterDetach => 7,
        QueueKind::Unbound => 8,
    }
}

/// Handle to a lifecycle coordinator. Cloning yields another handle to the
/// same coordinator.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Rc<LifecycleInner>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            inner: Rc::new(LifecycleInner {
                id: NEXT_LIFECYCLE_ID.fetch_add(1, Ordering::Relaxed),
                scheduler,
                flush: RefCell::new(VecDeque::new()),
                flush_scheduled: Cell::new(false),
                queues: Default::default(),
                depths: Depths::default(),
                task: RefCell::new(None),
                suspended: Cell::new(false),
                replay_flags: Cell::new(LifecycleFlags::empty()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// This lifecycle as the flush target of an observer locator.
    #[must_use]
    pub fn flush_queue(&self) -> Rc<dyn FlushQueue> {
        Rc::new(self.clone())
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Lifecycle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn downgrade(&self) -> Weak<LifecycleInner> {
        Rc::downgrade(&self.inner)
    }

    fn queue(&self, kind: QueueKind) -> &ParticipantQueue {
        &self.inner.queues[slot(kind)]
    }

    /// Entries currently waiting in `kind`.
    #[must_use]
    pub fn queue_len(&self, kind: QueueKind) -> usize {
        match kind {
            QueueKind::Flush => self.inner.flush.borrow().len(),
            kind => self.queue(kind).borrow().len(),
        }
    }

    #[must_use]
    pub fn is_flush_scheduled(&self) -> bool {
        self.inner.flush_scheduled.get()
    }

    /// Whether an outermost `end_*` is waiting for registered tasks.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.inner.suspended.get()
    }

    // ── Enqueue ──────────────────────────────────────────────────────

    fn admit(&self, kind: QueueKind, links: &QueueLinks) -> bool {
        match links.try_enqueue(kind, self.inner.id) {
            Ok(()) => {
                trace!(queue = kind.name(), lifecycle = self.inner.id, "enqueue");
                true
            }
            Err(EnqueueRefusal::AlreadyQueued) => false,
            Err(EnqueueRefusal::ForeignLifecycle(owner)) => {
                warn!(
                    queue = kind.name(),
                    lifecycle = self.inner.id,
                    owner,
                    "participant is queued by another lifecycle; ignoring"
                );
                false
            }
        }
    }

    fn enqueue(&self, kind: QueueKind, item: Rc<dyn Participant>) {
        if self.admit(kind, item.queue_links()) {
            self.queue(kind).borrow_mut().push_back(item);
        }
    }

    pub fn enqueue_connect(&self, item: Rc<dyn Participant>) {
        self.enqueue(QueueKind::Connect, item);
    }

    pub fn enqueue_patch(&self, item: Rc<dyn Participant>) {
        self.enqueue(QueueKind::Patch, item);
    }

    pub fn enqueue_bound(&self, item: Rc<dyn Participant>) {
        self.enqueue(QueueKind::Bound, item);
    }

    pub fn enqueue_mount(&self, item: Rc<dyn Participant>) {
        self.enqueue(QueueKind::Mount, item);
    }

    pub fn enqueue_attached(&self, item: Rc<dyn Participant>) {
        self.enqueue(QueueKind::Attached, item);
    }

    pub fn enqueue_unmount(&self, item: Rc<dyn Participant>) {
        self.enqueue(QueueKind::Unmount, item);
    }

    pub fn enqueue_detached(&self, item: Rc<dyn Participant>) {
        self.enqueue(QueueKind::Detached, item);
    }

    /// Unbind `item` right after the current detach batch.
    pub fn enqueue_unbind_after_detach(&self, item: Rc<dyn Participant>) {
        self.enqueue(QueueKind::UnbindAfterDetach, item);
    }

    pub fn enqueue_unbound(&self, item: Rc<dyn Participant>) {
        self.enqueue(QueueKind::Unbound, item);
    }

    fn schedule_flush(&self) {
        if self.inner.flush_scheduled.replace(true) {
            return;
        }
        let weak = self.downgrade();
        self.inner.scheduler.queue_microtask(async move {
            let Some(inner) = weak.upgrade() else {
                return Ok(());
            };
            let lifecycle = Lifecycle { inner };
            if !lifecycle.is_flush_scheduled() {
                return Ok(());
            }
            lifecycle
                .process_flush_queue(LifecycleFlags::FROM_ASYNC_FLUSH)
                .map(drop)
        });
    }

    // ── Draining ─────────────────────────────────────────────────────

    fn drain(&self, kind: QueueKind, flags: LifecycleFlags) -> Result<usize> {
        let _span = debug_span!("drain", queue = kind.name(), len = self.queue_len(kind)).entered();
        let mut count = 0;
        loop {
            let next = self.queue(kind).borrow_mut().pop_front();
            let Some(item) = next else {
                return Ok(count);
            };
            item.queue_links().dequeue(kind);
            run(kind, &*item, flags)?;
            count += 1;
        }
    }

    /// Flush everything queued, then drain `patch`. Entries queued while
    /// flushing are flushed too, unless `DO_NOT_UPDATE_DOM` is set, in which
    /// case they wait for the next flush. Returns the number of flushes.
    pub fn process_flush_queue(&self, flags: LifecycleFlags) -> Result<usize> {
        self.inner.flush_scheduled.set(false);
        let flags = flags | LifecycleFlags::FROM_FLUSH;
        let mut count = 0;
        {
            let _span =
                debug_span!("drain", queue = "flush", len = self.queue_len(QueueKind::Flush))
                    .entered();
            loop {
                let pass = self.inner.flush.borrow().len();
                if pass == 0 {
                    break;
                }
                for _ in 0..pass {
                    let next = self.inner.flush.borrow_mut().pop_front();
                    let Some(item) = next else {
                        break;
                    };
                    item.queue_links().dequeue(QueueKind::Flush);
                    item.flush(flags)?;
                    count += 1;
                }
                if flags.contains(LifecycleFlags::DO_NOT_UPDATE_DOM) {
                    break;
                }
            }
        }
        if self.queue_len(QueueKind::Flush) > 0 {
            self.schedule_flush();
        }
        self.drain(QueueKind::Patch, flags)?;
        Ok(count)
    }

    pub fn process_bind_queue(&self, flags: LifecycleFlags) -> Result<()> {
        self.drain(QueueKind::Bound, flags | LifecycleFlags::FROM_BIND)
            .map(drop)
    }

    pub fn process_attach_queue(&self, flags: LifecycleFlags) -> Result<()> {
        let flags = flags | LifecycleFlags::FROM_ATTACH;
        self.process_flush_queue(flags | LifecycleFlags::FROM_SYNC_FLUSH)?;
        self.drain(QueueKind::Mount, flags)?;
        self.drain(QueueKind::Connect, flags | LifecycleFlags::MUST_EVALUATE)?;
        self.drain(QueueKind::Attached, flags)?;
        Ok(())
    }

    pub fn process_detach_queue(&self, flags: LifecycleFlags) -> Result<()> {
        let flags = flags | LifecycleFlags::FROM_DETACH;
        self.process_flush_queue(flags | LifecycleFlags::DO_NOT_UPDATE_DOM)?;
        self.drain(QueueKind::Unmount, flags)?;
        self.drain(QueueKind::Detached, flags)?;
        if self.queue_len(QueueKind::UnbindAfterDetach) > 0 {
            self.begin_unbind();
            let drained = self.drain(QueueKind::UnbindAfterDetach, flags);
            let ended = self.end_unbind(flags);
            drained?;
            ended?;
        }
        Ok(())
    }

    pub fn process_unbind_queue(&self, flags: LifecycleFlags) -> Result<()> {
        self.drain(QueueKind::Unbound, flags | LifecycleFlags::FROM_UNBIND)
            .map(drop)
    }

    // ── Batches ──────────────────────────────────────────────────────

    fn begin(&self, depth: &Cell<u32>, phase: &'static str) {
        depth.set(depth.get() + 1);
        debug!(phase, depth = depth.get(), "begin batch");
    }

    /// Close one level; `true` when this was the outermost level.
    fn end(&self, depth: &Cell<u32>, phase: &'static str) -> bool {
        let remaining = depth.get().saturating_sub(1);
        depth.set(remaining);
        debug!(phase, depth = remaining, "end batch");
        remaining == 0
    }

    pub fn begin_bind(&self) {
        self.begin(&self.inner.depths.bind, "bind");
    }

    pub fn begin_attach(&self) {
        self.begin(&self.inner.depths.attach, "attach");
    }

    pub fn begin_detach(&self) {
        self.begin(&self.inner.depths.detach, "detach");
    }

    pub fn begin_unbind(&self) {
        self.begin(&self.inner.depths.unbind, "unbind");
    }

    /// Close a bind batch. The outermost call drains `bound`, unless tasks
    /// are pending, in which case the aggregate task is returned.
    pub fn end_bind(&self, flags: LifecycleFlags) -> Result<Rc<dyn LifecycleTask>> {
        if !self.end(&self.inner.depths.bind, "bind") {
            return Ok(done());
        }
        if let Some(task) = self.suspend(flags)? {
            return Ok(task);
        }
        self.process_bind_queue(flags)?;
        Ok(done())
    }

    pub fn end_attach(&self, flags: LifecycleFlags) -> Result<Rc<dyn LifecycleTask>> {
        if !self.end(&self.inner.depths.attach, "attach") {
            return Ok(done());
        }
        if let Some(task) = self.suspend(flags)? {
            return Ok(task);
        }
        self.process_attach_queue(flags)?;
        Ok(done())
    }

    pub fn end_detach(&self, flags: LifecycleFlags) -> Result<Rc<dyn LifecycleTask>> {
        if !self.end(&self.inner.depths.detach, "detach") {
            return Ok(done());
        }
        if let Some(task) = self.suspend(flags)? {
            return Ok(task);
        }
        self.process_detach_queue(flags)?;
        Ok(done())
    }

    pub fn end_unbind(&self, flags: LifecycleFlags) -> Result<Rc<dyn LifecycleTask>> {
        if !self.end(&self.inner.depths.unbind, "unbind") {
            return Ok(done());
        }
        if let Some(task) = self.suspend(flags)? {
            return Ok(task);
        }
        self.process_unbind_queue(flags)?;
        Ok(done())
    }

    /// Current `(bind, attach, detach, unbind)` depths.
    #[must_use]
    pub fn depths(&self) -> (u32, u32, u32, u32) {
        let d = &self.inner.depths;
        (d.bind.get(), d.attach.get(), d.detach.get(), d.unbind.get())
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// Make the outermost `end_*` calls wait for `task`.
    pub fn register_task(&self, task: Rc<dyn LifecycleTask>) -> Result<()> {
        if task.is_done() {
            return Ok(());
        }
        let aggregate = Rc::clone(
            self.inner
                .task
                .borrow_mut()
                .get_or_insert_with(AggregateLifecycleTask::new),
        );
        aggregate.add_task(task)
    }

    #[must_use]
    pub fn has_pending_tasks(&self) -> bool {
        self.inner
            .task
            .borrow()
            .as_ref()
            .is_some_and(|task| !task.is_done())
    }

    /// The pending aggregate, with this lifecycle registered to replay the
    /// queues once it settles. `None` when nothing is pending.
    fn suspend(&self, flags: LifecycleFlags) -> Result<Option<Rc<dyn LifecycleTask>>> {
        let aggregate = match self.inner.task.borrow().as_ref() {
            Some(task) if !task.is_done() => Rc::clone(task),
            _ => return Ok(None),
        };
        self.inner
            .replay_flags
            .set(self.inner.replay_flags.get() | flags);
        if !self.inner.suspended.replace(true) {
            debug!(
                lifecycle = self.inner.id,
                pending = aggregate.pending_count(),
                "suspended on pending tasks"
            );
            let weak = self.downgrade();
            aggregate.on_settled(Box::new(move |_| match weak.upgrade() {
                Some(inner) => Lifecycle { inner }.resume(),
                None => Ok(()),
            }))?;
        }
        Ok(Some(aggregate))
    }

    fn resume(&self) -> Result<()> {
        self.inner.suspended.set(false);
        let flags = self.inner.replay_flags.replace(LifecycleFlags::empty());
        debug!(lifecycle = self.inner.id, ?flags, "resuming after tasks");
        let d = &self.inner.depths;
        if d.detach.get() == 0 {
            self.process_detach_queue(flags)?;
        }
        if d.unbind.get() == 0 {
            self.process_unbind_queue(flags)?;
        }
        if d.bind.get() == 0 {
            self.process_bind_queue(flags)?;
        }
        if d.attach.get() == 0 {
            self.process_attach_queue(flags)?;
        }
        Ok(())
    }
}

impl FlushQueue for Lifecycle {
    fn enqueue_flush(&self, item: Rc<dyn Flushable>) {
        if self.admit(QueueKind::Flush, item.queue_links()) {
            self.inner.flush.borrow_mut().push_back(item);
            self.schedule_flush();
        }
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Lifecycle");
        s.field("id", &self.inner.id);
        for kind in QueueKind::ALL {
            let len = self.queue_len(kind);
            if len > 0 {
                s.field(kind.name(), &len);
            }
        }
        s.field("depths", &self.depths())
            .field("suspended", &self.is_suspended())
            .finish()
    }
}
