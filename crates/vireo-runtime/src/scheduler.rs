#![forbid(unsafe_code)]

//! Microtask scheduling.
//!
//! The [`Scheduler`] is the single asynchronous boundary of the runtime: the
//! lifecycle schedules its flush here and [`PromiseTask`]s run here. Nothing
//! runs until the host calls [`Scheduler::run_until_stalled`], which plays
//! the role of a microtask checkpoint.
//!
//! A microtask that resolves to `Err` cannot report to anyone synchronously.
//! Its error is logged and recorded, and the next `run_until_stalled`
//! returns it.
//!
//! Watched [`DirtyChecker`]s are polled at every checkpoint, before the
//! microtasks run, so a polled change is flushed in the same checkpoint.
//!
//! [`PromiseTask`]: crate::lifecycle::PromiseTask

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use tracing::{error, trace, warn};
use vireo_core::observation::DirtyChecker;
use vireo_core::{Error, Result};

/// Errors raised by microtasks since the last checkpoint.
#[derive(Debug, Clone)]
pub struct UnhandledErrors(pub Vec<Error>);

impl UnhandledErrors {
    #[must_use]
    pub fn first(&self) -> Option<&Error> {
        self.0.first()
    }
}

impl fmt::Display for UnhandledErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unhandled microtask error(s)", self.0.len())?;
        if let Some(first) = self.0.first() {
            write!(f, "; first: {first}")?;
        }
        Ok(())
    }
}

impl std::error::Error for UnhandledErrors {}

#[derive(Default)]
struct Shared {
    errors: RefCell<Vec<Error>>,
    pending: Cell<usize>,
    queued_total: Cell<u64>,
}

struct SchedulerInner {
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    shared: Rc<Shared>,
    dirty_checkers: RefCell<Vec<DirtyChecker>>,
}

/// Handle to a microtask queue. Cloning yields another handle to the same
/// queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            inner: Rc::new(SchedulerInner {
                pool: RefCell::new(pool),
                spawner,
                shared: Rc::new(Shared::default()),
                dirty_checkers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Queue `task` to run at the next checkpoint.
    pub fn queue_microtask(&self, task: impl Future<Output = Result<()>> + 'static) {
        let shared = Rc::clone(&self.inner.shared);
        shared.pending.set(shared.pending.get() + 1);
        shared.queued_total.set(shared.queued_total.get() + 1);
        let tracked = {
            let shared = Rc::clone(&shared);
            async move {
                let outcome = task.await;
                shared.pending.set(shared.pending.get().saturating_sub(1));
                if let Err(err) = outcome {
                    error!(error = %err, "unhandled error in microtask");
                    shared.errors.borrow_mut().push(err);
                }
            }
        };
        if let Err(err) = self.inner.spawner.spawn_local(tracked) {
            shared.pending.set(shared.pending.get().saturating_sub(1));
            warn!(error = %err, "microtask dropped: executor shut down");
        }
    }

    /// Poll `checker` at every checkpoint. Watching the same checker twice
    /// has no effect.
    pub fn watch_dirty_checker(&self, checker: DirtyChecker) {
        let mut checkers = self.inner.dirty_checkers.borrow_mut();
        if !checkers.iter().any(|watched| watched.ptr_eq(&checker)) {
            checkers.push(checker);
        }
    }

    #[must_use]
    pub fn watched_dirty_checkers(&self) -> usize {
        self.inner.dirty_checkers.borrow().len()
    }

    /// Advance watched dirty checkers by `elapsed` on top of wall time, then
    /// run a checkpoint.
    pub fn advance(&self, elapsed: Duration) -> std::result::Result<(), UnhandledErrors> {
        self.poll_dirty_checkers(Some(elapsed));
        self.run_until_stalled()
    }

    fn poll_dirty_checkers(&self, elapsed: Option<Duration>) {
        let checkers = self.inner.dirty_checkers.borrow().clone();
        for checker in checkers.iter().filter(|c| c.tracked_count() > 0) {
            let polled = match elapsed {
                Some(elapsed) => checker.advance(elapsed),
                None => checker.poll(),
            };
            if let Err(err) = polled {
                error!(error = %err, "unhandled error in dirty check");
                self.inner.shared.errors.borrow_mut().push(err);
            }
        }
    }

    /// Poll watched dirty checkers, then run microtasks until none can make
    /// progress.
    ///
    /// A checkpoint reached from inside a running microtask returns
    /// immediately; the outer checkpoint picks up the new work.
    pub fn run_until_stalled(&self) -> std::result::Result<(), UnhandledErrors> {
        match self.inner.pool.try_borrow_mut() {
            Ok(mut pool) => {
                self.poll_dirty_checkers(None);
                trace!(pending = self.pending(), "microtask checkpoint");
                pool.run_until_stalled();
            }
            Err(_) => {
                trace!("nested microtask checkpoint ignored");
                return Ok(());
            }
        }
        let errors = std::mem::take(&mut *self.inner.shared.errors.borrow_mut());
        if errors.is_empty() {
            Ok(())
        } else {
            Err(UnhandledErrors(errors))
        }
    }

    /// Microtasks queued but not yet finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.shared.pending.get()
    }

    /// Microtasks queued since creation.
    #[must_use]
    pub fn queued_total(&self) -> u64 {
        self.inner.shared.queued_total.get()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("queued_total", &self.queued_total())
            .field("dirty_checkers", &self.watched_dirty_checkers())
            .finish()
    }
}
