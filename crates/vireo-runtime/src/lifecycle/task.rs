#![forbid(unsafe_code)]

//! Lifecycle tasks: asynchronous work a lifecycle phase has to wait for.
//!
//! - [`done`]: the null task, already complete.
//! - [`PromiseTask`]: one future plus a continuation run with its value.
//! - [`AggregateLifecycleTask`]: fan-in of several tasks. Itself a task.
//!
//! # Invariants
//!
//! 1. A task settles at most once, as either `Done` or `Cancelled`.
//! 2. Callbacks registered with [`LifecycleTask::on_settled`] run exactly
//!    once: immediately if the task has already settled, otherwise when it
//!    settles.
//! 3. An aggregate settles when its last pending member settles. It is
//!    `Cancelled` only if every member was cancelled.
//! 4. Aggregate cancellation is all-or-nothing: `cancel` does nothing unless
//!    every pending member can cancel.
//!
//! # Failure Modes
//!
//! - A [`PromiseTask`] whose future fails settles as `Done` so waiting
//!   phases are not stranded; the error is returned to the scheduler and
//!   surfaces from the next checkpoint.
//! - An error returned by an `on_settled` callback is passed back to
//!   whoever settled the task.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};
use vireo_core::{Result, Value};

use crate::cancel::{CancellationController, CancellationToken};
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Done,
    Cancelled,
}

/// Callback run when a task settles.
pub type SettledCallback = Box<dyn FnOnce(TaskState) -> Result<()>>;

/// Asynchronous work tracked by a lifecycle.
pub trait LifecycleTask {
    fn state(&self) -> TaskState;

    /// Settled, either way.
    fn is_done(&self) -> bool {
        self.state() != TaskState::Pending
    }

    fn can_cancel(&self) -> bool;

    /// Request cancellation. Ignored when [`LifecycleTask::can_cancel`] is
    /// false.
    fn cancel(&self);

    fn on_settled(&self, callback: SettledCallback) -> Result<()>;
}

/// The settle-once state plus pending callbacks shared by task types.
#[derive(Default)]
pub struct Settlement {
    state: Cell<Option<TaskState>>,
    callbacks: RefCell<Vec<SettledCallback>>,
}

impl Settlement {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state.get().unwrap_or(TaskState::Pending)
    }

    /// Settle and run the callbacks. Returns the first callback error; the
    /// remaining callbacks still run. Settling twice is a no-op.
    pub fn settle(&self, state: TaskState) -> Result<()> {
        if self.state.get().is_some() || state == TaskState::Pending {
            return Ok(());
        }
        self.state.set(Some(state));
        let callbacks = std::mem::take(&mut *self.callbacks.borrow_mut());
        let mut first_error = None;
        for callback in callbacks {
            if let Err(err) = callback(state) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn on_settled(&self, callback: SettledCallback) -> Result<()> {
        match self.state.get() {
            Some(state) => callback(state),
            None => {
                self.callbacks.borrow_mut().push(callback);
                Ok(())
            }
        }
    }
}

struct DoneTask;

impl LifecycleTask for DoneTask {
    fn state(&self) -> TaskState {
        TaskState::Done
    }

    fn can_cancel(&self) -> bool {
        false
    }

    fn cancel(&self) {}

    fn on_settled(&self, callback: SettledCallback) -> Result<()> {
        callback(TaskState::Done)
    }
}

/// The null task: already done.
#[must_use]
pub fn done() -> Rc<dyn LifecycleTask> {
    Rc::new(DoneTask)
}

/// What a [`PromiseTask`] continuation may hand back: more work to wait for.
pub type Continuation = Box<dyn FnOnce(Value) -> Result<Option<Rc<dyn LifecycleTask>>>>;

/// A future plus a continuation.
///
/// Cancellable until the future resolves. Once the continuation has started
/// the task runs to completion, waiting for any task the continuation
/// returns.
pub struct PromiseTask {
    settlement: Settlement,
    started: Cell<bool>,
    controller: CancellationController,
}

impl PromiseTask {
    /// Run `future` on `scheduler`, then `next` with its value.
    pub fn spawn<F>(
        scheduler: &Scheduler,
        future: F,
        next: Option<Continuation>,
    ) -> Rc<Self>
    where
        F: Future<Output = Result<Value>> + 'static,
    {
        Self::spawn_with_token(scheduler, |_| future, next)
    }

    /// Like [`PromiseTask::spawn`]; `make` receives the task's cancellation
    /// token so the future can stop early.
    pub fn spawn_with_token<F>(
        scheduler: &Scheduler,
        make: impl FnOnce(CancellationToken) -> F,
        next: Option<Continuation>,
    ) -> Rc<Self>
    where
        F: Future<Output = Result<Value>> + 'static,
    {
        let (token, controller) = CancellationToken::new();
        let task = Rc::new(Self {
            settlement: Settlement::new(),
            started: Cell::new(false),
            controller,
        });
        let future = make(token.clone());
        let weak = Rc::downgrade(&task);
        scheduler.queue_microtask(async move {
            let outcome = future.await;
            let Some(task) = weak.upgrade() else {
                return outcome.map(drop);
            };
            if token.is_cancelled() {
                trace!(token_id = token.id(), "promise task resolved after cancel");
                return Ok(());
            }
            task.started.set(true);
            let value = match outcome {
                Ok(value) => value,
                Err(err) => {
                    task.settlement.settle(TaskState::Done)?;
                    return Err(err);
                }
            };
            task.resume(value, next)
        });
        task
    }

    fn resume(self: &Rc<Self>, value: Value, next: Option<Continuation>) -> Result<()> {
        let follow_up = match next {
            Some(next) => next(value),
            None => Ok(None),
        };
        match follow_up {
            Ok(Some(more)) if !more.is_done() => {
                let weak: Weak<Self> = Rc::downgrade(self);
                more.on_settled(Box::new(move |_| match weak.upgrade() {
                    Some(task) => task.settlement.settle(TaskState::Done),
                    None => Ok(()),
                }))
            }
            Ok(_) => self.settlement.settle(TaskState::Done),
            Err(err) => {
                self.settlement.settle(TaskState::Done)?;
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn has_started(&self) -> bool {
        self.started.get()
    }
}

impl LifecycleTask for PromiseTask {
    fn state(&self) -> TaskState {
        self.settlement.state()
    }

    fn can_cancel(&self) -> bool {
        !self.started.get() && !self.is_done()
    }

    fn cancel(&self) {
        if self.can_cancel() {
            self.controller.cancel();
            // Callback errors have no caller to return to here.
            if let Err(err) = self.settlement.settle(TaskState::Cancelled) {
                tracing::error!(error = %err, "callback failed after cancel");
            }
        }
    }

    fn on_settled(&self, callback: SettledCallback) -> Result<()> {
        self.settlement.on_settled(callback)
    }
}

impl fmt::Debug for PromiseTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseTask")
            .field("state", &self.state())
            .field("started", &self.started.get())
            .finish()
    }
}

/// Fan-in of lifecycle tasks.
pub struct AggregateLifecycleTask {
    this: Weak<AggregateLifecycleTask>,
    tasks: RefCell<Vec<Rc<dyn LifecycleTask>>>,
    completed: Cell<usize>,
    cancelled: Cell<usize>,
    settlement: RefCell<Rc<Settlement>>,
}

impl AggregateLifecycleTask {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            tasks: RefCell::new(Vec::new()),
            completed: Cell::new(0),
            cancelled: Cell::new(0),
            settlement: RefCell::new(Rc::new(Settlement::new())),
        })
    }

    /// Track `task`. Settled tasks are ignored.
    pub fn add_task(&self, task: Rc<dyn LifecycleTask>) -> Result<()> {
        if task.is_done() {
            return Ok(());
        }
        if self.pending_count() == 0 {
            // A new round of waiting: earlier settlement callbacks already ran.
            self.settlement.replace(Rc::new(Settlement::new()));
            self.completed.set(0);
            self.cancelled.set(0);
        }
        self.tasks.borrow_mut().push(Rc::clone(&task));
        debug!(pending = self.pending_count(), "task registered");
        let weak = self.this.clone();
        task.on_settled(Box::new(move |state| match weak.upgrade() {
            Some(aggregate) => aggregate.member_settled(state),
            None => Ok(()),
        }))
    }

    fn member_settled(&self, state: TaskState) -> Result<()> {
        match state {
            TaskState::Cancelled => self.cancelled.set(self.cancelled.get() + 1),
            _ => self.completed.set(self.completed.get() + 1),
        }
        self.tasks.borrow_mut().retain(|t| !t.is_done());
        if self.pending_count() > 0 {
            return Ok(());
        }
        let outcome = if self.completed.get() == 0 && self.cancelled.get() > 0 {
            TaskState::Cancelled
        } else {
            TaskState::Done
        };
        debug!(
            completed = self.completed.get(),
            cancelled = self.cancelled.get(),
            "aggregate task settled"
        );
        let settlement = Rc::clone(&self.settlement.borrow());
        settlement.settle(outcome)
    }

    /// Members still pending.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.tasks.borrow().iter().filter(|t| !t.is_done()).count()
    }
}

impl LifecycleTask for AggregateLifecycleTask {
    fn state(&self) -> TaskState {
        if self.pending_count() > 0 {
            TaskState::Pending
        } else if self.completed.get() == 0 && self.cancelled.get() > 0 {
            TaskState::Cancelled
        } else {
            TaskState::Done
        }
    }

    fn can_cancel(&self) -> bool {
        let tasks = self.tasks.borrow();
        tasks.iter().any(|t| !t.is_done())
            && tasks.iter().filter(|t| !t.is_done()).all(|t| t.can_cancel())
    }

    fn cancel(&self) {
        if !self.can_cancel() {
            return;
        }
        let tasks: Vec<_> = self.tasks.borrow().clone();
        for task in tasks {
            task.cancel();
        }
    }

    fn on_settled(&self, callback: SettledCallback) -> Result<()> {
        if self.pending_count() == 0 {
            return callback(self.state());
        }
        let settlement = Rc::clone(&self.settlement.borrow());
        settlement.on_settled(callback)
    }
}

impl fmt::Debug for AggregateLifecycleTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateLifecycleTask")
            .field("pending", &self.pending_count())
            .field("completed", &self.completed.get())
            .field("cancelled", &self.cancelled.get())
            .finish()
    }
}
