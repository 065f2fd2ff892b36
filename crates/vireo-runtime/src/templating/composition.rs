#![forbid(unsafe_code)]

//! Swapping one view for another.
//!
//! A swap removes the current view, returns it to its factory's cache,
//! binds the incoming view and attaches it when the coordinator is
//! attached. Each step may return a pending lifecycle task; the swap then
//! continues on the scheduler once the task settles. When nothing is
//! pending the whole swap completes inside [`CompositionCoordinator::compose`].
//!
//! # Invariants
//!
//! 1. At most one swap is in flight.
//! 2. A compose request arriving while a swap is in flight cancels that swap
//!    if it can be cancelled; otherwise the request is queued and replaces
//!    any request queued before it.
//! 3. A cancelled swap never becomes current. It cleans up its incoming
//!    view when it next resumes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::task::noop_waker_ref;
use tracing::{debug, trace, warn};
use vireo_core::{LifecycleFlags, Result, Scope};

use super::view::{Component, View};
use crate::cancel::{CancellationController, CancellationToken};
use crate::lifecycle::{Lifecycle, LifecycleTask, SettledCallback, Settlement, TaskState, done};

/// The task returned by [`CompositionCoordinator::compose`].
pub struct SwapTask {
    settlement: Settlement,
    controller: CancellationController,
    awaited: RefCell<Option<Rc<dyn LifecycleTask>>>,
}

impl SwapTask {
    fn new(controller: CancellationController) -> Rc<Self> {
        Rc::new(Self {
            settlement: Settlement::new(),
            controller,
            awaited: RefCell::new(None),
        })
    }

    /// Wait for `step`, recording it so a cancel can reach it.
    async fn wait_for(&self, step: Rc<dyn LifecycleTask>) -> Result<TaskState> {
        if step.is_done() {
            return Ok(step.state());
        }
        let (tx, rx) = oneshot::channel();
        step.on_settled(Box::new(move |state| {
            let _ = tx.send(state);
            Ok(())
        }))?;
        *self.awaited.borrow_mut() = Some(step);
        let state = rx.await.unwrap_or(TaskState::Cancelled);
        self.awaited.borrow_mut().take();
        Ok(state)
    }
}

impl LifecycleTask for SwapTask {
    fn state(&self) -> TaskState {
        self.settlement.state()
    }

    fn can_cancel(&self) -> bool {
        !self.is_done()
            && self
                .awaited
                .borrow()
                .as_ref()
                .is_none_or(|step| step.can_cancel())
    }

    fn cancel(&self) {
        if !self.can_cancel() {
            return;
        }
        self.controller.cancel();
        let awaited = self.awaited.borrow().clone();
        if let Some(step) = awaited {
            step.cancel();
        }
        if let Err(err) = self.settlement.settle(TaskState::Cancelled) {
            tracing::error!(error = %err, "callback failed after cancel");
        }
    }

    fn on_settled(&self, callback: SettledCallback) -> Result<()> {
        self.settlement.on_settled(callback)
    }
}

impl fmt::Debug for SwapTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapTask")
            .field("state", &self.state())
            .field("waiting", &self.awaited.borrow().is_some())
            .finish()
    }
}

/// Holds at most one current view and swaps it on request.
pub struct CompositionCoordinator {
    me: Weak<CompositionCoordinator>,
    lifecycle: Lifecycle,
    scope: RefCell<Option<Scope>>,
    current: RefCell<Option<Rc<View>>>,
    in_flight: RefCell<Option<Rc<SwapTask>>>,
    queued: RefCell<Option<Option<Rc<View>>>>,
    attached: Cell<bool>,
}

impl CompositionCoordinator {
    #[must_use]
    pub fn new(lifecycle: Lifecycle) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            lifecycle,
            scope: RefCell::new(None),
            current: RefCell::new(None),
            in_flight: RefCell::new(None),
            queued: RefCell::new(None),
            attached: Cell::new(false),
        })
    }

    #[must_use]
    pub fn current(&self) -> Option<Rc<View>> {
        self.current.borrow().clone()
    }

    #[must_use]
    pub fn is_composing(&self) -> bool {
        self.in_flight
            .borrow()
            .as_ref()
            .is_some_and(|task| !task.is_done())
    }

    /// Replace the current view with `view` (`None` clears it).
    pub fn compose(
        &self,
        view: Option<Rc<View>>,
        flags: LifecycleFlags,
    ) -> Result<Rc<dyn LifecycleTask>> {
        let running = self.in_flight.borrow().clone();
        if let Some(running) = running.filter(|task| !task.is_done()) {
            if !running.can_cancel() {
                debug!("compose queued behind a running swap");
                *self.queued.borrow_mut() = Some(view);
                return Ok(running);
            }
            debug!("cancelling the running swap");
            running.cancel();
        }
        self.start_swap(view, flags)
    }

    fn start_swap(
        &self,
        view: Option<Rc<View>>,
        flags: LifecycleFlags,
    ) -> Result<Rc<dyn LifecycleTask>> {
        let Some(me) = self.me.upgrade() else {
            return Ok(done());
        };
        self.queued.borrow_mut().take();
        let (token, controller) = CancellationToken::new();
        let task = SwapTask::new(controller);
        *self.in_flight.borrow_mut() = Some(Rc::clone(&task));

        let swap = {
            let task = Rc::clone(&task);
            async move {
                let outcome = me.swap(&task, &token, view, flags).await;
                if outcome.is_err() {
                    me.release(&task);
                    task.settlement.settle(TaskState::Done)?;
                }
                outcome
            }
        };
        let mut swap = Box::pin(swap);
        let mut cx = Context::from_waker(noop_waker_ref());
        match swap.as_mut().poll(&mut cx) {
            Poll::Ready(outcome) => outcome?,
            Poll::Pending => {
                trace!("swap continues on the scheduler");
                self.lifecycle.scheduler().queue_microtask(swap);
            }
        }
        Ok(task)
    }

    async fn swap(
        &self,
        task: &SwapTask,
        token: &CancellationToken,
        incoming: Option<Rc<View>>,
        flags: LifecycleFlags,
    ) -> Result<()> {
        let outgoing = self.current.borrow_mut().take();
        if let Some(old) = outgoing {
            let removal = old.remove(flags)?;
            task.wait_for(removal).await?;
            old.cache(flags)?;
        }
        if let Some(view) = &incoming {
            let scope = self.scope.borrow().clone();
            if let Some(scope) = scope {
                if token.is_cancelled() {
                    return abandon(view, flags);
                }
                let binding = view.bind(flags, &scope)?;
                task.wait_for(binding).await?;
            }
            if self.attached.get() {
                if token.is_cancelled() {
                    return abandon(view, flags);
                }
                let attaching = view.attach(flags)?;
                task.wait_for(attaching).await?;
            }
            if token.is_cancelled() {
                return abandon(view, flags);
            }
        } else if token.is_cancelled() {
            return Ok(());
        }

        trace!(view = incoming.as_ref().map(|v| v.name().to_owned()), "swap complete");
        *self.current.borrow_mut() = incoming;
        self.release(task);
        task.settlement.settle(TaskState::Done)?;
        let next = self.queued.borrow_mut().take();
        if let Some(next) = next {
            self.compose(next, flags)?;
        }
        Ok(())
    }

    fn release(&self, task: &SwapTask) {
        let mut in_flight = self.in_flight.borrow_mut();
        if in_flight.as_ref().is_some_and(|t| std::ptr::eq(Rc::as_ptr(t), task)) {
            in_flight.take();
        }
    }
}

/// Undo whatever a cancelled swap did to its incoming view.
fn abandon(view: &Rc<View>, flags: LifecycleFlags) -> Result<()> {
    debug!(view = view.name(), "swap cancelled; releasing incoming view");
    view.remove(flags)?;
    view.cache(flags).map(drop)
}

impl Component for CompositionCoordinator {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        *self.scope.borrow_mut() = Some(scope.clone());
        let current = self.current();
        match current {
            Some(view) => view.bind(flags, scope).map(drop),
            None => Ok(()),
        }
    }

    fn attach(&self, flags: LifecycleFlags) -> Result<()> {
        self.attached.set(true);
        let current = self.current();
        match current {
            Some(view) => view.attach(flags).map(drop),
            None => Ok(()),
        }
    }

    fn detach(&self, flags: LifecycleFlags) -> Result<()> {
        self.attached.set(false);
        let current = self.current();
        match current {
            Some(view) => view.detach(flags).map(drop),
            None => Ok(()),
        }
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        let running = self.in_flight.borrow().clone();
        if let Some(running) = running {
            if running.can_cancel() {
                running.cancel();
            } else {
                warn!("unbinding while a swap that cannot be cancelled is running");
            }
        }
        self.queued.borrow_mut().take();
        self.scope.borrow_mut().take();
        let current = self.current();
        match current {
            Some(view) => view.unbind(flags).map(drop),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for CompositionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionCoordinator")
            .field("current", &self.current.borrow().as_ref().map(|v| v.name().to_owned()))
            .field("composing", &self.is_composing())
            .field("queued", &self.queued.borrow().is_some())
            .field("attached", &self.attached.get())
            .finish()
    }
}
