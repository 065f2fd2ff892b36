#![forbid(unsafe_code)]

//! Cooperative cancellation for asynchronous lifecycle work.
//!
//! A [`CancellationToken`] is checked at every resume point of a task; the
//! companion [`CancellationController`] is held by whoever may cancel it.
//! Tokens derived with [`CancellationToken::child`] observe their parent's
//! cancellation as well as their own.
//!
//! # Example
//!
//! ```
//! use vireo_runtime::cancel::CancellationToken;
//!
//! let (token, ctrl) = CancellationToken::new();
//! let (child, _child_ctrl) = token.child();
//! assert!(token.check().is_ok());
//! ctrl.cancel();
//! assert!(child.is_cancelled());
//! assert!(child.check().is_err());
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;
use vireo_core::{Error, Result};

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

fn next_token_id() -> u64 {
    NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
struct TokenInner {
    id: u64,
    cancelled: Cell<bool>,
    parent: Option<Rc<TokenInner>>,
}

impl TokenInner {
    fn is_cancelled(&self) -> bool {
        self.cancelled.get() || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }
}

/// Cancellation handle. Cheap to clone.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    inner: Rc<TokenInner>,
}

impl CancellationToken {
    /// A root token and its controller.
    #[must_use]
    pub fn new() -> (Self, CancellationController) {
        Self::new_inner(None)
    }

    /// A token that is cancelled with `self` or through its own controller.
    #[must_use]
    pub fn child(&self) -> (Self, CancellationController) {
        Self::new_inner(Some(Rc::clone(&self.inner)))
    }

    fn new_inner(parent: Option<Rc<TokenInner>>) -> (Self, CancellationController) {
        let inner = Rc::new(TokenInner {
            id: next_token_id(),
            cancelled: Cell::new(false),
            parent,
        });
        let ctrl = CancellationController {
            inner: Rc::clone(&inner),
        };
        (Self { inner }, ctrl)
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether this token or any ancestor was cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// `Err(TaskCancelled)` once cancelled. Intended for resume points.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::TaskCancelled)
        } else {
            Ok(())
        }
    }
}

/// Cancels the associated token. Dropping the controller does not cancel.
#[derive(Debug)]
pub struct CancellationController {
    inner: Rc<TokenInner>,
}

impl CancellationController {
    pub fn cancel(&self) {
        if !self.inner.cancelled.replace(true) {
            debug!(token_id = self.inner.id, "token cancelled");
        }
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.get()
    }

    /// A fresh handle to the controlled token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            inner: Rc::clone(&self.inner),
        }
    }
}
