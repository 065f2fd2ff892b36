#![forbid(unsafe_code)]

//! Parse cache shared by every binding a renderer creates.
//!
//! Trees are keyed by `(source, binding type)` and handed out as `Rc<Expr>`,
//! so identical attribute values across many views parse once. Failures are
//! never cached: a bad expression re-reports its error on every request.

use std::cell::{Cell, RefCell};
use std::num::NonZeroUsize;
use std::rc::Rc;

use lru::LruCache;
use tracing::trace;
use vireo_core::ParseError;

use crate::ast::Expr;
use crate::parser::{BindingType, parse};

/// Default number of cached trees.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type CacheKey = (Rc<str>, BindingType);

/// LRU-cached front end to [`parse`].
pub struct ExpressionParser {
    cache: RefCell<LruCache<CacheKey, Rc<Expr>>>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl Default for ExpressionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionParser {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A parser caching at most `capacity` trees (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RefCell::new(LruCache::new(capacity)),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    /// Parse `source`, reusing a cached tree when available.
    pub fn parse(&self, source: &str, binding_type: BindingType) -> Result<Rc<Expr>, ParseError> {
        let key: CacheKey = (Rc::from(source), binding_type);
        if let Some(expr) = self.cache.borrow_mut().get(&key) {
            self.hits.set(self.hits.get() + 1);
            return Ok(Rc::clone(expr));
        }
        self.misses.set(self.misses.get() + 1);
        let expr = Rc::new(parse(source, binding_type)?);
        trace!(source, ?binding_type, kind = expr.kind().name(), "parsed expression");
        self.cache.borrow_mut().put(key, Rc::clone(&expr));
        Ok(expr)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cache.borrow_mut().clear();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let cache = self.cache.borrow();
        CacheStats {
            hits: self.hits.get(),
            misses: self.misses.get(),
            entries: cache.len(),
            capacity: cache.cap().get(),
        }
    }
}

impl std::fmt::Debug for ExpressionParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionParser")
            .field("stats", &self.stats())
            .finish()
    }
}
