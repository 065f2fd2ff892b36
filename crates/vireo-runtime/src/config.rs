#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! Defaults suit interactive use. Every field can be overridden in code with
//! the `with_*` builders, or from `VIREO_*` environment variables through
//! [`RuntimeConfig::from_env`].

use web_time::Duration;

use vireo_core::LifecycleFlags;
use vireo_core::observation::{DEFAULT_DIRTY_CHECK_INTERVAL, DirtyCheckerConfig};
use vireo_expr::cache::DEFAULT_CAPACITY;

/// Default number of views a factory keeps for reuse.
pub const DEFAULT_VIEW_CACHE_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RuntimeConfig {
    /// How often dirty-checked properties are compared.
    pub dirty_check_interval: Duration,
    /// Fail instead of falling back to dirty checking.
    pub dirty_check_disabled: bool,
    /// Warn whenever a property falls back to dirty checking.
    pub dirty_check_warn: bool,
    /// Capacity of the shared expression parse cache.
    pub expression_cache_capacity: usize,
    /// Views each factory keeps for reuse.
    pub view_cache_size: usize,
    /// Calls to non-functions fail instead of yielding `undefined`.
    pub strict_evaluation: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dirty_check_interval: DEFAULT_DIRTY_CHECK_INTERVAL,
            dirty_check_disabled: false,
            dirty_check_warn: false,
            expression_cache_capacity: DEFAULT_CAPACITY,
            view_cache_size: DEFAULT_VIEW_CACHE_SIZE,
            strict_evaluation: false,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "1" => Some(true),
        "0" => Some(false),
        v if v.eq_ignore_ascii_case("true") => Some(true),
        v if v.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `VIREO_DIRTY_CHECK_MS`,
    /// `VIREO_DIRTY_CHECK_DISABLED`, `VIREO_EXPR_CACHE` and `VIREO_STRICT`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`RuntimeConfig::from_env`], reading variables through `lookup`.
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("VIREO_DIRTY_CHECK_MS") {
            match val.trim().parse::<u64>() {
                Ok(ms) => config.dirty_check_interval = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %val, "ignoring invalid VIREO_DIRTY_CHECK_MS"),
            }
        }
        if let Some(val) = lookup("VIREO_DIRTY_CHECK_DISABLED") {
            match parse_flag(&val) {
                Some(disabled) => config.dirty_check_disabled = disabled,
                None => {
                    tracing::warn!(value = %val, "ignoring invalid VIREO_DIRTY_CHECK_DISABLED");
                }
            }
        }
        if let Some(val) = lookup("VIREO_EXPR_CACHE") {
            match val.trim().parse::<usize>() {
                Ok(capacity) => config.expression_cache_capacity = capacity,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid VIREO_EXPR_CACHE"),
            }
        }
        if let Some(val) = lookup("VIREO_STRICT") {
            match parse_flag(&val) {
                Some(strict) => config.strict_evaluation = strict,
                None => tracing::warn!(value = %val, "ignoring invalid VIREO_STRICT"),
            }
        }
        config
    }

    #[must_use]
    pub fn with_dirty_check_interval(mut self, interval: Duration) -> Self {
        self.dirty_check_interval = interval;
        self
    }

    #[must_use]
    pub fn with_dirty_check_disabled(mut self, disabled: bool) -> Self {
        self.dirty_check_disabled = disabled;
        self
    }

    #[must_use]
    pub fn with_dirty_check_warn(mut self, warn: bool) -> Self {
        self.dirty_check_warn = warn;
        self
    }

    #[must_use]
    pub fn with_expression_cache_capacity(mut self, capacity: usize) -> Self {
        self.expression_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_view_cache_size(mut self, size: usize) -> Self {
        self.view_cache_size = size;
        self
    }

    #[must_use]
    pub fn with_strict_evaluation(mut self, strict: bool) -> Self {
        self.strict_evaluation = strict;
        self
    }

    /// Settings for the observer locator's dirty checker.
    #[must_use]
    pub fn dirty_checker(&self) -> DirtyCheckerConfig {
        DirtyCheckerConfig {
            interval: self.dirty_check_interval,
            disabled: self.dirty_check_disabled,
            warn: self.dirty_check_warn,
        }
    }

    /// Flags every binding carries into its evaluations.
    #[must_use]
    pub fn binding_flags(&self) -> LifecycleFlags {
        if self.strict_evaluation {
            LifecycleFlags::IS_STRICT_BINDING_STRATEGY
        } else {
            LifecycleFlags::empty()
        }
    }
}
