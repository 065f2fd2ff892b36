#![forbid(unsafe_code)]

//! Lifecycle flags threaded through evaluation, observation and scheduling.

bitflags::bitflags! {
    /// Context bits passed to every evaluate/connect/notify/hook call.
    ///
    /// The `FROM_*` bits describe which phase originated the call; the other
    /// bits modulate behavior of the callee.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LifecycleFlags: u32 {
        const FROM_STARTUP                  = 1 << 0;
        const FROM_BIND                     = 1 << 1;
        const FROM_UNBIND                   = 1 << 2;
        const FROM_ATTACH                   = 1 << 3;
        const FROM_DETACH                   = 1 << 4;
        const FROM_FLUSH                    = 1 << 5;
        const FROM_SYNC_FLUSH               = 1 << 6;
        const FROM_ASYNC_FLUSH              = 1 << 7;
        /// The view is about to be detached; skip redundant target writes.
        const DO_NOT_UPDATE_DOM             = 1 << 8;
        /// Notification originates from a synchronous collection mutation.
        const IS_COLLECTION_MUTATION        = 1 << 9;
        const UPDATE_TARGET_INSTANCE        = 1 << 10;
        const UPDATE_SOURCE_EXPRESSION      = 1 << 11;
        /// Calls to non-functions are errors instead of `undefined`.
        const MUST_EVALUATE                 = 1 << 12;
        /// Scope resolution may fall back once to the parent scope.
        const ALLOW_PARENT_SCOPE_TRAVERSAL  = 1 << 13;
        const IS_STRICT_BINDING_STRATEGY    = 1 << 14;
    }
}

impl LifecycleFlags {
    /// All phase-origin bits.
    pub const FROM_LIFECYCLE: Self = Self::FROM_STARTUP
        .union(Self::FROM_BIND)
        .union(Self::FROM_UNBIND)
        .union(Self::FROM_ATTACH)
        .union(Self::FROM_DETACH)
        .union(Self::FROM_FLUSH);

    /// Flags that persist from a binding into the notifications it triggers.
    #[must_use]
    pub fn persistent(self) -> Self {
        self & (Self::IS_STRICT_BINDING_STRATEGY | Self::MUST_EVALUATE)
    }
}

/// Direction(s) in which a binding propagates values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BindingMode {
    /// Evaluate once on bind, never observe.
    OneTime = 0b0001,
    /// Source → target, observing the source.
    #[default]
    ToView = 0b0010,
    /// Target → source, observing the target.
    FromView = 0b0100,
    /// Both directions.
    TwoWay = 0b0110,
}

impl BindingMode {
    /// Whether values flow from source to target.
    #[must_use]
    pub const fn updates_target(self) -> bool {
        matches!(self, Self::OneTime | Self::ToView | Self::TwoWay)
    }

    /// Whether the source expression is observed for changes.
    #[must_use]
    pub const fn observes_source(self) -> bool {
        matches!(self, Self::ToView | Self::TwoWay)
    }

    /// Whether values flow from target to source.
    #[must_use]
    pub const fn updates_source(self) -> bool {
        matches!(self, Self::FromView | Self::TwoWay)
    }

    /// Parse a binding-command style name (`one-time`, `to-view`, `bind`, ...).
    #[must_use]
    pub fn from_command(command: &str) -> Option<Self> {
        match command {
            "one-time" | "oneTime" => Some(Self::OneTime),
            "to-view" | "toView" | "bind" => Some(Self::ToView),
            "from-view" | "fromView" => Some(Self::FromView),
            "two-way" | "twoWay" => Some(Self::TwoWay),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_directions() {
        assert!(BindingMode::OneTime.updates_target());
        assert!(!BindingMode::OneTime.observes_source());
        assert!(BindingMode::TwoWay.updates_source());
        assert!(BindingMode::TwoWay.observes_source());
        assert!(!BindingMode::FromView.updates_target());
    }

    #[test]
    fn persistent_keeps_only_strictness_bits() {
        let flags = LifecycleFlags::FROM_BIND | LifecycleFlags::MUST_EVALUATE;
        assert_eq!(flags.persistent(), LifecycleFlags::MUST_EVALUATE);
    }

    #[test]
    fn command_names() {
        assert_eq!(BindingMode::from_command("bind"), Some(BindingMode::ToView));
        assert_eq!(BindingMode::from_command("two-way"), Some(BindingMode::TwoWay));
        assert_eq!(BindingMode::from_command("trigger"), None);
    }
}
