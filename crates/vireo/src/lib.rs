#![forbid(unsafe_code)]

//! Vireo public facade crate.
//!
//! Re-exports the workspace crates and gathers the everyday types in
//! [`prelude`].

pub use vireo_core as core;
pub use vireo_expr as expr;
pub use vireo_runtime as runtime;

pub mod prelude {
    pub use vireo_core::{
        BindingMode, Error, LifecycleFlags, ObjectRef, ObserverLocator, Result, Scope, Value,
    };
    pub use vireo_expr::{BindingType, ExpressionParser, parse};
    pub use vireo_runtime::binding::{LetTarget, Listener};
    pub use vireo_runtime::templating::{NodeSequence, ViewHooks, ViewParts};
    pub use vireo_runtime::{
        Bindable, BindingEnv, CompositionCoordinator, Instruction, InstructionKind, Lifecycle,
        LifecycleTask, Renderer, Repeat, ResourceRegistry, RuntimeConfig, Scheduler, View,
        ViewFactory,
    };
}
