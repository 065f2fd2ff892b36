#![forbid(unsafe_code)]

//! Runtime: the lifecycle coordinator, bindings, resources and views.
//!
//! A [`Lifecycle`] owns the phase queues and the flush queue; a
//! [`Scheduler`] provides the microtask boundary it drains on. Bindings
//! connect expressions from `vireo-expr` to targets through the observers of
//! `vireo-core`, and views group bindings so they move through `bind`,
//! `attach`, `detach` and `unbind` together.

pub mod binding;
pub mod cancel;
pub mod config;
pub mod lifecycle;
pub mod resources;
pub mod scheduler;
pub mod templating;

pub use binding::{Bindable, BindingEnv};
pub use cancel::{CancellationController, CancellationToken};
pub use config::RuntimeConfig;
pub use lifecycle::{Lifecycle, LifecycleTask, Participant, TaskState};
pub use resources::ResourceRegistry;
pub use scheduler::{Scheduler, UnhandledErrors};
pub use templating::{
    CompositionCoordinator, Instruction, InstructionKind, Renderer, Repeat, View, ViewFactory,
};
