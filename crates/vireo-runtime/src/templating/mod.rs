#![forbid(unsafe_code)]

//! Views and the structures built from them: composition, repeat and the
//! instruction renderer.

pub mod composition;
pub mod renderer;
pub mod repeat;
pub mod view;

pub use composition::{CompositionCoordinator, SwapTask};
pub use renderer::{Instruction, InstructionKind, Rendered, Renderer};
pub use repeat::Repeat;
pub use view::{
    Component, EmptyNodes, NodeSequence, View, ViewFactory, ViewHooks, ViewParts, ViewState,
    ViewTemplate,
};
