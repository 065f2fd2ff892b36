#![forbid(unsafe_code)]

//! Turns compiled instructions into bindings.

use std::rc::Rc;

use tracing::{debug, trace};
use vireo_core::{BindingMode, Error, Result, Value};
use vireo_expr::{BindingType, Expr, ExpressionParser};

use crate::binding::{
    Bindable, BindingEnv, CallBinding, InterpolationBinding, LetBinding, LetTarget, Listener,
    PropertyBinding, RefBinding,
};
use crate::config::RuntimeConfig;
use crate::lifecycle::Lifecycle;
use crate::resources::ResourceRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    /// Bind `target[property]` to the source.
    Property(String),
    /// Render `Hello ${name}` text into `target[property]`.
    Interpolation(String),
    /// Install a function on `target[property]`.
    Call(String),
    /// Handle the named event.
    Listener(String),
    Let { property: String, to: LetTarget },
    /// Publish the target itself into the scope.
    Ref,
}

/// One binding to create against `targets[target]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub target: usize,
    pub kind: InstructionKind,
    pub source: String,
    pub mode: BindingMode,
}

impl Instruction {
    pub fn new(target: usize, kind: InstructionKind, source: impl Into<String>) -> Self {
        Self {
            target,
            kind,
            source: source.into(),
            mode: BindingMode::ToView,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: BindingMode) -> Self {
        self.mode = mode;
        self
    }

    fn binding_type(&self) -> BindingType {
        match self.kind {
            InstructionKind::Interpolation(_) => BindingType::INTERPOLATION,
            InstructionKind::Call(_) => BindingType::IS_FUNCTION,
            InstructionKind::Listener(_) => BindingType::IS_EVENT,
            InstructionKind::Property(_) | InstructionKind::Let { .. } | InstructionKind::Ref => {
                BindingType::IS_PROPERTY
            }
        }
    }
}

/// The output of [`Renderer::render`]. Listeners are also listed among the
/// bindings; they are kept separately so the host can deliver events.
#[derive(Default)]
pub struct Rendered {
    pub bindings: Vec<Rc<dyn Bindable>>,
    pub listeners: Vec<Rc<Listener>>,
}

impl std::fmt::Debug for Rendered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendered")
            .field("bindings", &self.bindings.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[derive(Clone)]
pub struct Renderer {
    env: BindingEnv,
    parser: Rc<ExpressionParser>,
}

impl Renderer {
    #[must_use]
    pub fn new(env: BindingEnv, parser: Rc<ExpressionParser>) -> Self {
        Self { env, parser }
    }

    /// A renderer whose environment and parse cache follow `config`.
    #[must_use]
    pub fn from_config(
        lifecycle: &Lifecycle,
        resources: Rc<ResourceRegistry>,
        config: &RuntimeConfig,
    ) -> Self {
        let env = BindingEnv::from_config(lifecycle, resources, config);
        let parser = ExpressionParser::with_capacity(config.expression_cache_capacity);
        Self::new(env, Rc::new(parser))
    }

    #[must_use]
    pub fn env(&self) -> &BindingEnv {
        &self.env
    }

    #[must_use]
    pub fn parser(&self) -> &ExpressionParser {
        &self.parser
    }

    /// Create the bindings `instructions` describe. Interpolation
    /// instructions whose text has no `${}` part produce nothing.
    pub fn render(&self, instructions: &[Instruction], targets: &[Value]) -> Result<Rendered> {
        let mut rendered = Rendered::default();
        for instruction in instructions {
            let Some(target) = targets.get(instruction.target) else {
                return Err(Error::hook(format!(
                    "instruction for target {} but only {} targets were given",
                    instruction.target,
                    targets.len()
                )));
            };
            let source = self.parser.parse(&instruction.source, instruction.binding_type())?;
            trace!(source = %instruction.source, kind = ?instruction.kind, "render instruction");
            self.render_one(instruction, source, target.clone(), &mut rendered);
        }
        debug!(
            bindings = rendered.bindings.len(),
            listeners = rendered.listeners.len(),
            "rendered instructions"
        );
        Ok(rendered)
    }

    fn render_one(
        &self,
        instruction: &Instruction,
        source: Rc<Expr>,
        target: Value,
        rendered: &mut Rendered,
    ) {
        let env = self.env.clone();
        let binding: Rc<dyn Bindable> = match &instruction.kind {
            InstructionKind::Property(property) => {
                PropertyBinding::new(env, source, target, property, instruction.mode)
            }
            InstructionKind::Interpolation(property) => {
                if !source.has_interpolation() {
                    return;
                }
                InterpolationBinding::new(env, source, target, property, instruction.mode)
            }
            InstructionKind::Call(property) => CallBinding::new(env, source, target, property),
            InstructionKind::Listener(event) => {
                let listener = Listener::new(env, event, source);
                rendered.listeners.push(Rc::clone(&listener));
                listener
            }
            InstructionKind::Let { property, to } => LetBinding::new(env, source, property, *to),
            InstructionKind::Ref => RefBinding::new(env, source, target),
        };
        rendered.bindings.push(binding);
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("env", &self.env)
            .field("parser", &self.parser.stats())
            .finish()
    }
}
