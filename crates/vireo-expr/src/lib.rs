#![forbid(unsafe_code)]

//! Binding expressions for Vireo.
//!
//! Source text such as `items.length > 0 && !busy | label & signal:'locale'`
//! is scanned by [`lexer`], parsed by [`parser`] into an [`Expr`] tree, and
//! cached by [`ExpressionParser`]. The tree is then evaluated, assigned
//! through and connected against a [`vireo_core::Scope`] (see [`evaluate`]).
//!
//! # Example
//!
//! ```
//! use vireo_core::{LifecycleFlags, ObjectRef, Scope, Value};
//! use vireo_expr::{BindingType, NoResources, parse};
//!
//! let model = ObjectRef::from_pairs([("count", Value::from(2))]);
//! let scope = Scope::new(Value::Object(model));
//! let expr = parse("count * 21", BindingType::IS_PROPERTY).unwrap();
//! let value = expr.evaluate(LifecycleFlags::empty(), &scope, &NoResources).unwrap();
//! assert_eq!(value.to_number(), 42.0);
//! ```

pub mod ast;
pub mod builtins;
pub mod cache;
pub mod evaluate;
pub mod for_of;
mod lexer;
pub mod parser;
pub mod resources;
pub mod token;
pub mod unicode;
mod unparse;

pub use ast::{BinaryOp, Expr, ExprFlags, ExprKind, UnaryOp};
pub use cache::{CacheStats, ExpressionParser};
pub use parser::{BindingType, parse};
pub use resources::{
    AppliedBehaviors, BindingBehavior, BindingHost, NoResources, ServiceLocator, Signaler,
    ValueConverter,
};
