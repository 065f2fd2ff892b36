#![forbid(unsafe_code)]

//! Error taxonomy shared by every Vireo crate.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by evaluation, observation and scheduling.
///
/// None of these are retried locally; they surface to the caller.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A binding was evaluated without a scope (not bound, or already unbound).
    #[error("no scope available while {operation}")]
    UnboundScope { operation: &'static str },

    #[error("'{name}' is not a function")]
    NotAFunction { name: String },

    #[error("expression of kind {kind} is not assignable")]
    NotAssignable { kind: &'static str },

    #[error("binding behavior '{name}' is already applied to this binding")]
    BehaviorAlreadyApplied { name: String },

    #[error("no value converter named '{name}' is registered")]
    MissingValueConverter { name: String },

    #[error("no binding behavior named '{name}' is registered")]
    MissingBindingBehavior { name: String },

    #[error("property '{property}' requires dirty checking, which is disabled")]
    DirtyCheckDisabled { property: String },

    /// A user hook or callback reported a failure.
    #[error("{message}")]
    Hook { message: String },

    #[error("task was cancelled")]
    TaskCancelled,
}

impl Error {
    /// Shorthand for a hook failure.
    #[must_use]
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_a_function(name: impl Into<String>) -> Self {
        Self::NotAFunction { name: name.into() }
    }

    /// Whether this error came from the expression parser.
    #[must_use]
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// What went wrong while parsing an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    EmptyExpression,
    UnexpectedEnd,
    UnexpectedCharacter(char),
    UnexpectedToken(String),
    MissingExpectedToken(&'static str),
    UnterminatedString,
    UnterminatedTemplate,
    InvalidEscape,
    InvalidNumber,
    InvalidMemberExpression,
    InvalidAssignmentTarget,
    InvalidForDeclaration,
    ExpectedIdentifier,
    UnconsumedToken(String),
    NestingTooDeep,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyExpression => write!(f, "empty expression"),
            Self::UnexpectedEnd => write!(f, "unexpected end of expression"),
            Self::UnexpectedCharacter(c) => write!(f, "unexpected character {c:?}"),
            Self::UnexpectedToken(t) => write!(f, "unexpected token '{t}'"),
            Self::MissingExpectedToken(t) => write!(f, "missing expected token '{t}'"),
            Self::UnterminatedString => write!(f, "unterminated string literal"),
            Self::UnterminatedTemplate => write!(f, "unterminated template literal"),
            Self::InvalidEscape => write!(f, "invalid escape sequence"),
            Self::InvalidNumber => write!(f, "invalid numeric literal"),
            Self::InvalidMemberExpression => write!(f, "invalid member expression"),
            Self::InvalidAssignmentTarget => write!(f, "left-hand side is not assignable"),
            Self::InvalidForDeclaration => write!(f, "invalid for-of declaration"),
            Self::ExpectedIdentifier => write!(f, "expected identifier"),
            Self::UnconsumedToken(t) => write!(f, "unconsumed token '{t}'"),
            Self::NestingTooDeep => write!(f, "expression nests too deeply"),
        }
    }
}

/// A position-tagged syntax error. No partial AST accompanies it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at position {position} in '{source_text}'")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Character offset of the offending token.
    pub position: usize,
    pub source_text: Rc<str>,
}

impl ParseError {
    #[must_use]
    pub fn new(kind: ParseErrorKind, position: usize, source_text: impl Into<Rc<str>>) -> Self {
        Self {
            kind,
            position,
            source_text: source_text.into(),
        }
    }
}
