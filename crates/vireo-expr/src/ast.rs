#![forbid(unsafe_code)]

//! Expression tree.
//!
//! # Design
//!
//! [`Expr`] is a flat enum; pattern matching replaces per-node virtual
//! dispatch. Children are boxed and the whole tree is immutable after the
//! parser returns it, so the cache shares one `Rc<Expr>` between every
//! binding built from the same source text.
//!
//! Per-kind metadata ([`ExprFlags`]) is a constant table indexed by
//! [`ExprKind`]; nothing is computed per node.

use std::rc::Rc;

use vireo_core::Value;

bitflags::bitflags! {
    /// Static properties of an expression kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExprFlags: u16 {
        const IS_PRIMARY        = 1 << 0;
        const IS_LITERAL        = 1 << 1;
        const IS_LEFT_HAND_SIDE = 1 << 2;
        const IS_ASSIGNABLE     = 1 << 3;
        /// Resolves names relative to `$this`/`$parent`.
        const HAS_ANCESTOR      = 1 << 4;
        /// A value converter or binding behavior wrapper.
        const IS_RESOURCE       = 1 << 5;
        const HAS_BIND          = 1 << 6;
        const HAS_UNBIND        = 1 << 7;
    }
}

/// Discriminant of [`Expr`], used for flag lookup and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Literal,
    AccessThis,
    AccessScope,
    AccessMember,
    AccessKeyed,
    CallScope,
    CallMember,
    CallFunction,
    Binary,
    Unary,
    Conditional,
    Assign,
    ArrayLiteral,
    ObjectLiteral,
    Template,
    TaggedTemplate,
    ForOfStatement,
    Interpolation,
    ValueConverter,
    BindingBehavior,
    BindingIdentifier,
    ArrayBindingPattern,
    ObjectBindingPattern,
}

impl ExprKind {
    #[must_use]
    pub const fn flags(self) -> ExprFlags {
        const PRIMARY: u16 = ExprFlags::IS_PRIMARY.bits();
        const LITERAL: u16 = ExprFlags::IS_LITERAL.bits();
        const LHS: u16 = ExprFlags::IS_LEFT_HAND_SIDE.bits();
        const ASSIGNABLE: u16 = ExprFlags::IS_ASSIGNABLE.bits();
        const ANCESTOR: u16 = ExprFlags::HAS_ANCESTOR.bits();
        const RESOURCE: u16 = ExprFlags::IS_RESOURCE.bits();
        const BIND: u16 = ExprFlags::HAS_BIND.bits();
        const UNBIND: u16 = ExprFlags::HAS_UNBIND.bits();
        let bits = match self {
            Self::Literal | Self::ArrayLiteral | Self::ObjectLiteral | Self::Template => {
                PRIMARY | LITERAL
            }
            Self::AccessThis => PRIMARY | ANCESTOR,
            Self::AccessScope => PRIMARY | LHS | ASSIGNABLE | ANCESTOR,
            Self::AccessMember | Self::AccessKeyed => LHS | ASSIGNABLE,
            Self::CallScope => LHS | ANCESTOR,
            Self::CallMember | Self::CallFunction | Self::TaggedTemplate => LHS,
            Self::Assign => ASSIGNABLE,
            Self::Binary
            | Self::Unary
            | Self::Conditional
            | Self::ForOfStatement
            | Self::Interpolation => 0,
            Self::ValueConverter => RESOURCE | ASSIGNABLE | UNBIND,
            Self::BindingBehavior => RESOURCE | ASSIGNABLE | BIND | UNBIND,
            Self::BindingIdentifier | Self::ArrayBindingPattern | Self::ObjectBindingPattern => {
                ASSIGNABLE
            }
        };
        ExprFlags::from_bits_truncate(bits)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Literal => "Literal",
            Self::AccessThis => "AccessThis",
            Self::AccessScope => "AccessScope",
            Self::AccessMember => "AccessMember",
            Self::AccessKeyed => "AccessKeyed",
            Self::CallScope => "CallScope",
            Self::CallMember => "CallMember",
            Self::CallFunction => "CallFunction",
            Self::Binary => "Binary",
            Self::Unary => "Unary",
            Self::Conditional => "Conditional",
            Self::Assign => "Assign",
            Self::ArrayLiteral => "ArrayLiteral",
            Self::ObjectLiteral => "ObjectLiteral",
            Self::Template => "Template",
            Self::TaggedTemplate => "TaggedTemplate",
            Self::ForOfStatement => "ForOfStatement",
            Self::Interpolation => "Interpolation",
            Self::ValueConverter => "ValueConverter",
            Self::BindingBehavior => "BindingBehavior",
            Self::BindingIdentifier => "BindingIdentifier",
            Self::ArrayBindingPattern => "ArrayBindingPattern",
            Self::ObjectBindingPattern => "ObjectBindingPattern",
        }
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Evaluation kernel of a non-short-circuit binary operator.
pub type BinaryKernel = fn(&Value, &Value) -> Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    InstanceOf,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

fn op_eq(l: &Value, r: &Value) -> Value {
    Value::Bool(l.loose_equals(r))
}

fn op_ne(l: &Value, r: &Value) -> Value {
    Value::Bool(!l.loose_equals(r))
}

fn op_strict_eq(l: &Value, r: &Value) -> Value {
    Value::Bool(l.strict_equals(r))
}

fn op_strict_ne(l: &Value, r: &Value) -> Value {
    Value::Bool(!l.strict_equals(r))
}

fn op_lt(l: &Value, r: &Value) -> Value {
    Value::Bool(l.compare(r).is_some_and(std::cmp::Ordering::is_lt))
}

fn op_gt(l: &Value, r: &Value) -> Value {
    Value::Bool(l.compare(r).is_some_and(std::cmp::Ordering::is_gt))
}

fn op_le(l: &Value, r: &Value) -> Value {
    Value::Bool(l.compare(r).is_some_and(std::cmp::Ordering::is_le))
}

fn op_ge(l: &Value, r: &Value) -> Value {
    Value::Bool(l.compare(r).is_some_and(std::cmp::Ordering::is_ge))
}

fn op_in(l: &Value, r: &Value) -> Value {
    Value::Bool(r.has_key(l))
}

fn op_instance_of(l: &Value, r: &Value) -> Value {
    Value::Bool(l.instance_of(r))
}

fn op_and(l: &Value, r: &Value) -> Value {
    if l.is_truthy() { r.clone() } else { l.clone() }
}

fn op_or(l: &Value, r: &Value) -> Value {
    if l.is_truthy() { l.clone() } else { r.clone() }
}

impl BinaryOp {
    /// The kernel for this operator. `&&` and `||` are short-circuited by
    /// the evaluator before the kernel runs; their kernels only select.
    #[must_use]
    pub fn kernel(self) -> BinaryKernel {
        match self {
            Self::And => op_and,
            Self::Or => op_or,
            Self::Eq => op_eq,
            Self::Ne => op_ne,
            Self::StrictEq => op_strict_eq,
            Self::StrictNe => op_strict_ne,
            Self::Lt => op_lt,
            Self::Gt => op_gt,
            Self::Le => op_le,
            Self::Ge => op_ge,
            Self::In => op_in,
            Self::InstanceOf => op_instance_of,
            Self::Add => Value::add,
            Self::Sub => Value::subtract,
            Self::Mul => Value::multiply,
            Self::Div => Value::divide,
            Self::Rem => Value::remainder,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::StrictEq => "===",
            Self::StrictNe => "!==",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::In => "in",
            Self::InstanceOf => "instanceof",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Void,
    TypeOf,
    Not,
    Neg,
    Plus,
}

impl UnaryOp {
    #[must_use]
    pub fn apply(self, operand: &Value) -> Value {
        match self {
            Self::Void => Value::Undefined,
            Self::TypeOf => Value::from(operand.type_of()),
            Self::Not => Value::Bool(!operand.is_truthy()),
            Self::Neg => Value::Number(-operand.to_number()),
            Self::Plus => Value::Number(operand.to_number()),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::TypeOf => "typeof",
            Self::Not => "!",
            Self::Neg => "-",
            Self::Plus => "+",
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A parsed binding expression.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A primitive constant.
    Literal(Value),
    /// `$this` (`ancestor == 0`) or `$parent` repeated `ancestor` times.
    AccessThis { ancestor: u32 },
    AccessScope { name: Rc<str>, ancestor: u32 },
    AccessMember { object: Box<Expr>, name: Rc<str> },
    AccessKeyed { object: Box<Expr>, key: Box<Expr> },
    CallScope { name: Rc<str>, args: Vec<Expr>, ancestor: u32 },
    CallMember { object: Box<Expr>, name: Rc<str>, args: Vec<Expr> },
    CallFunction { func: Box<Expr>, args: Vec<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Conditional { condition: Box<Expr>, yes: Box<Expr>, no: Box<Expr> },
    Assign { target: Box<Expr>, value: Box<Expr> },
    ArrayLiteral { elements: Vec<Expr> },
    ObjectLiteral { keys: Vec<Rc<str>>, values: Vec<Expr> },
    /// `cooked.len() == expressions.len() + 1`.
    Template { cooked: Vec<Rc<str>>, expressions: Vec<Expr> },
    TaggedTemplate { func: Box<Expr>, cooked: Vec<Rc<str>>, expressions: Vec<Expr> },
    ForOfStatement { declaration: Box<Expr>, iterable: Box<Expr> },
    /// `parts.len() == expressions.len() + 1`.
    Interpolation { parts: Vec<Rc<str>>, expressions: Vec<Expr> },
    ValueConverter { expression: Box<Expr>, name: Rc<str>, args: Vec<Expr> },
    BindingBehavior { expression: Box<Expr>, name: Rc<str>, args: Vec<Expr> },
    BindingIdentifier { name: Rc<str> },
    ArrayBindingPattern { elements: Vec<Expr> },
    ObjectBindingPattern { keys: Vec<Rc<str>>, values: Vec<Expr> },
}

impl Expr {
    #[must_use]
    pub fn kind(&self) -> ExprKind {
        match self {
            Self::Literal(_) => ExprKind::Literal,
            Self::AccessThis { .. } => ExprKind::AccessThis,
            Self::AccessScope { .. } => ExprKind::AccessScope,
            Self::AccessMember { .. } => ExprKind::AccessMember,
            Self::AccessKeyed { .. } => ExprKind::AccessKeyed,
            Self::CallScope { .. } => ExprKind::CallScope,
            Self::CallMember { .. } => ExprKind::CallMember,
            Self::CallFunction { .. } => ExprKind::CallFunction,
            Self::Binary { .. } => ExprKind::Binary,
            Self::Unary { .. } => ExprKind::Unary,
            Self::Conditional { .. } => ExprKind::Conditional,
            Self::Assign { .. } => ExprKind::Assign,
            Self::ArrayLiteral { .. } => ExprKind::ArrayLiteral,
            Self::ObjectLiteral { .. } => ExprKind::ObjectLiteral,
            Self::Template { .. } => ExprKind::Template,
            Self::TaggedTemplate { .. } => ExprKind::TaggedTemplate,
            Self::ForOfStatement { .. } => ExprKind::ForOfStatement,
            Self::Interpolation { .. } => ExprKind::Interpolation,
            Self::ValueConverter { .. } => ExprKind::ValueConverter,
            Self::BindingBehavior { .. } => ExprKind::BindingBehavior,
            Self::BindingIdentifier { .. } => ExprKind::BindingIdentifier,
            Self::ArrayBindingPattern { .. } => ExprKind::ArrayBindingPattern,
            Self::ObjectBindingPattern { .. } => ExprKind::ObjectBindingPattern,
        }
    }

    #[must_use]
    pub fn flags(&self) -> ExprFlags {
        self.kind().flags()
    }

    #[must_use]
    pub fn is_assignable(&self) -> bool {
        self.flags().contains(ExprFlags::IS_ASSIGNABLE)
    }

    /// The declaration and iterable of a for-of statement.
    #[must_use]
    pub fn as_for_of(&self) -> Option<(&Expr, &Expr)> {
        match self {
            Self::ForOfStatement {
                declaration,
                iterable,
            } => Some((declaration, iterable)),
            _ => None,
        }
    }

    /// Whether this is an interpolation with at least one `${...}` part.
    #[must_use]
    pub fn has_interpolation(&self) -> bool {
        matches!(self, Self::Interpolation { expressions, .. } if !expressions.is_empty())
    }

    /// Strip value converter and binding behavior wrappers.
    #[must_use]
    pub fn unwrap_resources(&self) -> &Expr {
        match self {
            Self::ValueConverter { expression, .. } | Self::BindingBehavior { expression, .. } => {
                expression.unwrap_resources()
            }
            other => other,
        }
    }

    /// Names of the binding behaviors wrapping this expression, outermost
    /// first.
    #[must_use]
    pub fn behavior_names(&self) -> Vec<Rc<str>> {
        let mut names = Vec::new();
        let mut current = self;
        loop {
            match current {
                Self::BindingBehavior {
                    expression, name, ..
                } => {
                    names.push(Rc::clone(name));
                    current = expression;
                }
                Self::ValueConverter { expression, .. } => current = expression,
                _ => return names,
            }
        }
    }
}
