#![forbid(unsafe_code)]

//! Source rendering of expressions, used in diagnostics and traces.
//!
//! The output re-parses to an equivalent tree. Nested operators are always
//! parenthesized, so the text can differ from what was originally written.

use std::fmt::{self, Display, Formatter, Write as _};
use std::rc::Rc;

use vireo_core::Value;
use vireo_core::value::format_number;

use crate::ast::Expr;
use crate::unicode::{is_identifier_part, is_identifier_start};

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_identifier_start) && chars.all(is_identifier_part)
}

fn write_quoted(f: &mut Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('\'')?;
    for c in s.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('\'')
}

fn write_template_text(f: &mut Formatter<'_>, s: &str) -> fmt::Result {
    for c in s.chars() {
        match c {
            '`' => f.write_str("\\`")?,
            '\\' => f.write_str("\\\\")?,
            '$' => f.write_str("\\$")?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

fn write_list(f: &mut Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{expr}")?;
    }
    Ok(())
}

fn write_key(f: &mut Formatter<'_>, key: &str) -> fmt::Result {
    if is_identifier(key) {
        f.write_str(key)
    } else {
        write_quoted(f, key)
    }
}

/// Children in operand position that need parentheses.
fn write_operand(f: &mut Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Binary { .. }
        | Expr::Unary { .. }
        | Expr::Conditional { .. }
        | Expr::Assign { .. }
        | Expr::ValueConverter { .. }
        | Expr::BindingBehavior { .. } => write!(f, "({expr})"),
        _ => write!(f, "{expr}"),
    }
}

fn write_template(f: &mut Formatter<'_>, cooked: &[Rc<str>], exprs: &[Expr]) -> fmt::Result {
    f.write_char('`')?;
    for (i, text) in cooked.iter().enumerate() {
        write_template_text(f, text)?;
        if let Some(expr) = exprs.get(i) {
            write!(f, "${{{expr}}}")?;
        }
    }
    f.write_char('`')
}

fn write_literal(f: &mut Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write_quoted(f, s),
        Value::Number(n) => f.write_str(&format_number(*n)),
        Value::Undefined => f.write_str("undefined"),
        Value::Null => f.write_str("null"),
        other => f.write_str(&other.to_display_string()),
    }
}

fn write_resource(f: &mut Formatter<'_>, sep: &str, name: &str, args: &[Expr]) -> fmt::Result {
    write!(f, " {sep} {name}")?;
    for arg in args {
        f.write_char(':')?;
        write_operand(f, arg)?;
    }
    Ok(())
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write_literal(f, value),
            Self::AccessThis { ancestor: 0 } => f.write_str("$this"),
            Self::AccessThis { ancestor } => {
                f.write_str("$parent")?;
                for _ in 1..*ancestor {
                    f.write_str(".$parent")?;
                }
                Ok(())
            }
            Self::AccessScope { name, ancestor } => {
                for _ in 0..*ancestor {
                    f.write_str("$parent.")?;
                }
                f.write_str(name)
            }
            Self::AccessMember { object, name } => {
                write_operand(f, object)?;
                write!(f, ".{name}")
            }
            Self::AccessKeyed { object, key } => {
                write_operand(f, object)?;
                write!(f, "[{key}]")
            }
            Self::CallScope {
                name,
                args,
                ancestor,
            } => {
                for _ in 0..*ancestor {
                    f.write_str("$parent.")?;
                }
                write!(f, "{name}(")?;
                write_list(f, args)?;
                f.write_char(')')
            }
            Self::CallMember { object, name, args } => {
                write_operand(f, object)?;
                write!(f, ".{name}(")?;
                write_list(f, args)?;
                f.write_char(')')
            }
            Self::CallFunction { func, args } => {
                write_operand(f, func)?;
                f.write_char('(')?;
                write_list(f, args)?;
                f.write_char(')')
            }
            Self::Binary { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {} ", op.as_str())?;
                write_operand(f, right)
            }
            Self::Unary { op, operand } => {
                f.write_str(op.as_str())?;
                if op.as_str().ends_with(|c: char| c.is_ascii_alphabetic()) {
                    f.write_char(' ')?;
                }
                write_operand(f, operand)
            }
            Self::Conditional { condition, yes, no } => {
                write_operand(f, condition)?;
                f.write_str(" ? ")?;
                write_operand(f, yes)?;
                f.write_str(" : ")?;
                write_operand(f, no)
            }
            Self::Assign { target, value } => write!(f, "{target} = {value}"),
            Self::ArrayLiteral { elements } => {
                f.write_char('[')?;
                write_list(f, elements)?;
                f.write_char(']')
            }
            Self::ObjectLiteral { keys, values } | Self::ObjectBindingPattern { keys, values } => {
                f.write_char('{')?;
                for (i, (key, value)) in keys.iter().zip(values).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_key(f, key)?;
                    f.write_str(": ")?;
                    write!(f, "{value}")?;
                }
                f.write_char('}')
            }
            Self::Template {
                cooked,
                expressions,
            } => write_template(f, cooked, expressions),
            Self::TaggedTemplate {
                func,
                cooked,
                expressions,
            } => {
                write_operand(f, func)?;
                write_template(f, cooked, expressions)
            }
            Self::ForOfStatement {
                declaration,
                iterable,
            } => write!(f, "{declaration} of {iterable}"),
            Self::Interpolation { parts, expressions } => {
                for (i, part) in parts.iter().enumerate() {
                    f.write_str(part)?;
                    if let Some(expr) = expressions.get(i) {
                        write!(f, "${{{expr}}}")?;
                    }
                }
                Ok(())
            }
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                write!(f, "{expression}")?;
                write_resource(f, "|", name, args)
            }
            Self::BindingBehavior {
                expression,
                name,
                args,
            } => {
                write!(f, "{expression}")?;
                write_resource(f, "&", name, args)
            }
            Self::BindingIdentifier { name } => f.write_str(name),
            Self::ArrayBindingPattern { elements } => {
                f.write_char('[')?;
                write_list(f, elements)?;
                f.write_char(']')
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::{BindingType, parse};

    fn render(source: &str) -> String {
        parse(source, BindingType::IS_PROPERTY).unwrap().to_string()
    }

    #[test]
    fn renders_parenthesized_operators() {
        assert_eq!(render("a + b * c"), "a + (b * c)");
        assert_eq!(render("!a.b"), "!a.b");
        assert_eq!(render("typeof x"), "typeof x");
        assert_eq!(render("a ? b : c = 1"), "a ? b : (c = 1)");
    }

    #[test]
    fn renders_literals_and_resources() {
        assert_eq!(render("'it\\'s'"), "'it\\'s'");
        assert_eq!(render("{a: 1, 'b c': [1, null]}"), "{a: 1, 'b c': [1, null]}");
        assert_eq!(render("x | fmt:'d' & debounce:200"), "x | fmt:'d' & debounce:200");
        assert_eq!(render("$parent.$parent.x"), "$parent.$parent.x");
        assert_eq!(render("`a${b}\\$`"), "`a${b}\\$`");
    }

    #[test]
    fn rendering_reparses_to_the_same_text() {
        for source in ["a.b[c](d, e)", "-(a - b) / 2", "x ? y : z", "f`t${1 + 2}`"] {
            let once = render(source);
            assert_eq!(render(&once), once);
        }
    }
}
