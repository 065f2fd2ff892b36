#![forbid(unsafe_code)]

//! Recursive-descent, precedence-climbing expression parser.
//!
//! # Design
//!
//! One [`ParserState`] cursor is threaded through every production. Binary
//! operators carry their precedence tier in the token bits, so a single
//! climbing loop ([`ParserState::parse_binary`]) handles every tier between
//! `||` and `*`. The looser tiers (variadic converter/behavior chains,
//! assignment, conditional) and the tighter ones (unary, left-hand side,
//! primary) have their own productions.
//!
//! # Failure Modes
//!
//! Every syntax error is a [`ParseError`] carrying the character offset of
//! the offending token and the full source text. No partial tree is ever
//! returned.

use std::rc::Rc;

use vireo_core::{ParseError, ParseErrorKind, Value, value::format_number};

use crate::ast::{BinaryOp, Expr, ExprFlags, UnaryOp};
use crate::lexer::{PResult, ParserState, TokenValue};
use crate::token::{Precedence, Token};

/// Nesting limit for unary, grouping and literal productions.
const MAX_DEPTH: u32 = 64;

bitflags::bitflags! {
    /// What kind of attribute an expression was written in. Selects the
    /// entry production and the empty-source policy.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BindingType: u16 {
        /// Raw text with `${...}` parts.
        const INTERPOLATION = 1 << 0;
        /// `declaration of iterable` (repeat).
        const IS_ITERATOR   = 1 << 1;
        /// `.call` command.
        const IS_FUNCTION   = 1 << 2;
        /// `.bind`, `.one-time`, `.to-view`, `.from-view`, `.two-way`.
        const IS_PROPERTY   = 1 << 3;
        /// `.trigger`, `.delegate`, `.capture`.
        const IS_EVENT      = 1 << 4;
        const IS_CUSTOM     = 1 << 5;
    }
}

impl BindingType {
    /// Binding type for a binding command name.
    #[must_use]
    pub fn from_command(command: &str) -> Self {
        match command {
            "bind" | "one-time" | "to-view" | "from-view" | "two-way" => Self::IS_PROPERTY,
            "call" => Self::IS_FUNCTION,
            "trigger" | "delegate" | "capture" => Self::IS_EVENT,
            "for" => Self::IS_ITERATOR,
            _ => Self::IS_CUSTOM,
        }
    }

    fn requires_expression(self) -> bool {
        self.intersects(Self::IS_FUNCTION | Self::IS_EVENT | Self::IS_ITERATOR)
    }
}

/// Parse `source` without caching.
///
/// Empty (or whitespace-only) source yields `Literal("")` for plain and
/// property bindings and [`ParseErrorKind::EmptyExpression`] for function,
/// event and iterator bindings.
pub fn parse(source: &str, binding_type: BindingType) -> Result<Expr, ParseError> {
    let mut state = ParserState::new(source);
    if binding_type.contains(BindingType::INTERPOLATION) {
        return state.parse_interpolation();
    }
    state.next_token()?;
    if state.current_token == Token::EOF {
        if binding_type.requires_expression() {
            return Err(state.error_at(ParseErrorKind::EmptyExpression, 0));
        }
        return Ok(Expr::Literal(Value::from("")));
    }
    let expr = if binding_type.contains(BindingType::IS_ITERATOR) {
        state.parse_for_of()?
    } else {
        state.parse_variadic()?
    };
    state.expect_end()?;
    Ok(expr)
}

fn binary_op(token: Token) -> Option<BinaryOp> {
    Some(match token {
        Token::BAR_BAR => BinaryOp::Or,
        Token::AMPERSAND_AMPERSAND => BinaryOp::And,
        Token::EQUALS_EQUALS => BinaryOp::Eq,
        Token::BANG_EQUALS => BinaryOp::Ne,
        Token::EQUALS_EQUALS_EQUALS => BinaryOp::StrictEq,
        Token::BANG_EQUALS_EQUALS => BinaryOp::StrictNe,
        Token::LESS_THAN => BinaryOp::Lt,
        Token::GREATER_THAN => BinaryOp::Gt,
        Token::LESS_THAN_EQUALS => BinaryOp::Le,
        Token::GREATER_THAN_EQUALS => BinaryOp::Ge,
        Token::IN => BinaryOp::In,
        Token::INSTANCE_OF => BinaryOp::InstanceOf,
        Token::PLUS => BinaryOp::Add,
        Token::MINUS => BinaryOp::Sub,
        Token::ASTERISK => BinaryOp::Mul,
        Token::SLASH => BinaryOp::Div,
        Token::PERCENT => BinaryOp::Rem,
        _ => return None,
    })
}

fn unary_op(token: Token) -> Option<UnaryOp> {
    Some(match token {
        Token::BANG => UnaryOp::Not,
        Token::MINUS => UnaryOp::Neg,
        Token::PLUS => UnaryOp::Plus,
        Token::TYPE_OF => UnaryOp::TypeOf,
        Token::VOID => UnaryOp::Void,
        _ => return None,
    })
}

impl ParserState<'_> {
    fn expect(&mut self, token: Token) -> PResult<()> {
        if self.current_token != token {
            return Err(self.error(ParseErrorKind::MissingExpectedToken(token.text())));
        }
        self.next_token()
    }

    fn expect_end(&self) -> PResult<()> {
        if self.current_token == Token::EOF {
            Ok(())
        } else {
            Err(self.error(ParseErrorKind::UnconsumedToken(self.token_text())))
        }
    }

    /// Take the name of an identifier (or, when `allow_keyword`, a keyword)
    /// and advance.
    fn take_name(&mut self, allow_keyword: bool) -> PResult<Rc<str>> {
        let token = self.current_token;
        let accepted = token == Token::IDENTIFIER || (allow_keyword && token.is(Token::KEYWORD));
        let name = match &self.token_value {
            TokenValue::Identifier(name) if accepted => Rc::clone(name),
            _ => return Err(self.error(ParseErrorKind::ExpectedIdentifier)),
        };
        self.next_token()?;
        Ok(name)
    }

    fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error(ParseErrorKind::NestingTooDeep));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // -----------------------------------------------------------------------
    // Loose tiers
    // -----------------------------------------------------------------------

    /// `expr (| converter(:arg)*)* (& behavior(:arg)*)*`
    pub(crate) fn parse_variadic(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_assign()?;
        while self.current_token == Token::BAR {
            self.next_token()?;
            let name = self.take_name(false)?;
            let args = self.parse_resource_args()?;
            expr = Expr::ValueConverter {
                expression: Box::new(expr),
                name,
                args,
            };
        }
        while self.current_token == Token::AMPERSAND {
            self.next_token()?;
            let name = self.take_name(false)?;
            let args = self.parse_resource_args()?;
            expr = Expr::BindingBehavior {
                expression: Box::new(expr),
                name,
                args,
            };
        }
        if self.current_token == Token::BAR {
            return Err(self.unexpected());
        }
        Ok(expr)
    }

    fn parse_resource_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        while self.current_token == Token::COLON {
            self.next_token()?;
            args.push(self.parse_assign()?);
        }
        Ok(args)
    }

    fn parse_assign(&mut self) -> PResult<Expr> {
        let start = self.start_index;
        let target = self.parse_conditional()?;
        if !self.current_token.is(Token::IS_ASSIGN) {
            return Ok(target);
        }
        let flags = target.flags();
        if !flags.contains(ExprFlags::IS_LEFT_HAND_SIDE | ExprFlags::IS_ASSIGNABLE) {
            return Err(self.error_at(ParseErrorKind::InvalidAssignmentTarget, start));
        }
        self.next_token()?;
        let value = self.parse_assign()?;
        Ok(Expr::Assign {
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let condition = self.parse_binary(Precedence::Or)?;
        if self.current_token != Token::QUESTION {
            return Ok(condition);
        }
        self.next_token()?;
        let yes = self.parse_assign()?;
        self.expect(Token::COLON)?;
        let no = self.parse_assign()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            yes: Box::new(yes),
            no: Box::new(no),
        })
    }

    /// Precedence climbing over every binary tier at or above `min`.
    fn parse_binary(&mut self, min: Precedence) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let token = self.current_token;
            if !token.is(Token::IS_BINARY) {
                return Ok(left);
            }
            let tier = token.precedence();
            if tier < min {
                return Ok(left);
            }
            let Some(op) = binary_op(token) else {
                return Err(self.unexpected());
            };
            self.next_token()?;
            let right = self.parse_binary(tier.next())?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    // -----------------------------------------------------------------------
    // Tight tiers
    // -----------------------------------------------------------------------

    fn parse_unary(&mut self) -> PResult<Expr> {
        self.enter()?;
        let result = match unary_op(self.current_token) {
            Some(op) if self.current_token.is(Token::IS_UNARY) => {
                self.next_token()?;
                self.parse_unary().map(|operand| Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_left_hand_side(),
        };
        self.leave();
        result
    }

    fn parse_left_hand_side(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current_token {
                Token::DOT => {
                    self.next_token()?;
                    let name = self.take_name(true)?;
                    if self.current_token == Token::OPEN_PAREN {
                        let args = self.parse_arguments()?;
                        expr = Expr::CallMember {
                            object: Box::new(expr),
                            name,
                            args,
                        };
                    } else {
                        expr = Expr::AccessMember {
                            object: Box::new(expr),
                            name,
                        };
                    }
                }
                Token::OPEN_BRACKET => {
                    self.next_token()?;
                    let key = self.parse_assign()?;
                    self.expect(Token::CLOSE_BRACKET)?;
                    expr = Expr::AccessKeyed {
                        object: Box::new(expr),
                        key: Box::new(key),
                    };
                }
                Token::OPEN_PAREN => {
                    let args = self.parse_arguments()?;
                    expr = Expr::CallFunction {
                        func: Box::new(expr),
                        args,
                    };
                }
                Token::BACKTICK => {
                    let (cooked, expressions) = self.parse_template_body()?;
                    expr = Expr::TaggedTemplate {
                        func: Box::new(expr),
                        cooked,
                        expressions,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_arguments(&mut self) -> PResult<Vec<Expr>> {
        self.expect(Token::OPEN_PAREN)?;
        let mut args = Vec::new();
        while self.current_token != Token::CLOSE_PAREN {
            args.push(self.parse_assign()?);
            if self.current_token == Token::COMMA {
                self.next_token()?;
            } else if self.current_token != Token::CLOSE_PAREN {
                return Err(self.error(ParseErrorKind::MissingExpectedToken(")")));
            }
        }
        self.next_token()?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.current_token;
        match token {
            Token::IDENTIFIER => {
                let name = self.take_name(false)?;
                if self.current_token == Token::OPEN_PAREN {
                    let args = self.parse_arguments()?;
                    Ok(Expr::CallScope {
                        name,
                        args,
                        ancestor: 0,
                    })
                } else {
                    Ok(Expr::AccessScope { name, ancestor: 0 })
                }
            }
            Token::THIS_SCOPE => {
                self.next_token()?;
                Ok(Expr::AccessThis { ancestor: 0 })
            }
            Token::PARENT_SCOPE => self.parse_parent_chain(),
            Token::TRUE | Token::FALSE | Token::NULL | Token::UNDEFINED => {
                let value = match token {
                    Token::TRUE => Value::Bool(true),
                    Token::FALSE => Value::Bool(false),
                    Token::NULL => Value::Null,
                    _ => Value::Undefined,
                };
                self.next_token()?;
                Ok(Expr::Literal(value))
            }
            Token::STRING | Token::NUMBER => {
                let value = match &self.token_value {
                    TokenValue::String(s) => Value::String(Rc::clone(s)),
                    TokenValue::Number(n) => Value::Number(*n),
                    _ => Value::Undefined,
                };
                self.next_token()?;
                Ok(Expr::Literal(value))
            }
            Token::OPEN_PAREN => {
                self.next_token()?;
                let expr = self.parse_variadic()?;
                self.expect(Token::CLOSE_PAREN)?;
                Ok(expr)
            }
            Token::OPEN_BRACKET => self.parse_array_literal(),
            Token::OPEN_BRACE => self.parse_object_literal(),
            Token::BACKTICK => {
                let (cooked, expressions) = self.parse_template_body()?;
                Ok(Expr::Template {
                    cooked,
                    expressions,
                })
            }
            _ => Err(self.unexpected()),
        }
    }

    /// `$parent(.$parent)*` optionally followed by `.name` or `.name(args)`.
    fn parse_parent_chain(&mut self) -> PResult<Expr> {
        let mut ancestor = 1;
        self.next_token()?;
        while self.current_token == Token::DOT {
            self.next_token()?;
            if self.current_token == Token::PARENT_SCOPE {
                ancestor += 1;
                self.next_token()?;
                continue;
            }
            let name = self.take_name(true)?;
            if self.current_token == Token::OPEN_PAREN {
                let args = self.parse_arguments()?;
                return Ok(Expr::CallScope {
                    name,
                    args,
                    ancestor,
                });
            }
            return Ok(Expr::AccessScope { name, ancestor });
        }
        Ok(Expr::AccessThis { ancestor })
    }

    fn parse_array_literal(&mut self) -> PResult<Expr> {
        self.next_token()?;
        let mut elements = Vec::new();
        while self.current_token != Token::CLOSE_BRACKET {
            if self.current_token == Token::COMMA {
                elements.push(Expr::Literal(Value::Undefined));
                self.next_token()?;
                continue;
            }
            elements.push(self.parse_assign()?);
            if self.current_token == Token::COMMA {
                self.next_token()?;
            } else if self.current_token != Token::CLOSE_BRACKET {
                return Err(self.error(ParseErrorKind::MissingExpectedToken("]")));
            }
        }
        self.next_token()?;
        Ok(Expr::ArrayLiteral { elements })
    }

    fn parse_object_literal(&mut self) -> PResult<Expr> {
        self.next_token()?;
        let mut keys = Vec::new();
        let mut values = Vec::new();
        while self.current_token != Token::CLOSE_BRACE {
            let shorthand = self.current_token == Token::IDENTIFIER;
            let key: Rc<str> = match &self.token_value {
                TokenValue::Identifier(name) => Rc::clone(name),
                TokenValue::String(s) => Rc::clone(s),
                TokenValue::Number(n) => Rc::from(format_number(*n)),
                TokenValue::None => return Err(self.unexpected()),
            };
            self.next_token()?;
            let value = if self.current_token == Token::COLON {
                self.next_token()?;
                self.parse_assign()?
            } else if shorthand {
                Expr::AccessScope {
                    name: Rc::clone(&key),
                    ancestor: 0,
                }
            } else {
                return Err(self.error(ParseErrorKind::MissingExpectedToken(":")));
            };
            keys.push(key);
            values.push(value);
            if self.current_token == Token::COMMA {
                self.next_token()?;
            } else if self.current_token != Token::CLOSE_BRACE {
                return Err(self.error(ParseErrorKind::MissingExpectedToken("}")));
            }
        }
        self.next_token()?;
        Ok(Expr::ObjectLiteral { keys, values })
    }

    /// Template text and embedded expressions; the current token is the
    /// opening backtick.
    fn parse_template_body(&mut self) -> PResult<(Vec<Rc<str>>, Vec<Expr>)> {
        let mut cooked = Vec::new();
        let mut expressions = Vec::new();
        loop {
            let (text, tail) = self.scan_template_part()?;
            cooked.push(text);
            if tail {
                break;
            }
            self.next_token()?;
            expressions.push(self.parse_assign()?);
            if self.current_token != Token::CLOSE_BRACE {
                return Err(self.error(ParseErrorKind::MissingExpectedToken("}")));
            }
        }
        self.next_token()?;
        Ok((cooked, expressions))
    }

    // -----------------------------------------------------------------------
    // Entry productions
    // -----------------------------------------------------------------------

    pub(crate) fn parse_interpolation(&mut self) -> PResult<Expr> {
        let mut parts = Vec::new();
        let mut expressions = Vec::new();
        loop {
            let (text, has_expression) = self.scan_interpolation_part();
            parts.push(text);
            if !has_expression {
                break;
            }
            self.next_token()?;
            if self.current_token == Token::CLOSE_BRACE {
                return Err(self.error(ParseErrorKind::EmptyExpression));
            }
            expressions.push(self.parse_variadic()?);
            if self.current_token != Token::CLOSE_BRACE {
                return Err(self.error(ParseErrorKind::MissingExpectedToken("}")));
            }
        }
        Ok(Expr::Interpolation { parts, expressions })
    }

    /// `declaration of iterable`.
    pub(crate) fn parse_for_of(&mut self) -> PResult<Expr> {
        let declaration = self.parse_binding_target()?;
        if self.current_token != Token::OF {
            return Err(self.error(ParseErrorKind::MissingExpectedToken("of")));
        }
        self.next_token()?;
        let iterable = self.parse_variadic()?;
        Ok(Expr::ForOfStatement {
            declaration: Box::new(declaration),
            iterable: Box::new(iterable),
        })
    }

    fn parse_binding_target(&mut self) -> PResult<Expr> {
        self.enter()?;
        let result = match self.current_token {
            Token::IDENTIFIER => self
                .take_name(false)
                .map(|name| Expr::BindingIdentifier { name }),
            Token::OPEN_BRACKET => self.parse_array_pattern(),
            Token::OPEN_BRACE => self.parse_object_pattern(),
            _ => Err(self.error(ParseErrorKind::InvalidForDeclaration)),
        };
        self.leave();
        result
    }

    fn parse_array_pattern(&mut self) -> PResult<Expr> {
        self.next_token()?;
        let mut elements = Vec::new();
        while self.current_token != Token::CLOSE_BRACKET {
            elements.push(self.parse_binding_target()?);
            if self.current_token == Token::COMMA {
                self.next_token()?;
            } else if self.current_token != Token::CLOSE_BRACKET {
                return Err(self.error(ParseErrorKind::MissingExpectedToken("]")));
            }
        }
        self.next_token()?;
        Ok(Expr::ArrayBindingPattern { elements })
    }

    fn parse_object_pattern(&mut self) -> PResult<Expr> {
        self.next_token()?;
        let mut keys = Vec::new();
        let mut values = Vec::new();
        while self.current_token != Token::CLOSE_BRACE {
            let key = self.take_name(true)?;
            let value = if self.current_token == Token::COLON {
                self.next_token()?;
                self.parse_binding_target()?
            } else {
                Expr::BindingIdentifier {
                    name: Rc::clone(&key),
                }
            };
            keys.push(key);
            values.push(value);
            if self.current_token == Token::COMMA {
                self.next_token()?;
            } else if self.current_token != Token::CLOSE_BRACE {
                return Err(self.error(ParseErrorKind::MissingExpectedToken("}")));
            }
        }
        self.next_token()?;
        Ok(Expr::ObjectBindingPattern { keys, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprKind;

    fn parse_plain(source: &str) -> Expr {
        parse(source, BindingType::IS_PROPERTY).unwrap()
    }

    fn err(source: &str, binding_type: BindingType) -> ParseError {
        parse(source, binding_type).unwrap_err()
    }

    #[test]
    fn precedence_and_associativity() {
        let expr = parse_plain("a + b * c - d");
        let Expr::Binary { op, left, right } = &expr else {
            panic!("{expr:?}");
        };
        assert_eq!(*op, BinaryOp::Sub);
        assert!(matches!(&**right, Expr::AccessScope { name, .. } if &**name == "d"));
        let Expr::Binary { op, right, .. } = &**left else {
            panic!("{left:?}");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(&**right, Expr::Binary { op: BinaryOp::Mul, .. }));

        let expr = parse_plain("a || b && c == d < e");
        let Expr::Binary { op: BinaryOp::Or, right, .. } = &expr else {
            panic!("{expr:?}");
        };
        assert!(matches!(&**right, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        let expr = parse_plain("!a && -b");
        let Expr::Binary { left, right, .. } = &expr else {
            panic!("{expr:?}");
        };
        assert!(matches!(&**left, Expr::Unary { op: UnaryOp::Not, .. }));
        assert!(matches!(&**right, Expr::Unary { op: UnaryOp::Neg, .. }));
        assert!(matches!(
            parse_plain("typeof a === 'string'"),
            Expr::Binary { op: BinaryOp::StrictEq, .. }
        ));
    }

    #[test]
    fn member_call_and_keyed_chains() {
        let expr = parse_plain("a.b(c)[d].e()");
        let Expr::CallMember { object, name, args } = &expr else {
            panic!("{expr:?}");
        };
        assert_eq!(&**name, "e");
        assert!(args.is_empty());
        assert_eq!(object.kind(), ExprKind::AccessKeyed);
        assert!(matches!(parse_plain("f()(1)"), Expr::CallFunction { .. }));
        assert!(matches!(parse_plain("a.in"), Expr::AccessMember { .. }));
    }

    #[test]
    fn ancestors() {
        assert!(matches!(parse_plain("$this"), Expr::AccessThis { ancestor: 0 }));
        assert!(matches!(parse_plain("$parent"), Expr::AccessThis { ancestor: 1 }));
        assert!(matches!(
            parse_plain("$parent.$parent.name"),
            Expr::AccessScope { ancestor: 2, .. }
        ));
        assert!(matches!(
            parse_plain("$parent.go(1)"),
            Expr::CallScope { ancestor: 1, .. }
        ));
        let expr = parse_plain("$this.name");
        let Expr::AccessMember { object, .. } = &expr else {
            panic!("{expr:?}");
        };
        assert!(matches!(&**object, Expr::AccessThis { ancestor: 0 }));
    }

    #[test]
    fn conditional_and_assignment() {
        assert!(matches!(parse_plain("a ? b : c"), Expr::Conditional { .. }));
        let expr = parse_plain("a = b = 1");
        let Expr::Assign { value, .. } = &expr else {
            panic!("{expr:?}");
        };
        assert_eq!(value.kind(), ExprKind::Assign);
        let e = err("a + b = 1", BindingType::IS_PROPERTY);
        assert_eq!(e.kind, ParseErrorKind::InvalidAssignmentTarget);
        assert_eq!(e.position, 0);
        let e = err("f() = 1", BindingType::IS_PROPERTY);
        assert_eq!(e.kind, ParseErrorKind::InvalidAssignmentTarget);
    }

    #[test]
    fn literals() {
        let expr = parse_plain("[1, , 'x', {a: 1, b, 'c d': 2, 3: null}]");
        let Expr::ArrayLiteral { elements } = &expr else {
            panic!("{expr:?}");
        };
        assert_eq!(elements.len(), 4);
        assert!(matches!(&elements[1], Expr::Literal(Value::Undefined)));
        let Expr::ObjectLiteral { keys, values } = &elements[3] else {
            panic!("{:?}", elements[3]);
        };
        let keys: Vec<&str> = keys.iter().map(|k| &**k).collect();
        assert_eq!(keys, ["a", "b", "c d", "3"]);
        assert_eq!(values[1].kind(), ExprKind::AccessScope);
    }

    #[test]
    fn converters_then_behaviors() {
        let expr = parse_plain("a | upper | take:2:b & debounce:100");
        let Expr::BindingBehavior { expression, name, args } = &expr else {
            panic!("{expr:?}");
        };
        assert_eq!(&**name, "debounce");
        assert_eq!(args.len(), 1);
        let Expr::ValueConverter { name, args, .. } = &**expression else {
            panic!("{expression:?}");
        };
        assert_eq!(&**name, "take");
        assert_eq!(args.len(), 2);

        let e = err("a & b | c", BindingType::IS_PROPERTY);
        assert_eq!(e.kind, ParseErrorKind::UnexpectedToken("|".into()));
    }

    #[test]
    fn templates() {
        let expr = parse_plain("`a${b}c${`d${e}`}`");
        let Expr::Template { cooked, expressions } = &expr else {
            panic!("{expr:?}");
        };
        let cooked: Vec<&str> = cooked.iter().map(|c| &**c).collect();
        assert_eq!(cooked, ["a", "c", ""]);
        assert_eq!(expressions[1].kind(), ExprKind::Template);

        assert!(matches!(parse_plain("tag`x${1}`"), Expr::TaggedTemplate { .. }));
        let e = err("`abc", BindingType::IS_PROPERTY);
        assert_eq!(e.kind, ParseErrorKind::UnterminatedTemplate);
        assert_eq!(parse_plain("`\\u0041\\$`").kind(), ExprKind::Template);
    }

    #[test]
    fn interpolation() {
        let expr = parse("Hello ${first} ${last | upper}!", BindingType::INTERPOLATION).unwrap();
        let Expr::Interpolation { parts, expressions } = &expr else {
            panic!("{expr:?}");
        };
        let parts: Vec<&str> = parts.iter().map(|p| &**p).collect();
        assert_eq!(parts, ["Hello ", " ", "!"]);
        assert_eq!(expressions[1].kind(), ExprKind::ValueConverter);

        let plain = parse("no parts", BindingType::INTERPOLATION).unwrap();
        assert!(!plain.has_interpolation());
        let e = err("a ${b", BindingType::INTERPOLATION);
        assert_eq!(e.kind, ParseErrorKind::MissingExpectedToken("}"));
        let e = err("a ${}", BindingType::INTERPOLATION);
        assert_eq!(e.kind, ParseErrorKind::EmptyExpression);
    }

    #[test]
    fn for_of_declarations() {
        let expr = parse("item of items | sort", BindingType::IS_ITERATOR).unwrap();
        let (declaration, iterable) = expr.as_for_of().unwrap();
        assert_eq!(declaration.kind(), ExprKind::BindingIdentifier);
        assert_eq!(iterable.kind(), ExprKind::ValueConverter);

        let expr = parse("[key, [a, b]] of map", BindingType::IS_ITERATOR).unwrap();
        let (declaration, _) = expr.as_for_of().unwrap();
        let Expr::ArrayBindingPattern { elements } = declaration else {
            panic!("{declaration:?}");
        };
        assert_eq!(elements[1].kind(), ExprKind::ArrayBindingPattern);

        let expr = parse("{id, name: label} of rows", BindingType::IS_ITERATOR).unwrap();
        let (declaration, _) = expr.as_for_of().unwrap();
        assert_eq!(declaration.kind(), ExprKind::ObjectBindingPattern);

        let e = err("item in items", BindingType::IS_ITERATOR);
        assert_eq!(e.kind, ParseErrorKind::MissingExpectedToken("of"));
        let e = err("1 of items", BindingType::IS_ITERATOR);
        assert_eq!(e.kind, ParseErrorKind::InvalidForDeclaration);
    }

    #[test]
    fn empty_source_policy() {
        assert!(matches!(
            parse("  ", BindingType::IS_PROPERTY),
            Ok(Expr::Literal(Value::String(s))) if s.is_empty()
        ));
        assert!(matches!(parse("", BindingType::empty()), Ok(Expr::Literal(_))));
        for binding_type in [
            BindingType::IS_FUNCTION,
            BindingType::IS_EVENT,
            BindingType::IS_ITERATOR,
        ] {
            assert_eq!(err("", binding_type).kind, ParseErrorKind::EmptyExpression);
        }
    }

    #[test]
    fn errors_report_offending_position() {
        let e = err("a b", BindingType::IS_PROPERTY);
        assert_eq!(e.kind, ParseErrorKind::UnconsumedToken("b".into()));
        assert_eq!(e.position, 2);
        let e = err("(a", BindingType::IS_PROPERTY);
        assert_eq!(e.kind, ParseErrorKind::MissingExpectedToken(")"));
        let e = err("a +", BindingType::IS_PROPERTY);
        assert_eq!(e.kind, ParseErrorKind::UnexpectedEnd);
        let e = err("a.", BindingType::IS_PROPERTY);
        assert_eq!(e.kind, ParseErrorKind::ExpectedIdentifier);
        let e = err("f(a b)", BindingType::IS_PROPERTY);
        assert_eq!(e.kind, ParseErrorKind::MissingExpectedToken(")"));
        assert_eq!(e.position, 4);
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let source = format!("{}a{}", "(".repeat(500), ")".repeat(500));
        assert_eq!(
            err(&source, BindingType::IS_PROPERTY).kind,
            ParseErrorKind::NestingTooDeep
        );
        let source = "!".repeat(500) + "a";
        assert_eq!(
            err(&source, BindingType::IS_PROPERTY).kind,
            ParseErrorKind::NestingTooDeep
        );
    }

    #[test]
    fn binding_type_from_command() {
        assert_eq!(BindingType::from_command("two-way"), BindingType::IS_PROPERTY);
        assert_eq!(BindingType::from_command("delegate"), BindingType::IS_EVENT);
        assert_eq!(BindingType::from_command("for"), BindingType::IS_ITERATOR);
    }
}
