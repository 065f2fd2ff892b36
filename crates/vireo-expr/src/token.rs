#![forbid(unsafe_code)]

//! Bit-packed tokens.
//!
//! A [`Token`] is one `u32`:
//!
//! ```text
//!  31            11 10      7 6       0
//! +----------------+---------+---------+
//! |  class bits    | tier    | index   |
//! +----------------+---------+---------+
//! ```
//!
//! `index` identifies the token (and its source text via [`Token::text`]),
//! `tier` is the binary precedence tier of operators, and the class bits let
//! the parser test whole token categories with one mask.

use std::fmt;

/// Binary precedence tiers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Precedence {
    Variadic = 0,
    Assign = 1,
    Conditional = 2,
    Or = 3,
    And = 4,
    Equality = 5,
    Relational = 6,
    Additive = 7,
    Multiplicative = 8,
    LeftHandSide = 9,
    Primary = 10,
}

impl Precedence {
    const fn from_bits(bits: u32) -> Self {
        match bits {
            1 => Self::Assign,
            2 => Self::Conditional,
            3 => Self::Or,
            4 => Self::And,
            5 => Self::Equality,
            6 => Self::Relational,
            7 => Self::Additive,
            8 => Self::Multiplicative,
            9 => Self::LeftHandSide,
            10 => Self::Primary,
            _ => Self::Variadic,
        }
    }

    /// The next tighter tier.
    #[must_use]
    pub const fn next(self) -> Self {
        Self::from_bits(self as u32 + 1)
    }
}

const INDEX_MASK: u32 = 0x7F;
const TIER_SHIFT: u32 = 7;
const TIER_MASK: u32 = 0xF << TIER_SHIFT;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u32);

impl Token {
    // Class bits.
    pub const EOF_BIT: u32 = 1 << 11;
    pub const EXPRESSION_TERMINAL: u32 = 1 << 12;
    pub const CLOSE_TERMINAL: u32 = 1 << 13;
    pub const ACCESS_SCOPE_TERMINAL: u32 = 1 << 14;
    pub const IS_BINARY: u32 = 1 << 15;
    pub const IS_UNARY: u32 = 1 << 16;
    pub const IS_ASSIGN: u32 = 1 << 17;
    pub const IS_LEFT_HAND_SIDE: u32 = 1 << 18;
    pub const IS_MEMBER_OR_CALL: u32 = 1 << 19;
    pub const STRING_OR_NUMERIC_LITERAL: u32 = 1 << 20;
    pub const KEYWORD: u32 = 1 << 21;
    pub const IDENTIFIER_BIT: u32 = 1 << 22;

    const fn new(index: u32, tier: Precedence, classes: u32) -> Self {
        Self(index | ((tier as u32) << TIER_SHIFT) | classes)
    }

    const fn binary(index: u32, tier: Precedence, extra: u32) -> Self {
        Self::new(
            index,
            tier,
            Self::IS_BINARY | Self::ACCESS_SCOPE_TERMINAL | extra,
        )
    }

    const TERMINAL: u32 = Self::EXPRESSION_TERMINAL | Self::ACCESS_SCOPE_TERMINAL;
    const CLOSE: u32 = Self::TERMINAL | Self::CLOSE_TERMINAL;

    pub const EOF: Self = Self::new(0, Precedence::Variadic, Self::EOF_BIT | Self::CLOSE);
    pub const IDENTIFIER: Self = Self::new(
        1,
        Precedence::Variadic,
        Self::IDENTIFIER_BIT | Self::IS_LEFT_HAND_SIDE,
    );
    pub const STRING: Self = Self::new(2, Precedence::Variadic, Self::STRING_OR_NUMERIC_LITERAL);
    pub const NUMBER: Self = Self::new(3, Precedence::Variadic, Self::STRING_OR_NUMERIC_LITERAL);
    pub const BACKTICK: Self = Self::new(4, Precedence::Variadic, Self::IS_MEMBER_OR_CALL);

    pub const TRUE: Self = Self::new(5, Precedence::Variadic, Self::KEYWORD);
    pub const FALSE: Self = Self::new(6, Precedence::Variadic, Self::KEYWORD);
    pub const NULL: Self = Self::new(7, Precedence::Variadic, Self::KEYWORD);
    pub const UNDEFINED: Self = Self::new(8, Precedence::Variadic, Self::KEYWORD);
    pub const THIS_SCOPE: Self = Self::new(9, Precedence::Variadic, Self::KEYWORD);
    pub const PARENT_SCOPE: Self = Self::new(10, Precedence::Variadic, Self::KEYWORD);
    pub const IN: Self = Self::binary(11, Precedence::Relational, Self::KEYWORD);
    pub const INSTANCE_OF: Self = Self::binary(12, Precedence::Relational, Self::KEYWORD);
    pub const TYPE_OF: Self = Self::new(13, Precedence::Variadic, Self::KEYWORD | Self::IS_UNARY);
    pub const VOID: Self = Self::new(14, Precedence::Variadic, Self::KEYWORD | Self::IS_UNARY);
    pub const OF: Self = Self::new(15, Precedence::Variadic, Self::KEYWORD);

    pub const OPEN_PAREN: Self = Self::new(16, Precedence::Variadic, Self::IS_MEMBER_OR_CALL);
    pub const CLOSE_PAREN: Self = Self::new(17, Precedence::Variadic, Self::CLOSE);
    pub const OPEN_BRACKET: Self = Self::new(18, Precedence::Variadic, Self::IS_MEMBER_OR_CALL);
    pub const CLOSE_BRACKET: Self = Self::new(19, Precedence::Variadic, Self::CLOSE);
    pub const OPEN_BRACE: Self = Self::new(20, Precedence::Variadic, 0);
    pub const CLOSE_BRACE: Self = Self::new(21, Precedence::Variadic, Self::CLOSE);
    pub const DOT: Self = Self::new(22, Precedence::Variadic, Self::IS_MEMBER_OR_CALL);
    pub const COMMA: Self = Self::new(23, Precedence::Variadic, Self::CLOSE);
    pub const SEMICOLON: Self = Self::new(24, Precedence::Variadic, Self::TERMINAL);
    pub const COLON: Self = Self::new(25, Precedence::Variadic, Self::CLOSE);
    pub const QUESTION: Self = Self::new(26, Precedence::Variadic, Self::ACCESS_SCOPE_TERMINAL);
    pub const EQUALS: Self = Self::new(27, Precedence::Variadic, Self::IS_ASSIGN);
    pub const BAR: Self = Self::new(28, Precedence::Variadic, Self::TERMINAL);
    pub const AMPERSAND: Self = Self::new(29, Precedence::Variadic, Self::TERMINAL);

    pub const BANG: Self = Self::new(30, Precedence::Variadic, Self::IS_UNARY);
    pub const BAR_BAR: Self = Self::binary(31, Precedence::Or, 0);
    pub const AMPERSAND_AMPERSAND: Self = Self::binary(32, Precedence::And, 0);
    pub const EQUALS_EQUALS: Self = Self::binary(33, Precedence::Equality, 0);
    pub const BANG_EQUALS: Self = Self::binary(34, Precedence::Equality, 0);
    pub const EQUALS_EQUALS_EQUALS: Self = Self::binary(35, Precedence::Equality, 0);
    pub const BANG_EQUALS_EQUALS: Self = Self::binary(36, Precedence::Equality, 0);
    pub const LESS_THAN: Self = Self::binary(37, Precedence::Relational, 0);
    pub const GREATER_THAN: Self = Self::binary(38, Precedence::Relational, 0);
    pub const LESS_THAN_EQUALS: Self = Self::binary(39, Precedence::Relational, 0);
    pub const GREATER_THAN_EQUALS: Self = Self::binary(40, Precedence::Relational, 0);
    pub const PLUS: Self = Self::binary(41, Precedence::Additive, Self::IS_UNARY);
    pub const MINUS: Self = Self::binary(42, Precedence::Additive, Self::IS_UNARY);
    pub const ASTERISK: Self = Self::binary(43, Precedence::Multiplicative, 0);
    pub const SLASH: Self = Self::binary(44, Precedence::Multiplicative, 0);
    pub const PERCENT: Self = Self::binary(45, Precedence::Multiplicative, 0);

    /// Source text of each token, by index.
    const TEXT: [&'static str; 46] = [
        "<end>", "<identifier>", "<string>", "<number>", "`", "true", "false", "null",
        "undefined", "$this", "$parent", "in", "instanceof", "typeof", "void", "of", "(", ")",
        "[", "]", "{", "}", ".", ",", ";", ":", "?", "=", "|", "&", "!", "||", "&&", "==", "!=",
        "===", "!==", "<", ">", "<=", ">=", "+", "-", "*", "/", "%",
    ];

    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    #[inline]
    #[must_use]
    pub const fn precedence(self) -> Precedence {
        Precedence::from_bits((self.0 & TIER_MASK) >> TIER_SHIFT)
    }

    /// Whether any of `classes` is set.
    #[inline]
    #[must_use]
    pub const fn is(self, classes: u32) -> bool {
        self.0 & classes != 0
    }

    #[must_use]
    pub const fn text(self) -> &'static str {
        let index = self.index() as usize;
        if index < Self::TEXT.len() {
            Self::TEXT[index]
        } else {
            "<unknown>"
        }
    }

    /// Keyword lookup for a scanned identifier.
    #[must_use]
    pub fn keyword(ident: &str) -> Option<Self> {
        Some(match ident {
            "true" => Self::TRUE,
            "false" => Self::FALSE,
            "null" => Self::NULL,
            "undefined" => Self::UNDEFINED,
            "$this" => Self::THIS_SCOPE,
            "$parent" => Self::PARENT_SCOPE,
            "in" => Self::IN,
            "instanceof" => Self::INSTANCE_OF,
            "typeof" => Self::TYPE_OF,
            "void" => Self::VOID,
            "of" => Self::OF,
            _ => return None,
        })
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?})", self.text())
    }
}
