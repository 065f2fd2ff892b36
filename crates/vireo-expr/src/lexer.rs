#![forbid(unsafe_code)]

//! Scanner half of the parser state.
//!
//! The scanner and the parser share one mutable cursor ([`ParserState`]):
//! `index` is the next unread character, `start_index` the first character
//! of the current token, `current_char` the character at `index` (`'\0'` at
//! the end), and `current_token`/`token_value` describe the token just
//! scanned. Positions are character offsets.

use std::rc::Rc;

use vireo_core::{ParseError, ParseErrorKind};

use crate::token::Token;
use crate::unicode::{is_identifier_part, is_identifier_start};

pub(crate) type PResult<T> = std::result::Result<T, ParseError>;

/// Payload of the current token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenValue {
    None,
    /// Identifiers and keywords.
    Identifier(Rc<str>),
    String(Rc<str>),
    Number(f64),
}

pub(crate) struct ParserState<'s> {
    pub(crate) source: &'s str,
    chars: Vec<char>,
    pub(crate) index: usize,
    pub(crate) start_index: usize,
    pub(crate) current_char: char,
    pub(crate) current_token: Token,
    pub(crate) token_value: TokenValue,
    pub(crate) depth: u32,
}

impl<'s> ParserState<'s> {
    pub(crate) fn new(source: &'s str) -> Self {
        let chars: Vec<char> = source.chars().collect();
        let current_char = chars.first().copied().unwrap_or('\0');
        Self {
            source,
            chars,
            index: 0,
            start_index: 0,
            current_char,
            current_token: Token::EOF,
            token_value: TokenValue::None,
            depth: 0,
        }
    }

    pub(crate) fn error(&self, kind: ParseErrorKind) -> ParseError {
        self.error_at(kind, self.start_index)
    }

    pub(crate) fn error_at(&self, kind: ParseErrorKind, position: usize) -> ParseError {
        ParseError::new(kind, position, self.source)
    }

    /// Error for the current token being unexpected.
    pub(crate) fn unexpected(&self) -> ParseError {
        if self.current_token == Token::EOF {
            self.error(ParseErrorKind::UnexpectedEnd)
        } else {
            self.error(ParseErrorKind::UnexpectedToken(self.token_text()))
        }
    }

    /// Source text of the current token.
    pub(crate) fn token_text(&self) -> String {
        self.chars[self.start_index.min(self.chars.len())..self.index.min(self.chars.len())]
            .iter()
            .collect()
    }

    #[inline]
    fn at_end(&self) -> bool {
        self.index >= self.chars.len()
    }

    #[inline]
    fn advance(&mut self) {
        self.index += 1;
        self.current_char = self.chars.get(self.index).copied().unwrap_or('\0');
    }

    #[inline]
    fn peek(&self) -> char {
        self.chars.get(self.index + 1).copied().unwrap_or('\0')
    }

    /// Scan the next token into `current_token`/`token_value`.
    pub(crate) fn next_token(&mut self) -> PResult<()> {
        while !self.at_end() && self.current_char.is_whitespace() {
            self.advance();
        }
        self.start_index = self.index;
        self.token_value = TokenValue::None;
        if self.at_end() {
            self.current_token = Token::EOF;
            return Ok(());
        }
        let c = self.current_char;
        self.current_token = match c {
            '\'' | '"' => self.scan_string(c)?,
            '`' => {
                self.advance();
                Token::BACKTICK
            }
            '0'..='9' => self.scan_number()?,
            '.' if self.peek().is_ascii_digit() => self.scan_number()?,
            c if is_identifier_start(c) => self.scan_identifier(),
            _ => self.scan_punctuator(c)?,
        };
        Ok(())
    }

    fn scan_identifier(&mut self) -> Token {
        let start = self.index;
        self.advance();
        while !self.at_end() && is_identifier_part(self.current_char) {
            self.advance();
        }
        let name: String = self.chars[start..self.index].iter().collect();
        let token = Token::keyword(&name).unwrap_or(Token::IDENTIFIER);
        self.token_value = TokenValue::Identifier(Rc::from(name));
        token
    }

    fn scan_number(&mut self) -> PResult<Token> {
        let start = self.index;
        while self.current_char.is_ascii_digit() {
            self.advance();
        }
        if self.current_char == '.' && self.peek().is_ascii_digit() {
            self.advance();
            while self.current_char.is_ascii_digit() {
                self.advance();
            }
        }
        if matches!(self.current_char, 'e' | 'E') {
            self.advance();
            if matches!(self.current_char, '+' | '-') {
                self.advance();
            }
            if !self.current_char.is_ascii_digit() {
                return Err(self.error_at(ParseErrorKind::InvalidNumber, start));
            }
            while self.current_char.is_ascii_digit() {
                self.advance();
            }
        }
        if is_identifier_start(self.current_char) && !self.at_end() {
            return Err(self.error_at(ParseErrorKind::InvalidNumber, start));
        }
        let text: String = self.chars[start..self.index].iter().collect();
        let value = text
            .parse::<f64>()
            .map_err(|_| self.error_at(ParseErrorKind::InvalidNumber, start))?;
        self.token_value = TokenValue::Number(value);
        Ok(Token::NUMBER)
    }

    fn scan_string(&mut self, quote: char) -> PResult<Token> {
        let start = self.index;
        self.advance();
        let mut value = String::new();
        loop {
            if self.at_end() {
                return Err(self.error_at(ParseErrorKind::UnterminatedString, start));
            }
            match self.current_char {
                c if c == quote => {
                    self.advance();
                    break;
                }
                '\\' => {
                    let c = self.scan_escape(ParseErrorKind::UnterminatedString, start)?;
                    value.push(c);
                }
                c => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        self.token_value = TokenValue::String(Rc::from(value));
        Ok(Token::STRING)
    }

    /// Decode one escape sequence; `current_char` is the backslash.
    fn scan_escape(&mut self, eof: ParseErrorKind, start: usize) -> PResult<char> {
        let escape_at = self.index;
        self.advance();
        if self.at_end() {
            return Err(self.error_at(eof, start));
        }
        let c = self.current_char;
        self.advance();
        let decoded = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' => '\0',
            'x' => self.scan_hex(2, escape_at)?,
            'u' if self.current_char == '{' => {
                self.advance();
                let mut code = 0u32;
                let mut digits = 0;
                while let Some(d) = self.current_char.to_digit(16) {
                    code = code.saturating_mul(16).saturating_add(d);
                    digits += 1;
                    self.advance();
                }
                if digits == 0 || self.current_char != '}' {
                    return Err(self.error_at(ParseErrorKind::InvalidEscape, escape_at));
                }
                self.advance();
                char::from_u32(code)
                    .ok_or_else(|| self.error_at(ParseErrorKind::InvalidEscape, escape_at))?
            }
            'u' => self.scan_hex(4, escape_at)?,
            other => other,
        };
        Ok(decoded)
    }

    fn scan_hex(&mut self, count: usize, escape_at: usize) -> PResult<char> {
        let mut code = 0u32;
        for _ in 0..count {
            let digit = self
                .current_char
                .to_digit(16)
                .filter(|_| !self.at_end())
                .ok_or_else(|| self.error_at(ParseErrorKind::InvalidEscape, escape_at))?;
            code = code * 16 + digit;
            self.advance();
        }
        char::from_u32(code).ok_or_else(|| self.error_at(ParseErrorKind::InvalidEscape, escape_at))
    }

    fn scan_punctuator(&mut self, c: char) -> PResult<Token> {
        let next = self.peek();
        let (token, width) = match (c, next) {
            ('(', _) => (Token::OPEN_PAREN, 1),
            (')', _) => (Token::CLOSE_PAREN, 1),
            ('[', _) => (Token::OPEN_BRACKET, 1),
            (']', _) => (Token::CLOSE_BRACKET, 1),
            ('{', _) => (Token::OPEN_BRACE, 1),
            ('}', _) => (Token::CLOSE_BRACE, 1),
            ('.', _) => (Token::DOT, 1),
            (',', _) => (Token::COMMA, 1),
            (';', _) => (Token::SEMICOLON, 1),
            (':', _) => (Token::COLON, 1),
            ('?', _) => (Token::QUESTION, 1),
            ('+', _) => (Token::PLUS, 1),
            ('-', _) => (Token::MINUS, 1),
            ('*', _) => (Token::ASTERISK, 1),
            ('/', _) => (Token::SLASH, 1),
            ('%', _) => (Token::PERCENT, 1),
            ('|', '|') => (Token::BAR_BAR, 2),
            ('|', _) => (Token::BAR, 1),
            ('&', '&') => (Token::AMPERSAND_AMPERSAND, 2),
            ('&', _) => (Token::AMPERSAND, 1),
            ('<', '=') => (Token::LESS_THAN_EQUALS, 2),
            ('<', _) => (Token::LESS_THAN, 1),
            ('>', '=') => (Token::GREATER_THAN_EQUALS, 2),
            ('>', _) => (Token::GREATER_THAN, 1),
            ('=', '=') if self.char_at(2) == '=' => (Token::EQUALS_EQUALS_EQUALS, 3),
            ('=', '=') => (Token::EQUALS_EQUALS, 2),
            ('=', _) => (Token::EQUALS, 1),
            ('!', '=') if self.char_at(2) == '=' => (Token::BANG_EQUALS_EQUALS, 3),
            ('!', '=') => (Token::BANG_EQUALS, 2),
            ('!', _) => (Token::BANG, 1),
            (other, _) => {
                return Err(self.error(ParseErrorKind::UnexpectedCharacter(other)));
            }
        };
        for _ in 0..width {
            self.advance();
        }
        Ok(token)
    }

    fn char_at(&self, offset: usize) -> char {
        self.chars.get(self.index + offset).copied().unwrap_or('\0')
    }

    /// Scan template text starting at `index` (just after a backtick or the
    /// `}` closing an embedded expression). Returns the cooked text and
    /// whether the closing backtick was reached (`false`: stopped after
    /// `${`).
    pub(crate) fn scan_template_part(&mut self) -> PResult<(Rc<str>, bool)> {
        let start = self.index;
        let mut cooked = String::new();
        loop {
            if self.at_end() {
                return Err(self.error_at(ParseErrorKind::UnterminatedTemplate, start));
            }
            match self.current_char {
                '`' => {
                    self.advance();
                    return Ok((Rc::from(cooked), true));
                }
                '$' if self.peek() == '{' => {
                    self.advance();
                    self.advance();
                    return Ok((Rc::from(cooked), false));
                }
                '\\' => {
                    let c = self.scan_escape(ParseErrorKind::UnterminatedTemplate, start)?;
                    cooked.push(c);
                }
                c => {
                    cooked.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Scan raw interpolation text up to the next `${` (consumed) or the
    /// end. Returns the text and whether an expression follows.
    pub(crate) fn scan_interpolation_part(&mut self) -> (Rc<str>, bool) {
        let start = self.index;
        while !self.at_end() {
            if self.current_char == '$' && self.peek() == '{' {
                let text: String = self.chars[start..self.index].iter().collect();
                self.advance();
                self.advance();
                return (Rc::from(text), true);
            }
            self.advance();
        }
        let text: String = self.chars[start..].iter().collect();
        (Rc::from(text), false)
    }
}
