// Mamba65 - An optimizing cross-compiler for 6502-family home computers
// Copyright (C) 2026  The Mamba65 Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Tokenization of source code.
//!
//! Newlines are significant (they terminate statements), so the lexer
//! emits explicit `Newline` tokens. Integer literals accept bases 2
//! (`0b`/`%`), 4 (`0q`), 8 (`0o`), 10 and 16 (`0x`/`$`). The primed
//! operators (`+'`, `<<'`, ...) are the decimal (BCD) family.

use crate::error::{CompileError, ErrorCode, Result, Span};

/// One token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    Number(i64),
    Str(String),

    // Punctuation
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    At,
    Hash,
    Newline,

    // Assignment operators
    Assign,
    PlusAssign,
    MinusAssign,
    TimesAssign,
    DecPlusAssign,
    DecMinusAssign,
    DecTimesAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShlAssign,
    ShrAssign,
    DecShlAssign,
    DecShrAssign,

    // Binary operators
    Plus,
    Minus,
    Times,
    DecPlus,
    DecMinus,
    DecTimes,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
    DecShl,
    DecShr,
    Shr9,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    AndAnd,
    OrOr,
    XorXor,
}

/// Parse an integer literal in any of the supported bases.
pub fn parse_number(text: &str) -> Option<i64> {
    let (digits, radix) = if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (rest, 16)
    } else if let Some(rest) = text.strip_prefix('$') {
        (rest, 16)
    } else if let Some(rest) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        (rest, 2)
    } else if let Some(rest) = text.strip_prefix('%') {
        (rest, 2)
    } else if let Some(rest) = text.strip_prefix("0q").or_else(|| text.strip_prefix("0Q")) {
        (rest, 4)
    } else if let Some(rest) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        (rest, 8)
    } else {
        (text, 10)
    };
    if digits.is_empty() {
        return None;
    }
    i64::from_str_radix(digits, radix).ok()
}

/// Format a value as a literal in the given base, with prefix.
///
/// The inverse of [`parse_number`] modulo leading zeros.
pub fn format_number(value: i64, radix: u32) -> String {
    debug_assert!(value >= 0);
    match radix {
        2 => format!("0b{value:b}"),
        4 => {
            let mut v = value as u64;
            let mut digits = Vec::new();
            loop {
                digits.push(std::char::from_digit((v % 4) as u32, 4).unwrap());
                v /= 4;
                if v == 0 {
                    break;
                }
            }
            let body: String = digits.into_iter().rev().collect();
            format!("0q{body}")
        }
        8 => format!("0o{value:o}"),
        16 => format!("${value:X}"),
        _ => format!("{value}"),
    }
}

struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    tokens: Vec<(Token, Span)>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            tokens: Vec::new(),
        }
    }

    fn push(&mut self, token: Token, start: usize, end: usize) {
        self.tokens.push((token, Span::new(start, end)));
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn offset(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(i, _)| i)
            .unwrap_or(self.source.len())
    }

    fn run(mut self) -> Result<Vec<(Token, Span)>> {
        while let Some((start, c)) = self.chars.next() {
            match c {
                ' ' | '\t' | '\r' => {}
                '\n' => {
                    // Collapse runs of newlines.
                    if !matches!(self.tokens.last(), Some((Token::Newline, _)) | None) {
                        self.push(Token::Newline, start, start + 1);
                    }
                }
                '/' if self.eat('/') => {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                '{' => self.push(Token::LBrace, start, start + 1),
                '}' => self.push(Token::RBrace, start, start + 1),
                '(' => self.push(Token::LParen, start, start + 1),
                ')' => self.push(Token::RParen, start, start + 1),
                '[' => self.push(Token::LBracket, start, start + 1),
                ']' => self.push(Token::RBracket, start, start + 1),
                ',' => self.push(Token::Comma, start, start + 1),
                ':' => self.push(Token::Colon, start, start + 1),
                '@' => self.push(Token::At, start, start + 1),
                '#' => self.push(Token::Hash, start, start + 1),
                '+' => {
                    let token = if self.eat('\'') {
                        if self.eat('=') {
                            Token::DecPlusAssign
                        } else {
                            Token::DecPlus
                        }
                    } else if self.eat('=') {
                        Token::PlusAssign
                    } else {
                        Token::Plus
                    };
                    let end = self.offset();
                    self.push(token, start, end);
                }
                '-' => {
                    let token = if self.eat('\'') {
                        if self.eat('=') {
                            Token::DecMinusAssign
                        } else {
                            Token::DecMinus
                        }
                    } else if self.eat('=') {
                        Token::MinusAssign
                    } else {
                        Token::Minus
                    };
                    let end = self.offset();
                    self.push(token, start, end);
                }
                '*' => {
                    let token = if self.eat('\'') {
                        if self.eat('=') {
                            Token::DecTimesAssign
                        } else {
                            Token::DecTimes
                        }
                    } else if self.eat('=') {
                        Token::TimesAssign
                    } else {
                        Token::Times
                    };
                    let end = self.offset();
                    self.push(token, start, end);
                }
                '&' => {
                    let token = if self.eat('&') {
                        Token::AndAnd
                    } else if self.eat('=') {
                        Token::AndAssign
                    } else {
                        Token::Amp
                    };
                    let end = self.offset();
                    self.push(token, start, end);
                }
                '|' => {
                    let token = if self.eat('|') {
                        Token::OrOr
                    } else if self.eat('=') {
                        Token::OrAssign
                    } else {
                        Token::Pipe
                    };
                    let end = self.offset();
                    self.push(token, start, end);
                }
                '^' => {
                    let token = if self.eat('^') {
                        Token::XorXor
                    } else if self.eat('=') {
                        Token::XorAssign
                    } else {
                        Token::Caret
                    };
                    let end = self.offset();
                    self.push(token, start, end);
                }
                '<' => {
                    let token = if self.eat('<') {
                        if self.eat('\'') {
                            if self.eat('=') {
                                Token::DecShlAssign
                            } else {
                                Token::DecShl
                            }
                        } else if self.eat('=') {
                            Token::ShlAssign
                        } else {
                            Token::Shl
                        }
                    } else if self.eat('=') {
                        Token::Le
                    } else {
                        Token::Lt
                    };
                    let end = self.offset();
                    self.push(token, start, end);
                }
                '>' => {
                    let token = if self.eat('>') {
                        if self.eat('>') {
                            if self.eat('>') {
                                Token::Shr9
                            } else {
                                return Err(CompileError::new(
                                    ErrorCode::InvalidCharacter,
                                    "Expected '>>>>'",
                                    Span::new(start, self.offset()),
                                ));
                            }
                        } else if self.eat('\'') {
                            if self.eat('=') {
                                Token::DecShrAssign
                            } else {
                                Token::DecShr
                            }
                        } else if self.eat('=') {
                            Token::ShrAssign
                        } else {
                            Token::Shr
                        }
                    } else if self.eat('=') {
                        Token::Ge
                    } else {
                        Token::Gt
                    };
                    let end = self.offset();
                    self.push(token, start, end);
                }
                '=' => {
                    let token = if self.eat('=') { Token::Eq } else { Token::Assign };
                    let end = self.offset();
                    self.push(token, start, end);
                }
                '!' => {
                    if self.eat('=') {
                        self.push(Token::Ne, start, start + 2);
                    } else {
                        return Err(CompileError::new(
                            ErrorCode::InvalidCharacter,
                            "Unexpected character '!'",
                            Span::new(start, start + 1),
                        ));
                    }
                }
                '"' => {
                    let mut text = String::new();
                    let mut terminated = false;
                    for (_, c) in self.chars.by_ref() {
                        if c == '"' {
                            terminated = true;
                            break;
                        }
                        text.push(c);
                    }
                    if !terminated {
                        return Err(CompileError::new(
                            ErrorCode::UnterminatedString,
                            "Unterminated string literal",
                            Span::new(start, self.source.len()),
                        ));
                    }
                    let end = self.offset();
                    self.push(Token::Str(text), start, end);
                }
                '$' | '%' => {
                    let mut text = String::from(c);
                    while let Some(&(_, d)) = self.chars.peek() {
                        if d.is_ascii_hexdigit() {
                            text.push(d);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    let end = self.offset();
                    let value = parse_number(&text).ok_or_else(|| {
                        CompileError::new(
                            ErrorCode::InvalidDigitForBase,
                            format!("Invalid integer literal '{text}'"),
                            Span::new(start, end),
                        )
                    })?;
                    self.push(Token::Number(value), start, end);
                }
                c if c.is_ascii_digit() => {
                    let mut text = String::from(c);
                    while let Some(&(_, d)) = self.chars.peek() {
                        if d.is_ascii_alphanumeric() {
                            text.push(d);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    let end = self.offset();
                    let value = parse_number(&text).ok_or_else(|| {
                        CompileError::new(
                            ErrorCode::InvalidDigitForBase,
                            format!("Invalid integer literal '{text}'"),
                            Span::new(start, end),
                        )
                    })?;
                    if value > 0xFFFF_FFFF {
                        return Err(CompileError::new(
                            ErrorCode::NumberTooLarge,
                            format!("Integer literal {value} does not fit in 32 bits"),
                            Span::new(start, end),
                        ));
                    }
                    self.push(Token::Number(value), start, end);
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut text = String::from(c);
                    while let Some(&(_, d)) = self.chars.peek() {
                        if d.is_ascii_alphanumeric() || d == '_' {
                            text.push(d);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    let end = self.offset();
                    self.push(Token::Ident(text), start, end);
                }
                other => {
                    return Err(CompileError::new(
                        ErrorCode::InvalidCharacter,
                        format!("Unexpected character '{other}'"),
                        Span::new(start, start + other.len_utf8()),
                    ));
                }
            }
        }
        if !matches!(self.tokens.last(), Some((Token::Newline, _)) | None) {
            let end = self.source.len();
            self.tokens.push((Token::Newline, Span::new(end, end)));
        }
        Ok(self.tokens)
    }
}

/// Tokenize a whole source text.
pub fn tokenize(source: &str) -> Result<Vec<(Token, Span)>> {
    Lexer::new(source).run()
}
