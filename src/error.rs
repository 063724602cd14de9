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

//! Error types for the Mamba65 compiler.
//!
//! This module defines all error types used throughout the compiler,
//! grouped by the phase that raises them: command line usage, parsing,
//! name resolution and typing, code generation, linking, and platform
//! configuration.

use std::ops::Range;
use thiserror::Error;

/// A source span representing a range in the source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// A zero-width span for diagnostics without a source position.
    pub fn none() -> Self {
        Self { start: 0, end: 0 }
    }

    /// Get the length of this span.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if the span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Merge two spans into one that covers both.
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// Error codes for the compiler.
///
/// Codes are grouped by compilation phase so that a diagnostic's origin
/// is readable from its number alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Usage errors (E001-E019)
    InvalidFlag,
    FlagRequiresHigherOptLevel,
    ConflictingFlags,
    InvalidDefine,

    // Lexical errors (E020-E049)
    InvalidCharacter,
    InvalidDigitForBase,
    NumberTooLarge,
    UnterminatedString,
    UnknownTextEncoding,
    UnencodableCharacter,

    // Syntax errors (E100-E149)
    UnexpectedToken,
    UnexpectedEndOfFile,
    ExpectedExpression,
    ExpectedStatement,
    ExpectedIdentifier,
    ExpectedType,
    InvalidAssignmentTarget,
    ExpectedForDirection,
    BreakOutsideLoop,
    ContinueOutsideLoop,
    UnknownLoopLabel,

    // Name resolution and type errors (E200-E249)
    UndefinedSymbol,
    SymbolAlreadyDefined,
    TypeMismatch,
    CannotAssignToConstant,
    WrongNumberOfArguments,
    ConstantExpressionRequired,
    ConstantValueOutOfRange,
    ConflictingModifiers,
    ArraySizeMustBePositive,

    // Code generation errors (E300-E349)
    AddressingModeUnavailable,
    ExpressionTooComplex,
    InvalidInlineAssembly,
    DecimalModeUnavailable,

    // Link errors (E400-E449)
    BankOverflow,
    UndefinedLabel,
    BranchOutOfRange,
    IllegalOpcodeModeCombination,
    NoEntryPoint,

    // Platform errors (E500-E549)
    PlatformNotFound,
    InvalidPlatformDefinition,
    UnknownCpuArchitecture,
    InvalidBankDefinition,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            // Usage errors
            ErrorCode::InvalidFlag => "E001",
            ErrorCode::FlagRequiresHigherOptLevel => "E002",
            ErrorCode::ConflictingFlags => "E003",
            ErrorCode::InvalidDefine => "E004",

            // Lexical errors
            ErrorCode::InvalidCharacter => "E020",
            ErrorCode::InvalidDigitForBase => "E021",
            ErrorCode::NumberTooLarge => "E022",
            ErrorCode::UnterminatedString => "E023",
            ErrorCode::UnknownTextEncoding => "E024",
            ErrorCode::UnencodableCharacter => "E025",

            // Syntax errors
            ErrorCode::UnexpectedToken => "E100",
            ErrorCode::UnexpectedEndOfFile => "E101",
            ErrorCode::ExpectedExpression => "E102",
            ErrorCode::ExpectedStatement => "E103",
            ErrorCode::ExpectedIdentifier => "E104",
            ErrorCode::ExpectedType => "E105",
            ErrorCode::InvalidAssignmentTarget => "E106",
            ErrorCode::ExpectedForDirection => "E107",
            ErrorCode::BreakOutsideLoop => "E110",
            ErrorCode::ContinueOutsideLoop => "E111",
            ErrorCode::UnknownLoopLabel => "E112",

            // Name resolution and type errors
            ErrorCode::UndefinedSymbol => "E200",
            ErrorCode::SymbolAlreadyDefined => "E201",
            ErrorCode::TypeMismatch => "E210",
            ErrorCode::CannotAssignToConstant => "E211",
            ErrorCode::WrongNumberOfArguments => "E212",
            ErrorCode::ConstantExpressionRequired => "E220",
            ErrorCode::ConstantValueOutOfRange => "E221",
            ErrorCode::ConflictingModifiers => "E230",
            ErrorCode::ArraySizeMustBePositive => "E231",

            // Code generation errors
            ErrorCode::AddressingModeUnavailable => "E300",
            ErrorCode::ExpressionTooComplex => "E301",
            ErrorCode::InvalidInlineAssembly => "E302",
            ErrorCode::DecimalModeUnavailable => "E303",

            // Link errors
            ErrorCode::BankOverflow => "E400",
            ErrorCode::UndefinedLabel => "E401",
            ErrorCode::BranchOutOfRange => "E402",
            ErrorCode::IllegalOpcodeModeCombination => "E403",
            ErrorCode::NoEntryPoint => "E404",

            // Platform errors
            ErrorCode::PlatformNotFound => "E500",
            ErrorCode::InvalidPlatformDefinition => "E501",
            ErrorCode::UnknownCpuArchitecture => "E502",
            ErrorCode::InvalidBankDefinition => "E503",
        }
    }
}

/// A compiler error with source location.
#[derive(Debug, Clone, Error)]
#[error("[{code}] {message}")]
pub struct CompileError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// The source span where the error occurred.
    pub span: Span,
    /// Optional hint for fixing the error.
    pub hint: Option<String>,
}

impl CompileError {
    /// Create a new compile error.
    pub fn new(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            message: message.into(),
            span,
            hint: None,
        }
    }

    /// Add a hint to this error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Get the error code string.
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }
}

/// Result type for compiler operations.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Source location with line and column information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number (1-indexed).
    pub column: usize,
    /// The content of the line.
    pub line_content: String,
}

impl SourceLocation {
    /// Calculate line and column from a byte offset in source code.
    pub fn from_offset(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source[..offset];

        let line = before.chars().filter(|&c| c == '\n').count() + 1;

        let last_newline = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[last_newline..].chars().count() + 1;

        let line_start = last_newline;
        let line_end = source[offset..]
            .find('\n')
            .map(|i| offset + i)
            .unwrap_or(source.len());
        let line_content = source[line_start..line_end].to_string();

        Self {
            line,
            column,
            line_content,
        }
    }
}

/// Format an error with source context.
pub fn format_error(error: &CompileError, source: &str, filename: Option<&str>) -> String {
    let loc = SourceLocation::from_offset(source, error.span.start);
    let filename = filename.unwrap_or("<input>");

    let mut output = String::new();

    // Error header
    output.push_str(&format!("error[{}]: {}\n", error.code_str(), error.message));

    // Location
    output.push_str(&format!("  --> {}:{}:{}\n", filename, loc.line, loc.column));

    // Source context
    let line_num_width = loc.line.to_string().len();
    output.push_str(&format!("{:>width$} |\n", "", width = line_num_width));
    output.push_str(&format!(
        "{:>width$} | {}\n",
        loc.line,
        loc.line_content,
        width = line_num_width
    ));

    // Underline the error span
    let underline_start = (loc.column - 1).min(loc.line_content.len());
    let underline_len = (error.span.end - error.span.start)
        .max(1)
        .min((loc.line_content.len() - underline_start).max(1));
    output.push_str(&format!(
        "{:>width$} | {:>start$}{}\n",
        "",
        "",
        "^".repeat(underline_len),
        width = line_num_width,
        start = underline_start
    ));

    // Hint if available
    if let Some(hint) = &error.hint {
        output.push_str(&format!(
            "{:>width$} = hint: {}\n",
            "",
            hint,
            width = line_num_width
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_creation() {
        let span = Span::new(10, 20);
        assert_eq!(span.start, 10);
        assert_eq!(span.end, 20);
        assert_eq!(span.len(), 10);
        assert!(!span.is_empty());
    }

    #[test]
    fn test_span_merge() {
        let span1 = Span::new(5, 10);
        let span2 = Span::new(15, 20);
        let merged = span1.merge(&span2);
        assert_eq!(merged.start, 5);
        assert_eq!(merged.end, 20);
    }

    #[test]
    fn test_error_code_groups() {
        assert_eq!(ErrorCode::InvalidFlag.code(), "E001");
        assert_eq!(ErrorCode::UnexpectedToken.code(), "E100");
        assert_eq!(ErrorCode::UndefinedSymbol.code(), "E200");
        assert_eq!(ErrorCode::AddressingModeUnavailable.code(), "E300");
        assert_eq!(ErrorCode::BankOverflow.code(), "E400");
        assert_eq!(ErrorCode::PlatformNotFound.code(), "E500");
    }

    #[test]
    fn test_compile_error() {
        let error = CompileError::new(
            ErrorCode::UndefinedSymbol,
            "Undefined symbol 'foo'",
            Span::new(0, 3),
        )
        .with_hint("Did you mean 'bar'?");

        assert_eq!(error.code_str(), "E200");
        assert!(error.hint.is_some());
    }

    #[test]
    fn test_format_error_contains_location() {
        let source = "byte a\na = x\n";
        let off = source.rfind('x').unwrap();
        let error = CompileError::new(
            ErrorCode::UndefinedSymbol,
            "Undefined symbol 'x'",
            Span::new(off, off + 1),
        );
        let rendered = format_error(&error, source, Some("test.mb65"));
        assert!(rendered.contains("test.mb65:2:5"));
        assert!(rendered.contains("E200"));
    }
}
