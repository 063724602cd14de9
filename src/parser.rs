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

//! Parsing tokens into an AST.
//!
//! Operator precedence, low to high: `|| ^^`, `&&`, comparisons, the
//! byte-join `:`, additive/bitwise (one level, parenthesize to mix),
//! multiplicative, unary. Statements are newline-terminated; blocks are
//! brace-delimited.

use crate::asm::{AddrMode, AssemblyLine, Opcode};
use crate::ast::*;
use crate::constant::Constant;
use crate::error::{CompileError, ErrorCode, Result, Span};
use crate::lexer::Token;

struct Parser<'a> {
    tokens: &'a [(Token, Span)],
    pos: usize,
}

/// Parse a token stream into a program.
pub fn parse(tokens: &[(Token, Span)]) -> Result<Program> {
    Parser { tokens, pos: 0 }.program()
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|&(_, s)| s)
            .unwrap_or_else(|| {
                self.tokens
                    .last()
                    .map(|&(_, s)| s)
                    .unwrap_or_else(Span::none)
            })
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(CompileError::new(
                ErrorCode::UnexpectedToken,
                format!("Expected {what}"),
                self.span(),
            ))
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    fn ident(&mut self, what: &str) -> Result<String> {
        let span = self.span();
        match self.next() {
            Some(Token::Ident(name)) => Ok(name.clone()),
            _ => Err(CompileError::new(
                ErrorCode::ExpectedIdentifier,
                format!("Expected {what}"),
                span,
            )),
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn program(&mut self) -> Result<Program> {
        let mut declarations = Vec::new();
        self.skip_newlines();
        while self.peek().is_some() {
            declarations.push(self.declaration()?);
            self.skip_newlines();
        }
        Ok(Program { declarations })
    }

    fn declaration(&mut self) -> Result<Declaration> {
        let span = self.span();
        match self.peek() {
            Some(Token::Ident(name)) => match name.as_str() {
                "array" => self.array_decl().map(Declaration::Array),
                "const" => self.const_decl().map(Declaration::Const),
                _ => {
                    let mut flags = FunctionFlags::default();
                    let mut save = self.pos;
                    while let Some(Token::Ident(word)) = self.peek() {
                        let recognized = match word.as_str() {
                            "asm" => {
                                flags.asm = true;
                                true
                            }
                            "inline" => {
                                flags.inline = true;
                                true
                            }
                            "noinline" => {
                                flags.noinline = true;
                                true
                            }
                            "interrupt" => {
                                flags.interrupt = true;
                                true
                            }
                            "kernal_interrupt" => {
                                flags.kernal_interrupt = true;
                                true
                            }
                            "macro" => {
                                flags.macro_ = true;
                                true
                            }
                            "reentrant" => {
                                flags.reentrant = true;
                                true
                            }
                            _ => false,
                        };
                        if !recognized {
                            break;
                        }
                        self.pos += 1;
                        save = self.pos;
                    }
                    self.pos = save;
                    if let Some(conflict) = flags.conflict() {
                        return Err(CompileError::new(
                            ErrorCode::ConflictingModifiers,
                            conflict,
                            span,
                        ));
                    }

                    let ty = self.type_name()?;
                    let name = self.ident("a name")?;
                    if self.peek() == Some(&Token::LParen) {
                        self.function(ty, name, flags, span).map(Declaration::Function)
                    } else {
                        self.var_decl_tail(ty, name, span).map(Declaration::Variable)
                    }
                }
            },
            _ => Err(CompileError::new(
                ErrorCode::ExpectedStatement,
                "Expected a declaration",
                span,
            )),
        }
    }

    fn type_name(&mut self) -> Result<Type> {
        let span = self.span();
        let name = self.ident("a type name")?;
        Type::from_name(&name).ok_or_else(|| {
            CompileError::new(ErrorCode::ExpectedType, format!("Unknown type '{name}'"), span)
        })
    }

    fn var_decl_tail(&mut self, ty: Type, name: String, span: Span) -> Result<VarDecl> {
        let address = if self.eat(&Token::At) {
            Some(self.expression()?)
        } else {
            None
        };
        let initializer = if self.eat(&Token::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(VarDecl {
            name,
            ty,
            address,
            initializer,
            span,
        })
    }

    fn array_decl(&mut self) -> Result<ArrayDecl> {
        let span = self.span();
        self.pos += 1; // array
        let name = self.ident("an array name")?;
        self.expect(&Token::LBracket, "'['")?;
        let length = self.expression()?;
        self.expect(&Token::RBracket, "']'")?;
        let address = if self.eat(&Token::At) {
            Some(self.expression()?)
        } else {
            None
        };
        let contents = if self.eat(&Token::Assign) {
            match self.peek() {
                Some(Token::Str(_)) => {
                    let Some(Token::Str(text)) = self.next().cloned() else {
                        unreachable!()
                    };
                    let encoding = match self.peek() {
                        Some(Token::Ident(suffix)) => {
                            let suffix = suffix.clone();
                            let enc_span = self.span();
                            self.pos += 1;
                            TextEncoding::from_suffix(&suffix).ok_or_else(|| {
                                CompileError::new(
                                    ErrorCode::UnknownTextEncoding,
                                    format!("Unknown text encoding '{suffix}'"),
                                    enc_span,
                                )
                            })?
                        }
                        _ => TextEncoding::default(),
                    };
                    ArrayContents::Text(text, encoding)
                }
                _ => {
                    self.expect(&Token::LBracket, "'['")?;
                    let mut elements = vec![self.expression()?];
                    while self.eat(&Token::Comma) {
                        elements.push(self.expression()?);
                    }
                    self.expect(&Token::RBracket, "']'")?;
                    ArrayContents::Literal(elements)
                }
            }
        } else {
            ArrayContents::Blank
        };
        Ok(ArrayDecl {
            name,
            length,
            address,
            contents,
            span,
        })
    }

    fn const_decl(&mut self) -> Result<ConstDecl> {
        let span = self.span();
        self.pos += 1; // const
        let ty = self.type_name()?;
        let name = self.ident("a constant name")?;
        self.expect(&Token::Assign, "'='")?;
        let value = self.expression()?;
        Ok(ConstDecl {
            name,
            ty,
            value,
            span,
        })
    }

    fn function(
        &mut self,
        return_type: Type,
        name: String,
        flags: FunctionFlags,
        span: Span,
    ) -> Result<FunctionDef> {
        self.expect(&Token::LParen, "'('")?;
        let mut params = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                let ty = self.type_name()?;
                let pname = self.ident("a parameter name")?;
                let convention = if flags.asm {
                    match RegisterPair::from_name(&pname) {
                        Some(pair) => ParamPassingConvention::ByRegister(pair),
                        None => ParamPassingConvention::ByVariable,
                    }
                } else {
                    ParamPassingConvention::ByVariable
                };
                params.push(Param {
                    name: pname,
                    ty,
                    convention,
                });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "')'")?;

        if flags.asm {
            let asm_body = self.asm_block()?;
            Ok(FunctionDef {
                name,
                return_type,
                params,
                flags,
                body: Vec::new(),
                asm_body: Some(asm_body),
                span,
            })
        } else {
            let body = self.block()?;
            Ok(FunctionDef {
                name,
                return_type,
                params,
                flags,
                body,
                asm_body: None,
                span,
            })
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn block(&mut self) -> Result<Vec<Statement>> {
        self.expect(&Token::LBrace, "'{'")?;
        let mut statements = Vec::new();
        self.skip_newlines();
        while self.peek() != Some(&Token::RBrace) {
            if self.peek().is_none() {
                return Err(CompileError::new(
                    ErrorCode::UnexpectedEndOfFile,
                    "Unterminated block",
                    self.span(),
                ));
            }
            statements.push(self.statement()?);
            self.skip_newlines();
        }
        self.expect(&Token::RBrace, "'}'")?;
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Statement> {
        let span = self.span();

        // Loop labels: `name: while ...`
        let label = if let (Some(Token::Ident(name)), Some(Token::Colon), Some(Token::Ident(kw))) =
            (self.peek(), self.peek_at(1), self.peek_at(2))
        {
            if matches!(kw.as_str(), "while" | "do" | "for") {
                let name = name.clone();
                self.pos += 2;
                Some(name)
            } else {
                None
            }
        } else {
            None
        };

        let kind = match self.peek() {
            Some(Token::Ident(word)) => match word.as_str() {
                "if" => self.if_statement()?,
                "while" => self.while_statement(label)?,
                "do" => self.do_while_statement(label)?,
                "for" => self.for_statement(label)?,
                "break" => {
                    self.pos += 1;
                    let target = match self.peek() {
                        Some(Token::Ident(name)) => {
                            let name = name.clone();
                            self.pos += 1;
                            Some(name)
                        }
                        _ => None,
                    };
                    StatementKind::Break(target)
                }
                "continue" => {
                    self.pos += 1;
                    let target = match self.peek() {
                        Some(Token::Ident(name)) => {
                            let name = name.clone();
                            self.pos += 1;
                            Some(name)
                        }
                        _ => None,
                    };
                    StatementKind::Continue(target)
                }
                "return" => {
                    self.pos += 1;
                    let value = if matches!(self.peek(), Some(Token::Newline) | Some(Token::RBrace)) {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    StatementKind::Return(value)
                }
                name if Type::from_name(name).is_some()
                    && matches!(self.peek_at(1), Some(Token::Ident(_))) =>
                {
                    let ty = self.type_name()?;
                    let vname = self.ident("a variable name")?;
                    StatementKind::LocalVariable(self.var_decl_tail(ty, vname, span)?)
                }
                _ => self.assignment_or_expression()?,
            },
            _ => {
                return Err(CompileError::new(
                    ErrorCode::ExpectedStatement,
                    "Expected a statement",
                    span,
                ))
            }
        };
        Ok(Statement::new(kind, span))
    }

    fn if_statement(&mut self) -> Result<StatementKind> {
        self.pos += 1; // if
        let condition = self.expression()?;
        let then_branch = self.block()?;
        let else_branch = if let Some(Token::Ident(word)) = self.peek() {
            if word == "else" {
                self.pos += 1;
                if let Some(Token::Ident(next)) = self.peek() {
                    if next == "if" {
                        let span = self.span();
                        let nested = self.if_statement()?;
                        vec![Statement::new(nested, span)]
                    } else {
                        self.block()?
                    }
                } else {
                    self.block()?
                }
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };
        Ok(StatementKind::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self, label: Option<String>) -> Result<StatementKind> {
        self.pos += 1; // while
        let condition = self.expression()?;
        let body = self.block()?;
        Ok(StatementKind::While {
            label,
            condition,
            body,
        })
    }

    fn do_while_statement(&mut self, label: Option<String>) -> Result<StatementKind> {
        self.pos += 1; // do
        let body = self.block()?;
        self.skip_newlines();
        let span = self.span();
        match self.next() {
            Some(Token::Ident(word)) if word == "while" => {}
            _ => {
                return Err(CompileError::new(
                    ErrorCode::UnexpectedToken,
                    "Expected 'while' after do-block",
                    span,
                ))
            }
        }
        let condition = self.expression()?;
        Ok(StatementKind::DoWhile {
            label,
            body,
            condition,
        })
    }

    fn for_statement(&mut self, label: Option<String>) -> Result<StatementKind> {
        self.pos += 1; // for
        let variable = self.ident("a loop variable")?;
        self.expect(&Token::Comma, "','")?;
        let start = self.expression()?;
        self.expect(&Token::Comma, "','")?;
        let dir_span = self.span();
        let direction = match self.next() {
            Some(Token::Ident(word)) => match word.as_str() {
                "to" => ForDirection::To,
                "until" => ForDirection::Until,
                "downto" => ForDirection::DownTo,
                "parallelto" => ForDirection::ParallelTo,
                "paralleluntil" => ForDirection::ParallelUntil,
                _ => {
                    return Err(CompileError::new(
                        ErrorCode::ExpectedForDirection,
                        "Expected to, until, downto, parallelto or paralleluntil",
                        dir_span,
                    ))
                }
            },
            _ => {
                return Err(CompileError::new(
                    ErrorCode::ExpectedForDirection,
                    "Expected a loop direction",
                    dir_span,
                ))
            }
        };
        self.expect(&Token::Comma, "','")?;
        let end = self.expression()?;
        let body = self.block()?;
        Ok(StatementKind::For {
            label,
            variable,
            start,
            direction,
            end,
            body,
        })
    }

    fn assignment_or_expression(&mut self) -> Result<StatementKind> {
        let start = self.pos;
        let expr = self.expression()?;

        let op = match self.peek() {
            Some(Token::Assign) => Some(AssignOp::Assign),
            Some(Token::PlusAssign) => Some(AssignOp::Add),
            Some(Token::MinusAssign) => Some(AssignOp::Sub),
            Some(Token::TimesAssign) => Some(AssignOp::Mul),
            Some(Token::DecPlusAssign) => Some(AssignOp::DecimalAdd),
            Some(Token::DecMinusAssign) => Some(AssignOp::DecimalSub),
            Some(Token::DecTimesAssign) => Some(AssignOp::DecimalMul),
            Some(Token::AndAssign) => Some(AssignOp::And),
            Some(Token::OrAssign) => Some(AssignOp::Or),
            Some(Token::XorAssign) => Some(AssignOp::Xor),
            Some(Token::ShlAssign) => Some(AssignOp::Shl),
            Some(Token::ShrAssign) => Some(AssignOp::Shr),
            Some(Token::DecShlAssign) => Some(AssignOp::DecimalShl),
            Some(Token::DecShrAssign) => Some(AssignOp::DecimalShr),
            _ => None,
        };

        match op {
            Some(op) => {
                let target_span = self.tokens[start].1;
                let target = match expr.kind {
                    ExprKind::Ident(name) => AssignTarget::Variable(name),
                    ExprKind::Index { array, index } => AssignTarget::Index { array, index },
                    _ => {
                        return Err(CompileError::new(
                            ErrorCode::InvalidAssignmentTarget,
                            "Only variables and array elements can be assigned to",
                            target_span,
                        ))
                    }
                };
                self.pos += 1;
                let value = self.expression()?;
                Ok(StatementKind::Assignment { target, op, value })
            }
            None => Ok(StatementKind::Expression(expr)),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr> {
        self.logical_or()
    }

    fn logical_or(&mut self) -> Result<Expr> {
        let mut lhs = self.logical_and()?;
        loop {
            let op = match self.peek() {
                Some(Token::OrOr) => BinaryOp::LogicalOr,
                Some(Token::XorXor) => BinaryOp::LogicalXor,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.logical_and()?;
            let span = lhs.span.merge(&rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn logical_and(&mut self) -> Result<Expr> {
        let mut lhs = self.comparison()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.pos += 1;
            let rhs = self.comparison()?;
            let span = lhs.span.merge(&rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::LogicalAnd,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut lhs = self.byte_join()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Gt) => BinaryOp::Gt,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.byte_join()?;
            let span = lhs.span.merge(&rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn byte_join(&mut self) -> Result<Expr> {
        let hi = self.additive()?;
        if self.peek() == Some(&Token::Colon) {
            self.pos += 1;
            let lo = self.additive()?;
            let span = hi.span.merge(&lo.span);
            return Ok(Expr::new(
                ExprKind::Join {
                    hi: Box::new(hi),
                    lo: Box::new(lo),
                },
                span,
            ));
        }
        Ok(hi)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                Some(Token::Amp) => BinaryOp::And,
                Some(Token::Pipe) => BinaryOp::Or,
                Some(Token::Caret) => BinaryOp::Xor,
                Some(Token::Shl) => BinaryOp::Shl,
                Some(Token::Shr) => BinaryOp::Shr,
                Some(Token::Shr9) => BinaryOp::Shr9,
                Some(Token::DecPlus) => BinaryOp::DecimalAdd,
                Some(Token::DecMinus) => BinaryOp::DecimalSub,
                Some(Token::DecShl) => BinaryOp::DecimalShl,
                Some(Token::DecShr) => BinaryOp::DecimalShr,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            let span = lhs.span.merge(&rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Times) => BinaryOp::Mul,
                Some(Token::DecTimes) => BinaryOp::DecimalMul,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            let span = lhs.span.merge(&rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        let span = self.span();
        if self.eat(&Token::Minus) {
            let expr = self.unary()?;
            let span = span.merge(&expr.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(expr),
                },
                span,
            ));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        let span = self.span();
        match self.peek().cloned() {
            Some(Token::Number(value)) => {
                self.pos += 1;
                Ok(Expr::new(ExprKind::Number(value), span))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let expr = self.expression()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(expr)
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                match self.peek() {
                    Some(Token::LParen) => {
                        self.pos += 1;
                        let mut args = Vec::new();
                        if self.peek() != Some(&Token::RParen) {
                            args.push(self.expression()?);
                            while self.eat(&Token::Comma) {
                                args.push(self.expression()?);
                            }
                        }
                        self.expect(&Token::RParen, "')'")?;
                        // lo() and hi() are operators, not calls.
                        match (name.as_str(), args.len()) {
                            ("lo", 1) => Ok(Expr::new(
                                ExprKind::Unary {
                                    op: UnaryOp::Lo,
                                    expr: Box::new(args.pop().unwrap()),
                                },
                                span,
                            )),
                            ("hi", 1) => Ok(Expr::new(
                                ExprKind::Unary {
                                    op: UnaryOp::Hi,
                                    expr: Box::new(args.pop().unwrap()),
                                },
                                span,
                            )),
                            ("not", 1) => Ok(Expr::new(
                                ExprKind::Unary {
                                    op: UnaryOp::Not,
                                    expr: Box::new(args.pop().unwrap()),
                                },
                                span,
                            )),
                            _ => Ok(Expr::new(ExprKind::Call { name, args }, span)),
                        }
                    }
                    Some(Token::LBracket) => {
                        self.pos += 1;
                        let index = self.expression()?;
                        self.expect(&Token::RBracket, "']'")?;
                        Ok(Expr::new(
                            ExprKind::Index {
                                array: name,
                                index: Box::new(index),
                            },
                            span,
                        ))
                    }
                    _ => Ok(Expr::new(ExprKind::Ident(name), span)),
                }
            }
            _ => Err(CompileError::new(
                ErrorCode::ExpectedExpression,
                "Expected an expression",
                span,
            )),
        }
    }

    // ------------------------------------------------------------------
    // Inline assembly
    // ------------------------------------------------------------------

    fn asm_block(&mut self) -> Result<Vec<AssemblyLine>> {
        self.expect(&Token::LBrace, "'{'")?;
        let mut lines = Vec::new();
        self.skip_newlines();
        while self.peek() != Some(&Token::RBrace) {
            if self.peek().is_none() {
                return Err(CompileError::new(
                    ErrorCode::UnexpectedEndOfFile,
                    "Unterminated asm block",
                    self.span(),
                ));
            }
            lines.push(self.asm_line()?);
            self.skip_newlines();
        }
        self.expect(&Token::RBrace, "'}'")?;
        Ok(lines)
    }

    fn asm_line(&mut self) -> Result<AssemblyLine> {
        let span = self.span();
        let word = self.ident("a mnemonic or label")?;

        // `name:` defines a label.
        if self.eat(&Token::Colon) {
            return Ok(AssemblyLine::label(&crate::asm::Label::new(word))
                .non_elidable()
                .at(span));
        }

        let opcode = parse_mnemonic(&word).ok_or_else(|| {
            CompileError::new(
                ErrorCode::InvalidInlineAssembly,
                format!("Unknown mnemonic '{word}'"),
                span,
            )
        })?;

        // Operand-less line.
        if matches!(self.peek(), Some(Token::Newline) | Some(Token::RBrace)) {
            return Ok(AssemblyLine::implied(opcode).non_elidable().at(span));
        }

        let line = if self.eat(&Token::Hash) {
            let operand = self.asm_operand()?;
            AssemblyLine::immediate(opcode, operand)
        } else if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let operand = self.asm_operand()?;
            if self.eat(&Token::Comma) {
                let reg = self.ident("x")?;
                if reg != "x" {
                    return Err(CompileError::new(
                        ErrorCode::InvalidInlineAssembly,
                        "Expected ',x)' in indexed-indirect operand",
                        span,
                    ));
                }
                self.expect(&Token::RParen, "')'")?;
                AssemblyLine::new(opcode, AddrMode::IndexedX, operand)
            } else {
                self.expect(&Token::RParen, "')'")?;
                if self.eat(&Token::Comma) {
                    let reg = self.ident("y")?;
                    if reg != "y" {
                        return Err(CompileError::new(
                            ErrorCode::InvalidInlineAssembly,
                            "Expected '),y' in indirect-indexed operand",
                            span,
                        ));
                    }
                    AssemblyLine::new(opcode, AddrMode::IndexedY, operand)
                } else {
                    AssemblyLine::new(opcode, AddrMode::Indirect, operand)
                }
            }
        } else if let Some(Token::Ident(word)) = self.peek() {
            if word == "a"
                && matches!(self.peek_at(1), Some(Token::Newline) | Some(Token::RBrace))
            {
                // Accumulator operand spelled out: `asl a`.
                self.pos += 1;
                AssemblyLine::implied(opcode)
            } else {
                let operand = self.asm_operand()?;
                self.asm_addressed(opcode, operand, span)?
            }
        } else if matches!(self.peek(), Some(Token::Number(_))) {
            let operand = self.asm_operand()?;
            self.asm_addressed(opcode, operand, span)?
        } else {
            return Err(CompileError::new(
                ErrorCode::InvalidInlineAssembly,
                "Invalid asm operand",
                span,
            ));
        };
        Ok(line.non_elidable().at(span))
    }

    fn asm_addressed(
        &mut self,
        opcode: Opcode,
        operand: Constant,
        span: Span,
    ) -> Result<AssemblyLine> {
        if opcode.is_branch() {
            return Ok(AssemblyLine::new(opcode, AddrMode::Relative, operand));
        }
        if self.eat(&Token::Comma) {
            let reg_span = self.span();
            let reg = self.ident("an index register")?;
            let small = operand
                .eval()
                .map(|v| (0..256).contains(&v))
                .unwrap_or(false);
            return match (reg.as_str(), small) {
                ("x", true) => Ok(AssemblyLine::new(opcode, AddrMode::ZeroPageX, operand)),
                ("x", false) => Ok(AssemblyLine::new(opcode, AddrMode::AbsoluteX, operand)),
                ("y", true) => Ok(AssemblyLine::new(opcode, AddrMode::ZeroPageY, operand)),
                ("y", false) => Ok(AssemblyLine::new(opcode, AddrMode::AbsoluteY, operand)),
                _ => Err(CompileError::new(
                    ErrorCode::InvalidInlineAssembly,
                    format!("Unknown index register '{reg}'"),
                    reg_span,
                )),
            };
        }
        let small = operand
            .eval()
            .map(|v| (0..256).contains(&v))
            .unwrap_or(false);
        if small && !matches!(opcode, Opcode::JMP | Opcode::JSR) {
            Ok(AssemblyLine::new(opcode, AddrMode::ZeroPage, operand))
        } else {
            Ok(AssemblyLine::new(opcode, AddrMode::Absolute, operand))
        }
    }

    fn asm_operand(&mut self) -> Result<Constant> {
        let span = self.span();
        match self.next().cloned() {
            Some(Token::Number(value)) => Ok(Constant::num(value)),
            Some(Token::Ident(name)) => Ok(Constant::address(name)),
            _ => Err(CompileError::new(
                ErrorCode::InvalidInlineAssembly,
                "Expected an asm operand",
                span,
            )),
        }
    }
}

/// Resolve a mnemonic accepted in inline assembly.
fn parse_mnemonic(word: &str) -> Option<Opcode> {
    use Opcode::*;
    let upper = word.to_ascii_uppercase();
    let opcode = match upper.as_str() {
        "ADC" => ADC, "AND" => AND, "ASL" => ASL, "BCC" => BCC, "BCS" => BCS,
        "BEQ" => BEQ, "BIT" => BIT, "BMI" => BMI, "BNE" => BNE, "BPL" => BPL,
        "BRK" => BRK, "BVC" => BVC, "BVS" => BVS, "CLC" => CLC, "CLD" => CLD,
        "CLI" => CLI, "CLV" => CLV, "CMP" => CMP, "CPX" => CPX, "CPY" => CPY,
        "DEC" => DEC, "DEX" => DEX, "DEY" => DEY, "EOR" => EOR, "INC" => INC,
        "INX" => INX, "INY" => INY, "JMP" => JMP, "JSR" => JSR, "LDA" => LDA,
        "LDX" => LDX, "LDY" => LDY, "LSR" => LSR, "NOP" => NOP, "ORA" => ORA,
        "PHA" => PHA, "PHP" => PHP, "PLA" => PLA, "PLP" => PLP, "ROL" => ROL,
        "ROR" => ROR, "RTI" => RTI, "RTS" => RTS, "SBC" => SBC, "SEC" => SEC,
        "SED" => SED, "SEI" => SEI, "STA" => STA, "STX" => STX, "STY" => STY,
        "TAX" => TAX, "TAY" => TAY, "TSX" => TSX, "TXA" => TXA, "TXS" => TXS,
        "TYA" => TYA, "BRA" => BRA, "PHX" => PHX, "PHY" => PHY, "PLX" => PLX,
        "PLY" => PLY, "STZ" => STZ, "TRB" => TRB, "TSB" => TSB,
        _ => return None,
    };
    Some(opcode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_source(source: &str) -> Result<Program> {
        parse(&tokenize(source)?)
    }

    #[test]
    fn test_variable_declaration() {
        let program = parse_source("byte a\nword w @ $c000\n").unwrap();
        assert_eq!(program.declarations.len(), 2);
        match &program.declarations[1] {
            Declaration::Variable(v) => {
                assert_eq!(v.name, "w");
                assert_eq!(v.ty, Type::Word);
                assert!(v.address.is_some());
            }
            other => panic!("expected variable, got {other:?}"),
        }
    }

    #[test]
    fn test_array_declaration() {
        let program = parse_source("array output [16] @ $c000\n").unwrap();
        match &program.declarations[0] {
            Declaration::Array(a) => {
                assert_eq!(a.name, "output");
                assert!(matches!(a.contents, ArrayContents::Blank));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_array_text_contents() {
        let program = parse_source("array msg [6] = \"hello\" pet\n").unwrap();
        match &program.declarations[0] {
            Declaration::Array(a) => match &a.contents {
                ArrayContents::Text(text, enc) => {
                    assert_eq!(text, "hello");
                    assert_eq!(*enc, TextEncoding::Petscii);
                }
                other => panic!("expected text, got {other:?}"),
            },
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_function_with_body() {
        let source = "byte one() {\n    return 1\n}\n";
        let program = parse_source(source).unwrap();
        match &program.declarations[0] {
            Declaration::Function(f) => {
                assert_eq!(f.name, "one");
                assert_eq!(f.return_type, Type::Byte);
                assert_eq!(f.body.len(), 1);
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn test_interrupt_modifier() {
        let source = "interrupt void irq() {\n    return\n}\n";
        let program = parse_source(source).unwrap();
        match &program.declarations[0] {
            Declaration::Function(f) => assert!(f.flags.interrupt),
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn test_conflicting_modifiers_rejected() {
        let source = "inline noinline void f() {\n    return\n}\n";
        let err = parse_source(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConflictingModifiers);
    }

    #[test]
    fn test_operator_precedence() {
        // a + b * c parses as a + (b * c)
        let source = "void main() {\n    x = a + b * c\n}\n";
        let program = parse_source(source).unwrap();
        let Declaration::Function(f) = &program.declarations[0] else {
            panic!()
        };
        let StatementKind::Assignment { value, .. } = &f.body[0].kind else {
            panic!()
        };
        let ExprKind::Binary { op, rhs, .. } = &value.kind else {
            panic!()
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_comparison_binds_looser_than_additive() {
        let source = "void main() {\n    if a + 1 == b {\n        a = 0\n    }\n}\n";
        assert!(parse_source(source).is_ok());
    }

    #[test]
    fn test_byte_join() {
        let source = "void main() {\n    w = h:l\n}\n";
        let program = parse_source(source).unwrap();
        let Declaration::Function(f) = &program.declarations[0] else {
            panic!()
        };
        let StatementKind::Assignment { value, .. } = &f.body[0].kind else {
            panic!()
        };
        assert!(matches!(value.kind, ExprKind::Join { .. }));
    }

    #[test]
    fn test_for_loop_directions() {
        for dir in ["to", "until", "downto", "parallelto"] {
            let source = format!("void main() {{\n    for i,0,{dir},9 {{\n        x = i\n    }}\n}}\n");
            assert!(parse_source(&source).is_ok(), "failed for {dir}");
        }
    }

    #[test]
    fn test_labelled_loop_with_break() {
        let source =
            "void main() {\n    outer: while 1 == 1 {\n        break outer\n    }\n}\n";
        let program = parse_source(source).unwrap();
        let Declaration::Function(f) = &program.declarations[0] else {
            panic!()
        };
        let StatementKind::While { label, body, .. } = &f.body[0].kind else {
            panic!("expected while, got {:?}", f.body[0].kind)
        };
        assert_eq!(label.as_deref(), Some("outer"));
        assert!(matches!(&body[0].kind, StatementKind::Break(Some(l)) if l == "outer"));
    }

    #[test]
    fn test_compound_assignment() {
        let source = "void main() {\n    output[i] += 36\n}\n";
        let program = parse_source(source).unwrap();
        let Declaration::Function(f) = &program.declarations[0] else {
            panic!()
        };
        let StatementKind::Assignment { target, op, .. } = &f.body[0].kind else {
            panic!()
        };
        assert_eq!(*op, AssignOp::Add);
        assert!(matches!(target, AssignTarget::Index { .. }));
    }

    #[test]
    fn test_decimal_assignment() {
        let source = "void main() {\n    a +'= 1\n}\n";
        let program = parse_source(source).unwrap();
        let Declaration::Function(f) = &program.declarations[0] else {
            panic!()
        };
        assert!(matches!(
            &f.body[0].kind,
            StatementKind::Assignment {
                op: AssignOp::DecimalAdd,
                ..
            }
        ));
    }

    #[test]
    fn test_asm_function() {
        let source = "asm void putchar(byte a) {\n    jsr $ffd2\n    rts\n}\n";
        let program = parse_source(source).unwrap();
        let Declaration::Function(f) = &program.declarations[0] else {
            panic!()
        };
        let body = f.asm_body.as_ref().unwrap();
        assert_eq!(body.len(), 2);
        assert_eq!(body[0].opcode, Opcode::JSR);
        assert!(!body[0].elidable);
        assert_eq!(body[1].opcode, Opcode::RTS);
    }

    #[test]
    fn test_invalid_assignment_target() {
        let source = "void main() {\n    1 = 2\n}\n";
        let err = parse_source(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAssignmentTarget);
    }
}
