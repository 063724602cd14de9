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

//! Expression lowering.
//!
//! Byte values are computed in A. Binary operators take their right
//! operand directly when it is addressable in one instruction; otherwise
//! the right operand is computed first and parked in the pseudoregister,
//! and the left operand is computed one scratch level deeper.

use super::{CompilationContext, FunctionCompiler, RegTarget, SimpleOperand};
use crate::asm::{AssemblyLine, Label, Opcode};
use crate::ast::{BinaryOp, Expr, ExprKind, ParamPassingConvention, RegisterPair, Type, UnaryOp};
use crate::constant::Constant;
use crate::env::ThingKind;
use crate::error::{CompileError, ErrorCode, Result, Span};

impl FunctionCompiler {
    /// Compute a byte expression into the requested register.
    pub fn compile_to_target(
        &mut self,
        ctx: &CompilationContext,
        expr: &Expr,
        target: RegTarget,
    ) -> Result<()> {
        match target {
            RegTarget::A => self.compile_expr_to_a(ctx, expr),
            RegTarget::X => {
                // Simple operands load straight into X.
                if let Some(operand) = self.simple_operand(ctx, expr)? {
                    match operand {
                        SimpleOperand::Immediate(c) => {
                            self.emit(AssemblyLine::immediate(Opcode::LDX, c));
                        }
                        operand => operand.apply(Opcode::LDX, self, ctx),
                    }
                    return Ok(());
                }
                self.compile_expr_to_a(ctx, expr)?;
                self.emit(AssemblyLine::implied(Opcode::TAX));
                Ok(())
            }
            RegTarget::Y => {
                if let Some(operand) = self.simple_operand(ctx, expr)? {
                    match operand {
                        SimpleOperand::Immediate(c) => {
                            self.emit(AssemblyLine::immediate(Opcode::LDY, c));
                        }
                        operand => operand.apply(Opcode::LDY, self, ctx),
                    }
                    return Ok(());
                }
                self.compile_expr_to_a(ctx, expr)?;
                self.emit(AssemblyLine::implied(Opcode::TAY));
                Ok(())
            }
            RegTarget::AX => self.compile_word_to_ax(ctx, expr),
        }
    }

    /// Compute a byte expression into A.
    pub fn compile_expr_to_a(&mut self, ctx: &CompilationContext, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Number(value) => {
                self.emit(AssemblyLine::immediate(Opcode::LDA, Constant::num(*value)));
                Ok(())
            }
            ExprKind::Ident(name) => {
                let thing = ctx.resolve(name, expr.span)?;
                match &thing.kind {
                    ThingKind::ConstantAlias(c) => {
                        self.emit(AssemblyLine::immediate(Opcode::LDA, c.clone()));
                    }
                    ThingKind::Variable(_) => {
                        let (operand, storage) = (thing.address_constant(), thing.storage);
                        self.emit_access(Opcode::LDA, storage, operand, ctx);
                    }
                    ThingKind::Array { .. } => {
                        // Bare array name: its address's low byte.
                        self.emit(AssemblyLine::immediate(
                            Opcode::LDA,
                            thing.address_constant().lo_byte(),
                        ));
                    }
                    ThingKind::Function { .. } => {
                        return Err(CompileError::new(
                            ErrorCode::TypeMismatch,
                            format!("'{name}' is a function, not a value"),
                            expr.span,
                        ))
                    }
                }
                Ok(())
            }
            ExprKind::Index { array, index } => {
                let thing = ctx.resolve(array, expr.span)?;
                let (operand, length) = match &thing.kind {
                    ThingKind::Array { length, .. } => (thing.address_constant(), *length),
                    _ => {
                        return Err(CompileError::new(
                            ErrorCode::TypeMismatch,
                            format!("'{array}' is not an array"),
                            expr.span,
                        ))
                    }
                };
                if let ExprKind::Number(i) = index.kind {
                    self.emit(AssemblyLine::absolute(Opcode::LDA, operand.plus(i)));
                    return Ok(());
                }
                self.compile_index_to_y(ctx, index, length)?;
                self.emit(AssemblyLine::new(
                    Opcode::LDA,
                    crate::asm::AddrMode::AbsoluteY,
                    operand,
                ));
                Ok(())
            }
            ExprKind::Call { name, args } => self.compile_call(ctx, name, args, expr.span),
            ExprKind::Unary { op, expr: inner } => match op {
                UnaryOp::Neg => {
                    self.compile_expr_to_a(ctx, inner)?;
                    self.emit(AssemblyLine::immediate(Opcode::EOR, Constant::num(0xFF)));
                    self.emit(AssemblyLine::implied(Opcode::CLC));
                    self.emit(AssemblyLine::immediate(Opcode::ADC, Constant::num(1)));
                    Ok(())
                }
                UnaryOp::Not => {
                    self.compile_expr_to_a(ctx, inner)?;
                    self.emit(AssemblyLine::immediate(Opcode::EOR, Constant::num(0xFF)));
                    Ok(())
                }
                UnaryOp::Lo => {
                    self.compile_word_to_ax(ctx, inner)?;
                    Ok(())
                }
                UnaryOp::Hi => {
                    self.compile_word_to_ax(ctx, inner)?;
                    self.emit(AssemblyLine::implied(Opcode::TXA));
                    Ok(())
                }
            },
            ExprKind::Join { .. } => Err(CompileError::new(
                ErrorCode::TypeMismatch,
                "Byte expected, found a word join",
                expr.span,
            )),
            ExprKind::Binary { op, lhs, rhs } => {
                if op.is_comparison()
                    || matches!(
                        op,
                        BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::LogicalXor
                    )
                {
                    return self.materialize_condition(ctx, expr);
                }
                self.compile_binary_byte(ctx, *op, lhs, rhs, expr.span)
            }
        }
    }

    /// Compute a word expression into A (low) and X (high).
    pub fn compile_word_to_ax(&mut self, ctx: &CompilationContext, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Number(value) => {
                self.emit(AssemblyLine::immediate(
                    Opcode::LDX,
                    Constant::num((*value >> 8) & 0xFF),
                ));
                self.emit(AssemblyLine::immediate(
                    Opcode::LDA,
                    Constant::num(*value & 0xFF),
                ));
                Ok(())
            }
            ExprKind::Ident(name) => {
                let thing = ctx.resolve(name, expr.span)?;
                match &thing.kind {
                    ThingKind::Variable(Type::Word) => {
                        let operand = thing.address_constant();
                        self.emit_access(Opcode::LDA, thing.storage, operand.clone(), ctx);
                        // High byte sits one address up.
                        let hi_storage = thing.storage.bump();
                        self.emit_access(Opcode::LDX, hi_storage, operand.plus(1), ctx);
                        Ok(())
                    }
                    ThingKind::Array { .. } => {
                        self.emit(AssemblyLine::immediate(
                            Opcode::LDA,
                            thing.address_constant().lo_byte(),
                        ));
                        self.emit(AssemblyLine::immediate(
                            Opcode::LDX,
                            thing.address_constant().hi_byte(),
                        ));
                        Ok(())
                    }
                    ThingKind::ConstantAlias(c) => {
                        self.emit(AssemblyLine::immediate(Opcode::LDA, c.lo_byte()));
                        self.emit(AssemblyLine::immediate(Opcode::LDX, c.hi_byte()));
                        Ok(())
                    }
                    _ => {
                        // Byte variable widened to a word.
                        self.compile_expr_to_a(ctx, expr)?;
                        self.emit(AssemblyLine::immediate(Opcode::LDX, Constant::num(0)));
                        Ok(())
                    }
                }
            }
            ExprKind::Join { hi, lo } => {
                // High byte parks in scratch so the low byte may clobber X.
                self.compile_expr_to_a(ctx, hi)?;
                let scratch = ctx.scratch(expr.span)?;
                self.emit(AssemblyLine::zero_page(Opcode::STA, scratch.clone()));
                let inner = ctx.with_scratch();
                self.compile_expr_to_a(&inner, lo)?;
                self.emit(AssemblyLine::zero_page(Opcode::LDX, scratch));
                Ok(())
            }
            ExprKind::Call { name, args } => {
                let thing = ctx.resolve(name, expr.span)?;
                let returns_word = matches!(
                    &thing.kind,
                    ThingKind::Function {
                        return_type: Type::Word,
                        ..
                    }
                );
                self.compile_call(ctx, name, args, expr.span)?;
                if !returns_word {
                    self.emit(AssemblyLine::immediate(Opcode::LDX, Constant::num(0)));
                }
                Ok(())
            }
            _ => {
                // Any other word-valued shape: compute the byte value and
                // widen. Word arithmetic beyond this is not lowered here.
                self.compile_expr_to_a(ctx, expr)?;
                self.emit(AssemblyLine::immediate(Opcode::LDX, Constant::num(0)));
                Ok(())
            }
        }
    }

    fn compile_binary_byte(
        &mut self,
        ctx: &CompilationContext,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> Result<()> {
        if op.is_decimal() && !ctx.job.options.decimal_mode {
            return Err(CompileError::new(
                ErrorCode::DecimalModeUnavailable,
                "Decimal arithmetic requires -fdecimal-mode",
                span,
            ));
        }
        match op {
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::And
            | BinaryOp::Or
            | BinaryOp::Xor
            | BinaryOp::DecimalAdd
            | BinaryOp::DecimalSub => {
                let operand = self.rhs_operand(ctx, rhs, lhs, span)?;
                self.apply_alu(ctx, op, &operand);
                Ok(())
            }
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Shr9 => {
                let shift_op = if op == BinaryOp::Shl {
                    Opcode::ASL
                } else {
                    Opcode::LSR
                };
                if let ExprKind::Number(count) = rhs.kind {
                    self.compile_expr_to_a(ctx, lhs)?;
                    if count >= 8 {
                        self.emit(AssemblyLine::immediate(Opcode::LDA, Constant::num(0)));
                    } else {
                        for _ in 0..count {
                            self.emit(AssemblyLine::implied(shift_op));
                        }
                    }
                    return Ok(());
                }
                // Variable shift count: loop in X.
                self.compile_to_target(ctx, rhs, RegTarget::X)?;
                let inner = ctx.with_scratch();
                self.compile_expr_to_a(&inner, lhs)?;
                let loop_label = ctx.job.labels.next("sh");
                let done_label = ctx.job.labels.next("shend");
                self.emit_label(&loop_label);
                self.emit(AssemblyLine::immediate(Opcode::CPX, Constant::num(0)));
                self.emit(AssemblyLine::relative(Opcode::BEQ, &done_label));
                self.emit(AssemblyLine::implied(shift_op));
                self.emit(AssemblyLine::implied(Opcode::DEX));
                self.emit_jump(ctx, &loop_label);
                self.emit_label(&done_label);
                Ok(())
            }
            BinaryOp::DecimalShl | BinaryOp::DecimalShr => {
                // BCD doubling is a decimal-mode self-add; halving has no
                // hardware analogue and is not lowered.
                if op == BinaryOp::DecimalShr {
                    return Err(CompileError::new(
                        ErrorCode::ExpressionTooComplex,
                        "Runtime >>' is not supported on this target",
                        span,
                    ));
                }
                let ExprKind::Number(count) = rhs.kind else {
                    return Err(CompileError::new(
                        ErrorCode::ExpressionTooComplex,
                        "<<' requires a constant shift count",
                        span,
                    ));
                };
                self.compile_expr_to_a(ctx, lhs)?;
                let scratch = ctx.scratch(span)?;
                self.emit(AssemblyLine::implied(Opcode::SED));
                for _ in 0..count {
                    self.emit(AssemblyLine::zero_page(Opcode::STA, scratch.clone()));
                    self.emit(AssemblyLine::implied(Opcode::CLC));
                    self.emit(AssemblyLine::zero_page(Opcode::ADC, scratch.clone()));
                }
                self.emit(AssemblyLine::implied(Opcode::CLD));
                Ok(())
            }
            BinaryOp::Mul => self.compile_mul(ctx, lhs, rhs, span),
            BinaryOp::DecimalMul => Err(CompileError::new(
                ErrorCode::ExpressionTooComplex,
                "Runtime *' is not supported on this target",
                span,
            )),
            _ => unreachable!("conditions handled by materialize_condition"),
        }
    }

    /// Leave the right operand addressable and the left operand in A.
    fn rhs_operand(
        &mut self,
        ctx: &CompilationContext,
        rhs: &Expr,
        lhs: &Expr,
        span: Span,
    ) -> Result<SimpleOperand> {
        if let Some(operand) = self.simple_operand(ctx, rhs)? {
            self.compile_expr_to_a(ctx, lhs)?;
            Ok(operand)
        } else {
            // Right first, parked in scratch; left one level deeper.
            self.compile_expr_to_a(ctx, rhs)?;
            let scratch = ctx.scratch(span)?;
            self.emit(AssemblyLine::zero_page(Opcode::STA, scratch.clone()));
            let inner = ctx.with_scratch();
            self.compile_expr_to_a(&inner, lhs)?;
            Ok(SimpleOperand::Memory(
                scratch,
                crate::env::Storage::ZeroPage(0),
            ))
        }
    }

    fn apply_alu(&mut self, ctx: &CompilationContext, op: BinaryOp, operand: &SimpleOperand) {
        match op {
            BinaryOp::Add => {
                self.emit(AssemblyLine::implied(Opcode::CLC));
                operand.apply(Opcode::ADC, self, ctx);
            }
            BinaryOp::Sub => {
                self.emit(AssemblyLine::implied(Opcode::SEC));
                operand.apply(Opcode::SBC, self, ctx);
            }
            BinaryOp::And => operand.apply(Opcode::AND, self, ctx),
            BinaryOp::Or => operand.apply(Opcode::ORA, self, ctx),
            BinaryOp::Xor => operand.apply(Opcode::EOR, self, ctx),
            BinaryOp::DecimalAdd => {
                self.emit(AssemblyLine::implied(Opcode::SED));
                self.emit(AssemblyLine::implied(Opcode::CLC));
                operand.apply(Opcode::ADC, self, ctx);
                self.emit(AssemblyLine::implied(Opcode::CLD));
            }
            BinaryOp::DecimalSub => {
                self.emit(AssemblyLine::implied(Opcode::SED));
                self.emit(AssemblyLine::implied(Opcode::SEC));
                operand.apply(Opcode::SBC, self, ctx);
                self.emit(AssemblyLine::implied(Opcode::CLD));
            }
            _ => unreachable!(),
        }
    }

    fn compile_mul(
        &mut self,
        ctx: &CompilationContext,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> Result<()> {
        // Constant factors become shifts where the factor is a power of
        // two; everything else goes through the runtime routine.
        let const_factor = match (&lhs.kind, &rhs.kind) {
            (_, ExprKind::Number(n)) => Some((lhs, *n)),
            (ExprKind::Number(n), _) => Some((rhs, *n)),
            _ => None,
        };
        if let Some((other, factor)) = const_factor {
            match factor {
                0 => {
                    self.emit(AssemblyLine::immediate(Opcode::LDA, Constant::num(0)));
                    return Ok(());
                }
                1 => return self.compile_expr_to_a(ctx, other),
                f if (f as u64).is_power_of_two() && (0..256).contains(&f) => {
                    self.compile_expr_to_a(ctx, other)?;
                    for _ in 0..f.trailing_zeros() {
                        self.emit(AssemblyLine::implied(Opcode::ASL));
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
        // General byte multiply: A * X through the runtime.
        self.runtime.mul_u8 = true;
        if let Some(operand) = self.simple_operand(ctx, rhs)? {
            self.compile_expr_to_a(ctx, lhs)?;
            match operand {
                SimpleOperand::Immediate(c) => {
                    self.emit(AssemblyLine::immediate(Opcode::LDX, c));
                }
                operand => operand.apply(Opcode::LDX, self, ctx),
            }
        } else {
            self.compile_expr_to_a(ctx, rhs)?;
            let scratch = ctx.scratch(span)?;
            self.emit(AssemblyLine::zero_page(Opcode::STA, scratch.clone()));
            let inner = ctx.with_scratch();
            self.compile_expr_to_a(&inner, lhs)?;
            self.emit(AssemblyLine::zero_page(Opcode::LDX, scratch));
        }
        self.emit(AssemblyLine::absolute_jump(
            Opcode::JSR,
            &Label::new(super::runtime::MUL_U8),
        ));
        Ok(())
    }

    /// Compute an index expression into Y, bounds-checked.
    pub fn compile_index_to_y(
        &mut self,
        ctx: &CompilationContext,
        index: &Expr,
        length: u16,
    ) -> Result<()> {
        self.compile_to_target(ctx, index, RegTarget::Y)?;
        self.emit_bounds_check(ctx, length)
    }

    /// Compare Y against the array length and trap on overflow.
    pub fn emit_bounds_check(&mut self, ctx: &CompilationContext, length: u16) -> Result<()> {
        if ctx.never_check_array_bounds {
            return Ok(());
        }
        if length > 255 {
            // Every byte index is in range.
            return Ok(());
        }
        self.runtime.bounds_fail = true;
        let ok = ctx.job.labels.next("bc");
        self.emit(AssemblyLine::immediate(
            Opcode::CPY,
            Constant::num(length as i64),
        ));
        self.emit(AssemblyLine::relative(Opcode::BCC, &ok));
        self.emit(AssemblyLine::absolute_jump(
            Opcode::JMP,
            &Label::new(super::runtime::BOUNDS_FAIL),
        ));
        self.emit_label(&ok);
        Ok(())
    }

    /// Compile a call, leaving the return value (if any) in A or A/X.
    pub fn compile_call(
        &mut self,
        ctx: &CompilationContext,
        name: &str,
        args: &[Expr],
        span: Span,
    ) -> Result<()> {
        let thing = ctx.resolve(name, span)?;
        let params = match &thing.kind {
            ThingKind::Function { params, .. } => params.clone(),
            _ => {
                return Err(CompileError::new(
                    ErrorCode::TypeMismatch,
                    format!("'{name}' is not a function"),
                    span,
                ))
            }
        };
        if args.len() != params.len() {
            return Err(CompileError::new(
                ErrorCode::WrongNumberOfArguments,
                format!("'{name}' takes {} argument(s)", params.len()),
                span,
            ));
        }

        // The register-passed argument (asm functions) is computed last so
        // nothing clobbers it.
        let mut register_arg: Option<(&Expr, RegisterPair)> = None;
        for (arg, param_name) in args.iter().zip(&params) {
            match self.param_convention(ctx, name, param_name) {
                ParamPassingConvention::ByRegister(pair) => {
                    register_arg = Some((arg, pair));
                }
                _ => {
                    let param_thing = ctx.env.get(param_name);
                    match param_thing {
                        Some(thing) => {
                            if thing.size == 2 {
                                self.compile_word_to_ax(ctx, arg)?;
                                let operand = thing.address_constant();
                                self.emit_access(Opcode::STA, thing.storage, operand.clone(), ctx);
                                self.emit_access(
                                    Opcode::STX,
                                    thing.storage.bump(),
                                    operand.plus(1),
                                    ctx,
                                );
                            } else {
                                self.compile_expr_to_a(ctx, arg)?;
                                let operand = thing.address_constant();
                                self.emit_access(Opcode::STA, thing.storage, operand, ctx);
                            }
                        }
                        None => {
                            return Err(CompileError::new(
                                ErrorCode::UndefinedSymbol,
                                format!("Missing parameter storage for '{param_name}'"),
                                span,
                            ))
                        }
                    }
                }
            }
        }
        if let Some((arg, pair)) = register_arg {
            match pair {
                RegisterPair::A => self.compile_expr_to_a(ctx, arg)?,
                RegisterPair::X => self.compile_to_target(ctx, arg, RegTarget::X)?,
                RegisterPair::Y => self.compile_to_target(ctx, arg, RegTarget::Y)?,
                RegisterPair::AX => self.compile_word_to_ax(ctx, arg)?,
                RegisterPair::YX => {
                    self.compile_word_to_ax(ctx, arg)?;
                    self.emit(AssemblyLine::implied(Opcode::TAY));
                }
                pair => {
                    // The remaining pairs shuffle the low byte through
                    // scratch while the high byte changes register.
                    self.compile_word_to_ax(ctx, arg)?;
                    let scratch = ctx.scratch(span)?;
                    self.emit(AssemblyLine::zero_page(Opcode::STA, scratch.clone()));
                    self.emit(AssemblyLine::implied(Opcode::TXA));
                    match pair {
                        RegisterPair::XA => {
                            self.emit(AssemblyLine::zero_page(Opcode::LDX, scratch));
                        }
                        RegisterPair::YA => {
                            self.emit(AssemblyLine::zero_page(Opcode::LDY, scratch));
                        }
                        RegisterPair::AY => {
                            self.emit(AssemblyLine::implied(Opcode::TAY));
                            self.emit(AssemblyLine::zero_page(Opcode::LDA, scratch));
                        }
                        RegisterPair::XY => {
                            self.emit(AssemblyLine::implied(Opcode::TAY));
                            self.emit(AssemblyLine::zero_page(Opcode::LDX, scratch));
                        }
                        _ => unreachable!(),
                    }
                }
            }
        }
        self.emit(AssemblyLine::absolute_jump(Opcode::JSR, &Label::new(name)));
        Ok(())
    }

    fn param_convention(
        &self,
        ctx: &CompilationContext,
        func: &str,
        param_name: &str,
    ) -> ParamPassingConvention {
        // Register conventions leave no parameter thing behind; a missing
        // thing with a register-shaped short name means by-register.
        if ctx.env.get(param_name).is_some() {
            return ParamPassingConvention::ByVariable;
        }
        let bare = param_name.strip_prefix(&format!("{func}.")).unwrap_or(param_name);
        match RegisterPair::from_name(bare) {
            Some(pair) => ParamPassingConvention::ByRegister(pair),
            None => ParamPassingConvention::ByVariable,
        }
    }

    /// Turn a condition expression into 0 or 1 in A.
    fn materialize_condition(&mut self, ctx: &CompilationContext, expr: &Expr) -> Result<()> {
        let true_label = ctx.job.labels.next("tr");
        let end_label = ctx.job.labels.next("te");
        self.compile_condition(ctx, expr, &true_label, true)?;
        self.emit(AssemblyLine::immediate(Opcode::LDA, Constant::num(0)));
        self.emit_jump(ctx, &end_label);
        self.emit_label(&true_label);
        self.emit(AssemblyLine::immediate(Opcode::LDA, Constant::num(1)));
        self.emit_label(&end_label);
        Ok(())
    }

    /// Branch to `target` when the condition evaluates to `jump_if`.
    pub fn compile_condition(
        &mut self,
        ctx: &CompilationContext,
        expr: &Expr,
        target: &Label,
        jump_if: bool,
    ) -> Result<()> {
        match &expr.kind {
            ExprKind::Binary { op, lhs, rhs } if op.is_comparison() => {
                self.compile_comparison(ctx, *op, lhs, rhs, target, jump_if, expr.span)
            }
            ExprKind::Binary {
                op: BinaryOp::LogicalAnd,
                lhs,
                rhs,
            } => {
                if jump_if {
                    let fall = ctx.job.labels.next("an");
                    self.compile_condition(ctx, lhs, &fall, false)?;
                    self.compile_condition(ctx, rhs, target, true)?;
                    self.emit_label(&fall);
                } else {
                    self.compile_condition(ctx, lhs, target, false)?;
                    self.compile_condition(ctx, rhs, target, false)?;
                }
                Ok(())
            }
            ExprKind::Binary {
                op: BinaryOp::LogicalOr,
                lhs,
                rhs,
            } => {
                if jump_if {
                    self.compile_condition(ctx, lhs, target, true)?;
                    self.compile_condition(ctx, rhs, target, true)?;
                } else {
                    let fall = ctx.job.labels.next("or");
                    self.compile_condition(ctx, lhs, &fall, true)?;
                    self.compile_condition(ctx, rhs, target, false)?;
                    self.emit_label(&fall);
                }
                Ok(())
            }
            ExprKind::Binary {
                op: BinaryOp::LogicalXor,
                lhs,
                rhs,
            } => {
                // Materialize both sides and compare the truth bytes.
                self.compile_condition_value(ctx, rhs)?;
                let scratch = ctx.scratch(expr.span)?;
                self.emit(AssemblyLine::zero_page(Opcode::STA, scratch.clone()));
                let inner = ctx.with_scratch();
                self.compile_condition_value(&inner, lhs)?;
                self.emit(AssemblyLine::zero_page(Opcode::EOR, scratch));
                let branch = if jump_if { Opcode::BNE } else { Opcode::BEQ };
                self.emit(AssemblyLine::relative(branch, target));
                Ok(())
            }
            _ => {
                // Truthiness of a plain value.
                self.compile_expr_to_a(ctx, expr)?;
                self.emit(AssemblyLine::immediate(Opcode::CMP, Constant::num(0)));
                let branch = if jump_if { Opcode::BNE } else { Opcode::BEQ };
                self.emit(AssemblyLine::relative(branch, target));
                Ok(())
            }
        }
    }

    fn compile_condition_value(&mut self, ctx: &CompilationContext, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Binary { op, .. }
                if op.is_comparison()
                    || matches!(
                        op,
                        BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::LogicalXor
                    ) =>
            {
                self.materialize_condition(ctx, expr)
            }
            _ => {
                // Normalize any non-zero value to 1.
                self.compile_expr_to_a(ctx, expr)?;
                let zero = ctx.job.labels.next("nz");
                self.emit(AssemblyLine::immediate(Opcode::CMP, Constant::num(0)));
                self.emit(AssemblyLine::relative(Opcode::BEQ, &zero));
                self.emit(AssemblyLine::immediate(Opcode::LDA, Constant::num(1)));
                self.emit_label(&zero);
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_comparison(
        &mut self,
        ctx: &CompilationContext,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        target: &Label,
        jump_if: bool,
        span: Span,
    ) -> Result<()> {
        // Branch on the opposite comparison when jumping on false.
        let op = if jump_if { op } else { invert_comparison(op) };

        let operand = self.rhs_operand(ctx, rhs, lhs, span)?;
        operand.apply(Opcode::CMP, self, ctx);
        match op {
            BinaryOp::Eq => self.emit(AssemblyLine::relative(Opcode::BEQ, target)),
            BinaryOp::Ne => self.emit(AssemblyLine::relative(Opcode::BNE, target)),
            BinaryOp::Lt => self.emit(AssemblyLine::relative(Opcode::BCC, target)),
            BinaryOp::Ge => self.emit(AssemblyLine::relative(Opcode::BCS, target)),
            BinaryOp::Le => {
                self.emit(AssemblyLine::relative(Opcode::BCC, target));
                self.emit(AssemblyLine::relative(Opcode::BEQ, target));
            }
            BinaryOp::Gt => {
                let skip = ctx.job.labels.next("gt");
                self.emit(AssemblyLine::relative(Opcode::BEQ, &skip));
                self.emit(AssemblyLine::relative(Opcode::BCS, target));
                self.emit_label(&skip);
            }
            _ => unreachable!(),
        }
        Ok(())
    }
}

fn invert_comparison(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Eq => BinaryOp::Ne,
        BinaryOp::Ne => BinaryOp::Eq,
        BinaryOp::Lt => BinaryOp::Ge,
        BinaryOp::Ge => BinaryOp::Lt,
        BinaryOp::Le => BinaryOp::Gt,
        BinaryOp::Gt => BinaryOp::Le,
        _ => op,
    }
}
