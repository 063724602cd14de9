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

//! Statement lowering.
//!
//! Control flow compiles to conditional-branch skeletons around the
//! condition lowering from the expression module. Loops register their
//! exit and repeat labels in the compilation context so `break` and
//! `continue` (optionally labelled) can find them.

use super::{CompilationContext, FunctionCompiler, SimpleOperand};
use crate::asm::{AddrMode, AssemblyLine, Label, Opcode};
use crate::ast::{
    AssignOp, AssignTarget, Expr, ExprKind, ForDirection, Statement, StatementKind, Type,
};
use crate::constant::Constant;
use crate::env::{Storage, ThingKind};
use crate::error::{CompileError, ErrorCode, Result, Span};

impl FunctionCompiler {
    pub fn compile_statements(
        &mut self,
        ctx: &CompilationContext,
        statements: &[Statement],
        function_end: &Label,
    ) -> Result<()> {
        for statement in statements {
            self.compile_statement(ctx, statement, function_end)?;
        }
        Ok(())
    }

    fn compile_statement(
        &mut self,
        ctx: &CompilationContext,
        statement: &Statement,
        function_end: &Label,
    ) -> Result<()> {
        match &statement.kind {
            StatementKind::LocalVariable(v) => {
                if let Some(init) = &v.initializer {
                    self.compile_assignment(
                        ctx,
                        &AssignTarget::Variable(v.name.clone()),
                        AssignOp::Assign,
                        init,
                        statement.span,
                    )?;
                }
                Ok(())
            }
            StatementKind::Assignment { target, op, value } => {
                self.compile_assignment(ctx, target, *op, value, statement.span)
            }
            StatementKind::Expression(e) => {
                // Only calls have effects worth keeping.
                self.compile_expr_to_a(ctx, e)
            }
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if else_branch.is_empty() {
                    let end = ctx.job.labels.next("ie");
                    self.compile_condition(ctx, condition, &end, false)?;
                    self.compile_statements(ctx, then_branch, function_end)?;
                    self.emit_label(&end);
                } else {
                    let else_label = ctx.job.labels.next("el");
                    let end = ctx.job.labels.next("ie");
                    self.compile_condition(ctx, condition, &else_label, false)?;
                    self.compile_statements(ctx, then_branch, function_end)?;
                    self.emit_jump(ctx, &end);
                    self.emit_label(&else_label);
                    self.compile_statements(ctx, else_branch, function_end)?;
                    self.emit_label(&end);
                }
                Ok(())
            }
            StatementKind::While {
                label,
                condition,
                body,
            } => {
                let start = ctx.job.labels.next("wh");
                let end = ctx.job.labels.next("we");
                self.emit_label(&start);
                self.compile_condition(ctx, condition, &end, false)?;
                let inner = ctx.with_loop(label.as_deref(), &end, &start);
                self.compile_statements(&inner, body, function_end)?;
                self.emit_jump(ctx, &start);
                self.emit_label(&end);
                Ok(())
            }
            StatementKind::DoWhile {
                label,
                body,
                condition,
            } => {
                let start = ctx.job.labels.next("do");
                let check = ctx.job.labels.next("dc");
                let end = ctx.job.labels.next("de");
                self.emit_label(&start);
                let inner = ctx.with_loop(label.as_deref(), &end, &check);
                self.compile_statements(&inner, body, function_end)?;
                self.emit_label(&check);
                self.compile_condition(ctx, condition, &start, true)?;
                self.emit_label(&end);
                Ok(())
            }
            StatementKind::For {
                label,
                variable,
                start,
                direction,
                end,
                body,
            } => self.compile_for(
                ctx,
                label.as_deref(),
                variable,
                start,
                *direction,
                end,
                body,
                function_end,
                statement.span,
            ),
            StatementKind::Break(target) => {
                let key = target.clone().unwrap_or_default();
                match ctx.break_labels.get(&key) {
                    Some(label) => {
                        self.emit_jump(ctx, &label.clone());
                        Ok(())
                    }
                    None if key.is_empty() => Err(CompileError::new(
                        ErrorCode::BreakOutsideLoop,
                        "break outside of a loop",
                        statement.span,
                    )),
                    None => Err(CompileError::new(
                        ErrorCode::UnknownLoopLabel,
                        format!("No enclosing loop labelled '{key}'"),
                        statement.span,
                    )),
                }
            }
            StatementKind::Continue(target) => {
                let key = target.clone().unwrap_or_default();
                match ctx.continue_labels.get(&key) {
                    Some(label) => {
                        self.emit_jump(ctx, &label.clone());
                        Ok(())
                    }
                    None if key.is_empty() => Err(CompileError::new(
                        ErrorCode::ContinueOutsideLoop,
                        "continue outside of a loop",
                        statement.span,
                    )),
                    None => Err(CompileError::new(
                        ErrorCode::UnknownLoopLabel,
                        format!("No enclosing loop labelled '{key}'"),
                        statement.span,
                    )),
                }
            }
            StatementKind::Return(value) => {
                if let Some(value) = value {
                    if ctx.function.return_type == Type::Word {
                        self.compile_word_to_ax(ctx, value)?;
                    } else {
                        self.compile_expr_to_a(ctx, value)?;
                    }
                }
                self.emit_jump(ctx, function_end);
                Ok(())
            }
            StatementKind::InlineAssembly(lines) => {
                for line in lines {
                    // User-written lines stay pinned no matter what the
                    // tree says.
                    self.emit(line.clone().non_elidable());
                }
                Ok(())
            }
        }
    }

    fn compile_assignment(
        &mut self,
        ctx: &CompilationContext,
        target: &AssignTarget,
        op: AssignOp,
        value: &Expr,
        span: Span,
    ) -> Result<()> {
        match target {
            AssignTarget::Variable(name) => {
                let thing = ctx.resolve(name, span)?;
                let (storage, operand, ty) = match &thing.kind {
                    ThingKind::Variable(ty) => (thing.storage, thing.address_constant(), *ty),
                    ThingKind::ConstantAlias(_) => {
                        return Err(CompileError::new(
                            ErrorCode::CannotAssignToConstant,
                            format!("Cannot assign to constant '{name}'"),
                            span,
                        ))
                    }
                    _ => {
                        return Err(CompileError::new(
                            ErrorCode::TypeMismatch,
                            format!("Cannot assign to '{name}'"),
                            span,
                        ))
                    }
                };

                if ty == Type::Word {
                    return self.compile_word_assignment(ctx, storage, operand, op, value, span);
                }

                match op.binary_op() {
                    None => {
                        self.compile_expr_to_a(ctx, value)?;
                    }
                    Some(binary) => {
                        // x op= v compiles as x = x op v with the load of
                        // x as the left operand.
                        let lhs = Expr::new(ExprKind::Ident(name.clone()), span);
                        let combined = Expr::new(
                            ExprKind::Binary {
                                op: binary,
                                lhs: Box::new(lhs),
                                rhs: Box::new(value.clone()),
                            },
                            span,
                        );
                        self.compile_expr_to_a(ctx, &combined)?;
                    }
                }
                self.emit_access(Opcode::STA, storage, operand, ctx);
                Ok(())
            }
            AssignTarget::Index { array, index } => {
                self.compile_indexed_assignment(ctx, array, index, op, value, span)
            }
        }
    }

    fn compile_word_assignment(
        &mut self,
        ctx: &CompilationContext,
        storage: Storage,
        operand: Constant,
        op: AssignOp,
        value: &Expr,
        span: Span,
    ) -> Result<()> {
        if op != AssignOp::Assign {
            return Err(CompileError::new(
                ErrorCode::ExpressionTooComplex,
                "Compound assignment to word variables is not lowered here",
                span,
            ));
        }
        self.compile_word_to_ax(ctx, value)?;
        self.emit_access(Opcode::STA, storage, operand.clone(), ctx);
        self.emit_access(Opcode::STX, storage.bump(), operand.plus(1), ctx);
        Ok(())
    }

    fn compile_indexed_assignment(
        &mut self,
        ctx: &CompilationContext,
        array: &str,
        index: &Expr,
        op: AssignOp,
        value: &Expr,
        span: Span,
    ) -> Result<()> {
        let thing = ctx.resolve(array, span)?;
        let (operand, length) = match &thing.kind {
            ThingKind::Array { length, .. } => (thing.address_constant(), *length),
            _ => {
                return Err(CompileError::new(
                    ErrorCode::TypeMismatch,
                    format!("'{array}' is not an array"),
                    span,
                ))
            }
        };

        // Constant index: the element is a plain absolute operand.
        if let ExprKind::Number(i) = index.kind {
            let element = operand.plus(i);
            match op.binary_op() {
                None => {
                    self.compile_expr_to_a(ctx, value)?;
                }
                Some(binary) => {
                    let lhs = Expr::new(
                        ExprKind::Index {
                            array: array.to_string(),
                            index: Box::new(Expr::number(i)),
                        },
                        span,
                    );
                    let combined = Expr::new(
                        ExprKind::Binary {
                            op: binary,
                            lhs: Box::new(lhs),
                            rhs: Box::new(value.clone()),
                        },
                        span,
                    );
                    self.compile_expr_to_a(ctx, &combined)?;
                }
            }
            self.emit(AssemblyLine::absolute(Opcode::STA, element));
            return Ok(());
        }

        let index_is_simple = self.simple_operand(ctx, index)?.is_some();
        let value_is_simple = self.simple_operand(ctx, value)?.is_some() || op == AssignOp::Assign;

        if index_is_simple && value_is_simple {
            // Both sides trivial: keep the index live in Y throughout.
            match op.binary_op() {
                None => {
                    self.compile_expr_to_a(ctx, value)?;
                    self.compile_index_to_y(ctx, index, length)?;
                }
                Some(binary) => {
                    self.compile_index_to_y(ctx, index, length)?;
                    self.emit(AssemblyLine::new(
                        Opcode::LDA,
                        AddrMode::AbsoluteY,
                        operand.clone(),
                    ));
                    let rhs = self
                        .simple_operand(ctx, value)?
                        .expect("checked simple above");
                    self.apply_simple_alu(ctx, binary, &rhs, span)?;
                }
            }
            self.emit(AssemblyLine::new(Opcode::STA, AddrMode::AbsoluteY, operand));
            return Ok(());
        }

        // General case: park the index in scratch, compute the value, then
        // reload the index for the final store.
        self.compile_index_to_y(ctx, index, length)?;
        let index_scratch = ctx.scratch(span)?;
        self.emit(AssemblyLine::implied(Opcode::TYA));
        self.emit(AssemblyLine::zero_page(Opcode::STA, index_scratch.clone()));
        let inner = ctx.with_scratch();

        match op.binary_op() {
            None => {
                self.compile_expr_to_a(&inner, value)?;
            }
            Some(binary) => {
                self.compile_expr_to_a(&inner, value)?;
                let value_scratch = inner.scratch(span)?;
                self.emit(AssemblyLine::zero_page(Opcode::STA, value_scratch.clone()));
                self.emit(AssemblyLine::zero_page(Opcode::LDY, index_scratch.clone()));
                self.emit(AssemblyLine::new(
                    Opcode::LDA,
                    AddrMode::AbsoluteY,
                    operand.clone(),
                ));
                let rhs = SimpleOperand::Memory(value_scratch, Storage::ZeroPage(0));
                self.apply_simple_alu(ctx, binary, &rhs, span)?;
                self.emit(AssemblyLine::new(Opcode::STA, AddrMode::AbsoluteY, operand));
                return Ok(());
            }
        }
        self.emit(AssemblyLine::zero_page(Opcode::LDY, index_scratch));
        self.emit(AssemblyLine::new(Opcode::STA, AddrMode::AbsoluteY, operand));
        Ok(())
    }

    /// Apply a compound-assignment operator against a simple right operand,
    /// with the left value already in A.
    fn apply_simple_alu(
        &mut self,
        ctx: &CompilationContext,
        op: crate::ast::BinaryOp,
        rhs: &SimpleOperand,
        span: Span,
    ) -> Result<()> {
        use crate::ast::BinaryOp;
        if op.is_decimal() && !ctx.job.options.decimal_mode {
            return Err(CompileError::new(
                ErrorCode::DecimalModeUnavailable,
                "Decimal arithmetic requires -fdecimal-mode",
                span,
            ));
        }
        match op {
            BinaryOp::Add => {
                self.emit(AssemblyLine::implied(Opcode::CLC));
                rhs.apply(Opcode::ADC, self, ctx);
            }
            BinaryOp::Sub => {
                self.emit(AssemblyLine::implied(Opcode::SEC));
                rhs.apply(Opcode::SBC, self, ctx);
            }
            BinaryOp::And => rhs.apply(Opcode::AND, self, ctx),
            BinaryOp::Or => rhs.apply(Opcode::ORA, self, ctx),
            BinaryOp::Xor => rhs.apply(Opcode::EOR, self, ctx),
            BinaryOp::DecimalAdd => {
                self.emit(AssemblyLine::implied(Opcode::SED));
                self.emit(AssemblyLine::implied(Opcode::CLC));
                rhs.apply(Opcode::ADC, self, ctx);
                self.emit(AssemblyLine::implied(Opcode::CLD));
            }
            BinaryOp::DecimalSub => {
                self.emit(AssemblyLine::implied(Opcode::SED));
                self.emit(AssemblyLine::implied(Opcode::SEC));
                rhs.apply(Opcode::SBC, self, ctx);
                self.emit(AssemblyLine::implied(Opcode::CLD));
            }
            BinaryOp::Shl | BinaryOp::Shr => {
                let shift_op = if op == BinaryOp::Shl {
                    Opcode::ASL
                } else {
                    Opcode::LSR
                };
                match rhs {
                    SimpleOperand::Immediate(c) => {
                        let count = c.eval().unwrap_or(0).clamp(0, 8);
                        for _ in 0..count {
                            self.emit(AssemblyLine::implied(shift_op));
                        }
                    }
                    _ => {
                        return Err(CompileError::new(
                            ErrorCode::ExpressionTooComplex,
                            "Shift count must be constant in compound assignments",
                            span,
                        ))
                    }
                }
            }
            BinaryOp::Mul => {
                match rhs {
                    SimpleOperand::Immediate(c)
                        if c.eval().map(|v| (v as u64).is_power_of_two()) == Some(true) =>
                    {
                        let count = c.eval().unwrap_or(1).trailing_zeros();
                        for _ in 0..count {
                            self.emit(AssemblyLine::implied(Opcode::ASL));
                        }
                    }
                    _ => {
                        self.runtime.mul_u8 = true;
                        match rhs {
                            SimpleOperand::Immediate(c) => {
                                self.emit(AssemblyLine::immediate(Opcode::LDX, c.clone()));
                            }
                            other => other.apply(Opcode::LDX, self, ctx),
                        }
                        self.emit(AssemblyLine::absolute_jump(
                            Opcode::JSR,
                            &Label::new(super::runtime::MUL_U8),
                        ));
                    }
                }
            }
            _ => {
                return Err(CompileError::new(
                    ErrorCode::ExpressionTooComplex,
                    "Operator not supported in compound assignment",
                    span,
                ))
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_for(
        &mut self,
        ctx: &CompilationContext,
        label: Option<&str>,
        variable: &str,
        start: &Expr,
        direction: ForDirection,
        end: &Expr,
        body: &[Statement],
        function_end: &Label,
        span: Span,
    ) -> Result<()> {
        let thing = ctx.resolve(variable, span)?;
        let (storage, operand) = match &thing.kind {
            ThingKind::Variable(Type::Byte) | ThingKind::Variable(Type::SByte) => {
                (thing.storage, thing.address_constant())
            }
            _ => {
                return Err(CompileError::new(
                    ErrorCode::TypeMismatch,
                    format!("Loop variable '{variable}' must be a byte variable"),
                    span,
                ))
            }
        };

        // var = start
        self.compile_expr_to_a(ctx, start)?;
        self.emit_access(Opcode::STA, storage, operand.clone(), ctx);

        let top = ctx.job.labels.next("fo");
        let cont = ctx.job.labels.next("fc");
        let exit = ctx.job.labels.next("fe");
        let inner = ctx.with_loop(label, &exit, &cont);

        let end_operand = self.simple_operand(ctx, end)?;

        let step_op = if direction == ForDirection::DownTo {
            Opcode::DEC
        } else {
            Opcode::INC
        };

        match direction {
            ForDirection::Until | ForDirection::ParallelUntil => {
                // Exclusive bound: test at the top.
                self.emit_label(&top);
                self.emit_access(Opcode::LDA, storage, operand.clone(), ctx);
                self.compare_loop_bound(ctx, &end_operand, end, span)?;
                self.emit(AssemblyLine::relative(Opcode::BEQ, &exit));
                self.compile_statements(&inner, body, function_end)?;
                self.emit_label(&cont);
                self.emit_step(step_op, storage, operand, ctx);
                self.emit_jump(ctx, &top);
            }
            ForDirection::To | ForDirection::ParallelTo | ForDirection::DownTo => {
                // Inclusive bound: test after the body, before stepping, so
                // a bound at the edge of the byte range cannot wrap.
                self.emit_label(&top);
                self.compile_statements(&inner, body, function_end)?;
                self.emit_label(&cont);
                self.emit_access(Opcode::LDA, storage, operand.clone(), ctx);
                self.compare_loop_bound(ctx, &end_operand, end, span)?;
                self.emit(AssemblyLine::relative(Opcode::BEQ, &exit));
                self.emit_step(step_op, storage, operand, ctx);
                self.emit_jump(ctx, &top);
            }
        }
        self.emit_label(&exit);
        Ok(())
    }

    fn compare_loop_bound(
        &mut self,
        ctx: &CompilationContext,
        bound: &Option<SimpleOperand>,
        end: &Expr,
        span: Span,
    ) -> Result<()> {
        match bound {
            Some(operand) => {
                operand.apply(Opcode::CMP, self, ctx);
                Ok(())
            }
            None => {
                // A computed bound is re-evaluated each iteration.
                let scratch = ctx.scratch(span)?;
                self.emit(AssemblyLine::implied(Opcode::PHA));
                let inner = ctx.with_scratch().with_extra_stack(1);
                self.compile_expr_to_a(&inner, end)?;
                self.emit(AssemblyLine::zero_page(Opcode::STA, scratch.clone()));
                self.emit(AssemblyLine::implied(Opcode::PLA));
                self.emit(AssemblyLine::zero_page(Opcode::CMP, scratch));
                Ok(())
            }
        }
    }

    fn emit_step(
        &mut self,
        step: Opcode,
        storage: Storage,
        operand: Constant,
        ctx: &CompilationContext,
    ) {
        match storage {
            Storage::ZeroPage(_) => self.emit(AssemblyLine::zero_page(step, operand)),
            _ => self.emit_access(step, storage, operand, ctx),
        }
    }
}
