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

//! Lowering from the checked syntax tree to pseudo-assembly.
//!
//! Each function body becomes one flat `Vec<AssemblyLine>`:
//! - a non-elidable entry label and, for interrupt handlers, the register
//!   save prologue
//! - software stack frame setup when the function has stack variables
//! - the lowered statements
//! - the epilogue ending in `RTS`/`RTI`
//!
//! Register targeting is byte-first: byte values are computed in A, words
//! in the A(lo)/X(hi) pair. Complex subexpressions spill into the
//! zero-page pseudoregister, one byte per nesting level.

mod expressions;
pub mod runtime;
mod statements;

pub use runtime::RuntimeUse;

use crate::asm::{AddrMode, AssemblyLine, Cpu, Label, Opcode};
use crate::ast::{FunctionDef, Type};
use crate::constant::Constant;
use crate::env::{Environment, JobContext, Storage, ThingKind};
use crate::error::{CompileError, ErrorCode, Result, Span};
use std::collections::HashMap;

/// Where an expression result should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegTarget {
    /// Byte in the accumulator.
    A,
    /// Byte in X.
    X,
    /// Byte in Y.
    Y,
    /// Word: low byte in A, high byte in X.
    AX,
}

/// Per-function compilation state.
///
/// Pure value semantics: every mutator returns a new copy, so nested
/// scopes (loops, subexpressions) cannot leak state back out.
#[derive(Clone)]
pub struct CompilationContext<'a> {
    pub env: &'a Environment,
    pub job: &'a JobContext,
    pub cpu: Cpu,
    pub function: &'a FunctionDef,
    /// Bytes pushed within the current statement, shifting stack-relative
    /// operands.
    pub extra_stack_offset: u8,
    /// Pseudoregister bytes consumed by enclosing subexpressions.
    pub scratch_depth: u8,
    /// Break targets by loop label; the empty key is the innermost loop.
    pub break_labels: HashMap<String, Label>,
    /// Continue targets by loop label; the empty key is the innermost loop.
    pub continue_labels: HashMap<String, Label>,
    /// Suppress array bounds checks in this context.
    pub never_check_array_bounds: bool,
    /// Size of the software stack frame.
    pub stack_variables_size: u8,
}

impl<'a> CompilationContext<'a> {
    pub fn new(
        env: &'a Environment,
        job: &'a JobContext,
        cpu: Cpu,
        function: &'a FunctionDef,
    ) -> Self {
        let stack_variables_size = if function.flags.reentrant {
            stack_frame_size(function)
        } else {
            0
        };
        Self {
            env,
            job,
            cpu,
            function,
            extra_stack_offset: 0,
            scratch_depth: 0,
            break_labels: HashMap::new(),
            continue_labels: HashMap::new(),
            never_check_array_bounds: !job.options.bounds_checking,
            stack_variables_size,
        }
    }

    /// A copy with loop labels for `break`/`continue` registered.
    pub fn with_loop(&self, label: Option<&str>, break_to: &Label, continue_to: &Label) -> Self {
        let mut ctx = self.clone();
        ctx.break_labels.insert(String::new(), break_to.clone());
        ctx.continue_labels
            .insert(String::new(), continue_to.clone());
        if let Some(name) = label {
            ctx.break_labels.insert(name.to_string(), break_to.clone());
            ctx.continue_labels
                .insert(name.to_string(), continue_to.clone());
        }
        ctx
    }

    /// A copy with one more pseudoregister byte claimed.
    pub fn with_scratch(&self) -> Self {
        let mut ctx = self.clone();
        ctx.scratch_depth += 1;
        ctx
    }

    /// A copy accounting for `bytes` extra pushes on the hardware stack.
    pub fn with_extra_stack(&self, bytes: u8) -> Self {
        let mut ctx = self.clone();
        ctx.extra_stack_offset += bytes;
        ctx
    }

    /// The pseudoregister byte for the current nesting depth.
    pub fn scratch(&self, span: Span) -> Result<Constant> {
        if self.scratch_depth >= self.env.pseudoreg_size {
            return Err(CompileError::new(
                ErrorCode::ExpressionTooComplex,
                "Expression too deeply nested for the zero-page pseudoregister",
                span,
            )
            .with_hint("raise -fzp-register or split the expression"));
        }
        Ok(Constant::num(
            (self.env.pseudoreg_base + self.scratch_depth) as i64,
        ))
    }

    /// Resolve a name as seen from this function.
    pub fn resolve(&self, name: &str, span: Span) -> Result<&'a crate::env::ThingInMemory> {
        self.env.resolve_in(&self.function.name, name).ok_or_else(|| {
            CompileError::new(
                ErrorCode::UndefinedSymbol,
                format!("Undefined symbol '{name}'"),
                span,
            )
        })
    }
}

/// Emits one function's worth of assembly.
pub struct FunctionCompiler {
    pub lines: Vec<AssemblyLine>,
    pub runtime: RuntimeUse,
}

impl FunctionCompiler {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            runtime: RuntimeUse::default(),
        }
    }

    pub fn emit(&mut self, line: AssemblyLine) {
        self.lines.push(line);
    }

    pub fn emit_label(&mut self, label: &Label) {
        self.lines.push(AssemblyLine::label(label));
    }

    /// Unconditional jump, using the short form where the CPU has one.
    pub fn emit_jump(&mut self, ctx: &CompilationContext, target: &Label) {
        if ctx.cpu.has_cmos_ops() {
            self.emit(AssemblyLine::relative(Opcode::BRA, target));
        } else {
            self.emit(AssemblyLine::absolute_jump(Opcode::JMP, target));
        }
    }

    /// Load a thing's storage into the operand of `opcode`, choosing the
    /// zero-page form when the address allows it.
    pub fn emit_access(
        &mut self,
        opcode: Opcode,
        storage: Storage,
        operand: Constant,
        ctx: &CompilationContext,
    ) {
        match storage {
            Storage::ZeroPage(_) => self.emit(AssemblyLine::zero_page(opcode, operand)),
            Storage::Absolute(_) | Storage::Unallocated => {
                self.emit(AssemblyLine::absolute(opcode, operand))
            }
            Storage::Stack(offset) => {
                // TSX; op $0101+offset+extra,X
                self.emit(AssemblyLine::implied(Opcode::TSX));
                self.emit(AssemblyLine::new(
                    opcode,
                    AddrMode::AbsoluteX,
                    Constant::num(0x0101 + offset as i64 + ctx.extra_stack_offset as i64),
                ));
            }
        }
    }
}

/// Compile one function to pseudo-assembly.
pub fn compile_function(
    function: &FunctionDef,
    env: &Environment,
    job: &JobContext,
    cpu: Cpu,
) -> Result<(Vec<AssemblyLine>, RuntimeUse)> {
    let mut fc = FunctionCompiler::new();
    let ctx = CompilationContext::new(env, job, cpu, function);

    // Entry label, pinned.
    fc.emit(AssemblyLine::label(&Label::new(function.name.clone())).non_elidable());

    if let Some(asm_body) = &function.asm_body {
        // User assembly is emitted verbatim; every line stays pinned.
        for line in asm_body {
            fc.emit(line.clone());
        }
        return Ok((fc.lines, fc.runtime));
    }

    emit_prologue(&mut fc, &ctx);

    let end_label = job.labels.next("fnend");
    fc.compile_statements(&ctx, &function.body, &end_label)?;

    fc.emit_label(&end_label);
    emit_epilogue(&mut fc, &ctx);

    Ok((fc.lines, fc.runtime))
}

fn emit_prologue(fc: &mut FunctionCompiler, ctx: &CompilationContext) {
    let flags = ctx.function.flags;
    if flags.interrupt {
        // Save caller state: A, then X and Y, and force binary mode.
        if ctx.cpu.has_cmos_ops() {
            fc.emit(AssemblyLine::implied(Opcode::PHA).non_elidable());
            fc.emit(AssemblyLine::implied(Opcode::PHX).non_elidable());
            fc.emit(AssemblyLine::implied(Opcode::PHY).non_elidable());
        } else {
            fc.emit(AssemblyLine::implied(Opcode::PHA).non_elidable());
            fc.emit(AssemblyLine::implied(Opcode::TXA).non_elidable());
            fc.emit(AssemblyLine::implied(Opcode::PHA).non_elidable());
            fc.emit(AssemblyLine::implied(Opcode::TYA).non_elidable());
            fc.emit(AssemblyLine::implied(Opcode::PHA).non_elidable());
        }
        fc.emit(AssemblyLine::implied(Opcode::CLD).non_elidable());
    }

    let frame = ctx.stack_variables_size;
    if frame > 0 {
        if ctx.job.options.illegals && frame > 4 {
            // Three cycles cheaper per byte beyond four pushes.
            fc.emit(AssemblyLine::implied(Opcode::TSX));
            fc.emit(AssemblyLine::immediate(Opcode::LDA, Constant::num(0xFF)));
            fc.emit(AssemblyLine::immediate(
                Opcode::SBX,
                Constant::num(frame as i64),
            ));
            fc.emit(AssemblyLine::implied(Opcode::TXS));
        } else {
            for _ in 0..frame {
                fc.emit(AssemblyLine::implied(Opcode::PHA));
            }
        }
    }
}

fn emit_epilogue(fc: &mut FunctionCompiler, ctx: &CompilationContext) {
    let flags = ctx.function.flags;
    let frame = ctx.stack_variables_size;
    if frame > 0 {
        let preserve_result = ctx.function.return_type != Type::Void;
        if preserve_result {
            fc.emit(AssemblyLine::implied(Opcode::TAY));
        }
        for _ in 0..frame {
            fc.emit(AssemblyLine::implied(Opcode::PLA));
        }
        if preserve_result {
            fc.emit(AssemblyLine::implied(Opcode::TYA));
        }
    }

    if flags.interrupt {
        if ctx.cpu.has_cmos_ops() {
            fc.emit(AssemblyLine::implied(Opcode::PLY).non_elidable());
            fc.emit(AssemblyLine::implied(Opcode::PLX).non_elidable());
            fc.emit(AssemblyLine::implied(Opcode::PLA).non_elidable());
        } else {
            fc.emit(AssemblyLine::implied(Opcode::PLA).non_elidable());
            fc.emit(AssemblyLine::implied(Opcode::TAY).non_elidable());
            fc.emit(AssemblyLine::implied(Opcode::PLA).non_elidable());
            fc.emit(AssemblyLine::implied(Opcode::TAX).non_elidable());
            fc.emit(AssemblyLine::implied(Opcode::PLA).non_elidable());
        }
        fc.emit(AssemblyLine::implied(Opcode::RTI).non_elidable());
    } else {
        // Elidable on purpose: tail-call conversion may fold a preceding
        // JSR into this return.
        fc.emit(AssemblyLine::implied(Opcode::RTS));
    }
}

/// Bytes of stack frame a reentrant function needs for its parameters
/// and locals.
pub fn stack_frame_size(function: &FunctionDef) -> u8 {
    use crate::ast::{Statement, StatementKind};
    fn walk(statements: &[Statement], total: &mut u16) {
        for statement in statements {
            match &statement.kind {
                StatementKind::LocalVariable(v) => *total += v.ty.size(),
                StatementKind::If {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    walk(then_branch, total);
                    walk(else_branch, total);
                }
                StatementKind::While { body, .. }
                | StatementKind::DoWhile { body, .. }
                | StatementKind::For { body, .. } => walk(body, total),
                _ => {}
            }
        }
    }
    let mut total: u16 = function.params.iter().map(|p| p.ty.size()).sum();
    walk(&function.body, &mut total);
    total.min(255) as u8
}

/// Classification of operands reachable in one addressing mode.
#[derive(Debug, Clone)]
pub enum SimpleOperand {
    /// An immediate value.
    Immediate(Constant),
    /// A directly addressable byte in memory.
    Memory(Constant, Storage),
}

impl SimpleOperand {
    /// Emit `opcode` against this operand.
    pub fn apply(&self, opcode: Opcode, fc: &mut FunctionCompiler, ctx: &CompilationContext) {
        match self {
            SimpleOperand::Immediate(c) => {
                fc.emit(AssemblyLine::immediate(opcode, c.clone()));
            }
            SimpleOperand::Memory(c, storage) => {
                fc.emit_access(opcode, *storage, c.clone(), ctx);
            }
        }
    }
}

/// Helpers shared by the statement and expression lowering.
impl FunctionCompiler {
    /// Classify an expression as a one-instruction operand, if possible.
    pub fn simple_operand(
        &self,
        ctx: &CompilationContext,
        expr: &crate::ast::Expr,
    ) -> Result<Option<SimpleOperand>> {
        use crate::ast::ExprKind;
        match &expr.kind {
            ExprKind::Number(value) => Ok(Some(SimpleOperand::Immediate(Constant::num(*value)))),
            ExprKind::Ident(name) => {
                let thing = ctx.resolve(name, expr.span)?;
                match &thing.kind {
                    ThingKind::ConstantAlias(c) => Ok(Some(SimpleOperand::Immediate(c.clone()))),
                    ThingKind::Variable(ty) if ty.size() == 1 => Ok(Some(SimpleOperand::Memory(
                        thing.address_constant(),
                        thing.storage,
                    ))),
                    _ => Ok(None),
                }
            }
            ExprKind::Index { array, index } => {
                let thing = ctx.resolve(array, expr.span)?;
                if !matches!(thing.kind, ThingKind::Array { .. }) {
                    return Ok(None);
                }
                // Constant index: plain absolute access.
                if let crate::ast::ExprKind::Number(i) = index.kind {
                    let operand = thing.address_constant().plus(i);
                    return Ok(Some(SimpleOperand::Memory(operand, Storage::Unallocated)));
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}
