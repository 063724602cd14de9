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

//! Name resolution and environment construction.
//!
//! This pass turns the parsed program into the [`Environment`] the code
//! generator consumes:
//! - constants are folded to values
//! - variables, arrays and function locals get static storage, zero page
//!   first, then high memory in the variables' bank
//! - functions get [`ThingInMemory`] records placed later by the assembler
//! - the call graph is collected for reachability
//!
//! Function locals and parameters are statically allocated under the
//! qualified name `function.local`; reentrancy is the exception, not the
//! rule, on a CPU without cheap stack addressing.

use crate::ast::*;
use crate::constant::{Constant, MathOperator};
use crate::env::{Environment, JobContext, Storage, ThingInMemory, ThingKind};
use crate::error::{CompileError, ErrorCode, Result, Span};
use crate::platform::Platform;
use std::collections::{HashMap, HashSet};

/// First zero-page address handed to user variables.
const ZP_POOL_START: u8 = 0x02;
/// One past the last zero-page address handed to user variables.
const ZP_POOL_END: u8 = 0x90;

/// The call graph, used for dead-function elimination.
#[derive(Debug, Default)]
pub struct CallGraph {
    edges: HashMap<String, Vec<String>>,
}

impl CallGraph {
    fn add_edge(&mut self, caller: &str, callee: &str) {
        self.edges
            .entry(caller.to_string())
            .or_default()
            .push(callee.to_string());
    }

    /// All functions reachable from the entry points.
    pub fn reachable(&self, entry_points: &[String]) -> HashSet<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut work: Vec<String> = entry_points.to_vec();
        while let Some(name) = work.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(callees) = self.edges.get(&name) {
                work.extend(callees.iter().cloned());
            }
        }
        seen
    }

    /// Direct callees of one function.
    pub fn callees(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Everything resolution produces.
#[derive(Debug)]
pub struct Analysis {
    pub env: Environment,
    pub call_graph: CallGraph,
    /// Top-level variable initializers, run at the head of the entry point.
    pub startup: Vec<(String, Expr)>,
    /// Lowest variable address per bank; code must stay below this.
    pub var_floor: HashMap<String, u16>,
}

struct Allocator {
    zp_cursor: u8,
    /// Grows downward from the bank end.
    himem_cursor: u16,
    bank: String,
}

impl Allocator {
    fn alloc(&mut self, size: u16, span: Span) -> Result<Storage> {
        if size == 1 && self.zp_cursor as u16 + 1 <= ZP_POOL_END as u16 {
            let address = self.zp_cursor;
            self.zp_cursor += 1;
            return Ok(Storage::ZeroPage(address));
        }
        if size <= 2 && (self.zp_cursor as u16) + size <= ZP_POOL_END as u16 {
            let address = self.zp_cursor;
            self.zp_cursor += size as u8;
            return Ok(Storage::ZeroPage(address));
        }
        let address = self.himem_cursor.checked_sub(size).ok_or_else(|| {
            CompileError::new(ErrorCode::BankOverflow, "Out of variable memory", span)
        })?;
        self.himem_cursor = address;
        Ok(Storage::Absolute(address))
    }
}

/// Analyze a program against a platform.
pub fn analyze(program: &Program, platform: &Platform, job: &JobContext) -> Result<Analysis> {
    let default_bank = platform.banks.first().expect("platform has banks");
    let zp_register = job.options.zp_register.unwrap_or(platform.zp_register);
    let mut env = Environment::new(ZP_POOL_START, zp_register);
    let mut alloc = Allocator {
        zp_cursor: ZP_POOL_START + zp_register,
        himem_cursor: default_bank.end + 1,
        bank: default_bank.name.clone(),
    };

    // Pseudoregister scratch space is a thing like any other, so the
    // optimizer can reason about aliasing against it by name.
    if zp_register > 0 {
        env.define(
            ThingInMemory {
                name: "__reg".to_string(),
                kind: ThingKind::Variable(Type::Byte),
                bank: alloc.bank.clone(),
                storage: Storage::ZeroPage(ZP_POOL_START),
                size: zp_register as u16,
            },
            Span::none(),
        )?;
    }

    let mut startup = Vec::new();

    // Pass 1: define everything.
    for declaration in &program.declarations {
        match declaration {
            Declaration::Const(c) => {
                let value = const_value(&c.value, &env)?;
                let constant = Constant::num(value);
                if !constant.fits_into(c.ty.size() as u8) {
                    return Err(CompileError::new(
                        ErrorCode::ConstantValueOutOfRange,
                        format!("Constant '{}' does not fit in a {}", c.name, c.ty),
                        c.span,
                    ));
                }
                env.define(
                    ThingInMemory {
                        name: c.name.clone(),
                        kind: ThingKind::ConstantAlias(constant),
                        bank: alloc.bank.clone(),
                        storage: Storage::Unallocated,
                        size: c.ty.size(),
                    },
                    c.span,
                )?;
            }
            Declaration::Variable(v) => {
                let storage = match &v.address {
                    Some(addr) => fixed_storage(addr, &env)?,
                    None => alloc.alloc(v.ty.size(), v.span)?,
                };
                env.define(
                    ThingInMemory {
                        name: v.name.clone(),
                        kind: ThingKind::Variable(v.ty),
                        bank: alloc.bank.clone(),
                        storage,
                        size: v.ty.size(),
                    },
                    v.span,
                )?;
                if let Some(init) = &v.initializer {
                    startup.push((v.name.clone(), init.clone()));
                }
            }
            Declaration::Array(a) => {
                let length = const_value(&a.length, &env)?;
                if !(1..=0x10000).contains(&length) {
                    return Err(CompileError::new(
                        ErrorCode::ArraySizeMustBePositive,
                        format!("Array '{}' must have between 1 and 65536 elements", a.name),
                        a.span,
                    ));
                }
                let length = length as u16;
                let contents = array_contents(a, length, &env, job)?;
                let storage = match (&a.address, &contents) {
                    (Some(_), Some(_)) => {
                        return Err(CompileError::new(
                            ErrorCode::ConflictingModifiers,
                            "Initialized arrays cannot have a fixed address",
                            a.span,
                        ))
                    }
                    (Some(addr), None) => fixed_storage(addr, &env)?,
                    // Initialized arrays are placed in the image by the
                    // assembler; blank ones live with the variables.
                    (None, Some(_)) => Storage::Unallocated,
                    (None, None) => alloc.alloc(length, a.span)?,
                };
                env.define(
                    ThingInMemory {
                        name: a.name.clone(),
                        kind: ThingKind::Array { length, contents },
                        bank: alloc.bank.clone(),
                        storage,
                        size: length,
                    },
                    a.span,
                )?;
            }
            Declaration::Function(f) => {
                if let Some(conflict) = f.flags.conflict() {
                    return Err(CompileError::new(
                        ErrorCode::ConflictingModifiers,
                        conflict,
                        f.span,
                    ));
                }
                let mut param_names = Vec::new();
                let mut stack_offset: u16 = 0;
                for param in &f.params {
                    let qualified = format!("{}.{}", f.name, param.name);
                    if param.convention == ParamPassingConvention::ByVariable {
                        let storage = if f.flags.reentrant {
                            let s = Storage::Stack(stack_offset as u8);
                            stack_offset += param.ty.size();
                            s
                        } else {
                            alloc.alloc(param.ty.size(), f.span)?
                        };
                        env.define(
                            ThingInMemory {
                                name: qualified.clone(),
                                kind: ThingKind::Variable(param.ty),
                                bank: alloc.bank.clone(),
                                storage,
                                size: param.ty.size(),
                            },
                            f.span,
                        )?;
                    }
                    param_names.push(qualified);
                }
                for local in collect_locals(&f.body) {
                    let qualified = format!("{}.{}", f.name, local.name);
                    let storage = if f.flags.reentrant {
                        let s = Storage::Stack(stack_offset as u8);
                        stack_offset += local.ty.size();
                        s
                    } else {
                        alloc.alloc(local.ty.size(), local.span)?
                    };
                    env.define(
                        ThingInMemory {
                            name: qualified,
                            kind: ThingKind::Variable(local.ty),
                            bank: alloc.bank.clone(),
                            storage,
                            size: local.ty.size(),
                        },
                        local.span,
                    )?;
                }
                env.define(
                    ThingInMemory {
                        name: f.name.clone(),
                        kind: ThingKind::Function {
                            return_type: f.return_type,
                            params: param_names,
                            flags: f.flags,
                        },
                        bank: alloc.bank.clone(),
                        storage: Storage::Unallocated,
                        size: 0,
                    },
                    f.span,
                )?;
                if f.flags.interrupt || f.flags.kernal_interrupt {
                    env.entry_points.push(f.name.clone());
                }
            }
        }
    }

    if env.get("main").is_some() {
        env.entry_points.insert(0, "main".to_string());
    }

    // Pass 2: check bodies and build the call graph.
    let mut call_graph = CallGraph::default();
    for declaration in &program.declarations {
        if let Declaration::Function(f) = declaration {
            if let Some(asm_body) = &f.asm_body {
                for line in asm_body {
                    if line.opcode == crate::asm::Opcode::JSR {
                        if let Constant::MemoryAddress { name } = &line.operand {
                            if matches!(
                                env.get(name).map(|t| &t.kind),
                                Some(ThingKind::Function { .. })
                            ) {
                                call_graph.add_edge(&f.name, name);
                            }
                        }
                    }
                }
            } else {
                check_statements(&f.body, f, &env, &mut call_graph)?;
            }
        }
    }

    for (name, init) in &startup {
        let ty = expr_type(init, "", &env)?;
        let target = env.lookup(name, init.span)?;
        check_assignable(ty, target.value_type().unwrap_or(Type::Byte), init.span)?;
    }

    job.logger.debug(&format!(
        "resolved {} things, zero page used up to ${:02X}",
        env.things().count(),
        alloc.zp_cursor
    ));

    let mut var_floor = HashMap::new();
    var_floor.insert(alloc.bank.clone(), alloc.himem_cursor);

    Ok(Analysis {
        env,
        call_graph,
        startup,
        var_floor,
    })
}

fn fixed_storage(addr: &Expr, env: &Environment) -> Result<Storage> {
    let value = const_value(addr, env)?;
    if !(0..=0xFFFF).contains(&value) {
        return Err(CompileError::new(
            ErrorCode::ConstantValueOutOfRange,
            "Address must fit in 16 bits",
            addr.span,
        ));
    }
    Ok(if value < 0x100 {
        Storage::ZeroPage(value as u8)
    } else {
        Storage::Absolute(value as u16)
    })
}

fn array_contents(
    a: &ArrayDecl,
    length: u16,
    env: &Environment,
    job: &JobContext,
) -> Result<Option<Vec<u8>>> {
    match &a.contents {
        ArrayContents::Blank => Ok(None),
        ArrayContents::Literal(elements) => {
            if elements.len() != length as usize {
                return Err(CompileError::new(
                    ErrorCode::ConstantValueOutOfRange,
                    format!(
                        "Array '{}' declares {} elements but initializes {}",
                        a.name,
                        length,
                        elements.len()
                    ),
                    a.span,
                ));
            }
            let mut bytes = Vec::with_capacity(elements.len());
            for element in elements {
                let value = const_value(element, env)?;
                if !(0..=255).contains(&value) {
                    return Err(CompileError::new(
                        ErrorCode::ConstantValueOutOfRange,
                        format!("Array element {value} does not fit in a byte"),
                        element.span,
                    ));
                }
                bytes.push(value as u8);
            }
            Ok(Some(bytes))
        }
        ArrayContents::Text(text, encoding) => {
            let mut bytes = Vec::with_capacity(text.chars().count());
            for c in text.chars() {
                let b = encoding.encode(c, job.options.lenient_encoding).ok_or_else(|| {
                    CompileError::new(
                        ErrorCode::UnencodableCharacter,
                        format!("Character '{c}' has no encoding here"),
                        a.span,
                    )
                })?;
                bytes.push(b);
            }
            if bytes.len() != length as usize {
                return Err(CompileError::new(
                    ErrorCode::ConstantValueOutOfRange,
                    format!(
                        "Array '{}' declares {} elements but its text has {}",
                        a.name,
                        length,
                        bytes.len()
                    ),
                    a.span,
                ));
            }
            Ok(Some(bytes))
        }
    }
}

/// Collect local declarations from a statement tree.
fn collect_locals(statements: &[Statement]) -> Vec<&VarDecl> {
    let mut locals = Vec::new();
    fn walk<'a>(statements: &'a [Statement], out: &mut Vec<&'a VarDecl>) {
        for statement in statements {
            match &statement.kind {
                StatementKind::LocalVariable(v) => out.push(v),
                StatementKind::If {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    walk(then_branch, out);
                    walk(else_branch, out);
                }
                StatementKind::While { body, .. }
                | StatementKind::DoWhile { body, .. }
                | StatementKind::For { body, .. } => walk(body, out),
                _ => {}
            }
        }
    }
    walk(statements, &mut locals);
    locals
}

/// Evaluate a compile-time constant expression.
pub fn const_value(expr: &Expr, env: &Environment) -> Result<i64> {
    match &expr.kind {
        ExprKind::Number(value) => Ok(*value),
        ExprKind::Ident(name) => match env.get(name).map(|t| &t.kind) {
            Some(ThingKind::ConstantAlias(c)) => c.eval().ok_or_else(|| {
                CompileError::new(
                    ErrorCode::ConstantExpressionRequired,
                    format!("'{name}' is not a closed constant"),
                    expr.span,
                )
            }),
            _ => Err(CompileError::new(
                ErrorCode::ConstantExpressionRequired,
                format!("'{name}' is not a constant"),
                expr.span,
            )),
        },
        ExprKind::Unary { op, expr: inner } => {
            let v = const_value(inner, env)?;
            Ok(match op {
                UnaryOp::Neg => -v,
                UnaryOp::Not => !v & 0xFF,
                UnaryOp::Lo => v & 0xFF,
                UnaryOp::Hi => (v >> 8) & 0xFF,
            })
        }
        ExprKind::Join { hi, lo } => {
            let h = const_value(hi, env)?;
            let l = const_value(lo, env)?;
            Ok(((h & 0xFF) << 8) | (l & 0xFF))
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let operator = match op {
                BinaryOp::Add => MathOperator::Plus,
                BinaryOp::Sub => MathOperator::Minus,
                BinaryOp::Mul => MathOperator::Times,
                BinaryOp::And => MathOperator::And,
                BinaryOp::Or => MathOperator::Or,
                BinaryOp::Xor => MathOperator::Exor,
                BinaryOp::Shl => MathOperator::Shl,
                BinaryOp::Shr => MathOperator::Shr,
                BinaryOp::Shr9 => MathOperator::Shr9,
                BinaryOp::DecimalAdd => MathOperator::DecimalPlus,
                BinaryOp::DecimalSub => MathOperator::DecimalMinus,
                BinaryOp::DecimalMul => MathOperator::DecimalTimes,
                BinaryOp::DecimalShl => MathOperator::DecimalShl,
                BinaryOp::DecimalShr => MathOperator::DecimalShr,
                _ => {
                    return Err(CompileError::new(
                        ErrorCode::ConstantExpressionRequired,
                        "Operator not allowed in constant expressions",
                        expr.span,
                    ))
                }
            };
            let l = const_value(lhs, env)?;
            let r = const_value(rhs, env)?;
            let tree = Constant::Compound {
                op: operator,
                lhs: Box::new(Constant::num(l)),
                rhs: Box::new(Constant::num(r)),
            };
            tree.eval().ok_or_else(|| {
                CompileError::new(
                    ErrorCode::ConstantExpressionRequired,
                    "Constant expression could not be evaluated",
                    expr.span,
                )
            })
        }
        _ => Err(CompileError::new(
            ErrorCode::ConstantExpressionRequired,
            "Expected a constant expression",
            expr.span,
        )),
    }
}

/// Infer the type of an expression inside `func`.
pub fn expr_type(expr: &Expr, func: &str, env: &Environment) -> Result<Type> {
    match &expr.kind {
        ExprKind::Number(value) => Ok(if (0..=255).contains(value) {
            Type::Byte
        } else {
            Type::Word
        }),
        ExprKind::Ident(name) => {
            let thing = resolve(func, name, env, expr.span)?;
            match &thing.kind {
                ThingKind::Variable(ty) => Ok(*ty),
                ThingKind::Array { .. } => Ok(Type::Word),
                ThingKind::ConstantAlias(c) => Ok(if c.fits_into(1) {
                    Type::Byte
                } else {
                    Type::Word
                }),
                ThingKind::Function { .. } => Err(CompileError::new(
                    ErrorCode::TypeMismatch,
                    format!("'{name}' is a function, not a value"),
                    expr.span,
                )),
            }
        }
        ExprKind::Index { array, index } => {
            let thing = resolve(func, array, env, expr.span)?;
            if !matches!(thing.kind, ThingKind::Array { .. }) {
                return Err(CompileError::new(
                    ErrorCode::TypeMismatch,
                    format!("'{array}' is not an array"),
                    expr.span,
                ));
            }
            expr_type(index, func, env)?;
            Ok(Type::Byte)
        }
        ExprKind::Call { name, args } => {
            let thing = resolve(func, name, env, expr.span)?;
            match &thing.kind {
                ThingKind::Function {
                    return_type,
                    params,
                    ..
                } => {
                    if args.len() != params.len() {
                        return Err(CompileError::new(
                            ErrorCode::WrongNumberOfArguments,
                            format!(
                                "'{name}' takes {} argument(s), {} given",
                                params.len(),
                                args.len()
                            ),
                            expr.span,
                        ));
                    }
                    for arg in args {
                        expr_type(arg, func, env)?;
                    }
                    Ok(*return_type)
                }
                _ => Err(CompileError::new(
                    ErrorCode::TypeMismatch,
                    format!("'{name}' is not a function"),
                    expr.span,
                )),
            }
        }
        ExprKind::Unary { op, expr: inner } => {
            let inner_ty = expr_type(inner, func, env)?;
            Ok(match op {
                UnaryOp::Lo | UnaryOp::Hi => Type::Byte,
                UnaryOp::Neg | UnaryOp::Not => inner_ty,
            })
        }
        ExprKind::Join { hi, lo } => {
            expr_type(hi, func, env)?;
            expr_type(lo, func, env)?;
            Ok(Type::Word)
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let lt = expr_type(lhs, func, env)?;
            let rt = expr_type(rhs, func, env)?;
            if op.is_comparison() || matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::LogicalXor) {
                Ok(Type::Byte)
            } else if lt == Type::Word || rt == Type::Word {
                Ok(Type::Word)
            } else {
                Ok(Type::Byte)
            }
        }
    }
}

fn resolve<'e>(
    func: &str,
    name: &str,
    env: &'e Environment,
    span: Span,
) -> Result<&'e ThingInMemory> {
    env.resolve_in(func, name).ok_or_else(|| {
        CompileError::new(
            ErrorCode::UndefinedSymbol,
            format!("Undefined symbol '{name}'"),
            span,
        )
    })
}

fn check_assignable(value: Type, target: Type, span: Span) -> Result<()> {
    let ok = match (value, target) {
        (Type::Void, _) => false,
        (_, Type::Void) => false,
        (Type::Word, Type::Byte | Type::SByte) => false,
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(CompileError::new(
            ErrorCode::TypeMismatch,
            format!("Cannot assign a {value} to a {target}"),
            span,
        ))
    }
}

fn check_statements(
    statements: &[Statement],
    f: &FunctionDef,
    env: &Environment,
    call_graph: &mut CallGraph,
) -> Result<()> {
    for statement in statements {
        match &statement.kind {
            StatementKind::LocalVariable(v) => {
                if let Some(init) = &v.initializer {
                    let ty = expr_type(init, &f.name, env)?;
                    check_assignable(ty, v.ty, v.span)?;
                    collect_calls(init, &f.name, env, call_graph);
                }
            }
            StatementKind::Assignment { target, value, op } => {
                let value_ty = expr_type(value, &f.name, env)?;
                let target_ty = match target {
                    AssignTarget::Variable(name) => {
                        let thing = resolve(&f.name, name, env, statement.span)?;
                        match &thing.kind {
                            ThingKind::Variable(ty) => *ty,
                            ThingKind::ConstantAlias(_) => {
                                return Err(CompileError::new(
                                    ErrorCode::CannotAssignToConstant,
                                    format!("Cannot assign to constant '{name}'"),
                                    statement.span,
                                ))
                            }
                            _ => {
                                return Err(CompileError::new(
                                    ErrorCode::TypeMismatch,
                                    format!("Cannot assign to '{name}'"),
                                    statement.span,
                                ))
                            }
                        }
                    }
                    AssignTarget::Index { array, index } => {
                        let thing = resolve(&f.name, array, env, statement.span)?;
                        if !matches!(thing.kind, ThingKind::Array { .. }) {
                            return Err(CompileError::new(
                                ErrorCode::TypeMismatch,
                                format!("'{array}' is not an array"),
                                statement.span,
                            ));
                        }
                        expr_type(index, &f.name, env)?;
                        collect_calls(index, &f.name, env, call_graph);
                        Type::Byte
                    }
                };
                // Compound shifts take a byte count on the right.
                if op.binary_op().is_none() {
                    check_assignable(value_ty, target_ty, statement.span)?;
                }
                collect_calls(value, &f.name, env, call_graph);
            }
            StatementKind::Expression(e) => {
                expr_type(e, &f.name, env)?;
                collect_calls(e, &f.name, env, call_graph);
            }
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                expr_type(condition, &f.name, env)?;
                collect_calls(condition, &f.name, env, call_graph);
                check_statements(then_branch, f, env, call_graph)?;
                check_statements(else_branch, f, env, call_graph)?;
            }
            StatementKind::While {
                condition, body, ..
            } => {
                expr_type(condition, &f.name, env)?;
                collect_calls(condition, &f.name, env, call_graph);
                check_statements(body, f, env, call_graph)?;
            }
            StatementKind::DoWhile {
                body, condition, ..
            } => {
                check_statements(body, f, env, call_graph)?;
                expr_type(condition, &f.name, env)?;
                collect_calls(condition, &f.name, env, call_graph);
            }
            StatementKind::For {
                variable,
                start,
                end,
                body,
                ..
            } => {
                resolve(&f.name, variable, env, statement.span)?;
                expr_type(start, &f.name, env)?;
                expr_type(end, &f.name, env)?;
                collect_calls(start, &f.name, env, call_graph);
                collect_calls(end, &f.name, env, call_graph);
                check_statements(body, f, env, call_graph)?;
            }
            StatementKind::Break(_) | StatementKind::Continue(_) => {}
            StatementKind::Return(value) => {
                if let Some(value) = value {
                    let ty = expr_type(value, &f.name, env)?;
                    if f.return_type == Type::Void {
                        return Err(CompileError::new(
                            ErrorCode::TypeMismatch,
                            "Cannot return a value from a void function",
                            statement.span,
                        ));
                    }
                    check_assignable(ty, f.return_type, statement.span)?;
                    collect_calls(value, &f.name, env, call_graph);
                } else if f.return_type != Type::Void {
                    return Err(CompileError::new(
                        ErrorCode::TypeMismatch,
                        "Missing return value",
                        statement.span,
                    ));
                }
            }
            StatementKind::InlineAssembly(lines) => {
                for line in lines {
                    if line.opcode == crate::asm::Opcode::JSR {
                        if let Constant::MemoryAddress { name } = &line.operand {
                            call_graph.add_edge(&f.name, name);
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn collect_calls(expr: &Expr, caller: &str, env: &Environment, call_graph: &mut CallGraph) {
    match &expr.kind {
        ExprKind::Call { name, args } => {
            if matches!(
                env.get(name).map(|t| &t.kind),
                Some(ThingKind::Function { .. })
            ) {
                call_graph.add_edge(caller, name);
            }
            for arg in args {
                collect_calls(arg, caller, env, call_graph);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_calls(lhs, caller, env, call_graph);
            collect_calls(rhs, caller, env, call_graph);
        }
        ExprKind::Unary { expr, .. } => collect_calls(expr, caller, env, call_graph),
        ExprKind::Join { hi, lo } => {
            collect_calls(hi, caller, env, call_graph);
            collect_calls(lo, caller, env, call_graph);
        }
        ExprKind::Index { index, .. } => collect_calls(index, caller, env, call_graph),
        ExprKind::Number(_) | ExprKind::Ident(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::logger::{Logger, Verbosity};
    use crate::options::CompilationOptions;
    use crate::parser::parse;

    fn analyze_source(source: &str) -> Result<Analysis> {
        let program = parse(&tokenize(source)?)?;
        let platform = Platform::c64();
        let job = JobContext::new(
            CompilationOptions::default(),
            Logger::new(Verbosity::Quiet, false),
        );
        analyze(&program, &platform, &job)
    }

    #[test]
    fn test_variable_allocation_prefers_zero_page() {
        let analysis = analyze_source("byte a\nbyte b\n").unwrap();
        let a = analysis.env.get("a").unwrap();
        let b = analysis.env.get("b").unwrap();
        assert!(a.storage.is_zero_page());
        assert!(b.storage.is_zero_page());
        assert_ne!(a.storage, b.storage);
    }

    #[test]
    fn test_fixed_address() {
        let analysis = analyze_source("array output [16] @ $c000\n").unwrap();
        let output = analysis.env.get("output").unwrap();
        assert_eq!(output.storage, Storage::Absolute(0xC000));
    }

    #[test]
    fn test_pseudoreg_reserved() {
        let analysis = analyze_source("byte a\n").unwrap();
        let reg = analysis.env.get("__reg").unwrap();
        assert_eq!(reg.storage, Storage::ZeroPage(0x02));
        // User variables start after the pseudoregister.
        let a = analysis.env.get("a").unwrap();
        assert!(a.storage.address().unwrap() >= 0x02 + analysis.env.pseudoreg_size as u16);
    }

    #[test]
    fn test_const_folding() {
        let analysis = analyze_source("const byte k = 3 * 4\n").unwrap();
        match &analysis.env.get("k").unwrap().kind {
            ThingKind::ConstantAlias(c) => assert_eq!(c.eval(), Some(12)),
            other => panic!("expected constant, got {other:?}"),
        }
    }

    #[test]
    fn test_locals_are_qualified() {
        let source = "void main() {\n    byte t\n    t = 1\n}\n";
        let analysis = analyze_source(source).unwrap();
        assert!(analysis.env.get("main.t").is_some());
        assert!(analysis.env.resolve_in("main", "t").is_some());
    }

    #[test]
    fn test_call_graph_reachability() {
        let source = "\
byte used() {
    return 1
}
byte unused() {
    return 2
}
void main() {
    byte a
    a = used()
}
";
        let analysis = analyze_source(source).unwrap();
        let reachable = analysis.call_graph.reachable(&analysis.env.entry_points);
        assert!(reachable.contains("main"));
        assert!(reachable.contains("used"));
        assert!(!reachable.contains("unused"));
    }

    #[test]
    fn test_word_into_byte_rejected() {
        let source = "byte a\nvoid main() {\n    a = $1234\n}\n";
        let err = analyze_source(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeMismatch);
    }

    #[test]
    fn test_assign_to_constant_rejected() {
        let source = "const byte k = 1\nvoid main() {\n    k = 2\n}\n";
        let err = analyze_source(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::CannotAssignToConstant);
    }

    #[test]
    fn test_wrong_arity_rejected() {
        let source = "byte one() {\n    return 1\n}\nbyte a\nvoid main() {\n    a = one(5)\n}\n";
        let err = analyze_source(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::WrongNumberOfArguments);
    }

    #[test]
    fn test_interrupts_are_entry_points() {
        let source = "interrupt void irq() {\n    return\n}\nvoid main() {\n    return\n}\n";
        let analysis = analyze_source(source).unwrap();
        assert!(analysis.env.entry_points.contains(&"main".to_string()));
        assert!(analysis.env.entry_points.contains(&"irq".to_string()));
    }

    #[test]
    fn test_text_contents_encoded() {
        let source = "array msg [2] = \"ab\" scr\n";
        let analysis = analyze_source(source).unwrap();
        match &analysis.env.get("msg").unwrap().kind {
            ThingKind::Array {
                contents: Some(bytes),
                ..
            } => assert_eq!(bytes, &vec![0x01, 0x02]),
            other => panic!("expected contents, got {other:?}"),
        }
    }
}
