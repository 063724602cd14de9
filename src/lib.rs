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

//! Mamba65 Compiler Library
//!
//! An optimizing ahead-of-time compiler from a small statically-typed
//! systems language to machine code for the MOS 6502 family.
//!
//! # Modules
//!
//! - [`lexer`] / [`parser`] / [`ast`] - the reference front end
//! - [`analyzer`] / [`env`] - name resolution and the environment
//! - [`constant`] - compile-time constant algebra
//! - [`asm`] - opcodes, addressing modes, assembly lines
//! - [`codegen`] - statement and expression lowering
//! - [`dataflow`] - CPU-state analysis and liveness
//! - [`opt`] - the peephole engine, rule sets and superoptimizer
//! - [`assembler`] - sizing, placement and emission
//! - [`output`] - image, listing and label-file writing
//! - [`platform`] - target platform descriptors
//!
//! # Example
//!
//! ```no_run
//! let source = r#"
//! byte a
//! array output [16] @ $c000
//! void main() {
//!     a = 1
//!     output[0] = a + a
//! }
//! "#;
//!
//! match mamba65::compile(source) {
//!     Ok(image) => println!("compiled {} bytes", image.len()),
//!     Err(e) => eprintln!("compilation failed: {e}"),
//! }
//! ```

pub mod analyzer;
pub mod asm;
pub mod assembler;
pub mod ast;
pub mod codegen;
pub mod constant;
pub mod dataflow;
pub mod env;
pub mod error;
pub mod lexer;
pub mod logger;
pub mod opt;
pub mod options;
pub mod output;
pub mod parser;
pub mod platform;

pub use error::{format_error, CompileError, ErrorCode, Result, Span};
pub use options::{CompilationOptions, OptimizationMetric};
pub use platform::Platform;

use assembler::{AssemblerOutput, AssemblyUnit};
use codegen::RuntimeUse;
use env::{JobContext, Storage, ThingInMemory, ThingKind};
use logger::{Logger, Verbosity};
use std::collections::HashSet;

/// The version of the Mamba65 compiler.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of the compiler.
pub const NAME: &str = "Mamba65";

/// Everything one compilation produces.
#[derive(Debug)]
pub struct CompiledProgram {
    pub output: AssemblerOutput,
    /// Code size before the peephole phase.
    pub unoptimized_size: usize,
    /// Code size after the peephole phase.
    pub optimized_size: usize,
}

impl CompiledProgram {
    /// The primary image bytes, header included.
    pub fn image(&self, platform: &Platform) -> Vec<u8> {
        match self.output.code.first() {
            Some((_, image)) => output::image_bytes(platform, image.start, &image.bytes),
            None => Vec::new(),
        }
    }

    /// The address of a global symbol, if it was placed.
    pub fn symbol(&self, name: &str) -> Option<u16> {
        self.output
            .labels
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.address)
    }
}

/// Compile with everything defaulted: C64 platform, `-O0`.
pub fn compile(source: &str) -> Result<Vec<u8>> {
    let platform = Platform::c64();
    let program = compile_full(source, CompilationOptions::default(), &platform)?;
    Ok(program.image(&platform))
}

/// Compile for the C64 with explicit options.
pub fn compile_with_options(source: &str, options: CompilationOptions) -> Result<Vec<u8>> {
    let platform = Platform::c64();
    let program = compile_full(source, options, &platform)?;
    Ok(program.image(&platform))
}

/// The full pipeline: parse, resolve, lower, optimize, assemble.
pub fn compile_full(
    source: &str,
    options: CompilationOptions,
    platform: &Platform,
) -> Result<CompiledProgram> {
    let job = JobContext::new(options, Logger::new(Verbosity::Quiet, false));
    compile_with_job(source, platform, &job)
}

/// The full pipeline against a caller-provided job context.
pub fn compile_with_job(
    source: &str,
    platform: &Platform,
    job: &JobContext,
) -> Result<CompiledProgram> {
    job.options.validate(platform.cpu)?;

    // Front end.
    let tokens = checkpoint(job, "lexing", lexer::tokenize(source))?;
    let program = checkpoint(job, "parsing", parser::parse(&tokens))?;

    // Resolution.
    let analysis = checkpoint(job, "resolution", analyzer::analyze(&program, platform, job))?;
    let analyzer::Analysis {
        mut env,
        call_graph,
        startup,
        var_floor,
    } = analysis;

    if env.entry_points.is_empty() {
        return Err(CompileError::new(
            ErrorCode::NoEntryPoint,
            "No entry point: define a 'main' function",
            Span::none(),
        ));
    }

    // Lowering, declaration order. Startup initializers run at the head
    // of the entry point.
    let mut units: Vec<AssemblyUnit> = Vec::new();
    let mut unit_runtime: Vec<(String, RuntimeUse)> = Vec::new();
    for declaration in &program.declarations {
        let ast::Declaration::Function(f) = declaration else {
            continue;
        };
        let mut function = f.clone();
        if f.name == "main" && !startup.is_empty() {
            let mut body = Vec::with_capacity(startup.len() + f.body.len());
            for (name, init) in &startup {
                body.push(ast::Statement::new(
                    ast::StatementKind::Assignment {
                        target: ast::AssignTarget::Variable(name.clone()),
                        op: ast::AssignOp::Assign,
                        value: init.clone(),
                    },
                    init.span,
                ));
            }
            body.extend(f.body.iter().cloned());
            function.body = body;
        }
        let (lines, used) =
            checkpoint(
                job,
                "code generation",
                codegen::compile_function(&function, &env, job, platform.cpu),
            )?;
        unit_runtime.push((f.name.clone(), used));
        let bank = env
            .get(&f.name)
            .map(|t| t.bank.clone())
            .unwrap_or_default();
        units.push(AssemblyUnit {
            name: f.name.clone(),
            bank,
            lines,
        });
    }

    // The runtime routines some *reachable* caller needs; a routine only
    // dead code refers to is dead itself.
    let function_reachable = call_graph.reachable(&env.entry_points);
    let mut runtime = RuntimeUse::default();
    for (name, used) in &unit_runtime {
        if function_reachable.contains(name) {
            runtime.merge(*used);
        }
    }
    let default_bank = platform.banks[0].name.clone();
    if runtime.mul_u8 {
        units.push(AssemblyUnit {
            name: codegen::runtime::MUL_U8.to_string(),
            bank: default_bank.clone(),
            lines: codegen::runtime::mul_u8(&env),
        });
        register_runtime(&mut env, codegen::runtime::MUL_U8, &default_bank)?;
    }
    if runtime.bounds_fail {
        units.push(AssemblyUnit {
            name: codegen::runtime::BOUNDS_FAIL.to_string(),
            bank: default_bank.clone(),
            lines: codegen::runtime::bounds_fail(),
        });
        register_runtime(&mut env, codegen::runtime::BOUNDS_FAIL, &default_bank)?;
    }

    let unoptimized_size: usize = units.iter().map(|u| assembler::total_size(&u.lines)).sum();

    // Peephole phase, function-parallel unless told otherwise.
    optimize_units(&mut units, job, platform.cpu);
    let optimized_size: usize = units.iter().map(|u| assembler::total_size(&u.lines)).sum();
    job.logger.info(&format!(
        "optimization: {unoptimized_size} -> {optimized_size} bytes"
    ));

    // Initialized data follows the code.
    units.extend(assembler::data_units(&env));

    // Data and runtime units are always emitted; user functions only when
    // the call graph can reach them from an entry point.
    let reachable: HashSet<String> = units
        .iter()
        .map(|u| u.name.clone())
        .filter(|name| {
            name.starts_with("__")
                || function_reachable.contains(name)
                || !matches!(
                    env.get(name).map(|t| &t.kind),
                    Some(ThingKind::Function { .. })
                )
        })
        .collect();

    let output = checkpoint(
        job,
        "assembly",
        assembler::assemble(units, &env, platform, &reachable, &var_floor, job),
    )?;

    Ok(CompiledProgram {
        output,
        unoptimized_size,
        optimized_size,
    })
}

fn register_runtime(env: &mut env::Environment, name: &str, bank: &str) -> Result<()> {
    env.define(
        ThingInMemory {
            name: name.to_string(),
            kind: ThingKind::Function {
                return_type: ast::Type::Byte,
                params: Vec::new(),
                flags: ast::FunctionFlags::default(),
            },
            bank: bank.to_string(),
            storage: Storage::Unallocated,
            size: 0,
        },
        Span::none(),
    )
}

/// Optimize every unit, spreading the work over a small thread pool.
///
/// Only the line lists are touched in parallel; the shared label counter
/// in the job context is atomic, so generated names stay globally unique.
/// The assembler runs after the join, so output does not depend on the
/// worker count.
fn optimize_units(units: &mut [AssemblyUnit], job: &JobContext, cpu: asm::Cpu) {
    if job.options.level == 0 || units.is_empty() {
        return;
    }
    let workers = if job.options.single_threaded {
        1
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(units.len().max(1))
    };

    if workers <= 1 {
        for unit in units.iter_mut() {
            let lines = std::mem::take(&mut unit.lines);
            unit.lines = opt::optimize_function(lines, job, cpu);
        }
        return;
    }

    let chunk_size = units.len().div_ceil(workers);
    std::thread::scope(|scope| {
        for chunk in units.chunks_mut(chunk_size) {
            scope.spawn(move || {
                for unit in chunk {
                    let lines = std::mem::take(&mut unit.lines);
                    unit.lines = opt::optimize_function(lines, job, cpu);
                }
            });
        }
    });
}

/// Log a phase failure and enforce the between-phase error checkpoint.
fn checkpoint<T>(job: &JobContext, phase: &str, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            job.logger.assert_no_errors(phase)?;
            Ok(value)
        }
        Err(error) => {
            job.logger.error(&format!("{phase}: {error}"));
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "Mamba65");
    }

    #[test]
    fn test_compile_minimal_program() {
        let source = "void main() {\n    return\n}\n";
        let image = compile(source).unwrap();
        // Load address header plus at least an RTS.
        assert!(image.len() >= 3);
        assert_eq!(u16::from_le_bytes([image[0], image[1]]), 0x080E);
    }

    #[test]
    fn test_missing_entry_point() {
        let source = "byte a\n";
        let err = compile(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoEntryPoint);
    }

    #[test]
    fn test_optimized_size_never_larger() {
        let source = "\
byte a
array output [16] @ $c000
void main() {
    a = 1
    output[0] = a + a
}
";
        let platform = Platform::c64();
        let low = compile_full(source, CompilationOptions::with_level(0), &platform).unwrap();
        let high = compile_full(source, CompilationOptions::with_level(2), &platform).unwrap();
        assert!(high.optimized_size <= low.optimized_size);
    }

    #[test]
    fn test_symbols_exposed() {
        let source = "void main() {\n    return\n}\n";
        let platform = Platform::c64();
        let program = compile_full(source, CompilationOptions::default(), &platform).unwrap();
        assert_eq!(program.symbol("main"), Some(0x080E));
    }
}
