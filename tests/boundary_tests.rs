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

//! Boundary behaviors: branch-range relaxation, the stack-frame strategy
//! switch, and pseudoregister exhaustion.

mod common;

use common::compile_and_run_with;
use mamba65::{CompilationOptions, ErrorCode, Platform};

fn listing(source: &str, options: CompilationOptions) -> String {
    let platform = Platform::c64();
    let program = mamba65::compile_full(source, options, &platform).unwrap();
    program.output.asm.join("\n")
}

// ============================================================================
// Branch relaxation
// ============================================================================

fn long_branch_program() -> String {
    let mut source = String::from(
        "byte a\nbyte output @ $c000\nvoid main() {\n    a = 0\n    output = 0\n    if a == 0 {\n",
    );
    // Far more than 127 bytes of then-branch.
    for _ in 0..60 {
        source.push_str("        output += 1\n");
    }
    source.push_str("    }\n    output += 100\n}\n");
    source
}

#[test]
fn test_forward_branch_relaxation_executes_correctly() {
    let source = long_branch_program();
    for level in [0u8, 2] {
        let cpu = compile_and_run_with(&source, CompilationOptions::with_level(level));
        assert_eq!(cpu.memory[0xC000], 160, "wrong result at -O{level}");
    }
}

#[test]
fn test_short_branch_stays_short() {
    let source = "\
byte a
byte output @ $c000
void main() {
    a = 0
    if a == 0 {
        output = 1
    }
}
";
    let text = listing(source, CompilationOptions::with_level(0));
    // No relaxation detour label in a short function.
    assert!(!text.contains(".rx_"));
}

#[test]
fn test_long_branch_gets_detour() {
    let text = listing(&long_branch_program(), CompilationOptions::with_level(0));
    assert!(text.contains(".rx_"), "expected a relaxation detour:\n{text}");
    assert!(text.contains("JMP .ie_") || text.contains("JMP .rx_"));
}

// ============================================================================
// Stack frame strategy
// ============================================================================

fn reentrant_program(locals: usize) -> String {
    let mut source = String::from("byte output @ $c000\nreentrant void worker() {\n");
    for i in 0..locals {
        source.push_str(&format!("    byte t{i}\n"));
    }
    source.push_str("    t0 = 7\n}\nvoid main() {\n    worker()\n    output = 1\n}\n");
    source
}

fn count_occurrences(text: &str, needle: &str) -> usize {
    text.matches(needle).count()
}

#[test]
fn test_frame_of_four_uses_push_runs() {
    let mut options = CompilationOptions::with_level(2);
    options.illegals = true;
    let text = listing(&reentrant_program(4), options);
    let worker = text.split("; worker").nth(1).unwrap();
    let prologue = worker.split("TSX").next().unwrap();
    assert!(!worker.contains("SBX"), "four bytes should not use SBX");
    assert!(count_occurrences(prologue, "PHA") >= 4);
}

#[test]
fn test_frame_of_five_switches_to_sbx() {
    let mut options = CompilationOptions::with_level(2);
    options.illegals = true;
    let text = listing(&reentrant_program(5), options);
    let worker = text.split("; worker").nth(1).unwrap();
    assert!(
        worker.contains("SBX #$05"),
        "five bytes with -fillegals should use SBX:\n{worker}"
    );
}

#[test]
fn test_frame_of_five_without_illegals_pushes() {
    let text = listing(&reentrant_program(5), CompilationOptions::with_level(2));
    let worker = text.split("; worker").nth(1).unwrap();
    assert!(!worker.contains("SBX"));
    let prologue = worker.split("TSX").next().unwrap();
    assert!(count_occurrences(prologue, "PHA") >= 5);
}

#[test]
fn test_reentrant_function_executes() {
    let cpu = compile_and_run_with(&reentrant_program(5), CompilationOptions::with_level(0));
    assert_eq!(cpu.memory[0xC000], 1);
}

// ============================================================================
// Pseudoregister limits
// ============================================================================

#[test]
fn test_zero_width_pseudoregister_rejects_deep_expressions() {
    let source = "\
byte a
byte output @ $c000
void main() {
    a = 1
    output = (a + a) + (a + a)
}
";
    let mut options = CompilationOptions::with_level(0);
    options.zp_register = Some(0);
    let platform = Platform::c64();
    let err = mamba65::compile_full(source, options, &platform).unwrap_err();
    assert_eq!(err.code, ErrorCode::ExpressionTooComplex);
}

#[test]
fn test_wider_pseudoregister_accepts_deep_expressions() {
    let source = "\
byte a
byte output @ $c000
void main() {
    a = 1
    output = ((a + a) + (a + a)) + ((a + a) + (a + a))
}
";
    let mut options = CompilationOptions::with_level(0);
    options.zp_register = Some(8);
    let cpu = compile_and_run_with(source, options);
    assert_eq!(cpu.memory[0xC000], 8);
}

// ============================================================================
// Byte-range arithmetic
// ============================================================================

#[test]
fn test_addition_wraps_at_byte_range() {
    let source = "\
byte a
byte output @ $c000
void main() {
    a = 250
    output = a + 10
}
";
    let cpu = compile_and_run_with(source, CompilationOptions::with_level(0));
    assert_eq!(cpu.memory[0xC000], 4);
}

#[test]
fn test_subtraction_wraps_below_zero() {
    let source = "\
byte a
byte output @ $c000
void main() {
    a = 3
    output = a - 10
}
";
    let cpu = compile_and_run_with(source, CompilationOptions::with_level(0));
    assert_eq!(cpu.memory[0xC000], 249);
}

#[test]
fn test_loop_bound_at_byte_edge() {
    // An inclusive bound of 255 must terminate without wrapping.
    let source = "\
byte i
byte output @ $c000
void main() {
    output = 0
    for i,250,to,255 {
        output += 1
    }
}
";
    let cpu = compile_and_run_with(source, CompilationOptions::with_level(0));
    assert_eq!(cpu.memory[0xC000], 6);
}
