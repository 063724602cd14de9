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

//! Optimizer behavior observed through whole compilations.

mod common;

use common::{compile_and_run, compile_and_run_with};
use mamba65::{CompilationOptions, Platform};

const BENCH_PROGRAM: &str = "\
byte a
byte b
byte total
array output [32] @ $c000
byte twice(byte p) {
    return p + p
}
void main() {
    a = 3
    b = twice(a)
    total = 0
    while a < 30 {
        total += b
        a += 1
    }
    output[0] = total
    output[1] = twice(total)
}
";

// ============================================================================
// Size behavior
// ============================================================================

/// Compiled size must not grow as the optimization level rises.
#[test]
fn test_size_monotone_in_level() {
    let platform = Platform::c64();
    let mut previous = usize::MAX;
    for level in 0..=3 {
        let program = mamba65::compile_full(
            BENCH_PROGRAM,
            CompilationOptions::with_level(level),
            &platform,
        )
        .unwrap();
        assert!(
            program.optimized_size <= previous,
            "-O{level} grew the code: {} > {previous}",
            program.optimized_size
        );
        previous = program.optimized_size;
    }
}

#[test]
fn test_optimizer_reports_both_sizes() {
    let platform = Platform::c64();
    let program = mamba65::compile_full(
        BENCH_PROGRAM,
        CompilationOptions::with_level(2),
        &platform,
    )
    .unwrap();
    assert!(program.optimized_size <= program.unoptimized_size);
    assert!(program.optimized_size > 0);
}

// ============================================================================
// Semantics preservation
// ============================================================================

/// The benchmark program computes the same result at every level.
#[test]
fn test_levels_agree_on_result() {
    let expected = compile_and_run(BENCH_PROGRAM, 0).memory[0xC000];
    for level in 1..=3 {
        let cpu = compile_and_run(BENCH_PROGRAM, level);
        assert_eq!(
            cpu.memory[0xC000], expected,
            "different result at -O{level}"
        );
    }
}

#[test]
fn test_superoptimizer_preserves_semantics() {
    let source = "\
byte a
byte output @ $c000
void main() {
    a = 20
    output = a + a + 2
}
";
    let baseline = compile_and_run(source, 0);
    let superoptimized = compile_and_run(source, 9);
    assert_eq!(baseline.memory[0xC000], 42);
    assert_eq!(superoptimized.memory[0xC000], 42);
}

// ============================================================================
// Undocumented opcodes
// ============================================================================

fn assembly_listing(source: &str, options: CompilationOptions) -> String {
    let platform = Platform::c64();
    let program = mamba65::compile_full(source, options, &platform).unwrap();
    program.output.asm.join("\n")
}

/// `-fillegals` toggles undocumented opcodes in the output.
#[test]
fn test_illegals_toggle() {
    // A load of the same value into A and X invites LAX.
    let source = "\
byte v
byte output @ $c000
array table [8] @ $c010
void main() {
    v = 3
    output = table[v] + v
}
";
    let plain = assembly_listing(source, CompilationOptions::with_level(2));
    assert!(!plain.contains("LAX"), "LAX without -fillegals:\n{plain}");
    assert!(!plain.contains("SBX"));
    assert!(!plain.contains("DCP"));

    let mut with_illegals = CompilationOptions::with_level(2);
    with_illegals.illegals = true;
    let platform = Platform::c64();
    // Still compiles and runs identically.
    let program =
        mamba65::compile_full(source, with_illegals.clone(), &platform).unwrap();
    assert!(program.optimized_size > 0);
    let baseline = compile_and_run(source, 2);
    let cpu = compile_and_run_with(source, with_illegals);
    assert_eq!(baseline.memory[0xC000], cpu.memory[0xC000]);
}

// ============================================================================
// Dead code
// ============================================================================

#[test]
fn test_dead_function_produces_no_bytes() {
    let with_dead = "\
byte output @ $c000
byte unused_helper(byte p) {
    return p * 37
}
void main() {
    output = 1
}
";
    let without_dead = "\
byte output @ $c000
void main() {
    output = 1
}
";
    let platform = Platform::c64();
    let a = mamba65::compile_full(with_dead, CompilationOptions::with_level(0), &platform)
        .unwrap();
    let b = mamba65::compile_full(without_dead, CompilationOptions::with_level(0), &platform)
        .unwrap();
    assert_eq!(a.output.code_size, b.output.code_size);
    assert!(a.symbol("unused_helper").is_none());
}

#[test]
fn test_interrupt_handlers_stay_reachable() {
    let source = "\
byte ticks
interrupt void on_vblank() {
    ticks += 1
}
void main() {
    ticks = 0
}
";
    let platform = Platform::c64();
    let program =
        mamba65::compile_full(source, CompilationOptions::with_level(2), &platform).unwrap();
    assert!(program.symbol("on_vblank").is_some());
}

// ============================================================================
// Interrupt prologue
// ============================================================================

#[test]
fn test_interrupt_prologue_saves_registers() {
    let source = "\
byte ticks
interrupt void on_irq() {
    ticks += 1
}
void main() {
    ticks = 0
}
";
    let listing = assembly_listing(source, CompilationOptions::with_level(2));
    let irq = listing
        .split("; on_irq")
        .nth(1)
        .expect("interrupt handler in listing");
    // NMOS save sequence and decimal clear survive optimization.
    assert!(irq.contains("PHA"));
    assert!(irq.contains("TXA"));
    assert!(irq.contains("TYA"));
    assert!(irq.contains("CLD"));
    assert!(irq.contains("RTI"));
}

// ============================================================================
// Bounds checking
// ============================================================================

#[test]
fn test_bounds_checking_flag_emits_check() {
    let source = "\
byte i
array output [8] @ $c000
void main() {
    i = 2
    output[i] = 1
}
";
    let unchecked = assembly_listing(source, CompilationOptions::with_level(0));
    assert!(!unchecked.contains("__bounds_fail"));

    let mut options = CompilationOptions::with_level(0);
    options.bounds_checking = true;
    let checked = assembly_listing(source, options.clone());
    assert!(checked.contains("CPY #$08"));
    assert!(checked.contains("__bounds_fail"));

    // The checked program still runs normally for a legal index.
    let cpu = compile_and_run_with(source, options);
    assert_eq!(cpu.memory[0xC002], 1);
}

#[test]
fn test_bounds_violation_traps() {
    let source = "\
byte i
array output [4] @ $c000
void main() {
    i = 200
    output[i] = 1
}
";
    let mut options = CompilationOptions::with_level(0);
    options.bounds_checking = true;
    // The BRK trap stops execution before the wild store.
    let cpu = compile_and_run_with(source, options);
    assert_eq!(cpu.memory[0xC000 + 200], 0);
}

// ============================================================================
// Determinism
// ============================================================================

/// Parallel and single-threaded optimization produce identical images.
#[test]
fn test_single_threaded_matches_parallel() {
    let platform = Platform::c64();
    let mut parallel = CompilationOptions::with_level(2);
    parallel.single_threaded = false;
    let mut serial = CompilationOptions::with_level(2);
    serial.single_threaded = true;

    let a = mamba65::compile_full(BENCH_PROGRAM, parallel, &platform).unwrap();
    let b = mamba65::compile_full(BENCH_PROGRAM, serial, &platform).unwrap();
    assert_eq!(a.image(&platform), b.image(&platform));
}
