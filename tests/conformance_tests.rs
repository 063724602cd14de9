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

//! End-to-end conformance scenarios.
//!
//! Each program is compiled at `-O0` through `-O3` and executed on the
//! test interpreter; the observed memory at `$c000` must not depend on
//! the optimization level.

mod common;

use common::compile_and_run;
use test_case::test_case;

// ============================================================================
// Scenario programs
// ============================================================================

#[test_case(0; "O0")]
#[test_case(1; "O1")]
#[test_case(2; "O2")]
#[test_case(3; "O3")]
fn test_complex_expression(level: u8) {
    let source = "\
byte output @ $c000
byte one() {
    return 1
}
void main() {
    output = (one() + one()) | ((one() << 2 - 1) ^ one())
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 2);
}

#[test_case(0; "O0")]
#[test_case(1; "O1")]
#[test_case(2; "O2")]
#[test_case(3; "O3")]
fn test_simple_addition(level: u8) {
    let source = "\
byte a
byte output @ $c000
void main() {
    a = 1
    output = a + a
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 2);
}

#[test_case(0; "O0")]
#[test_case(1; "O1")]
#[test_case(2; "O2")]
#[test_case(3; "O3")]
fn test_immediate_addition(level: u8) {
    let source = "\
byte a
byte output @ $c000
void main() {
    a = 1
    output = a + 65
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 66);
}

#[test_case(0; "O0")]
#[test_case(1; "O1")]
#[test_case(2; "O2")]
#[test_case(3; "O3")]
fn test_in_place_indexed_addition(level: u8) {
    let source = "\
byte a
array output [16] @ $c000
void main() {
    output[1] = 5
    a = 1
    output[a] += 1
    output[a] += 36
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC001], 42);
}

#[test_case(0; "O0")]
#[test_case(1; "O1")]
#[test_case(2; "O2")]
#[test_case(3; "O3")]
fn test_byte_multiplication(level: u8) {
    let source = "\
byte a
byte output @ $c000
void main() {
    a = 7
    output = a * 2
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 14);
}

#[test_case(0; "O0")]
#[test_case(1; "O1")]
#[test_case(2; "O2")]
#[test_case(3; "O3")]
fn test_multiplication_matrix(level: u8) {
    for x in [0u16, 1, 2, 5, 7, 100] {
        for y in [0u16, 2, 4, 5, 54, 100] {
            let source = format!(
                "\
byte a
byte b
byte output @ $c000
void main() {{
    a = {x}
    b = {y}
    output = a * b
}}
"
            );
            let cpu = compile_and_run(&source, level);
            assert_eq!(
                cpu.memory[0xC000],
                ((x * y) & 0xFF) as u8,
                "wrong product for {x} * {y} at -O{level}"
            );
        }
    }
}

#[test_case(0; "O0")]
#[test_case(1; "O1")]
#[test_case(2; "O2")]
#[test_case(3; "O3")]
fn test_in_place_multiplication(level: u8) {
    let source = "\
byte output @ $c000
void main() {
    output = 54
    output *= 4
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 216);
}

// ============================================================================
// Control flow
// ============================================================================

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_if_else(level: u8) {
    let source = "\
byte a
byte output @ $c000
void main() {
    a = 5
    if a > 3 {
        output = 1
    } else {
        output = 2
    }
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 1);
}

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_while_loop(level: u8) {
    let source = "\
byte a
byte total
byte output @ $c000
void main() {
    a = 0
    total = 0
    while a < 10 {
        total += a
        a += 1
    }
    output = total
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 45);
}

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_do_while_runs_once(level: u8) {
    let source = "\
byte a
byte output @ $c000
void main() {
    a = 100
    do {
        output = a
        a += 1
    } while a < 5
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 100);
}

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_for_to_inclusive(level: u8) {
    let source = "\
byte i
array output [16] @ $c000
void main() {
    for i,0,to,9 {
        output[i] = i
    }
}
";
    let cpu = compile_and_run(source, level);
    for i in 0..=9u16 {
        assert_eq!(cpu.memory[0xC000 + i as usize], i as u8);
    }
    assert_eq!(cpu.memory[0xC00A], 0, "loop must stop after 9");
}

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_for_until_exclusive(level: u8) {
    let source = "\
byte i
byte output @ $c000
void main() {
    output = 0
    for i,0,until,5 {
        output += 1
    }
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 5);
}

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_for_downto(level: u8) {
    let source = "\
byte i
byte output @ $c000
void main() {
    output = 0
    for i,5,downto,1 {
        output += i
    }
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 15);
}

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_labelled_break(level: u8) {
    let source = "\
byte i
byte j
byte output @ $c000
void main() {
    output = 0
    outer: while i < 10 {
        j = 0
        while j < 10 {
            output += 1
            if output == 7 {
                break outer
            }
            j += 1
        }
        i += 1
    }
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 7);
}

// ============================================================================
// Functions and calls
// ============================================================================

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_parameter_passing(level: u8) {
    let source = "\
byte output @ $c000
byte add(byte p, byte q) {
    return p + q
}
void main() {
    output = add(40, 2)
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 42);
}

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_nested_calls(level: u8) {
    let source = "\
byte output @ $c000
byte double(byte p) {
    return p + p
}
void main() {
    output = double(double(double(5)))
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 40);
}

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_logical_operators(level: u8) {
    let source = "\
byte a
byte output @ $c000
void main() {
    a = 5
    output = 0
    if a > 1 && a < 10 {
        output += 1
    }
    if a == 0 || a == 5 {
        output += 2
    }
    if a > 9 ^^ a > 1 {
        output += 4
    }
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 7);
}

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_shifts_and_bitwise(level: u8) {
    let source = "\
byte a
byte output @ $c000
void main() {
    a = 3
    output = ((a << 4) | 2) & $7f
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 0x32 & 0x7F);
}

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_word_variable_roundtrip(level: u8) {
    let source = "\
word w
byte output @ $c000
byte output2 @ $c001
void main() {
    w = $1234
    output = lo(w)
    output2 = hi(w)
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 0x34);
    assert_eq!(cpu.memory[0xC001], 0x12);
}

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_byte_join(level: u8) {
    let source = "\
word w
byte output @ $c000
byte output2 @ $c001
void main() {
    w = $12 : $34
    output = lo(w)
    output2 = hi(w)
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 0x34);
    assert_eq!(cpu.memory[0xC001], 0x12);
}

// ============================================================================
// Decimal (BCD) arithmetic
// ============================================================================

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_decimal_addition(level: u8) {
    let mut options = mamba65::CompilationOptions::with_level(level);
    options.decimal_mode = true;
    let source = "\
byte a
byte output @ $c000
void main() {
    a = $19
    output = a +' 3
}
";
    let cpu = common::compile_and_run_with(source, options);
    // BCD 19 + 3 = 22.
    assert_eq!(cpu.memory[0xC000], 0x22);
}

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_decimal_mode_left_clear(level: u8) {
    let mut options = mamba65::CompilationOptions::with_level(level);
    options.decimal_mode = true;
    let source = "\
byte a
byte output @ $c000
void main() {
    a = $15
    a +'= $27
    output = a + 1
}
";
    let cpu = common::compile_and_run_with(source, options);
    // $15 +' $27 = $42 in BCD, then a plain binary increment.
    assert_eq!(cpu.memory[0xC000], 0x43);
    assert!(!cpu.decimal, "decimal flag must be restored");
}

// ============================================================================
// Inline assembly
// ============================================================================

#[test_case(0; "O0")]
#[test_case(2; "O2")]
fn test_asm_function(level: u8) {
    let source = "\
byte output @ $c000
asm void store42(byte a) {
    sta $c000
    rts
}
void main() {
    store42(42)
}
";
    let cpu = compile_and_run(source, level);
    assert_eq!(cpu.memory[0xC000], 42);
}
