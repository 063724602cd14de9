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

//! Runtime support routines.
//!
//! Codegen records which routines a program needs; the driver emits each
//! used routine once, as an ordinary function that flows through the same
//! optimization and assembly pipeline as user code.

use crate::asm::{AssemblyLine, Label, Opcode};
use crate::constant::Constant;
use crate::env::Environment;

/// Name of the byte multiply routine: A * X -> A.
pub const MUL_U8: &str = "__mul_u8";
/// Name of the bounds-failure trap.
pub const BOUNDS_FAIL: &str = "__bounds_fail";

/// Which runtime routines a compiled body referenced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeUse {
    pub mul_u8: bool,
    pub bounds_fail: bool,
}

impl RuntimeUse {
    pub fn merge(&mut self, other: RuntimeUse) {
        self.mul_u8 |= other.mul_u8;
        self.bounds_fail |= other.bounds_fail;
    }

    pub fn any(&self) -> bool {
        self.mul_u8 || self.bounds_fail
    }
}

/// Shift-and-add byte multiply.
///
/// Inputs in A and X, product (mod 256) in A. Uses the first two
/// pseudoregister bytes as working storage.
pub fn mul_u8(env: &Environment) -> Vec<AssemblyLine> {
    let multiplicand = env.pseudoreg(0);
    let multiplier = env.pseudoreg(1);
    let loop_label = Label::new(".mul_loop");
    let skip_label = Label::new(".mul_skip");
    vec![
        AssemblyLine::label(&Label::new(MUL_U8)).non_elidable(),
        AssemblyLine::zero_page(Opcode::STA, multiplicand.clone()).non_elidable(),
        AssemblyLine::zero_page(Opcode::STX, multiplier.clone()).non_elidable(),
        AssemblyLine::immediate(Opcode::LDA, Constant::num(0)).non_elidable(),
        AssemblyLine::label(&loop_label).non_elidable(),
        AssemblyLine::zero_page(Opcode::LSR, multiplier.clone()).non_elidable(),
        AssemblyLine::relative(Opcode::BCC, &skip_label).non_elidable(),
        AssemblyLine::implied(Opcode::CLC).non_elidable(),
        AssemblyLine::zero_page(Opcode::ADC, multiplicand.clone()).non_elidable(),
        AssemblyLine::label(&skip_label).non_elidable(),
        AssemblyLine::zero_page(Opcode::ASL, multiplicand).non_elidable(),
        AssemblyLine::zero_page(Opcode::LDX, multiplier).non_elidable(),
        AssemblyLine::relative(Opcode::BNE, &loop_label).non_elidable(),
        AssemblyLine::implied(Opcode::RTS).non_elidable(),
    ]
}

/// Trap for failed array bounds checks. Executes BRK so a debugger or
/// monitor gets control.
pub fn bounds_fail() -> Vec<AssemblyLine> {
    vec![
        AssemblyLine::label(&Label::new(BOUNDS_FAIL)).non_elidable(),
        AssemblyLine::implied(Opcode::BRK).non_elidable(),
        AssemblyLine::implied(Opcode::RTS).non_elidable(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_routine_shape() {
        let env = Environment::new(0x02, 4);
        let lines = mul_u8(&env);
        assert_eq!(lines[0].defined_label(), Some(MUL_U8));
        assert!(lines.iter().all(|l| !l.elidable));
        assert_eq!(lines.last().unwrap().opcode, Opcode::RTS);
    }

    #[test]
    fn test_runtime_use_merge() {
        let mut a = RuntimeUse::default();
        a.merge(RuntimeUse {
            mul_u8: true,
            bounds_fail: false,
        });
        assert!(a.mul_u8);
        assert!(!a.bounds_fail);
        assert!(a.any());
    }
}
