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

//! Abstract CPU state.
//!
//! Each register holds `Unknown`, a `Known` byte, or `SameAs` another
//! register; each flag holds `Unknown` or a `Known` truth value. The
//! transfer function in this module is the single source of operational
//! semantics for the forward analysis; anything it does not model
//! explicitly falls back to `Unknown`, which is always safe.

pub mod analysis;

pub use analysis::{analyze, liveness, CpuImportance};

use crate::asm::{AddrMode, AssemblyLine, Opcode};

/// One of the three 8-bit registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    A,
    X,
    Y,
}

/// Abstract value of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status<T> {
    #[default]
    Unknown,
    Known(T),
    /// Holds the same value as another register.
    SameAs(Reg),
}

impl<T: Copy + PartialEq> Status<T> {
    /// Lattice join: agreeing states survive, anything else widens.
    pub fn join(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Status::Unknown
        }
    }

    /// The concrete value, if known.
    pub fn known(self) -> Option<T> {
        match self {
            Status::Known(v) => Some(v),
            _ => None,
        }
    }
}

/// Abstract machine state before one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuStatus {
    pub a: Status<u8>,
    pub x: Status<u8>,
    pub y: Status<u8>,
    pub n: Status<bool>,
    pub z: Status<bool>,
    pub c: Status<bool>,
    pub v: Status<bool>,
    pub d: Status<bool>,
    pub i: Status<bool>,
}

impl CpuStatus {
    /// The fully unknown state.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Join with another state.
    pub fn join(self, other: Self) -> Self {
        Self {
            a: self.a.join(other.a),
            x: self.x.join(other.x),
            y: self.y.join(other.y),
            n: self.n.join(other.n),
            z: self.z.join(other.z),
            c: self.c.join(other.c),
            v: self.v.join(other.v),
            d: self.d.join(other.d),
            i: self.i.join(other.i),
        }
    }

    pub fn reg(&self, reg: Reg) -> Status<u8> {
        match reg {
            Reg::A => self.a,
            Reg::X => self.x,
            Reg::Y => self.y,
        }
    }

    fn set_reg(&mut self, reg: Reg, value: Status<u8>) {
        // A register can never be SameAs itself.
        let value = match value {
            Status::SameAs(r) if r == reg => Status::Unknown,
            v => v,
        };
        match reg {
            Reg::A => self.a = value,
            Reg::X => self.x = value,
            Reg::Y => self.y = value,
        }
        // Anything that pointed at the overwritten register is stale.
        for other in [Reg::A, Reg::X, Reg::Y] {
            if other != reg {
                if let Status::SameAs(target) = self.reg(other) {
                    if target == reg {
                        self.set_reg_raw(other, Status::Unknown);
                    }
                }
            }
        }
    }

    fn set_reg_raw(&mut self, reg: Reg, value: Status<u8>) {
        match reg {
            Reg::A => self.a = value,
            Reg::X => self.x = value,
            Reg::Y => self.y = value,
        }
    }

    /// Whether two registers provably hold the same value.
    pub fn regs_equal(&self, left: Reg, right: Reg) -> bool {
        if left == right {
            return true;
        }
        match (self.reg(left), self.reg(right)) {
            (Status::Known(a), Status::Known(b)) => a == b,
            (Status::SameAs(t), _) if t == right => true,
            (_, Status::SameAs(t)) if t == left => true,
            _ => false,
        }
    }

    fn set_nz(&mut self, value: Status<u8>) {
        match value.known() {
            Some(v) => {
                self.n = Status::Known(v >= 0x80);
                self.z = Status::Known(v == 0);
            }
            None => {
                self.n = Status::Unknown;
                self.z = Status::Unknown;
            }
        }
    }

    fn clobber_flags(&mut self) {
        self.n = Status::Unknown;
        self.z = Status::Unknown;
        self.c = Status::Unknown;
        self.v = Status::Unknown;
    }

    fn clobber_all(&mut self) {
        *self = Self::unknown();
    }
}

/// The immediate operand value, if the line has a closed one.
fn immediate_value(line: &AssemblyLine) -> Option<u8> {
    if line.mode == AddrMode::Immediate {
        line.operand.eval().map(|v| (v & 0xFF) as u8)
    } else {
        None
    }
}

/// Forward transfer: the state after executing `line` in state `before`.
pub fn transfer(before: &CpuStatus, line: &AssemblyLine) -> CpuStatus {
    use Opcode::*;
    let mut state = *before;
    let imm = immediate_value(line);

    match line.opcode {
        LABEL | BYTE => {}

        LDA => {
            let value = imm.map(Status::Known).unwrap_or(Status::Unknown);
            state.set_reg(Reg::A, value);
            state.set_nz(value);
        }
        LDX => {
            let value = imm.map(Status::Known).unwrap_or(Status::Unknown);
            state.set_reg(Reg::X, value);
            state.set_nz(value);
        }
        LDY => {
            let value = imm.map(Status::Known).unwrap_or(Status::Unknown);
            state.set_reg(Reg::Y, value);
            state.set_nz(value);
        }
        LAX => {
            state.set_reg(Reg::A, Status::Unknown);
            state.set_reg(Reg::X, Status::SameAs(Reg::A));
            state.set_nz(Status::Unknown);
        }

        STA | STX | STY | SAX | STZ => {}

        TAX => {
            let value = match before.a {
                Status::Known(v) => Status::Known(v),
                _ => Status::SameAs(Reg::A),
            };
            state.set_reg(Reg::X, value);
            state.set_nz(before.a);
        }
        TAY => {
            let value = match before.a {
                Status::Known(v) => Status::Known(v),
                _ => Status::SameAs(Reg::A),
            };
            state.set_reg(Reg::Y, value);
            state.set_nz(before.a);
        }
        TXA => {
            let value = match before.x {
                Status::Known(v) => Status::Known(v),
                _ => Status::SameAs(Reg::X),
            };
            state.set_reg(Reg::A, value);
            state.set_nz(before.x);
        }
        TYA => {
            let value = match before.y {
                Status::Known(v) => Status::Known(v),
                _ => Status::SameAs(Reg::Y),
            };
            state.set_reg(Reg::A, value);
            state.set_nz(before.y);
        }
        TSX => {
            state.set_reg(Reg::X, Status::Unknown);
            state.set_nz(Status::Unknown);
        }
        TXS => {}

        INX | DEX => {
            let value = match before.x.known() {
                Some(v) if line.opcode == INX => Status::Known(v.wrapping_add(1)),
                Some(v) => Status::Known(v.wrapping_sub(1)),
                None => Status::Unknown,
            };
            state.set_reg(Reg::X, value);
            state.set_nz(value);
        }
        INY | DEY => {
            let value = match before.y.known() {
                Some(v) if line.opcode == INY => Status::Known(v.wrapping_add(1)),
                Some(v) => Status::Known(v.wrapping_sub(1)),
                None => Status::Unknown,
            };
            state.set_reg(Reg::Y, value);
            state.set_nz(value);
        }
        INC | DEC if line.mode == AddrMode::Implied => {
            let value = match before.a.known() {
                Some(v) if line.opcode == INC => Status::Known(v.wrapping_add(1)),
                Some(v) => Status::Known(v.wrapping_sub(1)),
                None => Status::Unknown,
            };
            state.set_reg(Reg::A, value);
            state.set_nz(value);
        }
        INC | DEC | TRB | TSB | INW | DEW | ASW | ROW => {
            // Memory read-modify-write: registers survive, flags do not.
            state.n = Status::Unknown;
            state.z = Status::Unknown;
        }

        CLC => state.c = Status::Known(false),
        SEC => state.c = Status::Known(true),
        CLD => state.d = Status::Known(false),
        SED => state.d = Status::Known(true),
        CLI => state.i = Status::Known(false),
        SEI => state.i = Status::Known(true),
        CLV => state.v = Status::Known(false),

        ADC => {
            let value = match (before.a.known(), imm, before.c.known(), before.d.known()) {
                (Some(a), Some(m), Some(c), Some(false)) => {
                    let sum = a as u16 + m as u16 + c as u16;
                    state.c = Status::Known(sum > 0xFF);
                    Status::Known((sum & 0xFF) as u8)
                }
                _ => {
                    state.c = Status::Unknown;
                    Status::Unknown
                }
            };
            state.v = Status::Unknown;
            state.set_reg(Reg::A, value);
            state.set_nz(value);
        }
        SBC => {
            let value = match (before.a.known(), imm, before.c.known(), before.d.known()) {
                (Some(a), Some(m), Some(c), Some(false)) => {
                    let diff = (a as i16) - (m as i16) - (1 - c as i16);
                    state.c = Status::Known(diff >= 0);
                    Status::Known((diff & 0xFF) as u8)
                }
                _ => {
                    state.c = Status::Unknown;
                    Status::Unknown
                }
            };
            state.v = Status::Unknown;
            state.set_reg(Reg::A, value);
            state.set_nz(value);
        }
        AND | ORA | EOR => {
            let value = match (before.a.known(), imm) {
                (Some(a), Some(m)) => Status::Known(match line.opcode {
                    AND => a & m,
                    ORA => a | m,
                    _ => a ^ m,
                }),
                _ => Status::Unknown,
            };
            state.set_reg(Reg::A, value);
            state.set_nz(value);
        }
        ANC => {
            state.set_reg(Reg::A, Status::Unknown);
            state.set_nz(Status::Unknown);
            state.c = Status::Unknown;
        }

        ASL | LSR | ROL | ROR if line.mode == AddrMode::Implied => {
            let value = match (before.a.known(), before.c.known()) {
                (Some(a), carry) => match line.opcode {
                    ASL => {
                        state.c = Status::Known(a & 0x80 != 0);
                        Status::Known(a << 1)
                    }
                    LSR => {
                        state.c = Status::Known(a & 1 != 0);
                        Status::Known(a >> 1)
                    }
                    ROL => match carry {
                        Some(c) => {
                            state.c = Status::Known(a & 0x80 != 0);
                            Status::Known((a << 1) | c as u8)
                        }
                        None => {
                            state.c = Status::Known(a & 0x80 != 0);
                            Status::Unknown
                        }
                    },
                    _ => match carry {
                        Some(c) => {
                            state.c = Status::Known(a & 1 != 0);
                            Status::Known((a >> 1) | ((c as u8) << 7))
                        }
                        None => {
                            state.c = Status::Known(a & 1 != 0);
                            Status::Unknown
                        }
                    },
                },
                (None, _) => {
                    state.c = Status::Unknown;
                    Status::Unknown
                }
            };
            state.set_reg(Reg::A, value);
            state.set_nz(value);
        }
        ASL | LSR | ROL | ROR => {
            // Memory shift.
            state.n = Status::Unknown;
            state.z = Status::Unknown;
            state.c = Status::Unknown;
        }

        CPZ => {
            // The Z register is not tracked.
            state.c = Status::Unknown;
            state.z = Status::Unknown;
            state.n = Status::Unknown;
        }
        CMP | CPX | CPY => {
            let register = match line.opcode {
                CMP => before.a.known(),
                CPX => before.x.known(),
                _ => before.y.known(),
            };
            match (register, imm) {
                (Some(r), Some(m)) => {
                    state.c = Status::Known(r >= m);
                    state.z = Status::Known(r == m);
                    state.n = Status::Known(r.wrapping_sub(m) >= 0x80);
                }
                _ => {
                    state.c = Status::Unknown;
                    state.z = Status::Unknown;
                    state.n = Status::Unknown;
                }
            }
        }
        BIT => {
            state.n = Status::Unknown;
            state.z = Status::Unknown;
            state.v = Status::Unknown;
        }

        PHA | PHP | PHX | PHY | PHZ => {}
        PLA => {
            state.set_reg(Reg::A, Status::Unknown);
            state.set_nz(Status::Unknown);
        }
        PLX => {
            state.set_reg(Reg::X, Status::Unknown);
            state.set_nz(Status::Unknown);
        }
        PLY => {
            state.set_reg(Reg::Y, Status::Unknown);
            state.set_nz(Status::Unknown);
        }
        PLP => {
            state.clobber_flags();
            state.d = Status::Unknown;
            state.i = Status::Unknown;
        }

        JSR | BSR | JSL => {
            // Calls may do anything.
            state.clobber_all();
        }

        NOP => {}

        // Branches do not change state; joins happen at labels.
        BCC | BCS | BEQ | BNE | BMI | BPL | BVC | BVS | BRA | BRL => {}
        JMP | RTS | RTI | RTL | RTN | BRK | STP | WAI => {}

        // Everything else is modelled conservatively.
        _ => {
            state.clobber_all();
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::Constant;

    fn lda_imm(v: i64) -> AssemblyLine {
        AssemblyLine::immediate(Opcode::LDA, Constant::num(v))
    }

    #[test]
    fn test_lda_immediate_known() {
        let state = transfer(&CpuStatus::unknown(), &lda_imm(0));
        assert_eq!(state.a, Status::Known(0));
        assert_eq!(state.z, Status::Known(true));
        assert_eq!(state.n, Status::Known(false));
    }

    #[test]
    fn test_transfer_chain_adc() {
        let mut state = CpuStatus::unknown();
        state = transfer(&state, &lda_imm(40));
        state = transfer(&state, &AssemblyLine::implied(Opcode::CLC));
        state = transfer(
            &state,
            &AssemblyLine::immediate(Opcode::ADC, Constant::num(2)),
        );
        assert_eq!(state.a, Status::Known(42));
        assert_eq!(state.c, Status::Known(false));
    }

    #[test]
    fn test_tax_copies_known() {
        let mut state = CpuStatus::unknown();
        state = transfer(&state, &lda_imm(7));
        state = transfer(&state, &AssemblyLine::implied(Opcode::TAX));
        assert_eq!(state.x, Status::Known(7));
        assert!(state.regs_equal(Reg::A, Reg::X));
    }

    #[test]
    fn test_tax_unknown_becomes_same_as() {
        let mut state = CpuStatus::unknown();
        state = transfer(&state, &AssemblyLine::absolute(Opcode::LDA, Constant::address("v")));
        state = transfer(&state, &AssemblyLine::implied(Opcode::TAX));
        assert_eq!(state.x, Status::SameAs(Reg::A));
        assert!(state.regs_equal(Reg::A, Reg::X));
        // Overwriting A invalidates the alias.
        state = transfer(&state, &lda_imm(0));
        assert!(!state.regs_equal(Reg::A, Reg::X));
    }

    #[test]
    fn test_jsr_clobbers_everything() {
        let mut state = transfer(&CpuStatus::unknown(), &lda_imm(1));
        state = transfer(
            &state,
            &AssemblyLine::absolute(Opcode::JSR, Constant::address("f")),
        );
        assert_eq!(state.a, Status::Unknown);
    }

    #[test]
    fn test_memory_load_unknown_but_store_preserves() {
        let mut state = transfer(&CpuStatus::unknown(), &lda_imm(9));
        state = transfer(
            &state,
            &AssemblyLine::absolute(Opcode::STA, Constant::address("v")),
        );
        assert_eq!(state.a, Status::Known(9));
    }

    #[test]
    fn test_join() {
        let known = transfer(&CpuStatus::unknown(), &lda_imm(1));
        let other = transfer(&CpuStatus::unknown(), &lda_imm(2));
        assert_eq!(known.join(known).a, Status::Known(1));
        assert_eq!(known.join(other).a, Status::Unknown);
    }
}
