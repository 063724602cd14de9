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

//! Forward state analysis and backward liveness.
//!
//! Both analyses are per-function fixpoints over the flat line list.
//! Control flow is recovered from branch operands: a branch or jump to a
//! label inside the function joins states at that label's line; a jump to
//! anything else is treated as leaving the function. The lattices are
//! finite and the transfer functions monotone, so both loops converge; a
//! pass cap guards against surprises anyway.

use super::{transfer, CpuStatus};
use crate::asm::{AddrMode, AssemblyLine, Opcode};
use crate::constant::Constant;
use std::collections::HashMap;

/// Upper bound on fixpoint sweeps; far above what real code needs.
const MAX_PASSES: usize = 64;

/// Map from label name to its line index.
fn label_indices(lines: &[AssemblyLine]) -> HashMap<&str, usize> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| line.defined_label().map(|name| (name, i)))
        .collect()
}

/// The branch target label of a line, if it has one.
fn branch_target(line: &AssemblyLine) -> Option<&str> {
    let is_flow = line.opcode.is_branch() || line.opcode == Opcode::JMP;
    if !is_flow || line.mode == AddrMode::Indirect {
        return None;
    }
    match &line.operand {
        Constant::MemoryAddress { name } => Some(name),
        _ => None,
    }
}

/// Forward analysis: the conservative pre-state of every line.
pub fn analyze(lines: &[AssemblyLine]) -> Vec<CpuStatus> {
    let labels = label_indices(lines);
    let mut pre: Vec<CpuStatus> = vec![CpuStatus::unknown(); lines.len()];
    // Entry state is fully unknown already; only label joins need seeding.
    let mut incoming: HashMap<usize, CpuStatus> = HashMap::new();
    let mut first = true;

    for _ in 0..MAX_PASSES {
        let mut changed = false;
        let mut state = CpuStatus::unknown();
        let mut reachable = true;

        for (i, line) in lines.iter().enumerate() {
            if let Some(target) = line.defined_label() {
                let joined = match incoming.get(&labels[target]) {
                    Some(inc) if reachable => state.join(*inc),
                    Some(inc) => *inc,
                    None if reachable => state,
                    // Label only reachable by jumps not seen yet.
                    None => CpuStatus::unknown(),
                };
                state = joined;
                reachable = true;
            } else if !reachable {
                // Dead code after a barrier: nothing known.
                state = CpuStatus::unknown();
            }

            if pre[i] != state {
                pre[i] = state;
                changed = true;
            }

            let after = transfer(&state, line);

            if let Some(target) = branch_target(line) {
                if let Some(&target_index) = labels.get(target) {
                    let entry = incoming
                        .entry(target_index)
                        .or_insert(after);
                    let joined = entry.join(after);
                    if *entry != joined {
                        *entry = joined;
                        changed = true;
                    }
                }
            }

            if line.opcode.is_control_flow_barrier() {
                reachable = false;
            }
            state = after;
        }

        if !changed && !first {
            break;
        }
        first = false;
    }
    pre
}

/// Liveness of registers and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuImportance {
    pub a: bool,
    pub x: bool,
    pub y: bool,
    pub n: bool,
    pub z: bool,
    pub c: bool,
    pub v: bool,
    pub d: bool,
}

impl CpuImportance {
    /// Everything live; the safe assumption around calls.
    pub fn all_live() -> Self {
        Self {
            a: true,
            x: true,
            y: true,
            n: true,
            z: true,
            c: true,
            v: true,
            d: true,
        }
    }

    /// Liveness at a return: the register return conventions and the
    /// sticky decimal flag matter to the caller, arithmetic flags do not.
    pub fn at_exit() -> Self {
        Self {
            a: true,
            x: true,
            y: true,
            n: false,
            z: false,
            c: false,
            v: false,
            d: true,
        }
    }

    fn none() -> Self {
        Self {
            a: false,
            x: false,
            y: false,
            n: false,
            z: false,
            c: false,
            v: false,
            d: false,
        }
    }

    fn union(self, other: Self) -> Self {
        Self {
            a: self.a || other.a,
            x: self.x || other.x,
            y: self.y || other.y,
            n: self.n || other.n,
            z: self.z || other.z,
            c: self.c || other.c,
            v: self.v || other.v,
            d: self.d || other.d,
        }
    }
}

struct Effects {
    reads: CpuImportance,
    writes: CpuImportance,
}

fn effects(line: &AssemblyLine) -> Effects {
    use Opcode::*;
    let mut reads = CpuImportance::none();
    let mut writes = CpuImportance::none();

    // Index registers feeding indexed modes are read.
    match line.mode {
        AddrMode::ZeroPageX | AddrMode::AbsoluteX | AddrMode::LongAbsoluteX | AddrMode::IndexedX => {
            reads.x = true
        }
        AddrMode::ZeroPageY | AddrMode::AbsoluteY | AddrMode::IndexedY | AddrMode::IndexedSY
        | AddrMode::LongIndexedY => reads.y = true,
        _ => {}
    }

    match line.opcode {
        LDA => {
            writes.a = true;
            writes.n = true;
            writes.z = true;
        }
        LDX => {
            writes.x = true;
            writes.n = true;
            writes.z = true;
        }
        LDY => {
            writes.y = true;
            writes.n = true;
            writes.z = true;
        }
        LAX => {
            writes.a = true;
            writes.x = true;
            writes.n = true;
            writes.z = true;
        }
        STA => reads.a = true,
        STX => reads.x = true,
        STY => reads.y = true,
        SAX => {
            reads.a = true;
            reads.x = true;
        }
        STZ => {}
        TAX => {
            reads.a = true;
            writes.x = true;
            writes.n = true;
            writes.z = true;
        }
        TAY => {
            reads.a = true;
            writes.y = true;
            writes.n = true;
            writes.z = true;
        }
        TXA => {
            reads.x = true;
            writes.a = true;
            writes.n = true;
            writes.z = true;
        }
        TYA => {
            reads.y = true;
            writes.a = true;
            writes.n = true;
            writes.z = true;
        }
        TSX => {
            writes.x = true;
            writes.n = true;
            writes.z = true;
        }
        TXS => reads.x = true,
        INX | DEX => {
            reads.x = true;
            writes.x = true;
            writes.n = true;
            writes.z = true;
        }
        INY | DEY => {
            reads.y = true;
            writes.y = true;
            writes.n = true;
            writes.z = true;
        }
        INC | DEC if line.mode == AddrMode::Implied => {
            reads.a = true;
            writes.a = true;
            writes.n = true;
            writes.z = true;
        }
        INC | DEC | TRB | TSB => {
            writes.n = true;
            writes.z = true;
        }
        ADC | SBC => {
            reads.a = true;
            reads.c = true;
            reads.d = true;
            writes.a = true;
            writes.n = true;
            writes.z = true;
            writes.c = true;
            writes.v = true;
        }
        AND | ORA | EOR => {
            reads.a = true;
            writes.a = true;
            writes.n = true;
            writes.z = true;
        }
        ASL | LSR if line.mode == AddrMode::Implied => {
            reads.a = true;
            writes.a = true;
            writes.n = true;
            writes.z = true;
            writes.c = true;
        }
        ROL | ROR if line.mode == AddrMode::Implied => {
            reads.a = true;
            reads.c = true;
            writes.a = true;
            writes.n = true;
            writes.z = true;
            writes.c = true;
        }
        ASL | LSR => {
            writes.n = true;
            writes.z = true;
            writes.c = true;
        }
        ROL | ROR => {
            reads.c = true;
            writes.n = true;
            writes.z = true;
            writes.c = true;
        }
        CMP => {
            reads.a = true;
            writes.n = true;
            writes.z = true;
            writes.c = true;
        }
        CPX => {
            reads.x = true;
            writes.n = true;
            writes.z = true;
            writes.c = true;
        }
        CPY => {
            reads.y = true;
            writes.n = true;
            writes.z = true;
            writes.c = true;
        }
        BIT => {
            reads.a = true;
            writes.n = true;
            writes.z = true;
            writes.v = true;
        }
        CLC | SEC => writes.c = true,
        CLD | SED => writes.d = true,
        CLV => writes.v = true,
        CLI | SEI => {}
        PHA => reads.a = true,
        PHX => reads.x = true,
        PHY => reads.y = true,
        PHP => {
            reads.n = true;
            reads.z = true;
            reads.c = true;
            reads.v = true;
            reads.d = true;
        }
        PLA => {
            writes.a = true;
            writes.n = true;
            writes.z = true;
        }
        PLX => {
            writes.x = true;
            writes.n = true;
            writes.z = true;
        }
        PLY => {
            writes.y = true;
            writes.n = true;
            writes.z = true;
        }
        PLP => {
            writes.n = true;
            writes.z = true;
            writes.c = true;
            writes.v = true;
            writes.d = true;
        }
        BCC | BCS => reads.c = true,
        BEQ | BNE => reads.z = true,
        BMI | BPL => reads.n = true,
        BVC | BVS => reads.v = true,
        SBX => {
            reads.a = true;
            reads.x = true;
            writes.x = true;
            writes.n = true;
            writes.z = true;
            writes.c = true;
        }
        LABEL | BYTE | NOP | BRA | JMP => {}
        // Returns read nothing themselves; the exit convention is applied
        // to their out-state by the liveness walk.
        RTS | RTI | RTL | RTN | BRK | STP | WAI => {}
        // Calls: assume the world is read.
        _ => {
            reads = CpuImportance::all_live();
        }
    }
    Effects { reads, writes }
}

/// Backward liveness: what is live *after* each line.
pub fn liveness(lines: &[AssemblyLine]) -> Vec<CpuImportance> {
    let labels = label_indices(lines);
    let mut live_after: Vec<CpuImportance> = vec![CpuImportance::all_live(); lines.len()];
    let mut live_before: Vec<CpuImportance> = vec![CpuImportance::all_live(); lines.len()];

    for _ in 0..MAX_PASSES {
        let mut changed = false;
        for i in (0..lines.len()).rev() {
            let line = &lines[i];

            let mut after = if line.opcode.is_control_flow_barrier() {
                CpuImportance::none()
            } else if i + 1 < lines.len() {
                live_before[i + 1]
            } else {
                CpuImportance::at_exit()
            };

            // A branch or jump adds its target's liveness.
            if let Some(target) = branch_target(line) {
                match labels.get(target) {
                    Some(&t) => after = after.union(live_before[t]),
                    // Jumping out of the function is a return in disguise.
                    None => after = after.union(CpuImportance::at_exit()),
                }
            }
            // Returns follow the exit convention; calls may read anything.
            if matches!(
                line.opcode,
                Opcode::RTS | Opcode::RTI | Opcode::RTL | Opcode::RTN
            ) {
                after = after.union(CpuImportance::at_exit());
            }
            if matches!(line.opcode, Opcode::JSR | Opcode::BSR | Opcode::JSL) {
                after = CpuImportance::all_live();
            }

            let Effects { reads, writes } = effects(line);
            let before = CpuImportance {
                a: (after.a && !writes.a) || reads.a,
                x: (after.x && !writes.x) || reads.x,
                y: (after.y && !writes.y) || reads.y,
                n: (after.n && !writes.n) || reads.n,
                z: (after.z && !writes.z) || reads.z,
                c: (after.c && !writes.c) || reads.c,
                v: (after.v && !writes.v) || reads.v,
                d: (after.d && !writes.d) || reads.d,
            };

            if live_after[i] != after || live_before[i] != before {
                live_after[i] = after;
                live_before[i] = before;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    live_after
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Label;
    use crate::dataflow::Status;

    #[test]
    fn test_forward_straight_line() {
        let lines = vec![
            AssemblyLine::immediate(Opcode::LDA, Constant::num(5)),
            AssemblyLine::implied(Opcode::TAX),
            AssemblyLine::implied(Opcode::RTS),
        ];
        let pre = analyze(&lines);
        assert_eq!(pre[1].a, Status::Known(5));
        assert_eq!(pre[2].x, Status::Known(5));
    }

    #[test]
    fn test_forward_join_at_label() {
        // Two paths load different values, so the join is unknown.
        let merge = Label::new(".merge");
        let skip = Label::new(".skip");
        let lines = vec![
            AssemblyLine::relative(Opcode::BEQ, &skip),
            AssemblyLine::immediate(Opcode::LDA, Constant::num(1)),
            AssemblyLine::absolute_jump(Opcode::JMP, &merge),
            AssemblyLine::label(&skip),
            AssemblyLine::immediate(Opcode::LDA, Constant::num(2)),
            AssemblyLine::label(&merge),
            AssemblyLine::implied(Opcode::RTS),
        ];
        let pre = analyze(&lines);
        assert_eq!(pre[6].a, Status::Unknown);
    }

    #[test]
    fn test_forward_consistent_join_stays_known() {
        let merge = Label::new(".merge");
        let skip = Label::new(".skip");
        let lines = vec![
            AssemblyLine::relative(Opcode::BEQ, &skip),
            AssemblyLine::immediate(Opcode::LDA, Constant::num(7)),
            AssemblyLine::absolute_jump(Opcode::JMP, &merge),
            AssemblyLine::label(&skip),
            AssemblyLine::immediate(Opcode::LDA, Constant::num(7)),
            AssemblyLine::label(&merge),
            AssemblyLine::implied(Opcode::RTS),
        ];
        let pre = analyze(&lines);
        assert_eq!(pre[6].a, Status::Known(7));
    }

    #[test]
    fn test_liveness_dead_store() {
        // The first LDA's value is never read before the second overwrite.
        let lines = vec![
            AssemblyLine::immediate(Opcode::LDA, Constant::num(1)),
            AssemblyLine::immediate(Opcode::LDA, Constant::num(2)),
            AssemblyLine::absolute(Opcode::STA, Constant::address("out")),
            AssemblyLine::implied(Opcode::RTS),
        ];
        let live = liveness(&lines);
        assert!(!live[0].a, "A written by line 0 is dead");
        assert!(live[1].a, "A written by line 1 feeds the store");
    }

    #[test]
    fn test_liveness_flags_dead_before_load() {
        let lines = vec![
            AssemblyLine::implied(Opcode::CLC),
            AssemblyLine::immediate(Opcode::LDA, Constant::num(1)),
            AssemblyLine::implied(Opcode::CLC),
            AssemblyLine::immediate(Opcode::ADC, Constant::num(2)),
            AssemblyLine::implied(Opcode::RTS),
        ];
        let live = liveness(&lines);
        // The first CLC's carry is overwritten by the second before ADC.
        assert!(!live[0].c);
        assert!(live[2].c);
    }

    #[test]
    fn test_liveness_branch_keeps_register() {
        let target = Label::new(".use");
        let lines = vec![
            AssemblyLine::immediate(Opcode::LDX, Constant::num(3)),
            AssemblyLine::relative(Opcode::BEQ, &target),
            AssemblyLine::implied(Opcode::RTS),
            AssemblyLine::label(&target),
            AssemblyLine::absolute(Opcode::STX, Constant::address("out")),
            AssemblyLine::implied(Opcode::RTS),
        ];
        let live = liveness(&lines);
        assert!(live[0].x, "X flows to the branch target");
    }
}
