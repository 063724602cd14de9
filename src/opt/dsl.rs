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

//! The peephole rule DSL.
//!
//! A rule is data, not code: a window pattern, preconditions over the
//! dataflow facts at the window, and a replacement template. Keeping
//! rules declarative buys deterministic ordering, introspective debug
//! logging, and a uniform safety gate: a rule can only consume elidable
//! lines, and its replacement must not cost more than the window under
//! the active metric.
//!
//! Operand slots unify across the window: the first line that matches
//! `Slot(n)` binds it, later uses must be structurally equal (after
//! `quick_simplify`). `SlotPlus(n, k)` matches an operand equal to the
//! binding of `n` offset by `k`.

use crate::asm::{AddrMode, AssemblyLine, Opcode};
use crate::constant::Constant;
use crate::dataflow::{CpuImportance, CpuStatus, Reg};
use crate::options::OptimizationMetric;
use std::collections::HashMap;

/// Which opcodes a pattern line accepts.
#[derive(Debug, Clone)]
pub enum OpcodeMatcher {
    In(Vec<Opcode>),
    AnyExcept(Vec<Opcode>),
}

impl OpcodeMatcher {
    fn matches(&self, opcode: Opcode) -> bool {
        match self {
            OpcodeMatcher::In(set) => set.contains(&opcode),
            OpcodeMatcher::AnyExcept(set) => !set.contains(&opcode),
        }
    }
}

/// Which addressing modes a pattern line accepts.
#[derive(Debug, Clone)]
pub enum ModeMatcher {
    Any,
    In(Vec<AddrMode>),
}

impl ModeMatcher {
    fn matches(&self, mode: AddrMode) -> bool {
        match self {
            ModeMatcher::Any => true,
            ModeMatcher::In(set) => set.contains(&mode),
        }
    }
}

/// Operand constraint, possibly binding a unification slot.
#[derive(Debug, Clone)]
pub enum OperandMatcher {
    Any,
    /// Bind or compare against slot `n`.
    Slot(u8),
    /// Match the binding of slot `n` offset by a constant.
    SlotPlus(u8, i64),
    /// Match one exact constant.
    Equals(Constant),
}

/// One line of a window pattern.
#[derive(Debug, Clone)]
pub struct LinePattern {
    pub opcodes: OpcodeMatcher,
    pub modes: ModeMatcher,
    pub operand: OperandMatcher,
}

impl LinePattern {
    pub fn of(opcode: Opcode) -> Self {
        Self {
            opcodes: OpcodeMatcher::In(vec![opcode]),
            modes: ModeMatcher::Any,
            operand: OperandMatcher::Any,
        }
    }

    pub fn of_any(opcodes: Vec<Opcode>) -> Self {
        Self {
            opcodes: OpcodeMatcher::In(opcodes),
            modes: ModeMatcher::Any,
            operand: OperandMatcher::Any,
        }
    }

    pub fn with_mode(mut self, modes: Vec<AddrMode>) -> Self {
        self.modes = ModeMatcher::In(modes);
        self
    }

    pub fn with_operand(mut self, operand: OperandMatcher) -> Self {
        self.operand = operand;
        self
    }

    pub fn immediate(opcode: Opcode, operand: OperandMatcher) -> Self {
        Self::of(opcode)
            .with_mode(vec![AddrMode::Immediate])
            .with_operand(operand)
    }
}

/// Facts a rule may require before firing.
#[derive(Debug, Clone)]
pub enum Precondition {
    /// The named register is known to hold this value at the window start.
    RegKnown(Reg, u8),
    /// Two registers provably hold the same value at the window start.
    RegsEqual(Reg, Reg),
    /// The register's value at the window start equals the constant bound
    /// to the slot.
    RegMatchesSlot(Reg, u8),
    /// Carry is known at the window start.
    CarryKnown(bool),
    /// Decimal flag is known at the window start.
    DecimalKnown(bool),
    /// The register is dead after the window.
    RegDead(Reg),
    /// N and Z are dead after the window.
    FlagsNzDead,
    /// Carry is dead after the window.
    CarryDead,
    /// Overflow is dead after the window.
    OverflowDead,
    /// The constants bound to two slots refer to provably distinct memory.
    SlotsUnrelated(u8, u8),
}

/// Where a replacement line's addressing mode comes from.
#[derive(Debug, Clone)]
pub enum ModeFrom {
    Fixed(AddrMode),
    CopyFrom(usize),
}

/// Where a replacement line's operand comes from.
#[derive(Debug, Clone)]
pub enum NewOperand {
    Slot(u8),
    SlotPlus(u8, i64),
    Fixed(Constant),
    CopyFrom(usize),
}

/// One line of a replacement template.
#[derive(Debug, Clone)]
pub struct LineTemplate {
    pub opcode: Opcode,
    pub mode: ModeFrom,
    pub operand: NewOperand,
}

impl LineTemplate {
    pub fn copy(index: usize) -> Self {
        // Opcode is taken from the copied line; the field is ignored.
        Self {
            opcode: Opcode::NOP,
            mode: ModeFrom::CopyFrom(index),
            operand: NewOperand::CopyFrom(index),
        }
    }

    pub fn implied(opcode: Opcode) -> Self {
        Self {
            opcode,
            mode: ModeFrom::Fixed(AddrMode::Implied),
            operand: NewOperand::Fixed(Constant::zero()),
        }
    }

    pub fn immediate(opcode: Opcode, operand: NewOperand) -> Self {
        Self {
            opcode,
            mode: ModeFrom::Fixed(AddrMode::Immediate),
            operand,
        }
    }
}

/// A complete peephole rule.
#[derive(Debug, Clone)]
pub struct AssemblyRule {
    pub name: &'static str,
    pub pattern: Vec<LinePattern>,
    pub preconditions: Vec<Precondition>,
    /// Replacement; `LineTemplate::copy(i)` keeps matched line `i` as is.
    pub transform: Vec<LineTemplate>,
}

/// Slot bindings collected while matching one window.
#[derive(Debug, Default)]
pub struct Bindings {
    slots: HashMap<u8, Constant>,
}

impl Bindings {
    fn bind_or_check(&mut self, slot: u8, operand: &Constant) -> bool {
        let normalized = operand.quick_simplify();
        match self.slots.get(&slot) {
            Some(bound) => *bound == normalized,
            None => {
                self.slots.insert(slot, normalized);
                true
            }
        }
    }

    pub fn get(&self, slot: u8) -> Option<&Constant> {
        self.slots.get(&slot)
    }
}

/// Names a constant might address.
fn root_names(constant: &Constant) -> Vec<&str> {
    fn walk<'c>(c: &'c Constant, out: &mut Vec<&'c str>) {
        match c {
            Constant::MemoryAddress { name } | Constant::Unexpanded { name, .. } => out.push(name),
            Constant::Subbyte { base, .. } => walk(base, out),
            Constant::AssertByte { inner } => walk(inner, out),
            Constant::Compound { lhs, rhs, .. } => {
                walk(lhs, out);
                walk(rhs, out);
            }
            Constant::Numeric { .. } => {}
        }
    }
    let mut names = Vec::new();
    walk(constant, &mut names);
    names
}

/// Whether two operand constants provably address distinct memory.
pub fn provably_unrelated(a: &Constant, b: &Constant) -> bool {
    let names_a = root_names(a);
    let names_b = root_names(b);
    if names_a.is_empty() && names_b.is_empty() {
        // Two plain addresses: distinct values cannot alias.
        return match (a.eval(), b.eval()) {
            (Some(va), Some(vb)) => va != vb,
            _ => false,
        };
    }
    if names_a.iter().any(|n| names_b.contains(n)) {
        return false;
    }
    // Different named things never overlap; a name against a bare number
    // is undecidable without the final layout.
    !names_a.is_empty() && !names_b.is_empty()
}

impl AssemblyRule {
    /// Try to match this rule at `at`; returns the bindings on success.
    pub fn matches(&self, lines: &[AssemblyLine], at: usize) -> Option<Bindings> {
        if at + self.pattern.len() > lines.len() {
            return None;
        }
        let mut bindings = Bindings::default();
        for (pattern, line) in self.pattern.iter().zip(&lines[at..]) {
            // Only elidable lines may be consumed.
            if !line.elidable {
                return None;
            }
            if !pattern.opcodes.matches(line.opcode) || !pattern.modes.matches(line.mode) {
                return None;
            }
            match &pattern.operand {
                OperandMatcher::Any => {}
                OperandMatcher::Slot(slot) => {
                    if !bindings.bind_or_check(*slot, &line.operand) {
                        return None;
                    }
                }
                OperandMatcher::SlotPlus(slot, offset) => {
                    let Some(bound) = bindings.get(*slot).cloned() else {
                        return None;
                    };
                    if bound.plus(*offset) != line.operand.quick_simplify() {
                        return None;
                    }
                }
                OperandMatcher::Equals(expected) => {
                    if line.operand.quick_simplify() != expected.quick_simplify() {
                        return None;
                    }
                }
            }
        }
        Some(bindings)
    }

    /// Check preconditions against the dataflow facts.
    pub fn preconditions_hold(
        &self,
        bindings: &Bindings,
        state_before: &CpuStatus,
        live_after: &CpuImportance,
    ) -> bool {
        use crate::dataflow::Status;
        self.preconditions.iter().all(|p| match p {
            Precondition::RegKnown(reg, value) => {
                state_before.reg(*reg).known() == Some(*value)
            }
            Precondition::RegsEqual(left, right) => state_before.regs_equal(*left, *right),
            Precondition::RegMatchesSlot(reg, slot) => match bindings.get(*slot) {
                Some(c) => match (state_before.reg(*reg), c.eval()) {
                    (Status::Known(r), Some(v)) => r as i64 == (v & 0xFF),
                    _ => false,
                },
                None => false,
            },
            Precondition::CarryKnown(value) => state_before.c.known() == Some(*value),
            Precondition::DecimalKnown(value) => state_before.d.known() == Some(*value),
            Precondition::RegDead(reg) => match reg {
                Reg::A => !live_after.a,
                Reg::X => !live_after.x,
                Reg::Y => !live_after.y,
            },
            Precondition::FlagsNzDead => !live_after.n && !live_after.z,
            Precondition::CarryDead => !live_after.c,
            Precondition::OverflowDead => !live_after.v,
            Precondition::SlotsUnrelated(a, b) => match (bindings.get(*a), bindings.get(*b)) {
                (Some(ca), Some(cb)) => provably_unrelated(ca, cb),
                _ => false,
            },
        })
    }

    /// Build the replacement lines for a successful match.
    pub fn apply(&self, lines: &[AssemblyLine], at: usize, bindings: &Bindings) -> Vec<AssemblyLine> {
        self.transform
            .iter()
            .map(|template| match (&template.mode, &template.operand) {
                (ModeFrom::CopyFrom(i), NewOperand::CopyFrom(j)) if i == j => {
                    lines[at + i].clone()
                }
                _ => {
                    let mode = match &template.mode {
                        ModeFrom::Fixed(mode) => *mode,
                        ModeFrom::CopyFrom(i) => lines[at + i].mode,
                    };
                    let operand = match &template.operand {
                        NewOperand::Slot(slot) => bindings
                            .get(*slot)
                            .cloned()
                            .unwrap_or_else(Constant::zero),
                        NewOperand::SlotPlus(slot, offset) => bindings
                            .get(*slot)
                            .map(|c| c.plus(*offset))
                            .unwrap_or_else(Constant::zero),
                        NewOperand::Fixed(c) => c.clone(),
                        NewOperand::CopyFrom(i) => lines[at + i].operand.clone(),
                    };
                    AssemblyLine::new(template.opcode, mode, operand)
                }
            })
            .collect()
    }

    /// Cost of a window under the active metric.
    pub fn window_cost(lines: &[AssemblyLine], metric: OptimizationMetric) -> u32 {
        lines
            .iter()
            .map(|line| match metric {
                OptimizationMetric::Size => line.size_in_bytes() as u32,
                OptimizationMetric::Speed | OptimizationMetric::ExtremeSpeed => line.cycles(),
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_load_rule() -> AssemblyRule {
        AssemblyRule {
            name: "pointless-load-after-store",
            pattern: vec![
                LinePattern::of(Opcode::STA).with_operand(OperandMatcher::Slot(0)),
                LinePattern::of(Opcode::LDA).with_operand(OperandMatcher::Slot(0)),
            ],
            preconditions: vec![Precondition::FlagsNzDead],
            transform: vec![LineTemplate::copy(0)],
        }
    }

    #[test]
    fn test_slot_unification() {
        let rule = store_load_rule();
        let same = vec![
            AssemblyLine::absolute(Opcode::STA, Constant::address("v")),
            AssemblyLine::absolute(Opcode::LDA, Constant::address("v")),
        ];
        assert!(rule.matches(&same, 0).is_some());

        let different = vec![
            AssemblyLine::absolute(Opcode::STA, Constant::address("v")),
            AssemblyLine::absolute(Opcode::LDA, Constant::address("w")),
        ];
        assert!(rule.matches(&different, 0).is_none());
    }

    #[test]
    fn test_non_elidable_lines_never_consumed() {
        let rule = store_load_rule();
        let lines = vec![
            AssemblyLine::absolute(Opcode::STA, Constant::address("v")).non_elidable(),
            AssemblyLine::absolute(Opcode::LDA, Constant::address("v")),
        ];
        assert!(rule.matches(&lines, 0).is_none());
    }

    #[test]
    fn test_apply_copies_window_line() {
        let rule = store_load_rule();
        let lines = vec![
            AssemblyLine::absolute(Opcode::STA, Constant::address("v")),
            AssemblyLine::absolute(Opcode::LDA, Constant::address("v")),
        ];
        let bindings = rule.matches(&lines, 0).unwrap();
        let replacement = rule.apply(&lines, 0, &bindings);
        assert_eq!(replacement, vec![lines[0].clone()]);
    }

    #[test]
    fn test_slot_plus_matching() {
        let pattern = vec![
            LinePattern::of(Opcode::INC).with_operand(OperandMatcher::Slot(0)),
            LinePattern::of(Opcode::INC).with_operand(OperandMatcher::SlotPlus(0, 1)),
        ];
        let rule = AssemblyRule {
            name: "test",
            pattern,
            preconditions: vec![],
            transform: vec![],
        };
        let lines = vec![
            AssemblyLine::zero_page(Opcode::INC, Constant::address("w")),
            AssemblyLine::zero_page(Opcode::INC, Constant::address("w").plus(1)),
        ];
        assert!(rule.matches(&lines, 0).is_some());
    }

    #[test]
    fn test_relatedness() {
        let a = Constant::address("alpha");
        let b = Constant::address("beta");
        assert!(provably_unrelated(&a, &b));
        assert!(!provably_unrelated(&a, &a.plus(1)));
        assert!(provably_unrelated(&Constant::num(0x10), &Constant::num(0x11)));
        assert!(!provably_unrelated(&a, &Constant::num(0x10)));
    }
}
