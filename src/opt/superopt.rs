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

//! The superoptimizer (`-O9`).
//!
//! For each short straight-line basic block, search bounded-length
//! candidate sequences over an alphabet derived from the block, and keep
//! the cheapest candidate that is operationally equivalent on a
//! deterministic corpus of input states: every corner value of A, X, Y
//! and carry, with memory cells seeded from a per-vector hash.
//!
//! Equivalence compares the registers and flags that are live after the
//! block plus every memory write either sequence performed. The search is
//! candidate-bounded per block, so overall time stays proportional to
//! program size.

use crate::asm::{AddrMode, AssemblyLine, Opcode};
use crate::dataflow::{liveness, CpuImportance};
use crate::env::JobContext;
use crate::opt::dsl::AssemblyRule;
use std::collections::HashMap;

/// Longest block the search will look at.
const MAX_BLOCK_LEN: usize = 6;
/// Candidate sequences tried per block before giving up.
const CANDIDATE_BUDGET: usize = 50_000;
/// Input-state vectors used for the equivalence check.
const VECTOR_COUNT: u64 = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Machine {
    a: u8,
    x: u8,
    y: u8,
    c: bool,
    n: bool,
    z: bool,
    v: bool,
    seed: u64,
    mem: HashMap<String, u8>,
    written: HashMap<String, u8>,
}

fn mix(seed: u64, text: &str) -> u8 {
    let mut h = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    for b in text.bytes() {
        h = h.rotate_left(9) ^ (b as u64).wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    }
    (h >> 17) as u8
}

impl Machine {
    fn vector(index: u64) -> Self {
        // Corner-flavoured register values, deterministic per index.
        let corners = [0u8, 1, 2, 0x7F, 0x80, 0xFE, 0xFF];
        Self {
            a: corners[(index % 7) as usize],
            x: corners[((index / 7) % 7) as usize],
            y: corners[((index * 3 + 1) % 7) as usize],
            c: index % 2 == 1,
            n: false,
            z: false,
            v: false,
            seed: index.wrapping_mul(0x5851_F42D_4C95_7F2D) + 1,
            mem: HashMap::new(),
            written: HashMap::new(),
        }
    }

    fn read(&mut self, key: &str) -> u8 {
        if let Some(v) = self.mem.get(key) {
            return *v;
        }
        let v = mix(self.seed, key);
        self.mem.insert(key.to_string(), v);
        v
    }

    fn write(&mut self, key: &str, value: u8) {
        self.mem.insert(key.to_string(), value);
        self.written.insert(key.to_string(), value);
    }

    fn set_nz(&mut self, value: u8) {
        self.n = value >= 0x80;
        self.z = value == 0;
    }
}

fn operand_key(line: &AssemblyLine) -> String {
    line.operand.quick_simplify().to_string()
}

/// Execute one line; `None` means the instruction is outside the model.
fn step(machine: &mut Machine, line: &AssemblyLine) -> Option<()> {
    use Opcode::*;
    let value = match line.mode {
        AddrMode::Immediate => Some((line.operand.eval()? & 0xFF) as u8),
        AddrMode::ZeroPage | AddrMode::Absolute => {
            let key = operand_key(line);
            Some(machine.read(&key))
        }
        AddrMode::Implied => None,
        _ => return if matches!(line.opcode, NOP) { Some(()) } else { None },
    };

    match (line.opcode, line.mode) {
        (NOP, _) => {}
        (LDA, _) => {
            machine.a = value?;
            machine.set_nz(machine.a);
        }
        (LDX, _) => {
            machine.x = value?;
            machine.set_nz(machine.x);
        }
        (LDY, _) => {
            machine.y = value?;
            machine.set_nz(machine.y);
        }
        (STA, AddrMode::ZeroPage | AddrMode::Absolute) => {
            let key = operand_key(line);
            machine.write(&key, machine.a);
        }
        (STX, AddrMode::ZeroPage | AddrMode::Absolute) => {
            let key = operand_key(line);
            machine.write(&key, machine.x);
        }
        (STY, AddrMode::ZeroPage | AddrMode::Absolute) => {
            let key = operand_key(line);
            machine.write(&key, machine.y);
        }
        (TAX, _) => {
            machine.x = machine.a;
            machine.set_nz(machine.x);
        }
        (TAY, _) => {
            machine.y = machine.a;
            machine.set_nz(machine.y);
        }
        (TXA, _) => {
            machine.a = machine.x;
            machine.set_nz(machine.a);
        }
        (TYA, _) => {
            machine.a = machine.y;
            machine.set_nz(machine.a);
        }
        (INX, _) => {
            machine.x = machine.x.wrapping_add(1);
            machine.set_nz(machine.x);
        }
        (INY, _) => {
            machine.y = machine.y.wrapping_add(1);
            machine.set_nz(machine.y);
        }
        (DEX, _) => {
            machine.x = machine.x.wrapping_sub(1);
            machine.set_nz(machine.x);
        }
        (DEY, _) => {
            machine.y = machine.y.wrapping_sub(1);
            machine.set_nz(machine.y);
        }
        (CLC, _) => machine.c = false,
        (SEC, _) => machine.c = true,
        (ADC, _) => {
            let m = value?;
            let sum = machine.a as u16 + m as u16 + machine.c as u16;
            let result = (sum & 0xFF) as u8;
            machine.v = (!(machine.a ^ m) & (machine.a ^ result) & 0x80) != 0;
            machine.c = sum > 0xFF;
            machine.a = result;
            machine.set_nz(result);
        }
        (SBC, _) => {
            let m = value?;
            let diff = machine.a as i16 - m as i16 - (1 - machine.c as i16);
            let result = (diff & 0xFF) as u8;
            machine.v = ((machine.a ^ m) & (machine.a ^ result) & 0x80) != 0;
            machine.c = diff >= 0;
            machine.a = result;
            machine.set_nz(result);
        }
        (AND, _) => {
            machine.a &= value?;
            machine.set_nz(machine.a);
        }
        (ORA, _) => {
            machine.a |= value?;
            machine.set_nz(machine.a);
        }
        (EOR, _) => {
            machine.a ^= value?;
            machine.set_nz(machine.a);
        }
        (ASL, AddrMode::Implied) => {
            machine.c = machine.a & 0x80 != 0;
            machine.a <<= 1;
            machine.set_nz(machine.a);
        }
        (LSR, AddrMode::Implied) => {
            machine.c = machine.a & 1 != 0;
            machine.a >>= 1;
            machine.set_nz(machine.a);
        }
        (ROL, AddrMode::Implied) => {
            let carry_in = machine.c as u8;
            machine.c = machine.a & 0x80 != 0;
            machine.a = (machine.a << 1) | carry_in;
            machine.set_nz(machine.a);
        }
        (ROR, AddrMode::Implied) => {
            let carry_in = (machine.c as u8) << 7;
            machine.c = machine.a & 1 != 0;
            machine.a = (machine.a >> 1) | carry_in;
            machine.set_nz(machine.a);
        }
        (CMP, _) => {
            let m = value?;
            machine.c = machine.a >= m;
            machine.set_nz(machine.a.wrapping_sub(m));
        }
        (CPX, _) => {
            let m = value?;
            machine.c = machine.x >= m;
            machine.set_nz(machine.x.wrapping_sub(m));
        }
        (CPY, _) => {
            let m = value?;
            machine.c = machine.y >= m;
            machine.set_nz(machine.y.wrapping_sub(m));
        }
        _ => return None,
    }
    Some(())
}

fn run(lines: &[AssemblyLine], vector: u64) -> Option<Machine> {
    let mut machine = Machine::vector(vector);
    for line in lines {
        step(&mut machine, line)?;
    }
    Some(machine)
}

fn equivalent_on(original: &[AssemblyLine], candidate: &[AssemblyLine], live: CpuImportance) -> bool {
    for vector in 0..VECTOR_COUNT {
        let Some(expected) = run(original, vector) else {
            return false;
        };
        let Some(actual) = run(candidate, vector) else {
            return false;
        };
        if live.a && expected.a != actual.a {
            return false;
        }
        if live.x && expected.x != actual.x {
            return false;
        }
        if live.y && expected.y != actual.y {
            return false;
        }
        if live.n && expected.n != actual.n {
            return false;
        }
        if live.z && expected.z != actual.z {
            return false;
        }
        if live.c && expected.c != actual.c {
            return false;
        }
        if live.v && expected.v != actual.v {
            return false;
        }
        if expected.written != actual.written {
            return false;
        }
    }
    true
}

/// Whether the block is a candidate: elidable, straight-line, modelled.
fn block_supported(lines: &[AssemblyLine]) -> bool {
    lines.iter().all(|line| {
        line.elidable && {
            let mut machine = Machine::vector(0);
            step(&mut machine, line).is_some()
        }
    })
}

struct Search<'a> {
    alphabet: Vec<AssemblyLine>,
    live: CpuImportance,
    original: &'a [AssemblyLine],
    metric: crate::options::OptimizationMetric,
    best: Option<Vec<AssemblyLine>>,
    best_cost: u32,
    budget: usize,
}

impl Search<'_> {
    fn explore(&mut self, prefix: &mut Vec<AssemblyLine>, max_len: usize) {
        if self.budget == 0 {
            return;
        }
        self.budget -= 1;

        let cost = AssemblyRule::window_cost(prefix, self.metric);
        if cost >= self.best_cost {
            return;
        }
        if equivalent_on(self.original, prefix, self.live) {
            self.best = Some(prefix.clone());
            self.best_cost = cost;
            return;
        }
        if prefix.len() >= max_len {
            return;
        }
        for i in 0..self.alphabet.len() {
            let line = self.alphabet[i].clone();
            prefix.push(line);
            self.explore(prefix, max_len);
            prefix.pop();
        }
    }
}

/// Superoptimize every eligible basic block in a function.
pub fn superoptimize(lines: Vec<AssemblyLine>, job: &JobContext) -> Vec<AssemblyLine> {
    let metric = job.options.metric;
    let live = liveness(&lines);
    let mut result: Vec<AssemblyLine> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        // Find the straight-line run starting here.
        let mut j = i;
        while j < lines.len()
            && j - i < MAX_BLOCK_LEN
            && lines[j].opcode != Opcode::LABEL
            && !lines[j].opcode.is_branch()
            && !lines[j].opcode.is_control_flow_barrier()
            && lines[j].opcode != Opcode::JSR
        {
            j += 1;
        }

        let block = &lines[i..j];
        if block.len() >= 2 && block_supported(block) {
            let mut alphabet: Vec<AssemblyLine> = Vec::new();
            for line in block {
                if !alphabet.contains(line) {
                    alphabet.push(line.clone());
                }
            }
            for opcode in [
                Opcode::TAX,
                Opcode::TAY,
                Opcode::TXA,
                Opcode::TYA,
                Opcode::INX,
                Opcode::INY,
                Opcode::DEX,
                Opcode::DEY,
                Opcode::CLC,
                Opcode::SEC,
            ] {
                let line = AssemblyLine::implied(opcode);
                if !alphabet.contains(&line) {
                    alphabet.push(line);
                }
            }

            let block_live = live[j.saturating_sub(1)];
            let mut search = Search {
                alphabet,
                live: block_live,
                original: block,
                metric,
                best: None,
                best_cost: AssemblyRule::window_cost(block, metric),
                budget: CANDIDATE_BUDGET,
            };
            let mut prefix = Vec::new();
            search.explore(&mut prefix, block.len() - 1);

            match search.best {
                Some(better) => {
                    job.logger.debug(&format!(
                        "superoptimizer: {} lines -> {} at offset {i}",
                        block.len(),
                        better.len()
                    ));
                    result.extend(better);
                }
                None => result.extend_from_slice(block),
            }
        } else {
            result.extend_from_slice(block);
        }

        if j == i {
            // A line the block scan refused: copy it through.
            result.push(lines[i].clone());
            i += 1;
        } else {
            i = j;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::Constant;
    use crate::logger::{Logger, Verbosity};
    use crate::options::CompilationOptions;

    fn job() -> JobContext {
        JobContext::new(
            CompilationOptions::with_level(9),
            Logger::new(Verbosity::Quiet, false),
        )
    }

    #[test]
    fn test_finds_shorter_increment() {
        // LDA v; CLC; ADC #1; STA v ... TAX-free block equivalent would
        // still need the load and store, but the CLC/ADC pair cannot beat
        // itself; instead check a transfer chain collapses.
        let lines = vec![
            AssemblyLine::implied(Opcode::TAX),
            AssemblyLine::implied(Opcode::TXA),
            AssemblyLine::implied(Opcode::TAX),
            AssemblyLine::implied(Opcode::RTS).non_elidable(),
        ];
        let out = superoptimize(lines, &job());
        // A single TAX is equivalent.
        let tax_count = out.iter().filter(|l| l.opcode == Opcode::TAX).count();
        assert_eq!(tax_count, 1);
        assert_eq!(out.last().unwrap().opcode, Opcode::RTS);
    }

    #[test]
    fn test_preserves_memory_writes() {
        let lines = vec![
            AssemblyLine::immediate(Opcode::LDA, Constant::num(1)),
            AssemblyLine::absolute(Opcode::STA, Constant::address("out")),
            AssemblyLine::implied(Opcode::RTS).non_elidable(),
        ];
        let out = superoptimize(lines.clone(), &job());
        assert!(out.iter().any(|l| l.opcode == Opcode::STA));
    }

    #[test]
    fn test_equivalence_rejects_wrong_value() {
        let original = vec![AssemblyLine::immediate(Opcode::LDA, Constant::num(1))];
        let wrong = vec![AssemblyLine::immediate(Opcode::LDA, Constant::num(2))];
        assert!(!equivalent_on(&original, &wrong, CpuImportance::all_live()));
    }

    #[test]
    fn test_machine_adc_overflow() {
        let mut machine = Machine::vector(0);
        machine.a = 0x7F;
        machine.c = false;
        step(
            &mut machine,
            &AssemblyLine::immediate(Opcode::ADC, Constant::num(1)),
        )
        .unwrap();
        assert_eq!(machine.a, 0x80);
        assert!(machine.v);
        assert!(machine.n);
    }
}
