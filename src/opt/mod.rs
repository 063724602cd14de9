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

//! The peephole engine.
//!
//! One sweep walks the line list left to right, tries every rule of the
//! active set at each position, applies the first that matches, holds its
//! preconditions and does not cost more than the window it replaces, then
//! restarts a bounded number of lines earlier so newly adjacent lines get
//! another look. Sweeps repeat until a full sweep changes nothing or the
//! per-level pass cap is reached.
//!
//! At `-O2` and above the driver interleaves the `GOOD` and `ASS_OPT`
//! sets in the pattern good·ass·good, which shakes loose local minima
//! either set alone gets stuck in.

pub mod dsl;
pub mod labels;
pub mod presets;
pub mod superopt;

use crate::asm::AssemblyLine;
use crate::dataflow::{analyze, liveness};
use crate::env::JobContext;
use dsl::AssemblyRule;

/// How far the scan backs up after a successful application.
const RESTART_WINDOW: usize = 2;

/// One full sweep of a rule set. Returns whether anything changed.
pub fn sweep(lines: &mut Vec<AssemblyLine>, rules: &[AssemblyRule], job: &JobContext) -> bool {
    let metric = job.options.metric;
    let mut changed = false;
    let mut pre = analyze(lines);
    let mut live = liveness(lines);
    // Every application shrinks or rewrites the list; this cap only
    // guards against equal-cost rule pairs undoing each other forever.
    let mut budget = lines.len() * 4 + 16;

    let mut i = 0;
    while i < lines.len() {
        let mut applied = false;
        for rule in rules {
            let Some(bindings) = rule.matches(lines, i) else {
                continue;
            };
            let window_end = i + rule.pattern.len() - 1;
            if !rule.preconditions_hold(&bindings, &pre[i], &live[window_end]) {
                continue;
            }
            let replacement = rule.apply(lines, i, &bindings);
            let window = &lines[i..=window_end];
            if replacement == window {
                continue;
            }
            let old_cost = AssemblyRule::window_cost(window, metric);
            let new_cost = AssemblyRule::window_cost(&replacement, metric);
            if new_cost > old_cost {
                continue;
            }

            job.logger
                .trace(&format!("peephole: {} at line {i}", rule.name));
            lines.splice(i..=window_end, replacement);
            pre = analyze(lines);
            live = liveness(lines);
            changed = true;
            applied = true;
            budget -= 1;
            i = i.saturating_sub(RESTART_WINDOW);
            break;
        }
        if budget == 0 {
            break;
        }
        if !applied {
            i += 1;
        }
    }
    changed
}

/// Run a rule set to its fixpoint, bounded by `cap` sweeps.
fn run_to_fixpoint(
    lines: &mut Vec<AssemblyLine>,
    rules: &[AssemblyRule],
    job: &JobContext,
    cap: usize,
) -> bool {
    let mut changed_any = false;
    for _ in 0..cap {
        if !sweep(lines, rules, job) {
            break;
        }
        changed_any = true;
    }
    changed_any
}

/// Optimize one function's line list according to the job options.
pub fn optimize_function(
    mut lines: Vec<AssemblyLine>,
    job: &JobContext,
    cpu: crate::asm::Cpu,
) -> Vec<AssemblyLine> {
    let level = job.options.level;
    if level == 0 {
        return lines;
    }
    let cap = job.options.optimization_pass_cap();

    if level == 1 {
        let quick = presets::quick_preset();
        run_to_fixpoint(&mut lines, &quick, job, cap);
    } else {
        let good = presets::good_with_extensions(&job.options, cpu);
        let ass = presets::ass_opt_with_extensions(&job.options);
        // good·(ass)·good until a full cycle is quiet.
        for _ in 0..cap {
            let mut changed = run_to_fixpoint(&mut lines, &good, job, cap);
            changed |= sweep(&mut lines, &ass, job);
            changed |= run_to_fixpoint(&mut lines, &good, job, cap);
            if !changed {
                break;
            }
        }
    }

    if job.options.superoptimize() {
        lines = superopt::superoptimize(lines, job);
    }

    labels::remove_unused_labels(&mut lines);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Opcode;
    use crate::constant::Constant;
    use crate::logger::{Logger, Verbosity};
    use crate::options::CompilationOptions;

    fn job(level: u8) -> JobContext {
        JobContext::new(
            CompilationOptions::with_level(level),
            Logger::new(Verbosity::Quiet, false),
        )
    }

    #[test]
    fn test_sweep_removes_store_load_pair() {
        let job = job(2);
        let mut lines = vec![
            AssemblyLine::immediate(Opcode::LDA, Constant::num(1)),
            AssemblyLine::absolute(Opcode::STA, Constant::address("v")),
            AssemblyLine::absolute(Opcode::LDA, Constant::address("v")),
            AssemblyLine::absolute(Opcode::STA, Constant::address("w")),
            AssemblyLine::implied(Opcode::RTS).non_elidable(),
        ];
        let rules = presets::quick_preset();
        assert!(sweep(&mut lines, &rules, &job));
        // The reload disappears; both stores remain.
        assert_eq!(
            lines
                .iter()
                .filter(|l| l.opcode == Opcode::LDA)
                .count(),
            1
        );
        assert_eq!(
            lines
                .iter()
                .filter(|l| l.opcode == Opcode::STA)
                .count(),
            2
        );
    }

    #[test]
    fn test_level_zero_is_identity() {
        let job = job(0);
        let lines = vec![
            AssemblyLine::immediate(Opcode::LDA, Constant::num(1)),
            AssemblyLine::immediate(Opcode::LDA, Constant::num(1)),
            AssemblyLine::implied(Opcode::RTS).non_elidable(),
        ];
        let out = optimize_function(lines.clone(), &job, crate::asm::Cpu::Nmos);
        assert_eq!(out, lines);
    }

    #[test]
    fn test_optimization_never_grows_cost() {
        use crate::options::OptimizationMetric;
        let lines = vec![
            AssemblyLine::immediate(Opcode::LDA, Constant::num(1)),
            AssemblyLine::absolute(Opcode::STA, Constant::address("v")),
            AssemblyLine::absolute(Opcode::LDA, Constant::address("v")),
            AssemblyLine::implied(Opcode::TAX),
            AssemblyLine::implied(Opcode::RTS).non_elidable(),
        ];
        let before = AssemblyRule::window_cost(&lines, OptimizationMetric::Size);
        let out = optimize_function(lines, &job(2), crate::asm::Cpu::Nmos);
        let after = AssemblyRule::window_cost(&out, OptimizationMetric::Size);
        assert!(after <= before);
    }
}
