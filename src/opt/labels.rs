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

//! Unused label removal.
//!
//! A separate micro-pass rather than a rule: it needs a whole-function
//! view of which labels are referenced. Only local labels (leading `.`)
//! are candidates; global labels are linker-visible and never removed.

use crate::asm::{AssemblyLine, Opcode};
use crate::constant::Constant;
use std::collections::HashSet;

fn referenced_names(constant: &Constant, out: &mut HashSet<String>) {
    match constant {
        Constant::MemoryAddress { name } | Constant::Unexpanded { name, .. } => {
            out.insert(name.clone());
        }
        Constant::Subbyte { base, .. } => referenced_names(base, out),
        Constant::AssertByte { inner } => referenced_names(inner, out),
        Constant::Compound { lhs, rhs, .. } => {
            referenced_names(lhs, out);
            referenced_names(rhs, out);
        }
        Constant::Numeric { .. } => {}
    }
}

/// Delete every `LABEL` line defining a local label nothing refers to.
pub fn remove_unused_labels(lines: &mut Vec<AssemblyLine>) {
    let mut referenced = HashSet::new();
    for line in lines.iter() {
        if line.opcode != Opcode::LABEL {
            referenced_names(&line.operand, &mut referenced);
        }
    }
    lines.retain(|line| match line.defined_label() {
        Some(name) => {
            !line.elidable || !name.starts_with('.') || referenced.contains(name)
        }
        None => true,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Label;

    #[test]
    fn test_removes_unreferenced_local_label() {
        let mut lines = vec![
            AssemblyLine::label(&Label::new(".orphan")),
            AssemblyLine::implied(Opcode::RTS),
        ];
        remove_unused_labels(&mut lines);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].opcode, Opcode::RTS);
    }

    #[test]
    fn test_keeps_referenced_local_label() {
        let target = Label::new(".loop");
        let mut lines = vec![
            AssemblyLine::label(&target),
            AssemblyLine::relative(Opcode::BNE, &target),
        ];
        remove_unused_labels(&mut lines);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_never_removes_global_labels() {
        let mut lines = vec![
            AssemblyLine::label(&Label::new("main")).non_elidable(),
            AssemblyLine::label(&Label::new("helper")),
            AssemblyLine::implied(Opcode::RTS),
        ];
        remove_unused_labels(&mut lines);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_never_removes_pinned_labels() {
        let mut lines = vec![
            AssemblyLine::label(&Label::new(".pinned")).non_elidable(),
            AssemblyLine::implied(Opcode::RTS),
        ];
        remove_unused_labels(&mut lines);
        assert_eq!(lines.len(), 2);
    }
}
