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

//! Pseudo-assembly representation.
//!
//! Everything between the statement compiler and the assembler is a flat
//! `Vec<AssemblyLine>`. Lines are immutable values; optimizations build
//! new lists rather than mutating in place.

pub mod encoding;
pub mod opcode;

pub use encoding::{instruction_cycles, instruction_size, is_legal, opcode_byte};
pub use opcode::{AddrMode, Cpu, Opcode, OpcodeClass};

use crate::constant::Constant;
use crate::error::Span;

/// A label name.
///
/// Names beginning with `.` are local: function-scoped and eligible for
/// dead-label removal. All other labels are global symbols pinned by the
/// linker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label(name.into())
    }

    /// Whether this label is function-scoped.
    pub fn is_local(&self) -> bool {
        self.0.starts_with('.')
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One line of pseudo-assembly.
///
/// `elidable` grants later passes permission to delete or rewrite the
/// line. Non-elidable lines (user-written inline assembly, function entry
/// labels, interrupt prologues) must survive every pass verbatim.
///
/// Equality is structural and ignores the source position.
#[derive(Debug, Clone)]
pub struct AssemblyLine {
    pub opcode: Opcode,
    pub mode: AddrMode,
    pub operand: Constant,
    pub elidable: bool,
    pub position: Option<Span>,
}

impl PartialEq for AssemblyLine {
    fn eq(&self, other: &Self) -> bool {
        self.opcode == other.opcode
            && self.mode == other.mode
            && self.operand == other.operand
            && self.elidable == other.elidable
    }
}

impl Eq for AssemblyLine {}

impl AssemblyLine {
    /// A generic elidable line.
    pub fn new(opcode: Opcode, mode: AddrMode, operand: Constant) -> Self {
        Self {
            opcode,
            mode,
            operand,
            elidable: true,
            position: None,
        }
    }

    /// An operand-less instruction.
    pub fn implied(opcode: Opcode) -> Self {
        Self::new(opcode, AddrMode::Implied, Constant::zero())
    }

    /// An immediate-operand instruction.
    pub fn immediate(opcode: Opcode, operand: Constant) -> Self {
        Self::new(opcode, AddrMode::Immediate, operand)
    }

    /// An absolute-operand instruction.
    pub fn absolute(opcode: Opcode, operand: Constant) -> Self {
        Self::new(opcode, AddrMode::Absolute, operand)
    }

    /// A zero-page-operand instruction.
    pub fn zero_page(opcode: Opcode, operand: Constant) -> Self {
        Self::new(opcode, AddrMode::ZeroPage, operand)
    }

    /// A branch to a label.
    pub fn relative(opcode: Opcode, target: &Label) -> Self {
        Self::new(opcode, AddrMode::Relative, Constant::address(target.0.clone()))
    }

    /// An absolute jump or call to a label.
    pub fn absolute_jump(opcode: Opcode, target: &Label) -> Self {
        Self::new(opcode, AddrMode::Absolute, Constant::address(target.0.clone()))
    }

    /// A label definition.
    pub fn label(label: &Label) -> Self {
        Self::new(
            Opcode::LABEL,
            AddrMode::DoesNotExist,
            Constant::address(label.0.clone()),
        )
    }

    /// A raw data byte.
    pub fn byte(value: Constant) -> Self {
        Self::new(Opcode::BYTE, AddrMode::DoesNotExist, value)
    }

    /// Pin this line against optimization.
    pub fn non_elidable(mut self) -> Self {
        self.elidable = false;
        self
    }

    /// Attach a source position.
    pub fn at(mut self, position: Span) -> Self {
        self.position = Some(position);
        self
    }

    /// The label name defined by this line, if it is a `LABEL`.
    pub fn defined_label(&self) -> Option<&str> {
        if self.opcode == Opcode::LABEL {
            if let Constant::MemoryAddress { name } = &self.operand {
                return Some(name);
            }
        }
        None
    }

    /// Whether the instruction's operand reads or writes memory at an
    /// address related to `name`.
    pub fn touches_memory_of(&self, name: &str) -> bool {
        self.mode.accesses_memory() && self.operand.is_related_to(name)
    }

    /// Encoded size of this line in bytes.
    pub fn size_in_bytes(&self) -> usize {
        instruction_size(self.opcode, self.mode)
    }

    /// Approximate cycle cost of this line.
    pub fn cycles(&self) -> u32 {
        instruction_cycles(self.opcode, self.mode)
    }
}

impl std::fmt::Display for AssemblyLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.opcode {
            Opcode::LABEL => write!(f, "{}:", self.operand),
            Opcode::BYTE => write!(f, "    !byte {}", self.operand),
            _ => {
                let mnemonic = self.opcode.mnemonic();
                match self.mode {
                    AddrMode::Implied => write!(f, "    {mnemonic}"),
                    AddrMode::Immediate => write!(f, "    {mnemonic} #{}", self.operand),
                    AddrMode::WordImmediate => write!(f, "    {mnemonic} ##{}", self.operand),
                    AddrMode::ZeroPage | AddrMode::Absolute | AddrMode::LongAbsolute => {
                        write!(f, "    {mnemonic} {}", self.operand)
                    }
                    AddrMode::ZeroPageX | AddrMode::AbsoluteX | AddrMode::LongAbsoluteX => {
                        write!(f, "    {mnemonic} {},X", self.operand)
                    }
                    AddrMode::ZeroPageY | AddrMode::AbsoluteY => {
                        write!(f, "    {mnemonic} {},Y", self.operand)
                    }
                    AddrMode::Indirect => write!(f, "    {mnemonic} ({})", self.operand),
                    AddrMode::IndexedX => write!(f, "    {mnemonic} ({},X)", self.operand),
                    AddrMode::IndexedY => write!(f, "    {mnemonic} ({}),Y", self.operand),
                    AddrMode::IndexedZ => write!(f, "    {mnemonic} ({}),Z", self.operand),
                    AddrMode::IndexedSY => write!(f, "    {mnemonic} ({},S),Y", self.operand),
                    AddrMode::LongIndexedY => write!(f, "    {mnemonic} [{}],Y", self.operand),
                    AddrMode::LongIndexedZ => write!(f, "    {mnemonic} [{}],Z", self.operand),
                    AddrMode::Stack => write!(f, "    {mnemonic} {},S", self.operand),
                    AddrMode::Relative => write!(f, "    {mnemonic} {}", self.operand),
                    AddrMode::DoesNotExist => write!(f, "    {mnemonic}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality_ignores_position() {
        let a = AssemblyLine::implied(Opcode::RTS).at(Span::new(1, 2));
        let b = AssemblyLine::implied(Opcode::RTS).at(Span::new(7, 9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_elidability_distinguishes_lines() {
        let a = AssemblyLine::implied(Opcode::RTS);
        let b = AssemblyLine::implied(Opcode::RTS).non_elidable();
        assert_ne!(a, b);
    }

    #[test]
    fn test_local_labels() {
        assert!(Label::new(".xc_0001").is_local());
        assert!(!Label::new("main").is_local());
    }

    #[test]
    fn test_defined_label() {
        let label = Label::new(".loop");
        let line = AssemblyLine::label(&label);
        assert_eq!(line.defined_label(), Some(".loop"));
        assert_eq!(AssemblyLine::implied(Opcode::NOP).defined_label(), None);
    }

    #[test]
    fn test_display() {
        let line = AssemblyLine::immediate(Opcode::LDA, Constant::num(1));
        assert_eq!(line.to_string(), "    LDA #$01");
        let store = AssemblyLine::absolute(Opcode::STA, Constant::address("output"));
        assert_eq!(store.to_string(), "    STA output");
    }

    #[test]
    fn test_touches_memory() {
        let line = AssemblyLine::absolute(Opcode::STA, Constant::address("output").plus(1));
        assert!(line.touches_memory_of("output"));
        assert!(!line.touches_memory_of("other"));
        let imm = AssemblyLine::immediate(Opcode::LDA, Constant::address("output").lo_byte());
        assert!(!imm.touches_memory_of("output"));
    }
}
