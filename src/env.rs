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

//! The resolved environment consumed by the code generator.
//!
//! The resolver turns declarations into [`ThingInMemory`] records: named,
//! sized, bank-assigned, and storage-classified. The code generator treats
//! things opaquely except for their name, storage and type; the assembler
//! fills in function addresses during placement.

use crate::ast::{FunctionFlags, Type};
use crate::asm::Label;
use crate::constant::Constant;
use crate::error::{CompileError, ErrorCode, Result, Span};
use crate::logger::Logger;
use crate::options::CompilationOptions;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Where a thing lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Zero page, address known at resolution time.
    ZeroPage(u8),
    /// Absolute memory, address known at resolution time.
    Absolute(u16),
    /// Offset into the current software stack frame.
    Stack(u8),
    /// Placed later by the assembler (functions).
    Unallocated,
}

impl Storage {
    /// The resolved address, if the thing has one already.
    pub fn address(self) -> Option<u16> {
        match self {
            Storage::ZeroPage(a) => Some(a as u16),
            Storage::Absolute(a) => Some(a),
            Storage::Stack(_) | Storage::Unallocated => None,
        }
    }

    /// Whether the thing sits in zero page.
    pub fn is_zero_page(self) -> bool {
        matches!(self, Storage::ZeroPage(_))
    }

    /// The storage of the byte one address above this one.
    pub fn bump(self) -> Storage {
        match self {
            Storage::ZeroPage(a) => Storage::ZeroPage(a.wrapping_add(1)),
            Storage::Absolute(a) => Storage::Absolute(a.wrapping_add(1)),
            Storage::Stack(o) => Storage::Stack(o + 1),
            Storage::Unallocated => Storage::Unallocated,
        }
    }
}

/// What kind of thing a name denotes.
#[derive(Debug, Clone)]
pub enum ThingKind {
    Variable(Type),
    Array {
        length: u16,
        /// Encoded initial contents, for arrays placed inside the image.
        contents: Option<Vec<u8>>,
    },
    Function {
        return_type: Type,
        /// Names of the static parameter variables, in order.
        params: Vec<String>,
        flags: FunctionFlags,
    },
    ConstantAlias(Constant),
}

/// A named, allocated entity.
#[derive(Debug, Clone)]
pub struct ThingInMemory {
    pub name: String,
    pub kind: ThingKind,
    pub bank: String,
    pub storage: Storage,
    pub size: u16,
}

impl ThingInMemory {
    /// The address constant naming this thing.
    pub fn address_constant(&self) -> Constant {
        Constant::address(self.name.clone())
    }

    /// The value type, for variables.
    pub fn value_type(&self) -> Option<Type> {
        match &self.kind {
            ThingKind::Variable(ty) => Some(*ty),
            ThingKind::Array { .. } => Some(Type::Byte),
            _ => None,
        }
    }
}

/// The symbol table handed to the code generator.
#[derive(Debug, Default)]
pub struct Environment {
    things: HashMap<String, ThingInMemory>,
    /// Insertion order, so placement is deterministic.
    order: Vec<String>,
    /// Base address of the zero-page pseudoregister block.
    pub pseudoreg_base: u8,
    /// Pseudoregister size in bytes.
    pub pseudoreg_size: u8,
    /// Names of declared entry points.
    pub entry_points: Vec<String>,
}

impl Environment {
    pub fn new(pseudoreg_base: u8, pseudoreg_size: u8) -> Self {
        Self {
            pseudoreg_base,
            pseudoreg_size,
            ..Self::default()
        }
    }

    /// Define a new thing; duplicate names are an error.
    pub fn define(&mut self, thing: ThingInMemory, span: Span) -> Result<()> {
        if self.things.contains_key(&thing.name) {
            return Err(CompileError::new(
                ErrorCode::SymbolAlreadyDefined,
                format!("'{}' is already defined", thing.name),
                span,
            ));
        }
        self.order.push(thing.name.clone());
        self.things.insert(thing.name.clone(), thing);
        Ok(())
    }

    /// Look a name up, or fail with a located diagnostic.
    pub fn lookup(&self, name: &str, span: Span) -> Result<&ThingInMemory> {
        self.things.get(name).ok_or_else(|| {
            CompileError::new(
                ErrorCode::UndefinedSymbol,
                format!("Undefined symbol '{name}'"),
                span,
            )
        })
    }

    /// Look a name up without a diagnostic.
    pub fn get(&self, name: &str) -> Option<&ThingInMemory> {
        self.things.get(name)
    }

    /// Resolve a name as seen from inside a function: the function's own
    /// locals and parameters (`func.name`) shadow globals.
    pub fn resolve_in(&self, func: &str, name: &str) -> Option<&ThingInMemory> {
        self.things
            .get(&format!("{func}.{name}"))
            .or_else(|| self.things.get(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ThingInMemory> {
        self.things.get_mut(name)
    }

    /// All things in declaration order.
    pub fn things(&self) -> impl Iterator<Item = &ThingInMemory> {
        self.order.iter().filter_map(|name| self.things.get(name))
    }

    /// The address of pseudoregister byte `index`.
    pub fn pseudoreg(&self, index: u8) -> Constant {
        debug_assert!(index < self.pseudoreg_size);
        Constant::num((self.pseudoreg_base + index) as i64)
    }

    /// Resolve every thing's address for the assembler's lookup.
    pub fn static_addresses(&self) -> HashMap<String, i64> {
        self.things()
            .filter_map(|t| t.storage.address().map(|a| (t.name.clone(), a as i64)))
            .collect()
    }
}

/// Process-wide generator of unique local labels.
///
/// One atomic counter shared by all workers: label names stay globally
/// unique no matter how functions are distributed over threads.
#[derive(Debug, Default)]
pub struct LabelGenerator {
    counter: AtomicU32,
}

impl LabelGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next unique label with the given prefix, e.g. `.if_0004`.
    pub fn next(&self, prefix: &str) -> Label {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Label::new(format!(".{prefix}_{n:04}"))
    }

    /// Reset the counter. Test support; never used mid-compilation.
    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }
}

/// Everything shared across one compilation job.
#[derive(Debug)]
pub struct JobContext {
    pub logger: Logger,
    pub labels: LabelGenerator,
    pub options: CompilationOptions,
}

impl JobContext {
    pub fn new(options: CompilationOptions, logger: Logger) -> Self {
        Self {
            logger,
            labels: LabelGenerator::new(),
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(name: &str, storage: Storage) -> ThingInMemory {
        ThingInMemory {
            name: name.to_string(),
            kind: ThingKind::Variable(Type::Byte),
            bank: "default".to_string(),
            storage,
            size: 1,
        }
    }

    #[test]
    fn test_define_and_lookup() {
        let mut env = Environment::new(0x02, 8);
        env.define(variable("a", Storage::ZeroPage(0x10)), Span::none())
            .unwrap();
        assert!(env.lookup("a", Span::none()).is_ok());
        assert!(env.lookup("b", Span::none()).is_err());
    }

    #[test]
    fn test_duplicate_definition() {
        let mut env = Environment::new(0x02, 8);
        env.define(variable("a", Storage::ZeroPage(0x10)), Span::none())
            .unwrap();
        let result = env.define(variable("a", Storage::Absolute(0x1000)), Span::none());
        assert!(result.is_err());
    }

    #[test]
    fn test_declaration_order_preserved() {
        let mut env = Environment::new(0x02, 8);
        for name in ["z", "a", "m"] {
            env.define(variable(name, Storage::Absolute(0x1000)), Span::none())
                .unwrap();
        }
        let names: Vec<_> = env.things().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["z", "a", "m"]);
    }

    #[test]
    fn test_label_generator_unique() {
        let generator = LabelGenerator::new();
        let a = generator.next("if");
        let b = generator.next("if");
        assert_ne!(a, b);
        assert!(a.is_local());
        assert!(a.0.starts_with(".if_"));
    }

    #[test]
    fn test_label_generator_zero_padded() {
        let generator = LabelGenerator::new();
        assert_eq!(generator.next("wh").0, ".wh_0000");
        assert_eq!(generator.next("wh").0, ".wh_0001");
    }

    #[test]
    fn test_storage_classification() {
        assert!(Storage::ZeroPage(0x40).is_zero_page());
        assert!(!Storage::Absolute(0x1000).is_zero_page());
        assert_eq!(Storage::ZeroPage(0x40).address(), Some(0x40));
        assert_eq!(Storage::Stack(2).address(), None);
    }
}
