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

//! The assembler and linker.
//!
//! Three passes over the optimized functions:
//! 1. *Sizing*: every instruction's byte width; branches are sized
//!    short and relaxed to an inverted branch over a `JMP` detour when a
//!    target proves out of range, re-running until stable.
//! 2. *Placement*: reachable functions first-fit into their bank in
//!    declaration order, then initialized data; unreachable functions
//!    emit nothing.
//! 3. *Emission*: bytes per bank, the assembly listing, and the label
//!    listing.
//!
//! An illegal `(opcode, addressing mode)` pair surviving to this point is
//! a compiler defect and aborts with a diagnostic; run with `-vvv` to see
//! which peephole rule produced the line.

pub mod listing;

pub use listing::{normalize_name, parse_label_file, render_label_file, LabelEntry};

use crate::asm::{is_legal, opcode_byte, AddrMode, AssemblyLine, Label, Opcode};
use crate::constant::Constant;
use crate::env::{Environment, JobContext, Storage, ThingKind};
use crate::error::{CompileError, ErrorCode, Result, Span};
use crate::platform::Platform;
use std::collections::{HashMap, HashSet};

/// One assembled bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankImage {
    pub start: u16,
    pub bytes: Vec<u8>,
}

/// Everything the assembler produces.
#[derive(Debug)]
pub struct AssemblerOutput {
    /// Bank name to image, in platform bank order.
    pub code: Vec<(String, BankImage)>,
    /// Human-readable assembly listing.
    pub asm: Vec<String>,
    /// All symbols with their final addresses.
    pub labels: Vec<LabelEntry>,
    /// Total emitted code bytes.
    pub code_size: usize,
}

/// A function (or data blob) ready for assembly.
#[derive(Debug)]
pub struct AssemblyUnit {
    pub name: String,
    pub bank: String,
    pub lines: Vec<AssemblyLine>,
}

/// Total encoded size of a line list.
pub fn total_size(lines: &[AssemblyLine]) -> usize {
    lines.iter().map(AssemblyLine::size_in_bytes).sum()
}

/// Offsets of every label within a unit.
fn label_offsets(lines: &[AssemblyLine]) -> HashMap<String, usize> {
    let mut offsets = HashMap::new();
    let mut offset = 0;
    for line in lines {
        if let Some(name) = line.defined_label() {
            offsets.insert(name.to_string(), offset);
        }
        offset += line.size_in_bytes();
    }
    offsets
}

/// Pass 1: relax branches whose targets are out of short range.
///
/// Conditional branches become an inverted branch over a `JMP`; a `BRA`
/// becomes a plain `JMP`. Relaxation may push other branches out of
/// range, so the pass repeats until a sweep changes nothing.
pub fn relax_branches(lines: &mut Vec<AssemblyLine>, job: &JobContext) {
    loop {
        let offsets = label_offsets(lines);
        let mut offset = 0;
        let mut patch: Option<(usize, Vec<AssemblyLine>)> = None;

        for (i, line) in lines.iter().enumerate() {
            let size = line.size_in_bytes();
            if line.mode == AddrMode::Relative {
                if let Constant::MemoryAddress { name } = &line.operand {
                    if let Some(&target) = offsets.get(name.as_str()) {
                        let displacement = target as i64 - (offset as i64 + 2);
                        if !(-128..=127).contains(&displacement) {
                            let target_label = Label::new(name.clone());
                            let replacement = match invert_branch(line.opcode) {
                                Some(inverse) => {
                                    let skip = job.labels.next("rx");
                                    vec![
                                        AssemblyLine::relative(inverse, &skip),
                                        AssemblyLine::absolute_jump(Opcode::JMP, &target_label),
                                        AssemblyLine::label(&skip),
                                    ]
                                }
                                // Unconditional short branch.
                                None => {
                                    vec![AssemblyLine::absolute_jump(Opcode::JMP, &target_label)]
                                }
                            };
                            patch = Some((i, replacement));
                            break;
                        }
                    }
                }
            }
            offset += size;
        }

        match patch {
            Some((i, replacement)) => {
                let elidable = lines[i].elidable;
                let replacement: Vec<_> = replacement
                    .into_iter()
                    .map(|l| if elidable { l } else { l.non_elidable() })
                    .collect();
                lines.splice(i..=i, replacement);
            }
            None => break,
        }
    }
}

fn invert_branch(opcode: Opcode) -> Option<Opcode> {
    use Opcode::*;
    match opcode {
        BEQ => Some(BNE),
        BNE => Some(BEQ),
        BCC => Some(BCS),
        BCS => Some(BCC),
        BMI => Some(BPL),
        BPL => Some(BMI),
        BVC => Some(BVS),
        BVS => Some(BVC),
        BRA | BSR | BRL => None,
        _ => None,
    }
}

/// Assemble placed units into bank images, listings and labels.
pub fn assemble(
    mut units: Vec<AssemblyUnit>,
    env: &Environment,
    platform: &Platform,
    reachable: &HashSet<String>,
    var_floor: &HashMap<String, u16>,
    job: &JobContext,
) -> Result<AssemblerOutput> {
    // Dead functions produce no bytes at all.
    units.retain(|unit| reachable.contains(&unit.name));

    // Pass 1: sizing with branch relaxation.
    for unit in &mut units {
        relax_branches(&mut unit.lines, job);
    }

    // Pass 2: placement, first-fit in declaration order.
    let mut cursors: HashMap<String, u16> = platform
        .banks
        .iter()
        .map(|bank| (bank.name.clone(), bank.start))
        .collect();
    let mut placed_at: HashMap<String, u16> = HashMap::new();

    for unit in &units {
        let bank = platform.bank(&unit.bank).ok_or_else(|| {
            CompileError::new(
                ErrorCode::InvalidBankDefinition,
                format!("Unknown bank '{}'", unit.bank),
                Span::none(),
            )
        })?;
        let size = total_size(&unit.lines) as u32;
        let cursor = cursors[&bank.name];
        let limit = var_floor
            .get(&bank.name)
            .map(|&floor| floor.saturating_sub(1).min(bank.end))
            .unwrap_or(bank.end);
        if cursor as u32 + size > limit as u32 + 1 {
            return Err(CompileError::new(
                ErrorCode::BankOverflow,
                format!(
                    "Bank '{}' overflows at '{}': {} bytes needed, {} available",
                    bank.name,
                    unit.name,
                    size,
                    (limit as u32 + 1).saturating_sub(cursor as u32),
                ),
                Span::none(),
            ));
        }
        placed_at.insert(unit.name.clone(), cursor);
        cursors.insert(bank.name.clone(), cursor + size as u16);
    }

    // Symbol table: placed units, their local labels, and every
    // statically allocated thing.
    let mut symbols: HashMap<String, i64> = env.static_addresses();
    for unit in &units {
        let base = placed_at[&unit.name];
        for (label, offset) in label_offsets(&unit.lines) {
            symbols.insert(label, base as i64 + offset as i64);
        }
        symbols.insert(unit.name.clone(), base as i64);
    }

    // Pass 3: emission.
    let mut images: HashMap<String, Vec<u8>> = HashMap::new();
    let mut asm: Vec<String> = Vec::new();
    let mut code_size = 0usize;

    for unit in &units {
        let bank = platform.bank(&unit.bank).expect("checked in placement");
        let base = placed_at[&unit.name];
        let image = images.entry(bank.name.clone()).or_default();
        // Pad up to this unit's start.
        let start_offset = (base - bank.start) as usize;
        if image.len() < start_offset {
            image.resize(start_offset, 0);
        }

        asm.push(format!("; {} @ ${:04X}", unit.name, base));
        let mut address = base;
        for line in &unit.lines {
            asm.push(line.to_string());
            let emitted = emit_line(line, address, &symbols)?;
            code_size += emitted.len();
            address += emitted.len() as u16;
            image.extend_from_slice(&emitted);
        }
        asm.push(String::new());
    }

    job.logger.info(&format!("assembled {code_size} bytes of code"));

    let code: Vec<(String, BankImage)> = platform
        .banks
        .iter()
        .filter_map(|bank| {
            images.remove(&bank.name).map(|bytes| {
                (
                    bank.name.clone(),
                    BankImage {
                        start: bank.start,
                        bytes,
                    },
                )
            })
        })
        .collect();

    // Label listing: every symbol with an address.
    let labels: Vec<LabelEntry> = symbols
        .iter()
        .filter_map(|(name, &address)| {
            u16::try_from(address).ok().map(|address| LabelEntry {
                name: name.clone(),
                address,
                local: name.starts_with('.'),
            })
        })
        .collect();

    Ok(AssemblerOutput {
        code,
        asm,
        labels,
        code_size,
    })
}

/// Encode one line at `address` with all symbols resolved.
fn emit_line(
    line: &AssemblyLine,
    address: u16,
    symbols: &HashMap<String, i64>,
) -> Result<Vec<u8>> {
    let lookup = |name: &str| symbols.get(name).copied();

    match line.opcode {
        Opcode::LABEL => return Ok(Vec::new()),
        Opcode::BYTE => {
            let value = resolve(line, symbols)?;
            return Ok(vec![(value & 0xFF) as u8]);
        }
        _ => {}
    }

    if !is_legal(line.opcode, line.mode) {
        return Err(CompileError::new(
            ErrorCode::IllegalOpcodeModeCombination,
            format!("Internal error: illegal combination '{line}' reached the assembler"),
            line.position.unwrap_or_else(Span::none),
        ));
    }
    let opcode = opcode_byte(line.opcode, line.mode).ok_or_else(|| {
        CompileError::new(
            ErrorCode::IllegalOpcodeModeCombination,
            format!("Internal error: no encoding for '{line}'"),
            line.position.unwrap_or_else(Span::none),
        )
    })?;

    let mut bytes = vec![opcode];
    match line.mode {
        AddrMode::Implied => {}
        AddrMode::Relative => {
            let target = line.operand.eval_with(&lookup).ok_or_else(|| {
                undefined_operand(line)
            })?;
            let displacement = target - (address as i64 + 2);
            if !(-128..=127).contains(&displacement) {
                return Err(CompileError::new(
                    ErrorCode::BranchOutOfRange,
                    format!("Branch target {displacement} bytes away in '{line}'"),
                    line.position.unwrap_or_else(Span::none),
                ));
            }
            bytes.push(displacement as i8 as u8);
        }
        mode => {
            let value = resolve(line, symbols)?;
            let width = mode.operand_size();
            if width == 1 && !(-128..=255).contains(&value) {
                return Err(CompileError::new(
                    ErrorCode::AddressingModeUnavailable,
                    format!("Operand ${value:X} does not fit the single-byte mode in '{line}'"),
                    line.position.unwrap_or_else(Span::none),
                ));
            }
            for i in 0..width {
                bytes.push(((value >> (8 * i)) & 0xFF) as u8);
            }
        }
    }
    Ok(bytes)
}

fn resolve(line: &AssemblyLine, symbols: &HashMap<String, i64>) -> Result<i64> {
    line.operand
        .eval_with(&|name| symbols.get(name).copied())
        .ok_or_else(|| undefined_operand(line))
}

fn undefined_operand(line: &AssemblyLine) -> CompileError {
    CompileError::new(
        ErrorCode::UndefinedLabel,
        format!("Undefined symbol in '{line}'"),
        line.position.unwrap_or_else(Span::none),
    )
}

/// Build the assembly units for initialized data arrays.
pub fn data_units(env: &Environment) -> Vec<AssemblyUnit> {
    env.things()
        .filter_map(|thing| match &thing.kind {
            ThingKind::Array {
                contents: Some(bytes),
                ..
            } if thing.storage == Storage::Unallocated => {
                let mut lines = vec![
                    AssemblyLine::label(&Label::new(thing.name.clone())).non_elidable(),
                ];
                lines.extend(
                    bytes
                        .iter()
                        .map(|&b| AssemblyLine::byte(Constant::num(b as i64)).non_elidable()),
                );
                Some(AssemblyUnit {
                    name: thing.name.clone(),
                    bank: thing.bank.clone(),
                    lines,
                })
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{Logger, Verbosity};
    use crate::options::CompilationOptions;

    fn job() -> JobContext {
        JobContext::new(
            CompilationOptions::default(),
            Logger::new(Verbosity::Quiet, false),
        )
    }

    fn simple_unit(name: &str, lines: Vec<AssemblyLine>) -> AssemblyUnit {
        AssemblyUnit {
            name: name.to_string(),
            bank: String::new(),
            lines,
        }
    }

    fn assemble_units(units: Vec<AssemblyUnit>) -> Result<AssemblerOutput> {
        let env = Environment::new(0x02, 4);
        let platform = Platform::c64();
        let reachable: HashSet<String> = units.iter().map(|u| u.name.clone()).collect();
        assemble(
            units,
            &env,
            &platform,
            &reachable,
            &HashMap::new(),
            &job(),
        )
    }

    #[test]
    fn test_emit_simple_function() {
        let unit = simple_unit(
            "main",
            vec![
                AssemblyLine::label(&Label::new("main")).non_elidable(),
                AssemblyLine::immediate(Opcode::LDA, Constant::num(1)),
                AssemblyLine::absolute(Opcode::STA, Constant::num(0xC000)),
                AssemblyLine::implied(Opcode::RTS),
            ],
        );
        let output = assemble_units(vec![unit]).unwrap();
        let (_, image) = &output.code[0];
        assert_eq!(image.start, 0x080E);
        assert_eq!(image.bytes, vec![0xA9, 0x01, 0x8D, 0x00, 0xC0, 0x60]);
        assert_eq!(output.code_size, 6);
    }

    #[test]
    fn test_dead_function_emits_nothing() {
        let alive = simple_unit(
            "main",
            vec![
                AssemblyLine::label(&Label::new("main")).non_elidable(),
                AssemblyLine::implied(Opcode::RTS),
            ],
        );
        let dead = simple_unit(
            "unused",
            vec![
                AssemblyLine::label(&Label::new("unused")).non_elidable(),
                AssemblyLine::implied(Opcode::RTS),
            ],
        );
        let env = Environment::new(0x02, 4);
        let platform = Platform::c64();
        let reachable: HashSet<String> = ["main".to_string()].into();
        let output = assemble(
            vec![alive, dead],
            &env,
            &platform,
            &reachable,
            &HashMap::new(),
            &job(),
        )
        .unwrap();
        assert_eq!(output.code_size, 1);
        assert!(!output.labels.iter().any(|l| l.name == "unused"));
    }

    #[test]
    fn test_relative_branch_resolution() {
        let skip = Label::new(".skip");
        let unit = simple_unit(
            "main",
            vec![
                AssemblyLine::label(&Label::new("main")).non_elidable(),
                AssemblyLine::relative(Opcode::BNE, &skip),
                AssemblyLine::implied(Opcode::NOP),
                AssemblyLine::label(&skip),
                AssemblyLine::implied(Opcode::RTS),
            ],
        );
        let output = assemble_units(vec![unit]).unwrap();
        let (_, image) = &output.code[0];
        // BNE +1 skips the NOP.
        assert_eq!(image.bytes, vec![0xD0, 0x01, 0xEA, 0x60]);
    }

    #[test]
    fn test_branch_relaxation() {
        // A branch over 200 NOPs cannot stay short.
        let far = Label::new(".far");
        let mut lines = vec![
            AssemblyLine::label(&Label::new("main")).non_elidable(),
            AssemblyLine::relative(Opcode::BEQ, &far),
        ];
        for _ in 0..200 {
            lines.push(AssemblyLine::implied(Opcode::NOP));
        }
        lines.push(AssemblyLine::label(&far));
        lines.push(AssemblyLine::implied(Opcode::RTS));

        let output = assemble_units(vec![simple_unit("main", lines)]).unwrap();
        let (_, image) = &output.code[0];
        // The relaxed form starts with the inverted branch over a JMP.
        assert_eq!(image.bytes[0], 0xD0); // BNE +3
        assert_eq!(image.bytes[1], 0x03);
        assert_eq!(image.bytes[2], 0x4C); // JMP .far
    }

    #[test]
    fn test_bank_overflow_detected() {
        let mut lines = vec![AssemblyLine::label(&Label::new("main")).non_elidable()];
        for _ in 0..0xA000 {
            lines.push(AssemblyLine::implied(Opcode::NOP));
        }
        let err = assemble_units(vec![simple_unit("main", lines)]).unwrap_err();
        assert_eq!(err.code, ErrorCode::BankOverflow);
    }

    #[test]
    fn test_undefined_symbol_detected() {
        let unit = simple_unit(
            "main",
            vec![
                AssemblyLine::label(&Label::new("main")).non_elidable(),
                AssemblyLine::absolute(Opcode::JSR, Constant::address("missing")),
            ],
        );
        let err = assemble_units(vec![unit]).unwrap_err();
        assert_eq!(err.code, ErrorCode::UndefinedLabel);
    }
}
