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

//! The rule sets.
//!
//! `QUICK_PRESET` is the cheap set used at `-O1`. `GOOD` holds rules that
//! are always an improvement, `ASS_OPT` the assembly-shape cleanups and
//! `LATER_OPTIMIZATIONS` the rules that pay off after the others settle.
//! Architecture-gated sets are appended only when the matching option is
//! on; `DANGEROUS_OPTIMIZATIONS` additionally assumes no memory-mapped
//! I/O is involved and is reserved for high levels.
//!
//! Flag discipline: any rule that deletes an instruction that set N/Z,
//! C or V must demand the corresponding flag be dead after the window.

use super::dsl::{
    AssemblyRule, LinePattern, LineTemplate, ModeFrom, NewOperand, OperandMatcher, Precondition,
};
use crate::asm::{AddrMode, Cpu, Opcode};
use crate::constant::Constant;
use crate::dataflow::Reg;
use crate::options::CompilationOptions;

use AddrMode::*;
use Opcode::*;

fn rule(
    name: &'static str,
    pattern: Vec<LinePattern>,
    preconditions: Vec<Precondition>,
    transform: Vec<LineTemplate>,
) -> AssemblyRule {
    AssemblyRule {
        name,
        pattern,
        preconditions,
        transform,
    }
}

fn imm_zero() -> OperandMatcher {
    OperandMatcher::Equals(Constant::zero())
}

/// The cheap rules run even at `-O1`.
pub fn quick_preset() -> Vec<AssemblyRule> {
    let mut rules = Vec::new();

    // A load straight after a store to the same place is a no-op, as
    // long as nobody needs the load's flags.
    for (store, load, name) in [
        (STA, LDA, "pointless-lda-after-sta"),
        (STX, LDX, "pointless-ldx-after-stx"),
        (STY, LDY, "pointless-ldy-after-sty"),
    ] {
        rules.push(rule(
            name,
            vec![
                LinePattern::of(store).with_operand(OperandMatcher::Slot(0)),
                LinePattern::of(load).with_operand(OperandMatcher::Slot(0)),
            ],
            vec![Precondition::FlagsNzDead],
            vec![LineTemplate::copy(0)],
        ));
    }

    // Two identical loads in a row.
    for (load, name) in [
        (LDA, "duplicate-lda"),
        (LDX, "duplicate-ldx"),
        (LDY, "duplicate-ldy"),
    ] {
        rules.push(rule(
            name,
            vec![
                LinePattern::of(load).with_operand(OperandMatcher::Slot(0)),
                LinePattern::of(load).with_operand(OperandMatcher::Slot(0)),
            ],
            vec![],
            vec![LineTemplate::copy(0)],
        ));
    }

    // A branch or jump to the label on the next line does nothing.
    rules.push(rule(
        "branch-to-next-line",
        vec![
            LinePattern::of_any(vec![BCC, BCS, BEQ, BNE, BMI, BPL, BVC, BVS, BRA, JMP])
                .with_operand(OperandMatcher::Slot(0)),
            LinePattern::of(LABEL).with_operand(OperandMatcher::Slot(0)),
        ],
        vec![],
        vec![LineTemplate::copy(1)],
    ));

    rules.push(rule(
        "remove-nop",
        vec![LinePattern::of(NOP)],
        vec![],
        vec![],
    ));

    // Flag writes whose value is already established.
    rules.push(rule(
        "pointless-clc",
        vec![LinePattern::of(CLC)],
        vec![Precondition::CarryKnown(false)],
        vec![],
    ));
    rules.push(rule(
        "pointless-sec",
        vec![LinePattern::of(SEC)],
        vec![Precondition::CarryKnown(true)],
        vec![],
    ));
    rules.push(rule(
        "pointless-cld",
        vec![LinePattern::of(CLD)],
        vec![Precondition::DecimalKnown(false)],
        vec![],
    ));
    rules.push(rule(
        "pointless-sed",
        vec![LinePattern::of(SED)],
        vec![Precondition::DecimalKnown(true)],
        vec![],
    ));

    // Loading a value the register already holds.
    for (load, reg, name) in [
        (LDA, Reg::A, "lda-of-known-value"),
        (LDX, Reg::X, "ldx-of-known-value"),
        (LDY, Reg::Y, "ldy-of-known-value"),
    ] {
        rules.push(rule(
            name,
            vec![LinePattern::immediate(load, OperandMatcher::Slot(0))],
            vec![
                Precondition::RegMatchesSlot(reg, 0),
                Precondition::FlagsNzDead,
            ],
            vec![],
        ));
    }

    rules
}

/// Rules that are always an improvement when their preconditions hold.
pub fn good() -> Vec<AssemblyRule> {
    let mut rules = Vec::new();

    // Transfers between registers that already agree.
    for (transfer, left, right, name) in [
        (TAX, Reg::A, Reg::X, "pointless-tax"),
        (TAY, Reg::A, Reg::Y, "pointless-tay"),
        (TXA, Reg::X, Reg::A, "pointless-txa"),
        (TYA, Reg::Y, Reg::A, "pointless-tya"),
    ] {
        rules.push(rule(
            name,
            vec![LinePattern::of(transfer)],
            vec![
                Precondition::RegsEqual(left, right),
                Precondition::FlagsNzDead,
            ],
            vec![],
        ));
    }

    // Load-then-transfer becomes a direct load of the other register.
    // Modes are restricted to the shapes both loads share.
    for (load, transfer, direct, dead, name) in [
        (LDA, TAX, LDX, Reg::A, "ldx-instead-of-lda-tax"),
        (LDA, TAY, LDY, Reg::A, "ldy-instead-of-lda-tay"),
        (LDX, TXA, LDA, Reg::X, "lda-instead-of-ldx-txa"),
        (LDY, TYA, LDA, Reg::Y, "lda-instead-of-ldy-tya"),
    ] {
        rules.push(rule(
            name,
            vec![
                LinePattern::of(load)
                    .with_mode(vec![Immediate, ZeroPage, Absolute])
                    .with_operand(OperandMatcher::Slot(0)),
                LinePattern::of(transfer),
            ],
            vec![Precondition::RegDead(dead)],
            vec![LineTemplate {
                opcode: direct,
                mode: ModeFrom::CopyFrom(0),
                operand: NewOperand::Slot(0),
            }],
        ));
    }

    // Transfer round trips keep the flags of the first transfer.
    for (there, back, name) in [
        (TAX, TXA, "pointless-tax-txa"),
        (TAY, TYA, "pointless-tay-tya"),
        (TXA, TAX, "pointless-txa-tax"),
        (TYA, TAY, "pointless-tya-tay"),
    ] {
        rules.push(rule(
            name,
            vec![LinePattern::of(there), LinePattern::of(back)],
            vec![],
            vec![LineTemplate::copy(0)],
        ));
    }

    // Exclusive-or twice with the same mask.
    rules.push(rule(
        "double-eor",
        vec![
            LinePattern::immediate(EOR, OperandMatcher::Slot(0)),
            LinePattern::immediate(EOR, OperandMatcher::Slot(0)),
        ],
        vec![Precondition::FlagsNzDead],
        vec![],
    ));

    // Call followed by return becomes a jump.
    rules.push(rule(
        "tail-call",
        vec![
            LinePattern::of(JSR).with_operand(OperandMatcher::Slot(0)),
            LinePattern::of(RTS),
        ],
        vec![],
        vec![LineTemplate {
            opcode: JMP,
            mode: ModeFrom::Fixed(Absolute),
            operand: NewOperand::Slot(0),
        }],
    ));

    // CMP #0 after an operation that already set N and Z.
    rules.push(rule(
        "pointless-cmp-zero",
        vec![
            LinePattern::of_any(vec![LDA, TXA, TYA, AND, ORA, EOR]),
            LinePattern::immediate(CMP, imm_zero()),
        ],
        vec![Precondition::CarryDead],
        vec![LineTemplate::copy(0)],
    ));

    // Push-pull pairs.
    rules.push(rule(
        "pointless-pha-pla",
        vec![LinePattern::of(PHA), LinePattern::of(PLA)],
        vec![Precondition::FlagsNzDead],
        vec![],
    ));
    rules.push(rule(
        "pointless-php-plp",
        vec![LinePattern::of(PHP), LinePattern::of(PLP)],
        vec![],
        vec![],
    ));

    // Adding or subtracting zero with a known-clear carry.
    rules.push(rule(
        "pointless-add-zero",
        vec![
            LinePattern::of(CLC),
            LinePattern::immediate(ADC, imm_zero()),
        ],
        vec![
            Precondition::FlagsNzDead,
            Precondition::CarryDead,
            Precondition::OverflowDead,
        ],
        vec![],
    ));
    rules.push(rule(
        "pointless-subtract-zero",
        vec![
            LinePattern::of(SEC),
            LinePattern::immediate(SBC, imm_zero()),
        ],
        vec![
            Precondition::FlagsNzDead,
            Precondition::CarryDead,
            Precondition::OverflowDead,
        ],
        vec![],
    ));

    rules
}

/// Assembly-shape cleanups, run between `GOOD` fixpoints.
pub fn ass_opt() -> Vec<AssemblyRule> {
    let mut rules = Vec::new();

    // A conditional branch over an unconditional jump inverts.
    for (branch, inverse) in [
        (BEQ, BNE),
        (BNE, BEQ),
        (BCC, BCS),
        (BCS, BCC),
        (BMI, BPL),
        (BPL, BMI),
        (BVC, BVS),
        (BVS, BVC),
    ] {
        rules.push(rule(
            "invert-branch-over-jump",
            vec![
                LinePattern::of(branch).with_operand(OperandMatcher::Slot(0)),
                LinePattern::of(JMP)
                    .with_mode(vec![Absolute])
                    .with_operand(OperandMatcher::Slot(1)),
                LinePattern::of(LABEL).with_operand(OperandMatcher::Slot(0)),
            ],
            vec![],
            vec![
                LineTemplate {
                    opcode: inverse,
                    mode: ModeFrom::Fixed(Relative),
                    operand: NewOperand::Slot(1),
                },
                LineTemplate::copy(2),
            ],
        ));
    }

    // Code between a control-flow barrier and the next label is dead.
    rules.push(rule(
        "dead-code-after-barrier",
        vec![
            LinePattern::of_any(vec![JMP, BRA, RTS, RTL, RTN]),
            LinePattern {
                opcodes: super::dsl::OpcodeMatcher::AnyExcept(vec![LABEL]),
                modes: super::dsl::ModeMatcher::Any,
                operand: OperandMatcher::Any,
            },
        ],
        vec![],
        vec![LineTemplate::copy(0)],
    ));

    rules
}

/// Rules that pay off after the main sets settle.
pub fn later_optimizations() -> Vec<AssemblyRule> {
    let mut rules = Vec::new();

    // A load overwritten by another load before anything reads it.
    for (load, name) in [
        (LDA, "overwritten-lda"),
        (LDX, "overwritten-ldx"),
        (LDY, "overwritten-ldy"),
    ] {
        rules.push(rule(
            name,
            vec![
                LinePattern::of(load).with_mode(vec![Immediate, ZeroPage, Absolute]),
                LinePattern::of(load),
            ],
            vec![],
            vec![LineTemplate::copy(1)],
        ));
    }

    // Increment-decrement pairs.
    for (first, second, name) in [
        (INX, DEX, "pointless-inx-dex"),
        (DEX, INX, "pointless-dex-inx"),
        (INY, DEY, "pointless-iny-dey"),
        (DEY, INY, "pointless-dey-iny"),
    ] {
        rules.push(rule(
            name,
            vec![LinePattern::of(first), LinePattern::of(second)],
            vec![Precondition::FlagsNzDead],
            vec![],
        ));
    }

    rules
}

/// 65C02 rules.
pub fn cmos_optimizations() -> Vec<AssemblyRule> {
    let mut rules = Vec::new();

    rules.push(rule(
        "stz-for-zero-store",
        vec![
            LinePattern::immediate(LDA, imm_zero()),
            LinePattern::of(STA)
                .with_mode(vec![ZeroPage, ZeroPageX, Absolute, AbsoluteX])
                .with_operand(OperandMatcher::Slot(0)),
        ],
        vec![Precondition::RegDead(Reg::A), Precondition::FlagsNzDead],
        vec![LineTemplate {
            opcode: STZ,
            mode: ModeFrom::CopyFrom(1),
            operand: NewOperand::Slot(0),
        }],
    ));

    rules.push(rule(
        "inc-a-for-add-one",
        vec![
            LinePattern::of(CLC),
            LinePattern::immediate(ADC, OperandMatcher::Equals(Constant::num(1))),
        ],
        vec![Precondition::CarryDead, Precondition::OverflowDead],
        vec![LineTemplate::implied(INC)],
    ));
    rules.push(rule(
        "dec-a-for-subtract-one",
        vec![
            LinePattern::of(SEC),
            LinePattern::immediate(SBC, OperandMatcher::Equals(Constant::num(1))),
        ],
        vec![Precondition::CarryDead, Precondition::OverflowDead],
        vec![LineTemplate::implied(DEC)],
    ));

    // Index register pushes without the accumulator detour.
    for (transfer, push, dead, name) in [
        (TXA, PHX, Reg::A, "phx-for-txa-pha"),
        (TYA, PHY, Reg::A, "phy-for-tya-pha"),
    ] {
        rules.push(rule(
            name,
            vec![LinePattern::of(transfer), LinePattern::of(PHA)],
            vec![Precondition::RegDead(dead), Precondition::FlagsNzDead],
            vec![LineTemplate::implied(push)],
        ));
    }
    for (pull, transfer, name) in [
        (PLX, TAX, "plx-for-pla-tax"),
        (PLY, TAY, "ply-for-pla-tay"),
    ] {
        rules.push(rule(
            name,
            vec![LinePattern::of(PLA), LinePattern::of(transfer)],
            vec![Precondition::RegDead(Reg::A)],
            vec![LineTemplate::implied(pull)],
        ));
    }

    rules
}

/// 65CE02 rules.
pub fn ce02_optimizations() -> Vec<AssemblyRule> {
    vec![
        rule(
            "inw-for-word-increment",
            vec![
                LinePattern::of(INC)
                    .with_mode(vec![ZeroPage])
                    .with_operand(OperandMatcher::Slot(0)),
                LinePattern::of(BNE).with_operand(OperandMatcher::Slot(1)),
                LinePattern::of(INC)
                    .with_mode(vec![ZeroPage])
                    .with_operand(OperandMatcher::SlotPlus(0, 1)),
                LinePattern::of(LABEL).with_operand(OperandMatcher::Slot(1)),
            ],
            vec![Precondition::FlagsNzDead],
            vec![
                LineTemplate {
                    opcode: INW,
                    mode: ModeFrom::Fixed(ZeroPage),
                    operand: NewOperand::Slot(0),
                },
                LineTemplate::copy(3),
            ],
        ),
        rule(
            "neg-for-complement-add-one",
            vec![
                LinePattern::immediate(EOR, OperandMatcher::Equals(Constant::num(0xFF))),
                LinePattern::of(CLC),
                LinePattern::immediate(ADC, OperandMatcher::Equals(Constant::num(1))),
            ],
            vec![Precondition::CarryDead, Precondition::OverflowDead],
            vec![LineTemplate::implied(NEG)],
        ),
    ]
}

/// HuC6280 rules.
pub fn hudson_optimizations() -> Vec<AssemblyRule> {
    let mut rules = Vec::new();
    for (load, clear, name) in [
        (LDA, CLA, "cla-for-zero"),
        (LDX, CLX, "clx-for-zero"),
        (LDY, CLY, "cly-for-zero"),
    ] {
        // The clear instructions do not touch the flags the load set.
        rules.push(rule(
            name,
            vec![LinePattern::immediate(load, imm_zero())],
            vec![Precondition::FlagsNzDead],
            vec![LineTemplate::implied(clear)],
        ));
    }
    rules
}

/// 65816 rules (emulation mode).
pub fn sixteen_optimizations() -> Vec<AssemblyRule> {
    vec![
        rule(
            "txy-for-txa-tay",
            vec![LinePattern::of(TXA), LinePattern::of(TAY)],
            vec![Precondition::RegDead(Reg::A)],
            vec![LineTemplate::implied(TXY)],
        ),
        rule(
            "tyx-for-tya-tax",
            vec![LinePattern::of(TYA), LinePattern::of(TAX)],
            vec![Precondition::RegDead(Reg::A)],
            vec![LineTemplate::implied(TYX)],
        ),
    ]
}

/// Undocumented NMOS rules.
pub fn undocumented_optimizations() -> Vec<AssemblyRule> {
    let lax_modes = vec![ZeroPage, Absolute, AbsoluteY, IndexedX, IndexedY];
    vec![
        rule(
            "lax-for-lda-ldx",
            vec![
                LinePattern::of(LDA)
                    .with_mode(lax_modes.clone())
                    .with_operand(OperandMatcher::Slot(0)),
                LinePattern::of(LDX).with_operand(OperandMatcher::Slot(0)),
            ],
            vec![],
            vec![LineTemplate {
                opcode: LAX,
                mode: ModeFrom::CopyFrom(0),
                operand: NewOperand::Slot(0),
            }],
        ),
        rule(
            "lax-for-lda-tax",
            vec![
                LinePattern::of(LDA)
                    .with_mode(lax_modes)
                    .with_operand(OperandMatcher::Slot(0)),
                LinePattern::of(TAX),
            ],
            vec![],
            vec![LineTemplate {
                opcode: LAX,
                mode: ModeFrom::CopyFrom(0),
                operand: NewOperand::Slot(0),
            }],
        ),
        rule(
            "dcp-for-dec-cmp",
            vec![
                LinePattern::of(DEC)
                    .with_mode(vec![ZeroPage, ZeroPageX, Absolute, AbsoluteX])
                    .with_operand(OperandMatcher::Slot(0)),
                LinePattern::of(CMP).with_operand(OperandMatcher::Slot(0)),
            ],
            vec![],
            vec![LineTemplate {
                opcode: DCP,
                mode: ModeFrom::CopyFrom(0),
                operand: NewOperand::Slot(0),
            }],
        ),
        rule(
            "isc-for-inc-sbc",
            vec![
                LinePattern::of(INC)
                    .with_mode(vec![ZeroPage, ZeroPageX, Absolute, AbsoluteX])
                    .with_operand(OperandMatcher::Slot(0)),
                LinePattern::of(SBC).with_operand(OperandMatcher::Slot(0)),
            ],
            vec![],
            vec![LineTemplate {
                opcode: ISC,
                mode: ModeFrom::CopyFrom(0),
                operand: NewOperand::Slot(0),
            }],
        ),
        rule(
            "sbx-for-x-subtraction",
            vec![
                LinePattern::of(TXA),
                LinePattern::of(SEC),
                LinePattern::immediate(SBC, OperandMatcher::Slot(0)),
                LinePattern::of(TAX),
            ],
            vec![Precondition::RegDead(Reg::A), Precondition::OverflowDead],
            vec![
                LineTemplate::immediate(LDA, NewOperand::Fixed(Constant::num(0xFF))),
                LineTemplate::immediate(SBX, NewOperand::Slot(0)),
            ],
        ),
    ]
}

/// Rules that assume plain RAM semantics for every operand.
pub fn dangerous_optimizations() -> Vec<AssemblyRule> {
    vec![
        rule(
            "reload-after-unrelated-store",
            vec![
                LinePattern::of(LDA).with_operand(OperandMatcher::Slot(0)),
                LinePattern::of(STA).with_operand(OperandMatcher::Slot(1)),
                LinePattern::of(LDA).with_operand(OperandMatcher::Slot(0)),
            ],
            vec![Precondition::SlotsUnrelated(0, 1)],
            vec![LineTemplate::copy(0), LineTemplate::copy(1)],
        ),
        rule(
            "duplicate-store",
            vec![
                LinePattern::of(STA).with_operand(OperandMatcher::Slot(0)),
                LinePattern::of(STA).with_operand(OperandMatcher::Slot(0)),
            ],
            vec![],
            vec![LineTemplate::copy(0)],
        ),
    ]
}

/// Rules targeting spills through the zero-page pseudoregister.
pub fn zeropage_register_optimizations() -> Vec<AssemblyRule> {
    let mut rules = Vec::new();
    for (load, transfer, name) in [
        (LDX, TAX, "tax-for-spill-reload"),
        (LDY, TAY, "tay-for-spill-reload"),
    ] {
        rules.push(rule(
            name,
            vec![
                LinePattern::of(STA)
                    .with_mode(vec![ZeroPage])
                    .with_operand(OperandMatcher::Slot(0)),
                LinePattern::of(load)
                    .with_mode(vec![ZeroPage])
                    .with_operand(OperandMatcher::Slot(0)),
            ],
            vec![],
            vec![LineTemplate::copy(0), LineTemplate::implied(transfer)],
        ));
    }
    rules
}

/// The `GOOD` set plus every architecture set the options allow.
pub fn good_with_extensions(options: &CompilationOptions, cpu: Cpu) -> Vec<AssemblyRule> {
    let mut rules = quick_preset();
    rules.extend(good());
    if options.cmos_ops && cpu.has_cmos_ops() {
        rules.extend(cmos_optimizations());
    }
    if options.ce02_ops {
        rules.extend(ce02_optimizations());
    }
    if options.huc6280_ops {
        rules.extend(hudson_optimizations());
    }
    if options.emulation_65816 {
        rules.extend(sixteen_optimizations());
    }
    if options.illegals {
        rules.extend(undocumented_optimizations());
    }
    if options.zp_register.unwrap_or(1) > 0 {
        rules.extend(zeropage_register_optimizations());
    }
    if options.level >= 4 {
        rules.extend(dangerous_optimizations());
    }
    rules
}

/// The `ASS_OPT` set plus the late rules.
pub fn ass_opt_with_extensions(options: &CompilationOptions) -> Vec<AssemblyRule> {
    let mut rules = ass_opt();
    if options.level >= 2 {
        rules.extend(later_optimizations());
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_sets_are_nonempty() {
        assert!(!quick_preset().is_empty());
        assert!(quick_preset().len() < good_with_extensions(&CompilationOptions::with_level(2), Cpu::Nmos).len());
        assert!(!ass_opt().is_empty());
        assert!(!later_optimizations().is_empty());
    }

    #[test]
    fn test_extension_sets_gated_by_flags() {
        let plain = good_with_extensions(&CompilationOptions::with_level(2), Cpu::Nmos);
        let mut with_illegals = CompilationOptions::with_level(2);
        with_illegals.illegals = true;
        let extended = good_with_extensions(&with_illegals, Cpu::Nmos);
        assert!(extended.len() > plain.len());
    }

    #[test]
    fn test_rule_names_unique_enough() {
        let rules = good_with_extensions(&CompilationOptions::with_level(4), Cpu::Nmos);
        // Dangerous rules arrive only at level 4.
        assert!(rules.iter().any(|r| r.name == "duplicate-store"));
        let level2 = good_with_extensions(&CompilationOptions::with_level(2), Cpu::Nmos);
        assert!(!level2.iter().any(|r| r.name == "duplicate-store"));
    }
}
