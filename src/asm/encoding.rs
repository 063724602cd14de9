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

//! Instruction encoding tables.
//!
//! [`is_legal`] answers whether an `(opcode, addressing mode)` pair exists
//! anywhere in the 6502 family; which CPU actually executes it is a
//! separate question answered by [`Opcode::available_on`]. The compiler
//! must never emit an illegal pair, and the assembler double-checks.
//!
//! [`opcode_byte`] covers every pair the code generator and the rule sets
//! can produce. Exotic pairs that are legal but never emitted (the 65816
//! long modes among them) return `None` and are rejected at assembly time.

use super::opcode::{AddrMode, Opcode};

/// Whether the pair exists in the 6502 family ISA.
pub fn is_legal(opcode: Opcode, mode: AddrMode) -> bool {
    use AddrMode::*;
    use Opcode::*;
    match opcode {
        // Accumulator-oriented ALU ops share one shape. The indirect and
        // long shapes come with the CMOS and 65816 extensions.
        ADC | AND | CMP | EOR | LDA | ORA | SBC => matches!(
            mode,
            Immediate
                | ZeroPage
                | ZeroPageX
                | Absolute
                | AbsoluteX
                | AbsoluteY
                | IndexedX
                | IndexedY
                | IndexedZ
                | IndexedSY
                | Stack
                | LongAbsolute
                | LongAbsoluteX
                | LongIndexedY
                | LongIndexedZ
                | WordImmediate
        ),
        STA => matches!(
            mode,
            ZeroPage
                | ZeroPageX
                | Absolute
                | AbsoluteX
                | AbsoluteY
                | IndexedX
                | IndexedY
                | IndexedZ
                | IndexedSY
                | Stack
                | LongAbsolute
                | LongAbsoluteX
                | LongIndexedY
                | LongIndexedZ
        ),
        ASL | LSR | ROL | ROR => {
            matches!(mode, Implied | ZeroPage | ZeroPageX | Absolute | AbsoluteX)
        }
        INC | DEC => matches!(mode, Implied | ZeroPage | ZeroPageX | Absolute | AbsoluteX),
        BIT => matches!(mode, ZeroPage | Absolute | Immediate | ZeroPageX | AbsoluteX),
        BCC | BCS | BEQ | BNE | BMI | BPL | BVC | BVS | BRA | BSR | BRL => {
            mode == Relative
        }
        BRK | CLC | CLD | CLI | CLV | DEX | DEY | INX | INY | NOP | PHA | PHP | PLA | PLP
        | RTI | RTS | SEC | SED | SEI | TAX | TAY | TSX | TXA | TXS | TYA => mode == Implied,
        CPX | CPY => matches!(mode, Immediate | ZeroPage | Absolute),
        JMP => matches!(mode, Absolute | Indirect),
        JSR => mode == Absolute,
        LDX => matches!(
            mode,
            Immediate | ZeroPage | ZeroPageY | Absolute | AbsoluteY | WordImmediate
        ),
        LDY => matches!(
            mode,
            Immediate | ZeroPage | ZeroPageX | Absolute | AbsoluteX | WordImmediate
        ),
        STX => matches!(mode, ZeroPage | ZeroPageY | Absolute),
        STY => matches!(mode, ZeroPage | ZeroPageX | Absolute),

        // Undocumented NMOS
        LAX => matches!(
            mode,
            ZeroPage | ZeroPageY | Absolute | AbsoluteY | IndexedX | IndexedY
        ),
        SAX => matches!(mode, ZeroPage | ZeroPageY | Absolute | IndexedX),
        SBX | ANC | ALR | ARR | XAA => mode == Immediate,
        DCP | ISC | SLO | RLA | SRE | RRA => matches!(
            mode,
            ZeroPage | ZeroPageX | Absolute | AbsoluteX | AbsoluteY | IndexedX | IndexedY
        ),
        AHX => matches!(mode, AbsoluteY | IndexedY),
        SHX | TAS | LAS => mode == AbsoluteY,
        SHY => mode == AbsoluteX,

        // 65C02
        PHX | PHY | PLX | PLY | STP | WAI => mode == Implied,
        STZ => matches!(mode, ZeroPage | ZeroPageX | Absolute | AbsoluteX),
        TRB | TSB => matches!(mode, ZeroPage | Absolute),

        // 65CE02
        ASR => matches!(mode, Implied | ZeroPage | ZeroPageX),
        ASW | ROW => mode == Absolute,
        CLE | SEE | NEG | INZ | DEZ | TAZ | TZA | TAB | TBA | TSY | TYS | PHZ | PLZ | RTN => {
            mode == Implied
        }
        CPZ => matches!(mode, Immediate | ZeroPage | Absolute),
        DEW | INW => mode == ZeroPage,
        LDZ => matches!(mode, Immediate | Absolute | AbsoluteX),
        PHW => matches!(mode, WordImmediate | Absolute),

        // HuC6280
        CLA | CLX | CLY | CSH | CSL | SAY | SXY | HuSAX | SET => mode == Implied,
        ST0 | ST1 | ST2 | TAM | TMA => mode == Immediate,
        TST => matches!(mode, ZeroPage | ZeroPageX | Absolute | AbsoluteX),

        // 65816
        XCE | XBA | TCD | TDC | TCS | TSC | TXY | TYX | PHB | PHD | PHK | PLB | PLD | RTL
        | WDM => mode == Implied,
        REP | SEP | COP => mode == Immediate,
        JSL => mode == LongAbsolute,
        MVN | MVP => mode == WordImmediate,
        PEA => mode == WordImmediate,
        PEI => mode == ZeroPage,
        PER => mode == Relative,

        // Pseudo
        LABEL | BYTE => mode == DoesNotExist,
    }
}

/// The encoded opcode byte, if this pair is emitted by this compiler.
pub fn opcode_byte(opcode: Opcode, mode: AddrMode) -> Option<u8> {
    use AddrMode::*;
    use Opcode::*;
    let byte = match (opcode, mode) {
        (LDA, Immediate) => 0xA9,
        (LDA, ZeroPage) => 0xA5,
        (LDA, ZeroPageX) => 0xB5,
        (LDA, Absolute) => 0xAD,
        (LDA, AbsoluteX) => 0xBD,
        (LDA, AbsoluteY) => 0xB9,
        (LDA, IndexedX) => 0xA1,
        (LDA, IndexedY) => 0xB1,
        (LDA, IndexedZ) => 0xB2,

        (LDX, Immediate) => 0xA2,
        (LDX, ZeroPage) => 0xA6,
        (LDX, ZeroPageY) => 0xB6,
        (LDX, Absolute) => 0xAE,
        (LDX, AbsoluteY) => 0xBE,

        (LDY, Immediate) => 0xA0,
        (LDY, ZeroPage) => 0xA4,
        (LDY, ZeroPageX) => 0xB4,
        (LDY, Absolute) => 0xAC,
        (LDY, AbsoluteX) => 0xBC,

        (STA, ZeroPage) => 0x85,
        (STA, ZeroPageX) => 0x95,
        (STA, Absolute) => 0x8D,
        (STA, AbsoluteX) => 0x9D,
        (STA, AbsoluteY) => 0x99,
        (STA, IndexedX) => 0x81,
        (STA, IndexedY) => 0x91,
        (STA, IndexedZ) => 0x92,

        (STX, ZeroPage) => 0x86,
        (STX, ZeroPageY) => 0x96,
        (STX, Absolute) => 0x8E,

        (STY, ZeroPage) => 0x84,
        (STY, ZeroPageX) => 0x94,
        (STY, Absolute) => 0x8C,

        (ADC, Immediate) => 0x69,
        (ADC, ZeroPage) => 0x65,
        (ADC, ZeroPageX) => 0x75,
        (ADC, Absolute) => 0x6D,
        (ADC, AbsoluteX) => 0x7D,
        (ADC, AbsoluteY) => 0x79,
        (ADC, IndexedX) => 0x61,
        (ADC, IndexedY) => 0x71,
        (ADC, IndexedZ) => 0x72,

        (SBC, Immediate) => 0xE9,
        (SBC, ZeroPage) => 0xE5,
        (SBC, ZeroPageX) => 0xF5,
        (SBC, Absolute) => 0xED,
        (SBC, AbsoluteX) => 0xFD,
        (SBC, AbsoluteY) => 0xF9,
        (SBC, IndexedX) => 0xE1,
        (SBC, IndexedY) => 0xF1,
        (SBC, IndexedZ) => 0xF2,

        (AND, Immediate) => 0x29,
        (AND, ZeroPage) => 0x25,
        (AND, ZeroPageX) => 0x35,
        (AND, Absolute) => 0x2D,
        (AND, AbsoluteX) => 0x3D,
        (AND, AbsoluteY) => 0x39,
        (AND, IndexedX) => 0x21,
        (AND, IndexedY) => 0x31,
        (AND, IndexedZ) => 0x32,

        (ORA, Immediate) => 0x09,
        (ORA, ZeroPage) => 0x05,
        (ORA, ZeroPageX) => 0x15,
        (ORA, Absolute) => 0x0D,
        (ORA, AbsoluteX) => 0x1D,
        (ORA, AbsoluteY) => 0x19,
        (ORA, IndexedX) => 0x01,
        (ORA, IndexedY) => 0x11,
        (ORA, IndexedZ) => 0x12,

        (EOR, Immediate) => 0x49,
        (EOR, ZeroPage) => 0x45,
        (EOR, ZeroPageX) => 0x55,
        (EOR, Absolute) => 0x4D,
        (EOR, AbsoluteX) => 0x5D,
        (EOR, AbsoluteY) => 0x59,
        (EOR, IndexedX) => 0x41,
        (EOR, IndexedY) => 0x51,
        (EOR, IndexedZ) => 0x52,

        (CMP, Immediate) => 0xC9,
        (CMP, ZeroPage) => 0xC5,
        (CMP, ZeroPageX) => 0xD5,
        (CMP, Absolute) => 0xCD,
        (CMP, AbsoluteX) => 0xDD,
        (CMP, AbsoluteY) => 0xD9,
        (CMP, IndexedX) => 0xC1,
        (CMP, IndexedY) => 0xD1,
        (CMP, IndexedZ) => 0xD2,

        (CPX, Immediate) => 0xE0,
        (CPX, ZeroPage) => 0xE4,
        (CPX, Absolute) => 0xEC,

        (CPY, Immediate) => 0xC0,
        (CPY, ZeroPage) => 0xC4,
        (CPY, Absolute) => 0xCC,

        (ASL, Implied) => 0x0A,
        (ASL, ZeroPage) => 0x06,
        (ASL, ZeroPageX) => 0x16,
        (ASL, Absolute) => 0x0E,
        (ASL, AbsoluteX) => 0x1E,

        (LSR, Implied) => 0x4A,
        (LSR, ZeroPage) => 0x46,
        (LSR, ZeroPageX) => 0x56,
        (LSR, Absolute) => 0x4E,
        (LSR, AbsoluteX) => 0x5E,

        (ROL, Implied) => 0x2A,
        (ROL, ZeroPage) => 0x26,
        (ROL, ZeroPageX) => 0x36,
        (ROL, Absolute) => 0x2E,
        (ROL, AbsoluteX) => 0x3E,

        (ROR, Implied) => 0x6A,
        (ROR, ZeroPage) => 0x66,
        (ROR, ZeroPageX) => 0x76,
        (ROR, Absolute) => 0x6E,
        (ROR, AbsoluteX) => 0x7E,

        (INC, Implied) => 0x1A,
        (INC, ZeroPage) => 0xE6,
        (INC, ZeroPageX) => 0xF6,
        (INC, Absolute) => 0xEE,
        (INC, AbsoluteX) => 0xFE,

        (DEC, Implied) => 0x3A,
        (DEC, ZeroPage) => 0xC6,
        (DEC, ZeroPageX) => 0xD6,
        (DEC, Absolute) => 0xCE,
        (DEC, AbsoluteX) => 0xDE,

        (BIT, ZeroPage) => 0x24,
        (BIT, Absolute) => 0x2C,
        (BIT, Immediate) => 0x89,
        (BIT, ZeroPageX) => 0x34,
        (BIT, AbsoluteX) => 0x3C,

        (BCC, Relative) => 0x90,
        (BCS, Relative) => 0xB0,
        (BEQ, Relative) => 0xF0,
        (BNE, Relative) => 0xD0,
        (BMI, Relative) => 0x30,
        (BPL, Relative) => 0x10,
        (BVC, Relative) => 0x50,
        (BVS, Relative) => 0x70,

        (JMP, Absolute) => 0x4C,
        (JMP, Indirect) => 0x6C,
        (JSR, Absolute) => 0x20,
        (RTS, Implied) => 0x60,
        (RTI, Implied) => 0x40,
        (BRK, Implied) => 0x00,

        (PHA, Implied) => 0x48,
        (PLA, Implied) => 0x68,
        (PHP, Implied) => 0x08,
        (PLP, Implied) => 0x28,

        (CLC, Implied) => 0x18,
        (SEC, Implied) => 0x38,
        (CLI, Implied) => 0x58,
        (SEI, Implied) => 0x78,
        (CLV, Implied) => 0xB8,
        (CLD, Implied) => 0xD8,
        (SED, Implied) => 0xF8,

        (TAX, Implied) => 0xAA,
        (TXA, Implied) => 0x8A,
        (TAY, Implied) => 0xA8,
        (TYA, Implied) => 0x98,
        (TSX, Implied) => 0xBA,
        (TXS, Implied) => 0x9A,

        (INX, Implied) => 0xE8,
        (INY, Implied) => 0xC8,
        (DEX, Implied) => 0xCA,
        (DEY, Implied) => 0x88,

        (NOP, Implied) => 0xEA,

        // Undocumented NMOS
        (LAX, ZeroPage) => 0xA7,
        (LAX, ZeroPageY) => 0xB7,
        (LAX, Absolute) => 0xAF,
        (LAX, AbsoluteY) => 0xBF,
        (LAX, IndexedX) => 0xA3,
        (LAX, IndexedY) => 0xB3,

        (SAX, ZeroPage) => 0x87,
        (SAX, ZeroPageY) => 0x97,
        (SAX, Absolute) => 0x8F,
        (SAX, IndexedX) => 0x83,

        (SBX, Immediate) => 0xCB,
        (ANC, Immediate) => 0x0B,
        (ALR, Immediate) => 0x4B,
        (ARR, Immediate) => 0x6B,
        (XAA, Immediate) => 0x8B,

        (DCP, ZeroPage) => 0xC7,
        (DCP, ZeroPageX) => 0xD7,
        (DCP, Absolute) => 0xCF,
        (DCP, AbsoluteX) => 0xDF,
        (DCP, AbsoluteY) => 0xDB,
        (DCP, IndexedX) => 0xC3,
        (DCP, IndexedY) => 0xD3,

        (ISC, ZeroPage) => 0xE7,
        (ISC, ZeroPageX) => 0xF7,
        (ISC, Absolute) => 0xEF,
        (ISC, AbsoluteX) => 0xFF,
        (ISC, AbsoluteY) => 0xFB,
        (ISC, IndexedX) => 0xE3,
        (ISC, IndexedY) => 0xF3,

        (SLO, ZeroPage) => 0x07,
        (SLO, ZeroPageX) => 0x17,
        (SLO, Absolute) => 0x0F,
        (SLO, AbsoluteX) => 0x1F,
        (SLO, AbsoluteY) => 0x1B,
        (SLO, IndexedX) => 0x03,
        (SLO, IndexedY) => 0x13,

        (RLA, ZeroPage) => 0x27,
        (RLA, ZeroPageX) => 0x37,
        (RLA, Absolute) => 0x2F,
        (RLA, AbsoluteX) => 0x3F,
        (RLA, AbsoluteY) => 0x3B,
        (RLA, IndexedX) => 0x23,
        (RLA, IndexedY) => 0x33,

        (SRE, ZeroPage) => 0x47,
        (SRE, ZeroPageX) => 0x57,
        (SRE, Absolute) => 0x4F,
        (SRE, AbsoluteX) => 0x5F,
        (SRE, AbsoluteY) => 0x5B,
        (SRE, IndexedX) => 0x43,
        (SRE, IndexedY) => 0x53,

        (RRA, ZeroPage) => 0x67,
        (RRA, ZeroPageX) => 0x77,
        (RRA, Absolute) => 0x6F,
        (RRA, AbsoluteX) => 0x7F,
        (RRA, AbsoluteY) => 0x7B,
        (RRA, IndexedX) => 0x63,
        (RRA, IndexedY) => 0x73,

        (AHX, AbsoluteY) => 0x9F,
        (AHX, IndexedY) => 0x93,
        (SHX, AbsoluteY) => 0x9E,
        (SHY, AbsoluteX) => 0x9C,
        (TAS, AbsoluteY) => 0x9B,
        (LAS, AbsoluteY) => 0xBB,

        // 65C02
        (BRA, Relative) => 0x80,
        (PHX, Implied) => 0xDA,
        (PHY, Implied) => 0x5A,
        (PLX, Implied) => 0xFA,
        (PLY, Implied) => 0x7A,
        (STP, Implied) => 0xDB,
        (WAI, Implied) => 0xCB,
        (STZ, ZeroPage) => 0x64,
        (STZ, ZeroPageX) => 0x74,
        (STZ, Absolute) => 0x9C,
        (STZ, AbsoluteX) => 0x9E,
        (TRB, ZeroPage) => 0x14,
        (TRB, Absolute) => 0x1C,
        (TSB, ZeroPage) => 0x04,
        (TSB, Absolute) => 0x0C,

        // 65CE02
        (INW, ZeroPage) => 0xE3,
        (DEW, ZeroPage) => 0xC3,
        (ASR, Implied) => 0x43,
        (ASR, ZeroPage) => 0x44,
        (ASR, ZeroPageX) => 0x54,
        (NEG, Implied) => 0x42,
        (INZ, Implied) => 0x1B,
        (DEZ, Implied) => 0x3B,
        (LDZ, Immediate) => 0xA3,
        (LDZ, Absolute) => 0xAB,
        (LDZ, AbsoluteX) => 0xBB,
        (CPZ, Immediate) => 0xC2,
        (CPZ, ZeroPage) => 0xD4,
        (CPZ, Absolute) => 0xDC,
        (TAZ, Implied) => 0x4B,
        (TZA, Implied) => 0x6B,
        (TAB, Implied) => 0x5B,
        (TBA, Implied) => 0x7B,
        (TSY, Implied) => 0x0B,
        (TYS, Implied) => 0x2B,
        (PHZ, Implied) => 0xDB,
        (PLZ, Implied) => 0xFB,
        (CLE, Implied) => 0x02,
        (SEE, Implied) => 0x03,
        (BSR, Relative) => 0x63,
        (ASW, Absolute) => 0xCB,
        (ROW, Absolute) => 0xEB,

        // HuC6280
        (SXY, Implied) => 0x02,
        (HuSAX, Implied) => 0x22,
        (SAY, Implied) => 0x42,
        (CLA, Implied) => 0x62,
        (CLX, Implied) => 0x82,
        (CLY, Implied) => 0xC2,
        (ST0, Immediate) => 0x03,
        (ST1, Immediate) => 0x13,
        (ST2, Immediate) => 0x23,
        (TAM, Immediate) => 0x53,
        (TMA, Immediate) => 0x43,
        (CSL, Implied) => 0x54,
        (CSH, Implied) => 0xD4,
        (SET, Implied) => 0xF4,

        // 65816 (emulation mode subset)
        (XCE, Implied) => 0xFB,
        (XBA, Implied) => 0xEB,
        (REP, Immediate) => 0xC2,
        (SEP, Immediate) => 0xE2,
        (PHB, Implied) => 0x8B,
        (PLB, Implied) => 0xAB,
        (PHD, Implied) => 0x0B,
        (PLD, Implied) => 0x2B,
        (PHK, Implied) => 0x4B,
        (RTL, Implied) => 0x6B,
        (PEA, WordImmediate) => 0xF4,
        (PEI, ZeroPage) => 0xD4,
        (TCD, Implied) => 0x5B,
        (TDC, Implied) => 0x7B,
        (TCS, Implied) => 0x1B,
        (TSC, Implied) => 0x3B,
        (TXY, Implied) => 0x9B,
        (TYX, Implied) => 0xBB,

        _ => return None,
    };
    Some(byte)
}

/// Encoded byte width of one line.
pub fn instruction_size(opcode: Opcode, mode: AddrMode) -> usize {
    match opcode {
        Opcode::LABEL => 0,
        Opcode::BYTE => 1,
        _ => 1 + mode.operand_size(),
    }
}

/// Opcodes that read, modify and write their memory operand.
fn is_read_modify_write(opcode: Opcode) -> bool {
    use Opcode::*;
    matches!(
        opcode,
        ASL | LSR | ROL | ROR | INC | DEC | DCP | ISC | SLO | RLA | SRE | RRA | TRB | TSB | INW
            | DEW | ASW | ROW
    )
}

/// Approximate cycle cost, used as the speed metric.
///
/// Page-crossing penalties and taken-branch cycles are averaged in rather
/// than modelled exactly; the optimizer only needs a consistent ordering.
pub fn instruction_cycles(opcode: Opcode, mode: AddrMode) -> u32 {
    use Opcode::*;
    match opcode {
        LABEL | BYTE => return 0,
        PHA | PHP | PHX | PHY | PHZ | PHB | PHD | PHK => return 3,
        PLA | PLP | PLX | PLY | PLZ | PLB | PLD => return 4,
        RTS | RTI | RTL | RTN => return 6,
        JSR | BSR | JSL => return 6,
        BRK => return 7,
        JMP => return if mode == AddrMode::Indirect { 5 } else { 3 },
        _ => {}
    }
    let rmw = is_read_modify_write(opcode);
    let store = matches!(opcode, STA | STX | STY | STZ | SAX);
    match mode {
        AddrMode::Implied => 2,
        AddrMode::Immediate | AddrMode::WordImmediate => 2,
        AddrMode::ZeroPage => {
            if rmw {
                5
            } else {
                3
            }
        }
        AddrMode::ZeroPageX | AddrMode::ZeroPageY => {
            if rmw {
                6
            } else {
                4
            }
        }
        AddrMode::Absolute => {
            if rmw {
                6
            } else {
                4
            }
        }
        AddrMode::AbsoluteX | AddrMode::AbsoluteY => {
            if rmw {
                7
            } else if store {
                5
            } else {
                4
            }
        }
        AddrMode::IndexedX => 6,
        AddrMode::IndexedY => {
            if store {
                6
            } else {
                5
            }
        }
        AddrMode::IndexedZ => 5,
        AddrMode::IndexedSY => 7,
        AddrMode::Stack => 4,
        AddrMode::Indirect => 5,
        // Averaged between taken and not taken.
        AddrMode::Relative => 3,
        AddrMode::LongAbsolute | AddrMode::LongAbsoluteX => 5,
        AddrMode::LongIndexedY | AddrMode::LongIndexedZ => 6,
        AddrMode::DoesNotExist => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_encodings() {
        assert_eq!(opcode_byte(Opcode::LDA, AddrMode::Immediate), Some(0xA9));
        assert_eq!(opcode_byte(Opcode::STA, AddrMode::Absolute), Some(0x8D));
        assert_eq!(opcode_byte(Opcode::JMP, AddrMode::Absolute), Some(0x4C));
        assert_eq!(opcode_byte(Opcode::RTS, AddrMode::Implied), Some(0x60));
        assert_eq!(opcode_byte(Opcode::BNE, AddrMode::Relative), Some(0xD0));
    }

    #[test]
    fn test_undocumented_encodings() {
        assert_eq!(opcode_byte(Opcode::SBX, AddrMode::Immediate), Some(0xCB));
        assert_eq!(opcode_byte(Opcode::LAX, AddrMode::ZeroPage), Some(0xA7));
        assert_eq!(opcode_byte(Opcode::SAX, AddrMode::Absolute), Some(0x8F));
    }

    #[test]
    fn test_cmos_encodings() {
        assert_eq!(opcode_byte(Opcode::BRA, AddrMode::Relative), Some(0x80));
        assert_eq!(opcode_byte(Opcode::STZ, AddrMode::Absolute), Some(0x9C));
        assert_eq!(opcode_byte(Opcode::INC, AddrMode::Implied), Some(0x1A));
    }

    #[test]
    fn test_illegal_pairs_rejected() {
        assert!(!is_legal(Opcode::LDX, AddrMode::ZeroPageX));
        assert!(!is_legal(Opcode::STA, AddrMode::Immediate));
        assert!(!is_legal(Opcode::JSR, AddrMode::ZeroPage));
        assert!(!is_legal(Opcode::BEQ, AddrMode::Absolute));
    }

    #[test]
    fn test_every_encoded_pair_is_legal() {
        use AddrMode::*;
        let all_modes = [
            Implied,
            Immediate,
            WordImmediate,
            ZeroPage,
            ZeroPageX,
            ZeroPageY,
            Absolute,
            AbsoluteX,
            AbsoluteY,
            Indirect,
            IndexedX,
            IndexedY,
            IndexedZ,
            IndexedSY,
            LongAbsolute,
            LongAbsoluteX,
            LongIndexedY,
            LongIndexedZ,
            Stack,
            Relative,
            DoesNotExist,
        ];
        let probe = [
            Opcode::LDA,
            Opcode::STA,
            Opcode::INC,
            Opcode::SBX,
            Opcode::STZ,
            Opcode::BRA,
            Opcode::INW,
            Opcode::CLA,
            Opcode::XCE,
        ];
        for op in probe {
            for mode in all_modes {
                if opcode_byte(op, mode).is_some() {
                    assert!(is_legal(op, mode), "encoded but illegal: {op:?} {mode:?}");
                }
            }
        }
    }

    #[test]
    fn test_sizes() {
        assert_eq!(instruction_size(Opcode::LDA, AddrMode::Immediate), 2);
        assert_eq!(instruction_size(Opcode::LDA, AddrMode::Absolute), 3);
        assert_eq!(instruction_size(Opcode::RTS, AddrMode::Implied), 1);
        assert_eq!(instruction_size(Opcode::LABEL, AddrMode::DoesNotExist), 0);
        assert_eq!(instruction_size(Opcode::BYTE, AddrMode::DoesNotExist), 1);
    }

    #[test]
    fn test_cycle_ordering() {
        // Zero page access is cheaper than absolute.
        assert!(
            instruction_cycles(Opcode::LDA, AddrMode::ZeroPage)
                < instruction_cycles(Opcode::LDA, AddrMode::Absolute)
        );
        // Read-modify-write costs more than a plain load.
        assert!(
            instruction_cycles(Opcode::INC, AddrMode::Absolute)
                > instruction_cycles(Opcode::LDA, AddrMode::Absolute)
        );
    }
}
