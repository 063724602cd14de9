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

//! Compile-time constant expressions.
//!
//! Operands of assembly lines are [`Constant`] trees: numbers, addresses
//! of named things, byte selections, and compound arithmetic over them.
//! Trees stay symbolic until the assembler resolves symbol addresses;
//! [`Constant::quick_simplify`] normalizes them along the way without ever
//! dropping a [`Constant::MemoryAddress`] occurrence, so relatedness
//! queries keep working on simplified trees.
//!
//! The `Decimal*` operators implement packed-BCD arithmetic: at compile
//! time the value is converted digit-wise to a plain integer, the binary
//! operator is applied, and the result is converted back, masked to the
//! operand width.

/// Binary operator in a [`Constant::Compound`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathOperator {
    Plus,
    Minus,
    Times,
    Shl,
    Shr,
    /// 9-bit left shift; result keeps the carry bit.
    Shl9,
    /// 9-bit right shift.
    Shr9,
    /// Addition with a 9-bit result.
    Plus9,
    DecimalPlus,
    DecimalMinus,
    DecimalTimes,
    DecimalShl,
    DecimalShl9,
    DecimalShr,
    DecimalPlus9,
    And,
    Or,
    Exor,
}

impl MathOperator {
    /// Operators whose result is always two bytes wide.
    fn forces_word(self) -> bool {
        matches!(
            self,
            MathOperator::Plus9
                | MathOperator::Shl9
                | MathOperator::DecimalPlus9
                | MathOperator::DecimalShl9
        )
    }

    fn is_decimal(self) -> bool {
        matches!(
            self,
            MathOperator::DecimalPlus
                | MathOperator::DecimalMinus
                | MathOperator::DecimalTimes
                | MathOperator::DecimalShl
                | MathOperator::DecimalShl9
                | MathOperator::DecimalShr
                | MathOperator::DecimalPlus9
        )
    }
}

/// A compile-time constant expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// A plain number. Invariant: `size == 1` implies `-128 <= value <= 255`,
    /// and the narrowest encoding is preferred.
    Numeric { value: i64, size: u8 },
    /// The address of a named thing in memory; always two bytes.
    MemoryAddress { name: String },
    /// Byte `index` (0 = low) of `base`; one byte.
    Subbyte { base: Box<Constant>, index: u8 },
    /// `lhs op rhs`.
    Compound {
        op: MathOperator,
        lhs: Box<Constant>,
        rhs: Box<Constant>,
    },
    /// Placeholder pending environment resolution.
    Unexpanded { name: String, size: u8 },
    /// Assertion that the inner constant fits in 8 bits; one byte.
    AssertByte { inner: Box<Constant> },
}

/// Smallest legal `size` for a numeric value.
fn size_for_value(value: i64) -> u8 {
    if (-128..=255).contains(&value) {
        1
    } else if (-32768..=65535).contains(&value) {
        2
    } else if (-8_388_608..=16_777_215).contains(&value) {
        3
    } else {
        4
    }
}

fn mask_for_size(size: u8) -> i64 {
    match size {
        1 => 0xFF,
        2 => 0xFFFF,
        3 => 0xFF_FFFF,
        _ => 0xFFFF_FFFF,
    }
}

/// Packed BCD to plain integer, one decimal digit per nibble.
fn bcd_to_int(value: i64, size: u8) -> i64 {
    let mut result = 0;
    let mut scale = 1;
    let masked = value & mask_for_size(size);
    for shift in 0..(2 * size as u32) {
        let nibble = (masked >> (4 * shift)) & 0xF;
        result += nibble.min(9) * scale;
        scale *= 10;
    }
    result
}

/// Plain integer to packed BCD, truncating digits beyond the width.
fn int_to_bcd(mut value: i64, size: u8) -> i64 {
    if value < 0 {
        value = 0;
    }
    let mut result = 0;
    for shift in 0..(2 * size as u32) {
        let digit = value % 10;
        value /= 10;
        result |= digit << (4 * shift);
    }
    result
}

impl Constant {
    /// A numeric constant in its narrowest encoding.
    pub fn num(value: i64) -> Self {
        Constant::Numeric {
            value,
            size: size_for_value(value),
        }
    }

    /// A numeric constant with an explicit width.
    pub fn num_sized(value: i64, size: u8) -> Self {
        Constant::Numeric {
            value,
            size: size.max(size_for_value(value)),
        }
    }

    /// The address of a named thing.
    pub fn address(name: impl Into<String>) -> Self {
        Constant::MemoryAddress { name: name.into() }
    }

    /// Zero as a one-byte constant.
    pub fn zero() -> Self {
        Constant::num(0)
    }

    /// Size of this constant in bytes.
    pub fn size_in_bytes(&self) -> u8 {
        match self {
            Constant::Numeric { size, .. } => *size,
            Constant::MemoryAddress { .. } => 2,
            Constant::Subbyte { .. } | Constant::AssertByte { .. } => 1,
            Constant::Unexpanded { size, .. } => *size,
            Constant::Compound { op, lhs, rhs } => {
                if op.forces_word() {
                    2
                } else {
                    lhs.size_in_bytes().max(rhs.size_in_bytes())
                }
            }
        }
    }

    /// `self + addend`, simplified.
    pub fn plus(&self, addend: i64) -> Self {
        if addend == 0 {
            return self.clone();
        }
        Constant::Compound {
            op: MathOperator::Plus,
            lhs: Box::new(self.clone()),
            rhs: Box::new(Constant::num(addend)),
        }
        .quick_simplify()
    }

    /// `self - subtrahend`, simplified.
    pub fn minus(&self, subtrahend: i64) -> Self {
        self.plus(-subtrahend)
    }

    /// `self << bits`, simplified.
    pub fn asl(&self, bits: u8) -> Self {
        if bits == 0 {
            return self.clone();
        }
        Constant::Compound {
            op: MathOperator::Shl,
            lhs: Box::new(self.clone()),
            rhs: Box::new(Constant::num(bits as i64)),
        }
        .quick_simplify()
    }

    /// Low byte of this constant.
    pub fn lo_byte(&self) -> Self {
        self.subbyte(0)
    }

    /// High byte of this constant.
    pub fn hi_byte(&self) -> Self {
        self.subbyte(1)
    }

    /// Byte `index` (0 = low) of this constant.
    pub fn subbyte(&self, index: u8) -> Self {
        match self {
            Constant::Numeric { value, .. } => Constant::num((value >> (8 * index as u32)) & 0xFF),
            _ => Constant::Subbyte {
                base: Box::new(self.clone()),
                index,
            },
        }
    }

    /// 16-bit word `index` (0 = low) of this constant.
    pub fn subword(&self, index: u8) -> Self {
        match self {
            Constant::Numeric { value, .. } => Constant::num_sized(
                (value >> (16 * index as u32)) & 0xFFFF,
                2,
            ),
            _ => Constant::Compound {
                op: MathOperator::Or,
                lhs: Box::new(Constant::Compound {
                    op: MathOperator::Shl,
                    lhs: Box::new(self.subbyte(2 * index + 1)),
                    rhs: Box::new(Constant::num(8)),
                }),
                rhs: Box::new(self.subbyte(2 * index)),
            }
            .quick_simplify(),
        }
    }

    /// Whether the constant is the literal zero.
    pub fn is_provably_zero(&self) -> bool {
        match self {
            Constant::Numeric { value, .. } => *value == 0,
            Constant::AssertByte { inner } => inner.is_provably_zero(),
            _ => false,
        }
    }

    /// Whether the constant is provably not negative.
    pub fn is_provably_nonnegative(&self) -> bool {
        match self {
            Constant::Numeric { value, .. } => *value >= 0,
            Constant::MemoryAddress { .. } => true,
            Constant::Subbyte { .. } | Constant::AssertByte { .. } => true,
            _ => false,
        }
    }

    /// Whether the tree mentions the address of `name`.
    ///
    /// Used by peephole preconditions to decide whether a memory operand
    /// may alias a given thing.
    pub fn is_related_to(&self, name: &str) -> bool {
        match self {
            Constant::Numeric { .. } => false,
            Constant::MemoryAddress { name: n } => n == name,
            Constant::Unexpanded { name: n, .. } => n == name,
            Constant::Subbyte { base, .. } => base.is_related_to(name),
            Constant::AssertByte { inner } => inner.is_related_to(name),
            Constant::Compound { lhs, rhs, .. } => {
                lhs.is_related_to(name) || rhs.is_related_to(name)
            }
        }
    }

    /// Whether a closed constant fits a value of `size` bytes.
    pub fn fits_into(&self, size: u8) -> bool {
        match self.eval() {
            Some(value) => {
                let bits = 8 * size as u32;
                value >= -(1i64 << (bits - 1)) && value < (1i64 << bits)
            }
            None => self.size_in_bytes() <= size,
        }
    }

    /// Evaluate a closed constant tree; `None` if any symbol remains.
    pub fn eval(&self) -> Option<i64> {
        self.eval_with(&|_| None)
    }

    /// Evaluate with a symbol-address lookup.
    pub fn eval_with(&self, lookup: &dyn Fn(&str) -> Option<i64>) -> Option<i64> {
        match self {
            Constant::Numeric { value, .. } => Some(*value),
            Constant::MemoryAddress { name } | Constant::Unexpanded { name, .. } => lookup(name),
            Constant::Subbyte { base, index } => {
                base.eval_with(lookup).map(|v| (v >> (8 * *index as u32)) & 0xFF)
            }
            Constant::AssertByte { inner } => inner.eval_with(lookup).map(|v| v & 0xFF),
            Constant::Compound { op, lhs, rhs } => {
                let l = lhs.eval_with(lookup)?;
                let r = rhs.eval_with(lookup)?;
                let size = lhs.size_in_bytes().max(rhs.size_in_bytes());
                Some(apply_operator(*op, l, r, size))
            }
        }
    }

    /// Simplify to a normal form.
    ///
    /// Idempotent, meaning-preserving, and guaranteed not to lose
    /// `MemoryAddress` occurrences: an address can be folded against
    /// numeric offsets but never erased.
    pub fn quick_simplify(&self) -> Constant {
        use MathOperator::*;
        let simplified = match self {
            Constant::Compound { op, lhs, rhs } => {
                let lhs = lhs.quick_simplify();
                let rhs = rhs.quick_simplify();
                Constant::Compound {
                    op: *op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            Constant::Subbyte { base, index } => base.quick_simplify().subbyte(*index),
            Constant::AssertByte { inner } => {
                let inner = inner.quick_simplify();
                match inner {
                    Constant::Numeric { value, .. } if (0..=255).contains(&value) => {
                        Constant::num(value)
                    }
                    other => Constant::AssertByte {
                        inner: Box::new(other),
                    },
                }
            }
            other => other.clone(),
        };

        let Constant::Compound { op, lhs, rhs } = &simplified else {
            return simplified;
        };
        let (lhs, rhs) = (lhs.as_ref(), rhs.as_ref());

        // Full numeric folding.
        if let (Constant::Numeric { value: l, size: sl }, Constant::Numeric { value: r, size: sr }) =
            (lhs, rhs)
        {
            let size = if op.forces_word() {
                2
            } else {
                (*sl).max(*sr)
            };
            let folded = apply_operator(*op, *l, *r, size);
            return Constant::num_sized(folded, size);
        }

        // Identity laws.
        match (op, lhs, rhs) {
            (Plus | Or | Exor, x, z) | (Shl | Shr | Minus, x, z) if z.is_provably_zero() => {
                return x.clone()
            }
            (Plus | Or | Exor, z, x) if z.is_provably_zero() => return x.clone(),
            (Times | And, _, z) if z.is_provably_zero() => return Constant::zero(),
            (Times | And, z, _) if z.is_provably_zero() => return Constant::zero(),
            (Times, x, Constant::Numeric { value: 1, .. }) => return x.clone(),
            (Times, Constant::Numeric { value: 1, .. }, x) => return x.clone(),
            _ => {}
        }

        // Hoist numeric offsets to the right:
        //   (a + k1) + k2  ->  a + (k1 + k2)
        //   (a - k1) + k2  ->  a + (k2 - k1)
        //   (a + k1) - k2  ->  a + (k1 - k2)
        if let Constant::Numeric { value: k2, .. } = rhs {
            if matches!(*op, Plus | Minus) {
                if let Constant::Compound {
                    op: inner_op,
                    lhs: a,
                    rhs: inner_rhs,
                } = lhs
                {
                    if let Constant::Numeric { value: k1, .. } = inner_rhs.as_ref() {
                        if matches!(*inner_op, Plus | Minus) {
                            let k1 = if *inner_op == Plus { *k1 } else { -*k1 };
                            let k2 = if *op == Plus { *k2 } else { -*k2 };
                            let offset = k1 + k2;
                            return match offset {
                                0 => a.as_ref().clone(),
                                o if o > 0 => Constant::Compound {
                                    op: Plus,
                                    lhs: a.clone(),
                                    rhs: Box::new(Constant::num(o)),
                                },
                                o => Constant::Compound {
                                    op: Minus,
                                    lhs: a.clone(),
                                    rhs: Box::new(Constant::num(-o)),
                                },
                            };
                        }
                    }
                }
            }
        }

        // Byte reassembly: (hi(c) << 8) | lo(c)  ->  c
        if matches!(*op, Or | Plus) {
            if let Constant::Compound {
                op: Shl,
                lhs: shifted,
                rhs: by,
            } = lhs
            {
                if let (
                    Constant::Subbyte { base: hi, index: 1 },
                    Constant::Numeric { value: 8, .. },
                    Constant::Subbyte { base: lo, index: 0 },
                ) = (shifted.as_ref(), by.as_ref(), rhs)
                {
                    if hi == lo && hi.size_in_bytes() <= 2 {
                        return hi.as_ref().clone();
                    }
                }
            }
        }

        simplified
    }
}

/// Apply a binary operator at a given width.
fn apply_operator(op: MathOperator, l: i64, r: i64, size: u8) -> i64 {
    use MathOperator::*;
    let mask = mask_for_size(size);
    if op.is_decimal() {
        let ld = bcd_to_int(l, size);
        let rd = bcd_to_int(r, size);
        let result = match op {
            DecimalPlus => ld + rd,
            DecimalMinus => (ld - rd).max(0),
            DecimalTimes => ld * rd,
            DecimalShl => ld << (rd.clamp(0, 31) as u32),
            DecimalShl9 => ld << (rd.clamp(0, 31) as u32),
            DecimalShr => ld >> (rd.clamp(0, 63) as u32),
            DecimalPlus9 => ld + rd,
            _ => unreachable!(),
        };
        let encoded = int_to_bcd(result, 2);
        return match op {
            DecimalPlus9 | DecimalShl9 => encoded & 0x1FF,
            _ => encoded & mask,
        };
    }
    match op {
        Plus => (l + r) & mask,
        Minus => (l - r) & mask,
        Times => (l * r) & mask_for_size(size_for_value((l & mask) * (r & mask)).max(size)),
        Shl => {
            let shifted = l << (r.clamp(0, 31) as u32);
            shifted & mask_for_size(size_for_value(shifted).max(size))
        }
        Shr => ((l & mask) >> (r.clamp(0, 63) as u32)) & mask,
        Shl9 => (l << (r.clamp(0, 31) as u32)) & 0x1FF,
        Shr9 => ((l & 0x1FF) >> (r.clamp(0, 63) as u32)) & 0x1FF,
        Plus9 => (l + r) & 0x1FF,
        And => l & r & mask,
        Or => (l | r) & mask,
        Exor => (l ^ r) & mask,
        _ => unreachable!(),
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Numeric { value, size } => {
                if *value < 0 {
                    write!(f, "-${:0width$X}", -value, width = 2 * *size as usize)
                } else {
                    write!(f, "${:0width$X}", value, width = 2 * *size as usize)
                }
            }
            Constant::MemoryAddress { name } => f.write_str(name),
            Constant::Subbyte { base, index } => match index {
                0 => write!(f, "lo({base})"),
                1 => write!(f, "hi({base})"),
                i => write!(f, "byte{i}({base})"),
            },
            Constant::Unexpanded { name, .. } => write!(f, "{name}?"),
            Constant::AssertByte { inner } => write!(f, "byte({inner})"),
            Constant::Compound { op, lhs, rhs } => {
                use MathOperator::*;
                let symbol = match op {
                    Plus => "+",
                    Minus => "-",
                    Times => "*",
                    Shl => "<<",
                    Shr => ">>",
                    Shl9 => "<<9",
                    Shr9 => ">>9",
                    Plus9 => "+9",
                    DecimalPlus => "+'",
                    DecimalMinus => "-'",
                    DecimalTimes => "*'",
                    DecimalShl => "<<'",
                    DecimalShl9 => "<<9'",
                    DecimalShr => ">>'",
                    DecimalPlus9 => "+9'",
                    And => "&",
                    Or => "|",
                    Exor => "^",
                };
                write!(f, "({lhs} {symbol} {rhs})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_sizes() {
        assert_eq!(Constant::num(0).size_in_bytes(), 1);
        assert_eq!(Constant::num(255).size_in_bytes(), 1);
        assert_eq!(Constant::num(-128).size_in_bytes(), 1);
        assert_eq!(Constant::num(256).size_in_bytes(), 2);
        assert_eq!(Constant::num(65535).size_in_bytes(), 2);
        assert_eq!(Constant::num(65536).size_in_bytes(), 3);
    }

    #[test]
    fn test_numeric_folding() {
        let c = Constant::Compound {
            op: MathOperator::Plus,
            lhs: Box::new(Constant::num(40)),
            rhs: Box::new(Constant::num(2)),
        };
        assert_eq!(c.quick_simplify(), Constant::num(42));
    }

    #[test]
    fn test_identity_laws() {
        let a = Constant::address("counter");
        let plus_zero = Constant::Compound {
            op: MathOperator::Plus,
            lhs: Box::new(a.clone()),
            rhs: Box::new(Constant::zero()),
        };
        assert_eq!(plus_zero.quick_simplify(), a);

        let times_zero = Constant::Compound {
            op: MathOperator::Times,
            lhs: Box::new(a.clone()),
            rhs: Box::new(Constant::zero()),
        };
        assert_eq!(times_zero.quick_simplify(), Constant::zero());

        let times_one = Constant::Compound {
            op: MathOperator::Times,
            lhs: Box::new(a.clone()),
            rhs: Box::new(Constant::num(1)),
        };
        assert_eq!(times_one.quick_simplify(), a);
    }

    #[test]
    fn test_offset_hoisting() {
        let a = Constant::address("table");
        let nested = a.plus(3).plus(4);
        assert_eq!(nested, a.plus(7));
        let back = a.plus(3).minus(3);
        assert_eq!(back, a);
        let negative = a.plus(3).minus(5);
        assert_eq!(
            negative,
            Constant::Compound {
                op: MathOperator::Minus,
                lhs: Box::new(a),
                rhs: Box::new(Constant::num(2)),
            }
        );
    }

    #[test]
    fn test_byte_reassembly() {
        let a = Constant::address("vector");
        let rebuilt = Constant::Compound {
            op: MathOperator::Or,
            lhs: Box::new(Constant::Compound {
                op: MathOperator::Shl,
                lhs: Box::new(a.hi_byte()),
                rhs: Box::new(Constant::num(8)),
            }),
            rhs: Box::new(a.lo_byte()),
        };
        assert_eq!(rebuilt.quick_simplify(), a);
    }

    #[test]
    fn test_quick_simplify_idempotent() {
        let samples = [
            Constant::num(300),
            Constant::address("x").plus(12),
            Constant::address("x").hi_byte(),
            Constant::Compound {
                op: MathOperator::Times,
                lhs: Box::new(Constant::address("x")),
                rhs: Box::new(Constant::num(2)),
            },
        ];
        for c in samples {
            let once = c.quick_simplify();
            assert_eq!(once.quick_simplify(), once, "not idempotent for {c}");
        }
    }

    #[test]
    fn test_simplify_preserves_addresses() {
        let c = Constant::address("thing").plus(5).asl(1);
        assert!(c.quick_simplify().is_related_to("thing"));
    }

    #[test]
    fn test_relatedness() {
        let c = Constant::address("a").plus(1);
        assert!(c.is_related_to("a"));
        assert!(!c.is_related_to("b"));
    }

    #[test]
    fn test_subbyte_of_numeric() {
        let c = Constant::num(0x1234);
        assert_eq!(c.lo_byte(), Constant::num(0x34));
        assert_eq!(c.hi_byte(), Constant::num(0x12));
    }

    #[test]
    fn test_subword_roundtrip() {
        for value in [0i64, 1, 0xFF, 0x100, 0x1234, 0xFFFF] {
            let c = Constant::num_sized(value, 2);
            assert_eq!(c.subword(0).eval(), Some(value));
        }
    }

    #[test]
    fn test_symbolic_subword_reassembles() {
        let a = Constant::address("vector");
        assert_eq!(a.subword(0), a);
    }

    #[test]
    fn test_decimal_plus() {
        // 0x19 is BCD 19; 19 + 3 = 22 -> 0x22.
        let c = Constant::Compound {
            op: MathOperator::DecimalPlus,
            lhs: Box::new(Constant::num(0x19)),
            rhs: Box::new(Constant::num(0x03)),
        };
        assert_eq!(c.quick_simplify(), Constant::num(0x22));
    }

    #[test]
    fn test_decimal_plus_wraps_at_byte() {
        // BCD 99 + 1 = 100, masked to byte width -> 0x00.
        let c = Constant::Compound {
            op: MathOperator::DecimalPlus,
            lhs: Box::new(Constant::num(0x99)),
            rhs: Box::new(Constant::num(0x01)),
        };
        assert_eq!(c.quick_simplify(), Constant::num(0x00));
    }

    #[test]
    fn test_decimal_plus9_keeps_carry() {
        // BCD 99 + 1 = 100; the ninth bit survives under Plus9.
        let c = Constant::Compound {
            op: MathOperator::DecimalPlus9,
            lhs: Box::new(Constant::num(0x99)),
            rhs: Box::new(Constant::num(0x01)),
        };
        assert_eq!(c.eval(), Some(0x100));
    }

    #[test]
    fn test_decimal_times() {
        // BCD 12 * 4 = 48 -> 0x48.
        let c = Constant::Compound {
            op: MathOperator::DecimalTimes,
            lhs: Box::new(Constant::num(0x12)),
            rhs: Box::new(Constant::num(0x04)),
        };
        assert_eq!(c.quick_simplify(), Constant::num(0x48));
    }

    #[test]
    fn test_fits_into() {
        assert!(Constant::num(255).fits_into(1));
        assert!(!Constant::num(256).fits_into(1));
        assert!(Constant::num(65535).fits_into(2));
        assert!(Constant::num(-1).fits_into(1));
    }

    #[test]
    fn test_eval_with_symbols() {
        let c = Constant::address("origin").plus(0x10);
        let value = c.eval_with(&|name| (name == "origin").then_some(0xC000));
        assert_eq!(value, Some(0xC010));
    }
}
