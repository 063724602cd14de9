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

//! Property-based tests for the compiler's algebraic laws.

mod common;

use mamba65::assembler::{parse_label_file, render_label_file, LabelEntry};
use mamba65::constant::{Constant, MathOperator};
use mamba65::lexer::{format_number, parse_number};
use proptest::prelude::*;

// ============================================================================
// Constant algebra
// ============================================================================

fn arb_operator() -> impl Strategy<Value = MathOperator> {
    prop_oneof![
        Just(MathOperator::Plus),
        Just(MathOperator::Minus),
        Just(MathOperator::Times),
        Just(MathOperator::Shl),
        Just(MathOperator::Shr),
        Just(MathOperator::And),
        Just(MathOperator::Or),
        Just(MathOperator::Exor),
        Just(MathOperator::DecimalPlus),
        Just(MathOperator::DecimalMinus),
    ]
}

fn arb_constant() -> impl Strategy<Value = Constant> {
    let leaf = prop_oneof![
        (-128i64..=65535).prop_map(Constant::num),
        prop_oneof![Just("alpha"), Just("beta"), Just("gamma")]
            .prop_map(Constant::address),
    ];
    leaf.prop_recursive(3, 24, 2, |inner| {
        (arb_operator(), inner.clone(), inner).prop_map(|(op, lhs, rhs)| Constant::Compound {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    })
}

proptest! {
    /// quick_simplify is idempotent.
    #[test]
    fn prop_quick_simplify_idempotent(c in arb_constant()) {
        let once = c.quick_simplify();
        let twice = once.quick_simplify();
        prop_assert_eq!(once, twice);
    }

    /// quick_simplify preserves the value of closed constants.
    #[test]
    fn prop_quick_simplify_preserves_value(c in arb_constant()) {
        if let Some(value) = c.eval() {
            prop_assert_eq!(c.quick_simplify().eval(), Some(value));
        }
    }

    /// Simplification never erases an address occurrence.
    #[test]
    fn prop_quick_simplify_keeps_addresses(c in arb_constant()) {
        for name in ["alpha", "beta", "gamma"] {
            // Related before implies related after, unless the whole
            // branch was annihilated by a zero multiplier.
            let simplified = c.quick_simplify();
            if simplified.is_related_to(name) {
                prop_assert!(c.is_related_to(name));
            }
        }
    }

    /// subword reassembles what subbyte split, for any word value.
    #[test]
    fn prop_subword_of_bytes_roundtrip(value in 0i64..=0xFFFF) {
        let c = Constant::num_sized(value, 2);
        prop_assert_eq!(c.subword(0).eval(), Some(value));
        let lo = c.lo_byte().eval().unwrap();
        let hi = c.hi_byte().eval().unwrap();
        prop_assert_eq!((hi << 8) | lo, value);
    }
}

// ============================================================================
// BCD arithmetic
// ============================================================================

fn to_bcd(n: i64) -> i64 {
    ((n / 10) << 4) | (n % 10)
}

proptest! {
    /// Compile-time BCD addition agrees with decimal arithmetic.
    #[test]
    fn prop_bcd_addition(a in 0i64..=99, b in 0i64..=99) {
        let c = Constant::Compound {
            op: MathOperator::DecimalPlus,
            lhs: Box::new(Constant::num(to_bcd(a))),
            rhs: Box::new(Constant::num(to_bcd(b))),
        };
        let expected = to_bcd((a + b) % 100);
        prop_assert_eq!(c.eval(), Some(expected));
    }

    /// BCD subtraction agrees with saturating decimal subtraction.
    #[test]
    fn prop_bcd_subtraction(a in 0i64..=99, b in 0i64..=99) {
        prop_assume!(a >= b);
        let c = Constant::Compound {
            op: MathOperator::DecimalMinus,
            lhs: Box::new(Constant::num(to_bcd(a))),
            rhs: Box::new(Constant::num(to_bcd(b))),
        };
        prop_assert_eq!(c.eval(), Some(to_bcd(a - b)));
    }
}

// ============================================================================
// Integer literals
// ============================================================================

proptest! {
    /// Formatting then parsing a literal is the identity, in every base.
    #[test]
    fn prop_literal_roundtrip(value in 0i64..=0xFFFF, radix in prop_oneof![
        Just(2u32), Just(4), Just(8), Just(10), Just(16)
    ]) {
        let text = format_number(value, radix);
        prop_assert_eq!(parse_number(&text), Some(value));
    }

    /// Leading zeros do not change the parsed value.
    #[test]
    fn prop_literal_leading_zeros(value in 0i64..=0xFFFF) {
        let padded = format!("${value:08X}");
        prop_assert_eq!(parse_number(&padded), Some(value));
    }
}

// ============================================================================
// Label listings
// ============================================================================

proptest! {
    /// The label listing parses back to the same (name, address) pairs.
    #[test]
    fn prop_label_file_roundtrip(
        entries in proptest::collection::btree_map(
            "[a-z][a-z0-9_]{0,8}",
            0u16..=0xFFFF,
            0..12,
        )
    ) {
        let input: Vec<LabelEntry> = entries
            .iter()
            .map(|(name, &address)| LabelEntry {
                name: name.clone(),
                address,
                local: false,
            })
            .collect();
        let rendered = render_label_file(&input);
        let parsed = parse_label_file(&rendered);

        let mut expected: Vec<(String, u16)> = entries.into_iter().collect();
        expected.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        prop_assert_eq!(parsed, expected);
    }
}

// ============================================================================
// Compiled arithmetic
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Compiled byte addition wraps exactly like the CPU.
    #[test]
    fn prop_compiled_addition(x in 0u16..=255, y in 0u16..=255) {
        let source = format!(
            "byte a\nbyte output @ $c000\nvoid main() {{\n    a = {x}\n    output = a + {y}\n}}\n"
        );
        let cpu = common::compile_and_run(&source, 1);
        prop_assert_eq!(cpu.memory[0xC000], ((x + y) & 0xFF) as u8);
    }

    /// Optimization does not change observable results.
    #[test]
    fn prop_optimization_preserves_sums(x in 0u16..=255, y in 0u16..=255) {
        let source = format!(
            "byte a\nbyte b\nbyte output @ $c000\nvoid main() {{\n    a = {x}\n    b = {y}\n    output = (a ^ b) + (a & b) * 2\n}}\n"
        );
        let baseline = common::compile_and_run(&source, 0).memory[0xC000];
        let optimized = common::compile_and_run(&source, 3).memory[0xC000];
        prop_assert_eq!(baseline, optimized);
    }
}
