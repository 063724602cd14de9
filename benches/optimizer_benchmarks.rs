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

//! Benchmarks for the compilation pipeline and the peephole engine.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mamba65::{CompilationOptions, Platform};

const PROGRAM: &str = "\
byte a
byte b
byte total
array output [32] @ $c000
byte twice(byte p) {
    return p + p
}
byte mixer(byte p, byte q) {
    return (p ^ q) + (p & q) * 2
}
void main() {
    a = 3
    b = twice(a)
    total = 0
    while a < 30 {
        total += mixer(a, b)
        a += 1
    }
    for b,0,until,32 {
        output[b] = total
        total += 1
    }
}
";

fn bench_compile(c: &mut Criterion) {
    let platform = Platform::c64();
    c.bench_function("compile_o0", |bench| {
        bench.iter(|| {
            mamba65::compile_full(
                black_box(PROGRAM),
                CompilationOptions::with_level(0),
                &platform,
            )
            .unwrap()
        })
    });
    c.bench_function("compile_o2", |bench| {
        bench.iter(|| {
            mamba65::compile_full(
                black_box(PROGRAM),
                CompilationOptions::with_level(2),
                &platform,
            )
            .unwrap()
        })
    });
}

fn bench_constant_simplification(c: &mut Criterion) {
    use mamba65::constant::{Constant, MathOperator};
    let tree = {
        let base = Constant::address("table").plus(3).plus(4).asl(1);
        Constant::Compound {
            op: MathOperator::Or,
            lhs: Box::new(Constant::Compound {
                op: MathOperator::Shl,
                lhs: Box::new(base.hi_byte()),
                rhs: Box::new(Constant::num(8)),
            }),
            rhs: Box::new(base.lo_byte()),
        }
    };
    c.bench_function("quick_simplify", |bench| {
        bench.iter(|| black_box(&tree).quick_simplify())
    });
}

criterion_group!(benches, bench_compile, bench_constant_simplification);
criterion_main!(benches);
