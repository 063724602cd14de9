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

//! Compilation options.
//!
//! [`CompilationOptions`] collects everything the pipeline needs to know
//! about how to compile: optimization level and metric, CPU feature
//! toggles, and the various `-f` behavior switches. Options are validated
//! once against the target CPU before compilation starts.

use crate::asm::Cpu;
use crate::error::{CompileError, ErrorCode, Result, Span};
use std::collections::HashMap;
use std::path::PathBuf;

/// What the optimizer should minimize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationMetric {
    /// `-Os`: code size in bytes.
    Size,
    /// `-Of`: cycle count (default).
    #[default]
    Speed,
    /// `-Ob`: cycle count, accepting large size increases.
    ExtremeSpeed,
}

/// All behavior switches for one compilation job.
///
/// `bounds_checking` and `variable_overlap` are deliberately independent
/// fields; neither implies the other.
#[derive(Debug, Clone)]
pub struct CompilationOptions {
    /// Optimization level, 0 to 9. Level 9 enables the superoptimizer.
    pub level: u8,
    /// Metric minimized by the peephole engine.
    pub metric: OptimizationMetric,

    // CPU feature toggles
    /// Allow 65C02 opcodes (BRA, STZ, PHX, ...).
    pub cmos_ops: bool,
    /// Allow 65CE02 opcodes (INW, DEW, ASR, ...).
    pub ce02_ops: bool,
    /// Allow HuC6280 opcodes (CLA, CLX, CLY, ...).
    pub huc6280_ops: bool,
    /// Allow 65816 opcodes in emulation mode.
    pub emulation_65816: bool,
    /// Allow 65816 native mode. Accepted but outside the conformance
    /// surface; codegen stays in emulation-mode semantics.
    pub native_65816: bool,
    /// Allow undocumented NMOS opcodes (SBX, SAX, LAX, ...).
    pub illegals: bool,

    // Behavior switches
    /// Enable inlining of small functions.
    pub inline: bool,
    /// Enable interprocedural optimization.
    pub ipo: bool,
    /// Optimize calls to standard library routines.
    pub optimize_stdlib: bool,
    /// Size in bytes of the zero-page pseudoregister; `None` takes the
    /// platform default.
    pub zp_register: Option<u8>,
    /// Work around the NMOS JMP ($xxFF) indirect jump bug.
    pub jmp_fix: bool,
    /// Allow decimal mode (BCD) instructions at runtime.
    pub decimal_mode: bool,
    /// Overlap memory of variables whose lifetimes provably do not cross.
    pub variable_overlap: bool,
    /// Emit array index bounds checks.
    pub bounds_checking: bool,
    /// Substitute closest characters when a string literal does not fit
    /// its target encoding.
    pub lenient_encoding: bool,
    /// Use the shadow IRQ register set where the platform has one.
    pub shadow_irq: bool,
    /// Use a software stack for reentrant functions.
    pub software_stack: bool,

    /// Disable function-level parallelism in the optimizer.
    pub single_threaded: bool,
    /// Enable all optional warnings (`-Wall`).
    pub all_warnings: bool,

    /// Preprocessor features defined with `-D name=value`.
    pub defines: HashMap<String, i64>,
    /// Include search path (`-I`).
    pub include_dirs: Vec<PathBuf>,
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            level: 0,
            metric: OptimizationMetric::default(),
            cmos_ops: false,
            ce02_ops: false,
            huc6280_ops: false,
            emulation_65816: false,
            native_65816: false,
            illegals: false,
            inline: false,
            ipo: false,
            optimize_stdlib: false,
            zp_register: None,
            jmp_fix: false,
            decimal_mode: false,
            variable_overlap: false,
            bounds_checking: false,
            lenient_encoding: false,
            shadow_irq: false,
            software_stack: false,
            single_threaded: false,
            all_warnings: false,
            defines: HashMap::new(),
            include_dirs: Vec::new(),
        }
    }
}

impl CompilationOptions {
    /// Options for a given `-On` level with everything else defaulted.
    pub fn with_level(level: u8) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Whether the superoptimizer runs.
    pub fn superoptimize(&self) -> bool {
        self.level >= 9
    }

    /// Validate option combinations against the target CPU.
    pub fn validate(&self, cpu: Cpu) -> Result<()> {
        if self.illegals && self.level < 2 {
            return Err(CompileError::new(
                ErrorCode::FlagRequiresHigherOptLevel,
                "-fillegals requires optimization level 2 or higher",
                Span::none(),
            ));
        }
        if self.illegals && cpu != Cpu::Nmos {
            return Err(CompileError::new(
                ErrorCode::ConflictingFlags,
                "undocumented opcodes are only available on NMOS 6502 targets",
                Span::none(),
            ));
        }
        if self.cmos_ops && cpu == Cpu::Nmos {
            return Err(CompileError::new(
                ErrorCode::ConflictingFlags,
                "-fcmos-ops requires a CMOS-capable target CPU",
                Span::none(),
            ));
        }
        if self.ce02_ops && cpu != Cpu::Ce02 {
            return Err(CompileError::new(
                ErrorCode::ConflictingFlags,
                "-f65ce02-ops requires a 65CE02 target",
                Span::none(),
            ));
        }
        if self.huc6280_ops && cpu != Cpu::HuC6280 {
            return Err(CompileError::new(
                ErrorCode::ConflictingFlags,
                "-fhuc6280-ops requires a HuC6280 target",
                Span::none(),
            ));
        }
        if (self.emulation_65816 || self.native_65816) && cpu != Cpu::Sixteen {
            return Err(CompileError::new(
                ErrorCode::ConflictingFlags,
                "65816 opcodes require a 65816 target",
                Span::none(),
            ));
        }
        if self.native_65816 && !self.emulation_65816 {
            return Err(CompileError::new(
                ErrorCode::ConflictingFlags,
                "-fnative-65816-ops requires -femulation-65816-ops",
                Span::none(),
            ));
        }
        if let Some(width) = self.zp_register {
            if width > 15 {
                return Err(CompileError::new(
                    ErrorCode::InvalidFlag,
                    "-fzp-register accepts values 0 to 15",
                    Span::none(),
                ));
            }
        }
        Ok(())
    }

    /// Cap on full peephole sweeps for the configured level.
    pub fn optimization_pass_cap(&self) -> usize {
        match self.level {
            0 => 0,
            1 => 4,
            2 => 16,
            3..=8 => 30,
            _ => 40,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegals_require_o2() {
        let mut opts = CompilationOptions::with_level(1);
        opts.illegals = true;
        assert!(opts.validate(Cpu::Nmos).is_err());
        opts.level = 2;
        assert!(opts.validate(Cpu::Nmos).is_ok());
    }

    #[test]
    fn test_illegals_nmos_only() {
        let mut opts = CompilationOptions::with_level(2);
        opts.illegals = true;
        assert!(opts.validate(Cpu::Cmos).is_err());
    }

    #[test]
    fn test_native_requires_emulation() {
        let mut opts = CompilationOptions::default();
        opts.native_65816 = true;
        assert!(opts.validate(Cpu::Sixteen).is_err());
        opts.emulation_65816 = true;
        assert!(opts.validate(Cpu::Sixteen).is_ok());
    }

    #[test]
    fn test_bounds_checking_and_overlap_are_independent() {
        let mut opts = CompilationOptions::default();
        opts.bounds_checking = true;
        assert!(!opts.variable_overlap);
        opts.variable_overlap = true;
        opts.bounds_checking = false;
        assert!(opts.validate(Cpu::Nmos).is_ok());
    }

    #[test]
    fn test_pass_cap_grows_with_level() {
        assert_eq!(CompilationOptions::with_level(0).optimization_pass_cap(), 0);
        assert!(
            CompilationOptions::with_level(2).optimization_pass_cap()
                > CompilationOptions::with_level(1).optimization_pass_cap()
        );
    }
}
