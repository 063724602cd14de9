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

//! Target platform descriptors.
//!
//! A platform is an INI file naming the CPU, the memory banks code may be
//! placed into, and how the output image is written:
//!
//! ```ini
//! [compilation]
//! arch=nmos
//! zeropage_register=4
//!
//! [allocation]
//! default=$080E-$9FFF
//!
//! [output]
//! extension=prg
//! style=single
//! header=prg
//! bbc_inf=0
//! ```
//!
//! `-t <name>` resolves `<name>.ini` against the include path. A C64
//! descriptor is compiled in as the default.

use crate::asm::Cpu;
use crate::error::{CompileError, ErrorCode, Result, Span};
use crate::lexer::parse_number;
use std::path::Path;

/// A contiguous address region code can be placed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bank {
    pub name: String,
    pub start: u16,
    pub end: u16,
}

impl Bank {
    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        (self.end as usize) - (self.start as usize) + 1
    }
}

/// How output files are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputStyle {
    /// One file containing the default bank.
    #[default]
    SingleFile,
    /// One file per bank, suffixed with the bank name.
    PerBank,
}

/// Leading bytes of the output image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputHeader {
    /// Raw image.
    #[default]
    None,
    /// Two-byte little-endian load address (Commodore PRG).
    LoadAddress,
}

/// A resolved platform descriptor.
#[derive(Debug, Clone)]
pub struct Platform {
    pub name: String,
    pub cpu: Cpu,
    pub banks: Vec<Bank>,
    pub output_extension: String,
    pub output_style: OutputStyle,
    pub output_header: OutputHeader,
    /// Emit a BBC Micro `.inf` sidecar next to the image.
    pub bbc_inf: bool,
    /// Default zero-page pseudoregister size in 2-byte words.
    pub zp_register: u8,
}

impl Platform {
    /// The built-in Commodore 64 platform.
    pub fn c64() -> Self {
        Self {
            name: "c64".to_string(),
            cpu: Cpu::Nmos,
            banks: vec![Bank {
                name: "default".to_string(),
                start: 0x080E,
                end: 0x9FFF,
            }],
            output_extension: "prg".to_string(),
            output_style: OutputStyle::SingleFile,
            output_header: OutputHeader::LoadAddress,
            bbc_inf: false,
            zp_register: 2,
        }
    }

    /// The bank with the given name, or the first bank for `""`.
    pub fn bank(&self, name: &str) -> Option<&Bank> {
        if name.is_empty() {
            self.banks.first()
        } else {
            self.banks.iter().find(|b| b.name == name)
        }
    }

    /// Resolve a CPU architecture name.
    pub fn parse_cpu(name: &str) -> Result<Cpu> {
        match name {
            "nmos" | "mos6502" | "6502" | "6510" | "ricoh" => Ok(Cpu::Nmos),
            "cmos" | "65c02" => Ok(Cpu::Cmos),
            "65ce02" => Ok(Cpu::Ce02),
            "huc6280" => Ok(Cpu::HuC6280),
            "65816" => Ok(Cpu::Sixteen),
            "z80" | "i8080" | "sharp" => Err(CompileError::new(
                ErrorCode::UnknownCpuArchitecture,
                format!("CPU architecture '{name}' is not supported by this backend"),
                Span::none(),
            )),
            other => Err(CompileError::new(
                ErrorCode::UnknownCpuArchitecture,
                format!("Unknown CPU architecture '{other}'"),
                Span::none(),
            )),
        }
    }

    /// Parse a platform descriptor from INI text.
    pub fn from_ini(name: &str, text: &str) -> Result<Self> {
        let mut platform = Self {
            name: name.to_string(),
            cpu: Cpu::Nmos,
            banks: Vec::new(),
            output_extension: "bin".to_string(),
            output_style: OutputStyle::SingleFile,
            output_header: OutputHeader::None,
            bbc_inf: false,
            zp_register: 2,
        };
        let mut section = String::new();

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.split(';').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix('[') {
                let header = header.strip_suffix(']').ok_or_else(|| {
                    invalid(name, line_no, "unterminated section header")
                })?;
                section = header.trim().to_string();
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| invalid(name, line_no, "expected key=value"))?;
            let (key, value) = (key.trim(), value.trim());

            match section.as_str() {
                "compilation" => match key {
                    "arch" => platform.cpu = Self::parse_cpu(value)?,
                    "zeropage_register" => {
                        platform.zp_register = value.parse().map_err(|_| {
                            invalid(name, line_no, "zeropage_register must be a small integer")
                        })?;
                    }
                    _ => {}
                },
                "allocation" => {
                    let (start, end) = value
                        .split_once('-')
                        .ok_or_else(|| invalid(name, line_no, "expected start-end"))?;
                    let start = parse_address(name, line_no, start.trim())?;
                    let end = parse_address(name, line_no, end.trim())?;
                    if end < start {
                        return Err(CompileError::new(
                            ErrorCode::InvalidBankDefinition,
                            format!("Bank '{key}' in '{name}' ends before it starts"),
                            Span::none(),
                        ));
                    }
                    platform.banks.push(Bank {
                        name: key.to_string(),
                        start,
                        end,
                    });
                }
                "output" => match key {
                    "extension" => platform.output_extension = value.to_string(),
                    "style" => {
                        platform.output_style = match value {
                            "single" => OutputStyle::SingleFile,
                            "per_bank" => OutputStyle::PerBank,
                            _ => return Err(invalid(name, line_no, "style must be single or per_bank")),
                        };
                    }
                    "header" => {
                        platform.output_header = match value {
                            "none" => OutputHeader::None,
                            "prg" => OutputHeader::LoadAddress,
                            _ => return Err(invalid(name, line_no, "header must be none or prg")),
                        };
                    }
                    "bbc_inf" => platform.bbc_inf = value == "1" || value == "true",
                    _ => {}
                },
                _ => {}
            }
        }

        if platform.banks.is_empty() {
            return Err(CompileError::new(
                ErrorCode::InvalidPlatformDefinition,
                format!("Platform '{name}' defines no banks"),
                Span::none(),
            ));
        }
        Ok(platform)
    }

    /// Load `<name>.ini` from the include path, falling back to the
    /// built-in platforms.
    pub fn load(name: &str, include_dirs: &[std::path::PathBuf]) -> Result<Self> {
        for dir in include_dirs {
            let candidate = dir.join(format!("{name}.ini"));
            if candidate.exists() {
                return Self::from_file(name, &candidate);
            }
        }
        match name {
            "c64" => Ok(Self::c64()),
            _ => Err(CompileError::new(
                ErrorCode::PlatformNotFound,
                format!("Cannot find platform definition '{name}.ini'"),
                Span::none(),
            )),
        }
    }

    fn from_file(name: &str, path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CompileError::new(
                ErrorCode::PlatformNotFound,
                format!("Cannot read {}: {e}", path.display()),
                Span::none(),
            )
        })?;
        Self::from_ini(name, &text)
    }
}

fn parse_address(platform: &str, line_no: usize, text: &str) -> Result<u16> {
    let value = parse_number(text).ok_or_else(|| invalid(platform, line_no, "invalid address"))?;
    u16::try_from(value).map_err(|_| invalid(platform, line_no, "address out of range"))
}

fn invalid(platform: &str, line_no: usize, message: &str) -> CompileError {
    CompileError::new(
        ErrorCode::InvalidPlatformDefinition,
        format!("{platform}.ini line {}: {message}", line_no + 1),
        Span::none(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const NES_LIKE: &str = "
[compilation]
arch=nmos
zeropage_register=4

[allocation]
prg=$8000-$BFFF
chr=$C000-$FFF9

[output]
extension=nes
style=per_bank
";

    #[test]
    fn test_builtin_c64() {
        let p = Platform::c64();
        assert_eq!(p.cpu, Cpu::Nmos);
        assert_eq!(p.output_header, OutputHeader::LoadAddress);
        assert!(p.bank("").is_some());
    }

    #[test]
    fn test_parse_ini() {
        let p = Platform::from_ini("nes", NES_LIKE).unwrap();
        assert_eq!(p.banks.len(), 2);
        assert_eq!(p.bank("prg").unwrap().start, 0x8000);
        assert_eq!(p.bank("chr").unwrap().end, 0xFFF9);
        assert_eq!(p.output_style, OutputStyle::PerBank);
        assert_eq!(p.zp_register, 4);
    }

    #[test]
    fn test_bank_capacity() {
        let bank = Bank {
            name: "default".into(),
            start: 0x1000,
            end: 0x1FFF,
        };
        assert_eq!(bank.capacity(), 0x1000);
    }

    #[test]
    fn test_rejects_backwards_bank() {
        let bad = "[allocation]\nmain=$2000-$1000\n";
        assert!(Platform::from_ini("bad", bad).is_err());
    }

    #[test]
    fn test_rejects_bankless_platform() {
        let bad = "[compilation]\narch=nmos\n";
        assert!(Platform::from_ini("bad", bad).is_err());
    }

    #[test]
    fn test_z80_family_rejected() {
        let err = Platform::parse_cpu("z80").unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownCpuArchitecture);
    }

    #[test]
    fn test_cmos_cpu_names() {
        assert_eq!(Platform::parse_cpu("cmos").unwrap(), Cpu::Cmos);
        assert_eq!(Platform::parse_cpu("65c02").unwrap(), Cpu::Cmos);
        assert_eq!(Platform::parse_cpu("huc6280").unwrap(), Cpu::HuC6280);
    }
}
