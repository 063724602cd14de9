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

//! Output file writing.
//!
//! The image layout follows the platform descriptor: a single file or one
//! file per bank, with an optional Commodore-style load-address header and
//! an optional BBC Micro `.inf` sidecar. `-s` and `-g` add the assembly
//! listing and the label file next to the image.

use crate::assembler::{render_label_file, AssemblerOutput};
use crate::platform::{OutputHeader, OutputStyle, Platform};
use std::io;
use std::path::{Path, PathBuf};

/// Which extra files to write.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputRequest {
    /// `-s`: write the `.asm` listing.
    pub asm: bool,
    /// `-g`: write the `.lbl` label file.
    pub labels: bool,
}

/// The bytes of one output image, header included.
pub fn image_bytes(platform: &Platform, start: u16, code: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(code.len() + 2);
    if platform.output_header == OutputHeader::LoadAddress {
        bytes.extend_from_slice(&start.to_le_bytes());
    }
    bytes.extend_from_slice(code);
    bytes
}

/// Write all requested output files; returns the paths written.
pub fn write_output(
    stem: &Path,
    platform: &Platform,
    output: &AssemblerOutput,
    request: OutputRequest,
) -> io::Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    match platform.output_style {
        OutputStyle::SingleFile => {
            let path = stem.with_extension(&platform.output_extension);
            let (_, image) = output.code.first().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "no code emitted")
            })?;
            std::fs::write(&path, image_bytes(platform, image.start, &image.bytes))?;
            written.push(path.clone());
            if platform.bbc_inf {
                write_inf_sidecar(&path, image.start)?;
                written.push(path.with_extension(format!(
                    "{}.inf",
                    platform.output_extension
                )));
            }
        }
        OutputStyle::PerBank => {
            for (bank, image) in &output.code {
                let path = stem.with_extension(format!("{bank}.{}", platform.output_extension));
                std::fs::write(&path, image_bytes(platform, image.start, &image.bytes))?;
                written.push(path);
            }
        }
    }

    if request.asm {
        let path = stem.with_extension("asm");
        std::fs::write(&path, output.asm.join("\n") + "\n")?;
        written.push(path);
    }
    if request.labels {
        let path = stem.with_extension("lbl");
        std::fs::write(&path, render_label_file(&output.labels))?;
        written.push(path);
    }
    Ok(written)
}

/// BBC Micro DFS metadata: file name, load address, execution address.
fn write_inf_sidecar(image_path: &Path, start: u16) -> io::Result<()> {
    let name = image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("PROGRAM")
        .to_ascii_uppercase();
    let inf_path = image_path.with_extension(format!(
        "{}.inf",
        image_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
    ));
    let contents = format!("$.{name} FF{start:04X} FF{start:04X}\n");
    std::fs::write(inf_path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    #[test]
    fn test_image_bytes_with_prg_header() {
        let platform = Platform::c64();
        let bytes = image_bytes(&platform, 0x080E, &[0xA9, 0x01]);
        assert_eq!(bytes, vec![0x0E, 0x08, 0xA9, 0x01]);
    }

    #[test]
    fn test_image_bytes_raw() {
        let mut platform = Platform::c64();
        platform.output_header = OutputHeader::None;
        let bytes = image_bytes(&platform, 0x080E, &[0xA9, 0x01]);
        assert_eq!(bytes, vec![0xA9, 0x01]);
    }
}
