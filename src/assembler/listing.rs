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

//! Label listings.
//!
//! One line per symbol, `al <hex-address> .<normalized-name>`, sorted by
//! address with global labels preferred over locals on ties. `$` and `.`
//! in names become `_` so downstream assemblers and monitors accept them.

/// A symbol ready for the label file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
    pub name: String,
    pub address: u16,
    pub local: bool,
}

/// Normalize a symbol name for assemblers that restrict identifiers.
pub fn normalize_name(name: &str) -> String {
    name.replace(['$', '.'], "_")
}

/// Render the label file.
pub fn render_label_file(entries: &[LabelEntry]) -> String {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| {
        a.address
            .cmp(&b.address)
            .then(a.local.cmp(&b.local))
            .then(a.name.cmp(&b.name))
    });
    let mut out = String::new();
    for entry in &sorted {
        out.push_str(&format!(
            "al {:04X} .{}\n",
            entry.address,
            normalize_name(&entry.name)
        ));
    }
    out
}

/// Parse a label file back into `(name, address)` pairs.
pub fn parse_label_file(text: &str) -> Vec<(String, u16)> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            if parts.next()? != "al" {
                return None;
            }
            let address = u16::from_str_radix(parts.next()?, 16).ok()?;
            let name = parts.next()?.strip_prefix('.')?.to_string();
            Some((name, address))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_name("main"), "main");
        assert_eq!(normalize_name(".wh_0001"), "_wh_0001");
        assert_eq!(normalize_name("irq$save"), "irq_save");
    }

    #[test]
    fn test_sorted_by_address_then_globality() {
        let entries = vec![
            LabelEntry {
                name: ".local".into(),
                address: 0x1000,
                local: true,
            },
            LabelEntry {
                name: "global".into(),
                address: 0x1000,
                local: false,
            },
            LabelEntry {
                name: "early".into(),
                address: 0x0800,
                local: false,
            },
        ];
        let rendered = render_label_file(&entries);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines[0], "al 0800 .early");
        assert_eq!(lines[1], "al 1000 .global");
        assert_eq!(lines[2], "al 1000 ._local");
    }

    #[test]
    fn test_roundtrip() {
        let entries = vec![
            LabelEntry {
                name: "main".into(),
                address: 0x080E,
                local: false,
            },
            LabelEntry {
                name: "helper".into(),
                address: 0x0900,
                local: false,
            },
        ];
        let rendered = render_label_file(&entries);
        let parsed = parse_label_file(&rendered);
        assert_eq!(
            parsed,
            vec![("main".to_string(), 0x080E), ("helper".to_string(), 0x0900)]
        );
    }
}
