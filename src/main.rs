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

//! Mamba65 Compiler CLI
//!
//! Feature switches use the traditional single-dash spelling (`-finline`,
//! `-Wall`, `-O2`); clap sees them as the short options `f`, `W` and `O`
//! with attached values.
//!
//! Exit codes: 0 success, 1 compilation error, 2 command line misuse.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use mamba65::env::JobContext;
use mamba65::error::format_error;
use mamba65::logger::{Logger, Verbosity};
use mamba65::output::{write_output, OutputRequest};
use mamba65::{CompilationOptions, OptimizationMetric, Platform};

/// Mamba65 - an optimizing cross-compiler for 6502-family home computers
#[derive(Parser, Debug)]
#[command(name = "mamba65")]
#[command(version)]
#[command(about = "An optimizing cross-compiler for 6502-family home computers")]
#[command(long_about = r#"
Mamba65 compiles a small statically-typed systems language into machine
code for MOS 6502 family processors, targeting classic home computers
and consoles via platform definition files.

Example usage:
  mamba65 game.mb65 -o game -t c64 -O2
  mamba65 demo.mb65 -o demo -s -g -O9 -fillegals
"#)]
struct Cli {
    /// Source files to compile (.mb65)
    #[arg(required = true)]
    source_files: Vec<PathBuf>,

    /// Output file stem
    #[arg(short, long)]
    output: PathBuf,

    /// Also write the assembly listing (.asm)
    #[arg(short = 's')]
    write_asm: bool,

    /// Also write the label file (.lbl)
    #[arg(short = 'g')]
    write_labels: bool,

    /// Target platform definition
    #[arg(short = 't', default_value = "c64")]
    platform: String,

    /// Include search path, ';'-separated, repeatable
    #[arg(short = 'I', value_delimiter = ';')]
    include: Vec<PathBuf>,

    /// Program to run on the output after a successful build
    #[arg(short = 'r')]
    run: Option<PathBuf>,

    /// Define a preprocessor feature: -D name=value
    #[arg(short = 'D')]
    define: Vec<String>,

    /// Optimization: -O0..-O9, -Os (size), -Of (speed), -Ob (extreme speed)
    #[arg(short = 'O', value_name = "LEVEL")]
    optimize: Vec<String>,

    /// Feature switches: -finline, -fillegals, -fzp-register=4, ...
    #[arg(short = 'f', value_name = "FEATURE")]
    feature: Vec<String>,

    /// Warning switches: -Wall, -Wfatal
    #[arg(short = 'W', value_name = "WARNING")]
    warning: Vec<String>,

    /// Disable function-level parallelism in the optimizer
    #[arg(long)]
    single_threaded: bool,

    /// Quiet: errors only
    #[arg(short = 'q')]
    quiet: bool,

    /// Verbosity; repeat up to three times
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Apply `-O` arguments. Returns `Err` with a message on misuse.
fn apply_optimize(options: &mut CompilationOptions, values: &[String]) -> Result<(), String> {
    for value in values {
        match value.as_str() {
            "s" => options.metric = OptimizationMetric::Size,
            "f" => options.metric = OptimizationMetric::Speed,
            "b" => options.metric = OptimizationMetric::ExtremeSpeed,
            digits => {
                let level: u8 = digits
                    .parse()
                    .map_err(|_| format!("invalid optimization level '-O{digits}'"))?;
                if level > 9 {
                    return Err(format!("invalid optimization level '-O{digits}'"));
                }
                options.level = level;
            }
        }
    }
    Ok(())
}

/// Apply `-f` feature switches.
fn apply_features(options: &mut CompilationOptions, values: &[String]) -> Result<(), String> {
    for value in values {
        match value.as_str() {
            "inline" => options.inline = true,
            "no-inline" => options.inline = false,
            "ipo" => options.ipo = true,
            "optimize-stdlib" => options.optimize_stdlib = true,
            "cmos-ops" => options.cmos_ops = true,
            "65ce02-ops" => options.ce02_ops = true,
            "huc6280-ops" => options.huc6280_ops = true,
            "emulation-65816-ops" => options.emulation_65816 = true,
            "native-65816-ops" => options.native_65816 = true,
            "illegals" => options.illegals = true,
            "jmp-fix" => options.jmp_fix = true,
            "decimal-mode" => options.decimal_mode = true,
            "variable-overlap" => options.variable_overlap = true,
            "bounds-checking" => options.bounds_checking = true,
            "lenient-encoding" => options.lenient_encoding = true,
            "shadow-irq" => options.shadow_irq = true,
            "software-stack" => options.software_stack = true,
            "use-ix-for-stack" | "use-iy-for-stack" => {
                return Err(format!("-f{value} applies to Z80 targets only"));
            }
            other => match other.strip_prefix("zp-register=") {
                Some(width) => {
                    let width: u8 = width
                        .parse()
                        .map_err(|_| format!("invalid value in '-f{other}'"))?;
                    options.zp_register = Some(width);
                }
                None => return Err(format!("unknown feature switch '-f{other}'")),
            },
        }
    }
    Ok(())
}

/// Apply `-W` warning switches. Returns whether warnings are fatal.
fn apply_warnings(options: &mut CompilationOptions, values: &[String]) -> Result<bool, String> {
    let mut fatal = false;
    for value in values {
        match value.as_str() {
            "all" => options.all_warnings = true,
            "fatal" => fatal = true,
            other => return Err(format!("unknown warning switch '-W{other}'")),
        }
    }
    Ok(fatal)
}

fn parse_defines(options: &mut CompilationOptions, values: &[String]) -> Result<(), String> {
    for value in values {
        let (name, number) = value
            .split_once('=')
            .ok_or_else(|| format!("expected -D name=value, got '-D {value}'"))?;
        let number = mamba65::lexer::parse_number(number)
            .ok_or_else(|| format!("invalid value in '-D {value}'"))?;
        options.defines.insert(name.to_string(), number);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut options = CompilationOptions::default();
    options.single_threaded = cli.single_threaded;
    options.include_dirs = cli.include.clone();

    let fatal_warnings = match apply_optimize(&mut options, &cli.optimize)
        .and_then(|_| apply_features(&mut options, &cli.feature))
        .and_then(|_| parse_defines(&mut options, &cli.define))
        .and_then(|_| apply_warnings(&mut options, &cli.warning))
    {
        Ok(fatal) => fatal,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(2);
        }
    };

    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            2 => Verbosity::Debug,
            _ => Verbosity::Trace,
        }
    };
    let logger = Logger::new(verbosity, fatal_warnings);

    // Platform.
    let platform = match Platform::load(&cli.platform, &options.include_dirs) {
        Ok(platform) => platform,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = options.validate(platform.cpu) {
        eprintln!("error: {e}");
        return ExitCode::from(2);
    }

    // Read and concatenate the source files.
    let mut source = String::new();
    for path in &cli.source_files {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                source.push_str(&content);
                source.push('\n');
            }
            Err(e) => {
                eprintln!("error: cannot read {}: {e}", path.display());
                return ExitCode::from(1);
            }
        }
    }

    let primary_filename = cli.source_files[0]
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("<input>");

    let job = JobContext::new(options, logger);
    job.logger
        .info(&format!("{} v{}", mamba65::NAME, mamba65::VERSION));

    let program = match mamba65::compile_with_job(&source, &platform, &job) {
        Ok(program) => program,
        Err(e) => {
            eprint!("{}", format_error(&e, &source, Some(primary_filename)));
            return ExitCode::from(1);
        }
    };

    job.logger.info(&format!(
        "code size: {} bytes unoptimized, {} bytes optimized",
        program.unoptimized_size, program.optimized_size
    ));

    let request = OutputRequest {
        asm: cli.write_asm,
        labels: cli.write_labels,
    };
    let written = match write_output(&cli.output, &platform, &program.output, request) {
        Ok(written) => written,
        Err(e) => {
            eprintln!("error: cannot write {}: {e}", cli.output.display());
            return ExitCode::from(1);
        }
    };
    for path in &written {
        job.logger.info(&format!("wrote {}", path.display()));
    }

    // Hand the image to an emulator or other tool when asked.
    if let Some(runner) = &cli.run {
        let image = written
            .first()
            .cloned()
            .unwrap_or_else(|| cli.output.clone());
        match std::process::Command::new(runner).arg(&image).status() {
            Ok(status) if status.success() => {}
            Ok(status) => {
                eprintln!("error: {} exited with {status}", runner.display());
                return ExitCode::from(1);
            }
            Err(e) => {
                eprintln!("error: cannot run {}: {e}", runner.display());
                return ExitCode::from(1);
            }
        }
    }

    ExitCode::SUCCESS
}
