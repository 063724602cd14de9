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

//! Diagnostic logger for the Mamba65 compiler.
//!
//! All diagnostics funnel through a single [`Logger`]:
//! - severity levels from `Trace` up to `Fatal`
//! - a verbosity threshold set from `-q`/`-v`/`-vv`/`-vvv`
//! - error and warning counters, checkpointed between phases with
//!   [`Logger::assert_no_errors`]
//! - `-Wfatal` promotion of warnings to errors
//!
//! The logger is shared between worker threads during the optimization
//! phase, so all counters use atomics.

use crate::error::{CompileError, ErrorCode, Span};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    /// Short tag used in the diagnostic stream.
    pub fn tag(self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

/// Verbosity selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// `-q`: errors only.
    Quiet,
    /// Default: warnings and errors.
    #[default]
    Normal,
    /// `-v`: informational messages.
    Verbose,
    /// `-vv`: debug messages.
    Debug,
    /// `-vvv`: full trace.
    Trace,
}

impl Verbosity {
    /// The minimum level shown at this verbosity.
    fn threshold(self) -> Level {
        match self {
            Verbosity::Quiet => Level::Error,
            Verbosity::Normal => Level::Warn,
            Verbosity::Verbose => Level::Info,
            Verbosity::Debug => Level::Debug,
            Verbosity::Trace => Level::Trace,
        }
    }
}

/// The compiler-wide diagnostic sink.
#[derive(Debug)]
pub struct Logger {
    verbosity: Verbosity,
    /// Promote warnings to errors (`-Wfatal`).
    fatal_warnings: bool,
    errors: AtomicUsize,
    warnings: AtomicUsize,
    /// Errors seen since the last [`Logger::assert_no_errors`] checkpoint.
    errors_since_checkpoint: AtomicUsize,
}

impl Logger {
    /// Create a logger with the given verbosity.
    pub fn new(verbosity: Verbosity, fatal_warnings: bool) -> Self {
        Self {
            verbosity,
            fatal_warnings,
            errors: AtomicUsize::new(0),
            warnings: AtomicUsize::new(0),
            errors_since_checkpoint: AtomicUsize::new(0),
        }
    }

    /// Log a message at the given level.
    pub fn log(&self, level: Level, message: &str) {
        match level {
            Level::Warn if self.fatal_warnings => {
                self.count_error();
                eprintln!("ERROR: {message} (warning promoted by -Wfatal)");
                return;
            }
            Level::Warn => {
                self.warnings.fetch_add(1, Ordering::Relaxed);
            }
            Level::Error | Level::Fatal => {
                self.count_error();
            }
            _ => {}
        }
        if level >= self.verbosity.threshold() {
            if level >= Level::Warn {
                eprintln!("{}: {message}", level.tag());
            } else {
                println!("{}: {message}", level.tag());
            }
        }
    }

    pub fn trace(&self, message: &str) {
        self.log(Level::Trace, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    /// Log a fatal diagnostic and return the error that aborts the run.
    pub fn fatal(&self, message: &str) -> CompileError {
        self.log(Level::Fatal, message);
        CompileError::new(ErrorCode::InvalidFlag, message.to_string(), Span::none())
    }

    fn count_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.errors_since_checkpoint.fetch_add(1, Ordering::Relaxed);
    }

    /// Total errors logged so far.
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Total warnings logged so far.
    pub fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }

    /// Checkpoint between phases.
    ///
    /// Returns `Err` if any error was logged since the previous checkpoint,
    /// which aborts the run after the named phase.
    pub fn assert_no_errors(&self, phase: &str) -> Result<(), CompileError> {
        let since = self.errors_since_checkpoint.swap(0, Ordering::Relaxed);
        if since == 0 {
            Ok(())
        } else {
            Err(CompileError::new(
                crate::error::ErrorCode::InvalidFlag,
                format!("{since} error(s) during {phase}"),
                Span::none(),
            ))
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Verbosity::Normal, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_thresholds() {
        assert_eq!(Verbosity::Quiet.threshold(), Level::Error);
        assert_eq!(Verbosity::Normal.threshold(), Level::Warn);
        assert_eq!(Verbosity::Trace.threshold(), Level::Trace);
    }

    #[test]
    fn test_error_counting() {
        let logger = Logger::new(Verbosity::Quiet, false);
        logger.error("first");
        logger.error("second");
        assert_eq!(logger.error_count(), 2);
        assert!(logger.assert_no_errors("test phase").is_err());
        // Checkpoint resets the per-phase counter but not the total.
        assert!(logger.assert_no_errors("next phase").is_ok());
        assert_eq!(logger.error_count(), 2);
    }

    #[test]
    fn test_fatal_warnings_count_as_errors() {
        let logger = Logger::new(Verbosity::Quiet, true);
        logger.warn("suspicious");
        assert_eq!(logger.error_count(), 1);
        assert!(logger.assert_no_errors("analysis").is_err());
    }

    #[test]
    fn test_warnings_do_not_block_checkpoint() {
        let logger = Logger::new(Verbosity::Quiet, false);
        logger.warn("suspicious");
        assert_eq!(logger.warning_count(), 1);
        assert!(logger.assert_no_errors("analysis").is_ok());
    }
}
