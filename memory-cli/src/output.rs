//! Output formatting, grounded in the teacher's `output.rs` format-enum +
//! trait idiom (trimmed to the human/JSON pair this crate's dependency
//! stack carries — no YAML, no colored terminal output).

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, Write};

/// Selects how a command's result is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One human-readable summary line.
    Human,
    /// Pretty-printed JSON, for scripting.
    Json,
}

/// A command result that knows how to render itself in either format.
pub trait Output: Serialize {
    /// One human-readable line describing this result.
    fn human_line(&self) -> String;

    /// Render to `writer` in `format`.
    fn write<W: Write>(&self, mut writer: W, format: OutputFormat) -> anyhow::Result<()> {
        match format {
            OutputFormat::Human => {
                writeln!(writer, "{}", self.human_line())?;
                Ok(())
            }
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut writer, self)?;
                writeln!(writer)?;
                Ok(())
            }
        }
    }

    /// Render to stdout in `format`.
    fn print(&self, format: OutputFormat) -> anyhow::Result<()> {
        self.write(io::stdout(), format)
    }
}

impl Output for do_memory_core::EventOutcome {
    fn human_line(&self) -> String {
        self.summary.clone()
    }
}

impl Output for do_memory_core::validator::HealthReport {
    fn human_line(&self) -> String {
        let failed = self.checks.iter().filter(|c| c.level == do_memory_core::validator::Level::Fail).count();
        if failed == 0 {
            format!("healthy ({} checks passed)", self.checks.len())
        } else {
            format!("unhealthy: {failed} of {} checks failed", self.checks.len())
        }
    }
}

/// Verbose, multi-section human report for `diagnose` — distinct from
/// `validate`'s single pass/fail line (`spec.md` §4.8's split).
pub fn print_diagnose(report: &do_memory_core::validator::HealthReport) {
    println!("Health report ({} checks):", report.checks.len());
    for check in &report.checks {
        let marker = match check.level {
            do_memory_core::validator::Level::Ok => "OK  ",
            do_memory_core::validator::Level::Warn => "WARN",
            do_memory_core::validator::Level::Fail => "FAIL",
        };
        println!("  [{marker}] {:<6} {}", check.id, check.message);
    }
    if report.is_healthy() {
        println!("Overall: healthy");
    } else {
        println!("Overall: unhealthy");
    }
}
