//! Run results and the aggregate matrix report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Outcome of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The simulation completed and every check held.
    Passed,
    /// The simulation completed and a check was violated.
    Failed,
    /// The simulation could not complete (timeout, spawn failure, cancelled).
    Error,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunOutcome::Passed => "passed",
            RunOutcome::Failed => "failed",
            RunOutcome::Error => "error",
        };
        f.write_str(s)
    }
}

/// Result of a single RunSpec. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Index of the RunSpec in expansion order.
    pub index: usize,
    /// `<library>.<testbench>.<config>`
    pub name: String,
    /// RunSpec digest.
    pub digest: String,
    pub outcome: RunOutcome,
    pub diagnostics: String,
    pub duration_ms: u64,
    /// Waveform script bound to the run, if one existed.
    pub wave_script: Option<PathBuf>,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.outcome == RunOutcome::Passed
    }
}

/// Aggregate of every result of one invocation, in RunSpec order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixReport {
    pub invocation_id: Uuid,
    pub backend: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub results: Vec<RunResult>,
    /// Non-fatal problems collected before dispatch.
    pub warnings: Vec<String>,
}

impl MatrixReport {
    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    pub fn passed_count(&self) -> usize {
        self.count(RunOutcome::Passed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(RunOutcome::Failed)
    }

    pub fn error_count(&self) -> usize {
        self.count(RunOutcome::Error)
    }

    fn count(&self, outcome: RunOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    /// True iff every run passed. An empty matrix passes.
    pub fn success(&self) -> bool {
        self.results.iter().all(RunResult::passed)
    }

    /// Results that did not pass, in RunSpec order.
    pub fn problems(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|r| !r.passed())
    }

    /// Human-readable summary.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            let mark = match result.outcome {
                RunOutcome::Passed => "✓",
                RunOutcome::Failed => "✗",
                RunOutcome::Error => "!",
            };
            out.push_str(&format!(
                "  {} {} ({}ms)\n",
                mark, result.name, result.duration_ms
            ));
        }

        let problems: Vec<_> = self.problems().collect();
        if !problems.is_empty() {
            out.push('\n');
            for result in problems {
                out.push_str(&format!("{} [{}]\n", result.name, result.outcome));
                for line in result.diagnostics.lines() {
                    out.push_str(&format!("    {line}\n"));
                }
            }
        }

        if !self.warnings.is_empty() {
            out.push_str("\nWarnings:\n");
            for warning in &self.warnings {
                out.push_str(&format!("  - {warning}\n"));
            }
        }

        out.push_str(&format!(
            "\nTotal: {} attempted, {} passed, {} failed, {} error ({}ms)\n",
            self.attempted(),
            self.passed_count(),
            self.failed_count(),
            self.error_count(),
            self.duration_ms
        ));
        out
    }
}
