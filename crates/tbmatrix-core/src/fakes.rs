//! In-memory collaborators (testing only)
//!
//! `MemoryCompiler` and `ScriptedSimulator` satisfy the backend traits
//! without any HDL tools installed, and record every call they receive.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{AnalyzeRequest, SimulationOutcome, SimulationRequest, Simulator, SourceCompiler};
use crate::error::{MatrixError, Result};
use crate::unit::UnitDecl;

// ---------------------------------------------------------------------------
// MemoryCompiler
// ---------------------------------------------------------------------------

/// Compiler that answers `scan` from declarations keyed by file name.
#[derive(Debug, Default)]
pub struct MemoryCompiler {
    declarations: HashMap<String, Vec<UnitDecl>>,
    failing_library: Option<String>,
    scans: Mutex<Vec<(String, Vec<PathBuf>)>>,
    analyses: Mutex<Vec<AnalyzeRequest>>,
}

impl MemoryCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `units` for any source whose file name is `file_name`.
    pub fn with_units(mut self, file_name: &str, units: Vec<UnitDecl>) -> Self {
        self.declarations
            .entry(file_name.to_string())
            .or_default()
            .extend(units);
        self
    }

    /// Make `analyze` reject sources of `library`.
    pub fn failing_on(mut self, library: &str) -> Self {
        self.failing_library = Some(library.to_string());
        self
    }

    /// `(library, sources)` of each `scan` call, in call order.
    pub fn scans(&self) -> Vec<(String, Vec<PathBuf>)> {
        self.scans.lock().unwrap().clone()
    }

    pub fn analyses(&self) -> Vec<AnalyzeRequest> {
        self.analyses.lock().unwrap().clone()
    }

    /// Total number of calls of either kind.
    pub fn call_count(&self) -> usize {
        self.scans.lock().unwrap().len() + self.analyses.lock().unwrap().len()
    }
}

#[async_trait]
impl SourceCompiler for MemoryCompiler {
    async fn scan(&self, library: &str, sources: &[PathBuf]) -> Result<Vec<(PathBuf, UnitDecl)>> {
        self.scans
            .lock()
            .unwrap()
            .push((library.to_string(), sources.to_vec()));

        let mut units = Vec::new();
        for source in sources {
            let file_name = source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if let Some(decls) = self.declarations.get(&file_name) {
                units.extend(decls.iter().cloned().map(|d| (source.clone(), d)));
            }
        }
        Ok(units)
    }

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<()> {
        self.analyses.lock().unwrap().push(request.clone());
        match &self.failing_library {
            Some(lib) if lib.eq_ignore_ascii_case(&request.library) => {
                Err(MatrixError::Compilation {
                    library: request.library.clone(),
                    diagnostics: "error: syntax error near 'end'".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedSimulator
// ---------------------------------------------------------------------------

/// What a scripted run reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Pass,
    Fail(String),
    /// `simulate` itself returns an error.
    Crash(String),
}

#[derive(Debug, Clone)]
struct Script {
    outcome: Scripted,
    delay: Option<Duration>,
}

/// Simulator whose outcome per run name is fixed in advance.
///
/// Unscripted runs pass immediately.
#[derive(Debug, Default)]
pub struct ScriptedSimulator {
    scripts: HashMap<String, Script>,
    requests: Mutex<Vec<SimulationRequest>>,
}

impl ScriptedSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, run_name: &str, outcome: Scripted) -> Self {
        self.scripts
            .entry(run_name.to_string())
            .or_insert(Script {
                outcome: Scripted::Pass,
                delay: None,
            })
            .outcome = outcome;
        self
    }

    /// Sleep for `delay` before reporting.
    pub fn delay(mut self, run_name: &str, delay: Duration) -> Self {
        self.scripts
            .entry(run_name.to_string())
            .or_insert(Script {
                outcome: Scripted::Pass,
                delay: None,
            })
            .delay = Some(delay);
        self
    }

    /// Requests in the order `simulate` was entered.
    pub fn requests(&self) -> Vec<SimulationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn invoked_runs(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.run_name).collect()
    }
}

#[async_trait]
impl Simulator for ScriptedSimulator {
    async fn simulate(&self, request: SimulationRequest) -> Result<SimulationOutcome> {
        let script = self.scripts.get(&request.run_name).cloned();
        self.requests.lock().unwrap().push(request);

        let Some(script) = script else {
            return Ok(SimulationOutcome::passed(""));
        };
        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }
        match script.outcome {
            Scripted::Pass => Ok(SimulationOutcome::passed("")),
            Scripted::Fail(msg) => Ok(SimulationOutcome::failed(msg)),
            Scripted::Crash(msg) => Err(MatrixError::Execution(msg)),
        }
    }
}
