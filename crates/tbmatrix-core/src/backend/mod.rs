//! External collaborator contracts: the HDL compiler and the simulator.
//!
//! Both are injected through [`InvocationContext`](crate::context::InvocationContext).
//! [`ProcessBackend`] drives real tools as child processes; the in-memory
//! fakes in [`crate::fakes`] stand in for them in tests.

pub mod process;

use crate::error::Result;
use crate::flags::BackendId;
use crate::unit::{ParamValue, UnitDecl};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use process::{ProcessBackend, Toolchain};

/// The HDL compiler collaborator.
#[async_trait]
pub trait SourceCompiler: Send + Sync {
    /// Read the units declared by `sources` without compiling them.
    async fn scan(&self, library: &str, sources: &[PathBuf]) -> Result<Vec<(PathBuf, UnitDecl)>>;

    /// Compile `sources` into `library`.
    ///
    /// Returns `Err(MatrixError::Compilation)` carrying the compiler diagnostics
    /// when the tool rejects the sources.
    async fn analyze(
        &self,
        request: &AnalyzeRequest,
    ) -> Result<()>;
}

/// One compilation step: a single resolved glob of one library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub backend: BackendId,
    pub library: String,
    pub sources: Vec<PathBuf>,
    pub flags: Vec<String>,
    pub output_dir: PathBuf,
}

/// Everything a simulator needs to execute one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub backend: BackendId,
    /// `<library>.<testbench>.<config>`
    pub run_name: String,
    pub library: String,
    pub testbench: String,
    pub parameters: BTreeMap<String, ParamValue>,
    pub flags: Vec<String>,
    pub wave_script: Option<PathBuf>,
    /// Compiled libraries root shared by all runs.
    pub library_dir: PathBuf,
    /// Private working directory of this run.
    pub run_dir: PathBuf,
}

impl SimulationRequest {
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

/// What the simulator reports back for a completed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    /// Whether every assertion in the testbench held.
    pub passed: bool,
    pub diagnostics: String,
}

impl SimulationOutcome {
    pub fn passed(diagnostics: impl Into<String>) -> Self {
        Self {
            passed: true,
            diagnostics: diagnostics.into(),
        }
    }

    pub fn failed(diagnostics: impl Into<String>) -> Self {
        Self {
            passed: false,
            diagnostics: diagnostics.into(),
        }
    }
}

/// The simulation collaborator.
///
/// An `Err` means the run could not be executed at all (spawn failure,
/// missing tool) and is reported as an `error` outcome, never as `failed`.
#[async_trait]
pub trait Simulator: Send + Sync {
    async fn simulate(&self, request: SimulationRequest) -> Result<SimulationOutcome>;
}
