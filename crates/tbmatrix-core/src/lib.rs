//! tbmatrix - HDL testbench matrix orchestration
//!
//! Declares simulation libraries from source globs, discovers testbenches,
//! fans each testbench out into named parameter configurations and runs
//! every resulting configuration on a selected simulator backend:
//! - Libraries and globs resolve into a [`UnitCatalog`]
//! - Configurations are validated eagerly and expanded into [`RunSpec`]s
//! - Logical flags are translated per backend
//! - Runs are dispatched on a bounded worker pool into a [`MatrixReport`]

pub mod backend;
pub mod catalog;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod expander;
pub mod fakes;
pub mod flags;
pub mod library;
pub mod manifest;
pub mod obs;
pub mod pipeline;
pub mod report;
pub mod scan;
pub mod settings;
pub mod sources;
pub mod telemetry;
pub mod unit;

// Re-export key types
pub use backend::{
    AnalyzeRequest, ProcessBackend, SimulationOutcome, SimulationRequest, Simulator,
    SourceCompiler, Toolchain,
};
pub use catalog::UnitCatalog;
pub use context::InvocationContext;
pub use dispatch::{DispatchConfig, RunDispatcher};
pub use error::{ErrorCategory, MatrixError, Result};
pub use expander::{
    ConfigSpec, Configuration, ConfigurationExpander, ConfigurationHandle, RunBindings, RunSpec,
};
pub use flags::{BackendId, FlagTranslator, LogicalFlag, UnsupportedFlagPolicy};
pub use library::{Library, LibraryHandle, LibraryRegistry};
pub use manifest::Manifest;
pub use pipeline::{MatrixPipeline, MatrixPlan};
pub use report::{MatrixReport, RunOutcome, RunResult};
pub use settings::{Settings, SourcePolicy};
pub use unit::{
    CompiledUnit, ParamDefault, ParamKind, ParamValue, ParameterDecl, Testbench, UnitDecl,
};
