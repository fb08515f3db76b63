//! Error types for matrix declaration, source resolution and dispatch

use std::path::PathBuf;
use thiserror::Error;

/// Broad class of a [`MatrixError`].
///
/// Declaration errors describe an invalid matrix and always abort the
/// invocation before anything is dispatched. Source resolution errors are
/// fatal in strict mode only; permissive mode turns empty globs into
/// warnings before they ever become errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Declaration,
    SourceResolution,
    Execution,
}

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("library '{0}' is already registered")]
    DuplicateLibrary(String),

    #[error("library '{0}' is not registered")]
    UnknownLibrary(String),

    #[error("glob '{pattern}' in library '{library}' matched no source files")]
    NoSourcesMatched { library: String, pattern: String },

    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("no testbench named '{0}' was discovered")]
    UnknownEntity(String),

    #[error("testbench '{testbench}' already has a configuration named '{name}'")]
    DuplicateConfigName { testbench: String, name: String },

    #[error("testbench '{testbench}' declares no parameter named '{parameter}'")]
    UnknownParameter { testbench: String, parameter: String },

    #[error("invalid value '{value}' for {kind} parameter '{parameter}' of '{testbench}'")]
    InvalidParameterValue {
        testbench: String,
        parameter: String,
        kind: String,
        value: String,
    },

    #[error("configuration '{config}' of '{testbench}' sets parameter '{parameter}' more than once")]
    DuplicateOverride {
        testbench: String,
        config: String,
        parameter: String,
    },

    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("compilation of library '{library}' failed: {diagnostics}")]
    Compilation { library: String, diagnostics: String },

    #[error("simulator invocation failed: {0}")]
    Execution(String),

    #[error("failed to read {path}: {source}")]
    ReadSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MatrixError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MatrixError::NoSourcesMatched { .. } | MatrixError::Compilation { .. } => {
                ErrorCategory::SourceResolution
            }
            MatrixError::Execution(_) | MatrixError::ReadSource { .. } | MatrixError::Io(_) => {
                ErrorCategory::Execution
            }
            _ => ErrorCategory::Declaration,
        }
    }

    /// Whether this error means the matrix definition itself is invalid.
    pub fn is_declaration_error(&self) -> bool {
        self.category() == ErrorCategory::Declaration
    }
}

impl From<toml::de::Error> for MatrixError {
    fn from(err: toml::de::Error) -> Self {
        MatrixError::Manifest(err.to_string())
    }
}

/// Result type for matrix operations
pub type Result<T> = std::result::Result<T, MatrixError>;
