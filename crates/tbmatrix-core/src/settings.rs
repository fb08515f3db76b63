//! Invocation settings.

use crate::flags::{BackendId, UnsupportedFlagPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BACKEND: &str = "ghdl";

/// How an empty source glob is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePolicy {
    /// Fail with `NoSourcesMatched`.
    Strict,
    /// Log a warning and continue.
    #[default]
    Permissive,
}

impl SourcePolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            SourcePolicy::Strict
        } else {
            SourcePolicy::Permissive
        }
    }
}

/// Settings for one orchestrator invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub backend: BackendId,
    pub source_policy: SourcePolicy,
    /// Base directory for `<testbench>_wave.do` scripts.
    pub artifacts_root: PathBuf,
    /// Compiled libraries go to `<output_dir>/libraries`, runs to `<output_dir>/runs`.
    pub output_dir: PathBuf,
    /// Upper bound on concurrently running simulations.
    pub max_workers: usize,
    /// Global run timeout; `None` waits forever.
    pub timeout: Option<Duration>,
    pub unsupported_flags: UnsupportedFlagPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendId::new(DEFAULT_BACKEND),
            source_policy: SourcePolicy::default(),
            artifacts_root: PathBuf::from("sim/scripts"),
            output_dir: PathBuf::from("tbmatrix_out"),
            max_workers: 1,
            timeout: None,
            unsupported_flags: UnsupportedFlagPolicy::default(),
        }
    }
}

impl Settings {
    pub fn library_dir(&self) -> PathBuf {
        self.output_dir.join("libraries")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.output_dir.join("runs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.backend.as_str(), "ghdl");
        assert_eq!(settings.source_policy, SourcePolicy::Permissive);
        assert_eq!(settings.max_workers, 1);
        assert!(settings.timeout.is_none());
        assert_eq!(settings.library_dir(), PathBuf::from("tbmatrix_out/libraries"));
    }

    #[test]
    fn test_source_policy_from_strict() {
        assert_eq!(SourcePolicy::from_strict(true), SourcePolicy::Strict);
        assert_eq!(SourcePolicy::from_strict(false), SourcePolicy::Permissive);
    }
}
