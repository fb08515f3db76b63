//! `matrix.toml` parsing.
//!
//! ```toml
//! [settings]
//! backend = "ghdl"
//! max_workers = 4
//!
//! [flags]
//! compile = ["relaxed_rules", { suppress_warning = "hide" }]
//!
//! [[library]]
//! name = "olo"
//! sources = ["../lib/open-logic/src/**/*.vhd"]
//!
//! [[testbench]]
//! entity = "abc2dq_tb"
//!
//! [[testbench.config]]
//! name = "D"
//! generics = { AC_D_g = 1.0 }
//! ```

use crate::error::{MatrixError, Result};
use crate::flags::{BackendId, LogicalFlag, UnsupportedFlagPolicy};
use crate::library::LibraryRegistry;
use crate::settings::{Settings, SourcePolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MANIFEST: &str = "matrix.toml";

/// Complete matrix description for one project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub settings: ManifestSettings,

    #[serde(default)]
    pub flags: FlagSets,

    /// Libraries in registration order.
    #[serde(default, rename = "library")]
    pub libraries: Vec<LibraryEntry>,

    /// Testbenches and their configurations, in declaration order.
    #[serde(default, rename = "testbench")]
    pub testbenches: Vec<TestbenchEntry>,
}

/// Optional settings; anything left out keeps the [`Settings`] default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestSettings {
    pub backend: Option<String>,
    pub strict_sources: Option<bool>,
    pub artifacts_root: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub max_workers: Option<usize>,
    pub timeout_secs: Option<f64>,
    pub unsupported_flags: Option<UnsupportedFlagPolicy>,
}

/// Logical flags passed to every compile and every run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagSets {
    #[serde(default)]
    pub compile: Vec<LogicalFlag>,
    #[serde(default)]
    pub run: Vec<LogicalFlag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryEntry {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestbenchEntry {
    pub entity: String,
    /// Restricts the lookup to one library; otherwise the first match wins.
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default, rename = "config")]
    pub configs: Vec<ConfigEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigEntry {
    pub name: String,
    #[serde(default)]
    pub generics: BTreeMap<String, GenericValue>,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

impl ConfigEntry {
    pub fn timeout(&self) -> Result<Option<Duration>> {
        self.timeout_secs.map(seconds).transpose()
    }

    /// Override values rendered as VHDL literal text.
    pub fn overrides(&self) -> BTreeMap<String, String> {
        self.generics
            .iter()
            .map(|(name, value)| (name.clone(), value.to_literal()))
            .collect()
    }
}

/// A generic value as written in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenericValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl GenericValue {
    pub fn to_literal(&self) -> String {
        match self {
            GenericValue::Boolean(b) => b.to_string(),
            GenericValue::Integer(i) => i.to_string(),
            GenericValue::Float(f) => real_literal(*f),
            GenericValue::Text(s) => s.clone(),
        }
    }
}

/// VHDL reals need a point in the mantissa: `1.0`, `1.0e20`, never `1e20`.
fn real_literal(value: f64) -> String {
    let text = format!("{value:?}");
    match text.split_once('e') {
        Some((mantissa, exponent)) if !mantissa.contains('.') => {
            format!("{mantissa}.0e{exponent}")
        }
        _ => text,
    }
}

impl FromStr for Manifest {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl Manifest {
    /// Load and parse a manifest file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| MatrixError::ReadSource {
            path: path.to_path_buf(),
            source: e,
        })?;
        content.parse()
    }

    /// Settings described by the manifest; relative paths are joined to `base_dir`.
    pub fn settings(&self, base_dir: &Path) -> Result<Settings> {
        let mut settings = Settings::default();
        let s = &self.settings;

        if let Some(backend) = &s.backend {
            settings.backend = BackendId::new(backend);
        }
        if let Some(strict) = s.strict_sources {
            settings.source_policy = SourcePolicy::from_strict(strict);
        }
        if let Some(root) = &s.artifacts_root {
            settings.artifacts_root = root.clone();
        }
        if let Some(dir) = &s.output_dir {
            settings.output_dir = dir.clone();
        }
        if let Some(workers) = s.max_workers {
            settings.max_workers = workers.max(1);
        }
        if let Some(secs) = s.timeout_secs {
            settings.timeout = Some(seconds(secs)?);
        }
        if let Some(policy) = s.unsupported_flags {
            settings.unsupported_flags = policy;
        }

        settings.artifacts_root = base_dir.join(&settings.artifacts_root);
        settings.output_dir = base_dir.join(&settings.output_dir);
        Ok(settings)
    }

    /// Register every `[[library]]` in file order.
    pub fn registry(&self) -> Result<LibraryRegistry> {
        let mut registry = LibraryRegistry::new();
        for library in &self.libraries {
            registry.register(&library.name, library.sources.as_slice())?;
        }
        Ok(registry)
    }
}

/// Positive, finite seconds.
pub fn seconds(secs: f64) -> Result<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Ok(Duration::from_secs_f64(secs))
    } else {
        Err(MatrixError::Manifest(format!(
            "timeout must be a positive number of seconds, got {secs}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[settings]
backend = "nvc"
strict_sources = true
max_workers = 4
timeout_secs = 30
unsupported_flags = "warn"

[flags]
compile = ["relaxed_rules", { suppress_warning = "hide" }, { suppress_warning = "shared" }]
run = ["relax_elaboration"]

[[library]]
name = "olo"
sources = ["../lib/open-logic/src/**/*.vhd"]

[[library]]
name = "project"
sources = ["../hdl/*.vhd", "../tb/*.vhd"]

[[testbench]]
entity = "abc2dq_tb"

[[testbench.config]]
name = "D"
generics = { AC_D_g = 1.0 }

[[testbench.config]]
name = "Q"
generics = { AC_Q_g = 1.0, DC_g = "0.5" }
timeout_secs = 2.5

[[testbench]]
entity = "modulator_tb"
library = "project"
"#;

    #[test]
    fn test_parse_sample() {
        let manifest: Manifest = SAMPLE.parse().unwrap();
        assert_eq!(manifest.libraries.len(), 2);
        assert_eq!(manifest.libraries[1].sources.len(), 2);
        assert_eq!(
            manifest.flags.compile,
            vec![
                LogicalFlag::RelaxedRules,
                LogicalFlag::SuppressWarning("hide".to_string()),
                LogicalFlag::SuppressWarning("shared".to_string()),
            ]
        );
        assert_eq!(manifest.flags.run, vec![LogicalFlag::RelaxElaboration]);

        let abc = &manifest.testbenches[0];
        assert_eq!(abc.configs.len(), 2);
        assert_eq!(abc.configs[0].overrides()["AC_D_g"], "1.0");
        assert_eq!(abc.configs[1].overrides()["DC_g"], "0.5");
        assert_eq!(
            abc.configs[1].timeout().unwrap(),
            Some(Duration::from_millis(2500))
        );
        assert!(manifest.testbenches[1].configs.is_empty());
        assert_eq!(manifest.testbenches[1].library.as_deref(), Some("project"));
    }

    #[test]
    fn test_settings_from_manifest() {
        let manifest: Manifest = SAMPLE.parse().unwrap();
        let settings = manifest.settings(Path::new("/work/sim")).unwrap();
        assert_eq!(settings.backend.as_str(), "nvc");
        assert_eq!(settings.source_policy, SourcePolicy::Strict);
        assert_eq!(settings.max_workers, 4);
        assert_eq!(settings.timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.unsupported_flags, UnsupportedFlagPolicy::Warn);
        assert_eq!(settings.artifacts_root, PathBuf::from("/work/sim/sim/scripts"));
        assert_eq!(settings.output_dir, PathBuf::from("/work/sim/tbmatrix_out"));
    }

    #[test]
    fn test_empty_manifest_uses_defaults() {
        let manifest: Manifest = "".parse().unwrap();
        let settings = manifest.settings(Path::new(".")).unwrap();
        assert_eq!(settings.backend.as_str(), "ghdl");
        assert!(manifest.registry().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_library_in_manifest() {
        let manifest: Manifest = r#"
[[library]]
name = "project"
[[library]]
name = "PROJECT"
"#
        .parse()
        .unwrap();
        assert!(matches!(
            manifest.registry(),
            Err(MatrixError::DuplicateLibrary(_))
        ));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = "[settings]\nbakend = \"ghdl\"\n".parse::<Manifest>().unwrap_err();
        assert!(matches!(err, MatrixError::Manifest(_)));
    }

    #[test]
    fn test_bad_timeout() {
        let manifest: Manifest = "[settings]\ntimeout_secs = -1\n".parse().unwrap();
        assert!(manifest.settings(Path::new(".")).is_err());
    }

    #[test]
    fn test_generic_literals() {
        assert_eq!(GenericValue::Boolean(true).to_literal(), "true");
        assert_eq!(GenericValue::Integer(8).to_literal(), "8");
        assert_eq!(GenericValue::Float(0.25).to_literal(), "0.25");
        assert_eq!(GenericValue::Float(1.0).to_literal(), "1.0");
        assert_eq!(GenericValue::Float(1e20).to_literal(), "1.0e20");
        assert_eq!(GenericValue::Float(-2.5e-7).to_literal(), "-2.5e-7");
        assert_eq!(GenericValue::Float(1e-9).to_literal(), "1.0e-9");
        assert_eq!(GenericValue::Text("\"fast\"".to_string()).to_literal(), "\"fast\"");
    }
}
