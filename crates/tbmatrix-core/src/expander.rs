//! Configuration expansion: named parameter-override sets per testbench,
//! fanned out into immutable [`RunSpec`]s.
//!
//! Expansion is opt-in. A testbench only produces runs for configurations
//! explicitly added to it; an empty override set is a valid configuration
//! that runs every declared default under its own name.

use crate::context::InvocationContext;
use crate::error::{MatrixError, Result};
use crate::flags::{BackendId, LogicalFlag};
use crate::unit::{ParamDefault, ParamValue, Testbench};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Declaration of one configuration before validation.
#[derive(Debug, Clone, Default)]
pub struct ConfigSpec {
    pub name: String,
    pub overrides: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl ConfigSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn generic(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub testbench: Testbench,
    pub name: String,
    /// Keys use the parameter names as declared by the testbench.
    pub overrides: BTreeMap<String, ParamValue>,
    pub timeout: Option<Duration>,
}

/// Immutable snapshot returned by [`ConfigurationExpander::add`].
#[derive(Debug, Clone)]
pub struct ConfigurationHandle {
    index: usize,
    config: Arc<Configuration>,
}

impl ConfigurationHandle {
    /// Position in declaration order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn testbench(&self) -> &Testbench {
        &self.config.testbench
    }

    pub fn overrides(&self) -> &BTreeMap<String, ParamValue> {
        &self.config.overrides
    }
}

/// Values stamped onto every RunSpec of one expansion.
#[derive(Debug, Clone)]
pub struct RunBindings {
    pub backend: BackendId,
    /// Already translated for `backend`.
    pub flags: Vec<String>,
    pub artifacts_root: PathBuf,
    pub timeout: Option<Duration>,
}

impl RunBindings {
    /// Bindings for the context's backend, artifacts root and timeout.
    pub fn from_context(ctx: &InvocationContext, run_flags: &[LogicalFlag]) -> Result<Self> {
        Ok(Self {
            backend: ctx.settings.backend.clone(),
            flags: ctx.translate(run_flags)?,
            artifacts_root: ctx.settings.artifacts_root.clone(),
            timeout: ctx.settings.timeout,
        })
    }
}

/// A fully resolved, immutable unit of dispatchable work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    index: usize,
    name: String,
    library: String,
    testbench: String,
    config: String,
    parameters: BTreeMap<String, ParamValue>,
    backend: BackendId,
    flags: Vec<String>,
    wave_script: PathBuf,
    timeout: Option<Duration>,
}

impl RunSpec {
    /// Position in expansion order; results are reported in this order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// `<library>.<testbench>.<config>`, unique within one expansion.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn library(&self) -> &str {
        &self.library
    }

    pub fn testbench(&self) -> &str {
        &self.testbench
    }

    pub fn config(&self) -> &str {
        &self.config
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.parameters
    }

    pub fn backend(&self) -> &BackendId {
        &self.backend
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// Conventional waveform script location; it may not exist.
    pub fn wave_script(&self) -> &Path {
        &self.wave_script
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// SHA-256 over everything that determines the simulator invocation.
    ///
    /// Two runs with equal digests are the same run.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.backend.as_str().as_bytes());
        hasher.update(b"\0");
        for (name, value) in &self.parameters {
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.to_string().as_bytes());
            hasher.update(b"\0");
        }
        for flag in &self.flags {
            hasher.update(flag.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

/// Collects configurations in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationExpander {
    configs: Vec<Arc<Configuration>>,
}

impl ConfigurationExpander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named override set to `testbench`.
    pub fn add_config(
        &mut self,
        testbench: &Testbench,
        name: &str,
        overrides: &BTreeMap<String, String>,
    ) -> Result<ConfigurationHandle> {
        self.add(
            testbench,
            ConfigSpec {
                name: name.to_string(),
                overrides: overrides.clone(),
                timeout: None,
            },
        )
    }

    /// Validate `spec` against the testbench's declared parameters and add it.
    ///
    /// Nothing is recorded when validation fails.
    pub fn add(&mut self, testbench: &Testbench, spec: ConfigSpec) -> Result<ConfigurationHandle> {
        let qualified = testbench.qualified_name();

        if self
            .configs
            .iter()
            .any(|c| c.testbench.qualified_name() == qualified && c.name == spec.name)
        {
            return Err(MatrixError::DuplicateConfigName {
                testbench: testbench.name().to_string(),
                name: spec.name,
            });
        }

        let mut overrides = BTreeMap::new();
        for (key, raw) in &spec.overrides {
            let decl = testbench
                .parameter(key)
                .ok_or_else(|| MatrixError::UnknownParameter {
                    testbench: testbench.name().to_string(),
                    parameter: key.clone(),
                })?;
            let value = ParamValue::parse(decl.kind, raw).ok_or_else(|| {
                MatrixError::InvalidParameterValue {
                    testbench: testbench.name().to_string(),
                    parameter: decl.name.clone(),
                    kind: decl.kind.name().to_string(),
                    value: raw.clone(),
                }
            })?;
            // `AC_D_g` and `ac_d_g` name the same generic.
            if overrides.insert(decl.name.clone(), value).is_some() {
                return Err(MatrixError::DuplicateOverride {
                    testbench: testbench.name().to_string(),
                    config: spec.name,
                    parameter: decl.name.clone(),
                });
            }
        }

        let config = Arc::new(Configuration {
            testbench: testbench.clone(),
            name: spec.name,
            overrides,
            timeout: spec.timeout,
        });
        self.configs.push(Arc::clone(&config));
        Ok(ConfigurationHandle {
            index: self.configs.len() - 1,
            config,
        })
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// One RunSpec per added configuration, in declaration order.
    pub fn expand(&self, bindings: &RunBindings) -> Vec<RunSpec> {
        self.configs
            .iter()
            .enumerate()
            .map(|(index, config)| {
                let tb = &config.testbench;
                let mut parameters = BTreeMap::new();
                for decl in tb.parameters() {
                    if let Some(value) = config.overrides.get(&decl.name) {
                        parameters.insert(decl.name.clone(), value.clone());
                    } else if let ParamDefault::Literal(value) = &decl.default {
                        parameters.insert(decl.name.clone(), value.clone());
                    }
                }

                RunSpec {
                    index,
                    name: format!("{}.{}", tb.qualified_name(), config.name),
                    library: tb.library().to_string(),
                    testbench: tb.name().to_string(),
                    config: config.name.clone(),
                    parameters,
                    backend: bindings.backend.clone(),
                    flags: bindings.flags.clone(),
                    wave_script: bindings
                        .artifacts_root
                        .join(format!("{}_wave.do", tb.name())),
                    timeout: config.timeout.or(bindings.timeout),
                }
            })
            .collect()
    }
}
