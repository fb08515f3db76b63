//! Matrix orchestration: manifest to report.
//!
//! The stages run in a fixed order and every declaration problem surfaces
//! before any source is compiled or any simulation starts:
//!
//! 1. register libraries and resolve their globs into a catalog
//! 2. validate every configuration against its testbench
//! 3. expand into RunSpecs and apply name filters
//! 4. compile the resolved sources
//! 5. dispatch

use crate::catalog::UnitCatalog;
use crate::context::InvocationContext;
use crate::dispatch::RunDispatcher;
use crate::error::{MatrixError, Result};
use crate::expander::{ConfigSpec, ConfigurationExpander, RunBindings, RunSpec};
use crate::library::LibraryRegistry;
use crate::manifest::Manifest;
use crate::report::MatrixReport;
use crate::sources::wildcard_matcher;
use regex::Regex;
use tokio::sync::watch;
use tracing::info;

/// Everything decided before anything is compiled.
#[derive(Debug, Clone)]
pub struct MatrixPlan {
    pub registry: LibraryRegistry,
    pub catalog: UnitCatalog,
    /// Selected runs in expansion order.
    pub specs: Vec<RunSpec>,
    /// Runs expanded before filtering.
    pub expanded: usize,
}

/// Drives one invocation described by a [`Manifest`].
pub struct MatrixPipeline {
    manifest: Manifest,
    ctx: InvocationContext,
    filters: Vec<Regex>,
}

impl MatrixPipeline {
    pub fn new(manifest: Manifest, ctx: InvocationContext) -> Self {
        Self {
            manifest,
            ctx,
            filters: Vec::new(),
        }
    }

    /// Keep only runs whose `<library>.<testbench>.<config>` matches one of
    /// `patterns` (`*` matches any text). No patterns selects everything.
    pub fn with_filters<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        self.filters = patterns
            .iter()
            .map(|p| wildcard_matcher(p.as_ref()))
            .collect::<Result<_>>()?;
        Ok(self)
    }

    pub fn context(&self) -> &InvocationContext {
        &self.ctx
    }

    /// Resolve sources, validate configurations and expand the matrix.
    pub async fn plan(&self) -> Result<MatrixPlan> {
        let registry = self.manifest.registry()?;
        let catalog = registry.resolve(&self.ctx).await?;

        let mut expander = ConfigurationExpander::new();
        for entry in &self.manifest.testbenches {
            let testbench = match &entry.library {
                Some(library) => {
                    if registry.get(library).is_none() {
                        return Err(MatrixError::UnknownLibrary(library.clone()));
                    }
                    catalog.entity_in(library, &entry.entity)?
                }
                None => catalog.entity(&entry.entity)?,
            };

            for config in &entry.configs {
                let mut spec = ConfigSpec::new(&config.name);
                spec.overrides = config.overrides();
                spec.timeout = config.timeout()?;
                expander.add(&testbench, spec)?;
            }
        }

        let bindings = RunBindings::from_context(&self.ctx, &self.manifest.flags.run)?;
        let all = expander.expand(&bindings);
        let expanded = all.len();
        let specs: Vec<RunSpec> = all.into_iter().filter(|s| self.selected(s)).collect();

        info!(
            configurations = expander.len(),
            expanded = expanded,
            selected = specs.len(),
            "Matrix expanded"
        );
        Ok(MatrixPlan {
            registry,
            catalog,
            specs,
            expanded,
        })
    }

    /// Plan, compile and dispatch. Pending runs are cancelled when `cancel` turns `true`.
    pub async fn run(&self, cancel: watch::Receiver<bool>) -> Result<MatrixReport> {
        let plan = self.plan().await?;

        if plan.specs.is_empty() {
            info!("No runs selected; skipping compilation");
        } else {
            plan.registry
                .compile(&self.ctx, &plan.catalog, &self.manifest.flags.compile)
                .await?;
        }

        let dispatcher = RunDispatcher::new(&self.ctx).with_cancellation(cancel);
        let mut report = dispatcher.run(plan.specs, &self.ctx.settings.backend).await;
        report.warnings.extend(plan.catalog.warnings().iter().cloned());
        if !self.filters.is_empty() && report.attempted() == 0 {
            report
                .warnings
                .push(format!("no run matched the given patterns ({} expanded)", plan.expanded));
        }
        Ok(report)
    }

    fn selected(&self, spec: &RunSpec) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|re| re.is_match(spec.name()))
    }
}
