//! Run dispatch: executes RunSpecs against the simulation collaborator.
//!
//! Every RunSpec yields exactly one [`RunResult`]. A failing, hanging or
//! cancelled run never stops the others; results come back in RunSpec
//! order whatever order the workers finish in.

use crate::backend::{SimulationRequest, Simulator};
use crate::context::InvocationContext;
use crate::expander::RunSpec;
use crate::flags::BackendId;
use crate::obs;
use crate::report::{MatrixReport, RunOutcome, RunResult};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

/// Worker pool and directory layout for one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// 1 runs everything inline, in order.
    pub max_workers: usize,
    pub library_dir: PathBuf,
    pub runs_dir: PathBuf,
}

pub struct RunDispatcher {
    invocation_id: Uuid,
    simulator: Arc<dyn Simulator>,
    config: DispatchConfig,
    cancel: watch::Receiver<bool>,
}

impl RunDispatcher {
    pub fn new(ctx: &InvocationContext) -> Self {
        // A receiver whose sender is gone keeps reporting `false`.
        let (_tx, cancel) = watch::channel(false);
        Self {
            invocation_id: ctx.invocation_id,
            simulator: Arc::clone(&ctx.simulator),
            config: DispatchConfig {
                max_workers: ctx.settings.max_workers.max(1),
                library_dir: ctx.settings.library_dir(),
                runs_dir: ctx.settings.runs_dir(),
            },
            cancel,
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Pending runs are not started once `cancel` turns `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute `specs` on `backend` and aggregate the results.
    pub async fn run(&self, specs: Vec<RunSpec>, backend: &BackendId) -> MatrixReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let total = specs.len();

        let results = if self.config.max_workers <= 1 {
            let mut results = Vec::with_capacity(total);
            for spec in specs {
                results.push(self.dispatch_one(spec, backend).await);
            }
            results
        } else {
            self.run_parallel(specs, backend).await
        };

        let report = MatrixReport {
            invocation_id: self.invocation_id,
            backend: backend.to_string(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            results,
            warnings: Vec::new(),
        };
        obs::emit_matrix_finished(&report);
        report
    }

    async fn run_parallel(&self, specs: Vec<RunSpec>, backend: &BackendId) -> Vec<RunResult> {
        let total = specs.len();
        let sem = Arc::new(Semaphore::new(self.config.max_workers));
        let mut join_set = JoinSet::new();
        let mut identities = Vec::with_capacity(total);

        for (slot, spec) in specs.into_iter().enumerate() {
            identities.push((spec.index(), spec.name().to_string(), spec.digest()));
            let task = RunTask {
                simulator: Arc::clone(&self.simulator),
                library_dir: self.config.library_dir.clone(),
                runs_dir: self.config.runs_dir.clone(),
                cancel: self.cancel.clone(),
                backend: backend.clone(),
            };
            let sem = Arc::clone(&sem);
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                (slot, task.execute(spec).await)
            });
        }

        let mut ordered: Vec<Option<RunResult>> = vec![None; total];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((slot, result)) => ordered[slot] = Some(result),
                Err(e) => warn!(error = %e, "Run task did not complete"),
            }
        }

        ordered
            .into_iter()
            .zip(identities)
            .map(|(slot, (index, name, digest))| {
                slot.unwrap_or_else(|| RunResult {
                    index,
                    name,
                    digest,
                    outcome: RunOutcome::Error,
                    diagnostics: "run task aborted before producing a result".to_string(),
                    duration_ms: 0,
                    wave_script: None,
                })
            })
            .collect()
    }

    async fn dispatch_one(&self, spec: RunSpec, backend: &BackendId) -> RunResult {
        RunTask {
            simulator: Arc::clone(&self.simulator),
            library_dir: self.config.library_dir.clone(),
            runs_dir: self.config.runs_dir.clone(),
            cancel: self.cancel.clone(),
            backend: backend.clone(),
        }
        .execute(spec)
        .await
    }
}

/// Everything one worker needs, owned so it can move into a spawned task.
struct RunTask {
    simulator: Arc<dyn Simulator>,
    library_dir: PathBuf,
    runs_dir: PathBuf,
    cancel: watch::Receiver<bool>,
    backend: BackendId,
}

impl RunTask {
    async fn execute(self, spec: RunSpec) -> RunResult {
        let span = obs::run_span(spec.name());
        self.execute_inner(spec).instrument(span).await
    }

    async fn execute_inner(self, spec: RunSpec) -> RunResult {
        let start = Instant::now();
        let digest = spec.digest();
        let finish = |outcome: RunOutcome, diagnostics: String, wave_script: Option<PathBuf>| {
            let duration_ms = start.elapsed().as_millis() as u64;
            obs::emit_run_finished(spec.name(), outcome, duration_ms);
            RunResult {
                index: spec.index(),
                name: spec.name().to_string(),
                digest: digest.clone(),
                outcome,
                diagnostics,
                duration_ms,
                wave_script,
            }
        };

        if *self.cancel.borrow() {
            return finish(
                RunOutcome::Error,
                "cancelled before dispatch".to_string(),
                None,
            );
        }

        if spec.backend() != &self.backend {
            return finish(
                RunOutcome::Error,
                format!(
                    "run was expanded for backend '{}' but dispatched to '{}'",
                    spec.backend(),
                    self.backend
                ),
                None,
            );
        }

        obs::emit_run_started(spec.name(), spec.index(), &digest);

        let wave_script = if spec.wave_script().is_file() {
            Some(spec.wave_script().to_path_buf())
        } else {
            debug!(script = %spec.wave_script().display(), "No waveform script; running without capture");
            None
        };

        let run_dir = self.runs_dir.join(spec.name());
        if let Err(e) = tokio::fs::create_dir_all(&run_dir).await {
            return finish(
                RunOutcome::Error,
                format!("cannot create run directory {}: {}", run_dir.display(), e),
                wave_script,
            );
        }

        let request = SimulationRequest {
            backend: self.backend.clone(),
            run_name: spec.name().to_string(),
            library: spec.library().to_string(),
            testbench: spec.testbench().to_string(),
            parameters: spec.parameters().clone(),
            flags: spec.flags().to_vec(),
            wave_script: wave_script.clone(),
            library_dir: self.library_dir.clone(),
            run_dir,
        };

        let invocation = self.simulator.simulate(request);
        let outcome = match spec.timeout() {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return finish(
                        RunOutcome::Error,
                        format!("timed out after {} seconds", limit.as_secs_f64()),
                        wave_script,
                    );
                }
            },
            None => invocation.await,
        };

        match outcome {
            Ok(sim) if sim.passed => finish(RunOutcome::Passed, sim.diagnostics, wave_script),
            Ok(sim) => finish(RunOutcome::Failed, sim.diagnostics, wave_script),
            Err(e) => finish(RunOutcome::Error, e.to_string(), wave_script),
        }
    }
}
