//! Integration tests for run dispatch with ScriptedSimulator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tbmatrix_core::fakes::{MemoryCompiler, Scripted, ScriptedSimulator};
use tbmatrix_core::{
    BackendId, CompiledUnit, ConfigSpec, ConfigurationExpander, FlagTranslator,
    InvocationContext, ParameterDecl, RunBindings, RunDispatcher, RunOutcome, RunSpec, Settings,
    UnitCatalog, UnitDecl,
};
use tokio::sync::watch;

const ABC: &str = "project.abc2dq_tb.default";
const DQ: &str = "project.dq2abc_tb.default";
const MOD: &str = "project.modulator_tb.default";

fn context(root: &Path, sim: Arc<ScriptedSimulator>, max_workers: usize) -> InvocationContext {
    InvocationContext::new(
        Settings {
            output_dir: root.join("out"),
            artifacts_root: root.join("sim/scripts"),
            max_workers,
            ..Settings::default()
        },
        FlagTranslator::builtin(),
        Arc::new(MemoryCompiler::new()),
        sim,
    )
    .unwrap()
}

/// Three testbenches with one configuration each, optionally with a run timeout.
fn specs(ctx: &InvocationContext, timeout: Option<(&str, Duration)>) -> Vec<RunSpec> {
    let mut catalog = UnitCatalog::new(vec!["project".to_string()]);
    for entity in ["abc2dq_tb", "dq2abc_tb", "modulator_tb"] {
        catalog.insert(CompiledUnit::from_decl(
            "project",
            PathBuf::from(format!("tb/{entity}.vhd")),
            UnitDecl::new(entity, vec![ParameterDecl::numeric("D_g", "0.0")]),
        ));
    }

    let mut expander = ConfigurationExpander::new();
    for tb in catalog.testbenches() {
        let mut spec = ConfigSpec::new("default");
        if let Some((name, limit)) = timeout {
            if name == tb.name() {
                spec = spec.timeout(limit);
            }
        }
        expander.add(&tb, spec).unwrap();
    }
    expander.expand(&RunBindings::from_context(ctx, &[]).unwrap())
}

fn names(report: &tbmatrix_core::MatrixReport) -> Vec<&str> {
    report.results.iter().map(|r| r.name.as_str()).collect()
}

/// Test: results follow RunSpec order even when later runs finish first
#[tokio::test(start_paused = true)]
async fn test_parallel_results_in_spec_order() {
    let dir = tempfile::tempdir().unwrap();
    let sim = Arc::new(
        ScriptedSimulator::new()
            .delay(ABC, Duration::from_millis(300))
            .delay(DQ, Duration::from_millis(150)),
    );
    let ctx = context(dir.path(), sim.clone(), 3);
    let specs = specs(&ctx, None);

    let start = tokio::time::Instant::now();
    let report = RunDispatcher::new(&ctx)
        .run(specs, &BackendId::new("ghdl"))
        .await;

    // The runs overlapped: total time is the slowest run, not the sum.
    assert!(start.elapsed() < Duration::from_millis(450));
    assert_eq!(names(&report), vec![ABC, DQ, MOD]);
    assert_eq!(
        report.results.iter().map(|r| r.index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert!(report.success());
    assert_eq!(sim.requests().len(), 3);
}

/// Test: a failing or crashing run never stops the others
#[tokio::test]
async fn test_failures_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let sim = Arc::new(
        ScriptedSimulator::new()
            .script(ABC, Scripted::Fail("assertion failed: D mismatch".to_string()))
            .script(DQ, Scripted::Crash("failed to spawn 'ghdl'".to_string())),
    );
    let ctx = context(dir.path(), sim.clone(), 1);
    let specs = specs(&ctx, None);

    let report = RunDispatcher::new(&ctx)
        .run(specs, &BackendId::new("ghdl"))
        .await;

    let outcomes: Vec<RunOutcome> = report.results.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![RunOutcome::Failed, RunOutcome::Error, RunOutcome::Passed]
    );
    assert_eq!(report.attempted(), 3);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.error_count(), 1);
    assert!(!report.success());
    assert!(report.results[0].diagnostics.contains("D mismatch"));
    assert!(report.results[1].diagnostics.contains("failed to spawn"));
    // Sequential dispatch keeps invocation order.
    assert_eq!(sim.invoked_runs(), vec![ABC, DQ, MOD]);
}

/// Test: a run exceeding its timeout is reported as error
#[tokio::test(start_paused = true)]
async fn test_timeout_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let sim = Arc::new(ScriptedSimulator::new().delay(DQ, Duration::from_secs(30)));
    let ctx = context(dir.path(), sim, 2);
    let specs = specs(&ctx, Some(("dq2abc_tb", Duration::from_millis(100))));
    assert_eq!(specs[1].timeout(), Some(Duration::from_millis(100)));
    assert_eq!(specs[0].timeout(), None);

    let report = RunDispatcher::new(&ctx)
        .run(specs, &BackendId::new("ghdl"))
        .await;

    assert_eq!(report.results[1].outcome, RunOutcome::Error);
    assert!(report.results[1].diagnostics.contains("timed out"));
    assert_eq!(report.passed_count(), 2);
}

/// Test: the waveform script is bound only when it exists
#[tokio::test]
async fn test_wave_script_bound_when_present() {
    let dir = tempfile::tempdir().unwrap();
    let scripts = dir.path().join("sim/scripts");
    std::fs::create_dir_all(&scripts).unwrap();
    std::fs::write(scripts.join("abc2dq_tb_wave.do"), "add wave *").unwrap();

    let sim = Arc::new(ScriptedSimulator::new());
    let ctx = context(dir.path(), sim.clone(), 1);
    let specs = specs(&ctx, None);

    let report = RunDispatcher::new(&ctx)
        .run(specs, &BackendId::new("ghdl"))
        .await;

    assert!(report.success(), "missing scripts are not errors");
    assert_eq!(
        report.results[0].wave_script,
        Some(scripts.join("abc2dq_tb_wave.do"))
    );
    assert_eq!(report.results[1].wave_script, None);

    let requests = sim.requests();
    assert!(requests[0].wave_script.is_some());
    assert!(requests[1].wave_script.is_none());
    // Each run gets its own directory.
    assert_ne!(requests[0].run_dir, requests[1].run_dir);
    assert!(requests[0].run_dir.is_dir());
}

/// Test: cancellation before dispatch errors every pending run
#[tokio::test]
async fn test_cancelled_runs_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let sim = Arc::new(ScriptedSimulator::new());
    let ctx = context(dir.path(), sim.clone(), 2);
    let specs = specs(&ctx, None);

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let report = RunDispatcher::new(&ctx)
        .with_cancellation(rx)
        .run(specs, &BackendId::new("ghdl"))
        .await;

    assert_eq!(report.attempted(), 3);
    assert_eq!(report.error_count(), 3);
    assert!(report.results.iter().all(|r| r.diagnostics.contains("cancelled")));
    assert!(sim.requests().is_empty());
}

/// Test: cancelling mid-matrix lets the running run finish
#[tokio::test(start_paused = true)]
async fn test_cancel_during_sequential_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let sim = Arc::new(ScriptedSimulator::new().delay(ABC, Duration::from_millis(300)));
    let ctx = context(dir.path(), sim.clone(), 1);
    let specs = specs(&ctx, None);

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).ok();
        // Keep the sender alive until the matrix is done.
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let report = RunDispatcher::new(&ctx)
        .with_cancellation(rx)
        .run(specs, &BackendId::new("ghdl"))
        .await;

    assert_eq!(report.results[0].outcome, RunOutcome::Passed);
    assert_eq!(report.results[1].outcome, RunOutcome::Error);
    assert_eq!(report.results[2].outcome, RunOutcome::Error);
    assert_eq!(sim.invoked_runs(), vec![ABC]);
}

/// Test: dispatching RunSpecs to a different backend is an error per run
#[tokio::test]
async fn test_backend_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let sim = Arc::new(ScriptedSimulator::new());
    let ctx = context(dir.path(), sim.clone(), 1);
    let specs = specs(&ctx, None);

    let report = RunDispatcher::new(&ctx)
        .run(specs, &BackendId::new("nvc"))
        .await;

    assert_eq!(report.error_count(), 3);
    assert!(sim.requests().is_empty());
}

/// Test: an empty matrix passes trivially
#[tokio::test]
async fn test_empty_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), Arc::new(ScriptedSimulator::new()), 4);
    let report = RunDispatcher::new(&ctx)
        .run(Vec::new(), &BackendId::new("ghdl"))
        .await;
    assert_eq!(report.attempted(), 0);
    assert!(report.success());
}
