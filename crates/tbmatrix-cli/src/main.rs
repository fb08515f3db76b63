//! tbmatrix - HDL testbench matrix runner
//!
//! ## Commands
//!
//! - `run`: compile the libraries and run every selected configuration
//! - `list`: print the run identities the matrix expands to

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn, Level};

use tbmatrix_core::manifest::{seconds, DEFAULT_MANIFEST};
use tbmatrix_core::telemetry::init_tracing;
use tbmatrix_core::{
    BackendId, FlagTranslator, InvocationContext, Manifest, MatrixPipeline, ProcessBackend,
    Settings, SourcePolicy,
};

#[derive(Parser)]
#[command(name = "tbmatrix")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run HDL testbenches across parameter configurations", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Matrix manifest; relative globs are resolved against its directory
    #[arg(short, long, global = true, default_value = DEFAULT_MANIFEST)]
    manifest: PathBuf,

    /// Simulator backend (ghdl, nvc, modelsim)
    #[arg(short, long, global = true, env = "TBMATRIX_BACKEND")]
    backend: Option<String>,

    /// Fail when a source glob matches no files
    #[arg(long, global = true)]
    strict_sources: bool,

    /// Directory holding `<testbench>_wave.do` scripts
    #[arg(long, global = true)]
    artifacts_root: Option<PathBuf>,

    /// Output directory for compiled libraries and run directories
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Maximum number of simulations running at once
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Per-run timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<f64>,

    /// Open the simulator GUI for each run (ModelSim/Questa); implies --jobs 1
    #[arg(long, global = true)]
    gui: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile all libraries and run the selected configurations
    Run {
        /// Run identity patterns (`project.abc2dq_tb.*`); all runs when omitted
        patterns: Vec<String>,

        /// Write the JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List run identities without compiling or simulating
    List {
        /// Run identity patterns; all runs when omitted
        patterns: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let (manifest, ctx) = load(&cli)?;

    match &cli.command {
        Commands::Run { patterns, report } => {
            cmd_run(manifest, ctx, patterns, report.as_deref()).await
        }
        Commands::List { patterns } => cmd_list(manifest, ctx, patterns, cli.verbose).await,
    }
}

/// Read the manifest and build the invocation context with CLI overrides applied.
fn load(cli: &Cli) -> Result<(Manifest, InvocationContext)> {
    let manifest = Manifest::from_path(&cli.manifest)
        .with_context(|| format!("Failed to load manifest {}", cli.manifest.display()))?;
    let base_dir = manifest_dir(&cli.manifest);

    let mut settings = manifest
        .settings(&base_dir)
        .context("Invalid manifest settings")?;
    apply_overrides(&mut settings, cli)?;

    let backend = Arc::new(ProcessBackend::new().with_gui(cli.gui));
    let ctx = InvocationContext::new(settings, FlagTranslator::builtin(), backend.clone(), backend)
        .context("Invalid backend selection")?
        .with_base_dir(base_dir);
    Ok((manifest, ctx))
}

fn manifest_dir(manifest: &Path) -> PathBuf {
    match manifest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Command-line options win over manifest settings.
fn apply_overrides(settings: &mut Settings, cli: &Cli) -> Result<()> {
    if let Some(backend) = &cli.backend {
        settings.backend = BackendId::new(backend);
    }
    if cli.strict_sources {
        settings.source_policy = SourcePolicy::Strict;
    }
    if let Some(root) = &cli.artifacts_root {
        settings.artifacts_root = root.clone();
    }
    if let Some(output) = &cli.output {
        settings.output_dir = output.clone();
    }
    if let Some(jobs) = cli.jobs {
        settings.max_workers = jobs.max(1);
    }
    if let Some(secs) = cli.timeout {
        settings.timeout = Some(seconds(secs).context("Invalid --timeout")?);
    }
    if cli.gui {
        settings.max_workers = 1;
    }
    Ok(())
}

async fn cmd_run(
    manifest: Manifest,
    ctx: InvocationContext,
    patterns: &[String],
    report_path: Option<&Path>,
) -> Result<()> {
    let backend = ctx.settings.backend.clone();
    let pipeline = MatrixPipeline::new(manifest, ctx).with_filters(patterns)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);

    info!(backend = %backend, "Starting matrix");
    let run = until_interrupted(pipeline.run(cancel_rx), cancel_tx, ctrl_c_signals());
    let Some(outcome) = run.await else {
        anyhow::bail!("Interrupted; running simulations were killed");
    };
    let report = outcome.context("Matrix aborted before dispatch")?;

    println!("Backend: {}", report.backend);
    println!("Invocation: {}", report.invocation_id);
    println!();
    print!("{}", report.render_summary());

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    if report.success() {
        println!("\n✓ All runs passed!");
        Ok(())
    } else {
        anyhow::bail!(
            "{} of {} runs did not pass",
            report.attempted() - report.passed_count(),
            report.attempted()
        )
    }
}

/// One message per Ctrl-C for as long as the receiver lives.
fn ctrl_c_signals() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Drive `work` until it completes or a second interrupt arrives.
///
/// The first interrupt sets `cancel` so pending runs are skipped while
/// running ones finish. The second drops `work`, which kills every
/// in-flight simulator, and returns `None`.
async fn until_interrupted<T>(
    work: impl Future<Output = T>,
    cancel: watch::Sender<bool>,
    mut signals: mpsc::UnboundedReceiver<()>,
) -> Option<T> {
    let interrupted = async {
        if signals.recv().await.is_none() {
            return std::future::pending::<()>().await;
        }
        warn!("Interrupted; pending runs will be cancelled (Ctrl-C again to kill running simulations)");
        cancel.send(true).ok();
        if signals.recv().await.is_none() {
            return std::future::pending::<()>().await;
        }
        warn!("Interrupted again; killing running simulations");
    };

    tokio::select! {
        out = work => Some(out),
        () = interrupted => None,
    }
}

async fn cmd_list(
    manifest: Manifest,
    ctx: InvocationContext,
    patterns: &[String],
    verbose: bool,
) -> Result<()> {
    let pipeline = MatrixPipeline::new(manifest, ctx).with_filters(patterns)?;
    let plan = pipeline.plan().await.context("Failed to expand matrix")?;

    for spec in &plan.specs {
        if verbose {
            let params: Vec<String> = spec
                .parameters()
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("{}  {}", spec.name(), params.join(" "));
        } else {
            println!("{}", spec.name());
        }
    }

    for warning in plan.catalog.warnings() {
        eprintln!("warning: {warning}");
    }
    println!(
        "\n{} of {} runs selected",
        plan.specs.len(),
        plan.expanded
    );
    Ok(())
}
