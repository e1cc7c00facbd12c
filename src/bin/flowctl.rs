//! CLI: inspect, drive and recover durable runs.
//!
//! Usage:
//!
//! - `flowctl inspect <run-dir>` prints the execution record and every node.
//! - `flowctl demo <root> [--hint H] [--steps N] [--stop-after K]` runs a scripted
//!   program as a new run; `--stop-after` exits without a clean shutdown, as if
//!   the process had been killed.
//! - `flowctl recover <root> [--dirty]` runs the recovery pass and resumes
//!   demo runs where possible.
//!
//! Set RUST_LOG=flow_durability=trace for TRACE-level span enter/exit and events.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use flow_durability::{
  DurabilityError, DurabilityHint, EngineConfig, ExecutionController, ExecutorHost,
  LocalExecutorHost, NodeAction, NodeSpec, ProgramResumer, RecoveryCoordinator, StepOutcome,
  TerminationMode,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

/// Inspect, drive and recover durable runs.
#[derive(Parser, Debug)]
#[command(name = "flowctl")]
#[command(
  after_help = r#"Environment variables (override the config file):
  FLOW_DURABILITY_HINT         Default hint for new runs.
  FLOW_BULK_FLUSH_INTERVAL_MS  Background flush period for batched runs (0 disables).

Examples:
  flowctl demo runs --hint performance-optimized --steps 4 --stop-after 2
  flowctl recover runs
  flowctl inspect runs/<run-id>"#
)]
struct Args {
  /// JSON engine config file.
  #[arg(long, value_name = "FILE", global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print the execution record and the graph of one run.
  Inspect {
    #[arg(value_name = "run-dir")]
    run_dir: PathBuf,
  },
  /// Run a scripted program of block steps as a new run under ROOT.
  Demo {
    root: PathBuf,
    /// Durability hint (max-survivability, survivable-nonatomic, performance-optimized).
    #[arg(long)]
    hint: Option<DurabilityHint>,
    /// Number of steps.
    #[arg(long, default_value_t = 3)]
    steps: usize,
    /// Exit without shutdown before this step.
    #[arg(long, value_name = "STEP")]
    stop_after: Option<usize>,
  },
  /// Recover every run under ROOT.
  Recover {
    root: PathBuf,
    /// Treat the previous process as killed, whatever the shutdown marker says.
    #[arg(long)]
    dirty: bool,
  },
}

/// Continuation of the demo program: the next step to run.
#[derive(Debug, Serialize, Deserialize)]
struct DemoState {
  next_step: usize,
  steps: usize,
}

/// Runs demo steps from `state` on; `Ok(false)` if it stopped early.
async fn drive(
  execution: &ExecutionController,
  mut state: DemoState,
  stop_before: Option<usize>,
) -> Result<bool, DurabilityError> {
  while state.next_step < state.steps {
    if stop_before == Some(state.next_step) {
      return Ok(false);
    }
    let name = format!("step-{}", state.next_step);
    let start = execution
      .append(
        NodeSpec::block_start(&name)
          .with_action(NodeAction::arguments([("index", state.next_step.to_string())])),
      )
      .await?;
    execution
      .attach_action(start.id(), NodeAction::log(format!("{}.log", name)))
      .await?;
    execution.append(NodeSpec::block_end(start.id(), &name)).await?;
    state.next_step += 1;
    execution.checkpoint(serde_json::to_vec(&state)?).await?;
  }
  execution.finish(StepOutcome::Ok).await?;
  Ok(true)
}

/// Resumes demo runs by decoding their continuation and driving them to the end.
struct DemoResumer;

#[async_trait]
impl ProgramResumer for DemoResumer {
  async fn resume(
    &self,
    execution: Arc<ExecutionController>,
    continuation: &[u8],
  ) -> Result<(), String> {
    let state: DemoState = serde_json::from_slice(continuation).map_err(|e| e.to_string())?;
    if execution.is_paused() {
      return Ok(());
    }
    drive(&execution, state, None)
      .await
      .map(|_| ())
      .map_err(|e| e.to_string())
  }
}

async fn inspect(run_dir: &Path, config: &EngineConfig) -> Result<(), DurabilityError> {
  let root = run_dir.parent().unwrap_or(run_dir);
  let host = Arc::new(LocalExecutorHost::with_termination(root, TerminationMode::Clean));
  let execution = ExecutionController::open(run_dir, config, host).await?;
  let record = execution.record().await;
  println!("Run {}", record.run_id);
  println!("  Hint: {}", record.hint);
  println!("  Status: {:?} ({})", record.status, record.result);
  println!("  Clean: {:?}", record.clean);
  println!("  Heads: {:?}", record.heads);
  println!("  Continuation: {}", execution.program().await.is_some());
  let lines = execution
    .with_graph(|g| {
      g.nodes_by_id()
        .map(|n| {
          let actions: Vec<String> = n.actions().iter().map(|a| format!("{:?}", a.kind())).collect();
          format!(
            "  {:>4} {:<28} {:<12} parents={:?} actions=[{}]",
            n.id(),
            format!("{:?}", n.kind()),
            n.name(),
            n.parents(),
            actions.join(", ")
          )
        })
        .collect::<Vec<_>>()
    })
    .await;
  for line in lines {
    println!("{}", line);
  }
  Ok(())
}

async fn demo(
  root: &Path,
  hint: Option<DurabilityHint>,
  steps: usize,
  stop_after: Option<usize>,
  config: &EngineConfig,
) -> Result<(), DurabilityError> {
  let host = Arc::new(LocalExecutorHost::startup(root)?);
  let run_id = ExecutionController::new_run_id();
  let execution =
    ExecutionController::start(&root.join(&run_id), &run_id, hint, config, host.clone()).await?;
  let state = DemoState {
    next_step: 0,
    steps,
  };
  execution.checkpoint(serde_json::to_vec(&state)?).await?;
  if drive(&execution, state, stop_after).await? {
    println!("Run {} completed: {}", run_id, execution.result());
    host.mark_clean_shutdown()?;
  } else {
    // no shutdown and no marker: the next recovery sees a dirty termination
    println!("Run {} stopped without shutdown", run_id);
  }
  Ok(())
}

async fn recover(root: &Path, dirty: bool, config: EngineConfig) -> Result<(), DurabilityError> {
  let host = if dirty {
    LocalExecutorHost::with_termination(root, TerminationMode::Dirty)
  } else {
    LocalExecutorHost::startup(root)?
  };
  let host = Arc::new(host);
  info!(termination = ?host.termination(), "recovering runs");
  let coordinator = RecoveryCoordinator::new(root, host.clone(), Arc::new(DemoResumer), config);
  let reports = coordinator.recover_all().await?;
  for report in &reports {
    println!("{}: {:?}", report.run_id, report.outcome);
    if let Some(execution) = &report.execution {
      execution.shutdown().await?;
    }
  }
  host.mark_clean_shutdown()?;
  println!("Recovered {} run(s).", reports.len());
  Ok(())
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
    .init();

  let args = Args::parse();
  let config = match &args.config {
    Some(path) => EngineConfig::load(path),
    None => Ok(EngineConfig::default()),
  }
  .and_then(EngineConfig::with_env);
  let config = match config {
    Ok(c) => c,
    Err(e) => {
      eprintln!("Error: {}", e);
      process::exit(1);
    }
  };
  info!(config = ?config, "flowctl starting");

  let result = match args.command {
    Command::Inspect { run_dir } => inspect(&run_dir, &config).await,
    Command::Demo {
      root,
      hint,
      steps,
      stop_after,
    } => demo(&root, hint, steps, stop_after, &config).await,
    Command::Recover { root, dirty } => recover(&root, dirty, config).await,
  };
  if let Err(e) = result {
    eprintln!("Error: {}", e);
    process::exit(1);
  }
}
