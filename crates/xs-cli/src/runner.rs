use std::path::Path;
use std::thread;
use std::time::Instant;

use tracing::{info, warn};
use xs_api::{create_runtime_from_dir, CreateRuntimeOptions};
use xs_core::{LoadKind, ScriptError};
use xs_runtime::{RuntimeConfig, ScriptRuntime};

use crate::console::ConsoleExecutor;
use crate::error_map::{json_string, map_cli_worker_panic};
use crate::models::{RunSummary, WorkerFailure, WorkerOutcome};
use crate::source_loader::resolve_scripts_dir;
use crate::RunArgs;

pub(crate) fn load_config(
    config: Option<&str>,
    timeout_ms: Option<u64>,
) -> Result<RuntimeConfig, ScriptError> {
    let mut config = match config {
        Some(path) => RuntimeConfig::from_file(Path::new(path))?,
        None => RuntimeConfig::default(),
    };
    if let Some(timeout_ms) = timeout_ms {
        config.default_timeout_ms = timeout_ms;
    }
    Ok(config)
}

pub(crate) fn worker_name(index: usize) -> String {
    format!("worker-{}", index + 1)
}

fn run_worker(runtime: &ScriptRuntime, worker: &str, test_case: &str) -> WorkerOutcome {
    let mut console = ConsoleExecutor::new(worker);
    let result = runtime.execute_script(worker, test_case, &mut console);
    if !runtime.shutdown_context(worker) {
        warn!(worker, "Timer did not shut down in time");
    }
    WorkerOutcome {
        worker: worker.to_string(),
        commands: console.executed(),
        failure: result.err(),
    }
}

/// Runs `test_case` once on each of `workers` threads sharing one runtime.
pub(crate) fn run_workers(
    runtime: &ScriptRuntime,
    test_case: &str,
    workers: usize,
) -> Vec<WorkerOutcome> {
    thread::scope(|scope| {
        let handles = (0..workers.max(1))
            .map(|index| {
                let worker = worker_name(index);
                let handle = scope.spawn({
                    let worker = worker.clone();
                    move || run_worker(runtime, &worker, test_case)
                });
                (worker, handle)
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .map(|(worker, handle)| {
                handle.join().unwrap_or_else(|_| WorkerOutcome {
                    failure: Some(map_cli_worker_panic(&worker)),
                    worker,
                    commands: 0,
                })
            })
            .collect()
    })
}

pub(crate) fn summarize(
    test_case: &str,
    size: usize,
    outcomes: &[WorkerOutcome],
    started: Instant,
) -> RunSummary {
    let failed = outcomes
        .iter()
        .filter(|outcome| outcome.failure.is_some())
        .count();
    RunSummary {
        test_case: test_case.to_string(),
        size,
        workers: outcomes.len(),
        passed: outcomes.len() - failed,
        failed,
        commands: outcomes.iter().map(|outcome| outcome.commands).sum(),
        elapsed_ms: started.elapsed().as_millis(),
    }
}

fn emit_outcomes(outcomes: &[WorkerOutcome], summary: &RunSummary) {
    for outcome in outcomes {
        match &outcome.failure {
            None => println!("WORKER:{}:OK", outcome.worker),
            Some(error) => {
                println!("WORKER:{}:FAILED", outcome.worker);
                let failure = WorkerFailure::from_error(&outcome.worker, error);
                println!(
                    "FAILURE_JSON:{}",
                    serde_json::to_string(&failure)
                        .unwrap_or_else(|_| json_string(&failure.report))
                );
            }
        }
    }
    println!(
        "SUMMARY_JSON:{}",
        serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
    );
    if summary.is_success() {
        println!("RESULT:OK");
    } else {
        println!("RESULT:FAILED");
    }
}

pub(crate) fn run_load(args: RunArgs) -> Result<i32, ScriptError> {
    let scripts_root = resolve_scripts_dir(&args.scripts_dir)?;
    let config = load_config(args.config.as_deref(), args.timeout_ms)?;
    let runtime = create_runtime_from_dir(CreateRuntimeOptions {
        scripts_dir: scripts_root,
        config: Some(config),
    })?;

    // Loads the whole call graph once, so script errors surface before any worker starts.
    let size = runtime.script_size(LoadKind::TestCase, &args.test_case)?;
    info!(
        test_case = %args.test_case,
        size,
        workers = args.workers,
        "Starting run"
    );

    let started = Instant::now();
    let outcomes = run_workers(&runtime, &args.test_case, args.workers);
    let summary = summarize(&args.test_case, size, &outcomes, started);
    info!(
        passed = summary.passed,
        failed = summary.failed,
        elapsed_ms = summary.elapsed_ms as u64,
        "Run finished"
    );

    emit_outcomes(&outcomes, &summary);
    Ok(if summary.is_success() { 0 } else { 2 })
}
