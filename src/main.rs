mod cli;
mod condition;
mod driver;
mod env;
mod error;
mod executor;
mod globals;
mod model;
mod parser;
mod result_store;
mod router;
mod streaming;
mod substitution;
mod transport;
mod validate;

use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .init();

    let opts = cli::get_opts();
    let path = std::path::Path::new(&opts.path);

    let tasks = match parser::load_task_file(path) {
        Ok(tasks) => tasks,
        Err(e) => {
            error!(error = %e, "failed to parse task file");
            std::process::exit(driver::EXIT_VALIDATION_OR_CANCELED);
        }
    };

    if let Err(e) = validate::validate(&tasks) {
        error!(error = %e, "task file failed validation");
        std::process::exit(driver::EXIT_VALIDATION_OR_CANCELED);
    }

    match opts.subcommand.as_str() {
        "validate" => {
            println!("ok: {} task(s) validated", tasks.len());
            Ok(())
        }
        "run" => run_workflow(tasks, opts).await,
        other => {
            eprintln!("Unknown subcommand: {other} (supported: run, validate)");
            std::process::exit(1);
        }
    }
}

async fn run_workflow(tasks: Vec<model::Task>, opts: cli::Opts) -> anyhow::Result<()> {
    let start = tasks
        .iter()
        .map(|t| t.id)
        .min()
        .context("task file has no tasks")?;
    let table: HashMap<_, _> = tasks.into_iter().map(|t| (t.id, t)).collect();

    let globals = globals::GlobalVars::from_raw(opts.overrides.into_iter().collect())
        .context("invalid global variable overrides")?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, canceling workflow");
            signal_cancel.cancel();
        }
    });

    let deps = executor::ExecDeps {
        tasks: Arc::new(table),
        store: Arc::new(result_store::ResultStore::new()),
        globals,
        transports: Arc::new(transport::TransportRegistry::with_defaults()),
        cancel,
    };

    info!(nested_level = env::nested_level(), start, "starting workflow");
    let outcome = driver::run(&deps, start).await;

    if opts.format == "text" {
        for id in &outcome.executed {
            if let Some(r) = deps.store.get(*id) {
                println!(
                    "task {id}: {} (exit {})",
                    if r.success { "success" } else { "failed" },
                    r.exit_code
                );
            }
        }
    }

    info!(exit_code = outcome.exit_code, "workflow finished");
    std::process::exit(outcome.exit_code);
}
