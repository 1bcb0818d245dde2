//! rigger: run an installation task list on this host.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use rigger_core::{
    AptAdapter, GitAdapter, LedgerSnapshot, PipxAdapter, Report, RiggerError, RunBuilder, RunFile,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rigger")]
#[command(version, about = "Install a toolbox from a run file", long_about = None)]
struct Cli {
    /// Run file (JSON: `{ "tasks": [...], "settings": {...} }`)
    #[arg(short, long, default_value = "toolbox.json")]
    config: PathBuf,

    /// Record what would be installed without touching the host
    #[arg(long)]
    dry_run: bool,

    /// Install even when the target already looks installed
    #[arg(long)]
    force_reinstall: bool,

    /// Upper bound on concurrent workers (further capped by CPU count)
    #[arg(long)]
    pool_size: Option<usize>,

    /// Hold new tasks while the 1-minute load average is above this
    #[arg(long)]
    max_load: Option<f64>,

    /// Hold new tasks while memory use is above this percentage
    #[arg(long)]
    max_mem_percent: Option<f64>,

    /// Attempts per task before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Also write the ledger and report as JSON to this path
    #[arg(long)]
    ledger_json: Option<PathBuf>,

    /// Only run tasks in this category
    #[arg(long)]
    only_category: Option<String>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn apply(&self, file: &mut RunFile) {
        let settings = &mut file.settings;
        settings.dry_run |= self.dry_run;
        settings.force_reinstall |= self.force_reinstall;
        if let Some(pool_size) = self.pool_size {
            settings.pool_size = pool_size;
        }
        if let Some(max_load) = self.max_load {
            settings.max_load = max_load;
        }
        if let Some(max_mem_percent) = self.max_mem_percent {
            settings.max_mem_percent = max_mem_percent;
        }
        if let Some(max_attempts) = self.max_attempts {
            settings.max_attempts = max_attempts;
        }
        if let Some(category) = &self.only_category {
            file.narrow_to_category(category);
        }
    }
}

#[derive(Serialize)]
struct Export<'a> {
    ledger: &'a LedgerSnapshot,
    report: &'a Report,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "run aborted");
            ExitCode::from(2)
        }
    }
}

/// Returns whether every task ended without a failure.
async fn run(cli: Cli) -> Result<bool, RiggerError> {
    let mut file = RunFile::load(&cli.config)?;
    cli.apply(&mut file);
    info!(
        config = %cli.config.display(),
        tasks = file.tasks.len(),
        "run file loaded"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let orchestrator = RunBuilder::new(file.settings)
        .tasks(file.tasks)
        .adapter(AptAdapter::default())?
        .adapter(PipxAdapter::new())?
        .adapter(GitAdapter::new())?
        .cancel_token(cancel)
        .build()?;

    let outcome = orchestrator.run().await;
    println!("{}", outcome.report);

    if let Some(path) = &cli.ledger_json {
        write_export(path, &outcome.ledger, &outcome.report)?;
        info!(path = %path.display(), "ledger written");
    }

    Ok(!outcome.report.has_failures())
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("interrupt received, stopping admission and killing running commands");
            cancel.cancel();
        }
        Err(err) => warn!(error = %err, "cannot listen for interrupts"),
    }
}

fn write_export(path: &Path, ledger: &LedgerSnapshot, report: &Report) -> Result<(), RiggerError> {
    let json = serde_json::to_string_pretty(&Export { ledger, report })?;
    std::fs::write(path, json).map_err(|source| RiggerError::RunFile {
        path: path.to_path_buf(),
        source,
    })
}
