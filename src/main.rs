//! pool-stress - database connection-pool exhaustion harness
//!
//! Floods a database with concurrent connection attempts and reports how many
//! got through, how long they took and what the server answered when it ran
//! out of connection slots.
//!
//! ## Usage
//!
//! ```bash
//! # Dry run against the simulated backend
//! pool-stress run --backend simulated -n 500 --sim-failure-rate 0.2
//!
//! # Exhaust a local PostgreSQL
//! pool-stress run --backend postgres --url postgres://postgres@localhost/postgres -n 300
//!
//! # Inspect stored runs
//! pool-stress results list
//! pool-stress results export 20260101_120000_0042 run.csv
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::info;

use pool_stress::adapter::{
    redact_url, BackendAdapter, SimulatedAdapter, SqlAdapter, SqlTarget,
};
use pool_stress::cli::{self, Args};
use pool_stress::config::{self, AppConfig, BackendKind, ConfigFile};
use pool_stress::harness::BatchOrchestrator;
use pool_stress::models::RunSummary;
use pool_stress::output::{write_report_to_file, OutputFormat, Reporter, SummaryFormatter};
use pool_stress::results::{ExportFormat, ResultsStorage, RunParams, StoredRun};
use pool_stress::utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_deref() {
        Some(level) => LogLevel::from_str(level)
            .ok_or_else(|| anyhow::anyhow!("Unknown log level: {level}"))?,
        None => LogLevel::from_verbose(args.verbose),
    };
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => {
            run_stress(run_args).await?;
        }
        cli::Command::Results(results_args) => {
            manage_results(results_args)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args)?;
        }
        cli::Command::Env => {
            config::print_env_help();
        }
    }

    Ok(())
}

async fn run_stress(args: cli::RunArgs) -> Result<()> {
    let mut app = AppConfig::load_layered(args.config.as_deref())?;
    args.apply_to(&mut app)?;
    app.validate()?;

    let format = OutputFormat::from_str(&app.output.format)
        .ok_or_else(|| anyhow::anyhow!("Unknown output format: {}", app.output.format))?;

    let target = app.backend.url.as_deref().map(redact_url);
    info!(
        "Stressing {} backend{} with {} attempts",
        app.backend.kind,
        target
            .as_deref()
            .map(|t| format!(" at {t}"))
            .unwrap_or_default(),
        app.attempts
    );

    let summary = match app.backend.kind {
        BackendKind::Postgres | BackendKind::Mysql => {
            let url = app
                .backend
                .url
                .clone()
                .context("SQL backend requires a connection url")?;
            execute(
                SqlAdapter::new(app.backend.kind.name()),
                SqlTarget::new(url),
                &app,
            )
            .await?
        }
        BackendKind::Simulated => {
            execute(SimulatedAdapter::new(), app.backend.simulated.clone(), &app).await?
        }
    };

    let formatter = SummaryFormatter::new(format);
    match &args.output {
        Some(path) => {
            write_report_to_file(path, &summary, &formatter)
                .with_context(|| format!("Failed to write report to {path}"))?;
            println!("✓ Report written to: {path}");
        }
        None => println!("{}", formatter.render(&summary)),
    }

    if app.output.save_results {
        let run = StoredRun::new(
            app.backend.kind.name(),
            app.backend.url.as_deref(),
            RunParams {
                attempts: app.attempts,
                timeout_ms: app.timeout_ms,
                drain_grace_ms: app.drain_grace_ms,
            },
            summary,
        );
        let path = ResultsStorage::default_dir().save(&run)?;
        println!("✓ Run {} saved to: {}", run.id, path.display());
    }

    Ok(())
}

async fn execute<A: BackendAdapter>(
    adapter: A,
    config: A::Config,
    app: &AppConfig,
) -> Result<RunSummary> {
    let orchestrator = BatchOrchestrator::new(adapter, config);
    let summary = orchestrator.run_batch(&app.batch_params()).await?;
    Ok(summary)
}

fn manage_results(args: cli::ResultsArgs) -> Result<()> {
    let storage = ResultsStorage::default_dir();

    match args.action {
        cli::ResultsAction::List { backend, limit } => {
            let runs = storage.list_runs(backend.as_deref())?;

            if runs.is_empty() {
                println!("\nNo stored results found in {}.", storage.base_dir().display());
                println!("   Save a run with: pool-stress run --save");
                return Ok(());
            }

            println!(
                "\n{:22} {:10} {:20} {:>9} {:>9}  {}",
                "ID", "BACKEND", "STARTED", "REQUESTED", "SUCCEEDED", "PRIMARY ERROR"
            );
            println!("{:-<100}", "");
            for run in runs.iter().take(limit) {
                println!(
                    "{:22} {:10} {:20} {:>9} {:>9}  {}",
                    run.id,
                    run.backend,
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.total_requested,
                    run.successful,
                    run.primary_error
                );
            }
            if runs.len() > limit {
                println!("... {} more", runs.len() - limit);
            }
        }

        cli::ResultsAction::Show { id, format } => {
            let format = OutputFormat::from_str(&format)
                .ok_or_else(|| anyhow::anyhow!("Unknown output format: {format}"))?;
            let run = storage.load(&id)?;

            println!(
                "Run {} ({}{})",
                run.id,
                run.backend,
                run.target
                    .as_deref()
                    .map(|t| format!(" at {t}"))
                    .unwrap_or_default()
            );
            println!("{}", SummaryFormatter::new(format).render(&run.summary));
        }

        cli::ResultsAction::Export { id, output, format } => {
            let path = Path::new(&output);
            let format = match format {
                Some(f) => ExportFormat::from_str(&f)
                    .ok_or_else(|| anyhow::anyhow!("Unknown export format: {f}"))?,
                None => ExportFormat::from_extension(path).unwrap_or(ExportFormat::Json),
            };

            let run = storage.load(&id)?;
            storage.export(&run, path, format)?;
            println!("✓ Run {} exported to: {}", run.id, path.display());
        }
    }

    Ok(())
}

fn manage_config(args: cli::ConfigArgs) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { path, force } => {
            if Path::new(&path).exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {path}. Use --force to overwrite."
                );
            }

            ConfigFile::example().save(&path)?;
            println!("✓ Configuration file created: {path}");
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { config } => {
            let app = AppConfig::load_layered(config.as_deref())?;
            let effective = ConfigFile {
                app: app.redacted(),
                ..Default::default()
            };
            println!("{}", serde_yaml::to_string(&effective)?);
        }

        cli::ConfigAction::Validate { path } => {
            let checked = ConfigFile::load(&path).and_then(|file| file.validate());
            match checked {
                Ok(()) => {
                    println!("✓ Configuration file is valid: {path}");
                }
                Err(e) => {
                    println!("✗ Configuration file is invalid: {path}");
                    println!("  Error: {e:#}");
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}
