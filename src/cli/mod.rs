//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{AppConfig, BackendKind};

/// Database connection-pool exhaustion harness
#[derive(Parser, Debug)]
#[command(name = "pool-stress")]
#[command(author = "hephaex@gmail.com")]
#[command(version)]
#[command(about = "Flood a database with concurrent connections and report how it copes")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one batch of concurrent connection attempts
    Run(RunArgs),

    /// View stored run results
    Results(ResultsArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Describe the POOL_STRESS_* environment variables
    Env,
}

/// Arguments for run command
///
/// Every flag is optional; unset flags keep the value from the config file or
/// environment.
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Configuration file to load instead of the standard locations
    #[arg(short, long)]
    pub config: Option<String>,

    /// Backend to target (postgres, mysql, simulated)
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Connection URL for SQL backends
    #[arg(short, long)]
    pub url: Option<String>,

    /// Number of concurrent connection attempts
    #[arg(short = 'n', long)]
    pub attempts: Option<usize>,

    /// Per-attempt timeout in milliseconds
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,

    /// Grace period for closing connections that open after their deadline
    #[arg(long)]
    pub drain_grace_ms: Option<u64>,

    /// Simulated backend: base latency in milliseconds
    #[arg(long)]
    pub sim_latency_ms: Option<u64>,

    /// Simulated backend: latency jitter in milliseconds
    #[arg(long)]
    pub sim_jitter_ms: Option<u64>,

    /// Simulated backend: probability a connect is rejected
    #[arg(long)]
    pub sim_failure_rate: Option<f64>,

    /// Simulated backend: probability a connect never answers
    #[arg(long)]
    pub sim_hang_rate: Option<f64>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,

    /// Save the run to the results directory
    #[arg(long)]
    pub save: bool,
}

impl RunArgs {
    /// Layer the flags that were given on top of `config`
    pub fn apply_to(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(backend) = &self.backend {
            config.backend.kind = BackendKind::from_str(backend)
                .ok_or_else(|| anyhow::anyhow!("Unknown backend: {backend}"))?;
        }
        if let Some(url) = &self.url {
            config.backend.url = Some(url.clone());
        }
        if let Some(attempts) = self.attempts {
            config.attempts = attempts;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(grace) = self.drain_grace_ms {
            config.drain_grace_ms = grace;
        }

        let sim = &mut config.backend.simulated;
        if let Some(latency) = self.sim_latency_ms {
            sim.latency_ms = latency;
        }
        if let Some(jitter) = self.sim_jitter_ms {
            sim.jitter_ms = jitter;
        }
        if let Some(rate) = self.sim_failure_rate {
            sim.failure_rate = rate;
        }
        if let Some(rate) = self.sim_hang_rate {
            sim.hang_rate = rate;
        }

        if let Some(format) = &self.format {
            config.output.format = format.clone();
        }
        if self.save {
            config.output.save_results = true;
        }
        Ok(())
    }
}

/// Arguments for results command
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    #[command(subcommand)]
    pub action: ResultsAction,
}

#[derive(Subcommand, Debug)]
pub enum ResultsAction {
    /// List stored runs, newest first
    List {
        /// Filter by backend
        #[arg(short, long)]
        backend: Option<String>,

        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show one stored run
    Show {
        /// Run ID
        id: String,

        /// Output format (table, json, json-pretty, csv, summary)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Export one stored run
    Export {
        /// Run ID
        id: String,

        /// Destination file (.json or .csv)
        output: String,

        /// Export format; inferred from the file extension when omitted
        #[arg(short, long)]
        format: Option<String>,
    },
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Destination path
        #[arg(default_value = "./pool-stress.yaml")]
        path: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show {
        /// Configuration file to load instead of the standard locations
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Validate a configuration file
    Validate {
        /// File to validate
        path: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_parsing() {
        let args = Args::parse_from([
            "pool-stress",
            "run",
            "--backend",
            "postgres",
            "-n",
            "500",
            "--timeout-ms",
            "2000",
            "--save",
            "-v",
        ]);
        assert!(args.verbose);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.backend.as_deref(), Some("postgres"));
                assert_eq!(run.attempts, Some(500));
                assert_eq!(run.timeout_ms, Some(2000));
                assert!(run.save);
                assert!(run.url.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_args_apply_only_given_flags() {
        let mut config = AppConfig {
            attempts: 42,
            ..Default::default()
        };
        let run = RunArgs {
            timeout_ms: Some(750),
            sim_failure_rate: Some(0.25),
            ..Default::default()
        };

        run.apply_to(&mut config).unwrap();
        assert_eq!(config.attempts, 42);
        assert_eq!(config.timeout_ms, 750);
        assert_eq!(config.backend.simulated.failure_rate, 0.25);
        assert!(!config.output.save_results);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let run = RunArgs {
            backend: Some("oracle".to_string()),
            ..Default::default()
        };
        assert!(run.apply_to(&mut AppConfig::default()).is_err());
    }

    #[test]
    fn test_results_export_parsing() {
        let args = Args::parse_from([
            "pool-stress",
            "results",
            "export",
            "20260101_120000_0001",
            "out.csv",
        ]);
        match args.command {
            Command::Results(ResultsArgs {
                action: ResultsAction::Export { id, output, format },
            }) => {
                assert_eq!(id, "20260101_120000_0001");
                assert_eq!(output, "out.csv");
                assert!(format.is_none());
            }
            _ => panic!("Expected Results Export command"),
        }
    }

    #[test]
    fn test_config_init_default_path() {
        let args = Args::parse_from(["pool-stress", "config", "init"]);
        match args.command {
            Command::Config(ConfigArgs {
                action: ConfigAction::Init { path, force },
            }) => {
                assert_eq!(path, "./pool-stress.yaml");
                assert!(!force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
