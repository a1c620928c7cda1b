//! Configuration module
//!
//! Handles loading and layering configuration: defaults, then the config
//! file, then `POOL_STRESS_*` environment variables, then CLI flags.

mod env;
mod file;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::adapter::{redact_url, SimulatedProfile};
use crate::harness::BatchParams;

pub use env::{print_env_help, EnvConfig};
pub use file::ConfigFile;

/// Database kind targeted by a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgres,
    Mysql,
    Simulated,
}

impl BackendKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(BackendKind::Postgres),
            "mysql" | "mariadb" => Some(BackendKind::Mysql),
            "simulated" | "sim" => Some(BackendKind::Simulated),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
            BackendKind::Mysql => "mysql",
            BackendKind::Simulated => "simulated",
        }
    }

    /// URL schemes accepted for this backend
    pub fn url_schemes(&self) -> &'static [&'static str] {
        match self {
            BackendKind::Postgres => &["postgres://", "postgresql://"],
            BackendKind::Mysql => &["mysql://", "mariadb://"],
            BackendKind::Simulated => &[],
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Target database settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// Connection URL for SQL backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Behavior of the simulated backend
    #[serde(default)]
    pub simulated: SimulatedProfile,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Simulated,
            url: None,
            simulated: SimulatedProfile::default(),
        }
    }
}

/// Output settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format (table, json, json-pretty, csv, summary)
    pub format: String,

    /// Persist every run to the results directory
    pub save_results: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "table".to_string(),
            save_results: false,
        }
    }
}

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Concurrent connection attempts per batch
    pub attempts: usize,

    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,

    /// Time an abandoned connect may still take so it can be closed
    pub drain_grace_ms: u64,

    pub backend: BackendConfig,

    pub output: OutputConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            attempts: 100,
            timeout_ms: 5000,
            drain_grace_ms: 5000,
            backend: BackendConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the config file, then environment overrides.
    ///
    /// `path` wins over `POOL_STRESS_CONFIG`, which wins over the standard
    /// locations. CLI flags are layered on by the caller, who then calls
    /// [`AppConfig::validate`] on the merged result.
    pub fn load_layered(path: Option<&str>) -> Result<Self> {
        let env = EnvConfig::load();
        let file = match path.or(env.config_file.as_deref()) {
            Some(path) => {
                debug!("Loading configuration from {}", path);
                ConfigFile::load(path)?
            }
            None => ConfigFile::load_default()?,
        };

        let mut config = file.app;
        config.apply_env(&env)?;
        Ok(config)
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self, env: &EnvConfig) -> Result<()> {
        if let Some(attempts) = env.attempts {
            self.attempts = attempts;
        }
        if let Some(timeout_ms) = env.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(grace) = env.drain_grace_ms {
            self.drain_grace_ms = grace;
        }
        if let Some(backend) = &env.backend {
            self.backend.kind = BackendKind::from_str(backend)
                .ok_or_else(|| anyhow::anyhow!("Unknown backend in environment: {backend}"))?;
        }
        if let Some(url) = &env.url {
            self.backend.url = Some(url.clone());
        }
        if let Some(format) = &env.format {
            self.output.format = format.clone();
        }
        Ok(())
    }

    /// Check values that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }

        let schemes = self.backend.kind.url_schemes();
        if !schemes.is_empty() {
            match &self.backend.url {
                None => bail!("backend '{}' requires a connection url", self.backend.kind),
                Some(url) if !schemes.iter().any(|s| url.starts_with(s)) => bail!(
                    "url for backend '{}' must start with one of {:?}",
                    self.backend.kind,
                    schemes
                ),
                Some(_) => {}
            }
        }

        self.backend
            .simulated
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid simulated profile: {e}"))?;

        Ok(())
    }

    /// Batch parameters for the harness
    pub fn batch_params(&self) -> BatchParams {
        BatchParams::new(self.attempts, Duration::from_millis(self.timeout_ms))
            .with_drain_grace(Duration::from_millis(self.drain_grace_ms))
    }

    /// Copy safe to print or persist
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.backend.url = config.backend.url.as_deref().map(redact_url);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.attempts, 100);
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.backend.kind, BackendKind::Simulated);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!(BackendKind::from_str("PostgreSQL"), Some(BackendKind::Postgres));
        assert_eq!(BackendKind::from_str("mariadb"), Some(BackendKind::Mysql));
        assert_eq!(BackendKind::from_str("oracle"), None);
    }

    #[test]
    fn test_sql_backend_requires_url() {
        let mut config = AppConfig::default();
        config.backend.kind = BackendKind::Postgres;
        assert!(config.validate().is_err());

        config.backend.url = Some("mysql://localhost/db".to_string());
        assert!(config.validate().is_err());

        config.backend.url = Some("postgres://localhost/db".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = AppConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        let env = EnvConfig {
            attempts: Some(500),
            backend: Some("mysql".to_string()),
            url: Some("mysql://root@localhost/test".to_string()),
            ..Default::default()
        };

        config.apply_env(&env).unwrap();
        assert_eq!(config.attempts, 500);
        assert_eq!(config.backend.kind, BackendKind::Mysql);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_without_url_completed_by_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "app:\n  backend:\n    kind: postgres\n").unwrap();

        let mut config = ConfigFile::load(&path).unwrap().app;
        let env = EnvConfig {
            url: Some("postgres://u:p@localhost/db".to_string()),
            ..Default::default()
        };
        config.apply_env(&env).unwrap();

        assert_eq!(config.backend.kind, BackendKind::Postgres);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_batch_params() {
        let config = AppConfig {
            attempts: 10,
            timeout_ms: 250,
            drain_grace_ms: 100,
            ..Default::default()
        };
        let params = config.batch_params();
        assert_eq!(params.total_attempts, 10);
        assert_eq!(params.per_attempt_timeout, Duration::from_millis(250));
        assert_eq!(params.drain_grace, Duration::from_millis(100));
    }

    #[test]
    fn test_redacted_hides_password() {
        let mut config = AppConfig::default();
        config.backend.url = Some("postgres://app:s3cret@db:5432/app".to_string());

        let redacted = config.redacted();
        assert_eq!(
            redacted.backend.url.as_deref(),
            Some("postgres://app:***@db:5432/app")
        );
        assert!(config.backend.url.unwrap().contains("s3cret"));
    }
}
