//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "POOL_STRESS";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Attempts from POOL_STRESS_ATTEMPTS
    pub attempts: Option<usize>,
    /// Per-attempt timeout from POOL_STRESS_TIMEOUT_MS
    pub timeout_ms: Option<u64>,
    /// Drain grace from POOL_STRESS_DRAIN_GRACE_MS
    pub drain_grace_ms: Option<u64>,
    /// Backend kind from POOL_STRESS_BACKEND
    pub backend: Option<String>,
    /// Connection URL from POOL_STRESS_URL
    pub url: Option<String>,
    /// Output format from POOL_STRESS_FORMAT
    pub format: Option<String>,
    /// Config file from POOL_STRESS_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            attempts: get_env_parse("ATTEMPTS"),
            timeout_ms: get_env_parse("TIMEOUT_MS"),
            drain_grace_ms: get_env_parse("DRAIN_GRACE_MS"),
            backend: get_env("BACKEND"),
            url: get_env("URL"),
            format: get_env("FORMAT"),
            config_file: get_env("CONFIG"),
        }
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}"))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.trim().parse().ok())
}

/// Print all POOL_STRESS environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_ATTEMPTS        Concurrent connection attempts");
    println!("  {ENV_PREFIX}_TIMEOUT_MS      Per-attempt timeout in milliseconds");
    println!("  {ENV_PREFIX}_DRAIN_GRACE_MS  Grace period for closing abandoned connects");
    println!("  {ENV_PREFIX}_BACKEND         Backend (postgres, mysql, simulated)");
    println!("  {ENV_PREFIX}_URL             Connection URL for SQL backends");
    println!("  {ENV_PREFIX}_FORMAT          Output format (table, json, json-pretty, csv, summary)");
    println!("  {ENV_PREFIX}_CONFIG          Path to configuration file");
    println!("  RUST_LOG                     Log filter (overrides --verbose)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_BACKEND=postgres");
    println!("  export {ENV_PREFIX}_URL=postgres://postgres@localhost/postgres");
    println!("  pool-stress run -n 500");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sets variables for the scope of a test and restores them on drop
    struct EnvGuard {
        previous: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn set(vars: &[(&str, &str)]) -> Self {
            let previous = vars
                .iter()
                .map(|(name, value)| {
                    let key = format!("{ENV_PREFIX}_{name}");
                    let old = env::var(&key).ok();
                    env::set_var(&key, value);
                    (key, old)
                })
                .collect();
            Self { previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.previous {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(config.attempts.is_none());
        assert!(config.url.is_none());
    }

    #[test]
    fn test_env_load() {
        let _guard = EnvGuard::set(&[
            ("ATTEMPTS", "250"),
            ("BACKEND", "mysql"),
            ("DRAIN_GRACE_MS", "not-a-number"),
        ]);

        let config = EnvConfig::load();
        assert_eq!(config.attempts, Some(250));
        assert_eq!(config.backend.as_deref(), Some("mysql"));
        assert_eq!(config.drain_grace_ms, None);
    }

    #[test]
    fn test_blank_value_is_unset() {
        let _guard = EnvGuard::set(&[("URL", "  ")]);
        assert_eq!(EnvConfig::load().url, None);
    }
}
