//! Error taxonomy for the harness
//!
//! Adapter errors are normalized into per-attempt outcomes; harness errors
//! abort the whole batch.

use thiserror::Error;

/// Longest error key kept in a summary
pub const MAX_ERROR_KEY_LEN: usize = 64;

/// Errors reported by a backend adapter for a single attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("connect failed: {message}")]
    Connect {
        code: Option<String>,
        message: String,
    },

    #[error("round trip failed: {message}")]
    Query {
        code: Option<String>,
        message: String,
    },
}

impl AdapterError {
    pub fn connect(message: impl Into<String>) -> Self {
        AdapterError::Connect {
            code: None,
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        AdapterError::Query {
            code: None,
            message: message.into(),
        }
    }

    /// Attach the backend's native error code
    pub fn with_code(self, code: impl Into<String>) -> Self {
        let code = Some(code.into());
        match self {
            AdapterError::Connect { message, .. } => AdapterError::Connect { code, message },
            AdapterError::Query { message, .. } => AdapterError::Query { code, message },
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            AdapterError::Connect { code, .. } | AdapterError::Query { code, .. } => {
                code.as_deref()
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AdapterError::Connect { message, .. } | AdapterError::Query { message, .. } => message,
        }
    }

    /// Short, stable identifier used to group failures
    pub fn error_key(&self) -> String {
        match self.code().map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => truncate_key(code),
            None => normalize_message(self.message()),
        }
    }
}

/// Errors that abort a batch before or during its run
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("invalid batch configuration: {0}")]
    Config(String),

    #[error("internal harness fault: {0}")]
    Internal(String),
}

impl HarnessError {
    pub fn is_config(&self) -> bool {
        matches!(self, HarnessError::Config(_))
    }
}

/// First line of the message with whitespace collapsed
fn normalize_message(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or("");
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "unknown error".to_string();
    }
    truncate_key(&collapsed)
}

fn truncate_key(key: &str) -> String {
    key.chars().take(MAX_ERROR_KEY_LEN).collect()
}
