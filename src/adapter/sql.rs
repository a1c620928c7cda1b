//! SQL backends through sqlx
//!
//! Opens a single unpooled connection per attempt so that every attempt
//! occupies its own server-side connection slot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{AnyConnection, Connection};
use std::sync::Once;
use url::Url;

use super::BackendAdapter;
use crate::error::AdapterError;

const ROUND_TRIP_QUERY: &str = "SELECT 1";

const REDACTED: &str = "***";

static INSTALL_DRIVERS: Once = Once::new();

/// Connection target for a SQL backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlTarget {
    /// `postgres://` or `mysql://` URL
    pub url: String,
}

impl SqlTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Adapter for PostgreSQL and MySQL
#[derive(Clone, Debug)]
pub struct SqlAdapter {
    name: String,
}

impl SqlAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);
        Self { name: name.into() }
    }
}

#[async_trait]
impl BackendAdapter for SqlAdapter {
    type Config = SqlTarget;
    type Handle = AnyConnection;

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self, config: &SqlTarget) -> Result<AnyConnection, AdapterError> {
        AnyConnection::connect(&config.url)
            .await
            .map_err(|e| classify(e, AdapterError::connect))
    }

    async fn round_trip(&self, handle: &mut AnyConnection) -> Result<(), AdapterError> {
        sqlx::query(ROUND_TRIP_QUERY)
            .execute(&mut *handle)
            .await
            .map(|_| ())
            .map_err(|e| classify(e, AdapterError::query))
    }

    async fn close(&self, handle: AnyConnection) -> Result<(), AdapterError> {
        handle
            .close()
            .await
            .map_err(|e| classify(e, AdapterError::query))
    }
}

/// Map a sqlx error to an adapter error, keeping the server's code when there is one
fn classify(err: sqlx::Error, build: fn(String) -> AdapterError) -> AdapterError {
    match &err {
        sqlx::Error::Database(db) => {
            let base = build(db.message().to_string());
            match db.code() {
                Some(code) => base.with_code(code.into_owned()),
                None => base,
            }
        }
        sqlx::Error::Io(io) => build(io.to_string()).with_code(format!("{:?}", io.kind())),
        _ => build(err.to_string()),
    }
}

/// Hide every password in a connection URL.
///
/// Covers the userinfo password and query parameters such as `password=` or
/// `sslpassword=`. Input that does not parse as a URL is returned unchanged
/// unless it looks like it could carry credentials.
pub fn redact_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        let lower = url.to_lowercase();
        if lower.contains('@') || lower.contains("password") {
            return REDACTED.to_string();
        }
        return url.to_string();
    };

    if parsed.password().is_some() && parsed.set_password(Some(REDACTED)).is_err() {
        return REDACTED.to_string();
    }

    let has_secret_param = parsed.query_pairs().any(|(key, _)| is_secret_param(&key));
    if has_secret_param {
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(key, value)| {
                let value = if is_secret_param(&key) {
                    REDACTED.to_string()
                } else {
                    value.into_owned()
                };
                (key.into_owned(), value)
            })
            .collect();
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }

    parsed.to_string()
}

fn is_secret_param(key: &str) -> bool {
    key.to_lowercase().ends_with("password")
}
