//! Backend adapters
//!
//! An adapter performs one connect, one trivial round trip and one close
//! against a specific database kind. The harness only orchestrates and
//! measures; it never looks inside the connection configuration.

mod simulated;
mod sql;

use async_trait::async_trait;

use crate::error::AdapterError;

pub use simulated::{SimulatedAdapter, SimulatedProfile};
pub use sql::{redact_url, SqlAdapter, SqlTarget};

/// Database-kind specific connect/round-trip/close sequence
#[async_trait]
pub trait BackendAdapter: Send + Sync + 'static {
    /// Opaque connection configuration passed through by the harness
    type Config: Send + Sync + 'static;

    /// Live connection owned by exactly one attempt
    type Handle: Send + 'static;

    /// Short backend name used in logs and stored results
    fn name(&self) -> &str;

    async fn connect(&self, config: &Self::Config) -> Result<Self::Handle, AdapterError>;

    async fn round_trip(&self, handle: &mut Self::Handle) -> Result<(), AdapterError>;

    /// Best-effort release of the connection
    async fn close(&self, handle: Self::Handle) -> Result<(), AdapterError>;
}
