//! Simulated backend
//!
//! Emulates a database under connection pressure without any network I/O.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use super::BackendAdapter;
use crate::error::AdapterError;

/// Behavior of the simulated database
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedProfile {
    /// Base connect + round-trip latency in milliseconds
    pub latency_ms: u64,
    /// Uniform jitter added on top of the base latency
    pub jitter_ms: u64,
    /// Probability (0.0 - 1.0) that a connect is rejected
    pub failure_rate: f64,
    /// Probability (0.0 - 1.0) that a connect never answers
    pub hang_rate: f64,
    /// Native code attached to rejected connects
    pub error_code: String,
}

impl Default for SimulatedProfile {
    fn default() -> Self {
        Self {
            latency_ms: 20,
            jitter_ms: 10,
            failure_rate: 0.0,
            hang_rate: 0.0,
            error_code: "53300".to_string(),
        }
    }
}

impl SimulatedProfile {
    pub fn validate(&self) -> Result<(), String> {
        for (name, rate) in [
            ("failure_rate", self.failure_rate),
            ("hang_rate", self.hang_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(format!("{name} must be within 0.0..=1.0, got {rate}"));
            }
        }
        if self.failure_rate + self.hang_rate > 1.0 {
            return Err("failure_rate + hang_rate must not exceed 1.0".to_string());
        }
        Ok(())
    }
}

enum ConnectFate {
    Accept(Duration),
    Reject,
    Hang,
}

/// Adapter that fakes a database according to a [`SimulatedProfile`]
#[derive(Clone, Debug, Default)]
pub struct SimulatedAdapter;

impl SimulatedAdapter {
    pub fn new() -> Self {
        Self
    }

    fn roll(profile: &SimulatedProfile) -> ConnectFate {
        let mut rng = rand::rng();
        let roll: f64 = rng.random();
        if roll < profile.failure_rate {
            return ConnectFate::Reject;
        }
        if roll < profile.failure_rate + profile.hang_rate {
            return ConnectFate::Hang;
        }
        let jitter = if profile.jitter_ms > 0 {
            rng.random_range(0..=profile.jitter_ms)
        } else {
            0
        };
        ConnectFate::Accept(Duration::from_millis(profile.latency_ms + jitter))
    }
}

/// Connection to the simulated database
#[derive(Debug)]
pub struct SimulatedConnection {
    round_trip: Duration,
}

#[async_trait]
impl BackendAdapter for SimulatedAdapter {
    type Config = SimulatedProfile;
    type Handle = SimulatedConnection;

    fn name(&self) -> &str {
        "simulated"
    }

    async fn connect(
        &self,
        config: &SimulatedProfile,
    ) -> Result<SimulatedConnection, AdapterError> {
        // The rng is not Send, so the fate is decided before the first await.
        let fate = Self::roll(config);
        match fate {
            ConnectFate::Reject => {
                Err(AdapterError::connect("sorry, too many clients already")
                    .with_code(config.error_code.clone()))
            }
            ConnectFate::Hang => std::future::pending().await,
            ConnectFate::Accept(total) => {
                let connect = total / 2;
                sleep(connect).await;
                Ok(SimulatedConnection {
                    round_trip: total - connect,
                })
            }
        }
    }

    async fn round_trip(&self, handle: &mut SimulatedConnection) -> Result<(), AdapterError> {
        sleep(handle.round_trip).await;
        Ok(())
    }

    async fn close(&self, _handle: SimulatedConnection) -> Result<(), AdapterError> {
        Ok(())
    }
}
