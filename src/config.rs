//! Node and receiver configuration
//!
//! Plain serde structs with defaults matching the reference deployment. Every
//! field is optional in JSON; missing fields take their default. Loaded
//! configurations are validated before use.

use crate::error::PlantarError;
use crate::field::ReconstructionConfig;
use crate::framing::{Framing, DEFAULT_MAX_FRAME_LEN, DEFAULT_RECV_BUFFER};
use crate::layout::{FootLayout, FootOutline};
use crate::steps::DEFAULT_STEP_THRESHOLD_G;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default TCP port shared by node and receiver
pub const DEFAULT_PORT: u16 = 65432;

/// Default delay between node ticks
pub const DEFAULT_INTERVAL_MS: u64 = 2000;

/// Reconnect behaviour of the node after a fatal transport fault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given (zero-based) attempt, doubling up to the cap
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Sensor node settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub server_addr: String,
    pub step_threshold_g: f64,
    pub interval_ms: u64,
    pub framing: Framing,
    pub reconnect: ReconnectPolicy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            step_threshold_g: DEFAULT_STEP_THRESHOLD_G,
            interval_ms: DEFAULT_INTERVAL_MS,
            framing: Framing::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_json(json: &str) -> Result<Self, PlantarError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, PlantarError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), PlantarError> {
        if self.server_addr.trim().is_empty() {
            return Err(PlantarError::InvalidConfig(
                "server_addr must not be empty".to_string(),
            ));
        }
        if !self.step_threshold_g.is_finite() {
            return Err(PlantarError::InvalidConfig(format!(
                "step_threshold_g must be finite, got {}",
                self.step_threshold_g
            )));
        }
        if self.reconnect.initial_backoff_ms > self.reconnect.max_backoff_ms {
            return Err(PlantarError::InvalidConfig(
                "initial_backoff_ms exceeds max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Receiver settings, including the reconstruction context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub bind_addr: String,
    pub framing: Framing,
    pub recv_buffer: usize,
    pub max_frame_len: usize,
    pub reconstruction: ReconstructionConfig,
    pub layout: FootLayout,
    pub outline: FootOutline,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            framing: Framing::default(),
            recv_buffer: DEFAULT_RECV_BUFFER,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            reconstruction: ReconstructionConfig::default(),
            layout: FootLayout::default(),
            outline: FootOutline::default(),
        }
    }
}

impl ReceiverConfig {
    pub fn from_json(json: &str) -> Result<Self, PlantarError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, PlantarError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String, PlantarError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Layout and outline are validated on construction; this covers the rest
    pub fn validate(&self) -> Result<(), PlantarError> {
        if self.bind_addr.trim().is_empty() {
            return Err(PlantarError::InvalidConfig(
                "bind_addr must not be empty".to_string(),
            ));
        }
        if self.recv_buffer == 0 || self.max_frame_len == 0 {
            return Err(PlantarError::InvalidConfig(
                "recv_buffer and max_frame_len must be positive".to_string(),
            ));
        }
        self.reconstruction.validate()
    }
}
