//! Configuration for the call bridge and the sandbox harness
//!
//! [`BridgeConfig`] tunes the event dispatcher. [`SandboxConfig`] describes a
//! scripted call against the loopback engine and is loaded from a JSON file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BridgeError, Result};

/// Default capacity of the delivery queue
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;
/// Default upper bound for `clear_sink` waiting on an in-flight delivery
pub const DEFAULT_CLEAR_TIMEOUT_MS: u64 = 500;
/// Default name of the forwarding thread
pub const DEFAULT_FORWARDER_THREAD_NAME: &str = "call-bridge-events";

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum number of events waiting for delivery
    pub event_queue_capacity: usize,
    /// How long `clear_sink` waits for the delivery in progress (milliseconds)
    pub clear_timeout_ms: u64,
    /// Name of the dedicated forwarding thread
    pub forwarder_thread_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            clear_timeout_ms: DEFAULT_CLEAR_TIMEOUT_MS,
            forwarder_thread_name: DEFAULT_FORWARDER_THREAD_NAME.to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delivery queue capacity
    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    /// Set the clear timeout in milliseconds
    pub fn with_clear_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.clear_timeout_ms = timeout_ms;
        self
    }

    /// Set the forwarding thread name
    pub fn with_forwarder_thread_name(mut self, name: impl Into<String>) -> Self {
        self.forwarder_thread_name = name.into();
        self
    }

    pub fn clear_timeout(&self) -> Duration {
        Duration::from_millis(self.clear_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.event_queue_capacity == 0 {
            return Err(BridgeError::config("event_queue_capacity must be greater than 0"));
        }
        if self.forwarder_thread_name.trim().is_empty() {
            return Err(BridgeError::config("forwarder_thread_name must not be empty"));
        }
        Ok(())
    }
}

/// Upper bound of the simulated packet loss
pub const MAX_PACKET_LOSS_PERCENT: u8 = 50;
/// Upper bound of the simulated latency
pub const MAX_LATENCY_MS: u64 = 1000;

/// Scripted call run by the sandbox harness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub app_id: String,
    pub channel_name: String,
    pub local_user_id: String,
    /// Number of remote users the loopback engine brings into the channel
    pub user_count: u32,
    /// Simulated packet loss, 0..=50
    pub packet_loss_percent: u8,
    /// Simulated one-way latency, 0..=1000 ms
    pub latency_ms: u64,
    /// Optional log file (stderr is always used)
    pub log_file_path: Option<String>,
    /// Apply latency and packet loss to the loopback engine
    pub enable_network_simulation: bool,
    /// How long the call stays up before leaving
    pub run_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            app_id: "sandbox-app".to_string(),
            channel_name: "sandbox-room".to_string(),
            local_user_id: "local".to_string(),
            user_count: 2,
            packet_loss_percent: 0,
            latency_ms: 0,
            log_file_path: None,
            enable_network_simulation: false,
            run_secs: 30,
        }
    }
}

impl SandboxConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SandboxConfig = serde_json::from_str(json)
            .map_err(|e| BridgeError::config(format!("invalid sandbox config: {}", e)))?;
        Ok(config.clamped())
    }

    /// Load from a file. A missing or empty file yields the defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Sandbox config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            warn!("Sandbox config {} is empty, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::from_json(&contents)
    }

    fn clamped(mut self) -> Self {
        if self.packet_loss_percent > MAX_PACKET_LOSS_PERCENT {
            warn!(
                "packet_loss_percent {} out of range, clamping to {}",
                self.packet_loss_percent, MAX_PACKET_LOSS_PERCENT
            );
            self.packet_loss_percent = MAX_PACKET_LOSS_PERCENT;
        }
        if self.latency_ms > MAX_LATENCY_MS {
            warn!(
                "latency_ms {} out of range, clamping to {}",
                self.latency_ms, MAX_LATENCY_MS
            );
            self.latency_ms = MAX_LATENCY_MS;
        }
        self
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run_secs)
    }
}
