//! A UDP data broker for agent simulations.
//!
//! Many producer processes fire mutation and query datagrams at one bound
//! socket; the broker serializes them through a single executor against a
//! shared store, so producers never race on it. Flow control is advisory:
//! when the internal queue fills past a watermark the broker asks noisy
//! senders to pause, and tells registered listeners to continue once it
//! drains.

pub mod broker;
pub mod client;
pub mod error;
mod filter;
pub mod flow;
pub mod protocol;
pub mod store;
pub mod translate;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use broker::{Broker, BrokerState};
pub use client::{send_request, ControlListener, Producer};
pub use error::{Error, ProtocolError, Result, StoreError, TranslationError};
pub use filter::Filter;
pub use protocol::{Command, ControlMessage, ReplyRow, Request};
pub use store::{MemoryStore, Store};

/// Configuration for a broker instance.
///
/// Defaults follow the reference deployment. Unknown or missing keys in a
/// config file fall back to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Host the request socket binds to.
    pub host: String,
    /// Port the request socket binds to; 0 lets the OS pick one.
    pub port: u16,
    /// Receive buffer size, the upper bound on request datagram size.
    pub buffer_size: usize,
    /// Expected queue depth, the denominator for the flow-control
    /// watermarks. Not an enforced limit.
    pub expected_queue_len: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2345,
            buffer_size: 10240,
            expected_queue_len: 1000,
        }
    }
}

impl BrokerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&text).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the effective configuration as a JSON summary, for run
    /// provenance.
    pub fn write_summary(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::InvalidConfig("buffer size cannot be zero".into()));
        }
        if self.expected_queue_len == 0 {
            return Err(Error::InvalidConfig(
                "expected queue length cannot be zero".into(),
            ));
        }
        Ok(())
    }
}

/// A snapshot of the broker's operation.
#[derive(Debug, Clone)]
pub struct BrokerStats {
    /// Current depth of the internal queue.
    pub queue_depth: usize,
    /// Number of registered notification listeners.
    pub registered_listeners: usize,
    /// Datagrams received, valid or not.
    pub requests_received: u64,
    /// Datagrams dropped as malformed or untranslatable.
    pub requests_dropped: u64,
    /// Operations the executor applied successfully.
    pub operations_applied: u64,
    /// Select reply rows sent.
    pub replies_sent: u64,
    /// Pause notifications sent to producers.
    pub pauses_sent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_reference() {
        let config = BrokerConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 2345);
        assert_eq!(config.buffer_size, 10240);
        assert_eq!(config.expected_queue_len, 1000);
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = std::env::temp_dir().join("simbroker_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");

        let mut config = BrokerConfig::default();
        config.port = 0;
        config.expected_queue_len = 64;
        config.write_summary(&path).unwrap();

        let loaded = BrokerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.port, 0);
        assert_eq!(loaded.expected_queue_len, 64);
        assert_eq!(loaded.buffer_size, config.buffer_size);
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: BrokerConfig = serde_json::from_str(r#"{"port": 9999}"#).unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.expected_queue_len, 1000);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = BrokerConfig {
            expected_queue_len: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig(_))
        ));
    }
}
