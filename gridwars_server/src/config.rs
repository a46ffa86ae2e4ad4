// Server configuration.
//
// `ServerConfig` holds every tunable the node needs: where the switch lives,
// how to register with it, and the periods of the various timers. It is
// loaded from an optional JSON file (missing fields fall back to defaults via
// `#[serde(default)]`) and then overridden by command-line flags in
// `main.rs`.
//
// The mailbox TTL and the mailbox sweep interval are deliberately separate
// values: an entry lives for `mailbox_ttl_ms` after creation, and the sweep
// that notices expired entries runs every `purge_interval_ms`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Runtime configuration for the game server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` of the switch relay.
    pub switch_addr: String,
    /// Service name sent in the REGISTER frame.
    pub service_name: String,
    /// Service key sent in the REGISTER frame.
    pub service_key: String,
    /// Period of the CHALLENGE (match scheduling) tick.
    pub challenge_interval_ms: u64,
    /// Period of the CLEAN_OUTPUT (mailbox sweep) tick.
    pub purge_interval_ms: u64,
    /// Lifetime of a mailbox entry, fixed at creation.
    pub mailbox_ttl_ms: u64,
    /// Response deadline attached to GAME_INITIALIZE and ACTION_REQUEST.
    pub action_timeout_ms: u64,
    /// Period of the SERVER_PING heartbeat.
    pub heartbeat_interval_ms: u64,
    /// Delay between a lost connection and the next connection attempt.
    pub reconnect_backoff_ms: u64,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            switch_addr: "127.0.0.1:3000".into(),
            service_name: "PUBLIC_CONNECT_FOUR".into(),
            service_key: "123456".into(),
            challenge_interval_ms: 60_000,
            purge_interval_ms: 5_000,
            mailbox_ttl_ms: 10_000,
            action_timeout_ms: 5_000,
            heartbeat_interval_ms: 20_000,
            reconnect_backoff_ms: 5_000,
            log_filter: "info".into(),
        }
    }
}

impl ServerConfig {
    /// Parse a JSON config document. Unspecified fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ServerError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Payload of the REGISTER frame.
    pub fn registration(&self) -> String {
        format!("{}:{}", self.service_name, self.service_key)
    }

    pub fn challenge_interval(&self) -> Duration {
        Duration::from_millis(self.challenge_interval_ms)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_millis(self.purge_interval_ms)
    }

    pub fn mailbox_ttl(&self) -> Duration {
        Duration::from_millis(self.mailbox_ttl_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}
