//! Configuration types for the signaling core

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for call and broadcast sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// How long a caller waits for the callee to pick up before the
    /// session ends with a no-answer result (default: 30000ms)
    pub ring_timeout_ms: u64,

    /// Grace window after a Disconnected/Failed link state before the
    /// session is torn down (default: 5000ms)
    pub disconnect_grace_ms: u64,

    /// Poll interval of the incoming-call watcher (default: 1000ms)
    pub watcher_poll_interval_ms: u64,

    /// Poll interval of the session-status check used to observe remote
    /// termination (default: 1000ms)
    pub status_poll_interval_ms: u64,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            ring_timeout_ms: 30_000,
            disconnect_grace_ms: 5_000,
            watcher_poll_interval_ms: 1_000,
            status_poll_interval_ms: 1_000,
        }
    }
}

impl CallConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `stun_servers` is empty
    /// - `ring_timeout_ms` is zero
    /// - `disconnect_grace_ms` is zero
    /// - any poll interval is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if self.ring_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "ring_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.disconnect_grace_ms == 0 {
            return Err(Error::InvalidConfig(
                "disconnect_grace_ms must be greater than zero".to_string(),
            ));
        }

        if self.watcher_poll_interval_ms == 0 || self.status_poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "poll intervals must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Ring timeout as a [`Duration`]
    pub fn ring_timeout(&self) -> Duration {
        Duration::from_millis(self.ring_timeout_ms)
    }

    /// Disconnect grace window as a [`Duration`]
    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }

    /// Watcher poll interval as a [`Duration`]
    pub fn watcher_poll_interval(&self) -> Duration {
        Duration::from_millis(self.watcher_poll_interval_ms)
    }

    /// Status poll interval as a [`Duration`]
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    /// Create a configuration preset with fast failure detection
    ///
    /// Best for LAN or test deployments where waiting the full defaults
    /// on a dead link is wasted time.
    ///
    /// # Example
    ///
    /// ```
    /// use peercall::config::CallConfig;
    ///
    /// let config = CallConfig::fast_failure_preset();
    /// assert!(config.validate().is_ok());
    /// assert_eq!(config.disconnect_grace_ms, 1000);
    /// ```
    pub fn fast_failure_preset() -> Self {
        Self {
            ring_timeout_ms: 10_000,
            disconnect_grace_ms: 1_000,
            watcher_poll_interval_ms: 250,
            status_poll_interval_ms: 250,
            ..Default::default()
        }
    }

    /// Add TURN servers to this configuration
    ///
    /// Useful for chaining with preset methods.
    pub fn with_turn_servers(mut self, turn_servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = turn_servers;
        self
    }
}
