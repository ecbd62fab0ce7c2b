//! Client configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::consts;
use crate::error::Error;
use crate::error::Result;
use crate::reconnect::BackoffPolicy;

/// Tuning knobs of the lifecycle core. Usually serialized as yaml; every
/// field falls back to the defaults in [consts](crate::consts).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Grace period before a session counts as stable, in ms.
    pub stability_grace_ms: u64,
    /// Interval between peer liveness sweeps, in ms.
    pub peer_sweep_interval_ms: u64,
    /// Silence threshold after which a peer is dropped from tracking, in ms.
    pub peer_timeout_ms: u64,
    /// Timeout of a single liveness ping, in ms.
    pub ping_timeout_ms: u64,
    /// Interval between tracker relay sweeps, in ms.
    pub tracker_sweep_interval_ms: u64,
    /// Interval between periodic presence announcements, in ms.
    pub announce_interval_ms: u64,
    /// Teardown-to-rejoin settle delay, in ms.
    pub settle_delay_ms: u64,
    /// Delay before attaching local streams to a fresh peer, in ms.
    pub stream_attach_delay_ms: u64,
    /// First reconnection backoff delay, in ms.
    pub backoff_base_delay_ms: u64,
    /// Multiplier applied to the backoff delay per attempt.
    pub backoff_factor: f64,
    /// Ceiling of the backoff delay, in ms.
    pub backoff_max_delay_ms: u64,
    /// Reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Presence payload broadcast to peers on announce (display name, public
    /// key and similar). Opaque to this core.
    pub profile: serde_json::Value,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stability_grace_ms: consts::STABILITY_GRACE_MS,
            peer_sweep_interval_ms: consts::PEER_SWEEP_INTERVAL_MS,
            peer_timeout_ms: consts::PEER_TIMEOUT_MS,
            ping_timeout_ms: consts::PING_TIMEOUT_MS,
            tracker_sweep_interval_ms: consts::TRACKER_SWEEP_INTERVAL_MS,
            announce_interval_ms: consts::ANNOUNCE_INTERVAL_MS,
            settle_delay_ms: consts::SETTLE_DELAY_MS,
            stream_attach_delay_ms: consts::STREAM_ATTACH_DELAY_MS,
            backoff_base_delay_ms: consts::BACKOFF_BASE_DELAY_MS,
            backoff_factor: consts::BACKOFF_FACTOR,
            backoff_max_delay_ms: consts::BACKOFF_MAX_DELAY_MS,
            max_reconnect_attempts: consts::MAX_RECONNECT_ATTEMPTS,
            profile: serde_json::Value::Null,
        }
    }
}

impl ClientConfig {
    /// Grace period before a session counts as stable.
    pub fn stability_grace(&self) -> Duration {
        Duration::from_millis(self.stability_grace_ms)
    }

    /// Interval between peer liveness sweeps.
    pub fn peer_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.peer_sweep_interval_ms)
    }

    /// Timeout of a single liveness ping.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Interval between tracker relay sweeps.
    pub fn tracker_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.tracker_sweep_interval_ms)
    }

    /// Interval between periodic presence announcements.
    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }

    /// Teardown-to-rejoin settle delay.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Delay before attaching local streams to a fresh peer.
    pub fn stream_attach_delay(&self) -> Duration {
        Duration::from_millis(self.stream_attach_delay_ms)
    }

    /// The reconnection backoff policy derived from this config.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(self.backoff_base_delay_ms),
            factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.backoff_max_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

impl FromStr for ClientConfig {
    type Err = Error;

    /// Reveal config from serialized string.
    fn from_str(ser: &str) -> Result<Self> {
        serde_yaml::from_str::<ClientConfig>(ser).map_err(Error::SerdeYamlError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_consts() {
        let config = ClientConfig::default();
        assert_eq!(config.stability_grace(), Duration::from_secs(10));
        assert_eq!(config.peer_timeout_ms, 30_000);
        assert_eq!(config.backoff().max_attempts, 5);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ClientConfig::from_str("peer_timeout_ms: 5000\nmax_reconnect_attempts: 2\n")
            .unwrap();
        assert_eq!(config.peer_timeout_ms, 5000);
        assert_eq!(config.max_reconnect_attempts, 2);
        assert_eq!(config.ping_timeout_ms, 8000);
    }
}
