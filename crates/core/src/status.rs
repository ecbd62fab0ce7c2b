//! Connection status and tracker quality classification.

use palaver_transport::core::transport::RelayStatus;
use serde::Deserialize;
use serde::Serialize;

/// Lifecycle state of the room connection.
///
/// `Disconnected` and `Failed` are terminal until a new explicit join call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No session, none being established.
    Disconnected,
    /// A join call is in flight.
    Connecting,
    /// Joined, still within the stability grace period.
    Connected,
    /// Joined and past the grace period of uninterrupted connection.
    Stable,
    /// Connection lost, automatic recovery in progress.
    Reconnecting,
    /// Automatic recovery gave up.
    Failed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Stable => "stable",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Aggregate quality of the tracker relay set, classified by the fraction of
/// relays currently connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerQuality {
    /// At least 80% of relays connected.
    Excellent,
    /// At least 60% connected.
    Good,
    /// At least 30% connected.
    Fair,
    /// Below 30% connected.
    Poor,
    /// No relays configured, or no data yet.
    Unknown,
}

impl TrackerQuality {
    /// Classify from connected/total counts.
    pub fn from_counts(connected: usize, total: usize) -> Self {
        if total == 0 {
            return Self::Unknown;
        }

        let ratio = connected as f64 / total as f64;
        if ratio >= 0.8 {
            Self::Excellent
        } else if ratio >= 0.6 {
            Self::Good
        } else if ratio >= 0.3 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    /// Classify a freshly queried relay status list.
    pub fn from_statuses(statuses: &[RelayStatus]) -> Self {
        let connected = statuses.iter().filter(|s| s.connected).count();
        Self::from_counts(connected, statuses.len())
    }
}

impl std::fmt::Display for TrackerQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
