//! Constant variables.

/// Grace period of uninterrupted connection before a session is considered
/// stable, in ms.
pub const STABILITY_GRACE_MS: u64 = 10 * 1000;
/// Interval between peer liveness sweeps, in ms.
pub const PEER_SWEEP_INTERVAL_MS: u64 = 15 * 1000;
/// A peer silent for longer than this is dropped from liveness tracking, in ms.
pub const PEER_TIMEOUT_MS: u64 = 30 * 1000;
/// Timeout of a single liveness ping, in ms.
pub const PING_TIMEOUT_MS: u64 = 8 * 1000;
/// Interval between tracker relay sweeps, in ms.
pub const TRACKER_SWEEP_INTERVAL_MS: u64 = 10 * 1000;
/// Interval between periodic presence announcements, in ms.
pub const ANNOUNCE_INTERVAL_MS: u64 = 30 * 1000;
/// Delay between tearing a session down and joining again, letting the old
/// signaling state drain so peers do not see duplicate identities, in ms.
pub const SETTLE_DELAY_MS: u64 = 100;
/// Delay before attaching local streams to a freshly joined peer, in ms.
pub const STREAM_ATTACH_DELAY_MS: u64 = 250;
/// First reconnection backoff delay, in ms.
pub const BACKOFF_BASE_DELAY_MS: u64 = 2000;
/// Multiplier applied to the backoff delay per attempt.
pub const BACKOFF_FACTOR: f64 = 1.5;
/// Ceiling of the backoff delay, in ms.
pub const BACKOFF_MAX_DELAY_MS: u64 = 30 * 1000;
/// Reconnection attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
