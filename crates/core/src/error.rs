//! Error of palaver-core

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in palaver-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The transport could not be initialized at all. Fatal to the whole
    /// session attempt, surfaced immediately and never retried.
    #[error("Transport initialization failed: {0}")]
    TransportInit(String),

    /// Joining the room failed at the signaling layer. Recoverable through
    /// the reconnection policy.
    #[error("Failed to join room: {0}")]
    Join(#[from] palaver_transport::error::Error),

    /// Automatic recovery gave up after the configured number of attempts.
    /// A new explicit join is required.
    #[error("Reconnection attempts exhausted after {0} tries")]
    MaxRetriesExceeded(u32),

    /// A stream could not be attached or detached. Non-fatal to the session.
    #[error("Failed to attach stream: {0}")]
    StreamAttach(String),

    /// An operation that needs a live session was called without one.
    #[error("No active session")]
    NotJoined,

    /// Serde yaml error
    #[error("Serde yaml error: {0}")]
    SerdeYamlError(#[from] serde_yaml::Error),

    /// An unknown logging level string was supplied.
    #[error("Invalid logging level: {0}")]
    InvalidLoggingLevel(String),
}
