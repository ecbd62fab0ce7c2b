#![allow(missing_docs)]

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum RelayUrlError {
    #[error("Url parse error")]
    UrlParse(#[from] url::ParseError),

    #[error("Relay scheme {0} has not supported yet")]
    SchemeNotSupported(String),

    #[error("Cannot extract host from url")]
    UrlMissHost,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("Relay url error: {0}")]
    RelayUrl(#[from] RelayUrlError),

    #[error("Ping to peer {0} timed out")]
    PingTimeout(String),

    #[error("Peer {0} not found in room")]
    PeerNotFound(String),

    #[error("Room {0} already joined")]
    RoomAlreadyJoined(String),

    #[error("Room has already been left")]
    RoomClosed,

    #[error("Failed to attach stream: {0}")]
    StreamAttach(String),

    #[error("JSON serialization error")]
    Serialize(#[source] serde_json::Error),
}
