#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod builder;
pub mod callback;
pub mod client;
pub mod config;
pub mod consts;
pub mod error;
pub mod inspect;
pub mod logging;
pub mod monitor;
pub mod peers;
pub mod reconnect;
pub mod session;
pub mod status;
pub mod streams;

pub use builder::ClientBuilder;
pub use callback::ClientCallback;
pub use client::RoomClient;
pub use config::ClientConfig;
pub use error::Error;
pub use error::Result;
pub use inspect::ClientInspect;
pub use status::ConnectionStatus;
pub use status::TrackerQuality;
/// The transport seam this core drives.
pub use palaver_transport as transport;
