//! Transport implementations shipped with this crate.
//!
//! The real WebRTC/tracker transport is an external library. Only the
//! in-memory dummy implementation lives here, behind the `dummy` feature.

#[cfg(feature = "dummy")]
pub mod dummy;

#[cfg(feature = "dummy")]
pub use dummy::DummyRoom;
#[cfg(feature = "dummy")]
pub use dummy::DummyTransport;
