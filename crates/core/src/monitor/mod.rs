//! Health monitor daemons.
//!
//! Both monitors run as periodic sweeps owned by the session they watch:
//! [PeerMonitor] pings every tracked peer and drops the ones silent past
//! the unresponsive timeout; [TrackerMonitor] classifies relay
//! connectedness and reports total tracker loss on a stable session as
//! connection loss. Monitors only read the session and report back through
//! the lifecycle manager; they never mutate it directly.

pub mod peer;
pub mod tracker;

pub use peer::PeerMonitor;
pub use tracker::TrackerMonitor;
