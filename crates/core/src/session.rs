//! The live handle to one room membership.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use chrono::Utc;
use palaver_transport::core::transport::RoomRef;
use tokio::task::JoinHandle;

/// Timers owned by one session: the stability timer, both health-monitor
/// loops, the announce loop and any pending delayed attach. All of them are
/// aborted together on shutdown, so a sweep armed for an old session can
/// never act on its replacement.
#[derive(Default)]
pub struct TimerSet {
    handles: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl TimerSet {
    /// Track a timer task. If the set was already shut down the task is
    /// aborted immediately.
    pub fn arm(&self, handle: JoinHandle<()>) {
        if self.closed.load(Ordering::SeqCst) {
            handle.abort();
            return;
        }
        self.handles.lock().unwrap().push(handle);
    }

    /// Abort every tracked timer. Idempotent.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for handle in self.handles.lock().unwrap().drain(..) {
            handle.abort();
        }
    }

    /// Whether shutdown has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// One active room membership. Exclusively owned and mutated by the
/// lifecycle manager; monitors only read it and report back via callbacks.
pub struct Session {
    /// Live room handle from the transport.
    pub room: RoomRef,
    /// Room identifier this session was joined with.
    pub room_id: String,
    /// Room password, kept for reconnection.
    pub password: Option<String>,
    /// When the join succeeded, unix ms.
    pub created_at_ms: i64,
    stable: AtomicBool,
    /// Timers owned by this session.
    pub timers: TimerSet,
}

impl Session {
    /// Wrap a freshly joined room.
    pub fn new(room: RoomRef, room_id: String, password: Option<String>) -> Self {
        Self {
            room,
            room_id,
            password,
            created_at_ms: Utc::now().timestamp_millis(),
            stable: AtomicBool::new(false),
            timers: TimerSet::default(),
        }
    }

    /// Mark the session stable. Set once by the stability timer.
    pub fn mark_stable(&self) {
        self.stable.store(true, Ordering::SeqCst);
    }

    /// Whether the session has survived its grace period.
    pub fn is_stable(&self) -> bool {
        self.stable.load(Ordering::SeqCst)
    }

    /// Cancel every timer owned by this session. Idempotent; must run before
    /// a replacement session arms its own timers.
    pub fn shutdown(&self) {
        self.timers.shutdown();
    }
}
