//! Reconnection backoff policy and the scheduler that owns the single
//! pending retry timer.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::client::RoomClient;
use crate::consts;

/// Exponential backoff with a ceiling. Deliberately unjittered: with the
/// defaults the delay sequence is 2000, 3000, 4500, 6750, 10125 ms.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay of the first attempt.
    pub base_delay: Duration,
    /// Multiplier applied per attempt.
    pub factor: f64,
    /// Ceiling of the computed delay.
    pub max_delay: Duration,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(consts::BACKOFF_BASE_DELAY_MS),
            factor: consts::BACKOFF_FACTOR,
            max_delay: Duration::from_millis(consts::BACKOFF_MAX_DELAY_MS),
            max_attempts: consts::MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given attempt. Attempts are counted from 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let ms = self.base_delay.as_millis() as f64 * self.factor.powi(exponent);
        let ms = ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(ms as u64)
    }

    /// Whether the given attempt count has used up the budget.
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts > self.max_attempts
    }
}

/// The join parameters needed to retry without caller involvement.
#[derive(Debug, Clone)]
pub(crate) struct JoinParams {
    pub room_id: String,
    pub password: Option<String>,
}

#[derive(Default)]
struct ReconnectState {
    attempts: u32,
    pending: Option<JoinHandle<()>>,
    params: Option<JoinParams>,
}

/// Owns the reconnection attempt counter and the single pending retry timer.
/// Scheduling a new timer always cancels any existing one; retries re-enter
/// through a fresh timer task, never through synchronous recursion.
pub struct ReconnectScheduler {
    policy: BackoffPolicy,
    state: Mutex<ReconnectState>,
    /// The mutual-exclusion point preventing duplicate reconnection attempts.
    in_flight: AtomicBool,
}

impl ReconnectScheduler {
    /// Create a scheduler with the given policy.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(ReconnectState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// The configured policy.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Remember the parameters of the latest explicit join.
    pub(crate) fn record_params(&self, params: JoinParams) {
        self.state.lock().unwrap().params = Some(params);
    }

    /// Whether a join has ever recorded its parameters.
    pub fn has_params(&self) -> bool {
        self.state.lock().unwrap().params.is_some()
    }

    /// Consecutive failed attempts so far.
    pub fn attempts(&self) -> u32 {
        self.state.lock().unwrap().attempts
    }

    /// Reset the attempt counter. Runs when a join succeeds and on manual
    /// force-reconnect.
    pub fn reset_attempts(&self) {
        self.state.lock().unwrap().attempts = 0;
    }

    /// Whether a reconnection is currently in flight.
    pub fn is_reconnecting(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Enter the reconnecting state. Returns false if one is already in
    /// flight, in which case the caller must back off.
    pub(crate) fn try_begin(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Leave the reconnecting state.
    pub(crate) fn finish(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Abort the pending retry timer, if any.
    pub(crate) fn cancel_pending(&self) {
        if let Some(handle) = self.state.lock().unwrap().pending.take() {
            handle.abort();
        }
    }

    /// Forget the pending timer handle once it has fired.
    pub(crate) fn clear_fired_timer(&self) {
        self.state.lock().unwrap().pending = None;
    }

    /// Whether a retry timer is currently armed.
    pub fn has_pending_timer(&self) -> bool {
        self.state.lock().unwrap().pending.is_some()
    }

    /// Arm the next retry. Returns false when nothing was scheduled: either
    /// no join parameters are recorded, or the attempt budget is used up, in
    /// which case the client runs its final forced cleanup.
    pub(crate) fn schedule(&self, client: &RoomClient) -> bool {
        let mut state = self.state.lock().unwrap();

        let Some(params) = state.params.clone() else {
            tracing::warn!("no join parameters recorded, not scheduling reconnection");
            drop(state);
            self.finish();
            return false;
        };

        state.attempts += 1;
        let attempt = state.attempts;

        if self.policy.exhausted(attempt) {
            drop(state);
            tracing::error!(
                "giving up reconnection after {} attempts",
                self.policy.max_attempts
            );
            if let Some(client) = client.self_ref.upgrade() {
                tokio::spawn(async move {
                    client.give_up().await;
                });
            }
            return false;
        }

        let delay = self.policy.delay_for(attempt);
        tracing::info!(
            "scheduling reconnection attempt {}/{} in {:?}",
            attempt,
            self.policy.max_attempts,
            delay
        );

        // Single-timer invariant: replacing always cancels, never stacks.
        if let Some(previous) = state.pending.take() {
            previous.abort();
        }

        let weak = client.self_ref.clone();
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(client) = weak.upgrade() {
                client.retry_join(params).await;
            }
        }));

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delay_sequence() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (1..=6).map(|a| policy.delay_for(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![2000, 3000, 4500, 6750, 10125, 15187]);
    }

    #[test]
    fn test_delay_is_monotone_and_capped() {
        let policy = BackoffPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..30 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous);
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
        assert_eq!(policy.delay_for(20), policy.max_delay);
    }

    #[test]
    fn test_exhaustion_boundary() {
        let policy = BackoffPolicy::default();
        assert!(!policy.exhausted(5));
        assert!(policy.exhausted(6));
    }
}
