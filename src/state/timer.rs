//! Single shared countdown stored as an absolute deadline.
//!
//! Observers derive the remaining time from `ends_at - now`, so any client
//! that knows the server clock offset renders the same countdown without a
//! decrementing counter drifting apart.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::rejection::Rejection;

/// Shortest accepted countdown, in seconds.
pub const MIN_TIMER_SECS: u32 = 1;
/// Longest accepted countdown, in seconds.
pub const MAX_TIMER_SECS: u32 = 999;

/// Persisted countdown state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct TimerState {
    /// Absolute expiry instant while running.
    pub ends_at: Option<u64>,
    /// Length of the countdown as originally started.
    pub duration_sec: u32,
    /// Seconds left when the countdown was stopped.
    pub paused_remaining_sec: u32,
    /// Instant of the last natural expiry.
    pub last_expired_at: Option<u64>,
}

impl TimerState {
    /// Start a fresh countdown and return its expiry instant.
    pub fn start(&mut self, seconds: u32, now: u64) -> u64 {
        let seconds = seconds.clamp(MIN_TIMER_SECS, MAX_TIMER_SECS);
        let ends_at = now + u64::from(seconds) * 1_000;
        *self = Self {
            ends_at: Some(ends_at),
            duration_sec: seconds,
            paused_remaining_sec: 0,
            last_expired_at: None,
        };
        ends_at
    }

    /// Freeze a running countdown. Returns `false` when nothing was running.
    pub fn stop(&mut self, now: u64) -> bool {
        if self.check_expiry(now) {
            return false;
        }
        let Some(ends_at) = self.ends_at.take() else {
            return false;
        };
        self.paused_remaining_sec = (ends_at - now).div_ceil(1_000) as u32;
        true
    }

    /// Continue a stopped countdown from its frozen remainder.
    pub fn resume(&mut self, now: u64) -> Result<u64, Rejection> {
        if self.ends_at.is_some() || self.paused_remaining_sec == 0 {
            return Err(Rejection::TimerNotPaused);
        }
        let ends_at = now + u64::from(self.paused_remaining_sec) * 1_000;
        self.ends_at = Some(ends_at);
        self.paused_remaining_sec = 0;
        Ok(ends_at)
    }

    /// Forget everything about the countdown.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether the countdown is ticking at `now`.
    pub fn is_running(&self, now: u64) -> bool {
        self.ends_at.is_some_and(|ends_at| ends_at > now)
    }

    /// Milliseconds left, frozen while stopped, never negative.
    pub fn remaining_ms(&self, now: u64) -> u64 {
        match self.ends_at {
            Some(ends_at) => ends_at.saturating_sub(now),
            None => u64::from(self.paused_remaining_sec) * 1_000,
        }
    }

    /// Record a natural expiry if the deadline has passed.
    pub fn check_expiry(&mut self, now: u64) -> bool {
        match self.ends_at {
            Some(ends_at) if ends_at <= now => {
                self.ends_at = None;
                self.last_expired_at = Some(ends_at);
                true
            }
            _ => false,
        }
    }

    /// Instant the countdown expired, including a deadline the tick has not seen yet.
    pub fn expired_at(&self, now: u64) -> Option<u64> {
        self.ends_at
            .filter(|ends_at| *ends_at <= now)
            .or(self.last_expired_at)
    }

    /// Whether a late action still falls inside the post-expiry grace window.
    pub fn accepts_action(&self, now: u64, grace_ms: u64) -> bool {
        match self.expired_at(now) {
            Some(expired_at) => now <= expired_at + grace_ms,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_clamps_duration() {
        let mut timer = TimerState::default();
        assert_eq!(timer.start(0, 1_000), 2_000);
        assert_eq!(timer.duration_sec, 1);
        timer.start(5_000, 0);
        assert_eq!(timer.duration_sec, MAX_TIMER_SECS);
    }

    #[test]
    fn stop_then_resume_preserves_elapsed_time() {
        let mut timer = TimerState::default();
        timer.start(30, 0);

        assert!(timer.stop(10_400));
        assert_eq!(timer.paused_remaining_sec, 20);
        assert_eq!(timer.ends_at, None);
        assert_eq!(timer.remaining_ms(50_000), 20_000);

        let ends_at = timer.resume(60_000).unwrap();
        assert_eq!(ends_at, 80_000);
        assert_eq!(timer.duration_sec, 30);
        // total elapsed is 10.4s + 20s, one tick away from the original 30s
        let elapsed = 10_400 + (ends_at - 60_000);
        assert!(elapsed.abs_diff(30_000) < 1_000);
    }

    #[test]
    fn resume_requires_paused_remainder() {
        let mut timer = TimerState::default();
        assert_eq!(timer.resume(0), Err(Rejection::TimerNotPaused));
        timer.start(10, 0);
        assert_eq!(timer.resume(1_000), Err(Rejection::TimerNotPaused));
    }

    #[test]
    fn remaining_is_never_negative() {
        let mut timer = TimerState::default();
        timer.start(1, 0);
        assert_eq!(timer.remaining_ms(500), 500);
        assert_eq!(timer.remaining_ms(5_000), 0);
    }

    #[test]
    fn stop_after_deadline_counts_as_expiry() {
        let mut timer = TimerState::default();
        timer.start(2, 0);
        assert!(!timer.stop(3_000));
        assert_eq!(timer.last_expired_at, Some(2_000));
        assert_eq!(timer.paused_remaining_sec, 0);
    }

    #[test]
    fn grace_window_applies_after_expiry() {
        let mut timer = TimerState::default();
        assert!(timer.accepts_action(0, 500));

        timer.start(1, 0);
        assert!(timer.accepts_action(900, 500));
        // deadline passed but the tick has not run yet
        assert!(timer.accepts_action(1_400, 500));
        assert!(!timer.accepts_action(1_600, 500));

        assert!(timer.check_expiry(1_700));
        assert_eq!(timer.last_expired_at, Some(1_000));
        assert!(!timer.accepts_action(1_700, 500));
    }
}
