//! Offer clock — passive response-window countdown for one stage.
//!
//! The clock is a pure function of its start time, accumulated paused
//! time and the `now` the caller passes in. It never fires on its own;
//! the runner checks expiry whenever it is ticked.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use tender_core::time::minutes;
use tender_core::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferClock {
    started_at: Timestamp,
    window: Duration,
    /// Paused time from completed pause/resume cycles.
    paused_total: Duration,
    /// Set while the clock is paused.
    paused_at: Option<Timestamp>,
}

impl OfferClock {
    /// Open a clock for a response window of `window_mins` minutes.
    pub fn start(window_mins: u32, now: Timestamp) -> Self {
        Self {
            started_at: now,
            window: minutes(u64::from(window_mins)),
            paused_total: Duration::ZERO,
            paused_at: None,
        }
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Total time spent paused, including an in-progress pause.
    pub fn paused_total(&self, now: Timestamp) -> Duration {
        match self.paused_at {
            Some(at) => self.paused_total + now.since(at),
            None => self.paused_total,
        }
    }

    /// Active (unpaused) time since the clock started.
    pub fn elapsed(&self, now: Timestamp) -> Duration {
        now.since(self.started_at)
            .saturating_sub(self.paused_total(now))
    }

    pub fn remaining(&self, now: Timestamp) -> Duration {
        self.window.saturating_sub(self.elapsed(now))
    }

    /// True once the whole window has been spent. Never true while paused
    /// unless the window was already spent before the pause.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.elapsed(now) >= self.window
    }

    /// Absolute expiry instant, assuming no further pauses.
    pub fn deadline(&self, now: Timestamp) -> Timestamp {
        match self.paused_at {
            Some(_) => now + self.remaining(now),
            None => self.started_at + self.window + self.paused_total,
        }
    }

    /// Freeze the countdown. No-op if already paused.
    pub fn pause(&mut self, now: Timestamp) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    /// Resume the countdown, excluding the paused span. No-op if running.
    pub fn resume(&mut self, now: Timestamp) {
        if let Some(at) = self.paused_at.take() {
            self.paused_total += now.since(at);
        }
    }
}
