//! Retransmission timer for handshake and teardown packets.

use std::time::Duration;

use tokio::time::Instant;

use crate::core::{MAX_RETRANSMIT_INTERVAL, RETRANSMIT_BACKOFF};

/// What the idle loop should do with the packet guarded by the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retransmit {
    /// Nothing due (or the timer is disarmed).
    Idle,
    /// Send the packet again.
    Fire,
    /// The retransmit budget is used up; give up on the peer.
    Exhausted,
}

/// Exponential-backoff retransmit timer.
///
/// Armed when a state starts waiting on the peer (REQUEST, PARTOPEN,
/// CLOSEREQ, CLOSING) and disarmed by every state change.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    /// Retransmits done since arming.
    count: u32,
    /// Retransmits allowed before giving up.
    max_retransmits: u32,
    /// Deadline of the next retransmit, if armed.
    next: Option<Instant>,
    /// Current interval (after backoff).
    interval: Duration,
}

impl Default for RetransmitTimer {
    fn default() -> Self {
        Self::disarmed()
    }
}

impl RetransmitTimer {
    /// Create a disarmed timer.
    pub fn disarmed() -> Self {
        Self {
            count: 0,
            max_retransmits: 0,
            next: None,
            interval: Duration::ZERO,
        }
    }

    /// Arm the timer: first retransmit due `interval` after `now`.
    pub fn arm(&mut self, now: Instant, interval: Duration, max_retransmits: u32) {
        let interval = interval.min(MAX_RETRANSMIT_INTERVAL);
        self.count = 0;
        self.max_retransmits = max_retransmits;
        self.interval = interval;
        self.next = Some(now + interval);
    }

    /// Stop the timer.
    pub fn disarm(&mut self) {
        self.count = 0;
        self.next = None;
    }

    /// Check if the timer is armed.
    pub fn is_armed(&self) -> bool {
        self.next.is_some()
    }

    /// Retransmits done since arming.
    pub fn retransmit_count(&self) -> u32 {
        self.count
    }

    /// Check the timer at `now`, recording a retransmit when one is due.
    pub fn poll(&mut self, now: Instant) -> Retransmit {
        let Some(next) = self.next else {
            return Retransmit::Idle;
        };
        if now < next {
            return Retransmit::Idle;
        }
        if self.count >= self.max_retransmits {
            self.next = None;
            return Retransmit::Exhausted;
        }

        self.count += 1;
        self.interval = (self.interval * RETRANSMIT_BACKOFF).min(MAX_RETRANSMIT_INTERVAL);
        self.next = Some(now + self.interval);
        Retransmit::Fire
    }
}
