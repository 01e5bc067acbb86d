//! Acceptable sequence- and acknowledgement-number windows.
//!
//! The bounds decide which inbound packets count as synchronised; anything
//! outside them triggers Sync recovery. They are a per-connection policy so a
//! deployment can tune how eagerly desynchronisation is declared.

use std::fmt::Debug;

use crate::core::DEFAULT_SEQUENCE_WINDOW;
use crate::header::seqno::{seq_add, seq_max};

/// Policy computing the valid sequence and acknowledgement windows.
pub trait SequenceWindow: Debug + Send + Sync + 'static {
    /// `(SWL, SWH)` given the greatest sequence number received and the
    /// initial sequence number received.
    fn seq_window(&self, gsr: u64, isr: u64) -> (u64, u64);

    /// `(AWL, AWH)` given the greatest sequence number sent and the initial
    /// sequence number sent.
    fn ack_window(&self, gss: u64, iss: u64) -> (u64, u64);
}

/// Largest width the Sequence Window feature allows.
pub const MAX_SEQUENCE_WINDOW: u64 = 1 << 46;

/// The Sequence Window feature of RFC 4340 §7.5.1 with a single width for
/// both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindow {
    width: u64,
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_SEQUENCE_WINDOW)
    }
}

impl SlidingWindow {
    /// Create a window of the given width, clamped to
    /// `4..=MAX_SEQUENCE_WINDOW`.
    pub fn new(width: u64) -> Self {
        Self {
            width: width.clamp(4, MAX_SEQUENCE_WINDOW),
        }
    }

    /// Window width.
    pub fn width(&self) -> u64 {
        self.width
    }
}

impl SequenceWindow for SlidingWindow {
    fn seq_window(&self, gsr: u64, isr: u64) -> (u64, u64) {
        let w = self.width as i64;
        let swl = seq_max(seq_add(gsr, 1 - w / 4), isr);
        let swh = seq_add(gsr, 1 + 3 * w / 4);
        (swl, swh)
    }

    fn ack_window(&self, gss: u64, iss: u64) -> (u64, u64) {
        let w = self.width as i64;
        let awl = seq_max(seq_add(gss, 1 - w), iss);
        (awl, gss)
    }
}
