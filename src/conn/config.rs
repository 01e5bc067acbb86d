//! Connection configuration.

use std::sync::Arc;
use std::time::Duration;

use super::window::{SequenceWindow, SlidingWindow};
use crate::core::{DEFAULT_INBOUND_QUEUE, HANDSHAKE_TIMEOUT, MAX_RETRANSMITS, TIME_WAIT};

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct ConnConfig {
    /// Name used in log spans.
    pub name: String,

    /// Port stamped into outbound headers as the source.
    pub source_port: u16,

    /// Port stamped into outbound headers as the destination.
    pub dest_port: u16,

    /// Service code a client requests. Servers echo the client's.
    pub service_code: u32,

    /// Acceptable sequence/ack window policy.
    pub window: Arc<dyn SequenceWindow>,

    /// Time spent in TIMEWAIT before CLOSED.
    pub time_wait: Duration,

    /// Longest a connection may stay in REQUEST or RESPOND.
    pub handshake_timeout: Duration,

    /// Retransmissions of Request, Ack, CloseReq or Close before giving up.
    pub max_retransmits: u32,

    /// Delivered segments buffered for `read_segment`.
    pub inbound_queue: usize,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            name: "conn".to_string(),
            source_port: 0,
            dest_port: 0,
            service_code: 0,
            window: Arc::new(SlidingWindow::default()),
            time_wait: TIME_WAIT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            max_retransmits: MAX_RETRANSMITS,
            inbound_queue: DEFAULT_INBOUND_QUEUE,
        }
    }
}

/// Builder for [`ConnConfig`].
#[derive(Debug, Default)]
pub struct ConnConfigBuilder {
    config: ConnConfig,
}

impl ConnConfigBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set source and destination ports.
    pub fn ports(mut self, source: u16, dest: u16) -> Self {
        self.config.source_port = source;
        self.config.dest_port = dest;
        self
    }

    /// Set the service code.
    pub fn service_code(mut self, code: u32) -> Self {
        self.config.service_code = code;
        self
    }

    /// Set the sequence window policy.
    pub fn window(mut self, window: impl SequenceWindow) -> Self {
        self.config.window = Arc::new(window);
        self
    }

    /// Set the TIMEWAIT duration.
    pub fn time_wait(mut self, time_wait: Duration) -> Self {
        self.config.time_wait = time_wait;
        self
    }

    /// Set the handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the maximum number of retransmissions.
    pub fn max_retransmits(mut self, max: u32) -> Self {
        self.config.max_retransmits = max;
        self
    }

    /// Set the inbound segment queue length (at least 1).
    pub fn inbound_queue(mut self, len: usize) -> Self {
        self.config.inbound_queue = len.max(1);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ConnConfig {
        self.config
    }
}
