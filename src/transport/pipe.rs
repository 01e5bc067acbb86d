//! In-memory half-connection pair.
//!
//! Each direction is a delivery line: headers enter with a timestamp, a line
//! task holds each one for the configured latency and then offers it to the
//! peer's bounded inbound queue. Order is preserved; a full queue drops, like
//! a datagram socket buffer.

use std::future::{Future, pending};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::trace;

use crate::core::{DEFAULT_PMTU, HEADER_OVERHEAD, HalfConn, TransportError, TransportResult};
use crate::header::Header;

/// Default one-way latency.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(1);

/// Default inbound queue length per end.
pub const DEFAULT_PIPE_CAPACITY: usize = 256;

/// Pipe settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeConfig {
    /// One-way latency of each delivery line.
    pub latency: Duration,
    /// MTU reported by both ends; larger headers are dropped.
    pub mtu: i32,
    /// Inbound queue length per end.
    pub capacity: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            latency: DEFAULT_LATENCY,
            mtu: DEFAULT_PMTU,
            capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

/// Builder for a connected pair of [`PipeEnd`]s.
#[derive(Debug, Clone, Default)]
pub struct PipeBuilder {
    config: PipeConfig,
}

impl PipeBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the one-way latency.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.config.latency = latency;
        self
    }

    /// Set the MTU.
    pub fn mtu(mut self, mtu: i32) -> Self {
        self.config.mtu = mtu;
        self
    }

    /// Set the inbound queue length (at least 1).
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity.max(1);
        self
    }

    /// Create the pair. Must be called inside a tokio runtime.
    pub fn build(self) -> (PipeEnd, PipeEnd) {
        let config = self.config;
        let (a_in_tx, a_in_rx) = mpsc::channel(config.capacity);
        let (b_in_tx, b_in_rx) = mpsc::channel(config.capacity);
        let a = PipeEnd::new(config, a_in_rx, spawn_line(config.latency, b_in_tx));
        let b = PipeEnd::new(config, b_in_rx, spawn_line(config.latency, a_in_tx));
        (a, b)
    }
}

/// Create a pipe with default settings.
pub fn pipe() -> (PipeEnd, PipeEnd) {
    PipeBuilder::new().build()
}

type Line = mpsc::UnboundedSender<(Instant, Header)>;

fn spawn_line(latency: Duration, peer: mpsc::Sender<Header>) -> Line {
    let (tx, mut rx) = mpsc::unbounded_channel::<(Instant, Header)>();
    tokio::spawn(async move {
        while let Some((sent, h)) = rx.recv().await {
            tokio::time::sleep_until(sent + latency).await;
            if peer.try_send(h).is_err() {
                trace!(event = "drop", "pipe queue full");
            }
        }
    });
    tx
}

/// One end of an in-memory pipe.
#[derive(Debug)]
pub struct PipeEnd {
    config: PipeConfig,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Header>>,
    line: Mutex<Option<Line>>,
    read_expire: Mutex<Option<Duration>>,
    closed: watch::Sender<bool>,
}

impl PipeEnd {
    fn new(config: PipeConfig, inbound: mpsc::Receiver<Header>, line: Line) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            config,
            inbound: tokio::sync::Mutex::new(inbound),
            line: Mutex::new(Some(line)),
            read_expire: Mutex::new(None),
            closed,
        }
    }

    /// Pipe settings.
    pub fn config(&self) -> &PipeConfig {
        &self.config
    }

    /// Check if this end was closed.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl HalfConn for PipeEnd {
    async fn read(&self) -> TransportResult<Header> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(TransportError::Closed);
        }
        let expire = *self
            .read_expire
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let recv = async {
            let mut inbound = self.inbound.lock().await;
            match inbound.recv().await {
                Some(h) => h,
                // The peer is gone: nothing more will ever arrive.
                None => pending().await,
            }
        };
        let read = async {
            match expire {
                Some(expire) => tokio::time::timeout(expire, recv)
                    .await
                    .map_err(|_| TransportError::Timeout),
                None => Ok(recv.await),
            }
        };

        tokio::select! {
            result = read => result,
            _ = closed.changed() => Err(TransportError::Closed),
        }
    }

    fn set_read_expire(&self, timeout: Duration) -> TransportResult<()> {
        if timeout.is_zero() {
            return Err(TransportError::BadDeadline(timeout));
        }
        *self
            .read_expire
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(timeout);
        Ok(())
    }

    fn mtu(&self) -> i32 {
        self.config.mtu
    }

    async fn send(&self, h: Header) -> TransportResult<()> {
        let line = self.line.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(line) = line.as_ref() else {
            return Err(TransportError::Closed);
        };
        let size = i32::try_from(h.data.len())
            .unwrap_or(i32::MAX)
            .saturating_add(HEADER_OVERHEAD);
        if size > self.config.mtu {
            trace!(event = "drop", header = %h, size, "exceeds pipe MTU");
            return Ok(());
        }
        if line.send((Instant::now(), h)).is_err() {
            trace!(event = "drop", "pipe line gone");
        }
        Ok(())
    }

    fn close(&self) -> TransportResult<()> {
        self.closed.send_replace(true);
        // Queued headers still go out; the line task exits after them.
        self.line
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

/// Shared pipe end, for tests that drive one side by hand.
impl HalfConn for Arc<PipeEnd> {
    fn read(&self) -> impl Future<Output = TransportResult<Header>> + Send {
        PipeEnd::read(self)
    }

    fn set_read_expire(&self, timeout: Duration) -> TransportResult<()> {
        PipeEnd::set_read_expire(self, timeout)
    }

    fn mtu(&self) -> i32 {
        PipeEnd::mtu(self)
    }

    fn send(&self, h: Header) -> impl Future<Output = TransportResult<()>> + Send {
        PipeEnd::send(self, h)
    }

    fn close(&self) -> TransportResult<()> {
        PipeEnd::close(self)
    }
}
