//! Background tasks: the read loop, the idle loop and the write loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::conn::{Inner, Shared};
use super::socket::ConnState;
use super::timer::Retransmit;
use crate::cc::{ReceiverCongestionControl, SenderCongestionControl};
use crate::core::{
    CongestionError, HalfConn, READ_TIMEOUT_RTTS, ROUNDTRIP_DEFAULT, ROUNDTRIP_MIN,
    TransportError, TransportResult,
};
use crate::header::{Header, HeaderError, ResetCode};

/// Idle loop period for a given RTT estimate.
pub fn idle_interval(rtt: Duration) -> Duration {
    rtt.clamp(ROUNDTRIP_MIN, ROUNDTRIP_DEFAULT)
}

impl<S, R, T> Shared<S, R, T>
where
    S: SenderCongestionControl,
    R: ReceiverCongestionControl,
    T: HalfConn,
{
    /// Give both CCs their idle tick and act on what they report. A reset or
    /// ack request from the sender ends the tick; unknown conditions are
    /// logged and the receiver is still polled.
    pub(crate) fn poll_congestion_control(&self) {
        let now = Instant::now();
        if let Err(signal) = self.scc.on_idle(now)
            && self.act_on_idle_signal("sender", signal)
        {
            return;
        }
        if let Err(signal) = self.rcc.on_idle(now) {
            self.act_on_idle_signal("receiver", signal);
        }
    }

    /// Returns `true` if `signal` was a reset or ack request.
    fn act_on_idle_signal(&self, side: &'static str, signal: CongestionError) -> bool {
        let decisive = matches!(signal, CongestionError::Reset(_) | CongestionError::Ack);
        let mut inner = self.lock();
        if let Some(code) = self.handle_congestion_signal(&mut inner, side, signal) {
            self.abort_with(&mut inner, code);
        }
        decisive
    }

    /// Read the next header and check the invariants the pipeline relies on.
    async fn read_header(&self) -> TransportResult<Header> {
        let h = self.hc.read().await?;
        match h.validate() {
            Ok(()) => Ok(h),
            Err(HeaderError::ShortSequence) => {
                Err(TransportError::Unsupported(HeaderError::ShortSequence))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn read_loop(self: Arc<Self>) {
        let mut closed = self.closed();
        loop {
            let (state, rtt) = {
                let inner = self.lock();
                (inner.socket.state(), inner.socket.rtt())
            };
            if state == ConnState::Closed {
                break;
            }

            if let Err(e) = self.hc.set_read_expire(rtt * READ_TIMEOUT_RTTS) {
                warn!(event = "error", error = %e, "set read deadline");
                self.abort_quietly();
                break;
            }

            let result = tokio::select! {
                result = self.read_header() => result,
                _ = closed.changed() => break,
            };
            match result {
                Ok(h) => {
                    trace!(event = "read", header = %h);
                    let mut inner = self.lock();
                    self.sync_with_congestion_control(&mut inner);
                    self.process(&mut inner, &h);
                }
                Err(TransportError::Timeout) => self.poll_congestion_control(),
                Err(e) if e.is_protocol_error() => {
                    debug!(event = "drop", error = %e, "unreadable header");
                }
                Err(e) => {
                    debug!(event = "error", error = %e, "read failed");
                    self.abort_quietly();
                    break;
                }
            }
        }
        trace!("read loop exit");
    }

    pub(crate) async fn idle_loop(self: Arc<Self>) {
        let mut closed = self.closed();
        loop {
            self.poll_congestion_control();

            let (state, rtt) = {
                let mut inner = self.lock();
                self.sync_with_congestion_control(&mut inner);
                self.sync_with_link(&mut inner);
                self.run_timers(&mut inner, Instant::now());
                (inner.socket.state(), inner.socket.rtt())
            };
            if state == ConnState::Closed {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(idle_interval(rtt)) => {}
                _ = closed.changed() => break,
            }
        }
        trace!("idle loop exit");
    }

    /// Drain the outbound queue until teardown, then close the link.
    pub(crate) async fn write_loop(self: Arc<Self>, mut outbound: mpsc::UnboundedReceiver<Header>) {
        while let Some(mut h) = outbound.recv().await {
            let now = Instant::now();
            let (ccval, mut options) = self.scc.on_write(h.htype, h.x, h.seqno, h.ackno, now);
            options.extend(self.rcc.on_write(h.htype, h.x, h.seqno, h.ackno, now));
            h.ccval = ccval;
            h.options.extend(options);

            trace!(event = "write", header = %h);
            if let Err(e) = self.hc.send(h).await {
                if e.is_fatal() {
                    debug!(event = "error", error = %e, "send failed");
                    self.abort_quietly();
                    break;
                }
                debug!(event = "drop", error = %e, "send");
            }
        }
        if let Err(e) = self.hc.close() {
            debug!(event = "error", error = %e, "close link");
        }
        trace!("write loop exit");
    }

    /// Retransmissions, pending acks and state timeouts.
    pub(crate) fn run_timers(&self, inner: &mut Inner, now: Instant) {
        let state = inner.socket.state();
        let age = inner.socket.state_age(now);
        match state {
            ConnState::Request => {
                if age >= self.config.handshake_timeout {
                    debug!(event = "idle", %state, "handshake timeout");
                    self.teardown(inner);
                    return;
                }
                match inner.socket.retransmit.poll(now) {
                    Retransmit::Fire => {
                        let request = inner.socket.generate_request();
                        inner.inject(request);
                    }
                    Retransmit::Exhausted => {
                        debug!(event = "idle", %state, "no response");
                        self.teardown(inner);
                    }
                    Retransmit::Idle => {}
                }
            }
            ConnState::Respond => {
                if age >= self.config.handshake_timeout {
                    debug!(event = "idle", %state, "handshake timeout");
                    self.teardown(inner);
                }
            }
            ConnState::PartOpen => match inner.socket.retransmit.poll(now) {
                Retransmit::Fire => {
                    let ack = inner.socket.generate_ack();
                    inner.inject(ack);
                }
                Retransmit::Exhausted => {
                    debug!(event = "idle", %state, "server silent");
                    self.abort_with(inner, ResetCode::Aborted);
                }
                Retransmit::Idle => self.flush_ack(inner),
            },
            ConnState::Open => self.flush_ack(inner),
            ConnState::CloseReq | ConnState::Closing => match inner.socket.retransmit.poll(now) {
                Retransmit::Fire => {
                    let h = if state == ConnState::CloseReq {
                        inner.socket.generate_close_req()
                    } else {
                        inner.socket.generate_close()
                    };
                    inner.inject(h);
                }
                Retransmit::Exhausted => {
                    debug!(event = "idle", %state, "peer silent");
                    self.teardown(inner);
                }
                Retransmit::Idle => {}
            },
            ConnState::TimeWait => {
                if age >= self.config.time_wait {
                    self.teardown(inner);
                }
            }
            ConnState::Listen | ConnState::Closed => {}
        }
    }

    fn flush_ack(&self, inner: &mut Inner) {
        if inner.socket.ack_pending() {
            let ack = inner.socket.generate_ack();
            inner.inject(ack);
        }
    }
}
