//! Per-connection protocol state.
//!
//! [`Socket`] is only ever reached through the connection lock, so every
//! method here runs with exclusive access.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::config::ConnConfig;
use super::timer::RetransmitTimer;
use super::window::SequenceWindow;
use crate::core::{DEFAULT_PMTU, HEADER_OVERHEAD, ROUNDTRIP_DEFAULT, SEQNO_MAX, SYNC_RATE_LIMIT};
use crate::header::seqno::{seq_add, seq_dist};
use crate::header::{Header, ResetCode};

/// Connection state (RFC 4340 §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnState {
    /// Terminal state.
    Closed,
    /// Server waiting for a Request.
    Listen,
    /// Client sent a Request, waiting for a Response.
    Request,
    /// Server sent a Response, waiting for the client's ack.
    Respond,
    /// Client got the Response, waiting for anything from the server.
    PartOpen,
    /// Data transfer.
    Open,
    /// Server asked the client to close.
    CloseReq,
    /// Close sent, waiting for Reset.
    Closing,
    /// Holding the connection's sequence space after a close.
    TimeWait,
}

impl ConnState {
    /// Check if both ends have exchanged sequence numbers and the peer
    /// validated ours.
    pub fn is_synchronized(self) -> bool {
        matches!(
            self,
            Self::Open | Self::CloseReq | Self::Closing | Self::TimeWait
        )
    }

    /// Check if data may be written in this state.
    pub fn is_writable(self) -> bool {
        matches!(self, Self::Open | Self::PartOpen)
    }

    /// Check if a standalone Ack may be sent in this state.
    pub(crate) fn can_ack(self) -> bool {
        matches!(
            self,
            Self::PartOpen | Self::Open | Self::CloseReq | Self::Closing
        )
    }

    /// Check if the peer knows our sequence numbers, so a Reset can reach it.
    pub(crate) fn knows_peer(self) -> bool {
        !matches!(self, Self::Closed | Self::Listen | Self::Request)
    }

    /// Check if inbound payloads can still reach the application.
    pub(crate) fn delivers_data(self) -> bool {
        !matches!(
            self,
            Self::CloseReq | Self::Closing | Self::TimeWait | Self::Closed
        )
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "CLOSED",
            Self::Listen => "LISTEN",
            Self::Request => "REQUEST",
            Self::Respond => "RESPOND",
            Self::PartOpen => "PARTOPEN",
            Self::Open => "OPEN",
            Self::CloseReq => "CLOSEREQ",
            Self::Closing => "CLOSING",
            Self::TimeWait => "TIMEWAIT",
        };
        f.write_str(name)
    }
}

/// Which end of the handshake a connection plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends the Request.
    Client,
    /// Answers it.
    Server,
}

/// Sequence numbers, handshake bookkeeping and cached link/CC parameters.
#[derive(Debug)]
pub struct Socket {
    role: Role,
    state: ConnState,
    state_since: Instant,

    source_port: u16,
    dest_port: u16,
    service_code: u32,

    /// Initial sequence number sent.
    iss: u64,
    /// Initial sequence number received.
    isr: u64,
    /// Greatest sequence number sent.
    gss: u64,
    /// Greatest sequence number received.
    gsr: u64,
    /// Greatest acknowledgement number received.
    gar: u64,
    /// First OPEN sequence number received.
    osr: u64,
    window: Arc<dyn SequenceWindow>,

    rtt: Duration,
    ccmps: i32,
    pmtu: i32,

    ack_pending: bool,
    reset_code: Option<ResetCode>,
    last_sync: Option<Instant>,

    pub(crate) retransmit: RetransmitTimer,
}

impl Socket {
    /// Create a socket in CLOSED.
    pub fn new(role: Role, config: &ConnConfig) -> Self {
        Self {
            role,
            state: ConnState::Closed,
            state_since: Instant::now(),
            source_port: config.source_port,
            dest_port: config.dest_port,
            service_code: config.service_code,
            iss: 0,
            isr: 0,
            gss: 0,
            gsr: 0,
            gar: 0,
            osr: 0,
            window: Arc::clone(&config.window),
            rtt: ROUNDTRIP_DEFAULT,
            ccmps: i32::MAX,
            pmtu: DEFAULT_PMTU,
            ack_pending: false,
            reset_code: None,
            last_sync: None,
            retransmit: RetransmitTimer::disarmed(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Enter `state`. Disarms the retransmit timer.
    pub fn set_state(&mut self, state: ConnState, now: Instant) {
        self.state = state;
        self.state_since = now;
        self.retransmit.disarm();
    }

    /// Time spent in the current state.
    pub fn state_age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.state_since)
    }

    pub fn ports(&self) -> (u16, u16) {
        (self.source_port, self.dest_port)
    }

    pub fn service_code(&self) -> u32 {
        self.service_code
    }

    pub fn set_service_code(&mut self, code: u32) {
        self.service_code = code;
    }

    /// Pick a random initial sequence number.
    pub fn choose_iss(&mut self) -> u64 {
        self.set_iss(rand::random::<u64>() & SEQNO_MAX);
        self.iss
    }

    /// Set the initial sequence number; the next header sent carries it.
    pub fn set_iss(&mut self, iss: u64) {
        self.iss = iss;
        self.gss = seq_add(iss, -1);
        self.gar = self.gss;
    }

    #[cfg(test)]
    pub fn gss(&self) -> u64 {
        self.gss
    }

    /// Set the initial sequence number received.
    pub fn set_isr(&mut self, isr: u64) {
        self.isr = isr;
        self.gsr = isr;
    }

    pub fn gsr(&self) -> u64 {
        self.gsr
    }

    /// Advance GSR if `seqno` is newer.
    pub fn update_gsr(&mut self, seqno: u64) {
        if seq_dist(self.gsr, seqno) > 0 {
            self.gsr = seqno;
        }
    }

    pub fn gar(&self) -> u64 {
        self.gar
    }

    /// Advance GAR if `ackno` is newer.
    pub fn update_gar(&mut self, ackno: u64) {
        if seq_dist(self.gar, ackno) > 0 {
            self.gar = ackno;
        }
    }

    pub fn osr(&self) -> u64 {
        self.osr
    }

    pub fn set_osr(&mut self, osr: u64) {
        self.osr = osr;
    }

    /// `(SWL, SWH)`: acceptable inbound sequence numbers.
    pub fn seq_window(&self) -> (u64, u64) {
        self.window.seq_window(self.gsr, self.isr)
    }

    /// `(AWL, AWH)`: acceptable inbound acknowledgement numbers.
    pub fn ack_window(&self) -> (u64, u64) {
        self.window.ack_window(self.gss, self.iss)
    }

    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    pub fn set_rtt(&mut self, rtt: Duration) {
        self.rtt = rtt;
    }

    /// Cache the Congestion Control Maximum Packet Size.
    pub fn set_max_segment_size(&mut self, ccmps: i32) {
        self.ccmps = ccmps;
    }

    pub fn path_mtu(&self) -> i32 {
        self.pmtu
    }

    pub fn set_path_mtu(&mut self, pmtu: i32) {
        self.pmtu = pmtu;
    }

    /// Largest payload a Data header may carry right now.
    pub fn max_payload(&self) -> usize {
        let limit = self.ccmps.min(self.pmtu - HEADER_OVERHEAD);
        usize::try_from(limit).unwrap_or(0)
    }

    pub fn ack_pending(&self) -> bool {
        self.ack_pending
    }

    pub fn set_ack_pending(&mut self) {
        self.ack_pending = true;
    }

    /// Reset code that ended the connection, if any.
    pub fn reset_code(&self) -> Option<ResetCode> {
        self.reset_code
    }

    pub fn set_reset_code(&mut self, code: ResetCode) {
        self.reset_code = Some(code);
    }

    /// Check the Sync rate limit, consuming it when a Sync may be sent.
    pub fn sync_allowed(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_sync
            && now.saturating_duration_since(last) < SYNC_RATE_LIMIT
        {
            return false;
        }
        self.last_sync = Some(now);
        true
    }

    /// Stamp the next sequence number and, when the type carries one, an
    /// acknowledgement of GSR.
    pub fn take_seq_ack(&mut self, mut h: Header) -> Header {
        self.gss = seq_add(self.gss, 1);
        h.seqno = self.gss;
        if h.has_ack_no() {
            h.ackno = Some(self.gsr);
            self.ack_pending = false;
        } else {
            h.ackno = None;
        }
        h
    }

    /// Stamp numbers for a reply to a packet from outside the connection:
    /// `seqno = P.ackno + 1` (0 without one) and `ackno = P.seqno`.
    pub fn take_abnormal_seq_ack(&self, mut h: Header, to: &Header) -> Header {
        h.seqno = to.ackno.map_or(0, |ackno| seq_add(ackno, 1));
        h.ackno = h.has_ack_no().then_some(to.seqno);
        h
    }
}
