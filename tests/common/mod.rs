//! Shared helpers for the sandbox integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dccp_protocol::cc::{
    CongestionControl, Feedback, Feedforward, FixedRate, FixedRateReceiver, FixedRateSender,
    ReceiverCongestionControl, SenderCongestionControl,
};
use dccp_protocol::conn::{Conn, ConnConfig, ConnConfigBuilder, ConnState};
use dccp_protocol::core::{CongestionError, HalfConn};
use dccp_protocol::header::{HeaderOption, HeaderType, ResetCode};
use dccp_protocol::transport::{PipeEnd, pipe};
use tokio::time::Instant;

/// Install a test subscriber; `RUST_LOG=trace` shows the connection events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What a scripted CC observed, and what it should report next.
#[derive(Debug, Default)]
pub struct Script {
    idle_polls: AtomicUsize,
    closes: AtomicUsize,
    next: Mutex<Option<CongestionError>>,
    always: Mutex<Option<CongestionError>>,
}

impl Script {
    pub fn idle_polls(&self) -> usize {
        self.idle_polls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Make the next idle poll report `signal`.
    pub fn report(&self, signal: CongestionError) {
        *self.next.lock().unwrap() = Some(signal);
    }

    /// Make every idle poll report `signal`, unless a one-off is queued.
    pub fn report_always(&self, signal: CongestionError) {
        *self.always.lock().unwrap() = Some(signal);
    }

    /// Make the next idle poll report `Reset(code)`.
    pub fn trigger_reset(&self, code: ResetCode) {
        self.report(CongestionError::Reset(code));
    }

    fn on_idle(&self) -> Result<(), CongestionError> {
        self.idle_polls.fetch_add(1, Ordering::SeqCst);
        if let Some(signal) = self.next.lock().unwrap().take() {
            return Err(signal);
        }
        match self.always.lock().unwrap().clone() {
            Some(signal) => Err(signal),
            None => Ok(()),
        }
    }

    fn on_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fixed-rate sender that counts idle polls, reports a fixed RTT and raises
/// whatever its [`Script`] says on idle.
pub struct ScriptedSender {
    inner: FixedRateSender,
    script: Arc<Script>,
    rtt: Duration,
}

impl ScriptedSender {
    pub fn new(rtt: Duration) -> (Self, Arc<Script>) {
        let script = Arc::new(Script::default());
        let sender = Self {
            inner: FixedRate::default().new_sender(),
            script: Arc::clone(&script),
            rtt,
        };
        (sender, script)
    }
}

impl SenderCongestionControl for ScriptedSender {
    fn open(&self) {
        self.inner.open();
    }

    fn id(&self) -> u8 {
        self.inner.id()
    }

    fn max_segment_size(&self) -> i32 {
        self.inner.max_segment_size()
    }

    fn rtt(&self) -> Duration {
        self.rtt
    }

    fn on_write(
        &self,
        htype: HeaderType,
        x: bool,
        seqno: u64,
        ackno: Option<u64>,
        now: Instant,
    ) -> (u8, Vec<HeaderOption>) {
        self.inner.on_write(htype, x, seqno, ackno, now)
    }

    fn on_read(&self, feedback: &Feedback<'_>) -> Result<(), CongestionError> {
        self.inner.on_read(feedback)
    }

    fn on_idle(&self, now: Instant) -> Result<(), CongestionError> {
        self.script.on_idle()?;
        self.inner.on_idle(now)
    }

    async fn strobe(&self) -> Result<(), CongestionError> {
        self.inner.strobe().await
    }

    fn close(&self) {
        self.script.on_close();
        self.inner.close();
    }
}

/// Fixed-rate receiver driven by a [`Script`].
pub struct ScriptedReceiver {
    inner: FixedRateReceiver,
    script: Arc<Script>,
}

impl ScriptedReceiver {
    pub fn new() -> (Self, Arc<Script>) {
        let script = Arc::new(Script::default());
        let receiver = Self {
            inner: FixedRateReceiver,
            script: Arc::clone(&script),
        };
        (receiver, script)
    }
}

impl ReceiverCongestionControl for ScriptedReceiver {
    fn open(&self) {
        self.inner.open();
    }

    fn id(&self) -> u8 {
        self.inner.id()
    }

    fn on_write(
        &self,
        htype: HeaderType,
        x: bool,
        seqno: u64,
        ackno: Option<u64>,
        now: Instant,
    ) -> Vec<HeaderOption> {
        self.inner.on_write(htype, x, seqno, ackno, now)
    }

    fn on_read(&self, feedforward: &Feedforward<'_>) -> Result<(), CongestionError> {
        self.inner.on_read(feedforward)
    }

    fn on_idle(&self, now: Instant) -> Result<(), CongestionError> {
        self.script.on_idle()?;
        self.inner.on_idle(now)
    }

    fn close(&self) {
        self.script.on_close();
        self.inner.close();
    }
}

pub type FixedConn = Conn<FixedRateSender, FixedRateReceiver, PipeEnd>;
pub type ScriptedConn = Conn<ScriptedSender, FixedRateReceiver, PipeEnd>;

pub fn config(name: &str) -> ConnConfig {
    ConnConfigBuilder::new()
        .name(name)
        .ports(5000, 6000)
        .service_code(7)
        .build()
}

/// Client and server over a default pipe, both on fixed-rate CC.
pub fn fixed_pair(client: ConnConfig, server: ConnConfig) -> (FixedConn, FixedConn) {
    let (client_end, server_end) = pipe();
    let cc = FixedRate::default();
    let server = Conn::new_server(server_end, cc.new_sender(), cc.new_receiver(), server);
    let client = Conn::new_client(client_end, cc.new_sender(), cc.new_receiver(), client);
    (client, server)
}

/// Client and server whose senders are scripted, with the default RTT.
pub fn scripted_pair() -> (ScriptedConn, Arc<Script>, ScriptedConn, Arc<Script>) {
    let (client_end, server_end) = pipe();
    let (server_scc, server_script) = ScriptedSender::new(Duration::from_millis(200));
    let (client_scc, client_script) = ScriptedSender::new(Duration::from_millis(200));
    let server = Conn::new_server(server_end, server_scc, FixedRateReceiver, config("server"));
    let client = Conn::new_client(client_end, client_scc, FixedRateReceiver, config("client"));
    (client, client_script, server, server_script)
}

/// Poll `conn` until it reaches `state` or `within` elapses.
pub async fn wait_for_state<S, R, T>(conn: &Conn<S, R, T>, state: ConnState, within: Duration) -> bool
where
    S: SenderCongestionControl,
    R: ReceiverCongestionControl,
    T: HalfConn,
{
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if conn.state() == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    conn.state() == state
}
