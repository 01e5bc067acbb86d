//! The connection handle and its shared state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use super::config::ConnConfig;
use super::socket::{ConnState, Role, Socket};
use crate::cc::{ReceiverCongestionControl, SenderCongestionControl};
use crate::core::{
    CongestionError, ConnError, ConnResult, HalfConn, REQUEST_RETRANSMIT_INITIAL,
};
use crate::header::{Header, ResetCode};

/// State guarded by the connection lock.
#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) socket: Socket,
    /// Outbound queue drained by the write loop. `None` once torn down.
    outbound: Option<mpsc::UnboundedSender<Header>>,
    /// Inbound segment queue. `None` once data can no longer arrive.
    inbound: Option<mpsc::Sender<Vec<u8>>>,
}

impl Inner {
    /// Queue a header for the write loop. Never blocks.
    pub(crate) fn inject(&mut self, h: Header) {
        match &self.outbound {
            Some(tx) => {
                trace!(event = "write", header = %h, "queued");
                if tx.send(h).is_err() {
                    debug!(event = "drop", "write loop gone");
                }
            }
            None => debug!(event = "drop", header = %h, "connection torn down"),
        }
    }

    /// Hand a payload to `read_segment`. Returns `false` if it was dropped.
    pub(crate) fn deliver(&mut self, data: Vec<u8>) -> bool {
        match &self.inbound {
            Some(tx) => tx.try_send(data).is_ok(),
            None => false,
        }
    }
}

/// Counts live connection tasks; dropping decrements.
struct TaskGuard {
    live: Arc<watch::Sender<usize>>,
}

impl TaskGuard {
    fn new(live: &Arc<watch::Sender<usize>>) -> Self {
        live.send_modify(|n| *n += 1);
        Self {
            live: Arc::clone(live),
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.live.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Completion barrier for a connection's background tasks.
#[derive(Debug, Clone)]
pub struct Waiter {
    live: watch::Receiver<usize>,
}

impl Waiter {
    /// Resolve once the read, idle and write loops have all exited.
    pub async fn wait(mut self) {
        let _ = self.live.wait_for(|n| *n == 0).await;
    }

    /// Resolve once every waiter has resolved.
    pub async fn all(waiters: impl IntoIterator<Item = Waiter>) {
        for waiter in waiters {
            waiter.wait().await;
        }
    }

    /// Check without waiting.
    pub fn is_done(&self) -> bool {
        *self.live.borrow() == 0
    }
}

pub(crate) struct Shared<S, R, T> {
    pub(crate) config: ConnConfig,
    pub(crate) hc: T,
    pub(crate) scc: S,
    pub(crate) rcc: R,
    inner: Mutex<Inner>,
    segments: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
    closed: watch::Sender<bool>,
    cc_closed: AtomicBool,
    live_tasks: Arc<watch::Sender<usize>>,
}

impl<S, R, T> Shared<S, R, T>
where
    S: SenderCongestionControl,
    R: ReceiverCongestionControl,
    T: HalfConn,
{
    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to the teardown signal.
    pub(crate) fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Enter `state`. CLOSED tears the connection down.
    pub(crate) fn goto(&self, inner: &mut Inner, state: ConnState) {
        if state == ConnState::Closed {
            self.teardown(inner);
            return;
        }
        let from = inner.socket.state();
        inner.socket.set_state(state, Instant::now());
        if !state.delivers_data() {
            inner.inbound = None;
        }
        debug!(event = "state", %from, to = %state);
    }

    /// Enter CLOSED: stop delivery and the write queue, close both CCs once
    /// and wake every loop.
    pub(crate) fn teardown(&self, inner: &mut Inner) {
        let from = inner.socket.state();
        if from == ConnState::Closed {
            return;
        }
        inner.socket.set_state(ConnState::Closed, Instant::now());
        inner.inbound = None;
        inner.outbound = None;
        if !self.cc_closed.swap(true, Ordering::AcqRel) {
            self.scc.close();
            self.rcc.close();
        }
        self.closed.send_replace(true);
        info!(event = "state", %from, to = %ConnState::Closed, "connection closed");
    }

    /// Record `code`, tell the peer when it can hear us, and tear down.
    pub(crate) fn abort_with(&self, inner: &mut Inner, code: ResetCode) {
        let state = inner.socket.state();
        if state == ConnState::Closed {
            return;
        }
        inner.socket.set_reset_code(code);
        if state.knows_peer() {
            let reset = inner.socket.generate_reset(code);
            inner.inject(reset);
        }
        self.teardown(inner);
    }

    /// Tear down without telling the peer.
    pub(crate) fn abort_quietly(&self) {
        let mut inner = self.lock();
        self.teardown(&mut inner);
    }

    /// Act on a congestion-control signal. Returns the reset code to abort
    /// with, if any.
    pub(crate) fn handle_congestion_signal(
        &self,
        inner: &mut Inner,
        side: &'static str,
        signal: CongestionError,
    ) -> Option<ResetCode> {
        match signal {
            CongestionError::Reset(code) => {
                info!(event = "error", side, %code, "congestion control reset");
                Some(code)
            }
            CongestionError::Ack => {
                if inner.socket.state().can_ack() {
                    let ack = inner.socket.generate_ack();
                    inner.inject(ack);
                }
                None
            }
            other => {
                warn!(event = "error", side, error = %other, "unknown congestion control condition");
                None
            }
        }
    }

    /// Cache the CC's RTT estimate and packet size limit.
    pub(crate) fn sync_with_congestion_control(&self, inner: &mut Inner) {
        inner.socket.set_rtt(self.scc.rtt());
        inner.socket.set_max_segment_size(self.scc.max_segment_size());
    }

    /// Cache the half-connection's MTU.
    pub(crate) fn sync_with_link(&self, inner: &mut Inner) {
        inner.socket.set_path_mtu(self.hc.mtu());
    }
}

/// A DCCP connection over a half-connection `T`, paced by the
/// congestion-control pair `S`/`R`.
///
/// Dropping the handle aborts the connection quietly; keep it alive until
/// [`Conn::wait`] to let a graceful close finish.
pub struct Conn<S, R, T>
where
    S: SenderCongestionControl,
    R: ReceiverCongestionControl,
    T: HalfConn,
{
    shared: Arc<Shared<S, R, T>>,
}

impl<S, R, T> Conn<S, R, T>
where
    S: SenderCongestionControl,
    R: ReceiverCongestionControl,
    T: HalfConn,
{
    /// Start the active side: enter REQUEST and send a Request.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new_client(hc: T, scc: S, rcc: R, config: ConnConfig) -> Self {
        Self::start(Role::Client, hc, scc, rcc, config, |inner, max_retransmits| {
            let now = Instant::now();
            inner.socket.choose_iss();
            inner.socket.set_state(ConnState::Request, now);
            inner
                .socket
                .retransmit
                .arm(now, REQUEST_RETRANSMIT_INITIAL, max_retransmits);
            let request = inner.socket.generate_request();
            inner.inject(request);
        })
    }

    /// Start the passive side: enter LISTEN.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new_server(hc: T, scc: S, rcc: R, config: ConnConfig) -> Self {
        Self::start(Role::Server, hc, scc, rcc, config, |inner, _| {
            inner.socket.set_state(ConnState::Listen, Instant::now());
        })
    }

    fn start(
        role: Role,
        hc: T,
        scc: S,
        rcc: R,
        config: ConnConfig,
        init: impl FnOnce(&mut Inner, u32),
    ) -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (seg_tx, seg_rx) = mpsc::channel(config.inbound_queue.max(1));
        let (closed, _) = watch::channel(false);
        let (live_tasks, _) = watch::channel(0usize);

        let inner = Inner {
            socket: Socket::new(role, &config),
            outbound: Some(out_tx),
            inbound: Some(seg_tx),
        };
        let shared = Arc::new(Shared {
            config,
            hc,
            scc,
            rcc,
            inner: Mutex::new(inner),
            segments: tokio::sync::Mutex::new(seg_rx),
            closed,
            cc_closed: AtomicBool::new(false),
            live_tasks: Arc::new(live_tasks),
        });

        shared.scc.open();
        shared.rcc.open();
        {
            let mut inner = shared.lock();
            shared.sync_with_congestion_control(&mut inner);
            shared.sync_with_link(&mut inner);
            init(&mut inner, shared.config.max_retransmits);
        }

        let span = info_span!("conn", name = %shared.config.name);
        let guard = TaskGuard::new(&shared.live_tasks);
        tokio::spawn(
            {
                let shared = Arc::clone(&shared);
                async move {
                    let _guard = guard;
                    shared.read_loop().await;
                }
            }
            .instrument(span.clone()),
        );
        let guard = TaskGuard::new(&shared.live_tasks);
        tokio::spawn(
            {
                let shared = Arc::clone(&shared);
                async move {
                    let _guard = guard;
                    shared.idle_loop().await;
                }
            }
            .instrument(span.clone()),
        );
        let guard = TaskGuard::new(&shared.live_tasks);
        tokio::spawn(
            {
                let shared = Arc::clone(&shared);
                async move {
                    let _guard = guard;
                    shared.write_loop(out_rx).await;
                }
            }
            .instrument(span),
        );

        Self { shared }
    }

    /// Send one segment as a Data (or DataAck) packet.
    ///
    /// Waits for the sender congestion control to allow the packet.
    pub async fn write_segment(&self, data: &[u8]) -> ConnResult<()> {
        self.check_writable(data.len())?;
        match self.shared.scc.strobe().await {
            Ok(()) => {}
            Err(CongestionError::Closed) => return Err(ConnError::Closed),
            Err(e) => return Err(e.into()),
        }

        let mut inner = self.shared.lock();
        let state = inner.socket.state();
        writable(state)?;
        let h = if state == ConnState::PartOpen || inner.socket.ack_pending() {
            inner.socket.generate_data_ack(data.to_vec())
        } else {
            inner.socket.generate_data(data.to_vec())
        };
        inner.inject(h);
        Ok(())
    }

    fn check_writable(&self, len: usize) -> ConnResult<()> {
        let inner = self.shared.lock();
        writable(inner.socket.state())?;
        let max = inner.socket.max_payload();
        if len > max {
            return Err(ConnError::TooBig { len, max });
        }
        Ok(())
    }

    /// Receive the next delivered segment.
    ///
    /// Returns [`ConnError::Eof`] once the connection no longer delivers data
    /// and the queue is drained.
    pub async fn read_segment(&self) -> ConnResult<Vec<u8>> {
        let mut segments = self.shared.segments.lock().await;
        segments.recv().await.ok_or(ConnError::Eof)
    }

    /// Start a graceful close.
    pub fn close(&self) -> ConnResult<()> {
        let shared = &self.shared;
        let mut inner = shared.lock();
        match inner.socket.state() {
            ConnState::Closed => Err(ConnError::Closed),
            ConnState::CloseReq | ConnState::Closing | ConnState::TimeWait => Ok(()),
            ConnState::Listen | ConnState::Request | ConnState::Respond => {
                shared.abort_with(&mut inner, ResetCode::Closed);
                Ok(())
            }
            ConnState::Open | ConnState::PartOpen => {
                let (h, next) = match inner.socket.role() {
                    Role::Server => (inner.socket.generate_close_req(), ConnState::CloseReq),
                    Role::Client => (inner.socket.generate_close(), ConnState::Closing),
                };
                inner.inject(h);
                shared.goto(&mut inner, next);
                let rtt = inner.socket.rtt();
                inner
                    .socket
                    .retransmit
                    .arm(Instant::now(), rtt, shared.config.max_retransmits);
                Ok(())
            }
        }
    }

    /// Reset the connection with code Aborted and close it. Idempotent.
    pub fn abort(&self) {
        let mut inner = self.shared.lock();
        self.shared.abort_with(&mut inner, ResetCode::Aborted);
    }

    /// Close without notifying the peer. Idempotent.
    pub fn abort_quietly(&self) {
        self.shared.abort_quietly();
    }

    /// Current state.
    pub fn state(&self) -> ConnState {
        self.shared.lock().socket.state()
    }

    /// Reset code that ended the connection (sent or received), if any.
    pub fn reset_code(&self) -> Option<ResetCode> {
        self.shared.lock().socket.reset_code()
    }

    /// Cached round-trip time estimate.
    pub fn rtt(&self) -> Duration {
        self.shared.lock().socket.rtt()
    }

    /// Largest segment [`Conn::write_segment`] accepts right now.
    pub fn max_segment_size(&self) -> usize {
        self.shared.lock().socket.max_payload()
    }

    /// Cached path MTU.
    pub fn path_mtu(&self) -> i32 {
        self.shared.lock().socket.path_mtu()
    }

    /// Connection name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Completion barrier for the background tasks.
    pub fn waiter(&self) -> Waiter {
        Waiter {
            live: self.shared.live_tasks.subscribe(),
        }
    }

    /// Wait for the background tasks to exit.
    pub async fn wait(&self) {
        self.waiter().wait().await;
    }
}

impl<S, R, T> Drop for Conn<S, R, T>
where
    S: SenderCongestionControl,
    R: ReceiverCongestionControl,
    T: HalfConn,
{
    fn drop(&mut self) {
        self.shared.abort_quietly();
    }
}

impl<S, R, T> std::fmt::Debug for Conn<S, R, T>
where
    S: SenderCongestionControl,
    R: ReceiverCongestionControl,
    T: HalfConn,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("name", &self.shared.config.name)
            .field("state", &self.state())
            .finish()
    }
}

fn writable(state: ConnState) -> ConnResult<()> {
    match state {
        ConnState::Closed => Err(ConnError::Closed),
        s if s.is_writable() => Ok(()),
        s => Err(ConnError::NotOpen(s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writable() {
        assert!(writable(ConnState::Open).is_ok());
        assert!(writable(ConnState::PartOpen).is_ok());
        assert!(matches!(writable(ConnState::Closed), Err(ConnError::Closed)));
        assert!(matches!(
            writable(ConnState::Request),
            Err(ConnError::NotOpen(ConnState::Request))
        ));
    }

    #[tokio::test]
    async fn test_waiter_tracks_guards() {
        let (live, _) = watch::channel(0usize);
        let live = Arc::new(live);
        let waiter = Waiter {
            live: live.subscribe(),
        };

        let a = TaskGuard::new(&live);
        let b = TaskGuard::new(&live);
        assert!(!waiter.is_done());
        drop(a);
        assert!(!waiter.is_done());

        let pending = tokio::spawn(waiter.clone().wait());
        drop(b);
        pending.await.unwrap();
        assert!(waiter.is_done());
    }

    #[tokio::test]
    async fn test_waiter_all() {
        let (live, _) = watch::channel(0usize);
        let live = Arc::new(live);
        let guard = TaskGuard::new(&live);
        let waiters = vec![
            Waiter {
                live: live.subscribe(),
            },
            Waiter {
                live: live.subscribe(),
            },
        ];
        let pending = tokio::spawn(Waiter::all(waiters));
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());
        drop(guard);
        pending.await.unwrap();
    }
}
