//! Fixed-rate congestion control (CCID 0xF).
//!
//! The sender hands out at most one strobe token every `1 / rate` seconds and
//! never adapts. It is the deterministic baseline adaptive algorithms are
//! checked against, and what the sandbox tests run on.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

use super::control::{
    CongestionControl, Feedback, Feedforward, ReceiverCongestionControl, SenderCongestionControl,
};
use crate::core::{CCID_FIXED, CongestionError, FIXED_SENDS_PER_SECOND, ROUNDTRIP_DEFAULT};
use crate::header::{HeaderOption, HeaderType};

/// Maximum segment size reported by the fixed-rate sender: effectively unbounded,
/// leaving the path MTU as the only limit.
pub const FIXED_MAX_SEGMENT_SIZE: i32 = 1_000_000_000;

/// Fixed-rate congestion control factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRate {
    sends_per_second: u32,
}

impl Default for FixedRate {
    fn default() -> Self {
        Self::new(FIXED_SENDS_PER_SECOND)
    }
}

impl FixedRate {
    /// Create a factory pacing senders at `sends_per_second` packets per second.
    pub fn new(sends_per_second: u32) -> Self {
        Self {
            sends_per_second: sends_per_second.max(1),
        }
    }

    /// Interval between strobe tokens.
    pub fn every(&self) -> Duration {
        Duration::from_secs(1) / self.sends_per_second
    }
}

impl CongestionControl for FixedRate {
    type Sender = FixedRateSender;
    type Receiver = FixedRateReceiver;

    fn new_sender(&self) -> FixedRateSender {
        FixedRateSender::new(self.every())
    }

    fn new_receiver(&self) -> FixedRateReceiver {
        FixedRateReceiver::new()
    }
}

/// Single-slot handoff between the strobe task and `strobe()` callers.
///
/// A caller announces itself on `demand` and then waits on `token`; the task
/// waits on `demand`, releases one `token` and sleeps. `token` never holds
/// more than one permit, so demand left behind by a cancelled caller cannot
/// bank tokens. Closing both semaphores wakes every waiter with an error.
#[derive(Debug)]
struct Handoff {
    demand: Semaphore,
    token: Semaphore,
}

#[derive(Debug, Default)]
struct StrobeTask {
    closed: bool,
    handle: Option<JoinHandle<()>>,
}

/// Fixed-rate HC-Sender congestion control.
#[derive(Debug)]
pub struct FixedRateSender {
    every: Duration,
    handoff: Arc<Handoff>,
    task: Mutex<StrobeTask>,
}

impl FixedRateSender {
    /// Create a sender that strobes once every `every`.
    pub fn new(every: Duration) -> Self {
        Self {
            every,
            handoff: Arc::new(Handoff {
                demand: Semaphore::new(0),
                token: Semaphore::new(0),
            }),
            task: Mutex::new(StrobeTask::default()),
        }
    }

    /// Interval between strobe tokens.
    pub fn every(&self) -> Duration {
        self.every
    }

    /// Check if the sender has been closed.
    pub fn is_closed(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }
}

impl SenderCongestionControl for FixedRateSender {
    fn open(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.closed || task.handle.is_some() {
            return;
        }
        let handoff = Arc::clone(&self.handoff);
        let every = self.every;
        task.handle = Some(tokio::spawn(async move {
            loop {
                // Wait for a strober; fails once closed.
                match handoff.demand.acquire().await {
                    Ok(permit) => permit.forget(),
                    Err(_) => break,
                }
                if handoff.token.is_closed() {
                    break;
                }
                if handoff.token.available_permits() == 0 {
                    handoff.token.add_permits(1);
                }
                tokio::time::sleep(every).await;
            }
            trace!("strobe task exit");
        }));
    }

    fn id(&self) -> u8 {
        CCID_FIXED
    }

    fn max_segment_size(&self) -> i32 {
        FIXED_MAX_SEGMENT_SIZE
    }

    fn rtt(&self) -> Duration {
        ROUNDTRIP_DEFAULT
    }

    fn on_write(
        &self,
        _htype: HeaderType,
        _x: bool,
        _seqno: u64,
        _ackno: Option<u64>,
        _now: Instant,
    ) -> (u8, Vec<HeaderOption>) {
        (0, Vec::new())
    }

    fn on_read(&self, _feedback: &Feedback<'_>) -> Result<(), CongestionError> {
        Ok(())
    }

    fn on_idle(&self, _now: Instant) -> Result<(), CongestionError> {
        Ok(())
    }

    async fn strobe(&self) -> Result<(), CongestionError> {
        self.handoff.demand.add_permits(1);
        let mut demand = Demand {
            demand: &self.handoff.demand,
            pending: true,
        };
        let result = self.handoff.token.acquire().await;
        demand.pending = false;
        match result {
            Ok(permit) => {
                permit.forget();
                Ok(())
            }
            Err(_) => Err(CongestionError::Closed),
        }
    }

    fn close(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.closed {
            return;
        }
        task.closed = true;
        self.handoff.demand.close();
        self.handoff.token.close();
        // The task notices the closed semaphore and exits on its own.
        task.handle = None;
    }
}

/// Withdraws a strober's demand if it is dropped before getting a token.
struct Demand<'a> {
    demand: &'a Semaphore,
    pending: bool,
}

impl Drop for Demand<'_> {
    fn drop(&mut self) {
        if self.pending
            && let Ok(permit) = self.demand.try_acquire()
        {
            permit.forget();
        }
    }
}

/// Fixed-rate HC-Receiver congestion control. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRateReceiver;

impl FixedRateReceiver {
    /// Create a receiver.
    pub fn new() -> Self {
        Self
    }
}

impl ReceiverCongestionControl for FixedRateReceiver {
    fn open(&self) {}

    fn id(&self) -> u8 {
        CCID_FIXED
    }

    fn on_write(
        &self,
        _htype: HeaderType,
        _x: bool,
        _seqno: u64,
        _ackno: Option<u64>,
        _now: Instant,
    ) -> Vec<HeaderOption> {
        Vec::new()
    }

    fn on_read(&self, _feedforward: &Feedforward<'_>) -> Result<(), CongestionError> {
        Ok(())
    }

    fn on_idle(&self, _now: Instant) -> Result<(), CongestionError> {
        Ok(())
    }

    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_from_rate() {
        assert_eq!(FixedRate::new(100).every(), Duration::from_millis(10));
        assert_eq!(FixedRate::new(0).every(), Duration::from_secs(1));
        assert_eq!(FixedRate::default().every(), Duration::from_millis(10));
    }

    #[test]
    fn test_receiver_is_inert() {
        let rcc = FixedRate::default().new_receiver();
        rcc.open();
        assert_eq!(rcc.id(), CCID_FIXED);
        assert!(rcc.on_idle(Instant::now()).is_ok());
        assert!(
            rcc.on_write(HeaderType::Ack, true, 1, Some(1), Instant::now())
                .is_empty()
        );
        rcc.close();
        rcc.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_strobe_paces_tokens() {
        let every = Duration::from_millis(10);
        let scc = FixedRateSender::new(every);
        scc.open();

        let mut stamps = Vec::new();
        for _ in 0..5 {
            scc.strobe().await.unwrap();
            stamps.push(Instant::now());
        }
        for pair in stamps.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= every, "tokens {gap:?} apart");
            assert!(gap <= every + Duration::from_millis(2), "tokens {gap:?} apart");
        }
        scc.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_strobes_do_not_bank_tokens() {
        let every = Duration::from_millis(10);
        let scc = FixedRateSender::new(every);
        scc.open();
        scc.strobe().await.unwrap();

        for _ in 0..10 {
            let cancelled = tokio::time::timeout(Duration::from_micros(1), scc.strobe()).await;
            assert!(cancelled.is_err());
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        let start = Instant::now();
        for _ in 0..10 {
            scc.strobe().await.unwrap();
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= every * 9, "10 strobes took {elapsed:?}");
        scc.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_releases_pending_strobe() {
        let scc = Arc::new(FixedRateSender::new(Duration::from_secs(1)));
        scc.open();

        // Take the first token so the next caller has to wait a full period.
        scc.strobe().await.unwrap();

        let waiter = {
            let scc = Arc::clone(&scc);
            tokio::spawn(async move { scc.strobe().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        scc.close();

        let result = tokio::time::timeout(Duration::from_millis(10), waiter)
            .await
            .expect("strobe did not return after close")
            .unwrap();
        assert_eq!(result, Err(CongestionError::Closed));

        // Future strobes fail straight away.
        let result = tokio::time::timeout(Duration::from_millis(10), scc.strobe())
            .await
            .expect("strobe blocked after close");
        assert_eq!(result, Err(CongestionError::Closed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let scc = FixedRate::default().new_sender();
        scc.open();
        scc.close();
        scc.close();
        assert!(scc.is_closed());

        // Opening after close does not restart strobing.
        scc.open();
        assert!(scc.strobe().await.is_err());
    }

    #[test]
    fn test_sender_reports_defaults() {
        let scc = FixedRate::default().new_sender();
        assert_eq!(scc.id(), CCID_FIXED);
        assert_eq!(scc.rtt(), ROUNDTRIP_DEFAULT);
        assert_eq!(scc.max_segment_size(), FIXED_MAX_SEGMENT_SIZE);
        assert_eq!(
            scc.on_write(HeaderType::Data, true, 7, None, Instant::now()),
            (0, Vec::new())
        );
    }
}
