//! The congestion-control contract.
//!
//! A connection owns one sender-side and one receiver-side instance for its
//! whole life. Both are opened when the connection starts and closed exactly
//! once when it reaches CLOSED. New algorithms plug in by implementing these
//! traits; the connection state machine never changes for them.
//!
//! Every method takes `&self` and may be called from the read loop, the idle
//! loop and the write loop. Implementations synchronise internally and MUST
//! NOT call back into the connection.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::CongestionError;
use crate::header::{HeaderOption, HeaderType};

/// What the sender-side CC sees of an inbound packet carrying an ack.
#[derive(Debug, Clone)]
pub struct Feedback<'a> {
    /// Packet type.
    pub htype: HeaderType,
    /// Extended sequence numbers flag.
    pub x: bool,
    /// Sequence number.
    pub seqno: u64,
    /// Acknowledgement number.
    pub ackno: u64,
    /// Options of the packet.
    pub options: &'a [HeaderOption],
    /// When the packet was processed.
    pub time: Instant,
}

/// What the receiver-side CC sees of every inbound packet.
#[derive(Debug, Clone)]
pub struct Feedforward<'a> {
    /// Packet type.
    pub htype: HeaderType,
    /// Extended sequence numbers flag.
    pub x: bool,
    /// Sequence number.
    pub seqno: u64,
    /// CCVal stamped by the peer's sender.
    pub ccval: u8,
    /// Options of the packet.
    pub options: &'a [HeaderOption],
    /// Payload length.
    pub data_len: usize,
    /// When the packet was processed.
    pub time: Instant,
}

/// Half-connection sender congestion control (HC-Sender CCID).
pub trait SenderCongestionControl: Send + Sync + 'static {
    /// Start background activity such as strobing.
    fn open(&self);

    /// CCID of the algorithm.
    fn id(&self) -> u8;

    /// Congestion Control Maximum Packet Size.
    fn max_segment_size(&self) -> i32;

    /// Best current RTT estimate. Must be sane before any measurement.
    fn rtt(&self) -> Duration;

    /// Called for every outbound header; returns the CCVal and options to stamp.
    fn on_write(
        &self,
        htype: HeaderType,
        x: bool,
        seqno: u64,
        ackno: Option<u64>,
        now: Instant,
    ) -> (u8, Vec<HeaderOption>);

    /// Called for every inbound header that acknowledges something.
    fn on_read(&self, feedback: &Feedback<'_>) -> Result<(), CongestionError>;

    /// Called on every idle tick and read timeout.
    fn on_idle(&self, now: Instant) -> Result<(), CongestionError>;

    /// Wait until the algorithm allows the next data packet.
    ///
    /// Returns [`CongestionError::Closed`] once the instance is closed.
    fn strobe(&self) -> impl Future<Output = Result<(), CongestionError>> + Send;

    /// Release resources. Safe to call more than once.
    fn close(&self);
}

/// Half-connection receiver congestion control (HC-Receiver CCID).
pub trait ReceiverCongestionControl: Send + Sync + 'static {
    /// Start background activity.
    fn open(&self);

    /// CCID of the algorithm.
    fn id(&self) -> u8;

    /// Called for every outbound header; returns options to stamp.
    fn on_write(
        &self,
        htype: HeaderType,
        x: bool,
        seqno: u64,
        ackno: Option<u64>,
        now: Instant,
    ) -> Vec<HeaderOption>;

    /// Called for every inbound header.
    fn on_read(&self, feedforward: &Feedforward<'_>) -> Result<(), CongestionError>;

    /// Called on every idle tick and read timeout.
    fn on_idle(&self, now: Instant) -> Result<(), CongestionError>;

    /// Release resources. Safe to call more than once.
    fn close(&self);
}

/// A congestion-control algorithm: a factory for matching sender/receiver pairs.
pub trait CongestionControl {
    /// Sender half.
    type Sender: SenderCongestionControl;
    /// Receiver half.
    type Receiver: ReceiverCongestionControl;

    /// Create a sender for a new connection.
    fn new_sender(&self) -> Self::Sender;

    /// Create a receiver for a new connection.
    fn new_receiver(&self) -> Self::Receiver;
}
