//! Protocol constants for the DCCP connection core.
//!
//! Values marked as protocol-fixed come from RFC 4340; the rest are defaults
//! that [`ConnConfig`](crate::conn::ConnConfig) can override.

use std::time::Duration;

// =============================================================================
// ROUND-TRIP TIMING
// =============================================================================

/// Floor for the idle-loop polling interval.
pub const ROUNDTRIP_MIN: Duration = Duration::from_millis(2);

/// RTT assumed before any measurement exists, and ceiling for the idle-loop
/// polling interval.
pub const ROUNDTRIP_DEFAULT: Duration = Duration::from_millis(200);

/// The read deadline is this many RTTs.
pub const READ_TIMEOUT_RTTS: u32 = 5;

// =============================================================================
// CONNECTION TIMERS
// =============================================================================

/// Maximum segment lifetime.
pub const MSL: Duration = Duration::from_secs(120);

/// Time spent in TIMEWAIT before the connection is fully closed.
pub const TIME_WAIT: Duration = Duration::from_secs(2 * 120);

/// Initial Request retransmission interval.
pub const REQUEST_RETRANSMIT_INITIAL: Duration = Duration::from_secs(1);

/// Ceiling for any retransmission interval after backoff.
pub const MAX_RETRANSMIT_INTERVAL: Duration = Duration::from_secs(64);

/// Retransmission backoff multiplier.
pub const RETRANSMIT_BACKOFF: u32 = 2;

/// Retransmissions (of Request, PARTOPEN Ack, Close, CloseReq) before giving up.
pub const MAX_RETRANSMITS: u32 = 8;

/// Give up on a handshake that has not completed after this long.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

/// At most one Sync per this interval (RFC 4340 §7.5.4 allows eight per second).
pub const SYNC_RATE_LIMIT: Duration = Duration::from_millis(125);

// =============================================================================
// SEQUENCE NUMBERS
// =============================================================================

/// Width of extended sequence numbers.
pub const SEQNO_BITS: u32 = 48;

/// Largest representable extended sequence number.
pub const SEQNO_MAX: u64 = (1 << SEQNO_BITS) - 1;

/// Default value of the Sequence Window feature.
pub const DEFAULT_SEQUENCE_WINDOW: u64 = 100;

// =============================================================================
// SIZES
// =============================================================================

/// Path MTU assumed until the link reports one.
pub const DEFAULT_PMTU: i32 = 1500;

/// IP + UDP encapsulation + extended DCCP-DataAck header.
pub const HEADER_OVERHEAD: i32 = 20 + 8 + 24;

/// Default length of the inbound segment queue.
pub const DEFAULT_INBOUND_QUEUE: usize = 64;

// =============================================================================
// CONGESTION CONTROL IDS
// =============================================================================

/// CCID of the fixed-rate reference algorithm.
pub const CCID_FIXED: u8 = 0xf;

/// Default rate of the fixed-rate sender, in packets per second.
pub const FIXED_SENDS_PER_SECOND: u32 = 100;
