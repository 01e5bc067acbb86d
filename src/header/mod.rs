//! Header abstraction shared by the connection and its collaborators.
//!
//! - [`Header`]: one decoded packet, with per-type constructors
//! - [`HeaderType`], [`ResetCode`], [`HeaderOption`]: header fields
//! - [`has_ack_no`]: which types carry an acknowledgement number
//! - [`seqno`]: circular 48-bit sequence arithmetic

mod packet;
pub mod seqno;

pub use packet::*;
