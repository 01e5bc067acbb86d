//! Collaborator traits.
//!
//! The connection core consumes already-decoded headers from a half-connection
//! and never touches the wire format itself.

use std::future::Future;
use std::time::Duration;

use super::error::TransportResult;
use crate::header::Header;

/// One endpoint's view of the link to its peer.
///
/// Implementations carry whole headers (the codec lives below this trait).
/// `read` is only ever called from the connection's read loop and `send` only
/// from its write loop, so neither needs to support concurrent callers of the
/// same method.
///
/// # Requirements
///
/// - `read` MUST honour the most recent [`set_read_expire`] by failing with
///   [`TransportError::Timeout`] once that much time has passed
/// - `read` MUST report headers it cannot represent as a protocol error
///   ([`TransportError::is_protocol_error`]), not as a fatal one
/// - `send` MUST NOT wait on the peer; a full link drops the header
///
/// [`set_read_expire`]: HalfConn::set_read_expire
/// [`TransportError::Timeout`]: super::TransportError::Timeout
/// [`TransportError::is_protocol_error`]: super::TransportError::is_protocol_error
pub trait HalfConn: Send + Sync + 'static {
    /// Receive the next header.
    fn read(&self) -> impl Future<Output = TransportResult<Header>> + Send;

    /// Bound every subsequent `read` by `timeout`.
    fn set_read_expire(&self, timeout: Duration) -> TransportResult<()>;

    /// Current path MTU in bytes.
    fn mtu(&self) -> i32;

    /// Transmit a header.
    fn send(&self, header: Header) -> impl Future<Output = TransportResult<()>> + Send;

    /// Close the local end. Further reads and sends fail with `Closed`.
    fn close(&self) -> TransportResult<()>;
}
