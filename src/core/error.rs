//! Error types for the DCCP connection core.

use std::io;

use thiserror::Error;

use crate::conn::ConnState;
use crate::header::{HeaderError, ResetCode};

/// Half-connection (link) errors.
///
/// The read loop sorts these into three classes: protocol errors drop the
/// offending packet, a timeout polls congestion control, and everything else
/// is fatal to the connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No header arrived before the read deadline.
    #[error("read timed out")]
    Timeout,

    /// The header is structurally valid but uses a mode this core does not
    /// support (short sequence numbers).
    #[error("unsupported header: {0}")]
    Unsupported(HeaderError),

    /// The header is malformed.
    #[error("malformed header: {0}")]
    Header(#[from] HeaderError),

    /// The read deadline could not be applied.
    #[error("invalid read deadline: {0:?}")]
    BadDeadline(std::time::Duration),

    /// The half-connection has been closed locally or by the link.
    #[error("half-connection closed")]
    Closed,

    /// I/O error from an underlying socket.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Check if this error only concerns one packet, which should be dropped.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, TransportError::Unsupported(_) | TransportError::Header(_))
    }

    /// Check if this error is fatal to the connection.
    pub fn is_fatal(&self) -> bool {
        !self.is_protocol_error() && !matches!(self, TransportError::Timeout)
    }
}

/// Result type for half-connection operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Signals and failures raised by congestion control.
///
/// `Reset` and `Ack` are requests to the connection rather than failures:
/// the connection aborts with the given code, or sends one Ack right away.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CongestionError {
    /// Abort the connection, telling the peer the given reset code.
    #[error("congestion control requested reset ({0})")]
    Reset(ResetCode),

    /// Send an Ack now.
    #[error("congestion control requested an ack")]
    Ack,

    /// The congestion control instance has been closed.
    #[error("congestion control closed")]
    Closed,

    /// Anything else; logged and otherwise ignored.
    #[error("congestion control: {0}")]
    Other(String),
}

/// Errors returned by the [`Conn`](crate::conn::Conn) API.
#[derive(Debug, Error)]
pub enum ConnError {
    /// The connection no longer delivers data.
    #[error("end of stream")]
    Eof,

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,

    /// Data can only be written once the handshake has progressed.
    #[error("connection not open (state {0})")]
    NotOpen(ConnState),

    /// The segment does not fit the current maximum segment size.
    #[error("segment of {len} bytes exceeds maximum of {max}")]
    TooBig {
        /// Length of the rejected segment.
        len: usize,
        /// Largest segment currently accepted.
        max: usize,
    },

    /// Half-connection error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Congestion control error.
    #[error("congestion control error: {0}")]
    Congestion(#[from] CongestionError),
}

/// Result type for connection operations.
pub type ConnResult<T> = Result<T, ConnError>;
