//! Decoded DCCP headers.
//!
//! A [`Header`] is what the codec hands to the connection and what the
//! connection hands back for transmission. Only extended (48-bit) sequence
//! numbers are supported.

use std::fmt;

use thiserror::Error;

use crate::core::SEQNO_MAX;

/// Packet types from RFC 4340 §5.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HeaderType {
    /// Client asks to open a connection.
    Request = 0,
    /// Server answers a Request.
    Response = 1,
    /// Application data without acknowledgement.
    Data = 2,
    /// Pure acknowledgement.
    Ack = 3,
    /// Application data with acknowledgement.
    DataAck = 4,
    /// Server asks the client to close.
    CloseReq = 5,
    /// Graceful close.
    Close = 6,
    /// Abnormal termination.
    Reset = 7,
    /// Sequence number resynchronisation.
    Sync = 8,
    /// Answer to a Sync.
    SyncAck = 9,
}

impl HeaderType {
    /// Parse a header type from its 4-bit wire value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Request),
            1 => Some(Self::Response),
            2 => Some(Self::Data),
            3 => Some(Self::Ack),
            4 => Some(Self::DataAck),
            5 => Some(Self::CloseReq),
            6 => Some(Self::Close),
            7 => Some(Self::Reset),
            8 => Some(Self::Sync),
            9 => Some(Self::SyncAck),
            _ => None,
        }
    }

    /// Convert to the wire value.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Check if packets of this type carry application data.
    pub fn carries_data(self) -> bool {
        matches!(self, Self::Data | Self::DataAck)
    }
}

impl fmt::Display for HeaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "Request",
            Self::Response => "Response",
            Self::Data => "Data",
            Self::Ack => "Ack",
            Self::DataAck => "DataAck",
            Self::CloseReq => "CloseReq",
            Self::Close => "Close",
            Self::Reset => "Reset",
            Self::Sync => "Sync",
            Self::SyncAck => "SyncAck",
        };
        f.write_str(name)
    }
}

/// Whether a header of this type carries an acknowledgement number.
///
/// The short and extended layouts both carry an acknowledgement subheader on
/// the same types; `_x` only changes its width.
pub fn has_ack_no(htype: HeaderType, _x: bool) -> bool {
    !matches!(htype, HeaderType::Request | HeaderType::Data)
}

/// Reset codes from RFC 4340 §5.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResetCode {
    /// No reason given.
    #[default]
    Unspecified,
    /// Normal close.
    Closed,
    /// Local abort.
    Aborted,
    /// No connection exists for the packet.
    NoConnection,
    /// Packet of the wrong type or sequence.
    PacketError,
    /// An option was invalid.
    OptionError,
    /// A mandatory option was not understood.
    MandatoryError,
    /// Nobody is listening.
    ConnectionRefused,
    /// Service code not served here.
    BadServiceCode,
    /// Server is too busy.
    TooBusy,
    /// Init Cookie did not verify.
    BadInitCookie,
    /// Peer misbehaved with respect to congestion control.
    AggressionPenalty,
    /// Reserved or CCID-specific code.
    Other(u8),
}

impl ResetCode {
    /// Convert to the wire value.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::Closed => 1,
            Self::Aborted => 2,
            Self::NoConnection => 3,
            Self::PacketError => 4,
            Self::OptionError => 5,
            Self::MandatoryError => 6,
            Self::ConnectionRefused => 7,
            Self::BadServiceCode => 8,
            Self::TooBusy => 9,
            Self::BadInitCookie => 10,
            Self::AggressionPenalty => 11,
            Self::Other(code) => code,
        }
    }
}

impl From<u8> for ResetCode {
    fn from(byte: u8) -> Self {
        match byte {
            0 => Self::Unspecified,
            1 => Self::Closed,
            2 => Self::Aborted,
            3 => Self::NoConnection,
            4 => Self::PacketError,
            5 => Self::OptionError,
            6 => Self::MandatoryError,
            7 => Self::ConnectionRefused,
            8 => Self::BadServiceCode,
            9 => Self::TooBusy,
            10 => Self::BadInitCookie,
            11 => Self::AggressionPenalty,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ResetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => f.write_str("unspecified"),
            Self::Closed => f.write_str("closed"),
            Self::Aborted => f.write_str("aborted"),
            Self::NoConnection => f.write_str("no connection"),
            Self::PacketError => f.write_str("packet error"),
            Self::OptionError => f.write_str("option error"),
            Self::MandatoryError => f.write_str("mandatory error"),
            Self::ConnectionRefused => f.write_str("connection refused"),
            Self::BadServiceCode => f.write_str("bad service code"),
            Self::TooBusy => f.write_str("too busy"),
            Self::BadInitCookie => f.write_str("bad init cookie"),
            Self::AggressionPenalty => f.write_str("aggression penalty"),
            Self::Other(code) => write!(f, "code {code}"),
        }
    }
}

/// Option kinds from RFC 4340 §5.8 understood by the connection core.
pub mod option_kinds {
    /// Padding.
    pub const PADDING: u8 = 0;
    /// Marks the following option as mandatory.
    pub const MANDATORY: u8 = 1;
    /// Receiver is falling behind.
    pub const SLOW_RECEIVER: u8 = 2;
    /// Change L feature negotiation.
    pub const CHANGE_L: u8 = 32;
    /// Confirm L feature negotiation.
    pub const CONFIRM_L: u8 = 33;
    /// Change R feature negotiation.
    pub const CHANGE_R: u8 = 34;
    /// Confirm R feature negotiation.
    pub const CONFIRM_R: u8 = 35;
    /// Init Cookie.
    pub const INIT_COOKIE: u8 = 36;
    /// NDP Count.
    pub const NDP_COUNT: u8 = 37;
    /// Ack Vector, nonce 0.
    pub const ACK_VECTOR_0: u8 = 38;
    /// Ack Vector, nonce 1.
    pub const ACK_VECTOR_1: u8 = 39;
    /// Data Dropped.
    pub const DATA_DROPPED: u8 = 40;
    /// Timestamp.
    pub const TIMESTAMP: u8 = 41;
    /// Timestamp Echo.
    pub const TIMESTAMP_ECHO: u8 = 42;
    /// Elapsed Time.
    pub const ELAPSED_TIME: u8 = 43;
    /// Data Checksum.
    pub const DATA_CHECKSUM: u8 = 44;
    /// First CCID-specific option kind.
    pub const CCID_SPECIFIC_MIN: u8 = 128;

    /// Check if the core (or the active CCID) understands this option kind.
    pub fn is_understood(kind: u8) -> bool {
        matches!(kind, PADDING..=SLOW_RECEIVER | CHANGE_L..=DATA_CHECKSUM)
            || kind >= CCID_SPECIFIC_MIN
    }
}

/// One option record, already parsed by the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderOption {
    /// Option type.
    pub kind: u8,
    /// Option payload.
    pub data: Vec<u8>,
    /// Whether a Mandatory option preceded this one.
    pub mandatory: bool,
}

impl HeaderOption {
    /// Create a non-mandatory option.
    pub fn new(kind: u8, data: Vec<u8>) -> Self {
        Self {
            kind,
            data,
            mandatory: false,
        }
    }

    /// Mark the option as mandatory.
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

/// Structural problems with a decoded header.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// The header uses 24-bit sequence numbers.
    #[error("short sequence numbers are not supported")]
    ShortSequence,

    /// The acknowledgement number is missing from a type that needs one.
    #[error("{0} header is missing its acknowledgement number")]
    MissingAck(HeaderType),

    /// An acknowledgement number is present on a type that has none.
    #[error("{0} header must not carry an acknowledgement number")]
    UnexpectedAck(HeaderType),

    /// A sequence or acknowledgement number does not fit in 48 bits.
    #[error("sequence number {0:#x} exceeds 48 bits")]
    SeqnoOverflow(u64),

    /// Payload on a type that carries no data.
    #[error("{0} header must not carry data")]
    UnexpectedData(HeaderType),
}

/// One DCCP packet as seen by the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Packet type.
    pub htype: HeaderType,
    /// Sender's port.
    pub source_port: u16,
    /// Receiver's port.
    pub dest_port: u16,
    /// Congestion-control value stamped by the sender's CCID.
    pub ccval: u8,
    /// Extended sequence numbers flag.
    pub x: bool,
    /// Sequence number.
    pub seqno: u64,
    /// Acknowledgement number, present iff [`has_ack_no`] says so.
    pub ackno: Option<u64>,
    /// Reset code (Reset only).
    pub reset_code: ResetCode,
    /// Service code (Request and Response only).
    pub service_code: u32,
    /// Options in wire order.
    pub options: Vec<HeaderOption>,
    /// Application data (Data and DataAck only).
    pub data: Vec<u8>,
}

impl Header {
    /// Create an extended header of the given type with zeroed sequence
    /// fields. The acknowledgement number is present iff the type needs one.
    pub fn skeleton(htype: HeaderType, source_port: u16, dest_port: u16) -> Self {
        Self {
            htype,
            source_port,
            dest_port,
            ccval: 0,
            x: true,
            seqno: 0,
            ackno: has_ack_no(htype, true).then_some(0),
            reset_code: ResetCode::Unspecified,
            service_code: 0,
            options: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Create a Request header.
    pub fn request(service_code: u32, source_port: u16, dest_port: u16) -> Self {
        Self {
            service_code,
            ..Self::skeleton(HeaderType::Request, source_port, dest_port)
        }
    }

    /// Create a Response header.
    pub fn response(service_code: u32, source_port: u16, dest_port: u16) -> Self {
        Self {
            service_code,
            ..Self::skeleton(HeaderType::Response, source_port, dest_port)
        }
    }

    /// Create a Reset header.
    pub fn reset(reset_code: ResetCode, source_port: u16, dest_port: u16) -> Self {
        Self {
            reset_code,
            ..Self::skeleton(HeaderType::Reset, source_port, dest_port)
        }
    }

    /// Create a CloseReq header.
    pub fn close_req(source_port: u16, dest_port: u16) -> Self {
        Self::skeleton(HeaderType::CloseReq, source_port, dest_port)
    }

    /// Create a Close header.
    pub fn close(source_port: u16, dest_port: u16) -> Self {
        Self::skeleton(HeaderType::Close, source_port, dest_port)
    }

    /// Create an Ack header.
    pub fn ack(source_port: u16, dest_port: u16) -> Self {
        Self::skeleton(HeaderType::Ack, source_port, dest_port)
    }

    /// Create a Data header.
    pub fn data(data: Vec<u8>, source_port: u16, dest_port: u16) -> Self {
        Self {
            data,
            ..Self::skeleton(HeaderType::Data, source_port, dest_port)
        }
    }

    /// Create a DataAck header.
    pub fn data_ack(data: Vec<u8>, source_port: u16, dest_port: u16) -> Self {
        Self {
            data,
            ..Self::skeleton(HeaderType::DataAck, source_port, dest_port)
        }
    }

    /// Create a Sync header.
    pub fn sync(source_port: u16, dest_port: u16) -> Self {
        Self::skeleton(HeaderType::Sync, source_port, dest_port)
    }

    /// Create a SyncAck header.
    pub fn sync_ack(source_port: u16, dest_port: u16) -> Self {
        Self::skeleton(HeaderType::SyncAck, source_port, dest_port)
    }

    /// Check if this header carries an acknowledgement number.
    pub fn has_ack_no(&self) -> bool {
        has_ack_no(self.htype, self.x)
    }

    /// Check the header against the structural rules the connection relies on.
    pub fn validate(&self) -> Result<(), HeaderError> {
        if !self.x {
            return Err(HeaderError::ShortSequence);
        }
        match (self.has_ack_no(), self.ackno) {
            (true, None) => return Err(HeaderError::MissingAck(self.htype)),
            (false, Some(_)) => return Err(HeaderError::UnexpectedAck(self.htype)),
            _ => {}
        }
        if self.seqno > SEQNO_MAX {
            return Err(HeaderError::SeqnoOverflow(self.seqno));
        }
        if let Some(ackno) = self.ackno
            && ackno > SEQNO_MAX
        {
            return Err(HeaderError::SeqnoOverflow(ackno));
        }
        if !self.data.is_empty() && !self.htype.carries_data() {
            return Err(HeaderError::UnexpectedData(self.htype));
        }
        Ok(())
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} seq={}", self.htype, self.seqno)?;
        if let Some(ackno) = self.ackno {
            write!(f, " ack={ackno}")?;
        }
        if self.htype == HeaderType::Reset {
            write!(f, " code={}", self.reset_code)?;
        }
        if !self.data.is_empty() {
            write!(f, " len={}", self.data.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_ack_no() {
        assert!(!has_ack_no(HeaderType::Request, true));
        assert!(!has_ack_no(HeaderType::Data, true));

        for htype in [
            HeaderType::Response,
            HeaderType::Ack,
            HeaderType::DataAck,
            HeaderType::CloseReq,
            HeaderType::Close,
            HeaderType::Reset,
            HeaderType::Sync,
            HeaderType::SyncAck,
        ] {
            assert!(has_ack_no(htype, true), "{htype} should carry an ack");
            assert!(has_ack_no(htype, false), "{htype} should carry an ack");
        }
        assert!(!has_ack_no(HeaderType::Data, false));
    }

    #[test]
    fn test_constructors_are_extended() {
        let headers = [
            Header::request(42, 1, 2),
            Header::response(42, 1, 2),
            Header::reset(ResetCode::Closed, 1, 2),
            Header::close(1, 2),
            Header::ack(1, 2),
            Header::data(b"hi".to_vec(), 1, 2),
            Header::sync(1, 2),
        ];
        for h in headers {
            assert!(h.x);
            assert_eq!(h.source_port, 1);
            assert_eq!(h.dest_port, 2);
            assert_eq!(h.validate(), Ok(()));
        }
    }

    #[test]
    fn test_validate_short_sequence() {
        let mut h = Header::ack(1, 2);
        h.x = false;
        assert_eq!(h.validate(), Err(HeaderError::ShortSequence));
    }

    #[test]
    fn test_validate_ack_presence() {
        let mut h = Header::ack(1, 2);
        h.ackno = None;
        assert_eq!(h.validate(), Err(HeaderError::MissingAck(HeaderType::Ack)));

        let mut h = Header::request(0, 1, 2);
        h.ackno = Some(7);
        assert_eq!(
            h.validate(),
            Err(HeaderError::UnexpectedAck(HeaderType::Request))
        );
    }

    #[test]
    fn test_validate_overflow_and_payload() {
        let mut h = Header::data(Vec::new(), 1, 2);
        h.seqno = SEQNO_MAX + 1;
        assert_eq!(h.validate(), Err(HeaderError::SeqnoOverflow(SEQNO_MAX + 1)));

        let mut h = Header::ack(1, 2);
        h.data = vec![1, 2, 3];
        assert_eq!(h.validate(), Err(HeaderError::UnexpectedData(HeaderType::Ack)));
    }

    #[test]
    fn test_reset_code_bytes() {
        for byte in 0..=255u8 {
            assert_eq!(ResetCode::from(byte).as_byte(), byte);
        }
        assert_eq!(ResetCode::from(11), ResetCode::AggressionPenalty);
        assert_eq!(ResetCode::from(130), ResetCode::Other(130));
    }

    #[test]
    fn test_option_kinds() {
        assert!(option_kinds::is_understood(option_kinds::TIMESTAMP));
        assert!(option_kinds::is_understood(option_kinds::SLOW_RECEIVER));
        assert!(option_kinds::is_understood(200));
        assert!(!option_kinds::is_understood(3));
        assert!(!option_kinds::is_understood(100));
    }

    #[test]
    fn test_header_display() {
        let mut h = Header::reset(ResetCode::NoConnection, 1, 2);
        h.seqno = 5;
        h.ackno = Some(9);
        assert_eq!(h.to_string(), "Reset seq=5 ack=9 code=no connection");
    }
}
