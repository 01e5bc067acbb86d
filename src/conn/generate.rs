//! Outbound header generation.
//!
//! Every helper builds a header of one type and stamps sequence and
//! acknowledgement numbers from the socket, advancing GSS.

use super::socket::Socket;
use crate::header::{Header, HeaderType, ResetCode};

impl Socket {
    pub(crate) fn generate_request(&mut self) -> Header {
        let (src, dst) = self.ports();
        self.take_seq_ack(Header::request(self.service_code(), src, dst))
    }

    pub(crate) fn generate_response(&mut self) -> Header {
        let (src, dst) = self.ports();
        self.take_seq_ack(Header::response(self.service_code(), src, dst))
    }

    pub(crate) fn generate_reset(&mut self, code: ResetCode) -> Header {
        let (src, dst) = self.ports();
        self.take_seq_ack(Header::reset(code, src, dst))
    }

    /// Reset answering a packet that does not belong to the connection. GSS
    /// is left untouched.
    pub(crate) fn generate_abnormal_reset(&self, code: ResetCode, to: &Header) -> Header {
        let (src, dst) = self.ports();
        self.take_abnormal_seq_ack(Header::reset(code, src, dst), to)
    }

    /// Sync acknowledging GSR.
    pub(crate) fn generate_sync(&mut self) -> Header {
        let (src, dst) = self.ports();
        self.take_seq_ack(Header::sync(src, dst))
    }

    /// Sync acknowledging an out-of-window `seqno`.
    pub(crate) fn generate_sync_for(&mut self, seqno: u64) -> Header {
        let mut sync = self.generate_sync();
        sync.ackno = Some(seqno);
        sync
    }

    /// SyncAck answering `sync`.
    ///
    /// # Panics
    ///
    /// Panics if `sync` is not a Sync header.
    pub(crate) fn generate_sync_ack(&mut self, sync: &Header) -> Header {
        assert_eq!(sync.htype, HeaderType::Sync, "SyncAck without a Sync");
        let (src, dst) = self.ports();
        let mut h = self.take_seq_ack(Header::sync_ack(src, dst));
        h.ackno = Some(sync.seqno);
        h
    }

    pub(crate) fn generate_close_req(&mut self) -> Header {
        let (src, dst) = self.ports();
        self.take_seq_ack(Header::close_req(src, dst))
    }

    pub(crate) fn generate_close(&mut self) -> Header {
        let (src, dst) = self.ports();
        self.take_seq_ack(Header::close(src, dst))
    }

    pub(crate) fn generate_ack(&mut self) -> Header {
        let (src, dst) = self.ports();
        self.take_seq_ack(Header::ack(src, dst))
    }

    pub(crate) fn generate_data(&mut self, data: Vec<u8>) -> Header {
        let (src, dst) = self.ports();
        self.take_seq_ack(Header::data(data, src, dst))
    }

    pub(crate) fn generate_data_ack(&mut self, data: Vec<u8>) -> Header {
        let (src, dst) = self.ports();
        self.take_seq_ack(Header::data_ack(data, src, dst))
    }
}
