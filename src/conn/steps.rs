//! Inbound packet processing (RFC 4340 §8.5).
//!
//! Every validated header runs through [`Shared::PIPELINE`] in order, with the
//! connection lock held. A step either lets the packet continue, consumes it,
//! or aborts the connection with a reset code.

use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::conn::{Inner, Shared};
use super::socket::{ConnState, Role};
use crate::cc::{Feedback, Feedforward, ReceiverCongestionControl, SenderCongestionControl};
use crate::core::HalfConn;
use crate::header::seqno::{seq_add, seq_dist, seq_in_window};
use crate::header::{Header, HeaderType, ResetCode, option_kinds};

/// Outcome of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Run the next step.
    Continue,
    /// The packet is fully handled (or dropped).
    Done,
    /// Reset and close the connection.
    Abort(ResetCode),
}

type StepFn<S, R, T> = fn(&Shared<S, R, T>, &mut Inner, &Header) -> Step;

impl<S, R, T> Shared<S, R, T>
where
    S: SenderCongestionControl,
    R: ReceiverCongestionControl,
    T: HalfConn,
{
    pub(crate) const PIPELINE: [(&'static str, StepFn<S, R, T>); 15] = [
        ("timewait", Self::step_timewait),
        ("listen", Self::step_listen),
        ("request_seqno", Self::step_request_seqno),
        ("sync_seqno", Self::step_sync_seqno),
        ("check_seqno", Self::step_check_seqno),
        ("unexpected", Self::step_unexpected),
        ("options", Self::step_options),
        ("reset", Self::step_reset),
        ("request", Self::step_request),
        ("respond", Self::step_respond),
        ("partopen", Self::step_partopen),
        ("closereq", Self::step_close_req),
        ("close", Self::step_close),
        ("sync", Self::step_sync),
        ("data", Self::step_data),
    ];

    /// Run `h` through the pipeline.
    pub(crate) fn process(&self, inner: &mut Inner, h: &Header) {
        for (name, step) in Self::PIPELINE {
            match step(self, inner, h) {
                Step::Continue => {}
                Step::Done => {
                    trace!(step = name, header = %h, "done");
                    return;
                }
                Step::Abort(code) => {
                    debug!(event = "error", step = name, header = %h, %code, "abort");
                    self.abort_with(inner, code);
                    return;
                }
            }
        }
    }

    fn step_timewait(&self, inner: &mut Inner, h: &Header) -> Step {
        if inner.socket.state() != ConnState::TimeWait {
            return Step::Continue;
        }
        if matches!(h.htype, HeaderType::Sync | HeaderType::SyncAck) {
            return Step::Continue;
        }
        debug!(event = "drop", header = %h, "in TIMEWAIT");
        Step::Done
    }

    fn step_listen(&self, inner: &mut Inner, h: &Header) -> Step {
        if inner.socket.state() != ConnState::Listen {
            return Step::Continue;
        }
        if h.htype == HeaderType::Request {
            let sock = &mut inner.socket;
            sock.set_isr(h.seqno);
            sock.choose_iss();
            sock.set_service_code(h.service_code);
            self.goto(inner, ConnState::Respond);
            return Step::Continue;
        }
        if h.htype != HeaderType::Reset {
            let reset = inner
                .socket
                .generate_abnormal_reset(ResetCode::NoConnection, h);
            inner.inject(reset);
        }
        debug!(event = "drop", header = %h, "in LISTEN");
        Step::Done
    }

    fn step_request_seqno(&self, inner: &mut Inner, h: &Header) -> Step {
        if inner.socket.state() != ConnState::Request {
            return Step::Continue;
        }
        if matches!(h.htype, HeaderType::Response | HeaderType::Reset)
            && let Some(ackno) = h.ackno
        {
            let (awl, awh) = inner.socket.ack_window();
            if seq_in_window(ackno, awl, awh) {
                inner.socket.set_isr(h.seqno);
                inner.socket.update_gar(ackno);
                return Step::Continue;
            }
        }
        if h.htype != HeaderType::Reset {
            let reset = inner
                .socket
                .generate_abnormal_reset(ResetCode::PacketError, h);
            inner.inject(reset);
        }
        debug!(event = "drop", header = %h, "in REQUEST");
        Step::Done
    }

    fn step_sync_seqno(&self, inner: &mut Inner, h: &Header) -> Step {
        if !matches!(h.htype, HeaderType::Sync | HeaderType::SyncAck) {
            return Step::Continue;
        }
        let Some(ackno) = h.ackno else {
            return Step::Done;
        };
        let (awl, awh) = inner.socket.ack_window();
        let (swl, _) = inner.socket.seq_window();
        if seq_in_window(ackno, awl, awh) && seq_dist(swl, h.seqno) >= 0 {
            inner.socket.update_gsr(h.seqno);
            return Step::Continue;
        }
        debug!(event = "drop", header = %h, "sync out of window");
        Step::Done
    }

    fn step_check_seqno(&self, inner: &mut Inner, h: &Header) -> Step {
        let sock = &mut inner.socket;
        let (mut swl, swh) = sock.seq_window();
        let (mut awl, awh) = sock.ack_window();
        if matches!(h.htype, HeaderType::CloseReq | HeaderType::Close) {
            swl = seq_add(sock.gsr(), 1);
            awl = sock.gar();
        }

        let seq_ok = seq_in_window(h.seqno, swl, swh);
        let ack_ok = h.ackno.is_none_or(|ackno| seq_in_window(ackno, awl, awh));
        if seq_ok && ack_ok {
            sock.update_gsr(h.seqno);
            if h.htype != HeaderType::Sync
                && let Some(ackno) = h.ackno
            {
                sock.update_gar(ackno);
            }
            return Step::Continue;
        }

        debug!(event = "drop", header = %h, swl, swh, awl, awh, "out of window");
        // A Reset is answered acknowledging GSR, Syncs are never answered.
        let answer = match h.htype {
            HeaderType::Reset => Some(None),
            HeaderType::Sync | HeaderType::SyncAck => None,
            _ => Some(Some(h.seqno)),
        };
        if let Some(ackno) = answer
            && sock.sync_allowed(Instant::now())
        {
            let sync = match ackno {
                Some(seqno) => sock.generate_sync_for(seqno),
                None => sock.generate_sync(),
            };
            inner.inject(sync);
        }
        Step::Done
    }

    fn step_unexpected(&self, inner: &mut Inner, h: &Header) -> Step {
        let sock = &mut inner.socket;
        let state = sock.state();
        let unexpected = match h.htype {
            HeaderType::Response if sock.role() == Role::Server => true,
            HeaderType::Request if sock.role() == Role::Client => true,
            HeaderType::Request | HeaderType::Response => {
                state.is_synchronized() && seq_dist(sock.osr(), h.seqno) >= 0
            }
            HeaderType::Data => state == ConnState::Respond,
            _ => false,
        };
        if !unexpected {
            return Step::Continue;
        }

        debug!(event = "drop", header = %h, %state, "unexpected type");
        if sock.sync_allowed(Instant::now()) {
            let sync = sock.generate_sync_for(h.seqno);
            inner.inject(sync);
        }
        Step::Done
    }

    fn step_options(&self, inner: &mut Inner, h: &Header) -> Step {
        if let Some(opt) = h
            .options
            .iter()
            .find(|opt| opt.mandatory && !option_kinds::is_understood(opt.kind))
        {
            debug!(event = "error", header = %h, kind = opt.kind, "unknown mandatory option");
            return Step::Abort(ResetCode::MandatoryError);
        }

        let now = Instant::now();
        if let Some(ackno) = h.ackno {
            let feedback = Feedback {
                htype: h.htype,
                x: h.x,
                seqno: h.seqno,
                ackno,
                options: &h.options,
                time: now,
            };
            if let Err(signal) = self.scc.on_read(&feedback)
                && let Some(code) = self.handle_congestion_signal(inner, "sender", signal)
            {
                return Step::Abort(code);
            }
        }
        let feedforward = Feedforward {
            htype: h.htype,
            x: h.x,
            seqno: h.seqno,
            ccval: h.ccval,
            options: &h.options,
            data_len: h.data.len(),
            time: now,
        };
        if let Err(signal) = self.rcc.on_read(&feedforward)
            && let Some(code) = self.handle_congestion_signal(inner, "receiver", signal)
        {
            return Step::Abort(code);
        }

        if !matches!(
            h.htype,
            HeaderType::Ack
                | HeaderType::Sync
                | HeaderType::SyncAck
                | HeaderType::Reset
                | HeaderType::Close
                | HeaderType::CloseReq
        ) {
            inner.socket.set_ack_pending();
        }
        Step::Continue
    }

    fn step_reset(&self, inner: &mut Inner, h: &Header) -> Step {
        if h.htype != HeaderType::Reset {
            return Step::Continue;
        }
        info!(event = "state", code = %h.reset_code, "reset by peer");
        inner.socket.set_reset_code(h.reset_code);
        match inner.socket.state() {
            ConnState::Request | ConnState::Respond => self.teardown(inner),
            _ => self.goto(inner, ConnState::TimeWait),
        }
        Step::Done
    }

    fn step_request(&self, inner: &mut Inner, h: &Header) -> Step {
        if inner.socket.state() != ConnState::Request {
            return Step::Continue;
        }
        if h.service_code != inner.socket.service_code() {
            return Step::Abort(ResetCode::BadServiceCode);
        }
        self.goto(inner, ConnState::PartOpen);
        let rtt = inner.socket.rtt();
        inner
            .socket
            .retransmit
            .arm(Instant::now(), rtt, self.config.max_retransmits);
        Step::Continue
    }

    fn step_respond(&self, inner: &mut Inner, h: &Header) -> Step {
        if inner.socket.state() != ConnState::Respond {
            return Step::Continue;
        }
        if h.htype == HeaderType::Request {
            let response = inner.socket.generate_response();
            inner.inject(response);
            return Step::Done;
        }
        inner.socket.set_osr(h.seqno);
        self.goto(inner, ConnState::Open);
        inner.socket.set_ack_pending();
        Step::Continue
    }

    fn step_partopen(&self, inner: &mut Inner, h: &Header) -> Step {
        if inner.socket.state() != ConnState::PartOpen {
            return Step::Continue;
        }
        if h.htype == HeaderType::Response {
            let ack = inner.socket.generate_ack();
            inner.inject(ack);
            return Step::Done;
        }
        if !matches!(h.htype, HeaderType::Sync | HeaderType::SyncAck) {
            inner.socket.set_osr(h.seqno);
            self.goto(inner, ConnState::Open);
        }
        Step::Continue
    }

    fn step_close_req(&self, inner: &mut Inner, h: &Header) -> Step {
        if h.htype != HeaderType::CloseReq {
            return Step::Continue;
        }
        match inner.socket.role() {
            Role::Client => {
                let close = inner.socket.generate_close();
                inner.inject(close);
                self.goto(inner, ConnState::Closing);
                let rtt = inner.socket.rtt();
                inner
                    .socket
                    .retransmit
                    .arm(Instant::now(), rtt, self.config.max_retransmits);
            }
            Role::Server => {
                if inner.socket.sync_allowed(Instant::now()) {
                    let sync = inner.socket.generate_sync_for(h.seqno);
                    inner.inject(sync);
                }
            }
        }
        Step::Done
    }

    fn step_close(&self, inner: &mut Inner, h: &Header) -> Step {
        if h.htype != HeaderType::Close {
            return Step::Continue;
        }
        let reset = inner.socket.generate_reset(ResetCode::Closed);
        inner.inject(reset);
        if inner.socket.state() == ConnState::CloseReq {
            self.teardown(inner);
        } else {
            self.goto(inner, ConnState::TimeWait);
        }
        Step::Done
    }

    fn step_sync(&self, inner: &mut Inner, h: &Header) -> Step {
        if h.htype != HeaderType::Sync {
            return Step::Continue;
        }
        let reply = inner.socket.generate_sync_ack(h);
        inner.inject(reply);
        Step::Done
    }

    fn step_data(&self, inner: &mut Inner, h: &Header) -> Step {
        if !h.htype.carries_data() || inner.socket.state() != ConnState::Open {
            return Step::Continue;
        }
        if !inner.deliver(h.data.clone()) {
            debug!(event = "drop", header = %h, "inbound queue full");
        }
        Step::Continue
    }
}
