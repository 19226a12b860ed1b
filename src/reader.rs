//! reader.rs — the reader's query/arbitrate/access state machine.
//!
//! Like `tag.rs`, `objects.py`'s `Reader` class fell outside the
//! retrieval pack, so the state transitions below follow the round/slot
//! structure and power-control modes described for the protocol directly.

use crate::codec::{
    Ack, DivideRatio, InventoryFlag, LinkTiming, MemoryBank, Query, QueryRep, Read, ReqRn, SelFlag, Session,
    TagEncoding,
};
use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Off,
    Query,
    QRep,
    Ack,
    ReqRn,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerControlMode {
    AlwaysOn,
    Periodic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStrategy {
    Const,
    Switch,
}

#[derive(Debug, Clone)]
pub struct Reader {
    pub state: ReaderState,
    pub session: Session,
    pub target: InventoryFlag,
    pub target_strategy: TargetStrategy,
    pub rounds_before_switch: u64,
    pub q: u8,
    pub dr: DivideRatio,
    pub m: TagEncoding,
    pub trext: bool,
    pub sel: SelFlag,
    pub power_control_mode: PowerControlMode,
    pub read_bank: MemoryBank,
    pub read_word_ptr: u32,
    pub read_word_count: u8,
    pub antenna_index: usize,
    round_index: u64,
    slot_index: u32,
    rn16: u16,
    handle: u16,
}

impl Reader {
    pub fn new(
        session: Session,
        q: u8,
        dr: DivideRatio,
        m: TagEncoding,
        trext: bool,
        read_word_count: u8,
    ) -> Reader {
        Reader {
            state: ReaderState::Off,
            session,
            target: InventoryFlag::A,
            target_strategy: TargetStrategy::Const,
            rounds_before_switch: 1,
            q,
            dr,
            m,
            trext,
            sel: SelFlag::All,
            power_control_mode: PowerControlMode::AlwaysOn,
            read_bank: MemoryBank::Tid,
            read_word_ptr: 0,
            read_word_count,
            antenna_index: 0,
            round_index: 0,
            slot_index: 0,
            rn16: 0,
            handle: 0,
        }
    }

    pub fn switch_antenna(&mut self, index: usize) {
        self.antenna_index = index;
    }

    fn maybe_switch_target(&mut self) {
        if self.target_strategy == TargetStrategy::Switch
            && self.rounds_before_switch > 0
            && self.round_index % self.rounds_before_switch == 0
        {
            self.target = self.target.invert();
        }
    }

    /// Starts a new inventory round and returns the `Query` to send.
    pub fn begin_round(&mut self) -> Query {
        self.round_index += 1;
        self.slot_index = 0;
        self.maybe_switch_target();
        self.state = ReaderState::Query;
        Query {
            dr: self.dr,
            m: self.m,
            trext: self.trext,
            sel: self.sel,
            session: self.session,
            target: self.target,
            q: self.q,
            crc: 0,
        }
    }

    /// Advances to the next slot, or `None` once the round's `2^Q` slots
    /// are exhausted.
    pub fn next_slot(&mut self) -> Option<QueryRep> {
        self.slot_index += 1;
        if self.slot_index >= (1u32 << self.q) {
            self.state = ReaderState::Off;
            return None;
        }
        self.state = ReaderState::QRep;
        Some(QueryRep { session: self.session })
    }

    pub fn round_index(&self) -> u64 {
        self.round_index
    }

    pub fn slot_index(&self) -> u32 {
        self.slot_index
    }

    pub fn handle_query_reply(&mut self, rn16: u16) -> Result<Ack, ModelError> {
        if !matches!(self.state, ReaderState::Query | ReaderState::QRep) {
            return Err(ModelError::UnexpectedReply { state: self.state_name(), reply: "QueryReply" });
        }
        self.rn16 = rn16;
        self.state = ReaderState::Ack;
        Ok(Ack { rn: rn16 })
    }

    pub fn handle_ack_reply(&mut self) -> Result<ReqRn, ModelError> {
        if self.state != ReaderState::Ack {
            return Err(ModelError::UnexpectedReply { state: self.state_name(), reply: "AckReply" });
        }
        self.state = ReaderState::ReqRn;
        Ok(ReqRn { rn: self.rn16, crc: 0 })
    }

    pub fn handle_req_rn_reply(&mut self, handle: u16) -> Result<Read, ModelError> {
        if self.state != ReaderState::ReqRn {
            return Err(ModelError::UnexpectedReply { state: self.state_name(), reply: "ReqRnReply" });
        }
        self.handle = handle;
        self.state = ReaderState::Read;
        Ok(Read {
            bank: self.read_bank,
            word_ptr: self.read_word_ptr,
            word_count: self.read_word_count,
            rn: handle,
            crc: 0,
        })
    }

    /// Whatever happens after a `Read` reply, success or not, the reader
    /// falls back to issuing `QueryRep` for the next slot.
    pub fn handle_read_reply(&mut self) -> Result<(), ModelError> {
        if self.state != ReaderState::Read {
            return Err(ModelError::UnexpectedReply { state: self.state_name(), reply: "ReadReply" });
        }
        self.state = ReaderState::QRep;
        Ok(())
    }

    fn state_name(&self) -> &'static str {
        match self.state {
            ReaderState::Off => "OFF",
            ReaderState::Query => "QUERY",
            ReaderState::QRep => "QREP",
            ReaderState::Ack => "ACK",
            ReaderState::ReqRn => "REQRN",
            ReaderState::Read => "READ",
        }
    }

    /// No reply, a collision, or a CRC/RN mismatch in any access state all
    /// abandon the current tag and move on to the next slot.
    pub fn handle_slot_failure(&mut self) {
        self.state = ReaderState::QRep;
    }

    /// Worst-case time the reader should wait for a reply before declaring
    /// the slot empty, for the state it is currently in.
    pub fn expected_reply_bitlen(&self) -> usize {
        use crate::codec::{AckReply, QueryReply, ReadReply, ReqRnReply};
        match self.state {
            ReaderState::Query | ReaderState::QRep => QueryReply::BITLEN,
            ReaderState::Ack => AckReply { epc_bytes: 12 }.bitlen(),
            ReaderState::ReqRn => ReqRnReply::BITLEN,
            ReaderState::Read => ReadReply { word_count: self.read_word_count }.bitlen(),
            ReaderState::Off => 0,
        }
    }

    pub fn get_timeout(&self, link: &LinkTiming) -> f64 {
        let (_, t1_max) = link.t1();
        let reply = crate::codec::reply_duration(
            self.expected_reply_bitlen(),
            link.dr,
            link.trcal,
            link.m,
            link.trext,
        );
        t1_max + reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> Reader {
        Reader::new(Session::S0, 4, DivideRatio::Dr8, TagEncoding::Fm0, false, 4)
    }

    #[test]
    fn round_progresses_through_all_slots() {
        let mut r = reader();
        r.begin_round();
        assert_eq!(r.round_index(), 1);
        let mut count = 0;
        while r.next_slot().is_some() {
            count += 1;
        }
        assert_eq!(count, (1u32 << 4) - 1);
    }

    #[test]
    fn full_access_sequence_returns_to_qrep() {
        let mut r = reader();
        r.begin_round();
        r.handle_query_reply(0xBEEF).unwrap();
        assert_eq!(r.state, ReaderState::Ack);
        r.handle_ack_reply().unwrap();
        assert_eq!(r.state, ReaderState::ReqRn);
        r.handle_req_rn_reply(0x1234).unwrap();
        assert_eq!(r.state, ReaderState::Read);
        r.handle_read_reply().unwrap();
        assert_eq!(r.state, ReaderState::QRep);
    }

    #[test]
    fn ack_reply_out_of_state_is_rejected() {
        let mut r = reader();
        r.begin_round();
        let err = r.handle_ack_reply().unwrap_err();
        assert!(matches!(err, crate::error::ModelError::UnexpectedReply { .. }));
    }

    #[test]
    fn target_switches_every_n_rounds_when_configured() {
        let mut r = reader();
        r.target_strategy = TargetStrategy::Switch;
        r.rounds_before_switch = 2;
        let initial = r.target;
        r.begin_round();
        assert_eq!(r.target, initial);
        r.begin_round();
        assert_eq!(r.target, initial.invert());
    }
}
