//! tag.rs — the passive tag's inventory/access state machine.
//!
//! `objects.py`'s `Tag` class was not available in the reference pack
//! (filtered out of the retrieval set), so this module is built directly
//! from the reader/tag interaction rules described for the simulated
//! protocol: a tag tracks one inventoried flag per session, a slot
//! counter while arbitrating, and a handle once acknowledged.

use crate::codec::{InventoryFlag, MemoryBank, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagState {
    Off,
    Ready,
    Arbitrate,
    Reply,
    Acknowledged,
    Secured,
}

#[derive(Debug, Clone)]
pub struct Tag {
    pub id: u64,
    pub epc: Vec<u8>,
    pub tid: Vec<u8>,
    pub user_memory: Vec<u8>,
    pub state: TagState,
    session_flags: [InventoryFlag; 4],
    pub selected: bool,
    slot_counter: u32,
    rn16: u16,
    handle: u16,
    last_power_off: Option<f64>,
    active_session: Option<Session>,
}

fn session_index(session: Session) -> usize {
    match session {
        Session::S0 => 0,
        Session::S1 => 1,
        Session::S2 => 2,
        Session::S3 => 3,
    }
}

impl Tag {
    pub fn new(id: u64, epc: Vec<u8>, tid: Vec<u8>) -> Tag {
        Tag {
            id,
            epc,
            tid,
            user_memory: Vec::new(),
            state: TagState::Off,
            session_flags: [InventoryFlag::A; 4],
            selected: true,
            slot_counter: 0,
            rn16: 0,
            handle: 0,
            last_power_off: None,
            active_session: None,
        }
    }

    pub fn is_powered(&self) -> bool {
        self.state != TagState::Off
    }

    /// Apply per-session flag persistence and enter READY. `now` is the
    /// kernel's current simulation time.
    pub fn power_on(&mut self, now: f64) {
        let off_duration = self.last_power_off.map(|t| now - t).unwrap_or(f64::INFINITY);
        const SESSIONS: [Session; 4] = [Session::S0, Session::S1, Session::S2, Session::S3];
        for i in 0..4 {
            self.session_flags[i] = SESSIONS[i].power_on_value(self.session_flags[i], off_duration);
        }
        self.state = TagState::Ready;
    }

    pub fn power_off(&mut self, now: f64) {
        self.last_power_off = Some(now);
        self.state = TagState::Off;
        self.active_session = None;
    }

    fn inventoried_flag(&self, session: Session) -> InventoryFlag {
        self.session_flags[session_index(session)]
    }

    /// The RN16 drawn for the current slot, valid once the tag has
    /// entered `Reply`.
    pub fn rn16(&self) -> u16 {
        self.rn16
    }

    fn invert_flag(&mut self, session: Session) {
        let idx = session_index(session);
        self.session_flags[idx] = self.session_flags[idx].invert();
    }

    fn draw_rn16(rng: &mut impl rand::RngCore) -> u16 {
        rand::Rng::gen_range(rng, 0..=0xFFFFu32) as u16
    }

    /// A `Query` starts a new round for this tag (any prior round state is
    /// abandoned). Returns the assigned slot, or `None` if the tag does
    /// not participate (not selected, session flag doesn't match target,
    /// or the tag is off).
    pub fn receive_query(
        &mut self,
        session: Session,
        target: InventoryFlag,
        sel_matches: bool,
        q: u8,
        rng: &mut impl rand::RngCore,
    ) -> Option<u32> {
        if !self.is_powered() {
            return None;
        }
        if !matches!(self.state, TagState::Ready | TagState::Arbitrate | TagState::Reply) {
            if let Some(active) = self.active_session.take() {
                self.invert_flag(active);
            }
            self.state = TagState::Ready;
        }
        if !sel_matches || self.inventoried_flag(session) != target {
            self.state = TagState::Ready;
            return None;
        }
        self.active_session = Some(session);
        let slots = 1u32 << q;
        let slot = rand::Rng::gen_range(rng, 0..slots);
        if slot == 0 {
            self.rn16 = Self::draw_rn16(rng);
            self.state = TagState::Reply;
        } else {
            self.slot_counter = slot;
            self.state = TagState::Arbitrate;
        }
        Some(slot)
    }

    /// Returns `Some(rn16)` if this tag's slot counter reaches zero and it
    /// replies this slot. Ignored unless `session` is the one this tag is
    /// currently arbitrating in. A tag still parked in ACKNOWLEDGED/SECURED
    /// from a prior round treats this as the start of a new slot: it
    /// inverts its flag and falls back to READY.
    pub fn receive_query_rep(&mut self, session: Session, rng: &mut impl rand::RngCore) -> Option<u16> {
        if self.active_session != Some(session) {
            return None;
        }
        match self.state {
            TagState::Arbitrate => {
                self.slot_counter -= 1;
                if self.slot_counter == 0 {
                    self.rn16 = Self::draw_rn16(rng);
                    self.state = TagState::Reply;
                    Some(self.rn16)
                } else {
                    None
                }
            }
            TagState::Acknowledged | TagState::Secured => {
                self.invert_flag(session);
                self.active_session = None;
                self.state = TagState::Ready;
                None
            }
            _ => None,
        }
    }

    /// Returns the EPC if the acknowledgement's RN16 matches. The
    /// session-specific inventoried flag is not flipped here; it inverts
    /// lazily the next time this tag is addressed while parked in
    /// ACKNOWLEDGED/SECURED (see `receive_query`/`receive_query_rep`).
    pub fn receive_ack(&mut self, session: Session, rn: u16) -> Option<Vec<u8>> {
        let _ = session;
        if self.state == TagState::Reply && rn == self.rn16 {
            self.state = TagState::Acknowledged;
            Some(self.epc.clone())
        } else {
            self.state = TagState::Ready;
            None
        }
    }

    pub fn receive_req_rn(&mut self, rn: u16, rng: &mut impl rand::RngCore) -> Option<u16> {
        let expected = if self.state == TagState::Secured { self.handle } else { self.rn16 };
        if matches!(self.state, TagState::Acknowledged | TagState::Secured) && rn == expected {
            self.handle = Self::draw_rn16(rng);
            self.state = TagState::Secured;
            Some(self.handle)
        } else {
            self.state = TagState::Ready;
            None
        }
    }

    pub fn receive_read(&mut self, bank: MemoryBank, word_ptr: u32, word_count: u8, rn: u16) -> Option<Vec<u8>> {
        if self.state != TagState::Secured || rn != self.handle {
            self.state = TagState::Ready;
            return None;
        }
        let source: &[u8] = match bank {
            MemoryBank::Tid => &self.tid,
            MemoryBank::Epc => &self.epc,
            MemoryBank::User => &self.user_memory,
            MemoryBank::Reserved => &[],
        };
        let start = word_ptr as usize * 2;
        let len = word_count as usize * 2;
        if start + len > source.len() {
            return None;
        }
        Some(source[start..start + len].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn tag() -> Tag {
        let mut t = Tag::new(1, vec![0xAB; 12], vec![0xCD; 8]);
        t.power_on(0.0);
        t
    }

    #[test]
    fn power_on_resets_s0_to_a() {
        let mut t = tag();
        t.session_flags[0] = InventoryFlag::B;
        t.power_on(10.0);
        assert_eq!(t.inventoried_flag(Session::S0), InventoryFlag::A);
    }

    #[test]
    fn zero_slot_replies_immediately() {
        let mut t = tag();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        loop {
            let slot = t.receive_query(Session::S0, InventoryFlag::A, true, 0, &mut rng);
            assert_eq!(slot, Some(0));
            break;
        }
        assert_eq!(t.state, TagState::Reply);
    }

    #[test]
    fn full_round_trip_to_read() {
        let mut t = tag();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let slot = t.receive_query(Session::S0, InventoryFlag::A, true, 0, &mut rng).unwrap();
        assert_eq!(slot, 0);
        let rn16 = t.rn16;
        let epc = t.receive_ack(Session::S0, rn16).expect("ack should match");
        assert_eq!(epc, vec![0xAB; 12]);
        let handle = t.receive_req_rn(rn16, &mut rng).expect("req_rn should match");
        let data = t.receive_read(MemoryBank::Tid, 0, 4, handle).expect("read should succeed");
        assert_eq!(data, vec![0xCD; 8]);
    }

    #[test]
    fn mismatched_target_does_not_participate() {
        let mut t = tag();
        let mut rng = rand::rngs::StdRng::seed_from_u64(2);
        let slot = t.receive_query(Session::S0, InventoryFlag::B, true, 4, &mut rng);
        assert_eq!(slot, None);
    }

    #[test]
    fn acknowledged_tag_inverts_flag_and_returns_to_ready_on_next_query_rep() {
        let mut t = tag();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        t.receive_query(Session::S0, InventoryFlag::A, true, 0, &mut rng).unwrap();
        let rn16 = t.rn16;
        t.receive_ack(Session::S0, rn16).expect("ack should match");
        assert_eq!(t.state, TagState::Acknowledged);
        assert_eq!(t.inventoried_flag(Session::S0), InventoryFlag::A);

        let reply = t.receive_query_rep(Session::S0, &mut rng);
        assert_eq!(reply, None);
        assert_eq!(t.state, TagState::Ready);
        assert_eq!(t.inventoried_flag(Session::S0), InventoryFlag::B);
    }

    #[test]
    fn secured_tag_inverts_flag_on_next_query_pre_step() {
        let mut t = tag();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        t.receive_query(Session::S0, InventoryFlag::A, true, 0, &mut rng).unwrap();
        let rn16 = t.rn16;
        t.receive_ack(Session::S0, rn16).unwrap();
        t.receive_req_rn(rn16, &mut rng).expect("req_rn should match");
        assert_eq!(t.state, TagState::Secured);

        let slot = t.receive_query(Session::S0, InventoryFlag::B, true, 0, &mut rng);
        assert_eq!(t.inventoried_flag(Session::S0), InventoryFlag::B);
        assert_eq!(slot, Some(0));
        assert_eq!(t.state, TagState::Reply);
    }

    #[test]
    fn query_rep_with_mismatched_session_does_not_advance_slot_counter() {
        let mut t = tag();
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        t.receive_query(Session::S0, InventoryFlag::A, true, 4, &mut rng).unwrap();
        assert_eq!(t.state, TagState::Arbitrate);
        let counter_before = t.slot_counter;

        let reply = t.receive_query_rep(Session::S1, &mut rng);
        assert_eq!(reply, None);
        assert_eq!(t.state, TagState::Arbitrate);
        assert_eq!(t.slot_counter, counter_before);
    }
}
