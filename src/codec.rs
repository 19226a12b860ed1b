//! codec.rs — EPC Class-1 Gen-2 command/reply bit encodings and link timing.
//!
//! Grounded on `pysim/epcstd.py`: the parameter enums, the bit-level command
//! and reply encoders, the preamble/frame duration calculators, and the
//! `get_frt`/`min_link_t`/`max_link_t` timing tables from EPC Gen2 table
//! 6.16 and figure 6.18.

use std::f64::INFINITY;

// ---------------------------------------------------------------------
// Parameter enums
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DivideRatio {
    Dr8,
    Dr643,
}

impl DivideRatio {
    pub fn code(self) -> &'static str {
        match self {
            DivideRatio::Dr8 => "0",
            DivideRatio::Dr643 => "1",
        }
    }

    pub fn eval(self) -> f64 {
        match self {
            DivideRatio::Dr8 => 8.0,
            DivideRatio::Dr643 => 64.0 / 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryFlag {
    A,
    B,
}

impl InventoryFlag {
    pub fn invert(self) -> InventoryFlag {
        match self {
            InventoryFlag::A => InventoryFlag::B,
            InventoryFlag::B => InventoryFlag::A,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            InventoryFlag::A => "0",
            InventoryFlag::B => "1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Session {
    S0,
    S1,
    S2,
    S3,
}

impl Session {
    pub fn code(self) -> &'static str {
        match self {
            Session::S0 => "00",
            Session::S1 => "01",
            Session::S2 => "10",
            Session::S3 => "11",
        }
    }

    /// Minimum time a tag must stay powered for its inventoried flag to
    /// survive a power gap rather than reset to A. `S0` never persists.
    pub fn persistence(self) -> Option<f64> {
        match self {
            Session::S0 => None,
            Session::S1 => Some(0.5),
            Session::S2 => Some(2.0),
            Session::S3 => Some(2.0),
        }
    }

    /// Value a tag's inventoried flag takes on power-up, given the stored
    /// flag and how long the tag was powered off.
    pub fn power_on_value(self, stored: InventoryFlag, power_off_duration: f64) -> InventoryFlag {
        match self.persistence() {
            None => InventoryFlag::A,
            Some(persistence) if power_off_duration > persistence => InventoryFlag::A,
            Some(_) => stored,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagEncoding {
    Fm0,
    M2,
    M4,
    M8,
}

impl TagEncoding {
    pub fn code(self) -> &'static str {
        match self {
            TagEncoding::Fm0 => "00",
            TagEncoding::M2 => "01",
            TagEncoding::M4 => "10",
            TagEncoding::M8 => "11",
        }
    }

    pub fn symbols_per_bit(self) -> f64 {
        match self {
            TagEncoding::Fm0 => 1.0,
            TagEncoding::M2 => 2.0,
            TagEncoding::M4 => 4.0,
            TagEncoding::M8 => 8.0,
        }
    }

    pub fn get(m: u32) -> Option<TagEncoding> {
        match m {
            1 => Some(TagEncoding::Fm0),
            2 => Some(TagEncoding::M2),
            4 => Some(TagEncoding::M4),
            8 => Some(TagEncoding::M8),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelFlag {
    All,
    NotSel,
    Sel,
}

impl SelFlag {
    pub fn code(self) -> &'static str {
        match self {
            SelFlag::All => "00",
            SelFlag::NotSel => "10",
            SelFlag::Sel => "11",
        }
    }

    pub fn matches(self, selected: bool) -> bool {
        match self {
            SelFlag::All => true,
            SelFlag::NotSel => !selected,
            SelFlag::Sel => selected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryBank {
    Reserved,
    Epc,
    Tid,
    User,
}

impl MemoryBank {
    pub fn code(self) -> &'static str {
        match self {
            MemoryBank::Reserved => "00",
            MemoryBank::Epc => "01",
            MemoryBank::Tid => "10",
            MemoryBank::User => "11",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TempRange {
    Nominal,
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    Query,
    QueryRep,
    Ack,
    ReqRn,
    Read,
}

impl CommandCode {
    pub fn code(self) -> &'static str {
        match self {
            CommandCode::Query => "1000",
            CommandCode::QueryRep => "00",
            CommandCode::Ack => "01",
            CommandCode::ReqRn => "11000001",
            CommandCode::Read => "11000010",
        }
    }
}

// ---------------------------------------------------------------------
// Bit-level primitives
// ---------------------------------------------------------------------

pub fn encode_bool(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

pub fn encode_int(value: u64, n_bits: u32) -> String {
    let modulus = 1u64 << n_bits;
    format!("{:0width$b}", value % modulus, width = n_bits as usize)
}

pub fn encode_word(value: u16) -> String {
    encode_int(value as u64, 16)
}

pub fn encode_byte(value: u8) -> String {
    encode_int(value as u64, 8)
}

/// Extensible Bit Vector: 7-bit groups MSB-first, continuation bit set on
/// every group but the last.
pub fn encode_ebv(value: u32) -> String {
    fn inner(value: u32, first_block: bool) -> String {
        let prefix = if first_block { '0' } else { '1' };
        if value < 128 {
            format!("{}{:07b}", prefix, value)
        } else {
            format!("{}{}{:07b}", inner(value >> 7, false), prefix, value % 128)
        }
    }
    inner(value, true)
}

// ---------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct Query {
    pub dr: DivideRatio,
    pub m: TagEncoding,
    pub trext: bool,
    pub sel: SelFlag,
    pub session: Session,
    pub target: InventoryFlag,
    pub q: u8,
    pub crc: u8,
}

impl Query {
    pub fn encode(&self) -> String {
        format!(
            "{}{}{}{}{}{}{}{}{}",
            CommandCode::Query.code(),
            self.dr.code(),
            self.m.code(),
            encode_bool(self.trext),
            self.sel.code(),
            self.session.code(),
            self.target.code(),
            encode_int(self.q as u64, 4),
            encode_int(self.crc as u64, 5),
        )
    }

    pub const BITLEN: usize = 22;
}

#[derive(Debug, Clone, Copy)]
pub struct QueryRep {
    pub session: Session,
}

impl QueryRep {
    pub fn encode(&self) -> String {
        format!("{}{}", CommandCode::QueryRep.code(), self.session.code())
    }

    pub const BITLEN: usize = 4;
}

#[derive(Debug, Clone, Copy)]
pub struct Ack {
    pub rn: u16,
}

impl Ack {
    pub fn encode(&self) -> String {
        format!("{}{}", CommandCode::Ack.code(), encode_int(self.rn as u64, 16))
    }

    pub const BITLEN: usize = 18;
}

#[derive(Debug, Clone, Copy)]
pub struct ReqRn {
    pub rn: u16,
    pub crc: u16,
}

impl ReqRn {
    pub fn encode(&self) -> String {
        format!(
            "{}{}{}",
            CommandCode::ReqRn.code(),
            encode_word(self.rn),
            encode_word(self.crc)
        )
    }

    pub const BITLEN: usize = 40;
}

#[derive(Debug, Clone, Copy)]
pub struct Read {
    pub bank: MemoryBank,
    pub word_ptr: u32,
    pub word_count: u8,
    pub rn: u16,
    pub crc: u16,
}

impl Read {
    pub fn encode(&self) -> String {
        format!(
            "{}{}{}{}{}{}",
            CommandCode::Read.code(),
            self.bank.code(),
            encode_ebv(self.word_ptr),
            encode_byte(self.word_count),
            encode_word(self.rn),
            encode_word(self.crc)
        )
    }

    pub fn bitlen(&self) -> usize {
        self.encode().len()
    }
}

// ---------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------

pub struct QueryReply;
impl QueryReply {
    pub const BITLEN: usize = 16;
}

pub struct AckReply {
    pub epc_bytes: usize,
}
impl AckReply {
    pub fn bitlen(&self) -> usize {
        32 + 8 * self.epc_bytes
    }
}

pub struct ReqRnReply;
impl ReqRnReply {
    pub const BITLEN: usize = 32;
}

pub struct ReadReply {
    pub word_count: u8,
}
impl ReadReply {
    pub fn bitlen(&self) -> usize {
        33 + 16 * self.word_count as usize
    }
}

// ---------------------------------------------------------------------
// Preambles and frame durations
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ReaderSync {
    pub tari: f64,
    pub rtcal: f64,
    pub delim: f64,
}

impl ReaderSync {
    pub fn data0(&self) -> f64 {
        self.tari
    }

    pub fn data1(&self) -> f64 {
        self.rtcal - self.tari
    }

    pub fn duration(&self) -> f64 {
        self.delim + self.tari + self.rtcal
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReaderPreamble {
    pub sync: ReaderSync,
    pub trcal: f64,
}

impl ReaderPreamble {
    pub fn duration(&self) -> f64 {
        self.sync.duration() + self.trcal
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TagPreamble {
    Fm0 { extended: bool },
    Miller { m: TagEncoding, extended: bool },
}

impl TagPreamble {
    pub fn bitlen(&self) -> usize {
        match self {
            TagPreamble::Fm0 { extended } => {
                if *extended {
                    18
                } else {
                    6
                }
            }
            TagPreamble::Miller { m, extended } => {
                debug_assert!(matches!(m, TagEncoding::M2 | TagEncoding::M4 | TagEncoding::M8));
                if *extended {
                    22
                } else {
                    10
                }
            }
        }
    }

    pub fn create(encoding: TagEncoding, extended: bool) -> TagPreamble {
        match encoding {
            TagEncoding::Fm0 => TagPreamble::Fm0 { extended },
            m => TagPreamble::Miller { m, extended },
        }
    }
}

/// Reader-to-tag frame: PIE-encoded body plus sync/preamble.
pub struct ReaderFrame {
    pub preamble: ReaderPreamble,
    pub command_bits: String,
}

impl ReaderFrame {
    pub fn body_duration(&self) -> f64 {
        let zeros = self.command_bits.chars().filter(|&c| c == '0').count() as f64;
        let ones = self.command_bits.chars().filter(|&c| c == '1').count() as f64;
        zeros * self.preamble.sync.data0() + ones * self.preamble.sync.data1()
    }

    pub fn duration(&self) -> f64 {
        self.preamble.duration() + self.body_duration()
    }
}

/// Backscatter link frequency for the given divide ratio / TRcal.
pub fn get_blf(dr: DivideRatio, trcal: f64) -> f64 {
    dr.eval() / trcal
}

pub fn tag_bitrate(blf: f64, m: TagEncoding) -> f64 {
    blf / m.symbols_per_bit()
}

/// Duration of a tag reply of `reply_bitlen` bits under the given link
/// settings, including its preamble and one trailing dummy bit.
pub fn reply_duration(
    reply_bitlen: usize,
    dr: DivideRatio,
    trcal: f64,
    encoding: TagEncoding,
    trext: bool,
) -> f64 {
    let blf = get_blf(dr, trcal);
    let bitrate = tag_bitrate(blf, encoding);
    let preamble = TagPreamble::create(encoding, trext);
    (preamble.bitlen() + reply_bitlen + 1) as f64 / bitrate
}

pub fn command_duration(reader_sync: ReaderSync, trcal: f64, command_bits: &str) -> f64 {
    let frame = ReaderFrame {
        preamble: ReaderPreamble { sync: reader_sync, trcal },
        command_bits: command_bits.to_string(),
    };
    frame.duration()
}

// ---------------------------------------------------------------------
// Frequency tolerance table (EPC Gen2 table 6.16) and link timers
// ---------------------------------------------------------------------

const FRT_DR643_EXTENDED: &[(f64, f64)] = &[
    (33.633, 0.15),
    (66.033, 0.22),
    (82.467, 0.15),
    (84.133, 0.10),
    (131.967, 0.12),
    (198.00, 0.07),
    (227.25, 0.05),
];

const FRT_DR643_NOMINAL: &[(f64, f64)] = &[
    (33.633, 0.15),
    (66.033, 0.22),
    (67.367, 0.10),
    (82.467, 0.12),
    (131.967, 0.10),
    (198.00, 0.07),
    (227.25, 0.05),
];

const FRT_DR8_EXTENDED: &[(f64, f64)] = &[
    (24.7500, 0.19),
    (30.9375, 0.15),
    (49.50, 0.10),
    (75.0000, 0.07),
    (202.0, 0.04),
];

const FRT_DR8_NOMINAL: &[(f64, f64)] = &[
    (24.75, 0.19),
    (25.25, 0.10),
    (30.9375, 0.12),
    (49.50, 0.10),
    (75.00, 0.07),
    (202.000, 0.04),
];

/// Frequency tolerance for the given divide ratio/TRcal/temperature range.
pub fn get_frt(trcal: f64, dr: DivideRatio, temp_range: TempRange) -> f64 {
    let table = match (dr, temp_range) {
        (DivideRatio::Dr643, TempRange::Extended) => FRT_DR643_EXTENDED,
        (DivideRatio::Dr643, TempRange::Nominal) => FRT_DR643_NOMINAL,
        (DivideRatio::Dr8, TempRange::Extended) => FRT_DR8_EXTENDED,
        (DivideRatio::Dr8, TempRange::Nominal) => FRT_DR8_NOMINAL,
    };
    for &(highest_trcal, frt) in table {
        if trcal < highest_trcal * 1e-6 {
            return frt;
        }
    }
    table.last().unwrap().1
}

pub fn get_pri(trcal: f64, dr: DivideRatio) -> f64 {
    trcal / dr.eval()
}

/// T1..T7 bounds from EPC Gen2 §6.3.1.2.8, addressed 1-based as in the
/// standard's own numbering.
pub fn min_link_t(index: u8, tari: f64, rtcal: f64, trcal: f64, dr: DivideRatio, temp_range: TempRange) -> f64 {
    let pri = get_pri(trcal, dr);
    let frt = get_frt(trcal, dr, temp_range);
    match index {
        1 | 5 | 6 => rtcal.max(pri * 10.0) * (1.0 - frt) - 2e-6,
        2 => 3.0 * pri,
        3 => 0.0,
        4 => 2.0 * rtcal,
        7 => max_link_t(2, tari, rtcal, trcal, dr, temp_range).max(250e-6),
        _ => panic!("link timer index out of range: {index}"),
    }
}

pub fn max_link_t(index: u8, tari: f64, rtcal: f64, trcal: f64, dr: DivideRatio, temp_range: TempRange) -> f64 {
    let pri = get_pri(trcal, dr);
    let frt = get_frt(trcal, dr, temp_range);
    match index {
        1 => rtcal.max(pri * 10.0) * (1.0 + frt) + 2e-6,
        2 => 20.0 * pri,
        3 => INFINITY,
        4 => INFINITY,
        5 | 6 | 7 => 0.02,
        _ => panic!("link timer index out of range: {index}"),
    }
}

// ---------------------------------------------------------------------
// Slot duration estimators
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    Empty,
    Collision,
    Inventory,
    Access,
}

/// Link settings bundled together because nearly every timing function
/// above needs all of them at once.
#[derive(Debug, Clone, Copy)]
pub struct LinkTiming {
    pub tari: f64,
    pub rtcal: f64,
    pub trcal: f64,
    pub dr: DivideRatio,
    pub m: TagEncoding,
    pub trext: bool,
    pub temp_range: TempRange,
}

impl LinkTiming {
    fn sync(&self) -> ReaderSync {
        ReaderSync { tari: self.tari, rtcal: self.rtcal, delim: 12.5e-6 }
    }

    /// `(T1 min, T1 max)` for this link's own `temp_range`.
    pub fn t1(&self) -> (f64, f64) {
        (
            min_link_t(1, self.tari, self.rtcal, self.trcal, self.dr, self.temp_range),
            max_link_t(1, self.tari, self.rtcal, self.trcal, self.dr, self.temp_range),
        )
    }

    pub fn t2_max(&self) -> f64 {
        max_link_t(2, self.tari, self.rtcal, self.trcal, self.dr, self.temp_range)
    }

    pub fn t3_min(&self) -> f64 {
        min_link_t(3, self.tari, self.rtcal, self.trcal, self.dr, self.temp_range)
    }

    fn query_rep_duration(&self) -> f64 {
        command_duration(self.sync(), self.trcal, &QueryRep { session: Session::S0 }.encode())
    }

    fn reply_duration(&self, bitlen: usize) -> f64 {
        reply_duration(bitlen, self.dr, self.trcal, self.m, self.trext)
    }

    /// Expected-value estimate: command, silence until `T1` midpoint, the
    /// reply, and the mandatory `T2` gap before the next command.
    pub fn slot_duration(&self, kind: SlotType) -> f64 {
        let (t1_min, t1_max) = self.t1();
        let t1_mid = 0.5 * (t1_min + t1_max);
        let cmd = self.query_rep_duration();
        match kind {
            SlotType::Empty => cmd + t1_max + self.t3_min(),
            SlotType::Collision => cmd + t1_mid + self.reply_duration(QueryReply::BITLEN) + self.t2_max(),
            SlotType::Inventory => {
                cmd + t1_mid
                    + self.reply_duration(QueryReply::BITLEN)
                    + self.t2_max()
                    + self.reply_duration(AckReply { epc_bytes: 12 }.bitlen())
                    + self.t2_max()
            }
            SlotType::Access => {
                self.slot_duration(SlotType::Inventory)
                    + self.reply_duration(ReqRnReply::BITLEN)
                    + self.t2_max()
                    + self.reply_duration(ReadReply { word_count: 4 }.bitlen())
                    + self.t2_max()
            }
        }
    }

    fn with_encoding(&self, m: TagEncoding, trext: bool) -> LinkTiming {
        LinkTiming { m, trext, ..*self }
    }

    /// Fastest possible tag reply (FM0, no extended preamble).
    pub fn slot_duration_min(&self, kind: SlotType) -> f64 {
        self.with_encoding(TagEncoding::Fm0, false).slot_duration(kind)
    }

    /// Slowest possible tag reply (Miller-8, extended preamble).
    pub fn slot_duration_max(&self, kind: SlotType) -> f64 {
        self.with_encoding(TagEncoding::M8, true).slot_duration(kind)
    }
}

/// A flattened snapshot of every duration/timer value, used to back the
/// CLI's `--verbose` elementary-timings table.
pub struct ElementaryTimings {
    pub tari: f64,
    pub rtcal: f64,
    pub trcal: f64,
    pub delim: f64,
    pub blf: f64,
    pub query_duration: f64,
    pub query_rep_duration: f64,
    pub ack_duration: f64,
    pub req_rn_duration: f64,
    pub t1_min: f64,
    pub t1_max: f64,
    pub t2_min: f64,
    pub t2_max: f64,
    pub t3_min: f64,
    pub t4_min: f64,
}

pub fn get_elementary_timings(link: &LinkTiming) -> ElementaryTimings {
    let sync = link.sync();
    let (t1_min, t1_max) = link.t1();
    ElementaryTimings {
        tari: link.tari,
        rtcal: link.rtcal,
        trcal: link.trcal,
        delim: sync.delim,
        blf: get_blf(link.dr, link.trcal),
        query_duration: command_duration(
            sync,
            link.trcal,
            &Query {
                dr: link.dr,
                m: link.m,
                trext: link.trext,
                sel: SelFlag::All,
                session: Session::S0,
                target: InventoryFlag::A,
                q: 4,
                crc: 0,
            }
            .encode(),
        ),
        query_rep_duration: link.query_rep_duration(),
        ack_duration: command_duration(sync, link.trcal, &Ack { rn: 0 }.encode()),
        req_rn_duration: command_duration(sync, link.trcal, &ReqRn { rn: 0, crc: 0 }.encode()),
        t1_min,
        t1_max,
        t2_min: min_link_t(2, link.tari, link.rtcal, link.trcal, link.dr, link.temp_range),
        t2_max: link.t2_max(),
        t3_min: link.t3_min(),
        t4_min: min_link_t(4, link.tari, link.rtcal, link.trcal, link.dr, link.temp_range),
    }
}

/// Formats every field of `timings` as a microsecond string, the way the
/// CLI's `--verbose` table renders them.
pub fn prettify_elementary_timings(timings: &ElementaryTimings) -> Vec<(&'static str, String)> {
    let us = |v: f64| format!("{:.3} us", v * 1e6);
    vec![
        ("Tari", us(timings.tari)),
        ("RTcal", us(timings.rtcal)),
        ("TRcal", us(timings.trcal)),
        ("Delim", us(timings.delim)),
        ("BLF", format!("{:.3} kHz", timings.blf / 1e3)),
        ("Query duration", us(timings.query_duration)),
        ("QueryRep duration", us(timings.query_rep_duration)),
        ("Ack duration", us(timings.ack_duration)),
        ("ReqRN duration", us(timings.req_rn_duration)),
        ("T1 min", us(timings.t1_min)),
        ("T1 max", us(timings.t1_max)),
        ("T2 min", us(timings.t2_min)),
        ("T2 max", us(timings.t2_max)),
        ("T3 min", us(timings.t3_min)),
        ("T4 min", us(timings.t4_min)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ebv_vectors() {
        assert_eq!(encode_ebv(0), "00000000");
        assert_eq!(encode_ebv(127), "01111111");
        assert_eq!(encode_ebv(128), "1000000100000000");
        assert_eq!(encode_ebv(16383), "1111111101111111");
        assert_eq!(encode_ebv(16384), "100000011000000000000000");
    }

    #[test]
    fn command_bitlens() {
        let q = Query {
            dr: DivideRatio::Dr8,
            m: TagEncoding::Fm0,
            trext: false,
            sel: SelFlag::All,
            session: Session::S0,
            target: InventoryFlag::A,
            q: 4,
            crc: 0,
        };
        assert_eq!(q.encode().len(), Query::BITLEN);
        assert_eq!(QueryRep { session: Session::S0 }.encode().len(), QueryRep::BITLEN);
        assert_eq!(Ack { rn: 0 }.encode().len(), Ack::BITLEN);
        assert_eq!(ReqRn { rn: 0, crc: 0 }.encode().len(), ReqRn::BITLEN);
        let read = Read { bank: MemoryBank::Tid, word_ptr: 0, word_count: 4, rn: 0, crc: 0 };
        assert!(read.bitlen() >= 58);
    }

    #[test]
    fn reply_bitlens() {
        assert_eq!(QueryReply::BITLEN, 16);
        assert_eq!(AckReply { epc_bytes: 12 }.bitlen(), 32 + 8 * 12);
        assert_eq!(ReqRnReply::BITLEN, 32);
        assert_eq!(ReadReply { word_count: 4 }.bitlen(), 33 + 16 * 4);
    }

    #[test]
    fn query_frame_duration_tari_6_25() {
        let sync = ReaderSync { tari: 6.25e-6, rtcal: 18.75e-6, delim: 12.5e-6 };
        let q = Query {
            dr: DivideRatio::Dr8,
            m: TagEncoding::Fm0,
            trext: false,
            sel: SelFlag::All,
            session: Session::S0,
            target: InventoryFlag::A,
            q: 4,
            crc: 0,
        };
        let d = command_duration(sync, 56.25e-6, &q.encode());
        assert!((d - 293.75e-6).abs() < 1e-9, "got {d}");
    }

    #[test]
    fn query_rep_frame_duration_two_syncs() {
        let sync_a = ReaderSync { tari: 12.5e-6, rtcal: 31.25e-6, delim: 12.5e-6 };
        let qrep = QueryRep { session: Session::S0 };
        let da = command_duration(sync_a, 56.25e-6, &qrep.encode());
        assert!((da - 118.75e-6).abs() < 1e-9, "got {da}");

        let sync_b = ReaderSync { tari: 25e-6, rtcal: 62.5e-6, delim: 12.5e-6 };
        let db = command_duration(sync_b, 56.25e-6, &qrep.encode());
        assert!((db - 225e-6).abs() < 1e-9, "got {db}");
    }

    #[test]
    fn link_timers_tari_25_dr8() {
        let tari = 25e-6;
        let rtcal = 75e-6;
        let trcal = 225e-6;
        let dr = DivideRatio::Dr8;
        let t = TempRange::Nominal;
        assert!((min_link_t(4, tari, rtcal, trcal, dr, t) - 150e-6).abs() < 1e-9);
        let t2_min = min_link_t(2, tari, rtcal, trcal, dr, t);
        let t2_max = max_link_t(2, tari, rtcal, trcal, dr, t);
        assert!((t2_min - 84.375e-6).abs() < 1e-9, "got {t2_min}");
        assert!((t2_max - 562.5e-6).abs() < 1e-9, "got {t2_max}");
        assert!((max_link_t(5, tari, rtcal, trcal, dr, t) - 0.02).abs() < 1e-12);
        assert!((max_link_t(6, tari, rtcal, trcal, dr, t) - 0.02).abs() < 1e-12);
        assert!((max_link_t(7, tari, rtcal, trcal, dr, t) - 0.02).abs() < 1e-12);
        assert!((min_link_t(7, tari, rtcal, trcal, dr, t) - 562.5e-6).abs() < 1e-9);
    }

    #[test]
    fn frt_table_boundaries() {
        assert!((get_frt(24e-6, DivideRatio::Dr8, TempRange::Nominal) - 0.19).abs() < 1e-9);
        assert!((get_frt(300e-6, DivideRatio::Dr8, TempRange::Nominal) - 0.04).abs() < 1e-9);
        assert!((get_frt(30e-6, DivideRatio::Dr643, TempRange::Extended) - 0.22).abs() < 1e-9);
        assert!((get_frt(300e-6, DivideRatio::Dr643, TempRange::Extended) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn tag_preamble_bitlens() {
        assert_eq!(TagPreamble::create(TagEncoding::Fm0, false).bitlen(), 6);
        assert_eq!(TagPreamble::create(TagEncoding::Fm0, true).bitlen(), 18);
        assert_eq!(TagPreamble::create(TagEncoding::M4, false).bitlen(), 10);
        assert_eq!(TagPreamble::create(TagEncoding::M4, true).bitlen(), 22);
    }

    #[test]
    fn session_persistence() {
        assert_eq!(Session::S0.power_on_value(InventoryFlag::B, 0.0), InventoryFlag::A);
        assert_eq!(Session::S1.power_on_value(InventoryFlag::B, 0.1), InventoryFlag::B);
        assert_eq!(Session::S1.power_on_value(InventoryFlag::B, 1.0), InventoryFlag::A);
    }
}
