//! scenario.rs — the run's tunable parameters and the result it produces.
//!
//! Grounded on `pysim/models.py`'s `Settings` dataclass: every field here
//! has the same default value as the corresponding `Settings` field, and
//! `rtcal`/`trcal` are derived the same way, as multiples of `tari`.

use crate::codec::{DivideRatio, InventoryFlag, LinkTiming, MemoryBank, SelFlag, Session, TagEncoding, TempRange};
use crate::propagation::BerDistribution;

/// `1 / 3.6`: km/h to m/s.
pub const KMPH_TO_MPS_MUL: f64 = 1.0 / 3.6;

#[derive(Debug, Clone)]
pub struct Scenario {
    pub tari: f64,
    pub rtcal_tari_mul: f64,
    pub trcal_rtcal_mul: f64,
    pub q: u8,
    pub divide_ratio: DivideRatio,
    pub tag_encoding: TagEncoding,
    pub sel: SelFlag,
    pub session: Session,
    pub target: InventoryFlag,
    pub trext: bool,
    pub read_bank: MemoryBank,
    pub read_word_ptr: u32,
    pub tid_word_count: u8,
    pub temp_range: TempRange,
    pub epc: Vec<u8>,

    pub speed_kmph: f64,
    pub altitude_m: f64,
    pub reader_offset_m: f64,
    pub tag_offset_m: f64,
    pub pass_distance_m: f64,
    pub power_dbm: f64,
    pub sensitivity_dbm: f64,
    pub noise_power_dbm: f64,
    pub permittivity: f64,
    pub conductivity: f64,
    pub polarization: f64,
    pub wavelength_m: f64,
    pub symbol_duration_s: f64,
    pub preamble_duration_s: f64,
    pub bandwidth_hz: f64,
    pub ber_distribution: BerDistribution,
    /// When false, endpoint velocities are ignored in the channel model,
    /// so the path gain carries no time-varying (Doppler) phase term.
    pub use_doppler: bool,
    /// When false the access sequence stops after REQ_RN; no Read is ever sent.
    pub read_tid_bank: bool,

    pub num_tags: u32,
    /// Mean time between one tag entering the reader's field and the next,
    /// scheduled independently of any tag's own observation window — a
    /// population of tags can overlap and collide in the same slot.
    pub generation_interval_s: f64,
    pub sim_time_limit: Option<f64>,
    pub real_time_limit: Option<f64>,
    pub rng_seed: Option<u64>,
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            tari: 6.25e-6,
            rtcal_tari_mul: 3.0,
            trcal_rtcal_mul: 3.0,
            q: 4,
            divide_ratio: DivideRatio::Dr8,
            tag_encoding: TagEncoding::Fm0,
            sel: SelFlag::All,
            session: Session::S0,
            target: InventoryFlag::A,
            trext: false,
            read_bank: MemoryBank::Tid,
            read_word_ptr: 0,
            tid_word_count: 4,
            temp_range: TempRange::Nominal,
            epc: vec![0xFF; 12],

            speed_kmph: 5.0,
            altitude_m: 3.0,
            reader_offset_m: 0.0,
            tag_offset_m: 0.0,
            pass_distance_m: 50.0,
            power_dbm: 30.0,
            sensitivity_dbm: -18.0,
            noise_power_dbm: -80.0,
            permittivity: 5.0,
            conductivity: 0.01,
            polarization: 0.5,
            wavelength_m: 0.328,
            symbol_duration_s: 1.25e-6,
            preamble_duration_s: 9.3e-6,
            bandwidth_hz: 1.2e6,
            ber_distribution: BerDistribution::Rayleigh,
            use_doppler: true,
            read_tid_bank: true,

            num_tags: 1000,
            generation_interval_s: 1.0,
            sim_time_limit: None,
            real_time_limit: None,
            rng_seed: None,
        }
    }
}

impl Scenario {
    pub fn rtcal(&self) -> f64 {
        self.tari * self.rtcal_tari_mul
    }

    pub fn trcal(&self) -> f64 {
        self.rtcal() * self.trcal_rtcal_mul
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_kmph * KMPH_TO_MPS_MUL
    }

    pub fn link_timing(&self) -> LinkTiming {
        LinkTiming {
            tari: self.tari,
            rtcal: self.rtcal(),
            trcal: self.trcal(),
            dr: self.divide_ratio,
            m: self.tag_encoding,
            trext: self.trext,
            temp_range: self.temp_range,
        }
    }

    /// How long one tag stays within the reader's flight path, given the
    /// configured pass distance and speed.
    pub fn observation_window_s(&self) -> f64 {
        self.pass_distance_m / self.speed_mps()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunResult {
    pub rounds_per_tag: f64,
    pub inventory_prob: f64,
    pub read_tid_prob: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_link_params_match_tari_6_25() {
        let s = Scenario::default();
        assert!((s.rtcal() - 18.75e-6).abs() < 1e-12);
        assert!((s.trcal() - 56.25e-6).abs() < 1e-12);
    }
}
