//! transaction.rs — the outcome of one reader command / tag reply
//! exchange: collision detection, channel-driven decode success, and the
//! resulting wall-clock duration for the kernel to advance by.
//!
//! Grounded on `pysim/handlers.py`'s `_build_transaction`/`finish_transaction`
//! pair: a transaction is built from the command just sent and whichever
//! tags answered it, then resolved against the channel model before the
//! reader is told whether it heard a usable reply.

use rand::RngCore;

use crate::codec::{reply_duration, LinkTiming, TempRange};
use crate::propagation::{ber, snr, snr_full, BerDistribution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    /// No tag replied.
    Empty,
    /// Two or more tags replied in the same slot; their signals interfere
    /// and the reader cannot decode any of them.
    Collision,
    /// Exactly one tag replied and the reader decoded it correctly.
    Decoded,
    /// Exactly one tag replied but bit errors corrupted the reply beyond
    /// recognition — indistinguishable from `Empty` to the reader.
    Garbled,
}

impl SlotOutcome {
    pub fn reply_heard(self) -> bool {
        matches!(self, SlotOutcome::Decoded)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Transaction {
    pub command_duration: f64,
    pub outcome: SlotOutcome,
    pub t1: f64,
    pub reply_duration: f64,
    pub t2: f64,
}

impl Transaction {
    /// `replying_tag_count` is how many tags physically answered this
    /// command (0, 1, or more). `channel_power_db`/`noise_power_db` are
    /// the received signal and noise floor for the single-reply case.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        command_duration: f64,
        replying_tag_count: usize,
        reply_bitlen: usize,
        channel_power_db: f64,
        noise_power_db: f64,
        symbol_duration: f64,
        preamble_duration: f64,
        bandwidth: f64,
        distribution: BerDistribution,
        link: &LinkTiming,
        rng: &mut impl RngCore,
    ) -> Transaction {
        let (t1_min, t1_max) = link.t1();
        let t2_max = link.t2_max();
        let t3_min = link.t3_min();

        let outcome = match replying_tag_count {
            0 => SlotOutcome::Empty,
            1 => {
                let raw_snr = snr(channel_power_db, noise_power_db);
                let effective = snr_full(raw_snr, link.m.symbols_per_bit(), symbol_duration, preamble_duration, bandwidth, 1e-8);
                let bit_error_rate = ber(effective, distribution, 1e-8);
                let p_success = (1.0 - bit_error_rate).powi(reply_bitlen as i32);
                if rng.gen_bool(p_success.clamp(0.0, 1.0)) {
                    SlotOutcome::Decoded
                } else {
                    SlotOutcome::Garbled
                }
            }
            _ => SlotOutcome::Collision,
        };

        let (t1, reply_duration_value, t2) = match outcome {
            SlotOutcome::Empty => (t1_max, 0.0, t3_min),
            SlotOutcome::Collision | SlotOutcome::Garbled => {
                (0.5 * (t1_min + t1_max), reply_duration(reply_bitlen, link.dr, link.trcal, link.m, link.trext), t2_max)
            }
            SlotOutcome::Decoded => {
                (0.5 * (t1_min + t1_max), reply_duration(reply_bitlen, link.dr, link.trcal, link.m, link.trext), t2_max)
            }
        };

        Transaction { command_duration, outcome, t1, reply_duration: reply_duration_value, t2 }
    }

    pub fn total_duration(&self) -> f64 {
        self.command_duration + self.t1 + self.reply_duration + self.t2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DivideRatio, TagEncoding};
    use rand::SeedableRng;

    fn link() -> LinkTiming {
        LinkTiming {
            tari: 6.25e-6,
            rtcal: 18.75e-6,
            trcal: 56.25e-6,
            dr: DivideRatio::Dr8,
            m: TagEncoding::Fm0,
            trext: false,
            temp_range: TempRange::Nominal,
        }
    }

    #[test]
    fn empty_slot_has_no_reply_duration() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let tx = Transaction::build(100e-6, 0, 16, -60.0, -90.0, 1.25e-6, 9.3e-6, 1.2e6, BerDistribution::Rayleigh, &link(), &mut rng);
        assert_eq!(tx.outcome, SlotOutcome::Empty);
        assert_eq!(tx.reply_duration, 0.0);
    }

    #[test]
    fn collision_is_never_decoded() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let tx = Transaction::build(100e-6, 2, 16, -40.0, -90.0, 1.25e-6, 9.3e-6, 1.2e6, BerDistribution::Rayleigh, &link(), &mut rng);
        assert_eq!(tx.outcome, SlotOutcome::Collision);
        assert!(!tx.outcome.reply_heard());
    }

    #[test]
    fn strong_signal_decodes_with_high_probability() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let mut decoded = 0;
        for i in 0..50 {
            let mut rng = rand::rngs::StdRng::seed_from_u64(i);
            let tx = Transaction::build(100e-6, 1, 16, -20.0, -95.0, 1.25e-6, 9.3e-6, 1.2e6, BerDistribution::Rayleigh, &link(), &mut rng);
            if tx.outcome.reply_heard() {
                decoded += 1;
            }
        }
        let _ = &mut rng;
        assert!(decoded > 40, "expected most strong-signal slots to decode, got {decoded}/50");
    }
}
