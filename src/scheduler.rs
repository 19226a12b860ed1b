//! scheduler.rs — wires the kernel, reader, tag and channel model
//! together into a running simulation.
//!
//! Grounded on `pysim/handlers.py`: `start_simulation` generates the first
//! tag and powers the reader on; `generate_tag` schedules both its own
//! next firing (the generation-interval timer) and that tag's removal
//! (its observation-window timer) independently of one another, so a
//! population of tags can be in flight at once and overlap in the same
//! slot — `remove_tag` only tears down the one tag whose window closed
//! and checks the overall stop condition, it never re-triggers generation
//! itself. `update_positions` advances the reader along its flight path;
//! the slot loop plays the role of `_build_transaction`/`finish_transaction`,
//! feeding each command/reply pair through the channel model before
//! telling the reader whether it heard anything.

use crate::codec::{CommandCode, MemoryBank};
use crate::error::ModelError;
use crate::geometry::{Antenna, Mobility};
use crate::kernel::Kernel;
use crate::propagation::{two_ray_pathloss_db, RadiationPattern, RayEndpoint, SurfaceParams};
use crate::reader::Reader;
use crate::scenario::Scenario;
use crate::statistics::Statistics;
use crate::tag::Tag;
use crate::transaction::Transaction;

/// Position update tick for the reader's flight path.
const POSITION_UPDATE_DT: f64 = 1e-3;

fn tid_for(tag_id: u64, word_count: u8) -> Vec<u8> {
    let len = word_count as usize * 2;
    (0..len).map(|i| ((tag_id.wrapping_mul(2654435761).wrapping_add(i as u64)) & 0xFF) as u8).collect()
}

pub struct ActiveTag {
    pub tag: Tag,
    pub antenna: Antenna,
    pub mobility: Mobility,
}

pub struct Model {
    pub scenario: Scenario,
    pub reader: Reader,
    pub reader_antenna: Antenna,
    pub reader_mobility: Mobility,
    /// Every tag currently within the reader's observation window. More
    /// than one entry means a population in flight at once; a round can
    /// then genuinely collide.
    pub active: Vec<ActiveTag>,
    pub statistics: Statistics,
    next_tag_id: u64,
    num_tags_generated: u32,
    num_tags_simulated: u32,
}

impl Model {
    pub fn new(scenario: Scenario) -> Model {
        let reader = Reader::new(
            scenario.session,
            scenario.q,
            scenario.divide_ratio,
            scenario.tag_encoding,
            scenario.trext,
            scenario.tid_word_count,
        );
        Model {
            reader,
            reader_antenna: Antenna::default(),
            reader_mobility: Mobility::stationary([-scenario.pass_distance_m / 2.0, scenario.reader_offset_m, scenario.altitude_m]),
            active: Vec::new(),
            statistics: Statistics::new(),
            next_tag_id: 0,
            num_tags_generated: 0,
            num_tags_simulated: 0,
            scenario,
        }
    }
}

pub fn start_simulation(k: &mut Kernel<Model>) -> Result<(), ModelError> {
    k.context.reader_mobility.velocity = [k.context.scenario.speed_mps(), 0.0, 0.0];
    schedule_position_updates(k);
    generate_tag(k)
}

fn schedule_position_updates(k: &mut Kernel<Model>) {
    k.schedule(POSITION_UPDATE_DT, Box::new(update_positions));
}

fn update_positions(k: &mut Kernel<Model>) -> Result<(), ModelError> {
    k.context.reader_mobility.advance(POSITION_UPDATE_DT);
    schedule_position_updates(k);
    Ok(())
}

/// Generates the next tag (if the configured population hasn't been
/// exhausted), schedules its own removal after the observation window and
/// its own next firing after the generation interval — independently of
/// one another — then kicks off a fresh inventory round over whatever
/// tags are now in the field.
fn generate_tag(k: &mut Kernel<Model>) -> Result<(), ModelError> {
    let scenario = k.context.scenario.clone();
    if k.context.num_tags_generated >= scenario.num_tags {
        return Ok(());
    }

    let id = k.context.next_tag_id;
    k.context.next_tag_id += 1;
    k.context.num_tags_generated += 1;

    let tag = Tag::new(id, scenario.epc.clone(), tid_for(id, scenario.tid_word_count));
    k.context.statistics.register_tag(id);

    k.context.active.push(ActiveTag {
        tag,
        antenna: Antenna {
            pos: [0.0, scenario.tag_offset_m, 0.0],
            direction_theta: [0.0, 0.0, 1.0],
            direction_phi: [0.0, 1.0, 0.0],
            gain_db: 2.0,
            cable_loss_db: 0.0,
            pattern: RadiationPattern::Dipole,
        },
        mobility: Mobility::stationary([0.0, scenario.tag_offset_m, 0.0]),
    });

    let window = scenario.observation_window_s();
    k.schedule(window, Box::new(move |k: &mut Kernel<Model>| remove_tag(k, id)));

    if k.context.num_tags_generated < scenario.num_tags {
        k.schedule(scenario.generation_interval_s, Box::new(generate_tag));
    }

    begin_round(k)
}

/// Removes the one tag whose observation window just closed. Never
/// re-triggers generation itself — that runs on its own independent timer.
fn remove_tag(k: &mut Kernel<Model>, id: u64) -> Result<(), ModelError> {
    if let Some(pos) = k.context.active.iter().position(|a| a.tag.id == id) {
        let mut active = k.context.active.remove(pos);
        active.tag.power_off(k.time());
    }
    k.context.num_tags_simulated += 1;
    if k.context.num_tags_simulated >= k.context.scenario.num_tags {
        k.stop();
    }
    Ok(())
}

fn begin_round(k: &mut Kernel<Model>) -> Result<(), ModelError> {
    if k.context.active.is_empty() {
        return Ok(());
    }
    let query = k.context.reader.begin_round();
    let command_bits = query.encode();
    run_slot(k, CommandCode::Query, command_bits)
}

fn advance_round(k: &mut Kernel<Model>) -> Result<(), ModelError> {
    if k.context.active.is_empty() {
        return Ok(());
    }
    match k.context.reader.next_slot() {
        Some(qrep) => {
            let bits = qrep.encode();
            run_slot(k, CommandCode::QueryRep, bits)
        }
        None => begin_round(k),
    }
}

/// Runs one reader-command/tag-reply exchange across the whole current
/// population: every powered tag gets the command, any of them that draw
/// slot zero reply, and two or more repliers collide in `Transaction`.
fn run_slot(k: &mut Kernel<Model>, command: CommandCode, command_bits: String) -> Result<(), ModelError> {
    let link = k.context.scenario.link_timing();
    let scenario = k.context.scenario.clone();
    let command_duration = crate::codec::command_duration(
        crate::codec::ReaderSync { tari: link.tari, rtcal: link.rtcal, delim: 12.5e-6 },
        link.trcal,
        &command_bits,
    );

    update_tag_power(k);

    if k.context.active.is_empty() {
        return Ok(());
    }

    let mut replying_ids: Vec<u64> = Vec::new();
    for active in k.context.active.iter_mut() {
        if !active.tag.is_powered() {
            continue;
        }
        if command == CommandCode::Query {
            k.context.statistics.record_round(active.tag.id);
        }
        let slot0 = match command {
            CommandCode::Query => active
                .tag
                .receive_query(scenario.session, scenario.target, scenario.sel.matches(active.tag.selected), scenario.q, &mut k.rng)
                .map(|slot| slot == 0)
                .unwrap_or(false),
            CommandCode::QueryRep => active.tag.receive_query_rep(scenario.session, &mut k.rng).is_some(),
            _ => false,
        };
        if slot0 {
            replying_ids.push(active.tag.id);
        }
    }

    let reply_bitlen = crate::codec::QueryReply::BITLEN;
    let channel_power_db = if replying_ids.len() == 1 {
        let active = k.context.active.iter().find(|a| a.tag.id == replying_ids[0]).unwrap();
        received_power_db(k, active)
    } else {
        f64::NEG_INFINITY
    };

    let tx = Transaction::build(
        command_duration,
        replying_ids.len(),
        reply_bitlen,
        channel_power_db,
        scenario.noise_power_dbm,
        scenario.symbol_duration_s,
        scenario.preamble_duration_s,
        scenario.bandwidth_hz,
        scenario.ber_distribution,
        &link,
        &mut k.rng,
    );

    let heard = tx.outcome.reply_heard();
    if heard {
        let id = replying_ids[0];
        let rn16 = k.context.active.iter().find(|a| a.tag.id == id).unwrap().tag.rn16();
        let ack = finish_query_phase(k, rn16)?;
        schedule_access_sequence(k, ack, tx.total_duration(), id);
    } else {
        k.schedule(tx.total_duration(), Box::new(advance_round));
    }
    Ok(())
}

/// Powers each active tag on or off depending on whether the reader's field
/// currently reaches its sensitivity, per the OFF/READY boundary rule.
fn update_tag_power(k: &mut Kernel<Model>) {
    let now = k.time();
    let sensitivity = k.context.scenario.sensitivity_dbm;
    let mut readings: Vec<(u64, f64)> = Vec::with_capacity(k.context.active.len());
    for active in k.context.active.iter() {
        readings.push((active.tag.id, received_power_db(k, active)));
    }
    for (id, received) in readings {
        let should_be_powered = received > sensitivity;
        if let Some(active) = k.context.active.iter_mut().find(|a| a.tag.id == id) {
            if should_be_powered && !active.tag.is_powered() {
                active.tag.power_on(now);
            } else if !should_be_powered && active.tag.is_powered() {
                active.tag.power_off(now);
            }
        }
    }
}

fn received_power_db(k: &Kernel<Model>, active: &ActiveTag) -> f64 {
    let scenario = &k.context.scenario;
    let zero = [0.0, 0.0, 0.0];
    let tx = RayEndpoint {
        pos: k.context.reader_mobility.pos,
        direction_theta: k.context.reader_antenna.direction_theta,
        direction_phi: k.context.reader_antenna.direction_phi,
        velocity: if scenario.use_doppler { k.context.reader_mobility.velocity } else { zero },
        pattern: k.context.reader_antenna.pattern,
    };
    let rx = RayEndpoint {
        pos: active.mobility.pos,
        direction_theta: active.antenna.direction_theta,
        direction_phi: active.antenna.direction_phi,
        velocity: if scenario.use_doppler { active.mobility.velocity } else { zero },
        pattern: active.antenna.pattern,
    };
    let surface = SurfaceParams { permittivity: scenario.permittivity, conductivity: scenario.conductivity, polarization: scenario.polarization };
    let path_loss_db = two_ray_pathloss_db(k.time(), surface, scenario.wavelength_m, &tx, &rx);
    scenario.power_dbm + k.context.reader_antenna.gain_db + k.context.reader_antenna.cable_loss_db + active.antenna.gain_db + path_loss_db
}

/// The reply just heard was the singleton `QueryReply` carrying `rn16`;
/// move the reader into ACK.
fn finish_query_phase(k: &mut Kernel<Model>, rn16: u16) -> Result<crate::codec::Ack, ModelError> {
    k.context.reader.handle_query_reply(rn16)
}

/// Runs the rest of the singulation sequence (Ack -> ReqRN -> Read)
/// synchronously against simulated time for the one tag that was heard,
/// each step separated by its own transaction duration, recording
/// inventory/TID-read success. If that tag's observation window closes
/// mid-sequence, each step falls back to just advancing the round.
fn schedule_access_sequence(k: &mut Kernel<Model>, ack: crate::codec::Ack, after: f64, tag_id: u64) {
    k.schedule(
        after,
        Box::new(move |k: &mut Kernel<Model>| {
            let Some(active) = k.context.active.iter_mut().find(|a| a.tag.id == tag_id) else {
                return advance_round(k);
            };
            let read_tid_bank = k.context.scenario.read_tid_bank;
            let ack_result = active.tag.receive_ack(k.context.scenario.session, ack.rn);
            match ack_result {
                Some(_epc) => {
                    k.context.statistics.record_inventory_success(tag_id);
                    if read_tid_bank {
                        let req_rn = k.context.reader.handle_ack_reply()?;
                        continue_to_req_rn(k, req_rn, tag_id);
                        Ok(())
                    } else {
                        advance_round(k)
                    }
                }
                None => advance_round(k),
            }
        }),
    );
}

fn continue_to_req_rn(k: &mut Kernel<Model>, req_rn: crate::codec::ReqRn, tag_id: u64) {
    let link = k.context.scenario.link_timing();
    let d = crate::codec::reply_duration(crate::codec::ReqRnReply::BITLEN, link.dr, link.trcal, link.m, link.trext);
    k.schedule(
        d,
        Box::new(move |k: &mut Kernel<Model>| {
            let Some(active) = k.context.active.iter_mut().find(|a| a.tag.id == tag_id) else {
                return advance_round(k);
            };
            let req_rn_result = active.tag.receive_req_rn(req_rn.rn, &mut k.rng);
            match req_rn_result {
                Some(handle) => {
                    let read = k.context.reader.handle_req_rn_reply(handle)?;
                    continue_to_read(k, read, tag_id);
                    Ok(())
                }
                None => advance_round(k),
            }
        }),
    );
}

fn continue_to_read(k: &mut Kernel<Model>, read: crate::codec::Read, tag_id: u64) {
    let link = k.context.scenario.link_timing();
    let reply_bitlen = crate::codec::ReadReply { word_count: read.word_count }.bitlen();
    let d = crate::codec::reply_duration(reply_bitlen, link.dr, link.trcal, link.m, link.trext);
    k.schedule(
        d,
        Box::new(move |k: &mut Kernel<Model>| {
            let Some(active) = k.context.active.iter_mut().find(|a| a.tag.id == tag_id) else {
                return advance_round(k);
            };
            let read_result = active.tag.receive_read(read.bank, read.word_ptr, read.word_count, read.rn);
            if let Some(_data) = read_result {
                if read.bank == MemoryBank::Tid {
                    k.context.statistics.record_tid_read_success(tag_id);
                }
            }
            k.context.reader.handle_read_reply()?;
            advance_round(k)
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_short_run_completes_and_produces_a_result() {
        let mut scenario = Scenario::default();
        scenario.num_tags = 3;
        scenario.pass_distance_m = 2.0;
        scenario.speed_kmph = 20.0;
        scenario.rng_seed = Some(1);

        let mut kernel = Kernel::with_seed(Model::new(scenario), Some(1));
        kernel.max_real_time = Some(5.0);
        kernel.run(Box::new(start_simulation)).unwrap();

        assert_eq!(kernel.context.statistics.num_tags(), 3);
    }

    #[test]
    fn independent_generation_timer_still_generates_the_whole_population() {
        let mut scenario = Scenario::default();
        scenario.num_tags = 2;
        scenario.generation_interval_s = 1e-6;
        scenario.pass_distance_m = 50.0;
        scenario.speed_kmph = 10.0;
        scenario.q = 0;
        scenario.rng_seed = Some(1);

        let mut kernel = Kernel::with_seed(Model::new(scenario), Some(1));
        kernel.max_real_time = Some(2.0);
        kernel.run(Box::new(start_simulation)).unwrap();

        assert_eq!(kernel.context.statistics.num_tags(), 2);
        assert!(kernel.context.statistics.avg_rounds_per_tag() > 0.0);
    }
}
