//! main.rs — CLI entry point for the RFID air-interface simulator.
//!
//! A single `start` subcommand drives the simulation; exactly one of its
//! options may repeat, turning the run into a parameter sweep evaluated
//! in parallel across the sweep points.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rfid_sim::codec::{get_elementary_timings, prettify_elementary_timings, DivideRatio, TagEncoding, TempRange};
use rfid_sim::error::CliError;
use rfid_sim::scenario::Scenario;
use rfid_sim::RunResult;

#[derive(Parser)]
#[command(name = "rfid-sim", about = "EPC Class-1 Gen-2 RFID air-interface simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the simulator, optionally sweeping one parameter.
    Start(StartArgs),
}

#[derive(Parser, Debug)]
struct StartArgs {
    /// Path to a TOML config file overlaying the defaults before CLI flags apply.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Drone speed, km/h. Repeatable to sweep.
    #[arg(long)]
    speed: Vec<f64>,

    /// Tag encoding (1=FM0, 2=M2, 4=M4, 8=M8). Repeatable to sweep.
    #[arg(long)]
    encoding: Vec<u32>,

    /// Tari, microseconds. Repeatable to sweep.
    #[arg(long)]
    tari: Vec<f64>,

    /// TID word count read per tag. Repeatable to sweep.
    #[arg(long = "tid-word-size")]
    tid_word_size: Vec<u8>,

    /// Reader altitude, meters. Repeatable to sweep.
    #[arg(long)]
    altitude: Vec<f64>,

    /// Reader lateral offset from the tag's path, meters. Repeatable to sweep.
    #[arg(long = "reader-offset")]
    reader_offset: Vec<f64>,

    /// Tag lateral offset, meters. Repeatable to sweep.
    #[arg(long = "tag-offset")]
    tag_offset: Vec<f64>,

    /// Reader transmit power, dBm. Repeatable to sweep.
    #[arg(long)]
    power: Vec<f64>,

    /// Number of independent tag lifetimes to simulate per sweep point.
    #[arg(long = "num-tags", default_value_t = 1000)]
    num_tags: u32,

    /// Worker threads for evaluating sweep points; 0 lets rayon decide.
    #[arg(long, default_value_t = 0)]
    jobs: usize,

    /// Seed the run's RNG for reproducible results.
    #[arg(long)]
    seed: Option<u64>,

    /// Print the derived elementary timings (T1..T7, frame durations, BLF) before running.
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigOverrides {
    speed: Option<f64>,
    encoding: Option<u32>,
    tari: Option<f64>,
    tid_word_size: Option<u8>,
    altitude: Option<f64>,
    reader_offset: Option<f64>,
    tag_offset: Option<f64>,
    power: Option<f64>,
    num_tags: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Start(args) => run_start(args),
    }
}

fn run_start(args: StartArgs) -> anyhow::Result<()> {
    let overrides = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text).map_err(CliError::Config)?
        }
        None => ConfigOverrides::default(),
    };

    let base = base_scenario(&args, &overrides)?;

    if args.verbose {
        print_elementary_timings(&base);
    }

    let sweep = build_sweep(&args, &base)?;

    if args.jobs > 0 {
        rayon::ThreadPoolBuilder::new().num_threads(args.jobs).build_global().ok();
    }

    info!(points = sweep.len(), "starting sweep");

    let results: Vec<(f64, RunResult)> = sweep
        .into_par_iter()
        .map(|(label, scenario)| (label, rfid_sim::run(scenario)))
        .collect();

    print_results(&results);
    Ok(())
}

fn base_scenario(args: &StartArgs, overrides: &ConfigOverrides) -> Result<Scenario, CliError> {
    let mut scenario = Scenario::default();

    if let Some(v) = overrides.speed {
        scenario.speed_kmph = v;
    }
    if let Some(v) = overrides.encoding {
        scenario.tag_encoding = encoding_from_m(v)?;
    }
    if let Some(v) = overrides.tari {
        scenario.tari = v * 1e-6;
    }
    if let Some(v) = overrides.tid_word_size {
        scenario.tid_word_count = v;
    }
    if let Some(v) = overrides.altitude {
        scenario.altitude_m = v;
    }
    if let Some(v) = overrides.reader_offset {
        scenario.reader_offset_m = v;
    }
    if let Some(v) = overrides.tag_offset {
        scenario.tag_offset_m = v;
    }
    if let Some(v) = overrides.power {
        scenario.power_dbm = v;
    }
    if let Some(v) = overrides.num_tags {
        scenario.num_tags = v;
    }

    if let Some(v) = args.speed.first() {
        scenario.speed_kmph = *v;
    }
    if let Some(v) = args.encoding.first() {
        scenario.tag_encoding = encoding_from_m(*v)?;
    }
    if let Some(v) = args.tari.first() {
        scenario.tari = *v * 1e-6;
    }
    if let Some(v) = args.tid_word_size.first() {
        scenario.tid_word_count = *v;
    }
    if let Some(v) = args.altitude.first() {
        scenario.altitude_m = *v;
    }
    if let Some(v) = args.reader_offset.first() {
        scenario.reader_offset_m = *v;
    }
    if let Some(v) = args.tag_offset.first() {
        scenario.tag_offset_m = *v;
    }
    if let Some(v) = args.power.first() {
        scenario.power_dbm = *v;
    }
    scenario.num_tags = args.num_tags;
    scenario.rng_seed = args.seed;

    Ok(scenario)
}

fn encoding_from_m(m: u32) -> Result<TagEncoding, CliError> {
    TagEncoding::get(m).ok_or(CliError::UnknownEncoding(m.to_string()))
}

/// At most one of the repeatable options may have more than one value.
fn build_sweep(args: &StartArgs, base: &Scenario) -> Result<Vec<(f64, Scenario)>, CliError> {
    let sweeps: Vec<(&'static str, usize)> = vec![
        ("speed", args.speed.len()),
        ("encoding", args.encoding.len()),
        ("tari", args.tari.len()),
        ("tid-word-size", args.tid_word_size.len()),
        ("altitude", args.altitude.len()),
        ("reader-offset", args.reader_offset.len()),
        ("tag-offset", args.tag_offset.len()),
        ("power", args.power.len()),
    ];
    let repeated: Vec<&'static str> = sweeps.iter().filter(|(_, n)| *n > 1).map(|(name, _)| *name).collect();
    if repeated.len() > 1 {
        return Err(CliError::MultipleSweeps(repeated[0], repeated[1]));
    }

    let mut points = Vec::new();
    if args.speed.len() > 1 {
        for v in &args.speed {
            let mut s = base.clone();
            s.speed_kmph = *v;
            points.push((*v, s));
        }
    } else if args.encoding.len() > 1 {
        for v in &args.encoding {
            let mut s = base.clone();
            s.tag_encoding = encoding_from_m(*v)?;
            points.push((*v as f64, s));
        }
    } else if args.tari.len() > 1 {
        for v in &args.tari {
            let mut s = base.clone();
            s.tari = *v * 1e-6;
            points.push((*v, s));
        }
    } else if args.tid_word_size.len() > 1 {
        for v in &args.tid_word_size {
            let mut s = base.clone();
            s.tid_word_count = *v;
            points.push((*v as f64, s));
        }
    } else if args.altitude.len() > 1 {
        for v in &args.altitude {
            let mut s = base.clone();
            s.altitude_m = *v;
            points.push((*v, s));
        }
    } else if args.reader_offset.len() > 1 {
        for v in &args.reader_offset {
            let mut s = base.clone();
            s.reader_offset_m = *v;
            points.push((*v, s));
        }
    } else if args.tag_offset.len() > 1 {
        for v in &args.tag_offset {
            let mut s = base.clone();
            s.tag_offset_m = *v;
            points.push((*v, s));
        }
    } else if args.power.len() > 1 {
        for v in &args.power {
            let mut s = base.clone();
            s.power_dbm = *v;
            points.push((*v, s));
        }
    } else {
        points.push((0.0, base.clone()));
    }

    Ok(points)
}

fn print_elementary_timings(scenario: &Scenario) {
    let link = scenario.link_timing();
    let timings = get_elementary_timings(&link);
    println!("Elementary timings:");
    for (name, value) in prettify_elementary_timings(&timings) {
        println!("  {name:<20} {value}");
    }
    println!();
    println!(
        "Model parameters: DR={} M={:?} Q={} session={:?} target={:?} sel={:?} bank={:?} temp={:?}",
        divide_ratio_label(scenario.divide_ratio),
        scenario.tag_encoding,
        scenario.q,
        scenario.session,
        scenario.target,
        scenario.sel,
        scenario.read_bank,
        temp_range_label(scenario.temp_range),
    );
}

fn divide_ratio_label(dr: DivideRatio) -> &'static str {
    match dr {
        DivideRatio::Dr8 => "8",
        DivideRatio::Dr643 => "64/3",
    }
}

fn temp_range_label(t: TempRange) -> &'static str {
    match t {
        TempRange::Nominal => "nominal",
        TempRange::Extended => "extended",
    }
}

fn print_results(results: &[(f64, RunResult)]) {
    println!("{:>12} {:>16} {:>16} {:>16}", "param", "rounds/tag", "inventory_prob", "read_tid_prob");
    for (label, r) in results {
        println!("{:>12.4} {:>16.4} {:>16.4} {:>16.4}", label, r.rounds_per_tag, r.inventory_prob, r.read_tid_prob);
    }
}
