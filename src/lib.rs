//! Discrete-event simulator of an EPC Class-1 Gen-2 UHF RFID air-interface
//! between a moving reader and passive tags.
//!
//! Binds together a deterministic event [`kernel`], the protocol bit
//! encodings and link timing in [`codec`], the two-ray channel model in
//! [`propagation`], and the reader/tag state machines that the
//! [`scheduler`] drives through one run.

pub mod codec;
pub mod error;
pub mod geometry;
pub mod kernel;
pub mod propagation;
pub mod reader;
pub mod scenario;
pub mod scheduler;
pub mod statistics;
pub mod tag;
pub mod transaction;

pub use error::{CliError, ModelError};
pub use kernel::Kernel;
pub use scenario::{RunResult, Scenario};
pub use scheduler::{start_simulation, Model};

/// Runs one full simulation for `scenario` and returns its headline
/// metrics: average inventory rounds per tag, the probability a tag is
/// ever singulated, and the probability its TID is ever read.
pub fn run(scenario: Scenario) -> RunResult {
    let seed = scenario.rng_seed;
    let sim_time_limit = scenario.sim_time_limit;
    let real_time_limit = scenario.real_time_limit;

    let mut kernel = Kernel::with_seed(Model::new(scenario), seed);
    kernel.max_simulation_time = sim_time_limit;
    kernel.max_real_time = real_time_limit;
    if let Err(err) = kernel.run(Box::new(start_simulation)) {
        tracing::error!(error = %err, "simulation aborted on a model contract violation");
    }

    RunResult {
        rounds_per_tag: kernel.context.statistics.avg_rounds_per_tag(),
        inventory_prob: kernel.context.statistics.inventory_probability(),
        read_tid_prob: kernel.context.statistics.read_tid_probability(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_on_a_tiny_scenario_produces_bounded_probabilities() {
        let mut scenario = Scenario::default();
        scenario.num_tags = 2;
        scenario.pass_distance_m = 2.0;
        scenario.speed_kmph = 30.0;
        scenario.rng_seed = Some(99);
        scenario.real_time_limit = Some(5.0);

        let result = run(scenario);
        assert!(result.inventory_prob >= 0.0 && result.inventory_prob <= 1.0);
        assert!(result.read_tid_prob >= 0.0 && result.read_tid_prob <= 1.0);
        assert!(result.rounds_per_tag >= 0.0);
    }
}
