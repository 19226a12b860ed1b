//! error.rs — the two structured error tiers from the error-handling design.
//!
//! User-input errors and model-contract violations are the only tiers
//! represented as `Result`/enum values; expected physical failures (no
//! reply, wrong RN, BER drop, timeout) are ordinary FSM transitions and
//! never appear here.

use thiserror::Error;

/// Errors surfaced before any `Kernel` runs — bad CLI flags, conflicting
/// sweep options, out-of-range link parameters.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("more than one sweep option given ({0} and {1}); only one option may repeat")]
    MultipleSweeps(&'static str, &'static str),

    #[error("unknown tag encoding '{0}', expected one of 1, 2, 4, 8")]
    UnknownEncoding(String),

    #[error("unsupported Tari value {0} us, expected one of 6.25, 12.5, 18.75, 25")]
    UnsupportedTari(f64),

    #[error("invalid config file: {0}")]
    Config(#[from] toml::de::Error),
}

/// Violations of the reader/tag FSM contract — a reply delivered in a state
/// that does not accept it. These indicate a bug in the simulator, not a
/// simulated physical event, and abort the run.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("reader received {reply} while in state {state:?}, which does not accept it")]
    UnexpectedReply { state: &'static str, reply: &'static str },

    #[error("tag received {command} while in state {state:?}, which does not accept it")]
    UnexpectedCommand { state: &'static str, command: &'static str },

    #[error("kernel re-entered run() while not in READY state")]
    KernelNotReady,

    #[error("pop from an empty event queue")]
    EmptyQueue,
}
