//! Sondear CLI Library
//!
//! Command-line interface for the Sondear diagnostics engine: replay
//! instrumentation logs offline, inspect flushed coverage files, and
//! merge coverage across requests.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod error;
pub mod inspect;
pub mod merge;
pub mod replay;

pub use commands::{Cli, Commands, InspectArgs, MergeArgs, ReplayArgs};
pub use error::{CliError, CliResult};
pub use inspect::UnitSummary;
pub use merge::MergeFormat;
pub use replay::{replay, ReplayEvent, ReplayOutcome};
