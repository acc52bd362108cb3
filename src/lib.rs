pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::cli::CliArgs;

pub use crate::adapters::registry::FileRegistry;
pub use crate::adapters::sink::{ConsoleSink, FileSink};
pub use crate::config::BeatConfig;
pub use crate::core::beat::{Beat, BeatState, ShutdownHandle};
pub use crate::utils::error::{BeatError, Result};
