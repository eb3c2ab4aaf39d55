//! Settings come from a TOML file picked by build profile or `--settings`.

mod cli;
pub use clap::{Parser, Subcommand};
pub use cli::*;

mod settings;
pub use settings::*;
