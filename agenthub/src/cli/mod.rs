//! CLI argument parsing and command dispatch.

mod args;
mod commands;
mod render;

pub use args::Cli;
pub use commands::execute;
