//! Subcommand handlers for the `wafsift` binary.

pub mod config;
pub mod discover;
pub mod extract;
pub mod fetch;
mod progress;
mod prompt;
mod run;
pub mod sweep;
pub mod time;

pub use progress::human_bytes;
pub use prompt::PromptPolicy;
pub use run::{load, RunError};
