//! CLI module for tfgrpo
//!
//! Handles command-line argument parsing and replay of recorded episodes.

pub mod args;
pub mod record;

pub use args::{Args, Commands, Verbosity};
pub use record::{EpisodeScript, ScriptedAttempt};
