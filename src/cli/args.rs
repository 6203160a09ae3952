//! Command-line argument parsing for tfgrpo
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tfgrpo - Learn reusable fixes from contrasting failed and successful attempts
#[derive(Parser, Debug)]
#[command(name = "tfgrpo")]
#[command(version)]
#[command(about = "Training-free experience library for coding agents", long_about = None)]
pub struct Args {
    /// Configuration file path (default: ~/.tfgrpo/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Experience library file (overrides [library] path)
    #[arg(long, global = true)]
    pub library: Option<PathBuf>,

    /// Extraction model (overrides [model] model)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress log output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve experiences relevant to a query
    Pull {
        /// Free-text query
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List the most recently updated experiences
    List {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show one experience in full
    Show {
        id: String,
    },

    /// Delete an experience
    Delete {
        id: String,
    },

    /// Replay a recorded episode file through start, log and end
    Record {
        /// JSON file with task, attempts and outcome
        file: PathBuf,
    },

    /// Run diagnostics
    Doctor,

    /// Display current configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Whether the command calls the extraction model
    pub fn needs_credential(&self) -> bool {
        matches!(self.command, Commands::Record { .. })
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Default `tracing` filter directive
    pub fn log_level(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "info",
            Verbosity::VeryVerbose => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_verbosity_quiet() {
        let args = parse(&["tfgrpo", "-q", "list"]);
        assert_eq!(args.verbosity(), Verbosity::Quiet);
        assert_eq!(args.verbosity().log_level(), "error");
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(parse(&["tfgrpo", "list"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["tfgrpo", "-v", "list"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["tfgrpo", "list", "-vv"]).verbosity(), Verbosity::VeryVerbose);
    }

    #[test]
    fn test_pull_command() {
        let args = parse(&["tfgrpo", "pull", "async timeout", "--limit", "3", "--library", "/tmp/x.json"]);
        match args.command {
            Commands::Pull { ref query, limit } => {
                assert_eq!(query, "async timeout");
                assert_eq!(limit, Some(3));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(args.library, Some(PathBuf::from("/tmp/x.json")));
        assert!(!args.needs_credential());
    }

    #[test]
    fn test_record_needs_credential() {
        let args = parse(&["tfgrpo", "record", "episode.json", "--model", "qwen/qwen3-8b"]);
        assert!(args.needs_credential());
        assert_eq!(args.model.as_deref(), Some("qwen/qwen3-8b"));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["tfgrpo"]).is_err());
    }

    #[test]
    fn test_verbosity_as_str() {
        assert_eq!(Verbosity::Quiet.as_str(), "quiet");
        assert_eq!(Verbosity::VeryVerbose.as_str(), "very_verbose");
    }
}
