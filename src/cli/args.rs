//! Command line argument parsing
//!
//! This module handles CLI argument parsing with subcommands:
//! - `propose`: Plan, generate, and review an edit, leaving it pending
//! - `approve`: Apply and commit a pending edit
//! - `pending`: List pending edit ids
//! - `show-config`: Show configuration discovery information

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "amend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "AI-assisted self-modification agent: plans, generates, reviews, and commits edits to its own source"
)]
pub struct Cli {
    /// Path to a configuration file, overriding discovery
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verified caller identity; defaults to $USER
    #[arg(long, global = true)]
    pub caller: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Plan, generate, and review an edit from a natural-language instruction
    Propose {
        /// What to change, in plain language
        instruction: String,
    },
    /// Apply, validate, and commit a previously proposed edit
    Approve {
        /// Id returned by `propose`
        edit_id: Uuid,
    },
    /// List edits awaiting approval
    Pending,
    /// Show configuration discovery information
    ShowConfig,
}

impl Cli {
    /// Resolve the caller identity from the flag or the environment.
    pub fn caller_subject(&self) -> Option<String> {
        self.caller
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .filter(|subject| !subject.trim().is_empty())
    }
}
