use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::LogDestination;

#[derive(Debug, Parser)]
#[command(name = "refiner", version, about = "Refine an assistant message through configured edit steps")]
pub struct Cli {
    /// Pipeline and backend configuration (RON).
    #[arg(long, short, default_value = "refiner.ron")]
    pub config: PathBuf,

    #[arg(long, value_enum, default_value_t = LogDestination::Terminal)]
    pub log: LogDestination,

    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every configured step over one assistant message and save the result.
    Refine {
        /// Chat file (JSON list of `{ "role", "text" }`).
        #[arg(long)]
        chat: PathBuf,
        /// Zero-based index of the message to refine.
        message_id: usize,
    },
    /// Print the saved-messages excerpt a run would inject for this message.
    Context {
        #[arg(long)]
        chat: PathBuf,
        message_id: usize,
    },
    /// Write a default configuration file to `--config`.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}
