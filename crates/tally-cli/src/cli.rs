//! CLI argument definitions using clap
//!
//! This module contains the clap structs for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Import Spendee exports into Google Sheets
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Telegram bot that files Spendee expenses into monthly sheets", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to ~/.config/tally/config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the webhook server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
    },

    /// Point the bot's webhook at this server
    SetWebhook {
        /// Webhook URL (defaults to https://<public_host>/webhook)
        #[arg(long)]
        url: Option<String>,
    },

    /// Parse an export locally and show the months it would write
    Preview {
        /// Spendee CSV export
        #[arg(short, long)]
        file: PathBuf,

        /// Treat this RFC 3339 instant as now (decides which months have ended)
        #[arg(long)]
        now: Option<String>,
    },
}
