//! Tally CLI - Spendee export to Google Sheets bot
//!
//! Usage:
//!   tally serve --port 3000          Start the webhook server
//!   tally set-webhook                Register the webhook with Telegram
//!   tally preview --file CSV         Show what an upload would write

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Serve { port, host } => {
            commands::cmd_serve(cli.config.as_deref(), &host, port).await
        }
        Commands::SetWebhook { url } => {
            commands::cmd_set_webhook(cli.config.as_deref(), url.as_deref()).await
        }
        Commands::Preview { file, now } => commands::cmd_preview(&file, now.as_deref()),
    }
}
