//! Server command implementation

use std::path::Path;

use anyhow::Result;

use super::load_config;

pub async fn cmd_serve(config_path: Option<&Path>, host: &str, port: u16) -> Result<()> {
    let config = load_config(config_path)?;

    println!("🚀 Starting Tally webhook server...");
    println!("   Listening: http://{}:{}", host, port);
    if let Some(sheet) = &config.sheet_id {
        println!("   Spreadsheet: {}", sheet);
    }
    println!(
        "   Session timeout: {}s",
        config.session_timeout.as_secs()
    );
    if config.webhook_secret.is_none() {
        println!();
        println!("   ⚠️  No webhook secret set (TALLY_WEBHOOK_SECRET) - anyone can post updates");
    }
    println!();

    tally_server::serve(&config, host, port).await
}
