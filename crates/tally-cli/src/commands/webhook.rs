//! Webhook registration command

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::WebhookChange;

use super::load_config;

pub async fn cmd_set_webhook(config_path: Option<&Path>, url: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;

    let url = match url {
        Some(url) => url.to_string(),
        None => config.webhook_url()?,
    };
    let client = config.telegram_client()?;

    let change = client
        .set_webhook(&url, config.webhook_secret.as_deref())
        .await
        .context("Failed to register webhook")?;

    match change {
        WebhookChange::Updated => println!("✅ Webhook set to {}", url),
        WebhookChange::Unchanged => println!("Webhook already set to {}", url),
    }

    Ok(())
}
