//! The `check` commands: configuration and connectivity probes.

use std::sync::Arc;

use crate::app::config::{Config, ExecutorMode};
use crate::core::exchange::CatalogClient;
use crate::error::Result;

/// Validate and summarize the loaded configuration.
pub fn config(config: &Config) -> Result<()> {
    config.validate()?;
    println!("configuration OK");
    println!("  database: {}", config.database_path());
    println!("  catalog:  {}", config.network.gamma_url);
    println!("  trading:  {}", config.network.clob_url);
    println!("  stream:   {}", config.network.ws_url);
    println!(
        "  executor: {}",
        match config.executor.mode {
            ExecutorMode::Live => "live",
            ExecutorMode::DryRun => "dry-run",
        }
    );
    Ok(())
}

/// Probe the catalog API with a one-page listing.
pub async fn connection(config: &Config) -> Result<()> {
    config.validate()?;
    let client = Arc::new(CatalogClient::new(
        config.network.gamma_url.clone(),
        config.http_timeout(),
        5,
    )?);
    let page = client.events_page(None).await?;
    println!(
        "catalog reachable: {} events on first page (cursor {})",
        page.data.len(),
        page.resume_cursor().as_deref().unwrap_or("end")
    );
    Ok(())
}
