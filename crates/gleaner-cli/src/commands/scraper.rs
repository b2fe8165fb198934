//! `gleaner scraper` — run the internal scrape service

use crate::settings::Settings;
use anyhow::Result;

/// Serve the browser pool until interrupted
pub async fn run(settings: Settings) -> Result<()> {
    gleaner_scraper::server::run(settings.scraper).await?;
    Ok(())
}
