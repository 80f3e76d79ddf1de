use anyhow::{Context, Result};

use harvester::category::SyncOutcome;
use harvester::error::Error;

use super::App;

/// Sync every configured site's category tree
pub async fn sync(app: &App) -> Result<()> {
    println!("Syncing category trees");
    println!("======================");

    for site in &app.config.marketplace.sites {
        let outcome = app
            .categories
            .sync(site)
            .await
            .map_err(Error::from)
            .with_context(|| format!("Category sync failed for {site}"))?;

        match outcome {
            SyncOutcome::UpToDate { version } => {
                println!("  {site}: up to date (version {version})");
            }
            SyncOutcome::Updated { previous, current } => {
                let top = app
                    .categories
                    .top_level_categories(site)
                    .await
                    .map_err(Error::from)?;
                println!(
                    "  {site}: {} -> {current} ({} top-level categories)",
                    previous.as_deref().unwrap_or("none"),
                    top.len()
                );
            }
        }
    }

    Ok(())
}
