use anyhow::{Context, Result};
use chrono::NaiveDate;

use harvester::error::Error;

use super::App;

/// Resolve a category to its top-level ancestor
pub async fn resolve(app: &App, site: &str, category_id: &str) -> Result<()> {
    let top = app
        .categories
        .resolve_top_parent(site, category_id)
        .await
        .map_err(Error::from)
        .with_context(|| format!("Failed to resolve category {category_id} on {site}"))?;

    let name = app.categories.category_name(site, &top).await;
    match name {
        Some(name) => println!("{category_id} -> {top} ({name})"),
        None => println!("{category_id} -> {top}"),
    }
    Ok(())
}

/// Show planned and actual counts for a quota day
pub async fn quota(app: &App, day: Option<NaiveDate>) -> Result<()> {
    let ledger = app.ledger().await?;
    let day = day.unwrap_or_else(|| ledger.today());
    let snapshot = ledger
        .snapshot(day)
        .await
        .map_err(Error::from)
        .with_context(|| format!("Failed to read quota for {day}"))?;
    let limit = app.config.quota.requests_per_day;

    println!("Quota day {day} ({})", ledger.timezone());
    println!("==============================");
    println!("  Planned: {}/{limit}", snapshot.planned_requests);
    println!("  Actual: {}/{limit}", snapshot.actual_requests);
    println!("  Remaining: {}", snapshot.remaining(limit));
    Ok(())
}
