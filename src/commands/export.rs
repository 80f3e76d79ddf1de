use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};

use harvester::error::Error;
use harvester::export::ListingExporter;

use super::App;

/// Export sold listings to a CSV file
pub async fn export(app: &App, output: &Path) -> Result<()> {
    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let exporter = ListingExporter::new(app.store.clone(), app.categories.clone());
    let summary = exporter
        .export(BufWriter::new(file))
        .await
        .map_err(Error::from)
        .context("Export failed")?;

    println!("Exported to {}", output.display());
    println!("  Listings scanned: {}", summary.scanned);
    println!("  Rows written: {}", summary.exported);
    if summary.unresolved > 0 {
        println!("  Rows without category: {}", summary.unresolved);
    }
    Ok(())
}

/// List distinct observation times
pub async fn times(app: &App) -> Result<()> {
    let exporter = ListingExporter::new(app.store.clone(), app.categories.clone());
    let times = exporter
        .observed_times()
        .await
        .map_err(Error::from)
        .context("Failed to read observation times")?;

    if times.is_empty() {
        println!("No listings stored yet.");
        return Ok(());
    }

    for time in &times {
        println!("{}", harvester::models::format_end_time(time));
    }
    println!("\n{} distinct observation times", times.len());
    Ok(())
}
