use anyhow::{Context, Result};

use harvester::error::Error;
use harvester::scheduler::{ScheduleSettings, Scheduler};

use super::App;

/// Run the scheduler once
pub async fn schedule(app: &App, seed: Option<u64>) -> Result<()> {
    let ledger = app.ledger().await?;
    let queue = app.queue().await?;

    let settings = ScheduleSettings {
        sites: app.config.marketplace.sites.clone(),
        requests_per_day: app.config.quota.requests_per_day,
        history_days: app.config.quota.history_days,
    };

    let mut scheduler = Scheduler::new(app.categories.clone(), ledger, queue, settings);
    if let Some(seed) = seed {
        scheduler = scheduler.with_seed(seed);
    }

    let report = scheduler
        .run()
        .await
        .map_err(Error::from)
        .context("Scheduling run failed")?;

    println!("Scheduling run for {}", report.day);
    println!("================================");
    println!("  Cost per round: {}", report.cost_per_round);
    println!("  Rounds: {}", report.rounds);
    println!("  Jobs enqueued: {}", report.jobs_enqueued);
    if report.enqueue_failures > 0 {
        println!("  Enqueue failures: {}", report.enqueue_failures);
    }
    println!(
        "  Planned: {}/{}",
        report.planned_total, app.config.quota.requests_per_day
    );

    Ok(())
}
