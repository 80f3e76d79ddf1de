use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use harvester::error::Error;
use harvester::metrics;
use harvester::worker::{RunOptions, Worker};

use super::{metrics_server, App};

/// Parameters for the `work` command
pub struct WorkParams {
    pub concurrency: Option<usize>,
    pub metrics_addr: Option<SocketAddr>,
}

/// Consume jobs until Ctrl-C
pub async fn work(app: &App, params: WorkParams) -> Result<()> {
    let ledger = app.ledger().await?;
    let queue = app.queue().await?;

    let options = RunOptions {
        concurrency: params
            .concurrency
            .unwrap_or(app.config.worker.concurrency)
            .max(1),
        poll_timeout: app.config.poll_timeout(),
    };

    let recovered = queue
        .recover_active()
        .await
        .map_err(Error::from)
        .context("Failed to recover unacknowledged jobs")?;
    if recovered > 0 {
        println!("Requeued {recovered} unacknowledged jobs from a previous run");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = match params.metrics_addr {
        Some(addr) => {
            if let Err(e) = metrics::init_metrics() {
                tracing::warn!(error = %e, "Metrics initialization failed");
            }
            Some(tokio::spawn(metrics_server(addr, shutdown_rx.clone())))
        }
        None => None,
    };

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown requested, finishing in-flight jobs"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        let _ = shutdown_tx.send(true);
    });

    let worker = Arc::new(Worker::new(
        app.client.clone(),
        ledger,
        app.store.clone(),
        app.config.quota.requests_per_day,
    ));

    println!(
        "Worker running with concurrency {} (Ctrl-C to stop)",
        options.concurrency
    );
    let report = worker.run(queue, options, shutdown_rx).await;

    if let Some(server) = server {
        server.await.context("Metrics server task failed")??;
    }

    println!("Worker stopped");
    println!("==============");
    println!("  Completed: {}", report.completed);
    println!("  Failed: {}", report.failed);
    println!("  Quota exceeded: {}", report.quota_exceeded);
    println!("  Listings stored: {}", report.listings);

    Ok(())
}
