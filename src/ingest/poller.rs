use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::stream::{self, StreamExt};
use thiserror::Error;

use crate::feed::Fetcher;
use crate::registry::SubscriptionRegistry;

use super::cycle::{run_cycle, IngestError, IngestRequest};
use super::sink::ArticleSink;

/// Why one subscription produced no delivered articles in a poll.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Ingestion failed while {stage}: {0}", stage = .0.stage())]
    Ingest(#[from] IngestError),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Articles were delivered but their markers were not stored; they will
    /// be delivered again on the next poll.
    #[error("Recording ingested articles failed: {0}")]
    Record(String),
}

/// Outcome of one subscription's cycle within a poll.
///
/// Contains the subscription ID for correlation and either the number of
/// articles delivered or the error that occurred.
#[derive(Debug)]
pub struct CycleReport {
    pub subscription_id: String,
    pub result: Result<usize, PollError>,
}

/// Runs one ingestion cycle for every enabled subscription.
///
/// Cycles run concurrently, at most `concurrency` at a time. For each cycle
/// with new articles the articles are handed to `sink` first and their
/// markers recorded second, so a failed delivery leaves them eligible for
/// the next poll.
///
/// # Returns
///
/// One [`CycleReport`] per enabled subscription, in completion order.
///
/// # Errors
///
/// Fails only when the subscription list cannot be read; per-subscription
/// failures are reported in the returned reports.
pub async fn poll_all(
    registry: Arc<dyn SubscriptionRegistry>,
    fetcher: Fetcher,
    sink: Arc<dyn ArticleSink>,
    concurrency: usize,
) -> anyhow::Result<Vec<CycleReport>> {
    let subscriptions = registry
        .enabled_subscriptions()
        .await
        .context("Failed to list enabled subscriptions")?;

    if subscriptions.is_empty() {
        tracing::info!("No enabled subscriptions to poll");
        return Ok(Vec::new());
    }

    let total = subscriptions.len();
    let reports: Vec<CycleReport> = stream::iter(subscriptions)
        .map(|subscription| {
            let registry = registry.clone();
            let fetcher = fetcher.clone();
            let sink = sink.clone();

            async move {
                let request = IngestRequest::from(&subscription);
                let result = ingest_and_deliver(&*registry, &fetcher, &*sink, &request).await;
                if let Err(e) = &result {
                    tracing::warn!(
                        subscription_id = %request.subscription_id,
                        url = %request.url,
                        error = %e,
                        "Subscription poll failed"
                    );
                }
                CycleReport {
                    subscription_id: request.subscription_id,
                    result,
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let failed = reports.iter().filter(|r| r.result.is_err()).count();
    let delivered: usize = reports.iter().filter_map(|r| r.result.as_ref().ok()).sum();
    tracing::info!(
        subscriptions = total,
        failed,
        delivered,
        "Poll complete"
    );

    Ok(reports)
}

async fn ingest_and_deliver(
    registry: &dyn SubscriptionRegistry,
    fetcher: &Fetcher,
    sink: &dyn ArticleSink,
    request: &IngestRequest,
) -> Result<usize, PollError> {
    let output = run_cycle(fetcher, registry, request).await?;
    if output.articles.is_empty() {
        return Ok(0);
    }

    sink.deliver(&output.articles)
        .await
        .map_err(|e| PollError::Delivery(format!("{e:#}")))?;

    let guids: Vec<String> = output.articles.iter().map(|a| a.guid.clone()).collect();
    registry
        .record_ingested(&request.subscription_id, &guids)
        .await
        .map_err(|e| PollError::Record(format!("{e:#}")))?;

    Ok(output.articles.len())
}

/// Calls [`poll_all`] every `interval` until `shutdown` resolves.
///
/// The first poll starts immediately. A poll that overruns the interval
/// delays the next one rather than queueing extra polls. Resolving
/// `shutdown` mid-poll abandons that poll; anything delivered but not yet
/// recorded is delivered again next time.
pub async fn run_periodic<F>(
    registry: Arc<dyn SubscriptionRegistry>,
    fetcher: Fetcher,
    sink: Arc<dyn ArticleSink>,
    concurrency: usize,
    interval: Duration,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = &mut shutdown => break,
            result = poll_all(registry.clone(), fetcher.clone(), sink.clone(), concurrency) => {
                if let Err(e) = result {
                    tracing::error!(error = %format!("{e:#}"), "Poll failed");
                }
            }
        }
    }

    tracing::info!("Poller shutdown requested");
}
