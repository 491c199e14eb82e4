use thiserror::Error;

use crate::feed::{classify, FetchError, Fetcher, UnknownFeedFormatError};
use crate::registry::{Subscription, SubscriptionRegistry};
use crate::util::{validate_url, UrlValidationError};

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),

    #[error("Could not fetch feed: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    UnknownFormat(#[from] UnknownFeedFormatError),

    #[error("Could not store subscription: {0:#}")]
    Registry(anyhow::Error),
}

/// Registers a feed URL for ingestion.
///
/// The URL is validated, fetched and classified before anything is stored,
/// so a subscription always carries a format that matched when it was
/// created. Subscribing to an already registered URL returns the existing
/// subscription unchanged.
pub async fn subscribe(
    registry: &dyn SubscriptionRegistry,
    fetcher: &Fetcher,
    url: &str,
    discoverable: bool,
) -> Result<Subscription, SubscribeError> {
    let url = validate_url(url)?;
    register(registry, fetcher, url.as_str(), discoverable).await
}

async fn register(
    registry: &dyn SubscriptionRegistry,
    fetcher: &Fetcher,
    url: &str,
    discoverable: bool,
) -> Result<Subscription, SubscribeError> {
    let content = fetcher.fetch(url).await?;
    let format = classify(&content)?;

    let candidate = Subscription::new(url, format, discoverable);
    let stored = registry
        .insert_subscription(&candidate)
        .await
        .map_err(SubscribeError::Registry)?;

    if stored.id == candidate.id {
        tracing::info!(subscription_id = %stored.id, url = %url, format = %format, "Subscribed");
    } else {
        tracing::info!(subscription_id = %stored.id, url = %url, "Already subscribed");
    }
    Ok(stored)
}
