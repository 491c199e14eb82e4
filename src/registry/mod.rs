//! Subscription registry: subscriptions and their ingested-article markers.
//!
//! The ingestion core talks to the registry through [`SubscriptionRegistry`]
//! and only reads from it while deduplicating; [`SqliteRegistry`] is the
//! concrete store used by the binary and the integration tests.

mod ingested;
mod schema;
mod subscriptions;
mod types;

use std::collections::HashSet;

use async_trait::async_trait;

pub use schema::{SqliteRegistry, DEFAULT_PAGE_SIZE};
pub use types::{DatabaseError, RegistryQueryError, Subscription};

/// Storage seam between the ingestion pipeline and the registry.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// Complete set of guids already ingested for `subscription_id`.
    ///
    /// A failure must surface as an error. Returning an empty set on failure
    /// would redeliver every article.
    async fn ingested_guids(
        &self,
        subscription_id: &str,
    ) -> Result<HashSet<String>, RegistryQueryError>;

    /// Records ingested-article markers, returning how many were new.
    async fn record_ingested(
        &self,
        subscription_id: &str,
        guids: &[String],
    ) -> anyhow::Result<usize>;

    async fn enabled_subscriptions(&self) -> anyhow::Result<Vec<Subscription>>;

    /// Stores a subscription, or returns the existing one with the same URL.
    async fn insert_subscription(
        &self,
        subscription: &Subscription,
    ) -> anyhow::Result<Subscription>;
}

#[async_trait]
impl SubscriptionRegistry for SqliteRegistry {
    async fn ingested_guids(
        &self,
        subscription_id: &str,
    ) -> Result<HashSet<String>, RegistryQueryError> {
        self.load_ingested_guids(subscription_id)
            .await
            .map_err(|e| RegistryQueryError::new(subscription_id, e))
    }

    async fn record_ingested(
        &self,
        subscription_id: &str,
        guids: &[String],
    ) -> anyhow::Result<usize> {
        self.insert_ingested(subscription_id, guids).await
    }

    async fn enabled_subscriptions(&self) -> anyhow::Result<Vec<Subscription>> {
        self.list_enabled_subscriptions().await
    }

    async fn insert_subscription(
        &self,
        subscription: &Subscription,
    ) -> anyhow::Result<Subscription> {
        self.create_subscription(subscription).await
    }
}
