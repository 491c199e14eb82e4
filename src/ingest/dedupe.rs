use std::collections::HashSet;

use crate::feed::Article;
use crate::registry::{RegistryQueryError, SubscriptionRegistry};

/// Drops candidates whose guid already has an ingested-article marker.
///
/// Order is preserved. A guid repeated within `candidates` is kept once, at
/// its first position. Nothing is written to the registry.
///
/// # Errors
///
/// Propagates [`RegistryQueryError`] when the marker query fails; the
/// candidates are never passed through unfiltered.
pub async fn filter_new(
    registry: &dyn SubscriptionRegistry,
    subscription_id: &str,
    candidates: Vec<Article>,
) -> Result<Vec<Article>, RegistryQueryError> {
    if candidates.is_empty() {
        return Ok(candidates);
    }

    let ingested = registry.ingested_guids(subscription_id).await?;
    let total = candidates.len();

    let mut seen: HashSet<String> = HashSet::with_capacity(total);
    let fresh: Vec<Article> = candidates
        .into_iter()
        .filter(|article| !ingested.contains(&article.guid) && seen.insert(article.guid.clone()))
        .collect();

    tracing::debug!(
        subscription_id = %subscription_id,
        candidates = total,
        fresh = fresh.len(),
        "Filtered ingested articles"
    );
    Ok(fresh)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::registry::Subscription;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// In-memory registry for unit tests.
    #[derive(Default)]
    pub(crate) struct MemoryRegistry {
        pub guids: Mutex<HashSet<(String, String)>>,
        pub subscriptions: Mutex<Vec<Subscription>>,
        pub fail_queries: bool,
    }

    impl MemoryRegistry {
        pub(crate) fn with_guids(subscription_id: &str, guids: &[&str]) -> Self {
            let registry = Self::default();
            registry.guids.lock().unwrap().extend(
                guids
                    .iter()
                    .map(|g| (subscription_id.to_string(), g.to_string())),
            );
            registry
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail_queries: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl SubscriptionRegistry for MemoryRegistry {
        async fn ingested_guids(
            &self,
            subscription_id: &str,
        ) -> Result<HashSet<String>, RegistryQueryError> {
            if self.fail_queries {
                return Err(RegistryQueryError::new(subscription_id, "connection reset"));
            }
            Ok(self
                .guids
                .lock()
                .unwrap()
                .iter()
                .filter(|(sub, _)| sub == subscription_id)
                .map(|(_, guid)| guid.clone())
                .collect())
        }

        async fn record_ingested(
            &self,
            subscription_id: &str,
            guids: &[String],
        ) -> anyhow::Result<usize> {
            let mut stored = self.guids.lock().unwrap();
            Ok(guids
                .iter()
                .filter(|g| stored.insert((subscription_id.to_string(), g.to_string())))
                .count())
        }

        async fn enabled_subscriptions(&self) -> anyhow::Result<Vec<Subscription>> {
            Ok(self
                .subscriptions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.enabled)
                .cloned()
                .collect())
        }

        async fn insert_subscription(
            &self,
            subscription: &Subscription,
        ) -> anyhow::Result<Subscription> {
            let mut subs = self.subscriptions.lock().unwrap();
            if let Some(existing) = subs.iter().find(|s| s.url == subscription.url) {
                return Ok(existing.clone());
            }
            subs.push(subscription.clone());
            Ok(subscription.clone())
        }
    }

    pub(crate) fn article(guid: &str) -> Article {
        Article {
            subscription_id: "sub-1".into(),
            guid: guid.into(),
            title: format!("Title {guid}"),
            link: format!("https://example.com/{guid}"),
            description: String::new(),
            published: None,
            categories: None,
        }
    }

    fn guids_of(articles: &[Article]) -> Vec<&str> {
        articles.iter().map(|a| a.guid.as_str()).collect()
    }

    #[tokio::test]
    async fn test_removes_ingested_and_keeps_order() {
        let registry = MemoryRegistry::with_guids("sub-1", &["b"]);
        let fresh = filter_new(&registry, "sub-1", vec![article("a"), article("b"), article("c")])
            .await
            .unwrap();
        assert_eq!(guids_of(&fresh), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_nothing_ingested_passes_everything() {
        let registry = MemoryRegistry::default();
        let fresh = filter_new(&registry, "sub-1", vec![article("x"), article("y")])
            .await
            .unwrap();
        assert_eq!(guids_of(&fresh), vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_markers_of_other_subscriptions_ignored() {
        let registry = MemoryRegistry::with_guids("sub-2", &["a"]);
        let fresh = filter_new(&registry, "sub-1", vec![article("a")])
            .await
            .unwrap();
        assert_eq!(fresh.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_guid_kept_once() {
        let registry = MemoryRegistry::default();
        let mut second = article("a");
        second.title = "Second copy".into();
        let fresh = filter_new(&registry, "sub-1", vec![article("a"), article("b"), second])
            .await
            .unwrap();
        assert_eq!(guids_of(&fresh), vec!["a", "b"]);
        assert_eq!(fresh[0].title, "Title a");
    }

    #[tokio::test]
    async fn test_query_failure_is_error_not_empty() {
        let registry = MemoryRegistry::failing();
        let err = filter_new(&registry, "sub-1", vec![article("a")])
            .await
            .unwrap_err();
        assert_eq!(err.subscription_id, "sub-1");
    }

    #[tokio::test]
    async fn test_empty_candidates_skip_query() {
        let registry = MemoryRegistry::failing();
        assert!(filter_new(&registry, "sub-1", Vec::new())
            .await
            .unwrap()
            .is_empty());
    }

    proptest! {
        #[test]
        fn prop_filter_is_idempotent_and_disjoint(
            candidates in prop::collection::vec("[a-e]", 0..12),
            ingested in prop::collection::vec("[a-e]", 0..5),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let ingested_refs: Vec<&str> = ingested.iter().map(String::as_str).collect();
            let registry = MemoryRegistry::with_guids("sub-1", &ingested_refs);
            let articles: Vec<Article> = candidates.iter().map(|g| article(g)).collect();

            let once = rt.block_on(filter_new(&registry, "sub-1", articles)).unwrap();
            let twice = rt.block_on(filter_new(&registry, "sub-1", once.clone())).unwrap();

            prop_assert_eq!(&once, &twice);
            for a in &once {
                prop_assert!(!ingested.contains(&a.guid));
            }
        }
    }
}
