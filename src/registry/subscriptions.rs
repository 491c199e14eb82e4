use anyhow::{Context, Result};

use super::schema::SqliteRegistry;
use super::types::{Subscription, SubscriptionRow};

const SELECT_COLUMNS: &str = "SELECT id, url, format, enabled, discoverable, created_at FROM subscriptions";

impl SqliteRegistry {
    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// Inserts `subscription` unless its URL is already registered, and
    /// returns the stored row either way.
    pub async fn create_subscription(&self, subscription: &Subscription) -> Result<Subscription> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (id, url, format, enabled, discoverable, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
        "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.url)
        .bind(subscription.format.as_str())
        .bind(subscription.enabled)
        .bind(subscription.discoverable)
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert subscription")?;

        if result.rows_affected() == 0 {
            tracing::debug!(url = %subscription.url, "Subscription already exists");
        }

        let row: SubscriptionRow = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE url = ?"))
            .bind(&subscription.url)
            .fetch_one(&self.pool)
            .await
            .context("Failed to reload subscription")?;
        Ok(Subscription::try_from(row)?)
    }

    /// All subscriptions, oldest first.
    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY created_at, id"))
                .fetch_all(&self.pool)
                .await?;
        rows_into_subscriptions(rows)
    }

    /// Subscriptions the poller should visit.
    pub async fn list_enabled_subscriptions(&self) -> Result<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE enabled = 1 ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows_into_subscriptions(rows)
    }

    pub async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Subscription::try_from).transpose()?)
    }

    /// Enables or disables polling. Returns false when no subscription has `id`.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE subscriptions SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn rows_into_subscriptions(rows: Vec<SubscriptionRow>) -> Result<Vec<Subscription>> {
    rows.into_iter()
        .map(|row| Subscription::try_from(row).map_err(anyhow::Error::from))
        .collect()
}
