use anyhow::{Context, Result};
use sqlx::QueryBuilder;
use std::collections::HashSet;

use super::schema::SqliteRegistry;

impl SqliteRegistry {
    // ========================================================================
    // Ingested-Article Markers
    // ========================================================================

    /// Every guid recorded for `subscription_id`.
    ///
    /// Reads with keyset pagination (`guid > last ORDER BY guid`) and keeps
    /// going until a short page, so the result is the complete set however
    /// many markers exist.
    pub async fn load_ingested_guids(
        &self,
        subscription_id: &str,
    ) -> Result<HashSet<String>, sqlx::Error> {
        let limit = i64::try_from(self.page_size).unwrap_or(i64::MAX);
        let mut guids = HashSet::new();
        let mut after: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page: Vec<(String,)> = sqlx::query_as(
                r#"
                SELECT guid FROM ingested_articles
                WHERE subscription_id = ?1 AND (?2 IS NULL OR guid > ?2)
                ORDER BY guid
                LIMIT ?3
            "#,
            )
            .bind(subscription_id)
            .bind(after.as_deref())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

            pages += 1;
            let full_page = page.len() == self.page_size;
            after = page.last().map(|(guid,)| guid.clone());
            guids.extend(page.into_iter().map(|(guid,)| guid));

            if !full_page || after.is_none() {
                break;
            }
        }

        tracing::trace!(
            subscription_id = %subscription_id,
            count = guids.len(),
            pages,
            "Loaded ingested guids"
        );
        Ok(guids)
    }

    /// Records markers for `guids`, returning how many were new.
    ///
    /// Existing markers are left untouched (`INSERT OR IGNORE`), so recording
    /// the same batch twice is harmless. Batches of 300 keep us under SQLite's
    /// 999 parameter limit (3 columns * 300 = 900).
    pub async fn insert_ingested(&self, subscription_id: &str, guids: &[String]) -> Result<usize> {
        if guids.is_empty() {
            return Ok(0);
        }

        const BATCH_SIZE: usize = 300;
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in guids.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO ingested_articles (subscription_id, guid, ingested_at) ",
            );
            builder.push_values(chunk, |mut b, guid| {
                b.push_bind(subscription_id).push_bind(guid).push_bind(now);
            });
            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to record markers for {subscription_id}"))?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted as usize)
    }
}
