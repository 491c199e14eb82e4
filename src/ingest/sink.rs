use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::feed::Article;

/// Downstream consumer of freshly ingested articles.
///
/// Markers are recorded only after `deliver` succeeds, so an error here
/// means the same articles are offered again on the next poll.
#[async_trait]
pub trait ArticleSink: Send + Sync {
    async fn deliver(&self, articles: &[Article]) -> Result<()>;
}

/// Writes each article as one JSON object per line.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> ArticleSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn deliver(&self, articles: &[Article]) -> Result<()> {
        let mut buf = Vec::new();
        for article in articles {
            serde_json::to_writer(&mut buf, article).context("Failed to serialize article")?;
            buf.push(b'\n');
        }

        // One write per batch keeps concurrent deliveries from interleaving.
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&buf)
            .await
            .context("Failed to write articles")?;
        writer.flush().await.context("Failed to flush articles")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(guid: &str) -> Article {
        Article {
            subscription_id: "sub-1".into(),
            guid: guid.into(),
            title: "Hello \"world\"".into(),
            link: format!("https://example.com/{guid}"),
            description: "<p>Body</p>".into(),
            published: Some("Mon, 01 Jan 2024 00:00:00 GMT".into()),
            categories: None,
        }
    }

    #[tokio::test]
    async fn test_one_line_per_article() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.deliver(&[article("a"), article("b")]).await.unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["guid"], "a");
        assert_eq!(first["subscription_id"], "sub-1");
        assert_eq!(first["title"], "Hello \"world\"");
        assert_eq!(first["categories"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.deliver(&[]).await.unwrap();
        assert!(sink.into_inner().is_empty());
    }
}
