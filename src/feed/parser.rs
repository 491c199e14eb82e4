use serde::Serialize;
use thiserror::Error;

use super::classifier::FeedFormat;
use super::xml::{Document, Element};
use super::{atom, rss};
use crate::util::strip_control_chars;

/// A normalized article, identical in shape for RSS items and Atom entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub subscription_id: String,
    /// Dedupe key: RSS `guid` or Atom `id`, falling back to the link.
    pub guid: String,
    pub title: String,
    /// Never empty.
    pub link: String,
    /// Raw HTML or text.
    pub description: String,
    /// Timestamp exactly as the feed wrote it.
    pub published: Option<String>,
    /// RSS only.
    pub categories: Option<String>,
}

/// Why a single item or entry was dropped. Recovered locally by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemParseError {
    #[error("item {index} has no link")]
    MissingLink { index: usize },
    #[error("item {index} was cut off before its end tag")]
    Unterminated { index: usize },
}

/// Articles in document order, plus the number of items that were dropped.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub articles: Vec<Article>,
    pub skipped: usize,
}

/// Feed parser, one variant per supported dialect.
///
/// Selected from the subscription's stored [`FeedFormat`] rather than
/// re-sniffed on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedParser {
    Rss,
    Atom,
}

impl From<FeedFormat> for FeedParser {
    fn from(format: FeedFormat) -> Self {
        match format {
            FeedFormat::Rss => FeedParser::Rss,
            FeedFormat::Atom => FeedParser::Atom,
        }
    }
}

impl FeedParser {
    pub fn format(&self) -> FeedFormat {
        match self {
            FeedParser::Rss => FeedFormat::Rss,
            FeedParser::Atom => FeedFormat::Atom,
        }
    }

    /// Parses feed text into articles owned by `subscription_id`.
    ///
    /// Never fails as a whole: a malformed or link-less item is skipped and
    /// counted in [`ParseResult::skipped`], and a feed with no items yields
    /// an empty result.
    pub fn parse(&self, content: &str, subscription_id: &str) -> ParseResult {
        self.parse_document(&Document::parse(content), subscription_id)
    }

    pub(crate) fn parse_document(&self, document: &Document, subscription_id: &str) -> ParseResult {
        let (tag, extract): (&str, ItemExtractor) = match self {
            FeedParser::Rss => ("item", rss::extract_item),
            FeedParser::Atom => ("entry", atom::extract_entry),
        };

        let mut result = ParseResult::default();

        if let Some(error) = document.syntax_error() {
            tracing::warn!(
                subscription_id = %subscription_id,
                format = %self.format(),
                error = %error,
                "Feed truncated at XML error, parsing what was read"
            );
        }

        for (index, element) in document.root().find_all(tag).into_iter().enumerate() {
            let parsed = if element.is_terminated() {
                extract(element, index, subscription_id)
            } else {
                Err(ItemParseError::Unterminated { index })
            };

            match parsed {
                Ok(article) => result.articles.push(article),
                Err(e) => {
                    tracing::debug!(
                        subscription_id = %subscription_id,
                        format = %self.format(),
                        error = %e,
                        "Skipping feed item"
                    );
                    result.skipped += 1;
                }
            }
        }

        if result.skipped > 0 {
            tracing::warn!(
                subscription_id = %subscription_id,
                format = %self.format(),
                skipped = result.skipped,
                kept = result.articles.len(),
                "Feed items skipped"
            );
        }

        result
    }
}

type ItemExtractor = fn(&Element, usize, &str) -> Result<Article, ItemParseError>;

/// Own text of the first `name` element, `None` when absent or blank.
///
/// Only direct text is read, so an unclosed `<link>` does not pick up the
/// text of the siblings it swallowed.
pub(crate) fn field_text(element: &Element, name: &str) -> Option<String> {
    element
        .find(name)
        .map(Element::own_text)
        .filter(|text| !text.is_empty())
}

/// Sanitized title. Falls back to the full text when the title holds only
/// markup (Atom `type="xhtml"`).
pub(crate) fn title_text(element: &Element) -> String {
    element
        .find("title")
        .map(|title| {
            let own = title.own_text();
            if own.is_empty() {
                title.text()
            } else {
                own
            }
        })
        .map(|t| strip_control_chars(&t).into_owned())
        .unwrap_or_default()
}
