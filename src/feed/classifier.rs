use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::xml::Document;

/// Namespace an Atom `<feed>` must declare to be recognized.
pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

/// The two feed dialects the pipeline understands.
///
/// Decided once when a subscription is created and stored with it; polling
/// dispatches on the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Rss,
    Atom,
}

impl FeedFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedFormat::Rss => "rss",
            FeedFormat::Atom => "atom",
        }
    }
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedFormat {
    type Err = UnknownFeedFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rss" => Ok(FeedFormat::Rss),
            "atom" => Ok(FeedFormat::Atom),
            _ => Err(UnknownFeedFormatError),
        }
    }
}

/// Neither an RSS 2.0 nor an Atom signature was found.
///
/// Not retryable: the subscription most likely points at the wrong URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown feed format: no RSS 2.0 or Atom signature found")]
pub struct UnknownFeedFormatError;

/// Classifies raw feed text as RSS 2.0 or Atom.
///
/// Only two signals are inspected, on the root or any descendant element:
/// `<rss version="2.0">` and `<feed xmlns="http://www.w3.org/2005/Atom">`.
/// The XML is read tolerantly and element/attribute names are matched
/// without regard to case.
///
/// # Errors
///
/// Returns [`UnknownFeedFormatError`] when neither signature is present.
pub fn classify(content: &str) -> Result<FeedFormat, UnknownFeedFormatError> {
    classify_document(&Document::parse(content))
}

pub(crate) fn classify_document(document: &Document) -> Result<FeedFormat, UnknownFeedFormatError> {
    for element in document.root().descendants() {
        if element.is_named("rss") && element.attr("version").map(str::trim) == Some("2.0") {
            return Ok(FeedFormat::Rss);
        }
        if element.is_named("feed") && element.attr("xmlns").map(str::trim) == Some(ATOM_NAMESPACE)
        {
            return Ok(FeedFormat::Atom);
        }
    }
    Err(UnknownFeedFormatError)
}
