//! Feed retrieval, format detection and parsing.
//!
//! - [`fetcher`] - HTTP GET with timeout and size limit, no retries
//! - [`classifier`] - RSS 2.0 / Atom detection from raw text
//! - [`parser`] - one [`FeedParser`] with an RSS and an Atom variant, both
//!   producing [`Article`]s
//!
//! Parsing goes through a tolerant XML tree (`xml`) rather than a strict
//! reader, so a single broken item costs that item and nothing else.
//!
//! # Example
//!
//! ```ignore
//! use newsletter_ingest::feed::{classify, FeedParser, Fetcher};
//!
//! let content = fetcher.fetch(&url).await?;
//! let format = classify(&content)?;
//! let parsed = FeedParser::from(format).parse(&content, &subscription_id);
//! ```

mod atom;
mod classifier;
mod fetcher;
mod parser;
mod rss;
mod xml;

pub(crate) use classifier::classify_document;
pub use classifier::{classify, FeedFormat, UnknownFeedFormatError, ATOM_NAMESPACE};
pub use fetcher::{FetchError, Fetcher, DEFAULT_MAX_FEED_SIZE, DEFAULT_TIMEOUT};
pub use parser::{Article, FeedParser, ItemParseError, ParseResult};
pub(crate) use xml::Document;
