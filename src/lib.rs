//! Feed ingestion and deduplication for newsletter generation.
//!
//! Subscribed RSS 2.0 and Atom feeds are fetched, classified, parsed into one
//! normalized [`feed::Article`] shape and filtered against the registry of
//! already ingested articles before being handed downstream.

pub mod config;
pub mod feed;
pub mod ingest;
pub mod registry;
pub mod util;
