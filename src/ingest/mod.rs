//! The ingestion pipeline proper.
//!
//! - [`run_cycle`] - fetch, classify, parse and dedupe one subscription
//! - [`filter_new`] - drop articles that already have a marker
//! - [`subscribe`] - validate and register a new feed URL
//! - [`poll_all`] / [`run_periodic`] - run cycles for every enabled
//!   subscription, hand new articles to an [`ArticleSink`], record markers

mod cycle;
mod dedupe;
mod poller;
mod sink;
mod subscribe;

pub use cycle::{run_cycle, CycleOutput, IngestError, IngestRequest, Stage};
pub use dedupe::filter_new;
pub use poller::{poll_all, run_periodic, CycleReport, PollError};
pub use sink::{ArticleSink, JsonLinesSink};
pub use subscribe::{subscribe, SubscribeError};
