//! Utility functions shared across the pipeline.
//!
//! - **URL validation**: SSRF guard applied to user-submitted feed URLs
//! - **Text sanitation**: control-character stripping for feed-supplied text

mod text;
mod url_validator;

pub use text::strip_control_chars;
pub use url_validator::{validate_url, UrlValidationError};
