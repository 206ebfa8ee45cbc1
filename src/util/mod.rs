//! Utility functions shared by the CLI and the ingestion pipeline.
//!
//! - **Durations**: Go-style interval strings for the `agg` command
//! - **Text processing**: HTML entity decoding for feed text and terminal sanitizing
//! - **URL validation**: Security-focused validation to prevent SSRF attacks
//!
//! # Examples
//!
//! ```
//! use gator::util::{parse_duration, unescape_entities, validate_url};
//!
//! let interval = parse_duration("30s").unwrap();
//! assert_eq!(interval.as_secs(), 30);
//!
//! assert_eq!(unescape_entities("Cats &amp; Dogs"), "Cats & Dogs");
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//! ```

mod duration;
mod text;
mod url_validator;

pub use duration::{parse_duration, DurationError};
pub use text::{strip_control_chars, unescape_entities};
pub use url_validator::{validate_url, UrlValidationError};
