//! Feed ingestion: fetching, parsing and the polling loop.
//!
//! - [`parser`] turns RSS bytes into a [`ParsedFeedDocument`]
//! - [`fetcher`] retrieves a feed over HTTP behind the [`FeedFetcher`] trait
//! - [`scheduler`] drives one feed per tick from storage into posts
//!
//! # Example
//!
//! ```ignore
//! use gator::feed::{run, HttpFetcher};
//!
//! let fetcher = HttpFetcher::new()?;
//! run(Duration::from_secs(60), &db, &fetcher, Duration::from_secs(30)).await?;
//! ```

pub mod fetcher;
pub mod parser;
pub mod scheduler;

pub use fetcher::{FeedFetcher, FetchError, HttpFetcher, CLIENT_IDENTIFIER};
pub use parser::{parse_document, ParseError, ParsedFeedDocument, ParsedItem};
pub use scheduler::{run, scrape_next, AggregateError, CycleReport};
