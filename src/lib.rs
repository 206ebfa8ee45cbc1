//! gator: a small RSS aggregator for the command line.
//!
//! Users register, add and follow feeds, and `agg` polls the least recently
//! fetched feed on a fixed interval, storing new items as posts
//! de-duplicated by URL.

pub mod commands;
pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
