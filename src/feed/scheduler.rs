//! Periodic ingestion: pick the stalest feed, fetch it, store its items.
//!
//! One cycle touches exactly one feed. Because the feed is marked fetched
//! *before* the network request, a feed that keeps failing still rotates to
//! the back of the queue instead of starving the others.

use std::convert::Infallible;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::feed::fetcher::{FeedFetcher, FetchError};
use crate::storage::{now_millis, DatabaseError, FeedStore, NewPost};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("aggregation interval must be greater than zero")]
    InvalidInterval,

    #[error("no feeds to fetch; add one with `gator addfeed`")]
    NoFeedsAvailable,

    #[error("failed to fetch {url}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Outcome of one successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: Uuid,
    pub feed_url: String,
    pub added: usize,
    /// Items whose URL was already stored
    pub skipped: usize,
}

/// Run a single ingestion cycle against the least recently fetched feed.
///
/// # Errors
///
/// - [`AggregateError::NoFeedsAvailable`] when the store has no feeds
/// - [`AggregateError::Fetch`] when the fetch fails; the feed stays marked
/// - [`AggregateError::Storage`] for any store failure other than a
///   duplicate post URL. Posts written earlier in the cycle are kept.
pub async fn scrape_next<S, F>(
    store: &S,
    fetcher: &F,
    deadline: Duration,
) -> Result<CycleReport, AggregateError>
where
    S: FeedStore + ?Sized,
    F: FeedFetcher + ?Sized,
{
    let feed = store
        .next_feed_to_fetch()
        .await?
        .ok_or(AggregateError::NoFeedsAvailable)?;

    store.mark_feed_fetched(feed.id).await?;

    let document = fetcher
        .fetch(&feed.url, deadline)
        .await
        .map_err(|source| AggregateError::Fetch {
            url: feed.url.clone(),
            source,
        })?;

    let mut report = CycleReport {
        feed_id: feed.id,
        feed_url: feed.url.clone(),
        added: 0,
        skipped: 0,
    };

    for item in document.items {
        let now = now_millis();
        let post = NewPost {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            title: item.title,
            url: item.link,
            description: (!item.description.is_empty()).then_some(item.description),
            published_at: Some(now),
            feed_id: feed.id,
        };

        match store.create_post(&post).await {
            Ok(stored) => {
                tracing::info!(feed = %feed.name, title = %stored.title, url = %stored.url, "Added post");
                report.added += 1;
            }
            Err(DatabaseError::DuplicatePostUrl(url)) => {
                tracing::debug!(feed = %feed.name, url = %url, "Skipping known post");
                report.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::debug!(
        feed = %feed.name,
        added = report.added,
        skipped = report.skipped,
        "Cycle complete"
    );
    Ok(report)
}

/// Run [`scrape_next`] immediately and then once per `interval`, forever.
///
/// Cycles never overlap: a slow cycle delays the next tick rather than
/// queueing a burst. The loop only ends on the first error, which is logged
/// and returned. Drop the future to cancel it.
pub async fn run<S, F>(
    interval: Duration,
    store: &S,
    fetcher: &F,
    deadline: Duration,
) -> Result<Infallible, AggregateError>
where
    S: FeedStore + ?Sized,
    F: FeedFetcher + ?Sized,
{
    if interval.is_zero() {
        return Err(AggregateError::InvalidInterval);
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = scrape_next(store, fetcher, deadline).await {
            tracing::error!(error = %e, "Aggregation stopped");
            return Err(e);
        }
    }
}
