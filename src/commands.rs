//! CLI subcommands and their handlers.
//!
//! Handlers write user-facing lines to the `out` writer they are given so
//! they can be exercised without a terminal. Anything that came from a feed
//! or a user is passed through [`strip_control_chars`] before printing.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;

use crate::config::Config;
use crate::feed::{self, FeedFetcher, HttpFetcher};
use crate::storage::{Database, DatabaseError, User};
use crate::util::{parse_duration, strip_control_chars, validate_url};

/// Posts shown by `browse` when no limit is given.
pub const DEFAULT_BROWSE_LIMIT: u32 = 2;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },

    /// Switch the current user
    Login { name: String },

    /// List all users
    Users,

    /// Delete every user along with their feeds, follows and posts
    Reset,

    /// Poll feeds forever, one feed per interval (e.g. 30s, 1m, 1h30m)
    Agg {
        #[arg(value_name = "TIME_BETWEEN_REQS")]
        time_between_reqs: String,
    },

    /// Add a feed and follow it
    #[command(name = "addfeed")]
    AddFeed { name: String, url: String },

    /// List all feeds
    Feeds,

    /// Follow an existing feed by URL
    Follow { url: String },

    /// List the feeds the current user follows
    Following,

    /// Stop following a feed
    Unfollow { url: String },

    /// Show the newest posts from followed feeds
    Browse {
        #[arg(
            default_value_t = DEFAULT_BROWSE_LIMIT,
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        limit: u32,
    },
}

/// Everything a handler may touch.
pub struct State {
    pub config: Config,
    pub config_path: PathBuf,
    pub db: Database,
}

/// Dispatch `command` to its handler.
pub async fn run_command(state: &mut State, command: Command, out: &mut dyn Write) -> Result<()> {
    tracing::debug!(?command, "Running command");
    match command {
        Command::Register { name } => register(state, &name, out).await,
        Command::Login { name } => login(state, &name, out).await,
        Command::Users => users(state, out).await,
        Command::Reset => reset(state, out).await,
        Command::Agg { time_between_reqs } => agg(state, &time_between_reqs, out).await,
        Command::AddFeed { name, url } => {
            let user = require_user(state).await?;
            add_feed(state, &user, &name, &url, out).await
        }
        Command::Feeds => feeds(state, out).await,
        Command::Follow { url } => {
            let user = require_user(state).await?;
            follow(state, &user, &url, out).await
        }
        Command::Following => {
            let user = require_user(state).await?;
            following(state, &user, out).await
        }
        Command::Unfollow { url } => {
            let user = require_user(state).await?;
            unfollow(state, &user, &url, out).await
        }
        Command::Browse { limit } => {
            let user = require_user(state).await?;
            browse(state, &user, limit, out).await
        }
    }
}

/// Resolve the logged-in user for commands that act on their behalf.
async fn require_user(state: &State) -> Result<User> {
    let name = state
        .config
        .current_user_name
        .as_deref()
        .context("not logged in; run `gator register <name>` or `gator login <name>` first")?;

    state
        .db
        .get_user_by_name(name)
        .await
        .context("failed to get user")?
        .with_context(|| format!("current user {name:?} not found; log in again"))
}

// ============================================================================
// Users
// ============================================================================

async fn register(state: &mut State, name: &str, out: &mut dyn Write) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("user name must not be empty");
    }

    let user = state
        .db
        .create_user(name)
        .await
        .context("failed to create user")?;
    state
        .config
        .set_user(&user.name, &state.config_path)
        .context("failed to set user")?;

    tracing::info!(user = %user.name, id = %user.id, "Registered user");
    writeln!(out, "User created: {}", strip_control_chars(&user.name))?;
    Ok(())
}

async fn login(state: &mut State, name: &str, out: &mut dyn Write) -> Result<()> {
    let user = state
        .db
        .get_user_by_name(name)
        .await
        .context("failed to get user")?
        .with_context(|| format!("user {name:?} not found"))?;

    state
        .config
        .set_user(&user.name, &state.config_path)
        .context("failed to set user")?;

    writeln!(out, "Logged in as {}", strip_control_chars(&user.name))?;
    Ok(())
}

async fn users(state: &State, out: &mut dyn Write) -> Result<()> {
    let users = state.db.list_users().await.context("failed to list users")?;
    let current = state.config.current_user_name.as_deref();

    for user in users {
        let name = strip_control_chars(&user.name);
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {name} (current)")?;
        } else {
            writeln!(out, "* {name}")?;
        }
    }
    Ok(())
}

async fn reset(state: &State, out: &mut dyn Write) -> Result<()> {
    let removed = state
        .db
        .reset_users()
        .await
        .context("failed to reset users")?;

    tracing::info!(users = removed, "Reset database");
    writeln!(out, "Users reset")?;
    Ok(())
}

// ============================================================================
// Aggregation
// ============================================================================

async fn agg(state: &State, time_between_reqs: &str, out: &mut dyn Write) -> Result<()> {
    let interval = parse_duration(time_between_reqs)
        .context("failed to parse time between requests")?;
    let fetcher = HttpFetcher::new().context("failed to build HTTP client")?;

    writeln!(out, "Collecting feeds every {}", time_between_reqs.trim())?;
    out.flush()?;

    aggregate_until(state, interval, &fetcher, async {
        // A failed handler install leaves only the error path to end the loop
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Drive the ingestion loop until it fails or `shutdown` completes.
///
/// Never returns `Ok`: an interruption is reported as an error too.
async fn aggregate_until<F, S>(
    state: &State,
    interval: std::time::Duration,
    fetcher: &F,
    shutdown: S,
) -> Result<()>
where
    F: FeedFetcher + ?Sized,
    S: Future<Output = ()>,
{
    tokio::select! {
        biased;

        _ = shutdown => {
            tracing::info!("Interrupted, stopping aggregation");
            bail!("aggregation interrupted")
        }
        result = feed::run(interval, &state.db, fetcher, state.config.fetch_timeout()) => {
            match result {
                Ok(never) => match never {},
                Err(e) => Err(e).context("error scraping feeds"),
            }
        }
    }
}

// ============================================================================
// Feeds
// ============================================================================

async fn add_feed(
    state: &State,
    user: &User,
    name: &str,
    url: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let url = url.trim();
    validate_url(url).with_context(|| format!("cannot add feed {url:?}"))?;

    let feed = match state.db.create_feed(name, url, user.id).await {
        Ok(feed) => {
            writeln!(
                out,
                "Feed created: {} ({})",
                strip_control_chars(&feed.name),
                feed.url
            )?;
            feed
        }
        // Someone already registered this URL; just follow it
        Err(DatabaseError::DuplicateFeed(_)) => state
            .db
            .get_feed_by_url(url)
            .await
            .context("failed to get feed")?
            .context("feed disappeared while being added")?,
        Err(e) => return Err(e).context("failed to create feed"),
    };

    let follow = state
        .db
        .create_feed_follow(user.id, feed.id)
        .await
        .context("failed to create feed follow")?;

    writeln!(
        out,
        "Feed: {} Followed by: {}",
        strip_control_chars(&follow.feed_name),
        strip_control_chars(&follow.user_name)
    )?;
    Ok(())
}

async fn feeds(state: &State, out: &mut dyn Write) -> Result<()> {
    let feeds = state.db.list_feeds().await.context("failed to list feeds")?;
    for feed in feeds {
        writeln!(
            out,
            "* {} - {} Added by: {}",
            strip_control_chars(&feed.name),
            strip_control_chars(&feed.url),
            strip_control_chars(&feed.user_name)
        )?;
    }
    Ok(())
}

// ============================================================================
// Follows
// ============================================================================

async fn follow(state: &State, user: &User, url: &str, out: &mut dyn Write) -> Result<()> {
    let url = url.trim();
    let feed = state
        .db
        .get_feed_by_url(url)
        .await
        .context("failed to get feed")?
        .with_context(|| format!("no feed with URL {url:?}; add it with `gator addfeed`"))?;

    let follow = state
        .db
        .create_feed_follow(user.id, feed.id)
        .await
        .context("failed to create feed follow")?;

    writeln!(
        out,
        "Feed: {} Followed by: {}",
        strip_control_chars(&follow.feed_name),
        strip_control_chars(&follow.user_name)
    )?;
    Ok(())
}

async fn following(state: &State, user: &User, out: &mut dyn Write) -> Result<()> {
    let follows = state
        .db
        .get_feed_follows_for_user(user.id)
        .await
        .context("failed to get feed follows")?;

    for follow in follows {
        writeln!(out, "* {}", strip_control_chars(&follow.feed_name))?;
    }
    Ok(())
}

async fn unfollow(state: &State, user: &User, url: &str, out: &mut dyn Write) -> Result<()> {
    let url = url.trim();
    let feed = state
        .db
        .get_feed_by_url(url)
        .await
        .context("failed to get feed")?
        .with_context(|| format!("no feed with URL {url:?}"))?;

    state
        .db
        .delete_feed_follow(user.id, feed.id)
        .await
        .context("failed to delete feed follow")?;

    writeln!(
        out,
        "Feed: {} Unfollowed by: {}",
        strip_control_chars(&feed.name),
        strip_control_chars(&user.name)
    )?;
    Ok(())
}

// ============================================================================
// Posts
// ============================================================================

async fn browse(state: &State, user: &User, limit: u32, out: &mut dyn Write) -> Result<()> {
    let posts = state
        .db
        .get_posts_for_user(user.id, limit)
        .await
        .context("failed to get posts")?;

    for post in posts {
        writeln!(
            out,
            "* {} - {}",
            strip_control_chars(&post.title),
            strip_control_chars(&post.url)
        )?;
        if let Some(description) = &post.description {
            writeln!(out, "    {}", strip_control_chars(description))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewPost;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(subcommand)]
        command: Command,
    }

    struct Fixture {
        state: State,
        dir: PathBuf,
    }

    impl Fixture {
        async fn new() -> Self {
            let dir = std::env::temp_dir()
                .join(format!("gator_commands_test_{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            let config_path = dir.join(".gatorconfig.json");
            let config = Config::new(":memory:");
            config.save(&config_path).unwrap();

            let db = Database::open(&config.db_url).await.unwrap();
            Self {
                state: State {
                    config,
                    config_path,
                    db,
                },
                dir,
            }
        }

        async fn run(&mut self, args: &[&str]) -> Result<String> {
            let cli = TestCli::try_parse_from(std::iter::once("gator").chain(args.iter().copied()))?;
            let mut out = Vec::new();
            run_command(&mut self.state, cli.command, &mut out).await?;
            Ok(String::from_utf8(out)?)
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.dir).ok();
        }
    }

    #[test]
    fn test_browse_limit_defaults_to_two() {
        let cli = TestCli::try_parse_from(["gator", "browse"]).unwrap();
        assert_eq!(cli.command, Command::Browse { limit: 2 });
    }

    #[test]
    fn test_browse_limit_must_be_positive() {
        assert!(TestCli::try_parse_from(["gator", "browse", "0"]).is_err());
        assert!(TestCli::try_parse_from(["gator", "browse", "many"]).is_err());
    }

    #[tokio::test]
    async fn test_register_sets_current_user() {
        let mut fx = Fixture::new().await;

        let out = fx.run(&["register", "lane"]).await.unwrap();
        assert_eq!(out, "User created: lane\n");
        assert_eq!(fx.state.config.current_user_name.as_deref(), Some("lane"));

        let saved = Config::load(&fx.state.config_path).unwrap();
        assert_eq!(saved.current_user_name.as_deref(), Some("lane"));
    }

    #[tokio::test]
    async fn test_register_duplicate_fails() {
        let mut fx = Fixture::new().await;
        fx.run(&["register", "lane"]).await.unwrap();

        let err = fx.run(&["register", "lane"]).await.unwrap_err();
        assert!(matches!(
            err.root_cause().downcast_ref::<DatabaseError>(),
            Some(DatabaseError::DuplicateUser(_))
        ));
    }

    #[tokio::test]
    async fn test_login_requires_existing_user() {
        let mut fx = Fixture::new().await;
        assert!(fx.run(&["login", "ghost"]).await.is_err());

        fx.run(&["register", "lane"]).await.unwrap();
        fx.run(&["register", "kahya"]).await.unwrap();
        let out = fx.run(&["login", "lane"]).await.unwrap();
        assert_eq!(out, "Logged in as lane\n");

        let out = fx.run(&["users"]).await.unwrap();
        assert_eq!(out, "* lane (current)\n* kahya\n");
    }

    #[tokio::test]
    async fn test_logged_in_commands_require_user() {
        let mut fx = Fixture::new().await;
        let cases: [&[&str]; 5] = [
            &["addfeed", "Blog", "https://example.com/rss"],
            &["follow", "https://example.com/rss"],
            &["following"],
            &["unfollow", "https://example.com/rss"],
            &["browse"],
        ];
        for args in cases {
            let err = fx.run(args).await.unwrap_err();
            assert!(err.to_string().contains("not logged in"), "{args:?}: {err:#}");
        }
    }

    #[tokio::test]
    async fn test_addfeed_creates_and_follows() {
        let mut fx = Fixture::new().await;
        fx.run(&["register", "lane"]).await.unwrap();

        let out = fx
            .run(&["addfeed", "Blog", "https://example.com/rss"])
            .await
            .unwrap();
        assert_eq!(
            out,
            "Feed created: Blog (https://example.com/rss)\nFeed: Blog Followed by: lane\n"
        );

        let out = fx.run(&["feeds"]).await.unwrap();
        assert_eq!(out, "* Blog - https://example.com/rss Added by: lane\n");

        let out = fx.run(&["following"]).await.unwrap();
        assert_eq!(out, "* Blog\n");
    }

    #[tokio::test]
    async fn test_addfeed_existing_url_follows_it() {
        let mut fx = Fixture::new().await;
        fx.run(&["register", "kahya"]).await.unwrap();
        fx.run(&["addfeed", "Blog", "https://example.com/rss"])
            .await
            .unwrap();
        fx.run(&["register", "lane"]).await.unwrap();

        let out = fx
            .run(&["addfeed", "Other Name", "https://example.com/rss"])
            .await
            .unwrap();
        assert_eq!(out, "Feed: Blog Followed by: lane\n");
        assert_eq!(fx.state.db.list_feeds().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_addfeed_rejects_private_urls() {
        let mut fx = Fixture::new().await;
        fx.run(&["register", "lane"]).await.unwrap();

        for url in ["http://localhost/rss", "http://192.168.1.1/rss", "ftp://example.com/rss"] {
            assert!(fx.run(&["addfeed", "Bad", url]).await.is_err(), "{url}");
        }
        assert!(fx.state.db.list_feeds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_follow_and_unfollow() {
        let mut fx = Fixture::new().await;
        fx.run(&["register", "kahya"]).await.unwrap();
        fx.run(&["addfeed", "Blog", "https://example.com/rss"])
            .await
            .unwrap();
        fx.run(&["register", "lane"]).await.unwrap();

        assert!(fx.run(&["follow", "https://unknown.example.com/rss"]).await.is_err());

        let out = fx.run(&["follow", "https://example.com/rss"]).await.unwrap();
        assert_eq!(out, "Feed: Blog Followed by: lane\n");
        assert!(fx.run(&["follow", "https://example.com/rss"]).await.is_err());

        let out = fx.run(&["unfollow", "https://example.com/rss"]).await.unwrap();
        assert_eq!(out, "Feed: Blog Unfollowed by: lane\n");
        assert_eq!(fx.run(&["following"]).await.unwrap(), "");
        assert!(fx.run(&["unfollow", "https://example.com/rss"]).await.is_err());
    }

    #[tokio::test]
    async fn test_browse_prints_newest_posts() {
        let mut fx = Fixture::new().await;
        fx.run(&["register", "lane"]).await.unwrap();
        fx.run(&["addfeed", "Blog", "https://example.com/rss"])
            .await
            .unwrap();
        let feed = fx
            .state
            .db
            .get_feed_by_url("https://example.com/rss")
            .await
            .unwrap()
            .unwrap();

        for (i, title) in ["Old", "Middle", "New\x1b[31m"].into_iter().enumerate() {
            let ts = 1_000 * (i as i64 + 1);
            fx.state
                .db
                .create_post(&NewPost {
                    id: uuid::Uuid::new_v4(),
                    created_at: ts,
                    updated_at: ts,
                    title: title.to_string(),
                    url: format!("https://example.com/{i}"),
                    description: (i == 2).then(|| "Latest".to_string()),
                    published_at: Some(ts),
                    feed_id: feed.id,
                })
                .await
                .unwrap();
        }

        let out = fx.run(&["browse"]).await.unwrap();
        assert_eq!(
            out,
            "* New - https://example.com/2\n    Latest\n* Middle - https://example.com/1\n"
        );

        let out = fx.run(&["browse", "10"]).await.unwrap();
        assert_eq!(out.lines().filter(|l| l.starts_with("* ")).count(), 3);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let mut fx = Fixture::new().await;
        fx.run(&["register", "lane"]).await.unwrap();
        fx.run(&["addfeed", "Blog", "https://example.com/rss"])
            .await
            .unwrap();

        assert_eq!(fx.run(&["reset"]).await.unwrap(), "Users reset\n");
        assert_eq!(fx.run(&["users"]).await.unwrap(), "");
        assert_eq!(fx.run(&["feeds"]).await.unwrap(), "");

        // The config still names the deleted user
        let err = fx.run(&["browse"]).await.unwrap_err();
        assert!(err.to_string().contains("not found"), "{err:#}");
    }

    #[tokio::test]
    async fn test_agg_rejects_bad_durations() {
        let mut fx = Fixture::new().await;
        for bad in ["soon", "0s", "10", "5parsecs"] {
            let err = fx.run(&["agg", bad]).await.unwrap_err();
            assert!(
                err.to_string().contains("failed to parse time between requests"),
                "{bad}: {err:#}"
            );
        }
    }

    #[tokio::test]
    async fn test_agg_stops_when_no_feeds() {
        let mut fx = Fixture::new().await;
        let err = fx.run(&["agg", "1h"]).await.unwrap_err();
        assert!(matches!(
            err.root_cause().downcast_ref::<feed::AggregateError>(),
            Some(feed::AggregateError::NoFeedsAvailable)
        ));
    }

    #[tokio::test]
    async fn test_interrupted_aggregation_is_an_error() {
        let fx = Fixture::new().await;
        let fetcher = HttpFetcher::new().unwrap();

        let err = aggregate_until(
            &fx.state,
            std::time::Duration::from_secs(3600),
            &fetcher,
            std::future::ready(()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "aggregation interrupted");
    }

    #[tokio::test]
    async fn test_interrupt_stops_a_running_loop() {
        let mut fx = Fixture::new().await;
        fx.run(&["register", "lane"]).await.unwrap();
        fx.run(&["addfeed", "Blog", "https://example.com/rss"])
            .await
            .unwrap();

        // Fetches never complete, so only the shutdown can end the loop
        struct StalledFetcher;

        #[async_trait::async_trait]
        impl FeedFetcher for StalledFetcher {
            async fn fetch(
                &self,
                _url: &str,
                _deadline: std::time::Duration,
            ) -> Result<feed::ParsedFeedDocument, feed::FetchError> {
                std::future::pending().await
            }
        }

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            aggregate_until(
                &fx.state,
                std::time::Duration::from_millis(10),
                &StalledFetcher,
                tokio::time::sleep(std::time::Duration::from_millis(50)),
            ),
        )
        .await
        .expect("shutdown should end the loop")
        .unwrap_err();
        assert_eq!(err.to_string(), "aggregation interrupted");
    }
}
