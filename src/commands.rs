//! CLI command handlers.
//!
//! [`Command`] is the closed set of operations, parsed by clap and dispatched
//! by [`run`]. Handlers that act on behalf of a user receive it as an explicit
//! `&User` resolved by [`current_user`].

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;

use crate::aggregator::Poller;
use crate::config::{parse_interval, Config};
use crate::feed::FeedClient;
use crate::storage::{Database, DatabaseError, User};
use crate::util::{clean_text, truncate_to_width, validate_feed_url};

/// Feed fetched by `gator fetch` when no URL is given.
pub const DEFAULT_FETCH_URL: &str = "https://www.wagslane.dev/index.xml";

/// Column budget for one-line descriptions.
const DESCRIPTION_WIDTH: usize = 100;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a user and make it the current user
    Register { name: String },
    /// Switch to an existing user
    Login { name: String },
    /// List users, marking the current one
    Users,
    /// Delete every user along with their feeds and posts
    Reset,
    /// Register a feed owned by the current user
    #[command(name = "addfeed")]
    AddFeed { name: String, url: String },
    /// List all registered feeds
    Feeds,
    /// Poll feeds forever, one every INTERVAL (e.g. 30s, 1m, 1h30m)
    Agg { interval: String },
    /// Show the newest posts from the current user's feeds
    Browse { limit: Option<i64> },
    /// Fetch a feed once and print it without storing anything
    Fetch {
        #[arg(default_value = DEFAULT_FETCH_URL)]
        url: String,
    },
}

/// Everything a handler may touch.
pub struct Session {
    pub db: Database,
    pub client: FeedClient,
    pub config: Config,
    pub config_path: PathBuf,
}

/// Dispatch `command`. Human-readable output goes to `out`.
pub async fn run<W: Write>(command: Command, session: &mut Session, out: &mut W) -> Result<()> {
    match command {
        Command::Register { name } => register(session, &name, out).await,
        Command::Login { name } => login(session, &name, out).await,
        Command::Users => list_users(session, out).await,
        Command::Reset => reset(session, out).await,
        Command::AddFeed { name, url } => {
            let user = current_user(&session.db, &session.config).await?;
            add_feed(session, &user, &name, &url, out).await
        }
        Command::Feeds => list_feeds(session, out).await,
        Command::Agg { interval } => {
            let shutdown = shutdown_signal()?;
            aggregate(session, &interval, shutdown, out).await
        }
        Command::Browse { limit } => {
            let user = current_user(&session.db, &session.config).await?;
            let limit = limit.unwrap_or(session.config.browse_limit);
            browse(session, &user, limit, out).await
        }
        Command::Fetch { url } => fetch_and_print(&session.client, &url, out).await,
    }
}

/// Resolve the configured current user against the store.
pub async fn current_user(db: &Database, config: &Config) -> Result<User> {
    let name = config
        .current_user_name
        .as_deref()
        .context("No current user; run `gator register <name>` first")?;
    db.get_user_by_name(name)
        .await
        .context("Failed to look up current user")?
        .with_context(|| format!("Current user {name} does not exist; run `gator register {name}`"))
}

async fn register<W: Write>(session: &mut Session, name: &str, out: &mut W) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("User name must not be empty");
    }

    let user = match session.db.create_user(name).await {
        Ok(user) => user,
        Err(DatabaseError::DuplicateKey(_)) => bail!("User {name} already exists"),
        Err(e) => return Err(e).context("Failed to create user"),
    };
    session
        .config
        .set_user(&user.name, &session.config_path)
        .context("Failed to save current user")?;

    tracing::info!(user_id = user.id, name = %user.name, "Registered user");
    writeln!(out, "User created: {} (id {})", user.name, user.id)?;
    Ok(())
}

async fn login<W: Write>(session: &mut Session, name: &str, out: &mut W) -> Result<()> {
    let user = session
        .db
        .get_user_by_name(name)
        .await
        .context("Failed to look up user")?
        .with_context(|| format!("User {name} doesn't exist"))?;
    session
        .config
        .set_user(&user.name, &session.config_path)
        .context("Failed to save current user")?;

    writeln!(out, "Current user set to {}", user.name)?;
    Ok(())
}

async fn list_users<W: Write>(session: &Session, out: &mut W) -> Result<()> {
    let users = session.db.get_users().await.context("Failed to list users")?;
    if users.is_empty() {
        writeln!(out, "No users found")?;
        return Ok(());
    }

    let current = session.config.current_user_name.as_deref();
    for user in users {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

async fn reset<W: Write>(session: &Session, out: &mut W) -> Result<()> {
    let removed = session
        .db
        .delete_all_users()
        .await
        .context("Failed to reset database")?;
    tracing::info!(users = removed, "Database reset");
    writeln!(out, "Database reset: removed {removed} user(s)")?;
    Ok(())
}

async fn add_feed<W: Write>(
    session: &Session,
    user: &User,
    name: &str,
    url: &str,
    out: &mut W,
) -> Result<()> {
    let url = validate_feed_url(url).with_context(|| format!("Refusing feed URL {url}"))?;

    let feed = match session.db.create_feed(name, url.as_str(), user.id).await {
        Ok(feed) => feed,
        Err(DatabaseError::DuplicateKey(_)) => bail!("Feed {url} is already registered"),
        Err(e) => return Err(e).context("Failed to create feed"),
    };

    tracing::info!(feed_id = feed.id, url = %feed.url, user = %user.name, "Added feed");
    writeln!(out, "Feed added: {} ({})", feed.name, feed.url)?;
    Ok(())
}

async fn list_feeds<W: Write>(session: &Session, out: &mut W) -> Result<()> {
    let feeds = session
        .db
        .get_feeds_with_owner()
        .await
        .context("Failed to list feeds")?;
    if feeds.is_empty() {
        writeln!(out, "No feeds found")?;
        return Ok(());
    }

    for feed in feeds {
        writeln!(out, "* {}", clean_text(&feed.name))?;
        writeln!(out, "  URL:          {}", feed.url)?;
        writeln!(out, "  Added by:     {}", feed.user_name)?;
        writeln!(out, "  Last fetched: {}", format_timestamp(feed.last_fetched_at, "never"))?;
    }
    Ok(())
}

async fn aggregate<W, F>(session: &Session, interval: &str, shutdown: F, out: &mut W) -> Result<()>
where
    W: Write,
    F: Future<Output = ()>,
{
    let interval = parse_interval(interval)?;
    let poller = Poller::new(session.db.clone(), session.client.clone(), interval)?;

    writeln!(
        out,
        "Collecting feeds every {:?} (request timeout {:?})",
        poller.interval(),
        session.client.timeout()
    )?;
    out.flush()?;

    let stats = poller.run_until(shutdown).await;
    writeln!(
        out,
        "Stopped after {} cycle(s), {} failed, {} new post(s)",
        stats.cycles, stats.failed_cycles, stats.posts_inserted
    )?;
    Ok(())
}

async fn browse<W: Write>(session: &Session, user: &User, limit: i64, out: &mut W) -> Result<()> {
    let posts = session
        .db
        .get_posts_for_user(user.id, limit)
        .await
        .context("Failed to load posts")?;
    if posts.is_empty() {
        writeln!(out, "No posts yet for {}; try `gator agg 1m`", user.name)?;
        return Ok(());
    }

    for post in posts {
        writeln!(
            out,
            "{}  {}",
            format_timestamp(post.published_at, "undated"),
            clean_text(&post.feed_name)
        )?;
        writeln!(out, "  {}", clean_text(&post.title))?;
        writeln!(out, "  {}", post.url)?;
        if let Some(description) = post.description.as_deref() {
            let description = clean_text(description);
            writeln!(out, "  {}", truncate_to_width(&description, DESCRIPTION_WIDTH))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// One-shot fetch. Uses the feed client only; the store is never opened.
pub async fn fetch_and_print<W: Write>(client: &FeedClient, url: &str, out: &mut W) -> Result<()> {
    let feed = client
        .fetch(url)
        .await
        .with_context(|| format!("Failed to fetch {url}"))?;

    writeln!(out, "{}", clean_text(&feed.title))?;
    writeln!(out, "{}", feed.link)?;
    if !feed.description.is_empty() {
        writeln!(out, "{}", clean_text(&feed.description))?;
    }
    writeln!(out, "{} item(s)", feed.items.len())?;

    for item in &feed.items {
        writeln!(out)?;
        writeln!(out, "* {}", clean_text(&item.title))?;
        writeln!(out, "  {}", item.link)?;
        if !item.pub_date.is_empty() {
            writeln!(out, "  {}", clean_text(&item.pub_date))?;
        }
    }
    Ok(())
}

fn format_timestamp(ts: Option<i64>, missing: &str) -> String {
    ts.and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| missing.to_string())
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C where Unix signals are unavailable).
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl-C, shutting down gracefully"),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        }
    })
}
