use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::db::{Database, StoreError, User};
use crate::fetcher::Fetcher;
use crate::scheduler::{start_aggregation, IntervalError, Scheduler};

#[derive(Parser, Debug)]
#[command(name = "gator", about = "Command-line RSS aggregator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch to an existing user
    Login { name: String },
    /// Delete every user along with their feeds and posts
    Reset,
    /// List users
    Users,
    /// Poll feeds forever, one feed per tick (e.g. `agg 1m`)
    Agg { time_between_reqs: String },
    /// Add a feed and follow it
    Addfeed { name: String, url: String },
    /// List every feed and who added it
    Feeds,
    /// Follow an existing feed by URL
    Follow { url: String },
    /// List the feeds you follow
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Show the newest posts from followed feeds
    Browse {
        #[arg(default_value_t = 2)]
        limit: i64,
    },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("not logged in; run `gator login <name>` first")]
    NotLoggedIn,
    #[error("user '{0}' does not exist")]
    UnknownUser(String),
    #[error("user '{0}' already exists")]
    UserExists(String),
    #[error("no feed with url {0}")]
    FeedNotFound(String),
    #[error("not following {0}")]
    NotFollowing(String),
    #[error("already following {0}")]
    AlreadyFollowing(String),
    #[error("feed {0} has already been added")]
    FeedExists(String),
    #[error("browse limit must be positive, got {0}")]
    InvalidLimit(i64),
    #[error(transparent)]
    Interval(#[from] IntervalError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything a command needs: the store handle and the user config.
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub config_path: PathBuf,
}

impl AppState {
    pub fn new(db: Database, config: Config, config_path: PathBuf) -> Self {
        Self {
            db,
            config,
            config_path,
        }
    }

    /// Resolves the logged-in user for commands that act on their behalf.
    pub async fn current_user(&self) -> Result<User, CommandError> {
        let name = self
            .config
            .current_user_name
            .as_deref()
            .ok_or(CommandError::NotLoggedIn)?;

        match self.db.get_user_by_name(name).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound) => Err(CommandError::UnknownUser(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

pub async fn run(state: &mut AppState, command: Command, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Register { name } => register(state, &name, out).await,
        Command::Login { name } => login(state, &name, out).await,
        Command::Reset => reset(state, out).await,
        Command::Users => users(state, out).await,
        Command::Agg { time_between_reqs } => agg(state, &time_between_reqs, out).await,
        Command::Addfeed { name, url } => add_feed(state, &name, &url, out).await,
        Command::Feeds => feeds(state, out).await,
        Command::Follow { url } => follow(state, &url, out).await,
        Command::Following => following(state, out).await,
        Command::Unfollow { url } => unfollow(state, &url, out).await,
        Command::Browse { limit } => browse(state, limit, out).await,
    }
}

async fn register(state: &mut AppState, name: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let user = match state.db.create_user(name).await {
        Ok(user) => user,
        Err(e) if e.is_duplicate() => return Err(CommandError::UserExists(name.to_string()).into()),
        Err(e) => return Err(e.into()),
    };

    state.config.set_user(&user.name, &state.config_path)?;
    info!(user = %user.name, id = user.id, "User registered");
    writeln!(out, "User {} was created with id {}", user.name, user.id)?;
    Ok(())
}

async fn login(state: &mut AppState, name: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let user = match state.db.get_user_by_name(name).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(CommandError::UnknownUser(name.to_string()).into()),
        Err(e) => return Err(e.into()),
    };

    state.config.set_user(&user.name, &state.config_path)?;
    writeln!(out, "Username has been set to {}", user.name)?;
    Ok(())
}

async fn reset(state: &mut AppState, out: &mut impl Write) -> anyhow::Result<()> {
    let removed = state.db.reset_users().await?;
    info!(users = removed, "Database reset");
    writeln!(out, "Database was reset")?;
    Ok(())
}

async fn users(state: &AppState, out: &mut impl Write) -> anyhow::Result<()> {
    let current = state.config.current_user_name.as_deref();
    for user in state.db.list_users().await? {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

async fn agg(state: &AppState, time_between_reqs: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let scheduler = Scheduler::from_arg(time_between_reqs).map_err(CommandError::from)?;
    let fetcher = Fetcher::new(Duration::from_secs(state.config.fetch_timeout_secs))?;

    writeln!(out, "Collecting feeds every {:?}", scheduler.interval())?;
    out.flush()?;

    start_aggregation(&scheduler, &state.db, &fetcher).await;
    Ok(())
}

async fn add_feed(state: &AppState, name: &str, url: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let user = state.current_user().await?;

    let (feed, _) = match state.db.create_feed_with_follow(user.id, name, url).await {
        Ok(created) => created,
        Err(e) if e.is_duplicate() => return Err(CommandError::FeedExists(url.to_string()).into()),
        Err(e) => return Err(e.into()),
    };

    writeln!(out, "Feed added: {} ({}), id {}", feed.name, feed.url, feed.id)?;
    Ok(())
}

async fn feeds(state: &AppState, out: &mut impl Write) -> anyhow::Result<()> {
    let feeds = state.db.list_feeds_with_owner().await?;
    if feeds.is_empty() {
        writeln!(out, "No feeds found")?;
        return Ok(());
    }

    for feed in feeds {
        writeln!(out, "Feed Name: {}", feed.name)?;
        writeln!(out, "Feed URL: {}", feed.url)?;
        writeln!(out, "Feed's User: {}", feed.user_name)?;
        writeln!(out)?;
    }
    Ok(())
}

async fn follow(state: &AppState, url: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let user = state.current_user().await?;
    let feed = match state.db.get_feed_by_url(url).await {
        Ok(feed) => feed,
        Err(StoreError::NotFound) => return Err(CommandError::FeedNotFound(url.to_string()).into()),
        Err(e) => return Err(e.into()),
    };

    let follow = match state.db.create_feed_follow(user.id, feed.id).await {
        Ok(follow) => follow,
        Err(e) if e.is_duplicate() => {
            return Err(CommandError::AlreadyFollowing(url.to_string()).into())
        }
        Err(e) => return Err(e.into()),
    };

    writeln!(out, "{} now follows {}", follow.user_name, follow.feed_name)?;
    Ok(())
}

async fn following(state: &AppState, out: &mut impl Write) -> anyhow::Result<()> {
    let user = state.current_user().await?;
    for follow in state.db.feed_follows_for_user(user.id).await? {
        writeln!(out, "{}", follow.feed_name)?;
    }
    Ok(())
}

async fn unfollow(state: &AppState, url: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let user = state.current_user().await?;
    let feed = match state.db.get_feed_by_url(url).await {
        Ok(feed) => feed,
        Err(StoreError::NotFound) => return Err(CommandError::FeedNotFound(url.to_string()).into()),
        Err(e) => return Err(e.into()),
    };

    match state.db.delete_feed_follow(user.id, feed.id).await {
        Ok(()) => {}
        Err(StoreError::NotFound) => return Err(CommandError::NotFollowing(url.to_string()).into()),
        Err(e) => return Err(e.into()),
    }

    writeln!(out, "Successfully unfollowed {}", feed.name)?;
    Ok(())
}

async fn browse(state: &AppState, limit: i64, out: &mut impl Write) -> anyhow::Result<()> {
    if limit <= 0 {
        return Err(CommandError::InvalidLimit(limit).into());
    }
    let user = state.current_user().await?;

    for post in state.db.posts_for_user(user.id, limit).await? {
        writeln!(out, "{}", post.title)?;
        writeln!(out, "  {}", post.url)?;
        if let Some(published) = &post.published_at {
            writeln!(out, "  published {}", published)?;
        }
        if !post.description.is_empty() {
            writeln!(out, "  {}", post.description)?;
        }
        writeln!(out)?;
    }
    Ok(())
}
