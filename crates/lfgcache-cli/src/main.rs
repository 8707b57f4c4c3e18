//! lfgcache - command-line front end for the LFG listings cache.
//!
//! Syncs games and their posts from the remote server into the local cache,
//! lists what is cached, and submits or withdraws posts.

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lfgcache_core::utils::{relative_age, truncate_string};
use lfgcache_core::{
    Config, JsonFileTier, LocalStore, NewListing, ParseClient, ReconciliationEngine, RemoteSource,
    SettingsStore, UnconfiguredSource,
};

// ============================================================================
// Constants
// ============================================================================

/// Set to `1` to also log to a daily file in the cache directory
const LOG_FILE_VAR: &str = "LFGCACHE_LOG_FILE";

/// Width of the description column in `posts`
const DESCRIPTION_WIDTH: usize = 40;

const USAGE: &str = "\
Usage: lfgcache <command>

Commands:
  sync-games                 Download the game list
  sync-posts <gameId>        Download the live posts of a game
  purge                      Remove expired posts from the cache
  games                      List cached games
  posts <gameId>             List cached posts of a game, newest first
  post <gameId> key=value..  Submit a post (keys: platform, character, level1,
                             level2, description, type, mic, player)
  delete <postId>            Withdraw a post
  status                     Show sync status";

/// Initialize the tracing subscriber for logging
fn init_tracing(cache_dir: &Path) {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = if std::env::var(LOG_FILE_VAR).as_deref() == Ok("1") {
        match RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("lfgcache")
            .filename_suffix("log")
            .build(cache_dir.join("logs"))
        {
            // No ANSI colors in log files
            Ok(appender) => Some(fmt::layer().with_ansi(false).with_writer(appender)),
            Err(e) => {
                eprintln!("Warning: could not open log file: {}", e);
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(());
    };
    if command == "-h" || command == "--help" || command == "help" {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load()?.with_env_overrides();
    let cache_dir = config.cache_dir()?;
    init_tracing(&cache_dir);
    info!(command, "lfgcache starting");

    let tier = JsonFileTier::new(&cache_dir)
        .with_context(|| format!("Failed to open cache directory: {}", cache_dir.display()))?;
    let store = Arc::new(LocalStore::open(Arc::new(tier)).context("Failed to load cached data")?);
    let settings = Arc::new(SettingsStore::load(&config.settings_path()?)?);
    let remote: Arc<dyn RemoteSource> = match ParseClient::from_config(&config) {
        Ok(client) => Arc::new(client),
        Err(e) if needs_server(command) => {
            return Err(anyhow::Error::new(e).context(format!(
                "Server not configured. Set {} and {} or edit the config file.",
                lfgcache_core::config::SERVER_URL_VAR,
                lfgcache_core::config::APP_ID_VAR
            )));
        }
        Err(e) => {
            info!(error = %e, "No server configured, using the cache only");
            Arc::new(UnconfiguredSource::new(e.to_string()))
        }
    };
    let engine = ReconciliationEngine::new(store, remote, settings);

    // Same as an app coming to the foreground
    let purged = engine.purge_expired().await;
    if !purged.is_clean() {
        warn!(games = ?purged.failed, "Some expired posts could not be purged");
    }

    let result = run(&engine, command, &args[1..]).await;

    // Detached work (previous-post deletion, durable commits) is cancelled
    // when the runtime shuts down
    engine.finish_background().await;
    result
}

/// Commands that talk to the server; the rest run from the cache alone.
fn needs_server(command: &str) -> bool {
    matches!(command, "sync-games" | "sync-posts" | "post" | "delete")
}

async fn run(engine: &ReconciliationEngine, command: &str, args: &[String]) -> Result<()> {
    match command {
        "sync-games" => {
            let count = engine.sync_categories(None).await?;
            println!("Synced {} games", count);
        }
        "sync-posts" => {
            let game_id = required(args, "gameId")?;
            let count = engine.sync_listings(game_id, None).await?;
            println!("Synced {} posts", count);
        }
        "purge" => {
            let report = engine.purge_expired().await;
            println!("Removed {} expired posts", report.deleted);
            if !report.is_clean() {
                bail!("Purge failed for: {}", report.failed.join(", "));
            }
        }
        "games" => list_games(engine),
        "posts" => list_posts(engine, required(args, "gameId")?),
        "post" => {
            let game_id = required(args, "gameId")?;
            let listing = build_listing(engine, game_id, &args[1..])?;
            let post_id = engine.submit_listing(listing).await?;
            println!("Posted {}", post_id);
        }
        "delete" => {
            let post_id = required(args, "postId")?;
            engine.delete_listing(post_id).await?;
            println!("Deleted {} (local copy goes on next sync-posts)", post_id);
        }
        "status" => print_status(engine),
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
    Ok(())
}

fn required<'a>(args: &'a [String], name: &str) -> Result<&'a str> {
    args.first()
        .map(String::as_str)
        .with_context(|| format!("Missing <{}>\n\n{}", name, USAGE))
}

// ===== Commands =====

fn list_games(engine: &ReconciliationEngine) {
    let categories = engine.all_categories();
    if categories.is_empty() {
        println!("No games cached. Run `lfgcache sync-games`.");
        return;
    }
    for category in categories {
        let expiry = if category.expires() {
            format!("{}h", category.post_expiry_hours)
        } else {
            "never".to_string()
        };
        println!(
            "{:<12} {:<30} expires: {:<6} platforms: {}",
            category.remote_id,
            category.display_name,
            expiry,
            category.platform_names().join(", ")
        );
    }
}

fn list_posts(engine: &ReconciliationEngine, game_id: &str) {
    let now = Utc::now();
    let listings = engine.listings_for(game_id);
    if listings.is_empty() {
        println!("No posts cached for {}.", game_id);
        return;
    }
    for listing in listings {
        println!(
            "{:<12} {:<8} {:<10} {:<16} {:<4} {:<10} {}",
            listing.remote_id,
            listing.platform,
            listing.type_tag,
            listing.player_handle,
            if listing.mic { "mic" } else { "" },
            relative_age(listing.created_at, now),
            truncate_string(&listing.description, DESCRIPTION_WIDTH)
        );
    }
}

/// Start from the game's presets, then apply `key=value` overrides.
fn build_listing(engine: &ReconciliationEngine, game_id: &str, pairs: &[String]) -> Result<NewListing> {
    if engine.category(game_id).is_none() {
        bail!("Unknown game {}. Run `lfgcache sync-games` first.", game_id);
    }
    let mut listing = engine
        .presets_for(game_id)
        .map(|presets| presets.to_draft())
        .unwrap_or_default();
    listing.category_remote_id = game_id.to_string();

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Expected key=value, got `{}`", pair))?;
        match key {
            "platform" => listing.platform = value.to_string(),
            "character" => listing.character = value.to_string(),
            "level1" => listing.level_tier1 = value.parse().context("level1 must be a number")?,
            "level2" => listing.level_tier2 = value.parse().context("level2 must be a number")?,
            "description" => listing.description = value.to_string(),
            "type" => listing.type_tag = value.to_string(),
            "mic" => listing.mic = matches!(value, "1" | "true" | "yes"),
            "player" => listing.player_handle = value.to_string(),
            other => bail!("Unknown post field `{}`", other),
        }
    }
    Ok(listing)
}

fn print_status(engine: &ReconciliationEngine) {
    let now = Utc::now();
    let settings = engine.settings();
    println!(
        "Games downloaded: {}",
        if settings.categories_downloaded() { "yes" } else { "no" }
    );
    for category in engine.all_categories() {
        let synced = settings
            .last_sync_time(&category.remote_id)
            .map(|at| relative_age(at, now))
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<30} {:>4} posts, synced {}",
            category.display_name,
            engine.listings_for(&category.remote_id).len(),
            synced
        );
    }
    let posted = settings
        .last_submission_time()
        .map(|at| relative_age(at, now))
        .unwrap_or_else(|| "never".to_string());
    println!("Last post: {}", posted);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_remote_commands_need_a_server() {
        for command in ["sync-games", "sync-posts", "post", "delete"] {
            assert!(needs_server(command), "{}", command);
        }
        for command in ["games", "posts", "status", "purge"] {
            assert!(!needs_server(command), "{}", command);
        }
    }
}
