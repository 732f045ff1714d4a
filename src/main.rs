use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use m3u_viewer::{
    config::Config,
    ingestor::{M3uParser, PlaylistFetcher, RefreshStateManager, UpdateScheduler},
    models::{Channel, RefreshOutcome, RefreshState, UpdateInterval},
    repositories::{JsonFileStorage, StateStorage},
    services::PlaylistStore,
    utils::UrlUtils,
};

#[derive(Parser)]
#[command(name = "m3u-viewer")]
#[command(version)]
#[command(about = "Import, browse and periodically refresh M3U/M3U8 playlists")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Data directory (overrides config file)
    #[arg(short = 'd', long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a playlist and start tracking it
    Add {
        url: String,
        /// Display name (defaults to the URL host)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Stop tracking a playlist
    Remove { id: String },
    /// List tracked playlists
    List,
    /// List channels, optionally restricted to one category
    Channels {
        #[arg(short, long)]
        category: Option<String>,
    },
    /// List channel categories
    Categories,
    /// Search channels by name or category
    Search { query: String },
    /// Refresh all playlists, or a single one
    Refresh { id: Option<String> },
    /// Show or change the automatic refresh interval in minutes
    Interval { minutes: Option<u32> },
    /// Show scheduler and playlist status
    Status,
    /// Keep running and refresh playlists on the configured interval
    Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("m3u_viewer={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load_from_file(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    info!(
        "Configuration loaded from {}, data in {}",
        cli.config.display(),
        config.storage.data_dir.display()
    );

    let storage: Arc<dyn StateStorage> =
        Arc::new(JsonFileStorage::new(config.storage.data_dir.clone()));
    let parser = M3uParser::new(config.parser.default_category.clone());
    let fetcher = PlaylistFetcher::new(&config.fetch, parser)?;

    let store = Arc::new(
        PlaylistStore::load(
            Arc::new(fetcher),
            storage.clone(),
            RefreshStateManager::new(),
            config.fetch.max_concurrent_refreshes,
        )
        .await
        .context("Failed to load playlists")?,
    );

    match cli.command {
        Command::Add { url, name } => {
            let playlist = store.import(&url, name.as_deref()).await?;
            println!(
                "Added '{}' ({}) with {} channels",
                playlist.name,
                playlist.id,
                playlist.channel_count()
            );
        }
        Command::Remove { id } => {
            if store.remove_playlist(&id).await? {
                println!("Removed {id}");
            } else {
                println!("No playlist with id {id}");
            }
        }
        Command::List => {
            for playlist in store.list_playlists().await {
                let fetched = playlist
                    .last_fetched_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{}  {}  {} channels  fetched {}  {}",
                    playlist.id,
                    playlist.name,
                    playlist.channel_count(),
                    fetched,
                    UrlUtils::obfuscate_credentials(&playlist.source_url)
                );
                if let Some(error) = &playlist.last_error {
                    println!("    last error: {error}");
                }
            }
        }
        Command::Channels { category } => {
            let channels = match category {
                Some(category) => store.channels_in_category(&category).await,
                None => store.all_channels().await,
            };
            print_channels(&channels);
        }
        Command::Categories => {
            for category in store.categories().await {
                println!("{category}");
            }
        }
        Command::Search { query } => print_channels(&store.search(&query).await),
        Command::Refresh { id: Some(id) } => match store.refresh_playlist(&id).await? {
            RefreshOutcome::Updated { channel_count } => {
                println!("Refreshed {id}: {channel_count} channels");
            }
            RefreshOutcome::Failed { error } => {
                println!("Refresh of {id} failed: {error}");
            }
        },
        Command::Refresh { id: None } => {
            let scheduler = load_scheduler(&config, &store, &storage).await?;
            if scheduler.run_now().await {
                println!("All playlists refreshed");
            } else {
                println!("Some playlists failed to refresh, see `list`");
            }
        }
        Command::Interval { minutes } => {
            let scheduler = load_scheduler(&config, &store, &storage).await?;
            match minutes {
                Some(minutes) => {
                    scheduler.set_interval(minutes).await?;
                    println!("Update interval set to {}", scheduler.interval().label());
                }
                None => {
                    println!("Update interval: {}", scheduler.interval().label());
                    let allowed: Vec<String> = UpdateInterval::ALL
                        .iter()
                        .map(|i| format!("{} ({})", i.minutes(), i.label()))
                        .collect();
                    println!("Allowed: {}", allowed.join(", "));
                }
            }
        }
        Command::Status => {
            let scheduler = load_scheduler(&config, &store, &storage).await?;
            println!("Update interval: {}", scheduler.interval().label());
            match scheduler.last_run_at() {
                Some(at) => println!(
                    "Last update: {} ({})",
                    at.to_rfc3339(),
                    if scheduler.last_run_success() == Some(true) {
                        "ok"
                    } else {
                        "with failures"
                    }
                ),
                None => println!("Last update: never"),
            }
            if let Some(next) = scheduler.next_run_at() {
                println!("Next update (daemon): {}", next.to_rfc3339());
            }
            let playlists = store.list_playlists().await;
            let failing = playlists.iter().filter(|p| p.last_error.is_some()).count();
            println!(
                "Playlists: {} ({} channels, {} failing)",
                playlists.len(),
                playlists.iter().map(|p| p.channel_count()).sum::<usize>(),
                failing
            );
        }
        Command::Daemon => {
            let scheduler = Arc::new(load_scheduler(&config, &store, &storage).await?);
            info!("Starting m3u-viewer daemon v{}", env!("CARGO_PKG_VERSION"));

            let mut progress = store.state_manager().subscribe();
            let progress_task = tokio::spawn(async move {
                loop {
                    match progress.recv().await {
                        Ok(event) => match event.state {
                            RefreshState::Fetching => {
                                debug!("Refreshing playlist {}", event.playlist_id);
                            }
                            RefreshState::Completed { channel_count } => info!(
                                "Playlist {} refreshed: {} channels",
                                event.playlist_id, channel_count
                            ),
                            RefreshState::Error { message } => {
                                warn!("Playlist {} refresh failed: {}", event.playlist_id, message);
                            }
                        },
                        Err(RecvError::Lagged(skipped)) => {
                            debug!("Skipped {} refresh progress events", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            let cancellation_token = CancellationToken::new();
            let scheduler_task = tokio::spawn({
                let scheduler = scheduler.clone();
                let token = cancellation_token.clone();
                async move { scheduler.run(token).await }
            });

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");

            cancellation_token.cancel();
            if let Err(e) = scheduler_task.await {
                error!("Scheduler task failed: {}", e);
            }
            progress_task.abort();
        }
    }

    store.flush().await?;
    Ok(())
}

async fn load_scheduler(
    config: &Config,
    store: &Arc<PlaylistStore>,
    storage: &Arc<dyn StateStorage>,
) -> Result<UpdateScheduler> {
    let default_interval = config.schedule.default_interval()?;
    let scheduler = UpdateScheduler::load(store.clone(), storage.clone(), default_interval)
        .await
        .context("Failed to load update configuration")?;
    Ok(scheduler)
}

fn print_channels(channels: &[Channel]) {
    for channel in channels {
        println!("{}  [{}]  {}  {}", channel.id, channel.category, channel.name, channel.url);
    }
    println!("{} channels", channels.len());
}
