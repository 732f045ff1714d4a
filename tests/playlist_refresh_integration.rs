use axum::{Router, extract::State, routing::get};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use m3u_viewer::{
    config::FetchConfig,
    errors::AppError,
    ingestor::{M3uParser, PlaylistFetcher, RefreshStateManager, UpdateScheduler},
    models::UpdateInterval,
    repositories::{JsonFileStorage, StateStorage},
    services::PlaylistStore,
};

const NEWS: &str = "#EXTM3U\n#EXTINF:-1 tvg-id=\"1\" group-title=\"News\",Channel A\nhttp://x/a.m3u8\n";
const NEWS_AND_SPORTS: &str = "#EXTM3U\n\
    #EXTINF:-1 tvg-id=\"1\" group-title=\"News\",Channel A\nhttp://x/a.m3u8\n\
    #EXTINF:-1 tvg-id=\"2\" group-title=\"Sports\",Channel B\nhttp://x/b.m3u8\n";

type Shared = Arc<Mutex<String>>;

async fn playlist(State(content): State<Shared>) -> String {
    content.lock().unwrap().clone()
}

async fn slow_playlist() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    NEWS
}

/// Serve `content` at /list.m3u on an ephemeral port
async fn serve(content: Shared) -> SocketAddr {
    let app = Router::new()
        .route("/list.m3u", get(playlist))
        .route("/slow.m3u", get(slow_playlist))
        .route("/page.html", get(|| async { "<html><body>Not a playlist</body></html>" }))
        .with_state(content);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn storage_in(dir: &TempDir) -> Arc<dyn StateStorage> {
    Arc::new(JsonFileStorage::new(dir.path()))
}

async fn open_store(storage: Arc<dyn StateStorage>) -> Arc<PlaylistStore> {
    let config = FetchConfig {
        timeout: Duration::from_millis(500),
        ..FetchConfig::default()
    };
    let fetcher = PlaylistFetcher::new(&config, M3uParser::default()).unwrap();
    Arc::new(
        PlaylistStore::load(Arc::new(fetcher), storage, RefreshStateManager::new(), 4)
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn test_import_parses_served_playlist() {
    let addr = serve(Arc::new(Mutex::new(NEWS.to_string()))).await;
    let dir = TempDir::new().unwrap();
    let store = open_store(storage_in(&dir)).await;

    let playlist = store
        .import(&format!("http://{addr}/list.m3u"), None)
        .await
        .unwrap();

    assert_eq!(playlist.name, "127.0.0.1");
    assert_eq!(playlist.channel_count(), 1);
    let channel = &playlist.channels[0];
    assert_eq!(channel.name, "Channel A");
    assert_eq!(channel.category, "News");
    assert_eq!(channel.url, "http://x/a.m3u8");
    assert_eq!(channel.tvg_id.as_deref(), Some("1"));
    assert!(playlist.last_fetched_at.is_some());
    assert!(playlist.last_error.is_none());
}

#[tokio::test]
async fn test_fetch_failures_are_reported() {
    let addr = serve(Arc::new(Mutex::new(NEWS.to_string()))).await;
    let dir = TempDir::new().unwrap();
    let store = open_store(storage_in(&dir)).await;

    let err = store
        .import(&format!("http://{addr}/missing.m3u"), None)
        .await
        .unwrap_err();
    assert!(err.is_network());
    assert!(err.to_string().contains("404"), "{err}");

    let err = store
        .import(&format!("http://{addr}/slow.m3u"), None)
        .await
        .unwrap_err();
    assert!(err.is_network());
    assert!(err.to_string().contains("timed out"), "{err}");

    let err = store
        .import(&format!("http://{addr}/page.html"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Parse { .. }), "{err}");

    assert!(store.list_playlists().await.is_empty());
}

#[tokio::test]
async fn test_refresh_updates_and_keeps_channels_on_failure() {
    let content = Arc::new(Mutex::new(NEWS.to_string()));
    let addr = serve(content.clone()).await;
    let dir = TempDir::new().unwrap();
    let storage = storage_in(&dir);
    let store = open_store(storage.clone()).await;
    let scheduler = UpdateScheduler::load(store.clone(), storage.clone(), UpdateInterval::Hourly)
        .await
        .unwrap();

    let playlist = store
        .import(&format!("http://{addr}/list.m3u"), Some("Home"))
        .await
        .unwrap();

    *content.lock().unwrap() = NEWS_AND_SPORTS.to_string();
    assert!(scheduler.run_now().await);
    assert_eq!(store.categories().await, vec!["News", "Sports"]);

    *content.lock().unwrap() = "garbage".to_string();
    assert!(!scheduler.run_now().await);
    assert_eq!(scheduler.last_run_success(), Some(false));

    let after = store.get_playlist(&playlist.id).await.unwrap();
    assert_eq!(after.channel_count(), 2);
    assert!(after.last_error.as_deref().unwrap().contains("Parse error"));

    // Everything survives a restart
    drop(scheduler);
    drop(store);
    let reopened = open_store(storage.clone()).await;
    let restored = reopened.get_playlist(&playlist.id).await.unwrap();
    assert_eq!(restored, after);

    let scheduler = UpdateScheduler::load(reopened, storage, UpdateInterval::Daily)
        .await
        .unwrap();
    assert_eq!(scheduler.interval(), UpdateInterval::Hourly);
    assert_eq!(scheduler.last_run_success(), Some(false));
}

#[tokio::test]
async fn test_duplicate_and_interval_validation() {
    let addr = serve(Arc::new(Mutex::new(NEWS.to_string()))).await;
    let dir = TempDir::new().unwrap();
    let storage = storage_in(&dir);
    let store = open_store(storage.clone()).await;

    let url = format!("http://{addr}/list.m3u");
    store.import(&url, None).await.unwrap();
    let err = store.import(&format!("  {url} "), None).await.unwrap_err();
    assert!(matches!(err, AppError::Duplicate { .. }));
    assert_eq!(store.list_playlists().await.len(), 1);

    let scheduler = UpdateScheduler::load(store.clone(), storage.clone(), UpdateInterval::Every6Hours)
        .await
        .unwrap();
    let err = scheduler.set_interval(999).await.unwrap_err();
    assert!(matches!(err, AppError::Config { .. }));
    assert_eq!(scheduler.interval(), UpdateInterval::Every6Hours);

    scheduler.set_interval(1440).await.unwrap();
    let reloaded = UpdateScheduler::load(store, storage, UpdateInterval::Manual)
        .await
        .unwrap();
    assert_eq!(reloaded.interval(), UpdateInterval::Daily);
}
