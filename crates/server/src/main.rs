mod api;
mod dto;
mod state;

use std::{env, path::Path, process, sync::Arc, time::Instant};

use axum::routing::{get, post};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use transitway::{
    config::LoadingOptions,
    feed::{self, Feed},
    gtfs::Gtfs,
    indexed::IndexedFeed,
    presets::PresetDestinations,
    shared::Time,
    water::WaterFilter,
};

use crate::state::{AppState, ServerData};

const PORT: u32 = 3000;

#[derive(Error, Debug)]
enum LoadError {
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config file: {0}")]
    Config(#[from] serde_json::Error),
    #[error("gtfs: {0}")]
    Gtfs(#[from] transitway::gtfs::Error),
    #[error("feed: {0}")]
    Feed(#[from] feed::Error),
    #[error("water filter: {0}")]
    Water(#[from] transitway::water::Error),
    #[error("indexing feed: {0}")]
    Indexed(#[from] transitway::indexed::Error),
    #[error("loading presets: {0}")]
    Preset(#[from] transitway::presets::Error),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let config_path = match env::var("TRANSITWAY_CONFIG_PATH") {
        Ok(path_str) => Path::new(&path_str).to_owned(),
        Err(err) => {
            error!("Failed reading TRANSITWAY_CONFIG_PATH: {}", err);
            process::exit(1);
        }
    };
    let app_state = AppState { config_path, data: RwLock::new(None) };

    if app_state.config_path.exists() {
        info!("Loading data...");
        let now = Instant::now();
        match load_server_data(&app_state.config_path) {
            Ok(data) => {
                let _ = app_state.data.write().await.replace(data);
                info!("Loading data took {:?}", now.elapsed());
            }
            Err(err) => error!("Failed loading feed: {}", err),
        }
    } else {
        warn!("No loading-options config found at startup.");
    }

    info!("Starting server...");

    let app = axum::Router::new()
        .route("/healthy", get(api::healthy))
        .route("/route", post(api::route))
        .route("/one-to-many", post(api::one_to_many))
        .route("/one-to-preset", post(api::one_to_preset))
        .with_state(Arc::new(app_state));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", PORT)).await.unwrap();
    info!("Listening to port {PORT}");
    axum::serve(listener, app).await.unwrap();
}

/// Same multi-directory load/merge/filter/index pipeline as
/// `crates/cli`'s `load_indexed_feed`, driven by a config file path instead
/// of CLI args.
fn load_server_data(config_path: &Path) -> Result<ServerData, LoadError> {
    let raw = std::fs::read_to_string(config_path)?;
    let loading: LoadingOptions = serde_json::from_str(&raw)?;

    let mut feeds = Vec::new();
    for dir in &loading.gtfs_data_dirs {
        let path = Path::new(dir);
        let gtfs = if path.extension().is_some_and(|ext| ext == "zip") {
            Gtfs::new().from_zip(path)?
        } else {
            Gtfs::new().from_directory(path)
        };
        let mut feed = Feed::load(gtfs)?;
        feed = feed::filter_services_by_date(&feed, loading.departure_date)?;
        if let Some(filter) = &loading.stop_time_filter {
            let earliest = Time::from_seconds(filter.earliest.unwrap_or(0));
            let latest = Time::from_seconds(filter.latest.unwrap_or(u32::MAX));
            feed = feed::filter_stop_times_by_range(&feed, earliest, latest)?;
        }
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or(dir).to_string();
        feeds.push((name, feed));
    }
    let merged = feed::merge(feeds);
    let water = match &loading.water_geojson_file {
        Some(path) => WaterFilter::from_path(path)?,
        None => WaterFilter::empty(),
    };
    let indexed = IndexedFeed::build(merged, &water, &loading)?;
    let indexed: &'static IndexedFeed = Box::leak(Box::new(indexed));
    let presets = PresetDestinations::load(indexed, &loading.preset_destinations)?;
    Ok(ServerData { indexed, loading, presets })
}
