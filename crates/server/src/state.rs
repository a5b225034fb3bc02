use std::path::PathBuf;

use tokio::sync::RwLock;
use transitway::{config::LoadingOptions, indexed::IndexedFeed, presets::PresetDestinations};

/// Everything built from a successful feed load. Replaced wholesale on reload.
///
/// `indexed` is `Box::leak`ed to `'static` so `presets` (whose `PresetFeed`s
/// borrow it) can be built once, here, and live alongside it in the same
/// struct instead of being rebuilt from `locations_file` on every request.
pub struct ServerData {
    pub indexed: &'static IndexedFeed,
    pub loading: LoadingOptions,
    pub presets: PresetDestinations<'static>,
}

pub struct AppState {
    pub config_path: PathBuf,
    pub data: RwLock<Option<ServerData>>,
}
