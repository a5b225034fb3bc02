//! Configuration types for feed loading and per-query options.
//!
//! Plain `serde`-derived structs with a `Default` impl supplying every
//! documented default, merged builder-style (`defaults ← feedOptions ←
//! userOptions`) rather than read from ambient global state.

use serde::{Deserialize, Serialize};

use crate::shared::Distance;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopTimeFilter {
    pub earliest: Option<u32>,
    pub latest: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeHint {
    pub route_id: String,
    pub direction_id: u8,
    pub shape_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetConfig {
    pub name: String,
    pub locations_file: String,
    pub max_allowable_destination_walk_km: f64,
}

/// Options that affect how the feed is loaded and indexed; chosen once per
/// process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadingOptions {
    pub departure_date: u32,
    pub gtfs_data_dirs: Vec<String>,
    #[serde(default)]
    pub stop_time_filter: Option<StopTimeFilter>,
    #[serde(default = "default_max_allowable_between_stop_walk_km")]
    pub max_allowable_between_stop_walk_km: f64,
    #[serde(default = "default_max_allowable_walking_distance_km")]
    pub max_allowable_walking_distance_km: f64,
    #[serde(default = "default_max_allowable_number_of_transfers")]
    pub max_allowable_number_of_transfers: u32,
    #[serde(default)]
    pub water_geojson_file: Option<String>,
    #[serde(default)]
    pub shape_hints: Vec<ShapeHint>,
    #[serde(default)]
    pub preset_destinations: Vec<PresetConfig>,
    /// Feed-level override sitting between the built-in [`QueryOptions`]
    /// defaults and whatever the caller supplies per query.
    #[serde(default)]
    pub default_query_options: Option<QueryOptions>,
}

fn default_max_allowable_between_stop_walk_km() -> f64 {
    1.5
}
fn default_max_allowable_walking_distance_km() -> f64 {
    f64::INFINITY
}
fn default_max_allowable_number_of_transfers() -> u32 {
    u32::MAX
}

impl LoadingOptions {
    pub fn max_allowable_between_stop_walk(&self) -> Distance {
        Distance::from_kilometers(self.max_allowable_between_stop_walk_km)
    }

    /// Layers `defaults ← feed-level default ← caller-supplied options`: each
    /// later layer, when present, wins wholesale over the previous, then the
    /// result is clamped to this feed's `max_allowable_*` ceilings.
    pub fn resolve_query_options(&self, user: Option<QueryOptions>) -> QueryOptions {
        user.or_else(|| self.default_query_options.clone()).unwrap_or_default().clamped_to(self)
    }
}

/// Options for a single query, merged `defaults ← feed-level ← user` and
/// then clamped to the feed's `max_allowable_*` ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default = "default_max_walking_distance_km")]
    pub max_walking_distance_km: f64,
    #[serde(default = "default_walking_speed_kph")]
    pub walking_speed_kph: f64,
    #[serde(default = "default_max_waiting_time_secs")]
    pub max_waiting_time_secs: u32,
    #[serde(default = "default_transfer_penalty_secs")]
    pub transfer_penalty_secs: u32,
    #[serde(default = "default_max_number_of_transfers")]
    pub max_number_of_transfers: u32,
    #[serde(default = "default_max_commute_time_secs")]
    pub max_commute_time_secs: u32,
    #[serde(default = "default_multiplier")]
    pub bus_multiplier: f64,
    #[serde(default = "default_multiplier")]
    pub rail_multiplier: f64,
    #[serde(default)]
    pub exclude_routes: Vec<String>,
    #[serde(default)]
    pub exclude_stops: Vec<String>,
}

fn default_max_walking_distance_km() -> f64 {
    1.5
}
fn default_walking_speed_kph() -> f64 {
    5.1
}
fn default_max_waiting_time_secs() -> u32 {
    1800
}
fn default_transfer_penalty_secs() -> u32 {
    30
}
fn default_max_number_of_transfers() -> u32 {
    1
}
fn default_max_commute_time_secs() -> u32 {
    u32::MAX
}
fn default_multiplier() -> f64 {
    1.0
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_walking_distance_km: default_max_walking_distance_km(),
            walking_speed_kph: default_walking_speed_kph(),
            max_waiting_time_secs: default_max_waiting_time_secs(),
            transfer_penalty_secs: default_transfer_penalty_secs(),
            max_number_of_transfers: default_max_number_of_transfers(),
            max_commute_time_secs: default_max_commute_time_secs(),
            bus_multiplier: default_multiplier(),
            rail_multiplier: default_multiplier(),
            exclude_routes: Vec::new(),
            exclude_stops: Vec::new(),
        }
    }
}

impl QueryOptions {
    /// Merges `self` (the user-supplied overrides, already merged over any
    /// feed-level defaults by the caller) against the feed's
    /// `max_allowable_*` ceilings, clamping anything that would exceed them.
    pub fn clamped_to(mut self, loading: &LoadingOptions) -> Self {
        self.max_walking_distance_km = self
            .max_walking_distance_km
            .min(loading.max_allowable_walking_distance_km);
        self.max_number_of_transfers = self
            .max_number_of_transfers
            .min(loading.max_allowable_number_of_transfers);
        self
    }

    pub fn walking_speed_m_per_sec(&self) -> f64 {
        self.walking_speed_kph * 1000.0 / 3600.0
    }
}
