//! Request/response shapes for the HTTP surface. Field names mirror the CLI
//! subcommand arguments so the same `QueryOptions` overrides work from either
//! entry point.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use transitway::{config::QueryOptions, indexed::IndexedFeed, model::Location, shared::Coordinate};

/// Either a bare stop id already present in the feed, or an arbitrary
/// lat/lng that gets spliced in as a synthetic stop for the query.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LocationInput {
    StopId(String),
    Coordinate { lat: f64, lng: f64 },
}

impl LocationInput {
    /// Resolves to a synthetic [`Location`] for augmentation, under
    /// `id_prefix` rather than the stop's own id (which would collide with
    /// the stop already present in the base feed). A named stop therefore
    /// always routes through the same coordinate-augmentation path as an
    /// arbitrary point, rather than branching into a separate "stop to
    /// stop" case per endpoint.
    pub fn into_location(self, indexed: &IndexedFeed, id_prefix: &str) -> Option<Location> {
        match self {
            LocationInput::StopId(stop_id) => {
                let idx = indexed.stop_idx(&stop_id)?;
                Some(Location { id: Arc::from(id_prefix), coordinate: indexed.stop(idx).coordinate })
            }
            LocationInput::Coordinate { lat, lng } => {
                Some(Location { id: Arc::from(id_prefix), coordinate: Coordinate { latitude: lat, longitude: lng } })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedLocation {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
}

impl From<NamedLocation> for Location {
    fn from(value: NamedLocation) -> Self {
        Location { id: Arc::from(value.id.as_str()), coordinate: Coordinate { latitude: value.lat, longitude: value.lng } }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteRequest {
    pub origin: LocationInput,
    pub destination: LocationInput,
    pub departure: String,
    /// Overrides the feed's default query options, same shape as the CLI's
    /// `--query` file.
    #[serde(default)]
    pub query: Option<QueryOptions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OneToManyRequest {
    pub origin: LocationInput,
    pub departure: String,
    pub destinations: Vec<NamedLocation>,
    #[serde(default)]
    pub query: Option<QueryOptions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OneToPresetRequest {
    pub preset: String,
    pub origin: LocationInput,
    pub departure: String,
    #[serde(default)]
    pub query: Option<QueryOptions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
