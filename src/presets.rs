//! Pre-augmented destination feeds: a canned set of destinations whose
//! stop↔destination walking edges are computed once at load time instead of
//! per query.
//!
//! Grounded on [`crate::online::AugmentedFeed`]'s two-phase
//! `add_destinations`/`add_origin` split, which exists specifically so this
//! module can build the destinations half once and clone-and-extend it per
//! query — built once at load time, read concurrently thereafter.

use std::{fs::File, path::Path, sync::Arc};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    config::{PresetConfig, QueryOptions},
    indexed::IndexedFeed,
    model::Location,
    online::{self, AugmentedFeed},
    shared::Coordinate,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error reading locations file: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error reading locations file: {0}")]
    Csv(#[from] csv::Error),
    #[error("augmenting preset {name:?}: {source}")]
    Augment { name: String, source: online::Error },
}

#[derive(Debug, Deserialize)]
struct LocationRow {
    id: String,
    latitude: f64,
    longitude: f64,
}

/// Reads a `{id, latitude, longitude}` CSV, used both for preset destination
/// lists and directly by the CLI's `one-to-many`/`all-pairs` subcommands.
pub fn load_locations_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Location>, Error> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    reader
        .deserialize()
        .map(|row| {
            let row: LocationRow = row?;
            Ok(Location {
                id: Arc::from(row.id),
                coordinate: Coordinate { latitude: row.latitude, longitude: row.longitude },
            })
        })
        .collect()
}

/// A named destination set with its stop↔destination edges pre-computed.
pub struct PresetFeed<'a> {
    name: String,
    destinations: Vec<Location>,
    /// An [`AugmentedFeed`] carrying only the destinations, never an origin —
    /// `augment_with_origin` clones this and layers the per-query origin on top.
    template: AugmentedFeed<'a>,
}

impl<'a> PresetFeed<'a> {
    pub fn build(base: &'a IndexedFeed, config: &PresetConfig) -> Result<Self, Error> {
        let destinations = load_locations_csv(&config.locations_file)?;
        let options = QueryOptions {
            max_walking_distance_km: config.max_allowable_destination_walk_km,
            ..QueryOptions::default()
        };
        let mut template = AugmentedFeed::new(base);
        template
            .add_destinations(&destinations, &options)
            .map_err(|source| Error::Augment { name: config.name.clone(), source })?;
        Ok(Self { name: config.name.clone(), destinations, template })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn destinations(&self) -> &[Location] {
        &self.destinations
    }

    /// Clones the destinations-only template and layers `origin` on top —
    /// the per-query cost is just the overlay maps, not the base feed or
    /// destination walking edges.
    pub fn augment_with_origin(&self, origin: &Location, options: &QueryOptions) -> Result<AugmentedFeed<'a>, online::Error> {
        let mut augmented = self.template.clone();
        augmented.add_origin(origin, options)?;
        Ok(augmented)
    }
}

/// The full set of configured presets, built once at load time and shared
/// read-only across queries.
pub struct PresetDestinations<'a> {
    by_name: std::collections::HashMap<String, PresetFeed<'a>>,
}

impl<'a> PresetDestinations<'a> {
    pub fn load(base: &'a IndexedFeed, configs: &[PresetConfig]) -> Result<Self, Error> {
        let mut by_name = std::collections::HashMap::new();
        for config in configs {
            by_name.insert(config.name.clone(), PresetFeed::build(base, config)?);
        }
        Ok(Self { by_name })
    }

    pub fn get(&self, name: &str) -> Option<&PresetFeed<'a>> {
        self.by_name.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_locations_csv_parses_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "id,latitude,longitude\nA,36.9,-116.8\nB,36.4,-117.1\n").unwrap();
        let locations = load_locations_csv(file.path()).unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].id.as_ref(), "A");
    }
}
