//! Impassable-water filter: rejects walking edges that would "jump a river".
//!
//! Reads a `FeatureCollection` of `LineString`s into planar segments, the
//! way `NREL-bambam` and `jwhandley-uk_rail_isochrones` use the `geojson`
//! crate.

use std::{fs, path::Path};

use thiserror::Error;

use crate::shared::{Coordinate, segments_intersect};

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error reading water geojson: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid geojson: {0}")]
    Parse(#[from] geojson::Error),
    #[error("water geojson feature at index {0} is not a LineString")]
    NotALineString(usize),
    #[error("water geojson root is not a FeatureCollection")]
    NotAFeatureCollection,
}

/// A flattened set of river-centerline segments. An empty filter rejects
/// nothing (used when no `water_geojson_file` is configured).
#[derive(Debug, Clone, Default)]
pub struct WaterFilter {
    segments: Vec<(Coordinate, Coordinate)>,
}

impl WaterFilter {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let raw = fs::read_to_string(path)?;
        Self::from_geojson_str(&raw)
    }

    pub fn from_geojson_str(raw: &str) -> Result<Self, Error> {
        let geojson = raw.parse::<geojson::GeoJson>()?;
        let geojson::GeoJson::FeatureCollection(collection) = geojson else {
            return Err(Error::NotAFeatureCollection);
        };

        let mut segments = Vec::new();
        for (i, feature) in collection.features.iter().enumerate() {
            let geometry = feature
                .geometry
                .as_ref()
                .ok_or(Error::NotALineString(i))?;
            let geojson::Value::LineString(coords) = &geometry.value else {
                return Err(Error::NotALineString(i));
            };
            let points: Vec<Coordinate> = coords
                .iter()
                .map(|c| Coordinate { longitude: c[0], latitude: c[1] })
                .collect();
            segments.extend(points.windows(2).map(|w| (w[0], w[1])));
        }
        Ok(Self { segments })
    }

    /// True iff the straight segment `(p1, p2)` crosses any water segment.
    pub fn crosses_water(&self, p1: Coordinate, p2: Coordinate) -> bool {
        self.segments
            .iter()
            .any(|&(w1, w2)| segments_intersect(p1, p2, w1, w2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_river() -> &'static str {
        r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [[-1.0, 0.0], [1.0, 0.0]]
                    }
                }
            ]
        }"#
    }

    #[test]
    fn crossing_edge_is_rejected() {
        let filter = WaterFilter::from_geojson_str(sample_river()).unwrap();
        assert!(filter.crosses_water(
            Coordinate { longitude: 0.0, latitude: -1.0 },
            Coordinate { longitude: 0.0, latitude: 1.0 },
        ));
    }

    #[test]
    fn non_crossing_edge_passes() {
        let filter = WaterFilter::from_geojson_str(sample_river()).unwrap();
        assert!(!filter.crosses_water(
            Coordinate { longitude: 5.0, latitude: 5.0 },
            Coordinate { longitude: 6.0, latitude: 5.0 },
        ));
    }

    #[test]
    fn non_linestring_feature_is_an_error() {
        let bad = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}}
            ]
        }"#;
        assert!(matches!(
            WaterFilter::from_geojson_str(bad),
            Err(Error::NotALineString(0))
        ));
    }
}
