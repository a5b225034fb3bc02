//! A 2D R-tree over stop coordinates, used to find walkable pairs of stops
//! and to snap query endpoints onto the nearest real stops.
//!
//! Uses an `rstar::RTree` over `[lng, lat]` points (see
//! `chingiztob-cascade/cascade-core/src/{connectors,shapes}.rs` for the same
//! `GeomWithData` + bulk-load pattern). Distance semantics follow a
//! flat-earth-bounding-box-then-exact-reject algorithm rather than a plain
//! Euclidean nearest-neighbor query, since degrees of longitude and latitude
//! aren't equidistant.

use rstar::{AABB, RTree, primitives::GeomWithData};

use crate::shared::geo::KM_PER_DEG_LAT;
use crate::shared::{Coordinate, Distance};

type Entry = GeomWithData<[f64; 2], u32>;

/// A point id paired with its distance (km) from a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: u32,
    pub km: f64,
}

/// An R-tree over `(longitude, latitude)` points, each carrying an opaque
/// `u32` id (typically a stop index).
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    points: Vec<(u32, Coordinate)>,
    tree: RTree<Entry>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-inserts `points` (id, coordinate pairs), replacing whatever was
    /// indexed before.
    pub fn add(&mut self, points: impl IntoIterator<Item = (u32, Coordinate)>) {
        let points: Vec<_> = points.into_iter().collect();
        let entries: Vec<Entry> = points
            .iter()
            .map(|(id, coord)| GeomWithData::new([coord.longitude, coord.latitude], *id))
            .collect();
        self.tree = RTree::bulk_load(entries);
        self.points = points;
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Km-per-degree-longitude at a given latitude:
    /// `kmPerDegLng = kmPerDegLat * cos(lat * pi/180)`.
    fn km_per_deg_lng(latitude: f64) -> f64 {
        KM_PER_DEG_LAT * latitude.to_radians().cos()
    }

    /// All indexed points within `radius` (great-circle km, approximated via
    /// the flat-earth box) of `point`.
    pub fn search(&self, point: Coordinate, radius: Distance) -> Vec<Hit> {
        let radius_km = radius.as_kilometers();
        let deg_lat = radius_km / KM_PER_DEG_LAT;
        let km_per_lng = Self::km_per_deg_lng(point.latitude).max(f64::EPSILON);
        let deg_lng = radius_km / km_per_lng;

        let envelope = AABB::from_corners(
            [point.longitude - deg_lng, point.latitude - deg_lat],
            [point.longitude + deg_lng, point.latitude + deg_lat],
        );

        let radius_sq = radius_km * radius_km;
        self.tree
            .locate_in_envelope(&envelope)
            .filter_map(|entry| {
                let [lng, lat] = *entry.geom();
                let dlat = (lat - point.latitude) * KM_PER_DEG_LAT;
                let dlng = (lng - point.longitude) * km_per_lng;
                let dist_sq = dlat * dlat + dlng * dlng;
                if dist_sq <= radius_sq {
                    Some(Hit {
                        id: entry.data,
                        km: dist_sq.sqrt(),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// For every point in `self`, all points in `other` within `radius`.
    pub fn intersect(&self, other: &SpatialIndex, radius: Distance) -> Vec<(u32, Vec<Hit>)> {
        self.points
            .iter()
            .map(|(id, coord)| (*id, other.search(*coord, radius)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_finds_nearby_and_excludes_far_points() {
        let mut index = SpatialIndex::new();
        index.add([
            (1, Coordinate { latitude: 0.0, longitude: 0.0 }),
            (2, Coordinate { latitude: 0.01, longitude: 0.01 }),
            (3, Coordinate { latitude: 10.0, longitude: 10.0 }),
        ]);

        let hits = index.search(
            Coordinate { latitude: 0.0, longitude: 0.0 },
            Distance::from_kilometers(5.0),
        );
        let ids: Vec<u32> = hits.iter().map(|h| h.id).collect();
        assert!(ids.contains(&1));
        assert!(ids.contains(&2));
        assert!(!ids.contains(&3));
    }

    #[test]
    fn intersect_pairs_each_self_point_with_other_hits() {
        let mut a = SpatialIndex::new();
        a.add([(1, Coordinate { latitude: 0.0, longitude: 0.0 })]);
        let mut b = SpatialIndex::new();
        b.add([(10, Coordinate { latitude: 0.001, longitude: 0.001 })]);

        let result = a.intersect(&b, Distance::from_kilometers(1.0));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].0, 1);
        assert_eq!(result[0].1[0].id, 10);
    }
}
