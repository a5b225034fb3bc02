use serde::{Deserialize, Serialize};
use std::{
    cmp,
    fmt::Display,
    iter::Sum,
    ops::{Add, Div, Mul, Sub},
    str::FromStr,
};
use thiserror::Error;

/// Degrees of latitude per kilometer, used for the flat-earth bounding-box
/// approximation in the spatial index (see `spatial::SpatialIndex::search`).
pub const KM_PER_DEG_LAT: f64 = 10_000.0 / 90.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Distance(f64);

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Add for Distance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Distance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<f64> for Distance {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<f64> for Distance {
    type Output = Self;
    fn div(self, rhs: f64) -> Self::Output {
        Self(self.0 / rhs)
    }
}

impl From<f64> for Distance {
    fn from(value: f64) -> Self {
        Distance(value)
    }
}

impl Distance {
    pub const fn from_meters(distance: f64) -> Self {
        Self(distance / 1000.0)
    }

    pub const fn from_kilometers(distance: f64) -> Self {
        Self(distance)
    }

    pub const fn as_meters(&self) -> f64 {
        self.0 * 1000.0
    }

    pub const fn as_kilometers(&self) -> f64 {
        self.0
    }
}

/// A point on the earth's surface. Stored as `f64` degrees to match the
/// precision expected by `rstar` and `geojson` coordinates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Sum for Coordinate {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        let mut count: usize = 0;
        let mut lat = 0.0;
        let mut lon = 0.0;
        iter.for_each(|coordinate| {
            count += 1;
            lat += coordinate.latitude;
            lon += coordinate.longitude;
        });
        let count = count as f64;
        Self {
            latitude: lat / count,
            longitude: lon / count,
        }
    }
}

impl From<Coordinate> for (f64, f64) {
    fn from(value: Coordinate) -> Self {
        (value.longitude, value.latitude)
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}, {}", self.latitude, self.longitude))
    }
}

#[derive(Error, Debug)]
pub enum ParseCoordinateError {
    #[error("invalid latitude")]
    InvalidLatitude,
    #[error("invalid longitude")]
    InvalidLongitude,
    #[error("invalid coordinate format, expected \"lat,lng\"")]
    InvalidFormat,
}

impl FromStr for Coordinate {
    type Err = ParseCoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.contains(',') {
            return Err(ParseCoordinateError::InvalidFormat);
        }
        let s: String = s.split_whitespace().collect();
        let split: Vec<_> = s.split(',').collect();
        let latitude: f64 = split
            .first()
            .ok_or(ParseCoordinateError::InvalidLatitude)?
            .parse()
            .map_err(|_| ParseCoordinateError::InvalidLatitude)?;
        let longitude: f64 = split
            .last()
            .ok_or(ParseCoordinateError::InvalidLongitude)?
            .parse()
            .map_err(|_| ParseCoordinateError::InvalidLongitude)?;
        Ok(Coordinate {
            latitude,
            longitude,
        })
    }
}

impl Coordinate {
    /// Great-circle (haversine) distance, assuming a spherical earth. True
    /// geodesic distance is explicitly out of scope.
    pub fn haversine_distance(&self, coord: &Self) -> Distance {
        const R_KM: f64 = 6371.0;
        let dist_lat = (coord.latitude - self.latitude).to_radians();
        let dist_lon = (coord.longitude - self.longitude).to_radians();
        let a = (dist_lat / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * coord.latitude.to_radians().cos()
                * (dist_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        Distance::from_kilometers(R_KM * c)
    }

    /// Estimated walking/road distance: haversine inflated by a circuity
    /// factor to approximate that people don't walk in straight lines.
    pub fn network_distance(&self, coord: &Self) -> Distance {
        const CIRCUITY_FACTOR: f64 = 1.3;
        Distance::from_kilometers(self.haversine_distance(coord).as_kilometers() * CIRCUITY_FACTOR)
    }
}

/// Sign of the orientation of the ordered triple `(a, b, c)`: positive for
/// counter-clockwise, negative for clockwise, ~zero for collinear.
fn orientation(a: Coordinate, b: Coordinate, c: Coordinate) -> f64 {
    (b.longitude - a.longitude) * (c.latitude - a.latitude)
        - (b.latitude - a.latitude) * (c.longitude - a.longitude)
}

const ORIENTATION_EPSILON: f64 = 1e-16;

fn on_segment(a: Coordinate, b: Coordinate, p: Coordinate) -> bool {
    p.longitude >= a.longitude.min(b.longitude)
        && p.longitude <= a.longitude.max(b.longitude)
        && p.latitude >= a.latitude.min(b.latitude)
        && p.latitude <= a.latitude.max(b.latitude)
}

/// True iff segments `[p1,p2]` and `[p3,p4]` share a point, treated purely as
/// planar geometry in (longitude, latitude) space. Used both to test walking
/// edges against water barriers and, indirectly, wherever two line segments
/// need a crossing test.
pub fn segments_intersect(p1: Coordinate, p2: Coordinate, p3: Coordinate, p4: Coordinate) -> bool {
    let d1 = orientation(p3, p4, p1);
    let d2 = orientation(p3, p4, p2);
    let d3 = orientation(p1, p2, p3);
    let d4 = orientation(p1, p2, p4);

    if ((d1 > ORIENTATION_EPSILON && d2 < -ORIENTATION_EPSILON)
        || (d1 < -ORIENTATION_EPSILON && d2 > ORIENTATION_EPSILON))
        && ((d3 > ORIENTATION_EPSILON && d4 < -ORIENTATION_EPSILON)
            || (d3 < -ORIENTATION_EPSILON && d4 > ORIENTATION_EPSILON))
    {
        return true;
    }

    if d1.abs() <= ORIENTATION_EPSILON && on_segment(p3, p4, p1) {
        return true;
    }
    if d2.abs() <= ORIENTATION_EPSILON && on_segment(p3, p4, p2) {
        return true;
    }
    if d3.abs() <= ORIENTATION_EPSILON && on_segment(p1, p2, p3) {
        return true;
    }
    if d4.abs() <= ORIENTATION_EPSILON && on_segment(p1, p2, p4) {
        return true;
    }
    false
}

/// Result of projecting a point onto a polyline: the nearest point itself,
/// its planar distance from the query point, and the indices of the polyline
/// vertices bracketing the winning segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    pub point: Coordinate,
    pub distance: f64,
    pub before_index: usize,
    pub after_index: usize,
}

/// Planar projection of `p` onto each segment of `polyline`, clamped to
/// `t ∈ [0,1]`, keeping the minimum squared distance. `polyline` must contain
/// at least two points.
pub fn closest_point_on_line_string(p: Coordinate, polyline: &[Coordinate]) -> Option<ClosestPoint> {
    if polyline.len() < 2 {
        return None;
    }
    let mut best: Option<ClosestPoint> = None;
    for (i, pair) in polyline.windows(2).enumerate() {
        let a = pair[0];
        let b = pair[1];
        let dx = b.longitude - a.longitude;
        let dy = b.latitude - a.latitude;
        let len_sq = dx * dx + dy * dy;
        let t = if len_sq > 0.0 {
            (((p.longitude - a.longitude) * dx + (p.latitude - a.latitude) * dy) / len_sq)
                .clamp(0.0, 1.0)
        } else {
            0.0
        };
        let proj = Coordinate {
            longitude: a.longitude + t * dx,
            latitude: a.latitude + t * dy,
        };
        let ddx = p.longitude - proj.longitude;
        let ddy = p.latitude - proj.latitude;
        let dist_sq = ddx * ddx + ddy * ddy;
        if best.is_none_or(|b| dist_sq < b.distance) {
            best = Some(ClosestPoint {
                point: proj,
                distance: dist_sq,
                before_index: i,
                after_index: i + 1,
            });
        }
    }
    best
}

#[test]
fn distance_test() {
    let coord_a = Coordinate {
        latitude: 48.858_01,
        longitude: 2.351_435,
    };

    let coord_b = Coordinate {
        latitude: 51.505_238,
        longitude: -0.124_954_075,
    };
    let d = coord_a.haversine_distance(&coord_b);
    assert!((d.as_kilometers() - 343.0).abs() < 5.0);
}

#[test]
fn distance_eq_test() {
    let dist_a = Distance::from_meters(1000.0);
    let dist_b = Distance::from_kilometers(1.0);
    assert_eq!(dist_a, dist_b)
}

#[test]
fn crossing_segments_intersect() {
    let p1 = Coordinate { longitude: 0.0, latitude: -1.0 };
    let p2 = Coordinate { longitude: 0.0, latitude: 1.0 };
    let p3 = Coordinate { longitude: -1.0, latitude: 0.0 };
    let p4 = Coordinate { longitude: 1.0, latitude: 0.0 };
    assert!(segments_intersect(p1, p2, p3, p4));
}

#[test]
fn parallel_segments_do_not_intersect() {
    let p1 = Coordinate { longitude: 0.0, latitude: 0.0 };
    let p2 = Coordinate { longitude: 1.0, latitude: 0.0 };
    let p3 = Coordinate { longitude: 0.0, latitude: 1.0 };
    let p4 = Coordinate { longitude: 1.0, latitude: 1.0 };
    assert!(!segments_intersect(p1, p2, p3, p4));
}

#[test]
fn closest_point_picks_nearest_segment() {
    let polyline = vec![
        Coordinate { longitude: 0.0, latitude: 0.0 },
        Coordinate { longitude: 1.0, latitude: 0.0 },
        Coordinate { longitude: 2.0, latitude: 0.0 },
    ];
    let result = closest_point_on_line_string(
        Coordinate { longitude: 1.5, latitude: 0.5 },
        &polyline,
    )
    .unwrap();
    assert_eq!(result.before_index, 1);
    assert_eq!(result.after_index, 2);
}
