//! Derived indices over a plain [`crate::feed::Feed`]: fast lookups by id,
//! stop-time orderings, shape fallbacks, and the walking-transfer graph.
//!
//! Built as composition over `Feed` (an `IndexedFeed` holds a `Feed`, it
//! doesn't extend one), with adjacency indices (`stop_to_trips`-equivalent,
//! `trip_to_stop_slice`-equivalent, parent-to-children) built alongside the
//! usual id lookups, plus a water-filter check and same-route-set
//! redundancy rejection on top of the walking-transfer derivation.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
    time::Instant,
};

use thiserror::Error;
use tracing::debug;

use crate::{
    config::LoadingOptions,
    feed::Feed,
    model::{DirectionId, Shape, Stop, StopTime, TransferType, WalkingCost, WalkingTransfer},
    shared::Distance,
    spatial::SpatialIndex,
    water::WaterFilter,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("stop_time at index {0} references an unknown trip")]
    DanglingStopTimeTrip(usize),
}

/// A comparable proxy cost used only to pick a winner when the same ordered
/// (from, to) pair is produced by more than one of the three walking-edge
/// sources; never stored or reported.
const DEDUP_COMPARISON_WALK_KPH: f64 = 5.1;

fn comparison_cost_secs(cost: &WalkingCost) -> f64 {
    match cost {
        WalkingCost::FixedSeconds { secs } => *secs as f64,
        WalkingCost::Distance { km } => km / DEDUP_COMPARISON_WALK_KPH * 3600.0,
    }
}

pub struct IndexedFeed {
    pub feed: Feed,
    stop_lookup: HashMap<Arc<str>, u32>,
    trip_lookup: HashMap<Arc<str>, u32>,
    route_lookup: HashMap<Arc<str>, u32>,
    shape_lookup: HashMap<Arc<str>, u32>,
    /// stop_idx -> indices into `feed.stop_times`, sorted by `time_of_day_sec`.
    stop_id_to_stop_times: Vec<Vec<u32>>,
    /// trip_idx -> indices into `feed.stop_times`, sorted by `stop_sequence`.
    trip_id_to_stop_times: Vec<Vec<u32>>,
    /// parent stop_idx -> child stop indices.
    parent_to_children: HashMap<u32, Vec<u32>>,
    /// (route_idx, direction) -> fallback shape_idx, preferring the longest shape seen.
    shape_hints: HashMap<(u32, DirectionId), u32>,
    /// stop_idx -> outgoing walking transfers, deduplicated and sorted.
    walking_transfers: Vec<Vec<WalkingTransfer>>,
    /// stop_idx -> route indices serving it, used for proximity redundancy checks.
    routes_by_stop: Vec<BTreeSet<u32>>,
    spatial_index: SpatialIndex,
    /// Retained (not just consumed at build time) so query-time augmentation
    /// can apply the same water-barrier rule to synthetic walking edges.
    water: WaterFilter,
}

impl IndexedFeed {
    pub fn build(
        feed: Feed,
        water: &WaterFilter,
        loading: &LoadingOptions,
    ) -> Result<Self, Error> {
        let now = Instant::now();

        let stop_lookup: HashMap<Arc<str>, u32> = feed
            .stops
            .iter()
            .enumerate()
            .map(|(i, s)| (s.stop_id.clone(), i as u32))
            .collect();
        let trip_lookup: HashMap<Arc<str>, u32> = feed
            .trips
            .iter()
            .enumerate()
            .map(|(i, t)| (t.trip_id.clone(), i as u32))
            .collect();
        let route_lookup: HashMap<Arc<str>, u32> = feed
            .routes
            .iter()
            .enumerate()
            .map(|(i, r)| (r.route_id.clone(), i as u32))
            .collect();
        let shape_lookup: HashMap<Arc<str>, u32> = feed
            .shapes
            .iter()
            .enumerate()
            .map(|(i, s)| (s.shape_id.clone(), i as u32))
            .collect();

        let mut stop_id_to_stop_times: Vec<Vec<u32>> = vec![Vec::new(); feed.stops.len()];
        let mut trip_id_to_stop_times: Vec<Vec<u32>> = vec![Vec::new(); feed.trips.len()];
        for (i, st) in feed.stop_times.iter().enumerate() {
            stop_id_to_stop_times[st.stop_idx as usize].push(i as u32);
            trip_id_to_stop_times[st.trip_idx as usize].push(i as u32);
        }
        for list in &mut stop_id_to_stop_times {
            list.sort_unstable_by_key(|&i| feed.stop_times[i as usize].time_of_day_sec);
        }
        for list in &mut trip_id_to_stop_times {
            list.sort_unstable_by_key(|&i| feed.stop_times[i as usize].stop_sequence);
        }

        let mut parent_to_children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (i, stop) in feed.stops.iter().enumerate() {
            if let Some(parent_id) = &stop.parent_station {
                if let Some(&parent_idx) = stop_lookup.get(parent_id.as_ref()) {
                    parent_to_children.entry(parent_idx).or_default().push(i as u32);
                }
            }
        }

        let mut routes_by_stop: Vec<BTreeSet<u32>> = vec![BTreeSet::new(); feed.stops.len()];
        for (trip_idx, stop_time_idxs) in trip_id_to_stop_times.iter().enumerate() {
            let route_idx = feed.trips[trip_idx].route_idx;
            if route_idx == u32::MAX {
                continue;
            }
            for &sti in stop_time_idxs {
                routes_by_stop[feed.stop_times[sti as usize].stop_idx as usize].insert(route_idx);
            }
        }

        let mut shape_hints: HashMap<(u32, DirectionId), (u32, usize)> = HashMap::new();
        for trip in &feed.trips {
            let (Some(shape_id), Some(direction)) = (&trip.shape_id, trip.direction_id) else {
                continue;
            };
            let Some(&shape_idx) = shape_lookup.get(shape_id.as_ref()) else { continue };
            let len = feed.shapes[shape_idx as usize].points.len();
            let key = (trip.route_idx, direction);
            let better = shape_hints.get(&key).is_none_or(|&(_, best_len)| len > best_len);
            if better {
                shape_hints.insert(key, (shape_idx, len));
            }
        }
        for hint in &loading.shape_hints {
            let (Some(&route_idx), Some(&shape_idx)) = (
                route_lookup.get(hint.route_id.as_str()),
                shape_lookup.get(hint.shape_id.as_str()),
            ) else {
                continue;
            };
            let direction = DirectionId::from(hint.direction_id);
            let len = feed.shapes[shape_idx as usize].points.len();
            shape_hints.insert((route_idx, direction), (shape_idx, len));
        }
        let shape_hints: HashMap<(u32, DirectionId), u32> =
            shape_hints.into_iter().map(|(k, (shape_idx, _))| (k, shape_idx)).collect();

        let served_stops: Vec<u32> = (0..feed.stops.len() as u32)
            .filter(|&i| !stop_id_to_stop_times[i as usize].is_empty())
            .collect();
        let mut spatial_index = SpatialIndex::new();
        spatial_index.add(served_stops.iter().map(|&i| (i, feed.stops[i as usize].coordinate)));

        let walking_transfers = build_walking_transfers(
            &feed,
            &stop_lookup,
            &parent_to_children,
            &routes_by_stop,
            &served_stops,
            &spatial_index,
            water,
            loading.max_allowable_between_stop_walk(),
        );

        debug!(elapsed = ?now.elapsed(), stops = feed.stops.len(), "feed indexed");

        Ok(Self {
            feed,
            stop_lookup,
            trip_lookup,
            route_lookup,
            shape_lookup,
            stop_id_to_stop_times,
            trip_id_to_stop_times,
            parent_to_children,
            shape_hints,
            walking_transfers,
            routes_by_stop,
            spatial_index,
            water: water.clone(),
        })
    }

    pub fn stop_idx(&self, id: &str) -> Option<u32> {
        self.stop_lookup.get(id).copied()
    }

    pub fn trip_idx(&self, id: &str) -> Option<u32> {
        self.trip_lookup.get(id).copied()
    }

    pub fn route_idx(&self, id: &str) -> Option<u32> {
        self.route_lookup.get(id).copied()
    }

    pub fn stop(&self, idx: u32) -> &Stop {
        &self.feed.stops[idx as usize]
    }

    pub fn shape(&self, idx: u32) -> &Shape {
        &self.feed.shapes[idx as usize]
    }

    pub fn shape_hint(&self, route_idx: u32, direction: DirectionId) -> Option<u32> {
        self.shape_hints.get(&(route_idx, direction)).copied()
    }

    /// Stop-times at `stop_idx`, sorted by `time_of_day_sec`.
    pub fn stop_times_at(&self, stop_idx: u32) -> impl Iterator<Item = &StopTime> {
        self.stop_id_to_stop_times[stop_idx as usize]
            .iter()
            .map(|&i| &self.feed.stop_times[i as usize])
    }

    /// Stop-times on `trip_idx`, sorted by `stop_sequence`.
    pub fn stop_times_on(&self, trip_idx: u32) -> &[u32] {
        &self.trip_id_to_stop_times[trip_idx as usize]
    }

    pub fn stop_time(&self, idx: u32) -> &StopTime {
        &self.feed.stop_times[idx as usize]
    }

    pub fn walking_transfers_from(&self, stop_idx: u32) -> &[WalkingTransfer] {
        &self.walking_transfers[stop_idx as usize]
    }

    pub fn children_of(&self, parent_idx: u32) -> &[u32] {
        self.parent_to_children.get(&parent_idx).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn spatial_index(&self) -> &SpatialIndex {
        &self.spatial_index
    }

    pub fn water_filter(&self) -> &WaterFilter {
        &self.water
    }

    pub fn stop_count(&self) -> usize {
        self.feed.stops.len()
    }
}

impl crate::raptor::TransitGraph for IndexedFeed {
    fn stop_times_at(&self, stop_idx: u32) -> Vec<StopTime> {
        IndexedFeed::stop_times_at(self, stop_idx).copied().collect()
    }

    fn stop_times_on(&self, trip_idx: u32) -> Vec<StopTime> {
        IndexedFeed::stop_times_on(self, trip_idx)
            .iter()
            .map(|&i| self.feed.stop_times[i as usize])
            .collect()
    }

    fn walking_transfers_from(&self, stop_idx: u32) -> Vec<WalkingTransfer> {
        IndexedFeed::walking_transfers_from(self, stop_idx).to_vec()
    }

    fn trip_route(&self, trip_idx: u32) -> Option<(u32, crate::model::RouteType)> {
        let route_idx = self.feed.trips[trip_idx as usize].route_idx;
        if route_idx == u32::MAX {
            return None;
        }
        Some((route_idx, self.feed.routes[route_idx as usize].route_type))
    }

    fn stop_idx(&self, id: &str) -> Option<u32> {
        IndexedFeed::stop_idx(self, id)
    }

    fn route_idx(&self, id: &str) -> Option<u32> {
        IndexedFeed::route_idx(self, id)
    }

    fn stop_id(&self, stop_idx: u32) -> Arc<str> {
        self.feed.stops[stop_idx as usize].stop_id.clone()
    }

    fn stop_coordinate(&self, stop_idx: u32) -> crate::shared::Coordinate {
        self.feed.stops[stop_idx as usize].coordinate
    }

    fn trip_id(&self, trip_idx: u32) -> Arc<str> {
        self.feed.trips[trip_idx as usize].trip_id.clone()
    }

    fn route_id(&self, route_idx: u32) -> Arc<str> {
        self.feed.routes[route_idx as usize].route_id.clone()
    }
}

/// Expands a stop to its children if it has any, otherwise to itself — the
/// "childOrSelf" set used when applying an explicit `MIN_TIME` transfer.
fn child_or_self(stop_idx: u32, parent_to_children: &HashMap<u32, Vec<u32>>) -> Vec<u32> {
    match parent_to_children.get(&stop_idx) {
        Some(children) if !children.is_empty() => children.clone(),
        _ => vec![stop_idx],
    }
}

#[allow(clippy::too_many_arguments)]
fn build_walking_transfers(
    feed: &Feed,
    stop_lookup: &HashMap<Arc<str>, u32>,
    parent_to_children: &HashMap<u32, Vec<u32>>,
    routes_by_stop: &[BTreeSet<u32>],
    served_stops: &[u32],
    spatial_index: &SpatialIndex,
    water: &WaterFilter,
    max_between_stop_walk: Distance,
) -> Vec<Vec<WalkingTransfer>> {
    let mut edges: Vec<Vec<(u32, WalkingCost)>> = vec![Vec::new(); feed.stops.len()];
    let mut push = |from: u32, to: u32, cost: WalkingCost| {
        if from != to {
            edges[from as usize].push((to, cost));
        }
    };

    // 1. intra-station: siblings <-> siblings, parent <-> child, all free.
    for (&parent, children) in parent_to_children {
        for &a in children {
            push(parent, a, WalkingCost::FixedSeconds { secs: 0 });
            push(a, parent, WalkingCost::FixedSeconds { secs: 0 });
            for &b in children {
                push(a, b, WalkingCost::FixedSeconds { secs: 0 });
            }
        }
    }

    // 2. explicit MIN_TIME transfers, expanded to (childOrSelf x childOrSelf).
    let mut explicit_pairs: HashSet<(u32, u32)> = HashSet::new();
    for transfer in &feed.transfers {
        let (Some(&from_idx), Some(&to_idx)) = (
            stop_lookup.get(transfer.from_stop_id.as_ref()),
            stop_lookup.get(transfer.to_stop_id.as_ref()),
        ) else {
            continue;
        };
        explicit_pairs.insert((from_idx, to_idx));
        explicit_pairs.insert((to_idx, from_idx));
        if transfer.transfer_type != TransferType::MinTime {
            continue;
        }
        let Some(secs) = transfer.min_transfer_time else { continue };
        for &from in &child_or_self(from_idx, parent_to_children) {
            for &to in &child_or_self(to_idx, parent_to_children) {
                push(from, to, WalkingCost::FixedSeconds { secs });
            }
        }
    }

    // 3. proximity footpaths among stops that have service.
    let mut visited_pairs: HashSet<(u32, u32)> = HashSet::new();
    for &from in served_stops {
        let coord = feed.stops[from as usize].coordinate;
        for hit in spatial_index.search(coord, max_between_stop_walk) {
            let to = hit.id;
            if to == from {
                continue;
            }
            let pair = (from.min(to), from.max(to));
            if !visited_pairs.insert(pair) {
                continue;
            }
            if explicit_pairs.contains(&(from, to)) {
                continue;
            }
            if routes_by_stop[from as usize] == routes_by_stop[to as usize] {
                continue;
            }
            let to_coord = feed.stops[to as usize].coordinate;
            if water.crosses_water(coord, to_coord) {
                continue;
            }
            push(from, to, WalkingCost::Distance { km: hit.km });
            push(to, from, WalkingCost::Distance { km: hit.km });
        }
    }

    // de-duplicate per origin by destination, keeping the cheapest, then sort.
    edges
        .into_iter()
        .map(|mut list| {
            let mut best: HashMap<u32, WalkingCost> = HashMap::new();
            for (to, cost) in list.drain(..) {
                best.entry(to)
                    .and_modify(|existing| {
                        if comparison_cost_secs(&cost) < comparison_cost_secs(existing) {
                            *existing = cost;
                        }
                    })
                    .or_insert(cost);
            }
            let mut out: Vec<WalkingTransfer> =
                best.into_iter().map(|(to_stop_idx, cost)| WalkingTransfer { to_stop_idx, cost }).collect();
            out.sort_unstable_by(|a, b| match (a.cost, b.cost) {
                (WalkingCost::Distance { km: ka }, WalkingCost::Distance { km: kb }) => {
                    ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
                }
                (WalkingCost::FixedSeconds { secs: sa }, WalkingCost::FixedSeconds { secs: sb }) => {
                    (sa, a.to_stop_idx).cmp(&(sb, b.to_stop_idx))
                }
                (WalkingCost::FixedSeconds { .. }, WalkingCost::Distance { .. }) => std::cmp::Ordering::Less,
                (WalkingCost::Distance { .. }, WalkingCost::FixedSeconds { .. }) => std::cmp::Ordering::Greater,
            });
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Calendar, CalendarEntry, Route, RouteType, Stop, Trip};
    use crate::shared::{Coordinate, Time};

    fn minimal_feed() -> Feed {
        let stops = vec![
            Stop {
                stop_id: "A".into(),
                stop_name: "A".into(),
                stop_desc: None,
                coordinate: Coordinate { latitude: 0.0, longitude: 0.0 },
                parent_station: None,
                feed_name: None,
            },
            Stop {
                stop_id: "B".into(),
                stop_name: "B".into(),
                stop_desc: None,
                coordinate: Coordinate { latitude: 0.001, longitude: 0.001 },
                parent_station: None,
                feed_name: None,
            },
        ];
        let routes = vec![Route {
            route_id: "R1".into(),
            route_type: RouteType::Bus,
            short_name: None,
            long_name: None,
            color: None,
            text_color: None,
        }];
        let trips = vec![Trip {
            trip_id: "T1".into(),
            route_idx: 0,
            service_id: "S1".into(),
            direction_id: None,
            shape_id: None,
            headsign: None,
            short_name: None,
            block_id: None,
        }];
        let stop_times = vec![
            StopTime {
                trip_idx: 0,
                stop_idx: 0,
                stop_sequence: 1,
                arrival_time: Time::from_seconds(0),
                departure_time: Time::from_seconds(0),
                time_of_day_sec: Time::from_seconds(0),
            },
            StopTime {
                trip_idx: 0,
                stop_idx: 1,
                stop_sequence: 2,
                arrival_time: Time::from_seconds(600),
                departure_time: Time::from_seconds(600),
                time_of_day_sec: Time::from_seconds(600),
            },
        ];
        Feed {
            stops,
            stop_times,
            trips,
            routes,
            calendars: vec![CalendarEntry {
                service_id: "S1".into(),
                calendar: Calendar {
                    monday: true,
                    tuesday: true,
                    wednesday: true,
                    thursday: true,
                    friday: true,
                    saturday: true,
                    sunday: true,
                    start_date: 20240101,
                    end_date: 20241231,
                },
            }],
            calendar_dates: vec![],
            shapes: vec![],
            transfers: vec![],
        }
    }

    #[test]
    fn same_route_pair_is_not_a_redundant_proximity_walk() {
        // A and B are both served by route R1, so a proximity footpath
        // between them should be rejected as redundant.
        let feed = minimal_feed();
        let loading = LoadingOptions {
            departure_date: 20240101,
            gtfs_data_dirs: vec![],
            stop_time_filter: None,
            max_allowable_between_stop_walk_km: 1.5,
            max_allowable_walking_distance_km: f64::INFINITY,
            max_allowable_number_of_transfers: u32::MAX,
            water_geojson_file: None,
            shape_hints: vec![],
            preset_destinations: vec![],
            default_query_options: None,
        };
        let indexed = IndexedFeed::build(feed, &WaterFilter::empty(), &loading).unwrap();
        assert!(indexed.walking_transfers_from(0).is_empty());
    }

    #[test]
    fn no_self_loops_or_duplicate_destinations() {
        let feed = minimal_feed();
        let loading = LoadingOptions {
            departure_date: 20240101,
            gtfs_data_dirs: vec![],
            stop_time_filter: None,
            max_allowable_between_stop_walk_km: 1.5,
            max_allowable_walking_distance_km: f64::INFINITY,
            max_allowable_number_of_transfers: u32::MAX,
            water_geojson_file: None,
            shape_hints: vec![],
            preset_destinations: vec![],
            default_query_options: None,
        };
        let indexed = IndexedFeed::build(feed, &WaterFilter::empty(), &loading).unwrap();
        for transfers in &indexed.walking_transfers {
            let mut seen = HashSet::new();
            for t in transfers {
                assert!(seen.insert(t.to_stop_idx), "duplicate destination");
            }
        }
    }
}
