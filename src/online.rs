//! Query entry points and the layered "augmented feed" that splices a
//! query's origin and destinations into the transit graph as ephemeral
//! stops joined by walking edges.
//!
//! The reconstructed-route shape follows `crates/server/src/dto.rs`'s
//! response fields. The augmentation itself is a borrow of the immutable
//! base feed plus owned per-query overlay maps, with "overlay, then base"
//! lookup precedence, rather than a cloned feed with field overrides.

use std::{collections::HashMap, sync::Arc};

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::QueryOptions,
    indexed::IndexedFeed,
    model::{Location, TransportMode, WalkingCost, WalkingTransfer},
    raptor::{self, ReachInfo, Tau, TransitGraph},
    shared::{Coordinate, Distance, Time},
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("location id {0:?} collides with an existing stop id")]
    IdCollision(Arc<str>),
}

/// A query-scoped view over a base [`IndexedFeed`], adding synthetic stops
/// for the query's origin/destinations and the walking edges that connect
/// them to the real network. Never mutates `base`; dropped at the end of
/// the query. `Clone`-able so a [`crate::presets::PresetFeed`] can build a
/// destinations-only template once and cheaply clone-and-extend it with a
/// fresh origin per query — only the small overlay maps are cloned, never
/// the underlying spatial index.
#[derive(Clone)]
pub struct AugmentedFeed<'a> {
    base: &'a IndexedFeed,
    base_len: u32,
    extra_stops: Vec<Location>,
    extra_stop_lookup: HashMap<Arc<str>, u32>,
    /// stop_idx (base or synthetic) -> additional outgoing walking edges.
    extra_walks: HashMap<u32, Vec<WalkingTransfer>>,
}

impl<'a> AugmentedFeed<'a> {
    pub fn new(base: &'a IndexedFeed) -> Self {
        Self {
            base,
            base_len: base.stop_count() as u32,
            extra_stops: Vec::new(),
            extra_stop_lookup: HashMap::new(),
            extra_walks: HashMap::new(),
        }
    }

    pub fn build(
        base: &'a IndexedFeed,
        origin: Option<&Location>,
        destinations: &[Location],
        options: &QueryOptions,
    ) -> Result<Self, Error> {
        let mut feed = Self::new(base);
        feed.add_destinations(destinations, options)?;
        if let Some(origin) = origin {
            feed.add_origin(origin, options)?;
        }
        Ok(feed)
    }

    fn next_idx(&self) -> u32 {
        self.base_len + self.extra_stops.len() as u32
    }

    fn check_collision(&self, id: &Arc<str>) -> Result<(), Error> {
        if self.base.stop_idx(id).is_some() || self.extra_stop_lookup.contains_key(id) {
            return Err(Error::IdCollision(id.clone()));
        }
        Ok(())
    }

    /// Adds destination-role stops with real-stop -> destination edges
    /// (the traveler boards in the base network and walks the last leg).
    pub fn add_destinations(&mut self, destinations: &[Location], options: &QueryOptions) -> Result<(), Error> {
        for location in destinations {
            self.check_collision(&location.id)?;
        }
        let radius = Distance::from_kilometers(options.max_walking_distance_km);
        let water = self.base.water_filter();
        for location in destinations {
            let idx = self.next_idx();
            self.extra_stop_lookup.insert(location.id.clone(), idx);
            self.extra_stops.push(location.clone());
            for hit in self.base.spatial_index().search(location.coordinate, radius) {
                let stop_coord = self.base.stop(hit.id).coordinate;
                if water.crosses_water(stop_coord, location.coordinate) {
                    continue;
                }
                self.push_walk(hit.id, idx, WalkingCost::Distance { km: hit.km });
            }
        }
        Ok(())
    }

    /// Adds an origin-role stop with origin -> real-stop edges, plus direct
    /// origin -> destination edges to every destination already present.
    pub fn add_origin(&mut self, origin: &Location, options: &QueryOptions) -> Result<(), Error> {
        self.check_collision(&origin.id)?;
        let idx = self.next_idx();
        let radius = Distance::from_kilometers(options.max_walking_distance_km);
        let water = self.base.water_filter();

        for hit in self.base.spatial_index().search(origin.coordinate, radius) {
            let stop_coord = self.base.stop(hit.id).coordinate;
            if water.crosses_water(origin.coordinate, stop_coord) {
                continue;
            }
            self.push_walk(idx, hit.id, WalkingCost::Distance { km: hit.km });
        }
        for (i, destination) in self.extra_stops.clone().iter().enumerate() {
            let dest_idx = self.base_len + i as u32;
            let direct_km = origin.coordinate.haversine_distance(&destination.coordinate).as_kilometers();
            if direct_km <= radius.as_kilometers() && !water.crosses_water(origin.coordinate, destination.coordinate) {
                self.push_walk(idx, dest_idx, WalkingCost::Distance { km: direct_km });
            }
        }

        self.extra_stop_lookup.insert(origin.id.clone(), idx);
        self.extra_stops.push(origin.clone());
        Ok(())
    }

    fn push_walk(&mut self, from: u32, to: u32, cost: WalkingCost) {
        if from != to {
            self.extra_walks.entry(from).or_default().push(WalkingTransfer { to_stop_idx: to, cost });
        }
    }

    pub fn stop_idx_of(&self, id: &str) -> Option<u32> {
        self.extra_stop_lookup.get(id).copied().or_else(|| self.base.stop_idx(id))
    }

    fn location(&self, stop_idx: u32) -> Option<&Location> {
        if stop_idx < self.base_len {
            None
        } else {
            self.extra_stops.get((stop_idx - self.base_len) as usize)
        }
    }
}

impl TransitGraph for AugmentedFeed<'_> {
    fn stop_times_at(&self, stop_idx: u32) -> Vec<crate::model::StopTime> {
        if stop_idx < self.base_len { TransitGraph::stop_times_at(self.base, stop_idx) } else { Vec::new() }
    }

    fn stop_times_on(&self, trip_idx: u32) -> Vec<crate::model::StopTime> {
        TransitGraph::stop_times_on(self.base, trip_idx)
    }

    fn walking_transfers_from(&self, stop_idx: u32) -> Vec<WalkingTransfer> {
        let mut out =
            if stop_idx < self.base_len { TransitGraph::walking_transfers_from(self.base, stop_idx) } else { Vec::new() };
        if let Some(extra) = self.extra_walks.get(&stop_idx) {
            out.extend(extra.iter().copied());
        }
        out
    }

    fn trip_route(&self, trip_idx: u32) -> Option<(u32, crate::model::RouteType)> {
        TransitGraph::trip_route(self.base, trip_idx)
    }

    fn stop_idx(&self, id: &str) -> Option<u32> {
        self.stop_idx_of(id)
    }

    fn route_idx(&self, id: &str) -> Option<u32> {
        self.base.route_idx(id)
    }

    fn stop_id(&self, stop_idx: u32) -> Arc<str> {
        match self.location(stop_idx) {
            Some(location) => location.id.clone(),
            None => self.base.stop_id(stop_idx),
        }
    }

    fn stop_coordinate(&self, stop_idx: u32) -> Coordinate {
        match self.location(stop_idx) {
            Some(location) => location.coordinate,
            None => self.base.stop_coordinate(stop_idx),
        }
    }

    fn trip_id(&self, trip_idx: u32) -> Arc<str> {
        self.base.trip_id(trip_idx)
    }

    fn route_id(&self, route_idx: u32) -> Arc<str> {
        self.base.route_id(route_idx)
    }
}

/// One leg of a reconstructed itinerary.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub from: Arc<str>,
    pub to: Arc<str>,
    pub mode: TransportMode,
    pub depart_time: Time,
    pub arrive_time: Time,
    pub travel_time_secs: u32,
    pub trip_id: Option<Arc<str>>,
    pub route_id: Option<Arc<str>>,
    pub num_stops: Option<u32>,
    pub distance_km: Option<f64>,
    pub description: String,
}

/// A full reconstructed journey from origin to destination.
#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub steps: Vec<Step>,
    pub departure_secs: u32,
    pub arrive_time_secs: u32,
    pub travel_time_secs: u32,
    pub walking_distance_km: f64,
}

/// Walks `tau` backward from `(dest_stop_idx, k)` via `prevK`/`previousStopId`,
/// emitting one [`Step`] per hop, then reverses into departure order.
fn trace_route<G: TransitGraph>(graph: &G, tau: &Tau, dest_stop_idx: u32, k: usize) -> Route {
    let mut steps = Vec::new();
    let mut walking_distance_km = 0.0;
    let mut cur_k = k;
    let mut cur_idx = dest_stop_idx;

    loop {
        let info: &ReachInfo = &tau[cur_k][&cur_idx];
        let (Some(prev_k), Some(prev_idx)) = (info.prev_k, info.previous_stop_id) else { break };

        let step = match info.mode {
            TransportMode::Transit => {
                let trip_idx = info.trip_id.expect("transit reach record always carries a trip");
                let on_trip = graph.stop_times_on(trip_idx);
                let from_seq = on_trip.iter().find(|st| st.stop_idx == prev_idx).map(|st| st.stop_sequence);
                let to_seq = on_trip.iter().find(|st| st.stop_idx == cur_idx).map(|st| st.stop_sequence);
                let depart_time = on_trip
                    .iter()
                    .find(|st| st.stop_idx == prev_idx)
                    .map(|st| st.departure_time)
                    .unwrap_or(info.time_of_day_sec);
                let (route_idx, _) = graph.trip_route(trip_idx).expect("boarded trip has a route");
                let num_stops = match (from_seq, to_seq) {
                    (Some(a), Some(b)) => Some(b - a),
                    _ => None,
                };
                Step {
                    from: graph.stop_id(prev_idx),
                    to: graph.stop_id(cur_idx),
                    mode: TransportMode::Transit,
                    depart_time,
                    arrive_time: info.time_of_day_sec,
                    travel_time_secs: info.time_of_day_sec.as_seconds().saturating_sub(depart_time.as_seconds()),
                    trip_id: Some(graph.trip_id(trip_idx)),
                    route_id: Some(graph.route_id(route_idx)),
                    num_stops,
                    distance_km: None,
                    description: format!("ride {} to {}", graph.trip_id(trip_idx), graph.stop_id(cur_idx)),
                }
            }
            TransportMode::Walk => {
                let prev_arrival = tau[prev_k][&prev_idx].time_of_day_sec;
                let distance_km =
                    graph.stop_coordinate(prev_idx).haversine_distance(&graph.stop_coordinate(cur_idx)).as_kilometers();
                walking_distance_km += distance_km;
                Step {
                    from: graph.stop_id(prev_idx),
                    to: graph.stop_id(cur_idx),
                    mode: TransportMode::Walk,
                    depart_time: prev_arrival,
                    arrive_time: info.time_of_day_sec,
                    travel_time_secs: info.time_of_day_sec.as_seconds().saturating_sub(prev_arrival.as_seconds()),
                    trip_id: None,
                    route_id: None,
                    num_stops: None,
                    distance_km: Some(distance_km),
                    description: format!("walk to {}", graph.stop_id(cur_idx)),
                }
            }
            TransportMode::Origin => break,
        };
        steps.push(step);
        cur_k = prev_k;
        cur_idx = prev_idx;
    }

    steps.reverse();
    let departure_secs = steps.first().map(|s| s.depart_time.as_seconds()).unwrap_or_default();
    let arrive_time_secs = tau[k][&dest_stop_idx].time_of_day_sec.as_seconds();
    Route {
        steps,
        departure_secs,
        arrive_time_secs,
        travel_time_secs: arrive_time_secs.saturating_sub(departure_secs),
        walking_distance_km,
    }
}

/// Runs RAPTOR from `origin_stop_idx` and picks the best round for
/// `dest_stop_idx`, if reached.
fn best_reach<G: TransitGraph>(
    graph: &G,
    origin_stop_idx: u32,
    dep_secs: u32,
    dest_stop_idx: u32,
    options: &QueryOptions,
) -> Option<(Tau, usize, ReachInfo)> {
    let (exclude_routes, exclude_stops) = raptor::resolve_excludes(graph, &options.exclude_routes, &options.exclude_stops);
    let tau = raptor::run(graph, origin_stop_idx, Time::from_seconds(dep_secs), options, &exclude_routes, &exclude_stops);
    let (k, info) = raptor::find_best_k(&tau, dest_stop_idx, options)?;
    Some((tau, k, info))
}

pub fn stop_to_stop(
    indexed: &IndexedFeed,
    origin_stop_id: &str,
    dep_secs: u32,
    dest_stop_id: &str,
    options: &QueryOptions,
) -> Result<Option<Route>, Error> {
    let Some(origin_idx) = indexed.stop_idx(origin_stop_id) else { return Ok(None) };
    let Some(dest_idx) = indexed.stop_idx(dest_stop_id) else { return Ok(None) };
    Ok(best_reach(indexed, origin_idx, dep_secs, dest_idx, options)
        .map(|(tau, k, _)| trace_route(indexed, &tau, dest_idx, k)))
}

pub fn one_to_one(
    indexed: &IndexedFeed,
    origin: &Location,
    dep_secs: u32,
    destination: &Location,
    options: &QueryOptions,
) -> Result<Option<Route>, Error> {
    let augmented = AugmentedFeed::build(indexed, Some(origin), std::slice::from_ref(destination), options)?;
    let origin_idx = augmented.stop_idx_of(&origin.id).expect("just inserted");
    let dest_idx = augmented.stop_idx_of(&destination.id).expect("just inserted");
    Ok(best_reach(&augmented, origin_idx, dep_secs, dest_idx, options)
        .map(|(tau, k, _)| trace_route(&augmented, &tau, dest_idx, k)))
}

/// `destId -> travelTimeSecs`, `None` for unreached destinations.
pub fn one_to_many(
    indexed: &IndexedFeed,
    origin: &Location,
    dep_secs: u32,
    destinations: &[Location],
    options: &QueryOptions,
) -> Result<HashMap<Arc<str>, Option<u32>>, Error> {
    let augmented = AugmentedFeed::build(indexed, Some(origin), destinations, options)?;
    let origin_idx = augmented.stop_idx_of(&origin.id).expect("just inserted");
    let (exclude_routes, exclude_stops) =
        raptor::resolve_excludes(&augmented, &options.exclude_routes, &options.exclude_stops);
    let tau = raptor::run(&augmented, origin_idx, Time::from_seconds(dep_secs), options, &exclude_routes, &exclude_stops);

    Ok(destinations
        .par_iter()
        .map(|destination| {
            let dest_idx = augmented.stop_idx_of(&destination.id).expect("just inserted");
            let travel_secs = raptor::find_best_k(&tau, dest_idx, options)
                .map(|(_, info)| info.time_of_day_sec.as_seconds().saturating_sub(dep_secs));
            (destination.id.clone(), travel_secs)
        })
        .collect())
}

/// Same semantics as [`one_to_many`], but reuses a preset's pre-built
/// destination overlay instead of augmenting per query.
pub fn one_to_many_preset(
    preset: &crate::presets::PresetFeed,
    origin: &Location,
    dep_secs: u32,
    options: &QueryOptions,
) -> Result<HashMap<Arc<str>, Option<u32>>, Error> {
    let augmented = preset.augment_with_origin(origin, options)?;
    let origin_idx = augmented.stop_idx_of(&origin.id).expect("just inserted");
    let (exclude_routes, exclude_stops) =
        raptor::resolve_excludes(&augmented, &options.exclude_routes, &options.exclude_stops);
    let tau = raptor::run(&augmented, origin_idx, Time::from_seconds(dep_secs), options, &exclude_routes, &exclude_stops);

    Ok(preset
        .destinations()
        .par_iter()
        .map(|destination| {
            let dest_idx = augmented.stop_idx_of(&destination.id).expect("preset-augmented");
            let travel_secs = raptor::find_best_k(&tau, dest_idx, options)
                .map(|(_, info)| info.time_of_day_sec.as_seconds().saturating_sub(dep_secs));
            (destination.id.clone(), travel_secs)
        })
        .collect())
}

/// Folds [`one_to_many`] over every origin.
pub fn many_to_many(
    indexed: &IndexedFeed,
    origins: &[Location],
    dep_secs: u32,
    destinations: &[Location],
    options: &QueryOptions,
) -> Result<HashMap<Arc<str>, HashMap<Arc<str>, Option<u32>>>, Error> {
    origins
        .iter()
        .map(|origin| Ok((origin.id.clone(), one_to_many(indexed, origin, dep_secs, destinations, options)?)))
        .collect()
}
