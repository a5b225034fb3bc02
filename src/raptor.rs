//! The round-based reachability computation (RAPTOR).
//!
//! Uses bitvec-style marked-stop work-lists and a flat per-round relaxation
//! pass, but keeps the full `τ` sequence rather than a single
//! continuously-improved best-time table: one `ReachMap` per round, `τ[k]`
//! holding the best way to reach each stop in *exactly* k alternating
//! rounds. Per-round `ReachMap`s must survive past the query for Pareto
//! selection, so there's no allocator pool shared across rounds within a
//! query.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tracing::{trace, warn};

use crate::{
    config::QueryOptions,
    model::{RouteType, StopTime, TransportMode, WalkingCost, WalkingTransfer},
    shared::{Coordinate, Time},
};

/// Safety ceiling on board rounds, independent of `max_number_of_transfers`
/// (which a misconfigured `LoadingOptions` could leave unbounded) — far
/// beyond any real transit itinerary's transfer count.
const MAX_ROUNDS: u32 = 15;

/// What the round-based computation needs from a stop/trip graph — satisfied
/// by a plain [`crate::indexed::IndexedFeed`] and, for augmented queries, by
/// [`crate::online::AugmentedFeed`]'s "overlay then base" view — a distinct
/// type with explicit lookup precedence, not a mutated clone of the base.
pub trait TransitGraph {
    /// Stop-times at `stop_idx`, sorted ascending by `time_of_day_sec`.
    fn stop_times_at(&self, stop_idx: u32) -> Vec<StopTime>;
    /// Stop-times on `trip_idx`, sorted ascending by `stop_sequence`.
    fn stop_times_on(&self, trip_idx: u32) -> Vec<StopTime>;
    /// Outgoing walking transfers from `stop_idx`.
    fn walking_transfers_from(&self, stop_idx: u32) -> Vec<WalkingTransfer>;
    /// `(route_idx, route_type)` of a trip, if it belongs to a known route.
    fn trip_route(&self, trip_idx: u32) -> Option<(u32, RouteType)>;
    fn stop_idx(&self, id: &str) -> Option<u32>;
    fn route_idx(&self, id: &str) -> Option<u32>;

    /// The following accessors exist only to let `online::trace_route` render
    /// a reconstructed path back into ids/coordinates without the router
    /// itself knowing whether it ran over a plain feed or an augmented one.
    fn stop_id(&self, stop_idx: u32) -> Arc<str>;
    fn stop_coordinate(&self, stop_idx: u32) -> Coordinate;
    fn trip_id(&self, trip_idx: u32) -> Arc<str>;
    fn route_id(&self, route_idx: u32) -> Arc<str>;
}

/// Resolves configured id lists to indices against `graph`, for use as
/// `run`'s `exclude_routes`/`exclude_stops` arguments.
pub fn resolve_excludes<G: TransitGraph>(
    graph: &G,
    exclude_routes: &[String],
    exclude_stops: &[String],
) -> (HashSet<u32>, HashSet<u32>) {
    (
        exclude_routes.iter().filter_map(|id| graph.route_idx(id)).collect(),
        exclude_stops.iter().filter_map(|id| graph.stop_idx(id)).collect(),
    )
}

/// Best-known way to reach a stop after a given number of rounds.
#[derive(Debug, Clone)]
pub struct ReachInfo {
    pub time_of_day_sec: Time,
    pub cost: f64,
    pub mode: TransportMode,
    pub previous_stop_id: Option<u32>,
    pub trip_id: Option<u32>,
    pub prev_k: Option<usize>,
}

pub type ReachMap = HashMap<u32, ReachInfo>;

#[derive(Debug, Clone)]
struct Round {
    reach: ReachMap,
    /// Stops newly written this round (as opposed to carried forward by a
    /// walking round's copy-forward step) — an explicit work-list rather
    /// than a mutable per-stop `isUnexplored` flag.
    marked: HashSet<u32>,
}

/// `τ`: one `ReachMap` per round, `τ[0]` holding only the origin.
pub type Tau = Vec<ReachMap>;

/// Relaxes `candidate` into `reach` iff absent or strictly cheaper than the
/// current entry. Returns whether the candidate was accepted.
fn relax(reach: &mut ReachMap, stop_idx: u32, candidate: ReachInfo) -> bool {
    match reach.get(&stop_idx) {
        Some(existing) if existing.cost <= candidate.cost => false,
        _ => {
            reach.insert(stop_idx, candidate);
            true
        }
    }
}

fn run_board_round<G: TransitGraph>(
    graph: &G,
    prev: &Round,
    options: &QueryOptions,
    exclude_routes: &HashSet<u32>,
    exclude_stops: &HashSet<u32>,
    last_valid_secs: u64,
    input_round: usize,
) -> Round {
    let mut reach = ReachMap::new();
    for &stop_idx in &prev.marked {
        let Some(info) = prev.reach.get(&stop_idx) else { continue };
        let t = info.time_of_day_sec.as_seconds() as u64;
        let window_end = t + options.max_waiting_time_secs as u64;

        for boarding in graph.stop_times_at(stop_idx) {
            let departure = boarding.time_of_day_sec.as_seconds() as u64;
            if departure < t {
                continue;
            }
            if departure > window_end {
                break; // stop_times_at is sorted ascending by time_of_day_sec
            }

            let trip_idx = boarding.trip_idx;
            let Some((route_idx, route_type)) = graph.trip_route(trip_idx) else { continue };
            if exclude_routes.contains(&route_idx) {
                continue;
            }
            let multiplier = if route_type.is_bus() {
                options.bus_multiplier
            } else {
                options.rail_multiplier
            };
            if multiplier < 0.0 {
                continue; // negative multiplier disables this mode entirely
            }

            for downstream in graph.stop_times_on(trip_idx) {
                if downstream.stop_sequence <= boarding.stop_sequence {
                    continue;
                }
                if exclude_stops.contains(&downstream.stop_idx) {
                    continue;
                }
                if downstream.time_of_day_sec.as_seconds() as u64 > last_valid_secs {
                    continue;
                }

                let wait = (boarding.time_of_day_sec.as_seconds() as f64) - (t as f64);
                let travel = (downstream.time_of_day_sec.as_seconds() as f64)
                    - (boarding.time_of_day_sec.as_seconds() as f64);
                let segment_cost = wait + multiplier * travel;

                let candidate = ReachInfo {
                    time_of_day_sec: downstream.time_of_day_sec,
                    cost: info.cost + segment_cost,
                    mode: TransportMode::Transit,
                    previous_stop_id: Some(stop_idx),
                    trip_id: Some(trip_idx),
                    prev_k: Some(input_round),
                };
                relax(&mut reach, downstream.stop_idx, candidate);
            }
        }
    }
    let marked = reach.keys().copied().collect();
    Round { reach, marked }
}

#[allow(clippy::too_many_arguments)]
fn run_walk_round<G: TransitGraph>(
    graph: &G,
    source: &Round,
    source_round: usize,
    options: &QueryOptions,
    exclude_stops: &HashSet<u32>,
    last_valid_secs: u64,
) -> Round {
    // copy marked entries forward so "transit in round k, then walk in round
    // k+1" and "transit in round k, stay put in round k+1" are both expressible
    let mut reach: ReachMap = source
        .marked
        .iter()
        .filter_map(|idx| source.reach.get(idx).map(|info| (*idx, info.clone())))
        .collect();
    let mut marked = HashSet::new();

    let walk_speed_m_per_sec = options.walking_speed_m_per_sec();

    for &stop_idx in &source.marked {
        let Some(info) = source.reach.get(&stop_idx) else { continue };
        if info.mode == TransportMode::Walk {
            continue; // forbid walk -> walk
        }
        for transfer in graph.walking_transfers_from(stop_idx) {
            if exclude_stops.contains(&transfer.to_stop_idx) {
                continue;
            }
            let secs = match transfer.cost {
                WalkingCost::FixedSeconds { secs } => secs as f64,
                WalkingCost::Distance { km } => {
                    if km > options.max_walking_distance_km {
                        continue;
                    }
                    (km * 1000.0) / walk_speed_m_per_sec
                }
            };
            let arrival_secs = info.time_of_day_sec.as_seconds() as u64 + secs.round() as u64;
            if arrival_secs > last_valid_secs {
                continue;
            }
            let candidate = ReachInfo {
                time_of_day_sec: Time::from_seconds(arrival_secs as u32),
                cost: info.cost + secs,
                mode: TransportMode::Walk,
                previous_stop_id: Some(stop_idx),
                trip_id: None,
                prev_k: Some(source_round),
            };
            if relax(&mut reach, transfer.to_stop_idx, candidate) {
                marked.insert(transfer.to_stop_idx);
            }
        }
    }
    Round { reach, marked }
}

/// Runs the round-based reachability computation from `origin_stop_idx` at
/// `departure_time`, returning the full `τ` sequence. `exclude_routes` and
/// `exclude_stops` are already-resolved indices into `graph` — resolving a
/// configured id is the caller's job, since an `AugmentedFeed` and a plain
/// `IndexedFeed` look ids up differently.
pub fn run<G: TransitGraph>(
    graph: &G,
    origin_stop_idx: u32,
    departure_time: Time,
    options: &QueryOptions,
    exclude_routes: &HashSet<u32>,
    exclude_stops: &HashSet<u32>,
) -> Tau {
    let last_valid_secs =
        departure_time.as_seconds() as u64 + options.max_commute_time_secs as u64;

    let origin_round = Round {
        reach: ReachMap::from([(
            origin_stop_idx,
            ReachInfo {
                time_of_day_sec: departure_time,
                cost: 0.0,
                mode: TransportMode::Origin,
                previous_stop_id: None,
                trip_id: None,
                prev_k: None,
            },
        )]),
        marked: HashSet::from([origin_stop_idx]),
    };

    let mut rounds = vec![origin_round];

    let has_service = !graph.stop_times_at(origin_stop_idx).is_empty();
    if !has_service {
        let walk = run_walk_round(graph, &rounds[0], 0, options, exclude_stops, last_valid_secs);
        rounds.push(walk);
    }

    let total_board_rounds = 1u32.saturating_add(options.max_number_of_transfers).min(MAX_ROUNDS);
    if options.max_number_of_transfers >= MAX_ROUNDS {
        warn!(
            max_number_of_transfers = options.max_number_of_transfers,
            MAX_ROUNDS, "max_number_of_transfers exceeds the round-count ceiling; clamping"
        );
    }
    for round_num in 0..total_board_rounds {
        let input_idx = rounds.len() - 1;
        trace!(round = round_num, marked = rounds[input_idx].marked.len(), "starting board round");
        let board = run_board_round(
            graph,
            &rounds[input_idx],
            options,
            exclude_routes,
            exclude_stops,
            last_valid_secs,
            input_idx,
        );
        rounds.push(board);
        let board_idx = rounds.len() - 1;
        let walk = run_walk_round(
            graph,
            &rounds[board_idx],
            board_idx,
            options,
            exclude_stops,
            last_valid_secs,
        );
        rounds.push(walk);
    }

    rounds.into_iter().map(|r| r.reach).collect()
}

/// Counts the Transit legs on the path ending at `(k, stop_idx)`, walking
/// `tau` backward via `prev_k`/`previous_stop_id`.
fn count_transit_legs(tau: &Tau, k: usize, stop_idx: u32) -> usize {
    let mut count = 0;
    let mut k = k;
    let mut stop_idx = stop_idx;
    loop {
        let Some(info) = tau[k].get(&stop_idx) else { break };
        if info.mode == TransportMode::Transit {
            count += 1;
        }
        match (info.prev_k, info.previous_stop_id) {
            (Some(pk), Some(ps)) => {
                k = pk;
                stop_idx = ps;
            }
            _ => break,
        }
    }
    count
}

/// Picks the round `k` minimizing `cost + numTransfers * transfer_penalty_secs`
/// for `dest_stop_idx`, where `numTransfers` is the Transit-leg count minus
/// one (the first boarding is free). `None` if never reached.
pub fn find_best_k(tau: &Tau, dest_stop_idx: u32, options: &QueryOptions) -> Option<(usize, ReachInfo)> {
    let mut best: Option<(usize, f64)> = None;
    for (k, round) in tau.iter().enumerate() {
        let Some(info) = round.get(&dest_stop_idx) else { continue };
        let transit_legs = count_transit_legs(tau, k, dest_stop_idx);
        let num_transfers = transit_legs.saturating_sub(1) as f64;
        let score = info.cost + num_transfers * options.transfer_penalty_secs as f64;
        if best.is_none_or(|(_, b)| score < b) {
            best = Some((k, score));
        }
    }
    best.map(|(k, _)| (k, tau[k][&dest_stop_idx].clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relax_keeps_cheaper_existing_entry() {
        let mut reach = ReachMap::new();
        let cheap = ReachInfo {
            time_of_day_sec: Time::from_seconds(100),
            cost: 10.0,
            mode: TransportMode::Transit,
            previous_stop_id: None,
            trip_id: None,
            prev_k: None,
        };
        assert!(relax(&mut reach, 1, cheap.clone()));

        let expensive = ReachInfo { cost: 20.0, ..cheap.clone() };
        assert!(!relax(&mut reach, 1, expensive));
        assert_eq!(reach[&1].cost, 10.0);
    }

    #[test]
    fn relax_replaces_strictly_cheaper_candidate() {
        let mut reach = ReachMap::new();
        let first = ReachInfo {
            time_of_day_sec: Time::from_seconds(100),
            cost: 20.0,
            mode: TransportMode::Transit,
            previous_stop_id: None,
            trip_id: None,
            prev_k: None,
        };
        relax(&mut reach, 1, first);
        let cheaper = ReachInfo {
            time_of_day_sec: Time::from_seconds(100),
            cost: 5.0,
            mode: TransportMode::Transit,
            previous_stop_id: None,
            trip_id: None,
            prev_k: None,
        };
        assert!(relax(&mut reach, 1, cheaper));
        assert_eq!(reach[&1].cost, 5.0);
    }
}
