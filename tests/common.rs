//! End-to-end coverage over a small synthetic network, built directly from
//! `Stop`/`Trip`/`StopTime` literals the same way `indexed::tests::minimal_feed`
//! does, but large enough to exercise boarding, transfers, rerouting and
//! walk-augmented queries through the full RAPTOR + online-router pipeline.
//!
//! Layout: `origin_stop` --T1--> `hub_stop`, which forks two ways:
//! `hub_stop` --T2--> `transfer_dest_stop` and `hub_stop` --T3-->
//! `direct_dest_stop`. A fourth trip, `bypass_route`'s `T4`, runs
//! `origin_stop` -> `alternate_stop` -> `direct_dest_stop` without touching
//! `hub_stop` at all, so excluding `hub_stop` forces a reroute onto it.
//! Every stop is placed roughly a degree apart so no proximity-based walking
//! transfer gets invented between them; only the query-time synthetic
//! stops (for the walk-augmented tests) sit exactly on top of a real stop.

use std::{collections::HashSet, io::Write, sync::Arc};

use transitway::{
    config::{LoadingOptions, PresetConfig, QueryOptions},
    feed::Feed,
    indexed::IndexedFeed,
    model::{Calendar, CalendarEntry, Location, Route, RouteType, Stop, StopTime, TransportMode, Trip},
    online, presets, raptor,
    shared::{Coordinate, Time},
    water::WaterFilter,
};

const ORIGIN: u32 = 0;
const HUB: u32 = 1;
const TRANSFER_DEST: u32 = 2;
const DIRECT_DEST: u32 = 3;
const ALTERNATE: u32 = 4;

fn stop(id: &str, lat: f64, lng: f64) -> Stop {
    Stop {
        stop_id: Arc::from(id),
        stop_name: Arc::from(id),
        stop_desc: None,
        coordinate: Coordinate { latitude: lat, longitude: lng },
        parent_station: None,
        feed_name: None,
    }
}

fn stop_time(trip_idx: u32, stop_idx: u32, stop_sequence: u32, secs: u32) -> StopTime {
    StopTime {
        trip_idx,
        stop_idx,
        stop_sequence,
        arrival_time: Time::from_seconds(secs),
        departure_time: Time::from_seconds(secs),
        time_of_day_sec: Time::from_seconds(secs),
    }
}

fn loading_options() -> LoadingOptions {
    LoadingOptions {
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
    }
}

/// The network described in this file's module doc.
fn network() -> IndexedFeed {
    let stops = vec![
        stop("origin_stop", 0.0, 0.0),
        stop("hub_stop", 0.0, 1.0),
        stop("transfer_dest_stop", 0.0, 2.0),
        stop("direct_dest_stop", 0.0, 3.0),
        stop("alternate_stop", 1.0, 1.0),
    ];

    let routes = vec![
        Route { route_id: "local_leg".into(), route_type: RouteType::Bus, short_name: None, long_name: None, color: None, text_color: None },
        Route { route_id: "hub_to_transfer_dest".into(), route_type: RouteType::Bus, short_name: None, long_name: None, color: None, text_color: None },
        Route { route_id: "hub_to_direct_dest".into(), route_type: RouteType::Bus, short_name: None, long_name: None, color: None, text_color: None },
        Route { route_id: "bypass_route".into(), route_type: RouteType::Bus, short_name: None, long_name: None, color: None, text_color: None },
    ];

    let trip = |id: &str, route_idx: u32| Trip {
        trip_id: Arc::from(id),
        route_idx,
        service_id: "daily".into(),
        direction_id: None,
        shape_id: None,
        headsign: None,
        short_name: None,
        block_id: None,
    };
    let trips = vec![trip("t_origin_hub", 0), trip("t_hub_transfer_dest", 1), trip("t_hub_direct_dest", 2), trip("t_bypass", 3)];

    let stop_times = vec![
        stop_time(0, ORIGIN, 1, 28_800),
        stop_time(0, HUB, 2, 29_400),
        stop_time(1, HUB, 1, 29_700),
        stop_time(1, TRANSFER_DEST, 2, 30_600),
        stop_time(2, HUB, 1, 29_700),
        stop_time(2, DIRECT_DEST, 2, 30_300),
        stop_time(3, ORIGIN, 1, 28_800),
        stop_time(3, ALTERNATE, 2, 29_700),
        stop_time(3, DIRECT_DEST, 3, 30_900),
    ];

    let feed = Feed {
        stops,
        stop_times,
        trips,
        routes,
        calendars: vec![CalendarEntry {
            service_id: "daily".into(),
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
    };

    IndexedFeed::build(feed, &WaterFilter::empty(), &loading_options()).expect("synthetic network indexes cleanly")
}

#[test]
fn direct_single_leg_trip_boards_without_a_transfer() {
    let indexed = network();
    let route = online::stop_to_stop(&indexed, "origin_stop", 28_800, "hub_stop", &QueryOptions::default())
        .unwrap()
        .expect("origin_stop reaches hub_stop on t_origin_hub");

    assert_eq!(route.steps.len(), 1);
    assert_eq!(route.steps[0].mode, TransportMode::Transit);
    assert_eq!(route.departure_secs, 28_800);
    assert_eq!(route.arrive_time_secs, 29_400);
    assert_eq!(route.travel_time_secs, 600);
}

#[test]
fn early_departure_absorbs_wait_until_next_boarding() {
    let indexed = network();
    // Ten minutes before t_origin_hub departs, still inside the default
    // max_waiting_time_secs window.
    let route = online::stop_to_stop(&indexed, "origin_stop", 28_200, "hub_stop", &QueryOptions::default())
        .unwrap()
        .expect("the single daily boarding is still within the waiting window");

    assert_eq!(route.departure_secs, 28_800, "departure_secs reflects the boarding, not the query time");
    assert_eq!(route.arrive_time_secs, 29_400);
}

#[test]
fn transfer_at_hub_reaches_onward_destination() {
    let indexed = network();
    let route = online::stop_to_stop(&indexed, "origin_stop", 28_800, "transfer_dest_stop", &QueryOptions::default())
        .unwrap()
        .expect("origin_stop reaches transfer_dest_stop via a transfer at hub_stop");

    assert_eq!(route.steps.len(), 2);
    assert_eq!(route.steps[0].to.as_ref(), "hub_stop");
    assert_eq!(route.steps[1].from.as_ref(), "hub_stop");
    assert_eq!(route.arrive_time_secs, 30_600);
}

#[test]
fn unknown_stop_id_is_unreachable_regardless_of_which_endpoint() {
    let indexed = network();
    let options = QueryOptions::default();

    assert!(online::stop_to_stop(&indexed, "does_not_exist", 28_800, "hub_stop", &options).unwrap().is_none());
    assert!(online::stop_to_stop(&indexed, "origin_stop", 28_800, "does_not_exist", &options).unwrap().is_none());
}

#[test]
fn one_to_one_and_one_to_many_agree_on_travel_time() {
    let indexed = network();
    let options = QueryOptions::default();
    let origin = Location { id: Arc::from("query-origin"), coordinate: Coordinate { latitude: 0.0, longitude: 0.0 } };
    let destination = Location { id: Arc::from("query-destination"), coordinate: Coordinate { latitude: 0.0, longitude: 1.0 } };

    let route = online::one_to_one(&indexed, &origin, 28_800, &destination, &options).unwrap().expect("walk-augmented route exists");
    let many = online::one_to_many(&indexed, &origin, 28_800, std::slice::from_ref(&destination), &options).unwrap();

    assert_eq!(many.get(destination.id.as_ref()).copied().flatten(), Some(route.travel_time_secs));
}

#[test]
fn preset_destinations_agree_with_a_direct_one_to_many_query() {
    let indexed = network();
    let options = QueryOptions::default();
    let origin = Location { id: Arc::from("query-origin"), coordinate: Coordinate { latitude: 0.0, longitude: 0.0 } };

    let mut csv_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv_file, "id,latitude,longitude").unwrap();
    writeln!(csv_file, "hub_stop_dest,0.0,1.0").unwrap();

    let preset_config = PresetConfig {
        name: "hub".to_string(),
        locations_file: csv_file.path().display().to_string(),
        max_allowable_destination_walk_km: 1.5,
    };
    let preset = presets::PresetFeed::build(&indexed, &preset_config).unwrap();
    let via_preset = online::one_to_many_preset(&preset, &origin, 28_800, &options).unwrap();

    let direct_destination = Location { id: Arc::from("hub_stop_dest"), coordinate: Coordinate { latitude: 0.0, longitude: 1.0 } };
    let via_direct = online::one_to_many(&indexed, &origin, 28_800, std::slice::from_ref(&direct_destination), &options).unwrap();

    assert_eq!(via_preset.get("hub_stop_dest"), via_direct.get("hub_stop_dest"));
    assert_eq!(via_preset.get("hub_stop_dest").copied().flatten(), Some(600));
}

#[test]
fn reached_stops_never_arrive_before_the_query_departs() {
    let indexed = network();
    let dep_secs = 28_800;
    let options = QueryOptions::default();
    let tau = raptor::run(&indexed, ORIGIN, Time::from_seconds(dep_secs), &options, &HashSet::new(), &HashSet::new());

    for round in &tau {
        for info in round.values() {
            assert!(
                info.time_of_day_sec.as_seconds() >= dep_secs,
                "a reach record claims to arrive before the query's own departure time"
            );
        }
    }
}

#[test]
fn excluding_the_hub_forces_the_bypass_route() {
    let indexed = network();

    let default_route = online::stop_to_stop(&indexed, "origin_stop", 28_800, "direct_dest_stop", &QueryOptions::default())
        .unwrap()
        .expect("direct_dest_stop is reachable via the hub transfer");
    assert_eq!(default_route.arrive_time_secs, 30_300);
    assert!(default_route.steps.iter().any(|s| s.from.as_ref() == "hub_stop" || s.to.as_ref() == "hub_stop"));

    let options = QueryOptions { exclude_stops: vec!["hub_stop".to_string()], ..QueryOptions::default() };
    let rerouted = online::stop_to_stop(&indexed, "origin_stop", 28_800, "direct_dest_stop", &options)
        .unwrap()
        .expect("direct_dest_stop is still reachable via the bypass route");

    assert_eq!(rerouted.arrive_time_secs, 30_900);
    assert!(rerouted.steps.iter().all(|s| s.from.as_ref() != "hub_stop" && s.to.as_ref() != "hub_stop"));
}
