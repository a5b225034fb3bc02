//! Typed GTFS feed representation: loading from CSV, date-based service
//! filtering, stop-time range filtering, and multi-feed merging.
//!
//! Grounded on `gtfs::Gtfs`'s streaming readers and
//! `repository::source::gtfs`'s load pipeline (index resolution via
//! `HashMap<Arc<str>, u32>` primary-key lookups built incrementally as each
//! entity list loads), generalized to calendars/calendar-dates/shapes and
//! corrected to propagate parse errors instead of `.unwrap()`-panicking on a
//! malformed `HH:MM:SS` value.

use std::{collections::HashMap, sync::Arc, time::Instant};

use thiserror::Error;
use tracing::debug;

use crate::{
    gtfs::{self, Gtfs},
    model::{
        Calendar, CalendarDate, CalendarEntry, DirectionId, Route, RouteType, Shape, Stop, StopTime,
        Transfer, TransferType, Trip,
    },
    shared::{Coordinate, Time},
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("gtfs read error: {0}")]
    Gtfs(#[from] gtfs::Error),
    #[error("stop_time at row {row} for trip {trip_id} has an unparseable time {value:?}")]
    BadTime {
        row: usize,
        trip_id: String,
        value: String,
    },
    #[error("calendar_dates.txt entry for service {service_id:?} on {date} has unknown exception_type {value}")]
    UnknownExceptionType { service_id: Arc<str>, date: u32, value: u8 },
    #[error("routes.txt row {0} has unknown route_type {1}")]
    UnknownRouteType(usize, i32),
    #[error("transfers.txt row {0} has unknown transfer_type {1}")]
    UnknownTransferType(usize, u8),
    #[error("stop_time filter requires earliest < latest, got {earliest:?}..{latest:?}")]
    InvalidStopTimeRange { earliest: Time, latest: Time },
    #[error("filter date {0} is not a valid YYYYMMDD date")]
    InvalidDate(u32),
}

/// The plain, typed GTFS feed: every entity list, with cross-references
/// resolved to dense `u32` indices rather than repeated string lookups.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    pub stops: Vec<Stop>,
    pub stop_times: Vec<StopTime>,
    pub trips: Vec<Trip>,
    pub routes: Vec<Route>,
    pub calendars: Vec<CalendarEntry>,
    pub calendar_dates: Vec<CalendarDate>,
    pub shapes: Vec<Shape>,
    pub transfers: Vec<Transfer>,
}

impl Feed {
    /// Loads every entity list from `gtfs`, resolving cross-references to
    /// dense indices as it goes. `stops.txt`/`stop_times.txt` must be
    /// present; every other file is optional and treated as empty.
    pub fn load(mut gtfs: Gtfs) -> Result<Self, Error> {
        let now = Instant::now();

        let mut stops = Vec::new();
        let mut stop_lookup: HashMap<Arc<str>, u32> = HashMap::new();
        gtfs.stream_stops(|(i, row)| {
            let stop_id: Arc<str> = row.stop_id.into();
            stop_lookup.insert(stop_id.clone(), i as u32);
            stops.push(Stop {
                stop_id,
                stop_name: row.stop_name.into(),
                stop_desc: row.stop_desc.map(Into::into),
                coordinate: Coordinate { latitude: row.stop_lat, longitude: row.stop_lon },
                parent_station: row.parent_station.map(Into::into),
                feed_name: None,
            });
        })?;
        debug!(count = stops.len(), "loaded stops.txt");

        let mut routes = Vec::new();
        let mut route_lookup: HashMap<Arc<str>, u32> = HashMap::new();
        let mut route_err = None;
        gtfs.stream_routes(|(i, row)| {
            if route_err.is_some() {
                return;
            }
            let Some(route_type) = RouteType::from_gtfs_code(row.route_type) else {
                route_err = Some(Error::UnknownRouteType(i, row.route_type));
                return;
            };
            let route_id: Arc<str> = row.route_id.into();
            route_lookup.insert(route_id.clone(), i as u32);
            routes.push(Route {
                route_id,
                route_type,
                short_name: row.route_short_name.map(Into::into),
                long_name: row.route_long_name.map(Into::into),
                color: row.route_color.map(Into::into),
                text_color: row.route_text_color.map(Into::into),
            });
        })?;
        if let Some(err) = route_err {
            return Err(err);
        }
        debug!(count = routes.len(), "loaded routes.txt");

        let mut trips = Vec::new();
        let mut trip_lookup: HashMap<Arc<str>, u32> = HashMap::new();
        gtfs.stream_trips(|(i, row)| {
            let trip_id: Arc<str> = row.trip_id.into();
            trip_lookup.insert(trip_id.clone(), i as u32);
            let route_idx = route_lookup.get(row.route_id.as_str()).copied().unwrap_or(u32::MAX);
            trips.push(Trip {
                trip_id,
                route_idx,
                service_id: row.service_id.into(),
                direction_id: row.direction_id.map(DirectionId::from),
                shape_id: row.shape_id.map(Into::into),
                headsign: row.trip_headsign.map(Into::into),
                short_name: row.trip_short_name.map(Into::into),
                block_id: row.block_id.map(Into::into),
            });
        })?;
        debug!(count = trips.len(), "loaded trips.txt");

        let mut stop_times = Vec::new();
        let mut time_err = None;
        gtfs.stream_stop_times(|(i, row)| {
            if time_err.is_some() {
                return;
            }
            let (Some(arrival_time), Some(departure_time)) =
                (Time::from_hms(&row.arrival_time), Time::from_hms(&row.departure_time))
            else {
                time_err = Some(Error::BadTime {
                    row: i,
                    trip_id: row.trip_id.clone(),
                    value: if Time::from_hms(&row.arrival_time).is_none() {
                        row.arrival_time.clone()
                    } else {
                        row.departure_time.clone()
                    },
                });
                return;
            };
            let Some(&trip_idx) = trip_lookup.get(row.trip_id.as_str()) else { return };
            let Some(&stop_idx) = stop_lookup.get(row.stop_id.as_str()) else { return };
            stop_times.push(StopTime {
                trip_idx,
                stop_idx,
                stop_sequence: row.stop_sequence,
                arrival_time,
                departure_time,
                time_of_day_sec: departure_time,
            });
        })?;
        if let Some(err) = time_err {
            return Err(err);
        }
        debug!(count = stop_times.len(), "loaded stop_times.txt");

        let mut calendars = Vec::new();
        gtfs.stream_calendar(|(_, row)| {
            calendars.push(CalendarEntry {
                service_id: row.service_id.into(),
                calendar: Calendar {
                    monday: row.monday != 0,
                    tuesday: row.tuesday != 0,
                    wednesday: row.wednesday != 0,
                    thursday: row.thursday != 0,
                    friday: row.friday != 0,
                    saturday: row.saturday != 0,
                    sunday: row.sunday != 0,
                    start_date: row.start_date,
                    end_date: row.end_date,
                },
            });
        })?;

        let mut calendar_dates = Vec::new();
        gtfs.stream_calendar_dates(|(_, row)| {
            calendar_dates.push(CalendarDate {
                service_id: row.service_id.into(),
                date: row.date,
                exception_type: row.exception_type,
            });
        })?;

        let mut shapes_by_id: HashMap<Arc<str>, Vec<(u32, Coordinate)>> = HashMap::new();
        gtfs.stream_shapes(|(_, row)| {
            let shape_id: Arc<str> = row.shape_id.into();
            shapes_by_id.entry(shape_id).or_default().push((
                row.shape_pt_sequence,
                Coordinate { latitude: row.shape_pt_lat, longitude: row.shape_pt_lon },
            ));
        })?;
        let mut shapes: Vec<Shape> = shapes_by_id
            .into_iter()
            .map(|(shape_id, mut points)| {
                points.sort_unstable_by_key(|(seq, _)| *seq);
                Shape { shape_id, points: points.into_iter().map(|(_, c)| c).collect() }
            })
            .collect();
        shapes.sort_unstable_by(|a, b| a.shape_id.cmp(&b.shape_id));

        let mut transfers = Vec::new();
        let mut transfer_err = None;
        gtfs.stream_transfers(|(i, row)| {
            if transfer_err.is_some() {
                return;
            }
            let transfer_type = match row.transfer_type {
                0 => TransferType::Recommended,
                1 => TransferType::Timed,
                2 => TransferType::MinTime,
                3 => TransferType::Infeasible,
                other => {
                    transfer_err = Some(Error::UnknownTransferType(i, other));
                    return;
                }
            };
            transfers.push(Transfer {
                from_stop_id: row.from_stop_id.into(),
                to_stop_id: row.to_stop_id.into(),
                transfer_type,
                min_transfer_time: row.min_transfer_time,
            });
        })?;
        if let Some(err) = transfer_err {
            return Err(err);
        }

        debug!(elapsed = ?now.elapsed(), "feed loaded");

        Ok(Feed { stops, stop_times, trips, routes, calendars, calendar_dates, shapes, transfers })
    }
}

fn parse_yyyymmdd(date: u32) -> Result<chrono::NaiveDate, Error> {
    let year = (date / 10_000) as i32;
    let month = (date / 100) % 100;
    let day = date % 100;
    chrono::NaiveDate::from_ymd_opt(year, month, day).ok_or(Error::InvalidDate(date))
}

/// Restricts `feed` to the services running on `date` (`YYYYMMDD`), dropping
/// every trip whose service doesn't survive calendar + calendar-date
/// resolution.
pub fn filter_services_by_date(feed: &Feed, date: u32) -> Result<Feed, Error> {
    let day = parse_yyyymmdd(date)?;
    let weekday = day.weekday();

    let mut running: std::collections::HashSet<Arc<str>> =
        feed.trips.iter().map(|t| t.service_id.clone()).collect();

    for entry in &feed.calendars {
        if !running.contains(&entry.service_id) {
            continue;
        }
        let in_range = date >= entry.calendar.start_date && date <= entry.calendar.end_date;
        if !in_range || !entry.calendar.runs_on_weekday(weekday) {
            running.remove(&entry.service_id);
        }
    }

    for exception in &feed.calendar_dates {
        if exception.date != date {
            continue;
        }
        match exception.exception_type {
            1 => {
                running.insert(exception.service_id.clone());
            }
            2 => {
                running.remove(&exception.service_id);
            }
            other => {
                return Err(Error::UnknownExceptionType {
                    service_id: exception.service_id.clone(),
                    date: exception.date,
                    value: other,
                });
            }
        }
    }

    let mut out = feed.clone();
    let surviving_trip_idx: Vec<u32> = out
        .trips
        .iter()
        .enumerate()
        .filter(|(_, t)| running.contains(&t.service_id))
        .map(|(i, _)| i as u32)
        .collect();
    let remap: HashMap<u32, u32> = surviving_trip_idx
        .iter()
        .enumerate()
        .map(|(new_idx, &old_idx)| (old_idx, new_idx as u32))
        .collect();

    out.trips = surviving_trip_idx.iter().map(|&i| out.trips[i as usize].clone()).collect();
    out.stop_times.retain_mut(|st| {
        match remap.get(&st.trip_idx) {
            Some(&new_idx) => {
                st.trip_idx = new_idx;
                true
            }
            None => false,
        }
    });

    Ok(out)
}

/// Keeps only stop-times whose `time_of_day_sec` falls in `[earliest,
/// latest]`. `earliest` must be strictly less than `latest`.
pub fn filter_stop_times_by_range(feed: &Feed, earliest: Time, latest: Time) -> Result<Feed, Error> {
    if earliest >= latest {
        return Err(Error::InvalidStopTimeRange { earliest, latest });
    }
    let mut out = feed.clone();
    out.stop_times
        .retain(|st| st.time_of_day_sec >= earliest && st.time_of_day_sec <= latest);
    Ok(out)
}

/// Concatenates `feeds` (each tagged with the feed name it came from,
/// recorded on every stop for disambiguation), renaming stop ids that
/// collide across feeds with differing coordinates. True duplicates (same
/// id, same coordinate) collapse to a single stop.
pub fn merge(feeds: Vec<(String, Feed)>) -> Feed {
    // id -> (coordinate it was first seen with, whether a rename is needed)
    let mut seen: HashMap<String, Coordinate> = HashMap::new();
    let mut needs_rename: std::collections::HashSet<String> = std::collections::HashSet::new();

    for (_, feed) in &feeds {
        for stop in &feed.stops {
            let id = stop.stop_id.to_string();
            match seen.get(&id) {
                Some(&coord) if coord != stop.coordinate => {
                    needs_rename.insert(id);
                }
                Some(_) => {}
                None => {
                    seen.insert(id, stop.coordinate);
                }
            }
        }
    }

    let rename = |feed_name: &str, id: &str| -> Arc<str> {
        if needs_rename.contains(id) {
            format!("{feed_name}_{id}").into()
        } else {
            id.into()
        }
    };

    let mut merged = Feed::default();
    // index offsets so stop_times/trips keep valid cross-references once lists are concatenated
    let mut stop_offset = 0u32;
    let mut trip_offset = 0u32;
    let mut route_offset = 0u32;

    for (feed_name, feed) in feeds {
        for stop in &feed.stops {
            merged.stops.push(Stop {
                stop_id: rename(&feed_name, &stop.stop_id),
                stop_name: stop.stop_name.clone(),
                stop_desc: stop.stop_desc.clone(),
                coordinate: stop.coordinate,
                parent_station: stop
                    .parent_station
                    .as_ref()
                    .map(|p| rename(&feed_name, p)),
                feed_name: Some(feed_name.as_str().into()),
            });
        }
        for route in &feed.routes {
            merged.routes.push(route.clone());
        }
        for trip in &feed.trips {
            let mut trip = trip.clone();
            if trip.route_idx != u32::MAX {
                trip.route_idx += route_offset;
            }
            merged.trips.push(trip);
        }
        for st in &feed.stop_times {
            merged.stop_times.push(StopTime {
                trip_idx: st.trip_idx + trip_offset,
                stop_idx: st.stop_idx + stop_offset,
                ..*st
            });
        }
        for transfer in &feed.transfers {
            merged.transfers.push(Transfer {
                from_stop_id: rename(&feed_name, &transfer.from_stop_id),
                to_stop_id: rename(&feed_name, &transfer.to_stop_id),
                transfer_type: transfer.transfer_type,
                min_transfer_time: transfer.min_transfer_time,
            });
        }
        merged.calendars.extend(feed.calendars.iter().cloned());
        merged.calendar_dates.extend(feed.calendar_dates.iter().cloned());
        merged.shapes.extend(feed.shapes.iter().cloned());

        stop_offset += feed.stops.len() as u32;
        trip_offset += feed.trips.len() as u32;
        route_offset += feed.routes.len() as u32;
    }

    // collapse true duplicates (same final id) keeping the first occurrence,
    // remapping stop_times/parent_station references to the surviving index.
    let mut first_index_of_id: HashMap<Arc<str>, u32> = HashMap::new();
    let mut remap: Vec<u32> = Vec::with_capacity(merged.stops.len());
    let mut deduped_stops: Vec<Stop> = Vec::new();
    for stop in &merged.stops {
        if let Some(&existing) = first_index_of_id.get(&stop.stop_id) {
            remap.push(existing);
        } else {
            let new_idx = deduped_stops.len() as u32;
            first_index_of_id.insert(stop.stop_id.clone(), new_idx);
            remap.push(new_idx);
            deduped_stops.push(stop.clone());
        }
    }
    merged.stops = deduped_stops;
    for st in &mut merged.stop_times {
        st.stop_idx = remap[st.stop_idx as usize];
    }

    merged
}
