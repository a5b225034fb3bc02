//! Plain domain entities shared by `feed`, `indexed`, `raptor` and `online`.
//!
//! These mirror the GTFS schema closely, but are typed and normalized rather
//! than raw CSV rows — conversion from the wire format lives in `gtfs`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::shared::{Coordinate, Time};

/// A transit stop or station.
#[derive(Debug, Clone)]
pub struct Stop {
    pub stop_id: Arc<str>,
    pub stop_name: Arc<str>,
    pub stop_desc: Option<Arc<str>>,
    pub coordinate: Coordinate,
    pub parent_station: Option<Arc<str>>,
    pub feed_name: Option<Arc<str>>,
}

/// An arrival/departure event linking a trip to a stop.
#[derive(Debug, Clone, Copy)]
pub struct StopTime {
    pub trip_idx: u32,
    pub stop_idx: u32,
    pub stop_sequence: u32,
    pub arrival_time: Time,
    pub departure_time: Time,
    /// Derived from `departure_time`, not `arrival_time` — boarding
    /// reachability is keyed on when a trip can be caught, not when it lands.
    pub time_of_day_sec: Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionId {
    Outbound,
    Inbound,
}

impl From<u8> for DirectionId {
    fn from(value: u8) -> Self {
        if value == 0 { DirectionId::Outbound } else { DirectionId::Inbound }
    }
}

#[derive(Debug, Clone)]
pub struct Trip {
    pub trip_id: Arc<str>,
    pub route_idx: u32,
    pub service_id: Arc<str>,
    pub direction_id: Option<DirectionId>,
    pub shape_id: Option<Arc<str>>,
    pub headsign: Option<Arc<str>>,
    pub short_name: Option<Arc<str>>,
    pub block_id: Option<Arc<str>>,
}

/// GTFS `route_type`, closed to the values this system treats distinctly.
/// Anything that isn't `Bus` is charged the `rail_multiplier` cost rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteType {
    LightRail,
    Subway,
    Rail,
    Bus,
    Ferry,
    CableCar,
    Gondola,
    Funicular,
}

impl RouteType {
    pub fn from_gtfs_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => RouteType::LightRail,
            1 => RouteType::Subway,
            2 => RouteType::Rail,
            3 => RouteType::Bus,
            4 => RouteType::Ferry,
            5 => RouteType::CableCar,
            6 => RouteType::Gondola,
            7 => RouteType::Funicular,
            _ => return None,
        })
    }

    pub fn is_bus(&self) -> bool {
        matches!(self, RouteType::Bus)
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub route_id: Arc<str>,
    pub route_type: RouteType,
    pub short_name: Option<Arc<str>>,
    pub long_name: Option<Arc<str>>,
    pub color: Option<Arc<str>>,
    pub text_color: Option<Arc<str>>,
}

/// `start_date..end_date` (inclusive, `YYYYMMDD`) plus a weekday bitmask.
#[derive(Debug, Clone, Copy)]
pub struct Calendar {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
    pub start_date: u32,
    pub end_date: u32,
}

impl Calendar {
    pub fn runs_on_weekday(&self, weekday: chrono::Weekday) -> bool {
        use chrono::Weekday::*;
        match weekday {
            Mon => self.monday,
            Tue => self.tuesday,
            Wed => self.wednesday,
            Thu => self.thursday,
            Fri => self.friday,
            Sat => self.saturday,
            Sun => self.sunday,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalendarEntry {
    pub service_id: Arc<str>,
    pub calendar: Calendar,
}

/// `exception_type` is kept as the raw GTFS value (`1` added, `2` removed)
/// rather than parsed into an enum at load time, since only rows matching
/// the date actually being filtered to need to be validated.
#[derive(Debug, Clone)]
pub struct CalendarDate {
    pub service_id: Arc<str>,
    pub date: u32,
    pub exception_type: u8,
}

#[derive(Debug, Clone)]
pub struct Shape {
    pub shape_id: Arc<str>,
    /// Points ordered by `shape_pt_sequence`.
    pub points: Vec<Coordinate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Recommended,
    Timed,
    MinTime,
    Infeasible,
}

#[derive(Debug, Clone)]
pub struct Transfer {
    pub from_stop_id: Arc<str>,
    pub to_stop_id: Arc<str>,
    pub transfer_type: TransferType,
    pub min_transfer_time: Option<u32>,
}

/// The mode by which a reach record / itinerary step was produced. Closed
/// variant: fields that only make sense for one mode live in that mode's
/// own struct rather than as optional fields on a shared record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportMode {
    Origin,
    Transit,
    Walk,
}

/// Derived, directed walking edge between two stops.
#[derive(Debug, Clone, Copy)]
pub struct WalkingTransfer {
    pub to_stop_idx: u32,
    pub cost: WalkingCost,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WalkingCost {
    /// Walked footpath: cost is derived from distance at query time via
    /// `walking_speed_kph`, so the raw km is kept rather than baked seconds.
    Distance { km: f64 },
    /// An explicit `MIN_TIME` transfer: fixed cost regardless of speed.
    FixedSeconds { secs: u32 },
}

/// A named query endpoint: an origin, a destination, or a preset location.
/// Ids must be disjoint from any existing stop id in the feed it augments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: Arc<str>,
    pub coordinate: Coordinate,
}
