use std::{fs, path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use thiserror::Error;
use transitway::{
    config::{LoadingOptions, QueryOptions},
    feed::{self, Feed},
    gtfs::Gtfs,
    indexed::IndexedFeed,
    model::Location,
    online,
    presets::load_locations_csv,
    shared::{Coordinate, Time},
    water::WaterFilter,
};

#[derive(Error, Debug)]
enum Error {
    #[error("reading {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("parsing config at {path}: {source}")]
    Config { path: PathBuf, source: serde_json::Error },
    #[error("gtfs: {0}")]
    Gtfs(#[from] transitway::gtfs::Error),
    #[error("feed: {0}")]
    Feed(#[from] feed::Error),
    #[error("indexing feed: {0}")]
    Indexed(#[from] transitway::indexed::Error),
    #[error("water filter: {0}")]
    Water(#[from] transitway::water::Error),
    #[error("routing: {0}")]
    Online(#[from] online::Error),
    #[error("locations file: {0}")]
    Locations(#[from] transitway::presets::Error),
    #[error("{0:?} is not a valid HH:MM:SS departure time")]
    BadDepartureTime(String),
    #[error("location id {0:?} not found in locations file")]
    UnknownLocation(String),
}

/// A RAPTOR-based GTFS journey planner.
#[derive(Parser)]
#[command(name = "transitway", version, about)]
struct Cli {
    /// Path to a loading-options JSON file (gtfs_data_dirs, departure_date, ...)
    #[arg(long)]
    config: PathBuf,
    /// Optional query-options JSON file overriding the built-in defaults
    #[arg(long)]
    query: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Route between two arbitrary lat/lng points
    OneToOne { lat1: f64, lng1: f64, departure: String, lat2: f64, lng2: f64 },
    /// Travel times from one lat/lng point to every location in a CSV
    OneToMany { lat: f64, lng: f64, departure: String, locations_file: PathBuf },
    /// Route between two named GTFS stops
    StopToStop { origin_stop_id: String, departure: String, dest_stop_id: String },
    /// All-pairs travel times among a location CSV, as `origin,destination,seconds` rows
    AllPairs { locations_file: PathBuf, departure: String },
    /// Route between two ids drawn from the same location CSV
    OneToOneLocation { locations_file: PathBuf, origin_id: String, departure: String, dest_id: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    let loading = read_loading_options(&cli.config)?;
    let indexed = load_indexed_feed(&loading)?;
    let options = loading.resolve_query_options(read_query_options(cli.query.as_deref())?);

    match &cli.command {
        Command::OneToOne { lat1, lng1, departure, lat2, lng2 } => {
            let dep_secs = parse_departure(departure)?;
            let origin = Location { id: Arc::from("origin"), coordinate: Coordinate { latitude: *lat1, longitude: *lng1 } };
            let destination =
                Location { id: Arc::from("destination"), coordinate: Coordinate { latitude: *lat2, longitude: *lng2 } };
            let route = online::one_to_one(&indexed, &origin, dep_secs, &destination, &options)?;
            print_route(&route);
        }
        Command::StopToStop { origin_stop_id, departure, dest_stop_id } => {
            let dep_secs = parse_departure(departure)?;
            let route = online::stop_to_stop(&indexed, origin_stop_id, dep_secs, dest_stop_id, &options)?;
            print_route(&route);
        }
        Command::OneToMany { lat, lng, departure, locations_file } => {
            let dep_secs = parse_departure(departure)?;
            let origin = Location { id: Arc::from("origin"), coordinate: Coordinate { latitude: *lat, longitude: *lng } };
            let destinations = load_locations_csv(locations_file)?;
            let times = online::one_to_many(&indexed, &origin, dep_secs, &destinations, &options)?;
            let json = serde_json::to_string_pretty(&times).expect("map of string keys always serializes");
            println!("{json}");
        }
        Command::OneToOneLocation { locations_file, origin_id, departure, dest_id } => {
            let dep_secs = parse_departure(departure)?;
            let locations = load_locations_csv(locations_file)?;
            let origin = find_location(&locations, origin_id)?;
            let destination = find_location(&locations, dest_id)?;
            let route = online::one_to_one(&indexed, origin, dep_secs, destination, &options)?;
            print_route(&route);
        }
        Command::AllPairs { locations_file, departure } => {
            let dep_secs = parse_departure(departure)?;
            let locations = load_locations_csv(locations_file)?;
            let times = online::many_to_many(&indexed, &locations, dep_secs, &locations, &options)?;
            println!("origin,destination,seconds");
            for origin in &locations {
                let Some(reached) = times.get(&origin.id) else { continue };
                for destination in &locations {
                    if destination.id == origin.id {
                        continue;
                    }
                    if let Some(Some(seconds)) = reached.get(&destination.id) {
                        println!("{},{},{}", origin.id, destination.id, seconds);
                    }
                }
            }
        }
    }
    Ok(())
}

fn find_location<'a>(locations: &'a [Location], id: &str) -> Result<&'a Location, Error> {
    locations.iter().find(|l| l.id.as_ref() == id).ok_or_else(|| Error::UnknownLocation(id.to_string()))
}

fn parse_departure(departure: &str) -> Result<u32, Error> {
    Time::from_hms(departure).map(|t| t.as_seconds()).ok_or_else(|| Error::BadDepartureTime(departure.to_string()))
}

fn print_route(route: &Option<online::Route>) {
    match route {
        Some(route) => println!("{}", serde_json::to_string_pretty(route).expect("Route always serializes")),
        None => println!("null"),
    }
}

fn read_loading_options(path: &PathBuf) -> Result<LoadingOptions, Error> {
    let raw = fs::read_to_string(path).map_err(|source| Error::Io { path: path.clone(), source })?;
    serde_json::from_str(&raw).map_err(|source| Error::Config { path: path.clone(), source })
}

fn read_query_options(path: Option<&std::path::Path>) -> Result<Option<QueryOptions>, Error> {
    match path {
        None => Ok(None),
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
            serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| Error::Config { path: path.to_path_buf(), source })
        }
    }
}

fn load_indexed_feed(loading: &LoadingOptions) -> Result<IndexedFeed, Error> {
    let mut feeds = Vec::new();
    for dir in &loading.gtfs_data_dirs {
        let path = std::path::Path::new(dir);
        let gtfs = if path.extension().is_some_and(|ext| ext == "zip") {
            Gtfs::new().from_zip(path)?
        } else {
            Gtfs::new().from_directory(path)
        };
        let mut feed = Feed::load(gtfs)?;
        feed = feed::filter_services_by_date(&feed, loading.departure_date)?;
        if let Some(filter) = &loading.stop_time_filter {
            let earliest = Time::from_seconds(filter.earliest.unwrap_or(0));
            let latest = Time::from_seconds(filter.latest.unwrap_or(u32::MAX));
            feed = feed::filter_stop_times_by_range(&feed, earliest, latest)?;
        }
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or(dir).to_string();
        feeds.push((name, feed));
    }
    let merged = feed::merge(feeds);
    let water = match &loading.water_geojson_file {
        Some(path) => WaterFilter::from_path(path)?,
        None => WaterFilter::empty(),
    };
    Ok(IndexedFeed::build(merged, &water, loading)?)
}
