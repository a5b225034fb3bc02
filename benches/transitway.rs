use std::{env, hint::black_box, path::Path, sync::Arc, time::Duration};

use criterion::{Criterion, criterion_group, criterion_main};
use transitway::{
    config::{LoadingOptions, QueryOptions},
    feed::Feed,
    gtfs::Gtfs,
    indexed::IndexedFeed,
    model::Location,
    online,
    shared::Coordinate,
    water::WaterFilter,
};

fn short_route(indexed: &IndexedFeed, options: &QueryOptions) {
    let from = Location { id: Arc::from("bench-from"), coordinate: Coordinate { latitude: 59.370_136, longitude: 18.001_749 } };
    let to = Location { id: Arc::from("bench-to"), coordinate: Coordinate { latitude: 59.335_34, longitude: 18.057_737 } };
    let _ = black_box(online::one_to_one(indexed, &from, 28_800, &to, options));
}

fn long_route(indexed: &IndexedFeed, options: &QueryOptions) {
    let from = Location { id: Arc::from("bench-from"), coordinate: Coordinate { latitude: 59.196_198, longitude: 17.628_841 } };
    let to = Location { id: Arc::from("bench-to"), coordinate: Coordinate { latitude: 59.857_834, longitude: 17.629_814 } };
    let _ = black_box(online::one_to_one(indexed, &from, 28_800, &to, options));
}

fn criterion_benchmark(c: &mut Criterion) {
    let gtfs_data_path = match env::var("GTFS_DATA_PATH") {
        Ok(path_str) => Path::new(&path_str).to_owned(),
        Err(err) => {
            println!("Missing GTFS_DATA_PATH environment variable: {err}");
            return;
        }
    };

    let gtfs = Gtfs::new().from_zip(&gtfs_data_path).expect("Failed to load GTFS zip");
    let feed = Feed::load(gtfs).expect("Failed to load feed");
    let water = WaterFilter::empty();
    let loading = LoadingOptions {
        departure_date: 0,
        gtfs_data_dirs: vec![gtfs_data_path.display().to_string()],
        stop_time_filter: None,
        max_allowable_between_stop_walk_km: 1.5,
        max_allowable_walking_distance_km: f64::INFINITY,
        max_allowable_number_of_transfers: u32::MAX,
        water_geojson_file: None,
        shape_hints: Vec::new(),
        preset_destinations: Vec::new(),
        default_query_options: None,
    };
    let indexed = IndexedFeed::build(feed, &water, &loading).expect("Failed to build indexed feed");
    let options = QueryOptions::default();

    let mut group = c.benchmark_group("Routing");
    group.warm_up_time(Duration::from_secs(10));
    group.measurement_time(Duration::from_secs(30));

    group.bench_function("Short route solve", |b| b.iter(|| short_route(&indexed, &options)));
    group.bench_function("Long route solve", |b| b.iter(|| long_route(&indexed, &options)));

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
