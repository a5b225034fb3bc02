use transitway::shared::{Coordinate, Distance};

#[test]
fn paris_to_london_is_roughly_343_km() {
    let paris = Coordinate { latitude: 48.85800943005911, longitude: 2.3514350059357927 };
    let london = Coordinate { latitude: 51.5052389927712, longitude: -0.12495407345099824 };
    let d = paris.haversine_distance(&london);
    assert!((d.as_kilometers() - 343.0).abs() < 5.0);
}

#[test]
fn distance_eq_test() {
    let dist_a = Distance::from_meters(1000.0);
    let dist_b = Distance::from_kilometers(1.0);
    assert_eq!(dist_a, dist_b)
}

#[test]
fn distance_cmp_test() {
    let dist_a = Distance::from_meters(1000.0);
    let dist_b = Distance::from_kilometers(0.5);
    assert!(dist_a > dist_b)
}
