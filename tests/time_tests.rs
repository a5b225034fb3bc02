use transitway::shared::Time;

#[test]
fn valid_time_test_1() {
    assert_eq!(Time::from_hms("00:00:00").unwrap().as_seconds(), 0);
}

#[test]
fn valid_time_test_2() {
    assert_eq!(Time::from_hms("00:00:30").unwrap().as_seconds(), 30);
}

#[test]
fn valid_time_test_3() {
    assert_eq!(Time::from_hms("00:01:30").unwrap().as_seconds(), 90);
}

#[test]
fn valid_time_test_4() {
    assert_eq!(Time::from_hms("01:01:30").unwrap().as_seconds(), 3690);
}

#[test]
fn invalid_time_test_1() {
    assert!(Time::from_hms("00:00:0a").is_none());
}

#[test]
fn invalid_time_test_2() {
    assert!(Time::from_hms("00:00").is_none());
}
