//! Configuration clamping and defaults.

use rstest::rstest;
use watcher::WatchConfig;

#[test]
fn defaults_match_the_documented_baseline() {
    let config = WatchConfig::default();
    assert_eq!(config.similarity_threshold, 0.85);
    assert_eq!(config.check_interval_secs, 60);
    assert!(config.include_diff);
    assert!(config.custom_selector.is_none());
}

#[rstest]
#[case(1.5, 1.0)]
#[case(1.0, 1.0)]
#[case(0.5, 0.5)]
#[case(0.0, 0.05)]
#[case(-3.0, 0.05)]
fn thresholds_clamp_into_the_open_unit_interval(#[case] raw: f64, #[case] expected: f64) {
    let config = WatchConfig::new(raw, 60, true, None);
    assert_eq!(config.similarity_threshold, expected);
}

#[rstest]
#[case(0, 30)]
#[case(29, 30)]
#[case(30, 30)]
#[case(3600, 3600)]
fn intervals_clamp_to_the_floor(#[case] raw: u64, #[case] expected: u64) {
    let config = WatchConfig::new(0.85, raw, true, None);
    assert_eq!(config.check_interval_secs, expected);
}

#[test]
fn non_finite_thresholds_fall_back_to_default() {
    assert_eq!(
        WatchConfig::new(f64::NAN, 60, true, None).similarity_threshold,
        0.85
    );
    assert_eq!(
        WatchConfig::new(f64::INFINITY, 60, true, None).similarity_threshold,
        0.85
    );
}

#[test]
fn blank_selectors_are_dropped() {
    let config = WatchConfig::new(0.85, 60, true, Some("   ".to_string()));
    assert!(config.custom_selector.is_none());
    let kept = WatchConfig::new(0.85, 60, true, Some("article".to_string()));
    assert_eq!(kept.custom_selector.as_deref(), Some("article"));
}

#[test]
fn partial_toml_fills_defaults() {
    let config: WatchConfig = toml::from_str("similarity_threshold = 0.7").expect("parse");
    assert_eq!(config.similarity_threshold, 0.7);
    assert_eq!(config.check_interval_secs, 60);
    assert!(config.include_diff);
}
