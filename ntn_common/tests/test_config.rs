use ntn_common::config::ScorerWeights;
use ntn_common::CoreConfig;

#[test]
fn ron_round_trips_through_serialization() {
    let cfg = CoreConfig::default();
    let text = cfg.to_ron_string().expect("serialize");
    let parsed: CoreConfig = ron::from_str(&text).expect("deserialize");
    assert_eq!(cfg, parsed);
}

#[test]
fn load_missing_file_is_an_error() {
    let result = CoreConfig::load("/nonexistent/ntn-core-config.ron");
    assert!(result.is_err());
}

#[test]
fn load_malformed_file_is_an_error() {
    let dir = std::env::temp_dir().join("ntn-core-config-test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bad.ron");
    std::fs::write(&path, "not valid ron (((").unwrap();
    let result = CoreConfig::load(&path);
    assert!(result.is_err());
}

#[test]
fn scorer_weights_partial_override_keeps_remaining_defaults() {
    let partial = "(distance: 0.9)";
    let weights: ScorerWeights = ron::from_str(partial).unwrap();
    assert_eq!(weights.distance, 0.9);
    assert_eq!(weights.elevation, ScorerWeights::default().elevation);
}
