mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{sample_at, MockPositionProvider};
use ntn_common::config::ScorerWeights;
use ntn_common::geo::GeoPoint;
use ntn_common::model::{AccessStrategy, UeAccessProfile};
use ntn_common::CoreConfig;
use ntn_core::fast_access::FastAccessPredictor;
use ntn_core::sync_scheduler::{HandoverSearchResult, SyncScheduler};

fn elevation_only_weights() -> ScorerWeights {
    ScorerWeights { distance: 0.0, elevation: 1.0, stability: 0.0, direction: 0.0, heading_bonus_window_deg: 30.0, direction_tie_margin_pct: 0.0 }
}

/// S2 — deterministic handover crossover in the middle of a 10s window.
/// `sat-A`'s elevation falls as `sat-B`'s rises, crossing over exactly at
/// t = 4s.
#[tokio::test]
async fn scenario_s2_binary_search_converges_on_known_crossover() {
    let mut provider = MockPositionProvider::new();
    provider.register("sat-A", |t| Some(sample_at(120.0, 24.0, 550.0, 60.0 - 5.0 * t, 1000.0, 90.0, true)));
    provider.register("sat-B", |t| Some(sample_at(120.0, 24.0, 550.0, 20.0 + 5.0 * t, 1000.0, 90.0, true)));

    let predictor = Arc::new(FastAccessPredictor::new(10.0, 10.0, elevation_only_weights()));
    let mut config = CoreConfig::default();
    config.binary_search_precision_s = 0.01;
    let scheduler = SyncScheduler::new(config, predictor, Arc::new(provider));

    let result = scheduler
        .binary_search_handover_time(&"ue-1".to_string(), &"sat-A".to_string(), &"sat-B".to_string(), 0.0, 10.0)
        .await
        .unwrap();

    match result {
        HandoverSearchResult::Resolved { instant_s, converged, iterations } => {
            assert!(converged);
            assert!(iterations <= 10);
            assert!((instant_s - 4.0).abs() <= 0.02, "expected ~4.0s, got {instant_s}");
        }
        other => panic!("expected a resolved handover, got {other:?}"),
    }
}

#[tokio::test]
async fn identical_source_and_target_short_circuits_to_no_handover() {
    let provider = MockPositionProvider::new();
    let predictor = Arc::new(FastAccessPredictor::new(10.0, 10.0, ScorerWeights::default()));
    let scheduler = SyncScheduler::new(CoreConfig::default(), predictor, Arc::new(provider));

    let result = scheduler
        .binary_search_handover_time(&"ue-1".to_string(), &"sat-A".to_string(), &"sat-A".to_string(), 0.0, 10.0)
        .await
        .unwrap();
    assert_eq!(result, HandoverSearchResult::NoHandoverInWindow);
}

#[tokio::test]
async fn missing_position_at_bracket_start_is_dependency_unavailable() {
    let provider = MockPositionProvider::new(); // neither satellite registered
    let predictor = Arc::new(FastAccessPredictor::new(10.0, 10.0, ScorerWeights::default()));
    let scheduler = SyncScheduler::new(CoreConfig::default(), predictor, Arc::new(provider));

    let result = scheduler
        .binary_search_handover_time(&"ue-1".to_string(), &"sat-A".to_string(), &"sat-B".to_string(), 0.0, 10.0)
        .await;
    assert!(result.is_err());
    assert_eq!(scheduler.stale_position_event_count(), 1);
}

/// Starting and stopping the tick loop twice in a row without an
/// intervening transition is a state-machine violation, not a silent no-op.
#[tokio::test]
async fn double_start_is_rejected() {
    let provider = MockPositionProvider::new();
    let predictor = Arc::new(FastAccessPredictor::new(10.0, 10.0, ScorerWeights::default()));
    let mut config = CoreConfig::default();
    config.tick_period_ms = 50;
    let scheduler = SyncScheduler::new(config, predictor, Arc::new(provider));

    scheduler.start().await.unwrap();
    let second = scheduler.start().await;
    assert!(second.is_err());

    tokio::time::sleep(Duration::from_millis(10)).await;
    scheduler.stop().await.unwrap();
}

/// Regional candidate sourcing must drop satellites below
/// `candidate_min_elevation_deg` before truncating to
/// `max_candidate_satellites`, not after.
#[tokio::test]
async fn low_elevation_satellites_are_excluded_from_regional_candidates() {
    let mut provider = MockPositionProvider::new();
    provider.register_constant("sat-high", sample_at(120.0, 24.0, 550.0, 60.0, 800.0, 90.0, true));
    provider.register_constant("sat-low", sample_at(121.0, 24.0, 550.0, 5.0, 1800.0, 90.0, true));

    let predictor = Arc::new(FastAccessPredictor::new(10.0, 10.0, elevation_only_weights()));
    predictor.register_ue(UeAccessProfile {
        ue_id: "ue-0".into(),
        strategy: AccessStrategy::Consistent,
        position: GeoPoint::new(120.0, 24.0, 0.0),
        current_satellite: "sat-high".into(),
    });

    let mut config = CoreConfig::default();
    config.tick_period_ms = 20;
    config.delta_t_s = 0.01;
    config.candidate_min_elevation_deg = 30.0;
    let scheduler = SyncScheduler::new(config, predictor, Arc::new(provider));
    scheduler.set_known_satellites(vec!["sat-high".into(), "sat-low".into()]);

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    scheduler.stop().await.unwrap();

    let status = scheduler.status();
    assert!(!status.r_table.is_empty());
    for info in &status.r_table {
        assert_ne!(info.satellite_id, "sat-low");
        assert_ne!(info.next_satellite_id.as_deref(), Some("sat-low"));
    }
}
