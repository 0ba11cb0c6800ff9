mod common;

use std::sync::Arc;

use common::{sample_at, MockPositionProvider};
use ntn_common::CoreConfig;
use ntn_core::fine_grained_sync::{FineGrainedSync, NetworkNode, PlaneKind, SyncCoordinator};
use ntn_core::position_provider::Observer;

fn observer() -> Observer {
    Observer { lon_deg: 120.0, lat_deg: 24.0, alt_m: 0.0 }
}

#[tokio::test]
async fn predict_satellite_access_returns_confidence_in_unit_interval() {
    let mut provider = MockPositionProvider::new();
    provider.register("sat-A", |t| Some(sample_at(120.0, 24.0, 550.0, (80.0 - 2.0 * t).max(-10.0), 700.0, 90.0, true)));

    let sync = FineGrainedSync::new(CoreConfig::default(), Arc::new(provider));
    let prediction = sync
        .predict_satellite_access(&"ue-1".to_string(), &"sat-A".to_string(), observer(), 0.0, 600.0)
        .await
        .unwrap();

    assert!((0.0..=1.0).contains(&prediction.confidence));
    assert!(prediction.error_bound_ms <= 50.0);
    assert!(prediction.instant_s >= 0.0 && prediction.instant_s <= 600.0);
}

#[tokio::test]
async fn establish_signaling_free_sync_with_no_nodes_is_zero_accuracy() {
    let provider = MockPositionProvider::new();
    let sync = FineGrainedSync::new(CoreConfig::default(), Arc::new(provider));
    let accuracy = sync.establish_signaling_free_sync(SyncCoordinator::default(), 0.0).await;
    assert_eq!(accuracy, 0.0);
    sync.stop().await;
}

#[tokio::test]
async fn establish_signaling_free_sync_publishes_a_synchronized_point() {
    let provider = MockPositionProvider::new();
    let sync = FineGrainedSync::new(CoreConfig::default(), Arc::new(provider));
    let coordinator = SyncCoordinator {
        access_nodes: vec![NetworkNode { name: "gnb-a".into(), plane: PlaneKind::Leo }],
        core_nodes: vec![NetworkNode { name: "amf-1".into(), plane: PlaneKind::Leo }],
        satellite_nodes: vec![NetworkNode { name: "sat-x".into(), plane: PlaneKind::Geo }],
    };

    let accuracy = sync.establish_signaling_free_sync(coordinator, 1000.0).await;
    assert!(accuracy > 0.0);

    let point = sync.current_sync_point();
    assert_eq!(point.access_net_s, 1000.0);
    assert_eq!(point.core_net_s, 1000.0);
    sync.stop().await;
}

#[tokio::test]
async fn drift_beyond_threshold_triggers_recalibration() {
    let provider = MockPositionProvider::new();
    let mut config = CoreConfig::default();
    // A monitor tick this short is virtually guaranteed to overrun by more
    // than max_clock_drift_ms, so the drift monitor recalibrates on its
    // very first tick.
    config.sync_interval_s = 0.05;
    config.max_clock_drift_ms = 0.001;

    let sync = FineGrainedSync::new(config, Arc::new(provider));
    let coordinator = SyncCoordinator {
        access_nodes: vec![NetworkNode { name: "gnb-a".into(), plane: PlaneKind::Leo }],
        core_nodes: vec![NetworkNode { name: "amf-1".into(), plane: PlaneKind::Leo }],
        satellite_nodes: vec![NetworkNode { name: "sat-x".into(), plane: PlaneKind::Geo }],
    };
    sync.establish_signaling_free_sync(coordinator, 0.0).await;

    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    assert!(sync.recalibration_count() >= 1);

    let point = sync.current_sync_point();
    assert!(point.drift_rate_ms_per_hr.abs() > 0.0);
    sync.stop().await;
}
