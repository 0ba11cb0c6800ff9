mod common;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::MockPositionProvider;
use ntn_common::model::{Mode, SatelliteId};
use ntn_common::{CoreConfig, ModeConfig};
use ntn_core::fast_access::FastAccessPredictor;
use ntn_core::fine_grained_sync::FineGrainedSync;
use ntn_core::integration_bridge::{DecisionRequest, IntegrationBridge};
use ntn_core::position_provider::{Observer, PositionOutcome, PositionProvider};
use ntn_core::sync_scheduler::SyncScheduler;

/// A provider that always outlasts a short `fallback_timeout_s`, standing
/// in for an enhanced path that cannot answer in time.
struct SlowProvider;

#[async_trait]
impl PositionProvider for SlowProvider {
    async fn batch_position(
        &self,
        _sat_ids: &[SatelliteId],
        _t: f64,
        _observer: Option<Observer>,
    ) -> ntn_common::Result<HashMap<SatelliteId, PositionOutcome>> {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        Ok(HashMap::new())
    }

    async fn resolve_satellite_id(&self, _identifier: &str) -> ntn_common::Result<Option<SatelliteId>> {
        Ok(None)
    }
}

fn request(now: f64) -> DecisionRequest {
    DecisionRequest {
        ue_id: "ue-1".into(),
        satellite_id: "sat-A".into(),
        ue_position: Observer { lon_deg: 120.0, lat_deg: 24.0, alt_m: 0.0 },
        now,
        horizon_s: 600.0,
    }
}

fn build_bridge(
    mode: ModeConfig,
    fallback_timeout_s: f64,
    provider: Arc<dyn PositionProvider>,
) -> Arc<IntegrationBridge> {
    let predictor = Arc::new(FastAccessPredictor::new(10.0, 10.0, ntn_common::config::ScorerWeights::default()));
    let mut config = CoreConfig::default();
    config.mode = mode;
    config.fallback_timeout_s = fallback_timeout_s;
    let scheduler = SyncScheduler::new(config.clone(), predictor, Arc::clone(&provider));
    let fine_sync = FineGrainedSync::new(config.clone(), provider);
    IntegrationBridge::new(config, scheduler, fine_sync)
}

/// S4 — in Fallback mode, when C5 cannot produce a result before
/// `fallback_timeout_s` (here: the position provider takes 200ms to
/// answer against a 50ms budget), the bridge falls back to C4's
/// paper-only path and counts the activation.
#[tokio::test]
async fn scenario_s4_fallback_on_missing_enhanced_path() {
    let bridge = build_bridge(ModeConfig::Fallback, 0.05, Arc::new(SlowProvider));
    let before = bridge.fallback_activations();

    let result = bridge.decide(request(0.0)).await;

    assert_eq!(result.mode_used, Mode::PaperOnly);
    assert_eq!(bridge.fallback_activations(), before + 1);
    assert!(bridge.snapshot().total_requests >= 1);
}

#[tokio::test]
async fn paper_only_mode_never_touches_enhanced_path() {
    let bridge = build_bridge(ModeConfig::PaperOnly, 10.0, Arc::new(MockPositionProvider::new()));
    let result = bridge.decide(request(0.0)).await;
    assert_eq!(result.mode_used, Mode::PaperOnly);
    assert_eq!(bridge.fallback_activations(), 0);
}

#[tokio::test]
async fn switch_mode_to_same_mode_is_a_no_op() {
    let bridge = build_bridge(ModeConfig::Hybrid, 10.0, Arc::new(MockPositionProvider::new()));
    assert_eq!(bridge.current_mode(), Mode::Hybrid);
    bridge.switch_mode(Mode::Hybrid, 5.0).await.unwrap();
    assert_eq!(bridge.current_mode(), Mode::Hybrid);
}
