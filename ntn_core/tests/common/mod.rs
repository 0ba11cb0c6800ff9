//! Shared test double for C1. Deterministic and table/closure-driven, per
//! the "never invent ids" contract: anything not registered comes back
//! `Unavailable`, never a guess.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ntn_common::model::SatelliteId;
use ntn_common::Result;
use ntn_core::position_provider::{Observer, PositionOutcome, PositionProvider, PositionSample};

pub type SampleFn = Arc<dyn Fn(f64) -> Option<PositionSample> + Send + Sync>;

#[derive(Clone, Default)]
pub struct MockPositionProvider {
    entries: HashMap<SatelliteId, SampleFn>,
}

impl MockPositionProvider {
    pub fn new() -> Self {
        MockPositionProvider { entries: HashMap::new() }
    }

    /// Registers a time-varying sample function for `id`.
    pub fn register(&mut self, id: impl Into<String>, f: impl Fn(f64) -> Option<PositionSample> + Send + Sync + 'static) {
        self.entries.insert(id.into(), Arc::new(f));
    }

    /// Registers a satellite that is constant for all `t`.
    pub fn register_constant(&mut self, id: impl Into<String>, sample: PositionSample) {
        self.register(id, move |_t| Some(sample));
    }
}

pub fn sample(elevation_deg: f64, range_km: f64, heading_deg: f64, visible: bool) -> PositionSample {
    sample_at(120.0, 24.0, 550.0, elevation_deg, range_km, heading_deg, visible)
}

#[allow(clippy::too_many_arguments)]
pub fn sample_at(
    lon_deg: f64,
    lat_deg: f64,
    alt_km: f64,
    elevation_deg: f64,
    range_km: f64,
    heading_deg: f64,
    visible: bool,
) -> PositionSample {
    PositionSample {
        lon_deg,
        lat_deg,
        alt_km,
        elevation_deg: Some(elevation_deg),
        azimuth_deg: Some(0.0),
        range_km: Some(range_km),
        velocity_km_s: 7.5,
        heading_deg,
        visible,
    }
}

#[async_trait]
impl PositionProvider for MockPositionProvider {
    async fn batch_position(
        &self,
        sat_ids: &[SatelliteId],
        t: f64,
        _observer: Option<Observer>,
    ) -> Result<HashMap<SatelliteId, PositionOutcome>> {
        let mut out = HashMap::with_capacity(sat_ids.len());
        for id in sat_ids {
            let outcome = match self.entries.get(id).and_then(|f| f(t)) {
                Some(s) => PositionOutcome::Ok(s),
                None => PositionOutcome::Unavailable,
            };
            out.insert(id.clone(), outcome);
        }
        Ok(out)
    }

    async fn resolve_satellite_id(&self, identifier: &str) -> Result<Option<SatelliteId>> {
        Ok(self.entries.contains_key(identifier).then(|| identifier.to_string()))
    }
}
