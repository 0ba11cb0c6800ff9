/*
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

//! C1 — the external contract this core consumes for satellite position,
//! velocity and visibility. TLE fetching and SGP4 propagation live on the
//! other side of this trait (§1 Non-goals).

use std::collections::HashMap;

use async_trait::async_trait;
use ntn_common::model::SatelliteId;
use ntn_common::Result;

/// A single satellite's state at the instant requested, as returned by
/// `PositionProvider::batch_position`. The observer-relative fields
/// (elevation, azimuth, range) are `None` when the provider was not given
/// an observer to compute them against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub lon_deg: f64,
    pub lat_deg: f64,
    pub alt_km: f64,
    pub elevation_deg: Option<f64>,
    pub azimuth_deg: Option<f64>,
    pub range_km: Option<f64>,
    pub velocity_km_s: f64,
    pub heading_deg: f64,
    pub visible: bool,
}

/// An optional ground observer for elevation/azimuth/range computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observer {
    pub lon_deg: f64,
    pub lat_deg: f64,
    pub alt_m: f64,
}

/// Per-satellite outcome of a batch request: either a sample, or a flag that
/// this one satellite failed. A per-satellite failure is never escalated to
/// a whole-batch failure by callers (§6).
#[derive(Debug, Clone, PartialEq)]
pub enum PositionOutcome {
    Ok(PositionSample),
    Unavailable,
}

#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Positions for `sat_ids` at time `t` (unix seconds), optionally
    /// relative to `observer`. Implementations must honor a per-call
    /// deadline; this core wraps every call in `tokio::time::timeout`
    /// regardless, per the external-I/O contract in §5.
    async fn batch_position(
        &self,
        sat_ids: &[SatelliteId],
        t: f64,
        observer: Option<Observer>,
    ) -> Result<HashMap<SatelliteId, PositionOutcome>>;

    /// Resolves a NORAD numeric id, spacecraft name, or catalog id to the
    /// canonical id used everywhere else in this core. Never invents ids:
    /// an unresolvable identifier is `Ok(None)`, not a guess.
    async fn resolve_satellite_id(&self, identifier: &str) -> Result<Option<SatelliteId>>;
}
