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

//! Shared data model (§3): the records that flow between components.
//! Every type here is a plain tagged record rather than a dynamic payload —
//! the one deliberate exception is [`Extras`], used for optional telemetry
//! that genuinely has no fixed shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type UeId = String;
pub type SatelliteId = String;
pub type HandlerId = u64;
pub type EventId = u64;

/// Scalar bag for optional telemetry that does not warrant its own field.
/// Never used to carry meaning that belongs in a typed field.
pub type Extras = BTreeMap<String, f64>;

/// A NORAD catalog number or a `STARLINK-`-prefixed mission designator.
/// Anything else is rejected at the `PositionProvider` boundary (§3.1).
pub fn is_valid_satellite_id(id: &str) -> bool {
    if id.len() == 5 && id.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if let Some(rest) = id.strip_prefix("STARLINK-") {
        return !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit());
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessStrategy {
    Flexible,
    Consistent,
}

/// One record per known UE (§3 AccessInfo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessInfo {
    pub ue_id: UeId,
    pub satellite_id: SatelliteId,
    pub next_satellite_id: Option<SatelliteId>,
    pub handover_instant_s: Option<f64>,
    pub last_update_s: f64,
    pub access_quality: f64,
    pub prediction_confidence: f64,
}

impl AccessInfo {
    /// Invariant: if `next_satellite_id` is set, `handover_instant_s` must be
    /// set and lie in `(now, now + delta_t_max)`.
    pub fn check_invariant(&self, now: f64, delta_t_max: f64) -> bool {
        match (&self.next_satellite_id, self.handover_instant_s) {
            (Some(_), Some(t)) => t > now && t < now + delta_t_max,
            (None, _) => true,
            (Some(_), None) => false,
        }
    }
}

/// Per-UE policy and last-known state (§3 UEAccessProfile).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UeAccessProfile {
    pub ue_id: UeId,
    pub strategy: AccessStrategy,
    pub position: crate::geo::GeoPoint,
    pub current_satellite: SatelliteId,
}

/// A satellite's instantaneous state, valid for one prediction tick (§3
/// SatelliteInfo(t)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteInfo {
    pub satellite_id: SatelliteId,
    pub position: crate::geo::GeoPoint,
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
    pub velocity_km_s: f64,
    pub heading_deg: f64,
    pub visible: bool,
    pub coverage_radius_km: f64,
}

/// A rectangular tile of the global block grid plus the satellites
/// currently covering it (§3 GeographicBlock).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographicBlock {
    pub block_id: u64,
    pub rect: crate::geo::GeoRect,
    pub covering_satellites: Vec<SatelliteId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Synchronized,
    Synchronizing,
    Desynchronized,
    Error,
}

/// Four-plane timestamp tuple plus accuracy/drift bookkeeping (§3 SyncPoint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPoint {
    pub access_net_s: f64,
    pub core_net_s: f64,
    pub satellite_net_s: f64,
    pub ground_station_s: f64,
    pub accuracy_ms: f64,
    pub drift_rate_ms_per_hr: f64,
    pub state: SyncState,
}

impl SyncPoint {
    pub fn synchronized_at(t: f64) -> Self {
        SyncPoint {
            access_net_s: t,
            core_net_s: t,
            satellite_net_s: t,
            ground_station_s: t,
            accuracy_ms: 0.0,
            drift_rate_ms_per_hr: 0.0,
            state: SyncState::Synchronized,
        }
    }
}

/// Per-plane signed offset (ms) relative to a reference clock (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ClockOffsets {
    pub access_net_ms: f64,
    pub core_net_ms: f64,
    pub satellite_net_ms: f64,
    pub ground_station_ms: f64,
}

/// A single bracketing step recorded for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinarySearchStep {
    pub t_start: f64,
    pub t_end: f64,
    pub t_mid: f64,
}

/// In-flight binary search bookkeeping (§3 BinarySearchState).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinarySearchState {
    pub ue_id: UeId,
    pub source_satellite: SatelliteId,
    pub target_satellite: SatelliteId,
    pub t_start: f64,
    pub t_end: f64,
    pub t_mid: f64,
    pub error_ms: f64,
    pub iterations: u32,
    pub max_iterations: u32,
    pub precision_s: f64,
    pub converged: bool,
    pub history: Vec<BinarySearchStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum Scheme {
    Baseline,
    GsAssisted,
    SmnAssisted,
    Proposed,
}

impl Scheme {
    pub const ALL: [Scheme; 4] =
        [Scheme::Baseline, Scheme::GsAssisted, Scheme::SmnAssisted, Scheme::Proposed];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandoverResult {
    Success,
    Failure,
    Timeout,
    Partial,
}

/// One completed (or failed) handover (§3 HandoverEvent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoverEvent {
    pub id: u64,
    pub ue_id: UeId,
    pub source_gnb: String,
    pub target_gnb: String,
    pub scheme: Scheme,
    pub start_s: f64,
    pub end_s: f64,
    pub latency_ms: f64,
    pub result: HandoverResult,
    pub extras: Extras,
}

/// Lazily-recomputed per-scheme latency statistics (§3 SchemeStats).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SchemeStats {
    pub count: usize,
    pub success_count: usize,
    pub mean_ms: f64,
    pub stddev_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    PaperOnly,
    EnhancedOnly,
    Hybrid,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    pub const ALL_HIGHEST_FIRST: [Priority; 4] =
        [Priority::Critical, Priority::High, Priority::Normal, Priority::Low];
}

/// A message on the event bus (§3 Event (bus)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: EventId,
    pub event_type: String,
    pub source: String,
    pub priority: Priority,
    pub sequence: u64,
    pub timestamp_s: f64,
    pub payload: Extras,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub ttl_s: Option<f64>,
}

impl BusEvent {
    pub fn is_expired(&self, now_s: f64) -> bool {
        match self.ttl_s {
            Some(ttl) => self.timestamp_s + ttl < now_s,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satellite_id_validation_accepts_norad_and_starlink() {
        assert!(is_valid_satellite_id("44714"));
        assert!(is_valid_satellite_id("STARLINK-1007"));
        assert!(!is_valid_satellite_id("sat-A"));
        assert!(!is_valid_satellite_id("4471"));
        assert!(!is_valid_satellite_id("STARLINK-"));
    }

    #[test]
    fn access_info_invariant_requires_paired_fields() {
        let mut info = AccessInfo {
            ue_id: "ue-1".into(),
            satellite_id: "44714".into(),
            next_satellite_id: Some("44715".into()),
            handover_instant_s: None,
            last_update_s: 0.0,
            access_quality: 0.5,
            prediction_confidence: 0.5,
        };
        assert!(!info.check_invariant(100.0, 5.0));
        info.handover_instant_s = Some(102.0);
        assert!(info.check_invariant(100.0, 5.0));
    }

    #[test]
    fn priority_ordering_is_highest_first() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }
}
