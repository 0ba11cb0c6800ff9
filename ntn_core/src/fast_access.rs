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

//! C3 — FastAccessPredictor (Algorithm-2): geographic-block partitioning so
//! that predicting A(t) for every UE avoids an O(|U|·|S|) scan over the
//! whole constellation.

use std::collections::HashMap;
use std::sync::Mutex;

use ntn_common::geo::{km_to_deg, GeoRect};
use ntn_common::model::{AccessStrategy, GeographicBlock, SatelliteId, UeAccessProfile, UeId};
use ntn_common::{CoreError, Result};
use tracing::{debug, warn};

use crate::position_provider::{Observer, PositionOutcome, PositionProvider};
use crate::scorer::select_best;
use ntn_common::config::ScorerWeights;
use ntn_common::model::SatelliteInfo;

/// (lat_block_index, lon_block_index)
type BlockKey = (i64, i64);

fn block_key(lat_deg: f64, lon_deg: f64, block_size_deg: f64) -> BlockKey {
    let lat_idx = ((lat_deg + 90.0) / block_size_deg).floor() as i64;
    let lon_idx = ((lon_deg + 180.0) / block_size_deg).floor() as i64;
    (lat_idx, lon_idx)
}

fn block_rect(key: BlockKey, block_size_deg: f64) -> GeoRect {
    let lat_min = key.0 as f64 * block_size_deg - 90.0;
    let lon_min = key.1 as f64 * block_size_deg - 180.0;
    GeoRect { lat_min, lat_max: lat_min + block_size_deg, lon_min, lon_max: lon_min + block_size_deg }
}

fn neighbourhood(key: BlockKey) -> [BlockKey; 9] {
    let (la, lo) = key;
    [
        (la, lo), (la, lo + 1), (la, lo - 1),
        (la + 1, lo), (la + 1, lo + 1), (la + 1, lo - 1),
        (la - 1, lo), (la - 1, lo + 1), (la - 1, lo - 1),
    ]
}

/// Availability predicate used to decide whether a Flexible UE's current
/// satellite "is still available": visible and at or above the min
/// elevation threshold.
pub fn is_available(sat: &SatelliteInfo, min_elevation_deg: f64) -> bool {
    sat.visible && sat.elevation_deg >= min_elevation_deg
}

struct Grid {
    block_size_deg: f64,
    blocks: HashMap<BlockKey, GeographicBlock>,
}

/// Outcome of a single `predict` call, including the diagnostics the
/// boundary tests in §8 check for (global scan fallback, stale flag).
#[derive(Debug, Clone, Default)]
pub struct PredictOutcome {
    pub assignment: HashMap<UeId, SatelliteId>,
    pub used_global_scan_for: Vec<UeId>,
    pub stale: bool,
}

pub struct FastAccessPredictor {
    block_size_deg: f64,
    min_elevation_deg: f64,
    weights: ScorerWeights,
    profiles: Mutex<HashMap<UeId, UeAccessProfile>>,
    grid: Mutex<Option<Grid>>,
    last_assignment: Mutex<HashMap<UeId, SatelliteId>>,
    next_block_id: Mutex<u64>,
}

impl FastAccessPredictor {
    pub fn new(block_size_deg: f64, min_elevation_deg: f64, weights: ScorerWeights) -> Self {
        FastAccessPredictor {
            block_size_deg,
            min_elevation_deg,
            weights,
            profiles: Mutex::new(HashMap::new()),
            grid: Mutex::new(None),
            last_assignment: Mutex::new(HashMap::new()),
            next_block_id: Mutex::new(0),
        }
    }

    /// Idempotent: registering the same UE twice leaves state unchanged
    /// beyond the overwrite (§8 round-trip property).
    pub fn register_ue(&self, profile: UeAccessProfile) {
        self.profiles.lock().unwrap().insert(profile.ue_id.clone(), profile);
    }

    pub fn update_strategy(&self, ue_id: &str, strategy: AccessStrategy) -> Result<()> {
        let mut profiles = self.profiles.lock().unwrap();
        match profiles.get_mut(ue_id) {
            Some(p) => {
                p.strategy = strategy;
                Ok(())
            }
            None => Err(CoreError::invalid_input(format!("unknown ue {ue_id}"))),
        }
    }

    fn rebuild_grid_if_needed(&self, satellites: &[SatelliteInfo]) {
        let mut grid_guard = self.grid.lock().unwrap();
        let needs_new_grid = match grid_guard.as_ref() {
            Some(g) => (g.block_size_deg - self.block_size_deg).abs() > f64::EPSILON,
            None => true,
        };
        if needs_new_grid {
            *grid_guard = Some(Grid { block_size_deg: self.block_size_deg, blocks: HashMap::new() });
        }
        let grid = grid_guard.as_mut().unwrap();
        grid.blocks.clear();

        let mut next_id = self.next_block_id.lock().unwrap();
        for sat in satellites {
            let radius_deg = km_to_deg(sat.coverage_radius_km).max(0.0);
            let lat_span = ((radius_deg / self.block_size_deg).ceil() as i64).max(1);
            let lon_span = ((radius_deg / self.block_size_deg).ceil() as i64).max(1);
            let center_key = block_key(sat.position.lat_deg, sat.position.lon_deg, self.block_size_deg);

            for dlat in -lat_span..=lat_span {
                for dlon in -lon_span..=lon_span {
                    let key = (center_key.0 + dlat, center_key.1 + dlon);
                    let rect = block_rect(key, self.block_size_deg);
                    let center = rect.center();
                    if center.haversine_distance_km(&sat.position) <= sat.coverage_radius_km {
                        let entry = grid.blocks.entry(key).or_insert_with(|| {
                            *next_id += 1;
                            GeographicBlock { block_id: *next_id, rect, covering_satellites: Vec::new() }
                        });
                        if !entry.covering_satellites.contains(&sat.satellite_id) {
                            entry.covering_satellites.push(sat.satellite_id.clone());
                        }
                    }
                }
            }
        }
    }

    fn candidates_for(&self, ue_lat: f64, ue_lon: f64) -> Vec<SatelliteId> {
        let grid_guard = self.grid.lock().unwrap();
        let grid = match grid_guard.as_ref() {
            Some(g) => g,
            None => return Vec::new(),
        };
        let center_key = block_key(ue_lat, ue_lon, self.block_size_deg);
        let mut ids = Vec::new();
        for key in neighbourhood(center_key) {
            if let Some(block) = grid.blocks.get(&key) {
                for id in &block.covering_satellites {
                    if !ids.contains(id) {
                        ids.push(id.clone());
                    }
                }
            }
        }
        ids
    }

    fn observer_for(profile: &UeAccessProfile) -> Observer {
        Observer {
            lon_deg: profile.position.lon_deg,
            lat_deg: profile.position.lat_deg,
            alt_m: profile.position.alt_m,
        }
    }

    /// Queries `provider` for `ids` relative to `observer` and turns each
    /// `Ok` outcome into a `SatelliteInfo` with UE-relative elevation,
    /// azimuth, range and visibility (§4.1: scoring inputs are always
    /// computed against the requesting UE's position, never a global
    /// default). Ground-track position and coverage radius come from
    /// `ground`, since those don't depend on the observer.
    async fn observer_relative_view(
        &self,
        provider: &dyn PositionProvider,
        ids: &[SatelliteId],
        t: f64,
        observer: Observer,
        ground: &HashMap<SatelliteId, SatelliteInfo>,
    ) -> Result<Vec<SatelliteInfo>> {
        let outcomes = provider.batch_position(ids, t, Some(observer)).await?;
        Ok(ids
            .iter()
            .filter_map(|id| match outcomes.get(id) {
                Some(PositionOutcome::Ok(sample)) => {
                    let position = ground.get(id).map(|g| g.position).unwrap_or_else(|| {
                        ntn_common::geo::GeoPoint::new(sample.lon_deg, sample.lat_deg, sample.alt_km * 1000.0)
                    });
                    let coverage_radius_km = ground.get(id).map(|g| g.coverage_radius_km).unwrap_or(0.0);
                    Some(SatelliteInfo {
                        satellite_id: id.clone(),
                        position,
                        elevation_deg: sample.elevation_deg.unwrap_or(0.0),
                        azimuth_deg: sample.azimuth_deg.unwrap_or(0.0),
                        range_km: sample.range_km.unwrap_or(f64::INFINITY),
                        velocity_km_s: sample.velocity_km_s,
                        heading_deg: sample.heading_deg,
                        visible: sample.visible,
                        coverage_radius_km,
                    })
                }
                _ => None,
            })
            .collect())
    }

    /// Main call: `A(t)` for the whole UE set known to this predictor
    /// (Algorithm-2, §4.2).
    pub async fn predict(
        &self,
        provider: &dyn PositionProvider,
        satellite_ids: &[SatelliteId],
        t: f64,
    ) -> Result<PredictOutcome> {
        // A ground-truth snapshot, observer-independent: sub-satellite point
        // and coverage radius don't change with who's looking. Used only to
        // build the block grid, never to score a candidate for a UE.
        let ground_outcomes = provider.batch_position(satellite_ids, t, None).await;
        let ground_outcomes = match ground_outcomes {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, "position provider failed entirely, returning stale assignment");
                return Ok(PredictOutcome {
                    assignment: self.last_assignment.lock().unwrap().clone(),
                    used_global_scan_for: Vec::new(),
                    stale: true,
                });
            }
        };

        let ground: HashMap<SatelliteId, SatelliteInfo> = satellite_ids
            .iter()
            .filter_map(|id| match ground_outcomes.get(id) {
                Some(PositionOutcome::Ok(sample)) => Some((
                    id.clone(),
                    SatelliteInfo {
                        satellite_id: id.clone(),
                        position: ntn_common::geo::GeoPoint::new(
                            sample.lon_deg,
                            sample.lat_deg,
                            sample.alt_km * 1000.0,
                        ),
                        elevation_deg: 90.0,
                        azimuth_deg: 0.0,
                        range_km: sample.alt_km,
                        velocity_km_s: sample.velocity_km_s,
                        heading_deg: sample.heading_deg,
                        visible: true,
                        coverage_radius_km: ntn_common::geo::coverage_radius_km(
                            sample.alt_km,
                            self.min_elevation_deg,
                        ),
                    },
                )),
                _ => None,
            })
            .collect();

        self.rebuild_grid_if_needed(&ground.values().cloned().collect::<Vec<_>>());

        let profiles = self.profiles.lock().unwrap().clone();
        let mut assignment = HashMap::new();
        let mut candidates: Vec<&UeAccessProfile> = Vec::new();

        for profile in profiles.values() {
            if profile.strategy == AccessStrategy::Flexible {
                let observer = Self::observer_for(profile);
                let current_ids = [profile.current_satellite.clone()];
                match self.observer_relative_view(provider, &current_ids, t, observer, &ground).await {
                    Ok(sats) => {
                        if let Some(current) = sats.first() {
                            if is_available(current, self.min_elevation_deg) {
                                assignment.insert(profile.ue_id.clone(), profile.current_satellite.clone());
                                continue;
                            }
                        }
                    }
                    Err(e) => warn!(ue = %profile.ue_id, error = %e, "current-satellite lookup failed"),
                }
            }
            candidates.push(profile);
        }

        let mut used_global_scan_for = Vec::new();
        for profile in candidates {
            let observer = Self::observer_for(profile);
            let local_ids = self.candidates_for(profile.position.lat_deg, profile.position.lon_deg);
            let (ids, is_global_scan) =
                if !local_ids.is_empty() { (local_ids, false) } else { (satellite_ids.to_vec(), true) };

            let sats = match self.observer_relative_view(provider, &ids, t, observer, &ground).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(ue = %profile.ue_id, error = %e, "candidate lookup failed, leaving ue unassigned this tick");
                    continue;
                }
            };
            let current_heading = sats.iter().find(|s| s.satellite_id == profile.current_satellite).map(|s| s.heading_deg);

            if is_global_scan {
                used_global_scan_for.push(profile.ue_id.clone());
            }
            if let Some((best, _score)) = select_best(sats.iter(), current_heading, &self.weights) {
                assignment.insert(profile.ue_id.clone(), best.satellite_id.clone());
            }
        }

        if !used_global_scan_for.is_empty() {
            debug!(count = used_global_scan_for.len(), "fell back to global scan");
        }

        *self.last_assignment.lock().unwrap() = assignment.clone();
        Ok(PredictOutcome { assignment, used_global_scan_for, stale: false })
    }

    /// The position a registered UE last reported, if any. Used by C4 to
    /// query C1 with the correct observer rather than defaulting to a
    /// global, UE-invariant view (§4.1).
    pub fn ue_position(&self, ue_id: &str) -> Option<ntn_common::geo::GeoPoint> {
        self.profiles.lock().unwrap().get(ue_id).map(|p| p.position)
    }

    /// An arbitrary registered UE's position, used as a stand-in regional
    /// observer when a call needs "the UE's region" but isn't scoped to one
    /// particular UE (e.g. C4's regional candidate filter). `None` once no
    /// UE has registered yet.
    pub fn any_registered_observer(&self) -> Option<Observer> {
        self.profiles.lock().unwrap().values().next().map(Self::observer_for)
    }

    /// Restricted variant used by C4's binary search: only considers the
    /// two satellites named, regardless of geographic blocking.
    pub fn best_of_two(
        &self,
        source: &SatelliteInfo,
        target: &SatelliteInfo,
        current_heading_deg: Option<f64>,
    ) -> Option<SatelliteId> {
        select_best([source, target], current_heading_deg, &self.weights).map(|(s, _)| s.satellite_id.clone())
    }
}
