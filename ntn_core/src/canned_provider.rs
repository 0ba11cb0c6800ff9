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

//! A synthetic, deterministic [`PositionProvider`] for smoke-running the
//! binary and for tests, standing in for the SGP4/TLE source this core
//! deliberately does not implement (§1 Non-goals).

use std::collections::HashMap;

use async_trait::async_trait;
use ntn_common::angle::{normalize_180, normalize_360};
use ntn_common::geo::{elevation_from_range, GeoPoint};
use ntn_common::model::SatelliteId;
use ntn_common::Result;

use crate::position_provider::{Observer, PositionOutcome, PositionProvider, PositionSample};

/// A ground track approximated as a sinusoidal latitude oscillation plus
/// a steadily precessing longitude — close enough to a real LEO ground
/// track to exercise every C1-C8 code path without an SGP4 dependency.
#[derive(Debug, Clone, Copy)]
pub struct CannedSatellite {
    pub id_index: u32,
    pub period_s: f64,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub alt_km: f64,
    pub phase0_deg: f64,
}

impl CannedSatellite {
    fn id(&self) -> SatelliteId {
        format!("STARLINK-{}", 1000 + self.id_index)
    }

    fn ground_point(&self, t: f64) -> GeoPoint {
        let orbit_frac = t / self.period_s;
        let lat = self.inclination_deg * (2.0 * std::f64::consts::PI * orbit_frac + self.phase0_deg.to_radians()).sin();
        let lon = normalize_180(self.raan_deg + 360.0 * orbit_frac * 0.5);
        GeoPoint::new(lon, lat, self.alt_km * 1000.0)
    }

    fn heading_deg(&self, t: f64) -> f64 {
        let dt = 1.0;
        let p0 = self.ground_point(t);
        let p1 = self.ground_point(t + dt);
        normalize_360(p0.bearing_to(&p1))
    }
}

/// A constellation of [`CannedSatellite`]s, addressed by canonical
/// `STARLINK-` id.
pub struct CannedPositionProvider {
    satellites: Vec<CannedSatellite>,
}

impl CannedPositionProvider {
    /// Builds a `count`-satellite constellation on evenly spaced orbital
    /// planes, all at the same altitude.
    pub fn new_constellation(count: u32, alt_km: f64, period_s: f64, inclination_deg: f64) -> Self {
        let satellites = (0..count)
            .map(|i| CannedSatellite {
                id_index: i,
                period_s,
                inclination_deg,
                raan_deg: normalize_180((i as f64) * (360.0 / count as f64)),
                alt_km,
                phase0_deg: (i as f64) * (180.0 / count as f64),
            })
            .collect();
        CannedPositionProvider { satellites }
    }

    pub fn satellite_ids(&self) -> Vec<SatelliteId> {
        self.satellites.iter().map(|s| s.id()).collect()
    }

    fn find(&self, id: &str) -> Option<&CannedSatellite> {
        self.satellites.iter().find(|s| s.id() == id)
    }
}

#[async_trait]
impl PositionProvider for CannedPositionProvider {
    async fn batch_position(
        &self,
        sat_ids: &[SatelliteId],
        t: f64,
        observer: Option<Observer>,
    ) -> Result<HashMap<SatelliteId, PositionOutcome>> {
        let mut out = HashMap::with_capacity(sat_ids.len());
        for id in sat_ids {
            let Some(sat) = self.find(id) else {
                out.insert(id.clone(), PositionOutcome::Unavailable);
                continue;
            };
            let ground = sat.ground_point(t);
            let heading = sat.heading_deg(t);

            let (elevation_deg, azimuth_deg, range_km, visible) = match observer {
                Some(obs) => {
                    let obs_point = GeoPoint::new(obs.lon_deg, obs.lat_deg, obs.alt_m);
                    let ground_range_km = obs_point.haversine_distance_km(&ground);
                    let elevation = elevation_from_range(sat.alt_km, ground_range_km);
                    let azimuth = obs_point.bearing_to(&ground);
                    let slant_km = (sat.alt_km.powi(2) + ground_range_km.powi(2)).sqrt();
                    (Some(elevation), Some(azimuth), Some(slant_km), elevation >= 0.0)
                }
                None => (None, None, None, true),
            };

            let sample = PositionSample {
                lon_deg: ground.lon_deg,
                lat_deg: ground.lat_deg,
                alt_km: sat.alt_km,
                elevation_deg,
                azimuth_deg,
                range_km,
                velocity_km_s: 7.5,
                heading_deg: heading,
                visible,
            };
            out.insert(id.clone(), PositionOutcome::Ok(sample));
        }
        Ok(out)
    }

    async fn resolve_satellite_id(&self, identifier: &str) -> Result<Option<SatelliteId>> {
        Ok(self.find(identifier).map(|s| s.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_id_is_unavailable_not_an_error() {
        let provider = CannedPositionProvider::new_constellation(4, 550.0, 5400.0, 53.0);
        let ids = vec!["STARLINK-9999".to_string()];
        let out = provider.batch_position(&ids, 0.0, None).await.unwrap();
        assert_eq!(out.get("STARLINK-9999"), Some(&PositionOutcome::Unavailable));
    }

    #[tokio::test]
    async fn ground_track_is_deterministic() {
        let provider = CannedPositionProvider::new_constellation(2, 550.0, 5400.0, 53.0);
        let ids = provider.satellite_ids();
        let a = provider.batch_position(&ids, 100.0, None).await.unwrap();
        let b = provider.batch_position(&ids, 100.0, None).await.unwrap();
        assert_eq!(a.get(&ids[0]), b.get(&ids[0]));
    }
}
