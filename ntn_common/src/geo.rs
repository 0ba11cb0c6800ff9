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

//! Spherical geometry helpers: ground point representation, great-circle
//! distance, and the satellite visibility geometry used to turn an altitude
//! and a minimum-elevation constraint into a coverage radius.

use geo_types::Point;
use serde::{Deserialize, Serialize};

use crate::angle::{clamp_90, normalize_180};

pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A point on (or above) the Earth's surface. Plain f64 fields rather than
/// an alias-accepting deserializer: callers always speak lon/lat/alt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon_deg: f64,
    pub lat_deg: f64,
    pub alt_m: f64,
}

impl GeoPoint {
    pub fn new(lon_deg: f64, lat_deg: f64, alt_m: f64) -> Self {
        GeoPoint { lon_deg: normalize_180(lon_deg), lat_deg: clamp_90(lat_deg), alt_m }
    }

    pub fn as_point(&self) -> Point<f64> {
        Point::new(self.lon_deg, self.lat_deg)
    }

    /// Great-circle distance to `other`, in km, ignoring altitude.
    pub fn haversine_distance_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lon1) = (self.lat_deg.to_radians(), self.lon_deg.to_radians());
        let (lat2, lon2) = (other.lat_deg.to_radians(), other.lon_deg.to_radians());
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();
        EARTH_RADIUS_KM * c
    }

    /// Initial bearing from `self` to `other`, degrees in [0, 360).
    pub fn bearing_to(&self, other: &GeoPoint) -> f64 {
        let (lat1, lon1) = (self.lat_deg.to_radians(), self.lon_deg.to_radians());
        let (lat2, lon2) = (other.lat_deg.to_radians(), other.lon_deg.to_radians());
        let dlon = lon2 - lon1;
        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        crate::angle::normalize_360(y.atan2(x).to_degrees())
    }
}

/// Maximum ground-track central angle (degrees) at which a satellite at
/// `altitude_km` is visible above `min_elevation_deg`. Derived from the
/// standard Earth-central-angle visibility relation:
/// `lambda = acos( Re/(Re+h) * cos(e) ) - e`.
pub fn max_central_angle_deg(altitude_km: f64, min_elevation_deg: f64) -> f64 {
    let re = EARTH_RADIUS_KM;
    let e = min_elevation_deg.to_radians();
    let ratio = (re / (re + altitude_km)) * e.cos();
    let ratio = ratio.clamp(-1.0, 1.0);
    let lambda = ratio.acos() - e;
    lambda.to_degrees().max(0.0)
}

/// Ground coverage radius (km) of a satellite at `altitude_km`, i.e. the arc
/// length on the Earth's surface corresponding to `max_central_angle_deg`.
pub fn coverage_radius_km(altitude_km: f64, min_elevation_deg: f64) -> f64 {
    EARTH_RADIUS_KM * max_central_angle_deg(altitude_km, min_elevation_deg).to_radians()
}

/// Elevation angle (degrees) of a satellite at `altitude_km` as seen from a
/// ground point whose great-circle distance to the sub-satellite point is
/// `ground_range_km`. Inverse of the relation used in `max_central_angle_deg`.
pub fn elevation_from_range(altitude_km: f64, ground_range_km: f64) -> f64 {
    let re = EARTH_RADIUS_KM;
    let lambda = (ground_range_km / re).min(std::f64::consts::PI);
    if lambda <= 1e-12 {
        return 90.0;
    }
    let ratio_top = lambda.cos() - re / (re + altitude_km);
    let elevation = (ratio_top / lambda.sin()).atan();
    elevation.to_degrees()
}

/// Converts a great-circle arc length in km to the equivalent angular
/// extent in degrees, for bounding-box approximations of a coverage disc.
pub fn km_to_deg(km: f64) -> f64 {
    (km / EARTH_RADIUS_KM).to_degrees()
}

/// A rectangular tile on the lon/lat grid used by the geographic block
/// partition. Longitudes are stored already normalized to (-180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoRect {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl GeoRect {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new((self.lon_min + self.lon_max) / 2.0, (self.lat_min + self.lat_max) / 2.0, 0.0)
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        p.lat_deg >= self.lat_min
            && p.lat_deg < self.lat_max
            && p.lon_deg >= self.lon_min
            && p.lon_deg < self.lon_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_for_identical_points() {
        let p = GeoPoint::new(120.67, 24.15, 100.0);
        assert!(p.haversine_distance_km(&p) < 1e-9);
    }

    #[test]
    fn coverage_radius_grows_with_altitude() {
        let low = coverage_radius_km(550.0, 10.0);
        let high = coverage_radius_km(1200.0, 10.0);
        assert!(high > low);
    }

    #[test]
    fn elevation_is_ninety_directly_overhead() {
        let e = elevation_from_range(550.0, 0.0);
        assert!((e - 90.0).abs() < 1e-6);
    }

    #[test]
    fn elevation_decreases_with_range() {
        let near = elevation_from_range(550.0, 100.0);
        let far = elevation_from_range(550.0, 1500.0);
        assert!(near > far);
    }
}
