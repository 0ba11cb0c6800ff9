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

//! Angle normalization helpers shared by the geographic block grid and the
//! access scorer's heading comparison.

/// Wraps a longitude-like angle into (-180, 180].
pub fn normalize_180(deg: f64) -> f64 {
    let mut d = deg % 360.0;
    if d <= -180.0 {
        d += 360.0;
    } else if d > 180.0 {
        d -= 360.0;
    }
    d
}

/// Wraps a heading-like angle into [0, 360).
pub fn normalize_360(deg: f64) -> f64 {
    let d = deg % 360.0;
    if d < 0.0 {
        d + 360.0
    } else {
        d
    }
}

/// Clamps a latitude-like angle into [-90, 90].
pub fn clamp_90(deg: f64) -> f64 {
    deg.clamp(-90.0, 90.0)
}

/// Smallest absolute difference between two headings, in [0, 180].
pub fn heading_delta(a_deg: f64, b_deg: f64) -> f64 {
    let diff = (normalize_360(a_deg) - normalize_360(b_deg)).abs();
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_longitude() {
        assert!((normalize_180(200.0) - (-160.0)).abs() < 1e-9);
        assert!((normalize_180(-200.0) - 160.0).abs() < 1e-9);
    }

    #[test]
    fn heading_delta_wraps_around_north() {
        assert!((heading_delta(350.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((heading_delta(10.0, 350.0) - 20.0).abs() < 1e-9);
    }
}
