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

//! C2 — AccessScorer. A pure, deterministic function from
//! (satellite state, UE position, optional current satellite heading) to a
//! score in `[0, 100]`. No hidden RNG, no I/O: identical inputs always
//! produce bit-identical outputs (§8 invariant 4).

use ntn_common::angle::heading_delta;
use ntn_common::config::ScorerWeights;
use ntn_common::model::SatelliteInfo;

const MIN_SERVICE_ELEVATION_DEG: f64 = 10.0;
const DISTANCE_FULL_SCORE_KM: f64 = 400.0;
const DISTANCE_ZERO_SCORE_KM: f64 = 2000.0;
const ELEVATION_ZERO_DEG: f64 = 10.0;
const ELEVATION_FULL_DEG: f64 = 90.0;
/// Reference coverage radius a satellite needs to reach a stability score
/// of 100 (generous LEO coverage upper bound, not a hard physical limit).
const STABILITY_REFERENCE_RADIUS_KM: f64 = 2000.0;

/// Breakdown of a single scoring call, useful for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub distance: f64,
    pub elevation: f64,
    pub stability: f64,
    pub direction: f64,
    pub total: f64,
}

fn clamp_0_100(v: f64) -> f64 {
    v.clamp(0.0, 100.0)
}

fn distance_score(range_km: f64) -> f64 {
    if !range_km.is_finite() {
        return 0.0;
    }
    if range_km <= DISTANCE_FULL_SCORE_KM {
        return 100.0;
    }
    if range_km >= DISTANCE_ZERO_SCORE_KM {
        return 0.0;
    }
    let span = DISTANCE_ZERO_SCORE_KM - DISTANCE_FULL_SCORE_KM;
    clamp_0_100(100.0 * (DISTANCE_ZERO_SCORE_KM - range_km) / span)
}

fn elevation_score(elevation_deg: f64) -> f64 {
    if !elevation_deg.is_finite() {
        return 0.0;
    }
    if elevation_deg <= ELEVATION_ZERO_DEG {
        return 0.0;
    }
    if elevation_deg >= ELEVATION_FULL_DEG {
        return 100.0;
    }
    let span = ELEVATION_FULL_DEG - ELEVATION_ZERO_DEG;
    clamp_0_100(100.0 * (elevation_deg - ELEVATION_ZERO_DEG) / span)
}

fn stability_score(coverage_radius_km: f64) -> f64 {
    if !coverage_radius_km.is_finite() || coverage_radius_km <= 0.0 {
        return 0.0;
    }
    clamp_0_100(100.0 * coverage_radius_km / STABILITY_REFERENCE_RADIUS_KM)
}

fn direction_score(
    candidate_heading_deg: f64,
    current_heading_deg: Option<f64>,
    window_deg: f64,
) -> f64 {
    match current_heading_deg {
        None => 0.0,
        Some(current) => {
            let delta = heading_delta(candidate_heading_deg, current);
            if delta <= window_deg {
                clamp_0_100(100.0 * (1.0 - delta / window_deg))
            } else {
                0.0
            }
        }
    }
}

/// Scores `candidate` for a UE, given the heading of its current serving
/// satellite (if any). Invalid inputs (NaN, missing elevation data encoded
/// as non-finite) score 0 rather than raising (§4.1 Failure).
pub fn score_access(
    candidate: &SatelliteInfo,
    current_heading_deg: Option<f64>,
    weights: &ScorerWeights,
) -> ScoreBreakdown {
    if !candidate.visible || candidate.elevation_deg < MIN_SERVICE_ELEVATION_DEG {
        return ScoreBreakdown { distance: 0.0, elevation: 0.0, stability: 0.0, direction: 0.0, total: 0.0 };
    }
    if !candidate.range_km.is_finite() || !candidate.elevation_deg.is_finite() {
        return ScoreBreakdown { distance: 0.0, elevation: 0.0, stability: 0.0, direction: 0.0, total: 0.0 };
    }

    let distance = distance_score(candidate.range_km);
    let elevation = elevation_score(candidate.elevation_deg);
    let stability = stability_score(candidate.coverage_radius_km);
    let direction =
        direction_score(candidate.heading_deg, current_heading_deg, weights.heading_bonus_window_deg);

    let total = clamp_0_100(
        weights.distance * distance
            + weights.elevation * elevation
            + weights.stability * stability
            + weights.direction * direction,
    );

    ScoreBreakdown { distance, elevation, stability, direction, total }
}

/// Selects the best-scoring satellite among `candidates`, tie-breaking on
/// the lexicographically smaller id, then applying the direction-bonus
/// near-tie preference from Algorithm-2 step 5c when two candidates are
/// within `direction_tie_margin_pct` of each other.
pub fn select_best<'a>(
    candidates: impl IntoIterator<Item = &'a SatelliteInfo>,
    current_heading_deg: Option<f64>,
    weights: &ScorerWeights,
) -> Option<(&'a SatelliteInfo, ScoreBreakdown)> {
    let mut scored: Vec<(&SatelliteInfo, ScoreBreakdown)> = candidates
        .into_iter()
        .map(|sat| (sat, score_access(sat, current_heading_deg, weights)))
        .collect();

    scored.sort_by(|a, b| {
        b.1.total
            .partial_cmp(&a.1.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.satellite_id.cmp(&b.0.satellite_id))
    });

    let best = scored.first().copied()?;
    if scored.len() == 1 {
        return Some(best);
    }

    let margin = weights.direction_tie_margin_pct;
    let near_ties: Vec<&(&SatelliteInfo, ScoreBreakdown)> = scored
        .iter()
        .take_while(|(_, b)| best.1.total - b.total <= margin)
        .collect();

    if near_ties.len() <= 1 {
        return Some(best);
    }

    match current_heading_deg {
        None => Some(best),
        Some(current) => near_ties
            .into_iter()
            .min_by(|a, b| {
                let da = heading_delta(a.0.heading_deg, current);
                let db = heading_delta(b.0.heading_deg, current);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.satellite_id.cmp(&b.0.satellite_id))
            })
            .copied(),
    }
}
