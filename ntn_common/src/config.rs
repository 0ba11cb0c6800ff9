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

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Scoring weights and tunable windows for the access scorer (C2).
/// Kept out of the scorer itself per the Open Question on tunable constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerWeights {
    pub distance: f64,
    pub elevation: f64,
    pub stability: f64,
    pub direction: f64,
    pub heading_bonus_window_deg: f64,
    pub direction_tie_margin_pct: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        ScorerWeights {
            distance: 0.40,
            elevation: 0.30,
            stability: 0.20,
            direction: 0.10,
            heading_bonus_window_deg: 30.0,
            direction_tie_margin_pct: 5.0,
        }
    }
}

/// The integration mode the bridge (C6) starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeConfig {
    PaperOnly,
    EnhancedOnly,
    Hybrid,
    Fallback,
}

impl Default for ModeConfig {
    fn default() -> Self {
        ModeConfig::Hybrid
    }
}

/// Process-wide configuration, loaded once at start. Every field carries the
/// default called out in the configuration surface; `#[serde(default)]` means
/// a partial RON document only needs to specify the fields it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub delta_t_s: f64,
    pub binary_search_precision_s: f64,
    pub block_size_deg: f64,
    pub max_candidate_satellites: usize,
    pub min_elevation_deg: f64,
    pub candidate_min_elevation_deg: f64,
    pub two_point_delta_minutes: f64,
    pub sync_interval_s: f64,
    pub max_clock_drift_ms: f64,
    pub target_sync_accuracy_ms: f64,
    pub mode: ModeConfig,
    pub fallback_timeout_s: f64,
    pub event_store_max: usize,
    pub event_worker_count: usize,
    pub event_default_max_retries: u32,
    pub measurement_output_dir: String,
    pub scorer_weights: ScorerWeights,
    pub tick_period_ms: u64,
    pub max_consecutive_tick_failures: u32,
    pub shutdown_grace_s: f64,
    pub provider_call_timeout_s: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            delta_t_s: 5.0,
            binary_search_precision_s: 0.01,
            block_size_deg: 10.0,
            max_candidate_satellites: 5,
            min_elevation_deg: 10.0,
            candidate_min_elevation_deg: 30.0,
            two_point_delta_minutes: 2.0,
            sync_interval_s: 15.0,
            max_clock_drift_ms: 50.0,
            target_sync_accuracy_ms: 10.0,
            mode: ModeConfig::default(),
            fallback_timeout_s: 10.0,
            event_store_max: 10_000,
            event_worker_count: 4,
            event_default_max_retries: 3,
            measurement_output_dir: "./measurement_results".to_string(),
            scorer_weights: ScorerWeights::default(),
            tick_period_ms: 100,
            max_consecutive_tick_failures: 10,
            shutdown_grace_s: 5.0,
            provider_call_timeout_s: 5.0,
        }
    }
}

impl CoreConfig {
    /// Loads a RON document from `path`. A missing or malformed file is a
    /// startup error, never silently ignored.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::invalid_input(format!("cannot read config {}: {e}", path.display()))
        })?;
        ron::from_str(&text)
            .map_err(|e| CoreError::invalid_input(format!("malformed config {}: {e}", path.display())))
    }

    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| CoreError::fatal(format!("cannot serialize config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_configuration_surface() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.delta_t_s, 5.0);
        assert_eq!(cfg.binary_search_precision_s, 0.01);
        assert_eq!(cfg.block_size_deg, 10.0);
        assert_eq!(cfg.max_candidate_satellites, 5);
        assert_eq!(cfg.event_store_max, 10_000);
    }

    #[test]
    fn partial_ron_falls_back_to_defaults() {
        let partial = "(delta_t_s: 7.5)";
        let cfg: CoreConfig = ron::from_str(partial).unwrap();
        assert_eq!(cfg.delta_t_s, 7.5);
        assert_eq!(cfg.block_size_deg, 10.0);
    }
}
