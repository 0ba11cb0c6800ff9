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

//! C7 — MeasurementCore: an append-only handover event log plus lazily
//! recomputed per-scheme statistics and a Proposed-vs-Baseline comparison.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use ntn_common::model::{HandoverEvent, HandoverResult, Scheme, SchemeStats};
use ntn_common::{CoreError, Result};
use tracing::warn;

const BASELINE_LATENCY_TARGET_MS: f64 = 250.0;
const PROPOSED_LATENCY_TARGET_MS: f64 = 25.0;
const PROPOSED_SUCCESS_RATE_TARGET: f64 = 0.95;
const PROPOSED_MIN_EVENTS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct CompareReport {
    pub baseline_mean_ms: f64,
    pub proposed_mean_ms: f64,
    pub latency_reduction_pct: f64,
    pub success_rate_delta: f64,
    pub baseline_meets_target: bool,
    pub proposed_meets_target: bool,
    pub overall_reproduction_success: bool,
}

fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

fn compute_stats(events: &[&HandoverEvent]) -> SchemeStats {
    if events.is_empty() {
        return SchemeStats::default();
    }
    let mut latencies: Vec<f64> = events.iter().map(|e| e.latency_ms).collect();
    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let count = latencies.len();
    let success_count = events.iter().filter(|e| e.result == HandoverResult::Success).count();
    let mean = latencies.iter().sum::<f64>() / count as f64;
    let variance = if count > 1 {
        latencies.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64
    } else {
        0.0
    };

    SchemeStats {
        count,
        success_count,
        mean_ms: mean,
        stddev_ms: variance.sqrt(),
        min_ms: latencies[0],
        max_ms: latencies[count - 1],
        p95_ms: percentile(&latencies, 95.0),
        p99_ms: percentile(&latencies, 99.0),
        success_rate: success_count as f64 / count as f64,
    }
}

pub struct MeasurementCore {
    events: RwLock<Vec<HandoverEvent>>,
    cache: RwLock<Option<HashMap<Scheme, SchemeStats>>>,
    next_id: RwLock<u64>,
    output_dir: String,
}

impl MeasurementCore {
    pub fn new(output_dir: impl Into<String>) -> Self {
        MeasurementCore {
            events: RwLock::new(Vec::new()),
            cache: RwLock::new(None),
            next_id: RwLock::new(1),
            output_dir: output_dir.into(),
        }
    }

    /// Append-only. Flips the stats invalidation bit rather than
    /// recomputing eagerly (§4.6).
    pub fn record(&self, mut event: HandoverEvent) -> u64 {
        let mut next_id = self.next_id.write().unwrap();
        event.id = *next_id;
        *next_id += 1;
        drop(next_id);

        self.events.write().unwrap().push(event.clone());
        *self.cache.write().unwrap() = None;
        event.id
    }

    pub fn event_count(&self) -> usize {
        self.events.read().unwrap().len()
    }

    pub fn events_snapshot(&self) -> Vec<HandoverEvent> {
        self.events.read().unwrap().clone()
    }

    /// `Analyse`: recomputes per-scheme stats unless a valid cache exists
    /// and `force_refresh` is false.
    pub fn analyse(&self, force_refresh: bool) -> HashMap<Scheme, SchemeStats> {
        if !force_refresh {
            if let Some(cached) = self.cache.read().unwrap().as_ref() {
                return cached.clone();
            }
        }
        let events = self.events.read().unwrap();
        let mut by_scheme: HashMap<Scheme, SchemeStats> = HashMap::new();
        for scheme in Scheme::ALL {
            let matching: Vec<&HandoverEvent> = events.iter().filter(|e| e.scheme == scheme).collect();
            by_scheme.insert(scheme, compute_stats(&matching));
        }
        *self.cache.write().unwrap() = Some(by_scheme.clone());
        by_scheme
    }

    /// Latency and success-rate deltas of Proposed vs Baseline (§4.6).
    pub fn compare_report(&self) -> CompareReport {
        let stats = self.analyse(false);
        let baseline = stats.get(&Scheme::Baseline).copied().unwrap_or_default();
        let proposed = stats.get(&Scheme::Proposed).copied().unwrap_or_default();

        let latency_reduction_pct = if baseline.mean_ms > 0.0 {
            100.0 * (baseline.mean_ms - proposed.mean_ms) / baseline.mean_ms
        } else {
            0.0
        };

        let baseline_meets_target = baseline.mean_ms > 0.0 && baseline.mean_ms <= BASELINE_LATENCY_TARGET_MS;
        let proposed_meets_target = proposed.mean_ms > 0.0
            && proposed.mean_ms <= PROPOSED_LATENCY_TARGET_MS
            && proposed.success_rate >= PROPOSED_SUCCESS_RATE_TARGET
            && proposed.count >= PROPOSED_MIN_EVENTS;

        CompareReport {
            baseline_mean_ms: baseline.mean_ms,
            proposed_mean_ms: proposed.mean_ms,
            latency_reduction_pct,
            success_rate_delta: proposed.success_rate - baseline.success_rate,
            baseline_meets_target,
            proposed_meets_target,
            overall_reproduction_success: proposed_meets_target,
        }
    }

    fn resolve_output_dir(&self) -> std::path::PathBuf {
        let configured = Path::new(&self.output_dir);
        if std::fs::create_dir_all(configured).is_ok() {
            configured.to_path_buf()
        } else {
            warn!(dir = %self.output_dir, "measurement output dir not writable, falling back to temp dir");
            std::env::temp_dir()
        }
    }

    /// Exports the full event list, stats, and comparison report as JSON.
    pub fn export_json(&self) -> Result<std::path::PathBuf> {
        let dir = self.resolve_output_dir();
        let path = dir.join("measurement_snapshot.json");
        #[derive(serde::Serialize)]
        struct Snapshot {
            events: Vec<HandoverEvent>,
            stats: HashMap<Scheme, SchemeStats>,
            report: CompareReportJson,
        }
        #[derive(serde::Serialize)]
        struct CompareReportJson {
            baseline_mean_ms: f64,
            proposed_mean_ms: f64,
            latency_reduction_pct: f64,
            success_rate_delta: f64,
            overall_reproduction_success: bool,
        }
        let report = self.compare_report();
        let snapshot = Snapshot {
            events: self.events_snapshot(),
            stats: self.analyse(false),
            report: CompareReportJson {
                baseline_mean_ms: report.baseline_mean_ms,
                proposed_mean_ms: report.proposed_mean_ms,
                latency_reduction_pct: report.latency_reduction_pct,
                success_rate_delta: report.success_rate_delta,
                overall_reproduction_success: report.overall_reproduction_success,
            },
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| CoreError::fatal(format!("cannot serialize snapshot: {e}")))?;
        std::fs::write(&path, json).map_err(|e| CoreError::fatal(format!("cannot write snapshot: {e}")))?;
        Ok(path)
    }

    /// Exports the flat event list as CSV.
    pub fn export_csv(&self) -> Result<std::path::PathBuf> {
        let dir = self.resolve_output_dir();
        let path = dir.join("measurement_events.csv");
        let mut out = String::from("id,ue_id,source_gnb,target_gnb,scheme,start_s,end_s,latency_ms,result\n");
        for e in self.events_snapshot() {
            out.push_str(&format!(
                "{},{},{},{},{:?},{},{},{},{:?}\n",
                e.id, e.ue_id, e.source_gnb, e.target_gnb, e.scheme, e.start_s, e.end_s, e.latency_ms, e.result
            ));
        }
        std::fs::write(&path, out).map_err(|e| CoreError::fatal(format!("cannot write csv: {e}")))?;
        Ok(path)
    }
}
