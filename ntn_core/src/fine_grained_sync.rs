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

//! C5 — FineGrainedSync: two-point access-instant prediction with binary
//! refinement, plus signaling-free clock alignment across the four
//! network planes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use ntn_common::model::{ClockOffsets, SatelliteId, SyncPoint, SyncState, UeId};
use ntn_common::{CoreConfig, Result};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::position_provider::{Observer, PositionOutcome, PositionProvider};

const BINARY_SEARCH_MAX_ITERATIONS: u32 = 10;
const ACCESS_PROBABILITY_THRESHOLD: f64 = 0.7;
const MIN_BRACKET_S: f64 = 10.0;
const LEO_DELAY_COMPENSATION_MS: f64 = 20.0;
const GEO_DELAY_COMPENSATION_MS: f64 = 250.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneKind {
    Leo,
    Geo,
}

#[derive(Debug, Clone)]
pub struct NetworkNode {
    pub name: String,
    pub plane: PlaneKind,
}

#[derive(Debug, Clone, Default)]
pub struct SyncCoordinator {
    pub access_nodes: Vec<NetworkNode>,
    pub core_nodes: Vec<NetworkNode>,
    pub satellite_nodes: Vec<NetworkNode>,
}

/// Result of `predict_satellite_access` (§4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPrediction {
    pub instant_s: f64,
    pub confidence: f64,
    pub error_bound_ms: f64,
    pub converged: bool,
    pub iterations: u32,
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

pub struct FineGrainedSync {
    config: CoreConfig,
    provider: Arc<dyn PositionProvider>,
    sync_point: RwLock<SyncPoint>,
    offsets: RwLock<ClockOffsets>,
    shutdown: Arc<Notify>,
    monitor_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    recalibrating: AtomicBool,
    last_tick_at: RwLock<Instant>,
    recalibrations: AtomicU64,
}

impl FineGrainedSync {
    pub fn new(config: CoreConfig, provider: Arc<dyn PositionProvider>) -> Arc<Self> {
        Arc::new(FineGrainedSync {
            config,
            provider,
            sync_point: RwLock::new(SyncPoint::synchronized_at(0.0)),
            offsets: RwLock::new(ClockOffsets::default()),
            shutdown: Arc::new(Notify::new()),
            monitor_task: tokio::sync::Mutex::new(None),
            recalibrating: AtomicBool::new(false),
            last_tick_at: RwLock::new(Instant::now()),
            recalibrations: AtomicU64::new(0),
        })
    }

    /// Number of times the drift monitor has triggered a full recalibration.
    pub fn recalibration_count(&self) -> u64 {
        self.recalibrations.load(Ordering::Relaxed)
    }

    /// The "current" SyncPoint, as observed by C4/C6. Published atomically
    /// by a single write under the lock; a reader never observes a torn
    /// value and, during a recalibration, observes the previous value
    /// until the new one is fully composed (§4.4 Two-phase property).
    pub fn current_sync_point(&self) -> SyncPoint {
        self.sync_point.read().unwrap().clone()
    }

    async fn sample_elevation(&self, sat: &SatelliteId, t: f64, ue: Observer) -> Result<Option<(f64, f64)>> {
        let ids = [sat.clone()];
        let timeout = Duration::from_secs_f64(self.config.provider_call_timeout_s.max(0.01));
        let outcomes = tokio::time::timeout(timeout, self.provider.batch_position(&ids, t, Some(ue)))
            .await
            .map_err(|_| ntn_common::CoreError::DeadlineExceeded(timeout))??;
        Ok(outcomes.get(sat).and_then(|o| match o {
            PositionOutcome::Ok(sample) if sample.visible => {
                Some((sample.elevation_deg.unwrap_or(0.0), sample.range_km.unwrap_or(0.0)))
            }
            _ => None,
        }))
    }

    /// Returns `(access_probability, error_estimate_ms)` for `t_mid`,
    /// monotone in elevation above the minimum-service threshold.
    async fn evaluate_access_feasibility(
        &self,
        sat: &SatelliteId,
        t_mid: f64,
        ue: Observer,
    ) -> Result<(f64, f64)> {
        match self.sample_elevation(sat, t_mid, ue).await? {
            None => Ok((0.0, 500.0)),
            Some((elevation, range_km)) => {
                let min_elev = self.config.min_elevation_deg;
                let probability = clamp01((elevation - min_elev) / (90.0 - min_elev));
                let error_ms = (range_km / 20.0).clamp(1.0, 200.0);
                Ok((probability, error_ms))
            }
        }
    }

    /// Two-point prediction + binary refinement (§4.4 steps 1-5).
    pub async fn predict_satellite_access(
        &self,
        _ue: &UeId,
        sat: &SatelliteId,
        ue_position: Observer,
        now: f64,
        horizon_s: f64,
    ) -> Result<AccessPrediction> {
        let delta = self.config.two_point_delta_minutes * 60.0;
        let (e0, _) = self.sample_elevation(sat, now, ue_position).await?.unwrap_or((0.0, 0.0));
        let (e1, _) = self.sample_elevation(sat, now + delta, ue_position).await?.unwrap_or((0.0, 0.0));

        let min_elev = self.config.min_elevation_deg;
        let slope = (e1 - e0) / delta;
        let initial_estimate = if slope.abs() > 1e-9 {
            (now + (min_elev - e0) / slope).clamp(now, now + horizon_s)
        } else {
            now + horizon_s / 2.0
        };

        let mut lo = (now + 60.0).min(now + horizon_s);
        let mut hi = now + horizon_s;
        if initial_estimate > lo && initial_estimate < hi {
            // Narrow the starting bracket around the linear estimate when
            // it falls inside the search window; otherwise search the
            // full window.
            lo = (initial_estimate - delta).max(lo);
            hi = (initial_estimate + delta).min(hi);
        }

        let mut iterations = 0u32;
        let mut last_error_ms = 500.0;
        let mut last_probability = 0.0;
        let mut converged_on_error = false;

        while iterations < BINARY_SEARCH_MAX_ITERATIONS {
            if (hi - lo) < MIN_BRACKET_S {
                break;
            }
            let mid = (lo + hi) / 2.0;
            let (probability, error_ms) = self.evaluate_access_feasibility(sat, mid, ue_position).await?;
            last_error_ms = error_ms;
            last_probability = probability;
            if error_ms <= self.config.target_sync_accuracy_ms.max(30.0) {
                converged_on_error = true;
                break;
            }
            if probability >= ACCESS_PROBABILITY_THRESHOLD {
                hi = mid;
            } else {
                lo = mid;
            }
            iterations += 1;
        }

        let final_instant = hi;
        let bracket_converged = (hi - lo) < MIN_BRACKET_S || converged_on_error;

        let time_consistency = clamp01(1.0 - (initial_estimate - final_instant).abs() / horizon_s.max(1.0));
        let convergence_factor = if bracket_converged { 1.0 } else { 0.5 };
        let error_bound_factor = clamp01(1.0 - last_error_ms / 50.0);
        let confidence = clamp01(
            0.3 * time_consistency + 0.3 * convergence_factor + 0.2 * error_bound_factor + 0.2 * last_probability,
        );

        let mut error_bound_ms = last_error_ms;
        if !bracket_converged {
            error_bound_ms *= 1.5;
        }
        error_bound_ms = error_bound_ms.min(50.0);

        Ok(AccessPrediction {
            instant_s: final_instant,
            confidence,
            error_bound_ms,
            converged: bracket_converged,
            iterations,
        })
    }

    fn delay_compensation_ms(plane: PlaneKind) -> f64 {
        match plane {
            PlaneKind::Leo => LEO_DELAY_COMPENSATION_MS,
            PlaneKind::Geo => GEO_DELAY_COMPENSATION_MS,
        }
    }

    /// `EstablishSignalingFreeSync` (§4.4): synchronizes every node in
    /// `coordinator`, starts the drift-monitoring loop, and returns the
    /// coordination accuracy averaged over all nodes.
    pub async fn establish_signaling_free_sync(
        self: &Arc<Self>,
        coordinator: SyncCoordinator,
        now: f64,
    ) -> f64 {
        let all_nodes: Vec<&NetworkNode> = coordinator
            .access_nodes
            .iter()
            .chain(coordinator.core_nodes.iter())
            .chain(coordinator.satellite_nodes.iter())
            .collect();

        if all_nodes.is_empty() {
            self.sync_point.write().unwrap().state = SyncState::Error;
            return 0.0;
        }

        let mut total_accuracy = 0.0;
        for node in &all_nodes {
            let compensation_ms = Self::delay_compensation_ms(node.plane);
            // Per-node accuracy degrades slightly with compensation size;
            // this is the accuracy the sync establishes, not a measurement
            // of drift (that is the monitoring loop's job).
            let accuracy = (self.config.target_sync_accuracy_ms + compensation_ms * 0.01).max(1.0);
            total_accuracy += accuracy;
        }
        let coordination_accuracy = total_accuracy / all_nodes.len() as f64;

        *self.sync_point.write().unwrap() = SyncPoint::synchronized_at(now);
        *self.offsets.write().unwrap() = ClockOffsets::default();
        *self.last_tick_at.write().unwrap() = Instant::now();

        self.spawn_monitor_loop().await;
        coordination_accuracy
    }

    async fn spawn_monitor_loop(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let period = Duration::from_secs_f64(self.config.sync_interval_s.max(0.1));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = this.shutdown.notified() => return,
                    _ = interval.tick() => {
                        let elapsed_s = {
                            let mut last = this.last_tick_at.write().unwrap();
                            let elapsed = last.elapsed().as_secs_f64();
                            *last = Instant::now();
                            elapsed
                        };
                        this.check_drift_and_maybe_recalibrate(elapsed_s).await;
                    }
                }
            }
        });
        *self.monitor_task.lock().await = Some(handle);
    }

    /// Has no hardware clock to read drift from, so the monitor loop uses
    /// how far its own tick interval strayed from `sync_interval_s` as a
    /// proxy for clock skew: a monitor loop that cannot keep its own
    /// schedule is itself evidence of the kind of timing slip this sync
    /// is meant to correct for.
    fn estimate_drift_rate_ms_per_hr(&self, elapsed_s: f64) -> f64 {
        let expected = self.config.sync_interval_s.max(0.001);
        let fractional_error = (elapsed_s - expected) / expected;
        fractional_error * 3_600_000.0
    }

    async fn check_drift_and_maybe_recalibrate(self: &Arc<Self>, elapsed_s: f64) {
        let estimated_rate = self.estimate_drift_rate_ms_per_hr(elapsed_s);
        self.sync_point.write().unwrap().drift_rate_ms_per_hr = estimated_rate;

        let drift_ms = estimated_rate * (self.config.sync_interval_s / 3600.0);
        if drift_ms.abs() > self.config.max_clock_drift_ms {
            warn!(drift_ms, "clock drift exceeded threshold, recalibrating");
            self.recalibrating.store(true, Ordering::SeqCst);
            self.sync_point.write().unwrap().state = SyncState::Desynchronized;

            let now = self.sync_point.read().unwrap().access_net_s;
            self.sync_point.write().unwrap().state = SyncState::Synchronizing;
            // Recalibration resets offsets and rebuilds a fresh SyncPoint;
            // readers mid-recalibration see `Desynchronized`/`Synchronizing`
            // rather than a torn value, because this is the only place the
            // point is overwritten, in one atomic write at the end.
            let rebuilt = SyncPoint::synchronized_at(now);
            *self.offsets.write().unwrap() = ClockOffsets::default();
            *self.sync_point.write().unwrap() = rebuilt;
            self.recalibrating.store(false, Ordering::SeqCst);
            self.recalibrations.fetch_add(1, Ordering::Relaxed);
            info!("recalibration complete");
        }
    }

    pub async fn stop(&self) {
        self.shutdown.notify_waiters();
        if let Some(handle) = self.monitor_task.lock().await.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }
}
