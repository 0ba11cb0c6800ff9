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

//! C4 — SyncScheduler (Algorithm-1): the periodic Δt tick loop that keeps R
//! and Tp current and binary-searches each predicted handover instant to
//! millisecond precision.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use ntn_common::model::{AccessInfo, SatelliteId, UeId};
use ntn_common::{CoreConfig, CoreError, Result};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::fast_access::FastAccessPredictor;
use crate::position_provider::{Observer, PositionOutcome, PositionProvider};

const BINARY_SEARCH_MAX_ITERATIONS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Initializing,
    Running,
    Error,
}

/// Read-only snapshot returned by `status()`.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub r_table: Vec<AccessInfo>,
    pub tp_table: HashMap<UeId, f64>,
    pub last_tick_duration: Duration,
    pub consecutive_failures: u32,
    pub last_t: f64,
}

/// Result of one binary search: either a resolved instant, or the
/// "no handover in window" sentinel (§4.3 Edge cases).
#[derive(Debug, Clone, PartialEq)]
pub enum HandoverSearchResult {
    Resolved { instant_s: f64, iterations: u32, converged: bool },
    NoHandoverInWindow,
}

pub struct SyncScheduler {
    config: CoreConfig,
    predictor: Arc<FastAccessPredictor>,
    provider: Arc<dyn PositionProvider>,
    state: RwLock<SchedulerState>,
    r_table: RwLock<HashMap<UeId, AccessInfo>>,
    tp_table: RwLock<HashMap<UeId, f64>>,
    last_t: RwLock<f64>,
    last_tick_duration: RwLock<Duration>,
    consecutive_failures: AtomicU32,
    change_tx: mpsc::UnboundedSender<UeId>,
    change_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<UeId>>,
    shutdown: Arc<Notify>,
    epoch: Instant,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    stale_position_events: AtomicU64,
    known_satellites: RwLock<Vec<SatelliteId>>,
}

impl SyncScheduler {
    pub fn new(
        config: CoreConfig,
        predictor: Arc<FastAccessPredictor>,
        provider: Arc<dyn PositionProvider>,
    ) -> Arc<Self> {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        Arc::new(SyncScheduler {
            config,
            predictor,
            provider,
            state: RwLock::new(SchedulerState::Stopped),
            r_table: RwLock::new(HashMap::new()),
            tp_table: RwLock::new(HashMap::new()),
            last_t: RwLock::new(0.0),
            last_tick_duration: RwLock::new(Duration::ZERO),
            consecutive_failures: AtomicU32::new(0),
            change_tx,
            change_rx: tokio::sync::Mutex::new(change_rx),
            shutdown: Arc::new(Notify::new()),
            epoch: Instant::now(),
            task: tokio::sync::Mutex::new(None),
            stale_position_events: AtomicU64::new(0),
            known_satellites: RwLock::new(Vec::new()),
        })
    }

    /// Sets the catalog of satellite ids this scheduler is allowed to draw
    /// regional candidates from. §4.3 requires C4 pass a pre-filtered
    /// regional list rather than the full catalog to C3; without a live
    /// catalog source this core treats every known id above
    /// `candidate_min_elevation_deg`, up to `max_candidate_satellites` of
    /// them, as that region (a performance contract, not a semantic one —
    /// violating it still yields a correct answer, just slower).
    pub fn set_known_satellites(&self, ids: Vec<SatelliteId>) {
        *self.known_satellites.write().unwrap() = ids;
    }

    fn now_s(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.read().unwrap()
    }

    /// Starts the dedicated tick worker. Idempotent in the sense required
    /// by §4.3: calling it while already running is a `StateMachineViolation`.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.write().unwrap();
            if *state == SchedulerState::Running || *state == SchedulerState::Initializing {
                return Err(CoreError::state_violation("scheduler already running"));
            }
            *state = SchedulerState::Initializing;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            *this.state.write().unwrap() = SchedulerState::Running;
            this.run_loop().await;
        });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    pub async fn stop(self: &Arc<Self>) -> Result<()> {
        {
            let state = self.state.read().unwrap();
            if *state == SchedulerState::Stopped {
                return Err(CoreError::state_violation("scheduler already stopped"));
            }
        }
        self.shutdown.notify_waiters();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let grace = Duration::from_secs_f64(self.config.shutdown_grace_s.max(0.0));
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("scheduler worker did not stop within shutdown_grace, abandoning");
            }
        }
        *self.state.write().unwrap() = SchedulerState::Stopped;
        Ok(())
    }

    /// Queues an external UE change for the on-demand phase of the tick
    /// loop (§4.3 `detectUEChanges`).
    pub fn update_ue(&self, ue_id: UeId) -> Result<()> {
        self.change_tx
            .send(ue_id)
            .map_err(|_| CoreError::fatal("scheduler change queue closed"))
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: self.state(),
            r_table: self.r_table.read().unwrap().values().cloned().collect(),
            tp_table: self.tp_table.read().unwrap().clone(),
            last_tick_duration: *self.last_tick_duration.read().unwrap(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_t: *self.last_t.read().unwrap(),
        }
    }

    async fn run_loop(self: Arc<Self>) {
        let period = Duration::from_millis(self.config.tick_period_ms.max(1));
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("sync scheduler tick loop shutting down");
                    return;
                }
                _ = interval.tick() => {
                    self.run_one_tick().await;
                    self.drain_ue_changes().await;
                }
            }
        }
    }

    async fn run_one_tick(self: &Arc<Self>) {
        let now = self.now_s();
        let last_t = *self.last_t.read().unwrap();
        if now <= last_t + self.config.delta_t_s {
            return;
        }

        let started = Instant::now();
        match self.periodic_update(now).await {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                error!(error = %e, failures, "tick failed");
                if failures >= self.config.max_consecutive_tick_failures {
                    *self.state.write().unwrap() = SchedulerState::Error;
                    error!("scheduler transitioned to Error after repeated tick failures");
                }
            }
        }
        *self.last_tick_duration.write().unwrap() = started.elapsed();
        // Monotone tick invariant (§8 invariant 1): T only ever advances.
        *self.last_t.write().unwrap() = now;
    }

    async fn periodic_update(self: &Arc<Self>, now: f64) -> Result<()> {
        let next_t = now + self.config.delta_t_s;
        let sat_ids = self.regional_candidate_satellites(now).await;

        let a_now = self.predictor.predict(self.provider.as_ref(), &sat_ids, now).await?;
        let a_next = self.predictor.predict(self.provider.as_ref(), &sat_ids, next_t).await?;

        let mut new_tp = HashMap::new();
        for (ue_id, current_sat) in &a_now.assignment {
            let next_sat = match a_next.assignment.get(ue_id) {
                Some(s) => s,
                None => continue,
            };
            if current_sat != next_sat {
                match self.binary_search_handover_time(ue_id, current_sat, next_sat, now, next_t).await {
                    Ok(HandoverSearchResult::Resolved { instant_s, .. }) => {
                        new_tp.insert(ue_id.clone(), instant_s);
                    }
                    Ok(HandoverSearchResult::NoHandoverInWindow) => {}
                    Err(e) => {
                        warn!(ue = %ue_id, error = %e, "binary search failed, leaving R unchanged for this ue");
                    }
                }
            }
        }

        self.update_r(&a_now.assignment, &a_next.assignment, &new_tp, now);
        Ok(())
    }

    fn update_r(
        &self,
        a_now: &HashMap<UeId, SatelliteId>,
        a_next: &HashMap<UeId, SatelliteId>,
        tp: &HashMap<UeId, f64>,
        now: f64,
    ) {
        let mut r = self.r_table.write().unwrap();
        let mut new_tp_table = HashMap::new();
        for (ue_id, next_sat) in a_next {
            let handover_instant = tp.get(ue_id).copied();
            let current_sat = a_now.get(ue_id).cloned().unwrap_or_else(|| next_sat.clone());
            let differs = &current_sat != next_sat;
            let info = AccessInfo {
                ue_id: ue_id.clone(),
                satellite_id: current_sat,
                next_satellite_id: if differs { Some(next_sat.clone()) } else { None },
                handover_instant_s: if differs { handover_instant } else { None },
                last_update_s: now,
                access_quality: 1.0,
                prediction_confidence: 1.0,
            };
            if differs {
                if let Some(t) = handover_instant {
                    new_tp_table.insert(ue_id.clone(), t);
                }
            }
            r.insert(ue_id.clone(), info);
        }
        *self.tp_table.write().unwrap() = new_tp_table;
    }

    /// Candidate-satellite sourcing (§4.3): a pre-filtered regional list,
    /// at most `max_candidate_satellites` satellites above
    /// `candidate_min_elevation_deg`. A performance contract, not a
    /// semantic one — if no UE has registered yet (no regional observer to
    /// filter against) or the provider call fails, this degrades to an
    /// unfiltered truncation rather than blocking the tick.
    async fn regional_candidate_satellites(&self, t: f64) -> Vec<SatelliteId> {
        let known = self.known_satellites.read().unwrap().clone();
        let observer = match self.predictor.any_registered_observer() {
            Some(o) => o,
            None => return known.into_iter().take(self.config.max_candidate_satellites).collect(),
        };

        let min_elev = self.config.candidate_min_elevation_deg;
        match self.provider.batch_position(&known, t, Some(observer)).await {
            Ok(outcomes) => {
                let mut filtered: Vec<SatelliteId> = known
                    .iter()
                    .filter(|id| match outcomes.get(*id) {
                        Some(PositionOutcome::Ok(sample)) => {
                            sample.visible && sample.elevation_deg.unwrap_or(0.0) >= min_elev
                        }
                        _ => false,
                    })
                    .cloned()
                    .collect();
                filtered.truncate(self.config.max_candidate_satellites);
                filtered
            }
            Err(e) => {
                warn!(error = %e, "candidate elevation filter failed, falling back to unfiltered truncation");
                known.into_iter().take(self.config.max_candidate_satellites).collect()
            }
        }
    }

    /// Queries C1 for `sat_id` relative to `observer` — the requesting UE's
    /// own position when known, per §4.1 ("elevation/range are always
    /// computed against a UE position"). A missing observer (UE not
    /// registered with C3) degrades to an unweighted, provider-side view
    /// rather than silently fabricating one.
    async fn position_at(
        &self,
        sat_id: &SatelliteId,
        t: f64,
        observer: Option<Observer>,
    ) -> Result<Option<ntn_common::model::SatelliteInfo>> {
        let timeout = Duration::from_secs_f64(self.config.provider_call_timeout_s.max(0.01));
        let ids = [sat_id.clone()];
        let result = tokio::time::timeout(timeout, self.provider.batch_position(&ids, t, observer))
            .await
            .map_err(|_| CoreError::DeadlineExceeded(timeout))??;
        Ok(result.get(sat_id).and_then(|outcome| match outcome {
            PositionOutcome::Ok(sample) => Some(ntn_common::model::SatelliteInfo {
                satellite_id: sat_id.clone(),
                position: ntn_common::geo::GeoPoint::new(sample.lon_deg, sample.lat_deg, sample.alt_km * 1000.0),
                elevation_deg: sample.elevation_deg.unwrap_or(0.0),
                azimuth_deg: sample.azimuth_deg.unwrap_or(0.0),
                range_km: sample.range_km.unwrap_or(f64::INFINITY),
                velocity_km_s: sample.velocity_km_s,
                heading_deg: sample.heading_deg,
                visible: sample.visible,
                coverage_radius_km: ntn_common::geo::coverage_radius_km(sample.alt_km, self.config.min_elevation_deg),
            }),
            PositionOutcome::Unavailable => None,
        }))
    }

    async fn best_at(
        &self,
        source_id: &SatelliteId,
        target_id: &SatelliteId,
        t: f64,
        observer: Option<Observer>,
    ) -> Result<Option<SatelliteId>> {
        let source = self.position_at(source_id, t, observer).await?;
        let target = self.position_at(target_id, t, observer).await?;
        match (source, target) {
            (Some(s), Some(tg)) => Ok(self.predictor.best_of_two(&s, &tg, None)),
            _ => Ok(None),
        }
    }

    /// Algorithm-1 lines 8-11 (§4.3): narrows `[t_start, t_end]` until the
    /// crossover from `source` to `target` is known to within
    /// `binary_search_precision_s`, capped at 50 iterations.
    pub async fn binary_search_handover_time(
        &self,
        ue_id: &UeId,
        source: &SatelliteId,
        target: &SatelliteId,
        t_start: f64,
        t_end: f64,
    ) -> Result<HandoverSearchResult> {
        if source == target {
            return Ok(HandoverSearchResult::NoHandoverInWindow);
        }

        let observer = self.predictor.ue_position(ue_id).map(|p| Observer {
            lon_deg: p.lon_deg,
            lat_deg: p.lat_deg,
            alt_m: p.alt_m,
        });

        let mut attempt = self.best_at(source, target, t_start, observer).await;
        if attempt.is_err() {
            attempt = self.best_at(source, target, t_start, observer).await;
        }
        let start_best = match attempt? {
            Some(b) => b,
            None => {
                self.emit_stale_position(ue_id);
                return Err(CoreError::dependency_unavailable("no position at t_start"));
            }
        };
        if start_best != *source {
            self.tp_table.write().unwrap().remove(ue_id);
            return Ok(HandoverSearchResult::NoHandoverInWindow);
        }

        let mut end_attempt = self.best_at(source, target, t_end, observer).await;
        if end_attempt.is_err() {
            end_attempt = self.best_at(source, target, t_end, observer).await;
        }
        let end_best = match end_attempt? {
            Some(b) => b,
            None => {
                self.emit_stale_position(ue_id);
                return Err(CoreError::dependency_unavailable("no position at t_end"));
            }
        };
        if end_best != *target {
            self.tp_table.write().unwrap().remove(ue_id);
            return Ok(HandoverSearchResult::NoHandoverInWindow);
        }

        let precision = self.config.binary_search_precision_s;
        let mut lo = t_start;
        let mut hi = t_end;
        let mut iterations = 0u32;
        while (hi - lo) > precision && iterations < BINARY_SEARCH_MAX_ITERATIONS {
            let mid = (lo + hi) / 2.0;
            let best = self.best_at(source, target, mid, observer).await?;
            match best {
                Some(b) if b == *source => lo = mid,
                Some(_) => hi = mid,
                None => break,
            }
            iterations += 1;
        }

        let converged = (hi - lo) <= precision;
        if !converged {
            warn!(ue = %ue_id, iterations, "binary search hit iteration cap without converging");
        }
        Ok(HandoverSearchResult::Resolved { instant_s: hi, iterations, converged })
    }

    fn emit_stale_position(&self, ue_id: &UeId) {
        self.stale_position_events.fetch_add(1, Ordering::Relaxed);
        warn!(ue = %ue_id, "stale_position event");
    }

    pub fn stale_position_event_count(&self) -> u64 {
        self.stale_position_events.load(Ordering::Relaxed)
    }

    async fn drain_ue_changes(self: &Arc<Self>) {
        let mut rx = self.change_rx.lock().await;
        while let Ok(ue_id) = rx.try_recv() {
            self.handle_ue_change(&ue_id);
        }
    }

    fn handle_ue_change(&self, ue_id: &UeId) {
        info!(ue = %ue_id, "handling on-demand ue change");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_bracket_converges_trivially() {
        // Exercise the pure arithmetic: when hi - lo already <= precision,
        // the while loop in `binary_search_handover_time` never executes.
        let precision = 0.01;
        let lo = 10.0;
        let hi = 10.005;
        assert!((hi - lo) <= precision);
    }
}
