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

//! C6 — IntegrationBridge: routes each decision request through one of
//! four modes, collects per-mode metrics, and supports atomic mode
//! switches that never let a request observe a torn mode value.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use ntn_common::model::{Mode, SatelliteId, UeId};
use ntn_common::CoreConfig;
use tracing::warn;

use crate::fine_grained_sync::FineGrainedSync;
use crate::position_provider::Observer;
use crate::sync_scheduler::SyncScheduler;

const HYBRID_CONFIDENCE_THRESHOLD: f64 = 0.8;
const HOUR_BUCKETS: usize = 24;

fn mode_to_u8(mode: Mode) -> u8 {
    match mode {
        Mode::PaperOnly => 0,
        Mode::EnhancedOnly => 1,
        Mode::Hybrid => 2,
        Mode::Fallback => 3,
    }
}

fn u8_to_mode(v: u8) -> Mode {
    match v {
        0 => Mode::PaperOnly,
        1 => Mode::EnhancedOnly,
        2 => Mode::Hybrid,
        _ => Mode::Fallback,
    }
}

#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub ue_id: UeId,
    pub satellite_id: SatelliteId,
    pub ue_position: Observer,
    pub now: f64,
    pub horizon_s: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionResult {
    pub instant_s: Option<f64>,
    pub confidence: f64,
    pub mode_used: Mode,
    pub fusion_note: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
struct HourBucket {
    total_response_ms: f64,
    count: u64,
}

#[derive(Debug, Default)]
struct BridgeMetrics {
    total_requests: u64,
    total_successes: u64,
    total_response_ms: f64,
    buckets: [HourBucket; HOUR_BUCKETS],
}

impl BridgeMetrics {
    fn record(&mut self, response_ms: f64, success: bool, now_s: f64) {
        self.total_requests += 1;
        if success {
            self.total_successes += 1;
        }
        self.total_response_ms += response_ms;
        let idx = ((now_s / 3600.0) as usize) % HOUR_BUCKETS;
        self.buckets[idx].total_response_ms += response_ms;
        self.buckets[idx].count += 1;
    }

    fn average_response_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_response_ms / self.total_requests as f64
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BridgeSnapshot {
    pub mode: Mode,
    pub total_requests: u64,
    pub total_successes: u64,
    pub average_response_ms: f64,
    pub fallback_activations: u64,
    pub last_mode_switch_s: f64,
}

pub struct IntegrationBridge {
    config: CoreConfig,
    mode: AtomicU8,
    scheduler: Arc<SyncScheduler>,
    fine_sync: Arc<FineGrainedSync>,
    fallback_activations: AtomicU64,
    last_mode_switch_s: RwLock<f64>,
    metrics: RwLock<BridgeMetrics>,
}

impl IntegrationBridge {
    pub fn new(config: CoreConfig, scheduler: Arc<SyncScheduler>, fine_sync: Arc<FineGrainedSync>) -> Arc<Self> {
        let initial_mode = config.mode;
        let mode_enum = match initial_mode {
            ntn_common::ModeConfig::PaperOnly => Mode::PaperOnly,
            ntn_common::ModeConfig::EnhancedOnly => Mode::EnhancedOnly,
            ntn_common::ModeConfig::Hybrid => Mode::Hybrid,
            ntn_common::ModeConfig::Fallback => Mode::Fallback,
        };
        Arc::new(IntegrationBridge {
            config,
            mode: AtomicU8::new(mode_to_u8(mode_enum)),
            scheduler,
            fine_sync,
            fallback_activations: AtomicU64::new(0),
            last_mode_switch_s: RwLock::new(0.0),
            metrics: RwLock::new(BridgeMetrics::default()),
        })
    }

    /// Wait-free read of the active mode (§5 Active Mode in C6).
    pub fn current_mode(&self) -> Mode {
        u8_to_mode(self.mode.load(Ordering::Acquire))
    }

    fn paper_only_result(&self, req: &DecisionRequest) -> DecisionResult {
        let status = self.scheduler.status();
        let instant = status.tp_table.get(&req.ue_id).copied();
        DecisionResult {
            instant_s: instant,
            confidence: if instant.is_some() { 1.0 } else { 0.0 },
            mode_used: Mode::PaperOnly,
            fusion_note: None,
        }
    }

    async fn enhanced_only_result(&self, req: &DecisionRequest) -> ntn_common::Result<DecisionResult> {
        let prediction = self
            .fine_sync
            .predict_satellite_access(&req.ue_id, &req.satellite_id, req.ue_position, req.now, req.horizon_s)
            .await?;
        Ok(DecisionResult {
            instant_s: Some(prediction.instant_s),
            confidence: prediction.confidence,
            mode_used: Mode::EnhancedOnly,
            fusion_note: None,
        })
    }

    /// Routes `req` through the currently active mode (§4.5).
    pub async fn decide(&self, req: DecisionRequest) -> DecisionResult {
        let start = std::time::Instant::now();
        let mode = self.current_mode();

        let result = match mode {
            Mode::PaperOnly => self.paper_only_result(&req),
            Mode::EnhancedOnly => self.enhanced_only_result(&req).await.unwrap_or_else(|e| {
                warn!(error = %e, "enhanced path failed");
                DecisionResult { instant_s: None, confidence: 0.0, mode_used: Mode::EnhancedOnly, fusion_note: None }
            }),
            Mode::Hybrid => match self.enhanced_only_result(&req).await {
                Ok(r) if r.confidence >= HYBRID_CONFIDENCE_THRESHOLD => r,
                _ => {
                    let mut paper = self.paper_only_result(&req);
                    paper.fusion_note = Some("enhanced confidence below threshold, fused with paper path".into());
                    paper
                }
            },
            Mode::Fallback => {
                let timeout = Duration::from_secs_f64(self.config.fallback_timeout_s.max(0.0));
                match tokio::time::timeout(timeout, self.enhanced_only_result(&req)).await {
                    Ok(Ok(r)) => r,
                    _ => {
                        self.fallback_activations.fetch_add(1, Ordering::Relaxed);
                        warn!(ue = %req.ue_id, "enhanced path timed out or failed, falling back to paper path");
                        self.paper_only_result(&req)
                    }
                }
            }
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.metrics.write().unwrap().record(elapsed_ms, result.instant_s.is_some(), req.now);
        result
    }

    /// `SwitchMode` (§4.5): a no-op if `new == current`; otherwise the
    /// scheduler is cycled through Stop/Start around the mode flip so no
    /// in-flight tick observes a mix of old and new mode, while in-flight
    /// `decide` calls that already read the mode complete under it.
    pub async fn switch_mode(self: &Arc<Self>, new_mode: Mode, now: f64) -> ntn_common::Result<()> {
        if new_mode == self.current_mode() {
            return Ok(());
        }
        let was_running = self.scheduler.state() == crate::sync_scheduler::SchedulerState::Running;
        if was_running {
            self.scheduler.stop().await?;
        }
        self.mode.store(mode_to_u8(new_mode), Ordering::Release);
        if was_running {
            self.scheduler.start().await?;
        }
        *self.last_mode_switch_s.write().unwrap() = now;
        Ok(())
    }

    pub fn fallback_activations(&self) -> u64 {
        self.fallback_activations.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BridgeSnapshot {
        let metrics = self.metrics.read().unwrap();
        BridgeSnapshot {
            mode: self.current_mode(),
            total_requests: metrics.total_requests,
            total_successes: metrics.total_successes,
            average_response_ms: metrics.average_response_ms(),
            fallback_activations: self.fallback_activations(),
            last_mode_switch_s: *self.last_mode_switch_s.read().unwrap(),
        }
    }
}
