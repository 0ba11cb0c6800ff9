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

//! CoreRuntime: the single process-wide object that owns and wires all
//! eight components together (§9 Design Notes — explicit DI in place of
//! a global singleton).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ntn_common::model::{Extras, Priority, SatelliteId};
use ntn_common::{CoreConfig, Result};
use tokio::sync::Notify;
use tracing::info;

use crate::event_bus::EventBusCore;
use crate::fast_access::FastAccessPredictor;
use crate::fine_grained_sync::{FineGrainedSync, SyncCoordinator};
use crate::integration_bridge::IntegrationBridge;
use crate::measurement::MeasurementCore;
use crate::position_provider::PositionProvider;
use crate::sync_scheduler::SyncScheduler;

pub struct CoreRuntime {
    pub config: CoreConfig,
    pub provider: Arc<dyn PositionProvider>,
    pub predictor: Arc<FastAccessPredictor>,
    pub scheduler: Arc<SyncScheduler>,
    pub fine_sync: Arc<FineGrainedSync>,
    pub bridge: Arc<IntegrationBridge>,
    pub measurement: Arc<MeasurementCore>,
    pub bus: Arc<EventBusCore>,
    shutdown: Arc<Notify>,
    watcher: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    last_stale_count: AtomicU64,
    last_fallback_count: AtomicU64,
}

impl CoreRuntime {
    pub fn new(config: CoreConfig, provider: Arc<dyn PositionProvider>) -> Arc<Self> {
        let predictor = Arc::new(FastAccessPredictor::new(
            config.block_size_deg,
            config.min_elevation_deg,
            config.scorer_weights,
        ));
        let scheduler = SyncScheduler::new(config.clone(), Arc::clone(&predictor), Arc::clone(&provider));
        let fine_sync = FineGrainedSync::new(config.clone(), Arc::clone(&provider));
        let bridge = IntegrationBridge::new(config.clone(), Arc::clone(&scheduler), Arc::clone(&fine_sync));
        let measurement = Arc::new(MeasurementCore::new(config.measurement_output_dir.clone()));
        let bus = EventBusCore::new(config.event_store_max, config.event_worker_count, config.event_default_max_retries);

        Arc::new(CoreRuntime {
            config,
            provider,
            predictor,
            scheduler,
            fine_sync,
            bridge,
            measurement,
            bus,
            shutdown: Arc::new(Notify::new()),
            watcher: tokio::sync::Mutex::new(None),
            last_stale_count: AtomicU64::new(0),
            last_fallback_count: AtomicU64::new(0),
        })
    }

    /// Registers the regional satellite catalog C4 draws candidates from
    /// (see [`SyncScheduler::set_known_satellites`]).
    pub fn set_known_satellites(&self, ids: Vec<SatelliteId>) {
        self.scheduler.set_known_satellites(ids);
    }

    /// Brings every component up: the event bus first (so the watcher task
    /// below has somewhere to publish), then the tick scheduler, then
    /// signaling-free sync across an (initially empty) coordinator.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.bus.start().await?;
        self.scheduler.start().await?;
        self.fine_sync
            .establish_signaling_free_sync(SyncCoordinator::default(), 0.0)
            .await;
        self.spawn_watcher().await;
        info!("core runtime started");
        Ok(())
    }

    /// Mirrors scheduler stale-position events and bridge fallback
    /// activations onto the bus as `High`/`Critical` priority notifications
    /// (§2 data flow: "decisions emitted as events").
    async fn spawn_watcher(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = this.shutdown.notified() => return,
                    _ = interval.tick() => this.poll_and_publish(),
                }
            }
        });
        *self.watcher.lock().await = Some(handle);
    }

    fn poll_and_publish(&self) {
        let stale = self.scheduler.stale_position_event_count();
        let prev_stale = self.last_stale_count.swap(stale, Ordering::Relaxed);
        if stale > prev_stale {
            let _ = self.bus.publish(
                "stale_position",
                Extras::new(),
                "sync_scheduler",
                Priority::High,
                None,
                Some(300.0),
            );
        }

        let fallback = self.bridge.fallback_activations();
        let prev_fallback = self.last_fallback_count.swap(fallback, Ordering::Relaxed);
        if fallback > prev_fallback {
            let _ = self.bus.publish(
                "fallback_activated",
                Extras::new(),
                "integration_bridge",
                Priority::Critical,
                None,
                Some(300.0),
            );
        }
    }

    /// Tears every component down in the reverse order `start` brought them
    /// up, each with its own shutdown grace period.
    pub async fn stop(self: &Arc<Self>) -> Result<()> {
        self.shutdown.notify_waiters();
        if let Some(handle) = self.watcher.lock().await.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
        self.fine_sync.stop().await;
        self.scheduler.stop().await?;
        self.bus.stop().await?;
        info!("core runtime stopped");
        Ok(())
    }
}
