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

//! C8 — EventBusCore: in-process pub/sub with four strict priority
//! queues, per-handler concurrency and timeout, exponential-backoff retry,
//! TTL expiry and bounded retention.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use ntn_common::model::{BusEvent, EventId, Extras, HandlerId, Priority};
use ntn_common::{CoreError, Result};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub type HandlerFuture = Pin<Box<dyn std::future::Future<Output = bool> + Send>>;
pub type Handler = Arc<dyn Fn(BusEvent) -> HandlerFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    Stopped,
    Running,
    Stopping,
}

struct HandlerEntry {
    id: HandlerId,
    handler: Handler,
    max_concurrent: usize,
    timeout: Duration,
    semaphore: Arc<Semaphore>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BusCounters {
    pub published: u64,
    pub processed: u64,
    pub failed: u64,
    pub expired: u64,
    pub evicted: u64,
    pub retried: u64,
}

pub struct EventBusCore {
    state: RwLock<BusState>,
    queues: [Mutex<VecDeque<BusEvent>>; 4], // Critical, High, Normal, Low
    handlers: DashMap<String, Vec<HandlerEntry>>,
    store: Mutex<VecDeque<BusEvent>>,
    retention_max: usize,
    default_max_retries: u32,
    worker_count: usize,
    notify: Arc<Notify>,
    shutdown: Arc<Notify>,
    next_event_id: AtomicU64,
    next_handler_id: AtomicU64,
    sequence: AtomicU64,
    counters: Mutex<BusCounters>,
    workers: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
    epoch: std::time::Instant,
    active_workers: AtomicUsize,
}

fn priority_index(p: Priority) -> usize {
    match p {
        Priority::Critical => 0,
        Priority::High => 1,
        Priority::Normal => 2,
        Priority::Low => 3,
    }
}

impl EventBusCore {
    pub fn new(retention_max: usize, worker_count: usize, default_max_retries: u32) -> Arc<Self> {
        Arc::new(EventBusCore {
            state: RwLock::new(BusState::Stopped),
            queues: [Mutex::new(VecDeque::new()), Mutex::new(VecDeque::new()), Mutex::new(VecDeque::new()), Mutex::new(VecDeque::new())],
            handlers: DashMap::new(),
            store: Mutex::new(VecDeque::new()),
            retention_max,
            default_max_retries,
            worker_count: worker_count.max(1),
            notify: Arc::new(Notify::new()),
            shutdown: Arc::new(Notify::new()),
            next_event_id: AtomicU64::new(1),
            next_handler_id: AtomicU64::new(1),
            sequence: AtomicU64::new(0),
            counters: Mutex::new(BusCounters::default()),
            workers: tokio::sync::Mutex::new(Vec::new()),
            epoch: std::time::Instant::now(),
            active_workers: AtomicUsize::new(0),
        })
    }

    fn now_s(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    pub fn state(&self) -> BusState {
        *self.state.read().unwrap()
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.write().unwrap();
            if *state == BusState::Running {
                return Err(CoreError::state_violation("bus already running"));
            }
            *state = BusState::Running;
        }
        let mut handles = Vec::with_capacity(self.worker_count);
        for _ in 0..self.worker_count {
            let this = Arc::clone(self);
            handles.push(tokio::spawn(async move { this.worker_loop().await }));
        }
        *self.workers.lock().await = handles;
        Ok(())
    }

    /// `Stop()`: transitions through Stopping so in-flight handlers finish
    /// or time out, then Stopped (§4.7 state machine).
    pub async fn stop(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.write().unwrap();
            if *state == BusState::Stopped {
                return Err(CoreError::state_violation("bus already stopped"));
            }
            *state = BusState::Stopping;
        }
        self.shutdown.notify_waiters();
        self.notify.notify_waiters();
        let handles = std::mem::take(&mut *self.workers.lock().await);
        for h in handles {
            let _ = tokio::time::timeout(Duration::from_secs(5), h).await;
        }
        *self.state.write().unwrap() = BusState::Stopped;
        Ok(())
    }

    /// `Publish`: rejected while Stopping (§4.7). Inserts into the
    /// retention store (evicting the oldest 10% on overflow) and the
    /// matching priority queue.
    pub fn publish(
        &self,
        event_type: impl Into<String>,
        payload: Extras,
        source: impl Into<String>,
        priority: Priority,
        correlation_id: Option<String>,
        ttl_s: Option<f64>,
    ) -> Result<EventId> {
        if self.state() == BusState::Stopping {
            return Err(CoreError::state_violation("bus is stopping"));
        }
        let id = self.next_event_id.fetch_add(1, Ordering::Relaxed);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let event = BusEvent {
            id,
            event_type: event_type.into(),
            source: source.into(),
            priority,
            sequence,
            timestamp_s: self.now_s(),
            payload,
            correlation_id,
            causation_id: None,
            retry_count: 0,
            max_retries: self.default_max_retries,
            ttl_s,
        };
        self.insert_into_store(event.clone());
        self.queues[priority_index(priority)].lock().unwrap().push_back(event);
        self.counters.lock().unwrap().published += 1;
        self.notify.notify_one();
        Ok(id)
    }

    fn insert_into_store(&self, event: BusEvent) {
        let mut store = self.store.lock().unwrap();
        store.push_back(event);
        if store.len() > self.retention_max {
            let evict_count = (self.retention_max / 10).max(1);
            for _ in 0..evict_count {
                if store.pop_front().is_none() {
                    break;
                }
            }
            self.counters.lock().unwrap().evicted += evict_count as u64;
        }
    }

    pub fn register_handler(
        &self,
        event_type: impl Into<String>,
        handler: Handler,
        max_concurrent: usize,
        timeout: Duration,
    ) -> HandlerId {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        let entry = HandlerEntry {
            id,
            handler,
            max_concurrent: max_concurrent.max(1),
            timeout,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        };
        self.handlers.entry(event_type.into()).or_default().push(entry);
        id
    }

    pub fn unregister(&self, handler_id: HandlerId) {
        for mut entry in self.handlers.iter_mut() {
            entry.value_mut().retain(|h| h.id != handler_id);
        }
    }

    pub fn counters(&self) -> BusCounters {
        *self.counters.lock().unwrap()
    }

    pub fn store_len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    /// Strict highest-priority-first dequeue (§4.7, §8 invariant 6).
    fn try_dequeue(&self) -> Option<BusEvent> {
        for q in &self.queues {
            if let Some(ev) = q.lock().unwrap().pop_front() {
                return Some(ev);
            }
        }
        None
    }

    fn requeue(&self, event: BusEvent) {
        self.queues[priority_index(event.priority)].lock().unwrap().push_back(event);
        self.notify.notify_one();
    }

    async fn worker_loop(self: Arc<Self>) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
        loop {
            if let Some(event) = self.try_dequeue() {
                self.process_event(event).await;
                continue;
            }
            if self.state() == BusState::Stopping {
                break;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                _ = self.shutdown.notified() => {
                    if self.try_dequeue().is_none() {
                        break;
                    }
                }
            }
        }
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    async fn process_event(self: &Arc<Self>, event: BusEvent) {
        if event.is_expired(self.now_s()) {
            self.counters.lock().unwrap().expired += 1;
            debug!(event_id = event.id, "event expired before dequeue");
            return;
        }

        let handler_entries: Vec<(HandlerId, Handler, Arc<Semaphore>, Duration)> = self
            .handlers
            .get(&event.event_type)
            .map(|v| v.iter().map(|h| (h.id, Arc::clone(&h.handler), Arc::clone(&h.semaphore), h.timeout)).collect())
            .unwrap_or_default();

        let mut any_success = false;
        if !handler_entries.is_empty() {
            let mut joinset = JoinSet::new();
            for (_id, handler, semaphore, timeout) in handler_entries {
                let ev = event.clone();
                joinset.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    match tokio::time::timeout(timeout, handler(ev)).await {
                        Ok(result) => result,
                        Err(_) => false,
                    }
                });
            }
            while let Some(res) = joinset.join_next().await {
                if matches!(res, Ok(true)) {
                    any_success = true;
                }
            }
        }

        if any_success {
            self.counters.lock().unwrap().processed += 1;
            return;
        }

        if event.retry_count < event.max_retries {
            let backoff_s = 2f64.powi(event.retry_count as i32).min(60.0);
            self.counters.lock().unwrap().retried += 1;
            let mut retried = event;
            retried.retry_count += 1;
            let this = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs_f64(backoff_s)).await;
                if this.state() != BusState::Stopping {
                    this.requeue(retried);
                }
            });
        } else {
            self.counters.lock().unwrap().failed += 1;
            warn!(event_id = event.id, "event dropped after exhausting retries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> Extras {
        Extras::new()
    }

    #[tokio::test]
    async fn priority_ordering_is_strict() {
        let bus = EventBusCore::new(1000, 1, 3);
        bus.publish("t", payload(), "test", Priority::Normal, None, None).unwrap();
        bus.publish("t", payload(), "test", Priority::Low, None, None).unwrap();
        bus.publish("t", payload(), "test", Priority::Critical, None, None).unwrap();
        bus.publish("t", payload(), "test", Priority::High, None, None).unwrap();

        let mut order = Vec::new();
        while let Some(ev) = bus.try_dequeue() {
            order.push(ev.priority);
        }
        assert_eq!(order, vec![Priority::Critical, Priority::High, Priority::Normal, Priority::Low]);
    }

    #[tokio::test]
    async fn publish_while_stopping_is_rejected() {
        let bus = EventBusCore::new(1000, 1, 3);
        *bus.state.write().unwrap() = BusState::Stopping;
        let result = bus.publish("t", payload(), "test", Priority::Normal, None, None);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn retention_evicts_oldest_ten_percent_on_overflow() {
        let bus = EventBusCore::new(10, 1, 3);
        for _ in 0..12 {
            bus.publish("t", payload(), "test", Priority::Normal, None, None).unwrap();
        }
        assert!(bus.store_len() <= 10);
        assert!(bus.counters().evicted >= 1);
    }

    #[tokio::test]
    async fn handler_success_is_recorded_as_processed() {
        let bus = EventBusCore::new(100, 2, 3);
        bus.register_handler(
            "t",
            Arc::new(|_ev| Box::pin(async { true })),
            4,
            Duration::from_millis(100),
        );
        bus.start().await.unwrap();
        bus.publish("t", payload(), "test", Priority::Critical, None, None).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.stop().await.unwrap();
        assert_eq!(bus.counters().processed, 1);
    }
}
