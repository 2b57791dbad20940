//! Polling-based change notification.
//!
//! # Lifecycle
//! A `PollerRegistry` owns at most one polling task per entity type.
//! `subscribe` runs one fetch-and-push cycle immediately, then arms a tokio
//! task that repeats the cycle every `poll_interval_minutes`. Subscribing
//! again for the same entity aborts the previous task before the new one is
//! spawned, under the registry lock, so two timers for one entity are never
//! armed together. Tasks end on `unsubscribe`, `shutdown`, or when the
//! registry is dropped.
//!
//! A failed cycle is logged and skipped; the task stays on schedule.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::adapter::CrmAdapter;
use crate::entity::EntityType;
use crate::types::Instance;

/// Receives polled instances. The poller always pushes the full current
/// list with `replace = true`.
#[async_trait]
pub trait SubscriptionSink: Send + Sync {
    async fn on_subscription(&self, instances: Vec<Instance>, replace: bool);
}

pub struct PollerRegistry {
    adapter: Arc<CrmAdapter>,
    tasks: Mutex<HashMap<EntityType, JoinHandle<()>>>,
}

impl PollerRegistry {
    pub fn new(adapter: Arc<CrmAdapter>) -> Self {
        Self {
            adapter,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Push the current records of `entity` to `sink` now and on every
    /// interval from here on. Replaces any existing subscription for
    /// `entity`.
    pub async fn subscribe(&self, entity: EntityType, sink: Arc<dyn SubscriptionSink>) {
        poll_once(&self.adapter, entity, sink.as_ref()).await;

        let period = self.adapter.config().poll_interval();
        let mut tasks = self.tasks.lock();
        if let Some(previous) = tasks.remove(&entity) {
            previous.abort();
            tracing::info!(%entity, "replaced existing poller");
        }
        let handle = tokio::spawn(run_poller(self.adapter.clone(), entity, sink, period));
        tasks.insert(entity, handle);
        tracing::info!(%entity, ?period, "poller armed");
    }

    /// Stop polling `entity`. Returns whether a poller was active.
    pub fn unsubscribe(&self, entity: EntityType) -> bool {
        match self.tasks.lock().remove(&entity) {
            Some(handle) => {
                handle.abort();
                tracing::info!(%entity, "poller stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, entity: EntityType) -> bool {
        self.tasks
            .lock()
            .get(&entity)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn active_count(&self) -> usize {
        self.tasks.lock().values().filter(|h| !h.is_finished()).count()
    }

    /// Stop every poller.
    pub fn shutdown(&self) {
        for (entity, handle) in self.tasks.lock().drain() {
            handle.abort();
            tracing::info!(%entity, "poller stopped");
        }
    }
}

impl Drop for PollerRegistry {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.get_mut().drain() {
            handle.abort();
        }
    }
}

async fn run_poller(adapter: Arc<CrmAdapter>, entity: EntityType, sink: Arc<dyn SubscriptionSink>, period: Duration) {
    // The immediate cycle already ran in `subscribe`.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        poll_once(&adapter, entity, sink.as_ref()).await;
    }
}

/// One fetch-and-push cycle. Returns whether the sink was fed.
async fn poll_once(adapter: &CrmAdapter, entity: EntityType, sink: &dyn SubscriptionSink) -> bool {
    match adapter.fetch_all(entity).await {
        Ok(instances) => {
            tracing::debug!(%entity, count = instances.len(), "poll cycle fetched records");
            sink.on_subscription(instances, true).await;
            true
        }
        Err(err) => {
            tracing::warn!(%entity, error = %err, "poll cycle failed; keeping schedule");
            false
        }
    }
}
