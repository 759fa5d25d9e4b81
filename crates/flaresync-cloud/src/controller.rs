//! Per-kind controller runtime
//!
//! A controller periodically scans its store and reconciles every object
//! that is due:
//!
//! - never reconciled by this process yet
//! - spec generation or deletion intent changed since the last attempt
//! - its requeue time has passed (poll interval, or backoff after an error)
//!
//! Reconciles of different objects run concurrently up to
//! `max_concurrent_reconciles`; the same object is never reconciled twice at
//! once. Each pass runs under `reconcile_timeout`.

use crate::action::{PassSummary, ReconcileOutcome};
use crate::error::{CloudError, Result};
use crate::external::{Managed, ResourceKind};
use crate::reconciler::Reconciler;
use crate::store::ResourceStore;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Backoff for failed reconciles
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failure
    pub initial_delay: Duration,

    /// Upper bound for the delay
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before the next attempt after `failures` consecutive failures
    pub fn delay_for(&self, failures: u32) -> Duration {
        // A multiplier below 1 (or NaN) would shrink or negate the delay
        let multiplier = if self.backoff_multiplier >= 1.0 {
            self.backoff_multiplier
        } else {
            1.0
        };
        let exponent = failures.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay.as_secs_f64() * multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Worker pool size for this kind
    pub max_concurrent_reconciles: usize,

    /// How often an in-sync resource is re-observed
    pub poll_interval: Duration,

    /// How often the store is scanned for due resources
    pub resync_interval: Duration,

    /// Deadline for one reconcile pass
    pub reconcile_timeout: Duration,

    pub retry: RetryConfig,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: 5,
            poll_interval: Duration::from_secs(300),
            resync_interval: Duration::from_secs(5),
            reconcile_timeout: Duration::from_secs(60),
            retry: RetryConfig::default(),
        }
    }
}

/// Scheduling bookkeeping for one object
#[derive(Debug, Default)]
struct Schedule {
    in_flight: bool,
    next_due: Option<Instant>,
    failures: u32,
    /// (generation, deleting) seen at the last attempt
    last_seen: Option<(i64, bool)>,
    /// Set when the last error can only be fixed by a spec change
    parked: bool,
}

impl Schedule {
    fn is_due(&self, seen: (i64, bool), now: Instant) -> bool {
        if self.in_flight {
            return false;
        }
        if self.last_seen != Some(seen) {
            return true;
        }
        if self.parked {
            return false;
        }
        self.next_due.is_none_or(|due| now >= due)
    }
}

struct Inner<K: ResourceKind> {
    reconciler: Reconciler<K>,
    store: Arc<dyn ResourceStore<K>>,
    options: ControllerOptions,
    schedule: Mutex<HashMap<String, Schedule>>,
    workers: Arc<Semaphore>,
}

pub struct Controller<K: ResourceKind> {
    inner: Arc<Inner<K>>,
}

impl<K: ResourceKind> Clone for Controller<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K: ResourceKind> Controller<K> {
    pub fn new(
        reconciler: Reconciler<K>,
        store: Arc<dyn ResourceStore<K>>,
        options: ControllerOptions,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(options.max_concurrent_reconciles.max(1)));
        Self {
            inner: Arc::new(Inner {
                reconciler,
                store,
                options,
                schedule: Mutex::new(HashMap::new()),
                workers,
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        K::KIND
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.inner.options
    }

    /// Run until `shutdown` flips to `true`, then wait for in-flight passes
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            kind = K::KIND,
            workers = self.inner.options.max_concurrent_reconciles,
            poll_interval_secs = self.inner.options.poll_interval.as_secs(),
            "Starting controller"
        );

        let mut tasks = JoinSet::new();
        let mut ticker = tokio::time::interval(self.inner.options.resync_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scan(&mut tasks).await {
                        tracing::warn!(kind = K::KIND, error = %e, "Cannot list managed resources");
                    }
                    while tasks.try_join_next().is_some() {}
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(kind = K::KIND, in_flight = tasks.len(), "Stopping controller");
        while tasks.join_next().await.is_some() {}
    }

    /// Spawn a reconcile for every due object
    async fn scan(&self, tasks: &mut JoinSet<()>) -> Result<()> {
        let objects = self.inner.store.list().await?;
        let now = Instant::now();
        let mut due = Vec::new();

        {
            let mut schedule = self.inner.schedule.lock().await;
            schedule.retain(|name, entry| {
                entry.in_flight || objects.iter().any(|o| o.name() == name.as_str())
            });

            for object in &objects {
                let seen = seen_state::<K>(object);
                let entry = schedule.entry(object.name().to_string()).or_default();
                if entry.is_due(seen, now) {
                    entry.in_flight = true;
                    entry.last_seen = Some(seen);
                    due.push(object.name().to_string());
                }
            }
        }

        for name in due {
            let controller = self.clone();
            tasks.spawn(async move {
                let Ok(_permit) = controller.inner.workers.clone().acquire_owned().await else {
                    return;
                };
                let result = controller.reconcile_with_deadline(&name).await;
                controller.after(&name, &result).await;
            });
        }
        Ok(())
    }

    async fn reconcile_with_deadline(&self, name: &str) -> Result<ReconcileOutcome> {
        let deadline = self.inner.options.reconcile_timeout;
        match tokio::time::timeout(deadline, self.inner.reconciler.reconcile(name)).await {
            Ok(result) => result,
            Err(_) => {
                let err = CloudError::Timeout(format!(
                    "reconcile of {}/{} exceeded {:?}",
                    K::KIND,
                    name,
                    deadline
                ));
                if let Ok(Some(resource)) = self.inner.store.get(name).await {
                    self.inner.reconciler.record_failure(&resource, &err).await;
                }
                Err(err)
            }
        }
    }

    /// Update the schedule after a pass
    async fn after(&self, name: &str, result: &Result<ReconcileOutcome>) {
        let now = Instant::now();
        let mut schedule = self.inner.schedule.lock().await;

        if let Ok(outcome) = result {
            if outcome.is_removed() {
                schedule.remove(name);
                return;
            }
        }

        let entry = schedule.entry(name.to_string()).or_default();
        entry.in_flight = false;

        match result {
            Ok(outcome) => {
                entry.failures = 0;
                entry.parked = false;
                entry.next_due = outcome.requeue_after.map(|after| now + after);
            }
            Err(e) if e.requires_spec_change() => {
                tracing::warn!(
                    kind = K::KIND,
                    name,
                    error = %e,
                    "Waiting for a spec change before retrying"
                );
                entry.parked = true;
                entry.next_due = None;
            }
            Err(e) => {
                entry.failures += 1;
                let delay = self.inner.options.retry.delay_for(entry.failures);
                tracing::debug!(
                    kind = K::KIND,
                    name,
                    failures = entry.failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Requeueing with backoff"
                );
                entry.next_due = Some(now + delay);
            }
        }
    }

    /// Reconcile every object once, ignoring the schedule
    pub async fn reconcile_all(&self) -> Result<PassSummary> {
        let start = std::time::Instant::now();
        let names: Vec<String> = self
            .inner
            .store
            .list()
            .await?
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        let results: Vec<(String, Result<ReconcileOutcome>)> = futures_util::stream::iter(names)
            .map(|name| async move {
                let result = self.reconcile_with_deadline(&name).await;
                (name, result)
            })
            .buffer_unordered(self.inner.options.max_concurrent_reconciles.max(1))
            .collect()
            .await;

        let mut summary = PassSummary::new();
        for (name, result) in &results {
            summary.record(name, result);
        }
        summary.duration_ms = start.elapsed().as_millis() as u64;
        Ok(summary)
    }
}

fn seen_state<K: ResourceKind>(object: &Managed<K>) -> (i64, bool) {
    (
        object.metadata.generation,
        object.metadata.is_being_deleted(),
    )
}
