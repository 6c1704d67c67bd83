//! Refresh scheduling and single-flight admission.
//!
//! Three triggers lead to a refresh: process start when nothing is
//! stored, a fixed-period timer, and manual requests (API). All of them
//! pass through one gate, so at most one build runs at a time and two
//! builds can never interleave their writes to the store.
//!
//! - Manual triggers queue on the gate. If a build succeeded while they
//!   waited, they get that build's snapshot instead of starting another.
//! - Timer triggers never queue: if the gate is taken, the tick is skipped.
//! - The read path only builds when the store is empty, and re-checks the
//!   store after acquiring the gate.
//!
//! Builds run on their own task, which owns the gate guard. Dropping the
//! caller (e.g. a disconnected HTTP client) does not stop a build.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::builder::SnapshotBuilder;
use crate::storage::SnapshotStore;
use crate::types::{RefreshMarker, Snapshot, SupplyError};

/// Whether a build currently holds the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// What started a refresh, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Timer,
    Manual,
    ReadPath,
}

/// Result of a timer tick.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Refreshed(Arc<Snapshot>),
    /// Another build was in flight; nothing was done.
    Skipped,
}

/// Outcome of the most recent finished build.
struct LastBuild {
    /// Bumped for every finished build, successful or not.
    generation: u64,
    result: Result<Arc<Snapshot>, SupplyError>,
}

/// Owns the decision of when a refresh runs.
pub struct RefreshScheduler {
    builder: SnapshotBuilder,
    store: SnapshotStore,
    interval: Duration,
    marker_interval: chrono::Duration,
    gate: Arc<Mutex<()>>,
    /// Written only by the build task, while it holds the gate.
    last_build: RwLock<Option<LastBuild>>,
}

impl RefreshScheduler {
    pub fn new(
        builder: SnapshotBuilder,
        store: SnapshotStore,
        interval: Duration,
    ) -> Result<Self, SupplyError> {
        let marker_interval = chrono::Duration::from_std(interval).map_err(|_| {
            SupplyError::Config(format!("refresh interval {interval:?} is out of range"))
        })?;
        Ok(Self {
            builder,
            store,
            interval,
            marker_interval,
            gate: Arc::new(Mutex::new(())),
            last_build: RwLock::new(None),
        })
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn state(&self) -> RefreshState {
        match self.gate.try_lock() {
            Ok(_) => RefreshState::Idle,
            Err(_) => RefreshState::Refreshing,
        }
    }

    pub fn marker(&self) -> RefreshMarker {
        self.store.load_marker()
    }

    /// Startup trigger: build only if the store holds no snapshot.
    /// Returns the new snapshot, or `None` if one was already stored.
    pub async fn startup(self: &Arc<Self>) -> Result<Option<Arc<Snapshot>>, SupplyError> {
        if self.store.load().is_some() {
            info!("Loaded existing data from cache");
            return Ok(None);
        }
        info!("No existing data found, fetching initial data");
        let guard = self.gate.clone().lock_owned().await;
        if self.store.load().is_some() {
            return Ok(None);
        }
        self.run_detached(guard, Trigger::Startup).await.map(Some)
    }

    /// Manual trigger: waits for an in-flight build and reuses its
    /// snapshot if that build succeeded; otherwise builds.
    pub async fn refresh(self: &Arc<Self>) -> Result<Arc<Snapshot>, SupplyError> {
        let seen = self.generation().await;
        let guard = self.gate.clone().lock_owned().await;

        if let Some(LastBuild {
            generation,
            result: Ok(snapshot),
        }) = self.last_build.read().await.as_ref()
        {
            if *generation > seen {
                info!(
                    generated_at = %snapshot.generated_at,
                    "Refresh completed while waiting, reusing its snapshot"
                );
                return Ok(snapshot.clone());
            }
        }
        self.run_detached(guard, Trigger::Manual).await
    }

    /// Timer trigger: skipped outright when a build is in flight.
    pub async fn on_timer(self: &Arc<Self>) -> Result<RefreshOutcome, SupplyError> {
        let Ok(guard) = self.gate.clone().try_lock_owned() else {
            warn!("Scheduled refresh skipped, another refresh is in progress");
            return Ok(RefreshOutcome::Skipped);
        };
        self.run_detached(guard, Trigger::Timer)
            .await
            .map(RefreshOutcome::Refreshed)
    }

    /// Read path: the stored snapshot, building one first if none exists.
    pub async fn current_or_build(self: &Arc<Self>) -> Result<Arc<Snapshot>, SupplyError> {
        if let Some(snapshot) = self.store.load() {
            return Ok(Arc::new(snapshot));
        }

        let guard = self.gate.clone().lock_owned().await;
        if let Some(snapshot) = self.store.load() {
            return Ok(Arc::new(snapshot));
        }
        info!("No cached data found, fetching fresh data");
        self.run_detached(guard, Trigger::ReadPath).await
    }

    /// Spawn the fixed-period refresh loop. The first tick fires one
    /// full period after start; missed ticks are not replayed.
    pub fn spawn_timer(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(period_secs = period.as_secs(), "Refresh scheduler initialized");

            loop {
                ticker.tick().await;
                info!("Running scheduled refresh");
                match self.on_timer().await {
                    Ok(RefreshOutcome::Refreshed(snapshot)) => {
                        info!(cards = snapshot.len(), "Scheduled refresh completed");
                    }
                    Ok(RefreshOutcome::Skipped) => {}
                    Err(e) => error!(error = %e, "Scheduled refresh failed"),
                }
            }
        })
    }

    async fn generation(&self) -> u64 {
        self.last_build
            .read()
            .await
            .as_ref()
            .map_or(0, |last| last.generation)
    }

    /// Run one build on its own task. The task holds `gate` until the
    /// build's result is recorded, then releases it.
    async fn run_detached(
        self: &Arc<Self>,
        gate: OwnedMutexGuard<()>,
        trigger: Trigger,
    ) -> Result<Arc<Snapshot>, SupplyError> {
        let this = Arc::clone(self);
        let build = tokio::spawn(async move {
            let result = this.run_locked(trigger).await;
            drop(gate);
            result
        });

        match build.await {
            Ok(result) => result,
            Err(e) => Err(SupplyError::Task(e.to_string())),
        }
    }

    /// Build, persist, mark and record the outcome. Only called from the
    /// build task, which holds the gate.
    async fn run_locked(&self, trigger: Trigger) -> Result<Arc<Snapshot>, SupplyError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, ?trigger, "Refresh started");

        let result = self.build_and_persist().await;
        match &result {
            Ok(snapshot) => info!(%run_id, cards = snapshot.len(), "Refresh finished"),
            Err(e) => error!(%run_id, error = %e, "Refresh failed"),
        }

        let mut last = self.last_build.write().await;
        let generation = last.as_ref().map_or(0, |b| b.generation) + 1;
        *last = Some(LastBuild {
            generation,
            result: result.clone(),
        });
        result
    }

    async fn build_and_persist(&self) -> Result<Arc<Snapshot>, SupplyError> {
        let snapshot = self.builder.build().await?;
        self.store.save(&snapshot)?;
        self.store
            .save_marker(&RefreshMarker::completed(Utc::now(), self.marker_interval))?;

        Ok(Arc::new(snapshot))
    }
}
