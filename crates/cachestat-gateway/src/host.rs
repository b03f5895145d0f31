//! Host-side hooks wrapping the core coordinator and recorder.
//!
//! A host calls, in order:
//! 1. `post_config` at least twice (validation pass, serving pass, reloads)
//! 2. `child_init` once per worker before it serves anything
//! 3. `cache_status` once per cache lookup
//! 4. `shutdown` when the server tree exits
//!
//! Only (1) can fail. Everything on the request path is absorbed here.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use cachestat_core::error::Result;
use cachestat_core::{
    CacheOutcome, CoordinatorSettings, CounterState, LifecycleCoordinator, Observation,
    PassOutcome, StatusRecorder,
};

use crate::config::CacheStatusSection;
use crate::obs::metrics::ModuleMetrics;

/// Request details passed through to logs only.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub method: String,
    pub uri: String,
}

/// Per-worker state created by `child_init`.
pub struct WorkerContext {
    recorder: StatusRecorder,
    pid: u32,
}

impl WorkerContext {
    pub fn recorder(&self) -> &StatusRecorder {
        &self.recorder
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// What the lookup hook did. The host treats every variant as "continue".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HookStatus {
    Counted(CounterState),
    /// Disabled, or this worker is detached.
    Ignored,
    /// Lock not acquired in time.
    Skipped,
}

/// On-demand status triple for operators.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusReport {
    pub enabled: bool,
    pub attached: bool,
    pub hit: Option<u64>,
    pub total: Option<u64>,
    pub ratio: Option<f64>,
}

pub struct CacheStatusModule {
    coordinator: Mutex<LifecycleCoordinator>,
    metrics: Arc<ModuleMetrics>,
}

impl CacheStatusModule {
    pub fn new(settings: CoordinatorSettings, metrics: Arc<ModuleMetrics>) -> Self {
        Self {
            coordinator: Mutex::new(LifecycleCoordinator::new(settings)),
            metrics,
        }
    }

    pub fn from_config(section: &CacheStatusSection, metrics: Arc<ModuleMetrics>) -> Self {
        Self::new(section.coordinator_settings(), metrics)
    }

    pub fn metrics(&self) -> &ModuleMetrics {
        &self.metrics
    }

    /// Startup hook. An error here must abort the server.
    pub fn post_config(&self) -> Result<PassOutcome> {
        let mut coord = self.coordinator.lock();
        let outcome = coord.post_config()?;
        tracing::info!(?outcome, pass = coord.passes(), "cache status startup pass");
        Ok(outcome)
    }

    /// Worker creation hook.
    pub fn child_init(&self) -> WorkerContext {
        let recorder = self.coordinator.lock().child_init();
        let pid = std::process::id();
        tracing::info!(
            pid,
            enabled = recorder.is_enabled(),
            attached = recorder.is_attached(),
            "cache status worker initialised"
        );
        WorkerContext { recorder, pid }
    }

    /// Lookup hook. Never fails; problems end up in logs and metrics.
    pub fn cache_status(
        &self,
        worker: &WorkerContext,
        outcome: CacheOutcome,
        req: &RequestInfo,
    ) -> HookStatus {
        let class = outcome.classify();
        self.metrics
            .observations
            .inc(&[("outcome", outcome.as_str()), ("class", class.as_str())]);

        match worker.recorder.observe(outcome) {
            Ok(Observation::Recorded { state, waited }) => {
                self.metrics.lock_wait.observe(&[], waited);
                HookStatus::Counted(state)
            }
            Ok(Observation::Disabled) => {
                self.metrics.dropped_observations.inc(&[("reason", "disabled")]);
                HookStatus::Ignored
            }
            Ok(Observation::Detached) => {
                self.metrics.dropped_observations.inc(&[("reason", "detached")]);
                HookStatus::Ignored
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    %outcome,
                    method = %req.method,
                    uri = %req.uri,
                    "cache status update skipped"
                );
                self.metrics.skipped_updates.inc(&[("reason", e.kind())]);
                HookStatus::Skipped
            }
        }
    }

    /// Status triple through the locked read path.
    pub fn status(&self, worker: &WorkerContext) -> Result<StatusReport> {
        let recorder = &worker.recorder;
        let snap = recorder.snapshot()?;
        Ok(StatusReport {
            enabled: recorder.is_enabled(),
            attached: recorder.is_attached(),
            hit: snap.map(|s| s.hit),
            total: snap.map(|s| s.total),
            ratio: snap.and_then(|s| s.ratio()),
        })
    }

    /// Render `/metrics`. A failed snapshot just omits the shared pair.
    pub fn render_metrics(&self, worker: &WorkerContext) -> String {
        let shared = match worker.recorder.snapshot() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "cache status snapshot failed");
                self.metrics.skipped_updates.inc(&[("reason", "snapshot")]);
                None
            }
        };
        self.metrics.render(shared, worker.recorder.is_attached())
    }

    pub fn allocations(&self) -> u32 {
        self.coordinator.lock().allocations()
    }

    /// Release the shared block. Call once, from the process that ran `post_config`.
    pub fn shutdown(&self) -> Result<()> {
        self.coordinator.lock().close()
    }
}
