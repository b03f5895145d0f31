//! Shared application state for the cachestat gateway.
//!
//! `boot` runs the host lifecycle the way a pre-forking server would: a
//! validation pass, a serving pass, then worker initialisation. Startup
//! errors are returned, not panicked on.

use std::sync::Arc;

use cachestat_core::error::Result;
use cachestat_core::CacheOutcome;

use crate::config::CacheStatConfig;
use crate::host::{CacheStatusModule, HookStatus, RequestInfo, StatusReport, WorkerContext};
use crate::obs::metrics::ModuleMetrics;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: CacheStatConfig,
    module: CacheStatusModule,
    worker: WorkerContext,
}

impl AppState {
    /// Build application state.
    /// Returns Result so main can handle errors gracefully (no panic).
    pub fn boot(cfg: CacheStatConfig) -> Result<Self> {
        let metrics = Arc::new(ModuleMetrics::default());
        let module = CacheStatusModule::from_config(&cfg.cache_status, metrics);

        // 1) Config validation pass, 2) serving pass.
        module.post_config()?;
        module.post_config()?;

        // 3) This process is the (only) worker.
        let worker = module.child_init();

        Ok(Self {
            inner: Arc::new(AppStateInner { cfg, module, worker }),
        })
    }

    pub fn cfg(&self) -> &CacheStatConfig {
        &self.inner.cfg
    }

    pub fn module(&self) -> &CacheStatusModule {
        &self.inner.module
    }

    pub fn worker(&self) -> &WorkerContext {
        &self.inner.worker
    }

    /// Blocking: may wait on the cross-process lock.
    pub fn record(&self, outcome: CacheOutcome, req: &RequestInfo) -> HookStatus {
        self.inner.module.cache_status(&self.inner.worker, outcome, req)
    }

    /// Blocking: takes the cross-process lock for a consistent read.
    pub fn status(&self) -> Result<StatusReport> {
        self.inner.module.status(&self.inner.worker)
    }

    /// Blocking: see `status`.
    pub fn render_metrics(&self) -> String {
        self.inner.module.render_metrics(&self.inner.worker)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.inner.module.shutdown()
    }
}
