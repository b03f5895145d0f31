//! One-time allocation across redundant startup passes, and per-worker attach.
//!
//! Hosts typically run their post-configuration callback once to validate the
//! config and again to start serving. Allocating on the validation pass would
//! leak a shared block every time an operator checks a config file, so the
//! coordinator latches:
//!
//! ```text
//! Uninitialized --pass--> FirstPassSeen --pass--> Ready --pass--> Ready (reload)
//!                (dry run)               (allocate + zero)  (preserve | reset)
//! ```
//!
//! The latch lives in the coordinator value itself. One coordinator is one
//! process generation; building a new one starts over from `Uninitialized`.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::counter::CounterState;
use crate::error::{CacheStatError, Result};
use crate::gate::ToggleGate;
use crate::recorder::StatusRecorder;
use crate::shm::{CounterStore, CrossProcessLock, StoreIdentity, DEFAULT_MODE};

/// What a startup pass does once the counters already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadPolicy {
    /// Keep counting from where the previous config left off.
    #[default]
    Preserve,
    /// Zero both counters under the lock.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    FirstPassSeen,
    Ready,
}

/// Result of one `post_config` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Gate closed; nothing happened.
    Inert,
    /// First pass recorded, no resources created.
    DryRun,
    /// Shared block and lock created and zeroed.
    Allocated,
    /// Reload with existing counters kept.
    Preserved,
    /// Reload with counters zeroed.
    Reset,
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub gate: ToggleGate,
    pub runtime_dir: PathBuf,
    pub name: String,
    pub mode: u32,
    pub lock_timeout: Option<Duration>,
    pub on_reload: ReloadPolicy,
}

impl CoordinatorSettings {
    pub fn new(gate: ToggleGate, runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            gate,
            runtime_dir: runtime_dir.into(),
            name: "cachestat".into(),
            mode: DEFAULT_MODE,
            lock_timeout: None,
            on_reload: ReloadPolicy::default(),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_reload_policy(mut self, policy: ReloadPolicy) -> Self {
        self.on_reload = policy;
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

struct Generation {
    identity: StoreIdentity,
    store: CounterStore,
    lock: CrossProcessLock,
}

pub struct LifecycleCoordinator {
    settings: CoordinatorSettings,
    phase: Phase,
    generation: Option<Generation>,
    owner_pid: u32,
    passes: u32,
    allocations: u32,
    zero_inits: u32,
}

impl LifecycleCoordinator {
    pub fn new(settings: CoordinatorSettings) -> Self {
        Self {
            settings,
            phase: Phase::Uninitialized,
            generation: None,
            owner_pid: std::process::id(),
            passes: 0,
            allocations: 0,
            zero_inits: 0,
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Startup passes seen while enabled.
    pub fn passes(&self) -> u32 {
        self.passes
    }

    pub fn allocations(&self) -> u32 {
        self.allocations
    }

    pub fn zero_inits(&self) -> u32 {
        self.zero_inits
    }

    pub fn identity(&self) -> Option<&StoreIdentity> {
        self.generation.as_ref().map(|g| &g.identity)
    }

    /// Post-configuration startup hook. Errors must abort server startup.
    pub fn post_config(&mut self) -> Result<PassOutcome> {
        if !self.settings.gate.is_enabled() {
            tracing::debug!("cache status disabled; startup pass ignored");
            return Ok(PassOutcome::Inert);
        }
        self.passes += 1;

        match self.phase {
            Phase::Uninitialized => {
                self.phase = Phase::FirstPassSeen;
                tracing::debug!(pass = self.passes, "config validation pass; deferring allocation");
                Ok(PassOutcome::DryRun)
            }
            Phase::FirstPassSeen => {
                let generation = self.allocate()?;
                tracing::info!(
                    data = %generation.identity.data_path.display(),
                    lock = %generation.identity.lock_path.display(),
                    "cache status counters allocated"
                );
                self.generation = Some(generation);
                self.phase = Phase::Ready;
                Ok(PassOutcome::Allocated)
            }
            Phase::Ready => self.reload(),
        }
    }

    fn allocate(&mut self) -> Result<Generation> {
        let dir = &self.settings.runtime_dir;
        std::fs::create_dir_all(dir)
            .map_err(|e| CacheStatError::Allocation(format!("{}: {e}", dir.display())))?;

        let identity = StoreIdentity::for_generation(dir, &self.settings.name, self.owner_pid);
        let lock = CrossProcessLock::create(&identity.lock_path, self.settings.mode)?;
        let store = match CounterStore::allocate(&identity, self.settings.mode) {
            Ok(store) => store,
            Err(e) => {
                remove_if_present(&identity.lock_path);
                return Err(e);
            }
        };
        self.allocations += 1;

        let zeroed = lock
            .lock(None)
            .map_err(|e| CacheStatError::Allocation(format!("initial lock: {e}")))
            .and_then(|guard| store.reset(&guard));
        if let Err(e) = zeroed {
            drop(store);
            remove_if_present(&identity.data_path);
            remove_if_present(&identity.lock_path);
            return Err(e);
        }
        self.zero_inits += 1;

        Ok(Generation { identity, store, lock })
    }

    fn reload(&mut self) -> Result<PassOutcome> {
        let Some(generation) = &self.generation else {
            return Err(CacheStatError::Internal("ready without counters".into()));
        };
        match self.settings.on_reload {
            ReloadPolicy::Preserve => {
                tracing::info!(current = %generation.store.read(), "reload; counters preserved");
                Ok(PassOutcome::Preserved)
            }
            ReloadPolicy::Reset => {
                let guard = generation
                    .lock
                    .lock(self.settings.lock_timeout)
                    .map_err(|e| CacheStatError::Allocation(format!("reset lock: {e}")))?;
                generation.store.reset(&guard)?;
                drop(guard);
                self.zero_inits += 1;
                tracing::info!("reload; counters reset");
                Ok(PassOutcome::Reset)
            }
        }
    }

    /// Per-worker hook, once per new worker before it serves anything.
    ///
    /// Never fails: an attach error is logged and yields a detached recorder,
    /// so the worker still serves requests, just without counting.
    pub fn child_init(&self) -> StatusRecorder {
        if !self.settings.gate.is_enabled() {
            return StatusRecorder::disabled();
        }
        let Some(generation) = &self.generation else {
            tracing::warn!(phase = ?self.phase, "worker started before counters were allocated; counting disabled");
            return StatusRecorder::detached();
        };

        match self.attach_worker(generation) {
            Ok(recorder) => recorder,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    severity = e.severity().as_str(),
                    "worker attach failed; counting disabled for this worker"
                );
                StatusRecorder::detached()
            }
        }
    }

    fn attach_worker(&self, generation: &Generation) -> Result<StatusRecorder> {
        let lock = generation.lock.reinitialize_for_child()?;
        let store = CounterStore::attach(&generation.identity)?;
        Ok(StatusRecorder::from_parts(store, lock, self.settings.lock_timeout))
    }

    /// Locked read through the coordinator's own handles.
    pub fn snapshot(&self) -> Result<Option<CounterState>> {
        let Some(generation) = &self.generation else {
            return Ok(None);
        };
        let guard = generation.lock.lock(self.settings.lock_timeout)?;
        generation.store.read_locked(&guard).map(Some)
    }

    /// Tear down this generation. Backing files are removed only by the process
    /// that allocated them; a forked copy of the coordinator just unmaps.
    pub fn close(&mut self) -> Result<()> {
        let Some(generation) = self.generation.take() else {
            self.phase = Phase::Uninitialized;
            return Ok(());
        };
        let Generation { identity, store, lock } = generation;
        store.close();
        drop(lock);
        self.phase = Phase::Uninitialized;

        if std::process::id() != self.owner_pid {
            return Ok(());
        }
        for path in [&identity.data_path, &identity.lock_path] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(CacheStatError::Internal(format!(
                        "remove {}: {e}",
                        path.display()
                    )))
                }
            }
        }
        tracing::info!("cache status counters released");
        Ok(())
    }
}

fn remove_if_present(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "cleanup after failed allocation");
        }
    }
}
