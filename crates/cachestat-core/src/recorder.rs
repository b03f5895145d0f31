//! Per-worker outcome recorder: classify, lock, update, report.

use std::time::{Duration, Instant};

use crate::counter::CounterState;
use crate::error::Result;
use crate::gate::ToggleGate;
use crate::outcome::CacheOutcome;
use crate::shm::{CounterStore, CrossProcessLock, StoreIdentity};

/// What happened to one observed outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// Subsystem switched off; nothing was touched.
    Disabled,
    /// This worker failed to attach; the observation was dropped.
    Detached,
    /// Shared counters updated; `state` is the pair after the update.
    Recorded { state: CounterState, waited: Duration },
}

struct Attachment {
    store: CounterStore,
    lock: CrossProcessLock,
}

/// A worker's handle on the shared counters.
///
/// Obtained from [`LifecycleCoordinator::child_init`](crate::LifecycleCoordinator::child_init)
/// in the coordinator's process tree, or from [`StatusRecorder::attach`] in a
/// process that was only handed a [`StoreIdentity`].
pub struct StatusRecorder {
    gate: ToggleGate,
    attachment: Option<Attachment>,
    lock_timeout: Option<Duration>,
}

impl StatusRecorder {
    pub fn disabled() -> Self {
        Self {
            gate: ToggleGate::disabled(),
            attachment: None,
            lock_timeout: None,
        }
    }

    /// Enabled but unable to count. Observations are accepted and dropped.
    pub fn detached() -> Self {
        Self {
            gate: ToggleGate::enabled(),
            attachment: None,
            lock_timeout: None,
        }
    }

    /// Attach from a process that did not inherit any handles.
    pub fn attach(identity: &StoreIdentity, lock_timeout: Option<Duration>) -> Result<Self> {
        let lock = CrossProcessLock::open_existing(&identity.lock_path)?;
        let store = CounterStore::attach(identity)?;
        Ok(Self::from_parts(store, lock, lock_timeout))
    }

    pub(crate) fn from_parts(
        store: CounterStore,
        lock: CrossProcessLock,
        lock_timeout: Option<Duration>,
    ) -> Self {
        Self {
            gate: ToggleGate::enabled(),
            attachment: Some(Attachment { store, lock }),
            lock_timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn identity(&self) -> Option<&StoreIdentity> {
        self.attachment.as_ref().map(|a| a.store.identity())
    }

    /// Count one cache lookup.
    ///
    /// `Err(UpdateSkipped)` means the lock was not acquired within the
    /// configured wait; the caller should log it and carry on.
    pub fn observe(&self, outcome: CacheOutcome) -> Result<Observation> {
        if !self.gate.is_enabled() {
            return Ok(Observation::Disabled);
        }
        let Some(att) = &self.attachment else {
            tracing::trace!(%outcome, "worker detached; observation dropped");
            return Ok(Observation::Detached);
        };

        let class = outcome.classify();
        let started = Instant::now();
        let guard = att.lock.lock(self.lock_timeout)?;
        let waited = started.elapsed();
        let state = att.store.update(&guard, |s| CounterState {
            hit: s.hit.saturating_add(class.hit_delta()),
            total: s.total.saturating_add(1),
        })?;
        drop(guard);

        tracing::info!(
            %outcome,
            hit = state.hit,
            total = state.total,
            ratio = state.ratio().unwrap_or(0.0),
            "{state}"
        );
        Ok(Observation::Recorded { state, waited })
    }

    /// Consistent snapshot for status reporting. `None` when not counting.
    pub fn snapshot(&self) -> Result<Option<CounterState>> {
        if !self.gate.is_enabled() {
            return Ok(None);
        }
        let Some(att) = &self.attachment else {
            return Ok(None);
        };
        let guard = att.lock.lock(self.lock_timeout)?;
        att.store.read_locked(&guard).map(Some)
    }

    /// Drop this worker's mapping and lock handle.
    pub fn close(self) {
        if let Some(att) = self.attachment {
            att.store.close();
        }
    }
}
