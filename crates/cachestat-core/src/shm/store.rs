//! The shared mapping holding one [`CounterState`].

use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::{MmapMut, MmapOptions};

use super::{LockGuard, StoreIdentity};
use crate::counter::{CounterState, COUNTER_STATE_SIZE};
use crate::error::{CacheStatError, Result};

/// In-mapping view of `CounterState`. Same layout, atomic cells so unlocked
/// readers in other processes never observe a half-written `u64`.
#[repr(C)]
struct SharedCounters {
    hit: AtomicU64,
    total: AtomicU64,
}

// The mapping must hold the payload itself, not a handle to it.
const _: () = assert!(std::mem::size_of::<SharedCounters>() == COUNTER_STATE_SIZE);
const _: () = assert!(std::mem::align_of::<SharedCounters>() <= 4096);

#[derive(Debug)]
pub struct CounterStore {
    identity: StoreIdentity,
    map: MmapMut,
}

impl CounterStore {
    /// Reserve and map a fresh zeroed block. Once per server generation.
    pub fn allocate(identity: &StoreIdentity, mode: u32) -> Result<Self> {
        let path = &identity.data_path;
        let file = super::create_options(mode)
            .open(path)
            .map_err(|e| CacheStatError::Allocation(format!("{}: {e}", path.display())))?;
        super::apply_mode(path, mode)
            .map_err(|e| CacheStatError::Allocation(format!("chmod {}: {e}", path.display())))?;
        // Truncated above, so the extension reads back as zeros.
        file.set_len(COUNTER_STATE_SIZE as u64)
            .map_err(|e| CacheStatError::Allocation(format!("size {}: {e}", path.display())))?;

        // SAFETY: the file was just created at exactly the mapped length and is
        // only ever truncated by a later `allocate` for a different generation.
        let map = unsafe { MmapOptions::new().len(COUNTER_STATE_SIZE).map_mut(&file) }
            .map_err(|e| CacheStatError::Allocation(format!("mmap {}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), bytes = COUNTER_STATE_SIZE, "counter block allocated");
        Ok(Self {
            identity: identity.clone(),
            map,
        })
    }

    /// Map a block allocated by the coordinator.
    pub fn attach(identity: &StoreIdentity) -> Result<Self> {
        let path = &identity.data_path;
        let file = super::attach_options()
            .open(path)
            .map_err(|e| CacheStatError::Attach(format!("{}: {e}", path.display())))?;
        let len = file
            .metadata()
            .map_err(|e| CacheStatError::Attach(format!("stat {}: {e}", path.display())))?
            .len();
        if len != COUNTER_STATE_SIZE as u64 {
            return Err(CacheStatError::Attach(format!(
                "{}: expected {COUNTER_STATE_SIZE} bytes, found {len}",
                path.display()
            )));
        }

        // SAFETY: length verified above; see `allocate`.
        let map = unsafe { MmapOptions::new().len(COUNTER_STATE_SIZE).map_mut(&file) }
            .map_err(|e| CacheStatError::Attach(format!("mmap {}: {e}", path.display())))?;

        Ok(Self {
            identity: identity.clone(),
            map,
        })
    }

    pub fn identity(&self) -> &StoreIdentity {
        &self.identity
    }

    fn cells(&self) -> &SharedCounters {
        // SAFETY: the mapping is page aligned and exactly COUNTER_STATE_SIZE
        // bytes; SharedCounters is repr(C) with that size and only atomic fields,
        // so shared references are sound even while other processes write.
        unsafe { &*self.map.as_ptr().cast::<SharedCounters>() }
    }

    /// Unlocked read. May lag the latest update, but `hit <= total` still holds
    /// because writers publish `total` before `hit`.
    pub fn read(&self) -> CounterState {
        let cells = self.cells();
        let hit = cells.hit.load(Ordering::Acquire);
        let total = cells.total.load(Ordering::Acquire);
        CounterState { hit, total }
    }

    /// Consistent snapshot taken under the lock.
    pub fn read_locked(&self, guard: &LockGuard<'_>) -> Result<CounterState> {
        self.check_guard(guard)?;
        Ok(self.read())
    }

    /// The only mutation path. `f` maps the current pair to the next one; the
    /// result must keep `hit <= total` and must not move either counter back.
    pub fn update<F>(&self, guard: &LockGuard<'_>, f: F) -> Result<CounterState>
    where
        F: FnOnce(CounterState) -> CounterState,
    {
        self.check_guard(guard)?;
        let current = self.read();
        let next = f(current);
        if !next.is_consistent() {
            return Err(CacheStatError::Internal(format!(
                "update would break hit <= total: {next}"
            )));
        }
        if next.hit < current.hit || next.total < current.total {
            return Err(CacheStatError::Internal(format!(
                "counters only move forward: {current} -> {next}"
            )));
        }

        let cells = self.cells();
        cells.total.store(next.total, Ordering::Release);
        cells.hit.store(next.hit, Ordering::Release);
        Ok(next)
    }

    /// Zero both counters.
    pub fn reset(&self, guard: &LockGuard<'_>) -> Result<()> {
        self.check_guard(guard)?;
        let cells = self.cells();
        cells.hit.store(0, Ordering::Release);
        cells.total.store(0, Ordering::Release);
        Ok(())
    }

    /// Unmap. The backing file is left for its owner to remove.
    pub fn close(self) {
        drop(self);
    }

    fn check_guard(&self, guard: &LockGuard<'_>) -> Result<()> {
        if guard.lock_path() != self.identity.lock_path {
            return Err(CacheStatError::Internal(format!(
                "guard for {} does not protect {}",
                guard.lock_path().display(),
                self.identity.data_path.display()
            )));
        }
        Ok(())
    }
}
