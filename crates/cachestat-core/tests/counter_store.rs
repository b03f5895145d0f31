//! Shared block sizing, attach failures, and the locked update contract.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use cachestat_core::counter::COUNTER_STATE_SIZE;
use cachestat_core::shm::{CounterStore, CrossProcessLock, StoreIdentity, DEFAULT_MODE};
use cachestat_core::{CacheStatError, CounterState, Severity};
use tempfile::TempDir;

fn identity(dir: &TempDir) -> StoreIdentity {
    StoreIdentity::for_generation(dir.path(), "test", std::process::id())
}

fn allocated(dir: &TempDir) -> (CounterStore, CrossProcessLock) {
    let id = identity(dir);
    let lock = CrossProcessLock::create(&id.lock_path, DEFAULT_MODE).unwrap();
    let store = CounterStore::allocate(&id, DEFAULT_MODE).unwrap();
    (store, lock)
}

#[test]
fn block_is_sized_to_payload() {
    let dir = TempDir::new().unwrap();
    let (store, _lock) = allocated(&dir);

    let len = fs::metadata(&store.identity().data_path).unwrap().len();
    assert_eq!(len, 16);
    assert_eq!(len as usize, COUNTER_STATE_SIZE);
    assert_eq!(COUNTER_STATE_SIZE, std::mem::size_of::<CounterState>());
}

#[test]
fn allocate_discards_stale_contents() {
    let dir = TempDir::new().unwrap();
    let id = identity(&dir);
    fs::write(&id.data_path, [0xAB; 64]).unwrap();

    let store = CounterStore::allocate(&id, DEFAULT_MODE).unwrap();
    assert_eq!(store.read(), CounterState::ZERO);
    assert_eq!(fs::metadata(&id.data_path).unwrap().len(), 16);
}

#[test]
fn attach_to_missing_block_fails() {
    let dir = TempDir::new().unwrap();
    let err = CounterStore::attach(&identity(&dir)).unwrap_err();
    assert!(matches!(err, CacheStatError::Attach(_)), "{err}");
    assert_eq!(err.severity(), Severity::Degraded);
}

#[test]
fn attach_to_truncated_block_fails() {
    let dir = TempDir::new().unwrap();
    let id = identity(&dir);
    fs::write(&id.data_path, [0u8; 8]).unwrap();

    let err = CounterStore::attach(&id).unwrap_err();
    assert!(matches!(err, CacheStatError::Attach(ref m) if m.contains("found 8")), "{err}");
}

#[test]
fn allocation_in_missing_dir_is_fatal() {
    let dir = TempDir::new().unwrap();
    let id = StoreIdentity::for_generation(&dir.path().join("nope"), "test", 1);

    let err = CounterStore::allocate(&id, DEFAULT_MODE).unwrap_err();
    assert!(matches!(err, CacheStatError::Allocation(_)), "{err}");
    assert_eq!(err.severity(), Severity::Fatal);

    let err = CrossProcessLock::create(&id.lock_path, DEFAULT_MODE).unwrap_err();
    assert!(matches!(err, CacheStatError::LockCreation(_)), "{err}");
    assert_eq!(err.severity(), Severity::Fatal);
}

#[test]
fn update_is_visible_through_another_mapping() {
    let dir = TempDir::new().unwrap();
    let (store, lock) = allocated(&dir);
    let other = CounterStore::attach(store.identity()).unwrap();

    let guard = lock.lock(None).unwrap();
    let next = store
        .update(&guard, |s| CounterState::new(s.hit + 1, s.total + 2))
        .unwrap();
    drop(guard);

    assert_eq!(next, CounterState::new(1, 2));
    assert_eq!(other.read(), CounterState::new(1, 2));
}

#[test]
fn update_rejects_hit_above_total() {
    let dir = TempDir::new().unwrap();
    let (store, lock) = allocated(&dir);
    let guard = lock.lock(None).unwrap();

    let err = store
        .update(&guard, |s| CounterState::new(s.total + 1, s.total))
        .unwrap_err();
    assert!(matches!(err, CacheStatError::Internal(_)), "{err}");
    assert_eq!(store.read_locked(&guard).unwrap(), CounterState::ZERO);
}

#[test]
fn update_rejects_going_backwards() {
    let dir = TempDir::new().unwrap();
    let (store, lock) = allocated(&dir);
    let guard = lock.lock(None).unwrap();
    store.update(&guard, |_| CounterState::new(2, 4)).unwrap();

    let err = store.update(&guard, |_| CounterState::new(1, 4)).unwrap_err();
    assert!(matches!(err, CacheStatError::Internal(_)), "{err}");
    assert_eq!(store.read(), CounterState::new(2, 4));

    store.reset(&guard).unwrap();
    assert_eq!(store.read(), CounterState::ZERO);
}

#[test]
fn guard_for_another_lock_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (store, _lock) = allocated(&dir);
    let stranger = CrossProcessLock::create(&dir.path().join("other.lock"), DEFAULT_MODE).unwrap();

    let guard = stranger.lock(None).unwrap();
    let err = store.update(&guard, |s| s).unwrap_err();
    assert!(matches!(err, CacheStatError::Internal(_)), "{err}");
}

#[test]
fn reinitialize_needs_existing_lock_file() {
    let dir = TempDir::new().unwrap();
    let (_store, lock) = allocated(&dir);

    let child = lock.reinitialize_for_child().unwrap();
    assert_eq!(child.path(), lock.path());

    fs::remove_file(lock.path()).unwrap();
    let err = lock.reinitialize_for_child().unwrap_err();
    assert!(matches!(err, CacheStatError::LockAttach(_)), "{err}");
    assert_eq!(err.severity(), Severity::Degraded);
}

#[cfg(unix)]
#[test]
fn files_carry_requested_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let id = identity(&dir);
    let _lock = CrossProcessLock::create(&id.lock_path, 0o660).unwrap();
    let _store = CounterStore::allocate(&id, 0o660).unwrap();

    for path in [&id.data_path, &id.lock_path] {
        let mode = fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o660, "{}", path.display());
    }
}
