//! Startup latch, reload policy, toggle, and teardown.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;
use std::path::Path;

use cachestat_core::shm::{CounterStore, StoreIdentity};
use cachestat_core::{
    CacheOutcome, CacheStatError, CoordinatorSettings, CounterState, LifecycleCoordinator,
    Observation, PassOutcome, Phase, ReloadPolicy, StatusRecorder, ToggleGate,
};
use tempfile::TempDir;

fn entries(dir: &Path) -> usize {
    fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

fn settings(dir: &TempDir) -> CoordinatorSettings {
    CoordinatorSettings::new(ToggleGate::enabled(), dir.path())
}

#[test]
fn dry_run_then_serve_allocates_once() {
    let dir = TempDir::new().unwrap();
    let mut coord = LifecycleCoordinator::new(settings(&dir));
    assert_eq!(coord.phase(), Phase::Uninitialized);

    assert_eq!(coord.post_config().unwrap(), PassOutcome::DryRun);
    assert_eq!(coord.phase(), Phase::FirstPassSeen);
    assert_eq!(coord.allocations(), 0);
    assert_eq!(entries(dir.path()), 0, "validation pass must not create files");
    assert!(coord.identity().is_none());

    assert_eq!(coord.post_config().unwrap(), PassOutcome::Allocated);
    assert_eq!(coord.phase(), Phase::Ready);
    assert_eq!(coord.allocations(), 1);
    assert_eq!(coord.zero_inits(), 1);
    assert_eq!(coord.passes(), 2);

    let id = coord.identity().unwrap().clone();
    assert!(id.data_path.exists());
    assert!(id.lock_path.exists());
    assert_eq!(coord.snapshot().unwrap(), Some(CounterState::ZERO));
}

#[test]
fn reload_preserves_counters_by_default() {
    let dir = TempDir::new().unwrap();
    let mut coord = LifecycleCoordinator::new(settings(&dir));
    coord.post_config().unwrap();
    coord.post_config().unwrap();

    let recorder = coord.child_init();
    recorder.observe(CacheOutcome::Hit).unwrap();
    recorder.observe(CacheOutcome::Miss).unwrap();

    assert_eq!(coord.post_config().unwrap(), PassOutcome::Preserved);
    assert_eq!(coord.allocations(), 1);
    assert_eq!(coord.zero_inits(), 1);
    assert_eq!(coord.snapshot().unwrap(), Some(CounterState::new(1, 2)));

    // Existing workers keep counting into the same block.
    recorder.observe(CacheOutcome::Hit).unwrap();
    assert_eq!(coord.snapshot().unwrap(), Some(CounterState::new(2, 3)));
}

#[test]
fn reload_can_reset_counters() {
    let dir = TempDir::new().unwrap();
    let mut coord =
        LifecycleCoordinator::new(settings(&dir).with_reload_policy(ReloadPolicy::Reset));
    coord.post_config().unwrap();
    coord.post_config().unwrap();

    let recorder = coord.child_init();
    recorder.observe(CacheOutcome::Hit).unwrap();

    assert_eq!(coord.post_config().unwrap(), PassOutcome::Reset);
    assert_eq!(coord.allocations(), 1);
    assert_eq!(coord.zero_inits(), 2);
    assert_eq!(recorder.snapshot().unwrap(), Some(CounterState::ZERO));

    recorder.observe(CacheOutcome::Miss).unwrap();
    assert_eq!(coord.snapshot().unwrap(), Some(CounterState::new(0, 1)));
}

#[test]
fn closed_gate_is_fully_inert() {
    let dir = TempDir::new().unwrap();
    let runtime = dir.path().join("run");
    let mut coord =
        LifecycleCoordinator::new(CoordinatorSettings::new(ToggleGate::disabled(), &runtime));

    for _ in 0..3 {
        assert_eq!(coord.post_config().unwrap(), PassOutcome::Inert);
    }
    assert_eq!(coord.phase(), Phase::Uninitialized);
    assert_eq!(coord.passes(), 0);
    assert_eq!(coord.allocations(), 0);
    assert!(!runtime.exists());

    let recorder = coord.child_init();
    assert!(!recorder.is_enabled());
    for outcome in CacheOutcome::ALL {
        assert_eq!(recorder.observe(outcome).unwrap(), Observation::Disabled);
    }
    assert_eq!(recorder.snapshot().unwrap(), None);
    assert_eq!(coord.snapshot().unwrap(), None);
    assert!(!runtime.exists());
    coord.close().unwrap();
}

#[test]
fn fresh_coordinator_starts_a_fresh_latch() {
    let dir = TempDir::new().unwrap();
    let mut first = LifecycleCoordinator::new(settings(&dir));
    first.post_config().unwrap();
    first.post_config().unwrap();
    first.close().unwrap();

    let mut second = LifecycleCoordinator::new(settings(&dir));
    assert_eq!(second.post_config().unwrap(), PassOutcome::DryRun);
    assert_eq!(second.post_config().unwrap(), PassOutcome::Allocated);
    assert_eq!(second.snapshot().unwrap(), Some(CounterState::ZERO));
}

#[test]
fn worker_started_before_allocation_is_detached() {
    let dir = TempDir::new().unwrap();
    let mut coord = LifecycleCoordinator::new(settings(&dir));
    coord.post_config().unwrap();

    let recorder = coord.child_init();
    assert!(recorder.is_enabled());
    assert!(!recorder.is_attached());
    assert_eq!(recorder.observe(CacheOutcome::Hit).unwrap(), Observation::Detached);
}

#[test]
fn spawned_worker_attaches_by_identity() {
    let dir = TempDir::new().unwrap();
    let mut coord = LifecycleCoordinator::new(settings(&dir));
    coord.post_config().unwrap();
    coord.post_config().unwrap();

    let id = coord.identity().unwrap().clone();
    let handed_over: StoreIdentity =
        serde_json::from_str(&serde_json::to_string(&id).unwrap()).unwrap();
    assert_eq!(handed_over, id);
    let recorder = StatusRecorder::attach(&handed_over, None).unwrap();
    recorder.observe(CacheOutcome::Revalidate).unwrap();

    assert_eq!(coord.snapshot().unwrap(), Some(CounterState::new(1, 1)));
}

#[test]
fn close_releases_backing_files() {
    let dir = TempDir::new().unwrap();
    let mut coord = LifecycleCoordinator::new(settings(&dir));
    coord.post_config().unwrap();
    coord.post_config().unwrap();
    let id = coord.identity().unwrap().clone();

    coord.close().unwrap();
    assert_eq!(coord.phase(), Phase::Uninitialized);
    assert!(coord.identity().is_none());
    assert!(!id.data_path.exists());
    assert!(!id.lock_path.exists());

    let err = CounterStore::attach(&id).unwrap_err();
    assert!(matches!(err, CacheStatError::Attach(_)), "{err}");

    // Closing twice is harmless.
    coord.close().unwrap();
}

#[test]
fn allocation_failure_aborts_startup() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("file");
    fs::write(&blocker, b"not a directory").unwrap();

    let mut coord = LifecycleCoordinator::new(CoordinatorSettings::new(
        ToggleGate::enabled(),
        blocker.join("run"),
    ));
    assert_eq!(coord.post_config().unwrap(), PassOutcome::DryRun);
    let err = coord.post_config().unwrap_err();
    assert!(matches!(err, CacheStatError::Allocation(_)), "{err}");
    assert_ne!(coord.phase(), Phase::Ready);
    assert_eq!(coord.allocations(), 0);
}
