//! cachestat core: the cross-process hit/total counter and its lifecycle.
//!
//! This crate owns the shared-memory counter pair, the lock that serializes
//! updates to it, the startup latch that allocates both exactly once per server
//! generation, and the per-worker recorder that classifies cache lookup
//! outcomes. It carries no transport or runtime dependencies so any host
//! (the bundled gateway, a test harness, another server) can drive it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Counting must never
//! take down a worker, so every fallible path surfaces as
//! `CacheStatError`/`Result` and the host decides whether it is fatal.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod counter;
pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod outcome;
pub mod recorder;
pub mod shm;

pub use counter::CounterState;
/// Shared result type.
pub use error::{CacheStatError, Result, Severity};
pub use gate::ToggleGate;
pub use lifecycle::{CoordinatorSettings, LifecycleCoordinator, PassOutcome, Phase, ReloadPolicy};
pub use outcome::{CacheOutcome, Classification};
pub use recorder::{Observation, StatusRecorder};
