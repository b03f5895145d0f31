//! Process-local module metrics.
//!
//! The shared hit/total pair lives in `cachestat-core`; this module only
//! tracks what one worker saw (per-outcome counts, skipped updates, lock
//! waits) and renders both for the `/metrics` handler.

pub mod metrics;
