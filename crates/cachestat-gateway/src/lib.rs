//! cachestat gateway library entry.
//!
//! This crate plays the host for `cachestat-core`: it loads the YAML config,
//! drives the startup and per-worker hooks, accepts lookup outcomes from the
//! cache layer over HTTP, and exposes the shared ratio on ops endpoints. It is
//! consumed by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod host;
pub mod ingest;
pub mod obs;
pub mod ops;
pub mod router;
