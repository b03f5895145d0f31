//! Top-level facade crate for cachestat.
//!
//! Re-exports the shared counter core and the gateway glue so users can depend on a single crate.

pub mod core {
    pub use cachestat_core::*;
}

pub mod gateway {
    pub use cachestat_gateway::*;
}
