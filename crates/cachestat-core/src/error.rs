//! Shared error type across cachestat crates.

use thiserror::Error;

/// How far an error is allowed to travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort server startup.
    Fatal,
    /// Disable counting for the affected worker only.
    Degraded,
    /// Log and continue; the request path never sees it.
    Absorbed,
}

impl Severity {
    /// String representation used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Fatal => "fatal",
            Severity::Degraded => "degraded",
            Severity::Absorbed => "absorbed",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, CacheStatError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum CacheStatError {
    #[error("shared counter allocation failed: {0}")]
    Allocation(String),
    #[error("cross-process lock creation failed: {0}")]
    LockCreation(String),
    #[error("shared counter attach failed: {0}")]
    Attach(String),
    #[error("cross-process lock attach failed: {0}")]
    LockAttach(String),
    #[error("counter update skipped: {0}")]
    UpdateSkipped(String),
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl CacheStatError {
    /// Map an error to its propagation policy.
    pub fn severity(&self) -> Severity {
        match self {
            CacheStatError::Allocation(_)
            | CacheStatError::LockCreation(_)
            | CacheStatError::BadConfig(_) => Severity::Fatal,
            CacheStatError::Attach(_) | CacheStatError::LockAttach(_) => Severity::Degraded,
            CacheStatError::UpdateSkipped(_) | CacheStatError::Internal(_) => Severity::Absorbed,
        }
    }

    /// Short stable tag, used as the `reason` label on skipped updates.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheStatError::Allocation(_) => "allocation",
            CacheStatError::LockCreation(_) => "lock_creation",
            CacheStatError::Attach(_) => "attach",
            CacheStatError::LockAttach(_) => "lock_attach",
            CacheStatError::UpdateSkipped(_) => "update_skipped",
            CacheStatError::BadConfig(_) => "bad_config",
            CacheStatError::Internal(_) => "internal",
        }
    }
}
