//! Process-local on/off switch for the whole subsystem.

/// Built once from configuration, immutable afterwards.
///
/// When closed, nothing in this crate touches the filesystem, shared memory,
/// or the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToggleGate(bool);

impl ToggleGate {
    pub const fn new(enabled: bool) -> Self {
        Self(enabled)
    }

    pub const fn enabled() -> Self {
        Self(true)
    }

    pub const fn disabled() -> Self {
        Self(false)
    }

    pub const fn is_enabled(self) -> bool {
        self.0
    }
}

impl From<bool> for ToggleGate {
    fn from(v: bool) -> Self {
        Self(v)
    }
}
