//! The counter pair stored in shared memory.

use std::fmt;

use serde::Serialize;

/// Hit/total pair as laid out in the shared mapping.
///
/// The layout is part of the cross-process ABI: `hit` at offset 0, `total` at
/// offset 8, both native-endian `u64`, no padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterState {
    pub hit: u64,
    pub total: u64,
}

/// Bytes reserved for one `CounterState` in the shared mapping.
pub const COUNTER_STATE_SIZE: usize = std::mem::size_of::<CounterState>();

const _: () = assert!(COUNTER_STATE_SIZE == 16);

impl CounterState {
    pub const ZERO: CounterState = CounterState { hit: 0, total: 0 };

    pub fn new(hit: u64, total: u64) -> Self {
        Self { hit, total }
    }

    /// `hit / total`, or `None` before the first lookup.
    pub fn ratio(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.hit as f64 / self.total as f64)
        }
    }

    /// `0 <= hit <= total`.
    pub fn is_consistent(&self) -> bool {
        self.hit <= self.total
    }
}

impl fmt::Display for CounterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hit={} total={} ratio={}",
            self.hit,
            self.total,
            self.ratio().unwrap_or(0.0)
        )
    }
}
