//! Cross-process shared counter storage.
//!
//! Two files per server generation live under the runtime directory:
//! - `<name>.<pid>.shm`: a 16-byte file mapped `MAP_SHARED` by every process
//! - `<name>.<pid>.lock`: an `flock(2)` target serializing updates
//!
//! `pid` is the coordinator's pid, so a restarted server never maps a previous
//! generation's block by accident.

pub mod lock;
pub mod store;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use lock::{CrossProcessLock, LockGuard};
pub use store::CounterStore;

/// Default permission bits for both files.
pub const DEFAULT_MODE: u32 = 0o600;

/// Where a generation's shared block and lock live.
///
/// Serializable so a spawned worker can be told where to attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreIdentity {
    pub data_path: PathBuf,
    pub lock_path: PathBuf,
}

impl StoreIdentity {
    pub fn for_generation(runtime_dir: &Path, name: &str, owner_pid: u32) -> Self {
        Self {
            data_path: runtime_dir.join(format!("{name}.{owner_pid}.shm")),
            lock_path: runtime_dir.join(format!("{name}.{owner_pid}.lock")),
        }
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    // The umask has already been applied by open(2); set the bits we were asked for.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

fn create_options(mode: u32) -> std::fs::OpenOptions {
    let mut opts = std::fs::OpenOptions::new();
    opts.read(true).write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    opts
}

fn attach_options() -> std::fs::OpenOptions {
    let mut opts = std::fs::OpenOptions::new();
    opts.read(true).write(true);
    opts
}
