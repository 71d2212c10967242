//! Domain primitive types used across the nstun workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a network namespace: the device and inode of its nsfs entry.
///
/// Two references denote the same namespace exactly when their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespaceId {
    /// Device number of the nsfs mount.
    pub dev: u64,
    /// Inode number of the namespace.
    pub ino: u64,
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net:[{}]", self.ino)
    }
}

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Exited normally with this status code.
    Exited(i32),
    /// Terminated by this signal number.
    Signaled(i32),
    /// Status could not be collected.
    Unknown,
}

impl WorkerExit {
    /// Returns whether the worker exited with status zero.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with status {code}"),
            Self::Signaled(sig) => write!(f, "killed by signal {sig}"),
            Self::Unknown => write!(f, "unknown exit status"),
        }
    }
}
