//! Network namespace references.
//!
//! A [`NamespaceRef`] is an open descriptor on a namespace file such as
//! `/proc/<pid>/ns/net` or a bind mount under `/run/netns`. Joining one is
//! irreversible for the calling thread, so [`NamespaceRef::join`] is only
//! meant to run inside a disposable worker process.

use std::fs::File;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nstun_common::constants::SELF_NETNS_PATH;
use nstun_common::error::{NstunError, Result};
use nstun_common::types::NamespaceId;

/// Open handle on a network namespace, owned by the caller.
#[derive(Debug)]
pub struct NamespaceRef {
    file: File,
}

impl NamespaceRef {
    /// Opens the namespace file at `path`.
    ///
    /// The target is not checked to be a network namespace; a wrong file is
    /// only detected when it is joined.
    ///
    /// # Errors
    ///
    /// Returns [`NstunError::Io`] if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| NstunError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(path = %path.display(), "opened namespace reference");
        Ok(Self { file })
    }

    /// Opens the network namespace of process `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`NstunError::Io`] if the process does not exist or its
    /// namespace file cannot be opened.
    pub fn of_pid(pid: u32) -> Result<Self> {
        Self::open(Path::new(&format!("/proc/{pid}/ns/net")))
    }

    /// Opens the network namespace of the calling process.
    ///
    /// # Errors
    ///
    /// Returns [`NstunError::Io`] if `/proc/self/ns/net` cannot be opened.
    pub fn current() -> Result<Self> {
        Self::open(Path::new(SELF_NETNS_PATH))
    }

    /// Wraps an already open namespace descriptor.
    #[must_use]
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self {
            file: File::from(fd),
        }
    }

    /// Returns the identity of the referenced namespace.
    ///
    /// # Errors
    ///
    /// Returns [`NstunError::Io`] if the descriptor cannot be inspected.
    pub fn id(&self) -> Result<NamespaceId> {
        let meta = self.file.metadata().map_err(|e| NstunError::Io {
            path: "<namespace fd>".into(),
            source: e,
        })?;
        Ok(NamespaceId {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    /// Moves the calling thread into this namespace.
    ///
    /// There is no way back: call this only in a process that exists for
    /// this purpose.
    ///
    /// # Errors
    ///
    /// Returns [`NstunError::NamespaceSwitch`] if `setns(2)` fails, e.g. for
    /// a descriptor that is not a network namespace or missing privilege.
    pub fn join(&self) -> Result<()> {
        use nix::sched::{CloneFlags, setns};

        setns(self.file.as_fd(), CloneFlags::CLONE_NEWNET)
            .map_err(|errno| NstunError::NamespaceSwitch { errno })?;
        tracing::debug!("joined network namespace");
        Ok(())
    }
}

impl AsFd for NamespaceRef {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

/// Returns the identity of the caller's current network namespace.
///
/// # Errors
///
/// Returns [`NstunError::Io`] if `/proc/self/ns/net` cannot be inspected.
pub fn current_id() -> Result<NamespaceId> {
    id_at(Path::new(SELF_NETNS_PATH))
}

/// Returns the identity of the namespace file at `path`.
///
/// # Errors
///
/// Returns [`NstunError::Io`] if the path cannot be inspected.
pub fn id_at(path: &Path) -> Result<NamespaceId> {
    let meta = std::fs::metadata(path).map_err(|e| NstunError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(NamespaceId {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_reference_matches_current_id() {
        let ns = NamespaceRef::current().unwrap();
        assert_eq!(ns.id().unwrap(), current_id().unwrap());
    }

    #[test]
    fn own_pid_resolves_to_same_namespace() {
        let ns = NamespaceRef::of_pid(std::process::id()).unwrap();
        assert_eq!(ns.id().unwrap(), current_id().unwrap());
    }

    #[test]
    fn opening_missing_path_reports_it() {
        let err = NamespaceRef::open(Path::new("/nonexistent/ns/net")).unwrap_err();
        assert!(matches!(err, NstunError::Io { ref path, .. } if path == Path::new("/nonexistent/ns/net")));
    }

    #[test]
    fn non_namespace_file_is_accepted_until_joined() {
        let ns = NamespaceRef::open(Path::new("/dev/null")).unwrap();
        assert_ne!(ns.id().unwrap(), current_id().unwrap());
    }
}
