//! Discovery of container network namespaces.
//!
//! Walks `/proc` looking for container init processes: processes living in
//! a network namespace other than ours whose PID namespace differs from
//! their parent's.

use std::collections::BTreeMap;
use std::path::Path;

use nstun_common::constants::PROC_PATH;
use nstun_common::error::{NstunError, Result};
use nstun_common::types::NamespaceId;

use super::network::{current_id, id_at};

/// A network namespace found by [`discover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredNamespace {
    /// Init process of the container owning the namespace.
    pub pid: u32,
    /// Namespace identity.
    pub id: NamespaceId,
}

/// Lists the network namespaces of container init processes.
///
/// Each namespace is reported once, with the lowest matching pid.
/// Processes that vanish during the walk are skipped.
///
/// # Errors
///
/// Returns an error if `/proc` or our own namespace cannot be read.
pub fn discover() -> Result<Vec<DiscoveredNamespace>> {
    let own = current_id()?;
    let entries = std::fs::read_dir(PROC_PATH).map_err(|e| NstunError::Io {
        path: PROC_PATH.into(),
        source: e,
    })?;

    let mut found: BTreeMap<NamespaceId, u32> = BTreeMap::new();
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        match container_namespace(pid, own) {
            Ok(Some(id)) => {
                let slot = found.entry(id).or_insert(pid);
                *slot = (*slot).min(pid);
            }
            Ok(None) => {}
            Err(e) => tracing::trace!(pid, error = %e, "skipping process"),
        }
    }

    let namespaces: Vec<DiscoveredNamespace> = found
        .into_iter()
        .map(|(id, pid)| DiscoveredNamespace { pid, id })
        .collect();
    tracing::debug!(count = namespaces.len(), "discovered container namespaces");
    Ok(namespaces)
}

/// Returns the namespace of `pid` if it is a container init outside `own`.
fn container_namespace(pid: u32, own: NamespaceId) -> Result<Option<NamespaceId>> {
    let net = id_at(Path::new(&format!("{PROC_PATH}/{pid}/ns/net")))?;
    if net == own {
        return Ok(None);
    }
    let ppid = parent_pid_of(pid)?;
    if ppid == 0 {
        return Ok(None);
    }
    let pid_ns = id_at(Path::new(&format!("{PROC_PATH}/{pid}/ns/pid")))?;
    let parent_pid_ns = id_at(Path::new(&format!("{PROC_PATH}/{ppid}/ns/pid")))?;
    if pid_ns == parent_pid_ns {
        return Ok(None);
    }
    Ok(Some(net))
}

/// Reads the parent pid of `pid` from `/proc/<pid>/status`.
///
/// # Errors
///
/// Returns an error if the status file cannot be read or has no `PPid` line.
pub fn parent_pid_of(pid: u32) -> Result<u32> {
    let path = format!("{PROC_PATH}/{pid}/status");
    let status = std::fs::read_to_string(&path).map_err(|e| NstunError::Io {
        path: path.clone().into(),
        source: e,
    })?;
    parse_ppid(&status).ok_or_else(|| NstunError::Config {
        message: format!("no PPid in {path}"),
    })
}

fn parse_ppid(status: &str) -> Option<u32> {
    status.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key != "PPid" {
            return None;
        }
        value.trim().parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ppid_line() {
        let status = "Name:\tsleep\nState:\tS (sleeping)\nPid:\t42\nPPid:\t7\nTracerPid:\t0\n";
        assert_eq!(parse_ppid(status), Some(7));
    }

    #[test]
    fn missing_ppid_yields_none() {
        assert_eq!(parse_ppid("Name:\tinit\nPid:\t1\n"), None);
        assert_eq!(parse_ppid("PPid:\tnot-a-number\n"), None);
    }

    #[test]
    fn own_parent_is_readable() {
        let ppid = parent_pid_of(std::process::id()).unwrap();
        assert_eq!(ppid, std::os::unix::process::parent_id());
    }

    #[test]
    fn discovery_never_reports_own_namespace() {
        let own = current_id().unwrap();
        let found = discover().unwrap();
        assert!(found.iter().all(|ns| ns.id != own));
    }
}
