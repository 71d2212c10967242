//! Formatted output helpers for CLI commands.

use nstun_core::namespace::DiscoveredNamespace;

/// Bold text.
pub const BOLD: &str = "\x1b[1m";
/// Dimmed text.
pub const DIM: &str = "\x1b[2m";
/// Green text.
pub const GREEN: &str = "\x1b[32m";
/// Reset attributes.
pub const RESET: &str = "\x1b[0m";

/// Header line of the namespace table.
#[must_use]
pub fn namespace_header() -> String {
    format!("{:<10} {:<20}", "PID", "NAMESPACE")
}

/// One row of the namespace table.
#[must_use]
pub fn namespace_row(ns: &DiscoveredNamespace) -> String {
    format!("{:<10} {:<20}", ns.pid, ns.id.to_string())
}

/// Describes where a device was placed, e.g. `"pid 4242"` or `"current"`.
#[must_use]
pub fn target_label(netns: Option<&std::path::Path>, pid: Option<u32>) -> String {
    match (netns, pid) {
        (Some(path), _) => path.display().to_string(),
        (None, Some(pid)) => format!("pid {pid}"),
        (None, None) => "current".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use nstun_common::types::NamespaceId;

    use super::*;

    #[test]
    fn rows_align_with_header() {
        let ns = DiscoveredNamespace {
            pid: 4242,
            id: NamespaceId { dev: 4, ino: 4_026_532_008 },
        };
        let row = namespace_row(&ns);
        assert!(row.starts_with("4242 "));
        assert!(row.contains("net:[4026532008]"));
        assert_eq!(row.find("net:"), namespace_header().find("NAMESPACE"));
    }

    #[test]
    fn target_prefers_explicit_path() {
        assert_eq!(target_label(Some(Path::new("/run/netns/a")), None), "/run/netns/a");
        assert_eq!(target_label(None, Some(7)), "pid 7");
        assert_eq!(target_label(None, None), "current");
    }
}
