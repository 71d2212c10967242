//! Input validation happens before any worker process exists.
//!
//! Kept in its own test binary with a single test so that no other test
//! forks workers while the spawn counter is observed.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs::File;
use std::os::fd::OwnedFd;

use nstun_common::config::TunConfig;
use nstun_common::error::NstunError;
use nstun_core::namespace::NamespaceRef;
use nstun_runtime::worker::spawned_count;
use nstun_runtime::{Provisioner, provision_tun_device};

#[test]
fn rejected_requests_spawn_no_worker() {
    let bogus = NamespaceRef::from_fd(OwnedFd::from(File::open("/dev/null").unwrap()));
    let before = spawned_count();

    for input in ["bogus", "1.2.3.4", "64:ff9b::1/8", "", " 64:ff9b::1"] {
        let err = provision_tun_device(Some(&bogus), input, 1280).unwrap_err();
        assert!(matches!(err, NstunError::InvalidAddress { .. }), "{input:?}: {err:?}");
    }
    let oversized = TunConfig {
        interface_name: "an-interface-name-too-long".into(),
        ..TunConfig::default()
    };
    let err = Provisioner::new(oversized).provision(None, "64:ff9b::1").unwrap_err();
    assert!(matches!(err, NstunError::Config { .. }));
    assert_eq!(spawned_count(), before);

    // A well-formed request does fork, so the counter is live.
    let err = provision_tun_device(Some(&bogus), "64:ff9b::1", 1280).unwrap_err();
    assert!(matches!(err, NstunError::NamespaceSwitch { .. }));
    assert_eq!(spawned_count(), before + 1);
}
