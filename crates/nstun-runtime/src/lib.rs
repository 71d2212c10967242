//! Cross-process TUN handle transport for the nstun workspace.
//!
//! [`Provisioner::provision`] forks a short-lived worker that joins the
//! target network namespace, creates and configures the TUN device, and
//! passes the open descriptor back with `SCM_RIGHTS`. The caller ends up
//! holding the device while its own namespace membership never changes.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod cancel;
pub mod channel;
pub mod handoff;
pub mod provision;
pub mod worker;

pub use cancel::CancelToken;
pub use provision::{Provisioner, provision_tun_device};
