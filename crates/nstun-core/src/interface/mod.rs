//! Interface configuration in the current network namespace.
//!
//! Every request resolves the interface by name and talks to the kernel
//! through a control socket opened for that request alone. Nothing is
//! cached between calls, so these functions are safe to call right after
//! a namespace switch.

pub mod address;
pub mod link;

use std::net::Ipv6Addr;

use nix::errno::Errno;
use nstun_common::error::{NstunError, Result};

pub use address::{InterfaceAddress, assign_address, ipv6_addresses};
pub use link::{LinkFlags, bring_up, query_flags, query_mtu, set_mtu};

/// Resolves the kernel index of `name` in the current namespace.
///
/// # Errors
///
/// Returns [`NstunError::InterfaceLookup`] if no such interface exists.
pub fn interface_index(name: &str) -> Result<u32> {
    let index = nix::net::if_::if_nametoindex(name).map_err(|errno| NstunError::InterfaceLookup {
        name: name.to_string(),
        errno,
    })?;
    if index == 0 {
        return Err(NstunError::InterfaceLookup {
            name: name.to_string(),
            errno: Errno::ENODEV,
        });
    }
    Ok(index)
}

/// Brings `name` up, assigns `address/prefix_len`, then sets `mtu`.
///
/// Stops at the first failing step.
///
/// # Errors
///
/// Returns the error of the first failing step.
pub fn configure(name: &str, address: Ipv6Addr, prefix_len: u8, mtu: u32) -> Result<()> {
    tracing::debug!(name, %address, prefix_len, mtu, "configuring interface");
    bring_up(name)?;
    assign_address(name, address, prefix_len)?;
    set_mtu(name, mtu)?;
    tracing::info!(name, %address, prefix_len, mtu, "interface configured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_has_an_index() {
        let index = interface_index("lo").unwrap();
        assert!(index > 0);
    }

    #[test]
    fn unknown_interface_fails_lookup() {
        let err = interface_index("nstun-absent0").unwrap_err();
        assert!(matches!(err, NstunError::InterfaceLookup { ref name, .. } if name == "nstun-absent0"));
    }

    #[test]
    fn configure_stops_at_lookup_failure() {
        let err = configure("nstun-absent1", Ipv6Addr::LOCALHOST, 8, 1280).unwrap_err();
        assert!(matches!(err, NstunError::InterfaceLookup { .. }));
    }
}
