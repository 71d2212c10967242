//! IPv6 address assignment and inspection.

use std::fmt;
use std::net::Ipv6Addr;
use std::os::fd::AsRawFd;

use nix::errno::Errno;
use nstun_common::constants::IF_INET6_PATH;
use nstun_common::error::{NstunError, Result};

use super::interface_index;
use crate::sys;

/// An address configured on an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    /// The address.
    pub address: Ipv6Addr,
    /// Its prefix length.
    pub prefix_len: u8,
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

/// Assigns `address/prefix_len` to `name` in a single request.
///
/// # Errors
///
/// Returns [`NstunError::InterfaceLookup`] if the interface does not exist,
/// or [`NstunError::AddressAssign`] if the kernel rejects the address.
pub fn assign_address(name: &str, address: Ipv6Addr, prefix_len: u8) -> Result<()> {
    let index = interface_index(name)?;
    let assign_err = |errno| NstunError::AddressAssign {
        name: name.to_string(),
        address,
        prefix_len,
        errno,
    };
    let ifindex = libc::c_int::try_from(index).map_err(|_| assign_err(Errno::ENODEV))?;
    let req = sys::In6Ifreq {
        ifr6_addr: libc::in6_addr {
            s6_addr: address.octets(),
        },
        ifr6_prefixlen: u32::from(prefix_len),
        ifr6_ifindex: ifindex,
    };
    let sock = sys::control_socket().map_err(assign_err)?;
    // SAFETY: `req` matches the kernel's in6_ifreq layout and outlives the call.
    let _ = unsafe { sys::set_addr6(sock.as_raw_fd(), &raw const req) }.map_err(assign_err)?;
    tracing::debug!(name, %address, prefix_len, "address assigned");
    Ok(())
}

/// Lists the IPv6 addresses configured on `name`.
///
/// # Errors
///
/// Returns an error if the kernel address table cannot be read.
pub fn ipv6_addresses(name: &str) -> Result<Vec<InterfaceAddress>> {
    let table = std::fs::read_to_string(IF_INET6_PATH).map_err(|e| NstunError::Io {
        path: IF_INET6_PATH.into(),
        source: e,
    })?;
    Ok(parse_if_inet6(&table, name))
}

/// Parses `/proc/net/if_inet6`, keeping the rows that belong to `name`.
///
/// Each row is `addr ifindex prefix scope flags name` with hex fields.
fn parse_if_inet6(table: &str, name: &str) -> Vec<InterfaceAddress> {
    table
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 6 || cols[5] != name {
                return None;
            }
            let raw = u128::from_str_radix(cols[0], 16).ok()?;
            let prefix_len = u8::from_str_radix(cols[2], 16).ok()?;
            Some(InterfaceAddress {
                address: Ipv6Addr::from(raw),
                prefix_len,
            })
        })
        .collect()
}
