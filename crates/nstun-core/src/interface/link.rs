//! Link state: administrative flags and MTU.

use std::os::fd::AsRawFd;

use nix::errno::Errno;
use nstun_common::error::{NstunError, Result};

use super::interface_index;
use crate::sys;

#[allow(clippy::cast_possible_truncation)]
const IFF_UP: libc::c_short = libc::IFF_UP as libc::c_short;
#[allow(clippy::cast_possible_truncation)]
const IFF_RUNNING: libc::c_short = libc::IFF_RUNNING as libc::c_short;
const UP_RUNNING: libc::c_short = IFF_UP | IFF_RUNNING;

/// Interface flags as reported by `SIOCGIFFLAGS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkFlags(libc::c_short);

impl LinkFlags {
    /// Administratively up.
    #[must_use]
    pub const fn is_up(self) -> bool {
        self.0 & IFF_UP != 0
    }

    /// Operationally running.
    #[must_use]
    pub const fn is_running(self) -> bool {
        self.0 & IFF_RUNNING != 0
    }

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> libc::c_short {
        self.0
    }

    const fn is_up_and_running(self) -> bool {
        self.0 & UP_RUNNING == UP_RUNNING
    }
}

/// Reads the current flags of `name`.
///
/// # Errors
///
/// Returns [`NstunError::InterfaceLookup`] if the interface does not exist,
/// or [`NstunError::InterfaceFlag`] if the flags cannot be read.
pub fn query_flags(name: &str) -> Result<LinkFlags> {
    let _ = interface_index(name)?;
    let flag_err = |errno| NstunError::InterfaceFlag {
        name: name.to_string(),
        errno,
    };
    let sock = sys::control_socket().map_err(flag_err)?;
    let mut req = sys::ifreq_for(name);
    // SAFETY: `req` is a properly initialised ifreq that outlives the call and
    // `sock` is an open socket.
    let _ = unsafe { sys::get_flags(sock.as_raw_fd(), &raw mut req) }.map_err(flag_err)?;
    // SAFETY: SIOCGIFFLAGS fills the flags member of the union.
    Ok(LinkFlags(unsafe { req.ifr_ifru.ifru_flags }))
}

/// Sets the administrative up and running flags on `name`.
///
/// Does nothing when both are already set.
///
/// # Errors
///
/// Returns [`NstunError::InterfaceLookup`] if the interface does not exist,
/// or [`NstunError::InterfaceFlag`] if the kernel rejects the update.
pub fn bring_up(name: &str) -> Result<()> {
    let current = query_flags(name)?;
    if current.is_up_and_running() {
        tracing::debug!(name, "interface already up");
        return Ok(());
    }

    let sock = sys::control_socket().map_err(|errno| NstunError::InterfaceFlag {
        name: name.to_string(),
        errno,
    })?;
    let mut req = sys::ifreq_for(name);
    req.ifr_ifru.ifru_flags = current.bits() | UP_RUNNING;
    // SAFETY: `req` is a properly initialised ifreq that outlives the call.
    let _ = unsafe { sys::set_flags(sock.as_raw_fd(), &raw const req) }.map_err(|errno| {
        NstunError::InterfaceFlag {
            name: name.to_string(),
            errno,
        }
    })?;
    tracing::debug!(name, "interface brought up");
    Ok(())
}

/// Reads the MTU of `name`.
///
/// # Errors
///
/// Returns [`NstunError::InterfaceLookup`] if the interface does not exist
/// or its MTU cannot be read.
pub fn query_mtu(name: &str) -> Result<u32> {
    let _ = interface_index(name)?;
    let lookup_err = |errno| NstunError::InterfaceLookup {
        name: name.to_string(),
        errno,
    };
    let sock = sys::control_socket().map_err(lookup_err)?;
    let mut req = sys::ifreq_for(name);
    // SAFETY: `req` is a properly initialised ifreq that outlives the call.
    let _ = unsafe { sys::get_mtu(sock.as_raw_fd(), &raw mut req) }.map_err(lookup_err)?;
    // SAFETY: SIOCGIFMTU fills the mtu member of the union.
    let mtu = unsafe { req.ifr_ifru.ifru_mtu };
    u32::try_from(mtu).map_err(|_| lookup_err(Errno::EINVAL))
}

/// Sets the MTU of `name`.
///
/// # Errors
///
/// Returns [`NstunError::InterfaceLookup`] if the interface does not exist,
/// or [`NstunError::MtuSet`] if the kernel rejects the value.
pub fn set_mtu(name: &str, mtu: u32) -> Result<()> {
    let _ = interface_index(name)?;
    let mtu_err = |errno| NstunError::MtuSet {
        name: name.to_string(),
        mtu,
        errno,
    };
    let value = libc::c_int::try_from(mtu).map_err(|_| mtu_err(Errno::EINVAL))?;
    let sock = sys::control_socket().map_err(mtu_err)?;
    let mut req = sys::ifreq_for(name);
    req.ifr_ifru.ifru_mtu = value;
    // SAFETY: `req` is a properly initialised ifreq that outlives the call.
    let _ = unsafe { sys::set_mtu(sock.as_raw_fd(), &raw const req) }.map_err(mtu_err)?;
    tracing::debug!(name, mtu, "MTU set");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bring_up_twice_leaves_same_flags() {
        let before = query_flags("lo").unwrap();
        if !before.is_up() || !before.is_running() {
            // Raising loopback needs CAP_NET_ADMIN; only the no-op path is
            // exercised unprivileged.
            return;
        }
        bring_up("lo").unwrap();
        let first = query_flags("lo").unwrap();
        bring_up("lo").unwrap();
        let second = query_flags("lo").unwrap();
        assert_eq!(first, second);
        assert!(second.is_up() && second.is_running());
    }

    #[test]
    fn loopback_mtu_is_positive() {
        assert!(query_mtu("lo").unwrap() > 0);
    }

    #[test]
    fn bring_up_unknown_interface_fails_lookup() {
        let err = bring_up("nstun-absent2").unwrap_err();
        assert!(matches!(err, NstunError::InterfaceLookup { .. }));
    }

    #[test]
    fn set_mtu_unknown_interface_fails_lookup() {
        let err = set_mtu("nstun-absent3", 1280).unwrap_err();
        assert!(matches!(err, NstunError::InterfaceLookup { .. }));
    }

    #[test]
    fn flag_accessors_decode_bits() {
        let flags = LinkFlags(UP_RUNNING);
        assert!(flags.is_up());
        assert!(flags.is_running());
        assert!(flags.is_up_and_running());

        let admin_only = LinkFlags(IFF_UP);
        assert!(admin_only.is_up());
        assert!(!admin_only.is_up_and_running());
        assert!(!LinkFlags(0).is_up());
    }
}
