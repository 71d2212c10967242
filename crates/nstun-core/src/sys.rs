//! Raw kernel request structures and ioctl wrappers.

use std::os::fd::OwnedFd;

use nix::sys::socket::{AddressFamily, SockFlag, SockType, socket};
use nstun_common::constants::IFNAMSIZ;

/// `_IOW('T', 202, int)`
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;
/// `_IOW('T', 203, int)`
const TUNSETPERSIST: libc::c_ulong = 0x4004_54cb;

/// IPv6 counterpart of `ifreq` consumed by `SIOCSIFADDR` on an `AF_INET6` socket.
#[repr(C)]
pub struct In6Ifreq {
    pub ifr6_addr: libc::in6_addr,
    pub ifr6_prefixlen: u32,
    pub ifr6_ifindex: libc::c_int,
}

nix::ioctl_read_bad!(get_flags, libc::SIOCGIFFLAGS, libc::ifreq);
nix::ioctl_write_ptr_bad!(set_flags, libc::SIOCSIFFLAGS, libc::ifreq);
nix::ioctl_read_bad!(get_mtu, libc::SIOCGIFMTU, libc::ifreq);
nix::ioctl_write_ptr_bad!(set_mtu, libc::SIOCSIFMTU, libc::ifreq);
nix::ioctl_write_ptr_bad!(set_addr6, libc::SIOCSIFADDR, In6Ifreq);
nix::ioctl_write_ptr_bad!(tun_set_iff, TUNSETIFF, libc::ifreq);
nix::ioctl_write_int_bad!(tun_set_persist, TUNSETPERSIST);

/// Builds a zeroed `ifreq` carrying `name`, truncated to fit with its NUL.
pub fn ifreq_for(name: &str) -> libc::ifreq {
    // SAFETY: ifreq is a plain C struct of integers and unions of integers;
    // the all-zero bit pattern is a valid value.
    let mut req: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, src) in req
        .ifr_name
        .iter_mut()
        .zip(name.as_bytes().iter().take(IFNAMSIZ - 1))
    {
        *dst = libc::c_char::from_ne_bytes([*src]);
    }
    req
}

/// Opens the throwaway socket used for one interface request.
///
/// Each configuration call opens its own and drops it on return.
pub fn control_socket() -> nix::Result<OwnedFd> {
    socket(
        AddressFamily::Inet6,
        SockType::Datagram,
        SockFlag::SOCK_CLOEXEC,
        None,
    )
}

/// Maps an I/O error to the errno it carries, defaulting to `EIO`.
pub fn errno_of(err: &std::io::Error) -> nix::errno::Errno {
    err.raw_os_error()
        .map_or(nix::errno::Errno::EIO, nix::errno::Errno::from_raw)
}
