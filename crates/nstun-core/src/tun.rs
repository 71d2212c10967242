//! Namespace-scoped TUN device creation.
//!
//! [`create`] optionally joins a network namespace, asks the kernel for a
//! TUN interface with a fixed name, and configures it. The returned
//! [`TunDevice`] owns the only descriptor on the device; dropping it
//! removes a non-persistent interface.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::net::Ipv6Addr;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;

use nstun_common::config::TunConfig;
use nstun_common::constants::TUN_CONTROL_PATH;
use nstun_common::error::{NstunError, Result};

use crate::interface;
use crate::namespace::NamespaceRef;
use crate::sys;

#[allow(clippy::cast_possible_truncation)]
const IFF_TUN: libc::c_short = libc::IFF_TUN as libc::c_short;
#[allow(clippy::cast_possible_truncation)]
const IFF_NO_PI: libc::c_short = libc::IFF_NO_PI as libc::c_short;

/// Everything needed to build and configure one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    /// Interface name to request.
    pub interface_name: String,
    /// Address to assign.
    pub address: Ipv6Addr,
    /// Prefix length assigned with the address.
    pub prefix_len: u8,
    /// Link MTU.
    pub mtu: u32,
    /// Keep the packet information header on frames.
    pub packet_info: bool,
    /// Keep the interface once the last descriptor closes.
    pub persist: bool,
}

impl DeviceRequest {
    /// Builds a request from an address literal and the configured settings.
    ///
    /// # Errors
    ///
    /// Returns [`NstunError::InvalidAddress`] if `address` is not an IPv6
    /// literal, or [`NstunError::Config`] if `config` is invalid.
    pub fn new(address: &str, config: &TunConfig) -> Result<Self> {
        let address = parse_address(address)?;
        config.validate()?;
        Ok(Self {
            interface_name: config.interface_name.clone(),
            address,
            prefix_len: config.prefix_len,
            mtu: config.mtu,
            packet_info: config.packet_info,
            persist: config.persist,
        })
    }
}

/// Parses an IPv6 address literal.
///
/// # Errors
///
/// Returns [`NstunError::InvalidAddress`] on malformed input.
pub fn parse_address(input: &str) -> Result<Ipv6Addr> {
    input
        .parse::<Ipv6Addr>()
        .map_err(|source| NstunError::InvalidAddress {
            input: input.to_string(),
            source,
        })
}

/// An open, configured TUN device.
///
/// Reads and writes move whole IP packets (prefixed with the 4-byte packet
/// information header unless it was disabled).
#[derive(Debug)]
pub struct TunDevice {
    file: File,
    name: String,
}

impl TunDevice {
    /// Takes ownership of a descriptor on the TUN device named `name`.
    #[must_use]
    pub fn from_fd(fd: OwnedFd, name: impl Into<String>) -> Self {
        Self {
            file: File::from(fd),
            name: name.into(),
        }
    }

    /// Returns the interface name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the underlying file for packet I/O.
    #[must_use]
    pub const fn file(&self) -> &File {
        &self.file
    }

    /// Gives up ownership of the descriptor.
    #[must_use]
    pub fn into_fd(self) -> OwnedFd {
        OwnedFd::from(self.file)
    }
}

impl AsFd for TunDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for TunDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl IntoRawFd for TunDevice {
    fn into_raw_fd(self) -> RawFd {
        self.file.into_raw_fd()
    }
}

impl Read for TunDevice {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for TunDevice {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

/// Creates and configures a TUN device, inside `namespace` if given.
///
/// Joining the namespace is irreversible for the calling thread. When any
/// step after device creation fails, the device is closed before the error
/// is returned.
///
/// # Errors
///
/// Returns [`NstunError::NamespaceSwitch`] if the namespace cannot be
/// joined (no device is created then), [`NstunError::DeviceCreate`] if the
/// interface cannot be created, or the configuration step error.
pub fn create(namespace: Option<&NamespaceRef>, request: &DeviceRequest) -> Result<TunDevice> {
    if let Some(ns) = namespace {
        ns.join()?;
    }

    let device = open_device(request)?;
    tracing::info!(name = %device.name(), fd = device.as_raw_fd(), "TUN device created");

    if let Err(e) = interface::configure(
        device.name(),
        request.address,
        request.prefix_len,
        request.mtu,
    ) {
        tracing::debug!(name = %device.name(), error = %e, "closing unconfigured device");
        drop(device);
        return Err(e);
    }

    if request.persist {
        set_persist(&device)?;
    }
    Ok(device)
}

/// Opens the TUN control device and binds it to a new interface.
fn open_device(request: &DeviceRequest) -> Result<TunDevice> {
    let create_err = |errno| NstunError::DeviceCreate {
        name: request.interface_name.clone(),
        errno,
    };
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_CLOEXEC)
        .open(TUN_CONTROL_PATH)
        .map_err(|e| create_err(sys::errno_of(&e)))?;

    let mut req = sys::ifreq_for(&request.interface_name);
    req.ifr_ifru.ifru_flags = if request.packet_info {
        IFF_TUN
    } else {
        IFF_TUN | IFF_NO_PI
    };
    // SAFETY: `file` is an open /dev/net/tun descriptor and `req` is a
    // properly initialised ifreq that outlives the call.
    let _ = unsafe { sys::tun_set_iff(file.as_raw_fd(), &raw const req) }.map_err(create_err)?;

    Ok(TunDevice {
        file,
        name: request.interface_name.clone(),
    })
}

fn set_persist(device: &TunDevice) -> Result<()> {
    // SAFETY: the descriptor is an attached TUN device.
    let _ = unsafe { sys::tun_set_persist(device.as_raw_fd(), 1) }.map_err(|errno| {
        NstunError::DeviceCreate {
            name: device.name().to_string(),
            errno,
        }
    })?;
    tracing::debug!(name = %device.name(), "device marked persistent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn tun_descriptors() -> usize {
        std::fs::read_dir("/proc/self/fd")
            .unwrap()
            .flatten()
            .filter(|e| {
                std::fs::read_link(e.path()).is_ok_and(|t| t == Path::new(TUN_CONTROL_PATH))
            })
            .count()
    }

    #[test]
    fn request_parses_address_and_copies_config() {
        let request = DeviceRequest::new("64:ff9b::1", &TunConfig::default()).unwrap();
        assert_eq!(request.address, "64:ff9b::1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(request.interface_name, "cjdns0");
        assert_eq!(request.prefix_len, 8);
        assert_eq!(request.mtu, 1304);
    }

    #[test]
    fn request_rejects_malformed_address() {
        let err = DeviceRequest::new("not-an-address", &TunConfig::default()).unwrap_err();
        assert!(matches!(err, NstunError::InvalidAddress { ref input, .. } if input == "not-an-address"));
    }

    #[test]
    fn request_rejects_ipv4_address() {
        let err = DeviceRequest::new("10.0.0.1", &TunConfig::default()).unwrap_err();
        assert!(matches!(err, NstunError::InvalidAddress { .. }));
    }

    #[test]
    fn surrounding_whitespace_is_not_an_address() {
        for input in [" 64:ff9b::1", "64:ff9b::1 ", "64:ff9b::1\n"] {
            let err = parse_address(input).unwrap_err();
            assert!(matches!(err, NstunError::InvalidAddress { .. }), "{input:?}");
        }
    }

    #[test]
    fn request_rejects_invalid_config() {
        let config = TunConfig {
            mtu: 0,
            ..TunConfig::default()
        };
        let err = DeviceRequest::new("fc00::1", &config).unwrap_err();
        assert!(matches!(err, NstunError::Config { .. }));
    }

    #[test]
    fn failed_create_leaves_no_descriptor_open() {
        let config = TunConfig {
            interface_name: "nstunleak0".into(),
            // Below the kernel minimum, so configuration fails after creation
            // when the device can be created at all.
            mtu: 10,
            ..TunConfig::default()
        };
        let request = DeviceRequest::new("fc00::1", &config).unwrap();
        let before = tun_descriptors();

        let err = create(None, &request).unwrap_err();
        // MtuSet when privileged, DeviceCreate otherwise; a kernel without
        // IPv6 fails earlier in configuration.
        assert!(
            !matches!(err, NstunError::InvalidAddress { .. } | NstunError::Config { .. }),
            "unexpected error: {err}"
        );
        assert_eq!(tun_descriptors(), before);
        assert!(interface::interface_index("nstunleak0").is_err());
    }
}
