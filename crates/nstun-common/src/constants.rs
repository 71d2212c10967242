//! System-wide constants and default values.

/// Default name of the provisioned TUN interface.
///
/// Only one interface with this name can exist per network namespace, so
/// only one device per namespace can be provisioned with the default.
pub const DEFAULT_INTERFACE_NAME: &str = "cjdns0";

/// Prefix length assigned alongside the interface address.
pub const DEFAULT_PREFIX_LEN: u8 = 8;

/// Default link MTU of the provisioned interface.
pub const DEFAULT_MTU: u32 = 1304;

/// Default bound on the wait for the worker's handle, in milliseconds.
pub const DEFAULT_TRANSFER_TIMEOUT_MS: u64 = 30_000;

/// Kernel TUN/TAP control device.
pub const TUN_CONTROL_PATH: &str = "/dev/net/tun";

/// Network namespace of the calling process.
pub const SELF_NETNS_PATH: &str = "/proc/self/ns/net";

/// Kernel table of configured IPv6 addresses.
pub const IF_INET6_PATH: &str = "/proc/net/if_inet6";

/// Root of the process filesystem.
pub const PROC_PATH: &str = "/proc";

/// Maximum interface name length including the trailing NUL.
pub const IFNAMSIZ: usize = 16;

/// Connection attempts made when handing a device to a consumer socket.
pub const HANDOFF_CONNECT_ATTEMPTS: u32 = 1000;

/// Delay between two handoff connection attempts, in milliseconds.
pub const HANDOFF_RETRY_DELAY_MS: u64 = 10;

/// Application name used in CLI output.
pub const APP_NAME: &str = "nstun";
