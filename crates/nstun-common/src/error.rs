//! Unified error types for the nstun workspace.
//!
//! Every failure a provisioning attempt can produce is a variant of
//! [`NstunError`]. Kernel-originated variants keep the raw [`Errno`] so they
//! can be reported across the worker/initiator process boundary by
//! [`FailureCode`] and rebuilt on the other side.

use std::net::Ipv6Addr;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum NstunError {
    /// The address literal is not a valid IPv6 address.
    #[error("invalid IPv6 address {input:?}: {source}")]
    InvalidAddress {
        /// Text supplied by the caller.
        input: String,
        /// Parser failure.
        source: std::net::AddrParseError,
    },

    /// The worker could not join the requested network namespace.
    #[error("failed to join network namespace: {errno}")]
    NamespaceSwitch {
        /// Error returned by `setns(2)`.
        errno: Errno,
    },

    /// Opening the TUN control device or creating the interface failed.
    #[error("failed to create TUN device {name}: {errno}")]
    DeviceCreate {
        /// Requested interface name.
        name: String,
        /// Error returned by the kernel.
        errno: Errno,
    },

    /// The interface name could not be resolved in the current namespace.
    #[error("interface {name} not found: {errno}")]
    InterfaceLookup {
        /// Interface name.
        name: String,
        /// Error returned by the kernel.
        errno: Errno,
    },

    /// Reading or updating the interface flags failed.
    #[error("failed to bring interface {name} up: {errno}")]
    InterfaceFlag {
        /// Interface name.
        name: String,
        /// Error returned by the kernel.
        errno: Errno,
    },

    /// The address assignment request was rejected.
    #[error("failed to assign {address}/{prefix_len} to {name}: {errno}")]
    AddressAssign {
        /// Interface name.
        name: String,
        /// Address being assigned.
        address: Ipv6Addr,
        /// Prefix length being assigned.
        prefix_len: u8,
        /// Error returned by the kernel.
        errno: Errno,
    },

    /// The MTU update was rejected.
    #[error("failed to set MTU {mtu} on {name}: {errno}")]
    MtuSet {
        /// Interface name.
        name: String,
        /// Requested MTU.
        mtu: u32,
        /// Error returned by the kernel.
        errno: Errno,
    },

    /// The worker exited or closed its channel without transferring a handle.
    #[error("no device handle received from worker: {reason}")]
    HandleTransfer {
        /// What the initiator observed instead of a handle.
        reason: String,
    },

    /// No handle arrived within the configured bound.
    #[error("no device handle received within {timeout_ms} ms")]
    HandleTransferTimeout {
        /// Bound that elapsed.
        timeout_ms: u64,
    },

    /// The provisioning attempt was cancelled by the caller.
    #[error("provisioning cancelled")]
    Cancelled,

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl NstunError {
    /// Returns the code identifying this failure on the worker channel.
    #[must_use]
    pub const fn failure_code(&self) -> FailureCode {
        match self {
            Self::NamespaceSwitch { .. } => FailureCode::NamespaceSwitch,
            Self::DeviceCreate { .. } => FailureCode::DeviceCreate,
            Self::InterfaceLookup { .. } => FailureCode::InterfaceLookup,
            Self::InterfaceFlag { .. } => FailureCode::InterfaceFlag,
            Self::AddressAssign { .. } => FailureCode::AddressAssign,
            Self::MtuSet { .. } => FailureCode::MtuSet,
            _ => FailureCode::Other,
        }
    }

    /// Returns the kernel error carried by this failure, if any.
    #[must_use]
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Self::NamespaceSwitch { errno }
            | Self::DeviceCreate { errno, .. }
            | Self::InterfaceLookup { errno, .. }
            | Self::InterfaceFlag { errno, .. }
            | Self::AddressAssign { errno, .. }
            | Self::MtuSet { errno, .. } => Some(*errno),
            Self::Io { source, .. } => source.raw_os_error().map(Errno::from_raw),
            _ => None,
        }
    }
}

/// Compact identifier of a worker-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FailureCode {
    /// See [`NstunError::NamespaceSwitch`].
    NamespaceSwitch = 1,
    /// See [`NstunError::DeviceCreate`].
    DeviceCreate = 2,
    /// See [`NstunError::InterfaceLookup`].
    InterfaceLookup = 3,
    /// See [`NstunError::InterfaceFlag`].
    InterfaceFlag = 4,
    /// See [`NstunError::AddressAssign`].
    AddressAssign = 5,
    /// See [`NstunError::MtuSet`].
    MtuSet = 6,
    /// Any failure without a dedicated code.
    Other = 255,
}

impl FailureCode {
    /// Decodes a code byte, mapping unknown values to [`FailureCode::Other`].
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Self::NamespaceSwitch,
            2 => Self::DeviceCreate,
            3 => Self::InterfaceLookup,
            4 => Self::InterfaceFlag,
            5 => Self::AddressAssign,
            6 => Self::MtuSet,
            _ => Self::Other,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, NstunError>;
