//! Configuration model for TUN provisioning.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_INTERFACE_NAME, DEFAULT_MTU, DEFAULT_PREFIX_LEN, DEFAULT_TRANSFER_TIMEOUT_MS, IFNAMSIZ,
};
use crate::error::{NstunError, Result};

/// Settings applied to every provisioned device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunConfig {
    /// Name requested for the TUN interface.
    pub interface_name: String,
    /// Prefix length assigned with the address.
    pub prefix_len: u8,
    /// Link MTU.
    pub mtu: u32,
    /// Bound on the wait for the worker's handle. `None` waits forever.
    pub transfer_timeout_ms: Option<u64>,
    /// Keep the 4-byte packet information header on each frame.
    pub packet_info: bool,
    /// Keep the interface after the last descriptor is closed.
    pub persist: bool,
}

impl Default for TunConfig {
    fn default() -> Self {
        Self {
            interface_name: DEFAULT_INTERFACE_NAME.to_string(),
            prefix_len: DEFAULT_PREFIX_LEN,
            mtu: DEFAULT_MTU,
            transfer_timeout_ms: Some(DEFAULT_TRANSFER_TIMEOUT_MS),
            packet_info: true,
            persist: false,
        }
    }
}

impl TunConfig {
    /// Loads a configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// [`TunConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading configuration");
        let raw = std::fs::read_to_string(path).map_err(|e| NstunError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values the kernel would otherwise reject mid-provisioning.
    ///
    /// # Errors
    ///
    /// Returns [`NstunError::Config`] for an empty or overlong interface
    /// name, a prefix length above 128, or a zero MTU.
    pub fn validate(&self) -> Result<()> {
        validate_interface_name(&self.interface_name)?;
        if self.prefix_len > 128 {
            return Err(NstunError::Config {
                message: format!("prefix length {} exceeds 128", self.prefix_len),
            });
        }
        if self.mtu == 0 {
            return Err(NstunError::Config {
                message: "MTU must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Checks that `name` fits a kernel interface name.
///
/// # Errors
///
/// Returns [`NstunError::Config`] if the name is empty, too long, or
/// contains a NUL byte, `/`, or whitespace.
pub fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() >= IFNAMSIZ {
        return Err(NstunError::Config {
            message: format!(
                "interface name {name:?} must be 1 to {} bytes",
                IFNAMSIZ - 1
            ),
        });
    }
    if name
        .bytes()
        .any(|b| b == 0 || b == b'/' || b.is_ascii_whitespace())
    {
        return Err(NstunError::Config {
            message: format!("interface name {name:?} contains an invalid character"),
        });
    }
    Ok(())
}
