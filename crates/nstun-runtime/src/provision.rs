//! Provisioning orchestrator.
//!
//! Runs the device creator inside a forked worker and hands the resulting
//! descriptor back to the caller, who never leaves its own namespace.

use std::os::fd::{AsFd, OwnedFd};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nstun_common::config::TunConfig;
use nstun_common::error::{FailureCode, NstunError, Result};
use nstun_core::namespace::NamespaceRef;
use nstun_core::tun::{DeviceRequest, TunDevice};

use crate::cancel::CancelToken;
use crate::channel::{self, Outcome};
use crate::worker;

/// Longest single wait on the channel before re-checking the deadline and
/// the cancel token.
const POLL_SLICE_MS: u16 = 100;

/// Provisions TUN devices according to a [`TunConfig`].
///
/// Each call spawns its own worker and channel, so one provisioner can
/// serve concurrent calls from several threads.
#[derive(Debug, Clone, Default)]
pub struct Provisioner {
    config: TunConfig,
}

impl Provisioner {
    /// Creates a provisioner using `config`.
    #[must_use]
    pub const fn new(config: TunConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration applied to every device.
    #[must_use]
    pub const fn config(&self) -> &TunConfig {
        &self.config
    }

    /// Creates and configures a device inside `namespace` (or the caller's
    /// namespace for `None`) and returns the caller's handle on it.
    ///
    /// The address is validated before any process is spawned. A handle is
    /// only returned once the worker has fully configured the device.
    ///
    /// # Errors
    ///
    /// Returns [`NstunError::InvalidAddress`] or [`NstunError::Config`] for
    /// bad input, the worker's own failure (namespace switch, device
    /// creation, or a configuration step), [`NstunError::HandleTransfer`]
    /// if the worker died without reporting, or
    /// [`NstunError::HandleTransferTimeout`] when the configured bound
    /// elapses.
    pub fn provision(&self, namespace: Option<&NamespaceRef>, address: &str) -> Result<TunDevice> {
        self.run(namespace, address, None)
    }

    /// Same as [`Provisioner::provision`], aborting when `cancel` fires.
    ///
    /// # Errors
    ///
    /// In addition to the errors of [`Provisioner::provision`], returns
    /// [`NstunError::Cancelled`] once the token is cancelled; the worker is
    /// killed first.
    pub fn provision_cancellable(
        &self,
        namespace: Option<&NamespaceRef>,
        address: &str,
        cancel: &CancelToken,
    ) -> Result<TunDevice> {
        self.run(namespace, address, Some(cancel))
    }

    fn run(
        &self,
        namespace: Option<&NamespaceRef>,
        address: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<TunDevice> {
        let request = DeviceRequest::new(address, &self.config)?;
        tracing::info!(
            name = %request.interface_name,
            address = %request.address,
            mtu = request.mtu,
            netns = ?namespace.and_then(|ns| ns.id().ok()).map(|id| id.to_string()),
            "provisioning TUN device"
        );

        let (mut worker, endpoint) = worker::spawn(namespace, &request)?;
        let outcome = await_outcome(&endpoint, self.config.transfer_timeout_ms, cancel);
        drop(endpoint);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let exit = worker.kill();
                tracing::warn!(pid = %worker.pid(), %exit, error = %e, "worker abandoned");
                return Err(e);
            }
        };
        let exit = worker.wait();

        match outcome {
            Outcome::Handle(fd) => {
                if !exit.is_success() {
                    tracing::warn!(pid = %worker.pid(), %exit, "worker misbehaved after sending handle");
                }
                let device = TunDevice::from_fd(fd, request.interface_name.clone());
                tracing::info!(name = %device.name(), "device handle received");
                Ok(device)
            }
            Outcome::Failure { code, errno } => {
                let err = rebuild_error(code, errno, &request);
                tracing::warn!(pid = %worker.pid(), %exit, error = %err, "worker failed");
                Err(err)
            }
            Outcome::Closed => Err(NstunError::HandleTransfer {
                reason: format!("worker {exit} without sending a handle"),
            }),
        }
    }
}

/// Provisions a device with the default configuration and the given MTU.
///
/// # Errors
///
/// See [`Provisioner::provision`].
pub fn provision_tun_device(
    namespace: Option<&NamespaceRef>,
    address: &str,
    mtu: u32,
) -> Result<TunDevice> {
    let config = TunConfig {
        mtu,
        ..TunConfig::default()
    };
    Provisioner::new(config).provision(namespace, address)
}

/// Waits for the worker's single message, honouring `timeout_ms` and `cancel`.
fn await_outcome(
    endpoint: &OwnedFd,
    timeout_ms: Option<u64>,
    cancel: Option<&CancelToken>,
) -> Result<Outcome> {
    let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
    loop {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(NstunError::Cancelled);
        }
        let slice = deadline.map_or(POLL_SLICE_MS, |d| {
            let remaining = d.saturating_duration_since(Instant::now()).as_millis();
            u16::try_from(remaining.min(u128::from(POLL_SLICE_MS))).unwrap_or(POLL_SLICE_MS)
        });
        if channel::wait_readable(endpoint.as_fd(), slice)? {
            return channel::receive(endpoint.as_fd());
        }
        if let (Some(d), Some(ms)) = (deadline, timeout_ms) {
            if Instant::now() >= d {
                return Err(NstunError::HandleTransferTimeout { timeout_ms: ms });
            }
        }
    }
}

/// Rebuilds the worker's error from its report and the request it served.
fn rebuild_error(code: FailureCode, errno: Errno, request: &DeviceRequest) -> NstunError {
    let name = request.interface_name.clone();
    match code {
        FailureCode::NamespaceSwitch => NstunError::NamespaceSwitch { errno },
        FailureCode::DeviceCreate => NstunError::DeviceCreate { name, errno },
        FailureCode::InterfaceLookup => NstunError::InterfaceLookup { name, errno },
        FailureCode::InterfaceFlag => NstunError::InterfaceFlag { name, errno },
        FailureCode::AddressAssign => NstunError::AddressAssign {
            name,
            address: request.address,
            prefix_len: request.prefix_len,
            errno,
        },
        FailureCode::MtuSet => NstunError::MtuSet {
            name,
            mtu: request.mtu,
            errno,
        },
        FailureCode::Other => NstunError::HandleTransfer {
            reason: format!("worker failed: {errno}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DeviceRequest {
        DeviceRequest::new("64:ff9b::1", &TunConfig::default()).unwrap()
    }

    #[test]
    fn rebuilt_errors_keep_request_context() {
        let err = rebuild_error(FailureCode::MtuSet, Errno::EINVAL, &request());
        assert!(matches!(
            err,
            NstunError::MtuSet { ref name, mtu: 1304, errno: Errno::EINVAL } if name == "cjdns0"
        ));

        let err = rebuild_error(FailureCode::AddressAssign, Errno::EEXIST, &request());
        assert!(matches!(err, NstunError::AddressAssign { prefix_len: 8, .. }));
    }

    #[test]
    fn unknown_failures_become_transfer_errors() {
        let err = rebuild_error(FailureCode::Other, Errno::EIO, &request());
        assert!(matches!(err, NstunError::HandleTransfer { .. }));
    }

    #[test]
    fn silent_peer_times_out() {
        let (initiator, _worker) = channel::pair().unwrap();
        let started = Instant::now();
        let err = await_outcome(&initiator, Some(150), None).unwrap_err();
        assert!(matches!(err, NstunError::HandleTransferTimeout { timeout_ms: 150 }));
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn cancelled_token_stops_the_wait() {
        let (initiator, _worker) = channel::pair().unwrap();
        let token = CancelToken::new();
        let trigger = token.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            trigger.cancel();
        });

        let err = await_outcome(&initiator, None, Some(&token)).unwrap_err();
        assert!(matches!(err, NstunError::Cancelled));
        canceller.join().unwrap();
    }

    #[test]
    fn pending_message_wins_over_expired_deadline() {
        let (initiator, worker) = channel::pair().unwrap();
        channel::send_failure(worker.as_fd(), &NstunError::NamespaceSwitch { errno: Errno::EINVAL })
            .unwrap();
        let outcome = await_outcome(&initiator, Some(0), None).unwrap();
        assert!(matches!(outcome, Outcome::Failure { code: FailureCode::NamespaceSwitch, .. }));
    }
}
