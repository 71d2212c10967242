//! Handing a provisioned device to a consumer over a Unix socket path.
//!
//! The consumer (typically a packet router started alongside) listens on a
//! socket path; the device descriptor is sent with the same frame format
//! as the worker channel.

use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use nstun_common::constants::{HANDOFF_CONNECT_ATTEMPTS, HANDOFF_RETRY_DELAY_MS};
use nstun_common::error::{NstunError, Result};

use crate::channel::{self, Outcome};

/// Connects to `path` and sends `handle` over it.
///
/// The consumer may still be starting, so connection is retried a bounded
/// number of times. The connected stream is returned; the consumer sees
/// the session end when it is dropped.
///
/// # Errors
///
/// Returns [`NstunError::Io`] if no connection could be made and
/// [`NstunError::HandleTransfer`] if sending fails.
pub fn send_to_socket(path: &Path, handle: &impl AsFd) -> Result<UnixStream> {
    let stream = connect_with_retry(path)?;
    channel::send_handle(stream.as_fd(), handle.as_fd()).map_err(|errno| {
        NstunError::HandleTransfer {
            reason: format!("sending to {}: {errno}", path.display()),
        }
    })?;
    tracing::info!(path = %path.display(), "device handed off");
    Ok(stream)
}

/// Receives one device descriptor from a connected handoff stream.
///
/// # Errors
///
/// Returns [`NstunError::HandleTransfer`] if the peer closed the stream or
/// sent something other than a descriptor.
pub fn receive_from_stream(stream: &UnixStream) -> Result<OwnedFd> {
    match channel::receive_stream(stream.as_fd())? {
        Outcome::Handle(fd) => Ok(fd),
        Outcome::Closed => Err(NstunError::HandleTransfer {
            reason: "handoff stream closed".into(),
        }),
        Outcome::Failure { errno, .. } => Err(NstunError::HandleTransfer {
            reason: format!("handoff peer reported failure: {errno}"),
        }),
    }
}

fn connect_with_retry(path: &Path) -> Result<UnixStream> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match UnixStream::connect(path) {
            Ok(stream) => {
                tracing::debug!(path = %path.display(), attempt, "connected to consumer");
                return Ok(stream);
            }
            Err(e) if attempt >= HANDOFF_CONNECT_ATTEMPTS => {
                return Err(NstunError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
            Err(_) => std::thread::sleep(Duration::from_millis(HANDOFF_RETRY_DELAY_MS)),
        }
    }
}
