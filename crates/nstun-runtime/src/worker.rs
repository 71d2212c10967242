//! Disposable worker process.
//!
//! The worker is a `fork(2)` of the initiator. It closes every inherited
//! descriptor it does not need, builds the device (joining the target
//! namespace first), sends the outcome over its channel endpoint, and
//! exits. Nothing it does is visible to the initiator except that one
//! message and its exit status.

use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};

use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use nstun_common::error::{NstunError, Result};
use nstun_common::types::WorkerExit;
use nstun_core::namespace::NamespaceRef;
use nstun_core::tun::{self, DeviceRequest};

use crate::channel;

/// Exit status after the handle was sent.
const EXIT_SENT: i32 = 0;
/// Exit status after a failure was reported.
const EXIT_FAILED: i32 = 1;
/// Exit status when even the report could not be sent.
const EXIT_UNREPORTED: i32 = 2;
/// Exit status when the worker panicked.
const EXIT_PANICKED: i32 = 101;

static SPAWNED: AtomicU64 = AtomicU64::new(0);

/// Number of workers this process has forked so far.
#[must_use]
pub fn spawned_count() -> u64 {
    SPAWNED.load(Ordering::Relaxed)
}

/// A running worker process, reaped on drop.
#[derive(Debug)]
pub struct Worker {
    pid: Pid,
    reaped: bool,
}

impl Worker {
    /// Process id of the worker.
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    /// Blocks until the worker exits and returns how it ended.
    pub fn wait(&mut self) -> WorkerExit {
        if self.reaped {
            return WorkerExit::Unknown;
        }
        let exit = loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(_, code)) => break WorkerExit::Exited(code),
                Ok(WaitStatus::Signaled(_, sig, _)) => break WorkerExit::Signaled(sig as i32),
                Ok(_) | Err(nix::errno::Errno::EINTR) => {}
                Err(errno) => {
                    tracing::warn!(pid = %self.pid, %errno, "could not reap worker");
                    break WorkerExit::Unknown;
                }
            }
        };
        self.reaped = true;
        tracing::debug!(pid = %self.pid, %exit, "worker reaped");
        exit
    }

    /// Kills the worker and reaps it.
    pub fn kill(&mut self) -> WorkerExit {
        if !self.reaped {
            if let Err(errno) = kill(self.pid, Signal::SIGKILL) {
                tracing::warn!(pid = %self.pid, %errno, "could not kill worker");
            }
        }
        self.wait()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.kill();
        }
    }
}

/// Forks a worker that provisions `request` and reports over a new channel.
///
/// Returns the worker and the initiator's endpoint; the worker's endpoint
/// is closed in the initiator before this returns.
///
/// # Errors
///
/// Returns [`NstunError::HandleTransfer`] if the channel cannot be created
/// or the fork fails.
pub fn spawn(namespace: Option<&NamespaceRef>, request: &DeviceRequest) -> Result<(Worker, OwnedFd)> {
    let (initiator_end, worker_end) = channel::pair()?;

    // SAFETY: the child runs only `run_worker`, which performs system calls
    // and small allocations on this thread, then leaves through `_exit`
    // without returning into the caller's stack or running atexit handlers.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            drop(initiator_end);
            let status = catch_unwind(AssertUnwindSafe(|| run_worker(worker_end, namespace, request)))
                .unwrap_or(EXIT_PANICKED);
            // SAFETY: `_exit` ends the process immediately; no destructors
            // or atexit handlers inherited from the initiator run.
            unsafe { libc::_exit(status) }
        }
        Ok(ForkResult::Parent { child }) => {
            drop(worker_end);
            let spawned = SPAWNED.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::info!(pid = %child, name = %request.interface_name, spawned, "worker spawned");
            Ok((
                Worker {
                    pid: child,
                    reaped: false,
                },
                initiator_end,
            ))
        }
        Err(errno) => Err(NstunError::HandleTransfer {
            reason: format!("fork failed: {errno}"),
        }),
    }
}

/// Body of the worker process; returns its exit status.
fn run_worker(endpoint: OwnedFd, namespace: Option<&NamespaceRef>, request: &DeviceRequest) -> i32 {
    // Subscribers may hold locks taken by other initiator threads at fork time.
    let _silence = tracing::dispatcher::set_default(&tracing::Dispatch::none());

    let mut keep = vec![
        libc::STDIN_FILENO,
        libc::STDOUT_FILENO,
        libc::STDERR_FILENO,
        endpoint.as_raw_fd(),
    ];
    if let Some(ns) = namespace {
        keep.push(ns.as_fd().as_raw_fd());
    }
    close_inherited(&keep);

    match tun::create(namespace, request) {
        Ok(device) => {
            let sent = channel::send_handle(endpoint.as_fd(), device.as_fd());
            drop(device);
            drop(endpoint);
            if sent.is_ok() { EXIT_SENT } else { EXIT_UNREPORTED }
        }
        Err(e) => {
            if channel::send_failure(endpoint.as_fd(), &e).is_ok() {
                EXIT_FAILED
            } else {
                EXIT_UNREPORTED
            }
        }
    }
}

/// Closes every descriptor of this process not listed in `keep`.
///
/// Other initiator threads may have had channel endpoints open at fork
/// time; holding copies of them here would delay their peers' closure.
fn close_inherited(keep: &[RawFd]) {
    let Ok(entries) = std::fs::read_dir("/proc/self/fd") else {
        return;
    };
    let open: Vec<RawFd> = entries
        .flatten()
        .filter_map(|e| e.file_name().to_str().and_then(|s| s.parse().ok()))
        .collect();
    for fd in open.into_iter().filter(|fd| !keep.contains(fd)) {
        // SAFETY: nothing in this process uses `fd` after this point; the
        // objects owning it in the initiator are never dropped here because
        // the worker leaves through `_exit`.
        let _ = unsafe { libc::close(fd) };
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use nstun_common::config::TunConfig;
    use nstun_common::error::FailureCode;

    use super::*;
    use crate::channel::Outcome;

    fn request() -> DeviceRequest {
        DeviceRequest::new("64:ff9b::1", &TunConfig::default()).unwrap()
    }

    #[test]
    fn failed_worker_reports_then_exits() {
        let ns = NamespaceRef::from_fd(OwnedFd::from(File::open("/dev/null").unwrap()));
        let before = spawned_count();
        let (mut worker, endpoint) = spawn(Some(&ns), &request()).unwrap();
        assert!(spawned_count() > before);

        let outcome = channel::receive(endpoint.as_fd()).unwrap();
        assert!(matches!(
            outcome,
            Outcome::Failure {
                code: FailureCode::NamespaceSwitch,
                ..
            }
        ));
        assert_eq!(worker.wait(), WorkerExit::Exited(EXIT_FAILED));
        assert_eq!(worker.wait(), WorkerExit::Unknown);
    }

    #[test]
    fn dropped_worker_is_killed_and_reaped() {
        let ns = NamespaceRef::from_fd(OwnedFd::from(File::open("/dev/null").unwrap()));
        let (worker, endpoint) = spawn(Some(&ns), &request()).unwrap();
        let pid = worker.pid();
        drop(worker);
        drop(endpoint);
        assert_eq!(waitpid(pid, None), Err(nix::errno::Errno::ECHILD));
    }
}
