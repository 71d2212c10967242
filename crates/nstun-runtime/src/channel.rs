//! Descriptor-passing channel between the initiator and its worker.
//!
//! Each call carries exactly one 8-byte frame:
//!
//! ```text
//! [status u8][code u8][reserved u16][errno i32 LE]
//! ```
//!
//! A success frame carries the device descriptor in an `SCM_RIGHTS`
//! control message. A failure frame carries no descriptor; its code and
//! errno let the initiator rebuild the worker's error.
//!
//! The worker channel is a `SOCK_SEQPACKET` pair, so [`receive`] reads a
//! frame in one call. [`receive_stream`] is for `SOCK_STREAM` peers, where
//! a frame may arrive in pieces.

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::socket::{
    AddressFamily, ControlMessage, ControlMessageOwned, MsgFlags, SockFlag, SockType, recvmsg,
    sendmsg, socketpair,
};
use nstun_common::error::{FailureCode, NstunError, Result};

const FRAME_LEN: usize = 8;
const STATUS_OK: u8 = 0;
const STATUS_FAILED: u8 = 1;
/// Descriptors accepted per message; any beyond the first are closed.
const MAX_FDS: usize = 4;

/// The one message a worker sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// The device was created and configured; a descriptor accompanies it.
    Success,
    /// A step failed inside the worker.
    Failure {
        /// Which step failed.
        code: FailureCode,
        /// Kernel error reported by that step.
        errno: Errno,
    },
}

impl Frame {
    fn encode(self) -> [u8; FRAME_LEN] {
        let mut bytes = [0u8; FRAME_LEN];
        match self {
            Self::Success => bytes[0] = STATUS_OK,
            Self::Failure { code, errno } => {
                bytes[0] = STATUS_FAILED;
                bytes[1] = code as u8;
                bytes[4..].copy_from_slice(&(errno as i32).to_le_bytes());
            }
        }
        bytes
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != FRAME_LEN {
            return None;
        }
        match bytes[0] {
            STATUS_OK => Some(Self::Success),
            STATUS_FAILED => {
                let raw = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
                Some(Self::Failure {
                    code: FailureCode::from_byte(bytes[1]),
                    errno: Errno::from_raw(raw),
                })
            }
            _ => None,
        }
    }
}

/// What the initiator got from the channel.
#[derive(Debug)]
pub enum Outcome {
    /// A descriptor for the configured device.
    Handle(OwnedFd),
    /// The worker reported a failure.
    Failure {
        /// Which step failed.
        code: FailureCode,
        /// Kernel error reported by that step.
        errno: Errno,
    },
    /// The peer closed the channel without sending anything.
    Closed,
}

/// Creates the connected pair `(initiator, worker)` of channel endpoints.
///
/// `SOCK_SEQPACKET` keeps the frame boundary and turns peer closure into
/// a zero-length read.
///
/// # Errors
///
/// Returns [`NstunError::HandleTransfer`] if the socket pair cannot be created.
pub fn pair() -> Result<(OwnedFd, OwnedFd)> {
    socketpair(
        AddressFamily::Unix,
        SockType::SeqPacket,
        None,
        SockFlag::SOCK_CLOEXEC,
    )
    .map_err(|errno| NstunError::HandleTransfer {
        reason: format!("socketpair failed: {errno}"),
    })
}

/// Sends a success frame carrying `handle`.
///
/// The receiver gets its own descriptor on the same open file description.
///
/// # Errors
///
/// Returns the errno of `sendmsg(2)`.
pub fn send_handle(sock: BorrowedFd<'_>, handle: BorrowedFd<'_>) -> nix::Result<()> {
    send_frame(sock, Frame::Success, Some(handle))
}

/// Sends a failure frame describing `err`.
///
/// # Errors
///
/// Returns the errno of `sendmsg(2)`.
pub fn send_failure(sock: BorrowedFd<'_>, err: &NstunError) -> nix::Result<()> {
    let frame = Frame::Failure {
        code: err.failure_code(),
        errno: err.errno().unwrap_or(Errno::UnknownErrno),
    };
    send_frame(sock, frame, None)
}

fn send_frame(sock: BorrowedFd<'_>, frame: Frame, handle: Option<BorrowedFd<'_>>) -> nix::Result<()> {
    let bytes = frame.encode();
    let iov = [IoSlice::new(&bytes)];
    let fds: Vec<RawFd> = handle.iter().map(AsRawFd::as_raw_fd).collect();
    let cmsgs: Vec<ControlMessage<'_>> = if fds.is_empty() {
        Vec::new()
    } else {
        vec![ControlMessage::ScmRights(&fds)]
    };

    loop {
        match sendmsg::<()>(sock.as_raw_fd(), &iov, &cmsgs, MsgFlags::MSG_NOSIGNAL, None) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => {}
            Err(errno) => return Err(errno),
        }
    }
}

/// Waits up to `timeout_ms` for the channel to become readable.
///
/// Returns `true` when a frame or closure is pending. An interrupted wait
/// counts as not ready.
///
/// # Errors
///
/// Returns [`NstunError::HandleTransfer`] if `poll(2)` fails.
pub fn wait_readable(sock: BorrowedFd<'_>, timeout_ms: u16) -> Result<bool> {
    let mut fds = [PollFd::new(sock, PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::from(timeout_ms)) {
        Ok(ready) => Ok(ready > 0),
        Err(Errno::EINTR) => Ok(false),
        Err(errno) => Err(NstunError::HandleTransfer {
            reason: format!("poll failed: {errno}"),
        }),
    }
}

/// Receives the single frame sent over a `SOCK_SEQPACKET` socket.
///
/// Extra or unexpected descriptors are closed.
///
/// # Errors
///
/// Returns [`NstunError::HandleTransfer`] if the receive fails, the frame is
/// malformed, or a success frame arrives without a descriptor.
pub fn receive(sock: BorrowedFd<'_>) -> Result<Outcome> {
    let mut bytes = [0u8; 2 * FRAME_LEN];
    let (len, fds) = receive_raw(sock, &mut bytes).map_err(recv_failed)?;
    if len == 0 && fds.is_empty() {
        return Ok(Outcome::Closed);
    }
    outcome_of(&bytes[..len], fds)
}

/// Receives one frame from a `SOCK_STREAM` socket, reading until the whole
/// frame has arrived.
///
/// # Errors
///
/// Same as [`receive`]; a stream that ends mid-frame is also an error.
pub fn receive_stream(sock: BorrowedFd<'_>) -> Result<Outcome> {
    let mut bytes = [0u8; FRAME_LEN];
    let mut filled = 0;
    let mut fds = Vec::new();
    while filled < FRAME_LEN {
        let (len, more) = receive_raw(sock, &mut bytes[filled..]).map_err(recv_failed)?;
        fds.extend(more);
        if len == 0 {
            if filled == 0 && fds.is_empty() {
                return Ok(Outcome::Closed);
            }
            return Err(NstunError::HandleTransfer {
                reason: format!("stream closed after {filled} of {FRAME_LEN} frame bytes"),
            });
        }
        filled += len;
    }
    outcome_of(&bytes, fds)
}

fn recv_failed(errno: Errno) -> NstunError {
    NstunError::HandleTransfer {
        reason: format!("recvmsg failed: {errno}"),
    }
}

fn outcome_of(bytes: &[u8], mut fds: Vec<OwnedFd>) -> Result<Outcome> {
    let frame = Frame::decode(bytes).ok_or_else(|| NstunError::HandleTransfer {
        reason: format!("malformed frame of {} bytes", bytes.len()),
    })?;

    match frame {
        Frame::Success if fds.is_empty() => Err(NstunError::HandleTransfer {
            reason: "success reported without a descriptor".into(),
        }),
        Frame::Success => Ok(Outcome::Handle(fds.swap_remove(0))),
        Frame::Failure { code, errno } => Ok(Outcome::Failure { code, errno }),
    }
}

/// One `recvmsg(2)` into `buf`, collecting any passed descriptors.
fn receive_raw(sock: BorrowedFd<'_>, buf: &mut [u8]) -> nix::Result<(usize, Vec<OwnedFd>)> {
    let mut iov = [IoSliceMut::new(buf)];
    let mut control = nix::cmsg_space!([RawFd; MAX_FDS]);
    loop {
        let msg = match recvmsg::<()>(
            sock.as_raw_fd(),
            &mut iov,
            Some(&mut control),
            MsgFlags::MSG_CMSG_CLOEXEC,
        ) {
            Ok(msg) => msg,
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(errno),
        };

        let mut fds = Vec::new();
        for cmsg in msg.cmsgs()? {
            if let ControlMessageOwned::ScmRights(raw) = cmsg {
                // SAFETY: SCM_RIGHTS delivers fresh descriptors installed in
                // this process; nothing else refers to them.
                fds.extend(raw.into_iter().map(|fd| unsafe { OwnedFd::from_raw_fd(fd) }));
            }
        }
        return Ok((msg.bytes, fds));
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::{Read, Write};
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn frame_encoding_is_stable() {
        let bytes = Frame::Failure {
            code: FailureCode::MtuSet,
            errno: Errno::EINVAL,
        }
        .encode();
        assert_eq!(bytes[0], STATUS_FAILED);
        assert_eq!(bytes[1], 6);
        assert_eq!(i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 22);
        assert_eq!(Frame::Success.encode(), [0; FRAME_LEN]);
    }

    #[test]
    fn short_or_unknown_frames_are_rejected() {
        assert_eq!(Frame::decode(&[0; 4]), None);
        assert_eq!(Frame::decode(&[9, 0, 0, 0, 0, 0, 0, 0]), None);
    }

    #[test]
    fn passed_descriptor_shares_the_open_file() {
        let (initiator, worker) = pair().unwrap();
        let (reader, writer) = nix::unistd::pipe().unwrap();

        send_handle(worker.as_fd(), writer.as_fd()).unwrap();
        drop(writer);

        let Outcome::Handle(received) = receive(initiator.as_fd()).unwrap() else {
            panic!("expected a handle");
        };
        File::from(received).write_all(b"frame").unwrap();

        let mut buf = String::new();
        File::from(reader).read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "frame");
    }

    #[test]
    fn failure_report_carries_code_and_errno() {
        let (initiator, worker) = pair().unwrap();
        let err = NstunError::NamespaceSwitch {
            errno: Errno::EPERM,
        };
        send_failure(worker.as_fd(), &err).unwrap();

        let outcome = receive(initiator.as_fd()).unwrap();
        assert!(matches!(
            outcome,
            Outcome::Failure {
                code: FailureCode::NamespaceSwitch,
                errno: Errno::EPERM
            }
        ));
    }

    #[test]
    fn closed_peer_is_reported_as_closed() {
        let (initiator, worker) = pair().unwrap();
        drop(worker);

        assert!(wait_readable(initiator.as_fd(), 100).unwrap());
        assert!(matches!(receive(initiator.as_fd()).unwrap(), Outcome::Closed));
    }

    #[test]
    fn idle_channel_is_not_readable() {
        let (initiator, _worker) = pair().unwrap();
        assert!(!wait_readable(initiator.as_fd(), 10).unwrap());
    }

    #[test]
    fn stream_frame_split_across_reads_is_reassembled() {
        let (left, mut right) = UnixStream::pair().unwrap();
        let (reader, writer) = nix::unistd::pipe().unwrap();

        let bytes = Frame::Success.encode();
        let fds = [writer.as_raw_fd()];
        let _ = sendmsg::<()>(
            right.as_raw_fd(),
            &[IoSlice::new(&bytes[..3])],
            &[ControlMessage::ScmRights(&fds)],
            MsgFlags::empty(),
            None,
        )
        .unwrap();
        drop(writer);
        right.write_all(&bytes[3..]).unwrap();

        let Outcome::Handle(received) = receive_stream(left.as_fd()).unwrap() else {
            panic!("expected a handle");
        };
        File::from(received).write_all(b"ok").unwrap();

        let mut buf = String::new();
        File::from(reader).read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "ok");
    }

    #[test]
    fn stream_ending_mid_frame_is_an_error() {
        let (left, mut right) = UnixStream::pair().unwrap();
        right.write_all(&[STATUS_FAILED, 1, 0]).unwrap();
        drop(right);

        let err = receive_stream(left.as_fd()).unwrap_err();
        assert!(matches!(err, NstunError::HandleTransfer { .. }));
    }

    #[test]
    fn empty_stream_is_closed() {
        let (left, right) = UnixStream::pair().unwrap();
        drop(right);
        assert!(matches!(receive_stream(left.as_fd()).unwrap(), Outcome::Closed));
    }
}
