//! Interruptible reads from a file descriptor
//!
//! Standard input never reaches end-of-stream while an interactive child is
//! running, so a plain blocking `read` would leave the input pump stuck after
//! the child exits. [`CancelReader`] polls the descriptor together with the
//! read end of a wake pipe; [`CancelHandle::cancel`] writes to the pipe and
//! the pending read returns [`ReadEvent::Cancelled`].

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Result of one [`CancelReader::read`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEvent {
    /// `n` bytes were read into the buffer
    Data(usize),
    /// The descriptor reported end-of-stream
    Eof,
    /// [`CancelHandle::cancel`] was called
    Cancelled,
}

/// Reader half, owned by the pump thread
#[derive(Debug)]
pub struct CancelReader {
    fd: RawFd,
    wake: OwnedFd,
    cancelled: Arc<AtomicBool>,
}

/// Cancelling half, owned by the session. Dropping it cancels the reader.
#[derive(Debug)]
pub struct CancelHandle {
    wake: OwnedFd,
    cancelled: Arc<AtomicBool>,
}

/// Create a cancellable reader over `fd`. The descriptor is borrowed, never closed.
pub fn cancel_reader(fd: RawFd) -> io::Result<(CancelReader, CancelHandle)> {
    let (read_end, write_end) = wake_pipe()?;
    let cancelled = Arc::new(AtomicBool::new(false));
    Ok((
        CancelReader {
            fd,
            wake: read_end,
            cancelled: Arc::clone(&cancelled),
        },
        CancelHandle {
            wake: write_end,
            cancelled,
        },
    ))
}

fn wake_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe(2) just returned two fresh descriptors we now own.
    let (read_end, write_end) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    for fd in [&read_end, &write_end] {
        if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok((read_end, write_end))
}

impl CancelReader {
    /// Block until data arrives, the descriptor closes, or the handle cancels.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadEvent> {
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return Ok(ReadEvent::Cancelled);
            }

            let mut fds = [
                libc::pollfd {
                    fd: self.fd,
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.wake.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];
            let result = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if result < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            if fds[1].revents != 0 || self.cancelled.load(Ordering::SeqCst) {
                return Ok(ReadEvent::Cancelled);
            }
            if fds[0].revents & libc::POLLNVAL != 0 {
                return Err(io::Error::from_raw_os_error(libc::EBADF));
            }
            if fds[0].revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) == 0 {
                continue;
            }

            let read_len = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
            if read_len < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => continue,
                    _ => return Err(err),
                }
            }
            if read_len == 0 {
                return Ok(ReadEvent::Eof);
            }
            return Ok(ReadEvent::Data(read_len as usize));
        }
    }
}

impl CancelHandle {
    /// Unblock the reader. Idempotent.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let byte = [1u8];
        let written = unsafe { libc::write(self.wake.as_raw_fd(), byte.as_ptr().cast(), 1) };
        if written != 1 {
            tracing::debug!(error = %io::Error::last_os_error(), "wake pipe write failed");
        }
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
