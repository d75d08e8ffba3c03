//! Raw inotify wrapper.
//!
//! RAII handle owning one inotify instance with a single directory watch.
//! The descriptor is created non-blocking and close-on-exec; readiness is
//! established with poll(2) under a caller-supplied timeout so the owning
//! thread can re-check its cancellation flag at a bounded interval.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

use crate::event::EventFlags;

/// Kernel event source for one watched directory.
///
/// The watch is deregistered and the descriptor closed on drop; the type is
/// owned by exactly one session thread for its whole lifetime.
pub struct InotifyStream {
    fd: OwnedFd,
    watch: libc::c_int,
}

impl InotifyStream {
    /// Creates the kernel event source and registers `directory` for the
    /// given event mask.
    pub fn open(directory: &Path, mask: EventFlags) -> io::Result<Self> {
        let raw = unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // Safety: raw is a freshly created descriptor we own from here on.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let path = CString::new(directory.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))?;
        let watch =
            unsafe { libc::inotify_add_watch(fd.as_raw_fd(), path.as_ptr(), mask.bits()) };
        if watch < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd, watch })
    }

    /// Waits up to `timeout` for the event queue to become readable.
    ///
    /// Returns false on timeout. An interrupted wait (EINTR) counts as an
    /// empty wakeup rather than an error, so signal delivery cannot kill a
    /// session.
    pub fn wait(&self, timeout: Duration) -> io::Result<bool> {
        let mut pollfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let ready = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(ready > 0)
    }

    /// Drains queued change records into `buffer`, returning the byte count.
    ///
    /// The descriptor is non-blocking: a wakeup with nothing left to read
    /// surfaces as `WouldBlock`, which callers treat as transient.
    pub fn read(&self, buffer: &mut [u8]) -> io::Result<usize> {
        let count =
            unsafe { libc::read(self.fd.as_raw_fd(), buffer.as_mut_ptr().cast(), buffer.len()) };
        if count < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(count as usize)
    }
}

impl Drop for InotifyStream {
    fn drop(&mut self) {
        // Deregister the watch first; the descriptor itself closes with the
        // OwnedFd.
        unsafe {
            libc::inotify_rm_watch(self.fd.as_raw_fd(), self.watch);
        }
    }
}
