use std::{
    io,
    mem,
    os::{
        raw::c_int,
        unix::io::{
            AsRawFd,
            FromRawFd,
            IntoRawFd,
            OwnedFd,
            RawFd,
        },
    },
    sync::atomic::{
        AtomicBool,
        Ordering,
    },
};

use inotify_sys as ffi;
use tracing::{
    debug,
    warn,
};

use crate::error::{
    Error,
    Result,
};

/// Creates a new inotify instance
///
/// Calls [`inotify_init1`] with `IN_CLOEXEC` and `IN_NONBLOCK`. The returned
/// descriptor is meant to be handed straight to
/// [`Inotify::from_descriptor`], which is what [`Inotify::init`] does.
///
/// The descriptor stays non-blocking. [`Inotify`] waits for readiness with
/// `poll(2)` instead, so a waiting read can be woken by closing the instance.
///
/// # Errors
///
/// Returns [`Error::SystemFailure`] if the kernel refuses to allocate an
/// instance, for example because of the per-user instance limit.
///
/// [`inotify_init1`]: inotify_sys::inotify_init1
/// [`Inotify`]: crate::Inotify
/// [`Inotify::init`]: crate::Inotify::init
/// [`Inotify::from_descriptor`]: crate::Inotify::from_descriptor
pub fn create_descriptor() -> Result<OwnedFd> {
    let fd = unsafe { ffi::inotify_init1(ffi::IN_CLOEXEC | ffi::IN_NONBLOCK) };

    if fd == -1 {
        return Err(Error::last_os_error("inotify_init1"));
    }

    debug!(fd, "created inotify descriptor");

    // `fd` was just returned by the kernel and nobody else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Shared owner of an inotify file descriptor
///
/// Every handle to an instance (`Inotify`, `Watches`, the reader and an
/// `EventStream`) holds an `Arc<FdGuard>`. Closing flips the guard into the
/// closed state and signals its wake descriptor, so a read waiting on another
/// thread or task returns [`Error::ClosedDescriptor`]. The inotify descriptor
/// itself is released once the last handle is gone, so a descriptor number is
/// never reused while a handle could still pass it to the kernel.
#[derive(Debug)]
pub struct FdGuard {
    fd: RawFd,
    // eventfd, readable once the guard is closed
    wake: OwnedFd,
    closed: AtomicBool,
    close_on_drop: AtomicBool,
}

impl FdGuard {
    pub(crate) fn new(fd: OwnedFd) -> Result<Self> {
        let wake = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if wake == -1 {
            return Err(Error::last_os_error("eventfd"));
        }

        Ok(FdGuard {
            fd: fd.into_raw_fd(),
            // `wake` was just returned by the kernel and nobody else owns it.
            wake: unsafe { OwnedFd::from_raw_fd(wake) },
            closed: AtomicBool::new(false),
            close_on_drop: AtomicBool::new(true),
        })
    }

    /// Returns the descriptor, unless the instance has been closed
    pub(crate) fn raw(&self) -> Result<RawFd> {
        if self.is_closed() {
            return Err(Error::ClosedDescriptor);
        }
        Ok(self.fd)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The descriptor that becomes readable when the guard is closed
    #[cfg(feature = "stream")]
    pub(crate) fn wake_fd(&self) -> RawFd {
        self.wake.as_raw_fd()
    }

    /// Moves the guard into the closed state and wakes waiting readers
    pub(crate) fn mark_closed(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::ClosedDescriptor);
        }

        let one: u64 = 1;
        let written = unsafe {
            libc::write(
                self.wake.as_raw_fd(),
                &one as *const u64 as *const libc::c_void,
                mem::size_of::<u64>(),
            )
        };
        if written == -1 {
            return Err(Error::last_os_error("write"));
        }

        Ok(())
    }

    /// Waits until the inotify descriptor is readable
    ///
    /// Sleeps in `poll(2)` without a timeout. Returns
    /// [`Error::ClosedDescriptor`] as soon as the guard is closed, from this or
    /// any other thread.
    pub(crate) fn wait_readable(&self) -> Result<()> {
        let mut fds = [
            libc::pollfd {
                fd: self.raw()?,
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: self.wake.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];

        loop {
            if unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) } == -1 {
                let source = io::Error::last_os_error();
                if source.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::SystemFailure {
                    operation: "poll",
                    source,
                });
            }

            if self.is_closed() || fds[1].revents != 0 {
                return Err(Error::ClosedDescriptor);
            }
            if fds[0].revents != 0 {
                return Ok(());
            }
        }
    }

    /// Closes the descriptor now instead of on drop
    ///
    /// Only called once the caller holds the last reference.
    pub(crate) fn close_now(self) -> Result<()> {
        self.close_on_drop.store(false, Ordering::Release);

        match unsafe { ffi::close(self.fd) } {
            0 => {
                debug!(fd = self.fd, "closed inotify descriptor");
                Ok(())
            }
            _ => Err(Error::last_os_error("close")),
        }
    }
}

impl AsRawFd for FdGuard {
    #[inline]
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for FdGuard {
    fn drop(&mut self) {
        if self.close_on_drop.load(Ordering::Acquire) {
            if unsafe { ffi::close(self.fd) } == -1 {
                warn!(
                    fd = self.fd,
                    error = %std::io::Error::last_os_error(),
                    "failed to close inotify descriptor"
                );
            }
        }
    }
}

/// Switches `O_NONBLOCK` on or off, returning the previous file status flags
pub(crate) fn set_nonblocking(fd: RawFd, nonblocking: bool) -> Result<c_int> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(Error::last_os_error("fcntl"));
    }

    let new_flags = if nonblocking {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };

    if new_flags != flags && unsafe { libc::fcntl(fd, libc::F_SETFL, new_flags) } == -1 {
        return Err(Error::last_os_error("fcntl"));
    }

    Ok(flags)
}

/// Waits up to `timeout_ms` for the descriptor to become readable
///
/// A timeout of `0` only checks readiness and never waits.
pub(crate) fn poll_readable(fd: RawFd, timeout_ms: c_int) -> Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    match unsafe { libc::poll(&mut pollfd, 1, timeout_ms) } {
        -1 => Err(Error::last_os_error("poll")),
        0 => Ok(false),
        // Error conditions count as ready, so the following read reports them.
        _ => Ok(pollfd.revents != 0),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        os::unix::io::AsRawFd,
        sync::Arc,
        thread,
        time::Duration,
    };

    use crate::Error;

    use super::{
        create_descriptor,
        poll_readable,
        set_nonblocking,
        FdGuard,
    };

    #[test]
    fn created_descriptor_should_be_non_blocking() {
        let fd = create_descriptor().unwrap();
        let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };

        assert_ne!(flags & libc::O_NONBLOCK, 0);
    }

    #[test]
    fn set_nonblocking_should_return_previous_flags() {
        let fd = create_descriptor().unwrap();
        let raw = fd.as_raw_fd();

        let before = set_nonblocking(raw, false).unwrap();
        assert_ne!(before & libc::O_NONBLOCK, 0);

        let before = set_nonblocking(raw, true).unwrap();
        assert_eq!(before & libc::O_NONBLOCK, 0);
    }

    #[test]
    fn closed_guard_should_refuse_access() {
        let guard = FdGuard::new(create_descriptor().unwrap()).unwrap();

        guard.mark_closed().unwrap();

        assert!(matches!(guard.raw(), Err(Error::ClosedDescriptor)));
        assert!(matches!(guard.mark_closed(), Err(Error::ClosedDescriptor)));
        assert!(matches!(guard.wait_readable(), Err(Error::ClosedDescriptor)));
    }

    #[test]
    fn closing_should_wake_a_waiting_thread() {
        let guard = Arc::new(FdGuard::new(create_descriptor().unwrap()).unwrap());

        let waiter = {
            let guard = guard.clone();
            thread::spawn(move || guard.wait_readable())
        };

        thread::sleep(Duration::from_millis(50));
        guard.mark_closed().unwrap();

        assert!(matches!(waiter.join().unwrap(), Err(Error::ClosedDescriptor)));
    }

    #[test]
    fn fresh_descriptor_should_not_be_readable() {
        let fd = create_descriptor().unwrap();

        assert!(!poll_readable(fd.as_raw_fd(), 0).unwrap());
    }
}
