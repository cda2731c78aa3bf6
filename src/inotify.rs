use std::{
    os::unix::io::{
        AsFd,
        AsRawFd,
        BorrowedFd,
        OwnedFd,
        RawFd,
    },
    sync::Arc,
};

use tracing::debug;

use crate::error::{
    Error,
    Result,
};
use crate::events::{
    EventOwned,
    MAX_EVENT_SIZE,
};
use crate::fd_guard::{
    create_descriptor,
    poll_readable,
    set_nonblocking,
    FdGuard,
};
use crate::reader::EventReader;
use crate::watches::Watches;

#[cfg(feature = "stream")]
use crate::stream::EventStream;

/// Idiomatic Rust wrapper around an inotify instance
///
/// `Inotify` owns one inotify file descriptor. Watches are managed through
/// [`Inotify::watches`]; events are read one at a time, either blocking
/// ([`Inotify::read_event_blocking`]) or not ([`Inotify::read_event`]).
/// With the `stream` feature, [`Inotify::into_event_stream`] turns the
/// instance into a stream driven by tokio.
///
/// Both read methods share one buffer. A single read from the kernel may
/// return several events; those are handed out in order by the following
/// calls, whichever method is used.
///
/// # Examples
///
/// ```
/// use inotify_io::{
///     Error,
///     Inotify,
///     WatchMask,
/// };
///
/// let mut inotify = Inotify::init()
///     .expect("Error while initializing inotify instance");
///
/// // Watch for modify and close events.
/// inotify
///     .watches()
///     .add("/tmp", WatchMask::MODIFY | WatchMask::CLOSE)
///     .expect("Failed to add file watch");
///
/// // Poll without blocking
/// match inotify.read_event() {
///     Ok(event) => println!("{:?}", event.event_names()),
///     Err(Error::TimedOut) => println!("nothing happened yet"),
///     Err(error) => panic!("Error while reading events: {}", error),
/// }
/// ```
#[derive(Debug)]
pub struct Inotify {
    fd: Arc<FdGuard>,
    reader: EventReader,
}

impl Inotify {
    /// Creates an [`Inotify`] instance
    ///
    /// Initializes an inotify instance through
    /// [`create_descriptor`](crate::create_descriptor), with a read buffer
    /// of [`MAX_EVENT_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SystemFailure`] if the kernel can't allocate the
    /// instance.
    ///
    /// # Examples
    ///
    /// ```
    /// use inotify_io::Inotify;
    ///
    /// let inotify = Inotify::init()
    ///     .expect("Failed to initialize an inotify instance");
    /// ```
    pub fn init() -> Result<Inotify> {
        Inotify::from_descriptor(create_descriptor()?)
    }

    /// Creates an [`Inotify`] instance with a read buffer of `capacity` bytes
    ///
    /// A larger buffer lets one read from the kernel pick up many events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `capacity` is smaller than
    /// [`MAX_EVENT_SIZE`], as the kernel refuses reads into buffers that can't
    /// hold the next event. Otherwise as [`Inotify::init`].
    pub fn with_buffer_capacity(capacity: usize) -> Result<Inotify> {
        if capacity < MAX_EVENT_SIZE {
            return Err(Error::InvalidArgument(
                "buffer capacity is smaller than the largest event",
            ));
        }

        Inotify::with_parts(create_descriptor()?, capacity)
    }

    /// Wraps a descriptor returned by
    /// [`create_descriptor`](crate::create_descriptor)
    ///
    /// The instance takes ownership of the descriptor and releases it when
    /// closed or dropped. The descriptor is switched to non-blocking mode if it
    /// isn't already.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SystemFailure`] if the descriptor's flags can't be set
    /// or the instance's wake descriptor can't be created.
    pub fn from_descriptor(fd: OwnedFd) -> Result<Inotify> {
        Inotify::with_parts(fd, MAX_EVENT_SIZE)
    }

    fn with_parts(fd: OwnedFd, capacity: usize) -> Result<Inotify> {
        set_nonblocking(fd.as_raw_fd(), true)?;

        let fd = Arc::new(FdGuard::new(fd)?);
        let reader = EventReader::new(fd.clone(), capacity);

        Ok(Inotify { fd, reader })
    }

    /// Gets an interface that allows adding and removing watches.
    /// See [`Watches::add`] and [`Watches::remove`].
    pub fn watches(&self) -> Watches {
        Watches::new(self.fd.clone())
    }

    /// Waits until an event is available, then returns it
    ///
    /// Returns a buffered event right away if there is one. Otherwise the
    /// calling thread sleeps in `poll(2)` until the kernel has an event. Don't
    /// call this from an async task; use [`Inotify::into_event_stream`] there,
    /// which suspends the task instead of the thread.
    ///
    /// A waiting read is cancelled by closing the instance through a
    /// [`Watches`] handle on another thread, see [`Watches::close`].
    ///
    /// # Errors
    ///
    /// - [`Error::ClosedDescriptor`], if the instance is or gets closed.
    /// - [`Error::Io`], if reading fails.
    /// - [`Error::SystemFailure`], if `poll(2)` fails.
    pub fn read_event_blocking(&mut self) -> Result<EventOwned> {
        self.fd.raw()?;

        while !self.reader.has_buffered() {
            self.fd.wait_readable()?;

            match self.reader.fill() {
                Ok(()) => (),
                // Readiness went away before the read; wait again.
                Err(Error::TimedOut) => continue,
                Err(error) => return Err(error),
            }
        }

        self.reader.next_buffered()
    }

    /// Returns the next event, if one is available right now
    ///
    /// Returns a buffered event if there is one. Otherwise checks readiness
    /// with a zero-timeout `poll(2)` and reads only if the kernel has an event
    /// queued. Never waits.
    ///
    /// # Errors
    ///
    /// - [`Error::TimedOut`], if no event is available.
    /// - [`Error::ClosedDescriptor`], if the instance was closed.
    /// - [`Error::SystemFailure`], if `poll(2)` fails.
    /// - [`Error::Io`], if reading fails.
    pub fn read_event(&mut self) -> Result<EventOwned> {
        let fd = self.fd.raw()?;

        if !self.reader.has_buffered() {
            if !poll_readable(fd, 0)? {
                return Err(Error::TimedOut);
            }
            self.reader.fill()?;
        }

        self.reader.next_buffered()
    }

    /// Turns this instance into a stream of events
    ///
    /// The descriptor is registered with the tokio reactor of the current
    /// runtime, so waiting for events suspends the task, not the thread.
    /// Events already buffered come first. Watches can still be managed via
    /// [`EventStream::watches`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClosedDescriptor`] if the instance was closed, and
    /// [`Error::SystemFailure`] if no tokio runtime is running or the
    /// descriptor can't be registered.
    #[cfg(feature = "stream")]
    pub fn into_event_stream(self) -> Result<EventStream> {
        let Inotify { fd, reader } = self;
        let (pending, capacity) = reader.into_pending();

        EventStream::new(fd, pending, capacity)
    }

    /// Closes the inotify instance
    ///
    /// Every [`Watches`] handle obtained from this instance fails with
    /// [`Error::ClosedDescriptor`] afterwards. Closing an instance that was
    /// already closed through [`Watches::close`] fails with
    /// [`Error::ClosedDescriptor`] as well. If no such handle is left, the
    /// file descriptor is closed right away; otherwise the last handle to go
    /// away closes it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SystemFailure`] if `close(2)` fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use inotify_io::Inotify;
    ///
    /// let inotify = Inotify::init()
    ///     .expect("Failed to initialize an inotify instance");
    ///
    /// inotify.close()
    ///     .expect("Failed to close inotify instance");
    /// ```
    pub fn close(self) -> Result<()> {
        self.fd.mark_closed()?;

        let Inotify { fd, reader } = self;
        drop(reader);

        match Arc::try_unwrap(fd) {
            Ok(guard) => guard.close_now(),
            Err(fd) => {
                debug!(
                    fd = fd.as_raw_fd(),
                    handles = Arc::strong_count(&fd) - 1,
                    "closed inotify instance, descriptor outlives it"
                );
                Ok(())
            }
        }
    }
}

impl AsRawFd for Inotify {
    #[inline]
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for Inotify {
    #[inline]
    fn as_fd(&self) -> BorrowedFd<'_> {
        // The guard keeps the descriptor open for as long as `self` exists.
        unsafe { BorrowedFd::borrow_raw(self.fd.as_raw_fd()) }
    }
}
