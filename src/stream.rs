use std::{
    future::poll_fn,
    io,
    os::unix::io::{
        AsRawFd,
        RawFd,
    },
    pin::Pin,
    sync::Arc,
    task::{
        ready,
        Context,
        Poll,
    },
};

use futures_core::Stream;
use tokio::{
    io::{
        unix::AsyncFd,
        Interest,
    },
    runtime::Handle,
};
use tracing::{
    debug,
    trace,
    warn,
};

use crate::error::{
    Error,
    Result,
};
use crate::events::EventOwned;
use crate::fd_guard::FdGuard;
use crate::reader::{
    decode_owned,
    read_into_buffer,
};
use crate::watches::Watches;

/// Stream of inotify events
///
/// Created by [`Inotify::into_event_stream`]. The descriptor is registered
/// with tokio's reactor: while no event is available the task yields to the
/// runtime instead of blocking its thread. Dropping a pending read (or the
/// stream) cancels it. So does [`Watches::close`], after which the stream
/// yields [`Error::ClosedDescriptor`].
///
/// [`Inotify::into_event_stream`]: crate::Inotify::into_event_stream
#[derive(Debug)]
pub struct EventStream {
    // Declared first so it is deregistered before `fd` can release the wake
    // descriptor.
    wake: AsyncFd<RawFd>,
    fd: AsyncFd<Arc<FdGuard>>,
    buffer: Box<[u8]>,
    pos: usize,
    filled: usize,
}

impl EventStream {
    pub(crate) fn new(fd: Arc<FdGuard>, pending: Vec<u8>, capacity: usize) -> Result<Self> {
        let raw = fd.raw()?;

        Handle::try_current().map_err(|error| Error::SystemFailure {
            operation: "AsyncFd::with_interest",
            source: io::Error::new(io::ErrorKind::Other, error),
        })?;

        let register = |source: io::Error| Error::SystemFailure {
            operation: "AsyncFd::with_interest",
            source,
        };
        let wake = AsyncFd::with_interest(fd.wake_fd(), Interest::READABLE).map_err(register)?;
        let fd = AsyncFd::with_interest(fd, Interest::READABLE).map_err(register)?;

        let mut buffer = vec![0; capacity.max(pending.len())].into_boxed_slice();
        buffer[..pending.len()].copy_from_slice(&pending);

        debug!(fd = raw, pending = pending.len(), "registered event stream");

        Ok(EventStream {
            wake,
            fd,
            buffer,
            pos: 0,
            filled: pending.len(),
        })
    }

    /// Gets an interface that allows adding and removing watches.
    /// See [`Watches::add`] and [`Watches::remove`].
    pub fn watches(&self) -> Watches {
        Watches::new(self.fd.get_ref().clone())
    }

    /// Waits for the next event
    ///
    /// Like [`StreamExt::next`], but without the `Option`: the end of the
    /// stream is reported as an [`Error::Io`] of kind `UnexpectedEof`.
    ///
    /// [`StreamExt::next`]: https://docs.rs/futures/0.3/futures/stream/trait.StreamExt.html#method.next
    pub async fn read_event(&mut self) -> Result<EventOwned> {
        match poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await {
            Some(result) => result,
            None => Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "inotify descriptor returned no data",
            ))),
        }
    }
}

impl Stream for EventStream {
    type Item = Result<EventOwned>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if let Err(error) = this.fd.get_ref().raw() {
            return Poll::Ready(Some(Err(error)));
        }

        if this.pos == this.filled {
            // The wake descriptor only becomes readable on close.
            match this.wake.poll_read_ready(cx) {
                Poll::Ready(Ok(_)) => return Poll::Ready(Some(Err(Error::ClosedDescriptor))),
                Poll::Ready(Err(error)) => return Poll::Ready(Some(Err(Error::Io(error)))),
                Poll::Pending => (),
            }

            // Nothing usable in buffer. Need to reset and fill buffer.
            this.pos = 0;
            this.filled = 0;

            let num_bytes = match ready!(poll_fill(&this.fd, &mut this.buffer, cx)) {
                Ok(num_bytes) => num_bytes,
                Err(error) => return Poll::Ready(Some(Err(error))),
            };
            if num_bytes == 0 {
                // The read returned `0`, signalling end-of-file.
                return Poll::Ready(None);
            }

            trace!(bytes = num_bytes, "filled event stream buffer");
            this.filled = num_bytes;
        }

        // inotify doesn't put partial events into the buffer, so there is at
        // least one complete event left.
        match decode_owned(this.fd.get_ref(), &this.buffer[this.pos..this.filled]) {
            Ok((consumed, event)) => {
                this.pos += consumed;
                Poll::Ready(Some(Ok(event)))
            }
            Err(error) => {
                let discarded = this.filled - this.pos;
                warn!(discarded, %error, "discarding undecodable event buffer");
                this.pos = this.filled;
                Poll::Ready(Some(Err(error)))
            }
        }
    }
}

fn poll_fill(
    fd: &AsyncFd<Arc<FdGuard>>,
    buffer: &mut [u8],
    cx: &mut Context<'_>,
) -> Poll<Result<usize>> {
    loop {
        let mut guard = ready!(fd.poll_read_ready(cx)).map_err(Error::Io)?;

        match guard.try_io(|inner| read_into_buffer(inner.as_raw_fd(), &mut *buffer)) {
            Ok(Ok(num_bytes)) => return Poll::Ready(Ok(num_bytes)),
            Ok(Err(error)) if error.kind() == io::ErrorKind::Interrupted => continue,
            Ok(Err(error)) => return Poll::Ready(Err(Error::Io(error))),
            // Readiness was stale and has been cleared; wait again.
            Err(_would_block) => continue,
        }
    }
}
