use std::{
    io::{
        self,
        BufRead,
        BufReader,
    },
    os::unix::io::{
        AsRawFd,
        RawFd,
    },
    sync::Arc,
};

use inotify_sys as ffi;
use tracing::{
    trace,
    warn,
};

use crate::error::{
    Error,
    Result,
};
use crate::events::{
    Event,
    EventOwned,
};
use crate::fd_guard::FdGuard;

/// Issues one `read(2)` on `fd`
pub(crate) fn read_into_buffer(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    let len = unsafe { ffi::read(fd, buffer.as_mut_ptr() as *mut _, buffer.len()) };

    match len {
        i if i >= 0 => Ok(i as usize),
        _ => Err(io::Error::last_os_error()),
    }
}

/// Decodes the first event in `buffer` into an owned event
pub(crate) fn decode_owned(fd: &Arc<FdGuard>, buffer: &[u8]) -> Result<(usize, EventOwned)> {
    let (consumed, event) = Event::from_buffer(Arc::downgrade(fd), buffer)?;

    trace!(
        wd = event.wd.id,
        mask = ?event.mask,
        cookie = event.cookie,
        name_len = event.name.len(),
        "decoded event"
    );

    Ok((consumed, event.to_owned()))
}

/// `io::Read` over a shared inotify descriptor
#[derive(Debug)]
pub(crate) struct FdReader(Arc<FdGuard>);

impl io::Read for FdReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_into_buffer(self.0.as_raw_fd(), buf)
    }
}

/// Buffered reader that hands out one event at a time
///
/// The kernel only ever writes complete events, possibly several per read.
/// Whatever a read returns beyond the first event stays buffered and is
/// handed out before the descriptor is read again.
#[derive(Debug)]
pub(crate) struct EventReader {
    inner: BufReader<FdReader>,
}

impl EventReader {
    pub(crate) fn new(fd: Arc<FdGuard>, capacity: usize) -> Self {
        EventReader {
            inner: BufReader::with_capacity(capacity, FdReader(fd)),
        }
    }

    pub(crate) fn has_buffered(&self) -> bool {
        !self.inner.buffer().is_empty()
    }

    /// Reads from the descriptor into the empty buffer
    ///
    /// Blocks or not depending on the descriptor's `O_NONBLOCK` flag.
    pub(crate) fn fill(&mut self) -> Result<()> {
        loop {
            match self.inner.fill_buf() {
                Ok([]) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "inotify descriptor returned no data",
                    )))
                }
                Ok(buffer) => {
                    trace!(bytes = buffer.len(), "filled event buffer");
                    return Ok(());
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    return Err(Error::TimedOut)
                }
                Err(error) => return Err(Error::Io(error)),
            }
        }
    }

    /// Takes the next event out of the buffer
    ///
    /// A buffer that doesn't decode is discarded, so the next read starts
    /// from fresh data.
    pub(crate) fn next_buffered(&mut self) -> Result<EventOwned> {
        match decode_owned(&self.inner.get_ref().0, self.inner.buffer()) {
            Ok((consumed, event)) => {
                self.inner.consume(consumed);
                Ok(event)
            }
            Err(error) => {
                let discarded = self.inner.buffer().len();
                warn!(discarded, %error, "discarding undecodable event buffer");
                self.inner.consume(discarded);
                Err(error)
            }
        }
    }

    /// Buffered bytes not yet handed out, and the buffer capacity
    #[cfg(feature = "stream")]
    pub(crate) fn into_pending(self) -> (Vec<u8>, usize) {
        let capacity = self.inner.capacity();
        (self.inner.buffer().to_vec(), capacity)
    }
}
