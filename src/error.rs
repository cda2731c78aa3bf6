use std::io;

use thiserror::Error;

/// Errors returned by this crate
///
/// Every operation either completes or fails with one of these, without
/// leaving partial state behind. Nothing is retried internally; callers decide
/// on their own retry policy, especially around [`Error::TimedOut`].
#[derive(Debug, Error)]
pub enum Error {
    /// An argument was rejected before reaching the kernel
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The inotify instance was closed
    #[error("inotify descriptor is closed")]
    ClosedDescriptor,

    /// A system call failed
    #[error("{operation} failed: {source}")]
    SystemFailure {
        /// The system call that failed
        operation: &'static str,
        /// The error reported by the OS
        #[source]
        source: io::Error,
    },

    /// No event was ready to be read
    #[error("no inotify event is ready to be read")]
    TimedOut,

    /// A buffer was too short for the event record it declares
    #[error("malformed event record: needs {required} bytes, got {available}")]
    MalformedRecord {
        /// Bytes needed for header and declared name
        required: usize,
        /// Bytes actually available
        available: usize,
    },

    /// Reading from the inotify descriptor failed
    #[error("failed to read from inotify descriptor: {0}")]
    Io(#[source] io::Error),
}

/// Result type used throughout this crate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Captures `errno` after a failed system call
    pub(crate) fn last_os_error(operation: &'static str) -> Self {
        Error::SystemFailure {
            operation,
            source: io::Error::last_os_error(),
        }
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::SystemFailure { source, .. } | Error::Io(source) => source,
            Error::InvalidArgument(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, error)
            }
            Error::ClosedDescriptor => {
                io::Error::new(io::ErrorKind::NotConnected, error)
            }
            Error::TimedOut => io::Error::new(io::ErrorKind::WouldBlock, error),
            Error::MalformedRecord { .. } => {
                io::Error::new(io::ErrorKind::InvalidData, error)
            }
        }
    }
}
