#![warn(missing_docs)]

//! Watch management and event decoding for inotify
//!
//! [Inotify][wiki] is a linux kernel mechanism for monitoring
//! changes to filesystems' contents.
//!
//! > The inotify API provides a mechanism for monitoring filesystem
//! > events. Inotify can be used to monitor individual files, or to
//! > monitor directories. When a directory is monitored, inotify will
//! > return events for the directory itself, and for files inside the
//! > directory.
//!
//! This crate wraps one inotify file descriptor. It adds and removes watches,
//! reads the kernel's binary event records one at a time, either blocking or
//! by polling readiness, and decodes them into [`Event`]s. Event kinds can
//! also be handled by their symbolic names (`"create"`, `"modify"`, ...), see
//! [`events_to_mask`], [`mask_to_events`] and [`supported_events`].
//!
//! With the default `stream` feature, [`Inotify::into_event_stream`] reads
//! events through tokio's reactor.
//!
//! See the [man page][inotify7] for usage information
//! of the C version, which this package follows closely.
//!
//! # Example
//!
//! ```
//! use std::fs::File;
//!
//! use inotify_io::{
//!     Inotify,
//!     WatchMask,
//! };
//!
//! let mut inotify = Inotify::init()
//!     .expect("Error while initializing inotify instance");
//!
//! # let dir = std::env::temp_dir().join("inotify-io-doc-example");
//! # let _ = std::fs::remove_dir_all(&dir);
//! # std::fs::create_dir_all(&dir).unwrap();
//! // Watch a directory for created files
//! let watch = inotify
//!     .watches()
//!     .add(&dir, WatchMask::CREATE)
//!     .expect("Failed to add file watch");
//!
//! File::create(dir.join("file")).expect("Failed to create file");
//!
//! // Returns immediately, as the kernel has queued an event already
//! let event = inotify
//!     .read_event_blocking()
//!     .expect("Error while reading events");
//!
//! assert_eq!(event.wd, watch);
//! assert_eq!(event.event_names(), ["create"]);
//! # std::fs::remove_dir_all(&dir).unwrap();
//! ```
//!
//! [wiki]: https://en.wikipedia.org/wiki/Inotify
//! [inotify7]: http://man7.org/linux/man-pages/man7/inotify.7.html

#[macro_use]
extern crate bitflags;

mod error;
mod events;
mod fd_guard;
mod inotify;
mod reader;
mod symbols;
mod watches;

#[cfg(feature = "stream")]
mod stream;

pub use crate::error::{
    Error,
    Result,
};
pub use crate::events::{
    decode,
    Event,
    EventKind,
    EventMask,
    EventMaskParseError,
    EventOwned,
    HEADER_SIZE,
    MAX_EVENT_SIZE,
    NAME_MAX,
};
pub use crate::fd_guard::create_descriptor;
pub use crate::inotify::Inotify;
pub use crate::symbols::{
    events_to_mask,
    mask_to_events,
    supported_events,
};
pub use crate::watches::{
    WatchDescriptor,
    WatchMask,
    Watches,
};

#[cfg(feature = "stream")]
pub use crate::stream::EventStream;
