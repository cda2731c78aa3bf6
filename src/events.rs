use std::{
    error::Error as StdError,
    ffi::OsStr,
    fmt,
    mem,
    os::unix::ffi::OsStrExt,
    str::FromStr,
    sync::Weak,
};

use inotify_sys as ffi;

use crate::error::{
    Error,
    Result,
};
use crate::fd_guard::FdGuard;
use crate::watches::WatchDescriptor;

/// Size of the fixed part of an event record
///
/// Watch descriptor, mask, cookie and name length, in that order, each 4
/// bytes in native byte order.
pub const HEADER_SIZE: usize = mem::size_of::<ffi::inotify_event>();

/// Longest file name the kernel reports, excluding the terminating `'\0'`
pub const NAME_MAX: usize = 255;

/// Size of the largest possible event record
///
/// A read buffer of at least this size always has room for the next event.
pub const MAX_EVENT_SIZE: usize = HEADER_SIZE + NAME_MAX + 1;

/// Decodes the event record at the start of `buffer`
///
/// Returns the number of bytes the record occupies and the event. Bytes after
/// the record are left alone, so a buffer holding several records can be
/// walked by advancing past the returned length.
///
/// The name is returned exactly as declared by the record, including any
/// `'\0'` padding. Use [`Event::file_name`] for the trimmed name.
///
/// The [`WatchDescriptor`] of the decoded event is not tied to any
/// [`Inotify`] instance. Compare it through
/// [`WatchDescriptor::get_watch_descriptor_id`].
///
/// # Errors
///
/// Returns [`Error::MalformedRecord`] if `buffer` is shorter than the header,
/// or shorter than the header plus the name length it declares.
///
/// [`Inotify`]: crate::Inotify
pub fn decode(buffer: &[u8]) -> Result<(usize, Event<&[u8]>)> {
    Event::from_buffer(Weak::new(), buffer)
}

/// An inotify event
///
/// A file system event that describes a change that the user previously
/// registered interest in. To watch for events, call [`Watches::add`]. To
/// retrieve events, call [`Inotify::read_event_blocking`] or
/// [`Inotify::read_event`].
///
/// [`Watches::add`]: crate::Watches::add
/// [`Inotify::read_event_blocking`]: crate::Inotify::read_event_blocking
/// [`Inotify::read_event`]: crate::Inotify::read_event
#[derive(Clone, Debug)]
pub struct Event<S> {
    /// Identifies the watch this event originates from
    ///
    /// This [`WatchDescriptor`] is equal to the one that [`Watches::add`]
    /// returned when interest for this event was registered.
    ///
    /// [`Watches::add`]: crate::Watches::add
    pub wd: WatchDescriptor,

    /// Indicates what kind of event this is
    pub mask: EventMask,

    /// Connects related events to each other
    ///
    /// When a file is renamed, this results two events: [`MOVED_FROM`] and
    /// [`MOVED_TO`]. The `cookie` field will be the same for both of them,
    /// thereby making is possible to connect the event pair.
    ///
    /// [`MOVED_FROM`]: EventMask::MOVED_FROM
    /// [`MOVED_TO`]: EventMask::MOVED_TO
    pub cookie: u32,

    /// The raw name bytes of the record
    ///
    /// Empty if the event concerns a watched file itself rather than an entry
    /// of a watched directory. Otherwise the kernel pads the name with `'\0'`
    /// up to an alignment boundary, and that padding is kept here.
    pub name: S,
}

/// An owned version of `Event`
pub type EventOwned = Event<Vec<u8>>;

impl<'a> Event<&'a [u8]> {
    pub(crate) fn from_buffer(fd: Weak<FdGuard>, buffer: &'a [u8]) -> Result<(usize, Self)> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::MalformedRecord {
                required: HEADER_SIZE,
                available: buffer.len(),
            });
        }

        // The length check above makes this read stay inside `buffer`. The
        // byte buffer has alignment 1, hence `read_unaligned`.
        let ffi_event = unsafe {
            (buffer.as_ptr() as *const ffi::inotify_event).read_unaligned()
        };

        let bytes_consumed = HEADER_SIZE.saturating_add(ffi_event.len as usize);
        if buffer.len() < bytes_consumed {
            return Err(Error::MalformedRecord {
                required: bytes_consumed,
                available: buffer.len(),
            });
        }

        let event = Event {
            wd: WatchDescriptor {
                id: ffi_event.wd,
                fd,
            },
            mask: EventMask::from_bits_retain(ffi_event.mask),
            cookie: ffi_event.cookie,
            name: &buffer[HEADER_SIZE..bytes_consumed],
        };

        Ok((bytes_consumed, event))
    }

    /// Returns an owned copy of the event.
    #[must_use = "cloning is often expensive and is not expected to have side effects"]
    pub fn to_owned(&self) -> EventOwned {
        Event {
            wd: self.wd.clone(),
            mask: self.mask,
            cookie: self.cookie,
            name: self.name.to_vec(),
        }
    }
}

impl<S> Event<S>
where
    S: AsRef<[u8]>,
{
    /// The name of the file the event originates from
    ///
    /// Strips the `'\0'` padding from [`Event::name`]. Returns `None` if the
    /// subject of the event is the watched file or directory itself.
    pub fn file_name(&self) -> Option<&OsStr> {
        let name = self.name.as_ref();
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());

        if end == 0 {
            None
        } else {
            Some(OsStr::from_bytes(&name[..end]))
        }
    }

    /// Symbolic names of the event kinds set in [`Event::mask`]
    pub fn event_names(&self) -> Vec<&'static str> {
        self.mask.event_names()
    }

    /// Whether the watch this event belongs to was removed
    ///
    /// The last event a watch produces, sent after [`Watches::remove`] or when
    /// the watched file went away.
    ///
    /// [`Watches::remove`]: crate::Watches::remove
    pub fn is_ignored(&self) -> bool {
        self.mask.contains(EventMask::IGNORED)
    }

    /// Whether the subject of the event is a directory
    pub fn is_dir(&self) -> bool {
        self.mask.contains(EventMask::ISDIR)
    }

    /// Whether the kernel's event queue overflowed
    ///
    /// Such an event has no valid watch descriptor.
    pub fn is_queue_overflow(&self) -> bool {
        self.mask.contains(EventMask::Q_OVERFLOW)
    }
}

bitflags! {
    /// Indicates the type of an event
    ///
    /// This struct can be retrieved from an [`Event`] via its `mask` field.
    /// Bits the kernel sets that are not listed here are kept as they are.
    #[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
    pub struct EventMask: u32 {
        /// File was accessed
        ///
        /// When watching a directory, this event is only triggered for objects
        /// inside the directory, not the directory itself.
        const ACCESS = ffi::IN_ACCESS;

        /// Metadata (permissions, timestamps, ...) changed
        const ATTRIB = ffi::IN_ATTRIB;

        /// File opened for writing was closed
        const CLOSE_WRITE = ffi::IN_CLOSE_WRITE;

        /// File or directory not opened for writing was closed
        const CLOSE_NOWRITE = ffi::IN_CLOSE_NOWRITE;

        /// File/directory created in watched directory
        const CREATE = ffi::IN_CREATE;

        /// File/directory deleted from watched directory
        const DELETE = ffi::IN_DELETE;

        /// Watched file/directory was deleted
        const DELETE_SELF = ffi::IN_DELETE_SELF;

        /// File was modified
        const MODIFY = ffi::IN_MODIFY;

        /// Watched file/directory was moved
        const MOVE_SELF = ffi::IN_MOVE_SELF;

        /// File was renamed/moved; watched directory contained old name
        const MOVED_FROM = ffi::IN_MOVED_FROM;

        /// File was renamed/moved; watched directory contains new name
        const MOVED_TO = ffi::IN_MOVED_TO;

        /// File or directory was opened
        const OPEN = ffi::IN_OPEN;

        /// Watch was removed
        ///
        /// Generated when the watch was removed explicitly (via
        /// [`Watches::remove`]), or automatically (because the file was
        /// deleted or the file system was unmounted).
        ///
        /// [`Watches::remove`]: crate::Watches::remove
        const IGNORED = ffi::IN_IGNORED;

        /// Event related to a directory
        const ISDIR = ffi::IN_ISDIR;

        /// Event queue overflowed
        ///
        /// The event queue has overflowed and events have presumably been lost.
        const Q_OVERFLOW = ffi::IN_Q_OVERFLOW;

        /// File system containing watched object was unmounted
        ///
        /// An event with [`EventMask::IGNORED`] will subsequently be generated
        /// for the same watch descriptor.
        const UNMOUNT = ffi::IN_UNMOUNT;
    }
}

impl EventMask {
    /// Symbolic names of the event kinds in this mask
    ///
    /// See [`mask_to_events`](crate::mask_to_events).
    pub fn event_names(self) -> Vec<&'static str> {
        crate::symbols::mask_to_events(self.bits())
    }

    /// The single event kind in this mask, if any
    ///
    /// Events read from the kernel carry at most one kind, plus any of the
    /// flags `IGNORED`, `ISDIR` and `UNMOUNT`.
    pub fn kind(self) -> std::result::Result<Option<EventKind>, EventMaskParseError> {
        if self.contains(EventMask::Q_OVERFLOW) {
            return Err(EventMaskParseError::QueueOverflow);
        }

        let mut kinds = EventKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.contains(kind.event_mask()));

        let kind = kinds.next();
        if kinds.next().is_some() {
            return Err(EventMaskParseError::TooManyBitsSet(self));
        }

        Ok(kind)
    }
}

/// Represents the type of inotify event
///
/// The typed counterpart of the symbolic names used by
/// [`events_to_mask`](crate::events_to_mask) and
/// [`mask_to_events`](crate::mask_to_events).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// File was accessed
    Access,
    /// Metadata changed
    Attrib,
    /// File opened for writing was closed
    CloseWrite,
    /// File or directory not opened for writing was closed
    CloseNowrite,
    /// File/directory created in watched directory
    Create,
    /// File/directory deleted from watched directory
    Delete,
    /// Watched file/directory was itself deleted
    DeleteSelf,
    /// File was modified
    Modify,
    /// Watched file/directory was itself moved
    MoveSelf,
    /// Generated for the directory containing the old filename when a file is renamed
    MovedFrom,
    /// Generated for the directory containing the new filename when a file is renamed
    MovedTo,
    /// File or directory was opened
    Open,
}

impl EventKind {
    /// All event kinds, in declaration order
    pub const ALL: [EventKind; 12] = [
        EventKind::Access,
        EventKind::Attrib,
        EventKind::CloseWrite,
        EventKind::CloseNowrite,
        EventKind::Create,
        EventKind::Delete,
        EventKind::DeleteSelf,
        EventKind::Modify,
        EventKind::MoveSelf,
        EventKind::MovedFrom,
        EventKind::MovedTo,
        EventKind::Open,
    ];

    /// The symbolic name, e.g. `"close_write"`
    pub const fn name(self) -> &'static str {
        match self {
            EventKind::Access => "access",
            EventKind::Attrib => "attrib",
            EventKind::CloseWrite => "close_write",
            EventKind::CloseNowrite => "close_nowrite",
            EventKind::Create => "create",
            EventKind::Delete => "delete",
            EventKind::DeleteSelf => "delete_self",
            EventKind::Modify => "modify",
            EventKind::MoveSelf => "move_self",
            EventKind::MovedFrom => "moved_from",
            EventKind::MovedTo => "moved_to",
            EventKind::Open => "open",
        }
    }

    /// The kernel bit for this kind
    pub const fn bits(self) -> u32 {
        match self {
            EventKind::Access => ffi::IN_ACCESS,
            EventKind::Attrib => ffi::IN_ATTRIB,
            EventKind::CloseWrite => ffi::IN_CLOSE_WRITE,
            EventKind::CloseNowrite => ffi::IN_CLOSE_NOWRITE,
            EventKind::Create => ffi::IN_CREATE,
            EventKind::Delete => ffi::IN_DELETE,
            EventKind::DeleteSelf => ffi::IN_DELETE_SELF,
            EventKind::Modify => ffi::IN_MODIFY,
            EventKind::MoveSelf => ffi::IN_MOVE_SELF,
            EventKind::MovedFrom => ffi::IN_MOVED_FROM,
            EventKind::MovedTo => ffi::IN_MOVED_TO,
            EventKind::Open => ffi::IN_OPEN,
        }
    }

    /// This kind as an [`EventMask`]
    pub const fn event_mask(self) -> EventMask {
        EventMask::from_bits_retain(self.bits())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == name)
            .ok_or(Error::InvalidArgument("unknown event name"))
    }
}

/// An error that occured from parsing an raw event mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMaskParseError {
    /// More than one bit repesenting the event type was set
    TooManyBitsSet(EventMask),
    /// The event is a signal that the kernels event queue overflowed
    QueueOverflow,
}

impl fmt::Display for EventMaskParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyBitsSet(mask) => {
                write!(f, "too many event type bits set in {mask:?}")
            }
            Self::QueueOverflow => write!(f, "the kernel's event queue overflowed"),
        }
    }
}

impl StdError for EventMaskParseError {}
