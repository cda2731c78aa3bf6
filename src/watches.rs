use std::{
    cmp::Ordering,
    ffi::CString,
    hash::{
        Hash,
        Hasher,
    },
    os::raw::c_int,
    os::unix::{
        ffi::OsStrExt,
        io::AsRawFd,
    },
    path::Path,
    sync::{
        Arc,
        Weak,
    },
};

use inotify_sys as ffi;
use tracing::debug;

use crate::error::{
    Error,
    Result,
};
use crate::fd_guard::FdGuard;

bitflags! {
    /// Describes a file system watch
    ///
    /// Passed to [`Watches::add`], to describe what file system events
    /// to watch for, and how to do that.
    ///
    /// # Examples
    ///
    /// `WatchMask` constants can be passed to [`Watches::add`] as is, or
    /// combined. Here we add a watch that is triggered both when files are
    /// created or deleted in a directory:
    ///
    /// ``` rust
    /// # use inotify_io::{
    /// #     Inotify,
    /// #     WatchMask,
    /// # };
    /// #
    /// # let inotify = Inotify::init().unwrap();
    /// inotify.watches().add("/tmp/", WatchMask::CREATE | WatchMask::DELETE)
    ///    .expect("Error adding watch");
    /// ```
    #[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
    pub struct WatchMask: u32 {
        /// File was accessed
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

        /// Watch for all events
        ///
        /// Every one of the twelve event kinds listed above.
        const ALL_EVENTS = ffi::IN_ALL_EVENTS;

        /// Watch for both `MOVED_FROM` and `MOVED_TO`
        const MOVE = ffi::IN_MOVE;

        /// Watch for both `CLOSE_WRITE` and `CLOSE_NOWRITE`
        const CLOSE = ffi::IN_CLOSE;

        /// Don't dereference the path if it is a symbolic link
        const DONT_FOLLOW = ffi::IN_DONT_FOLLOW;

        /// Filter events for directory entries that have been unlinked
        const EXCL_UNLINK = ffi::IN_EXCL_UNLINK;

        /// If a watch for the inode exists, amend it instead of replacing it
        const MASK_ADD = ffi::IN_MASK_ADD;

        /// Only receive one event, then remove the watch
        const ONESHOT = ffi::IN_ONESHOT;

        /// Only watch path, if it is a directory
        const ONLYDIR = ffi::IN_ONLYDIR;
    }
}

impl WatchMask {
    /// Symbolic names of the event kinds in this mask
    ///
    /// Option bits such as `ONESHOT` have no name and are skipped.
    pub fn event_names(self) -> Vec<&'static str> {
        crate::symbols::mask_to_events(self.bits())
    }
}

/// Interface for adding and removing watches
///
/// Obtained from [`Inotify::watches`]. Clones refer to the same inotify
/// instance. Calls must not race with reads on that instance; the caller
/// serializes them.
///
/// [`Inotify::watches`]: crate::Inotify::watches
#[derive(Clone, Debug)]
pub struct Watches {
    pub(crate) fd: Arc<FdGuard>,
}

impl Watches {
    pub(crate) fn new(fd: Arc<FdGuard>) -> Self {
        Watches { fd }
    }

    /// Adds or updates a watch for the given path
    ///
    /// Adds a new watch or updates an existing one for the file referred to by
    /// `path`. Returns a watch descriptor that can be used to refer to this
    /// watch later.
    ///
    /// If this method is used to update an existing watch, a
    /// [`WatchDescriptor`] that equals the previously returned one is returned
    /// again. The existing mask is replaced, unless `mask` contains
    /// [`WatchMask::MASK_ADD`]. This also happens for a different path that
    /// links to the same inode.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`], if `path` is empty or contains a `'\0'`
    ///   byte.
    /// - [`Error::ClosedDescriptor`], if the instance was closed.
    /// - [`Error::SystemFailure`], if [`inotify_add_watch`] fails. This
    ///   includes an empty `mask`, which the kernel rejects.
    ///
    /// [`inotify_add_watch`]: inotify_sys::inotify_add_watch
    pub fn add<P>(&mut self, path: P, mask: WatchMask) -> Result<WatchDescriptor>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let bytes = path.as_os_str().as_bytes();
        if bytes.is_empty() {
            return Err(Error::InvalidArgument("watch path is empty"));
        }
        let c_path = CString::new(bytes)
            .map_err(|_| Error::InvalidArgument("watch path contains a nul byte"))?;

        let fd = self.fd.raw()?;
        let wd = unsafe { ffi::inotify_add_watch(fd, c_path.as_ptr() as *const _, mask.bits()) };

        if wd == -1 {
            return Err(Error::last_os_error("inotify_add_watch"));
        }

        debug!(fd, wd, path = %path.display(), ?mask, "added watch");

        Ok(WatchDescriptor {
            id: wd,
            fd: Arc::downgrade(&self.fd),
        })
    }

    /// Adds or updates a watch, naming the events symbolically
    ///
    /// Folds `names` through [`events_to_mask`](crate::events_to_mask), then
    /// behaves like [`Watches::add`]. Unrecognized names are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if none of the names is recognized,
    /// otherwise the errors of [`Watches::add`].
    pub fn add_events<P, I>(&mut self, path: P, names: I) -> Result<WatchDescriptor>
    where
        P: AsRef<Path>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mask = crate::symbols::events_to_mask(names)
            .ok_or(Error::InvalidArgument("no recognized event names"))?;

        self.add(path, mask)
    }

    /// Stops watching a file
    ///
    /// Removes the watch represented by the provided [`WatchDescriptor`] by
    /// calling [`inotify_rm_watch`]. The kernel then queues a last event for
    /// that watch with [`EventMask::IGNORED`] set.
    ///
    /// # Errors
    ///
    /// - [`Error::ClosedDescriptor`], if the instance was closed.
    /// - [`Error::InvalidArgument`], if `wd` did not originate from this
    ///   instance.
    /// - [`Error::SystemFailure`], if [`inotify_rm_watch`] fails, for example
    ///   because the watch was already removed.
    ///
    /// [`inotify_rm_watch`]: inotify_sys::inotify_rm_watch
    /// [`EventMask::IGNORED`]: crate::EventMask::IGNORED
    pub fn remove(&mut self, wd: WatchDescriptor) -> Result<()> {
        let fd = self.fd.raw()?;

        match wd.fd.upgrade() {
            Some(owner) if Arc::ptr_eq(&owner, &self.fd) => (),
            _ => {
                return Err(Error::InvalidArgument(
                    "watch descriptor belongs to another inotify instance",
                ))
            }
        }

        if unsafe { ffi::inotify_rm_watch(fd, wd.id) } == -1 {
            return Err(Error::last_os_error("inotify_rm_watch"));
        }

        debug!(fd, wd = wd.id, "removed watch");
        Ok(())
    }

    /// Closes the inotify instance this handle belongs to
    ///
    /// Unlike [`Inotify::close`], this works from any handle, so it can cancel
    /// a read that is waiting on another thread or task: that read returns
    /// [`Error::ClosedDescriptor`]. So does every later operation through any
    /// handle of the instance. The file descriptor is released once the last
    /// handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClosedDescriptor`] if the instance was closed already.
    ///
    /// [`Inotify::close`]: crate::Inotify::close
    pub fn close(&self) -> Result<()> {
        self.fd.mark_closed()?;

        debug!(fd = self.fd.as_raw_fd(), "closed inotify instance");
        Ok(())
    }
}

/// Represents a watch on an inode
///
/// Can be obtained from [`Watches::add`] or from an [`Event`]. A watch
/// descriptor can be used to get inotify to stop watching an inode by passing
/// it to [`Watches::remove`].
///
/// Two watch descriptors are equal if they have the same id and come from the
/// same inotify instance. Ordering sorts by id first, then by instance, so it
/// agrees with equality.
///
/// [`Event`]: crate::Event
#[derive(Clone, Debug)]
pub struct WatchDescriptor {
    pub(crate) id: c_int,
    pub(crate) fd: Weak<FdGuard>,
}

impl WatchDescriptor {
    /// Getter method for a watcher's id.
    ///
    /// Can be used to distinguish events for files with the same name.
    pub fn get_watch_descriptor_id(&self) -> c_int {
        self.id
    }
}

impl Eq for WatchDescriptor {}

impl PartialEq for WatchDescriptor {
    fn eq(&self, other: &Self) -> bool {
        // A weak pointer keeps its allocation alive, so the address can't be
        // reused by another instance while `self` exists.
        self.id == other.id && Weak::ptr_eq(&self.fd, &other.fd)
    }
}

impl Ord for WatchDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.fd.as_ptr().cmp(&other.fd.as_ptr()))
    }
}

impl PartialOrd for WatchDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for WatchDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // `fd` is a weak pointer that may be gone already. The hash must not
        // depend on that, so only the id is hashed.
        self.id.hash(state);
    }
}
