// These tests run against the real inotify API of the kernel they run on.

use std::{
    cmp::Ordering,
    collections::BTreeSet,
    fs::{
        self,
        File,
        OpenOptions,
    },
    io::Write,
    path::PathBuf,
    sync::mpsc,
    thread,
    time::{
        Duration,
        Instant,
    },
};

use inotify_io::{
    create_descriptor,
    Error,
    EventKind,
    EventMask,
    Inotify,
    WatchMask,
    MAX_EVENT_SIZE,
};
use tempdir::TempDir;

#[test]
fn it_should_watch_a_file() {
    let mut testdir = TestDir::new();
    let (path, mut file) = testdir.new_file();

    let mut inotify = Inotify::init().unwrap();
    let watch = inotify.watches().add(&path, WatchMask::MODIFY).unwrap();

    write_to(&mut file);

    let event = inotify.read_event_blocking().unwrap();
    assert_eq!(watch, event.wd);
    assert!(event.mask.contains(EventMask::MODIFY));
    assert_eq!(event.file_name(), None);
}

#[test]
fn it_should_report_created_files_with_their_watch() {
    let testdir = TestDir::new();

    let mut inotify = Inotify::init().unwrap();
    let watch = inotify
        .watches()
        .add(testdir.path(), WatchMask::CREATE | WatchMask::MODIFY)
        .unwrap();
    assert!(watch.get_watch_descriptor_id() >= 0);

    File::create(testdir.path().join("x")).unwrap();

    let event = inotify.read_event_blocking().unwrap();
    assert_eq!(watch, event.wd);
    assert!(event.mask.contains(EventMask::CREATE));
    assert_eq!(event.file_name().unwrap(), "x");
}

#[test]
fn it_should_return_immediately_if_no_events_are_available() {
    let mut inotify = Inotify::init().unwrap();

    let start = Instant::now();
    let result = inotify.read_event();

    assert!(matches!(result, Err(Error::TimedOut)));
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn it_should_not_return_duplicate_events() {
    let mut testdir = TestDir::new();
    let (path, mut file) = testdir.new_file();

    let mut inotify = Inotify::init().unwrap();
    inotify.watches().add(&path, WatchMask::MODIFY).unwrap();

    write_to(&mut file);
    inotify.read_event_blocking().unwrap();

    assert!(matches!(inotify.read_event(), Err(Error::TimedOut)));
}

#[test]
fn it_should_handle_file_names_correctly() {
    let mut testdir = TestDir::new();
    let (mut path, mut file) = testdir.new_file();
    let file_name = path.file_name().unwrap().to_str().unwrap().to_string();
    path.pop(); // Get path to the directory the file is in

    let mut inotify = Inotify::init().unwrap();
    inotify.watches().add(&path, WatchMask::MODIFY).unwrap();

    write_to(&mut file);

    let event = inotify.read_event_blocking().unwrap();
    assert_eq!(file_name, event.file_name().unwrap().to_str().unwrap());
    // Padding is part of the raw name
    assert_eq!(event.name.len() % 4, 0);
    assert!(event.name.starts_with(file_name.as_bytes()));
}

#[test]
fn it_should_hand_out_buffered_events_in_order() {
    let testdir = TestDir::new();

    let mut inotify = Inotify::with_buffer_capacity(4096).unwrap();
    inotify
        .watches()
        .add(testdir.path(), WatchMask::CREATE)
        .unwrap();

    for name in &["one", "two", "three"] {
        File::create(testdir.path().join(name)).unwrap();
    }

    // The first read picks up all three events; none may get lost.
    let first = inotify.read_event_blocking().unwrap();
    let second = inotify.read_event().unwrap();
    let third = inotify.read_event().unwrap();

    assert_eq!(first.file_name().unwrap(), "one");
    assert_eq!(second.file_name().unwrap(), "two");
    assert_eq!(third.file_name().unwrap(), "three");
    assert!(matches!(inotify.read_event(), Err(Error::TimedOut)));
}

#[test]
fn it_should_read_without_blocking_once_an_event_is_queued() {
    let testdir = TestDir::new();

    let mut inotify = Inotify::init().unwrap();
    let watch = inotify
        .watches()
        .add(testdir.path(), WatchMask::CREATE)
        .unwrap();

    File::create(testdir.path().join("queued")).unwrap();

    let event = inotify.read_event().unwrap();
    assert_eq!(watch, event.wd);
    assert_eq!(event.mask.kind(), Ok(Some(EventKind::Create)));
}

#[test]
fn it_should_connect_rename_events_through_the_cookie() {
    let testdir = TestDir::new();
    File::create(testdir.path().join("before")).unwrap();

    let mut inotify = Inotify::init().unwrap();
    inotify
        .watches()
        .add(testdir.path(), WatchMask::MOVE)
        .unwrap();

    fs::rename(testdir.path().join("before"), testdir.path().join("after")).unwrap();

    let from = inotify.read_event_blocking().unwrap();
    let to = inotify.read_event_blocking().unwrap();

    assert_eq!(from.event_names(), ["moved_from"]);
    assert_eq!(to.event_names(), ["moved_to"]);
    assert_eq!(from.file_name().unwrap(), "before");
    assert_eq!(to.file_name().unwrap(), "after");
    assert_ne!(from.cookie, 0);
    assert_eq!(from.cookie, to.cookie);
}

#[test]
fn it_should_add_and_remove_a_watch() {
    let mut testdir = TestDir::new();
    let (path, _) = testdir.new_file();

    let inotify = Inotify::init().unwrap();
    let mut watches = inotify.watches();

    for mask in &[
        WatchMask::ACCESS,
        WatchMask::ALL_EVENTS,
        WatchMask::CLOSE | WatchMask::ONESHOT,
        WatchMask::ATTRIB | WatchMask::DONT_FOLLOW,
    ] {
        let watch = watches.add(&path, *mask).unwrap();
        watches.remove(watch).unwrap();
    }
}

#[test]
fn it_should_update_an_existing_watch() {
    let mut testdir = TestDir::new();
    let (path, _) = testdir.new_file();

    let inotify = Inotify::init().unwrap();
    let mut watches = inotify.watches();

    let first = watches.add(&path, WatchMask::MODIFY).unwrap();
    let second = watches.add(&path, WatchMask::ACCESS).unwrap();

    assert_eq!(first, second);
}

#[test]
fn it_should_add_watches_by_event_name() {
    let testdir = TestDir::new();

    let mut inotify = Inotify::init().unwrap();
    let watch = inotify
        .watches()
        .add_events(testdir.path(), ["create", "no_such_event"])
        .unwrap();

    File::create(testdir.path().join("named")).unwrap();

    let event = inotify.read_event_blocking().unwrap();
    assert_eq!(watch, event.wd);
    assert_eq!(event.event_names(), ["create"]);
}

#[test]
fn it_should_reject_unknown_event_names() {
    let testdir = TestDir::new();
    let inotify = Inotify::init().unwrap();

    let result = inotify
        .watches()
        .add_events(testdir.path(), ["rename", "write"]);

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn it_should_report_the_removed_watch_or_nothing_after_removal() {
    let testdir = TestDir::new();

    let mut inotify = Inotify::init().unwrap();
    let mut watches = inotify.watches();
    let watch = watches.add(testdir.path(), WatchMask::CREATE).unwrap();
    let id = watch.get_watch_descriptor_id();

    watches.remove(watch).unwrap();

    match inotify.read_event() {
        Ok(event) => {
            assert!(event.is_ignored());
            assert_eq!(event.wd.get_watch_descriptor_id(), id);
        }
        Err(Error::TimedOut) => (),
        Err(error) => panic!("unexpected error: {}", error),
    }
}

#[test]
fn it_should_fail_to_remove_a_watch_twice() {
    let testdir = TestDir::new();

    let inotify = Inotify::init().unwrap();
    let mut watches = inotify.watches();
    let watch = watches.add(testdir.path(), WatchMask::CREATE).unwrap();

    watches.remove(watch.clone()).unwrap();
    let result = watches.remove(watch);

    match result {
        Err(Error::SystemFailure { source, .. }) => {
            assert_eq!(source.raw_os_error(), Some(libc::EINVAL));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn it_should_reject_watch_descriptors_of_other_instances() {
    let testdir = TestDir::new();

    let inotify_a = Inotify::init().unwrap();
    let inotify_b = Inotify::init().unwrap();
    let watch = inotify_a
        .watches()
        .add(testdir.path(), WatchMask::CREATE)
        .unwrap();

    let result = inotify_b.watches().remove(watch);

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn it_should_reject_empty_and_nul_paths() {
    let inotify = Inotify::init().unwrap();
    let mut watches = inotify.watches();

    assert!(matches!(
        watches.add("", WatchMask::CREATE),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        watches.add("/tmp/nul\0byte", WatchMask::CREATE),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn it_should_surface_kernel_rejections_as_system_failures() {
    let testdir = TestDir::new();
    let inotify = Inotify::init().unwrap();
    let mut watches = inotify.watches();

    // The kernel refuses an empty mask
    assert!(matches!(
        watches.add(testdir.path(), WatchMask::empty()),
        Err(Error::SystemFailure { .. })
    ));
    assert!(matches!(
        watches.add(testdir.path().join("missing"), WatchMask::CREATE),
        Err(Error::SystemFailure { .. })
    ));
}

#[test]
fn it_should_refuse_operations_after_close() {
    let testdir = TestDir::new();

    let inotify = Inotify::init().unwrap();
    let mut watches = inotify.watches();
    let watch = watches.add(testdir.path(), WatchMask::CREATE).unwrap();

    inotify.close().unwrap();

    assert!(matches!(
        watches.add(testdir.path(), WatchMask::CREATE),
        Err(Error::ClosedDescriptor)
    ));
    assert!(matches!(watches.remove(watch), Err(Error::ClosedDescriptor)));
}

#[test]
fn it_should_fail_a_waiting_blocking_read_once_closed() {
    let testdir = TestDir::new();

    let mut inotify = Inotify::init().unwrap();
    let mut watches = inotify.watches();
    watches.add(testdir.path(), WatchMask::CREATE).unwrap();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(inotify.read_event_blocking());
    });

    // Nothing happens in the directory, so the read keeps waiting
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    watches.close().unwrap();

    let result = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(matches!(result, Err(Error::ClosedDescriptor)));
}

#[test]
fn it_should_close_through_any_handle() {
    let testdir = TestDir::new();

    let mut inotify = Inotify::init().unwrap();
    let mut watches = inotify.watches();
    watches.add(testdir.path(), WatchMask::CREATE).unwrap();
    File::create(testdir.path().join("queued")).unwrap();

    watches.close().unwrap();

    assert!(matches!(inotify.read_event(), Err(Error::ClosedDescriptor)));
    assert!(matches!(
        inotify.read_event_blocking(),
        Err(Error::ClosedDescriptor)
    ));
    assert!(matches!(watches.close(), Err(Error::ClosedDescriptor)));
    assert!(matches!(inotify.close(), Err(Error::ClosedDescriptor)));
}

#[test]
fn it_should_order_watch_descriptors_consistently_with_equality() {
    let testdir = TestDir::new();

    let inotify_a = Inotify::init().unwrap();
    let inotify_b = Inotify::init().unwrap();
    let a = inotify_a
        .watches()
        .add(testdir.path(), WatchMask::CREATE)
        .unwrap();
    let b = inotify_b
        .watches()
        .add(testdir.path(), WatchMask::CREATE)
        .unwrap();

    // First watch of each instance
    assert_eq!(a.get_watch_descriptor_id(), b.get_watch_descriptor_id());
    assert_ne!(a, b);
    assert_ne!(a.cmp(&b), Ordering::Equal);
    assert_eq!(a.cmp(&a.clone()), Ordering::Equal);

    let set: BTreeSet<_> = vec![a.clone(), b.clone(), a.clone()].into_iter().collect();
    assert_eq!(set.len(), 2);
    assert!(set.contains(&a));
    assert!(set.contains(&b));
}

#[test]
fn it_should_wrap_a_created_descriptor() {
    let testdir = TestDir::new();
    let fd = create_descriptor().unwrap();

    let mut inotify = Inotify::from_descriptor(fd).unwrap();
    inotify
        .watches()
        .add(testdir.path(), WatchMask::CREATE)
        .unwrap();

    File::create(testdir.path().join("wrapped")).unwrap();

    assert_eq!(
        inotify.read_event_blocking().unwrap().file_name().unwrap(),
        "wrapped"
    );
    inotify.close().unwrap();
}

#[test]
fn it_should_reject_buffers_smaller_than_one_event() {
    assert!(matches!(
        Inotify::with_buffer_capacity(MAX_EVENT_SIZE - 1),
        Err(Error::InvalidArgument(_))
    ));
    assert!(Inotify::with_buffer_capacity(MAX_EVENT_SIZE).is_ok());
}

struct TestDir {
    dir: TempDir,
    counter: u32,
}

impl TestDir {
    fn new() -> TestDir {
        TestDir {
            dir: TempDir::new("inotify-io-test").unwrap(),
            counter: 0,
        }
    }

    fn path(&self) -> &std::path::Path {
        self.dir.path()
    }

    fn new_file(&mut self) -> (PathBuf, File) {
        let id = self.counter;
        self.counter += 1;

        let path = self.dir.path().join("file-".to_string() + &id.to_string());
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .unwrap_or_else(|error| panic!("Failed to create temporary file: {}", error));

        (path, file)
    }
}

fn write_to(file: &mut File) {
    file.write_all(b"This should trigger an inotify event.")
        .unwrap_or_else(|error| panic!("Failed to write to file: {}", error));
}
