use std::env;

use inotify_io::{
    EventMask,
    Inotify,
    WatchMask,
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut inotify = Inotify::init()
        .expect("Failed to initialize inotify");

    let current_dir = env::current_dir()
        .expect("Failed to determine current directory");

    inotify
        .watches()
        .add(
            current_dir,
            WatchMask::MODIFY | WatchMask::CREATE | WatchMask::DELETE,
        )
        .expect("Failed to add inotify watch");

    println!("Watching current directory for activity...");

    loop {
        let event = inotify
            .read_event_blocking()
            .expect("Failed to read inotify event");

        let subject = if event.is_dir() { "Directory" } else { "File" };

        if event.mask.contains(EventMask::CREATE) {
            println!("{} created: {:?}", subject, event.file_name());
        } else if event.mask.contains(EventMask::DELETE) {
            println!("{} deleted: {:?}", subject, event.file_name());
        } else if event.mask.contains(EventMask::MODIFY) {
            println!("{} modified: {:?}", subject, event.file_name());
        }
    }
}
