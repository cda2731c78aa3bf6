use std::{
    env,
    thread,
    time::Duration,
};

use inotify_io::{
    Error,
    Inotify,
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
        .add_events(current_dir, ["create", "delete", "moved_from", "moved_to"])
        .expect("Failed to add inotify watch");

    println!("Polling current directory for activity...");

    loop {
        match inotify.read_event() {
            Ok(event) => {
                println!("{:?} {:?}", event.event_names(), event.file_name());
            }
            Err(Error::TimedOut) => {
                // Other work would go here
                thread::sleep(Duration::from_millis(250));
            }
            Err(error) => panic!("Failed to read inotify event: {}", error),
        }
    }
}
