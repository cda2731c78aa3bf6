use std::{
    fs::File,
    io,
    time::Duration,
};

use futures_util::StreamExt;
use inotify_io::{
    Inotify,
    WatchMask,
};
use tempdir::TempDir;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let inotify = Inotify::init()
        .expect("Failed to initialize inotify");

    let dir = TempDir::new("inotify-io-demo")?;

    inotify
        .watches()
        .add(dir.path(), WatchMask::CREATE | WatchMask::MODIFY)?;

    let path = dir.path().to_path_buf();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(500));
        loop {
            interval.tick().await;
            if let Err(error) = File::create(path.join("file")) {
                eprintln!("Failed to create file: {}", error);
                break;
            }
        }
    });

    let mut stream = inotify.into_event_stream()?;

    while let Some(event) = stream.next().await {
        println!("event: {:?}", event?);
    }

    Ok(())
}
