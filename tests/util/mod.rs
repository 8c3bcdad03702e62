#![allow(dead_code)]

use std::net::TcpStream;
use std::thread;
use std::time::Duration;

pub fn trace_init() {
    use tracing_subscriber::filter::LevelFilter;

    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .try_init();
}

/// Connects to `addr`, retrying while the server thread is still starting.
pub fn connect(addr: &str) -> TcpStream {
    for _ in 0..50 {
        if let Ok(stream) = TcpStream::connect(addr) {
            return stream;
        }
        thread::sleep(Duration::from_millis(20));
    }

    panic!("Failed to connect to {addr}");
}
