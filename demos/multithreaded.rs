//! Sharing a BatchPublisher across multiple threads using Arc.
//!
//! Run with: `cargo run --example multithreaded`

use influx_batch_publisher::{
    write_batched, BatchPublisher, MetricPublisher, PublisherOptions, UdpLineSink, UdpSinkOptions,
};
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let options = PublisherOptions {
        batch_size: 500,
        queue_capacity_trigger: 5000,
        flush_interval: Duration::from_secs(5),
        periodic_flush: true,
        // flush idle queues without waiting for the next write
        background_flush: Some(Duration::from_secs(1)),
    };

    let sink = UdpLineSink::new(UdpSinkOptions::new("127.0.0.1:8089".parse().unwrap()))
        .expect("failed to bind UDP socket");
    let publisher = Arc::new(BatchPublisher::new(sink, options));

    let mut handles = Vec::new();

    // Spawn worker threads that write points concurrently
    for thread_id in 0..4 {
        let publisher = publisher.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..10_000 {
                write_batched!(publisher, "task.duration", i % 250, "worker" => format!("{thread_id}"));
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    // shutdown() requires ownership, unwrap the Arc
    // (only succeeds when no other Arc references remain)
    match Arc::try_unwrap(publisher) {
        Ok(p) => p.shutdown(),
        Err(_) => eprintln!("Warning: other Arc references still alive, cannot shutdown cleanly"),
    }

    println!("All threads finished. Points flushed.");
}
