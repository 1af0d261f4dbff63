//! Basic usage: queue points and let the size trigger flush them over UDP.
//!
//! Run with: `cargo run --example basic`
//! Point an InfluxDB UDP listener at 127.0.0.1:8089 to see the data arrive.

use influx_batch_publisher::{
    write_batched, BatchPublisher, BatchedWrite, MetricPublisher, PublisherOptions, UdpLineSink,
    UdpSinkOptions,
};

fn main() {
    let sink = UdpLineSink::new(UdpSinkOptions::new("127.0.0.1:8089".parse().unwrap()))
        .expect("failed to bind UDP socket");
    let publisher = BatchPublisher::new(sink, PublisherOptions::for_batch_size(100));

    for i in 0..2500 {
        let result = publisher.write_batched(
            "check_txrx",
            [("metric", "upbw"), ("unit", "percent")],
            f64::from(i % 100),
        );
        if let BatchedWrite::Flushed(outcome) = result {
            println!("write {i} triggered a flush: {outcome:?}");
        }
    }

    // Macro form
    write_batched!(publisher, "check_uptime", 3600, "service" => "service");

    println!("{} points still queued", publisher.queued_len());

    // shutdown() flushes what is left
    publisher.shutdown();
}
