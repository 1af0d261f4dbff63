//! Writing to the InfluxDB HTTP API.
//!
//! Run with: `cargo run --example http_sink --features http`
//! Needs an InfluxDB 1.x (or the 2.x v1 compatibility API) on localhost:8086.

use influx_batch_publisher::{
    BatchPublisher, HttpLineSink, HttpSinkOptions, MetricPublisher, PublisherOptions,
};

fn main() {
    let options = HttpSinkOptions {
        username: Some("root".to_string()),
        password: Some("root".to_string()),
        ..HttpSinkOptions::default()
    };

    // Nothing can be buffered before the sink exists, so failing here is fatal.
    let sink = HttpLineSink::new(options).expect("InfluxDB is not reachable");
    let publisher = BatchPublisher::new(sink, PublisherOptions::default());

    if let Err(err) = publisher.write_immediate("check_uptime", [("service", "service")], 3600) {
        eprintln!("immediate write failed: {err}");
    }

    for i in 0..20_000 {
        publisher.write_batched("check_txrx", [("metric", "uptx")], i);
    }

    match publisher.flush() {
        Ok(outcome) => println!("flushed: {outcome:?}"),
        Err(err) => eprintln!("flush failed, points stay queued: {err}"),
    }

    publisher.shutdown();
}
