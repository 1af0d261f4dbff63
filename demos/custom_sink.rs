//! Using a custom sink to capture points instead of sending them over the network.
//!
//! Run with: `cargo run --example custom_sink`

use influx_batch_publisher::{
    encode_point, BatchPublisher, MetricPublisher, MetricResult, PointRecord, PointSink,
    PublisherOptions,
};
use std::sync::{Arc, Mutex};

/// A custom sink that stores line protocol in a shared Vec.
struct InMemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl PointSink for InMemorySink {
    fn write(&mut self, points: &[PointRecord], _batch_size: usize) -> MetricResult<usize> {
        let mut lines = self.lines.lock().unwrap();
        for point in points {
            let mut line = String::new();
            encode_point(point, &mut line)?;
            lines.push(line.trim_end().to_string());
        }
        Ok(points.len())
    }
}

fn main() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = InMemorySink {
        lines: lines.clone(),
    };

    let publisher = BatchPublisher::new(sink, PublisherOptions::default());

    publisher.write_batched("check_bw", [("unit", "dbw"), ("metric", "dnbw")], -42.5);
    publisher.write_batched("check_cpe", [("metric", "cpu")], 17);

    // Shutdown triggers a final flush
    publisher.shutdown();

    let captured = lines.lock().unwrap();
    println!("Captured {} lines:", captured.len());
    for line in captured.iter() {
        println!("  {line}");
    }
}
