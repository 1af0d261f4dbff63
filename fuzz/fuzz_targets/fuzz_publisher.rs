#![no_main]

use influx_batch_publisher::{
    no_tags, BatchPublisher, MetricPublisher, MetricResult, PointRecord, PointSink,
    PublisherOptions,
};
use libfuzzer_sys::fuzz_target;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fails whenever the fuzzer says so, records what it accepted otherwise.
struct ScriptedSink {
    script: Vec<bool>,
    step: usize,
    delivered: Arc<Mutex<usize>>,
}

impl PointSink for ScriptedSink {
    fn write(&mut self, points: &[PointRecord], _batch_size: usize) -> MetricResult<usize> {
        let ok = self.script.get(self.step).copied().unwrap_or(true);
        self.step += 1;
        if !ok {
            return Err("scripted failure".into());
        }
        *self.delivered.lock().unwrap() += points.len();
        Ok(points.len())
    }
}

// Every point written is delivered exactly once, whatever the failure pattern
fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let delivered = Arc::new(Mutex::new(0));
    let sink = ScriptedSink {
        script: data.iter().map(|b| b % 3 != 0).collect(),
        step: 0,
        delivered: Arc::clone(&delivered),
    };
    let options = PublisherOptions {
        batch_size: usize::from(data[0] % 8) + 1,
        queue_capacity_trigger: usize::from(data[0] % 16) + 1,
        flush_interval: Duration::from_secs(300),
        periodic_flush: false,
        background_flush: None,
    };
    let publisher = BatchPublisher::new(sink, options);

    for byte in data {
        publisher.write_batched("fuzz", no_tags(), i64::from(*byte));
        if byte % 5 == 0 {
            let _ = publisher.flush();
        }
    }

    // script is exhausted after at most data.len() attempts, then everything succeeds
    while publisher.queued_len() > 0 {
        let _ = publisher.flush();
    }
    publisher.shutdown();

    assert_eq!(*delivered.lock().unwrap(), data.len());
});
