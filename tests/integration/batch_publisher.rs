use crate::support::RecordingSink;
use influx_batch_publisher::{
    no_tags, BatchPublisher, BatchedWrite, FieldValue, FlushOutcome, MetricPublisher,
    MetricResult, MetricsError, PointRecord, PointSink, PublisherOptions,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// ============================================================================
// Helper functions to reduce test code duplication
// ============================================================================

fn options(batch_size: usize, queue_capacity_trigger: usize) -> PublisherOptions {
    PublisherOptions {
        batch_size,
        queue_capacity_trigger,
        flush_interval: Duration::from_secs(300),
        periodic_flush: true,
        background_flush: None,
    }
}

fn timed_options(flush_interval: Duration, periodic_flush: bool) -> PublisherOptions {
    PublisherOptions {
        flush_interval,
        periodic_flush,
        ..options(100, 1000)
    }
}

fn create_publisher(options: PublisherOptions) -> (BatchPublisher<RecordingSink>, RecordingSink) {
    let sink = RecordingSink::new();
    (BatchPublisher::new(sink.clone(), options), sink)
}

// ============================================================================
// Size trigger
// ============================================================================

#[test]
fn test_no_flush_below_trigger() {
    let (publisher, sink) = create_publisher(options(5, 10));

    for i in 0..9 {
        let result = publisher.write_batched("check_txrx", [("metric", "upbw")], f64::from(i));
        assert_eq!(result, BatchedWrite::Queued { queued: i as usize + 1 });
    }

    assert_eq!(publisher.queued_len(), 9);
    assert_eq!(sink.attempts(), 0);
}

#[test]
fn test_trigger_point_flushes_both_points() {
    let (publisher, sink) = create_publisher(options(2, 2));

    assert_eq!(
        publisher.write_batched("cpu", no_tags(), 1.0),
        BatchedWrite::Queued { queued: 1 }
    );
    assert_eq!(
        publisher.write_batched("cpu", no_tags(), 2.0),
        BatchedWrite::Flushed(FlushOutcome::Delivered { points: 2 })
    );

    assert_eq!(publisher.queued_len(), 0);
    assert_eq!(sink.attempts(), 1);
    assert_eq!(sink.delivered_values(), vec![1.0, 2.0]);
}

#[test]
fn test_each_trigger_flushes_exactly_once() {
    let (publisher, sink) = create_publisher(options(3, 3));

    for i in 0..9 {
        publisher.write_batched("cpu", no_tags(), i);
    }

    assert_eq!(publisher.queued_len(), 0);
    let sizes: Vec<usize> = sink.writes().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![3, 3, 3]);
}

#[test]
fn test_default_trigger_is_ten_batches() {
    let options = PublisherOptions::default();
    assert_eq!(options.batch_size, 5000);
    assert_eq!(options.queue_capacity_trigger, 50_000);
    assert_eq!(options.flush_interval, Duration::from_secs(300));
    assert!(options.periodic_flush);
    assert!(options.background_flush.is_none());

    let scaled = PublisherOptions::for_batch_size(2);
    assert_eq!(scaled.queue_capacity_trigger, 20);
}

// ============================================================================
// Time trigger
// ============================================================================

#[test]
fn test_interval_flush_happens_on_next_write() {
    let (publisher, sink) = create_publisher(timed_options(Duration::from_millis(50), true));

    assert_eq!(
        publisher.write_batched("cpu", no_tags(), 1),
        BatchedWrite::Queued { queued: 1 }
    );
    thread::sleep(Duration::from_millis(120));

    // nothing flushes on its own
    assert_eq!(sink.attempts(), 0);
    assert_eq!(publisher.queued_len(), 1);

    assert_eq!(
        publisher.write_batched("cpu", no_tags(), 2),
        BatchedWrite::Flushed(FlushOutcome::Delivered { points: 2 })
    );
    assert_eq!(publisher.queued_len(), 0);
}

#[test]
fn test_interval_ignored_when_periodic_flush_disabled() {
    let (publisher, sink) = create_publisher(timed_options(Duration::from_millis(10), false));

    publisher.write_batched("cpu", no_tags(), 1);
    thread::sleep(Duration::from_millis(50));

    assert_eq!(
        publisher.write_batched("cpu", no_tags(), 2),
        BatchedWrite::Queued { queued: 2 }
    );
    assert_eq!(sink.attempts(), 0);
}

#[test]
fn test_empty_flush_resets_interval() {
    let (publisher, sink) = create_publisher(timed_options(Duration::from_millis(300), true));

    thread::sleep(Duration::from_millis(200));
    assert_eq!(publisher.flush().unwrap(), FlushOutcome::Empty);
    thread::sleep(Duration::from_millis(150));

    // 350ms since construction, 150ms since the empty flush
    assert_eq!(
        publisher.write_batched("cpu", no_tags(), 1),
        BatchedWrite::Queued { queued: 1 }
    );
    assert_eq!(sink.attempts(), 0);
}

#[test]
fn test_background_flush_without_writes() {
    let mut options = timed_options(Duration::from_millis(30), true);
    options.background_flush = Some(Duration::from_millis(10));
    let (publisher, sink) = create_publisher(options);

    publisher.write_batched("cpu", no_tags(), 1);
    thread::sleep(Duration::from_millis(300));

    assert_eq!(publisher.queued_len(), 0);
    assert_eq!(sink.delivered_values(), vec![1.0]);
}

// ============================================================================
// Explicit flush
// ============================================================================

#[test]
fn test_second_flush_is_empty() {
    let (publisher, _sink) = create_publisher(options(100, 100));

    for i in 0..3 {
        publisher.write_batched("cpu", no_tags(), i);
    }

    assert_eq!(publisher.flush().unwrap(), FlushOutcome::Delivered { points: 3 });
    assert_eq!(publisher.flush().unwrap(), FlushOutcome::Empty);
}

#[test]
fn test_failed_flush_keeps_points_in_order() {
    let (publisher, sink) = create_publisher(options(100, 100));

    for i in 1..=3 {
        publisher.write_batched("cpu", no_tags(), i);
    }

    sink.set_failing(true);
    let err = publisher.flush().unwrap_err();
    assert!(matches!(err, MetricsError::Delivery { points: 3, .. }));
    assert!(err.is_retryable());
    assert_eq!(publisher.queued_len(), 3);
    assert!(sink.writes().is_empty());

    sink.set_failing(false);
    assert_eq!(publisher.flush().unwrap(), FlushOutcome::Delivered { points: 3 });
    assert_eq!(sink.writes().len(), 1);
    assert_eq!(sink.delivered_values(), vec![1.0, 2.0, 3.0]);
}

/// Rejects every write with a permanent error.
struct RejectingSink;

impl PointSink for RejectingSink {
    fn write(&mut self, _points: &[PointRecord], _batch_size: usize) -> MetricResult<usize> {
        Err(MetricsError::InvalidPoint("field type conflict".to_string()))
    }
}

#[test]
fn test_triggered_flush_failure_reports_permanent_errors() {
    let publisher = BatchPublisher::new(RejectingSink, options(100, 2));

    publisher.write_batched("cpu", no_tags(), 1);
    assert_eq!(
        publisher.write_batched("cpu", no_tags(), 2),
        BatchedWrite::FlushFailed {
            retained: 2,
            retryable: false
        }
    );
    assert_eq!(publisher.queued_len(), 2);
}

#[test]
fn test_failed_flush_does_not_reset_interval() {
    let (publisher, sink) = create_publisher(timed_options(Duration::from_millis(50), true));
    sink.set_failing(true);

    publisher.write_batched("cpu", no_tags(), 1);
    thread::sleep(Duration::from_millis(100));

    assert_eq!(
        publisher.write_batched("cpu", no_tags(), 2),
        BatchedWrite::FlushFailed {
            retained: 2,
            retryable: true
        }
    );
    // still overdue, so the next write retries
    assert_eq!(
        publisher.write_batched("cpu", no_tags(), 3),
        BatchedWrite::FlushFailed {
            retained: 3,
            retryable: true
        }
    );
    assert_eq!(sink.attempts(), 2);
    assert_eq!(publisher.queued_len(), 3);

    sink.set_failing(false);
    assert_eq!(
        publisher.write_batched("cpu", no_tags(), 4),
        BatchedWrite::Flushed(FlushOutcome::Delivered { points: 4 })
    );
    assert_eq!(sink.delivered_values(), vec![1.0, 2.0, 3.0, 4.0]);
}

/// A sink that parks inside `write` until the test tells it how to answer.
struct GatedSink {
    entered: Sender<()>,
    answer: Receiver<bool>,
    delivered: Sender<Vec<PointRecord>>,
}

impl PointSink for GatedSink {
    fn write(&mut self, points: &[PointRecord], _batch_size: usize) -> MetricResult<usize> {
        self.entered.send(()).unwrap();
        if self.answer.recv().unwrap_or(true) {
            self.delivered.send(points.to_vec()).unwrap();
            Ok(points.len())
        } else {
            Err("simulated backend failure".into())
        }
    }
}

#[test]
fn test_points_written_during_failed_flush_are_kept_after_retained_ones() {
    let (entered_tx, entered_rx) = channel();
    let (answer_tx, answer_rx) = channel();
    let (delivered_tx, delivered_rx) = channel();
    let sink = GatedSink {
        entered: entered_tx,
        answer: answer_rx,
        delivered: delivered_tx,
    };
    let publisher = Arc::new(BatchPublisher::new(sink, options(100, 100)));

    publisher.write_batched("cpu", no_tags(), 1);
    publisher.write_batched("cpu", no_tags(), 2);

    let flusher = {
        let publisher = Arc::clone(&publisher);
        thread::spawn(move || publisher.flush())
    };

    // the queue is free while the sink is busy
    entered_rx.recv().unwrap();
    assert_eq!(publisher.queued_len(), 0);
    publisher.write_batched("cpu", no_tags(), 3);
    publisher.write_batched("cpu", no_tags(), 4);

    answer_tx.send(false).unwrap();
    assert!(flusher.join().unwrap().is_err());
    assert_eq!(publisher.queued_len(), 4);

    let flusher = {
        let publisher = Arc::clone(&publisher);
        thread::spawn(move || publisher.flush())
    };
    entered_rx.recv().unwrap();
    answer_tx.send(true).unwrap();
    assert_eq!(
        flusher.join().unwrap().unwrap(),
        FlushOutcome::Delivered { points: 4 }
    );

    let values: Vec<_> = delivered_rx.recv().unwrap().iter().map(PointRecord::value).collect();
    assert_eq!(
        values,
        vec![
            FieldValue::Integer(1),
            FieldValue::Integer(2),
            FieldValue::Integer(3),
            FieldValue::Integer(4)
        ]
    );

    // answer the final flush on drop, which finds an empty queue
    drop(answer_tx);
}

// ============================================================================
// Immediate writes
// ============================================================================

#[test]
fn test_write_immediate_bypasses_queue() {
    let (publisher, sink) = create_publisher(options(100, 100));
    publisher.write_batched("cpu", no_tags(), 1);

    publisher
        .write_immediate("check_uptime", [("service", "service")], 3600)
        .unwrap();

    assert_eq!(publisher.queued_len(), 1);
    let writes = sink.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].len(), 1);
    assert_eq!(writes[0][0].measurement(), "check_uptime");
}

#[test]
fn test_write_immediate_failure_is_not_retried() {
    let (publisher, sink) = create_publisher(options(100, 100));
    sink.set_failing(true);

    assert!(publisher.write_immediate("cpu", no_tags(), 1.5).is_err());
    assert_eq!(sink.attempts(), 1);
    assert_eq!(publisher.queued_len(), 0);

    sink.set_failing(false);
    publisher.shutdown();
    assert_eq!(sink.attempts(), 1);
}

#[test]
fn test_write_immediate_rejects_unencodable_point_before_the_sink() {
    let (publisher, sink) = create_publisher(options(100, 100));

    let err = publisher.write_immediate("cpu", no_tags(), f64::NAN).unwrap_err();
    assert!(matches!(err, MetricsError::InvalidPoint(_)));
    assert!(!err.is_retryable());
    assert_eq!(sink.attempts(), 0);
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_shutdown_flushes_once_then_closes() {
    let (publisher, sink) = create_publisher(options(100, 100));
    for i in 0..5 {
        publisher.write_batched("cpu", no_tags(), i);
    }

    publisher.shutdown();

    assert_eq!(sink.attempts(), 1);
    assert_eq!(sink.writes()[0].len(), 5);
    assert_eq!(sink.close_count(), 1);
    assert_eq!(
        sink.writes_after_close
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[test]
fn test_shutdown_with_empty_queue_only_closes() {
    let (publisher, sink) = create_publisher(options(100, 100));
    publisher.shutdown();

    assert_eq!(sink.attempts(), 0);
    assert_eq!(sink.close_count(), 1);
}

#[test]
fn test_shutdown_with_background_job() {
    let mut options = options(100, 100);
    options.background_flush = Some(Duration::from_millis(5));
    let (publisher, sink) = create_publisher(options);

    publisher.write_batched("cpu", no_tags(), 7);
    publisher.shutdown();

    assert_eq!(sink.delivered_values(), vec![7.0]);
    assert_eq!(sink.close_count(), 1);
}

#[test]
fn test_drop_during_panic_flushes() {
    let sink = RecordingSink::new();
    let result = catch_unwind(AssertUnwindSafe(|| {
        let publisher = BatchPublisher::new(sink.clone(), options(100, 100));
        publisher.write_batched("cpu", no_tags(), 1);
        publisher.write_batched("cpu", no_tags(), 2);
        panic!("caller failed");
    }));

    assert!(result.is_err());
    assert_eq!(sink.delivered_values(), vec![1.0, 2.0]);
    assert_eq!(sink.close_count(), 1);
}

// ============================================================================
// Instances and point shape
// ============================================================================

#[test]
fn test_instances_do_not_share_queues() {
    let (first, _first_sink) = create_publisher(options(100, 100));
    let (second, _second_sink) = create_publisher(options(100, 100));

    first.write_batched("cpu", no_tags(), 1);
    first.write_batched("cpu", no_tags(), 2);

    assert_eq!(first.queued_len(), 2);
    assert_eq!(second.queued_len(), 0);
}

#[test]
fn test_queued_points_have_sorted_tags() {
    let (publisher, sink) = create_publisher(options(100, 100));
    publisher.write_batched(
        "check_cpe",
        [("unit", "percent"), ("metric", "upbw"), ("service", "service")],
        55.0,
    );
    publisher.flush().unwrap();

    let writes = sink.writes();
    let keys: Vec<&str> = writes[0][0].tags().keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["metric", "service", "unit"]);
}
