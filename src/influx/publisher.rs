use std::mem;
use std::sync::Arc;
use std::thread::{spawn, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::job::run_flush_job;
use super::line::encode_point;
use super::point::{build_point, FieldValue, PointRecord};
use super::sink::PointSink;
use crate::{MetricResult, MetricsError};

// https://docs.influxdata.com/influxdb/v2/write-data/best-practices/optimize-writes/#batch-writes
/// Points per network write.
pub const DEFAULT_BATCH_SIZE: usize = 5000;
/// How many batches may pile up in the queue before a write forces a flush.
pub const DEFAULT_QUEUE_BATCHES: usize = 10;
/// Queue length that forces a flush with the default batch size.
pub const DEFAULT_QUEUE_CAPACITY_TRIGGER: usize = DEFAULT_BATCH_SIZE * DEFAULT_QUEUE_BATCHES;
/// Maximum time between flushes when periodic flushing is enabled.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Trait defining the publishing interface.
///
/// Implementations turn `(measurement, tags, value)` triples into points and
/// deliver them either immediately or through a batching queue.
pub trait MetricPublisher {
    /// Writes one point straight to the sink, bypassing the queue.
    ///
    /// # Errors
    /// Returns the sink error, or [`MetricsError::InvalidPoint`] when the point
    /// cannot be encoded or the sink acknowledged nothing. Nothing is retried or
    /// queued.
    fn write_immediate<M, I, K, V, F>(&self, measurement: M, tags: I, value: F) -> MetricResult<()>
    where
        M: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        F: Into<FieldValue>;

    /// Queues one point and flushes if a trigger fired.
    ///
    /// The point is always accepted. The returned value only tells whether this
    /// call also flushed, and how that went.
    fn write_batched<M, I, K, V, F>(&self, measurement: M, tags: I, value: F) -> BatchedWrite
    where
        M: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        F: Into<FieldValue>;

    /// Delivers everything queued so far as one batch.
    ///
    /// # Errors
    /// Returns [`MetricsError::Delivery`] when the sink failed. The points stay
    /// queued for the next flush.
    fn flush(&self) -> MetricResult<FlushOutcome>;

    /// Flushes a final time and releases the sink.
    fn shutdown(self);
}

/// Result of a successful [`MetricPublisher::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The queue was empty. Nothing to do, not a failure.
    Empty,
    /// The sink acknowledged the batch.
    Delivered {
        /// Points acknowledged by the sink.
        points: usize,
    },
}

/// What happened during a [`MetricPublisher::write_batched`] call.
///
/// Every variant means the point was accepted into the queue. Only a flush
/// result says anything about delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchedWrite {
    /// No trigger fired.
    Queued {
        /// Queue length after the append.
        queued: usize,
    },
    /// A trigger fired and the flush succeeded.
    Flushed(FlushOutcome),
    /// A trigger fired and the flush failed; the points remain queued.
    FlushFailed {
        /// Points handed to the sink and put back in the queue.
        retained: usize,
        /// Whether the cause was transient, see [`MetricsError::is_retryable`].
        retryable: bool,
    },
}

/// Configuration options for the batching publisher.
#[derive(Debug, Clone)]
pub struct PublisherOptions {
    /// Points per network write. The sink sub-divides flushed batches by this size.
    pub batch_size: usize,
    /// Queue length that forces a flush on the next write.
    pub queue_capacity_trigger: usize,
    /// Time since the last flush after which the next write forces a flush.
    pub flush_interval: Duration,
    /// Enables the `flush_interval` trigger.
    pub periodic_flush: bool,
    /// When set, a background thread checks the time trigger at this rate, so
    /// idle queues get flushed without waiting for the next write.
    pub background_flush: Option<Duration>,
}

impl PublisherOptions {
    /// Options for a given batch size, with the queue trigger scaled to match.
    #[must_use]
    pub fn for_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size,
            queue_capacity_trigger: batch_size.saturating_mul(DEFAULT_QUEUE_BATCHES),
            ..Self::default()
        }
    }
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity_trigger: DEFAULT_QUEUE_CAPACITY_TRIGGER,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            periodic_flush: true,
            background_flush: None,
        }
    }
}

struct QueueState {
    points: Vec<PointRecord>,
    last_flush: Instant,
    // Emptied buffer of the last delivered batch, reused as the next live queue.
    spare: Vec<PointRecord>,
}

pub(crate) struct Shared<S> {
    queue: Mutex<QueueState>,
    sink: Mutex<S>,
    options: PublisherOptions,
}

impl<S: PointSink> Shared<S> {
    fn new(sink: S, options: PublisherOptions) -> Self {
        Self {
            queue: Mutex::new(QueueState {
                points: Vec::new(),
                last_flush: Instant::now(),
                spare: Vec::new(),
            }),
            sink: Mutex::new(sink),
            options,
        }
    }

    fn interval_elapsed(&self, state: &QueueState) -> bool {
        self.options.periodic_flush && state.last_flush.elapsed() > self.options.flush_interval
    }

    /// Takes the whole queue out, leaving an empty one behind.
    ///
    /// Must be called with the queue lock held. An empty queue counts as a flush.
    fn detach(state: &mut QueueState) -> Option<Vec<PointRecord>> {
        if state.points.is_empty() {
            state.last_flush = Instant::now();
            return None;
        }
        let fresh = mem::take(&mut state.spare);
        Some(mem::replace(&mut state.points, fresh))
    }

    fn deliver(&self, mut batch: Vec<PointRecord>) -> MetricResult<FlushOutcome> {
        let size = batch.len();
        let result = self.sink.lock().write(&batch, self.options.batch_size);

        let mut state = self.queue.lock();
        match result {
            Ok(delivered) => {
                state.last_flush = Instant::now();
                batch.clear();
                if batch.capacity() > state.spare.capacity() {
                    state.spare = batch;
                }
                debug!("Flushing queue of size {size}. Delivered: {delivered}");
                Ok(FlushOutcome::Delivered { points: delivered })
            }
            Err(err) => {
                warn!("Flushing queue of size {size} failed, keeping points queued: {err}");
                // Undelivered points go back in front of anything queued meanwhile.
                batch.append(&mut state.points);
                mem::swap(&mut state.points, &mut batch);
                if batch.capacity() > state.spare.capacity() {
                    state.spare = batch;
                }
                Err(MetricsError::Delivery {
                    points: size,
                    source: Box::new(err),
                })
            }
        }
    }

    pub(crate) fn flush(&self) -> MetricResult<FlushOutcome> {
        let batch = Self::detach(&mut self.queue.lock());
        match batch {
            Some(batch) => self.deliver(batch),
            None => Ok(FlushOutcome::Empty),
        }
    }

    /// Flushes only if the time trigger fired. Used by the background job.
    pub(crate) fn flush_if_due(&self) -> Option<MetricResult<FlushOutcome>> {
        let batch = {
            let mut state = self.queue.lock();
            if !self.interval_elapsed(&state) {
                return None;
            }
            Self::detach(&mut state)
        };
        Some(batch.map_or(Ok(FlushOutcome::Empty), |batch| self.deliver(batch)))
    }

    fn enqueue(&self, point: PointRecord) -> BatchedWrite {
        let batch = {
            let mut state = self.queue.lock();
            state.points.push(point);
            let queued = state.points.len();
            if queued < self.options.queue_capacity_trigger && !self.interval_elapsed(&state) {
                return BatchedWrite::Queued { queued };
            }
            Self::detach(&mut state)
        };

        match batch.map_or(Ok(FlushOutcome::Empty), |batch| self.deliver(batch)) {
            Ok(outcome) => BatchedWrite::Flushed(outcome),
            Err(err @ MetricsError::Delivery { points, .. }) => BatchedWrite::FlushFailed {
                retained: points,
                retryable: err.is_retryable(),
            },
            Err(err) => {
                warn!("Triggered flush failed: {err}");
                BatchedWrite::FlushFailed {
                    retained: 0,
                    retryable: err.is_retryable(),
                }
            }
        }
    }

    fn close_sink(&self) {
        if let Err(err) = self.sink.lock().close() {
            error!("Error closing sink: {err}");
        }
    }
}

/// Batching publisher that queues points in memory and delivers them to a
/// [`PointSink`] in batches.
///
/// A write flushes the queue when it reaches `queue_capacity_trigger` points or
/// when `flush_interval` has passed since the last flush. Failed flushes keep
/// their points queued, so delivery is at-least-once. The queue has no upper
/// bound: while the sink keeps failing it keeps growing.
///
/// The queue is only held locked for appends and for swapping it out; sink
/// writes happen outside that lock. This type is `Send + Sync` and can be shared
/// across threads via `Arc<BatchPublisher<_>>`. The queue is flushed a final time
/// and the sink closed when the publisher is dropped, including during unwinding.
///
/// # Example
///
/// ```no_run
/// use influx_batch_publisher::{
///     BatchPublisher, MetricPublisher, PublisherOptions, UdpLineSink, UdpSinkOptions,
/// };
///
/// let sink = UdpLineSink::new(UdpSinkOptions::new("127.0.0.1:8089".parse().unwrap())).unwrap();
/// let publisher = BatchPublisher::new(sink, PublisherOptions::default());
///
/// publisher.write_batched("check_txrx", [("metric", "upbw"), ("unit", "percent")], 42.5);
/// publisher.write_immediate("check_uptime", [("service", "service")], 3600).unwrap();
///
/// publisher.shutdown();
/// ```
pub struct BatchPublisher<S>
where
    S: PointSink + 'static,
{
    shared: Arc<Shared<S>>,
    sender: Option<Sender<()>>,
    // only used in cold path
    job_handle: Option<JoinHandle<()>>,
}

impl<S> BatchPublisher<S>
where
    S: PointSink + 'static,
{
    /// Creates a publisher owning `sink`.
    ///
    /// Spawns the background flush thread when `options.background_flush` is set.
    #[must_use]
    pub fn new(sink: S, options: PublisherOptions) -> Self {
        let background = options.background_flush;
        let shared = Arc::new(Shared::new(sink, options));

        let (sender, job_handle) = match background {
            Some(tick_every) => {
                let (sender, receiver) = unbounded::<()>();
                let job_shared = shared.clone();
                let handle = spawn(move || run_flush_job(&job_shared, tick_every, &receiver));
                (Some(sender), Some(handle))
            }
            None => (None, None),
        };

        Self {
            shared,
            sender,
            job_handle,
        }
    }

    /// Number of points waiting for the next flush.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.shared.queue.lock().points.len()
    }

    /// Options the publisher was built with.
    #[must_use]
    pub fn options(&self) -> &PublisherOptions {
        &self.shared.options
    }
}

impl<S> MetricPublisher for BatchPublisher<S>
where
    S: PointSink + 'static,
{
    fn write_immediate<M, I, K, V, F>(&self, measurement: M, tags: I, value: F) -> MetricResult<()>
    where
        M: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        F: Into<FieldValue>,
    {
        let point = build_point(measurement, tags, value);
        encode_point(&point, &mut String::with_capacity(128))?;

        let acknowledged = self
            .shared
            .sink
            .lock()
            .write(std::slice::from_ref(&point), 1)?;
        if acknowledged == 0 {
            return Err(MetricsError::InvalidPoint(format!(
                "{} was not accepted by the sink",
                point.measurement()
            )));
        }
        Ok(())
    }

    fn write_batched<M, I, K, V, F>(&self, measurement: M, tags: I, value: F) -> BatchedWrite
    where
        M: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        F: Into<FieldValue>,
    {
        self.shared.enqueue(build_point(measurement, tags, value))
    }

    fn flush(&self) -> MetricResult<FlushOutcome> {
        self.shared.flush()
    }

    fn shutdown(self) {
        drop(self);
    }
}

impl<S> Drop for BatchPublisher<S>
where
    S: PointSink + 'static,
{
    fn drop(&mut self) {
        // Dropping the sender stops the background job.
        drop(self.sender.take());
        if let Some(handle) = self.job_handle.take() {
            if handle.join().is_err() {
                error!("Background flush job panicked");
            }
        }

        match self.shared.flush() {
            Ok(outcome) => debug!("Final flush: {outcome:?}"),
            Err(err) => error!("Final flush failed, points lost: {err}"),
        }
        self.shared.close_sink();
    }
}
