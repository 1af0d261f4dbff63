//! # influx-batch-publisher
//!
//! A client-side InfluxDB metrics publisher that trades per-point latency for
//! throughput by queueing points and writing them in batches.
//!
//! ## Features
//!
//! - **Dual flush trigger**: the queue is flushed when it reaches a size threshold
//!   or when a time interval has passed since the last flush
//! - **At-least-once delivery**: failed flushes keep their points queued for the next attempt
//! - **Line protocol**: sorted tags, escaping, nanosecond timestamps
//! - **Pluggable sinks**: UDP, HTTP (`http` feature) or any custom [`PointSink`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use influx_batch_publisher::{
//!     write_batched, BatchPublisher, MetricPublisher, PublisherOptions, UdpLineSink,
//!     UdpSinkOptions,
//! };
//! use std::time::Duration;
//!
//! let options = PublisherOptions {
//!     batch_size: 5000,
//!     queue_capacity_trigger: 50_000,
//!     flush_interval: Duration::from_secs(300),
//!     periodic_flush: true,
//!     background_flush: None,
//! };
//!
//! let sink = UdpLineSink::new(UdpSinkOptions::new("127.0.0.1:8089".parse().unwrap())).unwrap();
//! let publisher = BatchPublisher::new(sink, options);
//!
//! // Direct API
//! publisher.write_batched("check_txrx", [("metric", "upbw"), ("unit", "percent")], 97.5);
//! publisher.write_immediate("check_uptime", [("service", "service")], 3600).unwrap();
//!
//! // Convenience macro
//! write_batched!(publisher, "check_cpe", 12, "metric" => "cpu");
//!
//! // Final flush and sink release; also happens on drop
//! publisher.shutdown();
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![warn(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

// https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_tutorial/
mod error;
mod influx;

#[cfg(feature = "http")]
pub use influx::http::{HttpLineSink, HttpSinkOptions};
pub use influx::line::{encode_point, LinePacker};
pub use influx::point::{build_point, no_tags, timestamp_nanos, FieldValue, PointRecord};
pub use influx::publisher::{
    BatchPublisher, BatchedWrite, FlushOutcome, MetricPublisher, PublisherOptions,
    DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL, DEFAULT_QUEUE_BATCHES,
    DEFAULT_QUEUE_CAPACITY_TRIGGER,
};
pub use influx::sink::{PointSink, UdpLineSink, UdpSinkOptions, DEFAULT_MAX_PACKET_SIZE};
pub use error::MetricsError;

/// Result type for publisher operations.
///
/// Wraps errors that can occur while encoding and delivering points.
pub type MetricResult<T> = Result<T, MetricsError>;
