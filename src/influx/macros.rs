/// Macro for queueing a point with a variable number of `key => value` tags.
///
/// Expands to [`MetricPublisher::write_batched`](crate::MetricPublisher::write_batched),
/// so the trait must be in scope. Tag values may be any `Into<String>`.
///
/// # Examples
///
/// ```
/// use influx_batch_publisher::{
///     write_batched, BatchPublisher, MetricPublisher, MetricResult, PointRecord, PointSink,
///     PublisherOptions,
/// };
///
/// struct Discard;
///
/// impl PointSink for Discard {
///     fn write(&mut self, points: &[PointRecord], _batch_size: usize) -> MetricResult<usize> {
///         Ok(points.len())
///     }
/// }
///
/// let publisher = BatchPublisher::new(Discard, PublisherOptions::default());
///
/// // With static string tags
/// write_batched!(publisher, "check_txrx", 12.5, "metric" => "upbw", "unit" => "percent");
///
/// // With owned tag values
/// write_batched!(publisher, "check_cpe", 3, "service" => format!("svc-{}", 7));
///
/// // With no tags
/// write_batched!(publisher, "check_uptime", 3600);
/// ```
#[macro_export]
macro_rules! write_batched {
    // With tags
    ($publisher:expr, $measurement:expr, $value:expr $(, $key:expr => $tag:expr)+) => {
        $publisher.write_batched(
            $measurement,
            [$(($key, ::std::string::String::from($tag))),+],
            $value,
        )
    };
    // Without tags
    ($publisher:expr, $measurement:expr, $value:expr) => {
        $publisher.write_batched($measurement, $crate::no_tags(), $value)
    };
}

/// Macro for writing a single point immediately with a variable number of
/// `key => value` tags.
///
/// Expands to [`MetricPublisher::write_immediate`](crate::MetricPublisher::write_immediate)
/// and evaluates to its `MetricResult<()>`.
///
/// # Examples
///
/// ```
/// use influx_batch_publisher::{
///     write_immediate, BatchPublisher, MetricPublisher, MetricResult, PointRecord, PointSink,
///     PublisherOptions,
/// };
///
/// struct Discard;
///
/// impl PointSink for Discard {
///     fn write(&mut self, points: &[PointRecord], _batch_size: usize) -> MetricResult<usize> {
///         Ok(points.len())
///     }
/// }
///
/// let publisher = BatchPublisher::new(Discard, PublisherOptions::default());
///
/// write_immediate!(publisher, "check_bw", -42.0, "metric" => "dnbw", "unit" => "dbw").unwrap();
/// write_immediate!(publisher, "check_uptime", 3600).unwrap();
/// ```
#[macro_export]
macro_rules! write_immediate {
    // With tags
    ($publisher:expr, $measurement:expr, $value:expr $(, $key:expr => $tag:expr)+) => {
        $publisher.write_immediate(
            $measurement,
            [$(($key, ::std::string::String::from($tag))),+],
            $value,
        )
    };
    // Without tags
    ($publisher:expr, $measurement:expr, $value:expr) => {
        $publisher.write_immediate($measurement, $crate::no_tags(), $value)
    };
}
