use super::point::{FieldValue, PointRecord, VALUE_FIELD};
use crate::{MetricResult, MetricsError};
use tracing::warn;

// https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_reference/#special-characters
fn push_escaped(buf: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if c == '\\' || special.contains(&c) {
            buf.push('\\');
        }
        buf.push(c);
    }
}

const MEASUREMENT_SPECIAL: &[char] = &[',', ' '];
const KEY_SPECIAL: &[char] = &[',', '=', ' '];

/// Appends one line-protocol line for `point` to `buf`, newline included.
///
/// Format: `measurement[,tag=value...] value=<v> <timestamp>`. Tags with an empty
/// key or value are left out since the backend rejects them.
///
/// # Errors
/// Returns [`MetricsError::InvalidPoint`] for an empty measurement, a newline in
/// the measurement or tags, or a non-finite float value. `buf` is left unchanged in that case.
pub fn encode_point(point: &PointRecord, buf: &mut String) -> MetricResult<()> {
    if point.measurement().is_empty() {
        return Err(MetricsError::InvalidPoint("empty measurement".to_string()));
    }
    let has_newline = point.measurement().contains('\n')
        || point
            .tags()
            .iter()
            .any(|(k, v)| k.contains('\n') || v.contains('\n'));
    if has_newline {
        return Err(MetricsError::InvalidPoint(format!(
            "newline in measurement or tags of {}",
            point.measurement().escape_debug()
        )));
    }
    if let FieldValue::Float(v) = point.value() {
        if !v.is_finite() {
            return Err(MetricsError::InvalidPoint(format!(
                "non-finite value {v} for measurement {}",
                point.measurement()
            )));
        }
    }

    push_escaped(buf, point.measurement(), MEASUREMENT_SPECIAL);
    for (key, value) in point.tags() {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        buf.push(',');
        push_escaped(buf, key, KEY_SPECIAL);
        buf.push('=');
        push_escaped(buf, value, KEY_SPECIAL);
    }

    buf.push(' ');
    buf.push_str(VALUE_FIELD);
    buf.push('=');
    match point.value() {
        FieldValue::Integer(v) => {
            buf.push_str(itoa::Buffer::new().format(v));
            buf.push('i');
        }
        FieldValue::Float(v) => buf.push_str(ryu::Buffer::new().format_finite(v)),
    }

    buf.push(' ');
    buf.push_str(itoa::Buffer::new().format(point.timestamp()));
    buf.push('\n');
    Ok(())
}

/// Groups encoded lines into chunks bounded by a byte size and a point count.
///
/// Each finished chunk is one transport write (a datagram or a request body).
pub struct LinePacker {
    max_bytes: usize,
    max_points: usize,

    current: String,
    current_points: usize,
    line: String,
}

impl LinePacker {
    /// `max_points` below one is treated as one.
    #[must_use]
    pub fn new(max_bytes: usize, max_points: usize) -> Self {
        Self {
            max_bytes,
            max_points: max_points.max(1),
            current: String::with_capacity(max_bytes.min(64 * 1024)),
            current_points: 0,
            line: String::with_capacity(256),
        }
    }

    /// Encodes `point` and appends it to the current chunk.
    ///
    /// When the line does not fit, the current chunk is returned finished and the
    /// line starts the next one.
    ///
    /// # Errors
    /// Encoding errors, or [`MetricsError::LineTooLarge`] when the line alone is
    /// bigger than the chunk limit. The packer state is unchanged on error.
    pub fn push(&mut self, point: &PointRecord) -> MetricResult<Option<String>> {
        self.line.clear();
        encode_point(point, &mut self.line)?;

        if self.line.len() > self.max_bytes {
            return Err(MetricsError::LineTooLarge {
                len: self.line.len(),
                max: self.max_bytes,
            });
        }

        let full = self.current_points >= self.max_points
            || self.current.len() + self.line.len() > self.max_bytes;
        let finished = if full { self.take() } else { None };

        self.current.push_str(&self.line);
        self.current_points += 1;
        Ok(finished)
    }

    /// Returns the pending chunk, if any.
    #[must_use]
    pub fn take(&mut self) -> Option<String> {
        if self.current_points == 0 {
            return None;
        }
        self.current_points = 0;
        Some(std::mem::replace(
            &mut self.current,
            String::with_capacity(self.max_bytes.min(64 * 1024)),
        ))
    }

    /// Points in the chunk not yet returned.
    #[must_use]
    pub const fn pending_points(&self) -> usize {
        self.current_points
    }
}

/// Packs `points` into chunks and hands each finished chunk to `send`.
///
/// Points that can never be encoded are logged and skipped. Stops at the first
/// `send` error. Returns the number of points sent.
///
/// # Errors
/// The first error returned by `send`.
pub fn send_chunked(
    points: &[PointRecord],
    max_bytes: usize,
    batch_size: usize,
    mut send: impl FnMut(String) -> MetricResult<()>,
) -> MetricResult<usize> {
    let mut packer = LinePacker::new(max_bytes, batch_size);
    let mut sent = 0;

    for point in points {
        let chunk_points = packer.pending_points();
        match packer.push(point) {
            Ok(Some(chunk)) => {
                send(chunk)?;
                sent += chunk_points;
            }
            Ok(None) => {}
            Err(err) => warn!("Skipping point of {}: {err}", point.measurement()),
        }
    }

    let pending = packer.pending_points();
    if let Some(chunk) = packer.take() {
        send(chunk)?;
        sent += pending;
    }
    Ok(sent)
}
