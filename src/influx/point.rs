use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::MetricsError;

/// Name of the single field every point carries.
pub const VALUE_FIELD: &str = "value";

/// The numeric measurement of a point.
///
/// Integers are written with the line-protocol `i` suffix so the backend stores
/// them as integers instead of floats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// A signed 64-bit integer.
    Integer(i64),
    /// A 64-bit float. Must be finite to be encodable.
    Float(f64),
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FieldValue {
                fn from(value: $t) -> Self {
                    Self::Integer(i64::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! impl_try_from_integer {
    ($($t:ty),*) => {
        $(
            impl TryFrom<$t> for FieldValue {
                type Error = MetricsError;

                fn try_from(value: $t) -> Result<Self, Self::Error> {
                    i64::try_from(value).map(Self::Integer).map_err(|_| {
                        MetricsError::InvalidPoint(format!("integer {value} does not fit in i64"))
                    })
                }
            }
        )*
    };
}

// counts and sizes; only values above i64::MAX are rejected
impl_try_from_integer!(u64, usize, isize);

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

/// One timestamped observation, ready to be queued or written.
///
/// Tags are kept in a [`BTreeMap`] so iteration, and therefore serialization,
/// is always in lexicographic key order. Records are never mutated once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    measurement: String,
    timestamp: u64,
    tags: BTreeMap<String, String>,
    value: FieldValue,
}

impl PointRecord {
    /// Metric family name, e.g. `check_txrx`.
    #[must_use]
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Nanoseconds since the Unix epoch, sampled when the point was built.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Tags in lexicographic key order.
    #[must_use]
    pub const fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// The `value` field.
    #[must_use]
    pub const fn value(&self) -> FieldValue {
        self.value
    }
}

static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Returns the current wall clock in nanoseconds, strictly increasing across calls.
///
/// Two points of the same series sharing a timestamp would overwrite each other
/// in the backend, so a repeated or backwards clock reading is bumped by one
/// nanosecond past the last value handed out.
pub fn timestamp_nanos() -> u64 {
    #[allow(clippy::cast_possible_truncation)]
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64);

    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_TIMESTAMP.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

/// Normalizes a `(measurement, tags, value)` triple into a [`PointRecord`].
///
/// Tag keys end up sorted; when a key repeats, the last value wins.
/// Does no I/O and cannot fail.
pub fn build_point<M, I, K, V, F>(measurement: M, tags: I, value: F) -> PointRecord
where
    M: Into<String>,
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
    F: Into<FieldValue>,
{
    PointRecord {
        measurement: measurement.into(),
        timestamp: timestamp_nanos(),
        tags: tags
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
        value: value.into(),
    }
}

/// Empty tag set, handy for `build_point("cpu", no_tags(), 1.0)`.
#[must_use]
pub const fn no_tags() -> [(&'static str, &'static str); 0] {
    []
}
