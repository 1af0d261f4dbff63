use thiserror::Error;

/// Errors that can occur while encoding and delivering points.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// A custom error with a free-form message.
    #[error("Custom error: {0}")]
    Custom(String),

    /// An I/O error from the standard library.
    #[error("Std Io error: {0}")]
    StdIo(#[from] std::io::Error),

    /// The point cannot be expressed in line protocol.
    #[error("Invalid point: {0}")]
    InvalidPoint(String),

    /// A single encoded line does not fit in one transport chunk.
    #[error("Line of {len} bytes is larger than {max}")]
    LineTooLarge {
        /// Encoded length of the offending line.
        len: usize,
        /// Maximum chunk size accepted by the sink.
        max: usize,
    },

    /// The sink could not deliver a flushed batch. The points were kept in the queue.
    #[error("Failed to deliver {points} points: {source}")]
    Delivery {
        /// Number of points that were handed to the sink and retained afterwards.
        points: usize,
        /// The sink error.
        source: Box<MetricsError>,
    },

    /// The HTTP write endpoint answered with a non-success status.
    #[cfg(feature = "http")]
    #[error("Write rejected with status {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, usually the backend's error message.
        body: String,
    },

    /// The HTTP request itself failed (connection, timeout, TLS).
    #[cfg(feature = "http")]
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl MetricsError {
    /// Returns `true` when retrying the same points later may succeed.
    ///
    /// Encoding errors never go away on retry; I/O and backend errors might.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidPoint(_) | Self::LineTooLarge { .. } => false,
            Self::Delivery { source, .. } => source.is_retryable(),
            #[cfg(feature = "http")]
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => true,
        }
    }
}

impl From<String> for MetricsError {
    fn from(value: String) -> Self {
        Self::Custom(value)
    }
}

impl From<&str> for MetricsError {
    fn from(value: &str) -> Self {
        Self::Custom(value.to_string())
    }
}
