use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use tracing::{debug, warn};

use super::line::send_chunked;
use super::point::PointRecord;
use super::sink::PointSink;
use crate::{MetricResult, MetricsError};

/// Default server address.
pub const DEFAULT_URL: &str = "http://localhost:8086";
/// Default target database.
pub const DEFAULT_DATABASE: &str = "icinga2";
/// Default retention policy.
pub const DEFAULT_RETENTION_POLICY: &str = "autogen";
/// Default number of idle connections kept per host.
pub const DEFAULT_POOL_SIZE: usize = 25;
/// Default per-request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// Request bodies are bounded by point count only; InfluxDB accepts large bodies.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Configuration for [`HttpLineSink`].
#[derive(Debug, Clone)]
pub struct HttpSinkOptions {
    /// Base URL of the server, without the `/write` path.
    pub url: String,
    /// Database written to (`db` query parameter).
    pub database: String,
    /// Retention policy written to (`rp` query parameter).
    pub retention_policy: String,
    /// Basic auth user. Auth is only sent when the password is set too.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Compress request bodies with gzip.
    pub gzip: bool,
    /// Per-request deadline.
    pub timeout: Duration,
    /// Idle connections kept per host.
    pub pool_size: usize,
}

impl Default for HttpSinkOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            retention_policy: DEFAULT_RETENTION_POLICY.to_string(),
            username: None,
            password: None,
            gzip: true,
            timeout: DEFAULT_TIMEOUT,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Posts line protocol to the InfluxDB v1 `/write` endpoint with nanosecond precision.
///
/// Every `batch_size` points become one request. A write fails as soon as one
/// request fails, so points of earlier requests may be sent again on retry; the
/// backend deduplicates points with identical series and timestamp.
pub struct HttpLineSink {
    client: Client,
    write_url: String,
    options: HttpSinkOptions,
}

impl HttpLineSink {
    /// Builds the client and pings the server.
    ///
    /// # Errors
    /// Returns an error if the client cannot be built or the server does not answer
    /// the ping. There is nothing to buffer against at this point, so callers
    /// should treat this as fatal.
    pub fn new(options: HttpSinkOptions) -> MetricResult<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .pool_max_idle_per_host(options.pool_size)
            .build()?;

        let base = options.url.trim_end_matches('/');
        let ping = client.get(format!("{base}/ping")).send()?;
        if !ping.status().is_success() {
            return Err(MetricsError::Http {
                status: ping.status().as_u16(),
                body: ping.text().unwrap_or_default(),
            });
        }
        debug!("Connected to {base}");

        Ok(Self {
            write_url: format!("{base}/write"),
            client,
            options,
        })
    }

    fn post(&self, body: String) -> MetricResult<()> {
        let mut request = self
            .client
            .post(&self.write_url)
            .query(&[
                ("db", self.options.database.as_str()),
                ("rp", self.options.retention_policy.as_str()),
                ("precision", "ns"),
            ])
            .header(CONTENT_TYPE, "text/plain; charset=utf-8");

        if let (Some(user), Some(pass)) = (&self.options.username, &self.options.password) {
            request = request.basic_auth(user, Some(pass));
        }

        request = if self.options.gzip {
            let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 4), Compression::fast());
            encoder.write_all(body.as_bytes())?;
            request.header(CONTENT_ENCODING, "gzip").body(encoder.finish()?)
        } else {
            request.body(body)
        };

        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().unwrap_or_default();
            warn!("Write rejected with status {status}: {body}");
            Err(MetricsError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl PointSink for HttpLineSink {
    fn write(&mut self, points: &[PointRecord], batch_size: usize) -> MetricResult<usize> {
        send_chunked(points, MAX_BODY_BYTES, batch_size, |body| self.post(body))
    }
}
