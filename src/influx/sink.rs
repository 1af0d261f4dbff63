use std::net::{SocketAddr, UdpSocket};

use super::line::send_chunked;
use super::point::PointRecord;
use crate::MetricResult;
use tracing::warn;

/// Trait for the write endpoint a publisher delivers points to.
///
/// Implement this trait to send points to a custom destination, or to capture
/// them in tests. The publisher never constructs its sink, it is always injected.
pub trait PointSink: Send {
    /// Delivers `points` to the backend, sub-dividing into writes of at most
    /// `batch_size` points if the transport benefits from it.
    ///
    /// Returns the number of points acknowledged.
    ///
    /// # Errors
    /// Returns an error when the backend did not acknowledge the write. The caller
    /// treats the whole slice as undelivered.
    fn write(&mut self, points: &[PointRecord], batch_size: usize) -> MetricResult<usize>;

    /// Releases network or connection resources. Called once, on shutdown.
    ///
    /// # Errors
    /// Returns an error if releasing the resources failed.
    fn close(&mut self) -> MetricResult<()> {
        Ok(())
    }
}

impl<T> PointSink for Box<T>
where
    T: PointSink + ?Sized,
{
    fn write(&mut self, points: &[PointRecord], batch_size: usize) -> MetricResult<usize> {
        (**self).write(points, batch_size)
    }

    fn close(&mut self) -> MetricResult<()> {
        (**self).close()
    }
}

/// Default maximum datagram size. Fits a 1500 byte MTU with room for headers.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1432;

/// Configuration for [`UdpLineSink`].
#[derive(Debug, Clone)]
pub struct UdpSinkOptions {
    /// Local address to bind, usually `0.0.0.0:0`.
    pub bind_addr: SocketAddr,
    /// Address of the backend's UDP listener.
    pub destination: SocketAddr,
    /// Maximum bytes sent in one datagram.
    pub max_packet_size: usize,
}

impl UdpSinkOptions {
    /// Options sending to `destination` from an ephemeral local port.
    #[must_use]
    pub fn new(destination: SocketAddr) -> Self {
        let bind_addr = if destination.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        Self {
            bind_addr,
            destination,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

/// Sends line protocol to an InfluxDB UDP listener.
///
/// Each write is split into datagrams holding at most `max_packet_size` bytes
/// and at most `batch_size` points. Points that cannot be encoded are logged and
/// skipped, they would never succeed on retry.
pub struct UdpLineSink {
    sock: UdpSocket,
    destination: SocketAddr,
    max_packet_size: usize,
}

impl UdpLineSink {
    /// Binds the local socket.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be bound.
    pub fn new(options: UdpSinkOptions) -> MetricResult<Self> {
        let sock = UdpSocket::bind(options.bind_addr)?;
        Ok(Self {
            sock,
            destination: options.destination,
            max_packet_size: options.max_packet_size,
        })
    }

    fn send(&self, chunk: &str) -> MetricResult<()> {
        let r = self.sock.send_to(chunk.as_bytes(), self.destination);
        if let Err(ref err) = r {
            warn!("UDP send error: {err}");
        }
        r?;
        Ok(())
    }
}

impl PointSink for UdpLineSink {
    fn write(&mut self, points: &[PointRecord], batch_size: usize) -> MetricResult<usize> {
        send_chunked(points, self.max_packet_size, batch_size, |chunk| self.send(&chunk))
    }
}
