//! Back end limits and timeouts
//!
//! Every back end reads four groups of limits: [`ServerLimits`] for the
//! worker pool, [`ConnLimits`] for one connection, [`ReqLimits`] for the
//! request head and body, and [`RespLimits`] for the write buffer. The
//! defaults bound slow clients and oversized heads.
//!
//! # Memory Consumption
//!
//! Each active connection holds a read buffer sized from [`ReqLimits`] and a
//! write buffer governed by [`RespLimits`]. Request bodies above
//! [`ReqLimits::body_size`] are rejected before they are buffered.
//!
//! # Examples
//!
//! ```no_run
//! use forktake::{limits::{ConnLimits, ReqLimits, ServerLimits}, Server, TkText};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), forktake::Error> {
//!     let mut running = Server::builder()
//!         .take(TkText::new("hello"))
//!         .server_limits(ServerLimits {
//!             max_connections: 500,
//!             ..ServerLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             socket_read_timeout: Duration::from_secs(5),
//!             ..ConnLimits::default()
//!         })
//!         .request_limits(ReqLimits {
//!             body_size: 64 * 1024,
//!             ..ReqLimits::default()
//!         })
//!         .build()?
//!         .start()?;
//!
//!     running.stop().await
//! }
//! ```

use std::time::Duration;

/// Controls worker pool size, queueing and overload behaviour.
///
/// # Connection flow
/// ```text
///  accept ──> queue full? ──yes──> 503 task ──> close
///                 │
///                 no
///                 v
///          pending queue ──> first idle worker ──> keep-alive loop
/// ```
///
/// Workers are spawned once when the back end starts and then loop over the
/// shared queue until the back end stops.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of worker tasks, i.e. connections served at once (default: `100`).
    pub max_connections: usize,

    /// Accepted connections allowed to wait for a worker (default: `250`).
    ///
    /// Beyond this, new connections are answered with `503` and closed.
    pub max_pending_connections: usize,

    /// How idle workers wait for the queue (default: `Sleep(50µs)`).
    pub wait_strategy: WaitStrategy,

    /// Tasks dedicated to answering overflow connections with `503` (default: `1`).
    ///
    /// Set to `0` to drop overflow connections without a response.
    pub count_503_handlers: usize,

    /// Format of synthetic error responses (default: `true`)
    ///
    /// If `true`, a malformed request gets:
    /// ```text
    /// HTTP/1.1 400 Bad Request\r
    /// Connection: close\r
    /// Content-Type: application/json\r
    /// Content-Length: 55\r
    /// \r
    /// {"error":"Invalid HTTP method","code":"INVALID_METHOD"}
    /// ```
    /// If `false`, the same response carries no body.
    pub json_errors: bool,

    /// Hard deadline for [`Running::stop`](crate::Running::stop) (default: `Some(10s)`).
    ///
    /// Workers still busy with an exchange when it expires are aborted.
    /// `None` waits for them indefinitely.
    pub shutdown_timeout: Option<Duration>,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_pending_connections: 250,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
            count_503_handlers: 1,
            json_errors: true,
            shutdown_timeout: Some(Duration::from_secs(10)),

            _priv: (),
        }
    }
}

/// Strategy for worker tasks waiting on an empty queue
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// While waiting, uses [`tokio::task::yield_now()`]
    ///
    /// Keeps a core busy; only useful for latency benchmarks.
    Yield,

    /// While waiting, uses [`tokio::time::sleep()`]
    Sleep(Duration),
}

/// Connection-level limits and timeouts
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum wait for the next chunk of a request already started (default: `2 seconds`)
    ///
    /// The wait for the first byte of a request is governed by
    /// [`BackEndConfig::idle_timeout`](crate::BackEndConfig::idle_timeout) instead.
    pub socket_read_timeout: Duration,

    /// Maximum duration of a single socket write (default: `3 seconds`)
    pub socket_write_timeout: Duration,

    /// Requests served on one connection before it is closed (default: `100`)
    pub max_requests_per_connection: usize,

    /// Maximum lifetime of a connection (default: `2 minutes`)
    ///
    /// Checked between exchanges: the exchange in progress always completes.
    pub connection_lifetime: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(2),
            socket_write_timeout: Duration::from_secs(3),
            connection_lifetime: Duration::from_secs(120),
            max_requests_per_connection: 100,

            _priv: (),
        }
    }
}

/// HTTP request parsing limits
///
/// Raise them when legitimate clients get `413 Payload Too Large` or
/// `431 Request Header Fields Too Large`.
///
/// # Head size
///
/// The largest head accepted is derived from the limits:
///
/// | Component | Formula | Default |
/// |-----------|---------|---------|
/// | Head line | `19 + url_size` | 275 B |
/// | Header line | `header_name_size + header_value_size + 4` | 580 B |
/// | **Head** | `head line + header_count × header line + 2` | **9,557 B** |
///
/// ```
/// use forktake::limits::ReqLimits;
///
/// assert_eq!(ReqLimits::default().max_head_size(), 9_557);
/// ```
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum request target length in bytes, query included (default: `256 B`)
    pub url_size: usize,

    /// Maximum number of headers per request (default: `16 headers`)
    pub header_count: usize,
    /// Maximum header name length in bytes (default: `64 B`)
    pub header_name_size: usize,
    /// Maximum header value length in bytes (default: `512 B`)
    pub header_value_size: usize,

    /// Maximum decoded request body size in bytes (default: `4 KB`)
    pub body_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            url_size: 256, // Enough for: /api/v1/users/search?q=test&page=1

            header_count: 16,       // Typical: 10-12 browser headers + 4-6 custom
            header_name_size: 64,   // Fits: x-custom-auth-token-header-name
            header_value_size: 512, // Fits most JWT tokens and cookies

            body_size: 4 * 1024,

            _priv: (),
        }
    }
}

impl ReqLimits {
    /// Largest head (head line, headers and the blank line) accepted.
    #[inline(always)]
    pub fn max_head_size(&self) -> usize {
        self.head_line() + self.header_count * self.header_line() + 2
    }

    #[inline(always)]
    // OPTIONS /url/test HTTP/1.1\r\n
    // |-----| |-------| |------|
    //  method   target   version
    //
    // Method(7) + " " + Target + " " + Version(8) + "\r\n"
    fn head_line(&self) -> usize {
        19 + self.url_size
    }

    #[inline(always)]
    // Name + ": " + Value + "\r\n"
    fn header_line(&self) -> usize {
        self.header_name_size + self.header_value_size + 4
    }
}

/// Write buffer sizing.
///
/// Every worker keeps one buffer for printing responses:
/// ```rust
/// # use forktake::limits::RespLimits;
/// # let limits = RespLimits::default();
/// # let mut buffer: Vec<u8> = Vec::with_capacity(limits.default_capacity);
/// if buffer.capacity() > limits.max_capacity {
///     buffer = Vec::with_capacity(limits.default_capacity);
/// } else {
///     buffer.clear();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Initial buffer capacity (default: `1024 B`)
    pub default_capacity: usize,
    /// Capacity above which the buffer is reallocated (default: `8192 B`)
    pub max_capacity: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            default_capacity: 1024,
            max_capacity: 8 * 1024,

            _priv: (),
        }
    }
}

impl RespLimits {
    #[inline]
    pub(crate) fn recycle(&self, buffer: &mut Vec<u8>) {
        if buffer.capacity() > self.max_capacity {
            *buffer = Vec::with_capacity(self.default_capacity);
        } else {
            buffer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_size() {
        let limits = ReqLimits {
            url_size: 1,
            header_count: 2,
            header_name_size: 3,
            header_value_size: 4,
            ..ReqLimits::default()
        };

        assert_eq!(limits.max_head_size(), 20 + 2 * 11 + 2);
    }

    #[test]
    fn recycle() {
        let limits = RespLimits {
            default_capacity: 4,
            max_capacity: 8,
            ..RespLimits::default()
        };

        let mut buffer = Vec::with_capacity(64);
        buffer.extend_from_slice(b"data");
        limits.recycle(&mut buffer);
        assert!(buffer.is_empty());
        assert!(buffer.capacity() < 64);

        let mut small = Vec::with_capacity(8);
        small.push(1u8);
        let capacity = small.capacity();
        limits.recycle(&mut small);
        assert_eq!(small.capacity(), capacity);
        assert!(small.is_empty());
    }
}
