use crate::errors::Error;
use futures_util::future::{self, BoxFuture};
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
};

/// Where and how a back end listens.
///
/// # Examples
/// ```
/// use forktake::BackEndConfig;
/// use std::time::Duration;
///
/// let config = BackEndConfig {
///     port: 8080,
///     idle_timeout: Duration::from_secs(15),
///     ..BackEndConfig::default()
/// };
/// assert_eq!(config.address().to_string(), "127.0.0.1:8080");
/// ```
#[derive(Debug, Clone)]
pub struct BackEndConfig {
    /// TCP port; `0` picks a free one (default: `0`)
    pub port: u16,
    /// Local address to bind (default: `127.0.0.1`)
    pub host: IpAddr,
    /// Length of the kernel accept queue (default: `1024`)
    pub backlog: u32,
    /// Wait for the first byte of each request on a connection (default: `5 seconds`)
    ///
    /// The connection is closed quietly when it expires.
    pub idle_timeout: Duration,
    /// Connections go through the installed [`Wrap`] (default: `false`)
    ///
    /// When `false`, accepted streams are served as plain TCP even if a wrap
    /// is installed. Building a back end with `secure` set and no wrap
    /// installed fails with [`Error::Config`].
    pub secure: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for BackEndConfig {
    fn default() -> Self {
        Self {
            port: 0,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            backlog: 1024,
            idle_timeout: Duration::from_secs(5),
            secure: false,

            _priv: (),
        }
    }
}

impl BackEndConfig {
    #[inline]
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Turns an accepted TCP stream into the stream the back end speaks HTTP on.
///
/// This is the seam for TLS: an implementation performs the handshake and
/// returns the encrypted stream. A failed wrap closes the connection. Only
/// back ends with [`BackEndConfig::secure`] set use it.
///
/// # Examples
/// ```
/// use forktake::{BoxFuture, Wrap};
/// use tokio::net::TcpStream;
///
/// /// Disables Nagle's algorithm on every connection.
/// struct NoDelay;
///
/// impl Wrap for NoDelay {
///     type Stream = TcpStream;
///
///     fn wrap(&self, stream: TcpStream) -> BoxFuture<'_, std::io::Result<TcpStream>> {
///         Box::pin(async move {
///             stream.set_nodelay(true)?;
///             Ok(stream)
///         })
///     }
/// }
/// ```
pub trait Wrap: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn wrap(&self, stream: TcpStream) -> BoxFuture<'_, io::Result<Self::Stream>>;
}

/// The identity wrap: plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

impl Wrap for Plain {
    type Stream = TcpStream;

    #[inline]
    fn wrap(&self, stream: TcpStream) -> BoxFuture<'_, io::Result<TcpStream>> {
        Box::pin(future::ready(Ok(stream)))
    }
}

/// Creates the listening socket with `SO_REUSEADDR` and the configured backlog.
///
/// Must run inside a tokio runtime.
pub(crate) fn bind(config: &BackEndConfig) -> Result<TcpListener, Error> {
    let addr = config.address();
    let fail = |source| Error::Bind { addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(fail)?;

    socket.set_reuse_address(true).map_err(fail)?;
    socket.set_nonblocking(true).map_err(fail)?;
    socket.bind(&addr.into()).map_err(fail)?;

    let backlog = i32::try_from(config.backlog).unwrap_or(i32::MAX);
    socket.listen(backlog).map_err(fail)?;

    TcpListener::from_std(socket.into()).map_err(fail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_port() {
        let listener = bind(&BackEndConfig::default()).unwrap();
        let addr = listener.local_addr().unwrap();

        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn port_in_use() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = BackEndConfig {
            port: taken.local_addr().unwrap().port(),
            ..BackEndConfig::default()
        };

        match bind(&config) {
            Err(Error::Bind { addr, .. }) => assert_eq!(addr, config.address()),
            other => panic!("expected a bind error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_is_identity() {
        let listener = bind(&BackEndConfig::default()).unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (stream, _) = accepted.unwrap();
        let wrapped = Plain.wrap(stream).await.unwrap();

        assert_eq!(wrapped.peer_addr().unwrap(), client.unwrap().local_addr().unwrap());
    }
}
