use crate::{
    errors::MalformedRequest,
    http::{
        body::Body,
        request::{Head, Request},
        response::Response,
        types::{Method, StatusCode, Version},
        wire::{self, decode_chunked, parse_head, read_until, Exchange, Framing, ReadError},
    },
    server::server_impl::{stopped, AllLimits},
    take::{
        decor::act_safely,
        signal::{Signal, Take},
    },
};
use bytes::{Buf, BytesMut};
use std::{
    io,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::watch,
};
use tracing::{debug, warn};

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Per-worker state, reused across the connections the worker serves.
pub(crate) struct HttpConnection {
    take: Arc<dyn Take>,
    limits: Arc<AllLimits>,
    idle_timeout: Duration,

    read_buf: BytesMut,
    write_buf: Vec<u8>,
}

impl HttpConnection {
    pub(crate) fn new(take: Arc<dyn Take>, limits: Arc<AllLimits>, idle_timeout: Duration) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(limits.req.max_head_size()),
            write_buf: Vec::with_capacity(limits.resp.default_capacity),
            take,
            limits,
            idle_timeout,
        }
    }

    #[inline]
    fn reset(&mut self) {
        self.read_buf.clear();
        self.limits.resp.recycle(&mut self.write_buf);
    }
}

/// What happened to one exchange.
enum Turn {
    Next,
    Close,
}

impl HttpConnection {
    /// Serves requests on `stream` until the peer leaves, a limit is hit or
    /// the back end stops.
    pub(crate) async fn run<S>(
        &mut self,
        stream: &mut S,
        peer: SocketAddr,
        stop: &mut watch::Receiver<bool>,
    ) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.reset();

        let created = Instant::now();
        let mut served = 0;

        loop {
            let expired = served >= self.limits.conn.max_requests_per_connection
                || created.elapsed() > self.limits.conn.connection_lifetime;
            if expired || *stop.borrow() {
                return Ok(());
            }

            let last = served + 1 >= self.limits.conn.max_requests_per_connection;
            match self.exchange(stream, peer, stop, last).await? {
                Turn::Next => served += 1,
                Turn::Close => return Ok(()),
            }
        }
    }

    async fn exchange<S>(
        &mut self,
        stream: &mut S,
        peer: SocketAddr,
        stop: &mut watch::Receiver<bool>,
        last: bool,
    ) -> io::Result<Turn>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let req_limits = &self.limits.req;
        let idle = self.read_buf.is_empty();

        let read = read_until(
            stream,
            &mut self.read_buf,
            self.idle_timeout,
            self.limits.conn.socket_read_timeout,
            |buf| parse_head(buf, req_limits),
        );

        let parsed = tokio::select! {
            parsed = read => parsed,
            _ = stopped(stop), if idle => return Ok(Turn::Close),
        };

        let head = match parsed {
            Ok(Some((head, consumed))) => {
                self.read_buf.advance(consumed);
                head
            }
            Ok(None) | Err(ReadError::TimedOut) => return Ok(Turn::Close),
            Err(ReadError::Io(err)) => return Err(err),
            Err(ReadError::Malformed(err)) => return self.reject(stream, err).await,
        };

        let body = match self.read_body(stream, &head).await {
            Ok(body) => body,
            Err(ReadError::TimedOut) => return Ok(Turn::Close),
            Err(ReadError::Io(err)) => return Err(err),
            Err(ReadError::Malformed(err)) => return self.reject(stream, err).await,
        };

        let exchange = Exchange {
            version: head.version(),
            head_request: head.method() == Method::Head,
            keep_alive: head.is_keep_alive() && !last && !*stop.borrow(),
        };
        let (method, target) = (head.method(), head.target().to_string());

        let req = Request::from_parts(Arc::new(head), body).with_peer(peer);
        let (response, close) = self.dispatch(req).await;
        let status = response.status();

        let keep_alive = wire::write_response(
            stream,
            &mut self.write_buf,
            response,
            Exchange {
                keep_alive: exchange.keep_alive && !close,
                ..exchange
            },
            Some(self.limits.conn.socket_write_timeout),
        )
        .await?;

        debug!(%method, %target, status = status.as_u16(), keep_alive, "Exchange");
        self.limits.resp.recycle(&mut self.write_buf);

        Ok(match keep_alive {
            true => Turn::Next,
            false => Turn::Close,
        })
    }

    /// Reads the body announced by `head`, answering `Expect: 100-continue`
    /// first when the body has not arrived yet.
    async fn read_body<S>(&mut self, stream: &mut S, head: &Head) -> Result<Body, ReadError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let req_limits = &self.limits.req;
        let wait = self.limits.conn.socket_read_timeout;

        let framing = wire::framing(head, req_limits)?;
        if framing != Framing::Empty && self.read_buf.is_empty() && head.expects_continue() {
            self.send(stream, CONTINUE).await?;
        }

        match framing {
            Framing::Empty => Ok(Body::empty()),
            Framing::Length(length) => {
                read_until(stream, &mut self.read_buf, wait, wait, |buf| {
                    Ok((buf.len() >= length).then_some(()))
                })
                .await?
                .ok_or(MalformedRequest::UnexpectedEof)?;

                Ok(self.read_buf.split_to(length).freeze().into())
            }
            Framing::Chunked => {
                let (body, consumed) = read_until(stream, &mut self.read_buf, wait, wait, |buf| {
                    decode_chunked(buf, req_limits)
                })
                .await?
                .ok_or(MalformedRequest::UnexpectedEof)?;

                self.read_buf.advance(consumed);
                Ok(body.into())
            }
        }
    }

    /// Runs the take and maps signals and panics onto responses. The flag
    /// asks for the connection to be closed afterwards.
    async fn dispatch(&self, req: Request) -> (Response, bool) {
        match act_safely(self.take.as_ref(), req).await {
            Ok(Ok(response)) => (response, false),
            Ok(Err(Signal::NotFound)) => (Response::new(StatusCode::NotFound), false),
            Ok(Err(Signal::Fault(fault))) => {
                warn!(status = fault.status().as_u16(), detail = fault.detail(), "Take failed");
                (Response::new(fault.status()), true)
            }
            Ok(Err(Signal::Redirect { location, .. })) => {
                warn!(%location, "Redirect signal reached the back end");
                (Response::new(StatusCode::InternalServerError), true)
            }
            Err(panic) => {
                warn!(%panic, "Take panicked");
                (Response::new(StatusCode::InternalServerError), true)
            }
        }
    }

    /// Answers a malformed request and closes.
    async fn reject<S>(&mut self, stream: &mut S, err: MalformedRequest) -> io::Result<Turn>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug!(%err, code = err.code(), "Malformed request");

        let exchange = Exchange {
            version: Version::Http11,
            head_request: false,
            keep_alive: false,
        };
        wire::write_response(
            stream,
            &mut self.write_buf,
            err.to_response(self.limits.server.json_errors),
            exchange,
            Some(self.limits.conn.socket_write_timeout),
        )
        .await?;

        Ok(Turn::Close)
    }

    async fn send<S>(&self, stream: &mut S, bytes: &[u8]) -> io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        tokio::time::timeout(self.limits.conn.socket_write_timeout, async {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "socket write timed out"))?
    }
}
