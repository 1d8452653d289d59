use crate::{
    errors::{service_unavailable, Error},
    limits::{ConnLimits, ReqLimits, RespLimits, ServerLimits, WaitStrategy},
    server::{
        connection::HttpConnection,
        socket::{bind, BackEndConfig, Plain, Wrap},
    },
    take::signal::Take,
};
use crossbeam::queue::SegQueue;
use std::{io, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::watch,
    task::{yield_now, JoinHandle},
    time::{sleep as tokio_sleep, Instant},
};
use tracing::{debug, debug_span, error, info, warn, Instrument};

/// A configured back end, ready to [`start`](Server::start).
///
/// # Examples
///
/// ```no_run
/// use forktake::{BackEndConfig, FkRegex, Server, TkFork, TkHtml};
///
/// #[tokio::main]
/// async fn main() -> Result<(), forktake::Error> {
///     let take = TkFork::new().fork(FkRegex::new("/", TkHtml::new("<html>hi</html>"))?);
///
///     let mut running = Server::builder()
///         .config(BackEndConfig { port: 8080, ..BackEndConfig::default() })
///         .take(take)
///         .build()?
///         .start()?;
///
///     tokio::signal::ctrl_c().await?;
///     running.stop().await
/// }
/// ```
pub struct Server<W: Wrap = Plain> {
    config: BackEndConfig,
    take: Arc<dyn Take>,
    wrap: Arc<W>,
    limits: Arc<AllLimits>,
}

impl Server {
    /// Creates a builder for a plain TCP back end.
    #[inline]
    pub fn builder() -> ServerBuilder<Plain> {
        ServerBuilder {
            config: BackEndConfig::default(),
            take: None,
            wrap: Arc::new(Plain),
            wrapped: false,

            server_limits: None,
            connection_limits: None,
            request_limits: None,
            response_limits: None,
        }
    }
}

impl<W: Wrap> Server<W> {
    /// Binds the listening socket and spawns the accept loop and the worker
    /// pool. The returned handle is [`State::Listening`].
    ///
    /// # Errors
    ///
    /// [`Error::Bind`] when the address cannot be bound.
    ///
    /// # Panics
    ///
    /// When called outside a tokio runtime.
    pub fn start(self) -> Result<Running, Error> {
        let listener = bind(&self.config)?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, secure = self.config.secure, "Listener bound");

        let (sender, receiver) = watch::channel(false);
        let sender = Arc::new(sender);

        let stream_queue: TcpQueue = Arc::new(SegQueue::new());
        let error_queue: TcpQueue = Arc::new(SegQueue::new());
        let server_limits = &self.limits.server;

        let mut workers = Vec::with_capacity(server_limits.max_connections + 1);
        for _ in 0..server_limits.max_connections {
            workers.push(self.spawn_worker(&stream_queue, receiver.clone()));
        }
        match server_limits.count_503_handlers {
            0 => workers.push(spawn_quiet_alarmist(&error_queue, &self.limits, receiver.clone())),
            count => {
                for _ in 0..count {
                    workers.push(spawn_alarmist(&error_queue, &self.limits, receiver.clone()));
                }
            }
        }

        let accept = tokio::spawn(accept_loop(
            listener,
            stream_queue,
            error_queue,
            server_limits.max_pending_connections,
            Arc::clone(&sender),
            receiver,
        ));

        Ok(Running {
            local_addr,
            stopper: Stopper(sender),
            accept: Some(accept),
            workers,
            shutdown_timeout: server_limits.shutdown_timeout,
        })
    }

    fn spawn_worker(&self, queue: &TcpQueue, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let queue = queue.clone();
        let wrap = self.wrap.clone();
        let limits = self.limits.clone();
        let secure = self.config.secure;
        let mut conn = HttpConnection::new(self.take.clone(), limits.clone(), self.config.idle_timeout);

        tokio::spawn(async move {
            loop {
                let (stream, peer) = tokio::select! {
                    _ = stopped(&mut stop) => return,
                    next = get_stream(&queue, &limits.server.wait_strategy) => next,
                };

                let span = debug_span!("connection", %peer);
                async {
                    let served = match secure {
                        true => match wrap.wrap(stream).await {
                            Ok(mut stream) => conn.run(&mut stream, peer, &mut stop).await,
                            Err(err) => {
                                debug!(%err, "Wrap failed");
                                return;
                            }
                        },
                        false => {
                            let mut stream = stream;
                            conn.run(&mut stream, peer, &mut stop).await
                        }
                    };

                    match served {
                        Ok(()) => debug!("Connection closed"),
                        Err(err) => debug!(%err, "Connection dropped"),
                    }
                }
                .instrument(span)
                .await;
            }
        })
    }
}

/// Answers overflow connections with a static `503`.
fn spawn_alarmist(
    queue: &TcpQueue,
    limits: &AllLimits,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let queue = queue.clone();
    let (server_limits, conn_limits) = (limits.server.clone(), limits.conn.clone());

    tokio::spawn(async move {
        loop {
            let (mut stream, peer) = tokio::select! {
                _ = stopped(&mut stop) => return,
                next = get_stream(&queue, &server_limits.wait_strategy) => next,
            };

            let response = service_unavailable(server_limits.json_errors);
            let sent = tokio::time::timeout(conn_limits.socket_write_timeout, async {
                stream.write_all(response).await?;
                stream.shutdown().await
            })
            .await;

            if !matches!(sent, Ok(Ok(()))) {
                debug!(%peer, "Could not deliver 503");
            }
        }
    })
}

/// Drops overflow connections without a response.
fn spawn_quiet_alarmist(
    queue: &TcpQueue,
    limits: &AllLimits,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let queue = queue.clone();
    let server_limits = limits.server.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stopped(&mut stop) => return,
                (stream, _) = get_stream(&queue, &server_limits.wait_strategy) => drop(stream),
            }
        }
    })
}

async fn get_stream(queue: &TcpQueue, wait: &WaitStrategy) -> (TcpStream, SocketAddr) {
    loop {
        if let Some(value) = queue.pop() {
            return value;
        }

        match wait {
            WaitStrategy::Yield => yield_now().await,
            WaitStrategy::Sleep(time) => tokio_sleep(*time).await,
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    stream_queue: TcpQueue,
    error_queue: TcpQueue,
    max_pending: usize,
    sender: Arc<watch::Sender<bool>>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), Error> {
    let result = loop {
        let accepted = tokio::select! {
            biased;
            _ = stopped(&mut stop) => break Ok(()),
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok(value) => match stream_queue.len() < max_pending {
                true => stream_queue.push(value),
                false => {
                    debug!(peer = %value.1, "Pending queue full");
                    error_queue.push(value);
                }
            },
            Err(err) if is_transient(&err) => debug!(%err, "Accept failed, retrying"),
            Err(err) => {
                error!(%err, "Accept failed");
                break Err(Error::Accept(err));
            }
        }
    };

    drop(listener);
    sender.send_replace(true);
    info!("Listener closed");

    result
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

/// Resolves once the stop flag is raised or its sender is gone.
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

//

/// Builder for [`Server`] instances.
pub struct ServerBuilder<W: Wrap = Plain> {
    config: BackEndConfig,
    take: Option<Arc<dyn Take>>,
    wrap: Arc<W>,
    wrapped: bool,

    server_limits: Option<ServerLimits>,
    connection_limits: Option<ConnLimits>,
    request_limits: Option<ReqLimits>,
    response_limits: Option<RespLimits>,
}

impl<W: Wrap> ServerBuilder<W> {
    /// Sets the port, host, backlog and timeouts.
    #[inline(always)]
    pub fn config(mut self, config: BackEndConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the take every request is dispatched to.
    ///
    /// Required: [`build`](Self::build) fails without one.
    #[inline(always)]
    pub fn take(self, take: impl Take + 'static) -> Self {
        self.shared_take(Arc::new(take))
    }

    #[inline(always)]
    pub(crate) fn shared_take(mut self, take: Arc<dyn Take>) -> Self {
        self.take = Some(take);
        self
    }

    /// Installs a [`Wrap`] for accepted connections (e.g. TLS).
    ///
    /// The wrap is used only when [`BackEndConfig::secure`] is set.
    #[inline(always)]
    pub fn wrap<NewW: Wrap>(self, wrap: NewW) -> ServerBuilder<NewW> {
        self.shared_wrap(Arc::new(wrap))
    }

    pub(crate) fn shared_wrap<NewW: Wrap>(self, wrap: Arc<NewW>) -> ServerBuilder<NewW> {
        ServerBuilder {
            config: self.config,
            take: self.take,
            wrap,
            wrapped: true,
            server_limits: self.server_limits,
            connection_limits: self.connection_limits,
            request_limits: self.request_limits,
            response_limits: self.response_limits,
        }
    }

    /// Configures the worker pool and overload behaviour.
    ///
    /// # Examples
    ///
    /// ```
    /// use forktake::{limits::ServerLimits, Server, TkText};
    ///
    /// let server = Server::builder()
    ///     .take(TkText::new("hi"))
    ///     .server_limits(ServerLimits {
    ///         max_connections: 2500,
    ///         max_pending_connections: 10000,
    ///         ..ServerLimits::default()
    ///     })
    ///     .build();
    /// assert!(server.is_ok());
    /// ```
    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    /// Configures per-connection timeouts and caps.
    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    /// Configures request parsing limits.
    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    /// Configures the response write buffer.
    #[inline(always)]
    pub fn response_limits(mut self, limits: RespLimits) -> Self {
        self.response_limits = Some(limits);
        self
    }

    /// Finalizes the configuration.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when:
    /// - the `take` method was not called,
    /// - [`BackEndConfig::secure`] is set but no wrap was installed,
    /// - `max_connections` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use forktake::{Error, Server};
    ///
    /// assert!(matches!(Server::builder().build(), Err(Error::Config(_))));
    /// ```
    pub fn build(self) -> Result<Server<W>, Error> {
        let take = self
            .take
            .ok_or(Error::Config("the `take` method must be called to build"))?;

        if self.config.secure && !self.wrapped {
            return Err(Error::Config("a secure back end needs a wrap"));
        }

        let limits = AllLimits {
            server: self.server_limits.unwrap_or_default(),
            conn: self.connection_limits.unwrap_or_default(),
            req: self.request_limits.unwrap_or_default(),
            resp: self.response_limits.unwrap_or_default(),
        };
        if limits.server.max_connections == 0 {
            return Err(Error::Config("`max_connections` must be at least 1"));
        }

        Ok(Server {
            config: self.config,
            take,
            wrap: self.wrap,
            limits: Arc::new(limits),
        })
    }
}

/// Lifecycle state of a started back end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Listening,
    Stopped,
}

/// Raises the stop flag of a back end from anywhere. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Stopper(Arc<watch::Sender<bool>>);

impl Stopper {
    /// Asks the back end to stop; calling it again has no effect.
    #[inline]
    pub fn stop(&self) {
        self.0.send_replace(true);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }
}

/// Handle of a started back end.
///
/// Dropping the handle leaves the back end running; keep a [`Stopper`] to
/// stop it later.
#[derive(Debug)]
pub struct Running {
    local_addr: SocketAddr,
    stopper: Stopper,
    accept: Option<JoinHandle<Result<(), Error>>>,
    workers: Vec<JoinHandle<()>>,
    shutdown_timeout: Option<Duration>,
}

impl Running {
    /// Address actually bound; useful with port `0`.
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> State {
        let finished = self.accept.as_ref().map_or(true, JoinHandle::is_finished);

        match finished || self.stopper.is_stopped() {
            true => State::Stopped,
            false => State::Listening,
        }
    }

    pub fn stopper(&self) -> Stopper {
        self.stopper.clone()
    }

    /// Stops accepting, lets workers finish their current exchange and waits
    /// for them. Idempotent: later calls return `Ok(())` at once.
    ///
    /// The listening socket is closed before this returns. Workers still busy
    /// after [`ServerLimits::shutdown_timeout`] are aborted.
    pub async fn stop(&mut self) -> Result<(), Error> {
        self.stopper.stop();
        self.join().await
    }

    /// Waits until the back end stops on its own: through a [`Stopper`] or a
    /// fatal accept error, which is returned.
    pub async fn join(&mut self) -> Result<(), Error> {
        let Some(accept) = self.accept.take() else {
            return Ok(());
        };

        let result = accept.await.map_err(Error::from).and_then(|result| result);

        let deadline = self.shutdown_timeout.map(|timeout| Instant::now() + timeout);
        let mut aborted = 0;
        for worker in &mut self.workers {
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, &mut *worker).await.is_err() {
                        worker.abort();
                        aborted += 1;
                    }
                }
                None => {
                    let _ = worker.await;
                }
            }
        }
        self.workers.clear();

        if aborted > 0 {
            warn!(aborted, "Shutdown timeout expired, busy workers aborted");
        }
        info!(address = %self.local_addr, "Back end stopped");

        result
    }
}

type TcpQueue = Arc<SegQueue<(TcpStream, SocketAddr)>>;

pub(crate) struct AllLimits {
    pub(crate) server: ServerLimits,
    pub(crate) conn: ConnLimits,
    pub(crate) req: ReqLimits,
    pub(crate) resp: RespLimits,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::take::leaf::TkText;
    use futures_util::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncReadExt;

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn build_errors() {
        #[rustfmt::skip]
        let cases = [
            (None,                     BackEndConfig::default(),                                  1),
            (Some(TkText::new("x")),   BackEndConfig { secure: true, ..BackEndConfig::default() }, 1),
            (Some(TkText::new("x")),   BackEndConfig::default(),                                  0),
        ];

        for (take, config, max_connections) in cases {
            let mut builder = Server::builder().config(config).server_limits(ServerLimits {
                max_connections,
                ..ServerLimits::default()
            });
            if let Some(take) = take {
                builder = builder.take(take);
            }

            assert!(matches!(builder.build(), Err(Error::Config(_))));
        }
    }

    #[test]
    fn secure_with_wrap() {
        let built = Server::builder()
            .config(BackEndConfig {
                secure: true,
                ..BackEndConfig::default()
            })
            .take(TkText::new("x"))
            .wrap(Plain)
            .build();

        assert!(built.is_ok());
    }

    struct Counting(Arc<AtomicUsize>);

    impl Wrap for Counting {
        type Stream = TcpStream;

        fn wrap(&self, stream: TcpStream) -> BoxFuture<'_, io::Result<TcpStream>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(stream) })
        }
    }

    #[tokio::test]
    async fn wrap_follows_secure_flag() {
        for secure in [false, true] {
            let wrapped = Arc::new(AtomicUsize::new(0));
            let mut running = Server::builder()
                .config(BackEndConfig {
                    secure,
                    ..BackEndConfig::default()
                })
                .take(TkText::new("w"))
                .wrap(Counting(Arc::clone(&wrapped)))
                .build()
                .unwrap()
                .start()
                .unwrap();

            assert!(get(running.local_addr(), "/").await.ends_with("w"));
            assert_eq!(
                wrapped.load(Ordering::SeqCst),
                usize::from(secure),
                "secure: {secure}"
            );

            running.stop().await.unwrap();
        }
    }

    #[tokio::test]
    async fn serve_and_stop() {
        let mut running = Server::builder()
            .take(TkText::new("pong"))
            .build()
            .unwrap()
            .start()
            .unwrap();
        let addr = running.local_addr();

        assert_eq!(running.state(), State::Listening);
        assert!(get(addr, "/ping").await.ends_with("\r\n\r\npong"));

        running.stop().await.unwrap();
        assert_eq!(running.state(), State::Stopped);
        running.stop().await.unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn stopper_from_elsewhere() {
        let mut running = Server::builder()
            .take(TkText::new("x"))
            .build()
            .unwrap()
            .start()
            .unwrap();

        let stopper = running.stopper();
        tokio::spawn(async move { stopper.stop() });

        tokio::time::timeout(Duration::from_secs(5), running.join())
            .await
            .unwrap()
            .unwrap();
    }
}
