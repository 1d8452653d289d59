use crate::{
    errors::Error,
    limits::{ConnLimits, ReqLimits, RespLimits, ServerLimits},
    server::{
        server_impl::{Running, Server, Stopper},
        socket::{BackEndConfig, Plain, Wrap},
    },
    take::signal::Take,
};
use futures_util::future;
use std::{future::Future, sync::Arc};
use tracing::{error, info};

/// Runs one or more back ends against the same take.
///
/// Each [`BackEndConfig`] gets its own listener and worker pool; limits are
/// shared. If a back end fails to bind, the ones already started are stopped
/// and the bind error is returned. A back end failing later is logged and
/// the others keep serving; its error is returned once all have stopped.
///
/// # Examples
///
/// ```no_run
/// use forktake::{BackEndConfig, FrontEnd, TkText};
///
/// #[tokio::main]
/// async fn main() -> Result<(), forktake::Error> {
///     FrontEnd::new(TkText::new("hello"))
///         .back_end(BackEndConfig { port: 8080, ..BackEndConfig::default() })
///         .back_end(BackEndConfig { port: 8081, ..BackEndConfig::default() })
///         .run_until(async {
///             let _ = tokio::signal::ctrl_c().await;
///         })
///         .await
/// }
/// ```
pub struct FrontEnd<W: Wrap = Plain> {
    take: Arc<dyn Take>,
    wrap: Option<Arc<W>>,
    back_ends: Vec<BackEndConfig>,

    server_limits: ServerLimits,
    connection_limits: ConnLimits,
    request_limits: ReqLimits,
    response_limits: RespLimits,
}

impl FrontEnd {
    pub fn new(take: impl Take + 'static) -> Self {
        Self {
            take: Arc::new(take),
            wrap: None,
            back_ends: Vec::new(),

            server_limits: ServerLimits::default(),
            connection_limits: ConnLimits::default(),
            request_limits: ReqLimits::default(),
            response_limits: RespLimits::default(),
        }
    }
}

impl<W: Wrap> FrontEnd<W> {
    /// Adds a back end.
    pub fn back_end(mut self, config: BackEndConfig) -> Self {
        self.back_ends.push(config);
        self
    }

    /// Installs a [`Wrap`] used by the back ends marked
    /// [`secure`](BackEndConfig::secure); the others serve plain TCP.
    pub fn wrap<NewW: Wrap>(self, wrap: NewW) -> FrontEnd<NewW> {
        FrontEnd {
            take: self.take,
            wrap: Some(Arc::new(wrap)),
            back_ends: self.back_ends,
            server_limits: self.server_limits,
            connection_limits: self.connection_limits,
            request_limits: self.request_limits,
            response_limits: self.response_limits,
        }
    }

    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = limits;
        self
    }

    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = limits;
        self
    }

    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = limits;
        self
    }

    pub fn response_limits(mut self, limits: RespLimits) -> Self {
        self.response_limits = limits;
        self
    }

    /// Serves until every back end has stopped.
    pub async fn run(self) -> Result<(), Error> {
        self.run_until(future::pending()).await
    }

    /// Serves until `signal` resolves, then stops every back end.
    pub async fn run_until<F>(self, signal: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        if self.back_ends.is_empty() {
            return Err(Error::Config("a front end needs at least one back end"));
        }

        let mut running = self.start_all().await?;
        let stoppers: Vec<Stopper> = running.iter().map(Running::stopper).collect();
        info!(back_ends = running.len(), "Front end started");

        let joins = future::join_all(running.iter_mut().map(|back_end| async move {
            let address = back_end.local_addr();
            let result = back_end.join().await;
            if let Err(err) = &result {
                error!(%address, %err, "Back end failed");
            }
            result
        }));
        let mut joins = std::pin::pin!(joins);

        let results = tokio::select! {
            results = &mut joins => results,
            _ = signal => {
                info!("Front end stopping");
                stoppers.iter().for_each(Stopper::stop);
                joins.await
            }
        };

        results.into_iter().collect()
    }

    /// Starts every back end, or none.
    async fn start_all(&self) -> Result<Vec<Running>, Error> {
        let mut running = Vec::with_capacity(self.back_ends.len());

        for config in &self.back_ends {
            match self.start_one(config.clone()) {
                Ok(back_end) => running.push(back_end),
                Err(err) => {
                    error!(address = %config.address(), %err, "Back end did not start");
                    for back_end in &mut running {
                        let _ = back_end.stop().await;
                    }
                    return Err(err);
                }
            }
        }

        Ok(running)
    }

    fn start_one(&self, config: BackEndConfig) -> Result<Running, Error> {
        let secure = config.secure;
        let builder = Server::builder()
            .config(config)
            .shared_take(Arc::clone(&self.take))
            .server_limits(self.server_limits.clone())
            .connection_limits(self.connection_limits.clone())
            .request_limits(self.request_limits.clone())
            .response_limits(self.response_limits.clone());

        match (&self.wrap, secure) {
            (Some(wrap), true) => builder.shared_wrap(Arc::clone(wrap)).build()?.start(),
            _ => builder.build()?.start(),
        }
    }
}
