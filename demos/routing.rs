//! curl -i localhost:8080/users/7
//! curl -i -H 'Accept: application/json' localhost:8080/users/7
//! curl -i localhost:8080/old
//! curl -i localhost:8080/nowhere
use forktake::{
    BackEndConfig, FbChain, FbStatus, FkMethods, FkRegex, FkTypes, Method, Request, Response,
    Server, Signal, StatusCode, TkFallback, TkFork, TkForward, TkFn, TkHtml, TkRedirect,
    TkWithHeaders,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), forktake::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forktake=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let user = FkTypes::new()
        .with(
            "text/html",
            TkFn::new(|req: Request| async move {
                let id = req.param("id").unwrap_or_default();
                Ok(Response::ok().html(format!("<html><h1>User {id}</h1></html>")))
            }),
        )?
        .with(
            "application/json",
            TkFn::new(|req: Request| async move {
                let id = req.param("id").unwrap_or_default();
                Ok(Response::ok()
                    .with_type("application/json")
                    .with_body(format!(r#"{{"id":{id}}}"#)))
            }),
        )?;

    let echo = FkMethods::new(
        [Method::Post, Method::Put],
        TkFn::new(|req: Request| async move {
            let body = req.into_body().into_bytes().await?;
            Ok(Response::ok().with_type("application/octet-stream").with_body(body))
        }),
    );

    let routes = TkFork::new()
        .fork(FkRegex::new("/", TkHtml::new("<html><a href=\"/users/1\">user 1</a></html>"))?)
        .fork(FkRegex::new(r"/users/(?<id>\d+)", TkFork::new().fork(user))?)
        .fork(FkRegex::new("/echo", TkFork::new().fork(echo))?)
        .fork(FkRegex::new("/old", TkRedirect::new("/"))?)
        .fork(FkRegex::new(
            "/broken",
            TkFn::new(|_| async { Err(Signal::fault("database is on fire")) }),
        )?);

    let take = TkWithHeaders::new(
        TkFallback::new(
            TkForward::new(routes),
            FbChain::new()
                .with(FbStatus::text(StatusCode::NotFound))
                .with(FbStatus::new(StatusCode::InternalServerError, |failure| {
                    Response::new(failure.status()).text(format!("{} failed\n", failure.head().path()))
                })),
        ),
        [("X-Content-Type-Options", "nosniff")],
    );

    let mut running = Server::builder()
        .config(BackEndConfig {
            port: 8080,
            ..BackEndConfig::default()
        })
        .take(take)
        .build()?
        .start()?;

    tokio::signal::ctrl_c().await?;
    running.stop().await
}
