use forktake::{limits::ConnLimits, BackEndConfig, FkHost, FkFixed, FrontEnd, TkFork, TkText};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), forktake::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forktake=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let take = TkFork::new()
        .fork(FkHost::new("api.localhost", TkText::new("api\n")))
        .fork(FkFixed::new(TkText::new("www\n")));

    FrontEnd::new(take)
        .back_end(BackEndConfig {
            port: 8080,
            ..BackEndConfig::default()
        })
        .back_end(BackEndConfig {
            port: 8081,
            idle_timeout: Duration::from_secs(30),
            ..BackEndConfig::default()
        })
        .connection_limits(ConnLimits {
            max_requests_per_connection: 1000,
            ..ConnLimits::default()
        })
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
