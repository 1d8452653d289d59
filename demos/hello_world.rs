use forktake::{BackEndConfig, Server, TkText};
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

    let mut running = Server::builder()
        .config(BackEndConfig {
            port: 8080,
            ..BackEndConfig::default()
        })
        .take(TkText::new("Hello, world!"))
        .build()?
        .start()?;

    tokio::signal::ctrl_c().await?;
    running.stop().await
}
