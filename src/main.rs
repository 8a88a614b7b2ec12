use camguard::config::Config;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    camguard::logging::init(&config.log)?;
    info!("camguard starting up");

    let bind_addr = config.server.bind_addr.clone();
    let (router, signaling) = camguard::build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(camguard::shutdown_signal(signaling))
        .await?;

    info!("camguard shut down cleanly");
    Ok(())
}
