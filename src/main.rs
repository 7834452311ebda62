use intake::{app, build_state, AppConfig};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG overrides the default `info` level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()?;
    let addr: std::net::SocketAddr = ([0, 0, 0, 0], config.port).into();
    tracing::info!(
        repo = %config.github.repo,
        uploads = %config.upload_dir.display(),
        compliance = config.compliance.api_key.is_some(),
        "starting submission intake"
    );
    let router = app(build_state(config)?);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "accepting submissions");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("ctrl-c received, draining in-flight submissions");
            }
        })
        .await?;
    Ok(())
}
