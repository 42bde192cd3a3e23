use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use secretshare::{config::Config, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!(
        "✅ Configuration loaded ({:?}, {:?} storage)",
        config.app_env,
        config.storage
    );

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    let app = routes::app(state)?;

    let addr = config.listen_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("🔗 Links are issued under {}", config.public_base_url);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
