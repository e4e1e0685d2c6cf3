mod config;

use std::net::SocketAddr;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use pingup_api::assets::{AssetStore, HostedAssets, LocalAssets};
use pingup_api::auth::IdentityResolver;
use pingup_api::{AppStateInner, router};
use pingup_gateway::ConnectionRegistry;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pingup=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = pingup_db::Database::open(&config.db_path)?;

    let assets = match config.hosted_assets {
        Some(hosted) => {
            info!("Images go to {}", hosted.url_endpoint);
            AssetStore::Hosted(HostedAssets::new(hosted.private_key, hosted.url_endpoint)?)
        }
        None => AssetStore::Local(LocalAssets::new(config.upload_dir, config.public_url).await?),
    };

    if config.webhook_secret.is_empty() {
        warn!("PINGUP_WEBHOOK_SECRET is unset, identity webhooks will be rejected");
    }

    let state = AppStateInner::new(
        db,
        assets,
        IdentityResolver::new(&config.jwt_secret),
        config.webhook_secret,
        config.keep_alive,
    );

    let registry = state.registry.clone();
    let app = router::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("PingUp server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await?;

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM, after closing every live stream so that
/// graceful shutdown is not held up by long-lived responses.
async fn shutdown_signal(registry: ConnectionRegistry) {
    wait_for_signal().await;
    let closed = registry.close_all();
    info!("Closed {} live streams", closed);
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
