use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use futures_util::future::try_join_all;
use metrics_exporter_prometheus::PrometheusBuilder;
use slidetile_server::config::Config;
use slidetile_server::server::{AppState, Dispatcher, pool_for, router};
use slidetile_server::slide::{OpenSlideDecoder, SlideDecoder};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Ensure a directory exists, creating it if necessary.
/// Returns true if directory exists and is empty.
fn ensure_directory(path: &Path, name: &str) -> std::io::Result<bool> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created {} directory: {:?}", name, path);
        Ok(true)
    } else if path.is_dir() {
        let is_empty = path.read_dir()?.next().is_none();
        Ok(is_empty)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} path {:?} exists but is not a directory", name, path),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slidetile=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from file and environment
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Loaded configuration: location={:?}, cache={:?}, prefixes={:?}",
        config.location, config.cache, config.prefixes
    );

    // Prometheus exporter, only when an address is configured
    if let Some(addr) = config.metrics_address {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus metrics exposed on {}", addr);
    }

    if !config.location.is_dir() {
        warn!(
            "Slide location {:?} is not a directory - requests will fail until it exists",
            config.location
        );
    }

    // Cache entries are written straight into the cache directory
    let cache_dir = config.cache_dir();
    if !cache_dir.as_os_str().is_empty() {
        match ensure_directory(&cache_dir, "cache") {
            Ok(true) => info!("Cache directory {:?} is empty", cache_dir),
            Ok(false) => {}
            Err(e) => warn!("Failed to create cache directory {:?}: {}", cache_dir, e),
        }
    }

    let listen_addrs = config.listen_addrs()?;
    if listen_addrs.is_empty() {
        anyhow::bail!("No listener prefixes configured");
    }

    let workers = pool_for(config.max_workers);
    let decoder: Arc<dyn SlideDecoder> = Arc::new(OpenSlideDecoder::new());
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(config), decoder));

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(AppState::new(dispatcher, workers)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    // One listener per resolved prefix; the server stops if any of them fails
    let servers = listen_addrs.into_iter().map(|addr| {
        let app = app.clone();
        async move {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!("Slidetile server listening on {}", addr);
            axum::serve(listener, app)
                .await
                .with_context(|| format!("Server on {} failed", addr))
        }
    });
    try_join_all(servers).await?;

    Ok(())
}
