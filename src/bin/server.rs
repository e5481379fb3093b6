//! Binary entry point: wires the ambient stack (settings, tracing) to
//! the C1-C5 components and serves the addon-protocol/config-API
//! router described by spec §6. Per SPEC_FULL.md §A.5, everything in
//! this file is scaffolding — extract settings, construct components,
//! hand them to `axum::serve` — none of it is resilience logic.

use std::sync::Arc;
use std::time::Duration;

use catalog_addon_core::cache::{build_backend, CacheFacade};
use catalog_addon_core::dataset::DatasetEngine;
use catalog_addon_core::http::rate_limit;
use catalog_addon_core::http::{router, AppState};
use catalog_addon_core::metrics::Counters;
use catalog_addon_core::settings::Settings;
use catalog_addon_core::shutdown;
use catalog_addon_core::upstream::UpstreamClient;
use catalog_addon_core::user_config::{ConfigResolver, InMemoryConfigStore, RevocationList, SessionIssuer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = catalog_addon_core::VERSION, "starting catalog-addon-core");

    let settings = Arc::new(Settings::from_env()?);
    let counters = Arc::new(Counters::new());
    let (shutdown_handle, shutdown_watch) = shutdown::channel();

    let backend = build_backend(&settings.cache, counters.clone()).await;
    let cache = Arc::new(CacheFacade::new(backend, settings.cache.version.clone(), counters.clone()));

    let upstream = Arc::new(UpstreamClient::new(
        &settings.upstream,
        cache.clone(),
        counters.clone(),
        shutdown_watch.clone(),
    )?);

    // Persistence adapters beyond this in-memory default are external
    // collaborators (spec §1 Non-goals); swap this for a real
    // `ConfigStore` implementation at deployment time.
    let config_store: Arc<dyn catalog_addon_core::user_config::ConfigStore> = Arc::new(InMemoryConfigStore::new());
    let config_resolver = Arc::new(ConfigResolver::new(
        config_store.clone(),
        settings.session.config_cache_capacity,
        settings.session.config_cache_ttl,
        settings.session.credential_encryption_key,
    ));

    let sessions = Arc::new(SessionIssuer::new(&settings.session.jwt_secret, settings.session.session_ttl));
    let revocations = RevocationList::new();
    revocations.clone().spawn_sweeper(
        settings.session.revocation_sweep_interval,
        settings.session.revocation_sweep_interval,
        shutdown_watch.clone(),
    );

    let dataset = Arc::new(DatasetEngine::new(settings.dataset.clone(), counters.clone()));
    dataset.clone().spawn(shutdown_watch.clone());

    let rate_limiter = rate_limit::shared(
        settings.server.per_ip_global_per_minute,
        settings.server.per_ip_addon_per_minute,
        settings.server.per_ip_write_per_minute,
    );

    let state = AppState {
        upstream,
        config_store,
        config_resolver,
        dataset,
        sessions,
        revocations,
        counters,
        settings: settings.clone(),
        shutdown: shutdown_watch.clone(),
        rate_limiter,
        started_at: chrono::Utc::now(),
    };

    let app = router(state).into_make_service_with_connect_info::<std::net::SocketAddr>();
    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr).await?;
    tracing::info!(addr = %settings.server.bind_addr, "listening");

    let mut sigterm_watch = shutdown_watch.clone();
    let grace = settings.server.shutdown_grace;
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        sigterm_watch.draining().await;
        tracing::info!(?grace, "draining: waiting out grace period before shutdown");
        tokio::time::sleep(grace).await;
    });

    tokio::select! {
        result = serve => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server exited with error");
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining");
            shutdown_handle.trigger();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Waits for either Ctrl-C or, on Unix, SIGTERM — the signals an
/// orchestrator sends before killing the process (spec §5 "Shutdown").
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
