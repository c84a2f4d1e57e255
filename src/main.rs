//! Repo Federation - Main Entry Point
//!
//! Starts the HTTP server for the federation endpoint and operator API.

use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use repo_federation::api::{access_logger, configure_routes, ApiState, AppState};
use repo_federation::config::Settings;
use repo_federation::federation::{LogNotifier, ProposalNotifier, WebhookNotifier};
use repo_federation::metrics::{init_metrics, metrics_endpoint};
use repo_federation::services::{
    FederationConfig, FederationService, ProposalService, PullService, StatusService,
};
use repo_federation::store::{FederationStore, RocksStore};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging with RUST_LOG environment variable support
    // Default: info level for repo_federation, warn for everything else
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,repo_federation=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true))
        .init();

    // Load configuration
    let settings = Settings::load().unwrap_or_else(|e| {
        warn!("Failed to load config: {}, using defaults", e);
        Settings::default()
    });

    info!(
        "Starting Repo Federation v{} ({})",
        env!("CARGO_PKG_VERSION"),
        settings.instance.name
    );
    info!("HTTP: {}:{}", settings.server.host, settings.server.http_port);

    let federation_config = FederationConfig::from_settings(&settings);
    match federation_config.disabled_reason() {
        Some(reason) => warn!("Federation requests will be refused: {}", reason),
        None => info!(
            "Federation enabled ({} tokens, proposals {})",
            federation_config.tokens.issued().len(),
            if federation_config.allow_proposals { "allowed" } else { "refused" }
        ),
    }

    // Initialize metrics
    if settings.metrics.enabled {
        init_metrics();
    }

    // Initialize database
    let rocks_store = RocksStore::open_with_opts(
        &settings.database.data_dir,
        settings.database.cache_size_mb,
        settings.database.compression,
    )
    .map_err(|e| {
        error!("Failed to open database at {}: {}", settings.database.data_dir, e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    info!("Database initialized at: {}", settings.database.data_dir);

    let store = Arc::new(FederationStore::new(rocks_store));

    // Operators hear about proposals by webhook when one is configured
    let notifier: Arc<dyn ProposalNotifier> = match settings.federation.notify_url.as_deref() {
        Some(endpoint) if !endpoint.trim().is_empty() => {
            let webhook = WebhookNotifier::new(endpoint)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            info!("Proposal notifications go to {}", endpoint);
            Arc::new(webhook)
        }
        _ => Arc::new(LogNotifier),
    };

    let federation = Arc::new(FederationService::new(
        federation_config,
        PullService::new(store.clone(), store.clone()),
        ProposalService::new(store.clone(), notifier),
        StatusService::new(store.clone()),
    ));

    // Create application state for HTTP server
    let app_state = AppState::new(settings.instance.name.clone());
    let mut api_state = ApiState::new(Arc::clone(&federation), Arc::clone(&store), settings.clone());
    if let Ok(path) = std::env::var(repo_federation::config::CONFIG_PATH_ENV) {
        api_state = api_state.with_config_path(path);
    }

    // Start HTTP server
    let http_addr = format!("{}:{}", settings.server.host, settings.server.http_port);
    info!("Starting HTTP server on {}", http_addr);

    let metrics_enabled = settings.metrics.enabled;
    HttpServer::new(move || {
        let app = App::new()
            // Add shared state
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(api_state.clone()))
            // Add middleware
            .wrap(access_logger())
            .wrap(middleware::Compress::default())
            // Add routes
            .configure(configure_routes);

        // Add metrics endpoint
        app.configure(|cfg| {
            if metrics_enabled {
                cfg.service(metrics_endpoint);
            }
        })
    })
    .workers(settings.server.workers)
    .bind(&http_addr)?
    .run()
    .await
}
