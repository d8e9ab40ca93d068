use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use tarsy_domain::config::{Config, CorsConfig, LogFormat};
use tarsy_engine::bus::{spawn_backend, PostgresEventBus};
use tarsy_engine::{CancellationTracker, Claimer, EventBus, InteractionLog, Orchestrator, WarningsRegistry};
use tarsy_mcp_client::McpManager;
use tarsy_providers::ProviderRegistry;

mod api;
mod state;

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "tarsy", about = "Alert-triage chain execution engine")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "config.toml", env = "TARSY_CONFIG")]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    init_tracing(&config.observability);

    config.database.url =
        std::env::var("TARSY_DATABASE_URL").context("TARSY_DATABASE_URL must be set")?;
    config.server.api_token_hash = match std::env::var("TARSY_API_TOKEN") {
        Ok(token) if !token.is_empty() => {
            tracing::info!("API bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!("API bearer-token auth DISABLED — set TARSY_API_TOKEN to enable");
            None
        }
    };

    run_server(config).await
}

fn load_config(path: &std::path::Path) -> anyhow::Result<Config> {
    let config = match std::fs::read_to_string(path) {
        Ok(raw) => toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Config::default()
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    Ok(config)
}

/// Initialize structured tracing per `ObservabilityConfig` (§10 "Logging").
fn init_tracing(observability: &tarsy_domain::config::ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_filter));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match observability.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("tarsy starting");
    let config = Arc::new(config);

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(std::time::Duration::from_millis(config.database.acquire_timeout_ms))
        .connect(&config.database.url)
        .await
        .context("connecting to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("running database migrations")?;
    tracing::info!("database migrations applied");

    // ── Event bus ─────────────────────────────────────────────────────
    let event_bus = Arc::new(PostgresEventBus::new(pool.clone()));
    let _event_bus_task = spawn_backend(event_bus.clone(), pool.clone(), config.event_bus.clone());
    let event_bus: Arc<dyn EventBus> = event_bus;
    tracing::info!(backend = ?config.event_bus.backend, "event bus ready");

    // ── LLM providers ────────────────────────────────────────────────
    let providers = Arc::new(ProviderRegistry::from_config(&config.providers));
    if providers.is_empty() {
        tracing::warn!("no LLM providers initialized — chat, scoring, and chains will fail");
    } else {
        tracing::info!(count = providers.len(), "LLM provider registry ready");
    }

    // ── MCP servers ──────────────────────────────────────────────────
    let mcp = if config.mcp.servers.is_empty() {
        tracing::info!("no MCP servers configured");
        Arc::new(McpManager::empty())
    } else {
        tracing::info!(count = config.mcp.servers.len(), "initializing MCP servers");
        Arc::new(McpManager::from_config(&config.mcp).await)
    };
    if mcp.tool_count() > 0 {
        tracing::info!(servers = mcp.server_count(), tools = mcp.tool_count(), "MCP tools discovered");
    }

    // ── Warnings registry (§11) ───────────────────────────────────────
    let warnings = Arc::new(WarningsRegistry::new());
    warnings.record_mcp_init_failures(mcp.init_failures());
    warnings.record_provider_init_failures(providers.init_errors());

    // ── Session lifecycle ────────────────────────────────────────────
    let interactions = Arc::new(InteractionLog::new(pool.clone()));
    let cancellation = Arc::new(CancellationTracker::new());
    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        Arc::new(config.agents.clone()),
        Arc::new(config.chains.clone()),
        Arc::new(config.sessions.clone()),
        providers.clone(),
        mcp.clone(),
        interactions.clone(),
        cancellation.clone(),
        event_bus.clone(),
    ));

    let pod_id = std::env::var("HOSTNAME").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());
    let claimer = Arc::new(Claimer::new(
        pool.clone(),
        pod_id.clone(),
        event_bus.clone(),
        config.sessions.claim_retry_backoff_ms,
    ));

    // ── Startup orphan sweep (§4.6) ──────────────────────────────────
    match claimer.sweep_orphans(config.sessions.orphan_sweep_timeout_s).await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(count = n, "reclaimed orphaned sessions at startup"),
        Err(e) => tracing::error!(error = %e, "orphan sweep failed"),
    }

    let state = AppState::new(
        &config,
        pool.clone(),
        event_bus,
        providers,
        mcp.clone(),
        interactions,
        orchestrator.clone(),
        claimer.clone(),
        cancellation,
        warnings,
    );

    // ── Claim loop (§4.6): one session at a time per pod ─────────────
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let claim_loop = {
        let claimer = claimer.clone();
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            claimer
                .run(
                    |session| {
                        let orchestrator = orchestrator.clone();
                        async move { orchestrator.run_session(session).await }
                    },
                    shutdown_rx,
                )
                .await;
        })
    };
    tracing::info!(pod_id = %pod_id, "claim loop started");

    // ── CORS ──────────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    let app = api::router(state.clone())
        .layer(cors_layer)
        .with_state(state);

    let addr = config.server.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "tarsy listening");

    let shutdown_signal = async {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received, draining");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("axum server error")?;

    let _ = claim_loop.await;
    mcp.shutdown().await;

    match claimer.sweep_own_sessions_on_shutdown().await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(count = n, "interrupted own in-progress sessions on shutdown"),
        Err(e) => tracing::error!(error = %e, "graceful-shutdown sweep failed"),
    }

    tracing::info!("tarsy stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may contain a trailing `*` wildcard for the port segment (e.g.
/// `http://localhost:*`); these expand into a predicate matching any port
/// on that host. A literal `"*"` allows all origins (not recommended for
/// production).
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            let prefix = origin.trim_end_matches('*').to_owned();
            wildcard_prefixes.push(prefix);
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
