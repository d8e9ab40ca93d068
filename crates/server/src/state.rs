use std::sync::Arc;

use tarsy_domain::config::{AgentsConfig, ChainsConfig, Config, EventBusConfig, SessionConfig};
use tarsy_engine::{CancellationTracker, Claimer, EventBus, InteractionLog, Orchestrator, Pool, WarningsRegistry};
use tarsy_mcp_client::McpManager;
use tarsy_providers::ProviderRegistry;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — database pool, event bus, LLM providers, MCP
/// - **Session lifecycle** — orchestrator, claimer, cancellation tracker
/// - **Config & diagnostics** — resolved config sections, warnings
/// - **Security** — API token hash (startup-computed)
#[derive(Clone)]
pub struct AppState {
    // ── Core services ───────────────────────────────────────────────
    pub pool: Pool,
    pub event_bus: Arc<dyn EventBus>,
    pub providers: Arc<ProviderRegistry>,
    pub mcp: Arc<McpManager>,
    pub interactions: Arc<InteractionLog>,

    // ── Session lifecycle ───────────────────────────────────────────
    pub orchestrator: Arc<Orchestrator>,
    pub claimer: Arc<Claimer>,
    pub cancellation: Arc<CancellationTracker>,

    // ── Config & diagnostics ────────────────────────────────────────
    pub agents: Arc<AgentsConfig>,
    pub chains: Arc<ChainsConfig>,
    pub sessions: Arc<SessionConfig>,
    pub event_bus_config: Arc<EventBusConfig>,
    pub warnings: Arc<WarningsRegistry>,

    // ── Security (startup-computed) ─────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        pool: Pool,
        event_bus: Arc<dyn EventBus>,
        providers: Arc<ProviderRegistry>,
        mcp: Arc<McpManager>,
        interactions: Arc<InteractionLog>,
        orchestrator: Arc<Orchestrator>,
        claimer: Arc<Claimer>,
        cancellation: Arc<CancellationTracker>,
        warnings: Arc<WarningsRegistry>,
    ) -> Self {
        Self {
            pool,
            event_bus,
            providers,
            mcp,
            interactions,
            orchestrator,
            claimer,
            cancellation,
            agents: Arc::new(config.agents.clone()),
            chains: Arc::new(config.chains.clone()),
            sessions: Arc::new(config.sessions.clone()),
            event_bus_config: Arc::new(config.event_bus.clone()),
            warnings,
            api_token_hash: config.server.api_token_hash.clone(),
        }
    }
}
