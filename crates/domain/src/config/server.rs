use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_bind_addr")]
    pub bind_addr: String,

    /// SHA-256 hash of the bearer token expected on protected routes, hex
    /// encoded. Loaded from the `TARSY_API_TOKEN` environment variable at
    /// bootstrap, never from the TOML file. `None` disables auth (dev mode).
    #[serde(skip)]
    pub api_token_hash: Option<Vec<u8>>,

    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: d_bind_addr(),
            api_token_hash: None,
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. Use `["*"]` for permissive (NOT recommended).
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_bind_addr() -> String {
    "0.0.0.0:8080".into()
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".into()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bind_addr() {
        assert_eq!(ServerConfig::default().bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn default_has_no_token() {
        assert!(ServerConfig::default().api_token_hash.is_none());
    }
}
