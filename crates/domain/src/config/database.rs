use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Database
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Postgres connection pool settings. `url` is loaded from the
/// `TARSY_DATABASE_URL` environment variable, never from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(skip)]
    pub url: String,

    #[serde(default = "d_max_connections")]
    pub max_connections: u32,

    #[serde(default = "d_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: d_max_connections(),
            acquire_timeout_ms: d_acquire_timeout_ms(),
        }
    }
}

fn d_max_connections() -> u32 {
    10
}
fn d_acquire_timeout_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_size() {
        assert_eq!(DatabaseConfig::default().max_connections, 10);
    }
}
