//! Shared utility functions for provider adapters.

use tarsy_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve an API key from the environment variable named in the
/// provider's `api_key_env` config field (§10.1: secrets are never read
/// from the TOML file itself).
pub fn resolve_api_key_env(env_var: &str) -> Result<String> {
    std::env::var(env_var).map_err(|_| {
        Error::Auth(format!(
            "environment variable '{env_var}' not set or not valid UTF-8"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_api_key_env_present() {
        let var_name = "TARSY_TEST_RESOLVE_ENV_KEY_1234";
        std::env::set_var(var_name, "env-secret-value");
        assert_eq!(resolve_api_key_env(var_name).unwrap(), "env-secret-value");
        std::env::remove_var(var_name);
    }

    #[test]
    fn resolve_api_key_env_missing() {
        let err = resolve_api_key_env("TARSY_TEST_NONEXISTENT_VAR_8888").unwrap_err();
        assert!(err.to_string().contains("TARSY_TEST_NONEXISTENT_VAR_8888"));
    }
}
