//! Chain/controller error taxonomy.
//!
//! Every variant shares the `{message, context, recoverable}` shape: `message`
//! is the human-readable failure, `context` is a small bag of structured
//! fields (server name, tool name, iteration count, ...) attached for callers
//! that want to log or feed the failure back into a prompt, and `recoverable`
//! tells the stage executor whether the iteration controller may retry with
//! the failure folded into the next turn or whether the stage must fail.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Shared field set for every taxonomy error. Kept as a plain struct (not a
/// trait) so each variant can still carry its own extra fields while
/// `Display` stays uniform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    pub recoverable: bool,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            context: HashMap::new(),
            recoverable,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

macro_rules! taxonomy_error {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub struct $name(pub ErrorDetail);

        impl $name {
            pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
                Self(ErrorDetail::new(message, recoverable))
            }

            pub fn recoverable(&self) -> bool {
                self.0.recoverable
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::error::Error for $name {}
    };
}

taxonomy_error!(
    ToolSelectionError,
    "The ReAct controller parsed a tool-call block it could not resolve: an \
    unknown server, an unknown tool on a known server, or malformed JSON. \
    Recoverable: the error text is fed back to the model as the next \
    iteration's observation."
);

taxonomy_error!(
    ToolExecutionError,
    "A resolved tool call reached the MCP client and the call itself failed \
    (transport error, non-zero tool result, timeout). Recoverable: same \
    feed-back-to-model treatment as `ToolSelectionError`."
);

taxonomy_error!(
    AnalysisError,
    "The LLM call backing an iteration failed (provider error, empty \
    response, content filtered). Not recoverable by the controller itself -- \
    the stage executor decides whether to fail the stage."
);

taxonomy_error!(
    ConfigurationError,
    "A chain or stage referenced a misconfigured resource: unknown agent, \
    unknown MCP server, malformed iteration strategy. Never recoverable; \
    these are caught at chain-load time or surfaced as an immediate stage \
    failure."
);

taxonomy_error!(
    IterationLimitError,
    "A ReAct controller exhausted its configured max iterations without the \
    model producing a final, tool-call-free answer. Recoverable: the \
    controller synthesizes a best-available answer from the accumulated \
    transcript rather than failing the stage outright."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_selection_error_display_is_message() {
        let e = ToolSelectionError::new("unknown server 'foo'", true);
        assert_eq!(e.to_string(), "unknown server 'foo'");
        assert!(e.recoverable());
    }

    #[test]
    fn configuration_error_never_recoverable_by_convention() {
        let e = ConfigurationError::new("unknown agent 'bogus'", false);
        assert!(!e.recoverable());
    }

    #[test]
    fn context_round_trips_through_json() {
        let e = ToolExecutionError::new("mcp call failed", true).0.with_context("server", "kubectl");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["context"]["server"], "kubectl");
    }
}
