//! Deterministic mock provider.
//!
//! §1 EXPANDED: a real (if deliberately thin) `generate` implementation so
//! the chain engine can be exercised end-to-end without network access.
//! Responses are scripted per provider instance via [`MockProvider::with_script`];
//! callers without a script get a fixed canned analysis string back.

use crate::traits::{GenerateOptions, GenerateResponse, LlmProvider};
use parking_lot::Mutex;
use tarsy_domain::capability::LlmCapabilities;
use tarsy_domain::error::Result;
use tarsy_domain::stream::{BoxStream, StreamEvent, Usage};
use tarsy_domain::tool::Message;

/// One scripted turn: returned in order, one per `generate` call. The last
/// entry repeats once the script is exhausted.
pub struct MockProvider {
    id: String,
    script: Mutex<Vec<String>>,
    capabilities: LlmCapabilities,
}

impl MockProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(vec!["no findings; alert appears benign.".into()]),
            capabilities: LlmCapabilities::default(),
        }
    }

    /// Replace the canned-response script. Each call consumes the next
    /// entry; the last entry repeats once exhausted.
    pub fn with_script(id: impl Into<String>, script: Vec<String>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(script),
            capabilities: LlmCapabilities::default(),
        }
    }

    fn next_response(&self) -> String {
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.remove(0)
        } else {
            script.first().cloned().unwrap_or_default()
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    async fn generate(
        &self,
        _conversation: &[Message],
        _options: GenerateOptions,
    ) -> Result<GenerateResponse> {
        Ok(GenerateResponse {
            content: self.next_response(),
            thinking_content: None,
            response_metadata: None,
            usage: Some(Usage {
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
            }),
            model: "mock".into(),
            finish_reason: Some("stop".into()),
        })
    }

    async fn generate_stream(
        &self,
        conversation: &[Message],
        options: GenerateOptions,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let resp = self.generate(conversation, options).await?;
        let events = vec![
            Ok(StreamEvent::Token { text: resp.content }),
            Ok(StreamEvent::Done {
                usage: resp.usage,
                finish_reason: resp.finish_reason,
            }),
        ];
        Ok(Box::pin(futures_util::stream::iter(events)))
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_script_repeats_final_entry() {
        let provider = MockProvider::new("mock");
        let opts = GenerateOptions::new(uuid::Uuid::nil());
        let r1 = provider.generate(&[], opts.clone()).await.unwrap();
        let r2 = provider.generate(&[], opts).await.unwrap();
        assert_eq!(r1.content, r2.content);
    }

    #[tokio::test]
    async fn scripted_responses_consume_in_order() {
        let provider = MockProvider::with_script(
            "mock",
            vec!["first turn".into(), "final turn".into()],
        );
        let opts = GenerateOptions::new(uuid::Uuid::nil());
        let r1 = provider.generate(&[], opts.clone()).await.unwrap();
        assert_eq!(r1.content, "first turn");
        let r2 = provider.generate(&[], opts.clone()).await.unwrap();
        assert_eq!(r2.content, "final turn");
        let r3 = provider.generate(&[], opts).await.unwrap();
        assert_eq!(r3.content, "final turn");
    }
}
