//! Mock provider for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use critic_core::traits::{CompletionRequest, CompletionResponse, LlmProvider, TokenUsage};

use crate::error::ProviderError;

/// What the mock does when a rule matches.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text as the completion.
    Text(String),
    /// Fail with a network error carrying this message.
    Fail(String),
    /// Never answer.
    Hang,
}

#[derive(Debug, Clone)]
struct MockRule {
    needle: String,
    reply: MockReply,
    delay: Duration,
}

/// A mock LLM provider for exercising the panel engine without real API calls.
///
/// Rules are checked in insertion order; the first whose needle occurs in the
/// prompt decides the reply. Unmatched prompts get the default reply.
pub struct MockProvider {
    rules: Vec<MockRule>,
    default_reply: MockReply,
    call_count: AtomicU32,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl MockProvider {
    /// A mock that answers every prompt with `{}`.
    pub fn new() -> Self {
        Self::with_fixed_response("{}")
    }

    /// A mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            rules: Vec::new(),
            default_reply: MockReply::Text(response.to_string()),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Reply with `response` when the prompt contains `needle`.
    pub fn on(self, needle: &str, response: &str) -> Self {
        self.rule(needle, MockReply::Text(response.to_string()), Duration::ZERO)
    }

    /// Reply with `reply` after `delay` when the prompt contains `needle`.
    pub fn rule(mut self, needle: &str, reply: MockReply, delay: Duration) -> Self {
        self.rules.push(MockRule {
            needle: needle.to_string(),
            reply,
            delay,
        });
        self
    }

    /// Get the number of calls made to this provider.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this provider.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());

        let (reply, delay) = self
            .rules
            .iter()
            .find(|rule| request.prompt.contains(rule.needle.as_str()))
            .map(|rule| (rule.reply.clone(), rule.delay))
            .unwrap_or_else(|| (self.default_reply.clone(), Duration::ZERO));

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let content = match reply {
            MockReply::Text(text) => text,
            MockReply::Fail(message) => return Err(ProviderError::NetworkError(message).into()),
            MockReply::Hang => std::future::pending::<String>().await,
        };

        let prompt_tokens = (request.prompt.len() / 4) as u32; // Rough estimate
        let completion_tokens = (content.len() / 4) as u32;

        Ok(CompletionResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: delay.as_millis() as u64,
        })
    }
}
