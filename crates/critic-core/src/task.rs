//! A single persona's evaluation: prompt, one model call, extraction.

use tracing::instrument;

use crate::engine::PanelEngineConfig;
use crate::error::{ProviderError, TaskError};
use crate::extract::extract_or_empty;
use crate::model::{Persona, RubricCatalog};
use crate::prompt::build_prompt;
use crate::traits::{CompletionRequest, LlmProvider, DEFAULT_SYSTEM_PROMPT};
use crate::votes::Vote;

/// Everything a task reads. All of it is shared and read-only.
pub struct EvaluationTask<'a> {
    provider: &'a dyn LlmProvider,
    catalog: &'a RubricCatalog,
    config: &'a PanelEngineConfig,
}

impl<'a> EvaluationTask<'a> {
    pub fn new(
        provider: &'a dyn LlmProvider,
        catalog: &'a RubricCatalog,
        config: &'a PanelEngineConfig,
    ) -> Self {
        Self {
            provider,
            catalog,
            config,
        }
    }

    /// Run one model round trip for `persona` and package the vote.
    ///
    /// A response that cannot be parsed still yields a vote (empty, marked
    /// as an extraction failure). Only a failed or timed-out model call is an
    /// error. Nothing is retried.
    #[instrument(skip(self, persona), fields(persona = %persona.id, provider = self.provider.name()))]
    pub async fn run(&self, persona: &Persona, ordinal: usize) -> Result<Vote, TaskError> {
        let prompt = build_prompt(persona, self.catalog);
        tracing::debug!(chars = prompt.len(), "rendered prompt");

        let request = CompletionRequest {
            model: self.config.model.clone(),
            prompt,
            system_prompt: Some(
                self.config
                    .system_prompt_override
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let timeout = self.config.request_timeout;
        let response = match tokio::time::timeout(timeout, self.provider.complete(&request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(TaskError::Invocation {
                    persona: persona.id.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(TaskError::Invocation {
                    persona: persona.id.clone(),
                    source: ProviderError::Timeout(timeout.as_secs()).into(),
                })
            }
        };

        let (payload, extraction_error) = extract_or_empty(&response.content, self.catalog);
        if extraction_error.is_some() {
            tracing::debug!(response = %response.content, "unparseable response");
        }

        let mut vote = Vote::from_payload(&persona.id, ordinal, payload, extraction_error);
        vote.model = Some(response.model);
        vote.latency_ms = response.latency_ms;
        vote.token_usage = Some(response.token_usage);

        tracing::info!(
            rows = vote.ratings.rows.len(),
            complete = vote.is_complete(),
            latency_ms = vote.latency_ms,
            "persona evaluated"
        );

        Ok(vote)
    }
}
