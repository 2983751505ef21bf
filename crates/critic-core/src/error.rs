//! Error types for the panel engine.
//!
//! [`ProviderError`] is defined here rather than in `critic-providers` so the
//! engine can downcast and classify invocation failures without string
//! matching.

use thiserror::Error;

/// Errors that can occur when interacting with an LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit or quota response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Short machine-readable label recorded on failed votes.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::AuthenticationFailed(_) => "authentication",
            ProviderError::ModelNotFound(_) => "model_not_found",
            ProviderError::ApiError { .. } => "api",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::NetworkError(_) => "network",
        }
    }
}

/// Why a model response could not be turned into a vote.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// The response contains no JSON object at all.
    #[error("no JSON object found in response")]
    NoJsonObject,

    /// The text after the first `{` is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// A required top-level field is missing or has the wrong type.
    #[error("response does not match the output contract: {0}")]
    Schema(String),

    /// A rating row names a subject outside the catalog.
    #[error("rating for unknown subject '{0}'")]
    UnknownSubject(String),

    /// Two rating rows name the same subject.
    #[error("subject '{0}' rated more than once")]
    DuplicateSubject(String),

    /// A rating row has no subject field.
    #[error("rating row {row} has no subject")]
    MissingSubject { row: usize },

    /// A rating row omits a criterion score.
    #[error("rating for '{subject}' is missing criterion '{criterion}'")]
    MissingScore { subject: String, criterion: String },

    /// A rating row carries a field that is neither the subject nor a criterion.
    #[error("rating for '{subject}' has unexpected field '{field}'")]
    UnexpectedField { subject: String, field: String },

    /// A score is not an integer.
    #[error("score for '{subject}' / '{criterion}' is not an integer")]
    NonIntegerScore { subject: String, criterion: String },

    /// A score falls outside the rubric scale.
    #[error("score {score} for '{subject}' / '{criterion}' is outside 1..=5")]
    ScoreOutOfRange {
        subject: String,
        criterion: String,
        score: i64,
    },
}

/// A task-level failure: the persona's model call never produced text.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The provider call failed or timed out.
    #[error("model invocation failed for persona '{persona}': {source:#}")]
    Invocation {
        persona: String,
        #[source]
        source: anyhow::Error,
    },
}

impl TaskError {
    /// Classify the failure for the vote record.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Invocation { source, .. } => source
                .downcast_ref::<ProviderError>()
                .map(ProviderError::kind)
                .unwrap_or("unknown"),
        }
    }

    pub fn persona(&self) -> &str {
        match self {
            TaskError::Invocation { persona, .. } => persona,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_error_classifies_provider_errors() {
        let err = TaskError::Invocation {
            persona: "boomer".into(),
            source: ProviderError::Timeout(30).into(),
        };
        assert_eq!(err.kind(), "timeout");
        assert_eq!(err.persona(), "boomer");
        assert!(err.to_string().contains("timed out after 30s"));
    }

    #[test]
    fn task_error_unknown_source() {
        let err = TaskError::Invocation {
            persona: "genz".into(),
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.kind(), "unknown");
    }
}
