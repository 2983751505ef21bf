//! Provider error mapping.
//!
//! The error type itself lives in `critic-core` so the engine can classify
//! failures; this module maps HTTP outcomes onto it.

pub use critic_core::error::ProviderError;

/// Default back-off hint when a 429 carries no `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Map a failed `send()` onto a provider error.
pub(crate) fn transport_error(e: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

/// Map a non-success HTTP status onto a provider error.
pub(crate) fn status_error(
    status: u16,
    retry_after: Option<&str>,
    model: &str,
    message: String,
) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_ms: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
                * 1000,
        },
        401 | 403 => ProviderError::AuthenticationFailed(message),
        404 => ProviderError::ModelNotFound(model.to_string()),
        _ => ProviderError::ApiError { status, message },
    }
}
