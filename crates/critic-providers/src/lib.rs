//! critic-providers — LLM provider integrations.
//!
//! Implements the `LlmProvider` trait for Gemini, Ollama and a scriptable
//! mock, plus the config file that selects between them.

pub mod config;
pub mod error;
pub mod gemini;
pub mod mock;
pub mod ollama;

pub use config::{create_provider, load_config, load_config_from, CriticConfig, ProviderConfig};
pub use error::ProviderError;
pub use mock::{MockProvider, MockReply};
