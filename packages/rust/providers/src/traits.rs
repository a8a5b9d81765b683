//! Provider seams. The pipeline only ever talks to these traits; HTTP clients
//! and test fakes implement them.

use async_trait::async_trait;
use leadqual_shared::{CompanyData, ProfileData, ProviderError};
use serde::{Deserialize, Serialize};

/// Result alias for provider calls. Failures are non-fatal records.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Token counts reported by a model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A model response: raw text plus what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    /// Model that actually served the request.
    pub model: String,
}

/// Person profile lookup, keyed by LinkedIn profile URL.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn lookup_profile(&self, linkedin_url: &str) -> ProviderResult<ProfileData>;
}

/// Company lookup, keyed by website domain.
#[async_trait]
pub trait CompanyProvider: Send + Sync {
    async fn lookup_company(&self, domain: &str) -> ProviderResult<CompanyData>;
}

/// Free-text market research.
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    async fn research(&self, query: &str) -> ProviderResult<Completion>;
}

/// A chat model asked for a single JSON object.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send `system` + `prompt`; the reply text is expected to be one JSON object.
    async fn complete(&self, system: &str, prompt: &str) -> ProviderResult<Completion>;

    /// Model name used for cost attribution when the response does not report one.
    fn model_name(&self) -> &str;
}
