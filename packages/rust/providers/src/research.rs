//! Market research over an online chat model (Perplexity-style API).

use async_trait::async_trait;
use leadqual_shared::{ProviderConfig, ProviderError, Result};
use reqwest::Client;

use crate::http::{ChatMessage, ChatRequest, DEFAULT_TIMEOUT_SECS, build_client, endpoint, post_chat};
use crate::traits::{Completion, ProviderResult, ResearchProvider};

const PROVIDER: &str = "research";
const DEFAULT_MODEL: &str = "sonar";

const SYSTEM_PROMPT: &str = "You are a B2B market research assistant. Answer with concise, \
factual findings about the company or industry asked about. If nothing is known, reply with \
an empty answer.";

#[derive(Debug, Clone)]
pub struct HttpResearchProvider {
    client: Client,
    url: String,
    api_key: String,
    model: String,
}

impl HttpResearchProvider {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT_SECS)?,
            url: endpoint(&config.base_url, "chat/completions"),
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl ResearchProvider for HttpResearchProvider {
    async fn research(&self, query: &str) -> ProviderResult<Completion> {
        if query.trim().is_empty() {
            return Err(ProviderError::new(PROVIDER, "empty research query"));
        }
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: query,
                },
            ],
            temperature: None,
            response_format: None,
        };
        post_chat(&self.client, PROVIDER, &self.url, &self.api_key, &request).await
    }
}
