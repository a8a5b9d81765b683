//! OpenAI-compatible chat model client used by the evaluation, pain-point,
//! offer and campaign stages. Every request asks for a JSON object reply.

use async_trait::async_trait;
use leadqual_shared::{LlmConfig, Result};
use reqwest::Client;
use tracing::debug;

use crate::http::{
    ChatMessage, ChatRequest, DEFAULT_TIMEOUT_SECS, ResponseFormat, build_client, endpoint,
    post_chat,
};
use crate::traits::{Completion, LanguageModel, ProviderResult};

const PROVIDER: &str = "llm";

/// Chat completions client.
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT_SECS)?,
            url: endpoint(&config.base_url, "chat/completions"),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, system: &str, prompt: &str) -> ProviderResult<Completion> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: Some(self.temperature),
            response_format: Some(ResponseFormat::json_object()),
        };

        let completion = post_chat(&self.client, PROVIDER, &self.url, &self.api_key, &request).await?;
        debug!(
            model = %completion.model,
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            "llm completion"
        );
        Ok(completion)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: format!("{}/v1", server.uri()),
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn completes_with_json_response_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "response_format": { "type": "json_object" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{ "message": { "role": "assistant", "content": "{\"summary\":\"ok\"}" } }],
                "usage": { "prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let model = OpenAiChatModel::new(&config(&server), "sk-test".into()).expect("client");
        let completion = model.complete("system", "prompt").await.expect("completion");

        assert_eq!(completion.text, "{\"summary\":\"ok\"}");
        assert_eq!(completion.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(completion.usage.total(), 150);
    }

    #[tokio::test]
    async fn http_error_becomes_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let model = OpenAiChatModel::new(&config(&server), "sk-test".into()).expect("client");
        let err = model.complete("s", "p").await.expect_err("must fail");
        assert_eq!(err.provider, "llm");
        assert!(err.message.contains("429"));
        assert!(err.message.contains("rate limited"));
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let model = OpenAiChatModel::new(&config(&server), "sk-test".into()).expect("client");
        let err = model.complete("s", "p").await.expect_err("must fail");
        assert!(err.message.contains("no choices"));
    }
}
