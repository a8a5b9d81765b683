//! Shared HTTP plumbing: client construction, error mapping, and the
//! OpenAI-compatible chat completions wire format used by both the LLM and
//! the research provider.

use std::time::Duration;

use leadqual_shared::{LeadQualError, ProviderError, Result};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::traits::{Completion, ProviderResult, TokenUsage};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("leadqual/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Longest error body excerpt kept in a provider error.
const MAX_ERROR_BODY: usize = 300;

/// Build a reqwest client with the provider defaults.
pub fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LeadQualError::config(format!("failed to build HTTP client: {e}")))
}

/// Join a base URL and an endpoint path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turn a non-success response into a provider error carrying a body excerpt.
pub(crate) async fn check_status(provider: &str, response: Response) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    Err(ProviderError::new(
        provider,
        format!("HTTP {status}: {}", excerpt.trim()),
    ))
}

// ---------------------------------------------------------------------------
// Chat completions wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            kind: "json_object",
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// POST a chat request and return the first choice as a [`Completion`].
pub(crate) async fn post_chat(
    client: &Client,
    provider: &str,
    url: &str,
    api_key: &str,
    request: &ChatRequest<'_>,
) -> ProviderResult<Completion> {
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(request)
        .send()
        .await
        .map_err(|e| ProviderError::new(provider, format!("{url}: {e}")))?;

    let response = check_status(provider, response).await?;

    let body: ChatResponse = response
        .json()
        .await
        .map_err(|e| ProviderError::new(provider, format!("malformed response body: {e}")))?;

    let text = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ProviderError::new(provider, "response contained no choices"))?;

    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(Completion {
        text,
        usage,
        model: body.model.unwrap_or_else(|| request.model.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_cleanly() {
        assert_eq!(
            endpoint("https://api.example.com/v1/", "/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(endpoint("http://localhost:9", "x"), "http://localhost:9/x");
    }

    #[test]
    fn chat_request_serializes_response_format() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: Some(0.2),
            response_format: Some(ResponseFormat::json_object()),
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "user");

        let request = ChatRequest {
            model: "sonar",
            messages: vec![],
            temperature: None,
            response_format: None,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert!(json.get("response_format").is_none());
        assert!(json.get("temperature").is_none());
    }
}
