//! OpenAI-compatible chat completions adapter.
//!
//! `POST {endpoint}/chat/completions` with `Authorization: Bearer`. Works with
//! any server that speaks the same shape.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    AdapterError, AdapterResponse, ProviderAdapter, apply_auth, base_url, classify_status,
    prompt, require_credential, retry_after, transport_error,
};
use crate::core::credentials::Secret;
use crate::core::models::AiRequest;
use crate::core::provider::ProviderDescriptor;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

/// Adapter for OpenAI-style providers.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    client: Client,
}

impl OpenAiAdapter {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn invoke(
        &self,
        provider: &ProviderDescriptor,
        credential: Option<&Secret>,
        request: &AiRequest,
    ) -> Result<AdapterResponse, AdapterError> {
        let credential = require_credential(provider, credential)?;
        let url = format!("{}/chat/completions", base_url(provider)?);
        let system = prompt::system_prompt(request);
        let body = ChatRequest {
            model: provider.model.as_deref().unwrap_or(DEFAULT_MODEL),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.content,
                },
            ],
            max_tokens: request.options.max_tokens,
            temperature: request.options.temperature,
        };

        let response = apply_auth(self.client.post(&url), provider.auth, credential)
            .timeout(provider.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e, provider.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let wait = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text, wait));
        }

        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&e, provider.timeout))?;
        parse_response(&text)
    }
}

fn parse_response(text: &str) -> Result<AdapterResponse, AdapterError> {
    let parsed: ChatResponse = serde_json::from_str(text)
        .map_err(|e| AdapterError::malformed(format!("invalid JSON: {e}")))?;
    let payload = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| AdapterError::malformed("no choices[0].message.content"))?;
    Ok(AdapterResponse {
        payload: payload.trim().to_string(),
        units: parsed.usage.map_or(0, |u| u.total_tokens),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":" I have a cat. "}}],"usage":{"total_tokens":42}}"#;
        let response = parse_response(body).unwrap();
        assert_eq!(response.payload, "I have a cat.");
        assert_eq!(response.units, 42);
    }

    #[test]
    fn empty_choices_is_malformed() {
        let err = parse_response(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, AdapterError::Malformed { .. }));
        let err = parse_response("<html>").unwrap_err();
        assert!(matches!(err, AdapterError::Malformed { .. }));
    }
}
