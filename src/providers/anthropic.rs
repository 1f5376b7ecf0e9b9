//! Anthropic messages API adapter.

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

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Adapter for Anthropic-style providers.
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    client: Client,
}

impl AnthropicAdapter {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn invoke(
        &self,
        provider: &ProviderDescriptor,
        credential: Option<&Secret>,
        request: &AiRequest,
    ) -> Result<AdapterResponse, AdapterError> {
        let credential = require_credential(provider, credential)?;
        let url = format!("{}/messages", base_url(provider)?);
        let system = prompt::system_prompt(request);
        let body = MessagesRequest {
            model: provider.model.as_deref().unwrap_or(DEFAULT_MODEL),
            max_tokens: prompt::max_tokens(request),
            system: &system,
            messages: vec![Message {
                role: "user",
                content: &request.content,
            }],
            temperature: request.options.temperature,
        };

        let response = apply_auth(self.client.post(&url), provider.auth, credential)
            .header("anthropic-version", API_VERSION)
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
    let parsed: MessagesResponse = serde_json::from_str(text)
        .map_err(|e| AdapterError::malformed(format!("invalid JSON: {e}")))?;
    let payload = parsed
        .content
        .into_iter()
        .find(|b| b.kind == "text")
        .and_then(|b| b.text)
        .ok_or_else(|| AdapterError::malformed("no text content block"))?;
    Ok(AdapterResponse {
        payload: payload.trim().to_string(),
        units: parsed
            .usage
            .map_or(0, |u| u.input_tokens + u.output_tokens),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_text_block() {
        let body = r#"{"content":[{"type":"tool_use","id":"x"},{"type":"text","text":"Bonjour"}],"usage":{"input_tokens":10,"output_tokens":5}}"#;
        let response = parse_response(body).unwrap();
        assert_eq!(response.payload, "Bonjour");
        assert_eq!(response.units, 15);
    }

    #[test]
    fn missing_text_is_malformed() {
        assert!(matches!(
            parse_response(r#"{"content":[]}"#),
            Err(AdapterError::Malformed { .. })
        ));
    }
}
