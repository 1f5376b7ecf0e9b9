//! LanguageTool grammar checker adapter.
//!
//! `POST {endpoint}/check` with a form body. The service answers with a list
//! of matches; the corrected text applies the first suggested replacement of
//! each match. Match offsets count UTF-16 code units.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{
    AdapterError, AdapterResponse, ProviderAdapter, base_url, classify_status, require_credential,
    retry_after, transport_error,
};
use crate::core::credentials::Secret;
use crate::core::models::{AiRequest, Capability};
use crate::core::provider::{AuthScheme, ProviderDescriptor};

#[derive(Debug, Deserialize)]
struct CheckResponse {
    matches: Vec<Match>,
}

#[derive(Debug, Deserialize)]
struct Match {
    offset: usize,
    length: usize,
    #[serde(default)]
    replacements: Vec<Replacement>,
}

#[derive(Debug, Deserialize)]
struct Replacement {
    value: String,
}

/// Adapter for LanguageTool-compatible servers.
#[derive(Debug, Clone)]
pub struct LanguageToolAdapter {
    client: Client,
}

impl LanguageToolAdapter {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProviderAdapter for LanguageToolAdapter {
    async fn invoke(
        &self,
        provider: &ProviderDescriptor,
        credential: Option<&Secret>,
        request: &AiRequest,
    ) -> Result<AdapterResponse, AdapterError> {
        if request.capability != Capability::Correction {
            return Err(AdapterError::Unsupported {
                capability: request.capability,
            });
        }

        let url = format!("{}/check", base_url(provider)?);
        let language = request.options.language.as_deref().unwrap_or("auto");
        let mut form: Vec<(&str, &str)> = vec![("text", request.content.as_str()), ("language", language)];

        // The public free tier needs no key; premium accounts send username + apiKey.
        let credential = if provider.auth == AuthScheme::FormField {
            credential
        } else {
            require_credential(provider, credential)?
        };
        if let Some(secret) = credential {
            if let Some(username) = provider.username.as_deref() {
                form.push(("username", username));
            }
            form.push(("apiKey", secret.expose()));
        }

        let response = self
            .client
            .post(&url)
            .timeout(provider.timeout)
            .form(&form)
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
        let parsed: CheckResponse = serde_json::from_str(&text)
            .map_err(|e| AdapterError::malformed(format!("invalid JSON: {e}")))?;

        Ok(AdapterResponse {
            payload: apply_matches(&request.content, &parsed.matches)?,
            units: request.content.chars().count() as u64,
        })
    }
}

/// Apply the first replacement of every non-overlapping match.
fn apply_matches(text: &str, matches: &[Match]) -> Result<String, AdapterError> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut ordered: Vec<&Match> = matches.iter().collect();
    ordered.sort_by_key(|m| m.offset);

    let mut out: Vec<u16> = Vec::with_capacity(units.len());
    let mut cursor = 0;
    for m in ordered {
        let Some(replacement) = m.replacements.first() else {
            continue;
        };
        let end = m.offset.saturating_add(m.length);
        if end > units.len() {
            return Err(AdapterError::malformed(format!(
                "match at {}..{end} is outside the {}-unit text",
                m.offset,
                units.len()
            )));
        }
        if m.offset < cursor {
            continue;
        }
        out.extend_from_slice(&units[cursor..m.offset]);
        out.extend(replacement.value.encode_utf16());
        cursor = end;
    }
    out.extend_from_slice(&units[cursor..]);

    String::from_utf16(&out).map_err(|_| AdapterError::malformed("match splits a character"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(offset: usize, length: usize, value: &str) -> Match {
        Match {
            offset,
            length,
            replacements: vec![Replacement {
                value: value.to_string(),
            }],
        }
    }

    #[test]
    fn applies_first_replacement_of_each_match() {
        let text = "i has a cat";
        let matches = vec![m(2, 3, "have"), m(0, 1, "I")];
        assert_eq!(apply_matches(text, &matches).unwrap(), "I have a cat");
    }

    #[test]
    fn skips_overlaps_and_empty_suggestions() {
        let text = "teh cat";
        let matches = vec![
            m(0, 3, "the"),
            m(1, 2, "XX"),
            Match {
                offset: 4,
                length: 3,
                replacements: vec![],
            },
        ];
        assert_eq!(apply_matches(text, &matches).unwrap(), "the cat");
    }

    #[test]
    fn offsets_are_utf16() {
        // '😀' is two UTF-16 units.
        let text = "😀 teh";
        assert_eq!(apply_matches(text, &[m(3, 3, "the")]).unwrap(), "😀 the");
    }

    #[test]
    fn out_of_range_match_is_malformed() {
        assert!(apply_matches("abc", &[m(2, 5, "x")]).is_err());
    }
}
