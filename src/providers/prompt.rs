//! Prompt assembly for chat-style providers.

use crate::core::models::{AiRequest, Capability};

/// Default `max_tokens` for providers that require one.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// System instruction for a request.
#[must_use]
pub fn system_prompt(request: &AiRequest) -> String {
    let language = request
        .options
        .language
        .as_deref()
        .unwrap_or("the same language as the input");
    let mut prompt = match request.capability {
        Capability::Correction => format!(
            "Correct the grammar and spelling of the user's text, written in {language}. \
             Reply with the corrected text only."
        ),
        Capability::Generation => {
            format!("You are a language tutor. Write your answer in {language}.")
        }
        Capability::Chat => format!(
            "You are a friendly language tutor having a conversation in {language}. \
             Keep replies short and gently point out mistakes."
        ),
    };
    for (key, value) in &request.options.extra {
        prompt.push_str(&format!("\n{key}: {value}"));
    }
    prompt
}

/// `max_tokens` to send.
#[must_use]
pub fn max_tokens(request: &AiRequest) -> u32 {
    request.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::RequestOptions;
    use std::collections::BTreeMap;

    #[test]
    fn includes_language_and_extras() {
        let request = AiRequest::new(Capability::Generation, "write a poem").with_options(RequestOptions {
            language: Some("fr".to_string()),
            extra: BTreeMap::from([("level".to_string(), "B1".to_string())]),
            ..Default::default()
        });
        let prompt = system_prompt(&request);
        assert!(prompt.contains("in fr"));
        assert!(prompt.ends_with("level: B1"));
        assert_eq!(max_tokens(&request), DEFAULT_MAX_TOKENS);
    }
}
