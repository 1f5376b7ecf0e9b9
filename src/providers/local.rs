//! In-process rule-based correction.
//!
//! Makes no network call and never fails for correction requests, which makes
//! it the natural last-resort fallback. The rules are deliberately small:
//! whitespace cleanup, no space before punctuation, sentence capitalization,
//! and a capital standalone "i".

use async_trait::async_trait;

use super::{AdapterError, AdapterResponse, ProviderAdapter};
use crate::core::credentials::Secret;
use crate::core::models::{AiRequest, Capability};
use crate::core::provider::ProviderDescriptor;

/// The local fallback adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalAdapter;

#[async_trait]
impl ProviderAdapter for LocalAdapter {
    async fn invoke(
        &self,
        _provider: &ProviderDescriptor,
        _credential: Option<&Secret>,
        request: &AiRequest,
    ) -> Result<AdapterResponse, AdapterError> {
        if request.capability != Capability::Correction {
            return Err(AdapterError::Unsupported {
                capability: request.capability,
            });
        }
        Ok(AdapterResponse {
            payload: correct(&request.content),
            units: request.content.chars().count() as u64,
        })
    }
}

/// Apply the cleanup rules.
#[must_use]
pub fn correct(text: &str) -> String {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| capitalize_pronoun(w).unwrap_or_else(|| w.to_string()))
        .collect();

    let mut joined = String::with_capacity(text.len());
    for word in &words {
        let is_punctuation = word.chars().all(|c| matches!(c, '.' | ',' | '!' | '?' | ';' | ':'));
        if !joined.is_empty() && !is_punctuation {
            joined.push(' ');
        }
        joined.push_str(word);
    }

    capitalize_sentences(&joined)
}

/// `i`, `i'm`, `i've`, `i'll`, `i'd` (with trailing punctuation) become capitalized.
fn capitalize_pronoun(word: &str) -> Option<String> {
    let core = word.trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '\'');
    let is_pronoun = core == "i"
        || ["i'm", "i've", "i'll", "i'd"]
            .iter()
            .any(|form| core.eq_ignore_ascii_case(form) && core.starts_with('i'));
    is_pronoun.then(|| format!("I{}", &word[1..]))
}

fn capitalize_sentences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_start = true;
    for c in text.chars() {
        if at_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            at_start = false;
            continue;
        }
        if matches!(c, '.' | '!' | '?') {
            at_start = true;
        } else if !c.is_whitespace() && !matches!(c, '"' | '\'' | '(' | '«') {
            at_start = false;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::ProviderKind;

    #[test]
    fn cleans_whitespace_and_capitalizes() {
        assert_eq!(
            correct("  hello   world .  i think i'm late!see you "),
            "Hello world. I think I'm late!See you"
        );
    }

    #[test]
    fn leaves_words_containing_i_alone() {
        assert_eq!(correct("it is in italy"), "It is in italy");
    }

    #[test]
    fn pronoun_with_punctuation() {
        assert_eq!(correct("was it i?"), "Was it I?");
    }

    #[tokio::test]
    async fn only_serves_correction() {
        let provider = ProviderDescriptor::new("local", ProviderKind::Local);
        let ok = LocalAdapter
            .invoke(&provider, None, &AiRequest::new(Capability::Correction, "i am"))
            .await
            .unwrap();
        assert_eq!(ok.payload, "I am");
        assert_eq!(ok.units, 4);

        let err = LocalAdapter
            .invoke(&provider, None, &AiRequest::new(Capability::Chat, "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported { .. }));
    }
}
