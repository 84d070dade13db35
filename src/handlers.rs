use thiserror::Error;
use tracing::{error, warn};

use crate::platform::IncomingMessage;
use crate::translator::{Translate, TranslationRequest};

pub const USAGE_HINT: &str =
    "Send the text and the target language separated by '>', for example: hello>es";
pub const TRANSLATION_FAILED: &str = "Sorry, the translation failed. Please try again later.";

const DELIMITER: char = '>';

#[derive(Debug, Error, PartialEq)]
pub enum FormatError {
    #[error("expected exactly one '>' separating text and language, found {0}")]
    Delimiters(usize),
    #[error("text to translate is empty")]
    EmptyText,
    #[error("target language is empty")]
    EmptyLanguage,
}

/// Reply to `/start`.
pub fn start(_msg: &IncomingMessage) -> String {
    "Hi!".to_string()
}

/// Reply to `/help`.
pub fn help(_msg: &IncomingMessage) -> String {
    "Help!".to_string()
}

/// Split `text>lang` into its two halves.
///
/// The halves are returned as written; only emptiness is checked, so
/// `"hello >es"` translates `"hello "`.
pub fn parse_translation_request(input: &str) -> Result<TranslationRequest, FormatError> {
    let parts: Vec<&str> = input.split(DELIMITER).collect();
    let [text, target_language] = parts.as_slice() else {
        return Err(FormatError::Delimiters(parts.len().saturating_sub(1)));
    };

    if text.trim().is_empty() {
        return Err(FormatError::EmptyText);
    }
    if target_language.trim().is_empty() {
        return Err(FormatError::EmptyLanguage);
    }

    Ok(TranslationRequest {
        text: text.to_string(),
        target_language: target_language.to_string(),
    })
}

/// Translate a plain text message, always producing a reply for the user.
pub async fn translate_reply(translator: &dyn Translate, msg: &IncomingMessage) -> String {
    let request = match parse_translation_request(&msg.text) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected message from chat {}: {}", msg.chat_id, e);
            return USAGE_HINT.to_string();
        }
    };

    match translator.translate(&request).await {
        Ok(translated) => translated,
        Err(e) => {
            error!(
                "Translation for chat {} failed: {:#}",
                msg.chat_id,
                anyhow::Error::new(e)
            );
            TRANSLATION_FAILED.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_reply_fixed_text() {
        let msg = IncomingMessage::test("/start whatever");
        assert_eq!(start(&msg), "Hi!");
        assert_eq!(help(&msg), "Help!");
    }

    #[test]
    fn test_parse_splits_exactly() {
        for (text, lang) in [("hello", "es"), ("hello ", "es"), ("good morning!", "pt-br")] {
            let parsed = parse_translation_request(&format!("{text}>{lang}")).unwrap();
            assert_eq!(parsed.text, text);
            assert_eq!(parsed.target_language, lang);
        }
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert_eq!(
            parse_translation_request("hello"),
            Err(FormatError::Delimiters(0))
        );
        assert_eq!(
            parse_translation_request("a>b>c"),
            Err(FormatError::Delimiters(2))
        );
        assert_eq!(
            parse_translation_request("  >es"),
            Err(FormatError::EmptyText)
        );
        assert_eq!(
            parse_translation_request("hello> "),
            Err(FormatError::EmptyLanguage)
        );
    }
}
