use serde_json::Value;

use crate::genai;

/// The two translation passes: source → Vietnamese, then Vietnamese → English.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToVietnamese,
    ToEnglish,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Self::ToVietnamese => "translate_vi",
            Self::ToEnglish => "translate_en",
        }
    }

    pub fn prompt(self, text: &str) -> String {
        let instructions = match self {
            Self::ToVietnamese => {
                "The passage below was produced by an outdated machine translator. \
You are an expert novelist: rewrite it as fluent Vietnamese prose, \
keeping the setting and the content unchanged and preserving the markup exactly."
            }
            Self::ToEnglish => {
                "The passage below was produced by an outdated machine translator. \
You are an expert Vietnamese-to-English translator and novelist: retell it as an English \
novel passage at CEFR A2 level, keeping the setting and the content unchanged \
and preserving the markup exactly."
            }
        };
        format!("{instructions}\n\n{text}")
    }
}

pub fn text_request(prompt: &str) -> Value {
    serde_json::json!({
        "contents": [ { "parts": [ { "text": prompt } ] } ],
    })
}

/// The translated text, or `input` unchanged when the response carries none.
pub fn text_or_input(response: &Value, input: &str, direction: Direction) -> String {
    match genai::first_part_text(response) {
        Some(text) if !text.trim().is_empty() => text.to_owned(),
        _ => {
            tracing::warn!(
                direction = direction.label(),
                "translation response has no text; keeping input"
            );
            input.to_owned()
        }
    }
}
