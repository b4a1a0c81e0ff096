//! Summary acceptance and normalization.

use crate::config::PipelineSettings;

const SENTENCE_TERMINATORS: &[&str] = &[". ", "! ", "? "];

/// Quality bar and shape applied to every summary the backend returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryPolicy {
    pub min_chars: usize,
    pub max_words: usize,
}

impl Default for SummaryPolicy {
    fn default() -> Self {
        Self::from_settings(&PipelineSettings::default())
    }
}

impl SummaryPolicy {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            min_chars: settings.min_summary_chars,
            max_words: settings.max_summary_words,
        }
    }

    /// Normalized summary if `raw` passes the quality check, `None` otherwise.
    pub fn accept(&self, raw: &str) -> Option<String> {
        let candidate = raw.trim();
        if candidate.chars().count() < self.min_chars || !has_cased_letters(candidate) {
            return None;
        }
        let normalized = self.normalize(candidate);
        has_cased_letters(&normalized).then_some(normalized)
    }

    /// Trim wrapping quotes, collapse whitespace, cut at the first sentence
    /// break, cap the word count and end with a period. Idempotent.
    pub fn normalize(&self, summary: &str) -> String {
        let mut text = summary
            .trim_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'')
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        if let Some(cut) = SENTENCE_TERMINATORS
            .iter()
            .filter_map(|sep| text.find(sep))
            .min()
        {
            text.truncate(cut);
            let end = text.trim_end().len();
            text.truncate(end);
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() > self.max_words {
            text = words[..self.max_words].join(" ");
        }

        if !text.ends_with('.') {
            text.push('.');
        }
        text
    }
}

/// False for strings whose lower and upper case forms coincide (digits,
/// punctuation, symbols only).
fn has_cased_letters(text: &str) -> bool {
    text.to_lowercase() != text.to_uppercase()
}
