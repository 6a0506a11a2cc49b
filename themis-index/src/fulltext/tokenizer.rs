//! Text normalization and tokenization for full-text indexing (spec.md
//! §4.5.6). Grounded in `original_source/src/index/secondary_index.cpp`'s
//! `tokenize` overloads and `utils::Normalizer::normalizeUmlauts`.

use super::stemmer::{self, Language};
use super::stopwords;

/// Per-column full-text indexing behavior.
#[derive(Debug, Clone)]
pub struct FulltextConfig {
    pub normalize_umlauts: bool,
    pub stopwords_enabled: bool,
    pub language: String,
    pub custom_stopwords: Vec<String>,
    pub stemming_enabled: bool,
}

impl Default for FulltextConfig {
    fn default() -> Self {
        Self {
            normalize_umlauts: true,
            stopwords_enabled: true,
            language: "en".to_string(),
            custom_stopwords: Vec::new(),
            stemming_enabled: true,
        }
    }
}

/// Replaces German umlauts and eszett with their ASCII transliterations.
#[must_use]
pub fn normalize_umlauts(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'ä' => "a".to_string(),
            'ö' => "o".to_string(),
            'ü' => "u".to_string(),
            'Ä' => "A".to_string(),
            'Ö' => "O".to_string(),
            'Ü' => "U".to_string(),
            'ß' => "ss".to_string(),
            other => other.to_string(),
        })
        .collect()
}

/// Lowercases and splits on ASCII whitespace/punctuation, dropping empty
/// tokens. Does not normalize umlauts, filter stopwords, or stem.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    lower
        .split(|c: char| c.is_ascii_whitespace() || c.is_ascii_punctuation())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Full pipeline: umlaut normalization (if enabled) → base tokenize →
/// stopword filter (if enabled) → stemming (if enabled), in that order.
#[must_use]
pub fn tokenize_with_config(text: &str, config: &FulltextConfig) -> Vec<String> {
    let normalized = if config.normalize_umlauts {
        normalize_umlauts(text)
    } else {
        text.to_string()
    };

    let mut tokens = tokenize(&normalized);

    if config.stopwords_enabled {
        let stop = stopwords::merge(stopwords::defaults(&config.language), &config.custom_stopwords);
        tokens.retain(|t| !stop.contains(t));
    }

    if config.stemming_enabled {
        let lang = Language::parse(&config.language);
        tokens = tokens.into_iter().map(|t| stemmer::stem(&t, lang)).collect();
    }

    tokens
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn umlaut_normalization_transliterates_to_ascii() {
        assert_eq!(normalize_umlauts("Müller Straße"), "Muller Strasse");
    }

    #[test]
    fn base_tokenize_splits_on_punctuation_and_lowercases() {
        assert_eq!(tokenize("The quick, brown fox!"), vec!["the", "quick", "brown", "fox"]);
    }

    #[test]
    fn config_pipeline_strips_stopwords_and_stems() {
        let config = FulltextConfig {
            normalize_umlauts: true,
            stopwords_enabled: true,
            language: "en".to_string(),
            custom_stopwords: Vec::new(),
            stemming_enabled: true,
        };
        let tokens = tokenize_with_config("Running with the cats", &config);
        assert!(tokens.contains(&"run".to_string()));
        assert!(tokens.contains(&"cat".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
    }

    #[test]
    fn config_pipeline_can_disable_stemming_and_stopwords() {
        let config = FulltextConfig {
            normalize_umlauts: false,
            stopwords_enabled: false,
            language: "en".to_string(),
            custom_stopwords: Vec::new(),
            stemming_enabled: false,
        };
        let tokens = tokenize_with_config("The Cats", &config);
        assert_eq!(tokens, vec!["the", "cats"]);
    }
}
