//! Built-in English/German stopword lists (spec.md §4.5.6). Grounded
//! byte-for-byte in `original_source/src/utils/stopwords.cpp`.

use std::collections::HashSet;

#[must_use]
pub fn defaults(language: &str) -> HashSet<String> {
    let words: &[&str] = match language.to_ascii_lowercase().as_str() {
        "en" => &[
            "the", "a", "an", "and", "or", "but", "if", "then", "else", "when", "while", "is",
            "are", "was", "were", "be", "been", "being", "in", "on", "at", "of", "to", "for",
            "with", "by", "from", "as", "it", "its", "this", "that", "these", "those", "not",
            "no", "do", "does", "did", "done",
        ],
        "de" => &[
            "der", "die", "das", "und", "oder", "aber", "nicht", "ist", "sind", "war", "waren",
            "im", "in", "am", "an", "auf", "zu", "von", "mit", "bei", "aus", "dies", "diese",
            "dieser", "diesen", "dem", "den", "ein", "eine", "einer", "einem", "einen", "als",
            "es", "sein", "seine", "seiner",
        ],
        _ => &[],
    };
    words.iter().map(|w| (*w).to_string()).collect()
}

/// Merges a base stopword set with caller-supplied words, lowercasing the
/// custom list defensively.
#[must_use]
pub fn merge(base: HashSet<String>, custom: &[String]) -> HashSet<String> {
    let mut out = base;
    out.extend(custom.iter().map(|w| w.to_ascii_lowercase()));
    out
}
