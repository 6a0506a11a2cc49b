//! Phrase parsing and BM25 ranking over the inverted-index candidate set
//! (spec.md §4.5.6). Grounded byte-for-byte in
//! `original_source/src/index/secondary_index.cpp`'s `parsePhrases` /
//! `computeBM25Scores_`.

use std::collections::{HashMap, HashSet};

use super::tokenizer::{self, FulltextConfig};

const K1: f64 = 1.2;
const B: f64 = 0.75;

#[derive(Debug, Clone, PartialEq)]
pub struct FulltextHit {
    pub pk: String,
    pub score: f64,
}

/// Splits a query into double-quoted phrases and the remaining bare text.
/// An unterminated quote is treated as closing at end-of-input.
#[must_use]
pub fn parse_phrases(query: &str) -> (Vec<String>, String) {
    let mut phrases = Vec::new();
    let mut cleaned = String::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in query.chars() {
        if c == '"' {
            if in_quotes {
                if !current.is_empty() {
                    phrases.push(std::mem::take(&mut current));
                }
                in_quotes = false;
            } else {
                in_quotes = true;
            }
            continue;
        }
        if in_quotes {
            current.push(c);
        } else {
            cleaned.push(c);
        }
    }
    if !current.is_empty() {
        phrases.push(current);
    }
    (phrases, cleaned)
}

/// Normalizes a phrase the same way a field's content is normalized before
/// substring matching: umlaut transliteration (if configured) then
/// lowercasing.
#[must_use]
pub fn normalize_for_phrase_match(text: &str, config: &FulltextConfig) -> String {
    let normalized = if config.normalize_umlauts {
        tokenizer::normalize_umlauts(text)
    } else {
        text.to_string()
    };
    normalized.to_lowercase()
}

/// Intersects per-token posting-set candidates (AND semantics).
#[must_use]
pub fn intersect(token_sets: &[HashSet<String>]) -> HashSet<String> {
    let mut iter = token_sets.iter();
    let Some(first) = iter.next() else {
        return HashSet::new();
    };
    let mut acc = first.clone();
    for set in iter {
        acc.retain(|pk| set.contains(pk));
    }
    acc
}

/// Scores every pk in `candidates` against `tokens`, given each token's
/// posting set (for document frequency and idf), each candidate's stored
/// term frequency, and each candidate's stored document length.
///
/// `N` and `avgdl` are computed over the union of all per-token posting
/// sets, not the full corpus, matching the reference's "candidate
/// universe" definition.
#[must_use]
pub fn score_candidates(
    candidates: &HashSet<String>,
    tokens: &[String],
    token_posting_sets: &[HashSet<String>],
    term_frequency: impl Fn(&str, &str) -> Option<u64>,
    doc_length: impl Fn(&str) -> Option<u64>,
) -> Vec<FulltextHit> {
    let mut universe: HashSet<String> = HashSet::new();
    for set in token_posting_sets {
        universe.extend(set.iter().cloned());
    }
    let n = (universe.len().max(1)) as f64;

    let mut doc_len: HashMap<String, f64> = HashMap::new();
    let mut total_len = 0.0;
    for pk in &universe {
        let dl = doc_length(pk).unwrap_or(0) as f64;
        doc_len.insert(pk.clone(), dl);
        total_len += dl;
    }
    let avgdl = if universe.is_empty() { 1.0 } else { (total_len / universe.len() as f64).max(1.0) };

    let dfs: Vec<f64> = token_posting_sets.iter().map(|s| s.len() as f64).collect();

    let mut scored = Vec::with_capacity(candidates.len());
    for pk in candidates {
        let dl = doc_len.get(pk).copied().unwrap_or(0.0);
        let mut score = 0.0;
        for (i, token) in tokens.iter().enumerate() {
            let df = dfs.get(i).copied().unwrap_or(1.0).max(1.0);
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            let tf = term_frequency(token, pk).unwrap_or(1) as f64;
            let mut denom = tf + K1 * (1.0 - B + B * (dl / avgdl));
            if denom <= 0.0 {
                denom = tf + K1;
            }
            score += idf * ((tf * (K1 + 1.0)) / denom);
        }
        scored.push(FulltextHit { pk: pk.clone(), score });
    }

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored
}
