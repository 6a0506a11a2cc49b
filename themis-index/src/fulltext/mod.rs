//! Full-text indexing: tokenization, stopwords, stemming, and BM25 ranking.

pub mod bm25;
pub mod stemmer;
pub mod stopwords;
pub mod tokenizer;

pub use bm25::{parse_phrases, score_candidates, FulltextHit};
pub use tokenizer::{tokenize, tokenize_with_config, FulltextConfig};
