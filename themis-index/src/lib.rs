//! The secondary-index engine (L5): equality, composite, range, sparse,
//! geo, TTL, and full-text/BM25 indexes, all kept in lockstep with
//! primary-entity writes through a single [`engine::IndexEngine`].
//!
//! - [`keys`] — byte-store key builders for every index family.
//! - [`schema`] — index descriptor creation, persistence, and enumeration.
//! - [`geohash`] — 64-bit Morton geohashing and distance helpers.
//! - [`fulltext`] — tokenization, stopwords, stemming, and BM25 ranking.
//! - [`engine`] — ties every family together behind `put`/`erase`/`scan_*`.

pub mod engine;
pub mod fulltext;
pub mod geohash;
pub mod keys;
pub mod schema;

pub use engine::{IndexEngine, RangeAnchor, ScanDirection};
