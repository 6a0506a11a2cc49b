//! Index descriptor creation, persistence, and enumeration (spec.md
//! §4.5.2). Every index family's presence is recorded by writing a
//! meta-key; equality/composite/full-text carry a JSON descriptor body,
//! range/sparse/geo/TTL carry a presence-only marker (TTL's marker holds
//! the configured TTL in seconds). Grounded in
//! `original_source/src/index/secondary_index.cpp`'s `create*Index`/
//! `has*Index`/`load*IndexedColumns` family.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use themis_error::{Result, ThemisError};
use themis_store::ByteStore;

use crate::fulltext::FulltextConfig;
use crate::keys;

fn require_no_colon(table: &str, column: &str, op: &str) -> Result<()> {
    if table.is_empty() || column.is_empty() {
        return Err(ThemisError::InvalidArgument(format!("{op}: table/column must not be empty")));
    }
    if table.contains(':') || column.contains(':') {
        return Err(ThemisError::InvalidArgument(format!("{op}: ':' is not allowed in table/column")));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EqualityDescriptor {
    unique: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CompositeDescriptor {
    columns: Vec<String>,
    unique: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FulltextDescriptor {
    normalize_umlauts: bool,
    stopwords_enabled: bool,
    language: String,
    custom_stopwords: Vec<String>,
    stemming_enabled: bool,
}

impl From<&FulltextConfig> for FulltextDescriptor {
    fn from(c: &FulltextConfig) -> Self {
        Self {
            normalize_umlauts: c.normalize_umlauts,
            stopwords_enabled: c.stopwords_enabled,
            language: c.language.clone(),
            custom_stopwords: c.custom_stopwords.clone(),
            stemming_enabled: c.stemming_enabled,
        }
    }
}

impl From<FulltextDescriptor> for FulltextConfig {
    fn from(d: FulltextDescriptor) -> Self {
        Self {
            normalize_umlauts: d.normalize_umlauts,
            stopwords_enabled: d.stopwords_enabled,
            language: d.language,
            custom_stopwords: d.custom_stopwords,
            stemming_enabled: d.stemming_enabled,
        }
    }
}

pub fn create_index(store: &dyn ByteStore, table: &str, column: &str, unique: bool) -> Result<()> {
    require_no_colon(table, column, "create_index")?;
    let body = serde_json::to_vec(&EqualityDescriptor { unique })
        .map_err(|e| ThemisError::SchemaDecodeError(format!("create_index: {e}")))?;
    store.put(&keys::equality_meta(table, column), &body)
}

pub fn is_unique_index(store: &dyn ByteStore, table: &str, column: &str) -> Result<bool> {
    match store.get(&keys::equality_meta(table, column))? {
        Some(bytes) => {
            let d: EqualityDescriptor = serde_json::from_slice(&bytes)
                .map_err(|e| ThemisError::SchemaDecodeError(format!("equality descriptor: {e}")))?;
            Ok(d.unique)
        }
        None => Ok(false),
    }
}

pub fn has_index(store: &dyn ByteStore, table: &str, column: &str) -> Result<bool> {
    Ok(store.get(&keys::equality_meta(table, column))?.is_some())
}

pub fn create_composite_index(store: &dyn ByteStore, table: &str, columns: &[String], unique: bool) -> Result<()> {
    if table.is_empty() || columns.len() < 2 {
        return Err(ThemisError::InvalidArgument(
            "create_composite_index: need a table and at least 2 columns".to_string(),
        ));
    }
    for col in columns {
        require_no_colon(table, col, "create_composite_index")?;
    }
    let body = serde_json::to_vec(&CompositeDescriptor { columns: columns.to_vec(), unique })
        .map_err(|e| ThemisError::SchemaDecodeError(format!("create_composite_index: {e}")))?;
    store.put(&keys::composite_meta(table, columns), &body)
}

pub fn is_unique_composite_index(store: &dyn ByteStore, table: &str, columns: &[String]) -> Result<bool> {
    match store.get(&keys::composite_meta(table, columns))? {
        Some(bytes) => {
            let d: CompositeDescriptor = serde_json::from_slice(&bytes)
                .map_err(|e| ThemisError::SchemaDecodeError(format!("composite descriptor: {e}")))?;
            Ok(d.unique)
        }
        None => Ok(false),
    }
}

pub fn create_range_index(store: &dyn ByteStore, table: &str, column: &str) -> Result<()> {
    require_no_colon(table, column, "create_range_index")?;
    store.put(&keys::range_meta(table, column), b"1")
}

pub fn has_range_index(store: &dyn ByteStore, table: &str, column: &str) -> Result<bool> {
    Ok(store.get(&keys::range_meta(table, column))?.is_some())
}

pub fn create_sparse_index(store: &dyn ByteStore, table: &str, column: &str) -> Result<()> {
    require_no_colon(table, column, "create_sparse_index")?;
    store.put(&keys::sparse_meta(table, column), b"1")
}

pub fn has_sparse_index(store: &dyn ByteStore, table: &str, column: &str) -> Result<bool> {
    Ok(store.get(&keys::sparse_meta(table, column))?.is_some())
}

pub fn create_geo_index(store: &dyn ByteStore, table: &str, column: &str) -> Result<()> {
    require_no_colon(table, column, "create_geo_index")?;
    store.put(&keys::geo_meta(table, column), b"1")
}

pub fn has_geo_index(store: &dyn ByteStore, table: &str, column: &str) -> Result<bool> {
    Ok(store.get(&keys::geo_meta(table, column))?.is_some())
}

pub fn create_ttl_index(store: &dyn ByteStore, table: &str, column: &str, ttl_seconds: i64) -> Result<()> {
    require_no_colon(table, column, "create_ttl_index")?;
    if ttl_seconds <= 0 {
        return Err(ThemisError::InvalidArgument("create_ttl_index: ttl_seconds must be > 0".to_string()));
    }
    store.put(&keys::ttl_meta(table, column), ttl_seconds.to_string().as_bytes())
}

pub fn ttl_seconds(store: &dyn ByteStore, table: &str, column: &str) -> Result<Option<i64>> {
    match store.get(&keys::ttl_meta(table, column))? {
        Some(bytes) => {
            let s = String::from_utf8_lossy(&bytes);
            let secs: i64 = s
                .parse()
                .map_err(|_| ThemisError::SchemaDecodeError(format!("ttl meta not an integer: {s}")))?;
            Ok(Some(secs))
        }
        None => Ok(None),
    }
}

pub fn create_fulltext_index(store: &dyn ByteStore, table: &str, column: &str, config: &FulltextConfig) -> Result<()> {
    require_no_colon(table, column, "create_fulltext_index")?;
    let descriptor: FulltextDescriptor = config.into();
    let body = serde_json::to_vec(&descriptor)
        .map_err(|e| ThemisError::SchemaDecodeError(format!("create_fulltext_index: {e}")))?;
    store.put(&keys::fulltext_meta(table, column), &body)
}

pub fn fulltext_config(store: &dyn ByteStore, table: &str, column: &str) -> Result<Option<FulltextConfig>> {
    match store.get(&keys::fulltext_meta(table, column))? {
        Some(bytes) => match serde_json::from_slice::<FulltextDescriptor>(&bytes) {
            Ok(d) => Ok(Some(d.into())),
            Err(_) => Ok(Some(FulltextConfig::default())),
        },
        None => Ok(None),
    }
}

pub fn has_fulltext_index(store: &dyn ByteStore, table: &str, column: &str) -> Result<bool> {
    Ok(store.get(&keys::fulltext_meta(table, column))?.is_some())
}

fn columns_from_meta_prefix(store: &dyn ByteStore, prefix: &[u8], _table: &str) -> Vec<String> {
    let mut cols = Vec::new();
    store.scan_prefix(prefix, &mut |key, _| {
        if let Ok(tail) = std::str::from_utf8(&key[prefix.len()..]) {
            cols.push(tail.to_string());
        }
        true
    });
    cols
}

/// Every column with an equality (single-column) index declared on `table`.
#[must_use]
pub fn equality_indexed_columns(store: &dyn ByteStore, table: &str) -> Vec<String> {
    columns_from_meta_prefix(store, &keys::equality_meta_prefix(table), table)
}

#[must_use]
pub fn range_indexed_columns(store: &dyn ByteStore, table: &str) -> Vec<String> {
    columns_from_meta_prefix(store, &keys::range_meta_prefix(table), table)
}

#[must_use]
pub fn sparse_indexed_columns(store: &dyn ByteStore, table: &str) -> Vec<String> {
    columns_from_meta_prefix(store, &keys::sparse_meta_prefix(table), table)
}

#[must_use]
pub fn geo_indexed_columns(store: &dyn ByteStore, table: &str) -> Vec<String> {
    columns_from_meta_prefix(store, &keys::geo_meta_prefix(table), table)
}

#[must_use]
pub fn ttl_indexed_columns(store: &dyn ByteStore, table: &str) -> Vec<String> {
    columns_from_meta_prefix(store, &keys::ttl_meta_prefix(table), table)
}

#[must_use]
pub fn fulltext_indexed_columns(store: &dyn ByteStore, table: &str) -> Vec<String> {
    columns_from_meta_prefix(store, &keys::fulltext_meta_prefix(table), table)
}

/// Every composite-index column group declared on `table`, each returned
/// as its `+`-joined column list.
#[must_use]
pub fn composite_indexed_groups(store: &dyn ByteStore, table: &str) -> Vec<Vec<String>> {
    columns_from_meta_prefix(store, &keys::equality_meta_prefix(table), table)
        .into_iter()
        .filter(|c| c.contains('+'))
        .map(|c| c.split('+').map(ToString::to_string).collect())
        .collect()
}

pub type SharedStore = Arc<dyn ByteStore>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use themis_store::MemoryStore;

    use super::*;

    #[test]
    fn create_and_query_equality_index() {
        let store = MemoryStore::new();
        create_index(&store, "users", "email", true).unwrap();
        assert!(has_index(&store, "users", "email").unwrap());
        assert!(is_unique_index(&store, "users", "email").unwrap());
        assert!(!has_index(&store, "users", "age").unwrap());
    }

    #[test]
    fn create_ttl_index_rejects_non_positive_ttl() {
        let store = MemoryStore::new();
        assert!(create_ttl_index(&store, "sessions", "expires_at", 0).is_err());
        assert!(create_ttl_index(&store, "sessions", "expires_at", 3600).is_ok());
        assert_eq!(ttl_seconds(&store, "sessions", "expires_at").unwrap(), Some(3600));
    }

    #[test]
    fn fulltext_descriptor_roundtrips() {
        let store = MemoryStore::new();
        let config = FulltextConfig {
            normalize_umlauts: true,
            stopwords_enabled: false,
            language: "de".to_string(),
            custom_stopwords: vec!["foo".to_string()],
            stemming_enabled: true,
        };
        create_fulltext_index(&store, "docs", "body", &config).unwrap();
        let loaded = fulltext_config(&store, "docs", "body").unwrap().unwrap();
        assert_eq!(loaded.language, "de");
        assert_eq!(loaded.custom_stopwords, vec!["foo".to_string()]);
    }

    #[test]
    fn equality_indexed_columns_enumerates_declared_columns() {
        let store = MemoryStore::new();
        create_index(&store, "users", "email", true).unwrap();
        create_index(&store, "users", "username", false).unwrap();
        let mut cols = equality_indexed_columns(&store, "users");
        cols.sort();
        assert_eq!(cols, vec!["email".to_string(), "username".to_string()]);
    }
}
