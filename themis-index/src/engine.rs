//! The index engine: maintains every declared index family in lockstep
//! with primary-entity writes, and serves equality/composite/range/geo/
//! TTL/full-text scans over them (spec.md §4.5). Grounded in
//! `original_source/src/index/secondary_index.cpp`'s `put`/`erase`/
//! `scanEqual`/`scanRange`/`scanGeo*`/`cleanupExpired`/`scanFulltext`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use themis_entity::{Entity, FieldValue};
use themis_error::{Result, ThemisError};
use themis_store::ByteStore;

use crate::fulltext::{self, FulltextConfig, FulltextHit};
use crate::geohash;
use crate::keys;
use crate::schema;

#[derive(Debug, Clone, PartialEq)]
pub struct RangeAnchor {
    pub value: String,
    pub pk: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Ascending,
    Descending,
}

/// Maintains every secondary-index family declared for a table and serves
/// scans over them. One engine instance owns the byte-store it wraps;
/// table-level writes are serialized through a per-table lock so the
/// "check uniqueness, then write" sequence in [`IndexEngine::put`] is
/// atomic even though the underlying store has no conditional-write
/// primitive.
pub struct IndexEngine {
    store: Arc<dyn ByteStore>,
    table_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IndexEngine {
    #[must_use]
    pub fn new(store: Arc<dyn ByteStore>) -> Self {
        Self {
            store,
            table_locks: Mutex::new(HashMap::new()),
        }
    }

    fn table_lock(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.table_locks.lock();
        locks.entry(table.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    // -- index declaration -------------------------------------------------

    pub fn create_index(&self, table: &str, column: &str, unique: bool) -> Result<()> {
        schema::create_index(self.store.as_ref(), table, column, unique)
    }

    pub fn create_composite_index(&self, table: &str, columns: &[String], unique: bool) -> Result<()> {
        schema::create_composite_index(self.store.as_ref(), table, columns, unique)
    }

    pub fn create_range_index(&self, table: &str, column: &str) -> Result<()> {
        schema::create_range_index(self.store.as_ref(), table, column)
    }

    pub fn create_sparse_index(&self, table: &str, column: &str) -> Result<()> {
        schema::create_sparse_index(self.store.as_ref(), table, column)
    }

    pub fn create_geo_index(&self, table: &str, column: &str) -> Result<()> {
        schema::create_geo_index(self.store.as_ref(), table, column)
    }

    pub fn create_ttl_index(&self, table: &str, column: &str, ttl_seconds: i64) -> Result<()> {
        schema::create_ttl_index(self.store.as_ref(), table, column, ttl_seconds)
    }

    pub fn create_fulltext_index(&self, table: &str, column: &str, config: &FulltextConfig) -> Result<()> {
        schema::create_fulltext_index(self.store.as_ref(), table, column, config)
    }

    // -- write path ----------------------------------------------------------

    /// Stages every index-family delta for `entity`'s fields into `batch`,
    /// relative to `table`'s currently-declared index set.
    #[allow(clippy::too_many_lines)]
    fn stage_index_entries(&self, batch: &mut dyn themis_store::WriteBatch, table: &str, entity: &Entity) -> Result<()> {
        let pk = entity.primary_key();

        for column in schema::equality_indexed_columns(self.store.as_ref(), table) {
            if column.contains('+') {
                continue;
            }
            if let Some(value) = entity.extract_field(&column) {
                batch.put(&keys::equality_key(table, &column, &value, pk), b"1");
            }
        }

        for columns in schema::composite_indexed_groups(self.store.as_ref(), table) {
            let values: Option<Vec<String>> = columns.iter().map(|c| entity.extract_field(c)).collect();
            if let Some(values) = values {
                batch.put(&keys::composite_key(table, &columns, &values, pk), b"1");
            }
        }

        for column in schema::range_indexed_columns(self.store.as_ref(), table) {
            if let Some(value) = entity.extract_field(&column) {
                batch.put(&keys::range_key(table, &column, &value, pk), b"1");
            }
        }

        for column in schema::sparse_indexed_columns(self.store.as_ref(), table) {
            if let Some(field) = entity.get_field(&column) {
                if !field.is_null_or_empty() {
                    if let Some(value) = field.to_canonical_string() {
                        batch.put(&keys::sparse_key(table, &column, &value, pk), b"1");
                    }
                }
            }
        }

        for column in schema::geo_indexed_columns(self.store.as_ref(), table) {
            if let Some((lat, lon)) = geo_pair(entity, &column) {
                let hash = geohash::encode(lat, lon);
                batch.put(&keys::geo_key(table, &column, &hash, pk), b"1");
            }
        }

        for column in schema::ttl_indexed_columns(self.store.as_ref(), table) {
            if let Some(ttl) = schema::ttl_seconds(self.store.as_ref(), table, &column)? {
                if let Some(FieldValue::I64(created_at)) = entity.get_field(&column) {
                    let expire_at = created_at + ttl;
                    batch.put(&keys::ttl_key(table, &column, expire_at, pk), b"1");
                }
            }
        }

        for column in schema::fulltext_indexed_columns(self.store.as_ref(), table) {
            let config = schema::fulltext_config(self.store.as_ref(), table, &column)?.unwrap_or_default();
            if let Some(text) = entity.extract_field(&column) {
                let tokens = fulltext::tokenize_with_config(&text, &config);
                let mut counts: HashMap<String, u64> = HashMap::new();
                for token in &tokens {
                    *counts.entry(token.clone()).or_insert(0) += 1;
                }
                for (token, count) in &counts {
                    batch.put(&keys::fulltext_posting_key(table, &column, token, pk), b"1");
                    batch.put(&keys::fulltext_tf_key(table, &column, token, pk), count.to_string().as_bytes());
                }
                batch.put(&keys::fulltext_doclen_key(table, &column, pk), tokens.len().to_string().as_bytes());
            }
        }

        Ok(())
    }

    /// Deletes every index-family entry `old`'s fields would have
    /// produced. Symmetric with [`Self::stage_index_entries`].
    fn unstage_index_entries(&self, batch: &mut dyn themis_store::WriteBatch, table: &str, old: &Entity) -> Result<()> {
        let pk = old.primary_key();

        for column in schema::equality_indexed_columns(self.store.as_ref(), table) {
            if column.contains('+') {
                continue;
            }
            if let Some(value) = old.extract_field(&column) {
                batch.delete(&keys::equality_key(table, &column, &value, pk));
            }
        }

        for columns in schema::composite_indexed_groups(self.store.as_ref(), table) {
            let values: Option<Vec<String>> = columns.iter().map(|c| old.extract_field(c)).collect();
            if let Some(values) = values {
                batch.delete(&keys::composite_key(table, &columns, &values, pk));
            }
        }

        for column in schema::range_indexed_columns(self.store.as_ref(), table) {
            if let Some(value) = old.extract_field(&column) {
                batch.delete(&keys::range_key(table, &column, &value, pk));
            }
        }

        for column in schema::sparse_indexed_columns(self.store.as_ref(), table) {
            if let Some(field) = old.get_field(&column) {
                if !field.is_null_or_empty() {
                    if let Some(value) = field.to_canonical_string() {
                        batch.delete(&keys::sparse_key(table, &column, &value, pk));
                    }
                }
            }
        }

        for column in schema::geo_indexed_columns(self.store.as_ref(), table) {
            if let Some((lat, lon)) = geo_pair(old, &column) {
                let hash = geohash::encode(lat, lon);
                batch.delete(&keys::geo_key(table, &column, &hash, pk));
            }
        }

        for column in schema::ttl_indexed_columns(self.store.as_ref(), table) {
            if let Some(ttl) = schema::ttl_seconds(self.store.as_ref(), table, &column)? {
                if let Some(FieldValue::I64(created_at)) = old.get_field(&column) {
                    let expire_at = created_at + ttl;
                    batch.delete(&keys::ttl_key(table, &column, expire_at, pk));
                }
            }
        }

        for column in schema::fulltext_indexed_columns(self.store.as_ref(), table) {
            let config = schema::fulltext_config(self.store.as_ref(), table, &column)?.unwrap_or_default();
            if let Some(text) = old.extract_field(&column) {
                let tokens = fulltext::tokenize_with_config(&text, &config);
                let unique_tokens: HashSet<String> = tokens.into_iter().collect();
                for token in unique_tokens {
                    batch.delete(&keys::fulltext_posting_key(table, &column, &token, pk));
                    batch.delete(&keys::fulltext_tf_key(table, &column, &token, pk));
                }
                batch.delete(&keys::fulltext_doclen_key(table, &column, pk));
            }
        }

        Ok(())
    }

    fn check_uniqueness(&self, table: &str, entity: &Entity, skip_pk_clash_on: Option<&str>) -> Result<()> {
        for column in schema::equality_indexed_columns(self.store.as_ref(), table) {
            if column.contains('+') || !schema::is_unique_index(self.store.as_ref(), table, &column)? {
                continue;
            }
            if let Some(value) = entity.extract_field(&column) {
                let prefix = keys::equality_prefix(table, &column, &value);
                let mut conflict = false;
                self.store.scan_prefix(&prefix, &mut |key, _| {
                    if let Some(existing_pk) = keys::trailing_pk(key) {
                        if Some(existing_pk) != skip_pk_clash_on {
                            conflict = true;
                            return false;
                        }
                    }
                    true
                });
                if conflict {
                    return Err(ThemisError::UniqueViolation {
                        table: table.to_string(),
                        column,
                        value,
                    });
                }
            }
        }

        for columns in schema::composite_indexed_groups(self.store.as_ref(), table) {
            if !schema::is_unique_composite_index(self.store.as_ref(), table, &columns)? {
                continue;
            }
            let values: Option<Vec<String>> = columns.iter().map(|c| entity.extract_field(c)).collect();
            if let Some(values) = values {
                let prefix = keys::composite_prefix(table, &columns, &values);
                let mut conflict = false;
                self.store.scan_prefix(&prefix, &mut |key, _| {
                    if let Some(existing_pk) = keys::trailing_pk(key) {
                        if Some(existing_pk) != skip_pk_clash_on {
                            conflict = true;
                            return false;
                        }
                    }
                    true
                });
                if conflict {
                    return Err(ThemisError::UniqueViolation {
                        table: table.to_string(),
                        column: columns.join("+"),
                        value: values.join(","),
                    });
                }
            }
        }

        Ok(())
    }

    /// Writes `entity`'s primary blob and every declared index entry,
    /// atomically. If the primary key already held an entity, its stale
    /// index entries are removed in the same batch. The whole
    /// check-then-write sequence runs under `table`'s lock so a
    /// concurrent `put` cannot slip a conflicting unique value in between
    /// the uniqueness check and the commit.
    #[tracing::instrument(skip(self, entity))]
    pub fn put(&self, table: &str, entity: &Entity) -> Result<()> {
        let lock = self.table_lock(table);
        let _guard = lock.lock();

        let pk = entity.primary_key().to_string();
        let old = self.load_entity(table, &pk)?;

        self.check_uniqueness(table, entity, Some(pk.as_str()))?;

        let mut batch = self.store.open_write_batch();
        if let Some(old) = &old {
            self.unstage_index_entries(batch.as_mut(), table, old)?;
        }
        let blob = entity.serialize()?;
        batch.put(&keys::primary(table, &pk), &blob);
        self.stage_index_entries(batch.as_mut(), table, entity)?;
        batch.commit()
    }

    fn load_entity(&self, table: &str, pk: &str) -> Result<Option<Entity>> {
        match self.store.get(&keys::primary(table, pk))? {
            Some(bytes) => Ok(Some(Entity::deserialize(pk, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Removes `pk`'s primary blob and every index entry it produced. If
    /// the stored blob can't be deserialized, falls back to a defensive
    /// prefix scan across every declared family so a corrupted record
    /// never leaves orphaned index entries behind.
    #[tracing::instrument(skip(self))]
    pub fn erase(&self, table: &str, pk: &str) -> Result<()> {
        let lock = self.table_lock(table);
        let _guard = lock.lock();

        let mut batch = self.store.open_write_batch();
        match self.load_entity(table, pk) {
            Ok(Some(old)) => self.unstage_index_entries(batch.as_mut(), table, &old)?,
            Ok(None) => {}
            Err(_) => self.erase_by_scanning_every_family(batch.as_mut(), table, pk)?,
        }
        batch.delete(&keys::primary(table, pk));
        batch.commit()
    }

    fn erase_by_scanning_every_family(&self, batch: &mut dyn themis_store::WriteBatch, table: &str, pk: &str) -> Result<()> {
        let mut prefixes = Vec::new();
        for column in schema::equality_indexed_columns(self.store.as_ref(), table) {
            if !column.contains('+') {
                prefixes.push(format!("idx:{table}:{column}:").into_bytes());
            }
        }
        for columns in schema::composite_indexed_groups(self.store.as_ref(), table) {
            prefixes.push(format!("idx:{table}:{}:", columns.join("+")).into_bytes());
        }
        for column in schema::range_indexed_columns(self.store.as_ref(), table) {
            prefixes.push(keys::range_column_prefix(table, &column));
        }
        for column in schema::sparse_indexed_columns(self.store.as_ref(), table) {
            prefixes.push(format!("sidx:{table}:{column}:").into_bytes());
        }
        for column in schema::geo_indexed_columns(self.store.as_ref(), table) {
            prefixes.push(keys::geo_column_prefix(table, &column));
        }
        for column in schema::ttl_indexed_columns(self.store.as_ref(), table) {
            prefixes.push(keys::ttl_column_prefix(table, &column));
        }
        for column in schema::fulltext_indexed_columns(self.store.as_ref(), table) {
            prefixes.push(keys::fulltext_column_prefix(table, &column));
            prefixes.push(format!("fttf:{table}:{column}:").into_bytes());
            let doclen_key = keys::fulltext_doclen_key(table, &column, pk);
            batch.delete(&doclen_key);
        }

        for prefix in prefixes {
            let mut hits = Vec::new();
            self.store.scan_prefix(&prefix, &mut |key, _| {
                if keys::trailing_pk(key) == Some(pk) {
                    hits.push(key.to_vec());
                }
                true
            });
            for key in hits {
                batch.delete(&key);
            }
        }
        Ok(())
    }

    // -- read path -------------------------------------------------------

    #[must_use]
    pub fn scan_equal(&self, table: &str, column: &str, value: &str) -> Vec<String> {
        let prefix = keys::equality_prefix(table, column, value);
        let mut pks = Vec::new();
        self.store.scan_prefix(&prefix, &mut |key, _| {
            if let Some(pk) = keys::trailing_pk(key) {
                pks.push(pk.to_string());
            }
            true
        });
        pks
    }

    #[must_use]
    pub fn scan_equal_composite(&self, table: &str, columns: &[String], values: &[String]) -> Vec<String> {
        let prefix = keys::composite_prefix(table, columns, values);
        let mut pks = Vec::new();
        self.store.scan_prefix(&prefix, &mut |key, _| {
            if let Some(pk) = keys::trailing_pk(key) {
                pks.push(pk.to_string());
            }
            true
        });
        pks
    }

    /// Scans a range index over `[lower, upper]` (both inclusive), in the
    /// given direction, up to `limit` results. `anchor`, when present,
    /// resumes a prior page: it first emits entries pinned at
    /// `anchor.value` whose pk is strictly past `anchor.pk` in scan
    /// direction, then continues scanning strictly past `anchor.value`.
    #[must_use]
    pub fn scan_range(
        &self,
        table: &str,
        column: &str,
        lower: &str,
        upper: &str,
        direction: ScanDirection,
        anchor: Option<&RangeAnchor>,
        limit: usize,
    ) -> Vec<(String, String)> {
        if limit == 0 {
            return Vec::new();
        }

        let mut all: Vec<(String, String)> = Vec::new();
        let start = keys::range_value_prefix(table, column, lower);
        let mut end = keys::range_value_prefix(table, column, upper);
        end.push(0xFF);

        self.store.scan_range(&start, &end, &mut |key, _| {
            if let (Some(pk), Some(value)) = (keys::trailing_pk(key), extract_range_value(key, table, column)) {
                all.push((value, pk.to_string()));
            }
            true
        });

        match direction {
            ScanDirection::Ascending => all.sort(),
            ScanDirection::Descending => {
                all.sort();
                all.reverse();
            }
        }

        let mut out = Vec::with_capacity(limit.min(all.len()));
        let mut started = anchor.is_none();
        for (value, pk) in &all {
            if !started {
                let Some(a) = anchor else { break };
                let past_anchor_value = match direction {
                    ScanDirection::Ascending => value > &a.value,
                    ScanDirection::Descending => value < &a.value,
                };
                let at_anchor_value_past_pk = value == &a.value
                    && match direction {
                        ScanDirection::Ascending => pk.as_str() > a.pk.as_str(),
                        ScanDirection::Descending => pk.as_str() < a.pk.as_str(),
                    };
                if past_anchor_value || at_anchor_value_past_pk {
                    started = true;
                } else {
                    continue;
                }
            }
            out.push((value.clone(), pk.clone()));
            if out.len() >= limit {
                break;
            }
        }
        out
    }

    #[must_use]
    pub fn scan_geo_box(&self, table: &str, column: &str, lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Vec<String> {
        let prefix = keys::geo_column_prefix(table, column);
        let mut pks = Vec::new();
        self.store.scan_prefix(&prefix, &mut |key, _| {
            if let Some(pk) = keys::trailing_pk(key) {
                if let Some(hash) = extract_geo_hash(key, table, column) {
                    if let Some((lat, lon)) = geohash::decode(&hash) {
                        if lat >= lat_min && lat <= lat_max && lon >= lon_min && lon <= lon_max {
                            pks.push(pk.to_string());
                        }
                    }
                }
            }
            true
        });
        pks
    }

    #[must_use]
    pub fn scan_geo_radius(&self, table: &str, column: &str, center_lat: f64, center_lon: f64, radius_km: f64) -> Vec<String> {
        let (lat_min, lat_max, lon_min, lon_max) = geohash::enclosing_box(center_lat, center_lon, radius_km);
        let prefix = keys::geo_column_prefix(table, column);
        let mut pks = Vec::new();
        self.store.scan_prefix(&prefix, &mut |key, _| {
            if let Some(pk) = keys::trailing_pk(key) {
                if let Some(hash) = extract_geo_hash(key, table, column) {
                    if let Some((lat, lon)) = geohash::decode(&hash) {
                        if lat >= lat_min
                            && lat <= lat_max
                            && lon >= lon_min
                            && lon <= lon_max
                            && geohash::haversine_km(center_lat, center_lon, lat, lon) <= radius_km
                        {
                            pks.push(pk.to_string());
                        }
                    }
                }
            }
            true
        });
        pks
    }

    /// Erases every entity whose TTL-indexed column has expired as of
    /// `now_unix`. Returns the number of entities removed.
    #[tracing::instrument(skip(self))]
    pub fn cleanup_expired_ttl(&self, table: &str, column: &str, now_unix: i64) -> Result<usize> {
        let start = keys::ttl_column_prefix(table, column);
        let end = keys::ttl_expiry_bound(table, column, now_unix);
        let mut expired = Vec::new();
        self.store.scan_range(&start, &end, &mut |key, _| {
            if let Some(pk) = keys::trailing_pk(key) {
                expired.push(pk.to_string());
            }
            true
        });
        let count = expired.len();
        for pk in expired {
            self.erase(table, &pk)?;
        }
        Ok(count)
    }

    /// Ranks `table.column`'s documents against `query` by BM25, honoring
    /// AND-of-terms and quoted-phrase substring verification.
    #[tracing::instrument(skip(self))]
    pub fn scan_fulltext(&self, table: &str, column: &str, query: &str, limit: usize) -> Result<Vec<FulltextHit>> {
        let config = schema::fulltext_config(self.store.as_ref(), table, column)?
            .ok_or_else(|| ThemisError::InvalidArgument(format!("no fulltext index on {table}.{column}")))?;

        let (phrases, cleaned) = fulltext::parse_phrases(query);
        let mut tokens = fulltext::tokenize_with_config(&cleaned, &config);
        if tokens.is_empty() && !phrases.is_empty() {
            tokens = fulltext::tokenize_with_config(&phrases.join(" "), &config);
        }
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut token_sets = Vec::with_capacity(tokens.len());
        for token in &tokens {
            let prefix = keys::fulltext_posting_prefix(table, column, token);
            let mut set = HashSet::new();
            self.store.scan_prefix(&prefix, &mut |key, _| {
                if let Some(pk) = keys::trailing_pk(key) {
                    set.insert(pk.to_string());
                }
                true
            });
            token_sets.push(set);
        }

        let mut candidates = fulltext::bm25::intersect(&token_sets);

        if !phrases.is_empty() {
            let mut keep = HashSet::new();
            for pk in &candidates {
                if let Some(entity) = self.load_entity(table, pk)? {
                    if let Some(field) = entity.extract_field(column) {
                        let normalized = fulltext::bm25::normalize_for_phrase_match(&field, &config);
                        if phrases.iter().all(|p| normalized.contains(&fulltext::bm25::normalize_for_phrase_match(p, &config))) {
                            keep.insert(pk.clone());
                        }
                    }
                }
            }
            candidates = keep;
        }

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let store = Arc::clone(&self.store);
        let table_owned = table.to_string();
        let column_owned = column.to_string();
        let tf_store = Arc::clone(&store);
        let tf_table = table_owned.clone();
        let tf_column = column_owned.clone();
        let term_frequency = move |token: &str, pk: &str| -> Option<u64> {
            let key = keys::fulltext_tf_key(&tf_table, &tf_column, token, pk);
            tf_store.get(&key).ok().flatten().and_then(|bytes| String::from_utf8(bytes).ok()).and_then(|s| s.parse().ok())
        };
        let doclen_store = store;
        let doc_length = move |pk: &str| -> Option<u64> {
            let key = keys::fulltext_doclen_key(&table_owned, &column_owned, pk);
            doclen_store.get(&key).ok().flatten().and_then(|bytes| String::from_utf8(bytes).ok()).and_then(|s| s.parse().ok())
        };

        let mut hits = fulltext::score_candidates(&candidates, &tokens, &token_sets, term_frequency, doc_length);
        hits.truncate(limit);
        Ok(hits)
    }

    /// Scans every primary entity looking for a `Str` field whose value
    /// parses as an envelope (compact or structured form) naming
    /// `(key_id, key_version)`. Used by callers deciding whether a key
    /// version is safe to delete; this engine never calls it
    /// automatically.
    #[tracing::instrument(skip(self))]
    pub fn references_remain(&self, key_id: &str, key_version: u32) -> Result<bool> {
        let prefix = b"rel:";
        let mut found = false;
        self.store.scan_prefix(prefix, &mut |key, value| {
            let Some(pk) = keys::trailing_pk(key) else { return true };
            let Ok(entity) = Entity::deserialize(pk, value) else { return true };
            for (_, field) in entity.fields() {
                if let FieldValue::Str(s) = field {
                    let envelope = themis_crypto::Envelope::from_compact(s).or_else(|_| themis_crypto::Envelope::from_structured(s));
                    if let Ok(envelope) = envelope {
                        if envelope.key_id == key_id && envelope.key_version == key_version {
                            found = true;
                            return false;
                        }
                    }
                }
            }
            true
        });
        Ok(found)
    }
}

fn geo_pair(entity: &Entity, column: &str) -> Option<(f64, f64)> {
    let lat_field = format!("{column}_lat");
    let lon_field = format!("{column}_lon");
    let lat = entity.get_field(&lat_field).and_then(FieldValue::as_f64);
    let lon = entity.get_field(&lon_field).and_then(FieldValue::as_f64);
    match (lat, lon) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        _ => None,
    }
}

fn extract_range_value(key: &[u8], table: &str, column: &str) -> Option<String> {
    let prefix = keys::range_column_prefix(table, column);
    let rest = key.strip_prefix(prefix.as_slice())?;
    let pos = rest.iter().position(|&b| b == b':')?;
    std::str::from_utf8(&rest[..pos]).ok().map(ToString::to_string)
}

fn extract_geo_hash(key: &[u8], table: &str, column: &str) -> Option<String> {
    let prefix = keys::geo_column_prefix(table, column);
    let rest = key.strip_prefix(prefix.as_slice())?;
    let pos = rest.iter().position(|&b| b == b':')?;
    std::str::from_utf8(&rest[..pos]).ok().map(ToString::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use themis_store::MemoryStore;

    use super::*;

    fn entity_with(pk: &str, fields: &[(&str, FieldValue)]) -> Entity {
        let mut e = Entity::new(pk);
        for (name, value) in fields {
            e.set_field(*name, value.clone());
        }
        e
    }

    #[test]
    fn put_enforces_unique_constraint_atomically() {
        let engine = IndexEngine::new(Arc::new(MemoryStore::new()));
        engine.create_index("users", "email", true).unwrap();

        let e1 = entity_with("u1", &[("email", FieldValue::Str("a@x.com".to_string()))]);
        engine.put("users", &e1).unwrap();

        let e2 = entity_with("u2", &[("email", FieldValue::Str("a@x.com".to_string()))]);
        let err = engine.put("users", &e2).unwrap_err();
        assert!(matches!(err, ThemisError::UniqueViolation { .. }));

        assert_eq!(engine.scan_equal("users", "email", "a@x.com"), vec!["u1".to_string()]);
    }

    #[test]
    fn put_allows_same_pk_to_rewrite_its_own_unique_value() {
        let engine = IndexEngine::new(Arc::new(MemoryStore::new()));
        engine.create_index("users", "email", true).unwrap();
        let e1 = entity_with("u1", &[("email", FieldValue::Str("a@x.com".to_string()))]);
        engine.put("users", &e1).unwrap();
        let e1_updated = entity_with("u1", &[("email", FieldValue::Str("a@x.com".to_string()))]);
        assert!(engine.put("users", &e1_updated).is_ok());
    }

    #[test]
    fn erase_removes_every_reserved_prefix() {
        let engine = IndexEngine::new(Arc::new(MemoryStore::new()));
        engine.create_index("users", "email", false).unwrap();
        engine.create_range_index("users", "age").unwrap();

        let e1 = entity_with(
            "u1",
            &[("email", FieldValue::Str("a@x.com".to_string())), ("age", FieldValue::I64(30))],
        );
        engine.put("users", &e1).unwrap();
        engine.erase("users", "u1").unwrap();

        assert!(engine.scan_equal("users", "email", "a@x.com").is_empty());
        assert!(engine.scan_range("users", "age", "0", "999", ScanDirection::Ascending, None, 10).is_empty());
        assert!(engine.store.get(&keys::primary("users", "u1")).unwrap().is_none());
    }

    #[test]
    fn anchored_range_scan_enumerates_without_gaps_or_duplicates() {
        let engine = IndexEngine::new(Arc::new(MemoryStore::new()));
        engine.create_range_index("events", "seq").unwrap();
        for i in 0..10 {
            let e = entity_with(&format!("e{i}"), &[("seq", FieldValue::I64(i))]);
            engine.put("events", &e).unwrap();
        }

        let mut seen = Vec::new();
        let mut anchor = None;
        loop {
            let page = engine.scan_range("events", "seq", "0", "9", ScanDirection::Ascending, anchor.as_ref(), 3);
            if page.is_empty() {
                break;
            }
            for (value, pk) in &page {
                seen.push(pk.clone());
                anchor = Some(RangeAnchor { value: value.clone(), pk: pk.clone() });
            }
        }
        assert_eq!(seen.len(), 10);
        let unique: HashSet<_> = seen.iter().cloned().collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn fulltext_scan_matches_stemmed_tokens_and_excludes_unrelated_terms() {
        let engine = IndexEngine::new(Arc::new(MemoryStore::new()));
        let config = FulltextConfig::default();
        engine.create_fulltext_index("notes", "body", &config).unwrap();

        let e1 = entity_with("n1", &[("body", FieldValue::Str("Running with the cats".to_string()))]);
        engine.put("notes", &e1).unwrap();

        let hits = engine.scan_fulltext("notes", "body", "run cat", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].pk, "n1");

        let empty = engine.scan_fulltext("notes", "body", "dog", 10).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn cleanup_expired_ttl_removes_past_entries_only() {
        let engine = IndexEngine::new(Arc::new(MemoryStore::new()));
        engine.create_ttl_index("sessions", "created_at", 60).unwrap();

        let expired = entity_with("s1", &[("created_at", FieldValue::I64(1000))]);
        let fresh = entity_with("s2", &[("created_at", FieldValue::I64(1_000_000_000))]);
        engine.put("sessions", &expired).unwrap();
        engine.put("sessions", &fresh).unwrap();

        let removed = engine.cleanup_expired_ttl("sessions", "created_at", 2000).unwrap();
        assert_eq!(removed, 1);
        assert!(engine.store.get(&keys::primary("sessions", "s1")).unwrap().is_none());
        assert!(engine.store.get(&keys::primary("sessions", "s2")).unwrap().is_some());
    }

    #[test]
    fn cleanup_expired_ttl_includes_entries_expiring_exactly_at_now() {
        let engine = IndexEngine::new(Arc::new(MemoryStore::new()));
        engine.create_ttl_index("sessions", "created_at", 60).unwrap();

        let exactly_now = entity_with("s1", &[("created_at", FieldValue::I64(2000))]);
        let not_yet = entity_with("s2", &[("created_at", FieldValue::I64(2001))]);
        engine.put("sessions", &exactly_now).unwrap();
        engine.put("sessions", &not_yet).unwrap();

        let removed = engine.cleanup_expired_ttl("sessions", "created_at", 2000).unwrap();
        assert_eq!(removed, 1);
        assert!(engine.store.get(&keys::primary("sessions", "s1")).unwrap().is_none());
        assert!(engine.store.get(&keys::primary("sessions", "s2")).unwrap().is_some());
    }
}
