//! Byte-store key builders for every index family (spec.md §3.4/§4.5.1).
//!
//! Table and column names are assumed not to contain `:`; value
//! components are percent-encoded for exactly the bytes `:` and `%`
//! before being embedded. Grounded in
//! `original_source/src/index/secondary_index.cpp`'s `make*Key`/
//! `make*Prefix` family.

/// Percent-encodes `:` and `%` in a value component. No other byte is
/// touched, so every non-ASCII UTF-8 sequence survives unchanged.
#[must_use]
pub fn encode_component(raw: &str) -> String {
    let mut out = Vec::with_capacity(raw.len());
    for &byte in raw.as_bytes() {
        if byte == b':' || byte == b'%' {
            out.push(b'%');
            out.extend_from_slice(format!("{byte:02X}").as_bytes());
        } else {
            out.push(byte);
        }
    }
    // The range-scan upper bound appends a literal 0xFF byte to mark
    // "past every encoded value"; that only works if encoding itself
    // never produces 0xFF. Percent-encoded bytes are ASCII hex digits
    // and untouched bytes are never touched, so this always holds.
    debug_assert!(!out.contains(&0xFF), "percent-encoded component must never contain byte 0xFF");
    String::from_utf8(out).unwrap_or_default()
}

pub fn primary(table: &str, pk: &str) -> Vec<u8> {
    format!("rel:{table}:{pk}").into_bytes()
}

pub fn equality_meta(table: &str, column: &str) -> Vec<u8> {
    format!("idxmeta:{table}:{column}").into_bytes()
}

pub fn composite_meta(table: &str, columns: &[String]) -> Vec<u8> {
    format!("idxmeta:{table}:{}", columns.join("+")).into_bytes()
}

pub fn equality_meta_prefix(table: &str) -> Vec<u8> {
    format!("idxmeta:{table}:").into_bytes()
}

pub fn equality_key(table: &str, column: &str, value: &str, pk: &str) -> Vec<u8> {
    format!("idx:{table}:{column}:{}:{pk}", encode_component(value)).into_bytes()
}

pub fn equality_prefix(table: &str, column: &str, value: &str) -> Vec<u8> {
    format!("idx:{table}:{column}:{}:", encode_component(value)).into_bytes()
}

pub fn composite_key(table: &str, columns: &[String], values: &[String], pk: &str) -> Vec<u8> {
    let mut key = format!("idx:{table}:{}:", columns.join("+"));
    for v in values {
        key.push_str(&encode_component(v));
        key.push(':');
    }
    key.push_str(pk);
    key.into_bytes()
}

pub fn composite_prefix(table: &str, columns: &[String], values: &[String]) -> Vec<u8> {
    let mut key = format!("idx:{table}:{}:", columns.join("+"));
    for v in values {
        key.push_str(&encode_component(v));
        key.push(':');
    }
    key.into_bytes()
}

pub fn range_meta(table: &str, column: &str) -> Vec<u8> {
    format!("ridxmeta:{table}:{column}").into_bytes()
}

pub fn range_meta_prefix(table: &str) -> Vec<u8> {
    format!("ridxmeta:{table}:").into_bytes()
}

pub fn range_key(table: &str, column: &str, value: &str, pk: &str) -> Vec<u8> {
    format!("ridx:{table}:{column}:{}:{pk}", encode_component(value)).into_bytes()
}

pub fn range_value_prefix(table: &str, column: &str, value: &str) -> Vec<u8> {
    format!("ridx:{table}:{column}:{}:", encode_component(value)).into_bytes()
}

pub fn range_column_prefix(table: &str, column: &str) -> Vec<u8> {
    format!("ridx:{table}:{column}:").into_bytes()
}

pub fn sparse_meta(table: &str, column: &str) -> Vec<u8> {
    format!("sidxmeta:{table}:{column}").into_bytes()
}

pub fn sparse_meta_prefix(table: &str) -> Vec<u8> {
    format!("sidxmeta:{table}:").into_bytes()
}

pub fn sparse_key(table: &str, column: &str, value: &str, pk: &str) -> Vec<u8> {
    format!("sidx:{table}:{column}:{}:{pk}", encode_component(value)).into_bytes()
}

pub fn sparse_prefix(table: &str, column: &str, value: &str) -> Vec<u8> {
    format!("sidx:{table}:{column}:{}:", encode_component(value)).into_bytes()
}

pub fn geo_meta(table: &str, column: &str) -> Vec<u8> {
    format!("gidxmeta:{table}:{column}").into_bytes()
}

pub fn geo_meta_prefix(table: &str) -> Vec<u8> {
    format!("gidxmeta:{table}:").into_bytes()
}

pub fn geo_key(table: &str, column: &str, geohash_hex: &str, pk: &str) -> Vec<u8> {
    format!("gidx:{table}:{column}:{geohash_hex}:{pk}").into_bytes()
}

pub fn geo_column_prefix(table: &str, column: &str) -> Vec<u8> {
    format!("gidx:{table}:{column}:").into_bytes()
}

pub fn ttl_meta(table: &str, column: &str) -> Vec<u8> {
    format!("ttlidxmeta:{table}:{column}").into_bytes()
}

pub fn ttl_meta_prefix(table: &str) -> Vec<u8> {
    format!("ttlidxmeta:{table}:").into_bytes()
}

pub fn ttl_key(table: &str, column: &str, expire_unix: i64, pk: &str) -> Vec<u8> {
    format!("ttlidx:{table}:{column}:{expire_unix:020}:{pk}").into_bytes()
}

pub fn ttl_column_prefix(table: &str, column: &str) -> Vec<u8> {
    format!("ttlidx:{table}:{column}:").into_bytes()
}

/// Exclusive upper bound for a TTL cleanup scan that must include entries
/// expiring exactly at `now_unix` (spec: "expiration <= now"). Bounding at
/// the bare `{now_unix:020}` prefix would exclude those entries — a key
/// with a trailing `:{pk}` sorts *after* its own prefix. Appending `0xFF`
/// after the trailing `:` pushes the bound past every entry for
/// `now_unix` (pk bytes are never `0xFF`, matching `encode_component`'s
/// own invariant) while still excluding `now_unix + 1`.
pub fn ttl_expiry_bound(table: &str, column: &str, now_unix: i64) -> Vec<u8> {
    let mut key = format!("ttlidx:{table}:{column}:{now_unix:020}:").into_bytes();
    key.push(0xFF);
    key
}

pub fn fulltext_meta(table: &str, column: &str) -> Vec<u8> {
    format!("ftidxmeta:{table}:{column}").into_bytes()
}

pub fn fulltext_meta_prefix(table: &str) -> Vec<u8> {
    format!("ftidxmeta:{table}:").into_bytes()
}

pub fn fulltext_posting_key(table: &str, column: &str, token: &str, pk: &str) -> Vec<u8> {
    format!("ftidx:{table}:{column}:{}:{pk}", encode_component(token)).into_bytes()
}

pub fn fulltext_posting_prefix(table: &str, column: &str, token: &str) -> Vec<u8> {
    format!("ftidx:{table}:{column}:{}:", encode_component(token)).into_bytes()
}

pub fn fulltext_column_prefix(table: &str, column: &str) -> Vec<u8> {
    format!("ftidx:{table}:{column}:").into_bytes()
}

/// Unlike the posting key, the term-frequency key does not percent-encode
/// its token — tokens never contain `:` once tokenized, and this mirrors
/// the reference implementation's own asymmetry.
pub fn fulltext_tf_key(table: &str, column: &str, token: &str, pk: &str) -> Vec<u8> {
    format!("fttf:{table}:{column}:{token}:{pk}").into_bytes()
}

pub fn fulltext_doclen_key(table: &str, column: &str, pk: &str) -> Vec<u8> {
    format!("ftdlen:{table}:{column}:{pk}").into_bytes()
}

pub fn fulltext_doclen_prefix(table: &str, column: &str) -> Vec<u8> {
    format!("ftdlen:{table}:{column}:").into_bytes()
}

/// Extracts the trailing `:`-delimited segment of a key (the primary key
/// of every index-family key shape). Assumes the primary key itself does
/// not contain `:`, matching the reference implementation's own
/// `key.rfind(':')` convention.
#[must_use]
pub fn trailing_pk(key: &[u8]) -> Option<&str> {
    let pos = key.iter().rposition(|&b| b == b':')?;
    std::str::from_utf8(&key[pos + 1..]).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn encode_component_escapes_only_colon_and_percent() {
        assert_eq!(encode_component("alice"), "alice");
        assert_eq!(encode_component("a:b"), "a%3Ab");
        assert_eq!(encode_component("50%"), "50%25");
        assert_eq!(encode_component("a:b%c"), "a%3Ab%25c");
    }

    #[test]
    fn encode_component_preserves_non_ascii() {
        assert_eq!(encode_component("münchen"), "münchen");
    }

    #[test]
    fn trailing_pk_extracts_last_segment() {
        let key = equality_key("users", "username", "alice", "u1");
        assert_eq!(trailing_pk(&key), Some("u1"));
    }
}
