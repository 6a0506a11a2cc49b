//! The entity model (L4): a primary key paired with an ordered mapping of
//! field name to a typed value variant.

use serde::{Deserialize, Serialize};
use themis_error::{Result, ThemisError};

/// A typed field value. Fields beginning with an underscore carry graph
/// topology metadata (`_from`, `_to`, `label`) by convention, not by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum FieldValue {
    Str(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Vector(Vec<f32>),
    Null,
}

impl FieldValue {
    /// Canonical string form used as the index-value source (spec:
    /// `extract_field`). String is identity; integers are base-10
    /// decimal; doubles use Rust's `Display`, which already produces the
    /// shortest round-trippable decimal representation.
    #[must_use]
    pub fn to_canonical_string(&self) -> Option<String> {
        match self {
            FieldValue::Str(s) => Some(s.clone()),
            FieldValue::I64(i) => Some(i.to_string()),
            FieldValue::F64(f) => Some(f.to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Bytes(_) | FieldValue::Vector(_) | FieldValue::Null => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::I64(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::F64(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null_or_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Str(s) => s.is_empty(),
            _ => false,
        }
    }
}

/// An entity: a primary key and an ordered mapping of field name to
/// value. Order is preserved (a `Vec` of pairs, not a `HashMap`) because
/// serialization must be deterministic and round-trip identity must hold
/// for every supported variant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Entity {
    #[serde(skip)]
    primary_key: String,
    fields: Vec<(String, FieldValue)>,
}

impl Entity {
    #[must_use]
    pub fn new(primary_key: impl Into<String>) -> Self {
        Self {
            primary_key: primary_key.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    /// Insert or replace a field value, preserving insertion order for
    /// genuinely new fields and in-place position for replacements.
    pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Canonical string form of a field, used as the index-value source.
    #[must_use]
    pub fn extract_field(&self, name: &str) -> Option<String> {
        self.get_field(name).and_then(FieldValue::to_canonical_string)
    }

    /// Serialize to bytes. Round-trip with [`Entity::deserialize`] is
    /// identity for every supported variant.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.fields)
            .map_err(|e| ThemisError::SchemaDecodeError(format!("entity serialize: {e}")))
    }

    /// Reconstruct an entity from its primary key and serialized bytes.
    pub fn deserialize(primary_key: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let fields: Vec<(String, FieldValue)> = serde_json::from_slice(bytes)
            .map_err(|e| ThemisError::SchemaDecodeError(format!("entity deserialize: {e}")))?;
        Ok(Self {
            primary_key: primary_key.into(),
            fields,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serialize_deserialize_roundtrip_all_variants() {
        let mut e = Entity::new("e1");
        e.set_field("name", FieldValue::Str("alice".to_string()));
        e.set_field("age", FieldValue::I64(30));
        e.set_field("score", FieldValue::F64(3.5));
        e.set_field("active", FieldValue::Bool(true));
        e.set_field("blob", FieldValue::Bytes(vec![1, 2, 3]));
        e.set_field("embedding", FieldValue::Vector(vec![0.1, 0.2, 0.3]));
        e.set_field("note", FieldValue::Null);

        let bytes = e.serialize().unwrap();
        let back = Entity::deserialize("e1", &bytes).unwrap();
        assert_eq!(back.fields(), e.fields());
    }

    #[test]
    fn set_field_replaces_in_place() {
        let mut e = Entity::new("e1");
        e.set_field("a", FieldValue::I64(1));
        e.set_field("b", FieldValue::I64(2));
        e.set_field("a", FieldValue::I64(99));
        assert_eq!(
            e.fields(),
            &[
                ("a".to_string(), FieldValue::I64(99)),
                ("b".to_string(), FieldValue::I64(2)),
            ]
        );
    }

    #[test]
    fn extract_field_canonical_string() {
        let mut e = Entity::new("e1");
        e.set_field("age", FieldValue::I64(-7));
        e.set_field("score", FieldValue::F64(1.0 / 3.0));
        assert_eq!(e.extract_field("age").as_deref(), Some("-7"));
        assert_eq!(e.extract_field("score"), Some((1.0 / 3.0).to_string()));
        assert_eq!(e.extract_field("missing"), None);
    }
}
