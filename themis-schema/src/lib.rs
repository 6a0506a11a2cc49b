//! The metadata encryption policy (L8).
//!
//! A schema document declares, per entity type, which fields are
//! confidential and which key context (per-user or per-group) derives the
//! field key. This crate only decides the policy; [`themis-crypto`] and
//! [`themis-index`] carry it out and own the failure handling described by
//! the hard rules below.
//!
//! Hard rules (enforced by [`plan_write`]):
//! - Vector embeddings are never encrypted, schema or no schema.
//! - A missing schema (or a missing field entry within one) means the field
//!   stays plaintext.
//! - A malformed stored schema document falls back to "no schema" (every
//!   field plaintext) with a warning, rather than failing the write.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use themis_entity::{Entity, FieldValue};
use themis_error::Result;

/// Which identity a field's key is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyContext {
    /// Derived from the acting user's id (`deriveUserKey`-style).
    User,
    /// Derived from a named group's group DEK.
    Group,
}

/// The declared policy for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPolicy {
    pub encrypted: bool,
    #[serde(default = "default_context")]
    pub context: KeyContext,
}

fn default_context() -> KeyContext {
    KeyContext::User
}

impl FieldPolicy {
    #[must_use]
    pub fn plaintext() -> Self {
        Self {
            encrypted: false,
            context: KeyContext::User,
        }
    }

    #[must_use]
    pub fn encrypted(context: KeyContext) -> Self {
        Self {
            encrypted: true,
            context,
        }
    }
}

/// The declared policy for one entity type: a map from field name to
/// [`FieldPolicy`]. Fields absent from the map are plaintext.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySchema {
    pub entity_type: String,
    pub fields: BTreeMap<String, FieldPolicy>,
}

impl EntitySchema {
    #[must_use]
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn declare(&mut self, field: impl Into<String>, policy: FieldPolicy) -> &mut Self {
        self.fields.insert(field.into(), policy);
        self
    }

    #[must_use]
    pub fn policy_for(&self, field: &str) -> Option<&FieldPolicy> {
        self.fields.get(field)
    }
}

/// A registry of entity schemas, keyed by entity type. Loaded once at
/// startup (or on schema change) from the stored dynamic JSON document.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: BTreeMap<String, EntitySchema>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: EntitySchema) {
        self.entities.insert(schema.entity_type.clone(), schema);
    }

    #[must_use]
    pub fn get(&self, entity_type: &str) -> Option<&EntitySchema> {
        self.entities.get(entity_type)
    }

    /// Parse a schema document from its stored JSON form. A malformed
    /// document is treated as "no schema" (logged, not propagated) per the
    /// discovery-layer failure policy: schema decode failures downgrade to
    /// defaults with a warning rather than aborting the caller.
    #[must_use]
    pub fn load_from_json(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<BTreeMap<String, EntitySchema>>(bytes) {
            Ok(entities) => Self { entities },
            Err(e) => {
                tracing::warn!(error = %e, "schema document failed to parse; falling back to no schema");
                Self::default()
            }
        }
    }
}

/// What to do with a single field at write time.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDecision {
    /// Store as-is; never route through the encryptor.
    Plaintext,
    /// Encrypt under the given key context before storing.
    Encrypt(KeyContext),
}

/// Decide, for every field on `entity`, whether it is stored plaintext or
/// encrypted under which context. `schema` is `None` when the entity type
/// has no registered schema, in which case every field is plaintext.
#[must_use]
pub fn plan_write(schema: Option<&EntitySchema>, entity: &Entity) -> Vec<(String, FieldDecision)> {
    entity
        .fields()
        .iter()
        .map(|(name, value)| {
            let decision = if matches!(value, FieldValue::Vector(_)) {
                FieldDecision::Plaintext
            } else {
                match schema.and_then(|s| s.policy_for(name)) {
                    Some(policy) if policy.encrypted => FieldDecision::Encrypt(policy.context),
                    _ => FieldDecision::Plaintext,
                }
            };
            (name.clone(), decision)
        })
        .collect()
}

/// Look up the decrypting context for a single field at read time. Returns
/// `None` when the field is plaintext (no schema, no declared policy, or a
/// vector field).
#[must_use]
pub fn decrypting_context(schema: Option<&EntitySchema>, field: &str, value: &FieldValue) -> Option<KeyContext> {
    if matches!(value, FieldValue::Vector(_)) {
        return None;
    }
    schema
        .and_then(|s| s.policy_for(field))
        .filter(|p| p.encrypted)
        .map(|p| p.context)
}

/// Serialize a registry back to the stored dynamic JSON form.
pub fn to_json(registry: &SchemaRegistry) -> Result<Vec<u8>> {
    serde_json::to_vec(&registry.entities)
        .map_err(|e| themis_error::ThemisError::SchemaDecodeError(format!("schema serialize: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn patient_schema() -> EntitySchema {
        let mut schema = EntitySchema::new("patient");
        schema.declare("ssn", FieldPolicy::encrypted(KeyContext::User));
        schema.declare("diagnosis", FieldPolicy::encrypted(KeyContext::Group));
        schema.declare("_from", FieldPolicy::plaintext());
        schema
    }

    #[test]
    fn missing_schema_means_all_plaintext() {
        let mut e = Entity::new("p1");
        e.set_field("ssn", FieldValue::Str("123-45-6789".to_string()));
        let plan = plan_write(None, &e);
        assert_eq!(plan, vec![("ssn".to_string(), FieldDecision::Plaintext)]);
    }

    #[test]
    fn declared_fields_route_to_their_context() {
        let schema = patient_schema();
        let mut e = Entity::new("p1");
        e.set_field("ssn", FieldValue::Str("123-45-6789".to_string()));
        e.set_field("diagnosis", FieldValue::Str("flu".to_string()));
        e.set_field("_from", FieldValue::Str("hospital:1".to_string()));
        e.set_field("notes", FieldValue::Str("undeclared".to_string()));

        let plan = plan_write(Some(&schema), &e);
        assert_eq!(
            plan,
            vec![
                ("ssn".to_string(), FieldDecision::Encrypt(KeyContext::User)),
                ("diagnosis".to_string(), FieldDecision::Encrypt(KeyContext::Group)),
                ("_from".to_string(), FieldDecision::Plaintext),
                ("notes".to_string(), FieldDecision::Plaintext),
            ]
        );
    }

    #[test]
    fn vector_fields_are_never_encrypted_even_if_declared() {
        let mut schema = EntitySchema::new("doc");
        schema.declare("embedding", FieldPolicy::encrypted(KeyContext::User));
        let mut e = Entity::new("d1");
        e.set_field("embedding", FieldValue::Vector(vec![0.1, 0.2]));

        let plan = plan_write(Some(&schema), &e);
        assert_eq!(plan, vec![("embedding".to_string(), FieldDecision::Plaintext)]);
    }

    #[test]
    fn malformed_schema_document_falls_back_to_default() {
        let registry = SchemaRegistry::load_from_json(b"not json");
        assert!(registry.get("patient").is_none());
    }

    #[test]
    fn registry_round_trips_through_json() {
        let mut registry = SchemaRegistry::new();
        registry.register(patient_schema());
        let bytes = to_json(&registry).unwrap();
        let reloaded = SchemaRegistry::load_from_json(&bytes);
        let schema = reloaded.get("patient").unwrap();
        assert_eq!(
            schema.policy_for("ssn"),
            Some(&FieldPolicy::encrypted(KeyContext::User))
        );
    }
}
