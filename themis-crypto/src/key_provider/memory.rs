//! In-memory/test key provider: no persistence, no KEK hierarchy — every
//! key is generated or imported directly. Reference implementation used
//! by the rest of the workspace's test suites and by [`super::pki`] for
//! its own unit tests.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use themis_error::{Result, ThemisError};

use crate::cipher;
use super::{KeyMetadata, KeyProvider, KeyStatus};

#[derive(Debug, Clone)]
struct KeyRecord {
    version: u32,
    status: KeyStatus,
    key: [u8; 32],
    algorithm: String,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryKeyProvider {
    keys: Mutex<HashMap<String, Vec<KeyRecord>>>,
}

impl InMemoryKeyProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Demote every currently active record for `key_id` to deprecated and
    /// push a new active record. Shared by `rotate` and `create_from_bytes`
    /// since both establish a new single current version.
    fn push_new_active(
        records: &mut Vec<KeyRecord>,
        key: [u8; 32],
        algorithm: &str,
    ) -> u32 {
        let next_version = records.iter().map(|r| r.version).max().unwrap_or(0) + 1;
        for r in records.iter_mut() {
            if r.status == KeyStatus::Active {
                r.status = KeyStatus::Deprecated;
            }
        }
        records.push(KeyRecord {
            version: next_version,
            status: KeyStatus::Active,
            key,
            algorithm: algorithm.to_string(),
            created_at: Utc::now(),
        });
        next_version
    }
}

impl KeyProvider for InMemoryKeyProvider {
    fn get_key(&self, key_id: &str, version: Option<u32>) -> Result<[u8; 32]> {
        let keys = self.keys.lock();
        let records = keys
            .get(key_id)
            .ok_or_else(|| ThemisError::KeyNotFound { key_id: key_id.to_string(), version })?;

        let record = match version {
            Some(v) => records.iter().find(|r| r.version == v),
            None => records
                .iter()
                .filter(|r| r.status == KeyStatus::Active)
                .max_by_key(|r| r.version),
        }
        .ok_or_else(|| ThemisError::KeyNotFound { key_id: key_id.to_string(), version })?;

        if record.status == KeyStatus::Deleted {
            return Err(ThemisError::KeyOperationDenied {
                key_id: key_id.to_string(),
                version: record.version,
                reason: "key version is deleted".to_string(),
            });
        }
        Ok(record.key)
    }

    fn rotate(&self, key_id: &str) -> Result<u32> {
        let mut keys = self.keys.lock();
        let records = keys
            .get_mut(key_id)
            .ok_or_else(|| ThemisError::KeyNotFound { key_id: key_id.to_string(), version: None })?;
        let algorithm = records.last().map(|r| r.algorithm.clone()).unwrap_or_else(|| "AES-256-GCM".to_string());
        Ok(Self::push_new_active(records, cipher::generate_key(), &algorithm))
    }

    fn list(&self) -> Result<Vec<KeyMetadata>> {
        let keys = self.keys.lock();
        Ok(keys
            .iter()
            .flat_map(|(key_id, records)| {
                records.iter().map(move |r| KeyMetadata {
                    key_id: key_id.clone(),
                    version: r.version,
                    status: r.status,
                    algorithm: r.algorithm.clone(),
                    created_at: r.created_at,
                })
            })
            .collect())
    }

    fn delete(&self, key_id: &str, version: u32) -> Result<()> {
        let mut keys = self.keys.lock();
        let records = keys
            .get_mut(key_id)
            .ok_or_else(|| ThemisError::KeyNotFound { key_id: key_id.to_string(), version: Some(version) })?;
        let record = records
            .iter_mut()
            .find(|r| r.version == version)
            .ok_or_else(|| ThemisError::KeyNotFound { key_id: key_id.to_string(), version: Some(version) })?;
        if record.status == KeyStatus::Active {
            return Err(ThemisError::KeyOperationDenied {
                key_id: key_id.to_string(),
                version,
                reason: "cannot delete an active key version".to_string(),
            });
        }
        record.status = KeyStatus::Deleted;
        Ok(())
    }

    fn create_from_bytes(&self, key_id: &str, key_bytes: &[u8], algorithm: &str) -> Result<u32> {
        if key_bytes.len() != 32 {
            return Err(ThemisError::InvalidArgument(format!(
                "key material must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(key_bytes);

        let mut keys = self.keys.lock();
        let records = keys.entry(key_id.to_string()).or_default();
        Ok(Self::push_new_active(records, key, algorithm))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_latest() {
        let provider = InMemoryKeyProvider::new();
        let key = cipher::generate_key();
        let v = provider.create_from_bytes("k1", &key, "AES-256-GCM").unwrap();
        assert_eq!(v, 1);
        assert_eq!(provider.get_key("k1", None).unwrap(), key);
        assert_eq!(provider.get_key("k1", Some(1)).unwrap(), key);
    }

    #[test]
    fn rotation_is_monotone_and_demotes_previous() {
        let provider = InMemoryKeyProvider::new();
        provider.create_from_bytes("k1", &cipher::generate_key(), "AES-256-GCM").unwrap();
        let v2 = provider.rotate("k1").unwrap();
        assert_eq!(v2, 2);

        let metas = provider.list().unwrap();
        let v1_status = metas.iter().find(|m| m.version == 1).unwrap().status;
        let v2_status = metas.iter().find(|m| m.version == 2).unwrap().status;
        assert_eq!(v1_status, KeyStatus::Deprecated);
        assert_eq!(v2_status, KeyStatus::Active);
    }

    #[test]
    fn deleted_key_denies_access() {
        let provider = InMemoryKeyProvider::new();
        provider.create_from_bytes("k1", &cipher::generate_key(), "AES-256-GCM").unwrap();
        provider.rotate("k1").unwrap();
        provider.delete("k1", 1).unwrap();
        assert!(matches!(
            provider.get_key("k1", Some(1)),
            Err(ThemisError::KeyOperationDenied { .. })
        ));
    }

    #[test]
    fn deleting_active_version_is_denied() {
        let provider = InMemoryKeyProvider::new();
        provider.create_from_bytes("k1", &cipher::generate_key(), "AES-256-GCM").unwrap();
        assert!(matches!(
            provider.delete("k1", 1),
            Err(ThemisError::KeyOperationDenied { .. })
        ));
    }

    #[test]
    fn missing_key_is_not_found() {
        let provider = InMemoryKeyProvider::new();
        assert!(matches!(
            provider.get_key("nope", None),
            Err(ThemisError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn wrong_length_key_bytes_rejected() {
        let provider = InMemoryKeyProvider::new();
        assert!(provider.create_from_bytes("k1", b"too short", "AES-256-GCM").is_err());
    }
}
