//! The key provider (L1): a polymorphic interface over three variants —
//! [`memory::InMemoryKeyProvider`] (in-memory/test), [`pki::PkiKeyProvider`]
//! (persistent-IKM-backed), and, behind the `external-kms` feature,
//! [`kms::ExternalKmsKeyProvider`] (HTTP transport to a remote KMS).

pub mod memory;
pub mod pki;

#[cfg(feature = "external-kms")]
pub mod kms;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use themis_error::Result;

/// A key's position in its lifecycle. `Active` is the only status new
/// encryptions may use; `Deprecated` keys remain readable; `Deleted` keys
/// deny every operation; `Rotating` marks an in-flight dual-write window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Deprecated,
    Rotating,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub key_id: String,
    pub version: u32,
    pub status: KeyStatus,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
}

/// The key-provider contract. Implementations must be safe under
/// concurrent invocation (`Send + Sync`, interior-mutable).
pub trait KeyProvider: Send + Sync {
    /// Fetch a key's raw bytes. `version = None` means "the latest active
    /// version". Fails with `KeyNotFound` if the (key_id, version) pair is
    /// absent, `KeyOperationDenied` if its status is `Deleted`.
    fn get_key(&self, key_id: &str, version: Option<u32>) -> Result<[u8; 32]>;

    /// Roll a new active version into existence. Previously active
    /// versions transition to `Deprecated`. Version numbers are monotone:
    /// they never decrease or repeat.
    fn rotate(&self, key_id: &str) -> Result<u32>;

    /// Every (key_id, version) tuple this provider knows about.
    fn list(&self) -> Result<Vec<KeyMetadata>>;

    /// Permanently deny a version. Only legal when its status is not
    /// `Active`.
    fn delete(&self, key_id: &str, version: u32) -> Result<()>;

    /// Import externally generated key bytes as a new active version.
    /// Fails with `InvalidArgument` if `key_bytes` is not exactly 32
    /// bytes.
    fn create_from_bytes(&self, key_id: &str, key_bytes: &[u8], algorithm: &str) -> Result<u32>;
}
