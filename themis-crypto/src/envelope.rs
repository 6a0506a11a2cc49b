//! The self-describing envelope blob (§3.2) and the codec that produces
//! and consumes it.
//!
//! An envelope never needs external context to decrypt: it carries the
//! key_id and key_version that produced it, so decryption never guesses
//! which key to ask the provider for.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use themis_error::{Result, ThemisError};

use crate::cipher::{self, IV_LEN, TAG_LEN};
use crate::derived_cache::DerivedKeyCache;
use crate::key_provider::KeyProvider;

/// A self-describing, authenticated ciphertext blob: `(key_id,
/// key_version, iv, ciphertext, tag)`. Any change to any field must cause
/// authentication failure on decrypt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub key_id: String,
    pub key_version: u32,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub tag: Vec<u8>,
}

/// Structured (JSON) serialization, with base64-encoded binary fields.
#[derive(Debug, Serialize, Deserialize)]
struct StructuredEnvelope {
    key_id: String,
    key_version: u32,
    iv: String,
    ciphertext: String,
    tag: String,
}

impl Envelope {
    /// Compact form: `key_id ":" version ":" base64(iv) ":"
    /// base64(ciphertext) ":" base64(tag)`. `key_id` itself may contain
    /// `:`; parsing splits from the right so the leading remainder
    /// (however many `:` it contains) rejoins into `key_id`.
    #[must_use]
    pub fn to_compact(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.key_id,
            self.key_version,
            B64.encode(&self.iv),
            B64.encode(&self.ciphertext),
            B64.encode(&self.tag),
        )
    }

    pub fn from_compact(s: &str) -> Result<Self> {
        let mut parts: Vec<&str> = s.rsplitn(4, ':').collect();
        if parts.len() != 4 {
            return Err(ThemisError::DecryptionError(
                "malformed compact envelope: expected 5 colon-separated fields".to_string(),
            ));
        }
        // rsplitn(4, ':') on "a:b:c:d:e" yields ["e", "d", "c", "a:b"] — the
        // leading remainder (possibly containing ':') is the last element.
        let tag_b64 = parts.remove(0);
        let ciphertext_b64 = parts.remove(0);
        let iv_b64 = parts.remove(0);
        let head = parts.remove(0);
        let (key_id, version_str) = head
            .rsplit_once(':')
            .ok_or_else(|| ThemisError::DecryptionError("malformed compact envelope: missing version".to_string()))?;

        let key_version: u32 = version_str
            .parse()
            .map_err(|e| ThemisError::DecryptionError(format!("malformed compact envelope version: {e}")))?;
        let iv = B64
            .decode(iv_b64)
            .map_err(|e| ThemisError::DecryptionError(format!("malformed compact envelope iv: {e}")))?;
        let ciphertext = B64
            .decode(ciphertext_b64)
            .map_err(|e| ThemisError::DecryptionError(format!("malformed compact envelope ciphertext: {e}")))?;
        let tag = B64
            .decode(tag_b64)
            .map_err(|e| ThemisError::DecryptionError(format!("malformed compact envelope tag: {e}")))?;

        Ok(Self {
            key_id: key_id.to_string(),
            key_version,
            iv,
            ciphertext,
            tag,
        })
    }

    #[must_use]
    pub fn to_structured(&self) -> String {
        let wire = StructuredEnvelope {
            key_id: self.key_id.clone(),
            key_version: self.key_version,
            iv: B64.encode(&self.iv),
            ciphertext: B64.encode(&self.ciphertext),
            tag: B64.encode(&self.tag),
        };
        // A JSON document constructed from our own fields never fails to
        // serialize.
        serde_json::to_string(&wire).unwrap_or_default()
    }

    pub fn from_structured(s: &str) -> Result<Self> {
        let wire: StructuredEnvelope = serde_json::from_str(s)
            .map_err(|e| ThemisError::DecryptionError(format!("malformed structured envelope: {e}")))?;
        Ok(Self {
            key_id: wire.key_id,
            key_version: wire.key_version,
            iv: B64
                .decode(&wire.iv)
                .map_err(|e| ThemisError::DecryptionError(format!("malformed structured envelope iv: {e}")))?,
            ciphertext: B64
                .decode(&wire.ciphertext)
                .map_err(|e| ThemisError::DecryptionError(format!("malformed structured envelope ciphertext: {e}")))?,
            tag: B64
                .decode(&wire.tag)
                .map_err(|e| ThemisError::DecryptionError(format!("malformed structured envelope tag: {e}")))?,
        })
    }

    /// A zero-value placeholder used to isolate per-item failures inside
    /// [`EnvelopeCodec::batch_encrypt`] — never produced by a real
    /// encryption path, never decryptable.
    fn failure_placeholder(key_id: &str) -> Self {
        Self {
            key_id: key_id.to_string(),
            key_version: 0,
            iv: vec![0u8; IV_LEN],
            ciphertext: Vec::new(),
            tag: vec![0u8; TAG_LEN],
        }
    }
}

/// Field-level envelope encryption over a polymorphic [`KeyProvider`].
pub struct EnvelopeCodec {
    provider: Arc<dyn KeyProvider>,
    derived_cache: DerivedKeyCache,
}

impl EnvelopeCodec {
    #[must_use]
    pub fn new(provider: Arc<dyn KeyProvider>) -> Self {
        Self {
            provider,
            derived_cache: DerivedKeyCache::new(),
        }
    }

    /// Encrypt `plaintext` under the latest active version of `key_id`.
    #[tracing::instrument(skip(self, plaintext))]
    pub fn encrypt(&self, plaintext: &[u8], key_id: &str) -> Result<Envelope> {
        let key = self.provider.get_key(key_id, None)?;
        let version = self.latest_version(key_id)?;
        self.encrypt_with_key(plaintext, key_id, version, &key)
    }

    /// Encrypt `plaintext` with caller-supplied raw key material, bypassing
    /// the provider lookup. Used by the batched/derived paths.
    pub fn encrypt_with_key(
        &self,
        plaintext: &[u8],
        key_id: &str,
        version: u32,
        raw_key: &[u8],
    ) -> Result<Envelope> {
        if raw_key.len() != 32 {
            return Err(ThemisError::EncryptionError(format!(
                "raw key must be 32 bytes, got {}",
                raw_key.len()
            )));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(raw_key);
        let iv = cipher::generate_iv();
        let (ciphertext, tag) = cipher::encrypt(&key, &iv, plaintext)?;
        Ok(Envelope {
            key_id: key_id.to_string(),
            key_version: version,
            iv: iv.to_vec(),
            ciphertext,
            tag: tag.to_vec(),
        })
    }

    /// Decrypt `blob`, fetching the exact `(key_id, key_version)` it
    /// names. Never guesses a key and never returns partial plaintext on
    /// authentication failure.
    #[tracing::instrument(skip(self, blob))]
    pub fn decrypt(&self, blob: &Envelope) -> Result<Vec<u8>> {
        let key = self.provider.get_key(&blob.key_id, Some(blob.key_version))?;
        Self::decrypt_with_key(blob, &key)
    }

    /// Decrypt `blob` against caller-supplied raw key material, bypassing
    /// the provider lookup. Shared by [`Self::decrypt`] and
    /// [`Self::batch_decrypt`], whose key comes from a per-entity HKDF
    /// derivation rather than the provider.
    fn decrypt_with_key(blob: &Envelope, raw_key: &[u8]) -> Result<Vec<u8>> {
        if blob.iv.len() != IV_LEN {
            return Err(ThemisError::DecryptionError(format!(
                "iv must be {IV_LEN} bytes, got {}",
                blob.iv.len()
            )));
        }
        if blob.tag.len() != TAG_LEN {
            return Err(ThemisError::DecryptionError(format!(
                "tag must be {TAG_LEN} bytes, got {}",
                blob.tag.len()
            )));
        }
        if raw_key.len() != 32 {
            return Err(ThemisError::DecryptionError(format!(
                "raw key must be 32 bytes, got {}",
                raw_key.len()
            )));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(raw_key);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&blob.iv);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&blob.tag);
        cipher::decrypt(&key, &iv, &blob.ciphertext, &tag)
    }

    /// Encrypt a batch of `(entity_salt, plaintext)` pairs under one
    /// provider lookup, deriving a per-entity key via HKDF through the
    /// derived-key cache and fanning out over `rayon`'s work-stealing
    /// pool. Result order matches input order; a per-item failure is
    /// isolated — that slot receives a placeholder blob and the rest of
    /// the batch proceeds.
    ///
    /// The resulting envelopes are stamped with the *base* key's
    /// `(key_id, key_version)`, not the derived per-entity key — the
    /// derivation salt is the caller's `entity_salt`, which is not part
    /// of the envelope. Decrypting one of these blobs therefore requires
    /// [`Self::batch_decrypt`] (supplying the same `entity_salt`), not
    /// [`Self::decrypt`], which would fetch the base key and fail the
    /// authentication tag.
    #[tracing::instrument(skip(self, items))]
    pub fn batch_encrypt(&self, items: &[(String, Vec<u8>)], key_id: &str) -> Result<Vec<Envelope>> {
        let key = self.provider.get_key(key_id, None)?;
        let version = self.latest_version(key_id)?;

        Ok(items
            .par_iter()
            .map(|(entity_salt, plaintext)| {
                let info = format!("entity:{entity_salt}");
                match self
                    .derived_cache
                    .derive(&key, entity_salt.as_bytes(), info.as_bytes())
                    .and_then(|derived| self.encrypt_with_key(plaintext, key_id, version, &derived))
                {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        tracing::warn!(entity_salt, error = %e, "batch_encrypt: isolating per-item failure");
                        Envelope::failure_placeholder(key_id)
                    }
                }
            })
            .collect())
    }

    /// Decrypt a batch of `(entity_salt, envelope)` pairs produced by
    /// [`Self::batch_encrypt`]: one provider lookup per distinct
    /// `(key_id, key_version)`, re-deriving each item's per-entity key
    /// through the same derived-key cache and `"entity:" + entity_salt`
    /// info string used to encrypt it. Result order matches input order;
    /// a per-item failure (wrong salt, tampered ciphertext, deleted key)
    /// is isolated to that slot's `Err` rather than aborting the batch.
    #[tracing::instrument(skip(self, items))]
    pub fn batch_decrypt(&self, items: &[(String, Envelope)]) -> Vec<Result<Vec<u8>>> {
        items
            .par_iter()
            .map(|(entity_salt, envelope)| {
                let key = self.provider.get_key(&envelope.key_id, Some(envelope.key_version))?;
                let info = format!("entity:{entity_salt}");
                let derived = self.derived_cache.derive(&key, entity_salt.as_bytes(), info.as_bytes())?;
                Self::decrypt_with_key(envelope, &derived)
            })
            .collect()
    }

    fn latest_version(&self, key_id: &str) -> Result<u32> {
        self.provider
            .list()?
            .into_iter()
            .filter(|m| m.key_id == key_id && m.status == crate::key_provider::KeyStatus::Active)
            .map(|m| m.version)
            .max()
            .ok_or_else(|| ThemisError::KeyNotFound {
                key_id: key_id.to_string(),
                version: None,
            })
    }
}

/// A typed field wrapper around the envelope codec. Per spec.md §9's
/// redesign note, the codec is always passed in explicitly — never held
/// behind a global/static — so callers control its lifetime and tests can
/// substitute fakes freely.
pub struct EncryptedField<T> {
    envelope: Option<Envelope>,
    _marker: std::marker::PhantomData<T>,
}

/// Types that `EncryptedField<T>` can carry. String is identity; integers
/// are base-10 decimal; doubles use Rust's `Display`, which already
/// produces the shortest round-trippable decimal representation.
pub trait FieldCodec: Sized {
    fn to_plaintext_bytes(&self) -> Vec<u8>;
    fn from_plaintext_bytes(bytes: &[u8]) -> Result<Self>;
}

impl FieldCodec for String {
    fn to_plaintext_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_plaintext_bytes(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ThemisError::DecryptionError(format!("not valid UTF-8: {e}")))
    }
}

impl FieldCodec for i64 {
    fn to_plaintext_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    fn from_plaintext_bytes(bytes: &[u8]) -> Result<Self> {
        std::str::from_utf8(bytes)
            .map_err(|e| ThemisError::DecryptionError(format!("not valid UTF-8: {e}")))?
            .parse()
            .map_err(|e| ThemisError::DecryptionError(format!("not a valid i64: {e}")))
    }
}

impl FieldCodec for f64 {
    fn to_plaintext_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    fn from_plaintext_bytes(bytes: &[u8]) -> Result<Self> {
        std::str::from_utf8(bytes)
            .map_err(|e| ThemisError::DecryptionError(format!("not valid UTF-8: {e}")))?
            .parse()
            .map_err(|e| ThemisError::DecryptionError(format!("not a valid f64: {e}")))
    }
}

impl<T: FieldCodec> EncryptedField<T> {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            envelope: None,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn encrypt(codec: &EnvelopeCodec, value: &T, key_id: &str) -> Result<Self> {
        let envelope = codec.encrypt(&value.to_plaintext_bytes(), key_id)?;
        Ok(Self {
            envelope: Some(envelope),
            _marker: std::marker::PhantomData,
        })
    }

    pub fn decrypt(&self, codec: &EnvelopeCodec) -> Result<T> {
        let envelope = self
            .envelope
            .as_ref()
            .ok_or_else(|| ThemisError::DecryptionError("encrypted field is empty".to_string()))?;
        let plaintext = codec.decrypt(envelope)?;
        T::from_plaintext_bytes(&plaintext)
    }

    #[must_use]
    pub fn to_compact(&self) -> Option<String> {
        self.envelope.as_ref().map(Envelope::to_compact)
    }

    pub fn from_compact(s: &str) -> Result<Self> {
        Ok(Self {
            envelope: Some(Envelope::from_compact(s)?),
            _marker: std::marker::PhantomData,
        })
    }

    #[must_use]
    pub fn to_structured(&self) -> Option<String> {
        self.envelope.as_ref().map(Envelope::to_structured)
    }

    pub fn from_structured(s: &str) -> Result<Self> {
        Ok(Self {
            envelope: Some(Envelope::from_structured(s)?),
            _marker: std::marker::PhantomData,
        })
    }
}
