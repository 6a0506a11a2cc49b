//! PKI signing-service contract (spec.md §4.7/§6): sign and verify a
//! detached signature over a precomputed hash.
//!
//! Grounded in `original_source/include/utils/pki_client.h`'s
//! `VCCPKIClient`: the contract is a `sign_hash`/`verify_hash` pair over
//! raw hash bytes, not over whole messages, because the caller (the SAGA
//! logger) already computes `SHA-256(iv || ciphertext || tag)` itself.
//! Only the semantic contract lives here; an HTTP-backed signing service
//! is explicitly out of scope (spec.md §1).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use themis_crypto::constant_time::ct_eq;
use themis_error::{Result, ThemisError};
use zeroize::Zeroizing;

/// Default signature algorithm tag, matching the reference client's
/// default (`RSA-SHA256`), carried even when the local mode is the
/// hashed-stub (callers must not be able to distinguish the two modes).
pub const DEFAULT_ALGORITHM: &str = "RSA-SHA256";

/// A detached signature over a hash, plus provenance metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureResult {
    pub ok: bool,
    pub signature_id: String,
    pub algorithm: String,
    pub signature_b64: String,
    pub cert_serial: Option<String>,
}

/// Signs and verifies detached signatures over precomputed hashes. The
/// only `async fn` surface besides `themis-crypto`'s external-KMS
/// provider and the JWKS validator ([`crate::jwks`]).
#[async_trait]
pub trait SigningProvider: Send + Sync {
    async fn sign_hash(&self, hash: &[u8]) -> Result<SignatureResult>;
    async fn verify_hash(&self, hash: &[u8], signature: &SignatureResult) -> Result<bool>;
}

/// How [`LocalSigningProvider`] authenticates a hash.
enum LocalMode {
    /// Grounds `pki_client.cpp`'s stub: the "signature" is just
    /// base64(hash), with no real key material. Permitted for
    /// development; must be indistinguishable from production mode to
    /// callers (spec.md §4.7).
    HashedStub,
    /// A configured private-key secret is mixed into the hash before
    /// encoding, so that a caller without the secret cannot forge a
    /// signature. Named after the production mode it stands in for
    /// (local PEM, RSA-SHA256) — this crate does not implement RSA
    /// itself, since that is HTTP/PKI-client internal detail spec.md §1
    /// places out of scope; this keyed digest is the semantic contract.
    Keyed { secret: Zeroizing<Vec<u8>> },
}

/// Local (non-HTTP) signing provider: either a hashed-stub dev mode or a
/// keyed mode backed by a configured secret, both implementing the same
/// contract spec.md §4.7 requires to be indistinguishable to callers.
pub struct LocalSigningProvider {
    mode: LocalMode,
    algorithm: String,
    cert_serial: Option<String>,
}

impl LocalSigningProvider {
    /// The hashed-stub development mode.
    #[must_use]
    pub fn stub() -> Self {
        Self {
            mode: LocalMode::HashedStub,
            algorithm: DEFAULT_ALGORITHM.to_string(),
            cert_serial: None,
        }
    }

    /// The keyed mode, standing in for a PEM-backed RSA-SHA256 signer.
    #[must_use]
    pub fn keyed(secret: Vec<u8>, cert_serial: Option<String>) -> Self {
        Self {
            mode: LocalMode::Keyed {
                secret: Zeroizing::new(secret),
            },
            algorithm: DEFAULT_ALGORITHM.to_string(),
            cert_serial,
        }
    }

    fn encode(&self, hash: &[u8]) -> String {
        match &self.mode {
            LocalMode::HashedStub => B64.encode(hash),
            LocalMode::Keyed { secret } => {
                let mut hasher = Sha256::new();
                hasher.update(secret.as_slice());
                hasher.update(hash);
                B64.encode(hasher.finalize())
            }
        }
    }

    fn random_signature_id() -> String {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("sig_{}", hex::encode(bytes))
    }
}

#[async_trait]
impl SigningProvider for LocalSigningProvider {
    async fn sign_hash(&self, hash: &[u8]) -> Result<SignatureResult> {
        Ok(SignatureResult {
            ok: true,
            signature_id: Self::random_signature_id(),
            algorithm: self.algorithm.clone(),
            signature_b64: self.encode(hash),
            cert_serial: self.cert_serial.clone(),
        })
    }

    async fn verify_hash(&self, hash: &[u8], signature: &SignatureResult) -> Result<bool> {
        if !signature.ok {
            return Ok(false);
        }
        let expected = self.encode(hash);
        Ok(ct_eq(expected.as_bytes(), signature.signature_b64.as_bytes()))
    }
}

/// Convenience used by callers who need a hard failure rather than a
/// boolean on verification failure.
pub async fn verify_or_signature_invalid(
    provider: &dyn SigningProvider,
    hash: &[u8],
    signature: &SignatureResult,
) -> Result<()> {
    if provider.verify_hash(hash, signature).await? {
        Ok(())
    } else {
        Err(ThemisError::SignatureInvalid(
            "pki signature verification failed".to_string(),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_mode_roundtrips() {
        let provider = LocalSigningProvider::stub();
        let hash = Sha256::digest(b"batch contents").to_vec();
        let sig = provider.sign_hash(&hash).await.unwrap();
        assert!(provider.verify_hash(&hash, &sig).await.unwrap());
    }

    #[tokio::test]
    async fn keyed_mode_rejects_tampered_hash() {
        let provider = LocalSigningProvider::keyed(b"service-secret".to_vec(), Some("SERIAL-1".to_string()));
        let hash = Sha256::digest(b"batch contents").to_vec();
        let sig = provider.sign_hash(&hash).await.unwrap();
        assert!(provider.verify_hash(&hash, &sig).await.unwrap());

        let tampered_hash = Sha256::digest(b"different contents").to_vec();
        assert!(!provider.verify_hash(&tampered_hash, &sig).await.unwrap());
    }

    #[tokio::test]
    async fn keyed_mode_requires_matching_secret() {
        let a = LocalSigningProvider::keyed(b"secret-a".to_vec(), None);
        let b = LocalSigningProvider::keyed(b"secret-b".to_vec(), None);
        let hash = Sha256::digest(b"contents").to_vec();
        let sig = a.sign_hash(&hash).await.unwrap();
        assert!(!b.verify_hash(&hash, &sig).await.unwrap());
    }

    #[tokio::test]
    async fn verify_or_signature_invalid_surfaces_themis_error() {
        let provider = LocalSigningProvider::stub();
        let hash = Sha256::digest(b"x").to_vec();
        let mut sig = provider.sign_hash(&hash).await.unwrap();
        sig.signature_b64 = "tampered".to_string();
        let err = verify_or_signature_invalid(&provider, &hash, &sig)
            .await
            .unwrap_err();
        assert!(matches!(err, ThemisError::SignatureInvalid(_)));
    }
}
