//! The generic encryptor seam `EncryptedField<T>` is parametrized over
//! (see [`crate::envelope`]): synchronous, since the core never awaits
//! inside L0-L8 — only the external-KMS key provider transport is async.

use themis_error::Result;

pub trait Encryptor: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
    fn algorithm(&self) -> &str;
}

/// Identity encryptor, useful in tests that want to exercise the envelope
/// plumbing without real ciphertext.
#[derive(Debug, Default)]
pub struct NoOpEncryptor;

impl Encryptor for NoOpEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }

    fn algorithm(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn noop_encryptor_is_identity() {
        let e = NoOpEncryptor;
        let ct = e.encrypt(b"hello").unwrap();
        assert_eq!(ct, b"hello");
        assert_eq!(e.decrypt(&ct).unwrap(), b"hello");
    }
}
