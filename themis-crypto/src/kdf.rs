//! HKDF-SHA256 (RFC 5869) key derivation: KEK from IKM, DEK unwrap keys,
//! and derived field keys all go through [`Kdf::hkdf`].

use hkdf::Hkdf;
use sha2::Sha256;
use themis_error::{Result, ThemisError};
use zeroize::Zeroizing;

pub struct Kdf;

impl Kdf {
    /// Derive `length` bytes of key material from `ikm`, `salt`, and
    /// `info`, per RFC 5869. `salt` may be empty.
    pub fn hkdf(ikm: &[u8], salt: &[u8], info: &[u8], length: usize) -> Result<Zeroizing<Vec<u8>>> {
        let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
        let mut okm = Zeroizing::new(vec![0u8; length]);
        hk.expand(info, &mut okm)
            .map_err(|_| ThemisError::EncryptionError("HKDF expand failed: output too long".to_string()))?;
        Ok(okm)
    }

    /// Derive a 32-byte key, the only output length this codebase uses.
    pub fn hkdf_32(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; 32]> {
        let okm = Self::hkdf(ikm, salt, info, 32)?;
        let mut key = [0u8; 32];
        key.copy_from_slice(&okm);
        Ok(key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_output() {
        let a = Kdf::hkdf_32(b"ikm", b"salt", b"info").unwrap();
        let b = Kdf::hkdf_32(b"ikm", b"salt", b"info").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_info_produces_different_output() {
        let a = Kdf::hkdf_32(b"ikm", b"salt", b"field:a").unwrap();
        let b = Kdf::hkdf_32(b"ikm", b"salt", b"field:b").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn different_salt_produces_different_output() {
        let a = Kdf::hkdf_32(b"ikm", b"salt1", b"info").unwrap();
        let b = Kdf::hkdf_32(b"ikm", b"salt2", b"info").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_salt_is_accepted() {
        assert!(Kdf::hkdf_32(b"ikm", b"", b"info").is_ok());
    }
}
