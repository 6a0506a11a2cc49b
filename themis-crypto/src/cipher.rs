//! Raw AES-256-GCM primitives with the IV and tag surfaced as separate
//! fields, matching the envelope's on-disk shape rather than the
//! AEAD crate's combined ciphertext||tag convention.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use themis_error::{Result, ThemisError};

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Generate a fresh 96-bit IV from the OS CSPRNG.
#[must_use]
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` under `key` and `iv`, returning ciphertext and the
/// 16-byte authentication tag separately.
pub fn encrypt(key: &[u8; 32], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Result<(Vec<u8>, [u8; TAG_LEN])> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| ThemisError::EncryptionError(format!("key setup: {e}")))?;
    let nonce = Nonce::from_slice(iv);
    let mut combined = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| ThemisError::EncryptionError(e.to_string()))?;
    let tag_start = combined.len().saturating_sub(TAG_LEN);
    let tag_bytes = combined.split_off(tag_start);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&tag_bytes);
    Ok((combined, tag))
}

/// Decrypt ciphertext authenticated with `tag` under `key` and `iv`. Any
/// tag mismatch is a [`ThemisError::DecryptionError`]; no partial
/// plaintext is ever returned.
pub fn decrypt(key: &[u8; 32], iv: &[u8; IV_LEN], ciphertext: &[u8], tag: &[u8; TAG_LEN]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| ThemisError::DecryptionError(format!("key setup: {e}")))?;
    let nonce = Nonce::from_slice(iv);
    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);
    cipher
        .decrypt(nonce, combined.as_ref())
        .map_err(|_| ThemisError::DecryptionError("authentication tag mismatch".to_string()))
}

/// Generate a fresh random 256-bit key from the OS CSPRNG.
#[must_use]
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}
