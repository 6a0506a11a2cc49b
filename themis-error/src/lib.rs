//! Shared error taxonomy for the Themis cryptographic storage core.
//!
//! Every crate in the workspace returns [`Result<T>`] from its fallible
//! operations. Error *kinds* are distinguished semantically (see the table
//! in the design docs), not by separate per-crate error types, so that a
//! caller can match on one vocabulary regardless of which layer raised it.

use thiserror::Error;

/// The single error type shared by every Themis crate.
#[derive(Debug, Error)]
pub enum ThemisError {
    /// Requested (key_id, version) is absent or has been deleted.
    #[error("key not found: {key_id} (version {version:?})")]
    KeyNotFound {
        key_id: String,
        version: Option<u32>,
    },

    /// Operation forbidden for the key's current status (e.g. DELETED).
    #[error("key operation denied for {key_id} (version {version}): {reason}")]
    KeyOperationDenied {
        key_id: String,
        version: u32,
        reason: String,
    },

    /// Cipher init / update / final / IV generation failed.
    #[error("encryption failed: {0}")]
    EncryptionError(String),

    /// Tag mismatch, malformed envelope, or bad IV/tag length.
    #[error("decryption failed: {0}")]
    DecryptionError(String),

    /// A unique index saw a conflicting primary key for the same value.
    #[error("unique constraint violated on {table}.{column} for value {value:?}")]
    UniqueViolation {
        table: String,
        column: String,
        value: String,
    },

    /// A stored index/schema config document failed to parse.
    #[error("schema decode error: {0}")]
    SchemaDecodeError(String),

    /// Per-field encryption failed during an entity write.
    #[error("metadata encryption failure on field {field}: {reason}")]
    MetadataEncryptFailure { field: String, reason: String },

    /// JWKS kid not found, or RSA signature verification failed.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// Transient transport error (5xx / network) talking to KMS or PKI.
    #[error("transient transport error after {attempts} attempt(s): {0}", attempts = .attempts)]
    TransientTransportError { attempts: u32, message: String },

    /// Index scan found a primary key whose primary record is missing or
    /// undeserializable.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// Invalid argument supplied by the caller (length checks, empty
    /// table/column names, etc.) — a programming error at the call site,
    /// not a runtime condition from spec.md's own taxonomy, but needed to
    /// make every fallible boundary total.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Catch-all for anything that doesn't fit the taxonomy above —
    /// accepted only at outermost boundaries (tests, examples, CLI glue).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ThemisError {
    /// True for errors whose policy (per the design docs' error table) is
    /// "retry up to N with backoff, then propagate".
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ThemisError::TransientTransportError { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ThemisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_transport_error_is_transient() {
        assert!(ThemisError::TransientTransportError {
            attempts: 3,
            message: "timeout".into(),
        }
        .is_transient());

        assert!(!ThemisError::KeyNotFound {
            key_id: "field:email".into(),
            version: None,
        }
        .is_transient());
        assert!(!ThemisError::DecryptionError("tag mismatch".into()).is_transient());
    }

    #[test]
    fn internal_wraps_anyhow_at_the_boundary() {
        let cause = anyhow::anyhow!("unexpected filesystem error");
        let err: ThemisError = cause.into();
        assert!(matches!(err, ThemisError::Internal(_)));
    }
}
