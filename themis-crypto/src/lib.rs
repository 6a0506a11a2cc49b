//! Key hierarchy (L1), derived-key cache (L2), and field-level envelope
//! codec (L3) for the Themis cryptographic storage core.
//!
//! Layering, leaf to root:
//! - [`key_provider`] — the polymorphic key provider (in-memory, PKI-backed,
//!   external-KMS) and the KEK→DEK→group-DEK hierarchy.
//! - [`derived_cache`] — per-thread HKDF memoization shared by field-key
//!   derivation.
//! - [`cipher`] — raw AES-256-GCM primitives with IV/tag surfaced
//!   separately, matching the envelope's on-disk shape.
//! - [`kdf`] — HKDF-SHA256, the only KDF this codebase uses.
//! - [`envelope`] — the self-describing envelope blob, its two stable
//!   serializations, the codec that produces/consumes it, and the typed
//!   `EncryptedField<T>` wrapper.

pub mod cipher;
pub mod derived_cache;
pub mod envelope;
pub mod key_provider;
pub mod kdf;

pub mod constant_time;
pub mod encryption;

pub use derived_cache::DerivedKeyCache;
pub use envelope::{Envelope, EnvelopeCodec, EncryptedField};
pub use kdf::Kdf;
pub use key_provider::{KeyMetadata, KeyProvider, KeyStatus};
