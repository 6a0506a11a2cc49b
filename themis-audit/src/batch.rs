//! The signed-batch record (spec.md §3.5): metadata persisted to the
//! signatures log alongside the detached PKI signature.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use themis_pki::SignatureResult;

/// One sealed batch's metadata, as written to the signatures log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedBatch {
    pub batch_id: String,
    pub entry_count: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub lek_id: String,
    pub key_version: u32,
    #[serde(with = "b64_bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "b64_bytes")]
    pub tag: Vec<u8>,
    #[serde(with = "b64_bytes")]
    pub ciphertext_hash: Vec<u8>,
    pub signature: SignatureResult,
}

/// The line written to the ciphertext log: the batch id plus the
/// base64-encoded ciphertext, nothing else (spec.md §4.7 step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiphertextLine {
    pub batch_id: String,
    #[serde(with = "b64_bytes")]
    pub ciphertext: Vec<u8>,
}

mod b64_bytes {
    use super::{Engine, B64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        B64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
