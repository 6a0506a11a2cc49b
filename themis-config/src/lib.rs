//! Layered configuration for the Themis core.
//!
//! Precedence, lowest to highest: compiled-in [`ThemisConfig::default`],
//! an optional YAML file, then environment variables prefixed `THEMIS_`
//! (double underscore as the nesting separator, e.g.
//! `THEMIS_KMS__MAX_RETRIES=5`).

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use themis_error::{Result, ThemisError};

/// Derived-key cache (L2) knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedKeyCacheConfig {
    pub capacity: usize,
    pub ttl_seconds: u64,
}

impl Default for DerivedKeyCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            ttl_seconds: 3600,
        }
    }
}

/// External-KMS key provider (L1) knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KmsConfig {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub cache_capacity: usize,
    pub cache_ttl_seconds: u64,
    pub request_timeout_ms: u64,
}

impl Default for KmsConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 200,
            cache_capacity: 1000,
            cache_ttl_seconds: 3600,
            request_timeout_ms: 5000,
        }
    }
}

/// Audit/SAGA logger (L6) knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub enabled: bool,
    pub batch_size: usize,
    pub batch_interval_seconds: u64,
    pub log_path: PathBuf,
    pub signature_path: PathBuf,
    pub key_id: String,
    pub encrypt_then_sign: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 1000,
            batch_interval_seconds: 300,
            log_path: PathBuf::from("data/logs/saga.jsonl"),
            signature_path: PathBuf::from("data/logs/saga_signatures.jsonl"),
            key_id: "saga_lek".to_string(),
            encrypt_then_sign: true,
        }
    }
}

/// Metadata encryption policy (L8) knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Path to the schema document; absence means all fields are
    /// plaintext, per the metadata-encryption-policy contract.
    pub schema_path: Option<PathBuf>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self { schema_path: None }
    }
}

/// JWKS validator (§6 external interface) knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksConfig {
    pub jwks_url: String,
    pub cache_ttl_seconds: u64,
    pub clock_skew_seconds: u64,
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            jwks_url: String::new(),
            cache_ttl_seconds: 600,
            clock_skew_seconds: 60,
        }
    }
}

/// The top-level configuration document for an embedding application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemisConfig {
    #[serde(default)]
    pub derived_key_cache: DerivedKeyCacheConfig,
    #[serde(default)]
    pub kms: KmsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub jwks: JwksConfig,
}

impl ThemisConfig {
    /// Build configuration from defaults, an optional YAML file, and
    /// `THEMIS_`-prefixed environment variables, in that precedence order.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(ThemisConfig::default()));
        if let Some(path) = file {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed("THEMIS_").split("__"));
        figment
            .extract()
            .map_err(|e| ThemisError::SchemaDecodeError(format!("config: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_load_without_any_source() {
        let cfg = ThemisConfig::load(None).unwrap();
        assert_eq!(cfg.kms.max_retries, 3);
        assert_eq!(cfg.audit.batch_size, 1000);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "kms:\n  max_retries: 7\n  backoff_ms: 50").unwrap();
        let cfg = ThemisConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.kms.max_retries, 7);
        assert_eq!(cfg.kms.backoff_ms, 50);
        // untouched fields retain their default
        assert_eq!(cfg.audit.batch_size, 1000);
    }

    #[test]
    fn env_overrides_file_and_defaults() {
        std::env::set_var("THEMIS_KMS__MAX_RETRIES", "9");
        let cfg = ThemisConfig::load(None).unwrap();
        assert_eq!(cfg.kms.max_retries, 9);
        std::env::remove_var("THEMIS_KMS__MAX_RETRIES");
    }
}
