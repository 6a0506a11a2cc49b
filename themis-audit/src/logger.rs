//! The SAGA logger (L6): buffers step records, seals them into signed,
//! encrypted batches, and verifies batches on read.
//!
//! Grounded in `original_source/include/utils/saga_logger.h`'s
//! `SAGALogger`. Workflow (spec.md §4.7):
//! 1. Collect steps in memory.
//! 2. On `batch_size` or `batch_interval`, serialize the batch to
//!    canonical JSON, encrypt it with the current LEK, hash
//!    `iv || ciphertext || tag` with SHA-256, sign that hash, and append
//!    one line to each of two JSONL logs (ciphertext, signature).
//! 3. Verification recomputes the hash and checks the signature before
//!    trusting a batch's ciphertext.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use themis_config::AuditConfig;
use themis_crypto::envelope::{Envelope, EnvelopeCodec};
use themis_error::{Result, ThemisError};
use themis_pki::{SignatureResult, SigningProvider};
use tokio::runtime::Handle;

use crate::batch::{CiphertextLine, SignedBatch};
use crate::lek::LekManager;
use crate::step::SagaStep;

struct LoggerState {
    buffer: Vec<SagaStep>,
    batch_start: Option<chrono::DateTime<Utc>>,
}

/// Tamper-evident, PKI-signed SAGA step logger.
pub struct SagaLogger {
    codec: EnvelopeCodec,
    pki: Arc<dyn SigningProvider>,
    runtime: Handle,
    lek: Option<Arc<LekManager>>,
    config: AuditConfig,
    state: Mutex<LoggerState>,
}

impl SagaLogger {
    #[must_use]
    pub fn new(
        codec: EnvelopeCodec,
        pki: Arc<dyn SigningProvider>,
        runtime: Handle,
        config: AuditConfig,
        lek: Option<Arc<LekManager>>,
    ) -> Self {
        Self {
            codec,
            pki,
            runtime,
            lek,
            config,
            state: Mutex::new(LoggerState {
                buffer: Vec::new(),
                batch_start: None,
            }),
        }
    }

    fn effective_key_id(&self) -> Result<String> {
        match &self.lek {
            Some(lek) => lek.current_lek(),
            None => Ok(self.config.key_id.clone()),
        }
    }

    /// Buffer one step. May trigger a batch seal if `batch_size` or
    /// `batch_interval` has been reached.
    #[tracing::instrument(skip(self, step), fields(saga_id = %step.saga_id, step_name = %step.step_name))]
    pub fn log_step(&self, step: SagaStep) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let mut state = self.state.lock();
        if state.buffer.is_empty() {
            state.batch_start = Some(Utc::now());
        }
        state.buffer.push(step);

        let size_triggered = state.buffer.len() >= self.config.batch_size;
        let interval_triggered = state
            .batch_start
            .is_some_and(|start| (Utc::now() - start).num_seconds() as u64 >= self.config.batch_interval_seconds);

        if size_triggered || interval_triggered {
            self.seal_and_flush(&mut state)?;
        }
        Ok(())
    }

    /// Force-seal whatever is currently buffered, even if below
    /// `batch_size`. Useful at shutdown.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.buffer.is_empty() {
            self.seal_and_flush(&mut state)?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, state), fields(entry_count = state.buffer.len()))]
    fn seal_and_flush(&self, state: &mut LoggerState) -> Result<()> {
        let steps = std::mem::take(&mut state.buffer);
        let start_time = state.batch_start.take().unwrap_or_else(Utc::now);
        let end_time = Utc::now();
        let batch_id = generate_batch_id(end_time);

        let plaintext = serde_json::to_vec(&steps)
            .map_err(|e| ThemisError::Internal(anyhow::anyhow!("saga batch serialize: {e}")))?;
        let key_id = self.effective_key_id()?;
        let envelope = self.codec.encrypt(&plaintext, &key_id)?;

        let hash = batch_hash(&envelope.iv, &envelope.ciphertext, &envelope.tag);
        let signature = self.runtime.block_on(self.pki.sign_hash(&hash))?;

        append_json_line(
            &self.config.log_path,
            &CiphertextLine {
                batch_id: batch_id.clone(),
                ciphertext: envelope.ciphertext.clone(),
            },
        )?;

        append_json_line(
            &self.config.signature_path,
            &SignedBatch {
                batch_id,
                entry_count: steps.len(),
                start_time,
                end_time,
                lek_id: key_id,
                key_version: envelope.key_version,
                iv: envelope.iv,
                tag: envelope.tag,
                ciphertext_hash: hash,
                signature,
            },
        )?;

        tracing::info!(entries = steps.len(), "sealed saga batch");
        Ok(())
    }

    /// Verify a sealed batch: recompute the hash from the stored iv,
    /// loaded ciphertext, and stored tag, then check the signature over
    /// that hash.
    pub fn verify_batch(&self, batch_id: &str) -> Result<bool> {
        let Some(signed) = find_json_line::<SignedBatch>(&self.config.signature_path, batch_id)? else {
            return Ok(false);
        };
        let Some(ciphertext_line) = find_json_line::<CiphertextLine>(&self.config.log_path, batch_id)? else {
            return Ok(false);
        };

        let recomputed = batch_hash(&signed.iv, &ciphertext_line.ciphertext, &signed.tag);
        if recomputed != signed.ciphertext_hash {
            return Ok(false);
        }

        self.runtime
            .block_on(self.pki.verify_hash(&recomputed, &signed.signature))
    }

    /// Load and decrypt a batch's steps. Returns an empty vector if the
    /// batch fails verification.
    pub fn load_batch(&self, batch_id: &str) -> Result<Vec<SagaStep>> {
        if !self.verify_batch(batch_id)? {
            return Ok(Vec::new());
        }
        let Some(signed) = find_json_line::<SignedBatch>(&self.config.signature_path, batch_id)? else {
            return Ok(Vec::new());
        };
        let Some(ciphertext_line) = find_json_line::<CiphertextLine>(&self.config.log_path, batch_id)? else {
            return Ok(Vec::new());
        };

        let envelope = Envelope {
            key_id: signed.lek_id,
            key_version: signed.key_version,
            iv: signed.iv,
            ciphertext: ciphertext_line.ciphertext,
            tag: signed.tag,
        };
        let plaintext = self.codec.decrypt(&envelope)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| ThemisError::Internal(anyhow::anyhow!("saga batch deserialize: {e}")))
    }

    /// All batch ids in chronological (append) order.
    pub fn list_batches(&self) -> Result<Vec<String>> {
        let Some(file) = open_for_read(&self.config.signature_path)? else {
            return Ok(Vec::new());
        };
        let mut ids = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| ThemisError::Corruption(format!("signature log read: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(&line)
                .map_err(|e| ThemisError::Corruption(format!("signature log parse: {e}")))?;
            if let Some(id) = value.get("batch_id").and_then(|v| v.as_str()) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }
}

fn generate_batch_id(sealed_at: chrono::DateTime<Utc>) -> String {
    format!(
        "saga_{}_{}",
        sealed_at.format("%Y%m%dT%H%M%S%.9f"),
        uuid::Uuid::new_v4()
    )
}

fn batch_hash(iv: &[u8], ciphertext: &[u8], tag: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(iv);
    hasher.update(ciphertext);
    hasher.update(tag);
    hasher.finalize().to_vec()
}

fn append_json_line(path: &Path, value: &impl serde::Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| ThemisError::Corruption(format!("create log dir {}: {e}", parent.display())))?;
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ThemisError::Corruption(format!("open log {}: {e}", path.display())))?;
    let line = serde_json::to_string(value)
        .map_err(|e| ThemisError::Internal(anyhow::anyhow!("log line serialize: {e}")))?;
    writeln!(file, "{line}").map_err(|e| ThemisError::Corruption(format!("append log {}: {e}", path.display())))?;
    Ok(())
}

fn open_for_read(path: &Path) -> Result<Option<std::fs::File>> {
    match std::fs::File::open(path) {
        Ok(f) => Ok(Some(f)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ThemisError::Corruption(format!("open log {}: {e}", path.display()))),
    }
}

fn find_json_line<T: serde::de::DeserializeOwned>(path: &Path, batch_id: &str) -> Result<Option<T>> {
    let Some(file) = open_for_read(path)? else {
        return Ok(None);
    };
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| ThemisError::Corruption(format!("log read {}: {e}", path.display())))?;
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(&line)
            .map_err(|e| ThemisError::Corruption(format!("log parse {}: {e}", path.display())))?;
        if value.get("batch_id").and_then(|v| v.as_str()) == Some(batch_id) {
            let typed = serde_json::from_value(value)
                .map_err(|e| ThemisError::Corruption(format!("log decode {}: {e}", path.display())))?;
            return Ok(Some(typed));
        }
    }
    Ok(None)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::step::{StepAction, StepStatus};
    use std::sync::Arc;
    use themis_crypto::key_provider::memory::InMemoryKeyProvider;
    use themis_pki::LocalSigningProvider;
    use tokio::runtime::Runtime;

    /// Returns the logger plus the `Runtime` backing its handle — the
    /// caller must keep the runtime alive for as long as the logger.
    fn logger_in(dir: &std::path::Path, batch_size: usize) -> (SagaLogger, Runtime) {
        let provider = Arc::new(InMemoryKeyProvider::new());
        provider.create_from_bytes("saga_lek", &[0x11; 32], "AES-256-GCM").unwrap();
        let codec = EnvelopeCodec::new(provider);
        let pki: Arc<dyn SigningProvider> = Arc::new(LocalSigningProvider::stub());
        let rt = Runtime::new().unwrap();
        let handle = rt.handle().clone();

        let config = AuditConfig {
            enabled: true,
            batch_size,
            batch_interval_seconds: 3600,
            log_path: dir.join("saga.jsonl"),
            signature_path: dir.join("saga_signatures.jsonl"),
            key_id: "saga_lek".to_string(),
            encrypt_then_sign: true,
        };
        (SagaLogger::new(codec, pki, handle, config, None), rt)
    }

    fn sample_step(saga_id: &str) -> SagaStep {
        SagaStep::new(
            saga_id,
            "reserve_inventory",
            StepAction::Forward,
            "order-1",
            serde_json::json!({"qty": 3}),
            StepStatus::Success,
        )
    }

    #[test]
    fn batch_size_trigger_seals_and_is_verifiable() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, _rt) = logger_in(dir.path(), 2);
        logger.log_step(sample_step("saga-1")).unwrap();
        logger.log_step(sample_step("saga-1")).unwrap();

        let batches = logger.list_batches().unwrap();
        assert_eq!(batches.len(), 1);
        assert!(logger.verify_batch(&batches[0]).unwrap());

        let steps = logger.load_batch(&batches[0]).unwrap();
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn flush_seals_a_partial_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, _rt) = logger_in(dir.path(), 100);
        logger.log_step(sample_step("saga-2")).unwrap();
        logger.flush().unwrap();

        let batches = logger.list_batches().unwrap();
        assert_eq!(batches.len(), 1);
        let steps = logger.load_batch(&batches[0]).unwrap();
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn seed_scenario_tampered_ciphertext_fails_verification_then_restores() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, _rt) = logger_in(dir.path(), 1);
        logger.log_step(sample_step("saga-3")).unwrap();
        let batches = logger.list_batches().unwrap();
        let batch_id = &batches[0];
        assert!(logger.verify_batch(batch_id).unwrap());

        let original = std::fs::read_to_string(&logger.config.log_path).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(original.trim()).unwrap();
        let ct = value["ciphertext"].as_str().unwrap().to_string();
        let mut chars: Vec<char> = ct.chars().collect();
        let mid = chars.len() / 2;
        chars[mid] = if chars[mid] == 'A' { 'B' } else { 'A' };
        value["ciphertext"] = serde_json::Value::String(chars.into_iter().collect());
        std::fs::write(&logger.config.log_path, format!("{value}\n")).unwrap();

        assert!(!logger.verify_batch(batch_id).unwrap());
        assert!(logger.load_batch(batch_id).unwrap().is_empty());

        std::fs::write(&logger.config.log_path, &original).unwrap();
        assert!(logger.verify_batch(batch_id).unwrap());
    }

    #[test]
    fn disabled_logger_drops_steps_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut logger, _rt) = logger_in(dir.path(), 1);
        logger.config.enabled = false;
        logger.log_step(sample_step("saga-4")).unwrap();
        assert!(logger.list_batches().unwrap().is_empty());
    }

    #[test]
    fn unknown_batch_id_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, _rt) = logger_in(dir.path(), 1);
        logger.log_step(sample_step("saga-5")).unwrap();
        assert!(!logger.verify_batch("saga_does_not_exist").unwrap());
    }
}
