//! Tamper-evident audit/SAGA logger (L6).
//!
//! Buffers [`step::SagaStep`] records, seals them into PKI-signed,
//! envelope-encrypted batches once `batch_size` or `batch_interval`
//! triggers, and verifies a batch's signature and hash before trusting
//! its ciphertext on read. Daily log-encryption keys are managed by
//! [`lek::LekManager`], separately from whatever key the caller passes
//! for ordinary field encryption.

pub mod batch;
pub mod lek;
pub mod logger;
pub mod step;

pub use batch::{CiphertextLine, SignedBatch};
pub use lek::LekManager;
pub use logger::SagaLogger;
pub use step::{SagaStep, StepAction, StepStatus};