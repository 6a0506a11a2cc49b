//! The L0 byte-store contract.
//!
//! An ordered key→value map with atomic write batches and prefix/range
//! scans. The real engine choice (RocksDB-like) is out of scope for this
//! core; [`ByteStore`] is the seam every higher layer programs against,
//! and [`MemoryStore`] is the in-memory reference backend used throughout
//! the workspace's test suites.
//!
//! This trait is synchronous: the concurrency model treats every
//! byte-store call as a blocking suspension point on an OS thread, with
//! no cooperative task runtime inside the core.

pub mod memory;

pub use memory::MemoryStore;
use themis_error::Result;

/// A single staged mutation inside a write batch.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// An atomic write batch: either every staged operation takes effect, or
/// none do.
pub trait WriteBatch {
    fn put(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
    /// Consume the batch, applying every staged operation atomically.
    fn commit(self: Box<Self>) -> Result<()>;
    /// Consume the batch, discarding every staged operation.
    fn rollback(self: Box<Self>);
}

/// Ordered key/value store with atomic write batches and prefix/range
/// scans. Implementations must be safe for concurrent use.
pub trait ByteStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;
    fn open_write_batch(&self) -> Box<dyn WriteBatch + '_>;

    /// Invoke `visitor` once per entry whose key starts with `prefix`, in
    /// ascending key order. The visitor returns `true` to continue, `false`
    /// to stop early.
    fn scan_prefix(&self, prefix: &[u8], visitor: &mut dyn FnMut(&[u8], &[u8]) -> bool);

    /// Invoke `visitor` once per entry in `[start_inclusive, end_exclusive)`,
    /// in ascending key order. The visitor returns `true` to continue,
    /// `false` to stop early.
    fn scan_range(
        &self,
        start_inclusive: &[u8],
        end_exclusive: &[u8],
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    );
}
