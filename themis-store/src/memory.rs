//! An in-memory [`ByteStore`] backed by a `BTreeMap`, guarded by a single
//! `parking_lot::RwLock`. Reference implementation only — not a
//! production engine choice (that is explicitly out of scope for the
//! core).

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use themis_error::Result;

use crate::{BatchOp, ByteStore, WriteBatch};

/// Reference in-memory byte store used by every crate's test suite.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the full contents, for bit-for-bit equality assertions in
    /// atomicity tests (spec seed scenario 2).
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.inner.read().clone()
    }
}

struct MemoryBatch<'a> {
    store: &'a MemoryStore,
    ops: Vec<BatchOp>,
}

impl<'a> WriteBatch for MemoryBatch<'a> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.ops.push(BatchOp::Put(key.to_vec(), value.to_vec()));
    }

    fn delete(&mut self, key: &[u8]) {
        self.ops.push(BatchOp::Delete(key.to_vec()));
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let mut guard = self.store.inner.write();
        for op in self.ops {
            match op {
                BatchOp::Put(k, v) => {
                    guard.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    guard.remove(&k);
                }
            }
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        // Nothing was ever applied to `store`; dropping the staged ops is
        // sufficient.
    }
}

impl ByteStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.write().remove(key);
        Ok(())
    }

    fn open_write_batch(&self) -> Box<dyn WriteBatch + '_> {
        Box::new(MemoryBatch {
            store: self,
            ops: Vec::new(),
        })
    }

    fn scan_prefix(&self, prefix: &[u8], visitor: &mut dyn FnMut(&[u8], &[u8]) -> bool) {
        let guard = self.inner.read();
        for (k, v) in guard.range(prefix.to_vec()..) {
            if !k.starts_with(prefix) {
                break;
            }
            if !visitor(k, v) {
                break;
            }
        }
    }

    fn scan_range(
        &self,
        start_inclusive: &[u8],
        end_exclusive: &[u8],
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) {
        let guard = self.inner.read();
        for (k, v) in guard.range(start_inclusive.to_vec()..end_exclusive.to_vec()) {
            if !visitor(k, v) {
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete_roundtrip() {
        let store = MemoryStore::new();
        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        store.delete(b"a").unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
    }

    #[test]
    fn batch_commit_is_atomic() {
        let store = MemoryStore::new();
        let mut batch = store.open_write_batch();
        batch.put(b"x", b"1");
        batch.put(b"y", b"2");
        batch.commit().unwrap();
        assert_eq!(store.get(b"x").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"y").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn batch_rollback_applies_nothing() {
        let store = MemoryStore::new();
        let mut batch = store.open_write_batch();
        batch.put(b"x", b"1");
        batch.rollback();
        assert_eq!(store.get(b"x").unwrap(), None);
    }

    #[test]
    fn scan_prefix_stops_at_boundary() {
        let store = MemoryStore::new();
        store.put(b"idx:a:1", b"").unwrap();
        store.put(b"idx:a:2", b"").unwrap();
        store.put(b"idx:b:1", b"").unwrap();
        let mut seen = Vec::new();
        store.scan_prefix(b"idx:a:", &mut |k, _| {
            seen.push(k.to_vec());
            true
        });
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn scan_range_is_half_open() {
        let store = MemoryStore::new();
        for i in 0..5u8 {
            store.put(&[b'k', i], b"").unwrap();
        }
        let mut seen = Vec::new();
        store.scan_range(&[b'k', 1], &[b'k', 4], &mut |k, _| {
            seen.push(k.to_vec());
            true
        });
        assert_eq!(seen, vec![vec![b'k', 1], vec![b'k', 2], vec![b'k', 3]]);
    }
}
