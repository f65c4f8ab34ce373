pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;

pub use memory::MemoryStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbStore;

use anyhow::Result;

/// Byte-addressed key/value store backing the order ledger.
///
/// Single-key writes must be atomic: a reader sees the old value or the new
/// one, never a mix.
pub trait KvStore: Send + Sync {
    /// Read a key. `None` when absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key. Deleting an absent key succeeds.
    fn delete(&self, key: &[u8]) -> Result<()>;
}

impl<T: KvStore + ?Sized> KvStore for std::sync::Arc<T> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        (**self).delete(key)
    }
}
