use anyhow::{Context, Result};
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;

use crate::storage::KvStore;

const CF_LEDGER: &str = "ledger";

/// A thread-safe wrapper around RocksDB. The database closes when the last
/// clone is dropped.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
}

impl RocksDbStore {
    /// Opens the database at the specified path, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = vec![ColumnFamilyDescriptor::new(CF_LEDGER, Options::default())];

        let db = DB::open_cf_descriptors(&opts, path.as_ref(), families).with_context(|| {
            format!("Failed to open RocksDB at {}", path.as_ref().display())
        })?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl KvStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self
            .db
            .cf_handle(CF_LEDGER)
            .context("ledger CF missing")?;

        Ok(self.db.get_cf(cf, key)?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self
            .db
            .cf_handle(CF_LEDGER)
            .context("ledger CF missing")?;

        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let cf = self
            .db
            .cf_handle(CF_LEDGER)
            .context("ledger CF missing")?;

        self.db.delete_cf(cf, key)?;
        Ok(())
    }
}
