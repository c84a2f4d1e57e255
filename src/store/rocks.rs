//! RocksDB wrapper for federation storage

use std::path::Path;
use std::sync::Arc;

use crate::models::{FederationError, FederationResult};

pub const CF_REPOSITORIES: &str = "repositories";
pub const CF_USERS: &str = "users";
pub const CF_REGISTRATIONS: &str = "registrations";
pub const CF_PROPOSALS: &str = "proposals";

const COLUMN_FAMILIES: [&str; 4] = [CF_REPOSITORIES, CF_USERS, CF_REGISTRATIONS, CF_PROPOSALS];

/// RocksDB storage backend
pub struct RocksStore {
    db: Arc<rocksdb::DB>,
}

impl RocksStore {
    /// Open or create a RocksDB database
    pub fn open<P: AsRef<Path>>(path: P) -> FederationResult<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = rocksdb::DB::open_cf(&opts, path, COLUMN_FAMILIES)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Open with custom options
    pub fn open_with_opts<P: AsRef<Path>>(
        path: P,
        cache_size_mb: usize,
        compression: bool,
    ) -> FederationResult<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(cache_size_mb * 1024 * 1024));
        opts.set_block_based_table_factory(&block_opts);

        if compression {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let db = rocksdb::DB::open_cf(&opts, path, COLUMN_FAMILIES)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle
    pub fn cf(&self, name: &str) -> FederationResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| FederationError::DatabaseError(format!("Column family not found: {}", name)))
    }

    /// Store a JSON value under `key`
    pub fn put_json<T: serde::Serialize>(&self, cf_name: &str, key: &str, value: &T) -> FederationResult<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Load a JSON value stored under `key`
    pub fn get_json<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &str) -> FederationResult<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete `key`, reporting whether it existed
    pub fn delete(&self, cf_name: &str, key: &str) -> FederationResult<bool> {
        let cf = self.cf(cf_name)?;
        let existed = self.db.get_pinned_cf(cf, key.as_bytes())?.is_some();
        if existed {
            self.db.delete_cf(cf, key.as_bytes())?;
        }
        Ok(existed)
    }

    /// Every value in a column family, in key order
    pub fn scan_json<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> FederationResult<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut items = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }
}

impl Clone for RocksStore {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore").finish()
    }
}
