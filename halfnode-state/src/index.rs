//! The key-value index.
//!
//! An ordered, persistent, string-keyed store holding the per-transaction,
//! per-block, per-height, and chain-state records described in
//! [`records`](crate::records). Keys are namespaced ASCII (`tx:`, `blocks:`,
//! `blkmeta:`, `height:`, `misc:`); values are ASCII serializations with
//! hashes rendered in display order.
//!
//! A single mutex linearizes every reader and writer. The chain database's
//! own lock nests outside this one.

use std::path::Path;
use std::sync::Mutex;

use crate::error::StoreError;

pub struct DbLock {
    inner: Mutex<sled::Db>,
}

impl DbLock {
    pub fn open(path: &Path) -> Result<DbLock, sled::Error> {
        Ok(DbLock {
            inner: Mutex::new(sled::open(path)?),
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, sled::Error> {
        let db = self.inner.lock().expect("kv store mutex poisoned");
        Ok(db.get(key.as_bytes())?.map(|value| value.to_vec()))
    }

    /// Fetch a value that is expected to be ASCII text.
    pub fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.get(key)? {
            None => Ok(None),
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StoreError::BadRecord("value is not valid utf-8")),
        }
    }

    pub fn put(&self, key: &str, value: &[u8]) -> Result<(), sled::Error> {
        let db = self.inner.lock().expect("kv store mutex poisoned");
        db.insert(key.as_bytes(), value)?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<(), sled::Error> {
        let db = self.inner.lock().expect("kv store mutex poisoned");
        db.remove(key.as_bytes())?;
        Ok(())
    }

    /// Apply an ordered set of puts and deletes atomically.
    pub fn write(&self, batch: sled::Batch) -> Result<(), sled::Error> {
        let db = self.inner.lock().expect("kv store mutex poisoned");
        db.apply_batch(batch)
    }

    pub fn flush(&self) -> Result<(), sled::Error> {
        let db = self.inner.lock().expect("kv store mutex poisoned");
        db.flush()?;
        Ok(())
    }
}
