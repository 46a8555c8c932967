//! Adapter over the transactional key-value store backing the encyclopedia.
//!
//! One database file with four buckets: `wiki` (title -> docid), `pages`
//! (docid -> compressed article), `index` (token -> compressed posting list)
//! and `ranks` (docid -> f32 bits). A `meta` table carries the monotonic
//! docid sequence. All 32-bit values are little-endian.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};

use crate::DocId;

pub const WIKI: TableDefinition<&[u8], &[u8]> = TableDefinition::new("wiki");
pub const PAGES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("pages");
pub const INDEX: TableDefinition<&[u8], &[u8]> = TableDefinition::new("index");
pub const RANKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ranks");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const DOCID_SEQ: &str = "docid_seq";

/// Keys longer than this are truncated on write. Long titles can therefore
/// collide; readers never dereference a truncated key back to a title.
pub const MAX_KEY_SIZE: usize = 32 * 1024;

pub struct Store {
    db: Database,
}

impl Store {
    /// Open (or create) the database and make sure every bucket exists, so
    /// read transactions never have to special-case a missing table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Database::create(path)?;
        let tx = db.begin_write()?;
        {
            tx.open_table(WIKI)?;
            tx.open_table(PAGES)?;
            tx.open_table(INDEX)?;
            tx.open_table(RANKS)?;
            tx.open_table(META)?;
        }
        tx.commit()?;
        Ok(Store { db })
    }

    pub fn begin_read(&self) -> Result<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    pub fn begin_write(&self) -> Result<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Advance and return the docid sequence. The first call yields 1.
    pub fn next_docid(tx: &WriteTransaction) -> Result<DocId> {
        let mut meta = tx.open_table(META)?;
        let current = meta.get(DOCID_SEQ)?.map(|v| v.value()).unwrap_or(0);
        let next = current + 1;
        if next > u64::from(DocId::MAX) {
            bail!("docid sequence exhausted");
        }
        meta.insert(DOCID_SEQ, next)?;
        Ok(next as DocId)
    }
}

/// The 4-byte little-endian key form of a docid.
pub fn docid_key(docid: DocId) -> [u8; 4] {
    docid.to_le_bytes()
}

pub fn docid_from_key(key: &[u8]) -> Result<DocId> {
    let bytes: [u8; 4] = key
        .try_into()
        .map_err(|_| anyhow!("docid key must be 4 bytes, got {}", key.len()))?;
    Ok(DocId::from_le_bytes(bytes))
}

/// Clamp a key to the store's maximum key size.
pub fn truncate_key(key: &[u8]) -> &[u8] {
    &key[..key.len().min(MAX_KEY_SIZE)]
}
