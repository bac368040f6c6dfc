use std::path::Path;

use rocksdb::{ColumnFamily, IteratorMode, Options, WriteBatch, DB};

use crate::errors::{IndexError, IndexResult};

/// k-mer window bytes -> CombinationId of the merged annotation tuple
pub const CF_KMER: &str = "kmer";
/// k-mer window bytes -> sorted ids of the proteins containing it
pub const CF_PROTEIN_SET: &str = "protein_set";
/// CombinationId -> annotation tuple
pub const CF_COMBINATION: &str = "combination";
/// u32 big-endian protein id -> ProteinRecord
pub const CF_PROTEIN: &str = "protein";
/// Shard metadata (k-mer size, statistics)
pub const CF_META: &str = "meta";

pub const CF_GO: &str = "go";
pub const CF_FUNCTION: &str = "function";
pub const CF_PATHWAY: &str = "pathway";
pub const CF_ORGANISM: &str = "organism";

pub const PARTITIONS: [&str; 9] = [
    CF_KMER,
    CF_PROTEIN_SET,
    CF_COMBINATION,
    CF_PROTEIN,
    CF_META,
    CF_GO,
    CF_FUNCTION,
    CF_PATHWAY,
    CF_ORGANISM,
];

/// One durable shard: a RocksDB instance with a column family per partition
pub struct ShardStore {
    db: DB,
}

impl ShardStore {
    /// Create (or reopen for writing) a shard at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> IndexResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path.as_ref(), PARTITIONS)?;
        Ok(Self { db })
    }

    /// Open an existing shard for searching; no writes are possible
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> IndexResult<Self> {
        let opts = Options::default();
        let db = DB::open_cf_for_read_only(&opts, path.as_ref(), PARTITIONS, false)?;
        Ok(Self { db })
    }

    fn cf(&self, partition: &'static str) -> IndexResult<&ColumnFamily> {
        self.db.cf_handle(partition).ok_or(IndexError::MissingColumnFamily(partition))
    }

    /// Point lookup; a missing key is `Ok(None)`
    pub fn get(&self, partition: &'static str, key: &[u8]) -> IndexResult<Option<Vec<u8>>> {
        Ok(self.db.get_cf(self.cf(partition)?, key)?)
    }

    pub fn contains(&self, partition: &'static str, key: &[u8]) -> IndexResult<bool> {
        let cf = self.cf(partition)?;
        if !self.db.key_may_exist_cf(cf, key) {
            return Ok(false);
        }
        Ok(self.db.get_pinned_cf(cf, key)?.is_some())
    }

    pub fn put(&self, partition: &'static str, key: &[u8], value: &[u8]) -> IndexResult<()> {
        Ok(self.db.put_cf(self.cf(partition)?, key, value)?)
    }

    /// Start a batch of writes that are applied atomically by `commit`
    pub fn batch(&self) -> ShardBatch<'_> {
        ShardBatch { store: self, batch: WriteBatch::default() }
    }

    /// Count the entries of a partition with a full scan
    pub fn count(&self, partition: &'static str) -> IndexResult<u64> {
        let mut n = 0;
        for item in self.db.iterator_cf(self.cf(partition)?, IteratorMode::Start) {
            item?;
            n += 1;
        }
        Ok(n)
    }

    /// Flush memtables and compact every partition for read performance
    pub fn finalize(&self) -> IndexResult<()> {
        self.db.flush()?;
        for partition in PARTITIONS {
            self.db.compact_range_cf(self.cf(partition)?, None::<&[u8]>, None::<&[u8]>);
        }
        Ok(())
    }
}

pub struct ShardBatch<'a> {
    store: &'a ShardStore,
    batch: WriteBatch,
}

impl ShardBatch<'_> {
    pub fn put(&mut self, partition: &'static str, key: &[u8], value: &[u8]) -> IndexResult<()> {
        let cf = self.store.cf(partition)?;
        self.batch.put_cf(cf, key, value);
        Ok(())
    }

    pub fn commit(self) -> IndexResult<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        Ok(self.store.db.write(self.batch)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_get_and_batch() -> IndexResult<()> {
        let dir = tempdir()?;
        let store = ShardStore::create(dir.path().join("store_0"))?;

        assert_eq!(store.get(CF_KMER, b"MKTAYIA")?, None);
        store.put(CF_KMER, b"MKTAYIA", b"v1")?;
        assert_eq!(store.get(CF_KMER, b"MKTAYIA")?, Some(b"v1".to_vec()));
        assert!(store.contains(CF_KMER, b"MKTAYIA")?);
        // Partitions are independent namespaces
        assert!(!store.contains(CF_PROTEIN_SET, b"MKTAYIA")?);

        let mut batch = store.batch();
        batch.put(CF_GO, b"a", b"1")?;
        batch.put(CF_GO, b"b", b"2")?;
        assert_eq!(store.count(CF_GO)?, 0);
        batch.commit()?;
        assert_eq!(store.count(CF_GO)?, 2);
        Ok(())
    }

    #[test]
    fn test_read_only_reopen() -> IndexResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("store_0");
        {
            let store = ShardStore::create(&path)?;
            store.put(CF_PROTEIN, &[0, 0, 0, 1], b"record")?;
            store.finalize()?;
        }
        let store = ShardStore::open_read_only(&path)?;
        assert_eq!(store.get(CF_PROTEIN, &[0, 0, 0, 1])?, Some(b"record".to_vec()));
        assert!(store.put(CF_PROTEIN, &[0, 0, 0, 2], b"other").is_err());
        Ok(())
    }
}
