use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::annotation::{Annotations, AnnotationStore};
use crate::encoding::{decode_record, encode_record, protein_key};
use crate::errors::{IndexError, IndexResult};
use crate::protein::{HitEntry, ProteinRecord};
use crate::store::{ShardStore, CF_COMBINATION, CF_KMER, CF_META, CF_PROTEIN, CF_PROTEIN_SET};
use crate::types::{CombinationId, FieldKind, KmerSize, ProteinKey};

/// Directory name prefix of shards inside a database directory
pub const SHARD_PREFIX: &str = "store_";

const META_KSIZE: &[u8] = b"ksize";
const META_STATS: &[u8] = b"stats";

/// Everything stored for one k-mer: the merged annotation tuple of every
/// protein containing it, and the sorted ids of those proteins.
///
/// Both halves are keyed by the k-mer itself, so updating one k-mer
/// overwrites its previous state in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmerEntry {
    pub combination: CombinationId,
    pub proteins: Vec<u32>,
}

impl KmerEntry {
    /// Add a protein id, keeping the set sorted and free of duplicates
    pub fn insert_protein(&mut self, id: u32) -> bool {
        match self.proteins.binary_search(&id) {
            Ok(_) => false,
            Err(pos) => {
                self.proteins.insert(pos, id);
                true
            }
        }
    }
}

/// Persisted statistics of one shard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStats {
    pub proteins: u64,
    pub residues: u64,
    pub kmers: u64,
    pub combinations: u64,
    pub features: Vec<String>,
}

impl ShardStats {
    fn accumulate(&mut self, other: &ShardStats) {
        self.proteins += other.proteins;
        self.residues += other.residues;
        self.kmers += other.kmers;
        self.combinations += other.combinations;
        for feature in &other.features {
            if !self.features.contains(feature) {
                self.features.push(feature.clone());
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub ksize: u32,
    pub shards: Vec<ShardStats>,
    pub total: ShardStats,
}

/// One shard of a database
pub struct Shard {
    index: u16,
    store: ShardStore,
}

impl Shard {
    pub fn new(index: u16, store: ShardStore) -> Self {
        Self { index, store }
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn store(&self) -> &ShardStore {
        &self.store
    }

    pub fn annotations(&self) -> AnnotationStore<'_> {
        AnnotationStore::new(&self.store)
    }

    pub fn ksize(&self) -> IndexResult<Option<KmerSize>> {
        match self.store.get(CF_META, META_KSIZE)? {
            Some(bytes) => {
                let raw: [u8; 4] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| IndexError::corrupt(CF_META, META_KSIZE, "bad k-mer size"))?;
                let ksize = KmerSize::new(u32::from_be_bytes(raw))
                    .map_err(|e| IndexError::corrupt(CF_META, META_KSIZE, e))?;
                Ok(Some(ksize))
            }
            None => Ok(None),
        }
    }

    pub fn write_ksize(&self, ksize: KmerSize) -> IndexResult<()> {
        self.store.put(CF_META, META_KSIZE, &ksize.get().to_be_bytes())
    }

    pub fn stats(&self) -> IndexResult<Option<ShardStats>> {
        match self.store.get(CF_META, META_STATS)? {
            Some(bytes) => Ok(Some(decode_record(CF_META, META_STATS, &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn write_stats(&self, stats: &ShardStats) -> IndexResult<()> {
        self.store.put(CF_META, META_STATS, &encode_record(stats)?)
    }

    /// Count the persisted structures of the shard
    pub fn compute_stats(&self, residues: u64) -> IndexResult<ShardStats> {
        let annotations = self.annotations();
        let mut features = Vec::new();
        for kind in FieldKind::ALL {
            if annotations.value_count(kind)? > 0 {
                features.push(kind.to_string());
            }
        }
        Ok(ShardStats {
            proteins: self.store.count(CF_PROTEIN)?,
            residues,
            kmers: self.store.count(CF_KMER)?,
            combinations: self.store.count(CF_COMBINATION)?,
            features,
        })
    }

    /// Sorted ids of the proteins containing `kmer`; an unseen k-mer is `None`
    pub fn protein_set(&self, kmer: &[u8]) -> IndexResult<Option<Vec<u32>>> {
        match self.store.get(CF_PROTEIN_SET, kmer)? {
            Some(bytes) => Ok(Some(decode_record(CF_PROTEIN_SET, kmer, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Resolve a k-mer to its annotation tuple id and protein set
    pub fn kmer(&self, kmer: &[u8]) -> IndexResult<Option<KmerEntry>> {
        let Some(pointer) = self.store.get(CF_KMER, kmer)? else {
            return Ok(None);
        };
        let combination = CombinationId::from_bytes(&pointer)
            .ok_or_else(|| IndexError::corrupt(CF_KMER, kmer, "bad combination pointer"))?;
        let proteins = self.protein_set(kmer)?.unwrap_or_default();
        Ok(Some(KmerEntry { combination, proteins }))
    }

    pub fn protein(&self, id: u32) -> IndexResult<Option<ProteinRecord>> {
        let key = protein_key(id);
        match self.store.get(CF_PROTEIN, &key)? {
            Some(bytes) => Ok(Some(decode_record(CF_PROTEIN, &key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Materialize a protein for output, resolving annotation text when asked
    pub fn hit_entry(&self, id: u32, resolve_annotations: bool) -> IndexResult<Option<HitEntry>> {
        let Some(record) = self.protein(id)? else {
            return Ok(None);
        };
        let annotations = if resolve_annotations {
            self.annotations().resolve(record.combination)?
        } else {
            Annotations::default()
        };
        Ok(Some(HitEntry::new(record, annotations)))
    }
}

/// A k-mer database made of independently built shards, opened for searching
pub struct ProteomeIndex {
    path: PathBuf,
    ksize: KmerSize,
    shards: Vec<Shard>,
}

impl ProteomeIndex {
    /// Path of shard `index` inside a database directory
    pub fn shard_path<P: AsRef<Path>>(root: P, index: u16) -> PathBuf {
        root.as_ref().join(format!("{}{}", SHARD_PREFIX, index))
    }

    /// Shard directories of a database, sorted by shard index
    pub fn shard_paths<P: AsRef<Path>>(root: P) -> IndexResult<Vec<(u16, PathBuf)>> {
        let mut shards = Vec::new();
        for entry in fs::read_dir(root.as_ref())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(index) = name
                .to_str()
                .and_then(|n| n.strip_prefix(SHARD_PREFIX))
                .and_then(|n| n.parse::<u16>().ok())
            else {
                continue;
            };
            shards.push((index, entry.path()));
        }
        shards.sort_by_key(|(index, _)| *index);
        Ok(shards)
    }

    /// Open every shard of the database read-only.
    ///
    /// A directory that is itself a store (no `store_<i>` children) is opened
    /// as a single shard with index 0.
    pub fn open<P: AsRef<Path>>(path: P) -> IndexResult<Self> {
        let root = path.as_ref();
        let mut paths = Self::shard_paths(root)?;
        if paths.is_empty() && root.join("CURRENT").is_file() {
            paths.push((0, root.to_path_buf()));
        }
        if paths.is_empty() {
            return Err(IndexError::EmptyDatabase(root.display().to_string()));
        }

        let mut shards = Vec::with_capacity(paths.len());
        for (index, shard_path) in paths {
            shards.push(Shard::new(index, ShardStore::open_read_only(&shard_path)?));
        }
        Self::from_shards(root.to_path_buf(), shards)
    }

    /// Assemble an index from opened shards, checking they agree on the k-mer size
    pub fn from_shards(path: PathBuf, shards: Vec<Shard>) -> IndexResult<Self> {
        let mut ksize: Option<KmerSize> = None;
        for shard in &shards {
            let found = shard.ksize()?.ok_or_else(|| IndexError::ConfigurationError {
                field: "ksize".to_string(),
                message: format!("shard {} has no recorded k-mer size", shard.index()),
            })?;
            match ksize {
                Some(expected) if expected != found => {
                    return Err(IndexError::KsizeMismatch {
                        shard: shard.index() as usize,
                        expected: expected.get(),
                        found: found.get(),
                    });
                }
                _ => ksize = Some(found),
            }
        }
        let ksize = ksize.ok_or_else(|| IndexError::EmptyDatabase(path.display().to_string()))?;
        Ok(Self { path, ksize, shards })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ksize(&self) -> KmerSize {
        self.ksize
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    fn shard(&self, index: u16) -> Option<&Shard> {
        self.shards.iter().find(|s| s.index() == index)
    }

    pub fn hit_entry(
        &self,
        key: ProteinKey,
        resolve_annotations: bool,
    ) -> IndexResult<Option<HitEntry>> {
        match self.shard(key.shard) {
            Some(shard) => shard.hit_entry(key.id, resolve_annotations),
            None => Ok(None),
        }
    }

    /// Statistics of every shard. Shards without persisted statistics are counted on the fly.
    pub fn stats(&self) -> IndexResult<DatabaseStats> {
        let mut shards = Vec::with_capacity(self.shards.len());
        let mut total = ShardStats::default();
        for shard in &self.shards {
            let stats = match shard.stats()? {
                Some(stats) => stats,
                None => shard.compute_stats(0)?,
            };
            total.accumulate(&stats);
            shards.push(stats);
        }
        Ok(DatabaseStats { ksize: self.ksize.get(), shards, total })
    }
}
