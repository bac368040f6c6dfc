use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

use crossbeam_channel::bounded;
use parking_lot::{Mutex, MutexGuard};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::annotation::AnnotationTuple;
use crate::config::BuildConfig;
use crate::encoding::{encode_record, protein_key};
use crate::errors::{IndexError, IndexResult, IndexResultExt};
use crate::index::{KmerEntry, ProteomeIndex, Shard, ShardStats};
use crate::io::{open_input, TextLines};
use crate::kmer::kmer_windows;
use crate::metrics::{IndexMetrics, MetricsCollector, PerformanceTimer};
use crate::protein::ProteinRecord;
use crate::store::{ShardStore, CF_COMBINATION, CF_KMER, CF_PROTEIN, CF_PROTEIN_SET};
use crate::types::KmerSize;
use crate::uniprot::UniProtEntry;

const LOCK_STRIPES: usize = 1024;

/// Striped locks serializing the read-merge-write of a k-mer entry
pub struct KmerLocks {
    stripes: Vec<Mutex<()>>,
}

impl KmerLocks {
    pub fn new(stripes: usize) -> Self {
        Self { stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect() }
    }

    pub fn lock(&self, kmer: &[u8]) -> MutexGuard<'_, ()> {
        let stripe = (xxh3_64(kmer) % self.stripes.len() as u64) as usize;
        self.stripes[stripe].lock()
    }
}

impl Default for KmerLocks {
    fn default() -> Self {
        Self::new(LOCK_STRIPES)
    }
}

/// Summary of one built shard
#[derive(Debug, Clone, Serialize)]
pub struct ShardReport {
    pub index: u16,
    pub source: PathBuf,
    pub stats: ShardStats,
    pub metrics: IndexMetrics,
}

/// An input file that was not indexed
#[derive(Debug, Clone, Serialize)]
pub struct RejectedInput {
    pub source: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub shards: Vec<ShardReport>,
    pub rejected: Vec<RejectedInput>,
}

/// Builds one shard from a stream of UniProt TSV lines
pub struct ShardBuilder {
    shard: Shard,
    ksize: KmerSize,
    next_id: AtomicU32,
    residues_before: u64,
    locks: KmerLocks,
    metrics: MetricsCollector,
    progress_interval: u64,
}

impl ShardBuilder {
    /// Create the shard at `path`, or reopen it to append records
    pub fn create<P: AsRef<Path>>(
        path: P,
        index: u16,
        ksize: KmerSize,
        progress_interval: u64,
    ) -> IndexResult<Self> {
        let shard = Shard::new(index, ShardStore::create(path)?);
        match shard.ksize()? {
            Some(found) if found != ksize => {
                return Err(IndexError::KsizeMismatch {
                    shard: index as usize,
                    expected: ksize.get(),
                    found: found.get(),
                });
            }
            Some(_) => {}
            None => shard.write_ksize(ksize)?,
        }

        // Protein ids are dense, so an existing shard continues after its last record
        let existing = shard.store().count(CF_PROTEIN)?;
        let next_id = u32::try_from(existing).map_err(|_| IndexError::ValidationError {
            message: format!("shard {} holds too many proteins", index),
        })?;
        let residues_before = shard.stats()?.map(|s| s.residues).unwrap_or(0);

        Ok(Self {
            shard,
            ksize,
            next_id: AtomicU32::new(next_id),
            residues_before,
            locks: KmerLocks::default(),
            metrics: MetricsCollector::new(),
            progress_interval,
        })
    }

    pub fn shard(&self) -> &Shard {
        &self.shard
    }

    pub fn metrics(&self) -> IndexMetrics {
        self.metrics.get_metrics()
    }

    /// Index one TSV line. Returns whether the line produced a protein.
    pub fn add_record(&self, line: &str) -> IndexResult<bool> {
        if line.trim().is_empty() {
            return Ok(false);
        }
        let Some(entry) = UniProtEntry::from_tsv_line(line) else {
            debug!(shard = self.shard.index(), "skipping record with too few fields");
            self.metrics.record_skipped();
            return Ok(false);
        };
        if entry.entry == "Entry" && entry.sequence == "Sequence" {
            return Ok(false);
        }
        let sequence = entry.sequence.as_bytes();
        let k = self.ksize.as_usize();
        if sequence.len() < k {
            debug!(
                shard = self.shard.index(),
                entry = entry.entry,
                length = sequence.len(),
                "skipping sequence shorter than k"
            );
            self.metrics.record_skipped();
            return Ok(false);
        }

        let annotations = self.shard.annotations();
        let tuple = annotations.intern(&entry.annotation_text())?;
        let combination = annotations.get_or_create_combination(&tuple)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = ProteinRecord::from_entry(id, &entry, combination);
        self.shard.store().put(CF_PROTEIN, &protein_key(id), &encode_record(&record)?)?;

        let mut windows = 0u64;
        for (_, kmer) in kmer_windows(sequence, k) {
            self.update_kmer(kmer, id, &tuple)?;
            windows += 1;
        }

        let indexed = self.metrics.record_protein(sequence.len() as u64, windows);
        if self.progress_interval > 0 && indexed % self.progress_interval == 0 {
            let metrics = self.metrics.get_metrics();
            info!(
                shard = self.shard.index(),
                proteins = indexed,
                kmers_per_second = metrics.kmers_per_second() as u64,
                "indexing progress"
            );
        }
        Ok(true)
    }

    /// Add `protein` to the entry of `kmer`, merging its annotation tuple into
    /// the one already stored. Runs under the stripe lock of the k-mer.
    fn update_kmer(&self, kmer: &[u8], protein: u32, incoming: &AnnotationTuple) -> IndexResult<()> {
        let annotations = self.shard.annotations();
        let _guard = self.locks.lock(kmer);

        let (mut entry, tuple, seen) = match self.shard.kmer(kmer)? {
            Some(entry) => {
                let stored = annotations.combination(entry.combination)?.ok_or_else(|| {
                    IndexError::corrupt(
                        CF_COMBINATION,
                        &entry.combination.to_bytes(),
                        "missing annotation tuple",
                    )
                })?;
                (entry, stored.merge(incoming), true)
            }
            None => (KmerEntry { combination: incoming.id(), proteins: Vec::new() }, *incoming, false),
        };

        let combination = annotations.get_or_create_combination(&tuple)?;
        let retagged = !seen || combination != entry.combination;
        entry.combination = combination;
        let added = entry.insert_protein(protein);
        if !retagged && !added {
            return Ok(());
        }

        // Both partitions are keyed by the k-mer, so an update replaces the old state
        let mut batch = self.shard.store().batch();
        if retagged {
            batch.put(CF_KMER, kmer, &combination.to_bytes())?;
        }
        if added {
            batch.put(CF_PROTEIN_SET, kmer, &encode_record(&entry.proteins)?)?;
        }
        batch.commit()?;
        self.metrics.record_kmer_update();
        Ok(())
    }

    /// Feed every line of `reader` to `workers` threads through a bounded queue
    pub fn build_from_reader<R: BufRead>(
        &self,
        reader: R,
        workers: usize,
        queue_capacity: usize,
    ) -> IndexResult<()> {
        let (tx, rx) = bounded::<String>(queue_capacity.max(1));

        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers.max(1))
                .map(|_| {
                    let rx = rx.clone();
                    scope.spawn(move || -> IndexResult<()> {
                        for line in rx {
                            self.add_record(&line)?;
                        }
                        Ok(())
                    })
                })
                .collect();
            drop(rx);

            let mut first_error = None;
            for (number, line) in TextLines::new(reader).enumerate() {
                match line {
                    Ok(Ok(line)) => {
                        // Every worker has exited on an error
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(Err(e)) => {
                        debug!(
                            shard = self.shard.index(),
                            line = number + 1,
                            error = %e.utf8_error(),
                            "skipping record that is not UTF-8"
                        );
                        self.metrics.record_skipped();
                    }
                    Err(e) => {
                        first_error = Some(IndexError::from(e));
                        break;
                    }
                }
            }
            drop(tx);

            for handle in handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        first_error.get_or_insert(IndexError::WorkerPanicked(format!(
                            "build worker of shard {}",
                            self.shard.index()
                        )));
                    }
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }

    /// Persist the shard statistics and compact the store
    pub fn finish(self) -> IndexResult<(ShardStats, IndexMetrics)> {
        let metrics = self.metrics.get_metrics();
        let stats = self.shard.compute_stats(self.residues_before + metrics.residues)?;
        self.shard.write_stats(&stats)?;
        self.shard.store().finalize()?;
        Ok((stats, metrics))
    }
}

/// Builds a sharded database, one shard per input file
pub struct IndexBuilder {
    config: BuildConfig,
}

impl IndexBuilder {
    pub fn new(config: BuildConfig) -> IndexResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Expand directories into their `*.tsv` and `*.tsv.gz` files, sorted by name.
    /// `-` stands for stdin and is kept as is.
    pub fn collect_inputs(paths: &[PathBuf]) -> IndexResult<Vec<PathBuf>> {
        let mut inputs = Vec::new();
        for path in paths {
            if path.as_os_str() == "-" {
                inputs.push(path.clone());
            } else if path.is_dir() {
                let mut found = Vec::new();
                for entry in fs::read_dir(path)? {
                    let candidate = entry?.path();
                    let is_tsv = candidate
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.ends_with(".tsv") || n.ends_with(".tsv.gz"))
                        .unwrap_or(false);
                    if is_tsv && candidate.is_file() {
                        found.push(candidate);
                    }
                }
                found.sort();
                inputs.extend(found);
            } else if path.is_file() {
                inputs.push(path.clone());
            } else {
                return Err(IndexError::ConfigurationError {
                    field: "input".to_string(),
                    message: format!("Input not found: {}", path.display()),
                });
            }
        }
        Ok(inputs)
    }

    /// Build one shard per input in parallel.
    ///
    /// An input with unsupported content is reported in `rejected` and the
    /// remaining shards are still built; any other failure aborts the build.
    pub fn build(&self, inputs: &[PathBuf]) -> IndexResult<BuildReport> {
        if inputs.len() > u16::MAX as usize {
            return Err(IndexError::ValidationError {
                message: format!("too many input files: {}", inputs.len()),
            });
        }
        fs::create_dir_all(&self.config.db_path)
            .with_context(|| format!("creating database directory {:?}", self.config.db_path))?;

        let timer = PerformanceTimer::start("makedb");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.performance.effective_thread_count())
            .build()
            .map_err(|e| IndexError::ConfigurationError {
                field: "num_threads".to_string(),
                message: e.to_string(),
            })?;

        let results: Vec<(&PathBuf, IndexResult<ShardReport>)> = pool.install(|| {
            inputs
                .par_iter()
                .enumerate()
                .map(|(i, input)| (input, self.build_shard(i as u16, input)))
                .collect()
        });

        let mut report = BuildReport::default();
        for (input, result) in results {
            match result {
                Ok(shard) => report.shards.push(shard),
                Err(IndexError::UnsupportedContent { source_name, detected }) => {
                    warn!(input = %source_name, detected = %detected, "input rejected");
                    report.rejected.push(RejectedInput {
                        source: input.clone(),
                        reason: format!("unsupported content: {}", detected),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        timer.finish_and_log();
        Ok(report)
    }

    fn build_shard(&self, index: u16, input: &Path) -> IndexResult<ShardReport> {
        let (reader, format) = open_input(input)?;
        let path = ProteomeIndex::shard_path(&self.config.db_path, index);
        info!(shard = index, input = %input.display(), format = %format, "building shard");

        let builder = ShardBuilder::create(
            &path,
            index,
            self.config.ksize,
            self.config.performance.progress_interval,
        )?;
        builder.build_from_reader(
            reader,
            self.config.performance.workers,
            self.config.performance.queue_capacity,
        )?;
        let (stats, metrics) = builder.finish()?;
        info!(
            shard = index,
            proteins = stats.proteins,
            kmers = stats.kmers,
            skipped = metrics.records_skipped,
            records_per_second = metrics.records_per_second() as u64,
            "shard done"
        );
        Ok(ShardReport { index, source: input.to_path_buf(), stats, metrics })
    }
}
