use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use dashmap::DashMap;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::errors::{IndexError, IndexResult};
use crate::index::ProteomeIndex;
use crate::io::InputReader;
use crate::metrics::PerformanceTimer;
use crate::output::ResultWriter;
use crate::protein::HitEntry;
use crate::query::{read_queries, Query};
use crate::types::ProteinKey;

/// Shared flag asking a running search to stop taking new queries
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A protein sharing k-mers with a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Hit {
    pub protein: ProteinKey,
    pub kmatch: u64,
}

/// Ranked hits of one query, with the matched query positions of each hit
/// when position tracking is on
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub hits: Vec<Hit>,
    pub positions: HashMap<ProteinKey, Vec<bool>>,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub query: Query,
    pub results: SearchResults,
    /// Records of the reported hits; a hit without a readable record is absent
    pub entries: HashMap<ProteinKey, HitEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchSummary {
    pub queries: u64,
    pub hits: u64,
}

/// Order hits by descending count, then ascending protein key
pub fn rank_hits<I>(counts: I) -> Vec<Hit>
where
    I: IntoIterator<Item = (ProteinKey, u64)>,
{
    let mut hits: Vec<Hit> =
        counts.into_iter().map(|(protein, kmatch)| Hit { protein, kmatch }).collect();
    hits.sort_unstable_by(|a, b| b.kmatch.cmp(&a.kmatch).then(a.protein.cmp(&b.protein)));
    hits
}

/// Ratio and floor thresholds applied to ranked hits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitFilter {
    pub min_ratio: f64,
    pub min_kmatch: u64,
    pub max_results: usize,
}

impl From<&SearchConfig> for HitFilter {
    fn from(config: &SearchConfig) -> Self {
        Self {
            min_ratio: config.min_ratio.get(),
            min_kmatch: config.min_kmatch,
            max_results: config.max_results,
        }
    }
}

impl HitFilter {
    pub fn passes(&self, hit: &Hit, size_in_kmer: usize) -> bool {
        if size_in_kmer == 0 || hit.kmatch < self.min_kmatch {
            return false;
        }
        hit.kmatch as f64 / size_in_kmer as f64 >= self.min_ratio
    }

    /// Keep the hits before the first failing one, at most `max_results`
    /// of them, and drop the positions of every discarded hit.
    pub fn apply(&self, results: &mut SearchResults, size_in_kmer: usize) {
        let passing = results
            .hits
            .iter()
            .position(|hit| !self.passes(hit, size_in_kmer))
            .unwrap_or(results.hits.len());
        results.hits.truncate(passing.min(self.max_results));

        if !results.positions.is_empty() {
            let kept: HashSet<ProteinKey> = results.hits.iter().map(|h| h.protein).collect();
            results.positions.retain(|key, _| kept.contains(key));
        }
    }
}

/// Searches queries against every shard of a database
pub struct ProteinSearcher {
    index: Arc<ProteomeIndex>,
    config: SearchConfig,
    pool: ThreadPool,
}

impl ProteinSearcher {
    pub fn new(index: Arc<ProteomeIndex>, config: SearchConfig) -> IndexResult<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.performance.workers.max(1))
            .thread_name(|i| format!("kmer-lookup-{}", i))
            .build()
            .map_err(|e| IndexError::ConfigurationError {
                field: "workers".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { index, config, pool })
    }

    /// Open the database at `path` and search it with `config`
    pub fn load<P: AsRef<Path>>(path: P, config: SearchConfig) -> IndexResult<Self> {
        let index = ProteomeIndex::open(path)?;
        info!(
            shards = index.shards().len(),
            ksize = index.ksize().get(),
            "database opened"
        );
        Self::new(Arc::new(index), config)
    }

    pub fn index(&self) -> &ProteomeIndex {
        &self.index
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn ksize(&self) -> usize {
        self.index.ksize().as_usize()
    }

    /// Count, for every protein, the query k-mers it contains.
    ///
    /// The k-mer lookups of one query run on the searcher's thread pool;
    /// the hits are ranked once every lookup is done.
    pub fn search(&self, query: &Query) -> IndexResult<SearchResults> {
        let windows: Vec<(usize, &[u8])> = query.kmers(self.ksize()).collect();
        let counts: DashMap<ProteinKey, u64> = DashMap::new();
        let positions = self.config.extract_positions.then(DashMap::new);

        self.pool.install(|| {
            windows.par_iter().try_for_each(|&(pos, kmer)| {
                self.lookup(kmer, pos, query.size_in_kmer, &counts, positions.as_ref())
            })
        })?;

        let positions = positions.map(|p| p.into_iter().collect()).unwrap_or_default();
        Ok(SearchResults { hits: rank_hits(counts), positions })
    }

    /// Look one k-mer up in every shard and credit the proteins containing it
    fn lookup(
        &self,
        kmer: &[u8],
        pos: usize,
        size: usize,
        counts: &DashMap<ProteinKey, u64>,
        positions: Option<&DashMap<ProteinKey, Vec<bool>>>,
    ) -> IndexResult<()> {
        for shard in self.index.shards() {
            let proteins = match shard.protein_set(kmer) {
                Ok(Some(proteins)) => proteins,
                Ok(None) => continue,
                Err(e @ IndexError::CorruptRecord { .. }) => {
                    warn!(shard = shard.index(), error = %e, "skipping unreadable protein set");
                    continue;
                }
                Err(e) => return Err(e),
            };
            for id in proteins {
                let protein = ProteinKey::new(shard.index(), id);
                *counts.entry(protein).or_insert(0) += 1;
                if let Some(positions) = positions {
                    let mut matched = positions.entry(protein).or_insert_with(|| vec![false; size]);
                    if let Some(slot) = matched.get_mut(pos) {
                        *slot = true;
                    }
                }
            }
        }
        Ok(())
    }

    /// Records of the given hits. An unreadable or missing record only
    /// leaves that hit without annotation.
    pub fn fetch_hits_information(&self, hits: &[Hit]) -> IndexResult<HashMap<ProteinKey, HitEntry>> {
        let mut entries = HashMap::with_capacity(hits.len());
        for hit in hits {
            match self.index.hit_entry(hit.protein, self.config.annotations) {
                Ok(Some(entry)) => {
                    entries.insert(hit.protein, entry);
                }
                Ok(None) => debug!(protein = %hit.protein, "no record for hit"),
                Err(e @ IndexError::CorruptRecord { .. }) => {
                    warn!(protein = %hit.protein, error = %e, "skipping unreadable protein record")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    /// Search, filter and annotate one query
    pub fn query(&self, query: Query) -> IndexResult<QueryResult> {
        let mut results = self.search(&query)?;
        HitFilter::from(&self.config).apply(&mut results, query.size_in_kmer);
        let entries = self.fetch_hits_information(&results.hits)?;
        Ok(QueryResult { query, results, entries })
    }

    /// Search every query of `input` and stream the results to `writer`.
    ///
    /// Queries are read on one thread, searched by a pool of query workers
    /// and written on the calling thread; all stages are linked by bounded
    /// queues. Cancelling `cancel` stops the pipeline after the queries in
    /// flight.
    pub fn run<W: Write>(
        &self,
        input: InputReader,
        writer: &mut ResultWriter<W>,
        cancel: &CancellationToken,
    ) -> IndexResult<SearchSummary> {
        let timer = PerformanceTimer::start("search");
        let capacity = self.config.performance.queue_capacity.max(1);
        let sequence_type = self.config.sequence_type;
        let ksize = self.ksize();
        let (query_tx, query_rx) = bounded::<Query>(capacity);
        let (result_tx, result_rx) = bounded::<IndexResult<QueryResult>>(capacity);

        let summary = thread::scope(|scope| -> IndexResult<SearchSummary> {
            let reader = scope.spawn(move || {
                read_queries(input, sequence_type, ksize, &query_tx, cancel)
            });

            let searchers: Vec<_> = (0..self.config.performance.effective_thread_count())
                .map(|_| {
                    let query_rx = query_rx.clone();
                    let result_tx = result_tx.clone();
                    scope.spawn(move || {
                        while !cancel.is_cancelled() {
                            let Ok(query) = query_rx.recv() else { break };
                            if cancel.is_cancelled() {
                                break;
                            }
                            let result = self.query(query);
                            let failed = result.is_err();
                            if result_tx.send(result).is_err() || failed {
                                break;
                            }
                        }
                    })
                })
                .collect();
            drop(query_rx);
            drop(result_tx);

            let mut summary = SearchSummary::default();
            let mut first_error = None;
            for result in result_rx {
                match result.and_then(|result| {
                    writer.write(&result)?;
                    Ok(result.results.hits.len() as u64)
                }) {
                    Ok(hits) => {
                        summary.queries += 1;
                        summary.hits += hits;
                    }
                    Err(e) => {
                        first_error = Some(e);
                        break;
                    }
                }
            }

            for searcher in searchers {
                if searcher.join().is_err() {
                    first_error.get_or_insert(IndexError::WorkerPanicked(
                        "query search worker".to_string(),
                    ));
                }
            }
            match reader.join() {
                Ok(Ok(read)) => debug!(queries = read, "query input drained"),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    first_error
                        .get_or_insert(IndexError::WorkerPanicked("query reader".to_string()));
                }
            }
            first_error.map_or(Ok(summary), Err)
        })?;

        let elapsed = timer.finish();
        info!(queries = summary.queries, hits = summary.hits, elapsed = ?elapsed, "search finished");
        Ok(summary)
    }
}
