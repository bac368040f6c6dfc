use crate::errors::{IndexError, IndexResult};
use crate::types::{KmerSize, MatchRatio};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Absolute minimum number of matching k-mers for a hit to be reported
pub const MIN_KMATCH: u64 = 10;

/// Default number of hits reported per query
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Kind of sequences in a query file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceType {
    Protein,
    Nucleotide,
    Reads,
}

/// Output format of search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Tsv,
    Json,
}

/// Performance-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Number of threads for the outer pool (shards when building, queries when searching)
    pub num_threads: Option<usize>,
    /// Worker tasks inside one unit of work (lines of a shard, k-mers of a query)
    pub workers: usize,
    /// Capacity of the bounded queues between pipeline stages
    pub queue_capacity: usize,
    /// Progress reporting interval, in records
    pub progress_interval: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { num_threads: None, workers: 2, queue_capacity: 64, progress_interval: 10_000 }
    }
}

impl PerformanceConfig {
    /// Get the number of threads to use
    pub fn effective_thread_count(&self) -> usize {
        self.num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }

    fn validate(&self) -> IndexResult<()> {
        if self.num_threads == Some(0) {
            return Err(IndexError::ConfigurationError {
                field: "num_threads".to_string(),
                message: "Thread count must be greater than 0".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(IndexError::ConfigurationError {
                field: "workers".to_string(),
                message: "Worker count must be greater than 0".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(IndexError::ConfigurationError {
                field: "queue_capacity".to_string(),
                message: "Queue capacity must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration of a database build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// K-mer size
    pub ksize: KmerSize,
    /// Database directory; one `store_<i>` shard is created per input file
    pub db_path: PathBuf,
    /// Performance settings
    pub performance: PerformanceConfig,
}

impl BuildConfig {
    /// Create a new configuration with validation
    pub fn new(ksize: u32, db_path: PathBuf) -> IndexResult<Self> {
        let ksize = KmerSize::new(ksize).map_err(|e| IndexError::ConfigurationError {
            field: "ksize".to_string(),
            message: e,
        })?;

        Ok(Self { ksize, db_path, performance: PerformanceConfig::default() })
    }

    /// Validate the configuration
    pub fn validate(&self) -> IndexResult<()> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(IndexError::ConfigurationError {
                    field: "db_path".to_string(),
                    message: format!("Database directory does not exist: {:?}", parent),
                });
            }
        }
        if self.db_path.is_file() {
            return Err(IndexError::ConfigurationError {
                field: "db_path".to_string(),
                message: format!("Database path is a file: {:?}", self.db_path),
            });
        }
        self.performance.validate()
    }
}

/// Configuration builder for database builds
pub struct BuildConfigBuilder {
    config: BuildConfig,
}

impl BuildConfigBuilder {
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            config: BuildConfig {
                ksize: KmerSize::default(),
                db_path,
                performance: PerformanceConfig::default(),
            },
        }
    }

    /// Set the k-mer size
    pub fn ksize(mut self, ksize: u32) -> IndexResult<Self> {
        self.config.ksize = KmerSize::new(ksize).map_err(|e| IndexError::ConfigurationError {
            field: "ksize".to_string(),
            message: e,
        })?;
        Ok(self)
    }

    /// Set the number of shards built concurrently
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.performance.num_threads = Some(threads);
        self
    }

    /// Set the number of worker tasks per shard
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.performance.workers = workers;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.performance.queue_capacity = capacity;
        self
    }

    /// Set the progress interval
    pub fn progress_interval(mut self, interval: u64) -> Self {
        self.config.performance.progress_interval = interval;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> IndexResult<BuildConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration of a search run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Minimum fraction of query k-mers a hit must share
    pub min_ratio: MatchRatio,
    /// Minimum raw number of shared k-mers
    pub min_kmatch: u64,
    /// Maximum hits kept per query
    pub max_results: usize,
    /// Record which query positions matched each hit
    pub extract_positions: bool,
    /// Resolve full annotations of every hit
    pub annotations: bool,
    pub sequence_type: SequenceType,
    pub output_format: OutputFormat,
    pub performance: PerformanceConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_ratio: MatchRatio::default(),
            min_kmatch: MIN_KMATCH,
            max_results: DEFAULT_MAX_RESULTS,
            extract_positions: false,
            annotations: false,
            sequence_type: SequenceType::Protein,
            output_format: OutputFormat::Tsv,
            performance: PerformanceConfig { workers: 4, ..PerformanceConfig::default() },
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> IndexResult<()> {
        self.performance.validate()
    }
}

/// Configuration builder for search runs
#[derive(Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_ratio(mut self, ratio: f64) -> IndexResult<Self> {
        self.config.min_ratio = MatchRatio::new(ratio).map_err(|e| {
            IndexError::ConfigurationError { field: "min_ratio".to_string(), message: e }
        })?;
        Ok(self)
    }

    pub fn min_kmatch(mut self, floor: u64) -> Self {
        self.config.min_kmatch = floor;
        self
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.config.max_results = max;
        self
    }

    pub fn extract_positions(mut self, enable: bool) -> Self {
        self.config.extract_positions = enable;
        self
    }

    pub fn annotations(mut self, enable: bool) -> Self {
        self.config.annotations = enable;
        self
    }

    pub fn sequence_type(mut self, sequence_type: SequenceType) -> Self {
        self.config.sequence_type = sequence_type;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Set the number of queries searched concurrently
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.performance.num_threads = Some(threads);
        self
    }

    /// Set the size of the thread pool running k-mer lookups
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.performance.workers = workers;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.performance.queue_capacity = capacity;
        self
    }

    pub fn build(self) -> IndexResult<SearchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
