//! K-mer protein search.
//!
//! Databases are built from UniProtKB TSV exports, one RocksDB shard per
//! input file. Every k-mer of every protein points to the set of proteins
//! containing it, together with a deduplicated tuple of their annotations.
//! Protein, nucleotide and read queries are searched by counting shared
//! k-mers per protein.

pub mod annotation;
pub mod builder;
pub mod config;
pub mod encoding;
pub mod errors;
pub mod index;
pub mod io;
pub mod kmer;
pub mod metrics;
pub mod output;
pub mod protein;
pub mod query;
pub mod search;
pub mod store;
pub mod translate;
pub mod types;
pub mod uniprot;

pub use builder::{BuildReport, IndexBuilder, ShardBuilder};
pub use config::{BuildConfig, BuildConfigBuilder, OutputFormat, SearchConfig, SearchConfigBuilder, SequenceType};
pub use errors::{IndexError, IndexResult};
pub use index::{DatabaseStats, ProteomeIndex, ShardStats};
pub use output::ResultWriter;
pub use query::Query;
pub use search::{CancellationToken, ProteinSearcher, QueryResult};

#[cfg(test)]
mod tests;
