use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::builder::{BuildReport, IndexBuilder};
use crate::config::{BuildConfigBuilder, SearchConfig};
use crate::errors::IndexResult;
use crate::index::ProteomeIndex;
use crate::io::{open_sniffed, InputReader};
use crate::search::ProteinSearcher;
use crate::tests::test_fixtures::TEST_KSIZE;

/// Write `lines` as a TSV file named `name` inside `dir`
pub fn write_tsv(dir: &Path, name: &str, lines: &[&str]) -> IndexResult<PathBuf> {
    let path = dir.join(name);
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(&path, content)?;
    Ok(path)
}

/// Build a database at `dir/db` with one shard per input
pub fn build_database(dir: &Path, inputs: &[PathBuf], workers: usize) -> IndexResult<(PathBuf, BuildReport)> {
    let db_path = dir.join("db");
    let config = BuildConfigBuilder::new(db_path.clone())
        .ksize(TEST_KSIZE)?
        .num_threads(2)
        .workers(workers)
        .progress_interval(0)
        .build()?;
    let report = IndexBuilder::new(config)?.build(inputs)?;
    Ok((db_path, report))
}

/// Build a single-shard database from `lines`
pub fn build_from_lines(dir: &Path, lines: &[&str]) -> IndexResult<PathBuf> {
    let input = write_tsv(dir, "proteins.tsv", lines)?;
    Ok(build_database(dir, &[input], 2)?.0)
}

pub fn searcher(db_path: &Path, config: SearchConfig) -> IndexResult<ProteinSearcher> {
    ProteinSearcher::new(Arc::new(ProteomeIndex::open(db_path)?), config)
}

pub fn text_input(text: &str) -> IndexResult<InputReader> {
    Ok(open_sniffed("test", Cursor::new(text.as_bytes().to_vec()))?.0)
}
