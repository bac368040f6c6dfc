use anyhow::Result;
use tempfile::tempdir;

use crate::config::{OutputFormat, SearchConfig, SearchConfigBuilder, SequenceType};
use crate::encoding::protein_key;
use crate::index::ProteomeIndex;
use crate::output::{format_positions, ResultWriter};
use crate::query::Query;
use crate::search::{CancellationToken, Hit};
use crate::tests::test_fixtures::{
    LONG_QUERY, P1_DNA, P1_LINE, P1_SEQUENCE, P2_LINE, RANKED_LINES, TEST_KSIZE,
};
use crate::tests::test_utils::{build_database, build_from_lines, searcher, text_input, write_tsv};
use crate::store::{ShardStore, CF_PROTEIN, CF_PROTEIN_SET};
use crate::types::ProteinKey;

const K: usize = TEST_KSIZE as usize;

#[test]
fn test_single_protein_end_to_end() -> Result<()> {
    let dir = tempdir()?;
    let db_path = build_from_lines(dir.path(), &[P1_LINE])?;
    let searcher = searcher(&db_path, SearchConfig::default())?;

    let result = searcher.query(Query::protein("q1", P1_SEQUENCE, K))?;
    assert_eq!(result.query.size_in_kmer, 10);
    assert_eq!(result.results.hits, vec![Hit { protein: ProteinKey::new(0, 0), kmatch: 10 }]);
    assert_eq!(result.entries[&ProteinKey::new(0, 0)].entry, "P1");
    Ok(())
}

#[test]
fn test_unrelated_protein_has_no_hit() -> Result<()> {
    let dir = tempdir()?;
    let db_path = build_from_lines(dir.path(), &[P1_LINE, P2_LINE])?;
    let searcher = searcher(&db_path, SearchConfig::default())?;

    let result = searcher.query(Query::protein("q1", "WWWWWWWWWWWWWWWW", K))?;
    assert!(result.results.hits.is_empty());
    assert!(result.entries.is_empty());
    Ok(())
}

#[test]
fn test_ranking_is_independent_of_thread_count() -> Result<()> {
    let dir = tempdir()?;
    let input = write_tsv(dir.path(), "ranked.tsv", &RANKED_LINES)?;
    let (db_path, _) = build_database(dir.path(), &[input], 1)?;
    let query = Query::protein("long", LONG_QUERY, K);

    let mut runs = Vec::new();
    for workers in [1, 3, 8] {
        let config = SearchConfigBuilder::new().workers(workers).queue_capacity(2).build()?;
        runs.push(searcher(&db_path, config)?.search(&query)?.hits);
    }
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0], runs[2]);

    let counts: Vec<u64> = runs[0].iter().map(|h| h.kmatch).collect();
    assert_eq!(counts, vec![27, 14, 14, 11]);
    // Lines are indexed in order by a single worker, so ties follow the input
    let ids: Vec<u32> = runs[0].iter().map(|h| h.protein.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    Ok(())
}

#[test]
fn test_filters_apply_ratio_and_cap() -> Result<()> {
    let dir = tempdir()?;
    let db_path = build_from_lines(dir.path(), &RANKED_LINES)?;

    // 11/27 < 0.5 and everything after it goes too
    let config = SearchConfigBuilder::new().min_ratio(0.5)?.build()?;
    let result = searcher(&db_path, config)?.query(Query::protein("long", LONG_QUERY, K))?;
    assert_eq!(result.results.hits.len(), 3);

    let config = SearchConfigBuilder::new().max_results(2).build()?;
    let result = searcher(&db_path, config)?.query(Query::protein("long", LONG_QUERY, K))?;
    assert_eq!(result.results.hits.len(), 2);
    assert_eq!(result.entries.len(), 2);
    Ok(())
}

#[test]
fn test_positions_of_partial_match() -> Result<()> {
    let dir = tempdir()?;
    let db_path = build_from_lines(dir.path(), &[P1_LINE])?;
    let config = SearchConfigBuilder::new().extract_positions(true).build()?;
    let searcher = searcher(&db_path, config)?;

    // 15 windows, the first 10 of which belong to P1
    let query = Query::protein("q1", format!("{}WWWWW", P1_SEQUENCE), K);
    let result = searcher.query(query)?;
    let positions = &result.results.positions[&ProteinKey::new(0, 0)];
    assert_eq!(positions.len(), 15);
    assert_eq!(format_positions(positions), "1-10");
    Ok(())
}

#[test]
fn test_hits_span_shards() -> Result<()> {
    let dir = tempdir()?;
    let first = write_tsv(dir.path(), "a.tsv", &[P1_LINE])?;
    let second = write_tsv(dir.path(), "b.tsv", &RANKED_LINES[..2])?;
    let (db_path, _) = build_database(dir.path(), &[first, second], 2)?;
    let searcher = searcher(&db_path, SearchConfig::default())?;

    let result = searcher.query(Query::protein("q1", P1_SEQUENCE, K))?;
    let mut shards: Vec<u16> = result.results.hits.iter().map(|h| h.protein.shard).collect();
    shards.sort();
    assert_eq!(shards, vec![0, 1, 1]);
    assert!(result.results.hits.iter().all(|h| h.kmatch == 10));
    Ok(())
}

#[test]
fn test_nucleotide_query_end_to_end() -> Result<()> {
    let dir = tempdir()?;
    let db_path = build_from_lines(dir.path(), &[P1_LINE])?;
    let config = SearchConfigBuilder::new()
        .sequence_type(SequenceType::Nucleotide)
        .output_format(OutputFormat::Tsv)
        .build()?;
    let searcher = searcher(&db_path, config)?;

    let mut writer = ResultWriter::new(Vec::new(), OutputFormat::Tsv, false, false)?;
    let input = text_input(&format!(">contig1\n{}\n", P1_DNA))?;
    let summary = searcher.run(input, &mut writer, &CancellationToken::new())?;
    assert_eq!(summary.hits, 1);

    let text = String::from_utf8(writer.finish()?)?;
    let row = text.lines().nth(1).expect("one hit row");
    assert_eq!(row, "contig1_+1_1-51\t10\t1\t51\t10\tP1");
    Ok(())
}

#[test]
fn test_run_streams_every_query() -> Result<()> {
    let dir = tempdir()?;
    let db_path = build_from_lines(dir.path(), &RANKED_LINES)?;
    let config = SearchConfigBuilder::new().num_threads(3).build()?;
    let searcher = searcher(&db_path, config)?;

    let fasta: String =
        (0..12).map(|i| format!(">q{}\n{}\n", i, LONG_QUERY)).collect::<Vec<_>>().join("");
    let mut writer = ResultWriter::new(Vec::new(), OutputFormat::Json, false, false)?;
    let summary = searcher.run(text_input(&fasta)?, &mut writer, &CancellationToken::new())?;
    assert_eq!(summary.queries, 12);
    assert_eq!(summary.hits, 12 * 4);

    let value: serde_json::Value = serde_json::from_slice(&writer.finish()?)?;
    assert_eq!(value.as_array().map(Vec::len), Some(12));
    Ok(())
}

#[test]
fn test_cancelled_run_writes_no_result() -> Result<()> {
    let dir = tempdir()?;
    let db_path = build_from_lines(dir.path(), &[P1_LINE])?;
    let searcher = searcher(&db_path, SearchConfig::default())?;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut writer = ResultWriter::new(Vec::new(), OutputFormat::Tsv, false, false)?;
    let input = text_input(&format!(">q1\n{}\n", P1_SEQUENCE))?;
    let summary = searcher.run(input, &mut writer, &cancel)?;
    assert_eq!(summary.queries, 0);

    let text = String::from_utf8(writer.finish()?)?;
    assert_eq!(text.lines().count(), 1);
    Ok(())
}

/// Build the ranked proteins with one worker so ids follow the input order
fn ranked_database(dir: &std::path::Path) -> Result<std::path::PathBuf> {
    let input = write_tsv(dir, "ranked.tsv", &RANKED_LINES)?;
    Ok(build_database(dir, &[input], 1)?.0)
}

fn overwrite(db_path: &std::path::Path, partition: &'static str, key: &[u8]) -> Result<()> {
    let store = ShardStore::create(ProteomeIndex::shard_path(db_path, 0))?;
    store.put(partition, key, &[0xff; 3])?;
    store.finalize()?;
    Ok(())
}

#[test]
fn test_unreadable_protein_record_only_loses_its_entry() -> Result<()> {
    let dir = tempdir()?;
    let db_path = ranked_database(dir.path())?;
    overwrite(&db_path, CF_PROTEIN, &protein_key(1))?;

    let config = SearchConfigBuilder::new().annotations(true).build()?;
    let result = searcher(&db_path, config)?.query(Query::protein("long", LONG_QUERY, K))?;
    assert_eq!(result.results.hits.len(), 4);
    assert_eq!(result.entries.len(), 3);
    assert!(!result.entries.contains_key(&ProteinKey::new(0, 1)));
    assert_eq!(result.entries[&ProteinKey::new(0, 2)].entry, "R3");
    Ok(())
}

#[test]
fn test_unreadable_protein_set_only_loses_its_kmer() -> Result<()> {
    let dir = tempdir()?;
    let db_path = ranked_database(dir.path())?;
    overwrite(&db_path, CF_PROTEIN_SET, b"MKTAYIA")?;

    let result = searcher(&db_path, SearchConfig::default())?.search(&Query::protein("long", LONG_QUERY, K))?;
    let counts: Vec<u64> = result.hits.iter().map(|h| h.kmatch).collect();
    assert_eq!(counts, vec![26, 13, 13, 10]);
    Ok(())
}

#[test]
fn test_positions_are_independent_of_thread_count() -> Result<()> {
    let dir = tempdir()?;
    let db_path = ranked_database(dir.path())?;
    let query = Query::protein("long", LONG_QUERY, K);

    let mut runs = Vec::new();
    for workers in [1, 6] {
        let config = SearchConfigBuilder::new().workers(workers).extract_positions(true).build()?;
        runs.push(searcher(&db_path, config)?.search(&query)?);
    }
    assert_eq!(runs[0].hits, runs[1].hits);
    assert_eq!(runs[0].positions, runs[1].positions);

    let spans: Vec<String> = (0..4)
        .map(|id| format_positions(&runs[1].positions[&ProteinKey::new(0, id)]))
        .collect();
    assert_eq!(spans, vec!["1-27", "1-14", "1-14", "1-11"]);
    Ok(())
}

#[test]
fn test_truncated_query_record_is_skipped() -> Result<()> {
    let dir = tempdir()?;
    let db_path = ranked_database(dir.path())?;
    let config = SearchConfigBuilder::new().num_threads(2).build()?;
    let searcher = searcher(&db_path, config)?;

    let quality = "I".repeat(LONG_QUERY.len());
    let fastq = format!(
        "@q1\n{seq}\n+\n{quality}\n@broken\n{seq}\n@q3\n{seq}\n+\n{quality}\n",
        seq = LONG_QUERY,
    );
    let mut writer = ResultWriter::new(Vec::new(), OutputFormat::Json, false, false)?;
    let summary = searcher.run(text_input(&fastq)?, &mut writer, &CancellationToken::new())?;
    assert_eq!(summary.queries, 2);

    let value: serde_json::Value = serde_json::from_slice(&writer.finish()?)?;
    let mut names: Vec<&str> = value
        .as_array()
        .expect("a JSON array")
        .iter()
        .filter_map(|result| result["query"]["name"].as_str())
        .collect();
    names.sort();
    assert_eq!(names, vec!["q1", "q3"]);
    Ok(())
}
