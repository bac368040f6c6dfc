use std::io::Write;

use csv::{QuoteStyle, WriterBuilder};
use serde::Serialize;

use crate::config::OutputFormat;
use crate::errors::{IndexError, IndexResult};
use crate::protein::HitEntry;
use crate::query::Query;
use crate::search::QueryResult;
use crate::types::ProteinKey;

const TSV_COLUMNS: [&str; 6] = ["QueryName", "QueryKSize", "QStart", "QEnd", "KMatch", "Hit.Id"];
const ANNOTATION_COLUMNS: [&str; 8] = [
    "Hit.Reviewed",
    "Hit.ProteinName",
    "Hit.Organism",
    "Hit.EC",
    "Hit.GO",
    "Hit.Function",
    "Hit.Pathway",
    "Hit.Taxonomy",
];
const POSITIONS_COLUMN: &str = "QueryHit.Positions";

/// Collapse matched positions into 1-based inclusive spans, e.g. `1-2,4`
pub fn format_positions(positions: &[bool]) -> String {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, &matched) in positions.iter().chain(std::iter::once(&false)).enumerate() {
        match (matched, start) {
            (true, None) => start = Some(i + 1),
            (false, Some(first)) => {
                spans.push(if i > first { format!("{}-{}", first, i) } else { first.to_string() });
                start = None;
            }
            _ => {}
        }
    }
    spans.join(",")
}

/// Rebuild a position vector of length `len` from [`format_positions`] output
pub fn parse_positions(text: &str, len: usize) -> IndexResult<Vec<bool>> {
    let mut positions = vec![false; len];
    for span in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parse = |s: &str| {
            s.parse::<usize>()
                .map_err(|_| IndexError::ParseError(format!("invalid position span '{}'", span)))
        };
        let (first, last) = match span.split_once('-') {
            Some((a, b)) => (parse(a)?, parse(b)?),
            None => {
                let p = parse(span)?;
                (p, p)
            }
        };
        if first == 0 || first > last || last > len {
            return Err(IndexError::ParseError(format!(
                "position span '{}' outside 1..={}",
                span, len
            )));
        }
        positions[first - 1..last].iter_mut().for_each(|p| *p = true);
    }
    Ok(positions)
}

#[derive(Serialize)]
struct JsonHit<'a> {
    protein: ProteinKey,
    kmatch: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry: Option<&'a HitEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    positions: Option<String>,
}

#[derive(Serialize)]
struct JsonQueryResult<'a> {
    query: &'a Query,
    hits: Vec<JsonHit<'a>>,
}

enum Sink<W: Write> {
    Tsv(csv::Writer<W>),
    Json { out: W, first: bool },
}

/// Streams query results as TSV rows or as one JSON array
pub struct ResultWriter<W: Write> {
    sink: Sink<W>,
    annotations: bool,
    positions: bool,
}

impl<W: Write> ResultWriter<W> {
    /// Start the output: TSV writes its header, JSON opens the array
    pub fn new(out: W, format: OutputFormat, annotations: bool, positions: bool) -> IndexResult<Self> {
        let sink = match format {
            OutputFormat::Tsv => {
                let mut writer = WriterBuilder::new()
                    .delimiter(b'\t')
                    .has_headers(false)
                    .quote_style(QuoteStyle::Never)
                    .from_writer(out);
                let mut header: Vec<&str> = TSV_COLUMNS.to_vec();
                if annotations {
                    header.extend(ANNOTATION_COLUMNS);
                }
                if positions {
                    header.push(POSITIONS_COLUMN);
                }
                writer.write_record(&header)?;
                Sink::Tsv(writer)
            }
            OutputFormat::Json => {
                let mut out = out;
                out.write_all(b"[")?;
                Sink::Json { out, first: true }
            }
        };
        Ok(Self { sink, annotations, positions })
    }

    pub fn write(&mut self, result: &QueryResult) -> IndexResult<()> {
        match &mut self.sink {
            Sink::Tsv(writer) => {
                for hit in &result.results.hits {
                    let row = tsv_row(result, hit.protein, hit.kmatch, self.annotations, self.positions);
                    writer.write_record(&row)?;
                }
                Ok(())
            }
            Sink::Json { out, first } => {
                if !*first {
                    out.write_all(b",")?;
                }
                *first = false;
                let hits = result
                    .results
                    .hits
                    .iter()
                    .map(|hit| JsonHit {
                        protein: hit.protein,
                        kmatch: hit.kmatch,
                        entry: result.entries.get(&hit.protein),
                        positions: self
                            .positions
                            .then(|| positions_of(result, hit.protein)),
                    })
                    .collect();
                serde_json::to_writer(&mut *out, &JsonQueryResult { query: &result.query, hits })?;
                Ok(())
            }
        }
    }

    /// Close the output and hand back the underlying writer
    pub fn finish(self) -> IndexResult<W> {
        match self.sink {
            Sink::Tsv(mut writer) => {
                writer.flush()?;
                writer.into_inner().map_err(|e| IndexError::Io(e.into_error()))
            }
            Sink::Json { mut out, .. } => {
                out.write_all(b"]\n")?;
                out.flush()?;
                Ok(out)
            }
        }
    }
}

fn positions_of(result: &QueryResult, protein: ProteinKey) -> String {
    result.results.positions.get(&protein).map(|p| format_positions(p)).unwrap_or_default()
}

fn tsv_row(
    result: &QueryResult,
    protein: ProteinKey,
    kmatch: u64,
    annotations: bool,
    positions: bool,
) -> Vec<String> {
    let query = &result.query;
    let entry = result.entries.get(&protein);
    let mut row = vec![
        query.name.clone(),
        query.size_in_kmer.to_string(),
        query.location.start.to_string(),
        query.location.end.to_string(),
        kmatch.to_string(),
        entry.map(|e| e.entry.clone()).unwrap_or_default(),
    ];
    if annotations {
        match entry {
            Some(e) => row.extend([
                if e.reviewed { "reviewed" } else { "unreviewed" }.to_string(),
                e.name.clone(),
                e.organism.clone(),
                e.ec_number.clone(),
                e.go.join(";"),
                e.function.clone().unwrap_or_default(),
                e.pathway.clone().unwrap_or_default(),
                e.taxonomy.clone().unwrap_or_default(),
            ]),
            None => row.extend(std::iter::repeat(String::new()).take(ANNOTATION_COLUMNS.len())),
        }
    }
    if positions {
        row.push(positions_of(result, protein));
    }
    row
}
