use std::io::BufRead;

use crossbeam_channel::Sender;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SequenceType;
use crate::errors::{IndexError, IndexResult};
use crate::io::TextLines;
use crate::kmer::{kmer_count, query_kmers};
use crate::search::CancellationToken;
use crate::translate::nucleotide_queries;

/// Position of a query on its source sequence, 1-based and inclusive.
///
/// Nucleotide candidates are located on the forward strand of the input
/// record whatever strand they were translated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub start: usize,
    pub end: usize,
    pub plus_strand: bool,
    /// Reading frame 1 to 3; 0 for protein input
    pub frame: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Protein,
    Dna,
}

/// One unit of search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    pub name: String,
    pub sequence: String,
    /// Number of k-mer windows searched
    pub size_in_kmer: usize,
    pub kind: QueryKind,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contig: Option<String>,
}

impl Query {
    pub fn protein(name: impl Into<String>, sequence: impl Into<String>, ksize: usize) -> Self {
        let sequence = sequence.into();
        Self {
            name: name.into(),
            size_in_kmer: kmer_count(sequence.as_bytes(), ksize),
            location: Location { start: 1, end: sequence.len(), plus_strand: true, frame: 0 },
            kind: QueryKind::Protein,
            sequence,
            contig: None,
        }
    }

    pub fn kmers(&self, ksize: usize) -> impl Iterator<Item = (usize, &[u8])> + '_ {
        query_kmers(self.sequence.as_bytes(), ksize)
    }
}

/// A named sequence read from FASTA or FASTQ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub name: String,
    pub sequence: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordFormat {
    Fasta,
    Fastq,
}

/// Iterator over the records of a FASTA or FASTQ stream.
///
/// The format is chosen from the first non-empty line: `@` starts FASTQ,
/// anything else is read as FASTA. A malformed record yields a
/// `ParseError`, after which reading resumes at the next record header.
pub struct SequenceRecords<R> {
    lines: TextLines<R>,
    pending: Option<String>,
    format: Option<RecordFormat>,
    resync: bool,
}

impl<R: BufRead> SequenceRecords<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: TextLines::new(reader), pending: None, format: None, resync: false }
    }

    fn next_line(&mut self) -> Option<IndexResult<String>> {
        if let Some(line) = self.pending.take() {
            return Some(Ok(line));
        }
        self.lines.next().map(|line| match line {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(e)) => Err(IndexError::ParseError(format!(
                "query line is not UTF-8: {}",
                e.utf8_error()
            ))),
            Err(e) => Err(IndexError::from(e)),
        })
    }

    fn is_header(&self, line: &str) -> bool {
        match self.format {
            Some(RecordFormat::Fasta) => line.starts_with('>'),
            Some(RecordFormat::Fastq) => line.starts_with('@'),
            None => line.starts_with('>') || line.starts_with('@'),
        }
    }

    fn next_non_empty(&mut self) -> Option<IndexResult<String>> {
        loop {
            match self.next_line()? {
                Ok(line) if line.trim().is_empty() => continue,
                other => return Some(other),
            }
        }
    }

    fn next_fasta(&mut self, header: String) -> IndexResult<SequenceRecord> {
        let name = header[1..].trim().to_string();
        let mut sequence = String::new();
        while let Some(line) = self.next_line() {
            let line = line?;
            if line.starts_with('>') {
                self.pending = Some(line);
                break;
            }
            sequence.extend(line.chars().filter(|c| !c.is_whitespace()).map(|c| c.to_ascii_uppercase()));
        }
        Ok(SequenceRecord { name, sequence })
    }

    fn next_fastq(&mut self, header: String) -> IndexResult<SequenceRecord> {
        let name = header[1..].trim().to_string();
        let truncated = || IndexError::ParseError(format!("truncated FASTQ record '{}'", name));
        let sequence = self.next_line().ok_or_else(truncated)??;
        let separator = self.next_line().ok_or_else(truncated)??;
        if separator.starts_with('@') {
            self.pending = Some(separator);
            return Err(truncated());
        }
        if !separator.starts_with('+') {
            return Err(IndexError::ParseError(format!(
                "expected '+' separator in FASTQ record '{}'",
                name
            )));
        }
        let quality = self.next_line().ok_or_else(truncated)??;
        let sequence = sequence.trim();
        if quality.trim_end().len() != sequence.len() {
            if quality.starts_with('@') {
                self.pending = Some(quality);
            }
            return Err(IndexError::ParseError(format!(
                "quality length differs from sequence length in FASTQ record '{}'",
                name
            )));
        }
        Ok(SequenceRecord { name, sequence: sequence.to_ascii_uppercase() })
    }
}

impl<R: BufRead> Iterator for SequenceRecords<R> {
    type Item = IndexResult<SequenceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let header = match self.next_non_empty()? {
                Ok(line) => line,
                Err(e) => {
                    self.resync = true;
                    return Some(Err(e));
                }
            };
            if self.resync {
                if !self.is_header(&header) {
                    continue;
                }
                self.resync = false;
            }
            let format = *self.format.get_or_insert(if header.starts_with('@') {
                RecordFormat::Fastq
            } else {
                RecordFormat::Fasta
            });
            let record = match format {
                RecordFormat::Fasta if header.starts_with('>') => self.next_fasta(header),
                RecordFormat::Fastq if header.starts_with('@') => self.next_fastq(header),
                RecordFormat::Fasta => {
                    warn!(line = %header, "ignoring sequence data outside of a FASTA record");
                    continue;
                }
                RecordFormat::Fastq => {
                    Err(IndexError::ParseError(format!("expected '@' header, found '{}'", header)))
                }
            };
            self.resync = record.is_err();
            return Some(record);
        }
    }
}

/// Queries of one input record. Records without any k-mer window yield nothing.
pub fn record_queries(
    record: &SequenceRecord,
    sequence_type: SequenceType,
    ksize: usize,
) -> Vec<Query> {
    match sequence_type {
        SequenceType::Protein => {
            let query = Query::protein(record.name.clone(), record.sequence.clone(), ksize);
            if query.size_in_kmer == 0 {
                debug!(query = %record.name, "skipping query shorter than k");
                return Vec::new();
            }
            vec![query]
        }
        SequenceType::Nucleotide | SequenceType::Reads => nucleotide_queries(record, ksize),
    }
}

/// Parse `reader` and feed its queries to `queries` until the input ends,
/// the token is cancelled or every receiver is gone. Malformed records are
/// logged and skipped. Returns the number of queries sent.
pub fn read_queries<R: BufRead>(
    reader: R,
    sequence_type: SequenceType,
    ksize: usize,
    queries: &Sender<Query>,
    cancel: &CancellationToken,
) -> IndexResult<u64> {
    let mut sent = 0;
    for record in SequenceRecords::new(reader) {
        if cancel.is_cancelled() {
            break;
        }
        let record = match record {
            Ok(record) => record,
            Err(e @ IndexError::ParseError(_)) => {
                warn!(error = %e, "skipping malformed query record");
                continue;
            }
            Err(e) => return Err(e),
        };
        for query in record_queries(&record, sequence_type, ksize) {
            if queries.send(query).is_err() {
                return Ok(sent);
            }
            sent += 1;
        }
    }
    Ok(sent)
}
