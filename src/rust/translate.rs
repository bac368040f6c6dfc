//! Six-frame translation of nucleotide sequences with the bacterial,
//! archaeal and plant plastid code (NCBI translation table 11).

use crate::kmer::{kmer_count, STOP};
use crate::query::{Location, Query, QueryKind, SequenceRecord};

/// Amino acids of table 11, codons enumerated in TCAG order
const TABLE_11: &[u8; 64] = b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

/// Residue of codons containing an ambiguous base
pub const UNKNOWN: u8 = b'X';

fn base_index(base: u8) -> Option<usize> {
    match base.to_ascii_uppercase() {
        b'T' | b'U' => Some(0),
        b'C' => Some(1),
        b'A' => Some(2),
        b'G' => Some(3),
        _ => None,
    }
}

pub fn translate_codon(codon: &[u8]) -> u8 {
    match codon {
        [a, b, c] => match (base_index(*a), base_index(*b), base_index(*c)) {
            (Some(a), Some(b), Some(c)) => TABLE_11[a * 16 + b * 4 + c],
            _ => UNKNOWN,
        },
        _ => UNKNOWN,
    }
}

pub fn reverse_complement(sequence: &[u8]) -> Vec<u8> {
    sequence
        .iter()
        .rev()
        .map(|base| match base.to_ascii_uppercase() {
            b'A' => b'T',
            b'T' | b'U' => b'A',
            b'C' => b'G',
            b'G' => b'C',
            _ => b'N',
        })
        .collect()
}

/// One translated open stretch of a reading frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peptide {
    pub sequence: String,
    pub location: Location,
}

/// Translate the three frames of both strands, cutting each frame after
/// every stop codon. A peptide keeps its terminating `*`.
pub fn six_frame_peptides(sequence: &[u8]) -> Vec<Peptide> {
    let len = sequence.len();
    let reverse = reverse_complement(sequence);
    let mut peptides = Vec::new();

    for (strand, plus_strand) in [(sequence, true), (reverse.as_slice(), false)] {
        for frame in 0..3usize {
            // Codon index of the first residue of the current peptide
            let mut first = 0usize;
            let mut residues = Vec::new();
            let codons = strand.get(frame..).unwrap_or_default().chunks_exact(3);
            for (i, codon) in codons.enumerate() {
                let residue = translate_codon(codon);
                residues.push(residue);
                if residue == STOP {
                    peptides.push(peptide(&residues, first, i, frame, plus_strand, len));
                    residues.clear();
                    first = i + 1;
                }
            }
            if !residues.is_empty() {
                let last = first + residues.len() - 1;
                peptides.push(peptide(&residues, first, last, frame, plus_strand, len));
            }
        }
    }
    peptides
}

fn peptide(
    residues: &[u8],
    first: usize,
    last: usize,
    frame: usize,
    plus_strand: bool,
    len: usize,
) -> Peptide {
    // Half-open range on the translated strand
    let from = frame + 3 * first;
    let to = frame + 3 * last + 3;
    let (start, end) = if plus_strand { (from + 1, to) } else { (len - to + 1, len - from) };
    Peptide {
        sequence: String::from_utf8_lossy(residues).into_owned(),
        location: Location { start, end, plus_strand, frame: frame as u8 + 1 },
    }
}

/// Candidate protein queries of a nucleotide record
pub fn nucleotide_queries(record: &SequenceRecord, ksize: usize) -> Vec<Query> {
    six_frame_peptides(record.sequence.as_bytes())
        .into_iter()
        .filter_map(|peptide| {
            let size_in_kmer = kmer_count(peptide.sequence.as_bytes(), ksize);
            if size_in_kmer == 0 {
                return None;
            }
            let location = peptide.location;
            Some(Query {
                name: format!(
                    "{}_{}{}_{}-{}",
                    record.name,
                    if location.plus_strand { '+' } else { '-' },
                    location.frame,
                    location.start,
                    location.end
                ),
                sequence: peptide.sequence,
                size_in_kmer,
                kind: QueryKind::Dna,
                location,
                contig: Some(record.name.clone()),
            })
        })
        .collect()
}
