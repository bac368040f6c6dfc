/// Stop symbol terminating translated peptides
pub const STOP: u8 = b'*';

/// Number of k-mer windows searched for a query sequence.
///
/// A trailing stop symbol is not part of the peptide, so the window that
/// ends on it is not counted.
pub fn kmer_count(sequence: &[u8], ksize: usize) -> usize {
    if ksize == 0 || sequence.len() < ksize {
        return 0;
    }
    let count = sequence.len() - ksize + 1;
    if sequence.last() == Some(&STOP) {
        count - 1
    } else {
        count
    }
}

/// Left-to-right k-mer windows with their 0-based start position
pub fn kmer_windows(sequence: &[u8], ksize: usize) -> impl Iterator<Item = (usize, &[u8])> + '_ {
    let count = if ksize == 0 || sequence.len() < ksize { 0 } else { sequence.len() - ksize + 1 };
    (0..count).map(move |i| (i, &sequence[i..i + ksize]))
}

/// Windows of a query, honouring the trailing stop rule of [`kmer_count`]
pub fn query_kmers(sequence: &[u8], ksize: usize) -> impl Iterator<Item = (usize, &[u8])> + '_ {
    kmer_windows(sequence, ksize).take(kmer_count(sequence, ksize))
}
