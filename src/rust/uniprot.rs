use crate::annotation::AnnotationText;

/// Minimum number of tab-separated columns of a usable record
pub const MIN_FIELDS: usize = 9;

/// One line of a UniProtKB tab-separated export.
///
/// Column order: entry, status, protein names, taxonomic lineage, gene
/// ontology, function, pathway, EC number, sequence. Extra trailing columns
/// are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniProtEntry<'a> {
    pub entry: &'a str,
    pub status: &'a str,
    pub protein_names: &'a str,
    pub taxonomic_lineage: &'a str,
    pub gene_ontology: &'a str,
    pub function: &'a str,
    pub pathway: &'a str,
    pub ec_number: &'a str,
    pub sequence: &'a str,
}

impl<'a> UniProtEntry<'a> {
    /// Parse a record; `None` when the line has fewer than nine columns
    pub fn from_tsv_line(line: &'a str) -> Option<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        let mut fields = line.split('\t');
        let mut next = || fields.next();
        let entry = UniProtEntry {
            entry: next()?.trim(),
            status: next()?.trim(),
            protein_names: next()?.trim(),
            taxonomic_lineage: next()?.trim(),
            gene_ontology: next()?.trim(),
            function: next()?.trim(),
            pathway: next()?.trim(),
            ec_number: next()?.trim(),
            sequence: next()?.trim(),
        };
        Some(entry)
    }

    pub fn is_reviewed(&self) -> bool {
        self.status.eq_ignore_ascii_case("reviewed")
    }

    /// Most specific lineage element, e.g. `Escherichia coli (strain K12)`
    pub fn organism(&self) -> &'a str {
        self.taxonomic_lineage.rsplit(',').next().map(str::trim).unwrap_or_default()
    }

    pub fn annotation_text(&self) -> AnnotationText<'a> {
        AnnotationText {
            gene_ontology: self.gene_ontology,
            function: self.function,
            pathway: self.pathway,
            organism: self.taxonomic_lineage,
        }
    }
}
