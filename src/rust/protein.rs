use serde::{Deserialize, Serialize};

use crate::annotation::Annotations;
use crate::types::CombinationId;
use crate::uniprot::UniProtEntry;

/// Stored metadata of one indexed protein, keyed by its shard-local id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProteinRecord {
    pub id: u32,
    pub entry: String,
    pub reviewed: bool,
    pub name: String,
    pub organism: String,
    pub ec_number: String,
    /// Annotation tuple of the protein; text lives in the annotation store
    pub combination: CombinationId,
    pub sequence: String,
}

impl ProteinRecord {
    pub fn from_entry(id: u32, entry: &UniProtEntry<'_>, combination: CombinationId) -> Self {
        Self {
            id,
            entry: entry.entry.to_string(),
            reviewed: entry.is_reviewed(),
            name: entry.protein_names.to_string(),
            organism: entry.organism().to_string(),
            ec_number: entry.ec_number.to_string(),
            combination,
            sequence: entry.sequence.to_string(),
        }
    }
}

/// A protein record materialized for output, with its annotation text resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitEntry {
    pub entry: String,
    pub reviewed: bool,
    pub name: String,
    pub organism: String,
    pub ec_number: String,
    pub go: Vec<String>,
    pub function: Option<String>,
    pub pathway: Option<String>,
    pub taxonomy: Option<String>,
    pub length: usize,
}

impl HitEntry {
    pub fn new(record: ProteinRecord, annotations: Annotations) -> Self {
        let go = annotations.go_terms();
        Self {
            entry: record.entry,
            reviewed: record.reviewed,
            name: record.name,
            organism: record.organism,
            ec_number: record.ec_number,
            go,
            function: annotations.function,
            pathway: annotations.pathway,
            taxonomy: annotations.taxonomy,
            length: record.sequence.len(),
        }
    }
}
