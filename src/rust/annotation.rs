//! Content-addressed annotation store.
//!
//! Annotation text is stored once per distinct value and referenced by a
//! hash of its content; tuples of value ids are stored once per distinct
//! tuple the same way. Identical content always maps to the same key, so
//! concurrent writers converge without coordination.

use serde::{Deserialize, Serialize};

use crate::encoding::{combination_id, decode_record, encode_record, value_id};
use crate::errors::IndexResult;
use crate::store::{ShardStore, CF_COMBINATION};
use crate::types::{CombinationId, FieldKind, ValueId};

/// One value id per field (ontology, function, pathway, organism); `None` is a blank field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationTuple {
    pub slots: [Option<ValueId>; 4],
}

impl AnnotationTuple {
    pub fn new(slots: [Option<ValueId>; 4]) -> Self {
        Self { slots }
    }

    pub fn get(&self, kind: FieldKind) -> Option<ValueId> {
        self.slots[kind.slot()]
    }

    /// Merge-on-write: fields left blank by `incoming` keep their current value.
    ///
    /// A non-blank incoming field replaces the current one. When two proteins
    /// share a k-mer and only the first one carries a field, the second one
    /// inherits it; the stored tuple is therefore an upper bound on the
    /// annotations of the k-mer, not an exact one.
    pub fn merge(&self, incoming: &AnnotationTuple) -> AnnotationTuple {
        let mut slots = self.slots;
        for (slot, new) in slots.iter_mut().zip(incoming.slots.iter()) {
            if new.is_some() {
                *slot = *new;
            }
        }
        AnnotationTuple { slots }
    }

    pub fn id(&self) -> CombinationId {
        combination_id(&self.slots)
    }
}

/// Raw annotation text of one source record, in tuple order
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotationText<'a> {
    pub gene_ontology: &'a str,
    pub function: &'a str,
    pub pathway: &'a str,
    pub organism: &'a str,
}

impl<'a> AnnotationText<'a> {
    pub fn fields(&self) -> [(FieldKind, &'a str); 4] {
        [
            (FieldKind::GeneOntology, self.gene_ontology),
            (FieldKind::Function, self.function),
            (FieldKind::Pathway, self.pathway),
            (FieldKind::Organism, self.organism),
        ]
    }
}

/// Resolved annotation text for display
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    pub gene_ontology: Option<String>,
    pub function: Option<String>,
    pub pathway: Option<String>,
    pub taxonomy: Option<String>,
}

impl Annotations {
    /// GO identifiers (`GO:0004030`) found in the ontology text
    pub fn go_terms(&self) -> Vec<String> {
        let Some(text) = &self.gene_ontology else {
            return Vec::new();
        };
        let mut terms = Vec::new();
        let mut rest = text.as_str();
        while let Some(start) = rest.find("GO:") {
            let tail = &rest[start + 3..];
            let digits = tail.chars().take_while(|c| c.is_ascii_digit()).count();
            if digits > 0 {
                terms.push(format!("GO:{}", &tail[..digits]));
            }
            rest = &tail[digits..];
        }
        terms
    }
}

/// View over the annotation partitions of one shard
pub struct AnnotationStore<'a> {
    store: &'a ShardStore,
}

impl<'a> AnnotationStore<'a> {
    pub fn new(store: &'a ShardStore) -> Self {
        Self { store }
    }

    /// Id of `text` for `kind`, persisting the value the first time it is seen.
    /// Blank text has no id.
    pub fn get_or_create(&self, text: &str, kind: FieldKind) -> IndexResult<Option<ValueId>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let id = value_id(kind, text);
        let key = id.to_bytes();
        if !self.store.contains(kind.partition(), &key)? {
            self.store.put(kind.partition(), &key, text.as_bytes())?;
        }
        Ok(Some(id))
    }

    /// Intern all four fields of a record into a tuple of value ids
    pub fn intern(&self, text: &AnnotationText<'_>) -> IndexResult<AnnotationTuple> {
        let mut tuple = AnnotationTuple::default();
        for (kind, value) in text.fields() {
            tuple.slots[kind.slot()] = self.get_or_create(value, kind)?;
        }
        Ok(tuple)
    }

    /// Id of `tuple`, persisting the tuple the first time it is seen
    pub fn get_or_create_combination(&self, tuple: &AnnotationTuple) -> IndexResult<CombinationId> {
        let id = tuple.id();
        let key = id.to_bytes();
        if !self.store.contains(CF_COMBINATION, &key)? {
            self.store.put(CF_COMBINATION, &key, &encode_record(tuple)?)?;
        }
        Ok(id)
    }

    pub fn combination(&self, id: CombinationId) -> IndexResult<Option<AnnotationTuple>> {
        let key = id.to_bytes();
        match self.store.get(CF_COMBINATION, &key)? {
            Some(bytes) => Ok(Some(decode_record(CF_COMBINATION, &key, &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn value(&self, kind: FieldKind, id: ValueId) -> IndexResult<Option<String>> {
        match self.store.get(kind.partition(), &id.to_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    /// Resolve a combination id back to annotation text
    pub fn resolve(&self, id: CombinationId) -> IndexResult<Annotations> {
        let Some(tuple) = self.combination(id)? else {
            return Ok(Annotations::default());
        };
        let lookup = |kind: FieldKind| -> IndexResult<Option<String>> {
            match tuple.get(kind) {
                Some(value) => self.value(kind, value),
                None => Ok(None),
            }
        };
        Ok(Annotations {
            gene_ontology: lookup(FieldKind::GeneOntology)?,
            function: lookup(FieldKind::Function)?,
            pathway: lookup(FieldKind::Pathway)?,
            taxonomy: lookup(FieldKind::Organism)?,
        })
    }

    /// Number of distinct stored values of one kind
    pub fn value_count(&self, kind: FieldKind) -> IndexResult<u64> {
        self.store.count(kind.partition())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ids(store: &AnnotationStore<'_>) -> IndexResult<(ValueId, ValueId, ValueId, ValueId)> {
        Ok((
            store.get_or_create("GO:1", FieldKind::GeneOntology)?.unwrap(),
            store.get_or_create("func2", FieldKind::Function)?.unwrap(),
            store.get_or_create("path1", FieldKind::Pathway)?.unwrap(),
            store.get_or_create("lineage1", FieldKind::Organism)?.unwrap(),
        ))
    }

    #[test]
    fn test_get_or_create_is_idempotent() -> IndexResult<()> {
        let dir = tempdir()?;
        let shard = ShardStore::create(dir.path().join("store_0"))?;
        let store = AnnotationStore::new(&shard);

        let first = store.get_or_create("Bacteria, Escherichia", FieldKind::Organism)?;
        let second = store.get_or_create("Bacteria, Escherichia", FieldKind::Organism)?;
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(store.value_count(FieldKind::Organism)?, 1);
        assert_eq!(
            store.value(FieldKind::Organism, first.unwrap())?.as_deref(),
            Some("Bacteria, Escherichia")
        );

        // Blank text is never stored
        assert_eq!(store.get_or_create("  ", FieldKind::Function)?, None);
        assert_eq!(store.value_count(FieldKind::Function)?, 0);
        Ok(())
    }

    #[test]
    fn test_combination_is_idempotent() -> IndexResult<()> {
        let dir = tempdir()?;
        let shard = ShardStore::create(dir.path().join("store_0"))?;
        let store = AnnotationStore::new(&shard);
        let (g, f, p, o) = ids(&store)?;

        let tuple = AnnotationTuple::new([Some(g), Some(f), Some(p), Some(o)]);
        let a = store.get_or_create_combination(&tuple)?;
        let b = store.get_or_create_combination(&tuple)?;
        assert_eq!(a, b);
        assert_eq!(shard.count(CF_COMBINATION)?, 1);
        assert_eq!(store.combination(a)?, Some(tuple));
        Ok(())
    }

    #[test]
    fn test_merge_keeps_existing_fields_on_blank() -> IndexResult<()> {
        let dir = tempdir()?;
        let shard = ShardStore::create(dir.path().join("store_0"))?;
        let store = AnnotationStore::new(&shard);
        let (g1, f2, p1, o1) = ids(&store)?;

        let existing = AnnotationTuple::new([Some(g1), None, Some(p1), Some(o1)]);
        let incoming = AnnotationTuple::new([None, Some(f2), None, None]);
        let merged = existing.merge(&incoming);
        assert_eq!(merged, AnnotationTuple::new([Some(g1), Some(f2), Some(p1), Some(o1)]));

        // A non-blank incoming value replaces the current one
        let other = store.get_or_create("path2", FieldKind::Pathway)?;
        let replaced = merged.merge(&AnnotationTuple::new([None, None, other, None]));
        assert_eq!(replaced.get(FieldKind::Pathway), other);
        assert_eq!(replaced.get(FieldKind::GeneOntology), Some(g1));
        Ok(())
    }

    #[test]
    fn test_resolve_round_trip() -> IndexResult<()> {
        let dir = tempdir()?;
        let shard = ShardStore::create(dir.path().join("store_0"))?;
        let store = AnnotationStore::new(&shard);

        let tuple = store.intern(&AnnotationText {
            gene_ontology: "aldehyde dehydrogenase activity [GO:0004030]; catabolic [GO:0009447]",
            function: "",
            pathway: "PATHWAY: putrescine degradation",
            organism: "Bacteria, Escherichia coli",
        })?;
        assert!(tuple.get(FieldKind::Function).is_none());
        let id = store.get_or_create_combination(&tuple)?;

        let resolved = store.resolve(id)?;
        assert_eq!(resolved.function, None);
        assert_eq!(resolved.taxonomy.as_deref(), Some("Bacteria, Escherichia coli"));
        assert_eq!(resolved.go_terms(), vec!["GO:0004030", "GO:0009447"]);
        Ok(())
    }
}
