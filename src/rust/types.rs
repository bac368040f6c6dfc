use serde::{Deserialize, Serialize};
use std::fmt;

/// Default k-mer length of a database
pub const DEFAULT_KSIZE: u32 = 7;

/// A type-safe wrapper for k-mer sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KmerSize(pub u32);

impl KmerSize {
    /// Create a new k-mer size with validation
    pub fn new(size: u32) -> Result<Self, String> {
        if size == 0 {
            Err("K-mer size must be greater than 0".to_string())
        } else if size > 32 {
            Err("K-mer size too large (max 32)".to_string())
        } else {
            Ok(KmerSize(size))
        }
    }

    /// Get the raw value
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Get as usize for indexing
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl Default for KmerSize {
    fn default() -> Self {
        KmerSize(DEFAULT_KSIZE)
    }
}

impl fmt::Display for KmerSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Minimum fraction of query k-mers a hit must match
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchRatio(pub f64);

impl MatchRatio {
    pub fn new(ratio: f64) -> Result<Self, String> {
        if !(0.0..=1.0).contains(&ratio) {
            Err(format!("Match ratio must be within [0, 1], got {}", ratio))
        } else {
            Ok(MatchRatio(ratio))
        }
    }

    pub fn get(&self) -> f64 {
        self.0
    }
}

impl Default for MatchRatio {
    fn default() -> Self {
        MatchRatio(0.2)
    }
}

impl fmt::Display for MatchRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of a protein in a sharded database.
///
/// Protein ids are allocated per shard, so the shard index is part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProteinKey {
    pub shard: u16,
    pub id: u32,
}

impl ProteinKey {
    pub fn new(shard: u16, id: u32) -> Self {
        Self { shard, id }
    }
}

impl fmt::Display for ProteinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.shard, self.id)
    }
}

macro_rules! content_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u128);

        impl $name {
            pub fn to_bytes(self) -> [u8; 16] {
                self.0.to_be_bytes()
            }

            pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
                let raw: [u8; 16] = bytes.try_into().ok()?;
                Some(Self(u128::from_be_bytes(raw)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:032x}", self.0)
            }
        }
    };
}

content_id!(
    /// Content-derived id of one annotation value
    ValueId
);
content_id!(
    /// Content-derived id of an annotation tuple
    CombinationId
);

/// The four deduplicated annotation fields, in tuple order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    GeneOntology,
    Function,
    Pathway,
    Organism,
}

impl FieldKind {
    pub const ALL: [FieldKind; 4] =
        [FieldKind::GeneOntology, FieldKind::Function, FieldKind::Pathway, FieldKind::Organism];

    /// Position of the field inside an annotation tuple
    pub fn slot(&self) -> usize {
        match self {
            FieldKind::GeneOntology => 0,
            FieldKind::Function => 1,
            FieldKind::Pathway => 2,
            FieldKind::Organism => 3,
        }
    }

    /// Store partition holding the values of this kind
    pub fn partition(&self) -> &'static str {
        match self {
            FieldKind::GeneOntology => "go",
            FieldKind::Function => "function",
            FieldKind::Pathway => "pathway",
            FieldKind::Organism => "organism",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.partition())
    }
}
