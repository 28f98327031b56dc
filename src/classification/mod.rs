//! Classification index
//!
//! For every classification present in a container the index stores, per class
//! id, the number of reads assigned to the class and the offsets of those reads.
//! There is no secondary index by class id: lookups scan the blocks of one
//! classification, skipping the offset payloads of non-matching classes.

mod block;

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub(crate) use block::{read_count, read_counts, read_offsets};
pub use block::ClassificationBlock;

/// The classifications a container can index, in their on-disk order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClassificationType {
    Taxonomy,
    Kegg,
    Seed,
    Cog,
    Pfam,
}
impl ClassificationType {
    /// All classifications in their on-disk order
    pub const ALL: [Self; 5] = [Self::Taxonomy, Self::Kegg, Self::Seed, Self::Cog, Self::Pfam];

    /// The optional classifications, which may be switched off at import
    pub const OPTIONAL: [Self; 4] = [Self::Kegg, Self::Seed, Self::Cog, Self::Pfam];

    /// Returns the canonical name of the classification
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Taxonomy => "Taxonomy",
            Self::Kegg => "KEGG",
            Self::Seed => "SEED",
            Self::Cog => "COG",
            Self::Pfam => "PFAM",
        }
    }

    /// Returns the position of the classification in [`ClassificationType::ALL`]
    pub(crate) fn index(&self) -> usize {
        *self as usize
    }

    /// Returns the prefix used for this classification's section-record fields
    pub(crate) fn field_prefix(&self) -> &'static str {
        match self {
            Self::Taxonomy => "Taxonomy",
            Self::Kegg => "Kegg",
            Self::Seed => "Seed",
            Self::Cog => "Cog",
            Self::Pfam => "Pfam",
        }
    }
}
impl fmt::Display for ClassificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
impl FromStr for ClassificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("'{s}' is not a valid classification"))
    }
}

/// Per-classification class assignments handed to the write path
///
/// Maps each classification to the class id to read identifiers assignment
/// produced by a (re)classification run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classifications {
    blocks: BTreeMap<ClassificationType, ClassificationBlock>,
}
impl Classifications {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block of a classification, replacing any previous one
    pub fn insert(&mut self, ctype: ClassificationType, block: ClassificationBlock) {
        self.blocks.insert(ctype, block);
    }

    /// Returns the block of a classification, creating an empty one if needed
    pub fn entry(&mut self, ctype: ClassificationType) -> &mut ClassificationBlock {
        self.blocks.entry(ctype).or_default()
    }

    #[must_use]
    pub fn get(&self, ctype: ClassificationType) -> Option<&ClassificationBlock> {
        self.blocks.get(&ctype)
    }

    #[must_use]
    pub fn contains(&self, ctype: ClassificationType) -> bool {
        self.blocks.contains_key(&ctype)
    }

    /// Returns the classifications present, in on-disk order
    pub fn types(&self) -> impl Iterator<Item = ClassificationType> + '_ {
        self.blocks.keys().copied()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ClassificationType, ClassificationBlock> {
        self.blocks.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Sorts and deduplicates the reads of every class of every block
    pub fn normalize(&mut self) {
        for block in self.blocks.values_mut() {
            block.normalize();
        }
    }
}
impl FromIterator<(ClassificationType, ClassificationBlock)> for Classifications {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = (ClassificationType, ClassificationBlock)>,
    {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}
