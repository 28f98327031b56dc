//! Integer lookup tables for accession/GI to class id mappings
//!
//! Importers translate the accession or GI number of every match into a class
//! id. Small mappings live in an open-addressing [`IntHashIndex`]; mappings whose
//! keys are too large to hold as a hash map are spilled to a memory-mapped,
//! fixed-stride [`MappedIntArray`] file. The [`MappingLoader`] reads a mapping
//! file and picks the representation.
//!
//! In all tables the value `0` means "absent".

mod int_map;
mod loader;
mod mapped;

use auto_impl::auto_impl;

pub use int_map::{IntHashIndex, SharedIntHashIndex};
pub use loader::{IntLookupTable, LoadStats, MappingLoader};
pub use mapped::MappedIntArray;

/// Read access to an int to int mapping
#[auto_impl(&, Box, Arc)]
pub trait IntLookup {
    /// Returns the value mapped to `key`, or 0 if there is none
    fn lookup(&self, key: i32) -> i32;
}
