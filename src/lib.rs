//! # RMA3
//!
//! RMA3 ("Read-Match-Archive", version 3) is an indexed binary container for a
//! metagenomic sample. It stores sequencing reads, their BLAST/SAM-style matches,
//! the assignment of each read to classes of one or more classifications
//! (taxonomy, KEGG, SEED, COG, PFAM), and a trailer of auxiliary named blobs.
//!
//! ## Overview
//!
//! The container is written once by an importer and then either read or
//! reclassified. Reclassification never touches the reads: the classification
//! index is a pure function of the matches region, so the [`Modifier`] truncates
//! the file at the classification section and writes a fresh suffix.
//!
//! Reads are self-addressing: the identifier of a read ([`RecordId`]) is the byte
//! offset at which its record starts. The classification index maps each class id
//! to the list of read offsets assigned to it, which gives random access to all
//! reads of a class without scanning the file.
//!
//! ## File Structure
//!
//! Every section record is self-describing: a plain-text definition string
//! (see [`FormatDefinition`]) is followed by the values it declares.
//!
//! ```text
//! ┌──────────────────────────┐
//! │ Magic, Version, Header   │ FileHeader
//! ├──────────────────────────┤ MatchesStart
//! │ ReadLine, MatchLine*n    │
//! │ ReadLine, MatchLine*n    │ Variable size
//! │ ...                      │
//! ├──────────────────────────┤ EndMatches
//! │ MatchFooter              │
//! ├──────────────────────────┤ ClassificationsStart
//! │ ClassificationsFooter    │
//! │ Block per classification │ NumClasses, (ClassId, Count, Offset*Count)*
//! ├──────────────────────────┤ AuxStart
//! │ AuxFooter, entries       │ Count, (Name, Length, Bytes)*
//! ├──────────────────────────┤ EndAux (footer offset)
//! │ FileFooter               │ region offsets and provenance
//! ├──────────────────────────┤
//! │ Footer offset            │ 8 bytes
//! └──────────────────────────┘
//! ```
//!
//! All integers are stored big-endian.
//!
//! ## Usage
//!
//! Write a container with [`ContainerWriterBuilder`], open it with
//! [`Container`] or, for the query-side API, with [`Connector`].

mod cancel;
mod classification;
mod companion;
mod connector;
mod container;
mod delta;
pub mod error;
pub mod hash;
mod record;
mod schema;
mod sections;

pub use cancel::CancelFlag;
pub use classification::{ClassificationBlock, ClassificationType, Classifications};
pub use companion::{CompanionFileLocator, CompanionKind, DirectoryLocator, NoLocator};
pub use connector::Connector;
pub use container::{
    AuxData, Container, ContainerWriter, ContainerWriterBuilder, Modifier, ReadBlockGetter,
    ReadBlockIterator, ReadsForClassIterator,
};
pub use delta::{deflate, inflate, DELTA_MARKER};
pub use error::{Error, Result};
pub use record::{
    MatchBlock, MatchInput, MatchLine, MatchLineFormat, Payload, ReadBlock, ReadInput, ReadLine,
    ReadLineFormat, RecordId,
};
pub use schema::{read_by_schema, FieldType, FieldValues, FormatDefinition, SchemaWriter, Value};
pub use sections::{
    AuxFooter, ClassificationsFooter, FileFooter, FileHeader, MatchFooter, Provenance,
};

/// The magic number opening every RMA container
pub const MAGIC_NUMBER: i32 = i32::from_be_bytes(*b"\0RMA");

/// The container version implemented by this crate
pub const FILE_VERSION: i32 = 3;

/// Size of the trailing footer pointer in bytes
pub const SIZE_FOOTER_POINTER: u64 = 8;

/// Default cap on the number of matches stored per read
pub const DEFAULT_MAX_MATCHES_PER_READ: usize = 100;

/// Default minimum bit score when filtering matches
pub const DEFAULT_MIN_SCORE: f32 = 0.0;

/// Default maximum expected value (e-value) when filtering matches
pub const DEFAULT_MAX_EXPECTED: f32 = 10.0;

/// Maximum key for which a mapping is still held as an in-memory hash map
///
/// Mappings with larger keys are spilled to a memory-mapped array file.
pub const DEFAULT_SPILL_THRESHOLD: i32 = 50_000_000;
