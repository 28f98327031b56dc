//! Read and match records
//!
//! The matches region of a container is a sequence of read lines, each directly
//! followed by the match lines it owns:
//!
//! ```text
//! ReadLine, MatchLine * NumMatches, ReadLine, MatchLine * NumMatches, ...
//! ```
//!
//! There is no match index: matches are reached by decoding sequentially after
//! their read. Reads are addressed by their own byte offset ([`RecordId`]).
//!
//! The line codecs ([`ReadLineFormat`] and [`MatchLineFormat`]) decode the fixed
//! field layouts directly. The bytes they produce are ordinary schema records, so
//! the generic [`read_by_schema`](crate::read_by_schema) decodes them to the same
//! values.

mod block;
mod match_line;
mod read_line;

use std::fmt;

pub use block::{MatchBlock, MatchInput, ReadBlock, ReadInput};
pub use match_line::{MatchLine, MatchLineFormat};
pub use read_line::{ReadLine, ReadLineFormat};

/// Identifier of a read: the absolute byte offset at which its read line starts
///
/// Identifiers are stable for the lifetime of a container because the matches
/// region is never rewritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(u64);
impl RecordId {
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// Returns the byte offset of the read line
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.0
    }
}
impl From<u64> for RecordId {
    fn from(offset: u64) -> Self {
        Self(offset)
    }
}
impl From<RecordId> for u64 {
    fn from(uid: RecordId) -> Self {
        uid.0
    }
}
impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The text carried by a read or match line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text stored inline in the container
    Embedded(String),
    /// Offset of the text in the companion FASTA (reads) or SAM (matches) file
    Offset(u64),
}
impl Payload {
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Embedded(_))
    }

    /// Returns the inline text, if any
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Embedded(text) => Some(text),
            Self::Offset(_) => None,
        }
    }

    /// Returns the companion file offset, if any
    #[must_use]
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::Embedded(_) => None,
            Self::Offset(offset) => Some(*offset),
        }
    }
}
impl Default for Payload {
    fn default() -> Self {
        Self::Embedded(String::new())
    }
}
