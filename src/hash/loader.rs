use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{IntHashIndex, IntLookup, MappedIntArray, SharedIntHashIndex};
use crate::error::{IndexError, Result};
use crate::{CancelFlag, DEFAULT_SPILL_THRESHOLD};

/// A loaded accession/GI to class id table
pub enum IntLookupTable {
    /// Held in memory behind a lock
    InMemory(SharedIntHashIndex),
    /// Spilled to a memory-mapped array file
    Mapped(MappedIntArray),
}
impl IntLookupTable {
    /// Returns whether the table was spilled to disk
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }
}
impl IntLookup for IntLookupTable {
    fn lookup(&self, key: i32) -> i32 {
        match self {
            Self::InMemory(map) => map.lookup(key),
            Self::Mapped(array) => array.lookup(key),
        }
    }
}

/// Summary of a mapping load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Non-empty, non-comment lines seen
    pub lines: usize,
    /// Lines that produced an entry
    pub parsed: usize,
    /// Malformed lines that were skipped
    pub skipped: usize,
}

/// Loads `key<whitespace>value` mapping files into an [`IntLookupTable`]
///
/// Empty lines and lines starting with `#` are ignored. Lines that do not start
/// with two integers, or that map to 0, are skipped and counted; the load fails
/// if more lines were skipped than parsed. Compressed inputs (gzip, bzip2, xz,
/// zstd) are decompressed transparently.
///
/// # Examples
///
/// ```
/// # use rma3::hash::{IntLookup, MappingLoader};
/// # fn main() -> rma3::Result<()> {
/// let input = "# gi\ttaxid\n1234\t562\n5678\t9606\n";
/// let (table, stats) = MappingLoader::default().load_from_reader(input.as_bytes())?;
/// assert_eq!(table.lookup(1234), 562);
/// assert_eq!(stats.parsed, 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MappingLoader {
    /// Keys above this value trigger a spill to an array file
    spill_threshold: Option<i32>,
    /// Where to write the array file when spilling
    spill_path: Option<PathBuf>,
    /// Cancellation flag polled once per line
    cancel: Option<CancelFlag>,
}
impl MappingLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn spill_threshold(mut self, threshold: i32) -> Self {
        self.spill_threshold = Some(threshold);
        self
    }

    /// Sets the array file used when the keys exceed the spill threshold
    ///
    /// Without a spill path the table is always kept in memory.
    #[must_use]
    pub fn spill_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.spill_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Loads a mapping file, decompressing it if needed
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<(IntLookupTable, LoadStats)> {
        let path = path.as_ref();
        let (reader, format) = niffler::from_path(path)?;
        debug!(path = %path.display(), ?format, "loading mapping");
        self.load_from_reader(BufReader::new(reader))
    }

    /// Loads a mapping from any buffered reader
    ///
    /// Entries are collected into an [`IntHashIndex`] as the lines are read, so
    /// a later line for the same key replaces the earlier one. When the table is
    /// spilled, the array file is filled from that index, which is dropped
    /// afterwards; peak memory is one index over the distinct keys.
    pub fn load_from_reader<R: BufRead>(&self, reader: R) -> Result<(IntLookupTable, LoadStats)> {
        let mut stats = LoadStats::default();
        let mut map = IntHashIndex::new();
        let mut max_key = 0;

        for line in reader.lines() {
            if let Some(cancel) = &self.cancel {
                cancel.check()?;
            }
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            stats.lines += 1;
            match parse_line(line) {
                Some((key, value)) => {
                    max_key = max_key.max(key);
                    map.put(key, value);
                    stats.parsed += 1;
                }
                None => stats.skipped += 1,
            }
        }

        if stats.skipped > stats.parsed {
            return Err(IndexError::CorruptedMapping {
                skipped: stats.skipped,
                parsed: stats.parsed,
            }
            .into());
        }
        if stats.skipped > 0 {
            warn!(skipped = stats.skipped, "skipped malformed mapping lines");
        }

        let threshold = self.spill_threshold.unwrap_or(DEFAULT_SPILL_THRESHOLD);
        let table = match &self.spill_path {
            Some(spill_path) if max_key > threshold => {
                let len = max_key as u64 + 1;
                IntLookupTable::Mapped(MappedIntArray::build(spill_path, len, map.iter())?)
            }
            _ => IntLookupTable::InMemory(SharedIntHashIndex::new(map)),
        };
        info!(
            parsed = stats.parsed,
            skipped = stats.skipped,
            mapped = table.is_mapped(),
            "loaded mapping"
        );
        Ok((table, stats))
    }
}

/// Parses the first two whitespace-separated integers of a line
///
/// Keys must be positive and values non-zero.
fn parse_line(line: &str) -> Option<(i32, i32)> {
    let mut tokens = line.split_whitespace();
    let key = tokens.next()?.parse::<i32>().ok()?;
    let value = tokens.next()?.parse::<i32>().ok()?;
    (key > 0 && value != 0).then_some((key, value))
}
