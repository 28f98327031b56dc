//! Companion files
//!
//! A container may store reads and matches by reference: instead of embedding
//! text, a read line holds the offset of its record in a FASTA file and a match
//! line the offset of its line in a SAM file. The container footer records the
//! path and size of both files so that a moved or replaced file is detected
//! before any offset is dereferenced.

use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use auto_impl::auto_impl;
use memchr::memchr;
use memmap2::Mmap;
use seq_io::fasta::{self, Record};
use tracing::{debug, info};

use crate::error::{CompanionError, Result};

/// The kinds of companion files a container can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompanionKind {
    /// The FASTA file holding read headers and sequences
    Reads,
    /// The SAM file holding alignment lines
    Alignments,
}
impl fmt::Display for CompanionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reads => f.write_str("Reads"),
            Self::Alignments => f.write_str("Alignments"),
        }
    }
}

/// Finds companion files that are no longer at their recorded location
///
/// A locator is consulted only after the recorded path failed the existence or
/// size check. Returning `Ok(None)` means the file could not be found, which
/// surfaces as a [`CompanionError`] to the caller.
#[auto_impl(&, Box, Arc)]
pub trait CompanionFileLocator {
    fn locate(&self, kind: CompanionKind, recorded: &Path) -> anyhow::Result<Option<PathBuf>>;
}

/// A locator that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocator;
impl CompanionFileLocator for NoLocator {
    fn locate(&self, _kind: CompanionKind, _recorded: &Path) -> anyhow::Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// A locator that looks for a file of the recorded name in a list of directories
#[derive(Debug, Clone, Default)]
pub struct DirectoryLocator {
    dirs: Vec<PathBuf>,
}
impl DirectoryLocator {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn push<P: Into<PathBuf>>(&mut self, dir: P) {
        self.dirs.push(dir.into());
    }
}
impl CompanionFileLocator for DirectoryLocator {
    fn locate(&self, _kind: CompanionKind, recorded: &Path) -> anyhow::Result<Option<PathBuf>> {
        let Some(name) = recorded.file_name() else {
            return Ok(None);
        };
        Ok(self
            .dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file()))
    }
}

/// Checks that a companion exists and has its recorded size (0 skips the size check)
fn check(kind: CompanionKind, path: &Path, expected: u64) -> Result<()> {
    let not_found = || CompanionError::NotFound {
        kind,
        path: path.to_path_buf(),
    };
    let meta = fs::metadata(path).map_err(|_| not_found())?;
    if !meta.is_file() {
        return Err(not_found().into());
    }
    if expected > 0 && meta.len() != expected {
        return Err(CompanionError::SizeMismatch {
            kind,
            path: path.to_path_buf(),
            expected,
            actual: meta.len(),
        }
        .into());
    }
    Ok(())
}

/// Resolves the path of a companion file
///
/// The recorded path is used if it passes the existence and size checks,
/// otherwise the locator may supply a replacement that must pass the same checks.
/// If neither works the error of the recorded path is returned.
pub(crate) fn resolve(
    kind: CompanionKind,
    recorded: &Path,
    recorded_size: u64,
    locator: &dyn CompanionFileLocator,
) -> Result<PathBuf> {
    let Err(original) = check(kind, recorded, recorded_size) else {
        return Ok(recorded.to_path_buf());
    };
    debug!(%kind, path = %recorded.display(), error = %original, "companion check failed");
    match locator.locate(kind, recorded)? {
        Some(candidate) => {
            check(kind, &candidate, recorded_size)?;
            info!(
                %kind,
                from = %recorded.display(),
                to = %candidate.display(),
                "relocated companion file"
            );
            Ok(candidate)
        }
        None => Err(original),
    }
}

/// A memory-mapped companion file from which single records are fetched by offset
pub(crate) struct CompanionSource {
    kind: CompanionKind,
    path: PathBuf,
    mmap: Mmap,
}
impl CompanionSource {
    pub fn open(kind: CompanionKind, path: PathBuf) -> Result<Self> {
        let file = File::open(&path).map_err(|_| CompanionError::NotFound {
            kind,
            path: path.clone(),
        })?;

        // Safety: the companion is opened read-only and not modified while mapped
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { kind, path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tail(&self, offset: u64) -> Result<&[u8]> {
        if offset >= self.mmap.len() as u64 {
            return Err(self.missing(offset).into());
        }
        Ok(&self.mmap[offset as usize..])
    }

    fn missing(&self, offset: u64) -> CompanionError {
        CompanionError::MissingRecord {
            kind: self.kind,
            path: self.path.clone(),
            offset,
        }
    }

    /// Returns the line starting at `offset`, without its line terminator
    pub fn line_at(&self, offset: u64) -> Result<String> {
        let tail = self.tail(offset)?;
        let end = memchr(b'\n', tail).unwrap_or(tail.len());
        let line = tail[..end].strip_suffix(b"\r").unwrap_or(&tail[..end]);
        Ok(std::str::from_utf8(line)?.to_string())
    }

    /// Returns the FASTA record starting at `offset` as `>header\nsequence`
    ///
    /// Multi-line sequences are joined into a single line.
    pub fn fasta_record_at(&self, offset: u64) -> Result<String> {
        let mut reader = fasta::Reader::new(self.tail(offset)?);
        match reader.next() {
            Some(Ok(record)) => {
                let head = std::str::from_utf8(record.head())?;
                let seq = record.full_seq();
                let seq = std::str::from_utf8(&seq)?;
                Ok(format!(">{head}\n{seq}"))
            }
            Some(Err(e)) => Err(e.into()),
            None => Err(self.missing(offset).into()),
        }
    }
}
