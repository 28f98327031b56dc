use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{
    write_aux_and_footer, write_footer, write_suffix, AuxData, Container, PositionWriter,
};
use crate::classification::Classifications;
use crate::companion::CompanionKind;
use crate::error::{Error, FormatError, Result};
use crate::sections::FileFooter;
use crate::CancelFlag;

/// Truncates the file at `offset` and returns a writer positioned there
fn truncate_at(file: &mut File, offset: u64) -> Result<PositionWriter<BufWriter<&mut File>>> {
    file.set_len(offset)?;
    file.seek(SeekFrom::Start(offset))?;
    Ok(PositionWriter::new(BufWriter::new(file), offset))
}

/// Rewrites the suffix of an existing container in place
///
/// The header and the matches region are never touched, so read identifiers
/// stay valid across modifications. Each operation truncates the file at the
/// start of the first section it replaces and writes the sections after it
/// anew, ending with the footer and its pointer. No operation truncates below
/// the end of the match footer.
///
/// A modifier assumes exclusive access to the file; no locking is performed.
/// An operation that fails after truncation (for example because it was
/// canceled) leaves the file without a footer. The modifier keeps the footer of
/// the last complete suffix, so retrying on the same modifier restores the
/// file. Until then, operations that would truncate past the point of the
/// failed one fail with [`Error::Interrupted`]; [`Modifier::update`] is always
/// possible.
pub struct Modifier {
    path: PathBuf,
    file: File,
    footer: FileFooter,
    footer_offset: u64,
    suffix_start: u64,
    /// Where a failed operation truncated the file
    truncated_at: Option<u64>,
}
impl Modifier {
    /// Opens a container for modification
    ///
    /// The container is fully validated before it is opened for writing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let (footer, footer_offset, suffix_start) = {
            let container = Container::open(path)?;
            (
                container.footer().clone(),
                container.footer_offset(),
                container.suffix_start(),
            )
        };
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            footer,
            footer_offset,
            suffix_start,
            truncated_at: None,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the footer of the last complete suffix
    #[must_use]
    pub fn footer(&self) -> &FileFooter {
        &self.footer
    }

    /// Returns whether an update failed after truncating the file
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.truncated_at.is_some()
    }

    /// Truncates the file where the section starting at `start` begins
    ///
    /// An absent section (offset 0) is rewritten from `absent`. The file counts
    /// as interrupted until the new suffix is committed.
    fn truncate(
        &mut self,
        start: u64,
        absent: u64,
    ) -> Result<PositionWriter<BufWriter<&mut File>>> {
        let start = if start == 0 { absent } else { start };
        if start < self.suffix_start {
            return Err(FormatError::UnorderedRegions(format!(
                "rewrite at {start} would overwrite the matches region ending at {}",
                self.suffix_start
            ))
            .into());
        }
        if self.truncated_at.is_some_and(|at| start > at) {
            return Err(Error::Interrupted);
        }
        self.truncated_at = Some(start);
        truncate_at(&mut self.file, start)
    }

    /// Syncs the rewritten suffix and adopts its footer
    fn commit(&mut self, footer: FileFooter) -> Result<()> {
        self.file.sync_data()?;
        self.truncated_at = None;
        self.footer_offset = footer.end_aux;
        self.footer = footer;
        Ok(())
    }

    /// Replaces the classification index and the aux section
    ///
    /// The new section holds exactly the classifications in `classifications`; a
    /// classification mapped to an empty block stays present with no classes.
    /// `cancel` is checked before the file is truncated and then polled once per
    /// class while the blocks are written.
    pub fn update(
        &mut self,
        mut classifications: Classifications,
        aux: &AuxData,
        cancel: Option<&CancelFlag>,
    ) -> Result<()> {
        if let Some(cancel) = cancel {
            cancel.check()?;
        }
        classifications.normalize();
        self.rewrite(&classifications, aux, cancel)
    }

    /// Truncates the file and writes the classification and aux sections
    pub(crate) fn rewrite(
        &mut self,
        classifications: &Classifications,
        aux: &AuxData,
        cancel: Option<&CancelFlag>,
    ) -> Result<()> {
        let mut footer = self.footer.clone();
        let mut writer = self.truncate(footer.classifications_start, self.suffix_start)?;
        let result = write_suffix(&mut writer, &mut footer, classifications, aux, cancel);
        drop(writer);
        if let Err(e) = result {
            warn!(
                path = %self.path.display(),
                error = %e,
                "update interrupted after truncation, retry it to restore the footer"
            );
            return Err(e);
        }
        self.commit(footer)?;
        info!(
            path = %self.path.display(),
            classifications = classifications.types().count(),
            aux_entries = aux.len(),
            "updated classifications"
        );
        Ok(())
    }

    /// Replaces the aux section, keeping the classification index
    pub fn update_aux(&mut self, aux: &AuxData) -> Result<()> {
        let mut footer = self.footer.clone();
        let mut writer = self.truncate(footer.aux_start, self.footer_offset)?;
        write_aux_and_footer(&mut writer, &mut footer, aux)?;
        drop(writer);
        self.commit(footer)?;
        info!(path = %self.path.display(), aux_entries = aux.len(), "updated aux section");
        Ok(())
    }

    /// Records a new location for a companion file
    ///
    /// The size of the file at `path` is recorded along with it, so the file must
    /// exist.
    pub fn relocate_companion(&mut self, kind: CompanionKind, path: &Path) -> Result<()> {
        let size = fs::metadata(path)?.len();
        let mut footer = self.footer.clone();
        footer.provenance.set_companion(kind, path, size);
        let mut writer = self.truncate(self.footer_offset, self.footer_offset)?;
        write_footer(&mut writer, &footer)?;
        drop(writer);
        self.commit(footer)?;
        info!(%kind, path = %path.display(), "relocated companion file");
        Ok(())
    }
}
