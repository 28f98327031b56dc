use std::io::Cursor;
use std::sync::Arc;

use memmap2::Mmap;

use crate::companion::{self, CompanionFileLocator, CompanionKind, CompanionSource};
use crate::delta::inflate;
use crate::error::{CompanionError, FormatError, Result};
use crate::record::{
    MatchBlock, MatchLine, MatchLineFormat, Payload, ReadBlock, ReadLine, ReadLineFormat, RecordId,
};
use crate::sections::{FileFooter, MatchFooter, Provenance};
use crate::CancelFlag;

/// Assembles reads with their matches by identifier
///
/// A getter decodes the read line at the identifier's offset and then exactly
/// as many match lines as the read declares. Matches below `min_score` or above
/// `max_expected` are decoded and discarded. Text stored by reference is
/// resolved from the companion files, which are opened on first use.
///
/// # Examples
///
/// ```no_run
/// # use rma3::{Container, RecordId, Result};
/// # fn main() -> Result<()> {
/// let container = Container::open("sample.rma3")?;
/// let mut getter = container
///     .getter()
///     .min_score(50.0)
///     .max_expected(1e-5)
///     .with_match_text(false);
/// let read = getter.get(RecordId::new(100))?;
/// # Ok(())
/// # }
/// ```
pub struct ReadBlockGetter {
    mmap: Arc<Mmap>,
    read_format: ReadLineFormat,
    match_format: MatchLineFormat,
    matches_start: u64,
    end_matches: u64,
    min_score: f32,
    max_expected: f32,
    read_text: bool,
    match_text: bool,
    provenance: Provenance,
    locator: Arc<dyn CompanionFileLocator + Send + Sync>,
    reads_source: Option<CompanionSource>,
    alignments_source: Option<CompanionSource>,
}
impl ReadBlockGetter {
    pub(crate) fn new(
        mmap: Arc<Mmap>,
        footer: &FileFooter,
        match_footer: &MatchFooter,
        locator: Arc<dyn CompanionFileLocator + Send + Sync>,
    ) -> Self {
        Self {
            mmap,
            read_format: match_footer.read_format,
            match_format: match_footer.match_format,
            matches_start: footer.matches_start,
            end_matches: footer.end_matches,
            min_score: match_footer.min_score,
            max_expected: match_footer.max_expected,
            read_text: true,
            match_text: true,
            provenance: footer.provenance.clone(),
            locator,
            reads_source: None,
            alignments_source: None,
        }
    }

    /// Sets the minimum bit score of returned matches
    #[must_use]
    pub fn min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Sets the maximum e-value of returned matches
    #[must_use]
    pub fn max_expected(mut self, max_expected: f32) -> Self {
        self.max_expected = max_expected;
        self
    }

    /// Sets whether the read text is resolved
    #[must_use]
    pub fn with_read_text(mut self, read_text: bool) -> Self {
        self.read_text = read_text;
        self
    }

    /// Sets whether the match text is resolved
    #[must_use]
    pub fn with_match_text(mut self, match_text: bool) -> Self {
        self.match_text = match_text;
        self
    }

    /// Returns the read with the given identifier
    ///
    /// # Errors
    ///
    /// Fails with [`FormatError::OffsetOutOfBounds`] if the identifier lies
    /// outside of the matches region, and with a [`CompanionError`] if text
    /// stored by reference cannot be resolved.
    pub fn get(&mut self, uid: RecordId) -> Result<ReadBlock> {
        let offset = uid.offset();
        if offset < self.matches_start || offset >= self.end_matches {
            return Err(FormatError::OffsetOutOfBounds {
                section: "ReadLine",
                offset,
                file_len: self.mmap.len() as u64,
            }
            .into());
        }
        let (line, stored, _) = self.decode_lines(offset)?;
        self.assemble(line, stored)
    }

    /// Decodes the lines of the read at `offset` without resolving any text
    ///
    /// Returns the read line, its match lines, and the offset of the next read.
    fn decode_lines(&self, offset: u64) -> Result<(ReadLine, Vec<MatchLine>, u64)> {
        let mut cursor = Cursor::new(&self.mmap[..self.end_matches as usize]);
        cursor.set_position(offset);

        let line = self.read_format.read(&mut cursor)?;
        if line.uid.offset() != offset {
            return Err(FormatError::MalformedRecord(format!(
                "read line at offset {offset} has uid {}",
                line.uid
            ))
            .into());
        }
        let mut stored = Vec::new();
        for _ in 0..line.num_matches {
            stored.push(self.match_format.read(&mut cursor)?);
        }
        Ok((line, stored, cursor.position()))
    }

    /// Resolves the text of a decoded read and applies the match filters
    fn assemble(&mut self, line: ReadLine, stored: Vec<MatchLine>) -> Result<ReadBlock> {
        let text = if self.read_text {
            Some(self.read_text_of(&line.payload)?)
        } else {
            None
        };

        let mut matches = Vec::new();
        let mut previous: Option<String> = None;
        for stored in stored {
            let passes = stored.bit_score >= self.min_score && stored.expected <= self.max_expected;

            // Embedded text is chained: every match is compressed against its
            // predecessor, so it is inflated whether or not the match is kept
            let text = match stored.payload {
                Payload::Embedded(compressed) if self.match_text => {
                    let full = match &previous {
                        Some(previous) => inflate_str(previous, &compressed)?,
                        None => compressed,
                    };
                    previous = Some(full.clone());
                    passes.then_some(full)
                }
                Payload::Offset(sam_offset) if self.match_text && passes => Some(
                    self.companion(CompanionKind::Alignments)?
                        .line_at(sam_offset)?,
                ),
                _ => None,
            };
            if passes {
                matches.push(MatchBlock {
                    bit_score: stored.bit_score,
                    expected: stored.expected,
                    percent_identity: stored.percent_identity,
                    class_ids: stored.class_ids,
                    text,
                });
            }
        }

        Ok(ReadBlock {
            uid: line.uid,
            length: line.length,
            weight: line.weight,
            text,
            total_matches: line.num_matches as usize,
            matches,
        })
    }

    fn read_text_of(&mut self, payload: &Payload) -> Result<String> {
        match payload {
            Payload::Embedded(text) => Ok(text.clone()),
            Payload::Offset(offset) => self
                .companion(CompanionKind::Reads)?
                .fasta_record_at(*offset),
        }
    }

    /// Returns the companion of the given kind, opening it on first use
    fn companion(&mut self, kind: CompanionKind) -> Result<&CompanionSource> {
        let slot = match kind {
            CompanionKind::Reads => &mut self.reads_source,
            CompanionKind::Alignments => &mut self.alignments_source,
        };
        if slot.is_none() {
            let (recorded, size) = self
                .provenance
                .companion(kind)
                .ok_or(CompanionError::NotAssociated(kind))?;
            let path = companion::resolve(kind, recorded, size, self.locator.as_ref())?;
            *slot = Some(CompanionSource::open(kind, path)?);
        }
        slot.as_ref()
            .ok_or_else(|| CompanionError::NotAssociated(kind).into())
    }
}
impl IntoIterator for ReadBlockGetter {
    type Item = Result<ReadBlock>;
    type IntoIter = ReadBlockIterator;

    fn into_iter(self) -> Self::IntoIter {
        ReadBlockIterator::new(self)
    }
}

fn inflate_str(previous: &str, compressed: &str) -> Result<String> {
    let bytes = inflate(previous.as_bytes(), compressed.as_bytes());
    String::from_utf8(bytes).map_err(|e| e.utf8_error().into())
}

/// Iterates over all reads of the matches region in file order
///
/// A read whose companion text cannot be resolved is yielded as an error and
/// iteration continues with the next read. The iterator stops after a read
/// that cannot be decoded or a cancellation.
pub struct ReadBlockIterator {
    getter: ReadBlockGetter,
    position: u64,
    cancel: Option<CancelFlag>,
}
impl ReadBlockIterator {
    #[must_use]
    pub fn new(getter: ReadBlockGetter) -> Self {
        Self {
            position: getter.matches_start,
            getter,
            cancel: None,
        }
    }

    /// Polls `cancel` before every read
    #[must_use]
    pub fn cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Returns the offset of the next read
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }
}
impl Iterator for ReadBlockIterator {
    type Item = Result<ReadBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.getter.end_matches {
            return None;
        }
        if let Some(cancel) = &self.cancel {
            if let Err(e) = cancel.check() {
                self.position = self.getter.end_matches;
                return Some(Err(e));
            }
        }
        match self.getter.decode_lines(self.position) {
            Ok((line, stored, next)) => {
                self.position = next;
                Some(self.getter.assemble(line, stored))
            }
            Err(e) => {
                self.position = self.getter.end_matches;
                Some(Err(e))
            }
        }
    }
}

/// Iterates over a list of reads, typically the reads of one or more classes
pub struct ReadsForClassIterator {
    getter: ReadBlockGetter,
    uids: std::vec::IntoIter<RecordId>,
    cancel: Option<CancelFlag>,
}
impl ReadsForClassIterator {
    #[must_use]
    pub fn new(getter: ReadBlockGetter, uids: Vec<RecordId>) -> Self {
        Self {
            getter,
            uids: uids.into_iter(),
            cancel: None,
        }
    }

    /// Sets the getter options used for every read
    #[must_use]
    pub fn map_getter<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ReadBlockGetter) -> ReadBlockGetter,
    {
        self.getter = f(self.getter);
        self
    }

    /// Polls `cancel` before every read
    #[must_use]
    pub fn cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }
}
impl Iterator for ReadsForClassIterator {
    type Item = Result<ReadBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        let uid = self.uids.next()?;
        if let Some(cancel) = &self.cancel {
            if let Err(e) = cancel.check() {
                self.uids = Vec::new().into_iter();
                return Some(Err(e));
            }
        }
        Some(self.getter.get(uid))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.uids.size_hint()
    }
}

#[cfg(test)]
mod testing {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::classification::{ClassificationType, Classifications};
    use crate::companion::DirectoryLocator;
    use crate::container::fixtures::{sample, SAM_A1, SAM_A2, SAM_B1};
    use crate::container::{AuxData, Container, ContainerWriterBuilder};
    use crate::record::{MatchInput, ReadInput};
    use crate::Error;

    #[test]
    fn test_get_returns_full_text() -> Result<()> {
        let sample = sample()?;
        let container = Container::open(&sample.path)?;
        let mut getter = container.getter();

        let read = getter.get(sample.uids[0])?;
        assert_eq!(read.uid, sample.uids[0]);
        assert_eq!(read.length, 8);
        assert_eq!(read.weight, 1);
        assert_eq!(read.text.as_deref(), Some(">r1 first\nACGTACGT"));
        let texts: Vec<_> = read.matches.iter().map(|m| m.text.as_deref()).collect();
        assert_eq!(texts, [Some(SAM_A1), Some(SAM_A2)]);
        assert_eq!(read.matches[0].class_id(ClassificationType::Kegg), 100);
        assert_eq!(read.matches[1].class_id(ClassificationType::Kegg), 0);

        let read = getter.get(sample.uids[1])?;
        assert_eq!(read.sequence().as_deref(), Some("TTGGCC"));
        assert_eq!(read.matches[0].text.as_deref(), Some(SAM_B1));
        Ok(())
    }

    #[test]
    fn test_get_matches_iteration() -> Result<()> {
        let sample = sample()?;
        let container = Container::open(&sample.path)?;
        let mut getter = container.getter().min_score(50.0);
        for read in container.getter().min_score(50.0) {
            let read = read?;
            assert_eq!(getter.get(read.uid)?, read);
        }
        Ok(())
    }

    #[test]
    fn test_filters() -> Result<()> {
        let sample = sample()?;
        let container = Container::open(&sample.path)?;

        let read = container.getter().min_score(60.0).get(sample.uids[0])?;
        assert_eq!(read.total_matches, 2);
        assert_eq!(read.num_matches(), 1);
        assert_eq!(read.matches[0].bit_score, 80.5);
        assert_eq!(read.matches[0].text.as_deref(), Some(SAM_A1));

        let read = container.getter().min_score(60.0).get(sample.uids[1])?;
        assert_eq!(read.total_matches, 1);
        assert!(read.matches.is_empty());
        Ok(())
    }

    #[test]
    fn test_filtered_match_keeps_delta_chain() -> Result<()> {
        let sample = sample()?;
        let container = Container::open(&sample.path)?;

        // The second match is stored relative to the filtered first one
        let read = container.getter().max_expected(1e-5).get(sample.uids[0])?;
        assert_eq!(read.num_matches(), 1);
        assert_eq!(read.matches[0].bit_score, 55.0);
        assert_eq!(read.matches[0].text.as_deref(), Some(SAM_A2));
        Ok(())
    }

    #[test]
    fn test_without_text() -> Result<()> {
        let sample = sample()?;
        let container = Container::open(&sample.path)?;
        let read = container
            .getter()
            .with_read_text(false)
            .with_match_text(false)
            .get(sample.uids[0])?;
        assert!(read.text.is_none());
        assert_eq!(read.num_matches(), 2);
        assert!(read.matches.iter().all(|m| m.text.is_none()));
        Ok(())
    }

    #[test]
    fn test_uid_out_of_bounds() -> Result<()> {
        let sample = sample()?;
        let container = Container::open(&sample.path)?;
        let mut getter = container.getter();
        assert!(matches!(
            getter.get(RecordId::new(0)),
            Err(Error::FormatError(FormatError::OffsetOutOfBounds { .. }))
        ));
        let end = RecordId::new(container.footer().end_matches);
        assert!(getter.get(end).is_err());
        Ok(())
    }

    #[test]
    fn test_offset_inside_a_record() -> Result<()> {
        let sample = sample()?;
        let (a, b) = (sample.uids[0], sample.uids[1]);
        let container = Container::open(&sample.path)?;
        assert!(container.getter().get(RecordId::new(a.offset() + 1)).is_err());

        // A read line whose stored uid is not its own offset
        let mut bytes = fs::read(&sample.path)?;
        let at = b.offset() as usize;
        bytes[at..at + 8].copy_from_slice(&(a.offset() as i64).to_be_bytes());
        fs::write(&sample.path, &bytes)?;

        let container = Container::open(&sample.path)?;
        assert!(matches!(
            container.getter().get(b),
            Err(Error::FormatError(FormatError::MalformedRecord(_)))
        ));
        assert_eq!(container.getter().get(a)?.uid, a);
        Ok(())
    }

    #[test]
    fn test_iterator_cancel() -> Result<()> {
        let sample = sample()?;
        let container = Container::open(&sample.path)?;
        let cancel = CancelFlag::new();
        let mut reads = container.iter().cancel(cancel.clone());
        assert!(reads.next().transpose()?.is_some());
        cancel.cancel();
        assert!(matches!(reads.next(), Some(Err(Error::Canceled))));
        assert!(reads.next().is_none());

        let mut reads = container
            .reads_for_class(ClassificationType::Kegg, 100)?
            .cancel(cancel);
        assert_eq!(reads.size_hint(), (2, Some(2)));
        assert!(matches!(reads.next(), Some(Err(Error::Canceled))));
        assert!(reads.next().is_none());
        Ok(())
    }

    const FASTA: &str = ">r1 first\nACGT\nACGT\n>r2\nTTGG\n";
    const SAM: &str = "@HD\tVN:1.6\nr1\t0\tgi|11\t10\nr2\t0\tgi|40\t7\n";

    /// Writes a container whose text lives in companion files under `dir`
    fn write_with_companions(dir: &Path) -> Result<(std::path::PathBuf, RecordId)> {
        let fasta = dir.join("reads.fa");
        let sam = dir.join("aln.sam");
        fs::write(&fasta, FASTA)?;
        fs::write(&sam, SAM)?;

        let mut provenance = Provenance::default();
        provenance.set_companion(CompanionKind::Reads, &fasta, FASTA.len() as u64);
        provenance.set_companion(CompanionKind::Alignments, &sam, SAM.len() as u64);

        let path = dir.join("offsets.rma3");
        let mut writer = ContainerWriterBuilder::default()
            .provenance(provenance)
            .read_format(ReadLineFormat::new(false, false))
            .match_format(MatchLineFormat::new(false))
            .create(&path)?;
        let r2_fasta = FASTA.find(">r2").unwrap_or_default() as u64;
        let r2_sam = SAM.find("r2").unwrap_or_default() as u64;
        writer.push_read(
            ReadInput::new(8, Payload::Offset(0)),
            vec![MatchInput::new(30.0, 0.5, 70, Payload::Offset(11))],
        )?;
        let uid = writer.push_read(
            ReadInput::new(4, Payload::Offset(r2_fasta)),
            vec![MatchInput::new(30.0, 0.5, 70, Payload::Offset(r2_sam))],
        )?;
        writer.finish(Classifications::new(), &AuxData::new())?;
        Ok((path, uid))
    }

    #[test]
    fn test_companion_offsets() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (path, uid) = write_with_companions(dir.path())?;
        let container = Container::open(&path)?;
        let mut getter = container.getter();

        let read = getter.get(uid)?;
        assert_eq!(read.text.as_deref(), Some(">r2\nTTGG"));
        assert_eq!(read.matches[0].text.as_deref(), Some("r2\t0\tgi|40\t7"));

        let first = getter.get(RecordId::new(container.footer().matches_start))?;
        assert_eq!(first.text.as_deref(), Some(">r1 first\nACGTACGT"));
        assert_eq!(first.matches[0].text.as_deref(), Some("r1\t0\tgi|11\t10"));
        Ok(())
    }

    #[test]
    fn test_moved_companion_needs_locator() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (path, uid) = write_with_companions(dir.path())?;
        let moved = tempfile::tempdir()?;
        fs::rename(dir.path().join("aln.sam"), moved.path().join("aln.sam"))?;

        let container = Container::open(&path)?;
        let err = container.getter().get(uid).unwrap_err();
        assert!(err.needs_relocation());

        // Reads without alignment text are still served
        let read = container.getter().with_match_text(false).get(uid)?;
        assert_eq!(read.header(), Some("r2"));

        let container = container.with_locator(DirectoryLocator::new([moved.path()]));
        let read = container.getter().get(uid)?;
        assert_eq!(read.matches[0].text.as_deref(), Some("r2\t0\tgi|40\t7"));
        Ok(())
    }

    #[test]
    fn test_iteration_continues_past_missing_companion() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (path, uid) = write_with_companions(dir.path())?;
        fs::remove_file(dir.path().join("aln.sam"))?;

        let container = Container::open(&path)?;
        let results = container.iter().collect::<Vec<_>>();
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|result| result.as_ref().is_err_and(Error::needs_relocation)));

        let uids = container
            .getter()
            .with_match_text(false)
            .into_iter()
            .map(|read| read.map(|read| read.uid))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(uids.len(), 2);
        assert_eq!(uids[1], uid);
        Ok(())
    }

    #[test]
    fn test_no_companion_recorded() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bare.rma3");
        let mut writer = ContainerWriterBuilder::default()
            .match_format(MatchLineFormat::new(false))
            .create(&path)?;
        let uid = writer.push_read(
            ReadInput::embedded("r1", "ACGT"),
            vec![MatchInput::new(30.0, 0.5, 70, Payload::Offset(0))],
        )?;
        writer.finish(Classifications::new(), &AuxData::new())?;

        let container = Container::open(&path)?;
        let err = container.getter().get(uid).unwrap_err();
        assert!(matches!(
            err,
            Error::CompanionError(CompanionError::NotAssociated(CompanionKind::Alignments))
        ));
        Ok(())
    }
}
