use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;
use tracing::debug;

use super::{AuxData, ReadBlockGetter, ReadBlockIterator, ReadsForClassIterator};
use crate::classification::{self, ClassificationBlock, ClassificationType};
use crate::companion::{CompanionFileLocator, NoLocator};
use crate::error::{Error, FormatError, Result};
use crate::record::RecordId;
use crate::sections::{AuxFooter, ClassificationsFooter, FileFooter, FileHeader, MatchFooter};
use crate::SIZE_FOOTER_POINTER;

/// Size of the raw magic number and version ahead of the header record
const SIZE_PREAMBLE: u64 = 8;

/// Converts an unexpected end of input into a truncation error
fn truncated(error: Error, file_len: u64) -> Error {
    match error {
        Error::IoError(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            FormatError::Truncated(file_len).into()
        }
        e => e,
    }
}

/// A read-only, memory-mapped container
///
/// Opening validates the header, follows the footer pointer, and loads all
/// section footers. Reads are served from the shared memory map, so any number
/// of [`ReadBlockGetter`]s can be created cheaply.
///
/// # Examples
///
/// ```no_run
/// # use rma3::{ClassificationType, Container, Result};
/// # fn main() -> Result<()> {
/// let container = Container::open("sample.rma3")?;
/// for read in container.reads_for_class(ClassificationType::Taxonomy, 562)? {
///     let read = read?;
///     println!("{} has {} matches", read.uid, read.matches.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Container {
    path: PathBuf,
    mmap: Arc<Mmap>,
    header: FileHeader,
    footer: FileFooter,
    footer_offset: u64,
    /// First byte after the match footer
    suffix_start: u64,
    match_footer: MatchFooter,
    classifications_footer: ClassificationsFooter,
    aux_footer: AuxFooter,
    locator: Arc<dyn CompanionFileLocator + Send + Sync>,
}
impl Container {
    /// Opens a container
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] if the magic number or version is wrong, the
    /// file is truncated, or a stored offset points outside of the file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        // Safety: the file is opened read-only; modifications go through `Modifier`
        // which never rewrites the header or the matches region
        let mmap = unsafe { Mmap::map(&file)? };
        let file_len = mmap.len() as u64;
        if file_len < SIZE_PREAMBLE + SIZE_FOOTER_POINTER {
            return Err(FormatError::Truncated(file_len).into());
        }

        let mut cursor = Cursor::new(&mmap[..]);
        let header = FileHeader::read_from(&mut cursor).map_err(|e| truncated(e, file_len))?;
        let header_end = cursor.position();

        let pointer_pos = file_len - SIZE_FOOTER_POINTER;
        let footer_offset = BigEndian::read_i64(&mmap[pointer_pos as usize..]);
        if footer_offset < header_end as i64 || footer_offset as u64 >= pointer_pos {
            return Err(FormatError::OffsetOutOfBounds {
                section: "FileFooter",
                offset: footer_offset as u64,
                file_len,
            }
            .into());
        }
        let footer_offset = footer_offset as u64;

        cursor.set_position(footer_offset);
        let footer = FileFooter::read_from(&mut cursor).map_err(|e| truncated(e, file_len))?;
        footer.validate(footer_offset, file_len)?;

        cursor.set_position(footer.end_matches);
        let match_footer =
            MatchFooter::read_from(&mut cursor).map_err(|e| truncated(e, file_len))?;
        let suffix_start = cursor.position();
        if suffix_start > footer_offset {
            return Err(FormatError::OffsetOutOfBounds {
                section: "MatchFooter",
                offset: suffix_start,
                file_len,
            }
            .into());
        }

        let classifications_footer = if footer.classifications_start > 0 {
            cursor.set_position(footer.classifications_start);
            let section = ClassificationsFooter::read_from(&mut cursor)
                .map_err(|e| truncated(e, file_len))?;
            for ctype in section.types() {
                let start = section.start(ctype).unwrap_or_default();
                let end = section.end(ctype).unwrap_or_default();
                if start > end || end > footer_offset {
                    return Err(FormatError::OffsetOutOfBounds {
                        section: "ClassificationBlock",
                        offset: start,
                        file_len,
                    }
                    .into());
                }
            }
            section
        } else {
            ClassificationsFooter::default()
        };

        let aux_footer = if footer.aux_start > 0 {
            cursor.set_position(footer.aux_start);
            AuxFooter::read_from(&mut cursor).map_err(|e| truncated(e, file_len))?
        } else {
            AuxFooter::default()
        };

        debug!(
            path = %path.display(),
            reads = match_footer.number_of_reads,
            matches = match_footer.number_of_matches,
            classifications = classifications_footer.types().count(),
            "opened container"
        );

        Ok(Self {
            path: path.to_path_buf(),
            mmap: Arc::new(mmap),
            header,
            footer,
            footer_offset,
            suffix_start,
            match_footer,
            classifications_footer,
            aux_footer,
            locator: Arc::new(NoLocator),
        })
    }

    /// Sets the locator consulted when a companion file has moved
    #[must_use]
    pub fn with_locator<L>(mut self, locator: L) -> Self
    where
        L: CompanionFileLocator + Send + Sync + 'static,
    {
        self.locator = Arc::new(locator);
        self
    }

    pub(crate) fn set_locator(&mut self, locator: Arc<dyn CompanionFileLocator + Send + Sync>) {
        self.locator = locator;
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn file_len(&self) -> u64 {
        self.mmap.len() as u64
    }

    #[must_use]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    #[must_use]
    pub fn footer(&self) -> &FileFooter {
        &self.footer
    }

    /// Returns the offset of the file footer
    #[must_use]
    pub fn footer_offset(&self) -> u64 {
        self.footer_offset
    }

    /// Returns the offset of the first byte after the match footer
    ///
    /// Nothing before this offset is ever rewritten.
    pub(crate) fn suffix_start(&self) -> u64 {
        self.suffix_start
    }

    #[must_use]
    pub fn match_footer(&self) -> &MatchFooter {
        &self.match_footer
    }

    #[must_use]
    pub fn classifications_footer(&self) -> &ClassificationsFooter {
        &self.classifications_footer
    }

    #[must_use]
    pub fn aux_footer(&self) -> &AuxFooter {
        &self.aux_footer
    }

    #[must_use]
    pub fn number_of_reads(&self) -> u64 {
        self.match_footer.number_of_reads
    }

    #[must_use]
    pub fn number_of_matches(&self) -> u64 {
        self.match_footer.number_of_matches
    }

    /// Returns the classifications indexed by the container, in on-disk order
    pub fn classification_types(&self) -> impl Iterator<Item = ClassificationType> + '_ {
        self.classifications_footer.types()
    }

    /// Returns a cursor at the start of a classification's block, `None` if absent
    fn block_cursor(&self, ctype: ClassificationType) -> Option<Cursor<&[u8]>> {
        let start = self.classifications_footer.start(ctype)?;
        let mut cursor = Cursor::new(&self.mmap[..]);
        cursor.set_position(start);
        Some(cursor)
    }

    /// Returns the class id to read count map of a classification
    ///
    /// Absent classifications yield an empty map.
    pub fn classification_counts(&self, ctype: ClassificationType) -> Result<BTreeMap<i32, usize>> {
        match self.block_cursor(ctype) {
            Some(mut cursor) => classification::read_counts(&mut cursor),
            None => Ok(BTreeMap::new()),
        }
    }

    /// Returns the number of reads assigned to one class
    pub fn class_size(&self, ctype: ClassificationType, class_id: i32) -> Result<usize> {
        match self.block_cursor(ctype) {
            Some(mut cursor) => classification::read_count(&mut cursor, class_id),
            None => Ok(0),
        }
    }

    /// Appends the reads assigned to one class to `uids`
    ///
    /// # Returns
    ///
    /// The number of identifiers appended
    pub fn read_offsets(
        &self,
        ctype: ClassificationType,
        class_id: i32,
        uids: &mut Vec<RecordId>,
    ) -> Result<usize> {
        match self.block_cursor(ctype) {
            Some(mut cursor) => classification::read_offsets(&mut cursor, class_id, uids),
            None => Ok(0),
        }
    }

    /// Decodes the complete block of a classification
    pub fn classification_block(&self, ctype: ClassificationType) -> Result<ClassificationBlock> {
        match self.block_cursor(ctype) {
            Some(mut cursor) => ClassificationBlock::read_from(&mut cursor),
            None => Ok(ClassificationBlock::default()),
        }
    }

    /// Decodes the aux section
    pub fn aux(&self) -> Result<AuxData> {
        if self.footer.aux_start == 0 {
            return Ok(AuxData::default());
        }
        let mut cursor = Cursor::new(&self.mmap[..]);
        cursor.set_position(self.footer.aux_start);
        AuxData::read_from(&mut cursor)
    }

    /// Returns a random-access getter with the import thresholds as filters
    #[must_use]
    pub fn getter(&self) -> ReadBlockGetter {
        ReadBlockGetter::new(
            Arc::clone(&self.mmap),
            &self.footer,
            &self.match_footer,
            Arc::clone(&self.locator),
        )
    }

    /// Returns an iterator over all reads in file order
    #[must_use]
    pub fn iter(&self) -> ReadBlockIterator {
        self.getter().into_iter()
    }

    /// Returns an iterator over the reads assigned to one class
    pub fn reads_for_class(
        &self,
        ctype: ClassificationType,
        class_id: i32,
    ) -> Result<ReadsForClassIterator> {
        self.reads_for_classes(ctype, &[class_id])
    }

    /// Returns an iterator over the reads assigned to any of the classes
    ///
    /// Reads assigned to several of the classes are returned once, in file order.
    pub fn reads_for_classes(
        &self,
        ctype: ClassificationType,
        class_ids: &[i32],
    ) -> Result<ReadsForClassIterator> {
        Ok(ReadsForClassIterator::new(
            self.getter(),
            self.collect_uids(ctype, class_ids)?,
        ))
    }

    pub(crate) fn collect_uids(
        &self,
        ctype: ClassificationType,
        class_ids: &[i32],
    ) -> Result<Vec<RecordId>> {
        let mut uids = Vec::new();
        for class_id in class_ids {
            self.read_offsets(ctype, *class_id, &mut uids)?;
        }
        if class_ids.len() > 1 {
            uids.sort_unstable();
            uids.dedup();
        }
        Ok(uids)
    }
}
impl IntoIterator for &Container {
    type Item = Result<crate::ReadBlock>;
    type IntoIter = ReadBlockIterator;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod testing {
    use std::fs::{self, OpenOptions};
    use std::io::Write;

    use super::*;
    use crate::container::fixtures::sample;

    #[test]
    fn test_open_sample() -> Result<()> {
        let sample = sample()?;
        let container = Container::open(&sample.path)?;
        assert_eq!(container.path(), sample.path.as_path());
        assert_eq!(container.number_of_reads(), 2);
        assert_eq!(container.number_of_matches(), 3);
        assert_eq!(
            container.classification_types().collect::<Vec<_>>(),
            [ClassificationType::Taxonomy, ClassificationType::Kegg]
        );
        assert!(container.match_footer().uses(ClassificationType::Kegg));
        assert!(!container.match_footer().uses(ClassificationType::Seed));

        let footer = container.footer();
        assert_eq!(footer.matches_start, sample.uids[0].offset());
        assert_eq!(footer.end_aux, container.footer_offset());
        assert_eq!(
            container.file_len(),
            fs::metadata(&sample.path)?.len()
        );
        assert_eq!(container.aux()?.get("Sample"), Some(&b"gut-1"[..]));
        Ok(())
    }

    #[test]
    fn test_classification_queries() -> Result<()> {
        let sample = sample()?;
        let container = Container::open(&sample.path)?;
        let (a, b) = (sample.uids[0], sample.uids[1]);

        let counts = container.classification_counts(ClassificationType::Taxonomy)?;
        assert_eq!(counts, BTreeMap::from([(5, 1), (9, 1)]));
        assert_eq!(container.class_size(ClassificationType::Kegg, 100)?, 2);
        assert_eq!(container.class_size(ClassificationType::Taxonomy, 42)?, 0);
        assert_eq!(container.class_size(ClassificationType::Seed, 5)?, 0);

        let block = container.classification_block(ClassificationType::Kegg)?;
        assert_eq!(block.get(100), Some(&[a, b][..]));
        assert!(container
            .classification_block(ClassificationType::Pfam)?
            .is_empty());

        let mut uids = Vec::new();
        assert_eq!(
            container.read_offsets(ClassificationType::Taxonomy, 9, &mut uids)?,
            1
        );
        assert_eq!(uids, [b]);
        Ok(())
    }

    #[test]
    fn test_reads_for_class() -> Result<()> {
        let sample = sample()?;
        let container = Container::open(&sample.path)?;

        let reads = container
            .reads_for_class(ClassificationType::Taxonomy, 5)?
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].uid, sample.uids[0]);
        assert_eq!(reads[0].header(), Some("r1 first"));
        assert_eq!(reads[0].num_matches(), 2);

        let reads = container
            .reads_for_classes(ClassificationType::Taxonomy, &[9, 5, 9])?
            .map(|read| read.map(|read| read.uid))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(reads, sample.uids);

        let mut none = container.reads_for_class(ClassificationType::Taxonomy, 77)?;
        assert!(none.next().is_none());
        Ok(())
    }

    #[test]
    fn test_iterate_all_reads() -> Result<()> {
        let sample = sample()?;
        let container = Container::open(&sample.path)?;
        let uids = (&container)
            .into_iter()
            .map(|read| read.map(|read| read.uid))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(uids, sample.uids);
        Ok(())
    }

    #[test]
    fn test_wrong_magic() -> Result<()> {
        let sample = sample()?;
        let mut bytes = fs::read(&sample.path)?;
        bytes[3] = b'X';
        fs::write(&sample.path, &bytes)?;

        let result = Container::open(&sample.path);
        assert!(matches!(
            result,
            Err(Error::FormatError(FormatError::InvalidMagicNumber(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_wrong_version() -> Result<()> {
        let sample = sample()?;
        let mut bytes = fs::read(&sample.path)?;
        bytes[7] = 2;
        fs::write(&sample.path, &bytes)?;

        let result = Container::open(&sample.path);
        assert!(matches!(
            result,
            Err(Error::FormatError(FormatError::InvalidFormatVersion(2)))
        ));
        Ok(())
    }

    #[test]
    fn test_truncated() -> Result<()> {
        let sample = sample()?;
        let file = OpenOptions::new().write(true).open(&sample.path)?;
        file.set_len(10)?;
        drop(file);
        let result = Container::open(&sample.path);
        assert!(matches!(
            result,
            Err(Error::FormatError(FormatError::Truncated(10)))
        ));
        Ok(())
    }

    #[test]
    fn test_footer_pointer_out_of_bounds() -> Result<()> {
        let sample = sample()?;
        let mut file = OpenOptions::new().append(true).open(&sample.path)?;
        file.write_all(&i64::MAX.to_be_bytes())?;
        drop(file);
        let result = Container::open(&sample.path);
        assert!(matches!(
            result,
            Err(Error::FormatError(FormatError::OffsetOutOfBounds {
                section: "FileFooter",
                ..
            }))
        ));
        Ok(())
    }

    #[test]
    fn test_footer_pointer_into_matches() -> Result<()> {
        let sample = sample()?;
        let mut file = OpenOptions::new().append(true).open(&sample.path)?;
        file.write_all(&(sample.uids[1].offset() as i64).to_be_bytes())?;
        drop(file);

        // The read line starts with zero bytes that decode as an empty footer
        let result = Container::open(&sample.path);
        assert!(matches!(
            result,
            Err(Error::SchemaError(crate::error::SchemaError::MissingField(_)))
        ));
        Ok(())
    }
}
