use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use super::{write_suffix, AuxData, PositionWriter};
use crate::classification::Classifications;
use crate::delta::deflate;
use crate::error::Result;
use crate::record::{
    MatchInput, MatchLine, MatchLineFormat, Payload, ReadInput, ReadLine, ReadLineFormat, RecordId,
};
use crate::sections::{FileFooter, FileHeader, MatchFooter, Provenance};
use crate::{DEFAULT_MAX_EXPECTED, DEFAULT_MAX_MATCHES_PER_READ, DEFAULT_MIN_SCORE};

/// Configures and creates a [`ContainerWriter`]
///
/// # Examples
///
/// ```
/// # use rma3::{ContainerWriterBuilder, MatchLineFormat, ClassificationType, Result};
/// # fn main() -> Result<()> {
/// let writer = ContainerWriterBuilder::default()
///     .match_format(MatchLineFormat::new(true).with_classification(ClassificationType::Kegg))
///     .max_matches_per_read(25)
///     .build(Vec::new())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ContainerWriterBuilder {
    header: Option<FileHeader>,
    provenance: Provenance,
    read_format: ReadLineFormat,
    match_format: MatchLineFormat,
    max_matches_per_read: usize,
    min_score: f32,
    max_expected: f32,
}
impl Default for ContainerWriterBuilder {
    fn default() -> Self {
        Self {
            header: None,
            provenance: Provenance::default(),
            read_format: ReadLineFormat::default(),
            match_format: MatchLineFormat::default(),
            max_matches_per_read: DEFAULT_MAX_MATCHES_PER_READ,
            min_score: DEFAULT_MIN_SCORE,
            max_expected: DEFAULT_MAX_EXPECTED,
        }
    }
}
impl ContainerWriterBuilder {
    #[must_use]
    pub fn header(mut self, header: FileHeader) -> Self {
        self.header = Some(header);
        self
    }

    /// Sets the provenance recorded in the footer, including companion files
    #[must_use]
    pub fn provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    #[must_use]
    pub fn read_format(mut self, read_format: ReadLineFormat) -> Self {
        self.read_format = read_format;
        self
    }

    #[must_use]
    pub fn match_format(mut self, match_format: MatchLineFormat) -> Self {
        self.match_format = match_format;
        self
    }

    /// Sets the cap on matches per read; the best matches by bit score are kept
    #[must_use]
    pub fn max_matches_per_read(mut self, max_matches_per_read: usize) -> Self {
        self.max_matches_per_read = max_matches_per_read;
        self
    }

    /// Sets the minimum bit score of stored matches
    #[must_use]
    pub fn min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Sets the maximum e-value of stored matches
    #[must_use]
    pub fn max_expected(mut self, max_expected: f32) -> Self {
        self.max_expected = max_expected;
        self
    }

    /// Writes the header and returns a writer ready for reads
    ///
    /// `inner` must be positioned at the start of the file, since read
    /// identifiers are absolute offsets.
    pub fn build<W: Write>(self, inner: W) -> Result<ContainerWriter<W>> {
        let header = self.header.unwrap_or_default();
        let mut inner = PositionWriter::new(inner, 0);
        header.write_to(&mut inner)?;

        let mut provenance = self.provenance;
        if provenance.creator.is_empty() {
            provenance.creator.clone_from(&header.creator);
            provenance.creation_date = header.creation_date;
        }
        let footer = FileFooter {
            provenance,
            matches_start: inner.position(),
            ..FileFooter::default()
        };
        let match_footer = MatchFooter {
            number_of_reads: 0,
            number_of_matches: 0,
            max_matches_per_read: self.max_matches_per_read,
            read_format: self.read_format,
            match_format: self.match_format,
            min_score: self.min_score,
            max_expected: self.max_expected,
        };
        Ok(ContainerWriter {
            inner,
            footer,
            match_footer,
        })
    }

    /// Creates the file at `path` and builds a writer on it
    pub fn create<P: AsRef<Path>>(self, path: P) -> Result<ContainerWriter<BufWriter<File>>> {
        let file = File::create(path)?;
        self.build(BufWriter::new(file))
    }
}

/// Streams reads and their matches into a new container
///
/// Reads are appended with [`ContainerWriter::push_read`], which returns the
/// read's identifier. Once all reads are written, [`ContainerWriter::finish`]
/// appends the classification index, the aux entries and the footer.
pub struct ContainerWriter<W: Write> {
    inner: PositionWriter<W>,
    footer: FileFooter,
    match_footer: MatchFooter,
}
impl<W: Write> ContainerWriter<W> {
    /// Returns the offset the next read will be written at
    #[must_use]
    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    #[must_use]
    pub fn number_of_reads(&self) -> u64 {
        self.match_footer.number_of_reads
    }

    #[must_use]
    pub fn number_of_matches(&self) -> u64 {
        self.match_footer.number_of_matches
    }

    /// Appends a read followed by its matches
    ///
    /// Matches failing the score or e-value threshold are dropped. If more
    /// matches remain than the per-read cap allows, the ones with the highest bit
    /// scores are kept, in descending score order. Embedded match text is stored
    /// delta-compressed against the previous match of the read.
    ///
    /// # Returns
    ///
    /// The identifier of the read, i.e. the offset of its read line
    ///
    /// # Errors
    ///
    /// Fails with [`crate::error::FormatError::MalformedRecord`] if a payload
    /// kind does not match the read or match format. Nothing is written then.
    pub fn push_read(&mut self, read: ReadInput, mut matches: Vec<MatchInput>) -> Result<RecordId> {
        let min_score = self.match_footer.min_score;
        let max_expected = self.match_footer.max_expected;
        matches.retain(|m| m.bit_score >= min_score && m.expected <= max_expected);
        if matches.len() > self.match_footer.max_matches_per_read {
            matches.sort_by(|a, b| b.bit_score.total_cmp(&a.bit_score));
            matches.truncate(self.match_footer.max_matches_per_read);
        }

        let uid = RecordId::new(self.inner.position());
        let line = ReadLine {
            uid,
            length: read.length,
            weight: read.weight,
            num_matches: matches.len() as i32,
            payload: read.payload,
        };
        let read_format = &self.match_footer.read_format;
        let match_format = &self.match_footer.match_format;
        read_format.check_payload(&line.payload)?;

        // Every line is encoded and checked before the first byte is written
        let mut match_lines = Vec::with_capacity(matches.len());
        let mut previous: Option<String> = None;
        for input in matches {
            match_format.check_payload(&input.payload)?;
            let payload = match input.payload {
                Payload::Embedded(text) => {
                    let stored = match &previous {
                        Some(previous) => {
                            String::from_utf8(deflate(previous.as_bytes(), text.as_bytes()))
                                .map_err(|e| e.utf8_error())?
                        }
                        None => text.clone(),
                    };
                    previous = Some(text);
                    Payload::Embedded(stored)
                }
                offset @ Payload::Offset(_) => offset,
            };
            match_lines.push(MatchLine {
                bit_score: input.bit_score,
                expected: input.expected,
                percent_identity: input.percent_identity,
                class_ids: input.class_ids,
                payload,
            });
        }

        read_format.write(&mut self.inner, &line)?;
        for line in &match_lines {
            match_format.write(&mut self.inner, line)?;
        }
        self.match_footer.number_of_matches += match_lines.len() as u64;
        self.match_footer.number_of_reads += 1;
        Ok(uid)
    }

    /// Writes the remaining sections and returns the inner writer
    ///
    /// The reads of every class are sorted and deduplicated before writing.
    pub fn finish(mut self, mut classifications: Classifications, aux: &AuxData) -> Result<W> {
        self.footer.end_matches = self.inner.position();
        self.match_footer.write_to(&mut self.inner)?;
        debug!(
            reads = self.match_footer.number_of_reads,
            matches = self.match_footer.number_of_matches,
            "wrote matches region"
        );

        classifications.normalize();
        write_suffix(&mut self.inner, &mut self.footer, &classifications, aux, None)?;
        info!(
            bytes = self.inner.position(),
            reads = self.match_footer.number_of_reads,
            classifications = classifications.types().count(),
            aux_entries = aux.len(),
            "finished container"
        );
        Ok(self.inner.into_inner())
    }
}
