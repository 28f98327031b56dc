use std::io::{Read, Write};
use std::path::Path;

use super::{get_string, get_u64, read_section, require_u64, write_section};
use crate::companion::CompanionKind;
use crate::error::{FormatError, Result};
use crate::schema::{FieldType, FormatDefinition};

const CREATOR: &str = "Creator";
const CREATION_DATE: &str = "CreationDate";
const ALIGNMENTS_FILE: &str = "AlignmentsFile";
const ALIGNMENT_FILE_FORMAT: &str = "AlignmentFileFormat";
const ALIGNMENT_FILE_SIZE: &str = "AlignmentFileSize";
const READS_FILE: &str = "ReadsFile";
const READS_FILE_FORMAT: &str = "ReadsFileFormat";
const READS_FILE_SIZE: &str = "ReadsFileSize";
const BLAST_MODE: &str = "BlastMode";
const MATCHES_START: &str = "MatchesStart";
const END_MATCHES: &str = "EndMatches";
const CLASSIFICATIONS_START: &str = "ClassificationsStart";
const END_CLASSIFICATIONS: &str = "EndClassifications";
const AUX_START: &str = "AuxStart";
const END_AUX: &str = "EndAux";

/// Where the data of a container came from
///
/// The companion entries (path and size of the alignments and reads files) are
/// what allows moved companion files to be detected and relocated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub creator: String,
    /// Creation time in milliseconds since the Unix epoch
    pub creation_date: i64,
    pub alignments_file: String,
    pub alignment_file_format: String,
    pub alignment_file_size: u64,
    pub reads_file: String,
    pub reads_file_format: String,
    pub reads_file_size: u64,
    /// The BLAST program that produced the matches, e.g. `BlastN` or `BlastX`
    pub blast_mode: String,
}
impl Provenance {
    /// Returns the recorded path and size of a companion, `None` if not recorded
    #[must_use]
    pub fn companion(&self, kind: CompanionKind) -> Option<(&Path, u64)> {
        let (path, size) = match kind {
            CompanionKind::Reads => (&self.reads_file, self.reads_file_size),
            CompanionKind::Alignments => (&self.alignments_file, self.alignment_file_size),
        };
        (!path.is_empty()).then(|| (Path::new(path.as_str()), size))
    }

    /// Records the path and size of a companion
    pub fn set_companion(&mut self, kind: CompanionKind, path: &Path, size: u64) {
        let path = path.to_string_lossy().into_owned();
        match kind {
            CompanionKind::Reads => {
                self.reads_file = path;
                self.reads_file_size = size;
            }
            CompanionKind::Alignments => {
                self.alignments_file = path;
                self.alignment_file_size = size;
            }
        }
    }
}

/// The footer of a container: provenance and the offsets of all regions
///
/// The footer is found through the 8-byte pointer at the end of the file. An
/// offset of 0 marks the corresponding section as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFooter {
    pub provenance: Provenance,
    /// Start of the first read line
    pub matches_start: u64,
    /// End of the last match line and start of the match footer
    pub end_matches: u64,
    /// Start of the classifications footer
    pub classifications_start: u64,
    /// End of the last classification block
    pub end_classifications: u64,
    /// Start of the aux footer
    pub aux_start: u64,
    /// End of the aux entries, equal to the offset of this footer
    pub end_aux: u64,
}
impl FileFooter {
    fn definition() -> FormatDefinition {
        FormatDefinition::new()
            .with(CREATOR, FieldType::String)
            .with(CREATION_DATE, FieldType::Long)
            .with(ALIGNMENTS_FILE, FieldType::String)
            .with(ALIGNMENT_FILE_FORMAT, FieldType::String)
            .with(ALIGNMENT_FILE_SIZE, FieldType::Long)
            .with(READS_FILE, FieldType::String)
            .with(READS_FILE_FORMAT, FieldType::String)
            .with(READS_FILE_SIZE, FieldType::Long)
            .with(BLAST_MODE, FieldType::String)
            .with(MATCHES_START, FieldType::Long)
            .with(END_MATCHES, FieldType::Long)
            .with(CLASSIFICATIONS_START, FieldType::Long)
            .with(END_CLASSIFICATIONS, FieldType::Long)
            .with(AUX_START, FieldType::Long)
            .with(END_AUX, FieldType::Long)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let p = &self.provenance;
        write_section(writer, &Self::definition(), |w| {
            w.write(CREATOR, p.creator.as_str())?;
            w.write(CREATION_DATE, p.creation_date)?;
            w.write(ALIGNMENTS_FILE, p.alignments_file.as_str())?;
            w.write(ALIGNMENT_FILE_FORMAT, p.alignment_file_format.as_str())?;
            w.write(ALIGNMENT_FILE_SIZE, p.alignment_file_size)?;
            w.write(READS_FILE, p.reads_file.as_str())?;
            w.write(READS_FILE_FORMAT, p.reads_file_format.as_str())?;
            w.write(READS_FILE_SIZE, p.reads_file_size)?;
            w.write(BLAST_MODE, p.blast_mode.as_str())?;
            w.write(MATCHES_START, self.matches_start)?;
            w.write(END_MATCHES, self.end_matches)?;
            w.write(CLASSIFICATIONS_START, self.classifications_start)?;
            w.write(END_CLASSIFICATIONS, self.end_classifications)?;
            w.write(AUX_START, self.aux_start)?;
            w.write(END_AUX, self.end_aux)
        })
    }

    /// Reads a footer
    ///
    /// The matches and aux boundaries are required; the other offsets default to 0.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let values = read_section(reader)?;
        let provenance = Provenance {
            creator: get_string(&values, CREATOR),
            creation_date: values.get_long(CREATION_DATE).unwrap_or_default(),
            alignments_file: get_string(&values, ALIGNMENTS_FILE),
            alignment_file_format: get_string(&values, ALIGNMENT_FILE_FORMAT),
            alignment_file_size: get_u64(&values, ALIGNMENT_FILE_SIZE),
            reads_file: get_string(&values, READS_FILE),
            reads_file_format: get_string(&values, READS_FILE_FORMAT),
            reads_file_size: get_u64(&values, READS_FILE_SIZE),
            blast_mode: get_string(&values, BLAST_MODE),
        };
        Ok(Self {
            provenance,
            matches_start: require_u64(&values, MATCHES_START)?,
            end_matches: require_u64(&values, END_MATCHES)?,
            classifications_start: get_u64(&values, CLASSIFICATIONS_START),
            end_classifications: get_u64(&values, END_CLASSIFICATIONS),
            aux_start: get_u64(&values, AUX_START),
            end_aux: require_u64(&values, END_AUX)?,
        })
    }

    /// Checks the region offsets against each other and against the file
    ///
    /// Absent sections (offset 0) are skipped; present ones must lie within the
    /// file and appear in region order ahead of the footer. The matches region
    /// is never absent and the aux region must end exactly at the footer.
    pub fn validate(&self, footer_offset: u64, file_len: u64) -> Result<()> {
        let regions = [
            (MATCHES_START, self.matches_start),
            (END_MATCHES, self.end_matches),
            (CLASSIFICATIONS_START, self.classifications_start),
            (END_CLASSIFICATIONS, self.end_classifications),
            (AUX_START, self.aux_start),
            (END_AUX, self.end_aux),
        ];
        let mut previous: Option<(&str, u64)> = None;
        for (section, offset) in regions {
            if offset == 0 {
                continue;
            }
            if offset > footer_offset {
                return Err(FormatError::OffsetOutOfBounds {
                    section,
                    offset,
                    file_len,
                }
                .into());
            }
            if let Some((prev_section, prev_offset)) = previous {
                if offset < prev_offset {
                    return Err(FormatError::UnorderedRegions(format!(
                        "{section} ({offset}) precedes {prev_section} ({prev_offset})"
                    ))
                    .into());
                }
            }
            previous = Some((section, offset));
        }
        if self.matches_start > 0
            && self.classifications_start > 0
            && self.matches_start >= self.classifications_start
        {
            return Err(FormatError::UnorderedRegions(format!(
                "{MATCHES_START} ({}) must precede {CLASSIFICATIONS_START} ({})",
                self.matches_start, self.classifications_start
            ))
            .into());
        }
        if self.matches_start == 0 {
            return Err(FormatError::MissingRegion(MATCHES_START).into());
        }
        if self.end_matches == 0 {
            return Err(FormatError::MissingRegion(END_MATCHES).into());
        }
        if self.end_aux != footer_offset {
            return Err(FormatError::UnorderedRegions(format!(
                "{END_AUX} ({}) does not end at the footer ({footer_offset})",
                self.end_aux
            ))
            .into());
        }
        Ok(())
    }
}
