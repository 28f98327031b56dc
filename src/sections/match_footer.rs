use std::io::{Read, Write};

use super::{get_u64, read_section, write_section};
use crate::classification::ClassificationType;
use crate::error::Result;
use crate::record::{MatchLineFormat, ReadLineFormat};
use crate::schema::{FieldType, FormatDefinition};
use crate::{DEFAULT_MAX_EXPECTED, DEFAULT_MAX_MATCHES_PER_READ, DEFAULT_MIN_SCORE};

const NUMBER_OF_READS: &str = "NumberOfReads";
const NUMBER_OF_MATCHES: &str = "NumberOfMatches";
const MAX_MATCHES_PER_READ: &str = "MaxMatchesPerRead";
const USE_KEGG: &str = "UseKegg";
const USE_SEED: &str = "UseSeed";
const USE_COG: &str = "UseCog";
const USE_PFAM: &str = "UsePfam";
const READ_FORMAT: &str = "ReadFormat";
const MATCH_FORMAT: &str = "MatchFormat";
const MIN_SCORE: &str = "MinScore";
const MAX_EXPECTED: &str = "MaxExpected";

fn flag_field(ctype: ClassificationType) -> Option<&'static str> {
    match ctype {
        ClassificationType::Taxonomy => None,
        ClassificationType::Kegg => Some(USE_KEGG),
        ClassificationType::Seed => Some(USE_SEED),
        ClassificationType::Cog => Some(USE_COG),
        ClassificationType::Pfam => Some(USE_PFAM),
    }
}

/// The footer of the matches region
///
/// Besides the counts it records the layouts of the read and match lines, which
/// every reader of the matches region needs, and the import filters.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchFooter {
    pub number_of_reads: u64,
    pub number_of_matches: u64,
    /// Cap on the number of matches stored per read
    pub max_matches_per_read: usize,
    pub read_format: ReadLineFormat,
    pub match_format: MatchLineFormat,
    /// Minimum bit score applied at import
    pub min_score: f32,
    /// Maximum e-value applied at import
    pub max_expected: f32,
}
impl Default for MatchFooter {
    fn default() -> Self {
        Self {
            number_of_reads: 0,
            number_of_matches: 0,
            max_matches_per_read: DEFAULT_MAX_MATCHES_PER_READ,
            read_format: ReadLineFormat::default(),
            match_format: MatchLineFormat::default(),
            min_score: DEFAULT_MIN_SCORE,
            max_expected: DEFAULT_MAX_EXPECTED,
        }
    }
}
impl MatchFooter {
    /// Returns whether match lines carry class ids of the classification
    #[must_use]
    pub fn uses(&self, ctype: ClassificationType) -> bool {
        self.match_format.uses(ctype)
    }

    fn definition() -> FormatDefinition {
        FormatDefinition::new()
            .with(NUMBER_OF_READS, FieldType::Long)
            .with(NUMBER_OF_MATCHES, FieldType::Long)
            .with(MAX_MATCHES_PER_READ, FieldType::Integer)
            .with(USE_KEGG, FieldType::Byte)
            .with(USE_SEED, FieldType::Byte)
            .with(USE_COG, FieldType::Byte)
            .with(USE_PFAM, FieldType::Byte)
            .with(READ_FORMAT, FieldType::String)
            .with(MATCH_FORMAT, FieldType::String)
            .with(MIN_SCORE, FieldType::Float)
            .with(MAX_EXPECTED, FieldType::Float)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_section(writer, &Self::definition(), |w| {
            w.write(NUMBER_OF_READS, self.number_of_reads)?;
            w.write(NUMBER_OF_MATCHES, self.number_of_matches)?;
            let max_matches = i32::try_from(self.max_matches_per_read).unwrap_or(i32::MAX);
            w.write(MAX_MATCHES_PER_READ, max_matches)?;
            for ctype in ClassificationType::OPTIONAL {
                if let Some(field) = flag_field(ctype) {
                    w.write(field, self.uses(ctype))?;
                }
            }
            w.write(READ_FORMAT, self.read_format.to_string())?;
            w.write(MATCH_FORMAT, self.match_format.to_string())?;
            w.write(MIN_SCORE, self.min_score)?;
            w.write(MAX_EXPECTED, self.max_expected)
        })
    }

    /// Reads a match footer
    ///
    /// If the file lacks a match format string, the layout is rebuilt from the
    /// classification flags with embedded text.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let values = read_section(reader)?;
        let read_format = match values.get_string(READ_FORMAT) {
            Some(text) => ReadLineFormat::parse(text)?,
            None => ReadLineFormat::default(),
        };
        let match_format = match values.get_string(MATCH_FORMAT) {
            Some(text) => MatchLineFormat::parse(text)?,
            None => ClassificationType::OPTIONAL
                .into_iter()
                .filter(|ctype| {
                    flag_field(*ctype)
                        .and_then(|field| values.get_byte(field))
                        .is_some_and(|flag| flag != 0)
                })
                .fold(MatchLineFormat::default(), MatchLineFormat::with_classification),
        };
        Ok(Self {
            number_of_reads: get_u64(&values, NUMBER_OF_READS),
            number_of_matches: get_u64(&values, NUMBER_OF_MATCHES),
            max_matches_per_read: values
                .get_int(MAX_MATCHES_PER_READ)
                .map_or(DEFAULT_MAX_MATCHES_PER_READ, |v| v.max(0) as usize),
            read_format,
            match_format,
            min_score: values.get_float(MIN_SCORE).unwrap_or(DEFAULT_MIN_SCORE),
            max_expected: values.get_float(MAX_EXPECTED).unwrap_or(DEFAULT_MAX_EXPECTED),
        })
    }
}
