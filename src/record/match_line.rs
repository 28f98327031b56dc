use std::fmt;
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::Payload;
use crate::classification::ClassificationType;
use crate::error::{FormatError, Result};
use crate::schema::{read_string, write_string, FieldType, FormatDefinition};

const BIT_SCORE: &str = "BitScore";
const EXPECTED: &str = "Expected";
const PERCENT_IDENTITY: &str = "PercentIdentity";
const MATCH_TEXT: &str = "MatchText";
const MATCH_FILE_OFFSET: &str = "MatchFileOffset";

/// Name of the class id field a match line carries for a classification
fn class_id_field(ctype: ClassificationType) -> &'static str {
    match ctype {
        ClassificationType::Taxonomy => "TaxonId",
        ClassificationType::Kegg => "KeggId",
        ClassificationType::Seed => "SeedId",
        ClassificationType::Cog => "CogId",
        ClassificationType::Pfam => "PfamId",
    }
}

/// One match line as stored in the matches region
#[derive(Debug, Clone, PartialEq)]
pub struct MatchLine {
    pub bit_score: f32,
    /// E-value
    pub expected: f32,
    pub percent_identity: i32,
    /// Class id per classification, indexed in [`ClassificationType::ALL`] order
    ///
    /// Classifications absent from the format read back as 0.
    pub class_ids: [i32; 5],
    /// Alignment text (delta-compressed against the previous match of the same
    /// read), or its offset in the alignments companion
    pub payload: Payload,
}
impl MatchLine {
    /// Returns the class id of this match for a classification, 0 if unassigned
    #[must_use]
    pub fn class_id(&self, ctype: ClassificationType) -> i32 {
        self.class_ids[ctype.index()]
    }
}

/// Layout of match lines
///
/// ```text
/// BitScore:Float; Expected:Float; PercentIdentity:Integer; TaxonId:Integer;
/// [KeggId:Integer;] [SeedId:Integer;] [CogId:Integer;] [PfamId:Integer;]
/// MatchText:String | MatchFileOffset:Long
/// ```
///
/// The taxonomy class id is always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchLineFormat {
    embed_text: bool,
    active: [bool; 5],
}
impl Default for MatchLineFormat {
    fn default() -> Self {
        Self::new(true)
    }
}
impl MatchLineFormat {
    /// Creates a layout carrying only the taxonomy class id
    #[must_use]
    pub fn new(embed_text: bool) -> Self {
        Self {
            embed_text,
            active: [true, false, false, false, false],
        }
    }

    /// Adds the class id of a classification to the layout
    #[must_use]
    pub fn with_classification(mut self, ctype: ClassificationType) -> Self {
        self.active[ctype.index()] = true;
        self
    }

    /// Derives the layout from a definition found in a container
    #[must_use]
    pub fn from_definition(definition: &FormatDefinition) -> Self {
        let mut format = Self::new(definition.contains_field(MATCH_TEXT, FieldType::String));
        for ctype in ClassificationType::OPTIONAL {
            if definition.contains_field(class_id_field(ctype), FieldType::Integer) {
                format = format.with_classification(ctype);
            }
        }
        format
    }

    /// Parses a definition string and derives the layout from it
    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self::from_definition(&FormatDefinition::parse(text)?))
    }

    #[must_use]
    pub fn embeds_text(&self) -> bool {
        self.embed_text
    }

    /// Returns whether match lines carry a class id for the classification
    #[must_use]
    pub fn uses(&self, ctype: ClassificationType) -> bool {
        self.active[ctype.index()]
    }

    /// Returns the classifications carried by match lines, in on-disk order
    pub fn classifications(&self) -> impl Iterator<Item = ClassificationType> + '_ {
        ClassificationType::ALL
            .into_iter()
            .filter(|ctype| self.uses(*ctype))
    }

    /// Returns the definition describing this layout
    #[must_use]
    pub fn definition(&self) -> FormatDefinition {
        let mut definition = FormatDefinition::new()
            .with(BIT_SCORE, FieldType::Float)
            .with(EXPECTED, FieldType::Float)
            .with(PERCENT_IDENTITY, FieldType::Integer);
        for ctype in self.classifications() {
            definition = definition.with(class_id_field(ctype), FieldType::Integer);
        }
        if self.embed_text {
            definition.with(MATCH_TEXT, FieldType::String)
        } else {
            definition.with(MATCH_FILE_OFFSET, FieldType::Long)
        }
    }

    /// Checks that a payload kind fits the layout
    ///
    /// Text is embedded exactly when the layout embeds text; otherwise the
    /// payload is an offset into the companion file.
    pub fn check_payload(&self, payload: &Payload) -> Result<()> {
        if payload.is_embedded() == self.embed_text {
            return Ok(());
        }
        Err(FormatError::MalformedRecord(format!(
            "match payload does not match the match format '{self}'"
        ))
        .into())
    }

    /// Encodes one match line
    ///
    /// # Errors
    ///
    /// Fails if the payload kind does not match the layout.
    pub fn write<W: Write>(&self, writer: &mut W, line: &MatchLine) -> Result<()> {
        self.check_payload(&line.payload)?;
        writer.write_f32::<BigEndian>(line.bit_score)?;
        writer.write_f32::<BigEndian>(line.expected)?;
        writer.write_i32::<BigEndian>(line.percent_identity)?;
        for ctype in ClassificationType::ALL {
            if self.uses(ctype) {
                writer.write_i32::<BigEndian>(line.class_id(ctype))?;
            }
        }
        match &line.payload {
            Payload::Embedded(text) => write_string(writer, text)?,
            Payload::Offset(offset) => writer.write_i64::<BigEndian>(*offset as i64)?,
        }
        Ok(())
    }

    /// Decodes one match line
    pub fn read<R: Read>(&self, reader: &mut R) -> Result<MatchLine> {
        let bit_score = reader.read_f32::<BigEndian>()?;
        let expected = reader.read_f32::<BigEndian>()?;
        let percent_identity = reader.read_i32::<BigEndian>()?;
        let mut class_ids = [0; 5];
        for ctype in ClassificationType::ALL {
            if self.uses(ctype) {
                class_ids[ctype.index()] = reader.read_i32::<BigEndian>()?;
            }
        }
        let payload = if self.embed_text {
            Payload::Embedded(read_string(reader)?)
        } else {
            Payload::Offset(reader.read_i64::<BigEndian>()? as u64)
        };
        Ok(MatchLine {
            bit_score,
            expected,
            percent_identity,
            class_ids,
            payload,
        })
    }
}
impl fmt::Display for MatchLineFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.definition())
    }
}

#[cfg(test)]
mod testing {
    use std::io::Cursor;

    use super::*;
    use crate::read_by_schema;

    fn sample(payload: Payload) -> MatchLine {
        MatchLine {
            bit_score: 87.5,
            expected: 1e-20,
            percent_identity: 97,
            class_ids: [562, 1234, 0, 77, 0],
            payload,
        }
    }

    #[test]
    fn test_default_layout() {
        assert_eq!(
            MatchLineFormat::default().to_string(),
            "BitScore:Float;Expected:Float;PercentIdentity:Integer;TaxonId:Integer;MatchText:String;"
        );
    }

    #[test]
    fn test_optional_classifications() -> Result<()> {
        let format = MatchLineFormat::new(false)
            .with_classification(ClassificationType::Cog)
            .with_classification(ClassificationType::Kegg);
        assert_eq!(
            format.to_string(),
            "BitScore:Float;Expected:Float;PercentIdentity:Integer;TaxonId:Integer;KeggId:Integer;CogId:Integer;MatchFileOffset:Long;"
        );
        assert_eq!(
            format.classifications().collect::<Vec<_>>(),
            [
                ClassificationType::Taxonomy,
                ClassificationType::Kegg,
                ClassificationType::Cog
            ]
        );
        assert_eq!(MatchLineFormat::parse(&format.to_string())?, format);
        Ok(())
    }

    #[test]
    fn test_inactive_class_ids_are_dropped() -> Result<()> {
        let format = MatchLineFormat::new(true).with_classification(ClassificationType::Kegg);
        let mut buf = Vec::new();
        format.write(&mut buf, &sample(Payload::Embedded("q\t0\tref".into())))?;
        let decoded = format.read(&mut Cursor::new(&buf))?;
        assert_eq!(decoded.class_ids, [562, 1234, 0, 0, 0]);
        assert_eq!(decoded.class_id(ClassificationType::Cog), 0);
        Ok(())
    }

    #[test]
    fn test_matches_generic_reader() -> Result<()> {
        let format = MatchLineFormat::new(false)
            .with_classification(ClassificationType::Seed)
            .with_classification(ClassificationType::Pfam);
        let mut line = sample(Payload::Offset(4096));
        line.class_ids = [562, 0, 11, 0, 22];
        let mut buf = Vec::new();
        format.write(&mut buf, &line)?;

        let values = read_by_schema(&mut Cursor::new(&buf), &format.definition())?;
        assert_eq!(values.get_float("BitScore"), Some(87.5));
        assert_eq!(values.get_float("Expected"), Some(1e-20));
        assert_eq!(values.get_int("PercentIdentity"), Some(97));
        assert_eq!(values.get_int("TaxonId"), Some(562));
        assert_eq!(values.get_int("SeedId"), Some(11));
        assert_eq!(values.get_int("PfamId"), Some(22));
        assert_eq!(values.get_long("MatchFileOffset"), Some(4096));
        assert_eq!(values.len(), format.definition().len());

        assert_eq!(format.read(&mut Cursor::new(&buf))?, line);
        Ok(())
    }
}
