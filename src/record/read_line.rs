use std::fmt;
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::{Payload, RecordId};
use crate::error::{FormatError, Result};
use crate::schema::{read_string, write_string, FieldType, FormatDefinition};

const READ_UID: &str = "ReadUid";
const READ_LENGTH: &str = "ReadLength";
const READ_WEIGHT: &str = "ReadWeight";
const NUM_MATCHES: &str = "NumMatches";
const READ_TEXT: &str = "ReadText";
const READ_FILE_OFFSET: &str = "ReadFileOffset";

/// One read line as stored in the matches region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadLine {
    /// The offset of this line, stored redundantly inside the line
    pub uid: RecordId,
    /// Length of the read sequence
    pub length: i32,
    /// Read weight (magnitude), 1 if the format carries no weights
    pub weight: i32,
    /// Number of match lines following this line
    pub num_matches: i32,
    /// Header and sequence text, or its offset in the reads companion
    pub payload: Payload,
}

/// Layout of read lines
///
/// The layout is fixed by two choices made once at import time:
///
/// ```text
/// ReadUid:Long; ReadLength:Integer; [ReadWeight:Integer;] NumMatches:Integer;
/// ReadText:String | ReadFileOffset:Long
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLineFormat {
    embed_text: bool,
    has_weight: bool,
}
impl Default for ReadLineFormat {
    fn default() -> Self {
        Self::new(true, false)
    }
}
impl ReadLineFormat {
    #[must_use]
    pub fn new(embed_text: bool, has_weight: bool) -> Self {
        Self {
            embed_text,
            has_weight,
        }
    }

    /// Derives the layout from a definition found in a container
    ///
    /// Text is embedded if and only if the definition declares `ReadText:String`.
    #[must_use]
    pub fn from_definition(definition: &FormatDefinition) -> Self {
        Self {
            embed_text: definition.contains_field(READ_TEXT, FieldType::String),
            has_weight: definition.contains_field(READ_WEIGHT, FieldType::Integer),
        }
    }

    /// Parses a definition string and derives the layout from it
    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self::from_definition(&FormatDefinition::parse(text)?))
    }

    #[must_use]
    pub fn embeds_text(&self) -> bool {
        self.embed_text
    }

    #[must_use]
    pub fn has_weight(&self) -> bool {
        self.has_weight
    }

    /// Returns the definition describing this layout
    #[must_use]
    pub fn definition(&self) -> FormatDefinition {
        let mut definition = FormatDefinition::new()
            .with(READ_UID, FieldType::Long)
            .with(READ_LENGTH, FieldType::Integer);
        if self.has_weight {
            definition = definition.with(READ_WEIGHT, FieldType::Integer);
        }
        definition = definition.with(NUM_MATCHES, FieldType::Integer);
        if self.embed_text {
            definition.with(READ_TEXT, FieldType::String)
        } else {
            definition.with(READ_FILE_OFFSET, FieldType::Long)
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
            "read payload does not match the read format '{self}'"
        ))
        .into())
    }

    /// Encodes one read line
    ///
    /// # Errors
    ///
    /// Fails if the payload kind does not match the layout.
    pub fn write<W: Write>(&self, writer: &mut W, line: &ReadLine) -> Result<()> {
        self.check_payload(&line.payload)?;
        writer.write_i64::<BigEndian>(line.uid.offset() as i64)?;
        writer.write_i32::<BigEndian>(line.length)?;
        if self.has_weight {
            writer.write_i32::<BigEndian>(line.weight)?;
        }
        writer.write_i32::<BigEndian>(line.num_matches)?;
        match &line.payload {
            Payload::Embedded(text) => write_string(writer, text)?,
            Payload::Offset(offset) => writer.write_i64::<BigEndian>(*offset as i64)?,
        }
        Ok(())
    }

    /// Decodes one read line
    pub fn read<R: Read>(&self, reader: &mut R) -> Result<ReadLine> {
        let uid = reader.read_i64::<BigEndian>()?;
        let length = reader.read_i32::<BigEndian>()?;
        let weight = if self.has_weight {
            reader.read_i32::<BigEndian>()?
        } else {
            1
        };
        let num_matches = reader.read_i32::<BigEndian>()?;
        if uid < 0 || num_matches < 0 {
            return Err(FormatError::MalformedRecord(format!(
                "read line with uid {uid} and {num_matches} matches"
            ))
            .into());
        }
        let payload = if self.embed_text {
            Payload::Embedded(read_string(reader)?)
        } else {
            Payload::Offset(reader.read_i64::<BigEndian>()? as u64)
        };
        Ok(ReadLine {
            uid: RecordId::new(uid as u64),
            length,
            weight,
            num_matches,
            payload,
        })
    }
}
impl fmt::Display for ReadLineFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.definition())
    }
}

#[cfg(test)]
mod testing {
    use std::io::Cursor;

    use super::*;
    use crate::read_by_schema;

    fn sample(payload: Payload) -> ReadLine {
        ReadLine {
            uid: RecordId::new(100),
            length: 150,
            weight: 3,
            num_matches: 2,
            payload,
        }
    }

    #[test]
    fn test_definition_strings() {
        assert_eq!(
            ReadLineFormat::new(true, false).to_string(),
            "ReadUid:Long;ReadLength:Integer;NumMatches:Integer;ReadText:String;"
        );
        assert_eq!(
            ReadLineFormat::new(false, true).to_string(),
            "ReadUid:Long;ReadLength:Integer;ReadWeight:Integer;NumMatches:Integer;ReadFileOffset:Long;"
        );
    }

    #[test]
    fn test_layout_from_definition() -> Result<()> {
        for format in [
            ReadLineFormat::new(true, true),
            ReadLineFormat::new(true, false),
            ReadLineFormat::new(false, true),
            ReadLineFormat::new(false, false),
        ] {
            assert_eq!(ReadLineFormat::parse(&format.to_string())?, format);
        }
        Ok(())
    }

    #[test]
    fn test_embedded_line() -> Result<()> {
        let format = ReadLineFormat::new(true, true);
        let line = sample(Payload::Embedded(">read1\nACGT".into()));
        let mut buf = Vec::new();
        format.write(&mut buf, &line)?;
        assert_eq!(format.read(&mut Cursor::new(&buf))?, line);
        Ok(())
    }

    #[test]
    fn test_weight_defaults_to_one() -> Result<()> {
        let format = ReadLineFormat::new(false, false);
        let mut buf = Vec::new();
        format.write(&mut buf, &sample(Payload::Offset(9000)))?;
        let decoded = format.read(&mut Cursor::new(&buf))?;
        assert_eq!(decoded.weight, 1);
        assert_eq!(decoded.payload, Payload::Offset(9000));
        Ok(())
    }

    #[test]
    fn test_matches_generic_reader() -> Result<()> {
        let format = ReadLineFormat::new(true, true);
        let mut buf = Vec::new();
        format.write(&mut buf, &sample(Payload::Embedded(">r\nAC".into())))?;

        let values = read_by_schema(&mut Cursor::new(&buf), &format.definition())?;
        assert_eq!(values.get_long("ReadUid"), Some(100));
        assert_eq!(values.get_int("ReadLength"), Some(150));
        assert_eq!(values.get_int("ReadWeight"), Some(3));
        assert_eq!(values.get_int("NumMatches"), Some(2));
        assert_eq!(values.get_string("ReadText"), Some(">r\nAC"));
        Ok(())
    }

    #[test]
    fn test_payload_mismatch() {
        let format = ReadLineFormat::new(true, false);
        let mut buf = Vec::new();
        let err = format
            .write(&mut buf, &sample(Payload::Offset(1)))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::FormatError(FormatError::MalformedRecord(_))
        ));
        assert!(buf.is_empty());
        assert!(format.check_payload(&Payload::Embedded("ACGT".into())).is_ok());
    }
}
