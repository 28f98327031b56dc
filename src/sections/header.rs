use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::{get_string, read_section, write_section};
use crate::error::{FormatError, Result};
use crate::schema::{FieldType, FormatDefinition};
use crate::{FILE_VERSION, MAGIC_NUMBER};

const CREATOR: &str = "Creator";
const CREATION_DATE: &str = "CreationDate";

/// Returns the current time in milliseconds since the Unix epoch
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// The header at the start of every container
///
/// The magic number and version are written as raw integers ahead of the
/// self-describing part so that foreign files are rejected before any schema
/// is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Name of the program that created the container
    pub creator: String,
    /// Creation time in milliseconds since the Unix epoch
    pub creation_date: i64,
}
impl FileHeader {
    /// Creates a header stamped with the current time
    #[must_use]
    pub fn new(creator: &str) -> Self {
        Self {
            creator: creator.to_string(),
            creation_date: now_millis(),
        }
    }

    fn definition() -> FormatDefinition {
        FormatDefinition::new()
            .with(CREATOR, FieldType::String)
            .with(CREATION_DATE, FieldType::Long)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<BigEndian>(MAGIC_NUMBER)?;
        writer.write_i32::<BigEndian>(FILE_VERSION)?;
        write_section(writer, &Self::definition(), |w| {
            w.write(CREATOR, self.creator.as_str())?;
            w.write(CREATION_DATE, self.creation_date)
        })
    }

    /// Reads and validates a header
    ///
    /// # Errors
    ///
    /// Fails with [`FormatError::InvalidMagicNumber`] or
    /// [`FormatError::InvalidFormatVersion`] on foreign or incompatible files.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let magic = reader.read_i32::<BigEndian>()?;
        if magic != MAGIC_NUMBER {
            return Err(FormatError::InvalidMagicNumber(magic).into());
        }
        let version = reader.read_i32::<BigEndian>()?;
        if version != FILE_VERSION {
            return Err(FormatError::InvalidFormatVersion(version).into());
        }
        let values = read_section(reader)?;
        Ok(Self {
            creator: get_string(&values, CREATOR),
            creation_date: values.get_long(CREATION_DATE).unwrap_or_default(),
        })
    }
}
impl Default for FileHeader {
    fn default() -> Self {
        Self::new(concat!("rma3 ", env!("CARGO_PKG_VERSION")))
    }
}

#[cfg(test)]
mod testing {
    use std::io::Cursor;

    use super::*;
    use crate::Error;

    #[test]
    fn test_header_roundtrip() -> Result<()> {
        let header = FileHeader {
            creator: "importer".into(),
            creation_date: 1_700_000_000_000,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf)?;
        assert_eq!(&buf[..4], b"\0RMA");
        assert_eq!(&buf[4..8], &[0, 0, 0, 3]);
        assert_eq!(FileHeader::read_from(&mut Cursor::new(&buf))?, header);
        Ok(())
    }

    #[test]
    fn test_wrong_magic() -> Result<()> {
        let mut buf = Vec::new();
        FileHeader::default().write_to(&mut buf)?;
        buf[1] = b'X';
        let err = FileHeader::read_from(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(
            err,
            Error::FormatError(FormatError::InvalidMagicNumber(_))
        ));
        Ok(())
    }

    #[test]
    fn test_wrong_version() -> Result<()> {
        let mut buf = Vec::new();
        FileHeader::default().write_to(&mut buf)?;
        buf[7] = 2;
        let err = FileHeader::read_from(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(
            err,
            Error::FormatError(FormatError::InvalidFormatVersion(2))
        ));
        Ok(())
    }

    #[test]
    fn test_default_creator() {
        let header = FileHeader::default();
        assert!(header.creator.starts_with("rma3 "));
        assert!(header.creation_date > 0);
    }
}
