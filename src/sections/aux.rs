use std::io::{Read, Write};

use super::{read_section, write_section};
use crate::error::{FormatError, Result};
use crate::schema::{FieldType, FormatDefinition};

const COUNT: &str = "Count";

/// The footer of the aux section, followed by `Count` named entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuxFooter {
    pub count: usize,
}
impl AuxFooter {
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self { count }
    }

    fn definition() -> FormatDefinition {
        FormatDefinition::new().with(COUNT, FieldType::Integer)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let count = i32::try_from(self.count)
            .map_err(|_| FormatError::InvalidLength(self.count as i64, 0))?;
        write_section(writer, &Self::definition(), |w| w.write(COUNT, count))
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let values = read_section(reader)?;
        let count = values.get_int(COUNT).unwrap_or_default();
        if count < 0 {
            return Err(FormatError::InvalidLength(i64::from(count), 0).into());
        }
        Ok(Self::new(count as usize))
    }
}

#[cfg(test)]
mod testing {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_aux_footer_roundtrip() -> Result<()> {
        let mut buf = Vec::new();
        AuxFooter::new(3).write_to(&mut buf)?;
        assert_eq!(AuxFooter::read_from(&mut Cursor::new(&buf))?, AuxFooter::new(3));
        Ok(())
    }
}
