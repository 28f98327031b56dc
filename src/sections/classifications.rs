use std::collections::BTreeMap;
use std::io::{Read, Write};

use super::{read_section, write_section};
use crate::classification::ClassificationType;
use crate::error::Result;
use crate::schema::{FieldType, FormatDefinition};

/// The footer of the classification section
///
/// For each classification present in the container it stores the start and
/// end offsets of the classification's block. Absent classifications have no
/// fields at all, so the definition string itself tells which are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationsFooter {
    ranges: BTreeMap<ClassificationType, (u64, u64)>,
}
impl ClassificationsFooter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the container holds a block for the classification
    #[must_use]
    pub fn is_do(&self, ctype: ClassificationType) -> bool {
        self.ranges.contains_key(&ctype)
    }

    /// Returns the start offset of a classification's block
    #[must_use]
    pub fn start(&self, ctype: ClassificationType) -> Option<u64> {
        self.ranges.get(&ctype).map(|(start, _)| *start)
    }

    /// Returns the end offset of a classification's block
    #[must_use]
    pub fn end(&self, ctype: ClassificationType) -> Option<u64> {
        self.ranges.get(&ctype).map(|(_, end)| *end)
    }

    /// Records the block range of a classification
    pub fn set(&mut self, ctype: ClassificationType, start: u64, end: u64) {
        self.ranges.insert(ctype, (start, end));
    }

    /// Returns the classifications present, in on-disk order
    pub fn types(&self) -> impl Iterator<Item = ClassificationType> + '_ {
        self.ranges.keys().copied()
    }

    fn definition(&self) -> FormatDefinition {
        self.ranges
            .keys()
            .fold(FormatDefinition::new(), |definition, ctype| {
                let prefix = ctype.field_prefix();
                definition
                    .with(&format!("{prefix}Start"), FieldType::Long)
                    .with(&format!("{prefix}End"), FieldType::Long)
            })
    }

    /// Returns the number of bytes [`ClassificationsFooter::write_to`] produces
    ///
    /// The length depends only on which classifications are present, not on the
    /// offsets, so block offsets can be laid out before the footer is written.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        let definition = self.definition();
        4 + definition.to_string().len() as u64 + 8 * definition.len() as u64
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_section(writer, &self.definition(), |w| {
            for (ctype, (start, end)) in &self.ranges {
                let prefix = ctype.field_prefix();
                w.write(&format!("{prefix}Start"), *start)?;
                w.write(&format!("{prefix}End"), *end)?;
            }
            Ok(())
        })
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let values = read_section(reader)?;
        let mut footer = Self::new();
        for ctype in ClassificationType::ALL {
            let prefix = ctype.field_prefix();
            let start = values.get_long(&format!("{prefix}Start"));
            let end = values.get_long(&format!("{prefix}End"));
            if let (Some(start), Some(end)) = (start, end) {
                footer.set(ctype, start.max(0) as u64, end.max(0) as u64);
            }
        }
        Ok(footer)
    }
}
