use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};

use super::primitives::{write_char, write_string};
use super::{FormatDefinition, Value};
use crate::error::{Result, SchemaError};

/// Writes the values of one record in the order declared by its definition
///
/// The writer is stateful: each call to [`SchemaWriter::write`] must name the
/// next declared field and carry a value of its declared type. Once all fields
/// are written, [`SchemaWriter::finish`] confirms the record is complete.
///
/// # Examples
///
/// ```
/// # use rma3::{FieldType, FormatDefinition, SchemaWriter, Result};
/// # fn main() -> Result<()> {
/// let def = FormatDefinition::new()
///     .with("NumberOfReads", FieldType::Long)
///     .with("Creator", FieldType::String);
/// let mut buf = Vec::new();
/// let mut writer = SchemaWriter::new(&mut buf, &def);
/// writer.write("NumberOfReads", 12i64)?;
/// writer.write("Creator", "importer")?;
/// writer.finish()?;
/// # Ok(())
/// # }
/// ```
pub struct SchemaWriter<'a, W: Write> {
    inner: &'a mut W,
    definition: &'a FormatDefinition,
    position: usize,
}
impl<'a, W: Write> SchemaWriter<'a, W> {
    #[must_use]
    pub fn new(inner: &'a mut W, definition: &'a FormatDefinition) -> Self {
        Self {
            inner,
            definition,
            position: 0,
        }
    }

    /// Writes the next field of the record
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the field, must match the next declared field
    /// * `value` - The value, must match the declared type
    ///
    /// # Errors
    ///
    /// * [`SchemaError::TooManyFields`] if all fields were already written
    /// * [`SchemaError::OutOfOrder`] if `name` is not the next declared field
    /// * [`SchemaError::TypeMismatch`] if the value has a different type
    pub fn write<V: Into<Value>>(&mut self, name: &str, value: V) -> Result<()> {
        let Some((expected, ftype)) = self.definition.fields().get(self.position) else {
            return Err(SchemaError::TooManyFields(name.to_string()).into());
        };
        if expected != name {
            return Err(SchemaError::OutOfOrder {
                position: self.position,
                expected: expected.clone(),
                got: name.to_string(),
            }
            .into());
        }
        let value = value.into();
        if value.field_type() != *ftype {
            return Err(SchemaError::TypeMismatch {
                field: name.to_string(),
                expected: ftype.name(),
                got: value.field_type().name(),
            }
            .into());
        }
        write_value(self.inner, &value)?;
        self.position += 1;
        Ok(())
    }

    /// Returns the number of fields written so far
    #[must_use]
    pub fn written(&self) -> usize {
        self.position
    }

    /// Confirms that every declared field was written
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Incomplete`] if fields remain unwritten.
    pub fn finish(self) -> Result<()> {
        if self.position != self.definition.len() {
            return Err(SchemaError::Incomplete {
                written: self.position,
                declared: self.definition.len(),
            }
            .into());
        }
        Ok(())
    }
}

/// Encodes a single value with the width of its type
pub(crate) fn write_value<W: Write>(writer: &mut W, value: &Value) -> Result<()> {
    match value {
        Value::Integer(v) => writer.write_i32::<BigEndian>(*v)?,
        Value::Long(v) => writer.write_i64::<BigEndian>(*v)?,
        Value::Float(v) => writer.write_f32::<BigEndian>(*v)?,
        Value::String(v) => write_string(writer, v)?,
        Value::Character(v) => write_char(writer, *v)?,
        Value::Byte(v) => writer.write_u8(*v)?,
    }
    Ok(())
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::{Error, FieldType};

    fn definition() -> FormatDefinition {
        FormatDefinition::new()
            .with("ReadUid", FieldType::Long)
            .with("ReadLength", FieldType::Integer)
            .with("NumMatches", FieldType::Integer)
    }

    #[test]
    fn test_write_in_order() -> Result<()> {
        let def = definition();
        let mut buf = Vec::new();
        let mut writer = SchemaWriter::new(&mut buf, &def);
        writer.write("ReadUid", 100i64)?;
        writer.write("ReadLength", 150)?;
        writer.write("NumMatches", 2)?;
        assert_eq!(writer.written(), 3);
        writer.finish()?;
        assert_eq!(buf.len(), 16);
        Ok(())
    }

    #[test]
    fn test_out_of_order() {
        let def = definition();
        let mut buf = Vec::new();
        let mut writer = SchemaWriter::new(&mut buf, &def);
        let err = writer.write("ReadLength", 150).unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaError(SchemaError::OutOfOrder { position: 0, .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_type_mismatch() {
        let def = definition();
        let mut buf = Vec::new();
        let mut writer = SchemaWriter::new(&mut buf, &def);
        let err = writer.write("ReadUid", 100).unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaError(SchemaError::TypeMismatch { expected: "Long", got: "Integer", .. })
        ));
    }

    #[test]
    fn test_finish_incomplete() -> Result<()> {
        let def = definition();
        let mut buf = Vec::new();
        let mut writer = SchemaWriter::new(&mut buf, &def);
        writer.write("ReadUid", 100i64)?;
        let err = writer.finish().unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaError(SchemaError::Incomplete {
                written: 1,
                declared: 3
            })
        ));
        Ok(())
    }

    #[test]
    fn test_too_many_fields() -> Result<()> {
        let def = FormatDefinition::new().with("A", FieldType::Byte);
        let mut buf = Vec::new();
        let mut writer = SchemaWriter::new(&mut buf, &def);
        writer.write("A", 1u8)?;
        let err = writer.write("B", 2u8).unwrap_err();
        assert!(matches!(err, Error::SchemaError(SchemaError::TooManyFields(_))));
        Ok(())
    }
}
