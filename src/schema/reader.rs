use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};
use indexmap::IndexMap;

use super::primitives::{read_char, read_string};
use super::{FieldType, FormatDefinition, Value};
use crate::error::{Result, SchemaError};

/// The decoded values of one record, keyed by field name in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldValues {
    values: IndexMap<String, Value>,
}
impl FieldValues {
    /// Returns the value of a field
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns all values in declaration order
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.values()
    }

    /// Returns `(name, value)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i32> {
        match self.values.get(name) {
            Some(Value::Integer(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_long(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(Value::Long(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_float(&self, name: &str) -> Option<f32> {
        match self.values.get(name) {
            Some(Value::Float(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(Value::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_char(&self, name: &str) -> Option<char> {
        match self.values.get(name) {
            Some(Value::Character(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_byte(&self, name: &str) -> Option<u8> {
        match self.values.get(name) {
            Some(Value::Byte(v)) => Some(*v),
            _ => None,
        }
    }

    /// Returns a Long field that the record cannot do without
    pub fn require_long(&self, name: &str) -> Result<i64> {
        self.get_long(name)
            .ok_or_else(|| SchemaError::MissingField(name.to_string()).into())
    }

    /// Returns an Integer field that the record cannot do without
    pub fn require_int(&self, name: &str) -> Result<i32> {
        self.get_int(name)
            .ok_or_else(|| SchemaError::MissingField(name.to_string()).into())
    }
}

/// Decodes one record using the given definition
///
/// Each field is decoded with the width of its declared type, so the reader
/// follows whatever schema the file carries rather than a compiled-in one.
///
/// # Arguments
///
/// * `reader` - The source positioned at the first value of the record
/// * `definition` - The definition the record was written with
///
/// # Returns
///
/// * `Ok(FieldValues)` - The decoded values keyed by field name
/// * `Err(Error)` - If the source is exhausted or a value cannot be decoded
pub fn read_by_schema<R: Read>(
    reader: &mut R,
    definition: &FormatDefinition,
) -> Result<FieldValues> {
    let mut values = IndexMap::with_capacity(definition.len());
    for (name, ftype) in definition.fields() {
        values.insert(name.clone(), read_value(reader, *ftype)?);
    }
    Ok(FieldValues { values })
}

/// Decodes a single value of the given type
pub(crate) fn read_value<R: Read>(reader: &mut R, ftype: FieldType) -> Result<Value> {
    let value = match ftype {
        FieldType::Integer => Value::Integer(reader.read_i32::<BigEndian>()?),
        FieldType::Long => Value::Long(reader.read_i64::<BigEndian>()?),
        FieldType::Float => Value::Float(reader.read_f32::<BigEndian>()?),
        FieldType::String => Value::String(read_string(reader)?),
        FieldType::Character => Value::Character(read_char(reader)?),
        FieldType::Byte => Value::Byte(reader.read_u8()?),
    };
    Ok(value)
}

#[cfg(test)]
mod testing {
    use std::io::Cursor;

    use super::*;
    use crate::{Error, SchemaWriter};

    #[test]
    fn test_typed_getters() -> Result<()> {
        let def = FormatDefinition::new()
            .with("NumberOfReads", FieldType::Long)
            .with("MaxMatchesPerRead", FieldType::Integer)
            .with("UseKegg", FieldType::Byte)
            .with("Creator", FieldType::String);
        let mut buf = Vec::new();
        let mut writer = SchemaWriter::new(&mut buf, &def);
        writer.write("NumberOfReads", 3i64)?;
        writer.write("MaxMatchesPerRead", 25)?;
        writer.write("UseKegg", true)?;
        writer.write("Creator", "rma3")?;
        writer.finish()?;

        let values = read_by_schema(&mut Cursor::new(&buf), &def)?;
        assert_eq!(values.len(), 4);
        assert_eq!(values.get_long("NumberOfReads"), Some(3));
        assert_eq!(values.get_int("MaxMatchesPerRead"), Some(25));
        assert_eq!(values.get_byte("UseKegg"), Some(1));
        assert_eq!(values.get_string("Creator"), Some("rma3"));

        // wrong type or missing field
        assert_eq!(values.get_int("NumberOfReads"), None);
        assert_eq!(values.get_long("KeggStart"), None);
        assert!(matches!(
            values.require_long("KeggStart").unwrap_err(),
            Error::SchemaError(SchemaError::MissingField(_))
        ));
        Ok(())
    }

    #[test]
    fn test_short_input() {
        let def = FormatDefinition::new().with("Offset", FieldType::Long);
        let err = read_by_schema(&mut Cursor::new([0u8; 4]), &def).unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn test_reader_follows_file_schema() -> Result<()> {
        // A newer writer added an optional field; the reader uses the written schema
        let written = FormatDefinition::new()
            .with("TaxonomyStart", FieldType::Long)
            .with("KeggStart", FieldType::Long);
        let mut buf = Vec::new();
        let mut writer = SchemaWriter::new(&mut buf, &written);
        writer.write("TaxonomyStart", 10i64)?;
        writer.write("KeggStart", 20i64)?;
        writer.finish()?;

        let values = read_by_schema(&mut Cursor::new(&buf), &written)?;
        let names: Vec<&str> = values.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["TaxonomyStart", "KeggStart"]);
        assert_eq!(values.get_long("KeggStart"), Some(20));
        Ok(())
    }
}
