//! Self-describing record schema
//!
//! A [`FormatDefinition`] is an ordered list of `(name, type)` pairs. It is stored
//! in the container as a plain-text definition string (`Name:Type;Name:Type;...`)
//! in front of the values it describes, so a reader always decodes a record with
//! the schema that was actually written and section records can gain optional
//! fields without breaking older files.
//!
//! Values are written ordinally through a [`SchemaWriter`] and read back by name
//! through [`read_by_schema`].

mod primitives;
mod reader;
mod writer;

use std::fmt;
use std::str::FromStr;

pub(crate) use primitives::{read_bytes, read_string, write_bytes, write_string};
pub use reader::{read_by_schema, FieldValues};
pub use writer::SchemaWriter;

use crate::error::{Result, SchemaError};

/// The finite set of field types a definition may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Signed 32-bit integer (4 bytes)
    Integer,
    /// Signed 64-bit integer (8 bytes)
    Long,
    /// 32-bit IEEE float (4 bytes)
    Float,
    /// Length-prefixed UTF-8 string
    String,
    /// A single UTF-16 code unit (2 bytes)
    Character,
    /// A single byte
    Byte,
}
impl FieldType {
    /// Returns the name used for this type in definition strings
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer => "Integer",
            Self::Long => "Long",
            Self::Float => "Float",
            Self::String => "String",
            Self::Character => "Character",
            Self::Byte => "Byte",
        }
    }

    /// Returns the encoded width in bytes, or `None` for variable-width types
    #[must_use]
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            Self::Integer | Self::Float => Some(4),
            Self::Long => Some(8),
            Self::Character => Some(2),
            Self::Byte => Some(1),
            Self::String => None,
        }
    }
}
impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Integer" => Ok(Self::Integer),
            "Long" => Ok(Self::Long),
            "Float" => Ok(Self::Float),
            "String" => Ok(Self::String),
            "Character" => Ok(Self::Character),
            "Byte" => Ok(Self::Byte),
            _ => Err(SchemaError::UnknownType(s.to_string())),
        }
    }
}
impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed value of one of the [`FieldType`]s
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    Long(i64),
    Float(f32),
    String(String),
    Character(char),
    Byte(u8),
}
impl Value {
    /// Returns the type of this value
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Integer(_) => FieldType::Integer,
            Self::Long(_) => FieldType::Long,
            Self::Float(_) => FieldType::Float,
            Self::String(_) => FieldType::String,
            Self::Character(_) => FieldType::Character,
            Self::Byte(_) => FieldType::Byte,
        }
    }
}
impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}
impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}
impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Long(value as i64)
    }
}
impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}
impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}
impl From<char> for Value {
    fn from(value: char) -> Self {
        Self::Character(value)
    }
}
impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Self::Byte(value)
    }
}
impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Byte(u8::from(value))
    }
}

/// An ordered list of named, typed fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatDefinition {
    fields: Vec<(String, FieldType)>,
}
impl FormatDefinition {
    /// Creates an empty definition
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a definition string of the form `Name:Type;Name:Type;...`
    ///
    /// Empty items and surrounding whitespace are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if an item is not of the form `Name:Type`, if a
    /// type is unknown, or if a name is declared twice.
    pub fn parse(text: &str) -> Result<Self> {
        let mut def = Self::new();
        for item in text.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((name, ftype)) = item.split_once(':') else {
                return Err(SchemaError::MalformedItem(item.to_string()).into());
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(SchemaError::MalformedItem(item.to_string()).into());
            }
            def.try_push(name, ftype.trim().parse()?)?;
        }
        Ok(def)
    }

    /// Appends a field, builder style
    ///
    /// # Panics
    ///
    /// Panics if the field name is already declared. Use [`FormatDefinition::try_push`]
    /// for definitions that are not compiled in.
    #[must_use]
    pub fn with(mut self, name: &str, ftype: FieldType) -> Self {
        assert!(
            !self.contains(name),
            "field '{name}' declared twice in a static definition"
        );
        self.fields.push((name.to_string(), ftype));
        self
    }

    /// Appends a field, failing on duplicate names
    pub fn try_push(&mut self, name: &str, ftype: FieldType) -> Result<()> {
        if self.contains(name) {
            return Err(SchemaError::DuplicateField(name.to_string()).into());
        }
        self.fields.push((name.to_string(), ftype));
        Ok(())
    }

    /// Returns whether a field of this name is declared
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Returns whether a field of this name and type is declared
    #[must_use]
    pub fn contains_field(&self, name: &str, ftype: FieldType) -> bool {
        self.fields.iter().any(|(n, t)| n == name && *t == ftype)
    }

    /// Returns the declared type of a field
    #[must_use]
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find_map(|(n, t)| (n == name).then_some(*t))
    }

    /// Returns the fields in declaration order
    #[must_use]
    pub fn fields(&self) -> &[(String, FieldType)] {
        &self.fields
    }

    /// Returns the number of declared fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns whether no fields are declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the encoded size of a record when all fields are fixed-width
    #[must_use]
    pub fn fixed_record_size(&self) -> Option<usize> {
        self.fields
            .iter()
            .map(|(_, t)| t.fixed_width())
            .sum::<Option<usize>>()
    }
}
impl FromStr for FormatDefinition {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}
impl fmt::Display for FormatDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, ftype) in &self.fields {
            write!(f, "{name}:{ftype};")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod testing {
    use std::io::Cursor;

    use super::*;
    use crate::Error;

    fn sample_definition() -> FormatDefinition {
        FormatDefinition::new()
            .with("Count", FieldType::Integer)
            .with("Offset", FieldType::Long)
            .with("Score", FieldType::Float)
            .with("Name", FieldType::String)
            .with("Strand", FieldType::Character)
            .with("Flag", FieldType::Byte)
    }

    #[test]
    fn test_definition_string_roundtrip() -> Result<()> {
        let def = sample_definition();
        let text = def.to_string();
        assert_eq!(
            text,
            "Count:Integer;Offset:Long;Score:Float;Name:String;Strand:Character;Flag:Byte;"
        );
        assert_eq!(FormatDefinition::parse(&text)?, def);
        Ok(())
    }

    #[test]
    fn test_parse_tolerates_whitespace() -> Result<()> {
        let def = FormatDefinition::parse(" A:Integer ; B : Long;;")?;
        assert_eq!(def.len(), 2);
        assert_eq!(def.field_type("B"), Some(FieldType::Long));
        Ok(())
    }

    #[test]
    fn test_parse_unknown_type() {
        let err = FormatDefinition::parse("A:Double;").unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaError(SchemaError::UnknownType(ref t)) if t == "Double"
        ));
    }

    #[test]
    fn test_parse_malformed_item() {
        let err = FormatDefinition::parse("A:Integer;B").unwrap_err();
        assert!(matches!(err, Error::SchemaError(SchemaError::MalformedItem(_))));
    }

    #[test]
    fn test_parse_duplicate_field() {
        let err = FormatDefinition::parse("A:Integer;A:Long;").unwrap_err();
        assert!(matches!(err, Error::SchemaError(SchemaError::DuplicateField(_))));
    }

    #[test]
    fn test_fixed_record_size() {
        let def = FormatDefinition::new()
            .with("A", FieldType::Long)
            .with("B", FieldType::Integer);
        assert_eq!(def.fixed_record_size(), Some(12));
        assert_eq!(sample_definition().fixed_record_size(), None);
    }

    #[test]
    fn test_encode_decode_all_types() -> Result<()> {
        let def = sample_definition();
        let values = vec![
            Value::Integer(-17),
            Value::Long(1 << 40),
            Value::Float(42.5),
            Value::String("read_001 ä".to_string()),
            Value::Character('+'),
            Value::Byte(7),
        ];

        let mut buf = Vec::new();
        let mut writer = SchemaWriter::new(&mut buf, &def);
        for ((name, _), value) in def.fields().iter().zip(values.iter()) {
            writer.write(name, value.clone())?;
        }
        writer.finish()?;

        let decoded = read_by_schema(&mut Cursor::new(&buf), &def)?;
        let decoded_values: Vec<Value> = decoded.values().cloned().collect();
        assert_eq!(decoded_values, values);
        Ok(())
    }
}
