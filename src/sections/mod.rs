//! Section records
//!
//! Every section record is stored as its own definition string followed by the
//! values that definition declares. Readers decode whatever definition the file
//! carries: fields missing from an older file fall back to their defaults and
//! unknown fields are ignored.

mod aux;
mod classifications;
mod footer;
mod header;
mod match_footer;

use std::io::{Read, Write};

pub use aux::AuxFooter;
pub use classifications::ClassificationsFooter;
pub use footer::{FileFooter, Provenance};
pub use header::FileHeader;
pub use match_footer::MatchFooter;

use crate::error::{FormatError, Result};
use crate::schema::{
    read_by_schema, read_string, write_string, FieldValues, FormatDefinition, SchemaWriter,
};

/// Writes a definition string followed by the values emitted by `fill`
///
/// `fill` must write every declared field in order.
fn write_section<W, F>(writer: &mut W, definition: &FormatDefinition, fill: F) -> Result<()>
where
    W: Write,
    F: FnOnce(&mut SchemaWriter<'_, W>) -> Result<()>,
{
    write_string(writer, &definition.to_string())?;
    let mut values = SchemaWriter::new(writer, definition);
    fill(&mut values)?;
    values.finish()
}

/// Reads a definition string and the values it declares
fn read_section<R: Read>(reader: &mut R) -> Result<FieldValues> {
    let definition = FormatDefinition::parse(&read_string(reader)?)?;
    read_by_schema(reader, &definition)
}

/// Reads an unsigned offset or count stored as a Long, 0 if absent
fn get_u64(values: &FieldValues, name: &str) -> u64 {
    values.get_long(name).map_or(0, |v| v.max(0) as u64)
}

/// Reads an offset the record cannot do without
///
/// Fails if the field is missing or negative.
fn require_u64(values: &FieldValues, name: &str) -> Result<u64> {
    let value = values.require_long(name)?;
    u64::try_from(value).map_err(|_| {
        FormatError::MalformedRecord(format!("{name} is negative ({value})")).into()
    })
}

fn get_string(values: &FieldValues, name: &str) -> String {
    values.get_string(name).unwrap_or_default().to_string()
}
