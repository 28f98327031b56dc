use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{FormatError, Result};

/// Writes a string as an Int32 byte length followed by its UTF-8 bytes
pub(crate) fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    write_bytes(writer, value.as_bytes())
}

/// Writes a byte slice as an Int32 length followed by the bytes
pub(crate) fn write_bytes<W: Write>(writer: &mut W, value: &[u8]) -> Result<()> {
    let len = i32::try_from(value.len())
        .map_err(|_| FormatError::InvalidLength(value.len() as i64, 0))?;
    writer.write_i32::<BigEndian>(len)?;
    writer.write_all(value)?;
    Ok(())
}

/// Reads a length-prefixed UTF-8 string
pub(crate) fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let bytes = read_bytes(reader)?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => Err(e.utf8_error().into()),
    }
}

/// Reads an Int32 length followed by that many bytes
pub(crate) fn read_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = reader.read_i32::<BigEndian>()?;
    if len < 0 {
        return Err(FormatError::InvalidLength(i64::from(len), 0).into());
    }
    let mut buf = Vec::new();
    reader.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len as usize {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "length-prefixed value runs past the end of the input",
        )
        .into());
    }
    Ok(buf)
}

/// Writes a char as a single UTF-16 code unit
pub(crate) fn write_char<W: Write>(writer: &mut W, value: char) -> Result<()> {
    let code = u16::try_from(u32::from(value)).map_err(|_| {
        FormatError::MalformedRecord(format!("character {value:?} needs more than one code unit"))
    })?;
    writer.write_u16::<BigEndian>(code)?;
    Ok(())
}

/// Reads a single UTF-16 code unit as a char
pub(crate) fn read_char<R: Read>(reader: &mut R) -> Result<char> {
    let code = reader.read_u16::<BigEndian>()?;
    char::from_u32(u32::from(code)).ok_or_else(|| FormatError::InvalidCharacter(code).into())
}
