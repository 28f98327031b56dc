use std::error::Error as StdError;
use std::path::PathBuf;

use crate::companion::CompanionKind;

/// Custom Result type for rma3 operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the rma3 library, encompassing all possible error cases
/// that can occur while writing, reading, or modifying a container.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Errors related to the physical layout of a container (fatal)
    #[error("Error processing format: {0}")]
    FormatError(#[from] FormatError),

    /// Errors raised when a record is written against its declared schema (fatal)
    #[error("Error processing schema: {0}")]
    SchemaError(#[from] SchemaError),

    /// Errors resolving external FASTA/SAM files (recoverable)
    #[error("Error resolving companion file: {0}")]
    CompanionError(#[from] CompanionError),

    /// Errors building or reading integer lookup tables
    #[error("Error processing index: {0}")]
    IndexError(#[from] IndexError),

    /// A long-running scan was aborted through its cancellation flag
    #[error("Operation canceled")]
    Canceled,

    /// An update failed after truncating the file and has to be retried first
    #[error("An update was interrupted after truncating the container and must be retried")]
    Interrupted,

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    IoError(#[from] std::io::Error),

    /// UTF-8 conversion errors
    #[error("Error with UTF8: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// Errors opening (possibly compressed) mapping files
    #[error("Error opening mapping file: {0}")]
    NifflerError(#[from] niffler::Error),

    /// Errors parsing FASTA companion records
    #[error("Error parsing FASTA: {0}")]
    FastaError(#[from] seq_io::fasta::Error),

    /// Conversion errors from anyhow errors
    #[error("Generic error: {0}")]
    AnyhowError(#[from] anyhow::Error),

    /// Generic errors for other unexpected situations
    #[error("Generic error: {0}")]
    GenericError(#[from] Box<dyn StdError + Send + Sync>),
}
impl Error {
    /// Checks if the error only affects a companion file and can be fixed by relocating it
    ///
    /// The container stays usable for everything except the text payloads
    /// stored in the missing file.
    #[must_use]
    pub fn needs_relocation(&self) -> bool {
        matches!(self, Self::CompanionError(_))
    }

    /// Checks if the error is a cancellation
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// Errors specific to the physical layout of a container
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    /// The magic number in the header does not match the expected value
    #[error("Invalid magic number: {0:#x}")]
    InvalidMagicNumber(i32),

    /// The format version in the header is not supported
    #[error("Invalid format version: {0} - expecting {expected}", expected = crate::FILE_VERSION)]
    InvalidFormatVersion(i32),

    /// The file is too short to contain a header and a footer pointer
    #[error("File is truncated: {0} bytes is too short for a container")]
    Truncated(u64),

    /// An offset stored in the container points outside of the file
    #[error("Offset {offset} for {section} is out of bounds (file length {file_len})")]
    OffsetOutOfBounds {
        section: &'static str,
        offset: u64,
        file_len: u64,
    },

    /// A region that every container has is marked absent
    #[error("Required region {0} is absent")]
    MissingRegion(&'static str),

    /// The region offsets in the footer are not monotonic
    #[error("Region offsets are not ordered: {0}")]
    UnorderedRegions(String),

    /// A length prefix was negative or larger than the remaining bytes
    #[error("Invalid length prefix {0} at position {1}")]
    InvalidLength(i64, u64),

    /// A record claimed a type that its reader does not support
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// A UTF-16 code unit could not be decoded into a char
    #[error("Invalid character code unit: {0:#x}")]
    InvalidCharacter(u16),
}

/// Errors raised by the self-describing schema writer and parser
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    /// A field was written in the wrong position
    #[error("Expected field '{expected}' at position {position}, got '{got}'")]
    OutOfOrder {
        position: usize,
        expected: String,
        got: String,
    },

    /// A value did not match the declared type of its field
    #[error("Field '{field}' is declared as {expected} but got {got}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        got: &'static str,
    },

    /// A value was written after all declared fields
    #[error("Field '{0}' written after all declared fields")]
    TooManyFields(String),

    /// The writer was finished before all declared fields were written
    #[error("Record finished after {written} of {declared} fields")]
    Incomplete { written: usize, declared: usize },

    /// A definition string referenced an unknown type name
    #[error("Unknown field type '{0}'")]
    UnknownType(String),

    /// A definition item did not follow the `Name:Type` form
    #[error("Malformed definition item '{0}'")]
    MalformedItem(String),

    /// A definition string declared the same field twice
    #[error("Duplicate field '{0}'")]
    DuplicateField(String),

    /// A required field was absent from a decoded record
    #[error("Missing required field '{0}'")]
    MissingField(String),
}

/// Errors resolving the external files referenced by a container
#[derive(thiserror::Error, Debug)]
pub enum CompanionError {
    /// The container does not record a companion of this kind
    #[error("No {0} file is associated with this container")]
    NotAssociated(CompanionKind),

    /// The recorded companion file could not be found and no locator resolved it
    #[error("{kind} file not found: {path} - it must be relocated")]
    NotFound { kind: CompanionKind, path: PathBuf },

    /// The companion exists but its size differs from the recorded size
    #[error("{kind} file {path} has size {actual}, expected {expected} - it must be relocated")]
    SizeMismatch {
        kind: CompanionKind,
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// No record could be decoded at the stored offset
    #[error("No {kind} record at offset {offset} in {path}")]
    MissingRecord {
        kind: CompanionKind,
        path: PathBuf,
        offset: u64,
    },
}

/// Errors related to integer lookup tables
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// More lines of a mapping file were malformed than well-formed
    #[error("Mapping input looks corrupted: {skipped} malformed lines vs {parsed} parsed lines")]
    CorruptedMapping { skipped: usize, parsed: usize },

    /// The array file header has an unexpected magic number
    #[error("Invalid array file magic")]
    InvalidArrayMagic,

    /// The array file length disagrees with its header
    #[error("Array file holds {actual} bytes of values, header claims {expected}")]
    ArraySizeMismatch { expected: u64, actual: u64 },

    /// A key outside of the array's range was written
    #[error("Key {key} is outside of the array range 0..{len}")]
    KeyOutOfRange { key: i64, len: u64 },

    /// Key 0 is reserved as the absent marker
    #[error("Key 0 is reserved")]
    ReservedKey,
}

/// Trait for converting arbitrary errors into `Error`
pub trait IntoRmaError {
    fn into_rma_error(self) -> Error;
}

impl<E> IntoRmaError for E
where
    E: StdError + Send + Sync + 'static,
{
    fn into_rma_error(self) -> Error {
        Error::GenericError(Box::new(self))
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum MyError {
        #[error("Custom error: {0}")]
        CustomError(String),
    }

    #[test]
    fn test_into_rma_error() {
        let my_error = MyError::CustomError(String::from("some error"));
        let rma_error = my_error.into_rma_error();
        assert!(matches!(rma_error, Error::GenericError(_)));
    }

    #[test]
    fn test_needs_relocation() {
        let error: Error = CompanionError::NotFound {
            kind: CompanionKind::Alignments,
            path: PathBuf::from("/data/missing.sam"),
        }
        .into();
        assert!(error.needs_relocation());
        assert!(format!("{error}").contains("missing.sam"));

        let error: Error = FormatError::InvalidMagicNumber(0x1234).into();
        assert!(!error.needs_relocation());
    }

    #[test]
    fn test_is_canceled() {
        assert!(Error::Canceled.is_canceled());
        assert!(!Error::Interrupted.is_canceled());
        assert!(!Error::from(FormatError::Truncated(4)).is_canceled());
    }

    #[test]
    fn test_format_error_messages() {
        let error = FormatError::InvalidFormatVersion(2);
        let error_str = format!("{error}");
        assert!(error_str.contains('2'));
        assert!(error_str.contains('3'));

        let error = FormatError::OffsetOutOfBounds {
            section: "footer",
            offset: 5000,
            file_len: 100,
        };
        let error_str = format!("{error}");
        assert!(error_str.contains("5000"));
        assert!(error_str.contains("footer"));
    }

    #[test]
    fn test_schema_error_messages() {
        let error = SchemaError::OutOfOrder {
            position: 1,
            expected: "ReadLength".to_string(),
            got: "NumMatches".to_string(),
        };
        let error_str = format!("{error}");
        assert!(error_str.contains("ReadLength"));
        assert!(error_str.contains("NumMatches"));

        let error = SchemaError::Incomplete {
            written: 2,
            declared: 5,
        };
        assert!(format!("{error}").contains("2 of 5"));
    }

    #[test]
    fn test_index_error_messages() {
        let error = IndexError::CorruptedMapping {
            skipped: 10,
            parsed: 3,
        };
        let error_str = format!("{error}");
        assert!(error_str.contains("10"));
        assert!(error_str.contains('3'));
    }

    #[test]
    fn test_error_from_conversions() {
        let error: Error = SchemaError::UnknownType("Double".into()).into();
        assert!(matches!(error, Error::SchemaError(_)));

        let error: Error = IndexError::ReservedKey.into();
        assert!(matches!(error, Error::IndexError(_)));

        let error: Error = anyhow::anyhow!("locator failed").into();
        assert!(matches!(error, Error::AnyhowError(_)));
    }
}
