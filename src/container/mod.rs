//! Container orchestration
//!
//! A container is written once by a [`ContainerWriter`], opened read-only as a
//! [`Container`], and reclassified in place by a [`Modifier`]. Everything after
//! the matches region (the classification section, the aux section, the footer
//! and the footer pointer) is a suffix that can be regenerated without touching
//! the header or any read.

mod aux;
mod getter;
mod modifier;
mod reader;
mod writer;

use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};
use tracing::debug;

pub use aux::AuxData;
pub use getter::{ReadBlockGetter, ReadBlockIterator, ReadsForClassIterator};
pub use modifier::Modifier;
pub use reader::Container;
pub use writer::{ContainerWriter, ContainerWriterBuilder};

use crate::classification::Classifications;
use crate::error::Result;
use crate::sections::{ClassificationsFooter, FileFooter};
use crate::CancelFlag;

/// A writer that tracks the absolute file position of the bytes it writes
pub(crate) struct PositionWriter<W: Write> {
    inner: W,
    position: u64,
}
impl<W: Write> PositionWriter<W> {
    /// Wraps a writer whose next byte lands at `position`
    pub fn new(inner: W, position: u64) -> Self {
        Self { inner, position }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
impl<W: Write> Write for PositionWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writes the classification section, the aux section, the footer and the pointer
///
/// The region offsets of `footer` are updated as the sections are written.
pub(crate) fn write_suffix<W: Write>(
    writer: &mut PositionWriter<W>,
    footer: &mut FileFooter,
    classifications: &Classifications,
    aux: &AuxData,
    cancel: Option<&CancelFlag>,
) -> Result<()> {
    write_classifications(writer, footer, classifications, cancel)?;
    write_aux_and_footer(writer, footer, aux)
}

/// Writes the classifications footer followed by one block per classification
///
/// The footer precedes the blocks. Its length depends only on which
/// classifications are present, so the block ranges are computed up front.
fn write_classifications<W: Write>(
    writer: &mut PositionWriter<W>,
    footer: &mut FileFooter,
    classifications: &Classifications,
    cancel: Option<&CancelFlag>,
) -> Result<()> {
    footer.classifications_start = writer.position();

    let mut section = ClassificationsFooter::new();
    for ctype in classifications.types() {
        section.set(ctype, 0, 0);
    }
    let mut offset = footer.classifications_start + section.encoded_len();
    for (ctype, block) in classifications.iter() {
        let end = offset + block.encoded_len();
        section.set(*ctype, offset, end);
        offset = end;
    }
    section.write_to(writer)?;

    for (ctype, block) in classifications.iter() {
        block.write_to(writer, cancel)?;
        debug!(classification = %ctype, classes = block.len(), "wrote classification block");
    }
    footer.end_classifications = writer.position();
    debug_assert_eq!(footer.end_classifications, offset);
    Ok(())
}

/// Writes the aux section, the footer and the footer pointer
pub(crate) fn write_aux_and_footer<W: Write>(
    writer: &mut PositionWriter<W>,
    footer: &mut FileFooter,
    aux: &AuxData,
) -> Result<()> {
    footer.aux_start = writer.position();
    aux.write_to(writer)?;
    footer.end_aux = writer.position();
    write_footer(writer, footer)
}

/// Writes the footer at the current position followed by the footer pointer
pub(crate) fn write_footer<W: Write>(
    writer: &mut PositionWriter<W>,
    footer: &FileFooter,
) -> Result<()> {
    let footer_offset = writer.position();
    footer.write_to(writer)?;
    writer.write_i64::<BigEndian>(footer_offset as i64)?;
    writer.flush()?;
    Ok(())
}
