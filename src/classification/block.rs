use std::collections::btree_map;
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{FormatError, Result};
use crate::{CancelFlag, RecordId};

/// Size of a class entry's fixed part: class id and count
const SIZE_CLASS_ENTRY: u64 = 8;

/// Size of one stored read offset
const SIZE_OFFSET: u64 = 8;

/// The assignment of reads to classes for one classification
///
/// On disk a block is stored as
///
/// ```text
/// NumClasses:Int32, (ClassId:Int32, Count:Int32, Offset:Int64 * Count)*
/// ```
///
/// with classes in ascending class-id order and `Count == len(offsets)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationBlock {
    classes: BTreeMap<i32, Vec<RecordId>>,
}
impl ClassificationBlock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a read to a class
    pub fn insert(&mut self, class_id: i32, uid: RecordId) {
        self.classes.entry(class_id).or_default().push(uid);
    }

    /// Assigns several reads to a class
    pub fn extend<I: IntoIterator<Item = RecordId>>(&mut self, class_id: i32, uids: I) {
        self.classes.entry(class_id).or_default().extend(uids);
    }

    /// Returns the reads assigned to a class
    #[must_use]
    pub fn get(&self, class_id: i32) -> Option<&[RecordId]> {
        self.classes.get(&class_id).map(Vec::as_slice)
    }

    /// Returns the number of reads assigned to a class
    #[must_use]
    pub fn count(&self, class_id: i32) -> usize {
        self.classes.get(&class_id).map_or(0, Vec::len)
    }

    /// Returns the class ids in ascending order
    pub fn class_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.classes.keys().copied()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, i32, Vec<RecordId>> {
        self.classes.iter()
    }

    /// Returns the number of classes
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Sorts the reads of every class and removes duplicate assignments
    pub fn normalize(&mut self) {
        for uids in self.classes.values_mut() {
            uids.sort_unstable();
            uids.dedup();
        }
    }

    /// Returns the number of bytes [`ClassificationBlock::write_to`] produces
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        4 + self
            .classes
            .values()
            .map(|uids| SIZE_CLASS_ENTRY + SIZE_OFFSET * uids.len() as u64)
            .sum::<u64>()
    }

    /// Writes the block, polling `cancel` once per class
    ///
    /// # Returns
    ///
    /// The number of bytes written, always equal to [`ClassificationBlock::encoded_len`]
    pub fn write_to<W: Write>(&self, writer: &mut W, cancel: Option<&CancelFlag>) -> Result<u64> {
        writer.write_i32::<BigEndian>(count_i32(self.classes.len())?)?;
        for (class_id, uids) in &self.classes {
            if let Some(cancel) = cancel {
                cancel.check()?;
            }
            writer.write_i32::<BigEndian>(*class_id)?;
            writer.write_i32::<BigEndian>(count_i32(uids.len())?)?;
            for uid in uids {
                writer.write_i64::<BigEndian>(uid.offset() as i64)?;
            }
        }
        Ok(self.encoded_len())
    }

    /// Reads a whole block including all offsets
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let num_classes = read_len(reader)?;
        let mut classes = BTreeMap::new();
        for _ in 0..num_classes {
            let class_id = reader.read_i32::<BigEndian>()?;
            let count = read_len(reader)?;
            let mut uids = Vec::with_capacity(count.min(1 << 16));
            for _ in 0..count {
                uids.push(read_offset(reader)?);
            }
            classes.insert(class_id, uids);
        }
        Ok(Self { classes })
    }
}
impl FromIterator<(i32, RecordId)> for ClassificationBlock {
    fn from_iter<T: IntoIterator<Item = (i32, RecordId)>>(iter: T) -> Self {
        let mut block = Self::new();
        for (class_id, uid) in iter {
            block.insert(class_id, uid);
        }
        block
    }
}
impl From<BTreeMap<i32, Vec<RecordId>>> for ClassificationBlock {
    fn from(classes: BTreeMap<i32, Vec<RecordId>>) -> Self {
        Self { classes }
    }
}

fn count_i32(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| FormatError::InvalidLength(len as i64, 0).into())
}

fn read_len<R: Read>(reader: &mut R) -> Result<usize> {
    let len = reader.read_i32::<BigEndian>()?;
    if len < 0 {
        return Err(FormatError::InvalidLength(i64::from(len), 0).into());
    }
    Ok(len as usize)
}

fn read_offset<R: Read>(reader: &mut R) -> Result<RecordId> {
    let offset = reader.read_i64::<BigEndian>()?;
    if offset < 0 {
        return Err(FormatError::MalformedRecord(format!("negative read offset {offset}")).into());
    }
    Ok(RecordId::new(offset as u64))
}

fn skip_offsets<R: Seek>(reader: &mut R, count: usize) -> Result<()> {
    reader.seek(SeekFrom::Current((count as u64 * SIZE_OFFSET) as i64))?;
    Ok(())
}

/// Reads the class id to count map of a block, skipping all offsets
///
/// The reader must be positioned at the start of the block.
pub(crate) fn read_counts<R: Read + Seek>(reader: &mut R) -> Result<BTreeMap<i32, usize>> {
    let num_classes = read_len(reader)?;
    let mut counts = BTreeMap::new();
    for _ in 0..num_classes {
        let class_id = reader.read_i32::<BigEndian>()?;
        let count = read_len(reader)?;
        skip_offsets(reader, count)?;
        counts.insert(class_id, count);
    }
    Ok(counts)
}

/// Returns the number of reads assigned to one class, or 0
///
/// The reader must be positioned at the start of the block.
pub(crate) fn read_count<R: Read + Seek>(reader: &mut R, class_id: i32) -> Result<usize> {
    let num_classes = read_len(reader)?;
    for _ in 0..num_classes {
        let id = reader.read_i32::<BigEndian>()?;
        let count = read_len(reader)?;
        if id == class_id {
            return Ok(count);
        }
        skip_offsets(reader, count)?;
    }
    Ok(0)
}

/// Appends the offsets of the reads assigned to one class to `offsets`
///
/// The reader must be positioned at the start of the block.
///
/// # Returns
///
/// The number of offsets appended
pub(crate) fn read_offsets<R: Read + Seek>(
    reader: &mut R,
    class_id: i32,
    offsets: &mut Vec<RecordId>,
) -> Result<usize> {
    let num_classes = read_len(reader)?;
    for _ in 0..num_classes {
        let id = reader.read_i32::<BigEndian>()?;
        let count = read_len(reader)?;
        if id == class_id {
            offsets.reserve(count);
            for _ in 0..count {
                offsets.push(read_offset(reader)?);
            }
            return Ok(count);
        }
        skip_offsets(reader, count)?;
    }
    Ok(0)
}
