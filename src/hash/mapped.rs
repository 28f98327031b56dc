use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use memmap2::{Mmap, MmapMut};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::IntLookup;
use crate::error::{IndexError, Result};

/// The magic number for spilled integer array files
pub const ARRAY_MAGIC: &[u8; 8] = b"RMAINTAR";

/// Width of one array slot in bytes
const STRIDE: u64 = 4;

/// The header of an array file.
///
/// This is stored identically in memory and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
struct ArrayHeader {
    /// Magic number identifying the array format
    magic: [u8; 8],

    /// Width of one slot in bytes
    stride: u64,

    /// Number of slots
    len: u64,
}
impl ArrayHeader {
    fn new(len: u64) -> Self {
        Self {
            magic: *ARRAY_MAGIC,
            stride: STRIDE,
            len,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header: Self = bytemuck::pod_read_unaligned(bytes);
        if header.magic != *ARRAY_MAGIC || header.stride != STRIDE {
            return Err(IndexError::InvalidArrayMagic.into());
        }
        Ok(header)
    }
}

const SIZE_HEADER: u64 = size_of::<ArrayHeader>() as u64;

enum Backend {
    /// The whole file is memory mapped
    Mapped(Mmap),
    /// Memory mapping was unavailable, slots are read with positioned reads
    File(Mutex<File>),
}

/// An immutable int to int table stored as a fixed-stride array file
///
/// Slot `k` holds the value for key `k` as a little-endian `i32`; a value of 0
/// means absent. The file is memory-mapped when possible and read through a
/// file handle otherwise, so lookups never need the table in RAM.
///
/// The array is immutable once built, so concurrent lookups are safe.
pub struct MappedIntArray {
    backend: Backend,
    len: u64,
    path: PathBuf,
}
impl MappedIntArray {
    /// Writes an array file holding `entries` and opens it
    ///
    /// # Arguments
    ///
    /// * `path` - The file to create (truncated if it exists)
    /// * `len` - The number of slots; every key must be in `0..len`
    /// * `entries` - `(key, value)` pairs; later pairs win
    pub fn build<P, I>(path: P, len: u64, entries: I) -> Result<Self>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = (i32, i32)>,
    {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(SIZE_HEADER + len * STRIDE)?;
        file.write_all(ArrayHeader::new(len).as_bytes())?;

        // Safety: the file was just created by us and is not shared while mapped
        match unsafe { MmapMut::map_mut(&file) } {
            Ok(mut mmap) => {
                for (key, value) in entries {
                    let pos = slot_position(key, len)? as usize;
                    mmap[pos..pos + STRIDE as usize].copy_from_slice(&value.to_le_bytes());
                }
                mmap.flush()?;
            }
            Err(e) => {
                warn!(error = %e, "memory mapping unavailable, writing array file sequentially");
                for (key, value) in entries {
                    file.seek(SeekFrom::Start(slot_position(key, len)?))?;
                    file.write_all(&value.to_le_bytes())?;
                }
                file.flush()?;
            }
        }
        debug!(path = %path.display(), len, "built array file");
        Self::open(path)
    }

    /// Opens an existing array file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let mut header_buf = [0u8; SIZE_HEADER as usize];
        file.read_exact(&mut header_buf)?;
        let header = ArrayHeader::from_bytes(&header_buf)?;

        let actual = file.metadata()?.len().saturating_sub(SIZE_HEADER);
        let expected = header.len * STRIDE;
        if actual != expected {
            return Err(IndexError::ArraySizeMismatch { expected, actual }.into());
        }

        // Safety: the array is immutable after construction
        let backend = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => Backend::Mapped(mmap),
            Err(e) => {
                warn!(error = %e, "memory mapping unavailable, falling back to file reads");
                Backend::File(Mutex::new(file))
            }
        };
        Ok(Self {
            backend,
            len: header.len,
            path: path.to_path_buf(),
        })
    }

    /// Returns the number of slots
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns whether lookups go through a memory map
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        matches!(self.backend, Backend::Mapped(_))
    }

    /// Returns the value for `key`, or 0 if the key is out of range or absent
    pub fn get(&self, key: i32) -> Result<i32> {
        if key < 0 || key as u64 >= self.len {
            return Ok(0);
        }
        let pos = SIZE_HEADER + key as u64 * STRIDE;
        let mut buf = [0u8; STRIDE as usize];
        match &self.backend {
            Backend::Mapped(mmap) => {
                let pos = pos as usize;
                buf.copy_from_slice(&mmap[pos..pos + STRIDE as usize]);
            }
            Backend::File(file) => {
                let mut file = file.lock();
                file.seek(SeekFrom::Start(pos))?;
                file.read_exact(&mut buf)?;
            }
        }
        Ok(i32::from_le_bytes(buf))
    }
}
impl IntLookup for MappedIntArray {
    fn lookup(&self, key: i32) -> i32 {
        match self.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "array file lookup failed");
                0
            }
        }
    }
}

fn slot_position(key: i32, len: u64) -> Result<u64> {
    if key < 0 || key as u64 >= len {
        return Err(IndexError::KeyOutOfRange {
            key: i64::from(key),
            len,
        }
        .into());
    }
    Ok(SIZE_HEADER + key as u64 * STRIDE)
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::Error;

    #[test]
    fn test_build_and_lookup() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("gi2tax.bin");
        let array = MappedIntArray::build(&path, 100, [(1, 562), (99, 9606), (50, 2)])?;
        assert_eq!(array.len(), 100);
        assert_eq!(array.get(1)?, 562);
        assert_eq!(array.get(99)?, 9606);
        assert_eq!(array.get(50)?, 2);
        assert_eq!(array.get(2)?, 0);
        assert_eq!(array.get(100)?, 0);
        assert_eq!(array.get(-3)?, 0);
        assert_eq!(array.lookup(99), 9606);
        Ok(())
    }

    #[test]
    fn test_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("acc.bin");
        drop(MappedIntArray::build(&path, 10, [(3, 33)])?);
        let array = MappedIntArray::open(&path)?;
        assert!(array.is_mapped());
        assert_eq!(array.get(3)?, 33);
        assert_eq!(array.path(), path.as_path());
        Ok(())
    }

    #[test]
    fn test_key_out_of_range_on_build() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let err = MappedIntArray::build(dir.path().join("x.bin"), 4, [(4, 1)])
            .err()
            .expect("key 4 does not fit into 4 slots");
        assert!(matches!(
            err,
            Error::IndexError(IndexError::KeyOutOfRange { key: 4, len: 4 })
        ));
        Ok(())
    }

    #[test]
    fn test_bad_magic() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.bin");
        std::fs::write(&path, [0u8; 40])?;
        let err = MappedIntArray::open(&path).err().expect("magic is zeroed");
        assert!(matches!(err, Error::IndexError(IndexError::InvalidArrayMagic)));
        Ok(())
    }

    #[test]
    fn test_truncated_array() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("short.bin");
        let mut bytes = ArrayHeader::new(10).as_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        std::fs::write(&path, bytes)?;
        let err = MappedIntArray::open(&path).err().expect("file is short");
        assert!(matches!(
            err,
            Error::IndexError(IndexError::ArraySizeMismatch {
                expected: 40,
                actual: 8
            })
        ));
        Ok(())
    }
}
