use std::io::{Read, Write};

use indexmap::map::Iter;
use indexmap::IndexMap;

use crate::error::Result;
use crate::schema::{read_bytes, read_string, write_bytes, write_string};
use crate::sections::AuxFooter;

/// Named opaque blobs stored at the end of a container
///
/// Typical entries are viewer settings or sample attributes. Names are unique;
/// inserting an existing name replaces its bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxData {
    entries: IndexMap<String, Vec<u8>>,
}
impl AuxData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the bytes it replaced
    pub fn insert<N, B>(&mut self, name: N, bytes: B) -> Option<Vec<u8>>
    where
        N: Into<String>,
        B: Into<Vec<u8>>,
    {
        self.entries.insert(name.into(), bytes.into())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        self.entries.shift_remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> Iter<'_, String, Vec<u8>> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts all entries of `other`, its values winning on name collisions
    pub fn merge(&mut self, other: AuxData) {
        self.entries.extend(other.entries);
    }

    /// Writes the aux footer followed by the entries
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        AuxFooter::new(self.entries.len()).write_to(writer)?;
        for (name, bytes) in &self.entries {
            write_string(writer, name)?;
            write_bytes(writer, bytes)?;
        }
        Ok(())
    }

    /// Reads the aux footer and its entries
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let footer = AuxFooter::read_from(reader)?;
        let mut entries = IndexMap::with_capacity(footer.count.min(1 << 10));
        for _ in 0..footer.count {
            let name = read_string(reader)?;
            let bytes = read_bytes(reader)?;
            entries.insert(name, bytes);
        }
        Ok(Self { entries })
    }
}
impl<N: Into<String>, B: Into<Vec<u8>>> FromIterator<(N, B)> for AuxData {
    fn from_iter<T: IntoIterator<Item = (N, B)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, bytes)| (name.into(), bytes.into()))
                .collect(),
        }
    }
}
impl IntoIterator for AuxData {
    type Item = (String, Vec<u8>);
    type IntoIter = indexmap::map::IntoIter<String, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod testing {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_aux_roundtrip() -> Result<()> {
        let aux: AuxData = [("Sample", b"gut-1".to_vec()), ("Empty", Vec::new())]
            .into_iter()
            .collect();
        let mut buf = Vec::new();
        aux.write_to(&mut buf)?;
        let decoded = AuxData::read_from(&mut Cursor::new(&buf))?;
        assert_eq!(decoded, aux);
        assert_eq!(decoded.get("Sample"), Some(&b"gut-1"[..]));
        assert_eq!(decoded.get("Empty"), Some(&b""[..]));
        Ok(())
    }

    #[test]
    fn test_last_write_wins() {
        let mut aux = AuxData::new();
        assert_eq!(aux.insert("Label", "a"), None);
        assert_eq!(aux.insert("Label", "b"), Some(b"a".to_vec()));

        let mut other = AuxData::new();
        other.insert("Label", "c");
        other.insert("Other", "x");
        aux.merge(other);
        assert_eq!(aux.len(), 2);
        assert_eq!(aux.get("Label"), Some(&b"c"[..]));
        assert_eq!(aux.names().collect::<Vec<_>>(), ["Label", "Other"]);

        assert_eq!(aux.remove("Label"), Some(b"c".to_vec()));
        assert!(!aux.contains("Label"));
    }
}
