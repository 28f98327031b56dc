use parking_lot::Mutex;

use super::IntLookup;

/// Slot marker for an empty bucket
const EMPTY: i32 = 0;

/// Smallest table size
const MIN_CAPACITY: usize = 16;

/// Scrambles a key so that consecutive ids spread over the table
#[inline]
fn mix(key: i32) -> u32 {
    let mut h = key as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// An open-addressing int to int hash map with linear probing
///
/// Removal shifts displaced entries back towards their ideal bucket instead of
/// leaving tombstones, so lookups never probe past deleted entries.
///
/// `get` returns 0 for absent keys. Key 0 cannot live in the table (it marks
/// empty buckets) and is kept in a dedicated slot.
#[derive(Clone, Debug)]
pub struct IntHashIndex {
    keys: Vec<i32>,
    values: Vec<i32>,
    /// Number of occupied buckets
    len: usize,
    /// Value stored for key 0, if any
    zero: Option<i32>,
}
impl Default for IntHashIndex {
    fn default() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }
}
impl IntHashIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map that can hold `capacity` entries without growing
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let buckets = (capacity.saturating_mul(2))
            .max(MIN_CAPACITY)
            .next_power_of_two();
        Self {
            keys: vec![EMPTY; buckets],
            values: vec![0; buckets],
            len: 0,
            zero: None,
        }
    }

    #[inline]
    fn mask(&self) -> usize {
        self.keys.len() - 1
    }

    #[inline]
    fn ideal(&self, key: i32) -> usize {
        mix(key) as usize & self.mask()
    }

    /// Returns the bucket holding `key` or the empty bucket ending its probe run
    fn probe(&self, key: i32) -> (usize, bool) {
        let mut pos = self.ideal(key);
        loop {
            match self.keys[pos] {
                EMPTY => return (pos, false),
                k if k == key => return (pos, true),
                _ => pos = (pos + 1) & self.mask(),
            }
        }
    }

    /// Returns the number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.len + usize::from(self.zero.is_some())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of buckets
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    /// Returns the value mapped to `key`, or 0 if there is none
    #[must_use]
    pub fn get(&self, key: i32) -> i32 {
        if key == EMPTY {
            return self.zero.unwrap_or(0);
        }
        match self.probe(key) {
            (pos, true) => self.values[pos],
            _ => 0,
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: i32) -> bool {
        if key == EMPTY {
            return self.zero.is_some();
        }
        self.probe(key).1
    }

    /// Maps `key` to `value`, returning the previous value or 0
    pub fn put(&mut self, key: i32, value: i32) -> i32 {
        if key == EMPTY {
            return self.zero.replace(value).unwrap_or(0);
        }
        if (self.len + 1) * 4 > self.capacity() * 3 {
            self.grow();
        }
        let (pos, found) = self.probe(key);
        if found {
            std::mem::replace(&mut self.values[pos], value)
        } else {
            self.keys[pos] = key;
            self.values[pos] = value;
            self.len += 1;
            0
        }
    }

    /// Removes `key`, returning its value or 0
    pub fn remove(&mut self, key: i32) -> i32 {
        if key == EMPTY {
            return self.zero.take().unwrap_or(0);
        }
        let (mut hole, found) = self.probe(key);
        if !found {
            return 0;
        }
        let removed = self.values[hole];
        let mask = self.mask();

        // shift later members of the probe run back into the hole
        let mut next = hole;
        loop {
            next = (next + 1) & mask;
            let candidate = self.keys[next];
            if candidate == EMPTY {
                break;
            }
            let ideal = self.ideal(candidate);
            // the candidate stays if its ideal bucket lies cyclically in (hole, next]
            let stays = if hole <= next {
                hole < ideal && ideal <= next
            } else {
                hole < ideal || ideal <= next
            };
            if stays {
                continue;
            }
            self.keys[hole] = candidate;
            self.values[hole] = self.values[next];
            hole = next;
        }
        self.keys[hole] = EMPTY;
        self.values[hole] = 0;
        self.len -= 1;
        removed
    }

    /// Removes all entries, keeping the allocated buckets
    pub fn clear(&mut self) {
        self.keys.fill(EMPTY);
        self.values.fill(0);
        self.len = 0;
        self.zero = None;
    }

    /// Iterates all `(key, value)` entries in bucket order
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.zero.map(|v| (0, v)).into_iter().chain(
            self.keys
                .iter()
                .zip(self.values.iter())
                .filter(|(k, _)| **k != EMPTY)
                .map(|(k, v)| (*k, *v)),
        )
    }

    /// Returns the largest key, if any
    #[must_use]
    pub fn max_key(&self) -> Option<i32> {
        self.iter().map(|(k, _)| k).max()
    }

    fn grow(&mut self) {
        let new_capacity = self.capacity() * 2;
        let keys = std::mem::replace(&mut self.keys, vec![EMPTY; new_capacity]);
        let values = std::mem::replace(&mut self.values, vec![0; new_capacity]);
        self.len = 0;
        for (key, value) in keys.into_iter().zip(values) {
            if key != EMPTY {
                let (pos, _) = self.probe(key);
                self.keys[pos] = key;
                self.values[pos] = value;
                self.len += 1;
            }
        }
    }
}
impl FromIterator<(i32, i32)> for IntHashIndex {
    fn from_iter<T: IntoIterator<Item = (i32, i32)>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let mut map = Self::with_capacity(iter.size_hint().0);
        for (key, value) in iter {
            map.put(key, value);
        }
        map
    }
}
impl IntLookup for IntHashIndex {
    fn lookup(&self, key: i32) -> i32 {
        self.get(key)
    }
}

/// An [`IntHashIndex`] shared between lookup call sites
///
/// Every operation takes the lock for exactly one get/put unit; use
/// [`SharedIntHashIndex::get_or_insert_with`] when a lookup and the insert of
/// a computed value must be atomic.
#[derive(Debug, Default)]
pub struct SharedIntHashIndex {
    inner: Mutex<IntHashIndex>,
}
impl SharedIntHashIndex {
    #[must_use]
    pub fn new(index: IntHashIndex) -> Self {
        Self {
            inner: Mutex::new(index),
        }
    }

    #[must_use]
    pub fn get(&self, key: i32) -> i32 {
        self.inner.lock().get(key)
    }

    pub fn put(&self, key: i32, value: i32) -> i32 {
        self.inner.lock().put(key, value)
    }

    pub fn remove(&self, key: i32) -> i32 {
        self.inner.lock().remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Returns the cached value for `key`, computing and caching it if absent
    ///
    /// The lock is held while `compute` runs, so concurrent callers never
    /// compute the same key twice. A computed 0 is not cached.
    pub fn get_or_insert_with<F: FnOnce() -> i32>(&self, key: i32, compute: F) -> i32 {
        let mut guard = self.inner.lock();
        if guard.contains_key(key) {
            return guard.get(key);
        }
        let value = compute();
        if value != 0 {
            guard.put(key, value);
        }
        value
    }

    /// Consumes the wrapper and returns the map
    #[must_use]
    pub fn into_inner(self) -> IntHashIndex {
        self.inner.into_inner()
    }
}
impl IntLookup for SharedIntHashIndex {
    fn lookup(&self, key: i32) -> i32 {
        self.get(key)
    }
}
