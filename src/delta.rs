//! Field-wise delta compression of tab-separated lines
//!
//! Consecutive matches of one read usually share most SAM columns. A field of
//! the current line that is byte-identical to the same-position field of the
//! previous line is stored as the single marker byte [`DELTA_MARKER`]; every
//! other field is copied verbatim. There is no byte-level diff inside a field.
//!
//! A field that legitimately consists of a single `&` cannot be told apart from
//! the marker and inflates to the previous line's field.

use memchr::memchr;

/// Marker byte standing in for a field equal to the previous line's field
pub const DELTA_MARKER: u8 = b'&';

const TAB: u8 = b'\t';

/// Iterates the tab-delimited fields of a line
///
/// An empty line has one empty field, as does the position after a trailing tab.
fn fields(line: &[u8]) -> Fields<'_> {
    Fields {
        rest: Some(line),
    }
}

struct Fields<'a> {
    rest: Option<&'a [u8]>,
}
impl<'a> Iterator for Fields<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest?;
        if let Some(pos) = memchr(TAB, rest) {
            self.rest = Some(&rest[pos + 1..]);
            Some(&rest[..pos])
        } else {
            self.rest = None;
            Some(rest)
        }
    }
}

/// Compresses `current` relative to `previous`
///
/// # Examples
///
/// ```
/// let deflated = rma3::deflate(b"A\tB\tC", b"A\tX\tC");
/// assert_eq!(deflated, b"&\tX\t&");
/// ```
#[must_use]
pub fn deflate(previous: &[u8], current: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(current.len());
    deflate_into(previous, current, &mut out);
    out
}

/// Compresses `current` relative to `previous`, appending to `out`
pub fn deflate_into(previous: &[u8], current: &[u8], out: &mut Vec<u8>) {
    let mut prev_fields = fields(previous);
    for (i, field) in fields(current).enumerate() {
        if i > 0 {
            out.push(TAB);
        }
        match prev_fields.next() {
            Some(prev) if prev == field => out.push(DELTA_MARKER),
            _ => out.extend_from_slice(field),
        }
    }
}

/// Restores a line compressed by [`deflate`] against the same `previous` line
///
/// # Examples
///
/// ```
/// let inflated = rma3::inflate(b"A\tB\tC", b"&\tX\t&");
/// assert_eq!(inflated, b"A\tX\tC");
/// ```
#[must_use]
pub fn inflate(previous: &[u8], compressed: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(compressed.len() + previous.len());
    inflate_into(previous, compressed, &mut out);
    out
}

/// Restores a compressed line, appending to `out`
///
/// A marker at a position the previous line does not have is kept verbatim.
pub fn inflate_into(previous: &[u8], compressed: &[u8], out: &mut Vec<u8>) {
    let mut prev_fields = fields(previous);
    for (i, field) in fields(compressed).enumerate() {
        if i > 0 {
            out.push(TAB);
        }
        let prev = prev_fields.next();
        match prev {
            Some(prev) if field == [DELTA_MARKER] => out.extend_from_slice(prev),
            _ => out.extend_from_slice(field),
        }
    }
}

#[cfg(test)]
mod testing {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_field_iteration() {
        let collected: Vec<&[u8]> = fields(b"a\t\tbc\t").collect();
        assert_eq!(collected, [&b"a"[..], b"", b"bc", b""]);
        assert_eq!(fields(b"").count(), 1);
    }

    #[test]
    fn test_deflate_example() {
        assert_eq!(deflate(b"A\tB\tC", b"A\tX\tC"), b"&\tX\t&");
    }

    #[test]
    fn test_inflate_example() {
        assert_eq!(inflate(b"A\tB\tC", b"&\tX\t&"), b"A\tX\tC");
    }

    #[test]
    fn test_prefix_is_not_equal() {
        // a field that is a prefix of the previous field is copied verbatim
        assert_eq!(deflate(b"ACGT\t7", b"ACG\t7"), b"ACG\t&");
        assert_eq!(deflate(b"ACG\t7", b"ACGT\t7"), b"ACGT\t&");
    }

    #[test]
    fn test_different_field_counts() {
        assert_eq!(deflate(b"A\tB", b"A\tB\tC\tD"), b"&\t&\tC\tD");
        assert_eq!(deflate(b"A\tB\tC\tD", b"A\tB"), b"&\t&");
        assert_eq!(inflate(b"A\tB", b"&\t&\tC\tD"), b"A\tB\tC\tD");
    }

    #[test]
    fn test_marker_beyond_previous_is_kept() {
        assert_eq!(inflate(b"A", b"&\t&"), b"A\t&");
    }

    #[test]
    fn test_literal_marker_is_ambiguous() {
        // documented limitation: a literal '&' field does not survive a round trip
        let previous = b"r1\t0\tgi|12";
        let current = b"r1\t&\tgi|13";
        let deflated = deflate(previous, current);
        assert_eq!(deflated, b"&\t&\tgi|13");
        assert_ne!(inflate(previous, &deflated), current);
    }

    #[test]
    fn test_sam_like_roundtrip() {
        let previous = b"read_7\t0\tgi|1234|ref|NC_0001\t1045\t255\t100M\t*\t0\t0\tACGT\t*\tAS:i:180";
        let current = b"read_7\t0\tgi|9876|ref|NC_0002\t88\t255\t100M\t*\t0\t0\tACGT\t*\tAS:i:176";
        let deflated = deflate(previous, current);
        assert!(deflated.len() < current.len());
        assert_eq!(inflate(previous, &deflated), current);
    }

    fn random_line(rng: &mut SmallRng, alphabet: &[u8]) -> Vec<u8> {
        let n_fields = rng.random_range(1..8);
        let mut line = Vec::new();
        for i in 0..n_fields {
            if i > 0 {
                line.push(TAB);
            }
            let len = rng.random_range(0..4);
            for _ in 0..len {
                line.push(alphabet[rng.random_range(0..alphabet.len())]);
            }
            // ensure no field is literally the marker
            if line.ends_with(&[TAB, DELTA_MARKER]) || line == [DELTA_MARKER] {
                line.push(b'A');
            }
        }
        line
    }

    #[test]
    fn test_random_roundtrip() {
        let mut rng = SmallRng::seed_from_u64(42);
        let alphabet = b"AB&";
        for _ in 0..2000 {
            let previous = random_line(&mut rng, alphabet);
            let current = random_line(&mut rng, alphabet);
            let deflated = deflate(&previous, &current);
            assert_eq!(inflate(&previous, &deflated), current);
        }
    }
}
