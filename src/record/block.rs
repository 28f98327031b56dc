use super::{Payload, RecordId};
use crate::classification::ClassificationType;

/// A read as handed to the container writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadInput {
    pub length: i32,
    pub weight: i32,
    /// The read text (header line and sequence) or its offset in the FASTA companion
    pub payload: Payload,
}
impl ReadInput {
    #[must_use]
    pub fn new(length: i32, payload: Payload) -> Self {
        Self {
            length,
            weight: 1,
            payload,
        }
    }

    /// Creates an embedded read from its header and sequence
    #[must_use]
    pub fn embedded(header: &str, sequence: &str) -> Self {
        Self::new(
            sequence.len() as i32,
            Payload::Embedded(format!(">{header}\n{sequence}")),
        )
    }

    #[must_use]
    pub fn weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }
}

/// A match as handed to the container writer
///
/// Embedded text is the full alignment line; the writer delta-compresses it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchInput {
    pub bit_score: f32,
    pub expected: f32,
    pub percent_identity: i32,
    pub class_ids: [i32; 5],
    pub payload: Payload,
}
impl MatchInput {
    #[must_use]
    pub fn new(bit_score: f32, expected: f32, percent_identity: i32, payload: Payload) -> Self {
        Self {
            bit_score,
            expected,
            percent_identity,
            class_ids: [0; 5],
            payload,
        }
    }

    /// Assigns the match to a class of a classification
    #[must_use]
    pub fn with_class_id(mut self, ctype: ClassificationType, class_id: i32) -> Self {
        self.class_ids[ctype.index()] = class_id;
        self
    }
}

/// A match of an assembled read
#[derive(Debug, Clone, PartialEq)]
pub struct MatchBlock {
    pub bit_score: f32,
    pub expected: f32,
    pub percent_identity: i32,
    pub class_ids: [i32; 5],
    /// The full alignment text, `None` if text resolution was switched off
    pub text: Option<String>,
}
impl MatchBlock {
    /// Returns the class id of this match for a classification, 0 if unassigned
    #[must_use]
    pub fn class_id(&self, ctype: ClassificationType) -> i32 {
        self.class_ids[ctype.index()]
    }

    /// Returns whether the match passes the score and e-value thresholds
    #[must_use]
    pub fn passes(&self, min_score: f32, max_expected: f32) -> bool {
        self.bit_score >= min_score && self.expected <= max_expected
    }
}

/// A read assembled with the matches that passed the getter's filters
#[derive(Debug, Clone, PartialEq)]
pub struct ReadBlock {
    pub uid: RecordId,
    pub length: i32,
    pub weight: i32,
    /// The read text, `None` if text resolution was switched off
    pub text: Option<String>,
    /// Number of matches stored for the read, before filtering
    pub total_matches: usize,
    pub matches: Vec<MatchBlock>,
}
impl ReadBlock {
    /// Returns the header line of the read text without the leading `>`
    #[must_use]
    pub fn header(&self) -> Option<&str> {
        let text = self.text.as_deref()?;
        let line = text.lines().next().unwrap_or_default();
        Some(line.strip_prefix('>').unwrap_or(line))
    }

    /// Returns the sequence of the read text with line breaks removed
    #[must_use]
    pub fn sequence(&self) -> Option<String> {
        let text = self.text.as_deref()?;
        Some(text.lines().skip(1).map(str::trim_end).collect())
    }

    #[must_use]
    pub fn num_matches(&self) -> usize {
        self.matches.len()
    }

    /// Returns whether any kept match is assigned to the class
    #[must_use]
    pub fn has_class(&self, ctype: ClassificationType, class_id: i32) -> bool {
        self.matches.iter().any(|m| m.class_id(ctype) == class_id)
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    fn block(text: Option<&str>) -> ReadBlock {
        ReadBlock {
            uid: RecordId::new(100),
            length: 8,
            weight: 1,
            text: text.map(str::to_string),
            total_matches: 1,
            matches: vec![MatchBlock {
                bit_score: 50.0,
                expected: 0.01,
                percent_identity: 90,
                class_ids: [5, 0, 0, 0, 0],
                text: None,
            }],
        }
    }

    #[test]
    fn test_header_and_sequence() {
        let read = block(Some(">read1 sample=A\nACGT\nTTGA\n"));
        assert_eq!(read.header(), Some("read1 sample=A"));
        assert_eq!(read.sequence().as_deref(), Some("ACGTTTGA"));

        let read = block(None);
        assert_eq!(read.header(), None);
        assert_eq!(read.sequence(), None);
    }

    #[test]
    fn test_embedded_input() {
        let input = ReadInput::embedded("r1", "ACGTA").weight(4);
        assert_eq!(input.length, 5);
        assert_eq!(input.weight, 4);
        assert_eq!(input.payload.text(), Some(">r1\nACGTA"));
    }

    #[test]
    fn test_match_filters_and_classes() {
        let read = block(None);
        assert!(read.has_class(ClassificationType::Taxonomy, 5));
        assert!(!read.has_class(ClassificationType::Kegg, 5));
        assert!(read.matches[0].passes(50.0, 0.01));
        assert!(!read.matches[0].passes(50.5, 10.0));
        assert!(!read.matches[0].passes(0.0, 0.001));

        let input = MatchInput::new(1.0, 1.0, 1, Payload::Offset(0))
            .with_class_id(ClassificationType::Pfam, 3);
        assert_eq!(input.class_ids, [0, 0, 0, 0, 3]);
    }
}
