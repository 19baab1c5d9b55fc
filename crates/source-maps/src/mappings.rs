//! Decoded `mappings` and the two lookup orders over them.

use std::cmp::Ordering;

use crate::vlq::decode_segment;
use crate::SourceMapError;

/// One decoded segment. Lines and columns are zero-based; name indexes are not kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: i64,
    pub generated_column: i64,
    pub source: Option<usize>,
    pub original_line: i64,
    pub original_column: i64,
}

impl Mapping {
    fn generated_key(&self) -> (i64, i64) {
        (self.generated_line, self.generated_column)
    }

    fn original_key(&self) -> (usize, i64, i64) {
        (
            self.source.unwrap_or(usize::MAX),
            self.original_line,
            self.original_column,
        )
    }
}

/// Parses a `mappings` string. `source_count` bounds the source indexes segments may use.
pub fn parse_mappings(encoded: &str, source_count: usize) -> Result<Vec<Mapping>, SourceMapError> {
    let mut mappings = Vec::new();
    let mut fields = Vec::with_capacity(5);

    let mut source: i64 = 0;
    let mut original_line: i64 = 0;
    let mut original_column: i64 = 0;

    for (generated_line, line) in encoded.split(';').enumerate() {
        let mut generated_column: i64 = 0;
        for segment in line.split(',').filter(|segment| !segment.is_empty()) {
            fields.clear();
            decode_segment(segment, &mut fields)?;
            generated_column += fields[0];

            let mapped_source = match fields.len() {
                1 => None,
                4 | 5 => {
                    source += fields[1];
                    original_line += fields[2];
                    original_column += fields[3];
                    if source < 0 || source as usize >= source_count {
                        return Err(SourceMapError::UnknownSource(source));
                    }
                    Some(source as usize)
                }
                other => return Err(SourceMapError::BadSegment(other)),
            };

            mappings.push(Mapping {
                generated_line: generated_line as i64,
                generated_column,
                source: mapped_source,
                original_line,
                original_column,
            });
        }
    }

    Ok(mappings)
}

/// Mappings sorted for generated-to-original and original-to-generated searches.
#[derive(Debug, Default)]
pub struct MappingIndex {
    by_generated: Vec<Mapping>,
    by_original: Vec<Mapping>,
}

impl MappingIndex {
    pub fn new(mut mappings: Vec<Mapping>) -> Self {
        mappings.sort_by_key(Mapping::generated_key);
        let mut by_original: Vec<Mapping> = mappings
            .iter()
            .copied()
            .filter(|mapping| mapping.source.is_some())
            .collect();
        by_original.sort_by(|a, b| match a.original_key().cmp(&b.original_key()) {
            Ordering::Equal => a.generated_key().cmp(&b.generated_key()),
            other => other,
        });
        Self {
            by_generated: mappings,
            by_original,
        }
    }

    pub fn len(&self) -> usize {
        self.by_generated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_generated.is_empty()
    }

    /// Nearest mapping at or after the generated position, then at or before it. A
    /// candidate only counts when it sits on the queried line and names a source.
    pub fn original_for(&self, line: i64, column: i64) -> Option<Mapping> {
        let needle = (line, column);
        let usable = |mapping: &&Mapping| mapping.generated_line == line && mapping.source.is_some();

        let upper = self
            .by_generated
            .partition_point(|mapping| mapping.generated_key() < needle);
        if let Some(found) = self.by_generated.get(upper).filter(usable) {
            return Some(*found);
        }

        let lower = self
            .by_generated
            .partition_point(|mapping| mapping.generated_key() <= needle);
        lower
            .checked_sub(1)
            .and_then(|index| self.by_generated.get(index))
            .filter(usable)
            .copied()
    }

    /// Nearest mapping at or after the original position, then at or before it. Only the
    /// source has to match, so the result may come from an adjacent line.
    pub fn generated_for(&self, source: usize, line: i64, column: i64) -> Option<Mapping> {
        let needle = (source, line, column);
        let usable = |mapping: &&Mapping| mapping.source == Some(source);

        let upper = self
            .by_original
            .partition_point(|mapping| mapping.original_key() < needle);
        if let Some(found) = self.by_original.get(upper).filter(usable) {
            return Some(*found);
        }

        let lower = self
            .by_original
            .partition_point(|mapping| mapping.original_key() <= needle);
        lower
            .checked_sub(1)
            .and_then(|index| self.by_original.get(index))
            .filter(usable)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_relative_fields_across_lines() {
        // line 0: col 0 -> src 0 (0,0); col 4 -> src 0 (0,4)
        // line 1: col 2 -> src 0 (1,0)
        let mappings = parse_mappings("AAAA,IAAI;EACJ", 1).expect("parse");
        assert_eq!(mappings.len(), 3);
        assert_eq!(mappings[1].generated_column, 4);
        assert_eq!(mappings[1].original_column, 4);
        assert_eq!(mappings[2].generated_line, 1);
        assert_eq!(mappings[2].generated_column, 2);
        assert_eq!(mappings[2].original_line, 1);
        assert_eq!(mappings[2].original_column, 0);
    }

    #[test]
    fn unmapped_segment_has_no_source() {
        let mappings = parse_mappings("A,CAAA", 1).expect("parse");
        assert_eq!(mappings[0].source, None);
        assert_eq!(mappings[1].source, Some(0));
    }

    #[test]
    fn out_of_range_source_is_rejected() {
        assert!(matches!(
            parse_mappings("ACAA", 1),
            Err(SourceMapError::UnknownSource(1))
        ));
    }

    #[test]
    fn original_lookup_prefers_upper_bound_on_same_line() {
        let index = MappingIndex::new(parse_mappings("AAAA,IAAI;EACJ", 1).expect("parse"));
        let found = index.original_for(0, 2).expect("upper bound");
        assert_eq!(found.original_column, 4);
        // past the last mapping on line 0, the lower bound is used
        let found = index.original_for(0, 9).expect("lower bound");
        assert_eq!(found.original_column, 4);
        // line 1 col 0 has nothing before it on the same line, but col 2 is after
        assert_eq!(index.original_for(1, 0).expect("upper").generated_column, 2);
        assert!(index.original_for(5, 0).is_none());
    }

    #[test]
    fn generated_lookup_may_cross_lines() {
        // original line 0 maps to generated line 0; original line 1 to generated line 1
        let index = MappingIndex::new(parse_mappings("AAAA;AACA", 1).expect("parse"));
        let found = index.generated_for(0, 5, 0).expect("adjacent line");
        assert_eq!(found.generated_line, 1);
    }
}
