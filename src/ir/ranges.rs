//! Interval indexing over tag ranges.
//!
//! Each message gets one index over its `reserved` and `extensions`
//! ranges, sorted by lower bound, so tag lookups are a binary search and
//! overlaps fall out of one adjacent-pair sweep.

use crate::span::Span;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RangeEntryKind {
    Reserved,
    Extension,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RangeEntry {
    pub lo: i32,
    /// Inclusive upper bound; `max` ranges store the wire-format
    /// maximum.
    pub hi: i32,
    pub kind: RangeEntryKind,
    pub span: Span,
}

/// A sorted interval index keyed by tag number.
#[derive(Debug, Default)]
pub struct RangeIndex {
    entries: Vec<RangeEntry>,
}

impl RangeIndex {
    /// Builds the index and returns the overlapping pairs found.
    pub fn build(mut entries: Vec<RangeEntry>) -> (RangeIndex, Vec<(RangeEntry, RangeEntry)>) {
        entries.sort_by_key(|entry| (entry.lo, entry.hi));
        let mut overlaps = Vec::new();
        // Sweep against the furthest-reaching entry seen so far, not the
        // sort-adjacent predecessor: a wide range swallows later entries
        // that its immediate neighbor does not touch.
        let mut reach: Option<RangeEntry> = None;
        for entry in &entries {
            if let Some(prior) = reach {
                if prior.hi >= entry.lo {
                    overlaps.push((prior, *entry));
                }
            }
            if reach.map_or(true, |prior| entry.hi > prior.hi) {
                reach = Some(*entry);
            }
        }
        (RangeIndex { entries }, overlaps)
    }

    /// The entry covering `tag`, if any. `O(log n)`.
    pub fn query(&self, tag: i32) -> Option<&RangeEntry> {
        let at = self.entries.partition_point(|entry| entry.lo <= tag);
        let candidate = self.entries[..at].last()?;
        (candidate.hi >= tag).then_some(candidate)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RangeEntry> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(lo: i32, hi: i32, kind: RangeEntryKind) -> RangeEntry {
        RangeEntry {
            lo,
            hi,
            kind,
            span: Span::new(lo as u32, hi as u32),
        }
    }

    #[test]
    fn query_hits_and_misses() {
        let (index, overlaps) = RangeIndex::build(vec![
            entry(10, 20, RangeEntryKind::Reserved),
            entry(100, 200, RangeEntryKind::Extension),
            entry(5, 5, RangeEntryKind::Reserved),
        ]);
        assert!(overlaps.is_empty());
        assert_eq!(index.query(5).unwrap().lo, 5);
        assert_eq!(index.query(15).unwrap().kind, RangeEntryKind::Reserved);
        assert_eq!(index.query(150).unwrap().kind, RangeEntryKind::Extension);
        assert!(index.query(6).is_none());
        assert!(index.query(21).is_none());
        assert!(index.query(201).is_none());
        assert!(index.query(1).is_none());
    }

    #[test]
    fn overlap_detection() {
        let (_, overlaps) = RangeIndex::build(vec![
            entry(1, 10, RangeEntryKind::Reserved),
            entry(10, 20, RangeEntryKind::Extension),
            entry(30, 40, RangeEntryKind::Reserved),
        ]);
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].0.lo, 1);
        assert_eq!(overlaps[0].1.lo, 10);
    }

    #[test]
    fn nested_ranges_overlap() {
        let (_, overlaps) = RangeIndex::build(vec![
            entry(1, 100, RangeEntryKind::Reserved),
            entry(5, 10, RangeEntryKind::Reserved),
        ]);
        assert_eq!(overlaps.len(), 1);
    }

    #[test]
    fn wide_range_overlaps_non_adjacent_entries() {
        // (1,100) overlaps both later entries even though (5,10) and
        // (50,60) are disjoint from each other; comparing only sorted
        // neighbors would miss the second pair.
        let (_, overlaps) = RangeIndex::build(vec![
            entry(1, 100, RangeEntryKind::Reserved),
            entry(5, 10, RangeEntryKind::Reserved),
            entry(50, 60, RangeEntryKind::Reserved),
        ]);
        assert_eq!(overlaps.len(), 2);
        assert_eq!((overlaps[0].0.lo, overlaps[0].1.lo), (1, 5));
        assert_eq!((overlaps[1].0.lo, overlaps[1].1.lo), (1, 50));
    }
}
