//! Claimed-byte tracking for the blob address space

use std::fmt;
use std::ops::Range;

/// Sorted set of disjoint, non-touching half-open ranges.
///
/// Adding a range merges it with every stored range it overlaps or touches,
/// so `[0,10)` followed by `[10,20)` is stored as `[0,20)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<Range<u64>>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the first stored range whose end is at or after `point`.
    ///
    /// Every range before it ends strictly before `point`.
    fn first_reaching(&self, point: u64) -> usize {
        self.ranges.partition_point(|r| r.end < point)
    }

    /// Union `range` into the set. Empty ranges are ignored.
    pub fn add(&mut self, range: Range<u64>) {
        if range.is_empty() {
            return;
        }
        // Stored ranges touching or overlapping `range` form one contiguous run.
        let first = self.first_reaching(range.start);
        let last = self.ranges.partition_point(|r| r.start <= range.end);

        let mut merged = range;
        if first < last {
            merged.start = merged.start.min(self.ranges[first].start);
            merged.end = merged.end.max(self.ranges[last - 1].end);
        }
        self.ranges.splice(first..last, std::iter::once(merged));
    }

    /// Subtract `range` from every stored range, splitting where needed.
    pub fn remove(&mut self, range: Range<u64>) {
        if range.is_empty() {
            return;
        }
        let first = self.ranges.partition_point(|r| r.end <= range.start);
        let last = self.ranges.partition_point(|r| r.start < range.end);
        if first >= last {
            return;
        }

        let head = self.ranges[first].start..range.start;
        let tail = range.end..self.ranges[last - 1].end;
        let pieces = [head, tail].into_iter().filter(|r| !r.is_empty());
        self.ranges.splice(first..last, pieces);
    }

    /// Whether any stored range shares a point with `range`.
    pub fn overlaps(&self, range: &Range<u64>) -> bool {
        if range.is_empty() {
            return false;
        }
        let i = self.ranges.partition_point(|r| r.end <= range.start);
        self.ranges.get(i).is_some_and(|r| r.start < range.end)
    }

    /// Whether `point` lies inside a stored range.
    pub fn contains(&self, point: u64) -> bool {
        let i = self.ranges.partition_point(|r| r.start <= point);
        i > 0 && point < self.ranges[i - 1].end
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range<u64>> {
        self.ranges.iter()
    }

    pub fn as_slice(&self) -> &[Range<u64>] {
        &self.ranges
    }

    /// Number of stored ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of covered addresses.
    pub fn covered_len(&self) -> u64 {
        self.ranges.iter().map(|r| r.end - r.start).sum()
    }
}

impl Extend<Range<u64>> for RangeSet {
    fn extend<T: IntoIterator<Item = Range<u64>>>(&mut self, iter: T) {
        for range in iter {
            self.add(range);
        }
    }
}

impl FromIterator<Range<u64>> for RangeSet {
    fn from_iter<T: IntoIterator<Item = Range<u64>>>(iter: T) -> Self {
        let mut set = RangeSet::new();
        set.extend(iter);
        set
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "0x{:x}..0x{:x}", r.start, r.end)?;
        }
        write!(f, "]")
    }
}
