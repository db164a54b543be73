//! Inclusive range-set arithmetic.
//!
//! Range sets are kept normalized: sorted by `begin`, non-overlapping and
//! with adjacent ranges merged, so two sets covering the same values always
//! compare equal.

use crate::proto::Range;

/// Sort and merge overlapping or adjacent ranges.
pub fn normalize(ranges: &[Range]) -> Vec<Range> {
    let mut sorted: Vec<Range> = ranges.iter().copied().filter(|r| r.begin <= r.end).collect();
    sorted.sort();

    let mut merged: Vec<Range> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.begin <= last.end.saturating_add(1) => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Union of two range sets.
pub fn union(a: &[Range], b: &[Range]) -> Vec<Range> {
    let mut all = a.to_vec();
    all.extend_from_slice(b);
    normalize(&all)
}

/// Remove every value of `remove` from `from`.
pub fn subtract(from: &[Range], remove: &[Range]) -> Vec<Range> {
    let mut result = normalize(from);
    for cut in normalize(remove) {
        let mut next = Vec::with_capacity(result.len() + 1);
        for range in result {
            if cut.end < range.begin || cut.begin > range.end {
                next.push(range);
                continue;
            }
            if cut.begin > range.begin {
                next.push(Range::new(range.begin, cut.begin - 1));
            }
            if cut.end < range.end {
                next.push(Range::new(cut.end + 1, range.end));
            }
        }
        result = next;
    }
    result
}

/// Whether `value` lies in any of the ranges.
pub fn contains(ranges: &[Range], value: u64) -> bool {
    ranges.iter().any(|r| r.contains(value))
}

/// Whether every range is well formed (`begin <= end`).
pub fn is_well_formed(ranges: &[Range]) -> bool {
    ranges.iter().all(|r| r.begin <= r.end)
}

/// Lowest value present in the set, if any.
pub fn first_value(ranges: &[Range]) -> Option<u64> {
    ranges.iter().filter(|r| r.begin <= r.end).map(|r| r.begin).min()
}
