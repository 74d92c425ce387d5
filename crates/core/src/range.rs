//! Sets of build numbers and their compact text form.
//!
//! A job typically uses the same artifact in long runs of consecutive builds,
//! so sets are kept as sorted, disjoint, non-adjacent inclusive ranges and
//! serialized as `"3-5,33"`: runs become `start-end`, singletons stay bare.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fmt;
use std::str::FromStr;

/// A set of build numbers.
#[derive(Debug, Default, Clone, Eq, PartialEq, Hash)]
pub struct RangeSet {
    /// Inclusive `(start, end)` pairs, ascending, with at least one missing
    /// number between neighbours.
    ranges: Vec<(u32, u32)>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from arbitrary (possibly overlapping) inclusive ranges.
    fn from_ranges(mut ranges: Vec<(u32, u32)>) -> Self {
        ranges.sort_unstable();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        Self { ranges: merged }
    }

    /// Add a build number, returning `false` if it was already present.
    pub fn insert(&mut self, number: u32) -> bool {
        // First range that touches or lies after `number`.
        let idx = self.ranges.partition_point(|&(_, end)| end.saturating_add(1) < number);
        let Some(&(start, end)) = self.ranges.get(idx) else {
            self.ranges.push((number, number));
            return true;
        };
        if start <= number && number <= end {
            return false;
        }
        if end.checked_add(1) == Some(number) {
            self.ranges[idx].1 = number;
            if let Some(&(next_start, next_end)) = self.ranges.get(idx + 1)
                && number.checked_add(1) == Some(next_start)
            {
                self.ranges[idx].1 = next_end;
                self.ranges.remove(idx + 1);
            }
        } else if number.checked_add(1) == Some(start) {
            self.ranges[idx].0 = number;
        } else {
            self.ranges.insert(idx, (number, number));
        }
        true
    }

    pub fn contains(&self, number: u32) -> bool {
        let idx = self.ranges.partition_point(|&(_, end)| end < number);
        self.ranges.get(idx).is_some_and(|&(start, _)| start <= number)
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of builds in the set.
    pub fn len(&self) -> u64 {
        self.ranges.iter().map(|&(start, end)| u64::from(end - start) + 1).sum()
    }

    /// Every build number, ascending.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|&(start, end)| start..=end)
    }

    /// Inclusive runs, ascending.
    pub fn ranges(&self) -> &[(u32, u32)] {
        &self.ranges
    }

    /// Keep only the builds for which `keep` returns `true`.
    ///
    /// Returns `true` if anything was removed.
    pub fn retain(&mut self, mut keep: impl FnMut(u32) -> bool) -> bool {
        let before = self.len();
        let mut kept = Self::new();
        for number in self.iter().filter(|&n| keep(n)) {
            kept.insert(number);
        }
        *self = kept;
        before != self.len()
    }

    /// Serialize to the compact `"3-5,33"` form. The empty set is `""`.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse the compact form produced by [`RangeSet::encode`].
    pub fn decode(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::new());
        }
        let invalid = || ErrorKind::InvalidRange(text.to_string());
        let mut ranges = Vec::new();
        for part in text.split(',') {
            let part = part.trim();
            let (start, end) = match part.split_once('-') {
                Some((start, end)) => (
                    start.trim().parse::<u32>().or_raise(invalid)?,
                    end.trim().parse::<u32>().or_raise(invalid)?,
                ),
                None => {
                    let n = part.parse::<u32>().or_raise(invalid)?;
                    (n, n)
                },
            };
            if start > end {
                exn::bail!(invalid());
            }
            ranges.push((start, end));
        }
        Ok(Self::from_ranges(ranges))
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, &(start, end)) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for RangeSet {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

impl FromIterator<u32> for RangeSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self::from_ranges(iter.into_iter().map(|n| (n, n)).collect())
    }
}
