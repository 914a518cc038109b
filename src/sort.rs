//! Sort-then-slice path for readers with a sort key.
//!
//! Rows are buffered in a multi-map keyed by `(sort key, sequence)`, so rows
//! whose keys collide keep their first-seen order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::filter::parse_number;
use crate::row::Row;

/// How sort keys compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortPolicy {
    /// Numbers before non-numbers, numbers by value.
    Numeric,
    /// Plain string order.
    #[default]
    Lexical,
    /// Digit runs compare by value: `file2` < `file10`.
    Natural,
}

impl SortPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "numeric" | "number" => Some(SortPolicy::Numeric),
            "lexical" | "string" | "regular" => Some(SortPolicy::Lexical),
            "natural" => Some(SortPolicy::Natural),
            _ => None,
        }
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            SortPolicy::Lexical => a.cmp(b),
            SortPolicy::Natural => natural_cmp(a, b),
            SortPolicy::Numeric => match (parse_number(a), parse_number(b)) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.cmp(b),
            },
        }
    }
}

/// Sort configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
    pub policy: SortPolicy,
}

impl SortSpec {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
            policy: SortPolicy::default(),
        }
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    pub fn policy(mut self, policy: SortPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[derive(Debug)]
struct SortKey<'s> {
    value: String,
    spec: &'s SortSpec,
}

impl PartialEq for SortKey<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey<'_> {}

impl PartialOrd for SortKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        let ordering = self.spec.policy.compare(&self.value, &other.value);
        if self.spec.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Sort `rows` by `spec`, then skip `offset` rows and keep at most `limit`.
///
/// Rows missing the sort field sort as the empty string.
pub fn sort_and_slice(rows: Vec<Row>, spec: &SortSpec, offset: usize, limit: Option<usize>) -> Vec<Row> {
    let mut sorted: BTreeMap<(SortKey<'_>, usize), Row> = BTreeMap::new();
    for (sequence, row) in rows.into_iter().enumerate() {
        let key = SortKey {
            value: row.by_name(&spec.field).unwrap_or_default().to_owned(),
            spec,
        };
        sorted.insert((key, sequence), row);
    }

    sorted
        .into_values()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Natural string order: runs of ASCII digits compare by numeric value.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a.as_bytes(), b.as_bytes());
    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (da, ra) = split_digits(a);
                let (db, rb) = split_digits(b);
                let ta = trim_zeros(da);
                let tb = trim_zeros(db);
                let ordering = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ordering != Ordering::Equal {
                    return ordering;
                }
                a = ra;
                b = rb;
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(y);
                }
                a = &a[1..];
                b = &b[1..];
            }
        }
    }
}

fn split_digits(bytes: &[u8]) -> (&[u8], &[u8]) {
    let end = bytes
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(bytes.len());
    bytes.split_at(end)
}

fn trim_zeros(digits: &[u8]) -> &[u8] {
    let start = digits
        .iter()
        .position(|&b| b != b'0')
        .unwrap_or(digits.len());
    &digits[start..]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::field_index::{FieldIndex, FieldMapping};

    fn rows(values: &[(&str, &str)]) -> Vec<Row> {
        let index = Arc::new(FieldIndex::build(&["id", "key"], &FieldMapping::new()).unwrap());
        values
            .iter()
            .map(|(id, key)| Row::new(vec![Some((*id).into()), Some((*key).into())], index.clone()))
            .collect()
    }

    fn ids(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r.get(0).unwrap()).collect()
    }

    #[test]
    fn test_colliding_keys_keep_first_seen_order() {
        let input = rows(&[("a", "2"), ("b", "1"), ("c", "2"), ("d", "1")]);
        let sorted = sort_and_slice(input, &SortSpec::new("key"), 0, None);
        assert_eq!(ids(&sorted), ["b", "d", "a", "c"]);
    }

    #[test]
    fn test_descending_keeps_collision_order() {
        let input = rows(&[("a", "2"), ("b", "1"), ("c", "2")]);
        let spec = SortSpec::new("key").descending(true);
        let sorted = sort_and_slice(input, &spec, 0, None);
        assert_eq!(ids(&sorted), ["a", "c", "b"]);
    }

    #[test]
    fn test_policies() {
        let input = || rows(&[("a", "10"), ("b", "9"), ("c", "x"), ("d", "file2")]);

        let numeric = SortSpec::new("key").policy(SortPolicy::Numeric);
        assert_eq!(ids(&sort_and_slice(input(), &numeric, 0, None)), ["b", "a", "d", "c"]);

        let lexical = SortSpec::new("key");
        assert_eq!(ids(&sort_and_slice(input(), &lexical, 0, None)), ["a", "b", "d", "c"]);
    }

    #[test]
    fn test_slice_after_sort() {
        let input = rows(&[("a", "3"), ("b", "1"), ("c", "2"), ("d", "4")]);
        let spec = SortSpec::new("key").policy(SortPolicy::Numeric);
        assert_eq!(ids(&sort_and_slice(input, &spec, 1, Some(2))), ["c", "a"]);
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("file2", "file10"), Ordering::Less);
        assert_eq!(natural_cmp("file10", "file10"), Ordering::Equal);
        assert_eq!(natural_cmp("a007", "a7b"), Ordering::Less);
        assert_eq!(natural_cmp("b", "a100"), Ordering::Greater);
        assert_eq!(SortPolicy::from_name("Natural"), Some(SortPolicy::Natural));
    }
}
