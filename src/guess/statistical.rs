//! Multi-row statistical delimiter detection.
//!
//! A real delimiter shows up the same number of times in every row. The
//! guesser tallies every character outside an enclosure per row and keeps
//! those whose counts are stable across the inspected rows.

use std::cmp::Reverse;

use foldhash::{HashMap, HashMapExt};
use tracing::trace;

use crate::dialect::Quote;

/// Default preference order for delimiter candidates.
pub const PREFERRED_DELIMITERS: &str = ",;\t.:|";

/// Default number of rows to inspect.
pub const DEFAULT_DEPTH: usize = 15;

/// Default "never a delimiter" predicate: alphanumerics and line breaks.
pub fn default_excluded(c: char) -> bool {
    c.is_alphanumeric() || c == '\n' || c == '\r'
}

/// How well a character's per-row counts line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Consistency {
    /// Identical count in every inspected row.
    Exact,
    /// Identical in every row but the last, which is off by one.
    Near,
}

#[derive(Debug)]
struct Tally {
    per_row: Vec<usize>,
    first_seen: usize,
}

/// Statistical delimiter guesser.
///
/// The preference list and exclusion predicate are immutable configuration
/// injected by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticalGuesser {
    preferred: Vec<char>,
    excluded: fn(char) -> bool,
    depth: usize,
}

impl Default for StatisticalGuesser {
    fn default() -> Self {
        Self {
            preferred: PREFERRED_DELIMITERS.chars().collect(),
            excluded: default_excluded,
            depth: DEFAULT_DEPTH,
        }
    }
}

impl StatisticalGuesser {
    /// Create a guesser with the default preference list and depth.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the preferred characters, best first.
    pub fn preferred(mut self, preferred: &str) -> Self {
        self.preferred = preferred.chars().collect();
        self
    }

    /// Set the predicate for characters that are never delimiters.
    pub fn excluded(mut self, excluded: fn(char) -> bool) -> Self {
        self.excluded = excluded;
        self
    }

    /// Set the number of rows to inspect.
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth.max(1);
        self
    }

    /// Guess the delimiter of `sample`.
    ///
    /// Only ASCII characters are returned, since dialect delimiters are
    /// single bytes. Returns `None` when no character is consistent.
    pub fn guess(&self, sample: &str, quote: Quote) -> Option<u8> {
        let (tallies, rows) = self.tally(sample, quote.char().map(char::from));
        if rows == 0 {
            return None;
        }

        let mut ranked: Vec<(usize, Consistency, Reverse<usize>, usize, char)> = tallies
            .into_iter()
            .filter(|(c, _)| c.is_ascii())
            .filter_map(|(c, tally)| {
                let (consistency, count) = consistency(&tally.per_row, rows)?;
                let rank = self
                    .preferred
                    .iter()
                    .position(|&p| p == c)
                    .unwrap_or(usize::MAX);
                Some((rank, consistency, Reverse(count), tally.first_seen, c))
            })
            .collect();
        ranked.sort_unstable();

        trace!(rows, candidates = ranked.len(), "statistical delimiter candidates");
        ranked.first().map(|&(.., c)| c as u8)
    }

    /// Walk the sample and count characters per row.
    ///
    /// Returns the tallies and the number of rows inspected.
    fn tally(&self, sample: &str, quote: Option<char>) -> (HashMap<char, Tally>, usize) {
        let mut tallies: HashMap<char, Tally> = HashMap::new();
        let mut chars = sample.chars().enumerate().peekable();
        let mut row = 0;
        let mut row_has_content = false;
        let mut enclosed = false;

        while let Some((pos, c)) = chars.next() {
            if Some(c) == quote {
                if enclosed && chars.peek().map(|&(_, n)| n) == quote {
                    // Doubled quote inside an enclosure
                    chars.next();
                } else {
                    enclosed = !enclosed;
                }
                row_has_content = true;
                continue;
            }
            if enclosed {
                continue;
            }
            if c == '\n' || c == '\r' {
                // CRLF and LFCR pairs are one break
                let pair = if c == '\r' { '\n' } else { '\r' };
                if chars.peek().map(|&(_, n)| n) == Some(pair) {
                    chars.next();
                }
                // Blank lines are not inspected rows
                if !row_has_content {
                    continue;
                }
                row += 1;
                row_has_content = false;
                if row >= self.depth {
                    break;
                }
                continue;
            }

            row_has_content = true;
            if (self.excluded)(c) {
                continue;
            }
            let tally = tallies.entry(c).or_insert_with(|| Tally {
                per_row: Vec::new(),
                first_seen: pos,
            });
            if tally.per_row.len() <= row {
                tally.per_row.resize(row + 1, 0);
            }
            tally.per_row[row] += 1;
        }

        let rows = if row_has_content { row + 1 } else { row };
        (tallies, rows.min(self.depth))
    }
}

/// Classify per-row counts over `rows` inspected rows.
fn consistency(per_row: &[usize], rows: usize) -> Option<(Consistency, usize)> {
    let count_at = |i: usize| per_row.get(i).copied().unwrap_or(0);
    let first = count_at(0);
    if first == 0 {
        return None;
    }

    let body_uniform = (1..rows.saturating_sub(1)).all(|i| count_at(i) == first);
    if !body_uniform {
        return None;
    }
    if rows == 1 {
        return Some((Consistency::Exact, first));
    }

    let last = count_at(rows - 1);
    if last == first {
        Some((Consistency::Exact, first))
    } else if last.abs_diff(first) == 1 {
        Some((Consistency::Near, first))
    } else {
        None
    }
}
