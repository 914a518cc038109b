//! Row predicate filter and the offset/limit gate.
//!
//! A condition is a disjunction of conjunctions:
//!
//! ```text
//! price > 10 AND color is 'red' OR name contains "^a"
//! ```
//!
//! Clauses that cannot be parsed evaluate to true, so a typo widens the
//! result instead of hiding rows.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::row::Row;

/// `<field> <operator> <value>`, with worded operators tried longest first.
static CLAUSE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*(?P<field>.+?)(?:\s+(?P<word>does\s+not\s+contain|is\s+not|less\s+than\s+or\s+equals?|greater\s+than\s+or\s+equals?|less\s+than|greater\s+than|contains|equals|is)\s+|\s*(?P<sym>!=|<>|<=|>=|=|<|>)\s*)(?P<value>.*?)\s*$",
    )
    .expect("Invalid clause pattern")
});

/// Numbers compared numerically.
pub static NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?\s*$").expect("Invalid number pattern")
});

/// Comparison operator of a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Contains,
    NotContains,
}

impl Operator {
    fn from_token(token: &str) -> Option<Self> {
        let words: Vec<String> = token
            .split_whitespace()
            .map(str::to_ascii_lowercase)
            .collect();
        let op = match words.join(" ").as_str() {
            "=" | "equals" | "is" => Operator::Eq,
            "!=" | "<>" | "is not" => Operator::Ne,
            "<" | "less than" => Operator::Lt,
            ">" | "greater than" => Operator::Gt,
            "<=" | "less than or equal" | "less than or equals" => Operator::Le,
            ">=" | "greater than or equal" | "greater than or equals" => Operator::Ge,
            "contains" => Operator::Contains,
            "does not contain" => Operator::NotContains,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Contains => "contains",
            Operator::NotContains => "does not contain",
        };
        f.write_str(token)
    }
}

#[derive(Debug, Clone)]
enum Clause {
    Compare {
        field: String,
        op: Operator,
        value: String,
        /// Compiled pattern for `contains`; `None` falls back to substring.
        pattern: Option<Regex>,
    },
    /// Text that did not parse. Always true.
    Unparsed(String),
}

impl Clause {
    fn parse(text: &str) -> Self {
        let Some(caps) = CLAUSE_PATTERN.captures(text) else {
            return Clause::Unparsed(text.to_owned());
        };
        let token = caps
            .name("word")
            .or_else(|| caps.name("sym"))
            .map_or("", |m| m.as_str());
        let Some(op) = Operator::from_token(token) else {
            return Clause::Unparsed(text.to_owned());
        };
        let field = unquote(caps["field"].trim());
        let value = unquote(&caps["value"]);
        if field.is_empty() {
            return Clause::Unparsed(text.to_owned());
        }

        let pattern = match op {
            Operator::Contains | Operator::NotContains => RegexBuilder::new(&value)
                .case_insensitive(true)
                .build()
                .ok(),
            _ => None,
        };
        Clause::Compare {
            field,
            op,
            value,
            pattern,
        }
    }

    fn evaluate<'r>(&self, lookup: &impl Fn(&str) -> Option<&'r str>) -> bool {
        let Clause::Compare {
            field,
            op,
            value,
            pattern,
        } = self
        else {
            return true;
        };
        let actual = lookup(field).unwrap_or_default();

        match op {
            Operator::Contains => contains(actual, value, pattern.as_ref()),
            Operator::NotContains => !contains(actual, value, pattern.as_ref()),
            Operator::Eq => compare(actual, value) == Ordering::Equal,
            Operator::Ne => compare(actual, value) != Ordering::Equal,
            Operator::Lt => compare(actual, value) == Ordering::Less,
            Operator::Gt => compare(actual, value) == Ordering::Greater,
            Operator::Le => compare(actual, value) != Ordering::Greater,
            Operator::Ge => compare(actual, value) != Ordering::Less,
        }
    }
}

fn contains(actual: &str, value: &str, pattern: Option<&Regex>) -> bool {
    match pattern {
        Some(pattern) => pattern.is_match(actual),
        None => actual.to_lowercase().contains(&value.to_lowercase()),
    }
}

/// Parse `text` as a number when it looks like one.
pub fn parse_number(text: &str) -> Option<f64> {
    if NUMBER_PATTERN.is_match(text) {
        text.trim().parse().ok()
    } else {
        None
    }
}

/// Numeric comparison when both sides are numbers, lexical otherwise.
fn compare(actual: &str, expected: &str) -> Ordering {
    match (parse_number(actual), parse_number(expected)) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        _ => actual.cmp(expected),
    }
}

/// Strip matching quotes and resolve backslash escapes.
fn unquote(text: &str) -> String {
    let text = text.trim();
    let bytes = text.as_bytes();
    let quoted = bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0];
    if !quoted {
        return text.to_owned();
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text[1..text.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split `text` on a case-insensitive keyword surrounded by whitespace,
/// ignoring occurrences inside quotes. A quote only opens at the start of a
/// value, so an apostrophe inside a bare word is literal.
fn split_keyword<'t>(text: &'t str, keyword: &str) -> Vec<&'t str> {
    let bytes = text.as_bytes();
    let key = keyword.as_bytes();
    let mut parts = Vec::new();
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => {
                i += 2;
                continue;
            }
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if (b == b'"' || b == b'\'') && opens_value(bytes, i) => quote = Some(b),
            None => {
                let end = i + key.len();
                let bounded = i > 0
                    && bytes[i - 1].is_ascii_whitespace()
                    && end < bytes.len()
                    && bytes[end].is_ascii_whitespace();
                if bounded && bytes[i..end].eq_ignore_ascii_case(key) {
                    parts.push(&text[start..i]);
                    start = end;
                    i = end;
                    continue;
                }
            }
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

fn opens_value(bytes: &[u8], i: usize) -> bool {
    i == 0 || bytes[i - 1].is_ascii_whitespace() || matches!(bytes[i - 1], b'=' | b'<' | b'>' | b'!')
}

/// A parsed row condition.
#[derive(Debug, Clone, Default)]
pub struct Condition {
    /// OR of AND groups.
    groups: Vec<Vec<Clause>>,
}

impl Condition {
    /// Parse a condition. Never fails: unrecognized clauses keep every row.
    pub fn parse(text: &str) -> Self {
        let groups = split_keyword(text, "or")
            .into_iter()
            .map(|group| {
                split_keyword(group, "and")
                    .into_iter()
                    .filter(|clause| !clause.trim().is_empty())
                    .map(Clause::parse)
                    .collect::<Vec<_>>()
            })
            .filter(|group| !group.is_empty())
            .collect();
        Self { groups }
    }

    /// Returns true when the condition keeps every row.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Evaluate against a field lookup.
    pub fn matches<'r>(&self, lookup: impl Fn(&str) -> Option<&'r str>) -> bool {
        self.is_empty()
            || self
                .groups
                .iter()
                .any(|group| group.iter().all(|clause| clause.evaluate(&lookup)))
    }

    /// Evaluate against a row, resolving fields by name.
    pub fn matches_row(&self, row: &Row) -> bool {
        self.matches(|name| row.by_name(name))
    }
}

/// Offset, predicate and limit applied to data rows in source order.
#[derive(Debug, Clone, Default)]
pub struct RowGate {
    offset: usize,
    limit: Option<usize>,
    condition: Option<Condition>,
    seen: usize,
    accepted: usize,
}

impl RowGate {
    pub fn new(offset: usize, limit: Option<usize>, condition: Option<Condition>) -> Self {
        Self {
            offset,
            limit,
            condition,
            seen: 0,
            accepted: 0,
        }
    }

    /// Decide whether `row` is surfaced.
    ///
    /// The offset counts raw data rows, before the condition is applied.
    pub fn admit(&mut self, row: &Row) -> bool {
        if self.is_full() {
            return false;
        }
        let index = self.seen;
        self.seen += 1;
        if index < self.offset {
            return false;
        }
        if let Some(condition) = &self.condition {
            if !condition.matches_row(row) {
                return false;
            }
        }
        self.accepted += 1;
        true
    }

    /// Returns true once the limit has been reached.
    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|limit| self.accepted >= limit)
    }

    /// Forget all counts, as when a source is read again from the start.
    pub fn reset(&mut self) {
        self.seen = 0;
        self.accepted = 0;
    }
}
