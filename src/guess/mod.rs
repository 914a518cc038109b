//! Dialect guessing from a decoded sample.
//!
//! Two strategies are available: counting candidate delimiters in the first
//! line, and a multi-row statistical pass that looks for characters whose
//! per-row occurrence count is stable.

pub mod first_line;
pub mod line_terminator;
pub mod statistical;

use tracing::debug;

use crate::dialect::{Dialect, LineTerminator, Quote};

pub use first_line::{DELIMITER_CANDIDATES, ENCLOSURE_CANDIDATES, guess_delimiter, guess_enclosure};
pub use line_terminator::detect_line_terminator;
pub use statistical::StatisticalGuesser;

/// Delimiter detection strategy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Detection {
    /// Count candidate delimiters in the first line.
    #[default]
    FirstLine,
    /// Multi-row statistical detection.
    Statistical(StatisticalGuesser),
}

/// A dialect whose parts may still be undetermined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartialDialect {
    pub delimiter: Option<u8>,
    pub quote: Option<Quote>,
    pub escape: Option<u8>,
    pub line_terminator: Option<LineTerminator>,
}

impl PartialDialect {
    /// Returns true when every part is known and no guessing is needed.
    pub fn is_complete(&self) -> bool {
        self.delimiter.is_some() && self.quote.is_some() && self.line_terminator.is_some()
    }

    /// Fill the unknown parts with the defaults of [`Dialect::default`].
    pub fn or_default(&self) -> Dialect {
        let defaults = Dialect::default();
        let quote = self.quote.unwrap_or(defaults.quote);
        Dialect {
            delimiter: self.delimiter.unwrap_or(defaults.delimiter),
            quote,
            escape: self.escape.or(quote.char()).unwrap_or(defaults.escape),
            line_terminator: self.line_terminator.unwrap_or(defaults.line_terminator),
        }
    }
}

impl From<Dialect> for PartialDialect {
    fn from(dialect: Dialect) -> Self {
        Self {
            delimiter: Some(dialect.delimiter),
            quote: Some(dialect.quote),
            escape: Some(dialect.escape),
            line_terminator: Some(dialect.line_terminator),
        }
    }
}

/// Resolve a complete dialect for `sample`.
///
/// Parts already present in `known` are kept as they are. Undetermined
/// parts fall back to the defaults: comma, double quote and LF.
pub fn guess_dialect(sample: &str, known: &PartialDialect, detection: &Detection) -> Dialect {
    let mut resolved = *known;

    if resolved.line_terminator.is_none() {
        resolved.line_terminator = detect_line_terminator(sample);
    }

    let first_line = sample
        .split(['\n', '\r'])
        .next()
        .unwrap_or_default();

    if resolved.delimiter.is_none() {
        resolved.delimiter = match detection {
            Detection::FirstLine => guess_delimiter(first_line, DELIMITER_CANDIDATES),
            Detection::Statistical(guesser) => {
                guesser.guess(sample, resolved.quote.unwrap_or_default())
            }
        };
    }

    if resolved.quote.is_none() {
        let delimiter = resolved.delimiter.unwrap_or(b',');
        resolved.quote = guess_enclosure(first_line, delimiter);
    }

    let dialect = resolved.or_default();
    debug!(
        delimiter = %(dialect.delimiter as char).escape_debug(),
        quote = %dialect.quote,
        line_terminator = %dialect.line_terminator,
        "resolved dialect"
    );
    dialect
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_semicolon_crlf() {
        let dialect = guess_dialect(
            "name;age;city\r\nAlice;30;NYC\r\n",
            &PartialDialect::default(),
            &Detection::FirstLine,
        );
        assert_eq!(dialect.delimiter, b';');
        assert_eq!(dialect.line_terminator, LineTerminator::CRLF);
        assert_eq!(dialect.quote, Quote::Some(b'"'));
    }

    #[test]
    fn test_known_parts_are_kept() {
        let known = PartialDialect {
            delimiter: Some(b'|'),
            ..PartialDialect::default()
        };
        let dialect = guess_dialect("a,b,c\n", &known, &Detection::FirstLine);
        assert_eq!(dialect.delimiter, b'|');
    }

    #[test]
    fn test_undetermined_falls_back_to_comma() {
        let dialect = guess_dialect("a;b,c\n", &PartialDialect::default(), &Detection::FirstLine);
        assert_eq!(dialect.delimiter, b',');
    }

    #[test]
    fn test_single_quote_enclosure() {
        let dialect = guess_dialect(
            "'a','b','c'\n'1','2','3'\n",
            &PartialDialect::default(),
            &Detection::FirstLine,
        );
        assert_eq!(dialect.quote, Quote::Some(b'\''));
        assert_eq!(dialect.escape, b'\'');
    }

    #[test]
    fn test_statistical_detection() {
        let sample = "a b;c d;e\nf g;h i;j\nk l;m n;o\n";
        let dialect = guess_dialect(
            sample,
            &PartialDialect::default(),
            &Detection::Statistical(StatisticalGuesser::default()),
        );
        assert_eq!(dialect.delimiter, b';');
    }

    #[test]
    fn test_partial_is_complete() {
        let full = PartialDialect::from(Dialect::default());
        assert!(full.is_complete());
        assert!(!PartialDialect::default().is_complete());
    }
}
