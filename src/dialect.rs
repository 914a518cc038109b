use std::fmt;

use crate::encoding::TextEncoding;

/// CSV dialect: the delimiter/enclosure/escape/line-terminator tuple
/// describing one CSV variant.
///
/// A dialect is resolved once per source, either from configuration or by
/// the guesser, and never changes while the source is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// Field delimiter character.
    pub delimiter: u8,
    /// Enclosure (quote) character configuration.
    pub quote: Quote,
    /// Escape character inside enclosed fields. Equal to the quote
    /// character for RFC 4180 doubled-quote escaping.
    pub escape: u8,
    /// Logical line terminator.
    pub line_terminator: LineTerminator,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: Quote::Some(b'"'),
            escape: b'"',
            line_terminator: LineTerminator::LF,
        }
    }
}

impl Dialect {
    /// Create a new Dialect with the given parameters.
    pub const fn new(delimiter: u8, quote: Quote, escape: u8, line_terminator: LineTerminator) -> Self {
        Self {
            delimiter,
            quote,
            escape,
            line_terminator,
        }
    }

    /// Comma-separated dialect with double-quote enclosure.
    pub fn csv() -> Self {
        Self::default()
    }

    /// Tab-separated dialect with double-quote enclosure.
    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            ..Self::default()
        }
    }

    /// On-wire line separator for a source in `encoding`.
    pub fn separator_bytes(&self, encoding: TextEncoding) -> Vec<u8> {
        self.line_terminator.bytes_in(encoding)
    }
}

/// Quote character configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quote {
    /// No quoting.
    None,
    /// Quote with the specified character.
    Some(u8),
}

impl Default for Quote {
    fn default() -> Self {
        Quote::Some(b'"')
    }
}

impl Quote {
    /// Returns the quote character if set.
    pub fn char(&self) -> Option<u8> {
        match self {
            Quote::None => None,
            Quote::Some(c) => Some(*c),
        }
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quote::None => write!(f, "none"),
            Quote::Some(c) => write!(f, "{}", *c as char),
        }
    }
}

/// Line terminator sequences.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineTerminator {
    /// Windows-style line ending (\r\n).
    CRLF,
    /// Unix-style line ending (\n).
    LF,
    /// Old Mac-style line ending (\r).
    CR,
    /// Reversed pair (\n\r), seen in some legacy exports.
    LFCR,
}

impl LineTerminator {
    /// Returns the byte sequence for this line terminator.
    pub const fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineTerminator::LF => b"\n",
            LineTerminator::CRLF => b"\r\n",
            LineTerminator::CR => b"\r",
            LineTerminator::LFCR => b"\n\r",
        }
    }

    /// Returns the terminator as text.
    pub const fn as_text(&self) -> &'static str {
        match self {
            LineTerminator::LF => "\n",
            LineTerminator::CRLF => "\r\n",
            LineTerminator::CR => "\r",
            LineTerminator::LFCR => "\n\r",
        }
    }

    /// Returns the escaped string representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            LineTerminator::LF => "\\n",
            LineTerminator::CRLF => "\\r\\n",
            LineTerminator::CR => "\\r",
            LineTerminator::LFCR => "\\n\\r",
        }
    }

    /// The terminator as it appears in a source of the given encoding.
    ///
    /// For UTF-16 and UTF-32 every byte is widened to the code unit size.
    pub fn bytes_in(&self, encoding: TextEncoding) -> Vec<u8> {
        encoding.encode_ascii(self.as_bytes())
    }

    /// Parse an escaped (`\r\n`) or named (`crlf`) representation.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "\\r\\n" | "\r\n" | "crlf" => Some(LineTerminator::CRLF),
            "\\n" | "\n" | "lf" => Some(LineTerminator::LF),
            "\\r" | "\r" | "cr" => Some(LineTerminator::CR),
            "\\n\\r" | "\n\r" | "lfcr" => Some(LineTerminator::LFCR),
            _ => None,
        }
    }
}

impl fmt::Display for LineTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
