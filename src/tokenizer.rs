//! Quoting-aware field/row tokenizer.
//!
//! The tokenizer walks decoded text byte by byte. Delimiter, enclosure and
//! line terminators are ASCII, so splitting on them never cuts a UTF-8
//! sequence. Syntax deviations are recovered from and recorded as
//! [`ParseError`] diagnostics; they never abort parsing.

use std::fmt;

use tracing::debug;

use crate::dialect::{Dialect, LineTerminator};

/// Severity of a recoverable syntax deviation.
///
/// Ordered so that the maximum over a parse is its overall severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// A heuristic correction was applied, e.g. a bare quote inside an
    /// enclosed field.
    Anomaly,
    /// An enclosure character appeared inside a field that was not
    /// enclosed. The data is likely non-standard.
    EnclosureViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Anomaly => write!(f, "anomaly"),
            ErrorKind::EnclosureViolation => write!(f, "enclosure violation"),
        }
    }
}

/// A recoverable syntax deviation found while tokenizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ErrorKind,
    /// 1-based record number, counting the header row.
    pub row: usize,
    /// 1-based column number.
    pub column: usize,
    /// Field name, when a header row is known.
    pub field: Option<String>,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at row {}, column {}", self.kind, self.row, self.column)?;
        if let Some(field) = &self.field {
            write!(f, " ({field})")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Highest severity among `errors`, or `None` when the parse was clean.
pub fn severity(errors: &[ParseError]) -> Option<ErrorKind> {
    errors.iter().map(|e| e.kind).max()
}

/// One field as it came out of the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    pub value: String,
    /// Whether the field was opened with the enclosure character.
    pub enclosed: bool,
}

/// One record as it came out of the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based record number.
    pub row: usize,
    pub fields: Vec<RawField>,
    /// Set on the first non-blank record when the heading flag is on.
    pub is_header: bool,
    /// The input ended while an enclosure was still open.
    pub unterminated: bool,
    /// The physical line held no bytes before its terminator.
    pub empty_line: bool,
}

impl RawRecord {
    /// Returns true for an empty physical line. A line of whitespace is a
    /// record with one absent field.
    pub fn is_blank(&self) -> bool {
        self.empty_line
    }

    /// Field values, with empty unenclosed fields mapped to `None`.
    pub fn into_values(self) -> Vec<Option<String>> {
        self.fields
            .into_iter()
            .map(|f| (f.enclosed || !f.value.is_empty()).then_some(f.value))
            .collect()
    }
}

/// Field/row tokenizer for one dialect.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    dialect: Dialect,
    heading: bool,
    single_line: bool,
    debug: bool,
}

impl Tokenizer {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            heading: false,
            single_line: false,
            debug: false,
        }
    }

    /// Treat the first non-blank record as the header row.
    pub fn heading(mut self, heading: bool) -> Self {
        self.heading = heading;
        self
    }

    /// Treat the whole input as one logical line: line breaks outside an
    /// enclosure are field content instead of record terminators.
    pub fn single_line(mut self, single_line: bool) -> Self {
        self.single_line = single_line;
        self
    }

    /// Emit a debug event for every recorded diagnostic.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Lazily tokenize a full buffer.
    pub fn records<'t>(&self, text: &'t str) -> Records<'t> {
        Records {
            bytes: text.as_bytes(),
            pos: 0,
            row: 0,
            tokenizer: self.clone(),
            header: None,
            errors: Vec::new(),
            started: false,
        }
    }

    /// Tokenize one logical line as record number `row`.
    ///
    /// `header` names the fields in diagnostics.
    pub fn parse_line(
        &self,
        line: &str,
        row: usize,
        header: Option<&[String]>,
    ) -> (RawRecord, Vec<ParseError>) {
        let tokenizer = Tokenizer {
            heading: false,
            single_line: true,
            ..self.clone()
        };
        let mut records = Records {
            bytes: line.as_bytes(),
            pos: 0,
            row: row.saturating_sub(1),
            tokenizer,
            header: header.map(<[String]>::to_vec),
            errors: Vec::new(),
            started: false,
        };
        let record = records.next().unwrap_or_else(|| RawRecord {
            row,
            fields: vec![RawField {
                value: String::new(),
                enclosed: false,
            }],
            is_header: false,
            unterminated: false,
            empty_line: true,
        });
        (record, records.into_errors())
    }
}

/// Iterator over the records of a buffer.
///
/// Diagnostics accumulate while iterating; collect them with
/// [`Records::into_errors`] once done.
#[derive(Debug)]
pub struct Records<'t> {
    bytes: &'t [u8],
    pos: usize,
    row: usize,
    tokenizer: Tokenizer,
    header: Option<Vec<String>>,
    errors: Vec<ParseError>,
    started: bool,
}

/// Per-record scanning state.
struct FieldState {
    acc: Vec<u8>,
    enclosed: bool,
    was_enclosed: bool,
    column: usize,
}

impl FieldState {
    fn new() -> Self {
        Self {
            acc: Vec::new(),
            enclosed: false,
            was_enclosed: false,
            column: 1,
        }
    }

    fn finish(&mut self) -> RawField {
        let bytes = std::mem::take(&mut self.acc);
        let value = match String::from_utf8(bytes) {
            Ok(value) => value,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        let field = if self.was_enclosed {
            RawField {
                value,
                enclosed: true,
            }
        } else {
            RawField {
                value: trim_unenclosed(&value).to_owned(),
                enclosed: false,
            }
        };
        self.enclosed = false;
        self.was_enclosed = false;
        self.column += 1;
        field
    }
}

fn trim_unenclosed(value: &str) -> &str {
    value.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r' | '\0' | '\x0B'))
}

impl Records<'_> {
    /// Diagnostics recorded so far.
    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// Consume the iterator and return its diagnostics.
    pub fn into_errors(self) -> Vec<ParseError> {
        self.errors
    }

    /// Header names, once the header row has been read.
    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Whitespace skipped around enclosures: space, TAB, VT and NUL,
    /// except when one of them is the delimiter.
    fn is_space(&self, b: u8) -> bool {
        b != self.tokenizer.dialect.delimiter && matches!(b, b' ' | b'\t' | 0x0B | 0)
    }

    fn is_break(&self, b: u8) -> bool {
        !self.tokenizer.single_line && (b == b'\n' || b == b'\r')
    }

    fn record_error(&mut self, kind: ErrorKind, column: usize, message: &str) {
        let field = self
            .header
            .as_ref()
            .and_then(|h| h.get(column - 1))
            .cloned();
        if self.tokenizer.debug {
            debug!(row = self.row, column, ?field, %kind, detail = message, "csv syntax deviation");
        }
        self.errors.push(ParseError {
            kind,
            row: self.row,
            column,
            field,
            message: message.to_owned(),
        });
    }

    /// Consume one line terminator at `self.pos`, treating CRLF (and LFCR
    /// when that is the dialect's terminator) as a single break.
    fn consume_break(&mut self) {
        let b = self.bytes[self.pos];
        let next = self.bytes.get(self.pos + 1).copied();
        self.pos += 1;
        let paired = match (b, next) {
            (b'\r', Some(b'\n')) => true,
            (b'\n', Some(b'\r')) => self.tokenizer.dialect.line_terminator == LineTerminator::LFCR,
            _ => false,
        };
        if paired {
            self.pos += 1;
        }
    }
}

impl Iterator for Records<'_> {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        // A buffer ending with a terminator has no further record; one that
        // does not is finalized as if a terminator followed.
        if self.pos >= self.bytes.len() && (self.started || !self.tokenizer.single_line) {
            return None;
        }
        self.started = true;

        let dialect = self.tokenizer.dialect;
        let quote = dialect.quote.char();
        let delimiter = dialect.delimiter;
        self.row += 1;

        let mut state = FieldState::new();
        let mut fields = Vec::new();
        let mut unterminated = false;
        let start = self.pos;
        let mut content_end = start;

        loop {
            let Some(&b) = self.bytes.get(self.pos) else {
                if state.enclosed {
                    unterminated = true;
                    self.record_error(
                        ErrorKind::Anomaly,
                        state.column,
                        "enclosure not closed before end of input",
                    );
                }
                content_end = self.pos;
                fields.push(state.finish());
                break;
            };
            let next = self.bytes.get(self.pos + 1).copied();

            if Some(b) == quote {
                if !state.enclosed {
                    if state.acc.iter().all(|&c| self.is_space(c)) {
                        state.acc.clear();
                        state.enclosed = true;
                        state.was_enclosed = true;
                    } else {
                        self.record_error(
                            ErrorKind::EnclosureViolation,
                            state.column,
                            "enclosure character inside a field that is not enclosed",
                        );
                        state.acc.push(b);
                    }
                    self.pos += 1;
                    continue;
                }

                if next == Some(b) && dialect.escape == b {
                    state.acc.push(b);
                    self.pos += 2;
                    continue;
                }

                match next {
                    None => self.pos += 1,
                    Some(n) if n == delimiter || n == b'\n' || n == b'\r' => self.pos += 1,
                    Some(_) => {
                        let mut ahead = self.pos + 1;
                        while ahead < self.bytes.len() && self.is_space(self.bytes[ahead]) {
                            ahead += 1;
                        }
                        let closes = match self.bytes.get(ahead) {
                            None => true,
                            Some(&n) => n == delimiter || n == b'\n' || n == b'\r',
                        };
                        if closes {
                            self.pos = ahead;
                        } else {
                            self.record_error(
                                ErrorKind::Anomaly,
                                state.column,
                                "bare enclosure character inside an enclosed field",
                            );
                            state.acc.push(b);
                            self.pos += 1;
                        }
                    }
                }
                state.enclosed = false;
                continue;
            }

            if state.enclosed && b == dialect.escape && next == quote {
                if let Some(q) = quote {
                    state.acc.push(q);
                    self.pos += 2;
                    continue;
                }
            }

            if !state.enclosed && b == delimiter {
                fields.push(state.finish());
                self.pos += 1;
                continue;
            }

            if !state.enclosed && self.is_break(b) {
                content_end = self.pos;
                fields.push(state.finish());
                self.consume_break();
                break;
            }

            state.acc.push(b);
            self.pos += 1;
        }

        let mut record = RawRecord {
            row: self.row,
            fields,
            is_header: false,
            unterminated,
            empty_line: content_end == start,
        };

        if self.tokenizer.heading && self.header.is_none() && !record.is_blank() {
            record.is_header = true;
            self.header = Some(record.fields.iter().map(|f| f.value.clone()).collect());
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Quote;

    fn values(tokenizer: &Tokenizer, text: &str) -> Vec<Vec<String>> {
        tokenizer
            .records(text)
            .map(|r| r.fields.into_iter().map(|f| f.value).collect())
            .collect()
    }

    #[test]
    fn test_simple_rows() {
        let tokenizer = Tokenizer::new(Dialect::default());
        assert_eq!(
            values(&tokenizer, "a,b,c\n1,2,3\n"),
            vec![vec!["a", "b", "c"], vec!["1", "2", "3"]]
        );
    }

    #[test]
    fn test_missing_final_terminator() {
        let tokenizer = Tokenizer::new(Dialect::default());
        assert_eq!(
            values(&tokenizer, "a,b\n1,2"),
            vec![vec!["a", "b"], vec!["1", "2"]]
        );
    }

    #[test]
    fn test_doubled_quote_escape() {
        let tokenizer = Tokenizer::new(Dialect::default());
        let mut records = tokenizer.records("\"a\",\"b\"\"c\",d\n");
        let record = records.next().unwrap();
        assert_eq!(record.fields[1].value, "b\"c");
        assert!(record.fields[1].enclosed);
        assert_eq!(record.fields[2].value, "d");
        assert!(records.next().is_none());
        assert!(records.errors().is_empty());
    }

    #[test]
    fn test_enclosure_violation() {
        let tokenizer = Tokenizer::new(Dialect::default());
        let mut records = tokenizer.records("ab\"cd,ef\n");
        let record = records.next().unwrap();
        assert_eq!(record.fields[0].value, "ab\"cd");
        assert_eq!(record.fields[1].value, "ef");

        let errors = records.into_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::EnclosureViolation);
        assert_eq!(errors[0].row, 1);
        assert_eq!(errors[0].column, 1);
    }

    #[test]
    fn test_bare_quote_anomaly() {
        let tokenizer = Tokenizer::new(Dialect::default());
        let mut records = tokenizer.records("\"ab\"cd,e\n");
        let record = records.next().unwrap();
        assert_eq!(record.fields[0].value, "ab\"cd");
        assert_eq!(record.fields[1].value, "e");
        let errors = records.into_errors();
        assert_eq!(errors[0].kind, ErrorKind::Anomaly);
        assert_eq!(severity(&errors), Some(ErrorKind::Anomaly));
    }

    #[test]
    fn test_whitespace_after_closing_quote() {
        let tokenizer = Tokenizer::new(Dialect::default());
        assert_eq!(
            values(&tokenizer, "\" a \"  ,b\n"),
            vec![vec![" a ", "b"]]
        );
    }

    #[test]
    fn test_unenclosed_values_trimmed() {
        let tokenizer = Tokenizer::new(Dialect::default());
        assert_eq!(values(&tokenizer, "  a , b\t\n"), vec![vec!["a", "b"]]);
    }

    #[test]
    fn test_embedded_newline_and_crlf() {
        let tokenizer = Tokenizer::new(Dialect::default());
        assert_eq!(
            values(&tokenizer, "\"line1\r\nline2\",x\r\ny,z\r\n"),
            vec![vec!["line1\r\nline2", "x"], vec!["y", "z"]]
        );
    }

    #[test]
    fn test_blank_lines_and_header() {
        let tokenizer = Tokenizer::new(Dialect::default()).heading(true);
        let records: Vec<RawRecord> = tokenizer.records("\nname,age\n\nbob,3\n").collect();
        assert!(records[0].is_blank());
        assert!(!records[0].is_header);
        assert!(records[1].is_header);
        assert!(records[2].is_blank());
        assert_eq!(records[3].fields[0].value, "bob");
    }

    #[test]
    fn test_whitespace_line_is_not_blank() {
        let tokenizer = Tokenizer::new(Dialect::default()).heading(true);
        let records: Vec<RawRecord> = tokenizer.records("   \nname\n \t\n").collect();
        assert!(!records[0].is_blank());
        assert!(records[0].is_header);
        assert_eq!(records[0].fields[0].value, "");
        assert!(!records[2].is_blank());
        assert_eq!(records[2].clone().into_values(), vec![None]);

        let (record, _) = tokenizer.parse_line("  ", 1, None);
        assert!(!record.is_blank());
    }

    #[test]
    fn test_header_names_in_errors() {
        let tokenizer = Tokenizer::new(Dialect::default()).heading(true);
        let mut records = tokenizer.records("a,b\n1,x\"y\n");
        records.by_ref().for_each(drop);
        let errors = records.into_errors();
        assert_eq!(errors[0].row, 2);
        assert_eq!(errors[0].column, 2);
        assert_eq!(errors[0].field.as_deref(), Some("b"));
    }

    #[test]
    fn test_distinct_escape_character() {
        let dialect = Dialect {
            escape: b'\\',
            ..Dialect::default()
        };
        let tokenizer = Tokenizer::new(dialect);
        assert_eq!(values(&tokenizer, "\"a\\\"b\",c\n"), vec![vec!["a\"b", "c"]]);
    }

    #[test]
    fn test_no_enclosure() {
        let dialect = Dialect {
            quote: Quote::None,
            ..Dialect::default()
        };
        let tokenizer = Tokenizer::new(dialect);
        assert_eq!(
            values(&tokenizer, "\"a\",b\n"),
            vec![vec!["\"a\"", "b"]]
        );
    }

    #[test]
    fn test_tab_delimiter_not_trimmed_as_space() {
        let tokenizer = Tokenizer::new(Dialect::tsv());
        assert_eq!(values(&tokenizer, "\"a\"\t\tc\n"), vec![vec!["a", "", "c"]]);
    }

    #[test]
    fn test_unterminated_enclosure() {
        let tokenizer = Tokenizer::new(Dialect::default());
        let (record, errors) = tokenizer.parse_line("a,\"open", 4, None);
        assert!(record.unterminated);
        assert_eq!(record.row, 4);
        assert_eq!(record.fields[1].value, "open");
        assert_eq!(errors[0].kind, ErrorKind::Anomaly);
    }

    #[test]
    fn test_parse_line_keeps_stray_breaks() {
        let tokenizer = Tokenizer::new(Dialect::default());
        let (record, errors) = tokenizer.parse_line("a\nb,c", 1, None);
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.fields[0].value, "a\nb");
        assert!(errors.is_empty());

        let (empty, _) = tokenizer.parse_line("", 7, None);
        assert!(empty.is_blank());
        assert_eq!(empty.row, 7);
    }

    #[test]
    fn test_into_values() {
        let tokenizer = Tokenizer::new(Dialect::default());
        let record = tokenizer.records("a,,\"\"\n").next().unwrap();
        assert_eq!(
            record.into_values(),
            vec![Some("a".to_string()), None, Some(String::new())]
        );
    }
}
