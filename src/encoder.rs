//! CSV encoding: rows back to bytes.

use crate::dialect::{Dialect, Quote};
use crate::encoding::TextEncoding;
use crate::table::Table;

/// Serializes rows in a dialect.
///
/// A field is enclosed when it contains the delimiter, the enclosure or a
/// line break, or has leading or trailing whitespace. Enclosure characters
/// inside a field are doubled. `None` becomes an empty field; an empty
/// string is written as an empty enclosure so it reads back as `Some("")`.
///
/// # Example
///
/// ```
/// use csv_intake::{Dialect, Encoder};
///
/// let encoder = Encoder::new(Dialect::default());
/// let rows = vec![vec![Some("a,b".to_string()), None]];
/// let out = encoder.encode(&["x", "y"], &rows);
/// assert_eq!(out, b"x,y\n\"a,b\",\n");
/// ```
#[derive(Debug, Clone)]
pub struct Encoder {
    dialect: Dialect,
    heading: bool,
    enclose_all: bool,
    output_encoding: TextEncoding,
}

impl Encoder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            heading: true,
            enclose_all: false,
            output_encoding: TextEncoding::Utf8,
        }
    }

    /// Write the field names as the first row. On by default.
    pub fn heading(&mut self, heading: bool) -> &mut Self {
        self.heading = heading;
        self
    }

    /// Enclose every field, not only those that need it.
    pub fn enclose_all(&mut self, enclose_all: bool) -> &mut Self {
        self.enclose_all = enclose_all;
        self
    }

    /// Encoding of the produced bytes. UTF-8 by default.
    pub fn output_encoding(&mut self, encoding: TextEncoding) -> &mut Self {
        self.output_encoding = encoding;
        self
    }

    /// Encode `rows` under the header `fields`.
    pub fn encode<S, I, R>(&self, fields: &[S], rows: I) -> Vec<u8>
    where
        S: AsRef<str>,
        I: IntoIterator<Item = R>,
        R: AsRef<[Option<String>]>,
    {
        let text = self.encode_to_string(fields, rows);
        self.output_encoding.encode(&text).into_owned()
    }

    /// Encode a single header line, ignoring the heading toggle.
    pub fn encode_header<S: AsRef<str>>(&self, fields: &[S]) -> Vec<u8> {
        let mut out = String::new();
        self.write_row(&mut out, fields.iter().map(|f| Some(f.as_ref())));
        self.output_encoding.encode(&out).into_owned()
    }

    /// Encode a single row, for writing while streaming.
    pub fn encode_row(&self, values: &[Option<String>]) -> Vec<u8> {
        let mut out = String::new();
        self.write_row(&mut out, values.iter().map(Option::as_deref));
        self.output_encoding.encode(&out).into_owned()
    }

    /// Encode the rows of a parsed table. Blank records are written as
    /// empty lines.
    pub fn encode_table(&self, table: &Table) -> Vec<u8> {
        let mut out = String::new();
        if self.heading {
            self.write_row(&mut out, table.fields().iter().map(|f| Some(f.as_str())));
        }
        for record in table {
            match record.as_row() {
                Some(row) => self.write_row(&mut out, row.values().iter().map(Option::as_deref)),
                None => out.push_str(self.dialect.line_terminator.as_text()),
            }
        }
        self.output_encoding.encode(&out).into_owned()
    }

    /// Encode to text, before applying the output encoding.
    pub fn encode_to_string<S, I, R>(&self, fields: &[S], rows: I) -> String
    where
        S: AsRef<str>,
        I: IntoIterator<Item = R>,
        R: AsRef<[Option<String>]>,
    {
        let mut out = String::new();
        if self.heading {
            self.write_row(&mut out, fields.iter().map(|f| Some(f.as_ref())));
        }
        for row in rows {
            self.write_row(&mut out, row.as_ref().iter().map(Option::as_deref));
        }
        out
    }

    fn write_row<'v>(&self, out: &mut String, values: impl Iterator<Item = Option<&'v str>>) {
        let delimiter = char::from(self.dialect.delimiter);
        for (i, value) in values.enumerate() {
            if i > 0 {
                out.push(delimiter);
            }
            if let Some(value) = value {
                self.write_field(out, value);
            }
        }
        out.push_str(self.dialect.line_terminator.as_text());
    }

    fn write_field(&self, out: &mut String, value: &str) {
        let Quote::Some(q) = self.dialect.quote else {
            out.push_str(value);
            return;
        };
        let quote = char::from(q);
        if !self.enclose_all && !self.needs_enclosure(value, quote) {
            out.push_str(value);
            return;
        }

        out.push(quote);
        for c in value.chars() {
            if c == quote {
                out.push(quote);
            }
            out.push(c);
        }
        out.push(quote);
    }

    fn needs_enclosure(&self, value: &str, quote: char) -> bool {
        let delimiter = char::from(self.dialect.delimiter);
        value.is_empty()
            || value.starts_with(char::is_whitespace)
            || value.ends_with(char::is_whitespace)
            || value.contains([delimiter, quote, '\r', '\n'])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dialect::LineTerminator;

    fn row(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_owned)).collect()
    }

    #[test]
    fn test_plain_fields_unenclosed() {
        let encoder = Encoder::new(Dialect::default());
        let out = encoder.encode_to_string(&["a", "b"], [row(&[Some("1"), Some("2")])]);
        assert_eq!(out, "a,b\n1,2\n");
    }

    #[test]
    fn test_special_fields_enclosed() {
        let encoder = Encoder::new(Dialect::default());
        let out = encoder.encode_to_string(
            &["v"],
            [
                row(&[Some("say \"hi\"")]),
                row(&[Some("two\nlines")]),
                row(&[Some(" padded")]),
                row(&[Some("")]),
                row(&[None]),
            ],
        );
        assert_eq!(out, "v\n\"say \"\"hi\"\"\"\n\"two\nlines\"\n\" padded\"\n\"\"\n\n");
    }

    #[test]
    fn test_enclose_all_and_terminator() {
        let dialect = Dialect {
            delimiter: b';',
            line_terminator: LineTerminator::CRLF,
            ..Dialect::default()
        };
        let mut encoder = Encoder::new(dialect);
        encoder.enclose_all(true).heading(false);
        let out = encoder.encode_to_string::<&str, _, _>(&[], [row(&[Some("a"), None])]);
        assert_eq!(out, "\"a\";\r\n");
    }

    #[test]
    fn test_output_encoding() {
        let mut encoder = Encoder::new(Dialect::default());
        encoder.heading(false).output_encoding(TextEncoding::Utf16Le);
        let out = encoder.encode::<&str, _, _>(&[], [row(&[Some("a")])]);
        assert_eq!(out, vec![b'a', 0, b'\n', 0]);
    }

    #[test]
    fn test_table_round_trip() {
        let input = "id,note\n1,\"a, b\"\n2,\"x \"\"y\"\"\"\n";
        let table = Table::parse_str(input, &Config::new()).unwrap();
        let out = Encoder::new(*table.dialect()).encode_table(&table);
        assert_eq!(String::from_utf8(out).unwrap(), input);
    }
}
