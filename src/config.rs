//! Reader configuration.

use crate::dialect::{LineTerminator, Quote};
use crate::encoding::{TextEncoding, Transcoding};
use crate::error::{CsvError, Result};
use crate::field_index::FieldMapping;
use crate::filter::Condition;
use crate::guess::{Detection, PartialDialect, StatisticalGuesser};
use crate::sample::SampleSize;
use crate::sort::{SortPolicy, SortSpec};

/// Reader configuration.
///
/// Every dialect part left unset is guessed from a sample of the source.
///
/// # Example
///
/// ```
/// use csv_intake::{Config, Quote};
///
/// let mut config = Config::new();
/// config.delimiter(b';').quote(Quote::Some(b'\'')).limit(10);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) dialect: PartialDialect,
    pub(crate) file_encoding: Option<TextEncoding>,
    pub(crate) internal_encoding: TextEncoding,
    pub(crate) debug: bool,
    pub(crate) max_line_bytes: Option<usize>,
    pub(crate) skip_empty_lines: bool,
    pub(crate) heading: bool,
    pub(crate) mapping: FieldMapping,
    pub(crate) sample_size: SampleSize,
    pub(crate) transcoding: Transcoding,
    pub(crate) detection: Detection,
    pub(crate) condition: Option<Condition>,
    pub(crate) offset: usize,
    pub(crate) limit: Option<usize>,
    pub(crate) sort: Option<SortSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Create a configuration with every part detected automatically.
    pub fn new() -> Self {
        Self {
            dialect: PartialDialect::default(),
            file_encoding: None,
            internal_encoding: TextEncoding::Utf8,
            debug: false,
            max_line_bytes: None,
            skip_empty_lines: false,
            heading: true,
            mapping: FieldMapping::new(),
            sample_size: SampleSize::default(),
            transcoding: Transcoding::default(),
            detection: Detection::default(),
            condition: None,
            offset: 0,
            limit: None,
            sort: None,
        }
    }

    /// Build a configuration from string key/value pairs.
    ///
    /// Unknown keys and unparseable values are errors.
    pub fn from_options<I, K, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::new();
        for (key, value) in options {
            config.set_option(key.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    /// Apply one string option.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<&mut Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "delimiter" | "separator" => {
                self.delimiter(parse_byte(key, value)?);
            }
            "enclosure" | "quote" => {
                let quote = if value.is_empty() || value.eq_ignore_ascii_case("none") {
                    Quote::None
                } else {
                    Quote::Some(parse_byte(key, value)?)
                };
                self.quote(quote);
            }
            "escape" => {
                self.escape(parse_byte(key, value)?);
            }
            "file_encoding" | "input_encoding" | "encoding" => {
                self.file_encoding(parse_encoding(key, value)?);
            }
            "internal_encoding" => {
                self.internal_encoding(parse_encoding(key, value)?);
            }
            "line_terminator" | "line_separator" => {
                let terminator = LineTerminator::from_name(value)
                    .ok_or_else(|| invalid(key, value))?;
                self.line_terminator(terminator);
            }
            "debug" => {
                self.debug(parse_bool(key, value)?);
            }
            "max_line_bytes" | "line_length" => {
                self.max_line_bytes(parse_usize(key, value)?);
            }
            "skip_empty_lines" => {
                self.skip_empty_lines(parse_bool(key, value)?);
            }
            "heading" | "header" => {
                self.heading(parse_bool(key, value)?);
            }
            "aliases" => {
                for pair in value.split(',').filter(|p| !p.trim().is_empty()) {
                    let (from, to) = pair.split_once(':').ok_or_else(|| invalid(key, value))?;
                    self.alias(from.trim(), to.trim());
                }
            }
            "include" | "fields" => {
                self.include(value.split(',').map(str::trim).filter(|f| !f.is_empty()));
            }
            "sample_records" => {
                self.sample_size(SampleSize::Records(parse_usize(key, value)?));
            }
            "sample_bytes" => {
                self.sample_size(SampleSize::Bytes(parse_usize(key, value)?));
            }
            "strict_transcoding" => {
                let mode = if parse_bool(key, value)? {
                    Transcoding::Strict
                } else {
                    Transcoding::Lossy
                };
                self.transcoding(mode);
            }
            "detection" => {
                let detection = match value.trim().to_ascii_lowercase().as_str() {
                    "first_line" | "first-line" | "simple" => Detection::FirstLine,
                    "statistical" | "auto" => Detection::Statistical(StatisticalGuesser::default()),
                    _ => return Err(invalid(key, value)),
                };
                self.detection(detection);
            }
            "conditions" | "condition" | "where" => {
                self.condition(value);
            }
            "offset" => {
                self.offset(parse_usize(key, value)?);
            }
            "limit" => {
                self.limit(parse_usize(key, value)?);
            }
            "sort_by" => {
                let spec = self.sort.take().unwrap_or_else(|| SortSpec::new(""));
                self.sort(SortSpec {
                    field: value.trim().to_owned(),
                    ..spec
                });
            }
            "sort_reverse" | "sort_descending" => {
                let descending = parse_bool(key, value)?;
                let spec = self.sort.take().unwrap_or_else(|| SortSpec::new(""));
                self.sort(spec.descending(descending));
            }
            "sort_type" | "sort_policy" => {
                let policy = SortPolicy::from_name(value).ok_or_else(|| invalid(key, value))?;
                let spec = self.sort.take().unwrap_or_else(|| SortSpec::new(""));
                self.sort(spec.policy(policy));
            }
            _ => return Err(CsvError::config(format!("unknown option '{key}'"))),
        }
        Ok(self)
    }

    /// Use `delimiter` instead of detecting it.
    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.dialect.delimiter = Some(delimiter);
        self
    }

    /// Use `quote` as the enclosure instead of detecting it.
    pub fn quote(&mut self, quote: Quote) -> &mut Self {
        self.dialect.quote = Some(quote);
        self
    }

    /// Set the escape character used inside enclosed fields.
    pub fn escape(&mut self, escape: u8) -> &mut Self {
        self.dialect.escape = Some(escape);
        self
    }

    /// Use `terminator` instead of detecting it.
    pub fn line_terminator(&mut self, terminator: LineTerminator) -> &mut Self {
        self.dialect.line_terminator = Some(terminator);
        self
    }

    /// Decode the source as `encoding`, skipping detection. A BOM is still
    /// skipped.
    pub fn file_encoding(&mut self, encoding: TextEncoding) -> &mut Self {
        self.file_encoding = Some(encoding);
        self
    }

    /// Encoding of produced rows. Only UTF-8 is supported.
    pub fn internal_encoding(&mut self, encoding: TextEncoding) -> &mut Self {
        self.internal_encoding = encoding;
        self
    }

    /// Emit a debug event per row and per syntax anomaly.
    pub fn debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    /// Cap the bytes read per physical line. The remainder of a longer line
    /// is delivered by the next read.
    pub fn max_line_bytes(&mut self, max: usize) -> &mut Self {
        self.max_line_bytes = Some(max);
        self
    }

    /// Drop empty lines instead of surfacing them as [`Record::Blank`](crate::Record::Blank).
    pub fn skip_empty_lines(&mut self, skip: bool) -> &mut Self {
        self.skip_empty_lines = skip;
        self
    }

    /// Whether the first non-blank line is a header row. On by default.
    pub fn heading(&mut self, heading: bool) -> &mut Self {
        self.heading = heading;
        self
    }

    /// Rename header `from` (case-insensitive) to `to`.
    pub fn alias(&mut self, from: &str, to: &str) -> &mut Self {
        self.mapping.alias(from, to);
        self
    }

    /// Normalize header names before alias lookup.
    pub fn normalizer<F>(&mut self, normalizer: F) -> &mut Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.mapping.normalizer(normalizer);
        self
    }

    /// Keep only these fields, in this order.
    pub fn include<I, S>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mapping.include(fields);
        self
    }

    /// Set the inspection sample used for detection.
    pub fn sample_size(&mut self, sample_size: SampleSize) -> &mut Self {
        self.sample_size = sample_size;
        self
    }

    /// Lossy (default) or strict transcoding.
    pub fn transcoding(&mut self, transcoding: Transcoding) -> &mut Self {
        self.transcoding = transcoding;
        self
    }

    /// Delimiter detection strategy.
    pub fn detection(&mut self, detection: Detection) -> &mut Self {
        self.detection = detection;
        self
    }

    /// Only surface rows matching `condition`. See [`Condition::parse`].
    pub fn condition(&mut self, condition: &str) -> &mut Self {
        let parsed = Condition::parse(condition);
        self.condition = (!parsed.is_empty()).then_some(parsed);
        self
    }

    /// Skip this many data rows, counted before filtering.
    pub fn offset(&mut self, offset: usize) -> &mut Self {
        self.offset = offset;
        self
    }

    /// Surface at most this many rows.
    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    /// Sort rows before offset and limit apply. Sorting buffers every row.
    pub fn sort(&mut self, spec: SortSpec) -> &mut Self {
        self.sort = Some(spec);
        self
    }

    /// Check the configuration for contradictions.
    pub fn validate(&self) -> Result<()> {
        if self.internal_encoding != TextEncoding::Utf8 {
            return Err(CsvError::config(format!(
                "internal encoding must be UTF-8, got {}",
                self.internal_encoding
            )));
        }
        let dialect = self.dialect.or_default();
        // Fields are split on UTF-8 bytes, where only ASCII stands alone
        let parts = [
            ("delimiter", Some(dialect.delimiter)),
            ("enclosure", dialect.quote.char()),
            ("escape", Some(dialect.escape)),
        ];
        for (name, byte) in parts {
            if let Some(byte) = byte.filter(|b| !b.is_ascii()) {
                return Err(CsvError::config(format!(
                    "{name} must be an ASCII character, got 0x{byte:02X}"
                )));
            }
        }
        if matches!(dialect.delimiter, b'\n' | b'\r') {
            return Err(CsvError::config("delimiter cannot be a line break"));
        }
        if dialect.quote.char() == Some(dialect.delimiter) {
            return Err(CsvError::config("delimiter and enclosure must differ"));
        }
        if self.max_line_bytes == Some(0) {
            return Err(CsvError::config("max_line_bytes must be positive"));
        }
        if let Some(spec) = &self.sort {
            if spec.field.is_empty() {
                return Err(CsvError::config("sort requires a field"));
            }
        }
        Ok(())
    }

    /// Whether offset and limit apply while streaming, rather than after
    /// sorting.
    pub(crate) fn streams_slice(&self) -> bool {
        self.sort.is_none()
    }
}

fn invalid(key: &str, value: &str) -> CsvError {
    CsvError::config(format!("invalid value '{value}' for option '{key}'"))
}

fn parse_byte(key: &str, value: &str) -> Result<u8> {
    match value {
        "\\t" | "tab" => Ok(b'\t'),
        v if v.len() == 1 && v.is_ascii() => Ok(v.as_bytes()[0]),
        _ => Err(invalid(key, value)),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_encoding(key: &str, value: &str) -> Result<TextEncoding> {
    TextEncoding::from_label(value).ok_or_else(|| invalid(key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert!(config.heading);
        assert!(!config.skip_empty_lines);
        assert_eq!(config.internal_encoding, TextEncoding::Utf8);
        assert_eq!(config.transcoding, Transcoding::Lossy);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_options() {
        let config = Config::from_options([
            ("delimiter", ";"),
            ("enclosure", "'"),
            ("file_encoding", "latin1"),
            ("line_terminator", "\\r\\n"),
            ("heading", "false"),
            ("limit", "5"),
            ("conditions", "a = 1"),
            ("sort_by", "a"),
            ("sort_type", "natural"),
        ])
        .unwrap();
        assert_eq!(config.dialect.delimiter, Some(b';'));
        assert_eq!(config.dialect.quote, Some(Quote::Some(b'\'')));
        assert_eq!(config.file_encoding, Some(TextEncoding::Iso8859_1));
        assert_eq!(config.dialect.line_terminator, Some(LineTerminator::CRLF));
        assert!(!config.heading);
        assert_eq!(config.limit, Some(5));
        assert!(config.condition.is_some());
        assert_eq!(
            config.sort,
            Some(SortSpec::new("a").policy(SortPolicy::Natural))
        );
    }

    #[test]
    fn test_unknown_option_is_fatal() {
        let err = Config::from_options([("colour", "red")]).unwrap_err();
        assert!(matches!(err, CsvError::InvalidConfig(msg) if msg.contains("colour")));
    }

    #[test]
    fn test_bad_values_are_fatal() {
        assert!(Config::from_options([("delimiter", ";;")]).is_err());
        assert!(Config::from_options([("limit", "many")]).is_err());
        assert!(Config::from_options([("file_encoding", "klingon")]).is_err());
        assert!(Config::from_options([("detection", "psychic")]).is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = Config::new();
        config.internal_encoding(TextEncoding::Utf16Le);
        assert!(matches!(config.validate(), Err(CsvError::InvalidConfig(_))));

        let mut config = Config::new();
        config.delimiter(b'"');
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.max_line_bytes(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_ascii_dialect_bytes_rejected() {
        let mut config = Config::new();
        config.delimiter(0xA9);
        assert!(matches!(config.validate(), Err(CsvError::InvalidConfig(msg)) if msg.contains("delimiter")));

        let mut config = Config::new();
        config.quote(Quote::Some(0xE9));
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.escape(0x80);
        assert!(config.validate().is_err());

        assert!(Config::from_options([("delimiter", "\u{a9}")]).is_err());
    }

    #[test]
    fn test_empty_quote_option() {
        let config = Config::from_options([("enclosure", "")]).unwrap();
        assert_eq!(config.dialect.quote, Some(Quote::None));
    }
}
