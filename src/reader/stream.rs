use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace};

use super::RowCursor;
use super::source::{LineSource, Source};
use crate::config::Config;
use crate::dialect::Dialect;
use crate::encoding::{EncodingDetector, EncodingInfo, Transcoding};
use crate::error::{CsvError, Result};
use crate::field_index::FieldIndex;
use crate::filter::RowGate;
use crate::guess::guess_dialect;
use crate::row::{Record, Row};
use crate::sort::sort_and_slice;
use crate::table::Table;
use crate::tokenizer::{ErrorKind, ParseError, Tokenizer, severity};

/// One logical line after tokenizing.
enum Logical {
    Blank,
    Fields(Vec<Option<String>>),
}

/// Streaming row reader.
///
/// Reads one logical line per row, so memory stays bounded by the longest
/// record. Offset, limit and the row condition apply while streaming. A
/// configured sort only takes effect through [`StreamReader::into_table`],
/// which buffers every row.
///
/// # Example
///
/// ```
/// use csv_intake::{Config, StreamReader};
///
/// let data = b"name;qty\nbolt;4\nnut;10\n";
/// let mut config = Config::new();
/// config.condition("qty > 5");
///
/// let reader = StreamReader::from_bytes(data, &config).unwrap();
/// let names: Vec<String> = reader
///     .filter_map(|record| record.unwrap().into_row())
///     .map(|row| row.by_name("name").unwrap().to_string())
///     .collect();
/// assert_eq!(names, ["nut"]);
/// ```
pub struct StreamReader<'a> {
    lines: LineSource<'a>,
    config: Config,
    dialect: Dialect,
    encoding: EncodingInfo,
    tokenizer: Tokenizer,
    header: Option<Vec<String>>,
    index: Option<Arc<FieldIndex>>,
    gate: RowGate,
    current: Option<Record>,
    /// Records surfaced so far, the current one included.
    surfaced: usize,
    /// Whether the iterator already handed out the current record.
    yielded: bool,
    /// Logical records read, header included.
    record_number: usize,
    physical_row: usize,
    errors: Vec<ParseError>,
    finished: bool,
}

impl<'a> StreamReader<'a> {
    /// Open a reader over `source`.
    ///
    /// Sniffs the BOM, samples the source when the encoding or any dialect
    /// part is unset, reads the header and primes the first record.
    pub fn new(source: Source<'a>, config: &Config) -> Result<Self> {
        config.validate()?;
        let (mut lines, bom) = LineSource::open(source)?;
        let bom_length = bom.map_or(0, |(_, len)| len);
        let known_encoding = config.file_encoding.or(bom.map(|(encoding, _)| encoding));

        let needs_sample = known_encoding.is_none() || !config.dialect.is_complete();
        let sample = if needs_sample {
            lines.sample(config.sample_size)?
        } else {
            Vec::new()
        };

        let file_encoding = known_encoding.unwrap_or_else(|| {
            EncodingDetector::new(config.internal_encoding).detect(&sample)
        });
        let encoding = EncodingInfo::new(file_encoding, config.internal_encoding, bom_length);

        let dialect = if config.dialect.is_complete() {
            config.dialect.or_default()
        } else {
            let text = encoding
                .decode(&sample, Transcoding::Lossy)
                .unwrap_or_default();
            guess_dialect(&text, &config.dialect, &config.detection)
        };

        lines.configure(
            dialect.separator_bytes(file_encoding),
            file_encoding,
            config.max_line_bytes,
        );
        debug!(
            encoding = file_encoding.name(),
            bom_length,
            must_transcode = encoding.must_transcode,
            seekable = lines.is_seekable(),
            "opened csv source"
        );

        let gate = if config.streams_slice() {
            RowGate::new(config.offset, config.limit, config.condition.clone())
        } else {
            RowGate::new(0, None, config.condition.clone())
        };

        let mut reader = Self {
            lines,
            config: config.clone(),
            dialect,
            encoding,
            tokenizer: Tokenizer::new(dialect).debug(config.debug),
            header: None,
            index: None,
            gate,
            current: None,
            surfaced: 0,
            yielded: false,
            record_number: 0,
            physical_row: 0,
            errors: Vec::new(),
            finished: false,
        };
        reader.read_header()?;
        reader.advance()?;
        Ok(reader)
    }

    /// Read from a seekable handle. Pass `&mut handle` to keep ownership.
    pub fn from_reader<R: Read + Seek + Send + 'a>(reader: R, config: &Config) -> Result<Self> {
        Self::new(Source::seekable(reader), config)
    }

    /// Read from a forward-only handle such as stdin or a socket.
    pub fn from_stream<R: Read + Send + 'a>(reader: R, config: &Config) -> Result<Self> {
        Self::new(Source::stream(reader), config)
    }

    pub fn from_bytes(data: &'a [u8], config: &Config) -> Result<Self> {
        Self::new(Source::from_bytes(data), config)
    }

    /// Resolved dialect.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn encoding(&self) -> &EncodingInfo {
        &self.encoding
    }

    /// Field names, empty until known.
    pub fn fields(&self) -> &[String] {
        self.index.as_deref().map(FieldIndex::names).unwrap_or_default()
    }

    pub fn field_index(&self) -> Option<&FieldIndex> {
        self.index.as_deref()
    }

    /// Syntax diagnostics recorded so far.
    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// Highest diagnostic severity so far.
    pub fn severity(&self) -> Option<ErrorKind> {
        severity(&self.errors)
    }

    /// Read every remaining record into a [`Table`], applying the configured
    /// sort, offset and limit.
    pub fn into_table(mut self) -> Result<Table> {
        let mut records = self.by_ref().collect::<Result<Vec<_>>>()?;

        if let Some(spec) = &self.config.sort {
            let rows = records.into_iter().filter_map(Record::into_row).collect();
            records = sort_and_slice(rows, spec, self.config.offset, self.config.limit)
                .into_iter()
                .map(Record::Row)
                .collect();
        }

        let index = match self.index {
            Some(index) => index,
            None => Arc::new(FieldIndex::generated(0, &self.config.mapping)?),
        };
        Ok(Table::new(
            self.dialect,
            self.encoding,
            index,
            records,
            self.errors,
        ))
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self.encoding.decode(bytes, self.config.transcoding) {
            Some(text) => Ok(text.into_owned()),
            None => Err(CsvError::Transcode {
                encoding: self.encoding.file_encoding.name(),
                row: self.physical_row,
            }),
        }
    }

    /// Read and tokenize one logical line, joining physical lines while an
    /// enclosure is open.
    fn read_logical(&mut self) -> Result<Option<Logical>> {
        let Some(bytes) = self.lines.read_line()? else {
            return Ok(None);
        };
        self.physical_row += 1;
        let mut text = self.decode(&bytes)?;

        loop {
            let (record, errors) = self.tokenizer.parse_line(
                &text,
                self.record_number + 1,
                self.header.as_deref(),
            );
            if record.unterminated {
                if let Some(more) = self.lines.read_line()? {
                    self.physical_row += 1;
                    text.push_str(self.dialect.line_terminator.as_text());
                    text.push_str(&self.decode(&more)?);
                    continue;
                }
            }

            if record.is_blank() {
                return Ok(Some(Logical::Blank));
            }
            self.record_number += 1;
            self.errors.extend(errors);
            let values = record
                .fields
                .into_iter()
                .map(|field| {
                    let value = field.value.trim();
                    (!value.is_empty()).then(|| value.to_owned())
                })
                .collect();
            return Ok(Some(Logical::Fields(values)));
        }
    }

    fn read_header(&mut self) -> Result<()> {
        if !self.config.heading {
            return Ok(());
        }
        let names: Vec<String> = loop {
            match self.read_logical()? {
                None => break Vec::new(),
                Some(Logical::Blank) => continue,
                Some(Logical::Fields(values)) => {
                    break values.into_iter().map(Option::unwrap_or_default).collect();
                }
            }
        };
        self.index = Some(Arc::new(FieldIndex::build(&names, &self.config.mapping)?));
        debug!(fields = names.len(), "read header row");
        self.header = Some(names);
        Ok(())
    }

    fn index_for(&mut self, width: usize) -> Result<Arc<FieldIndex>> {
        if let Some(index) = &self.index {
            return Ok(index.clone());
        }
        let index = Arc::new(FieldIndex::generated(width, &self.config.mapping)?);
        self.index = Some(index.clone());
        Ok(index)
    }

    /// Move to the next surfaced record.
    pub fn advance(&mut self) -> Result<()> {
        self.current = None;
        self.yielded = false;
        loop {
            if self.finished || self.gate.is_full() {
                self.finished = true;
                return Ok(());
            }
            let Some(line) = self.read_logical()? else {
                self.finished = true;
                return Ok(());
            };

            let record = match line {
                Logical::Blank if self.config.skip_empty_lines => continue,
                Logical::Blank => Record::Blank,
                Logical::Fields(values) => {
                    let index = self.index_for(values.len())?;
                    let row = Row::new(index.project(values), index);
                    if !self.gate.admit(&row) {
                        continue;
                    }
                    Record::Row(row)
                }
            };

            if self.config.debug {
                debug!(position = self.surfaced, physical_row = self.physical_row, "read record");
            }
            self.surfaced += 1;
            self.current = Some(record);
            return Ok(());
        }
    }

    /// Go back to the first record.
    ///
    /// A seekable source is seeked to just past its BOM and the header is
    /// skipped again. A stream cannot be read twice: rewinding it is a
    /// silent no-op, and iteration yields nothing further.
    pub fn rewind(&mut self) -> Result<()> {
        if !self.lines.rewind()? {
            trace!("rewind on a non-seekable source");
            self.current = None;
            self.finished = true;
            return Ok(());
        }

        self.physical_row = 0;
        self.record_number = 0;
        self.surfaced = 0;
        self.errors.clear();
        self.gate.reset();
        self.finished = false;
        if self.config.heading {
            self.read_header()?;
        }
        self.advance()
    }
}

impl StreamReader<'static> {
    /// Open and own the file at `path`; it is closed when the reader drops.
    pub fn from_path<P: AsRef<Path>>(path: P, config: &Config) -> Result<Self> {
        Self::new(Source::from_path(path)?, config)
    }
}

impl RowCursor for StreamReader<'_> {
    fn current(&self) -> Option<&Record> {
        self.current.as_ref()
    }

    fn position(&self) -> usize {
        self.surfaced.saturating_sub(1)
    }

    fn advance(&mut self) -> Result<()> {
        StreamReader::advance(self)
    }

    fn rewind(&mut self) -> Result<()> {
        StreamReader::rewind(self)
    }

    fn is_rewindable(&self) -> bool {
        self.lines.is_seekable()
    }
}

/// Yields each record once. The record is moved out, so
/// [`RowCursor::current`] is `None` after the iterator took it.
impl Iterator for StreamReader<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Result<Record>> {
        if self.yielded {
            if let Err(e) = self.advance() {
                // Skip the failed read on the next call
                self.yielded = true;
                return Some(Err(e));
            }
        }
        self.yielded = true;
        self.current.take().map(Ok)
    }
}
