//! Whole-buffer parsing into a materialized table.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::dialect::Dialect;
use crate::encoding::{EncodingInfo, TextEncoding, transcode_buffer};
use crate::error::Result;
use crate::field_index::FieldIndex;
use crate::filter::RowGate;
use crate::guess::guess_dialect;
use crate::reader::RowCursor;
use crate::row::{Record, Row};
use crate::sort::sort_and_slice;
use crate::tokenizer::{ErrorKind, ParseError, Tokenizer, severity};

/// A fully parsed CSV document.
#[derive(Debug, Clone)]
pub struct Table {
    dialect: Dialect,
    encoding: EncodingInfo,
    index: Arc<FieldIndex>,
    records: Vec<Record>,
    errors: Vec<ParseError>,
}

impl Table {
    pub(crate) fn new(
        dialect: Dialect,
        encoding: EncodingInfo,
        index: Arc<FieldIndex>,
        records: Vec<Record>,
        errors: Vec<ParseError>,
    ) -> Self {
        Self {
            dialect,
            encoding,
            index,
            records,
            errors,
        }
    }

    /// Parse a whole byte buffer.
    ///
    /// The encoding is taken from the BOM or configuration, or detected.
    /// Unset dialect parts are guessed from the configured sample.
    pub fn parse_bytes(data: &[u8], config: &Config) -> Result<Self> {
        config.validate()?;
        let (text, encoding) = transcode_buffer(data, config.file_encoding, config.transcoding)?;
        Self::assemble(&text, encoding, config)
    }

    /// Parse text that is already decoded.
    pub fn parse_str(text: &str, config: &Config) -> Result<Self> {
        config.validate()?;
        let encoding = EncodingInfo::new(TextEncoding::Utf8, TextEncoding::Utf8, 0);
        Self::assemble(text, encoding, config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P, config: &Config) -> Result<Self> {
        let data = fs::read(path)?;
        Self::parse_bytes(&data, config)
    }

    /// Read `reader` to the end and parse the result.
    pub fn from_reader<R: Read>(mut reader: R, config: &Config) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::parse_bytes(&data, config)
    }

    fn assemble(text: &str, encoding: EncodingInfo, config: &Config) -> Result<Self> {
        let dialect = if config.dialect.is_complete() {
            config.dialect.or_default()
        } else {
            let sample = config.sample_size.slice(text);
            guess_dialect(sample, &config.dialect, &config.detection)
        };

        let tokenizer = Tokenizer::new(dialect)
            .heading(config.heading)
            .debug(config.debug);
        let streams = config.streams_slice();
        let mut gate = if streams {
            RowGate::new(config.offset, config.limit, config.condition.clone())
        } else {
            RowGate::new(0, None, config.condition.clone())
        };

        let mut index: Option<Arc<FieldIndex>> = None;
        let mut records = Vec::new();
        let mut raw = tokenizer.records(text);

        for record in raw.by_ref() {
            if record.is_header {
                let names: Vec<&str> = record.fields.iter().map(|f| f.value.as_str()).collect();
                index = Some(Arc::new(FieldIndex::build(&names, &config.mapping)?));
                continue;
            }
            if record.is_blank() {
                if streams && !config.skip_empty_lines {
                    records.push(Record::Blank);
                }
                continue;
            }

            let shared = match index.clone() {
                Some(shared) => shared,
                None => {
                    let built = Arc::new(FieldIndex::generated(record.fields.len(), &config.mapping)?);
                    index = Some(built.clone());
                    built
                }
            };
            let row = Row::new(shared.project(record.into_values()), shared);
            if gate.admit(&row) {
                records.push(Record::Row(row));
                if gate.is_full() {
                    break;
                }
            }
        }
        let errors = raw.into_errors();

        if let Some(spec) = &config.sort {
            let rows = records.into_iter().filter_map(Record::into_row).collect();
            records = sort_and_slice(rows, spec, config.offset, config.limit)
                .into_iter()
                .map(Record::Row)
                .collect();
        }

        let index = match index {
            Some(index) => index,
            None => Arc::new(FieldIndex::build::<&str>(&[], &config.mapping)?),
        };
        debug!(records = records.len(), errors = errors.len(), "parsed table");
        Ok(Self::new(dialect, encoding, index, records, errors))
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn encoding(&self) -> &EncodingInfo {
        &self.encoding
    }

    /// Field names in output order.
    pub fn fields(&self) -> &[String] {
        self.index.names()
    }

    pub fn field_index(&self) -> &FieldIndex {
        &self.index
    }

    /// All surfaced records, blank lines included.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Data rows, skipping blank lines.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.records.iter().filter_map(Record::as_row)
    }

    pub fn get(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }

    /// Number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// Highest diagnostic severity, `None` for a clean parse.
    pub fn severity(&self) -> Option<ErrorKind> {
        severity(&self.errors)
    }

    pub fn cursor(&self) -> TableCursor<'_> {
        TableCursor {
            table: self,
            position: 0,
        }
    }
}

impl<'t> IntoIterator for &'t Table {
    type Item = &'t Record;
    type IntoIter = std::slice::Iter<'t, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Cursor over the records of a [`Table`].
#[derive(Debug, Clone)]
pub struct TableCursor<'t> {
    table: &'t Table,
    position: usize,
}

impl RowCursor for TableCursor<'_> {
    fn current(&self) -> Option<&Record> {
        self.table.get(self.position)
    }

    fn position(&self) -> usize {
        self.position
    }

    fn advance(&mut self) -> Result<()> {
        self.position = (self.position + 1).min(self.table.len());
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn is_rewindable(&self) -> bool {
        true
    }
}
