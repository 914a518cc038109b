//! Byte sources and physical line reads.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::trace;

use crate::encoding::{TextEncoding, sniff_bom};
use crate::sample::SampleSize;

/// Upper bound on bytes read per requested sample line, so a file without
/// LF bytes is not read whole while sampling.
const SAMPLE_LINE_BYTES: usize = 4096;

/// Object-safe `Read + Seek`.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Where a reader pulls bytes from.
///
/// Handles may be borrowed (`&mut File`), in which case closing them stays
/// with the caller.
pub enum Source<'a> {
    /// Random-access source. Rewinding seeks back to the data start.
    Seekable(Box<dyn ReadSeek + Send + 'a>),
    /// Forward-only source such as a pipe or a network body.
    Stream(Box<dyn Read + Send + 'a>),
}

impl<'a> Source<'a> {
    pub fn seekable<R: Read + Seek + Send + 'a>(reader: R) -> Self {
        Source::Seekable(Box::new(reader))
    }

    pub fn stream<R: Read + Send + 'a>(reader: R) -> Self {
        Source::Stream(Box::new(reader))
    }

    /// In-memory bytes, seekable.
    pub fn from_bytes(data: &'a [u8]) -> Self {
        Source::seekable(Cursor::new(data))
    }

    #[inline]
    pub fn is_seekable(&self) -> bool {
        matches!(self, Source::Seekable(_))
    }
}

impl Source<'static> {
    /// Open a file. The file is closed when the source is dropped.
    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Source::seekable(File::open(path)?))
    }
}

impl Read for Source<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Seekable(inner) => inner.read(buf),
            Source::Stream(inner) => inner.read(buf),
        }
    }
}

impl Seek for Source<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Source::Seekable(inner) => inner.seek(pos),
            Source::Stream(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "source is not seekable",
            )),
        }
    }
}

/// Lines read ahead from a non-seekable source while sniffing.
///
/// Drained in order by the first reads, never refilled.
#[derive(Debug, Default)]
struct InitialLineBuffer {
    lines: VecDeque<Vec<u8>>,
    /// Bytes after the last complete line; the start of the next one.
    tail: Vec<u8>,
}

impl InitialLineBuffer {
    fn split(raw: &[u8], separator: &[u8], unit: usize) -> Self {
        let mut lines = VecDeque::new();
        let mut start = 0;
        let mut i = 0;
        while i + separator.len() <= raw.len() {
            if raw[i..].starts_with(separator) {
                lines.push_back(raw[start..i].to_vec());
                i += separator.len();
                start = i;
            } else {
                i += unit;
            }
        }
        Self {
            lines,
            tail: raw[start..].to_vec(),
        }
    }
}

/// Read until `buf` is full or the input ends.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Physical line reader over a [`Source`].
///
/// Lines end at the on-wire separator of the resolved dialect; for UTF-16
/// and UTF-32 only separators aligned to the code unit count.
pub(crate) struct LineSource<'a> {
    inner: BufReader<Source<'a>>,
    seekable: bool,
    /// Offset just past the BOM.
    data_start: u64,
    /// Bytes consumed from a non-seekable source but not yet delivered.
    pending: Vec<u8>,
    initial: InitialLineBuffer,
    separator: Vec<u8>,
    encoding: TextEncoding,
    unit: usize,
    max_line_bytes: Option<usize>,
}

impl<'a> LineSource<'a> {
    /// Wrap `source` and consume its byte-order mark, if any.
    pub(crate) fn open(source: Source<'a>) -> io::Result<(Self, Option<(TextEncoding, usize)>)> {
        let seekable = source.is_seekable();
        let mut inner = BufReader::new(source);
        let start = if seekable { inner.stream_position()? } else { 0 };

        let mut prefix = [0u8; 4];
        let read = read_up_to(&mut inner, &mut prefix)?;
        let bom = sniff_bom(&prefix[..read]);
        let bom_length = bom.map_or(0, |(_, len)| len);
        let data_start = start + bom_length as u64;

        let mut pending = Vec::new();
        if seekable {
            inner.seek(SeekFrom::Start(data_start))?;
        } else {
            pending.extend_from_slice(&prefix[bom_length..read]);
        }

        let lines = Self {
            inner,
            seekable,
            data_start,
            pending,
            initial: InitialLineBuffer::default(),
            separator: b"\n".to_vec(),
            encoding: TextEncoding::Utf8,
            unit: 1,
            max_line_bytes: None,
        };
        Ok((lines, bom))
    }

    #[inline]
    pub(crate) fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// Read an inspection sample without losing it.
    ///
    /// A seekable source is seeked back to the data start; a stream keeps
    /// the sample for delivery by the first line reads.
    pub(crate) fn sample(&mut self, size: SampleSize) -> io::Result<Vec<u8>> {
        let mut sample = std::mem::take(&mut self.pending);
        match size {
            SampleSize::All => {
                self.inner.read_to_end(&mut sample)?;
            }
            SampleSize::Bytes(n) => {
                let wanted = n.saturating_sub(sample.len()) as u64;
                (&mut self.inner).take(wanted).read_to_end(&mut sample)?;
            }
            SampleSize::Records(n) => {
                let cap = n.saturating_mul(SAMPLE_LINE_BYTES);
                let mut lines = bytecount::count(&sample, b'\n');
                while !size.is_satisfied(lines, sample.len()) && sample.len() < cap {
                    let budget = (cap - sample.len()) as u64;
                    if (&mut self.inner).take(budget).read_until(b'\n', &mut sample)? == 0 {
                        break;
                    }
                    lines += 1;
                }
            }
        }
        trace!(bytes = sample.len(), "read inspection sample");

        if self.seekable {
            self.inner.seek(SeekFrom::Start(self.data_start))?;
        } else {
            self.pending = sample.clone();
        }
        Ok(sample)
    }

    /// Fix the line separator once the dialect and encoding are known.
    pub(crate) fn configure(
        &mut self,
        separator: Vec<u8>,
        encoding: TextEncoding,
        max_line_bytes: Option<usize>,
    ) {
        let unit = encoding.unit_width();
        self.initial = InitialLineBuffer::split(&std::mem::take(&mut self.pending), &separator, unit);
        self.separator = separator;
        self.encoding = encoding;
        self.unit = unit;
        self.max_line_bytes = max_line_bytes.map(|max| (max - max % unit).max(unit));
    }

    /// Next physical line without its separator, or `None` at end of input.
    pub(crate) fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if let Some(mut line) = self.initial.lines.pop_front() {
            if let Some(max) = self.max_line_bytes {
                if line.len() > max {
                    let rest = line.split_off(self.split_point(&line, max));
                    self.initial.lines.push_front(rest);
                }
            }
            return Ok(Some(line));
        }

        let mut line = std::mem::take(&mut self.initial.tail);
        let terminated = self.read_raw(&mut line)?;
        if terminated {
            line.truncate(line.len() - self.separator.len());
        } else if line.is_empty() {
            return Ok(None);
        }

        if let Some(max) = self.max_line_bytes {
            if line.len() > max {
                // The remainder goes to the next read
                let mut rest = line.split_off(self.split_point(&line, max));
                if terminated {
                    rest.extend_from_slice(&self.separator);
                    self.initial = InitialLineBuffer::split(&rest, &self.separator, self.unit);
                } else {
                    self.initial.tail = rest;
                }
            }
        }
        Ok(Some(line))
    }

    /// Where to cut a capped line so no character is split: the last
    /// boundary at or below `max`, or the end of the first character when
    /// that character alone is longer than `max`.
    fn split_point(&self, line: &[u8], max: usize) -> usize {
        let mut at = max.min(line.len());
        match self.encoding {
            TextEncoding::Utf8 | TextEncoding::Ascii => {
                let continuation = |b: u8| b & 0xC0 == 0x80;
                while at > 0 && at < line.len() && continuation(line[at]) {
                    at -= 1;
                }
                if at == 0 {
                    at = 1;
                    while at < line.len() && continuation(line[at]) {
                        at += 1;
                    }
                }
            }
            TextEncoding::Utf16Le | TextEncoding::Utf16Be if at >= 2 => {
                let pair = [line[at - 2], line[at - 1]];
                let unit = match self.encoding {
                    TextEncoding::Utf16Le => u16::from_le_bytes(pair),
                    _ => u16::from_be_bytes(pair),
                };
                // Keep a surrogate pair together
                if (0xD800..0xDC00).contains(&unit) {
                    at = if at > 2 { at - 2 } else { (at + 2).min(line.len()) };
                }
            }
            _ => {}
        }
        at
    }

    /// Append bytes up to and including the next aligned separator.
    ///
    /// Returns false when the input ended or the line cap was hit first.
    fn read_raw(&mut self, buf: &mut Vec<u8>) -> io::Result<bool> {
        if self.ends_with_separator(buf) {
            return Ok(true);
        }
        let last = self.separator.last().copied().unwrap_or(b'\n');
        let limit = self.max_line_bytes.map(|max| max + self.separator.len());
        loop {
            let read = match limit {
                Some(limit) if buf.len() >= limit => return Ok(false),
                Some(limit) => {
                    let budget = (limit - buf.len()) as u64;
                    (&mut self.inner).take(budget).read_until(last, buf)?
                }
                None => self.inner.read_until(last, buf)?,
            };
            if read == 0 {
                return Ok(false);
            }
            if self.ends_with_separator(buf) {
                return Ok(true);
            }
        }
    }

    fn ends_with_separator(&self, buf: &[u8]) -> bool {
        buf.len() >= self.separator.len()
            && buf.ends_with(&self.separator)
            && (buf.len() - self.separator.len()) % self.unit == 0
    }

    /// Seek back to just past the BOM. Returns false for a stream, which
    /// cannot be read again.
    pub(crate) fn rewind(&mut self) -> io::Result<bool> {
        if !self.seekable {
            return Ok(false);
        }
        self.inner.seek(SeekFrom::Start(self.data_start))?;
        self.initial = InitialLineBuffer::default();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(source: &mut LineSource<'_>) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| source.read_line().unwrap()).collect()
    }

    #[test]
    fn test_bom_skipped_on_seekable() {
        let data = b"\xEF\xBB\xBFa,b\nc,d\n";
        let (mut source, bom) = LineSource::open(Source::from_bytes(data)).unwrap();
        assert_eq!(bom, Some((TextEncoding::Utf8, 3)));
        source.configure(b"\n".to_vec(), TextEncoding::Utf8, None);
        assert_eq!(lines(&mut source), vec![b"a,b".to_vec(), b"c,d".to_vec()]);
    }

    #[test]
    fn test_stream_redelivers_prefix_and_sample() {
        let data: &[u8] = b"ab\ncd\nef";
        let (mut source, bom) = LineSource::open(Source::stream(data)).unwrap();
        assert_eq!(bom, None);
        // BOM detection already consumed four bytes, which hold one line
        let sample = source.sample(SampleSize::Records(1)).unwrap();
        assert_eq!(sample, b"ab\nc");
        source.configure(b"\n".to_vec(), TextEncoding::Utf8, None);
        assert_eq!(
            lines(&mut source),
            vec![b"ab".to_vec(), b"cd".to_vec(), b"ef".to_vec()]
        );
        assert!(!source.rewind().unwrap());
    }

    #[test]
    fn test_record_sample_stops_at_count() {
        let data: &[u8] = b"a\nb\nc\nd\n";
        let (mut source, _) = LineSource::open(Source::stream(data)).unwrap();
        assert_eq!(source.sample(SampleSize::Records(3)).unwrap(), b"a\nb\nc\n");
        source.configure(b"\n".to_vec(), TextEncoding::Utf8, None);
        assert_eq!(lines(&mut source).len(), 4);
    }

    #[test]
    fn test_seekable_sample_seeks_back() {
        let data = b"x;y\n1;2\n";
        let (mut source, _) = LineSource::open(Source::from_bytes(data)).unwrap();
        assert_eq!(source.sample(SampleSize::All).unwrap(), data);
        source.configure(b"\n".to_vec(), TextEncoding::Utf8, None);
        assert_eq!(lines(&mut source).len(), 2);
        assert!(source.rewind().unwrap());
        assert_eq!(source.read_line().unwrap(), Some(b"x;y".to_vec()));
    }

    #[test]
    fn test_utf16_separator_alignment() {
        // "\u{0A0A}" is 0A 0A in UTF-16LE; only the aligned 0A 00 ends a line
        let mut data = vec![0xFF, 0xFE];
        for unit in [0x0061u16, 0x0A0A, 0x000A, 0x0062, 0x000A] {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        let (mut source, bom) = LineSource::open(Source::from_bytes(&data)).unwrap();
        assert_eq!(bom, Some((TextEncoding::Utf16Le, 2)));
        source.configure(vec![0x0A, 0x00], TextEncoding::Utf16Le, None);
        assert_eq!(
            lines(&mut source),
            vec![vec![0x61, 0x00, 0x0A, 0x0A], vec![0x62, 0x00]]
        );
    }

    #[test]
    fn test_max_line_bytes_delivers_remainder() {
        let data = b"abcdef\ngh\n";
        let (mut source, _) = LineSource::open(Source::from_bytes(data)).unwrap();
        source.configure(b"\n".to_vec(), TextEncoding::Utf8, Some(4));
        assert_eq!(
            lines(&mut source),
            vec![b"abcd".to_vec(), b"ef".to_vec(), b"gh".to_vec()]
        );
    }

    #[test]
    fn test_max_line_bytes_keeps_utf8_characters_whole() {
        let data = "h\n\u{e9}\u{e9}\u{e9}\u{e9}\n".as_bytes();
        let (mut source, _) = LineSource::open(Source::from_bytes(data)).unwrap();
        source.configure(b"\n".to_vec(), TextEncoding::Utf8, Some(5));
        let got: Vec<String> = lines(&mut source)
            .into_iter()
            .map(|line| String::from_utf8(line).unwrap())
            .collect();
        assert_eq!(got, ["h", "\u{e9}\u{e9}", "\u{e9}\u{e9}"]);
    }

    #[test]
    fn test_max_line_bytes_keeps_surrogate_pairs() {
        let mut data = vec![0xFF, 0xFE];
        for unit in "a\u{1F600}b\n".encode_utf16() {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        let (mut source, _) = LineSource::open(Source::from_bytes(&data)).unwrap();
        source.configure(vec![0x0A, 0x00], TextEncoding::Utf16Le, Some(4));
        let got: Vec<String> = lines(&mut source)
            .into_iter()
            .map(|line| {
                let units: Vec<u16> = line
                    .chunks(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&units).unwrap()
            })
            .collect();
        assert_eq!(got, ["a", "\u{1F600}", "b"]);
    }

    #[test]
    fn test_crlf_lines_keep_bare_lf() {
        let data = b"a\nb\r\nc\r\n";
        let (mut source, _) = LineSource::open(Source::from_bytes(data)).unwrap();
        source.configure(b"\r\n".to_vec(), TextEncoding::Utf8, None);
        assert_eq!(lines(&mut source), vec![b"a\nb".to_vec(), b"c".to_vec()]);
    }
}
