//! Byte-order-mark sniffing, encoding detection and transcoding using
//! chardetng and `encoding_rs`.

use std::borrow::Cow;
use std::fmt;

use encoding_rs::Encoding;
use simdutf8::basic::from_utf8;
use tracing::debug;

use crate::error::{CsvError, Result};

/// Text encodings recognized by the sniffer.
///
/// The UTF-32 and ISO-8859-1 variants are handled by this crate directly;
/// everything else is delegated to `encoding_rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
    /// 7-bit US-ASCII.
    Ascii,
    /// ISO-8859-1 (Latin-1), every byte mapped to U+0000..U+00FF.
    Iso8859_1,
    Windows1252,
    /// Any other encoding known to `encoding_rs`.
    Other(&'static Encoding),
}

impl TextEncoding {
    /// Look up an encoding by label, case-insensitively.
    ///
    /// Accepts common aliases (`utf8`, `latin1`, `cp1252`, `us-ascii`, ...)
    /// and falls back to the WHATWG label table.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase();
        let encoding = match normalized.as_str() {
            "utf-8" | "utf8" => TextEncoding::Utf8,
            "utf-16" | "utf-16le" | "utf16le" | "utf16" => TextEncoding::Utf16Le,
            "utf-16be" | "utf16be" => TextEncoding::Utf16Be,
            "utf-32" | "utf-32le" | "utf32le" | "utf32" => TextEncoding::Utf32Le,
            "utf-32be" | "utf32be" => TextEncoding::Utf32Be,
            "ascii" | "us-ascii" | "ansi_x3.4-1968" => TextEncoding::Ascii,
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "latin-1" | "l1" => {
                TextEncoding::Iso8859_1
            }
            "windows-1252" | "cp1252" | "x-cp1252" | "win-1252" => TextEncoding::Windows1252,
            _ => return Encoding::for_label(normalized.as_bytes()).map(Self::from_encoding_rs),
        };
        Some(encoding)
    }

    /// Map an `encoding_rs` encoding onto the crate's variants.
    pub fn from_encoding_rs(encoding: &'static Encoding) -> Self {
        if encoding == encoding_rs::UTF_8 {
            TextEncoding::Utf8
        } else if encoding == encoding_rs::UTF_16LE {
            TextEncoding::Utf16Le
        } else if encoding == encoding_rs::UTF_16BE {
            TextEncoding::Utf16Be
        } else if encoding == encoding_rs::WINDOWS_1252 {
            TextEncoding::Windows1252
        } else {
            TextEncoding::Other(encoding)
        }
    }

    /// Canonical name of the encoding.
    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Utf16Le => "UTF-16LE",
            TextEncoding::Utf16Be => "UTF-16BE",
            TextEncoding::Utf32Le => "UTF-32LE",
            TextEncoding::Utf32Be => "UTF-32BE",
            TextEncoding::Ascii => "US-ASCII",
            TextEncoding::Iso8859_1 => "ISO-8859-1",
            TextEncoding::Windows1252 => "windows-1252",
            TextEncoding::Other(encoding) => encoding.name(),
        }
    }

    /// Width in bytes of one code unit.
    pub const fn unit_width(&self) -> usize {
        match self {
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => 2,
            TextEncoding::Utf32Le | TextEncoding::Utf32Be => 4,
            _ => 1,
        }
    }

    /// Returns true for the UTF-16 and UTF-32 variants.
    #[inline]
    pub const fn is_wide(&self) -> bool {
        self.unit_width() > 1
    }

    /// Returns true when bytes in `self` can be used unchanged as `internal`.
    ///
    /// ASCII is a subset of UTF-8 and of the Latin single-byte encodings,
    /// and ISO-8859-1 is treated as a subset of Windows-1252.
    pub fn is_subset_of(&self, internal: TextEncoding) -> bool {
        use TextEncoding::*;
        *self == internal
            || matches!(
                (*self, internal),
                (Ascii, Utf8) | (Ascii, Iso8859_1) | (Ascii, Windows1252) | (Iso8859_1, Windows1252)
            )
    }

    /// Represent a run of ASCII bytes in this encoding.
    ///
    /// Used to compute line separators for wide encodings, where `\n`
    /// becomes `0A 00` (UTF-16LE), `00 00 00 0A` (UTF-32BE) and so on.
    pub fn encode_ascii(&self, ascii: &[u8]) -> Vec<u8> {
        let width = self.unit_width();
        let mut out = Vec::with_capacity(ascii.len() * width);
        for &b in ascii {
            match self {
                TextEncoding::Utf16Le => out.extend_from_slice(&[b, 0]),
                TextEncoding::Utf16Be => out.extend_from_slice(&[0, b]),
                TextEncoding::Utf32Le => out.extend_from_slice(&[b, 0, 0, 0]),
                TextEncoding::Utf32Be => out.extend_from_slice(&[0, 0, 0, b]),
                _ => out.push(b),
            }
        }
        out
    }

    /// Decode bytes of this encoding into text.
    ///
    /// Returns `None` only in strict mode, when an invalid sequence is found.
    /// No BOM handling is performed; strip the BOM first.
    pub fn decode<'a>(&self, bytes: &'a [u8], mode: Transcoding) -> Option<Cow<'a, str>> {
        match self {
            TextEncoding::Utf8 | TextEncoding::Ascii => match from_utf8(bytes) {
                Ok(text) => Some(Cow::Borrowed(text)),
                Err(_) if mode.is_strict() => None,
                Err(_) => Some(String::from_utf8_lossy(bytes)),
            },
            TextEncoding::Iso8859_1 => {
                if bytes.is_ascii() {
                    from_utf8(bytes).ok().map(Cow::Borrowed)
                } else {
                    Some(Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()))
                }
            }
            TextEncoding::Utf32Le => decode_utf32(bytes, true, mode).map(Cow::Owned),
            TextEncoding::Utf32Be => decode_utf32(bytes, false, mode).map(Cow::Owned),
            TextEncoding::Utf16Le
            | TextEncoding::Utf16Be
            | TextEncoding::Windows1252
            | TextEncoding::Other(_) => {
                let encoding = self.as_encoding_rs();
                if mode.is_strict() {
                    encoding.decode_without_bom_handling_and_without_replacement(bytes)
                } else {
                    Some(encoding.decode_without_bom_handling(bytes).0)
                }
            }
        }
    }

    /// Encode text into this encoding.
    ///
    /// Characters the target cannot represent are replaced with `?` for
    /// ASCII and ISO-8859-1, and with numeric character references for
    /// `encoding_rs` encodings.
    pub fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        match self {
            TextEncoding::Utf8 => Cow::Borrowed(text.as_bytes()),
            TextEncoding::Ascii if text.is_ascii() => Cow::Borrowed(text.as_bytes()),
            TextEncoding::Ascii => Cow::Owned(
                text.chars()
                    .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                    .collect(),
            ),
            TextEncoding::Iso8859_1 => Cow::Owned(
                text.chars()
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                    .collect(),
            ),
            TextEncoding::Utf16Le => {
                Cow::Owned(text.encode_utf16().flat_map(u16::to_le_bytes).collect())
            }
            TextEncoding::Utf16Be => {
                Cow::Owned(text.encode_utf16().flat_map(u16::to_be_bytes).collect())
            }
            TextEncoding::Utf32Le => {
                Cow::Owned(text.chars().flat_map(|c| u32::from(c).to_le_bytes()).collect())
            }
            TextEncoding::Utf32Be => {
                Cow::Owned(text.chars().flat_map(|c| u32::from(c).to_be_bytes()).collect())
            }
            TextEncoding::Windows1252 | TextEncoding::Other(_) => {
                self.as_encoding_rs().encode(text).0
            }
        }
    }

    fn as_encoding_rs(&self) -> &'static Encoding {
        match self {
            TextEncoding::Utf16Le => encoding_rs::UTF_16LE,
            TextEncoding::Utf16Be => encoding_rs::UTF_16BE,
            TextEncoding::Windows1252 | TextEncoding::Iso8859_1 | TextEncoding::Ascii => {
                encoding_rs::WINDOWS_1252
            }
            TextEncoding::Other(encoding) => encoding,
            TextEncoding::Utf8 | TextEncoding::Utf32Le | TextEncoding::Utf32Be => {
                encoding_rs::UTF_8
            }
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn decode_utf32(bytes: &[u8], little_endian: bool, mode: Transcoding) -> Option<String> {
    let mut out = String::with_capacity(bytes.len() / 4);
    let chunks = bytes.chunks_exact(4);
    let partial = !chunks.remainder().is_empty();

    for chunk in chunks {
        let unit = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let value = if little_endian {
            u32::from_le_bytes(unit)
        } else {
            u32::from_be_bytes(unit)
        };
        match char::from_u32(value) {
            Some(c) => out.push(c),
            None if mode.is_strict() => return None,
            None => out.push(char::REPLACEMENT_CHARACTER),
        }
    }

    if partial {
        if mode.is_strict() {
            return None;
        }
        out.push(char::REPLACEMENT_CHARACTER);
    }
    Some(out)
}

/// How to treat byte sequences that cannot be decoded.
///
/// Lossy is the default: invalid sequences become U+FFFD and reading
/// continues. Strict turns them into a [`CsvError::Transcode`] for the
/// offending row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transcoding {
    #[default]
    Lossy,
    Strict,
}

impl Transcoding {
    #[inline]
    pub const fn is_strict(&self) -> bool {
        matches!(self, Transcoding::Strict)
    }
}

/// Canonical byte-order marks, longest first so a UTF-32LE mark is never
/// mistaken for a UTF-16LE one.
const BOMS: &[(&[u8], TextEncoding)] = &[
    (&[0x00, 0x00, 0xFE, 0xFF], TextEncoding::Utf32Be),
    (&[0xFF, 0xFE, 0x00, 0x00], TextEncoding::Utf32Le),
    (&[0xEF, 0xBB, 0xBF], TextEncoding::Utf8),
    (&[0xFE, 0xFF], TextEncoding::Utf16Be),
    (&[0xFF, 0xFE], TextEncoding::Utf16Le),
];

/// Inspect the leading bytes of a source for a byte-order mark.
///
/// Returns the encoding and the BOM length, or `None` if no BOM matches.
pub fn sniff_bom(prefix: &[u8]) -> Option<(TextEncoding, usize)> {
    BOMS.iter()
        .find(|(bom, _)| prefix.starts_with(bom))
        .map(|&(bom, encoding)| (encoding, bom.len()))
}

/// Check if the given bytes are valid UTF-8.
///
/// Uses SIMD-accelerated validation for performance.
pub fn is_utf8(data: &[u8]) -> bool {
    from_utf8(data).is_ok()
}

/// Encoding facts about a source, derived once when it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingInfo {
    /// Encoding of the bytes in the source.
    pub file_encoding: TextEncoding,
    /// Encoding rows are produced in.
    pub internal_encoding: TextEncoding,
    /// Length of the byte-order mark, 0 when absent.
    pub bom_length: usize,
    /// Whether bytes must be converted before tokenizing.
    pub must_transcode: bool,
}

impl EncodingInfo {
    /// Create a new `EncodingInfo`, deciding whether transcoding is needed.
    pub fn new(
        file_encoding: TextEncoding,
        internal_encoding: TextEncoding,
        bom_length: usize,
    ) -> Self {
        Self {
            file_encoding,
            internal_encoding,
            bom_length,
            must_transcode: !file_encoding.is_subset_of(internal_encoding),
        }
    }

    /// Returns true if a byte-order mark was present.
    #[inline]
    pub const fn has_bom(&self) -> bool {
        self.bom_length > 0
    }

    /// Returns true if the file is UTF-8 or a subset of it.
    pub fn is_utf8(&self) -> bool {
        self.file_encoding.is_subset_of(TextEncoding::Utf8)
    }

    /// Decode one chunk of source bytes into internal text.
    pub fn decode<'a>(&self, bytes: &'a [u8], mode: Transcoding) -> Option<Cow<'a, str>> {
        if self.must_transcode {
            self.file_encoding.decode(bytes, mode)
        } else {
            TextEncoding::Utf8.decode(bytes, mode)
        }
    }
}

/// Fixed fallback order tried by [`EncodingDetector`].
pub const FALLBACK_ENCODINGS: &[TextEncoding] = &[
    TextEncoding::Utf32Be,
    TextEncoding::Utf32Le,
    TextEncoding::Utf16Be,
    TextEncoding::Utf16Le,
    TextEncoding::Utf8,
    TextEncoding::Windows1252,
    TextEncoding::Iso8859_1,
];

/// ASCII characters that must show up in a plausible wide-encoded sample.
const STRUCTURAL_CHARS: &[char] = &['\n', '\r', ',', ';', '\t', '|'];

/// Multi-candidate encoding guesser for sources without a BOM.
///
/// Candidates are tried in order: the wide encodings from the fallback list
/// (NUL-padded text is otherwise valid UTF-8), then the internal encoding,
/// then chardetng's guess for the sample, then the rest of the fallbacks.
#[derive(Debug, Clone)]
pub struct EncodingDetector {
    internal: TextEncoding,
    fallbacks: Vec<TextEncoding>,
}

impl EncodingDetector {
    /// Create a detector seeded with the internal encoding and the default
    /// fallback list.
    pub fn new(internal: TextEncoding) -> Self {
        Self {
            internal,
            fallbacks: FALLBACK_ENCODINGS.to_vec(),
        }
    }

    /// Replace the fallback list.
    pub fn with_fallbacks(mut self, fallbacks: Vec<TextEncoding>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// Ordered, de-duplicated candidate list for `sample`.
    pub fn candidates(&self, sample: &[u8]) -> Vec<TextEncoding> {
        let mut detector = chardetng::EncodingDetector::new();
        detector.feed(sample, true);
        let platform = TextEncoding::from_encoding_rs(detector.guess(None, true));

        let wide = self.fallbacks.iter().copied().filter(TextEncoding::is_wide);
        let narrow = self.fallbacks.iter().copied().filter(|e| !e.is_wide());

        let mut ordered: Vec<TextEncoding> = Vec::with_capacity(self.fallbacks.len() + 2);
        for encoding in wide
            .chain([self.internal, platform])
            .chain(narrow)
        {
            if !ordered.contains(&encoding) {
                ordered.push(encoding);
            }
        }
        ordered
    }

    /// Guess the encoding of `sample`.
    ///
    /// Pure ASCII samples report [`TextEncoding::Ascii`]. When no candidate
    /// accepts the sample, Windows-1252 is assumed.
    pub fn detect(&self, sample: &[u8]) -> TextEncoding {
        for candidate in self.candidates(sample) {
            if accepts(candidate, sample) {
                let detected = if candidate == TextEncoding::Utf8 && sample.is_ascii() {
                    TextEncoding::Ascii
                } else {
                    candidate
                };
                debug!(encoding = detected.name(), "detected encoding without BOM");
                return detected;
            }
        }
        TextEncoding::Windows1252
    }
}

impl Default for EncodingDetector {
    fn default() -> Self {
        Self::new(TextEncoding::Utf8)
    }
}

fn accepts(candidate: TextEncoding, sample: &[u8]) -> bool {
    if sample.is_empty() {
        return candidate == TextEncoding::Utf8;
    }
    match candidate {
        TextEncoding::Utf8 | TextEncoding::Ascii => match simdutf8::compat::from_utf8(sample) {
            Ok(_) => true,
            // A sample cut in the middle of a character is still UTF-8
            Err(e) => e.error_len().is_none(),
        },
        TextEncoding::Iso8859_1 | TextEncoding::Windows1252 => true,
        wide if wide.is_wide() => {
            let width = wide.unit_width();
            let mut end = sample.len() - sample.len() % width;
            // Allow the sample to end inside a surrogate pair
            for _ in 0..2 {
                if end == 0 {
                    return false;
                }
                if let Some(text) = wide.decode(&sample[..end], Transcoding::Strict) {
                    return !text.contains('\0') && text.contains(STRUCTURAL_CHARS);
                }
                end -= width;
            }
            false
        }
        other => other.decode(sample, Transcoding::Strict).is_some(),
    }
}

/// Detect the encoding of an in-memory buffer.
///
/// A byte-order mark wins; otherwise the default [`EncodingDetector`] runs
/// over the data.
pub fn detect_encoding(data: &[u8]) -> EncodingInfo {
    match sniff_bom(data) {
        Some((encoding, bom_length)) => EncodingInfo::new(encoding, TextEncoding::Utf8, bom_length),
        None => {
            let encoding = EncodingDetector::default().detect(data);
            EncodingInfo::new(encoding, TextEncoding::Utf8, 0)
        }
    }
}

/// Decode a whole buffer into internal text.
///
/// `configured` overrides detection (a BOM is still skipped). In strict
/// mode the error names the first physical row that failed to decode.
pub fn transcode_buffer(
    data: &[u8],
    configured: Option<TextEncoding>,
    mode: Transcoding,
) -> Result<(Cow<'_, str>, EncodingInfo)> {
    let bom = sniff_bom(data);
    let bom_length = bom.map_or(0, |(_, len)| len);
    let body = &data[bom_length..];

    let file_encoding = configured
        .or(bom.map(|(encoding, _)| encoding))
        .unwrap_or_else(|| EncodingDetector::default().detect(body));
    let info = EncodingInfo::new(file_encoding, TextEncoding::Utf8, bom_length);

    match info.decode(body, mode) {
        Some(text) => Ok((text, info)),
        None => Err(CsvError::Transcode {
            encoding: file_encoding.name(),
            row: locate_invalid_row(body, &info),
        }),
    }
}

/// Find the 1-based physical row holding the first undecodable sequence.
fn locate_invalid_row(body: &[u8], info: &EncodingInfo) -> usize {
    let newline = info.file_encoding.encode_ascii(b"\n");
    let width = newline.len();
    let mut row = 1;
    let mut start = 0;
    let mut i = 0;
    while i + width <= body.len() {
        if body[i..i + width] == newline[..] {
            if info.decode(&body[start..i], Transcoding::Strict).is_none() {
                return row;
            }
            row += 1;
            start = i + width;
        }
        i += width;
    }
    row
}
