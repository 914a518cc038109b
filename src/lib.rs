//! csv-intake: robust CSV decoding and encoding
//!
//! Reads CSV from files, in-memory buffers and forward-only streams whose
//! encoding and dialect are not known in advance.
//!
//! # Quick Start
//!
//! ```no_run
//! use csv_intake::{Config, StreamReader};
//!
//! let mut config = Config::new();
//! config.condition("price > 10 AND color is 'red'").limit(100);
//!
//! let reader = StreamReader::from_path("data.csv", &config).unwrap();
//! println!("Delimiter: {}", reader.dialect().delimiter as char);
//! println!("Encoding: {}", reader.encoding().file_encoding);
//! println!("Fields: {:?}", reader.fields());
//!
//! for record in reader {
//!     if let Some(row) = record.unwrap().into_row() {
//!         println!("{:?}", row.by_name("price"));
//!     }
//! }
//! ```
//!
//! # Pipeline
//!
//! 1. The byte-order mark is sniffed from the first bytes. Without one, and
//!    without a configured encoding, an [`EncodingDetector`] tries a fixed
//!    list of candidates against a sample.
//! 2. Dialect parts that are not configured are guessed from the decoded
//!    sample: the line terminator by precedence over all breaks, the delimiter
//!    from the first line or statistically over many rows, and the
//!    enclosure from `q + delimiter + q` patterns.
//! 3. Lines are transcoded to UTF-8 and tokenized. Syntax deviations are
//!    recovered from and reported as [`ParseError`] diagnostics.
//! 4. Rows pass the [`Condition`] filter and the offset/limit gate, or are
//!    sorted first when a [`SortSpec`] is configured.
//!
//! [`Encoder`] goes the other way.

mod config;
mod dialect;
mod encoder;
mod encoding;
mod error;
mod field_index;
mod filter;
pub mod guess;
#[cfg(feature = "http")]
mod http;
mod reader;
mod row;
mod sample;
mod sort;
mod table;
mod tokenizer;

pub use config::Config;
pub use dialect::{Dialect, LineTerminator, Quote};
pub use encoder::Encoder;
pub use encoding::{
    EncodingDetector, EncodingInfo, FALLBACK_ENCODINGS, TextEncoding, Transcoding,
    detect_encoding, is_utf8, sniff_bom, transcode_buffer,
};
pub use error::{CsvError, Result};
pub use field_index::{FieldIndex, FieldMapping, Normalizer};
pub use filter::{Condition, Operator, RowGate};
pub use guess::{Detection, PartialDialect, StatisticalGuesser, guess_dialect};
#[cfg(feature = "http")]
pub use http::open_url;
pub use reader::{ReadSeek, RowCursor, Source, StreamReader};
pub use row::{Record, Row};
pub use sample::SampleSize;
pub use sort::{SortPolicy, SortSpec, natural_cmp};
pub use table::{Table, TableCursor};
pub use tokenizer::{ErrorKind, ParseError, RawField, RawRecord, Records, Tokenizer, severity};
