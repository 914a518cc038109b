//! Integration tests for csv-intake

use csv_intake::{
    Config, CsvError, Detection, Dialect, Encoder, ErrorKind, LineTerminator, Quote, Record,
    RowCursor, SampleSize, SortPolicy, SortSpec, StatisticalGuesser, StreamReader, Table,
    TextEncoding, Transcoding,
};
use std::io::{Cursor, Write};
use tempfile::NamedTempFile;

fn values(reader: StreamReader<'_>) -> Vec<Vec<Option<String>>> {
    reader
        .filter_map(|record| record.unwrap().into_row())
        .map(|row| row.into_values())
        .collect()
}

fn some(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|v| Some(v.to_string())).collect()
}

fn utf16le(text: &str, bom: bool) -> Vec<u8> {
    let mut out = if bom { vec![0xFF, 0xFE] } else { Vec::new() };
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

#[test]
fn test_read_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"name,age,city\nAlice,30,New York\nBob,25,Los Angeles\n")
        .unwrap();
    temp_file.flush().unwrap();

    let reader = StreamReader::from_path(temp_file.path(), &Config::new()).unwrap();
    assert_eq!(reader.dialect().delimiter, b',');
    assert_eq!(reader.fields(), ["name", "age", "city"]);
    assert_eq!(
        values(reader),
        vec![
            some(&["Alice", "30", "New York"]),
            some(&["Bob", "25", "Los Angeles"])
        ]
    );
}

#[test]
fn test_semicolon_and_crlf_detected() {
    let data = b"name;age\r\nAlice;30\r\nBob;25\r\n";
    let reader = StreamReader::from_bytes(data, &Config::new()).unwrap();
    assert_eq!(reader.dialect().delimiter, b';');
    assert_eq!(reader.dialect().line_terminator, LineTerminator::CRLF);
    assert_eq!(values(reader), vec![some(&["Alice", "30"]), some(&["Bob", "25"])]);
}

#[test]
fn test_simple_fields_without_header() {
    let mut config = Config::new();
    config.heading(false);
    let table = Table::parse_str("a,b,c", &config).unwrap();
    assert_eq!(table.fields(), ["field_1", "field_2", "field_3"]);
    assert_eq!(table.rows().next().unwrap().values(), some(&["a", "b", "c"]));
}

#[test]
fn test_doubled_quote_inside_enclosure() {
    let mut config = Config::new();
    config.heading(false).delimiter(b',');
    let table = Table::parse_str("a,\"b\"\"c\"\n", &config).unwrap();
    assert_eq!(table.rows().next().unwrap().get(1), Some("b\"c"));
    assert_eq!(table.severity(), None);
}

#[test]
fn test_enclosure_violation_reported() {
    let mut config = Config::new();
    config.heading(false).delimiter(b',');
    let table = Table::parse_str("x,ab\"cd\n", &config).unwrap();
    assert_eq!(table.rows().next().unwrap().get(1), Some("ab\"cd"));
    assert_eq!(table.errors().len(), 1);
    assert_eq!(table.errors()[0].kind, ErrorKind::EnclosureViolation);
    assert_eq!(table.severity(), Some(ErrorKind::EnclosureViolation));
}

#[test]
fn test_violation_outranks_anomaly() {
    let mut config = Config::new();
    config.delimiter(b',');
    let data = b"k,v\n1,ab\"cd\n2,\"ab\"cd\n";
    let mut reader = StreamReader::from_bytes(data, &config).unwrap();
    let rows: Vec<_> = reader.by_ref().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(reader.errors().len(), 2);
    assert_eq!(reader.errors()[1].row, 3);
    assert_eq!(reader.errors()[1].kind, ErrorKind::Anomaly);
    assert_eq!(reader.severity(), Some(ErrorKind::EnclosureViolation));
}

#[test]
fn test_multiline_field_streamed() {
    let data = b"id,note\n1,\"first\nsecond\"\n2,plain\n";
    let reader = StreamReader::from_bytes(data, &Config::new()).unwrap();
    assert_eq!(
        values(reader),
        vec![some(&["1", "first\nsecond"]), some(&["2", "plain"])]
    );
}

#[test]
fn test_utf8_bom_skipped() {
    let data = b"\xEF\xBB\xBFa,b\n1,2\n";
    let reader = StreamReader::from_bytes(data, &Config::new()).unwrap();
    assert_eq!(reader.encoding().bom_length, 3);
    assert_eq!(reader.encoding().file_encoding, TextEncoding::Utf8);
    assert_eq!(reader.fields(), ["a", "b"]);

    let table = Table::parse_bytes(data, &Config::new()).unwrap();
    assert_eq!(table.fields(), ["a", "b"]);
}

#[test]
fn test_utf16_bom_file() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(&utf16le("city,pop\nK\u{f6}ln,1\n", true)).unwrap();
    temp_file.flush().unwrap();

    let reader = StreamReader::from_path(temp_file.path(), &Config::new()).unwrap();
    assert_eq!(reader.encoding().file_encoding, TextEncoding::Utf16Le);
    assert_eq!(reader.encoding().bom_length, 2);
    assert!(reader.encoding().must_transcode);
    assert_eq!(values(reader), vec![some(&["K\u{f6}ln", "1"])]);
}

#[test]
fn test_utf16_detected_without_bom() {
    let data = utf16le("a,b\n1,2\n", false);
    let table = Table::parse_bytes(&data, &Config::new()).unwrap();
    assert_eq!(table.encoding().file_encoding, TextEncoding::Utf16Le);
    assert_eq!(table.encoding().bom_length, 0);
    assert_eq!(table.rows().next().unwrap().values(), some(&["1", "2"]));
}

#[test]
fn test_single_byte_fallback() {
    let table = Table::parse_bytes(b"name\nJos\xE9\n", &Config::new()).unwrap();
    assert!(table.encoding().must_transcode);
    assert_eq!(table.rows().next().unwrap().get(0), Some("Jos\u{e9}"));
}

#[test]
fn test_strict_transcoding_fails() {
    let mut config = Config::new();
    config
        .file_encoding(TextEncoding::Utf8)
        .transcoding(Transcoding::Strict);
    let err = Table::parse_bytes(b"a\nok\nbad\xFF\n", &config).unwrap_err();
    assert!(matches!(err, CsvError::Transcode { row: 3, .. }));
}

#[test]
fn test_statistical_detection() {
    // The header alone would suggest a comma
    let data = "a|b,c\n1|2\n3|4\n";
    let mut config = Config::new();
    config.detection(Detection::Statistical(StatisticalGuesser::default()));
    let table = Table::parse_str(data, &config).unwrap();
    assert_eq!(table.dialect().delimiter, b'|');
    assert_eq!(table.fields(), ["a", "b,c"]);
}

#[test]
fn test_condition_filters_rows() {
    let data = b"item,price,color\nhat,12,red\nscarf,8,red\nboot,30,blue\nsock,11,RED\n";
    let mut config = Config::new();
    config.condition("price > 10 AND color is 'red'");
    let reader = StreamReader::from_bytes(data, &config).unwrap();
    let items: Vec<String> = values(reader)
        .into_iter()
        .map(|row| row[0].clone().unwrap())
        .collect();
    assert_eq!(items, ["hat"]);
}

#[test]
fn test_offset_and_limit() {
    let data = b"n\n1\n2\n3\n4\n5\n";
    let mut config = Config::new();
    config.offset(1).limit(2);
    let reader = StreamReader::from_bytes(data, &config).unwrap();
    assert_eq!(values(reader), vec![some(&["2"]), some(&["3"])]);
}

#[test]
fn test_sorted_table() {
    let data = "name,size\nb,10\na,9\nc,100\n";
    let mut config = Config::new();
    config
        .sort(
            SortSpec::new("size")
                .descending(true)
                .policy(SortPolicy::Numeric),
        )
        .limit(2);
    let table = Table::parse_str(data, &config).unwrap();
    let names: Vec<&str> = table.rows().map(|row| row.get(0).unwrap()).collect();
    assert_eq!(names, ["c", "b"]);
}

#[test]
fn test_options_map() {
    let config = Config::from_options([
        ("delimiter", "|"),
        ("enclosure", "'"),
        ("include", "b"),
        ("limit", "1"),
    ])
    .unwrap();
    let table = Table::parse_str("a|b\n1|'x|y'\n2|z\n", &config).unwrap();
    assert_eq!(table.fields(), ["b"]);
    assert_eq!(table.len(), 1);
    assert_eq!(table.rows().next().unwrap().get(0), Some("x|y"));

    let err = Config::from_options([("bogus", "1")]).unwrap_err();
    assert!(matches!(err, CsvError::InvalidConfig(_)));
}

#[test]
fn test_rewind_seekable_and_stream() {
    let data = b"a\n1\n2\n".to_vec();

    let mut reader = StreamReader::from_reader(Cursor::new(data.clone()), &Config::new()).unwrap();
    assert!(reader.is_rewindable());
    assert_eq!(reader.by_ref().count(), 2);
    reader.rewind().unwrap();
    assert_eq!(RowCursor::position(&reader), 0);
    assert_eq!(reader.count(), 2);

    let mut reader = StreamReader::from_stream(Cursor::new(data), &Config::new()).unwrap();
    assert!(!reader.is_rewindable());
    assert_eq!(reader.by_ref().count(), 2);
    reader.rewind().unwrap();
    assert!(reader.next().is_none());
}

#[test]
fn test_sample_size_bytes_on_stream() {
    let mut config = Config::new();
    config.sample_size(SampleSize::Bytes(8));
    let data = b"x;y\n1;2\n3;4\n5;6\n";
    let reader = StreamReader::from_stream(&data[..], &config).unwrap();
    assert_eq!(reader.dialect().delimiter, b';');
    assert_eq!(values(reader).len(), 3);
}

#[test]
fn test_blank_lines_surface() {
    let data = b"a\n1\n\n2\n";
    let records: Vec<Record> = StreamReader::from_bytes(data, &Config::new())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 3);
    assert!(records[1].is_blank());

    let mut config = Config::new();
    config.skip_empty_lines(true);
    let reader = StreamReader::from_bytes(data, &config).unwrap();
    assert_eq!(reader.count(), 2);
}

#[test]
fn test_encoder_output_read_by_csv_crate() {
    let rows = vec![
        some(&["plain", "with,comma"]),
        some(&["say \"hi\"", "two\nlines"]),
        some(&[" padded ", "x"]),
    ];
    let out = Encoder::new(Dialect::default()).encode(&["a", "b"], &rows);

    let mut reader = csv::ReaderBuilder::new().from_reader(out.as_slice());
    let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_owned).collect();
    assert_eq!(headers, ["a", "b"]);
    let parsed: Vec<Vec<Option<String>>> = reader
        .records()
        .map(|record| record.unwrap().iter().map(|v| Some(v.to_owned())).collect())
        .collect();
    assert_eq!(parsed, rows);
}

#[test]
fn test_encode_then_parse_round_trip() {
    let dialect = Dialect {
        delimiter: b';',
        quote: Quote::Some(b'\''),
        escape: b'\'',
        line_terminator: LineTerminator::CRLF,
    };
    let rows = vec![
        vec![Some("it's".to_string()), None],
        vec![Some("a;b".to_string()), Some(String::new())],
    ];
    let out = Encoder::new(dialect).encode(&["k", "v"], &rows);

    let mut config = Config::new();
    config
        .delimiter(b';')
        .quote(Quote::Some(b'\''))
        .line_terminator(LineTerminator::CRLF);
    let table = Table::parse_bytes(&out, &config).unwrap();
    let parsed: Vec<Vec<Option<String>>> = table.rows().map(|r| r.values().to_vec()).collect();
    assert_eq!(parsed, rows);
}

#[test]
fn test_empty_input() {
    let reader = StreamReader::from_bytes(b"", &Config::new()).unwrap();
    assert!(reader.fields().is_empty());
    assert_eq!(reader.count(), 0);

    let table = Table::parse_str("", &Config::new()).unwrap();
    assert!(table.is_empty());
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = Config::new();
    config.delimiter(b'"');
    let err = StreamReader::from_bytes(b"a\n", &config).err().unwrap();
    assert!(matches!(err, CsvError::InvalidConfig(_)));
}
