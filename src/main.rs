//! csv-intake CLI - sniff, filter and re-encode CSV files

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use csv_intake::{
    Config, Detection, Encoder, LineTerminator, Quote, Record, SampleSize, SortPolicy, SortSpec,
    StatisticalGuesser, StreamReader, TextEncoding, Transcoding,
};
use tracing::{debug, warn};

/// Robust CSV reader.
///
/// Detects the encoding and dialect of each input, then prints either a
/// summary of what was detected or the rows re-encoded as CSV.
#[derive(Parser, Debug)]
#[command(name = "csv-intake")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input CSV file(s); `-` reads standard input
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Number of records to sample (default: 100)
    #[arg(short = 'n', long, default_value = "100")]
    sample_records: usize,

    /// Number of bytes to sample (overrides --sample-records)
    #[arg(short = 'b', long)]
    sample_bytes: Option<usize>,

    /// Read entire input instead of sampling
    #[arg(short = 'a', long)]
    all: bool,

    /// Force specific delimiter (single character)
    #[arg(short = 'd', long)]
    delimiter: Option<char>,

    /// Force specific quote character (single character, or 'none')
    #[arg(short = 'q', long)]
    quote: Option<String>,

    /// Force the input encoding (e.g. utf-8, latin1, utf-16le)
    #[arg(short = 'e', long)]
    encoding: Option<String>,

    /// Force the line terminator (lf, crlf, cr, lfcr)
    #[arg(long)]
    line_terminator: Option<String>,

    /// Treat the first line as data
    #[arg(long)]
    no_header: bool,

    /// Detect the delimiter statistically over many rows
    #[arg(long)]
    statistical: bool,

    /// Fail on undecodable bytes instead of replacing them
    #[arg(long)]
    strict: bool,

    /// Drop empty lines
    #[arg(long)]
    skip_empty: bool,

    /// Row condition, e.g. "price > 10 AND color is 'red'"
    #[arg(short = 'w', long = "where")]
    condition: Option<String>,

    /// Skip this many data rows
    #[arg(long, default_value = "0")]
    offset: usize,

    /// Output at most this many rows
    #[arg(long)]
    limit: Option<usize>,

    /// Sort by this field before offset and limit apply
    #[arg(long)]
    sort_by: Option<String>,

    /// Sort in descending order
    #[arg(long)]
    sort_desc: bool,

    /// How sort keys compare
    #[arg(long, default_value = "lexical")]
    sort_policy: PolicyArg,

    /// Output format: text summary (default) or csv rows
    #[arg(short = 'f', long, default_value = "text")]
    format: OutputFormat,

    /// Enclose every output field
    #[arg(long)]
    enclose_all: bool,

    /// Only output the detected delimiter character
    #[arg(long)]
    delimiter_only: bool,

    /// Print syntax diagnostics to stderr
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum PolicyArg {
    Numeric,
    Lexical,
    Natural,
}

impl From<PolicyArg> for SortPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Numeric => SortPolicy::Numeric,
            PolicyArg::Lexical => SortPolicy::Lexical,
            PolicyArg::Natural => SortPolicy::Natural,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.debug { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut exit_code = ExitCode::SUCCESS;
    for file in &args.files {
        if let Err(e) = process_file(file, &config, &args) {
            eprintln!("Error processing {}: {}", file.display(), e);
            exit_code = ExitCode::FAILURE;
        }
    }

    exit_code
}

fn build_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::new();

    if args.all {
        config.sample_size(SampleSize::All);
    } else if let Some(bytes) = args.sample_bytes {
        config.sample_size(SampleSize::Bytes(bytes));
    } else {
        config.sample_size(SampleSize::Records(args.sample_records));
    }

    if let Some(delim) = args.delimiter {
        let byte = u8::try_from(delim).map_err(|_| "delimiter must be a single-byte character")?;
        config.delimiter(byte);
    }

    if let Some(ref quote_str) = args.quote {
        if quote_str.eq_ignore_ascii_case("none") {
            config.quote(Quote::None);
        } else if let Some(c) = quote_str.chars().next() {
            let byte = u8::try_from(c).map_err(|_| "quote must be a single-byte character")?;
            config.quote(Quote::Some(byte));
        }
    }

    if let Some(ref label) = args.encoding {
        let encoding =
            TextEncoding::from_label(label).ok_or_else(|| format!("unknown encoding '{label}'"))?;
        config.file_encoding(encoding);
    }

    if let Some(ref name) = args.line_terminator {
        let terminator = LineTerminator::from_name(name)
            .ok_or_else(|| format!("unknown line terminator '{name}'"))?;
        config.line_terminator(terminator);
    }

    if args.statistical {
        config.detection(Detection::Statistical(StatisticalGuesser::default()));
    }
    if args.strict {
        config.transcoding(Transcoding::Strict);
    }
    if let Some(ref condition) = args.condition {
        config.condition(condition);
    }
    if let Some(limit) = args.limit {
        config.limit(limit);
    }
    if let Some(ref field) = args.sort_by {
        config.sort(
            SortSpec::new(field.as_str())
                .descending(args.sort_desc)
                .policy(args.sort_policy.into()),
        );
    }

    config
        .heading(!args.no_header)
        .skip_empty_lines(args.skip_empty)
        .offset(args.offset)
        .debug(args.debug);
    config.validate()?;
    Ok(config)
}

fn process_file(
    path: &Path,
    config: &Config,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let reader = if path.as_os_str() == "-" {
        StreamReader::from_stream(io::stdin(), config)?
    } else {
        StreamReader::from_path(path, config)?
    };
    debug!(file = %path.display(), "opened input");

    if args.delimiter_only {
        println!("{}", reader.dialect().delimiter as char);
        return Ok(());
    }

    match args.format {
        OutputFormat::Text => print_text_output(path, &reader, args.verbose),
        OutputFormat::Csv => print_csv_output(reader, args)?,
    }
    Ok(())
}

fn print_text_output(path: &Path, reader: &StreamReader<'_>, verbose: bool) {
    let dialect = reader.dialect();
    let encoding = reader.encoding();
    println!("File: {}", path.display());
    println!("  Delimiter: {:?}", dialect.delimiter as char);
    println!(
        "  Quote: {}",
        match dialect.quote {
            Quote::None => "none".to_string(),
            Quote::Some(q) => format!("{:?}", q as char),
        }
    );
    println!("  Line terminator: {}", dialect.line_terminator);
    println!("  Encoding: {}", encoding.file_encoding);
    println!("  BOM length: {}", encoding.bom_length);
    println!("  Transcoded: {}", encoding.must_transcode);
    println!("  Fields: {}", reader.fields().len());

    if verbose {
        println!("  Field details:");
        for (i, name) in reader.fields().iter().enumerate() {
            println!("    {}: {}", i + 1, name);
        }
        report_errors(reader.errors());
    }

    println!();
}

fn print_csv_output(mut reader: StreamReader<'_>, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut encoder = Encoder::new(*reader.dialect());
    encoder.enclose_all(args.enclose_all);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.sort_by.is_some() {
        let table = reader.into_table()?;
        encoder.heading(!args.no_header);
        out.write_all(&encoder.encode_table(&table))?;
        if args.verbose {
            report_errors(table.errors());
        }
        return Ok(());
    }

    let terminator = reader.dialect().line_terminator.as_text();
    if !args.no_header {
        out.write_all(&encoder.encode_header(reader.fields()))?;
    }
    for record in reader.by_ref() {
        match record {
            Ok(Record::Row(row)) => out.write_all(&encoder.encode_row(row.values()))?,
            Ok(Record::Blank) => out.write_all(terminator.as_bytes())?,
            Err(e) => warn!("skipping unreadable row: {e}"),
        }
    }
    if args.verbose {
        report_errors(reader.errors());
    }
    Ok(())
}

fn report_errors(errors: &[csv_intake::ParseError]) {
    for error in errors {
        eprintln!("  {error}");
    }
}
