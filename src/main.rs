//! # Transcode CLI - Streaming Charset Converter
//!
//! Command-line front end over the system conversion facility: converts
//! files or stdin between any charsets the host library understands.

#[cfg(feature = "cli")]
use std::fs::{self, File};
#[cfg(feature = "cli")]
use std::io::{self, BufReader, BufWriter, Read, Write};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
use anyhow::{Context, Result};
#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand, ValueEnum};
#[cfg(feature = "cli")]
use serde::Serialize;
#[cfg(feature = "cli")]
use tracing_subscriber::EnvFilter;

#[cfg(feature = "cli")]
use transcoder::stream::{self, InvalidPolicy, StreamConfig, StreamStats};
#[cfg(feature = "cli")]
use transcoder::{Charset, Error as TranscodeError, StreamTranscoder};

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features disabled. Enable with --features cli");
    std::process::exit(1);
}

/// Transcode: incremental charset converter backed by iconv
#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "transcode")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Convert a file between charsets
    Convert(ConvertArgs),

    /// Check that a file is valid in a charset
    Check(CheckArgs),

    /// List well-known charset names
    List(ListArgs),
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct ConvertArgs {
    /// Source charset (any name the system library accepts)
    #[arg(short = 'f', long = "from")]
    from: String,

    /// Target charset
    #[arg(short = 't', long = "to")]
    to: String,

    /// Input file (stdin if not specified)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with streaming settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read buffer size (KB)
    #[arg(long)]
    buffer_size: Option<usize>,

    /// What to do with invalid input sequences
    #[arg(long, value_enum)]
    on_invalid: Option<InvalidArg>,

    /// Strip a BOM from the input
    #[arg(long)]
    strip_bom: bool,

    /// Add a BOM to the output
    #[arg(long)]
    add_bom: bool,
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct CheckArgs {
    /// Input file (stdin if not specified)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Expected charset
    #[arg(short, long)]
    charset: String,
}

#[cfg(feature = "cli")]
#[derive(Args)]
struct ListArgs {
    /// Filter by category (unicode, ascii, iso, windows, dos, ebcdic, mac, asian)
    #[arg(short, long)]
    category: Option<String>,

    /// Show charset details
    #[arg(long)]
    details: bool,
}

#[cfg(feature = "cli")]
#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[cfg(feature = "cli")]
#[derive(Clone, Copy, Debug, ValueEnum)]
enum InvalidArg {
    Fail,
    Skip,
}

#[cfg(feature = "cli")]
impl From<InvalidArg> for InvalidPolicy {
    fn from(arg: InvalidArg) -> Self {
        match arg {
            InvalidArg::Fail => InvalidPolicy::Fail,
            InvalidArg::Skip => InvalidPolicy::Skip,
        }
    }
}

#[cfg(feature = "cli")]
#[derive(Serialize)]
struct ConversionReport<'a> {
    success: bool,
    from: &'a str,
    to: &'a str,
    #[serde(flatten)]
    stats: StreamStats,
    processing_time_ms: u64,
}

#[cfg(feature = "cli")]
#[derive(Serialize)]
struct CheckReport<'a> {
    valid: bool,
    charset: &'a str,
    bytes_checked: u64,
    error: Option<String>,
    offset: Option<u64>,
}

#[cfg(feature = "cli")]
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Convert(ref args) => convert_command(args, &cli)?,
        Commands::Check(ref args) => check_command(args, &cli)?,
        Commands::List(ref args) => list_command(args, &cli)?,
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[cfg(feature = "cli")]
fn load_config(args: &ConvertArgs) -> Result<StreamConfig> {
    let mut config = match args.config {
        Some(ref path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid config file: {}", path.display()))?
        }
        None => StreamConfig::default(),
    };

    if let Some(kb) = args.buffer_size {
        anyhow::ensure!(kb > 0, "--buffer-size must be at least 1 KB");
        config.chunk_size = kb * 1024;
    }
    if let Some(policy) = args.on_invalid {
        config.on_invalid = policy.into();
    }

    tracing::debug!(?config, "streaming configuration");
    Ok(config)
}

#[cfg(feature = "cli")]
fn open_input(path: Option<&PathBuf>) -> Result<Box<dyn Read>> {
    Ok(match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "reading input file");
            let file = File::open(path)
                .with_context(|| format!("Failed to open input file: {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => {
            tracing::debug!("reading from stdin");
            Box::new(io::stdin().lock())
        }
    })
}

#[cfg(feature = "cli")]
fn convert_command(args: &ConvertArgs, cli: &Cli) -> Result<()> {
    let start_time = std::time::Instant::now();
    let config = load_config(args)?;
    let chunk_size = config.chunk_size.max(1);

    let from = Charset::canonical_name(&args.from);
    let to = Charset::canonical_name(&args.to);
    tracing::debug!(from, to, "converting");

    let mut transcoder = StreamTranscoder::new(from, to, config)
        .with_context(|| format!("Failed to set up conversion from {} to {}", from, to))?;

    let mut reader = open_input(args.input.as_ref())?;
    let mut writer: Box<dyn Write> = match args.output {
        Some(ref path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
            format!("Failed to create output file: {}", path.display())
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    if args.add_bom {
        match to.parse::<Charset>().ok().and_then(Charset::bom) {
            Some(bom) => writer.write_all(bom)?,
            None => tracing::warn!(charset = to, "target charset has no byte order mark"),
        }
    }

    let source_bom = if args.strip_bom {
        from.parse::<Charset>().ok().and_then(Charset::bom)
    } else {
        None
    };
    let mut bom_filter = BomFilter::new(source_bom);

    let mut chunk = vec![0u8; chunk_size];
    let mut output = Vec::new();
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("Failed to read input"),
        };
        if n == 0 {
            break;
        }

        transcoder
            .feed(bom_filter.filter(&chunk[..n]), &mut output)
            .context("Conversion failed")?;
        writer
            .write_all(&output)
            .context("Failed to write output")?;
        output.clear();
    }

    // Input shorter than the BOM it started to match.
    transcoder
        .feed(bom_filter.remainder(), &mut output)
        .context("Conversion failed")?;
    let stats = transcoder
        .finish(&mut output)
        .context("Conversion failed")?;
    writer.write_all(&output).context("Failed to write output")?;
    writer.flush().context("Failed to write output")?;

    let processing_time = start_time.elapsed();
    tracing::debug!(
        read = stats.bytes_read,
        written = stats.bytes_written,
        elapsed = ?processing_time,
        "conversion complete"
    );

    match cli.format {
        OutputFormat::Json => {
            let report = ConversionReport {
                success: true,
                from,
                to,
                stats,
                processing_time_ms: processing_time.as_millis() as u64,
            };
            eprintln!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            if stats.non_reversible > 0 {
                eprintln!("{} non-reversible substitutions", stats.non_reversible);
            }
            if stats.skipped > 0 {
                eprintln!("{} invalid bytes skipped", stats.skipped);
            }
            if cli.verbose || args.output.is_some() {
                eprintln!(
                    "✓ Converted {} bytes -> {} bytes",
                    stats.bytes_read, stats.bytes_written
                );
            }
        }
    }

    Ok(())
}

/// Holds back the start of the input until it is known whether it opens
/// with a byte order mark, however the reads happen to split it.
#[cfg(feature = "cli")]
struct BomFilter {
    bom: Option<&'static [u8]>,
    head: Vec<u8>,
}

#[cfg(feature = "cli")]
impl BomFilter {
    fn new(bom: Option<&'static [u8]>) -> Self {
        Self {
            bom,
            head: Vec::new(),
        }
    }

    /// Bytes of `data` that are ready to convert; empty while the head is
    /// still a proper prefix of the BOM.
    fn filter<'a>(&'a mut self, data: &'a [u8]) -> &'a [u8] {
        let Some(bom) = self.bom else {
            return data;
        };

        self.head.extend_from_slice(data);
        if self.head.len() < bom.len() && bom.starts_with(&self.head) {
            return &[];
        }

        self.bom = None;
        if self.head.starts_with(bom) {
            tracing::debug!(len = bom.len(), "stripped BOM");
            &self.head[bom.len()..]
        } else {
            &self.head
        }
    }

    /// Held-back bytes when the input ended before a decision was possible.
    fn remainder(&mut self) -> &[u8] {
        if self.bom.take().is_some() {
            &self.head
        } else {
            &[]
        }
    }
}

#[cfg(feature = "cli")]
fn check_command(args: &CheckArgs, cli: &Cli) -> Result<()> {
    let charset = Charset::canonical_name(&args.charset);
    let reader = open_input(args.input.as_ref())?;

    let result = stream::transcode_io(
        reader,
        io::sink(),
        charset,
        Charset::UTF8.name(),
        StreamConfig::default(),
    );

    let (valid, bytes_checked, error, offset) = match result {
        Ok(stats) => (true, stats.bytes_read, None, None),
        Err(err @ TranscodeError::MalformedInput { offset }) => {
            (false, offset, Some(err.to_string()), Some(offset))
        }
        Err(err @ TranscodeError::TruncatedInput { offset, .. }) => {
            (false, offset, Some(err.to_string()), Some(offset))
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to check input as {}", charset));
        }
    };

    match cli.format {
        OutputFormat::Json => {
            let report = CheckReport {
                valid,
                charset,
                bytes_checked,
                error,
                offset,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            if valid {
                println!("✓ Input is valid {}", charset);
            } else {
                println!("✗ Input is not valid {}", charset);
                if let Some(error) = error {
                    println!("  {}", error);
                }
            }
        }
    }

    if !valid {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn list_command(args: &ListArgs, cli: &Cli) -> Result<()> {
    let charsets: Vec<Charset> = Charset::ALL
        .into_iter()
        .filter(|charset| match args.category {
            Some(ref category) => charset.category() == category.as_str(),
            None => true,
        })
        .collect();

    match cli.format {
        OutputFormat::Json => {
            let info: Vec<_> = charsets
                .iter()
                .map(|charset| {
                    serde_json::json!({
                        "name": charset.name(),
                        "category": charset.category(),
                        "description": charset.description(),
                        "multibyte": charset.is_multibyte(),
                        "stateful": charset.is_stateful(),
                        "has_bom": charset.bom().is_some()
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        OutputFormat::Text => {
            println!("Well-known charsets ({} total):", charsets.len());
            println!("Any other name accepted by the system iconv also works.");
            println!();

            for charset in charsets {
                println!(
                    "{:15} {:10} {}",
                    charset.name(),
                    format!("[{}]", charset.category()),
                    charset.description()
                );

                if args.details {
                    println!(
                        "                Multibyte: {}",
                        if charset.is_multibyte() { "Yes" } else { "No" }
                    );
                    println!(
                        "                Stateful: {}",
                        if charset.is_stateful() { "Yes" } else { "No" }
                    );
                    if let Some(bom) = charset.bom() {
                        println!("                BOM: {:02X?}", bom);
                    }
                    println!();
                }
            }
        }
    }

    Ok(())
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

    fn run_filter(bom: Option<&'static [u8]>, reads: &[&[u8]]) -> Vec<u8> {
        let mut filter = BomFilter::new(bom);
        let mut out = Vec::new();
        for read in reads {
            out.extend_from_slice(filter.filter(read));
        }
        out.extend_from_slice(filter.remainder());
        out
    }

    #[test]
    fn test_bom_stripped_from_single_read() {
        assert_eq!(run_filter(Some(UTF8_BOM), &[&b"\xEF\xBB\xBFabc"[..]]), b"abc");
    }

    #[test]
    fn test_bom_split_across_reads() {
        let reads: &[&[u8]] = &[b"\xEF", b"\xBB", b"\xBFab", b"c"];
        assert_eq!(run_filter(Some(UTF8_BOM), reads), b"abc");
    }

    #[test]
    fn test_bom_prefix_without_bom_is_kept() {
        let reads: &[&[u8]] = &[b"\xEF\xBB", b"x"];
        assert_eq!(run_filter(Some(UTF8_BOM), reads), b"\xEF\xBBx");
        assert_eq!(run_filter(Some(UTF8_BOM), &[&b"\xEF"[..]]), b"\xEF");
    }

    #[test]
    fn test_bom_only_stripped_at_start() {
        let reads: &[&[u8]] = &[b"ab", b"\xEF\xBB\xBF"];
        assert_eq!(run_filter(Some(UTF8_BOM), reads), b"ab\xEF\xBB\xBF");
        assert_eq!(run_filter(None, &[&b"\xEF\xBB\xBFa"[..]]), b"\xEF\xBB\xBFa");
    }
}
