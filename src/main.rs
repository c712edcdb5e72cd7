use clap::Parser;
use segycp::config::{parse_format, CopyOptions, CoverageSpec, CubeSpec, InputSpec, OutputSpec};
use segycp::Transcoder;
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Copy SEG-Y data between disk files, pipes and tapes.
#[derive(Parser)]
#[command(name = "segycp", version, about)]
struct Cli {
    /// Input: a file or tape device, `-` for stdin, `+base` for base1, base2, ...
    #[arg(short, long, default_value = "-")]
    input: String,
    /// Output: a file or tape device, `-` for stdout, `+base` for one file per reel
    #[arg(short, long)]
    output: Option<String>,
    /// Output sample format: ibm, integer, ieee (or 1, 2, 5)
    #[arg(long)]
    format: Option<String>,
    /// Keep traces whose CDP is strictly above this value
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    cdp_min: i32,
    /// Keep traces whose CDP is strictly below this value
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    cdp_max: i32,
    /// Stop after writing this many traces
    #[arg(long)]
    max_traces: Option<u64>,
    /// Skip this many traces before writing
    #[arg(long, default_value = "0")]
    skip_traces: u64,
    /// Start a new output volume every N traces
    #[arg(long, value_name = "N")]
    split_output: Option<u64>,
    /// Write the reel headers at the start of every split volume
    #[arg(long)]
    split_hd: bool,
    /// Read every file of the input tape
    #[arg(long)]
    all: bool,
    /// Replace the text header with this 3200-byte file
    #[arg(long)]
    ebcdic_file: Option<PathBuf>,
    /// Coverage file: "file [offset size]..."
    #[arg(long)]
    cov: Option<String>,
    /// Cube file: "file lmin lmax lstep tmin tmax tstep smin smax sstep"
    #[arg(long)]
    cube: Option<String>,
    /// Input records carry an 8-digit length prefix
    #[arg(long)]
    blocked: bool,
    /// Print each reel's binary header
    #[arg(long)]
    dump: bool,
    /// Do not write reel headers
    #[arg(long)]
    no_headers: bool,
    /// Do not report short header reads
    #[arg(long)]
    no_error_hd: bool,
    /// Write a line of trace header words per trace to this file
    #[arg(long, value_name = "FILE")]
    dump_sp: Option<PathBuf>,
    /// Write a JSON run summary to this file
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,
    /// Seconds between attempts to open a replacement output tape
    #[arg(long, default_value = "5")]
    poll_secs: u64,
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let opts = CopyOptions {
        input:                cli.input.parse::<InputSpec>()?,
        output:               cli.output.as_deref().map(str::parse::<OutputSpec>).transpose()?,
        format_override:      cli.format.as_deref().map(parse_format).transpose()?,
        cdp_min:              cli.cdp_min,
        cdp_max:              cli.cdp_max,
        max_traces:           cli.max_traces,
        skip_traces:          cli.skip_traces,
        split_size:           cli.split_output,
        split_writes_header:  cli.split_hd,
        all_files_in_input:   cli.all,
        text_header_override: cli.ebcdic_file,
        coverage:             cli.cov.as_deref().map(str::parse::<CoverageSpec>).transpose()?,
        cube:                 cli.cube.as_deref().map(str::parse::<CubeSpec>).transpose()?,
        blocked:              cli.blocked,
        no_headers:           cli.no_headers,
        dump_binary_header:   cli.dump,
        report_short_headers: !cli.no_error_hd,
        listing:              cli.dump_sp,
        summary_path:         cli.summary,
        poll_interval:        Duration::from_secs(cli.poll_secs),
    };
    let to_stdout = matches!(opts.output, Some(OutputSpec::Stdout));

    let summary = Transcoder::new(opts)?.run()?;
    if to_stdout {
        eprintln!("{summary}");
    } else {
        println!("{summary}");
    }
    Ok(())
}
