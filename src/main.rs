use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use cdn_log_dl::{Config, Error, FileLocatorSource, LogAnalyzer, RunSummary, cancel_on_signal};

/// Download CDN access logs and search them for a client IP or any substring
#[derive(Debug, Parser)]
#[command(name = "cdn-log-dl", version, about)]
struct Cli {
    /// CDN domain the logs belong to (shown in the report header)
    #[arg(short, long)]
    domain: Option<String>,

    /// Start of the time range (RFC 3339, e.g. 2024-05-01T00:00:00Z)
    #[arg(short, long)]
    start: Option<String>,

    /// End of the time range (RFC 3339)
    #[arg(short, long)]
    end: Option<String>,

    /// Substring to search for, usually a client IP
    #[arg(short, long)]
    ip: Option<String>,

    /// File with one log URL per line
    #[arg(short, long, default_value = "log-url.log")]
    locators: PathBuf,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory fetched logs are stored in
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Maximum concurrent fetches and scans
    #[arg(long)]
    concurrency: Option<usize>,

    /// Delete fetched logs after the report is written
    #[arg(long)]
    cleanup: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Build the effective configuration: file (or defaults), then flags
    fn load_config(&self) -> Result<Config, Error> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(domain) = &self.domain {
            config.query.domain = domain.clone();
        }
        if let Some(start) = &self.start {
            config.query.start_time = start.clone();
        }
        if let Some(end) = &self.end {
            config.query.end_time = end.clone();
        }
        if let Some(ip) = &self.ip {
            config.query.needle = ip.clone();
        }
        if let Some(output) = &self.output {
            config.report.output_path = output.clone();
        }
        if let Some(dir) = &self.download_dir {
            config.fetch.download_dir = dir.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.fetch.concurrency = concurrency;
            config.scan.concurrency = concurrency;
        }
    }
}

/// Exit code when the report was written but some items failed
const EXIT_PARTIAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(error) = init_tracing(cli.quiet, cli.verbose) {
        eprintln!("cdn-log-dl error: {error}");
        return ExitCode::FAILURE;
    }

    match run(&cli).await {
        Ok(summary) if summary.is_complete() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(EXIT_PARTIAL),
        Err(error) => {
            tracing::error!(error = %error, code = error.error_code(), "Run aborted");
            eprintln!("cdn-log-dl error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<RunSummary, Error> {
    let config = cli.load_config()?;
    let analyzer = LogAnalyzer::new(config)?;

    println!("Searching CDN logs");
    println!("Domain: {}", analyzer.config().query.domain);
    println!(
        "Time range: {} to {}",
        analyzer.config().query.start_time,
        analyzer.config().query.end_time
    );
    println!("Search term: {}", analyzer.config().query.needle);

    let signal_task = tokio::spawn(cancel_on_signal(analyzer.cancel_token()));
    let result = analyzer.run(&FileLocatorSource::new(&cli.locators)).await;
    signal_task.abort();
    let summary = result?;

    print_summary(&summary);

    if cli.cleanup {
        analyzer.cleanup_artifacts(&summary.artifacts).await;
    }

    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Fetched {}/{} log files",
        summary.fetch.succeeded, summary.fetch.attempted
    );
    println!(
        "Scanned {}/{} log files",
        summary.scan.succeeded, summary.scan.attempted
    );
    for error in &summary.partial_failures {
        eprintln!("warning: {error}");
    }
    if summary.cancelled {
        eprintln!("warning: run was cancelled; the report covers completed work only");
    }
    println!(
        "\nDone: {} matching lines in {} files, report saved to {}",
        summary.total_lines,
        summary.files_matched,
        summary.report_path.display()
    );
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<(), Error> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("CDN_LOG_DL_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| Error::Other(format!("failed to initialize tracing subscriber: {error}")))
}
