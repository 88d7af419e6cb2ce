mod echo;

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::Parser;
use grantscope_core::{
    ContentType, Extractor, ExtractorConfig, JsonConfig, JsonFormatter, ParseResult, TextConfig, TextFormatter,
    fetch_file, fetch_stdin, records_to_json,
};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Output format for extraction results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Text,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "txt" => Ok(Self::Text),
            _ => Err(format!("Invalid format: {}. Valid options: json, text", s)),
        }
    }
}

/// Extract grant, contract and funding records from government web pages
#[derive(Parser, Debug)]
#[command(name = "grantscope")]
#[command(version)]
#[command(about = "Extract grant, contract and funding records from government web pages", long_about = None)]
struct Args {
    /// URL to fetch, local HTML file, or "-" for stdin
    #[arg(value_name = "INPUT")]
    input: String,

    /// Record type to extract (grants, contracts, funding)
    #[arg(short = 't', long = "type", default_value = "grants", value_name = "TYPE")]
    content_type: ContentType,

    /// Output format (json, text)
    #[arg(short, long, default_value = "json", value_name = "FORMAT")]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Source URL of a file or stdin input; selects the site profile
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// HTTP timeout in seconds, replacing the site profile's
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Fetch attempts, replacing the site profile's
    #[arg(long, value_name = "NUM")]
    retries: Option<u32>,

    /// Directory of site profile files
    #[arg(long, value_name = "DIR")]
    profiles: Option<PathBuf>,

    /// Custom User-Agent for HTTP requests
    #[arg(long, value_name = "UA")]
    user_agent: Option<String>,

    /// Single-line JSON
    #[arg(long)]
    compact: bool,

    /// Leave sanitizer issues out of the output
    #[arg(long)]
    no_issues: bool,

    /// Print only the records as a JSON array
    #[arg(long, conflicts_with = "format")]
    records_only: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn is_url(&self) -> bool {
        self.input.starts_with("http://") || self.input.starts_with("https://")
    }

    fn extractor_config(&self) -> ExtractorConfig {
        let mut builder = ExtractorConfig::builder().cache_enabled(false);
        if let Some(secs) = self.timeout {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = self.retries {
            builder = builder.max_retries(retries);
        }
        if let Some(dir) = &self.profiles {
            builder = builder.profiles_dir(dir);
        }
        if let Some(ua) = &self.user_agent {
            builder = builder.user_agent(ua);
        }
        builder.build()
    }

    fn render(&self, result: &ParseResult) -> anyhow::Result<String> {
        if self.records_only {
            return records_to_json(&result.records, !self.compact).context("Failed to serialize records");
        }

        match self.format {
            OutputFormat::Json => {
                let config =
                    JsonConfig { pretty: !self.compact, include_issues: !self.no_issues, include_attempts: true };
                JsonFormatter::new(config).convert(result).context("Failed to serialize result")
            }
            OutputFormat::Text => {
                let config = TextConfig { include_attempts: true, include_issues: !self.no_issues, line_width: 100 };
                Ok(TextFormatter::new(config).convert(result))
            }
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("grantscope_core=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        init_logging();
        echo::print_banner();
        echo::print_info("Debug logging enabled");
        eprintln!();
    }

    let started = Instant::now();
    let extractor = Extractor::with_config(args.extractor_config());

    let result = if args.is_url() {
        if args.verbose {
            echo::print_step(1, 3, &format!("Fetching {}", args.input.bright_white().underline()));
        }
        extractor.parse(&args.input, args.content_type).await
    } else {
        let bytes = if args.input == "-" {
            if args.verbose {
                echo::print_step(1, 3, "Reading from stdin");
            }
            fetch_stdin().context("Failed to read from stdin")?
        } else {
            if args.verbose {
                echo::print_step(1, 3, &format!("Reading from file {}", args.input.bright_white()));
            }
            fetch_file(&args.input).with_context(|| format!("Failed to read file: {}", args.input))?
        };
        if args.verbose {
            eprintln!("  {} {}", "Size:".dimmed(), echo::format_size(bytes.len()).bright_white());
        }
        extractor.parse_bytes(&bytes, args.url.as_deref(), args.content_type)
    };

    if args.verbose {
        echo::print_step(2, 3, "Extracting records");
        echo::print_result_details(&result);
    }

    let output = args.render(&result)?;

    if args.verbose {
        echo::print_step(3, 3, "Writing output");
        echo::print_timing("Total", started.elapsed());
        eprintln!();
    }

    match &args.output {
        Some(path) => {
            fs::write(path, &output).with_context(|| format!("Failed to write to file: {}", path.display()))?;
            echo::print_success(&format!("Output written to {}", path.display().bright_white()));
        }
        None => println!("{}", output),
    }

    if let Some(error) = &result.error {
        bail!("{}", error);
    }
    if !result.success {
        echo::print_warning("No records found");
    }

    Ok(())
}
