#![deny(unsafe_code)]

//! webshim CLI: drive the fetch and file APIs from the command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};
use webshim_config::AppConfig;
use webshim_core::logging::LogReader;
use webshim_core::{
    FetchClient, File, Headers, LogCollector, Request, RequestInit, ScriptError, build_info,
};

/// Web platform APIs for embedded script engines, from the command line.
#[derive(Parser)]
#[command(name = "webshim", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "webshim.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL and print the response.
    Fetch {
        url: String,

        /// Request method.
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Request header as `name: value` (repeatable).
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body.
        #[arg(short, long)]
        data: Option<String>,

        /// Print response headers.
        #[arg(short, long)]
        include: bool,

        /// Print the captured shim log after the body.
        #[arg(long)]
        show_log: bool,
    },

    /// Open a file as a `File`, slice it and print the slice.
    Read {
        path: PathBuf,

        /// Slice start offset, clamped to the file.
        #[arg(long, allow_hyphen_values = true)]
        start: Option<i64>,

        /// Slice end offset, clamped to the file.
        #[arg(long, allow_hyphen_values = true)]
        end: Option<i64>,

        /// MIME type to attach to the file.
        #[arg(long = "type")]
        mime_type: Option<String>,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },

    /// Print build information.
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;
    let logs = init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Fetch {
            url,
            method,
            headers,
            data,
            include,
            show_log,
        } => {
            let request = build_request(url, method, &headers, data)?;
            cmd_fetch(&config, request, include).await?;
            if show_log {
                print_log(&logs);
            }
        }
        Commands::Read {
            path,
            start,
            end,
            mime_type,
        } => cmd_read(&path, start, end, mime_type.as_deref()).await?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
        Commands::Version => println!("{}", build_info::build_report()),
    }

    Ok(())
}

/// Install the stderr formatter and a capture layer for `--show-log`.
fn init_tracing(config: &AppConfig, verbose: u8) -> LogReader {
    let level = match verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let collector = LogCollector::new(config.console.capture_capacity);
    let reader = collector.reader();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .with(collector.with_filter(EnvFilter::new("webshim=trace,webshim_core=debug")))
        .init();
    reader
}

async fn cmd_fetch(config: &AppConfig, request: Request, include: bool) -> Result<()> {
    let client = FetchClient::from_config(&config.fetch).map_err(script_error)?;
    info!(method = %request.method(), url = %request.url(), "fetching");

    let response = client.fetch_request(request).await.map_err(script_error)?;
    println!("{} {}", response.status(), response.status_text());
    if include {
        for (name, value) in response.headers().entries() {
            println!("{name}: {value}");
        }
        println!();
    }
    let body = response.text().await.map_err(script_error)?;
    println!("{body}");
    Ok(())
}

fn build_request(
    url: String,
    method: String,
    raw_headers: &[String],
    data: Option<String>,
) -> Result<Request> {
    let headers = Headers::new();
    for raw in raw_headers {
        let (name, value) = parse_header(raw)?;
        headers.append(name, value);
    }
    let mut init = RequestInit::new().method(method).headers(headers);
    if let Some(data) = data {
        init = init.body(data);
    }
    Request::new(url, init).map_err(script_error)
}

/// Split `name: value`.
fn parse_header(raw: &str) -> Result<(&str, &str)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("invalid header {raw:?}: expected 'name: value'");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("invalid header {raw:?}: empty name");
    }
    Ok((name, value.trim()))
}

async fn cmd_read(
    path: &Path,
    start: Option<i64>,
    end: Option<i64>,
    mime_type: Option<&str>,
) -> Result<()> {
    let file = File::from_path(path, mime_type.unwrap_or(""))
        .await
        .map_err(script_error)
        .with_context(|| format!("cannot open {}", path.display()))?;
    println!("name:         {}", file.name());
    println!("size:         {}", file.blob().size());
    println!("type:         {}", file.blob().mime_type());
    println!("lastModified: {}", file.last_modified_date().to_js_string());

    let slice = file.blob().slice(start, end, None);
    debug!(size = slice.size(), "slice created");
    let text = slice.read_text().await.map_err(script_error)?;
    println!("slice:        {} bytes", slice.size());
    println!();
    println!("{text}");
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).map_err(|e| anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

fn print_log(logs: &LogReader) {
    for entry in logs.entries() {
        eprintln!(
            "[{:>8.3}] {:<5} {}: {}",
            entry.elapsed_secs,
            entry.level.as_str(),
            entry.target,
            entry.message
        );
    }
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path).await.map_err(|e| anyhow!(e))
    } else {
        Ok(AppConfig::default())
    }
}

fn script_error(err: ScriptError) -> anyhow::Error {
    anyhow!("{err}")
}
