use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tailview::loader::{load_file, LineParser};
use tailview::pipeline::{MergePipeline, RowFilter};
use tailview::{Config, LogLevel, LogSource, TaskScheduler, TokioTaskScheduler};

#[derive(Parser)]
#[command(name = "tailview", about = "Merge log files into one time-ordered view")]
struct Cli {
    /// Write debug logs to /tmp/tailview-debug.log (tail -f to inspect).
    #[arg(long)]
    debug: bool,

    /// Config file to use instead of $XDG_CONFIG_HOME/tailview/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge log files by timestamp and print the result.
    Merge {
        /// Log files to merge (at most 255).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Only show entries of this level or more severe.
        #[arg(long, value_parser = parse_level)]
        level: Option<LogLevel>,

        /// Only show lines matching this regular expression.
        #[arg(long)]
        grep: Option<String>,

        /// Give up when merging takes longer than this many seconds.
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Print the default configuration document.
    DefaultConfig,
}

fn parse_level(text: &str) -> Result<LogLevel, String> {
    LogLevel::parse(text).ok_or_else(|| format!("unknown log level {text:?}"))
}

fn init_tracing(debug: bool) -> anyhow::Result<()> {
    if debug {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("/tmp/tailview-debug.log")?;
        tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
        tracing::info!("tailview debug log started, tail -f /tmp/tailview-debug.log");
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .init();
    }
    Ok(())
}

async fn merge(config: &Config, files: &[PathBuf], filter: RowFilter, timeout: Duration) -> anyhow::Result<()> {
    let parser = LineParser::new()?;
    let mut inputs: Vec<Arc<dyn LogSource>> = Vec::with_capacity(files.len());
    for file in files {
        inputs.push(load_file(file, &parser)?);
    }

    let scheduler = Arc::new(TokioTaskScheduler::current());
    let pipeline = MergePipeline::new(scheduler.clone() as Arc<dyn TaskScheduler>, inputs, &filter, config)?;
    pipeline.settle(timeout).await?;

    let mut stdout = std::io::stdout().lock();
    for line in pipeline.lines()? {
        writeln!(stdout, "{line}")?;
    }
    drop(pipeline);
    scheduler.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug)?;

    let config = match &cli.config {
        Some(path) => Config::load_from(path).with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Merge {
            files,
            level,
            grep,
            timeout,
        } => {
            let filter = RowFilter {
                min_level: level,
                pattern: grep,
            };
            merge(&config, &files, filter, Duration::from_secs(timeout)).await
        }
        Command::DefaultConfig => {
            print!("{}", Config::default_document());
            Ok(())
        }
    }
}
