use anyhow::Result;
use clap::{Parser, ValueEnum};
use lazyrows::args::SourceArgs;
use lazyrows::commands::Commands;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LoggingMode {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl From<LoggingMode> for logutil::LogFormat {
    fn from(mode: LoggingMode) -> Self {
        match mode {
            LoggingMode::Pretty => logutil::LogFormat::HumanReadable,
            LoggingMode::Json => logutil::LogFormat::Json,
            LoggingMode::Compact => logutil::LogFormat::Compact,
        }
    }
}

#[derive(Parser)]
#[clap(name = "lazyrows")]
#[clap(version)]
#[clap(about = "Stream, batch and paginate table rows with bounded memory", long_about = None)]
struct Cli {
    /// Log verbosity.
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Format for logs written to stderr.
    #[clap(long, value_enum)]
    log_mode: Option<LoggingMode>,

    #[clap(flatten)]
    source: SourceArgs,

    #[clap(subcommand)]
    command: Commands,
}

fn run(cli: Cli) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), table = %cli.source.table, "starting...");
    cli.command.run(&cli.source)
}

fn main() {
    let cli = Cli::parse();
    logutil::configure_global_logger(
        logutil::level_for_verbosity(tracing::Level::ERROR, cli.verbose),
        cli.log_mode.unwrap_or_default().into(),
        std::io::stderr,
    );

    if let Err(err) = run(cli) {
        println!("ERROR: {err}");
        std::process::exit(1);
    }
}
